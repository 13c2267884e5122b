//! # remindmail Dispatcher
//!
//! 定期リマインダーメールの配信サービス。
//!
//! 一定間隔で通知ストアから全通知を読み込み、送信期限に達したものについて本文を生成して
//! メールを送信し、最終送信日時を保存する。
//!
//! ## アーキテクチャ
//!
//! ```text
//! runner（ティック） → usecase::DispatchCycle
//!                         ├── NotificationRepository（通知ストア）
//!                         ├── DueScheduler（送信期限判定）
//!                         ├── MessageRenderer → TabularSource（動的本文）
//!                         └── NotificationSender（SMTP / Noop）
//! ```
//!
//! ## モジュール構成
//!
//! - [`config`] - 環境変数からの設定読み込み
//! - [`runner`] - 配信ループ
//! - [`usecase`] - 配信サイクル

pub mod config;
pub mod runner;
pub mod usecase;
