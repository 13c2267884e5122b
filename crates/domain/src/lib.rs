//! # remindmail ドメイン層
//!
//! 定期リマインダーメール配信の中核となるドメインモデルを定義する。
//!
//! ## 設計方針
//!
//! - **純粋性**: I/O を一切持たない。時刻も [`clock::Clock`] 経由で受け取る
//! - **値オブジェクト**: 通知 ID やリマインド間隔は生成時に検証する
//! - **タグ付き enum**: 本文の生成方式（静的 / 動的）は [`notification::RenderMode`] で表現する
//!
//! ## 依存関係の方向
//!
//! ```text
//! dispatcher → infra → domain
//!     ↓
//!   shared（ログ基盤）
//! ```
//!
//! ## モジュール構成
//!
//! - [`clock`] - 現在時刻の抽象化
//! - [`error`] - 値オブジェクト生成時の検証エラー
//! - [`notification`] - 通知レコード、メールメッセージ、配信エラー
//! - [`report`] - クエリ結果からの HTML テーブル生成
//! - [`schedule`] - リマインド間隔と送信期限判定
//!
//! ## 使用例
//!
//! ```rust
//! use chrono::{Duration, Utc};
//! use remindmail_domain::schedule::{ReminderInterval, is_due};
//!
//! let interval = ReminderInterval::parse("24h").unwrap();
//! let now = Utc::now();
//!
//! assert!(is_due(None, interval, now));
//! assert!(is_due(Some(now - Duration::hours(30)), interval, now));
//! assert!(!is_due(Some(now), interval, now));
//! ```

#[macro_use]
mod macros;

pub mod clock;
pub mod error;
pub mod notification;
pub mod report;
pub mod schedule;

pub use error::DomainError;
