//! # remindmail インフラ層
//!
//! 外部システムとの接続・通信を担当するインフラストラクチャ層。
//!
//! ## 設計方針
//!
//! 配信サイクルが依存する 3 つの外部協調者をトレイトで抽象化し、
//! その具体的な実装を提供する。配信サイクルはトレイトにのみ依存する。
//!
//! | トレイト | 役割 | 実装 |
//! |---------|------|------|
//! | [`NotificationRepository`](repository::NotificationRepository) | 通知レコードの読み込み・保存 | PostgreSQL / JSON ファイル |
//! | [`TabularSource`](tabular::TabularSource) | 動的本文のクエリ実行 | PostgreSQL |
//! | [`NotificationSender`](notification::NotificationSender) | メール送信 | SMTP / Noop |
//!
//! ## 依存関係
//!
//! ```text
//! dispatcher → infra → domain
//! ```
//!
//! ## モジュール構成
//!
//! - [`db`] - PostgreSQL 接続プールとマイグレーション
//! - [`error`] - インフラ層エラー定義
//! - [`notification`] - メール送信
//! - [`repository`] - 通知ストア
//! - [`tabular`] - 動的本文用のデータソース
//! - `mock` - テスト用インメモリ実装（`test-utils` feature）

pub mod db;
pub mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod notification;
pub mod repository;
pub mod tabular;

pub use error::{InfraError, InfraErrorKind};
