//! # 通知ストア
//!
//! 通知レコードの読み込みと保存を担当する。
//!
//! ## 設計方針
//!
//! - **トレイトで抽象化**: 配信サイクルは [`NotificationRepository`] にのみ依存する
//! - **保存先の選択**: PostgreSQL（本番）と JSON ファイル（単体運用・開発）を設定で切り替える
//! - **壊れたレコードで全体を止めない**: 1 件の変換失敗は警告ログを出してスキップする。
//!   ストア自体に到達できない場合のみエラーを返す

pub mod file_notification_repository;
pub mod notification_repository;

pub use file_notification_repository::FileNotificationRepository;
pub use notification_repository::{NotificationRepository, PostgresNotificationRepository};
