//! # 通知送信
//!
//! 完成したメールメッセージを送信するトランスポート。
//!
//! ## 設計方針
//!
//! - **trait による抽象化**: `NotificationSender` trait でメール送信を抽象化
//! - **2 つの実装**: SMTP（リレー経由の実送信）、Noop（ログ出力のみ）
//! - **環境変数切替**: `NOTIFICATION_BACKEND` でランタイム選択
//! - **監査フィールド**: 送信ごとに「送信日時・宛先・件名」を受け取り、送信ログに残す

mod noop;
mod smtp;

use async_trait::async_trait;
pub use noop::NoopNotificationSender;
use remindmail_domain::notification::{AuditFields, EmailMessage, NotificationError};
pub use smtp::SmtpNotificationSender;

/// メール送信トレイト
///
/// 送信に失敗した場合は [`NotificationError::TransportFailure`] を返す。
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// メールを送信する
    async fn send_email(
        &self,
        email: &EmailMessage,
        audit: &AuditFields,
    ) -> Result<(), NotificationError>;
}
