//! SMTP 通知送信実装
//!
//! lettre の `AsyncSmtpTransport` を使用してメールを送信する。
//! TLS を有効にした場合は STARTTLS でリレーに接続する。

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport,
    AsyncTransport,
    Tokio1Executor,
    message::{Mailbox, Message, header::ContentType},
};
use remindmail_domain::notification::{
    AuditFields,
    EmailMessage,
    NotificationError,
    audit_key,
};

use super::NotificationSender;

/// SMTP 通知送信
///
/// `lettre::AsyncSmtpTransport<Tokio1Executor>` をラップする。
/// 送信元アドレスは通知ごとに異なるため、メッセージ側の `from` を使う。
pub struct SmtpNotificationSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpNotificationSender {
    /// 新しい SMTP 送信インスタンスを作成
    ///
    /// # 引数
    ///
    /// - `host`: SMTP リレーのホスト名（例: "localhost"）
    /// - `port`: SMTP リレーのポート番号（例: 25）
    /// - `use_tls`: STARTTLS を使うか
    pub fn new(host: &str, port: u16, use_tls: bool) -> Result<Self, NotificationError> {
        let builder = if use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host).map_err(|e| {
                NotificationError::ConfigurationDefect(format!("SMTP リレー設定不正: {e}"))
            })?
        } else {
            // TLS なしで接続（社内リレーやローカル SMTP 向け）
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        };

        Ok(Self {
            transport: builder.port(port).build(),
        })
    }
}

/// 送信用の lettre メッセージを組み立てる
fn build_message(email: &EmailMessage) -> Result<Message, NotificationError> {
    let from: Mailbox = email.from.trim().parse().map_err(|e| {
        NotificationError::TransportFailure(format!("送信元アドレス不正: {e}"))
    })?;

    let mut builder = Message::builder().from(from).subject(&email.subject);
    for recipient in email.recipients() {
        let to: Mailbox = recipient.parse().map_err(|e| {
            NotificationError::TransportFailure(format!("宛先アドレス不正 ({recipient}): {e}"))
        })?;
        builder = builder.to(to);
    }

    let content_type = if email.is_html {
        ContentType::TEXT_HTML
    } else {
        ContentType::TEXT_PLAIN
    };

    builder
        .header(content_type)
        .body(email.body.clone())
        .map_err(|e| NotificationError::TransportFailure(format!("メッセージ構築失敗: {e}")))
}

#[async_trait]
impl NotificationSender for SmtpNotificationSender {
    async fn send_email(
        &self,
        email: &EmailMessage,
        audit: &AuditFields,
    ) -> Result<(), NotificationError> {
        let message = build_message(email)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| NotificationError::TransportFailure(format!("SMTP 送信失敗: {e}")))?;

        let field = |key: &str| audit.get(key).map(String::as_str).unwrap_or_default();
        tracing::info!(
            sent_on = field(audit_key::SENT_ON),
            to = field(audit_key::TO),
            subject = field(audit_key::SUBJECT),
            "SMTP: メールを送信しました"
        );

        Ok(())
    }
}
