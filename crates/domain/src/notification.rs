//! # 通知
//!
//! 定期リマインダーメールに関するドメインモデルを定義する。
//!
//! ## ドメイン用語
//!
//! | 型 | ドメイン用語 | 説明 |
//! |---|------------|------|
//! | [`NotificationRecord`] | 通知レコード | 宛先・件名・本文の生成方式・リマインド間隔・最終送信日時 |
//! | [`RenderMode`] | 本文生成方式 | 静的な本文 / クエリ結果から生成する HTML |
//! | [`EmailMessage`] | メールメッセージ | 送信トランスポートに渡す完成済みメッセージ |
//! | [`DispatchLogEntry`] | 配信ログ | 送信成功ごとに出力する監査情報（永続化しない） |
//!
//! ## 設計方針
//!
//! - **状態変更は送信成功後のみ**: 最終送信日時は [`NotificationRecord::mark_notified`] でのみ更新する
//! - **enum による本文生成方式**: 静的 / 動的を実行時の bool 分岐ではなくバリアントで表現する
//! - **複数宛先**: `to` は `,` または `;` 区切りで複数アドレスを持てる

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;
use thiserror::Error;

use crate::{DomainError, schedule::IntervalSetting};

define_validated_string! {
    /// 通知 ID（一意識別子）
    ///
    /// ストア上の主キー。設定ファイルで人が付ける名前（例: `weekly-report`）を想定する。
    pub struct NotificationId {
        label: "通知 ID",
        max_length: 100,
    }
}

/// 配信エラー
///
/// 1 件の通知の処理中、または配信サイクル全体で発生するエラーの分類。
/// `StoreUnavailable`（読み込み時）以外はその通知の処理内で閉じ、ログ出力のみ行う。
#[derive(Debug, Clone, PartialEq, Eq, Error, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum NotificationError {
    /// 通知ストアに到達できない
    #[error("通知ストアに接続できません: {0}")]
    StoreUnavailable(String),

    /// 本文の生成結果が空
    #[error("メール本文が空です: {notification_id}")]
    EmptyBody { notification_id: String },

    /// 送信トランスポートでの失敗
    #[error("メール送信に失敗: {0}")]
    TransportFailure(String),

    /// 設定値の不備
    #[error("設定に不備があります: {0}")]
    ConfigurationDefect(String),
}

impl NotificationError {
    /// ログの `error.kind` フィールドに出力する種別名
    pub fn kind(&self) -> &'static str {
        self.into()
    }
}

impl From<DomainError> for NotificationError {
    fn from(error: DomainError) -> Self {
        Self::ConfigurationDefect(error.to_string())
    }
}

/// 動的 HTML の生成元
///
/// クエリと HTML テンプレートはどちらも断片の列として設定される。
/// 設定ファイルの形式上、断片は「後ろのものほど先に来る」順で並んでいるため、
/// 組み立て時に逆順で連結する（[`crate::report::assemble_fragments`]）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicSource {
    /// データソースの接続文字列
    pub connection:         String,
    /// クエリ断片（宣言順）
    pub query_fragments:    Vec<String>,
    /// HTML テンプレート断片（宣言順）
    pub template_fragments: Vec<String>,
}

/// 本文生成方式
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, IntoStaticStr)]
#[serde(tag = "mode", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RenderMode {
    /// 保存済みの本文をそのまま使う
    Static {
        #[serde(default)]
        body: Option<String>,
        /// HTML として送信するか（`false` ならプレーンテキスト）
        #[serde(default)]
        html: bool,
    },
    /// クエリ結果から HTML テーブルを生成する
    Dynamic(DynamicSource),
}

impl RenderMode {
    /// 生成方式名（`"static"` / `"dynamic"`）
    pub fn name(&self) -> &'static str {
        self.into()
    }

    /// トランスポートに HTML として渡すか
    pub fn is_html(&self) -> bool {
        match self {
            Self::Static { html, .. } => *html,
            Self::Dynamic(_) => true,
        }
    }
}

/// 通知レコード作成パラメータ
#[derive(Debug, Clone)]
pub struct NewNotificationRecord {
    pub id:               NotificationId,
    pub to:               String,
    pub from:             String,
    pub subject:          String,
    pub render_mode:      RenderMode,
    pub interval:         IntervalSetting,
    pub last_notified_at: Option<DateTime<Utc>>,
}

/// 通知レコード（エンティティ）
///
/// # 不変条件
///
/// - 送信前に `to`、`from`、生成後の本文が空でないこと（配信側で検証する）
/// - `last_notified_at` が `None` の通知は常に送信期限内
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRecord {
    id: NotificationId,
    to: String,
    from: String,
    subject: String,
    render_mode: RenderMode,
    interval: IntervalSetting,
    last_notified_at: Option<DateTime<Utc>>,
}

impl NotificationRecord {
    pub fn new(params: NewNotificationRecord) -> Self {
        Self {
            id: params.id,
            to: params.to,
            from: params.from,
            subject: params.subject,
            render_mode: params.render_mode,
            interval: params.interval,
            last_notified_at: params.last_notified_at,
        }
    }

    /// 送信成功を記録した新しいインスタンスを返す
    pub fn mark_notified(self, now: DateTime<Utc>) -> Self {
        Self {
            last_notified_at: Some(now),
            ..self
        }
    }

    pub fn id(&self) -> &NotificationId {
        &self.id
    }

    pub fn to(&self) -> &str {
        &self.to
    }

    pub fn sender(&self) -> &str {
        &self.from
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn render_mode(&self) -> &RenderMode {
        &self.render_mode
    }

    pub fn interval(&self) -> &IntervalSetting {
        &self.interval
    }

    pub fn last_notified_at(&self) -> Option<DateTime<Utc>> {
        self.last_notified_at
    }

    /// 宛先アドレスの一覧（空要素は除く）
    pub fn recipients(&self) -> Vec<&str> {
        split_addresses(&self.to).collect()
    }

    pub fn has_recipient(&self) -> bool {
        split_addresses(&self.to).next().is_some()
    }

    pub fn has_sender(&self) -> bool {
        !self.from.trim().is_empty()
    }
}

/// `,` / `;` 区切りのアドレス列を分割する
pub fn split_addresses(addresses: &str) -> impl Iterator<Item = &str> {
    addresses
        .split([',', ';'])
        .map(str::trim)
        .filter(|address| !address.is_empty())
}

/// メールメッセージ
///
/// 本文生成の出力。`NotificationSender` に渡される。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    /// 送信先メールアドレス（`,` / `;` 区切りで複数可）
    pub to:      String,
    /// 送信元メールアドレス
    pub from:    String,
    /// 件名
    pub subject: String,
    /// 本文
    pub body:    String,
    /// 本文が HTML か
    pub is_html: bool,
}

impl EmailMessage {
    pub fn recipients(&self) -> impl Iterator<Item = &str> {
        split_addresses(&self.to)
    }
}

/// トランスポートに渡す監査用フィールド
pub type AuditFields = BTreeMap<&'static str, String>;

/// 監査フィールドのキー
pub mod audit_key {
    pub const SENT_ON: &str = "Sent on";
    pub const TO: &str = "To";
    pub const SUBJECT: &str = "Subject";
}

/// 監査フィールドの送信日時書式
const SENT_ON_FORMAT: &str = "%d-%b-%Y %H:%M:%S";

/// 配信ログ
///
/// 送信 1 件ごとに生成される。永続化はせず、ログと監査フィールドにのみ使う。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchLogEntry {
    pub notification_id: NotificationId,
    pub recipient:       String,
    pub subject:         String,
    pub sent_at:         DateTime<Utc>,
}

impl DispatchLogEntry {
    pub fn new(record: &NotificationRecord, sent_at: DateTime<Utc>) -> Self {
        Self {
            notification_id: record.id().clone(),
            recipient: record.to().to_string(),
            subject: record.subject().to_string(),
            sent_at,
        }
    }

    /// トランスポートに渡す監査フィールドを組み立てる
    pub fn audit_fields(&self) -> AuditFields {
        AuditFields::from([
            (audit_key::SENT_ON, self.sent_at.format(SENT_ON_FORMAT).to_string()),
            (audit_key::TO, self.recipient.clone()),
            (audit_key::SUBJECT, self.subject.clone()),
        ])
    }
}
