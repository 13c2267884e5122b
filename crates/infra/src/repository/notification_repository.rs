//! # NotificationRepository
//!
//! 通知レコードの永続化を担当するリポジトリ。
//!
//! ## 設計方針
//!
//! - **全件読み込み**: 配信サイクルは毎回すべての通知を読み、送信期限の判定は配信側で行う
//! - **冪等な保存**: `save` は ID をキーにした upsert。同じ状態を 2 回保存しても結果は変わらない
//! - **ID は保存時のキーと一致させる**: 前後に空白を含む ID の行は読み込まない。
//!   正規化した ID で upsert すると別の行が挿入され、元の行が未送信のまま残るため
//! - **本文生成方式の展開**: [`RenderMode`] は `render_mode` 列と付随する列に展開して保存する

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use remindmail_domain::{
    notification::{
        DynamicSource,
        NewNotificationRecord,
        NotificationId,
        NotificationRecord,
        RenderMode,
    },
    schedule::IntervalSetting,
};
use sqlx::PgPool;

use crate::error::InfraError;

/// 通知リポジトリトレイト
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// すべての通知レコードを読み込む
    ///
    /// レコードが 1 件もない場合は空の Vec を返す。
    /// ストアに到達できない場合はエラー。
    async fn load_all(&self) -> Result<Vec<NotificationRecord>, InfraError>;

    /// 通知レコードの現在の状態を保存する（upsert）
    async fn save(&self, record: &NotificationRecord) -> Result<(), InfraError>;
}

/// DB の notifications テーブルの行を表す中間構造体
///
/// `TryFrom` で `NotificationRecord` への変換ロジックを一箇所に集約する。
#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    id:                 String,
    recipients:         String,
    sender:             String,
    subject:            String,
    render_mode:        String,
    body:               Option<String>,
    is_html:            bool,
    connection_string:  Option<String>,
    query_fragments:    Vec<String>,
    template_fragments: Vec<String>,
    reminder_interval:  String,
    last_notified_at:   Option<DateTime<Utc>>,
}

impl TryFrom<NotificationRow> for NotificationRecord {
    type Error = InfraError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        if row.id.trim() != row.id {
            return Err(InfraError::unexpected(format!(
                "通知 ID の前後に空白があります: {:?}",
                row.id
            )));
        }

        let render_mode = match row.render_mode.as_str() {
            "static" => RenderMode::Static {
                body: row.body,
                html: row.is_html,
            },
            "dynamic" => RenderMode::Dynamic(DynamicSource {
                connection:         row.connection_string.unwrap_or_default(),
                query_fragments:    row.query_fragments,
                template_fragments: row.template_fragments,
            }),
            other => {
                return Err(InfraError::unexpected(format!(
                    "不明な本文生成方式です: {other}"
                )));
            }
        };

        Ok(NotificationRecord::new(NewNotificationRecord {
            id: NotificationId::new(&row.id).map_err(|e| InfraError::unexpected(e.to_string()))?,
            to: row.recipients,
            from: row.sender,
            subject: row.subject,
            render_mode,
            interval: IntervalSetting::from_raw(row.reminder_interval),
            last_notified_at: row.last_notified_at,
        }))
    }
}

/// 保存用に展開した本文生成方式の列
struct RenderColumns<'a> {
    body:               Option<&'a str>,
    is_html:            bool,
    connection_string:  Option<&'a str>,
    query_fragments:    &'a [String],
    template_fragments: &'a [String],
}

impl<'a> From<&'a RenderMode> for RenderColumns<'a> {
    fn from(mode: &'a RenderMode) -> Self {
        match mode {
            RenderMode::Static { body, html } => Self {
                body:               body.as_deref(),
                is_html:            *html,
                connection_string:  None,
                query_fragments:    &[],
                template_fragments: &[],
            },
            RenderMode::Dynamic(source) => Self {
                body:               None,
                is_html:            true,
                connection_string:  Some(&source.connection),
                query_fragments:    &source.query_fragments,
                template_fragments: &source.template_fragments,
            },
        }
    }
}

/// PostgreSQL 実装の NotificationRepository
#[derive(Debug, Clone)]
pub struct PostgresNotificationRepository {
    pool: PgPool,
}

impl PostgresNotificationRepository {
    /// 新しいリポジトリインスタンスを作成
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationRepository for PostgresNotificationRepository {
    #[tracing::instrument(skip_all, level = "debug")]
    async fn load_all(&self) -> Result<Vec<NotificationRecord>, InfraError> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            r#"
            SELECT
                id,
                recipients,
                sender,
                subject,
                render_mode,
                body,
                is_html,
                connection_string,
                query_fragments,
                template_fragments,
                reminder_interval,
                last_notified_at
            FROM notifications
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let records = rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id.clone();
                NotificationRecord::try_from(row)
                    .inspect_err(|e| {
                        tracing::warn!(
                            notification_id = %id,
                            error = %e,
                            "通知レコードを読み込めないためスキップします"
                        );
                    })
                    .ok()
            })
            .collect();

        Ok(records)
    }

    #[tracing::instrument(skip_all, level = "debug", fields(notification_id = %record.id()))]
    async fn save(&self, record: &NotificationRecord) -> Result<(), InfraError> {
        let columns = RenderColumns::from(record.render_mode());

        sqlx::query(
            r#"
            INSERT INTO notifications (
                id, recipients, sender, subject,
                render_mode, body, is_html,
                connection_string, query_fragments, template_fragments,
                reminder_interval, last_notified_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO UPDATE SET
                recipients = EXCLUDED.recipients,
                sender = EXCLUDED.sender,
                subject = EXCLUDED.subject,
                render_mode = EXCLUDED.render_mode,
                body = EXCLUDED.body,
                is_html = EXCLUDED.is_html,
                connection_string = EXCLUDED.connection_string,
                query_fragments = EXCLUDED.query_fragments,
                template_fragments = EXCLUDED.template_fragments,
                reminder_interval = EXCLUDED.reminder_interval,
                last_notified_at = EXCLUDED.last_notified_at,
                updated_at = now()
            "#,
        )
        .bind(record.id().as_str())
        .bind(record.to())
        .bind(record.sender())
        .bind(record.subject())
        .bind(record.render_mode().name())
        .bind(columns.body)
        .bind(columns.is_html)
        .bind(columns.connection_string)
        .bind(columns.query_fragments)
        .bind(columns.template_fragments)
        .bind(record.interval().to_raw())
        .bind(record.last_notified_at())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use remindmail_domain::schedule::ReminderInterval;

    use super::*;

    fn static_row() -> NotificationRow {
        NotificationRow {
            id:                 "weekly-report".to_string(),
            recipients:         "a@example.com;b@example.com".to_string(),
            sender:             "noreply@example.com".to_string(),
            subject:            "週次レポート".to_string(),
            render_mode:        "static".to_string(),
            body:               Some("Hello".to_string()),
            is_html:            false,
            connection_string:  None,
            query_fragments:    vec![],
            template_fragments: vec![],
            reminder_interval:  "24h".to_string(),
            last_notified_at:   None,
        }
    }

    #[test]
    fn test_静的な行を通知レコードに変換できる() {
        let record = NotificationRecord::try_from(static_row()).unwrap();

        assert_eq!(record.id().as_str(), "weekly-report");
        assert_eq!(record.recipients(), vec!["a@example.com", "b@example.com"]);
        assert_eq!(
            record.render_mode(),
            &RenderMode::Static {
                body: Some("Hello".to_string()),
                html: false,
            }
        );
        assert_eq!(
            record.interval(),
            &IntervalSetting::Valid(ReminderInterval::hours(24).unwrap())
        );
    }

    #[test]
    fn test_動的な行は断片を宣言順のまま保持する() {
        let row = NotificationRow {
            render_mode: "dynamic".to_string(),
            body: None,
            connection_string: Some("postgres://localhost/reports".to_string()),
            query_fragments: vec!["SELECT 1".to_string(), "FROM T".to_string()],
            template_fragments: vec!["<table>{headers}{body}</table>".to_string()],
            ..static_row()
        };

        let record = NotificationRecord::try_from(row).unwrap();

        let RenderMode::Dynamic(source) = record.render_mode() else {
            panic!("dynamic であること");
        };
        assert_eq!(source.connection, "postgres://localhost/reports");
        assert_eq!(source.query_fragments, vec!["SELECT 1", "FROM T"]);
    }

    #[test]
    fn test_不正な間隔は読み込みを止めずmalformedとして保持する() {
        let row = NotificationRow {
            reminder_interval: "every day".to_string(),
            ..static_row()
        };

        let record = NotificationRecord::try_from(row).unwrap();

        assert_eq!(
            record.interval(),
            &IntervalSetting::Malformed {
                raw: "every day".to_string()
            }
        );
    }

    #[test]
    fn test_不明な本文生成方式はエラー() {
        let row = NotificationRow {
            render_mode: "markdown".to_string(),
            ..static_row()
        };

        assert!(NotificationRecord::try_from(row).is_err());
    }

    #[test]
    fn test_空のidはエラー() {
        let row = NotificationRow {
            id: "  ".to_string(),
            ..static_row()
        };

        assert!(NotificationRecord::try_from(row).is_err());
    }

    #[test]
    fn test_前後に空白を含むidはエラー() {
        let row = NotificationRow {
            id: " daily".to_string(),
            ..static_row()
        };

        assert!(NotificationRecord::try_from(row).is_err());
    }

    #[test]
    fn test_動的な本文生成方式はhtmlとして展開される() {
        let mode = RenderMode::Dynamic(DynamicSource {
            connection:         "postgres://localhost/reports".to_string(),
            query_fragments:    vec!["SELECT 1".to_string()],
            template_fragments: vec![],
        });

        let columns = RenderColumns::from(&mode);

        assert!(columns.is_html);
        assert_eq!(columns.body, None);
        assert_eq!(columns.connection_string, Some("postgres://localhost/reports"));
        assert_eq!(columns.query_fragments.len(), 1);
    }
}
