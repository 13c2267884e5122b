//! # 本文の生成
//!
//! 通知レコードの本文生成方式に応じてメール本文を作る。
//!
//! ## 設計方針
//!
//! - **静的**: 保存済みの本文をそのまま返す。データソースには触れない
//! - **動的**: クエリ断片とテンプレート断片を組み立て、クエリ結果を HTML テーブルとして差し込む
//! - **データソースの失敗は空本文**: 接続失敗や 0 件はエラーにせず空文字列を返し、
//!   呼び出し側で [`NotificationError::EmptyBody`] として送信をスキップする

use std::sync::Arc;

use remindmail_domain::{
    notification::{DynamicSource, NotificationError, NotificationId, NotificationRecord, RenderMode},
    report::{assemble_fragments, render_table},
};
use remindmail_infra::{InfraError, tabular::TabularSource};

/// 生成済みの本文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedBody {
    pub body:    String,
    pub is_html: bool,
}

/// 本文生成の失敗
///
/// `error` は常に [`NotificationError::EmptyBody`]。
/// 空になった原因がデータソースの失敗かどうかを `source_failed` で区別する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderError {
    pub error:         NotificationError,
    pub source_failed: bool,
}

/// 本文生成
pub struct MessageRenderer {
    source: Arc<dyn TabularSource>,
}

impl MessageRenderer {
    pub fn new(source: Arc<dyn TabularSource>) -> Self {
        Self { source }
    }

    /// 本文を生成する
    ///
    /// 空白だけの本文は [`NotificationError::EmptyBody`] を返す。
    pub async fn render(&self, record: &NotificationRecord) -> Result<RenderedBody, RenderError> {
        let (body, source_failed) = match self.produce(record).await {
            Ok(body) => (body, false),
            Err(_) => (String::new(), true),
        };
        if body.trim().is_empty() {
            return Err(RenderError {
                error: NotificationError::EmptyBody {
                    notification_id: record.id().to_string(),
                },
                source_failed,
            });
        }

        Ok(RenderedBody {
            body,
            is_html: record.render_mode().is_html(),
        })
    }

    /// 本文を生成する（空の場合も空文字列で返す）
    pub async fn render_body(&self, record: &NotificationRecord) -> String {
        self.produce(record).await.unwrap_or_default()
    }

    async fn produce(&self, record: &NotificationRecord) -> Result<String, InfraError> {
        match record.render_mode() {
            RenderMode::Static { body, .. } => Ok(body.clone().unwrap_or_default()),
            RenderMode::Dynamic(source) => self.render_dynamic(record.id(), source).await,
        }
    }

    #[tracing::instrument(skip_all, level = "debug", fields(notification_id = %id))]
    async fn render_dynamic(
        &self,
        id: &NotificationId,
        source: &DynamicSource,
    ) -> Result<String, InfraError> {
        let query = assemble_fragments(&source.query_fragments);

        let result = self
            .source
            .fetch(&source.connection, &query)
            .await
            .inspect_err(|e| {
                tracing::warn!(
                    error = %e,
                    "データソースからの取得に失敗したため本文を空にします"
                );
            })?;

        if result.is_empty() {
            tracing::debug!("クエリ結果が 0 件のため本文を空にします");
            return Ok(String::new());
        }

        let template = assemble_fragments(&source.template_fragments);
        Ok(render_table(&template, &result))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use remindmail_domain::{
        notification::NewNotificationRecord,
        report::TabularResult,
        schedule::ReminderInterval,
    };
    use remindmail_infra::mock::MockTabularSource;

    use super::*;

    fn make_record(render_mode: RenderMode) -> NotificationRecord {
        NotificationRecord::new(NewNotificationRecord {
            id: NotificationId::new("report").unwrap(),
            to: "a@example.com".to_string(),
            from: "s@example.com".to_string(),
            subject: "件名".to_string(),
            render_mode,
            interval: ReminderInterval::hours(24).unwrap().into(),
            last_notified_at: None,
        })
    }

    fn dynamic_mode() -> RenderMode {
        RenderMode::Dynamic(DynamicSource {
            connection:         "postgres://localhost/reports".to_string(),
            query_fragments:    vec!["SELECT 1".to_string(), "FROM T".to_string()],
            template_fragments: vec![
                "</table>".to_string(),
                "<table><tr>{headers}</tr>{body}".to_string(),
            ],
        })
    }

    fn one_row() -> TabularResult {
        TabularResult::new(vec!["n".to_string()], vec![vec!["1".to_string()]])
    }

    #[tokio::test]
    async fn 静的な本文はそのまま返しデータソースを呼ばない() {
        let source = MockTabularSource::with_result(one_row());
        let sut = MessageRenderer::new(Arc::new(source.clone()));
        let record = make_record(RenderMode::Static {
            body: Some("Hello".to_string()),
            html: false,
        });

        let rendered = sut.render(&record).await.unwrap();

        assert_eq!(
            rendered,
            RenderedBody {
                body:    "Hello".to_string(),
                is_html: false,
            }
        );
        assert_eq!(source.call_count(), 0);
    }

    #[tokio::test]
    async fn 静的な本文がなければempty_body() {
        let sut = MessageRenderer::new(Arc::new(MockTabularSource::new()));
        let record = make_record(RenderMode::Static {
            body: None,
            html: true,
        });

        let err = sut.render(&record).await.unwrap_err();

        assert_eq!(
            err,
            RenderError {
                error:         NotificationError::EmptyBody {
                    notification_id: "report".to_string()
                },
                source_failed: false,
            }
        );
    }

    #[tokio::test]
    async fn 動的な本文はクエリを逆順に組み立てて実行する() {
        let source = MockTabularSource::with_result(one_row());
        let sut = MessageRenderer::new(Arc::new(source.clone()));

        sut.render(&make_record(dynamic_mode())).await.unwrap();

        assert_eq!(
            source.queries(),
            vec![(
                "postgres://localhost/reports".to_string(),
                "FROM T\nSELECT 1\n".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn 動的な本文はテンプレートも逆順に組み立てて差し込む() {
        let sut = MessageRenderer::new(Arc::new(MockTabularSource::with_result(one_row())));

        let rendered = sut.render(&make_record(dynamic_mode())).await.unwrap();

        assert_eq!(
            rendered.body,
            "<table><tr><th style='text-align:left'>n</th>\n</tr><tr>\n<td>1</td>\n</tr>\n\n</table>\n"
        );
        assert!(rendered.is_html);
    }

    #[tokio::test]
    async fn 結果が0件なら空文字列を返しエラーにしない() {
        let sut = MessageRenderer::new(Arc::new(MockTabularSource::new()));

        let record = make_record(dynamic_mode());

        assert_eq!(sut.render_body(&record).await, "");
        let err = sut.render(&record).await.unwrap_err();
        assert!(!err.source_failed);
    }

    #[tokio::test]
    async fn データソースの失敗は空文字列になる() {
        let source = MockTabularSource::with_result(one_row());
        source.set_failure(true);
        let sut = MessageRenderer::new(Arc::new(source));
        let record = make_record(dynamic_mode());

        assert_eq!(sut.render_body(&record).await, "");
        let err = sut.render(&record).await.unwrap_err();
        assert!(matches!(err.error, NotificationError::EmptyBody { .. }));
        assert!(err.source_failed);
    }
}
