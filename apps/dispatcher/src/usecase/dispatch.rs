//! # 配信サイクル
//!
//! 1 回のトリガーで全通知を読み込み、送信期限に達したものを送信する。
//!
//! ## 設計方針
//!
//! - **通知単位の失敗分離**: 本文生成・送信・保存の失敗はその通知の中で閉じ、
//!   ログを出して次の通知に進む。サイクルを止めるのは通知ストアの読み込み失敗のみ
//! - **送信成功後にのみ状態を更新**: 送信に失敗した通知の最終送信日時は変えない
//! - **少なくとも 1 回の配信**: 送信後の保存に失敗しても送信は取り消せないため、
//!   次のサイクルで再送されうる
//! - **通知の間でのみ中断**: 停止要求は通知の処理の合間で確認し、処理中の通知は最後まで行う

use std::sync::Arc;

use remindmail_domain::notification::{
    DispatchLogEntry,
    EmailMessage,
    NotificationError,
    NotificationId,
    NotificationRecord,
};
use remindmail_infra::{notification::NotificationSender, repository::NotificationRepository};
use remindmail_shared::{
    event_log::{error::category as error_category, event},
    log_business_event,
};
use strum::IntoStaticStr;
use thiserror::Error;
use tokio::sync::watch;

use super::{DueScheduler, MessageRenderer, RenderError};

/// 通知をスキップした理由
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum SkipReason {
    /// 送信期限に達していない
    NotDue,
    /// 宛先が空
    MissingRecipient,
    /// 送信元が空
    MissingSender,
    /// 停止要求により処理しなかった
    Cancelled,
}

/// 1 件の通知の処理結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Skipped(SkipReason),
    /// 本文が空、または生成に失敗した
    RenderFailed,
    /// 送信トランスポートが失敗した
    SendFailed,
    /// 送信した。`saved` は最終送信日時の保存に成功したか
    Sent { saved: bool },
}

/// 通知ごとの処理結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordReport {
    pub notification_id: NotificationId,
    pub outcome:         RecordOutcome,
}

/// 1 回の配信サイクルの結果
///
/// 読み込んだ通知の順に 1 件ずつ結果を持つ。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub records: Vec<RecordReport>,
}

impl CycleReport {
    /// 送信した件数
    pub fn sent(&self) -> usize {
        self.count(|outcome| matches!(outcome, RecordOutcome::Sent { .. }))
    }

    /// 本文生成または送信に失敗した件数
    pub fn failed(&self) -> usize {
        self.count(|outcome| {
            matches!(
                outcome,
                RecordOutcome::RenderFailed | RecordOutcome::SendFailed
            )
        })
    }

    /// スキップした件数
    pub fn skipped(&self) -> usize {
        self.count(|outcome| matches!(outcome, RecordOutcome::Skipped(_)))
    }

    /// 指定した通知の処理結果
    pub fn outcome_of(&self, id: &str) -> Option<RecordOutcome> {
        self.records
            .iter()
            .find(|report| report.notification_id.as_str() == id)
            .map(|report| report.outcome)
    }

    fn count(&self, predicate: impl Fn(&RecordOutcome) -> bool) -> usize {
        self.records
            .iter()
            .filter(|report| predicate(&report.outcome))
            .count()
    }
}

/// 配信サイクルを中断するエラー
#[derive(Debug, Error)]
pub enum CycleError {
    /// 通知ストアを読み込めなかった（送信は 1 件も行わない）
    #[error(transparent)]
    StoreUnavailable(NotificationError),
}

/// 配信サイクル
///
/// 協調者（通知ストア・本文生成・送信・送信期限判定）は起動時に 1 度だけ組み立て、
/// サイクルをまたいで使い回す。
pub struct DispatchCycle {
    store:     Arc<dyn NotificationRepository>,
    renderer:  MessageRenderer,
    sender:    Arc<dyn NotificationSender>,
    scheduler: DueScheduler,
}

impl DispatchCycle {
    pub fn new(
        store: Arc<dyn NotificationRepository>,
        renderer: MessageRenderer,
        sender: Arc<dyn NotificationSender>,
        scheduler: DueScheduler,
    ) -> Self {
        Self {
            store,
            renderer,
            sender,
            scheduler,
        }
    }

    /// 配信サイクルを 1 回実行する
    pub async fn run_one_cycle(&self) -> Result<CycleReport, CycleError> {
        self.run(None).await
    }

    /// 停止要求を監視しながら配信サイクルを 1 回実行する
    ///
    /// `shutdown` が `true` になると、残りの通知は [`SkipReason::Cancelled`] になる。
    pub async fn run_one_cycle_until(
        &self,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<CycleReport, CycleError> {
        self.run(Some(shutdown)).await
    }

    #[tracing::instrument(skip_all, name = "dispatch_cycle")]
    async fn run(
        &self,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> Result<CycleReport, CycleError> {
        let records = match self.store.load_all().await {
            Ok(records) => records,
            Err(e) => {
                let error = NotificationError::from(e);
                log_business_event!(
                    event.category = event::category::DISPATCH,
                    event.action = event::action::CYCLE_ABORTED,
                    event.entity_type = event::entity_type::DISPATCH_CYCLE,
                    event.result = event::result::FAILURE,
                    error.category = error_category::INFRASTRUCTURE,
                    error.kind = error.kind(),
                    error = %error,
                    "通知ストアを読み込めないため配信サイクルを中断"
                );
                return Err(CycleError::StoreUnavailable(error));
            }
        };

        tracing::debug!(count = records.len(), "通知を読み込みました");

        let mut report = CycleReport::default();
        for record in records {
            let cancelled = shutdown.is_some_and(|rx| *rx.borrow());
            let notification_id = record.id().clone();
            let outcome = if cancelled {
                RecordOutcome::Skipped(SkipReason::Cancelled)
            } else {
                self.dispatch_record(record).await
            };
            report.records.push(RecordReport {
                notification_id,
                outcome,
            });
        }

        log_business_event!(
            event.category = event::category::DISPATCH,
            event.action = event::action::CYCLE_COMPLETED,
            event.entity_type = event::entity_type::DISPATCH_CYCLE,
            event.result = event::result::SUCCESS,
            dispatch.loaded = report.records.len(),
            dispatch.sent = report.sent(),
            dispatch.failed = report.failed(),
            dispatch.skipped = report.skipped(),
            "配信サイクル完了"
        );

        Ok(report)
    }

    /// 1 件の通知を処理する
    ///
    /// 失敗はすべてログに出して [`RecordOutcome`] で返し、呼び出し側には伝播しない。
    #[tracing::instrument(skip_all, fields(notification_id = %record.id()))]
    async fn dispatch_record(&self, record: NotificationRecord) -> RecordOutcome {
        let now = self.scheduler.now();
        if !self.scheduler.is_due_at(&record, now) {
            tracing::debug!("送信期限に達していないためスキップ");
            return RecordOutcome::Skipped(SkipReason::NotDue);
        }

        if !record.has_recipient() {
            log_skipped(&record, SkipReason::MissingRecipient);
            return RecordOutcome::Skipped(SkipReason::MissingRecipient);
        }
        if !record.has_sender() {
            log_skipped(&record, SkipReason::MissingSender);
            return RecordOutcome::Skipped(SkipReason::MissingSender);
        }

        let rendered = match self.renderer.render(&record).await {
            Ok(rendered) => rendered,
            Err(e) => {
                log_failed(&record, &e.error, render_failure_category(&e));
                return RecordOutcome::RenderFailed;
            }
        };

        let email = EmailMessage {
            to:      record.to().to_string(),
            from:    record.sender().to_string(),
            subject: record.subject().to_string(),
            body:    rendered.body,
            is_html: rendered.is_html,
        };
        let entry = DispatchLogEntry::new(&record, now);

        if let Err(e) = self.sender.send_email(&email, &entry.audit_fields()).await {
            log_failed(&record, &e, error_category::EXTERNAL_SERVICE);
            return RecordOutcome::SendFailed;
        }

        let updated = record.mark_notified(entry.sent_at);
        let saved = match self.store.save(&updated).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    error.category = error_category::INFRASTRUCTURE,
                    error = %e,
                    notification.recipient = %entry.recipient,
                    notification.subject = %entry.subject,
                    "送信済みだが最終送信日時を保存できませんでした（次のサイクルで再送されうる）"
                );
                false
            }
        };

        log_business_event!(
            event.category = event::category::NOTIFICATION,
            event.action = event::action::NOTIFICATION_SENT,
            event.entity_type = event::entity_type::NOTIFICATION,
            event.entity_id = %entry.notification_id,
            event.result = event::result::SUCCESS,
            notification.recipient = %entry.recipient,
            notification.subject = %entry.subject,
            notification.sent_at = %entry.sent_at,
            notification.saved = saved,
            "通知メール送信成功"
        );

        RecordOutcome::Sent { saved }
    }
}

/// 本文生成の失敗をログに出すときのエラーカテゴリ
fn render_failure_category(error: &RenderError) -> &'static str {
    if error.source_failed {
        error_category::INFRASTRUCTURE
    } else {
        error_category::CONFIGURATION
    }
}

fn log_skipped(record: &NotificationRecord, reason: SkipReason) {
    let reason: &'static str = reason.into();
    log_business_event!(
        event.category = event::category::NOTIFICATION,
        event.action = event::action::NOTIFICATION_SKIPPED,
        event.entity_type = event::entity_type::NOTIFICATION,
        event.entity_id = %record.id(),
        event.result = event::result::SKIPPED,
        event.reason = reason,
        notification.recipient = %record.to(),
        notification.subject = %record.subject(),
        "宛先または送信元が空のため通知をスキップ"
    );
}

fn log_failed(record: &NotificationRecord, error: &NotificationError, category: &'static str) {
    log_business_event!(
        event.category = event::category::NOTIFICATION,
        event.action = event::action::NOTIFICATION_FAILED,
        event.entity_type = event::entity_type::NOTIFICATION,
        event.entity_id = %record.id(),
        event.result = event::result::FAILURE,
        error.category = category,
        error.kind = error.kind(),
        error = %error,
        notification.recipient = %record.to(),
        notification.subject = %record.subject(),
        "通知メール送信失敗"
    );
}
