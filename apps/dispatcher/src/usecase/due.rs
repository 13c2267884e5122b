//! # 送信期限の判定
//!
//! 時計とリマインド間隔から、通知を今回のサイクルで送るかを決める。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use remindmail_domain::{
    clock::Clock,
    notification::NotificationRecord,
    schedule::{self, IntervalFallback, IntervalSetting},
};

/// 送信期限判定
///
/// 解釈できないリマインド間隔は [`IntervalFallback`] に従って扱い、警告ログを出す。
/// 一度も送信していない通知は間隔の設定に関係なく送信期限内とする。
pub struct DueScheduler {
    clock:    Arc<dyn Clock>,
    fallback: IntervalFallback,
}

impl DueScheduler {
    pub fn new(clock: Arc<dyn Clock>, fallback: IntervalFallback) -> Self {
        Self { clock, fallback }
    }

    /// 現在時刻
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// 現在時刻で送信期限に達しているか
    pub fn is_due(&self, record: &NotificationRecord) -> bool {
        self.is_due_at(record, self.now())
    }

    /// 指定した時刻で送信期限に達しているか
    pub fn is_due_at(&self, record: &NotificationRecord, now: DateTime<Utc>) -> bool {
        let Some(last_notified_at) = record.last_notified_at() else {
            return true;
        };

        match record.interval() {
            IntervalSetting::Valid(interval) => {
                schedule::is_due(Some(last_notified_at), *interval, now)
            }
            IntervalSetting::Malformed { raw } => {
                let due = self.fallback.is_due();
                tracing::warn!(
                    notification_id = %record.id(),
                    interval = %raw,
                    policy = %self.fallback,
                    due,
                    "リマインド間隔を解釈できません"
                );
                due
            }
        }
    }

    /// 送信期限に達した通知だけを残す
    pub fn filter(&self, records: Vec<NotificationRecord>) -> Vec<NotificationRecord> {
        let now = self.now();
        records
            .into_iter()
            .filter(|record| self.is_due_at(record, now))
            .collect()
    }
}
