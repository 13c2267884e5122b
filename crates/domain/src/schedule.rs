//! # リマインド間隔と送信期限判定
//!
//! 通知ごとに設定されるリマインド間隔と、「前回送信からの経過時間が
//! 間隔以上か」を判定する純粋関数を定義する。
//!
//! ## 設計方針
//!
//! - **副作用なし**: [`is_due`] は現在時刻を引数で受け取り、I/O を行わない
//! - **不正値の保持**: ストアから読んだ間隔が解釈できない場合も読み込みは失敗させず、
//!   [`IntervalSetting::Malformed`] として元の文字列を保持する。
//!   どう扱うかは [`IntervalFallback`] に従って配信側で決める
//!
//! ## 間隔の書式
//!
//! | 書式 | 意味 |
//! |------|------|
//! | `90s` | 90 秒 |
//! | `30m` | 30 分 |
//! | `24h` | 24 時間 |
//! | `7d` | 7 日 |
//! | `24` | 単位なしは時間として扱う |

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::DomainError;

/// リマインド間隔（値オブジェクト）
///
/// # 不変条件
///
/// - 0 以上の長さを持つ
/// - 秒単位（1 秒未満の端数を持たない）。文字列表現と相互に変換できる範囲に限る
/// - 0 は「毎サイクル送信」を意味する
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReminderInterval(Duration);

impl ReminderInterval {
    /// 毎サイクル送信する間隔（0）
    pub fn zero() -> Self {
        Self(Duration::zero())
    }

    /// `Duration` から作成する
    pub fn from_duration(duration: Duration) -> Result<Self, DomainError> {
        if duration < Duration::zero() {
            return Err(DomainError::Validation(format!(
                "リマインド間隔は 0 以上である必要があります: {duration}"
            )));
        }
        if duration.subsec_nanos() != 0 {
            return Err(DomainError::Validation(format!(
                "リマインド間隔は秒単位である必要があります: {duration}"
            )));
        }
        Ok(Self(duration))
    }

    pub fn hours(hours: i64) -> Result<Self, DomainError> {
        Duration::try_hours(hours)
            .ok_or_else(|| DomainError::Validation(format!("リマインド間隔が大きすぎます: {hours}h")))
            .and_then(Self::from_duration)
    }

    /// 設定文字列からパースする
    ///
    /// ```rust
    /// use chrono::Duration;
    /// use remindmail_domain::schedule::ReminderInterval;
    ///
    /// assert_eq!(ReminderInterval::parse("30m").unwrap().as_duration(), Duration::minutes(30));
    /// assert_eq!(ReminderInterval::parse("24").unwrap().as_duration(), Duration::hours(24));
    /// assert!(ReminderInterval::parse("-1h").is_err());
    /// ```
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let value = raw.trim();
        let invalid = || DomainError::Validation(format!("リマインド間隔を解釈できません: {raw:?}"));

        let (number, unit) = match value.char_indices().last() {
            None => return Err(invalid()),
            Some((idx, c)) if c.is_ascii_alphabetic() => (&value[..idx], Some(c)),
            Some(_) => (value, None),
        };

        let amount: i64 = number.trim().parse().map_err(|_| invalid())?;
        if amount < 0 {
            return Err(DomainError::Validation(format!(
                "リマインド間隔は 0 以上である必要があります: {raw:?}"
            )));
        }

        let duration = match unit.map(|c| c.to_ascii_lowercase()) {
            Some('s') => Duration::try_seconds(amount),
            Some('m') => Duration::try_minutes(amount),
            Some('h') | None => Duration::try_hours(amount),
            Some('d') => Duration::try_days(amount),
            Some(_) => return Err(invalid()),
        }
        .ok_or_else(invalid)?;

        Self::from_duration(duration)
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl fmt::Display for ReminderInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0.num_seconds();
        match secs {
            0 => write!(f, "0s"),
            s if s % 86_400 == 0 => write!(f, "{}d", s / 86_400),
            s if s % 3_600 == 0 => write!(f, "{}h", s / 3_600),
            s if s % 60 == 0 => write!(f, "{}m", s / 60),
            s => write!(f, "{s}s"),
        }
    }
}

/// ストアから読み込んだリマインド間隔の設定値
///
/// 解釈できない値は読み込みを止めずに `Malformed` として保持し、
/// 元の文字列のまま書き戻す。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum IntervalSetting {
    /// 正常にパースできた間隔
    Valid(ReminderInterval),
    /// パースできなかった設定値
    Malformed { raw: String },
}

impl IntervalSetting {
    /// 設定文字列から作成する（失敗時は `Malformed`）
    pub fn from_raw(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        match ReminderInterval::parse(&raw) {
            Ok(interval) => Self::Valid(interval),
            Err(_) => Self::Malformed { raw },
        }
    }

    /// 永続化用の文字列表現
    pub fn to_raw(&self) -> String {
        match self {
            Self::Valid(interval) => interval.to_string(),
            Self::Malformed { raw } => raw.clone(),
        }
    }
}

impl From<ReminderInterval> for IntervalSetting {
    fn from(interval: ReminderInterval) -> Self {
        Self::Valid(interval)
    }
}

impl From<String> for IntervalSetting {
    fn from(raw: String) -> Self {
        Self::from_raw(raw)
    }
}

impl From<IntervalSetting> for String {
    fn from(setting: IntervalSetting) -> Self {
        setting.to_raw()
    }
}

/// 解釈できない間隔を持つ通知の扱い
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum IntervalFallback {
    /// 毎サイクル送信する
    #[strum(serialize = "always")]
    AlwaysDue,
    /// 設定が直るまで送信しない
    #[default]
    #[strum(serialize = "never")]
    NeverDue,
}

impl IntervalFallback {
    pub fn is_due(self) -> bool {
        matches!(self, Self::AlwaysDue)
    }
}

/// 送信期限に達しているかを判定する
///
/// - 一度も送信していない（`last_notified_at` が `None`）場合は常に `true`
/// - 間隔 0 は常に `true`（毎サイクル送信）
/// - それ以外は `now - last_notified_at >= interval` のとき `true`
pub fn is_due(
    last_notified_at: Option<DateTime<Utc>>,
    interval: ReminderInterval,
    now: DateTime<Utc>,
) -> bool {
    match last_notified_at {
        None => true,
        Some(_) if interval.is_zero() => true,
        Some(last) => now - last >= interval.as_duration(),
    }
}
