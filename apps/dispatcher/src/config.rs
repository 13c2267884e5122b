//! # Dispatcher 設定
//!
//! 環境変数から配信サービスの設定を読み込む。
//!
//! 起動時に 1 回だけ読み込み、不正な値は [`ConfigError`] として起動を止める。
//! 省略可能な値にはデフォルトを用意し、環境変数なしではファイルストア + `localhost:25` の
//! SMTP リレーで動く。Noop 送信は `NOTIFICATION_BACKEND=noop` を明示した場合だけ使う。

use std::{env, path::PathBuf, str::FromStr, time::Duration};

use remindmail_domain::schedule::{IntervalFallback, ReminderInterval};
use thiserror::Error;

const DEFAULT_DISPATCH_INTERVAL: &str = "60s";
const DEFAULT_NOTIFICATIONS_FILE: &str = "notifications.json";

/// 設定エラー
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} が設定されていません")]
    Missing { name: &'static str },

    #[error("{name} の値が不正です ({value:?}): {reason}")]
    Invalid {
        name:   &'static str,
        value:  String,
        reason: String,
    },
}

/// 配信サービスの設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// 配信サイクルの間隔
    pub dispatch_interval: Duration,
    /// 通知ストア
    pub store:             StoreConfig,
    /// 解釈できないリマインド間隔の扱い
    pub interval_fallback: IntervalFallback,
    /// 送信設定
    pub notification:      NotificationConfig,
}

/// 通知ストアの設定
///
/// `NOTIFICATION_STORE` 環境変数で切り替える:
/// - `file`: JSON ファイル（デフォルト）
/// - `postgres`: PostgreSQL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    File {
        path: PathBuf,
    },
    Postgres {
        database_url:   String,
        run_migrations: bool,
    },
}

impl StoreConfig {
    /// ログ出力用の種別名
    pub fn kind(&self) -> &'static str {
        match self {
            Self::File { .. } => "file",
            Self::Postgres { .. } => "postgres",
        }
    }
}

/// 送信バックエンド
///
/// Noop も送信成功として扱われ最終送信日時が進むため、デフォルトは SMTP。
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum NotificationBackend {
    /// SMTP リレー経由で送信（デフォルト）
    Smtp,
    /// 送信しない（ログ出力のみ、明示的な指定が必要）
    Noop,
}

/// 送信の設定
///
/// `NOTIFICATION_BACKEND` 環境変数で送信バックエンドを切り替える。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationConfig {
    pub backend:      NotificationBackend,
    /// SMTP ホスト（backend=smtp の場合に使用）
    pub smtp_host:    String,
    /// SMTP ポート（backend=smtp の場合に使用）
    pub smtp_port:    u16,
    /// STARTTLS を使うか（backend=smtp の場合に使用）
    pub smtp_use_tls: bool,
}

impl DispatcherConfig {
    /// 環境変数から設定を読み込む
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// 任意の参照関数から設定を読み込む
    ///
    /// 空文字列の値は未設定として扱う。
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &'static str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let raw_interval =
            var("DISPATCH_INTERVAL").unwrap_or_else(|| DEFAULT_DISPATCH_INTERVAL.to_string());
        let dispatch_interval = parse_dispatch_interval(&raw_interval)?;

        let store = match var("NOTIFICATION_STORE").as_deref().unwrap_or("file") {
            "file" => StoreConfig::File {
                path: var("NOTIFICATIONS_FILE")
                    .unwrap_or_else(|| DEFAULT_NOTIFICATIONS_FILE.to_string())
                    .into(),
            },
            "postgres" => StoreConfig::Postgres {
                database_url:   var("DATABASE_URL").ok_or(ConfigError::Missing {
                    name: "DATABASE_URL",
                })?,
                run_migrations: parse_or("RUN_MIGRATIONS", var("RUN_MIGRATIONS"), false, parse_bool)?,
            },
            other => {
                return Err(ConfigError::Invalid {
                    name:   "NOTIFICATION_STORE",
                    value:  other.to_string(),
                    reason: "file または postgres を指定してください".to_string(),
                });
            }
        };

        let interval_fallback = parse_or(
            "INVALID_INTERVAL_POLICY",
            var("INVALID_INTERVAL_POLICY"),
            IntervalFallback::default(),
            |raw| IntervalFallback::from_str(raw).map_err(|e| e.to_string()),
        )?;

        let notification = NotificationConfig {
            backend:      parse_or(
                "NOTIFICATION_BACKEND",
                var("NOTIFICATION_BACKEND"),
                NotificationBackend::Smtp,
                |raw| NotificationBackend::from_str(raw).map_err(|e| e.to_string()),
            )?,
            smtp_host:    var("SMTP_HOST").unwrap_or_else(|| "localhost".to_string()),
            smtp_port:    parse_or("SMTP_PORT", var("SMTP_PORT"), 25, |raw| {
                raw.parse::<u16>().map_err(|e| e.to_string())
            })?,
            smtp_use_tls: parse_or("SMTP_USE_TLS", var("SMTP_USE_TLS"), false, parse_bool)?,
        };

        Ok(Self {
            dispatch_interval,
            store,
            interval_fallback,
            notification,
        })
    }
}

/// 値があればパースし、なければデフォルトを返す
fn parse_or<T>(
    name: &'static str,
    value: Option<String>,
    default: T,
    parse: impl FnOnce(&str) -> Result<T, String>,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(raw) => parse(&raw).map_err(move |reason| ConfigError::Invalid {
            name,
            value: raw,
            reason,
        }),
    }
}

fn parse_bool(raw: &str) -> Result<bool, String> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err("true または false を指定してください".to_string()),
    }
}

/// 配信間隔をパースする（0 は不可）
fn parse_dispatch_interval(raw: &str) -> Result<Duration, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        name: "DISPATCH_INTERVAL",
        value: raw.to_string(),
        reason,
    };

    let interval = ReminderInterval::parse(raw).map_err(|e| invalid(e.to_string()))?;
    if interval.is_zero() {
        return Err(invalid("0 より大きい間隔を指定してください".to_string()));
    }
    interval
        .as_duration()
        .to_std()
        .map_err(|e| invalid(e.to_string()))
}
