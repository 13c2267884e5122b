//! # Observability 基盤
//!
//! トレーシング初期化とログ出力形式の設定を提供する。
//! 環境変数 `LOG_FORMAT` による JSON / Pretty 出力の切り替えと、
//! `LOG_FILE` による追加のファイル出力に対応する。

use std::path::PathBuf;

/// ログ出力形式
///
/// 環境変数 `LOG_FORMAT` で切り替える。
/// 値が未設定または不正な場合は [`Pretty`](LogFormat::Pretty) にフォールバックする。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// JSON 形式（本番環境向け）
    Json,
    /// 人間が読みやすい形式（開発環境向け）
    #[default]
    Pretty,
}

impl LogFormat {
    /// 文字列からログ形式をパースする
    ///
    /// 不正な値の場合は [`Pretty`](LogFormat::Pretty) にフォールバックし、
    /// stderr に警告を出力する（トレーシング初期化前のため `tracing` は使えない）。
    pub fn parse(s: &str) -> Self {
        match s {
            "json" => Self::Json,
            "pretty" => Self::Pretty,
            other => {
                eprintln!("WARNING: unknown LOG_FORMAT={other:?}, falling back to pretty");
                Self::Pretty
            }
        }
    }

    /// 環境変数 `LOG_FORMAT` から読み取る
    pub fn from_env() -> Self {
        match std::env::var("LOG_FORMAT") {
            Ok(val) => Self::parse(&val),
            Err(_) => Self::default(),
        }
    }
}

/// トレーシング初期化設定
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// サービス名（起動ログとルートスパンに出力）
    pub service_name: String,
    /// コンソールのログ出力形式
    pub log_format:   LogFormat,
    /// 追加で書き出すログファイル（ANSI エスケープなし）
    pub log_file:     Option<PathBuf>,
}

impl TracingConfig {
    /// 新しい設定を作成する
    pub fn new(service_name: impl Into<String>, log_format: LogFormat) -> Self {
        Self {
            service_name: service_name.into(),
            log_format,
            log_file: None,
        }
    }

    /// ログファイルの出力先を設定する
    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    /// 環境変数から設定を読み取る
    ///
    /// `LOG_FORMAT` で出力形式、`LOG_FILE` でファイル出力先を決定する。
    /// `LOG_FILE` が空文字列の場合はファイル出力しない。
    pub fn from_env(service_name: impl Into<String>) -> Self {
        let config = Self::new(service_name, LogFormat::from_env());
        match std::env::var("LOG_FILE") {
            Ok(path) if !path.trim().is_empty() => config.with_log_file(path.trim()),
            _ => config,
        }
    }
}

/// ファイル出力のバックグラウンドスレッドを保持するガード
///
/// ドロップ時に未書き込みのログをフラッシュする。`main` の終わりまで保持すること。
#[must_use = "ドロップするとファイルへのログ出力が止まる"]
pub struct TracingGuard {
    #[cfg(feature = "observability")]
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// トレーシングを初期化する
///
/// `RUST_LOG` 環境変数でログレベルを制御可能。
/// 未設定の場合は `"info,remindmail=debug"` をデフォルトとする。
///
/// JSON モードでは以下のフィールドがトップレベルに出力される:
/// - `timestamp`, `level`, `target`, `message`
///
/// ログファイルを開けない場合は stderr に警告を出し、コンソール出力のみで続行する。
#[cfg(feature = "observability")]
pub fn init_tracing(config: TracingConfig) -> TracingGuard {
    use tracing_subscriber::{Layer as _, layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,remindmail=debug".into());

    let fmt_layer = match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_target(true)
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer().boxed(),
    };

    let (file_writer, file_guard) = match config.log_file.as_deref().map(open_log_file) {
        Some(Ok((writer, guard))) => (Some(writer), Some(guard)),
        Some(Err(e)) => {
            eprintln!("WARNING: cannot open LOG_FILE ({e}), logging to console only");
            (None, None)
        }
        None => (None, None),
    };
    let file_layer = file_writer.map(|writer| {
        tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(file_layer)
        .with(tracing_error::ErrorLayer::default())
        .init();

    tracing::info!(service = %config.service_name, "トレーシングを初期化しました");

    TracingGuard {
        _file_guard: file_guard,
    }
}

/// 追記モードのログファイルを開き、ノンブロッキングライターを返す
#[cfg(feature = "observability")]
fn open_log_file(
    path: &std::path::Path,
) -> Result<
    (
        tracing_appender::non_blocking::NonBlocking,
        tracing_appender::non_blocking::WorkerGuard,
    ),
    tracing_appender::rolling::InitError,
> {
    use tracing_appender::rolling::{RollingFileAppender, Rotation};

    let directory = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "remindmail.log".to_string());

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(directory)?;

    Ok(tracing_appender::non_blocking(appender))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    // ===== LogFormat::parse テスト =====

    #[test]
    fn test_parse_jsonでjsonを返す() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
    }

    #[test]
    fn test_parse_不正な値でprettyにフォールバックする() {
        assert_eq!(LogFormat::parse("unknown"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse(""), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Pretty);
    }

    // ===== TracingConfig テスト =====

    #[test]
    fn test_newはファイル出力なしで作成される() {
        let config = TracingConfig::new("dispatcher", LogFormat::Json);

        assert_eq!(config.service_name, "dispatcher");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.log_file, None);
    }

    #[test]
    fn test_with_log_fileで出力先を設定できる() {
        let config =
            TracingConfig::new("dispatcher", LogFormat::Pretty).with_log_file("logs/dispatch.log");

        assert_eq!(config.log_file, Some(PathBuf::from("logs/dispatch.log")));
    }
}
