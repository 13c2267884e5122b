//! # remindmail Dispatcher エントリポイント
//!
//! 設定を読み込んで協調者を組み立て、停止シグナルを受けるまで配信ループを回す。
//!
//! ## 環境変数
//!
//! | 変数名 | 必須 | 説明 |
//! |--------|------|------|
//! | `DISPATCH_INTERVAL` | No | 配信サイクルの間隔（デフォルト: `60s`） |
//! | `NOTIFICATION_STORE` | No | `file` または `postgres`（デフォルト: `file`） |
//! | `DATABASE_URL` | store=postgres | 通知ストアの接続 URL |
//! | `NOTIFICATIONS_FILE` | No | ファイルストアのパス（デフォルト: `notifications.json`） |
//! | `RUN_MIGRATIONS` | No | 起動時にマイグレーションを適用する（デフォルト: `false`） |
//! | `INVALID_INTERVAL_POLICY` | No | 解釈できない間隔の扱い `always` / `never`（デフォルト: `never`） |
//! | `NOTIFICATION_BACKEND` | No | `smtp` または `noop`（デフォルト: `smtp`） |
//! | `SMTP_HOST` / `SMTP_PORT` / `SMTP_USE_TLS` | No | SMTP リレー（デフォルト: `localhost` / `25` / `false`） |
//! | `LOG_FORMAT` | No | `json` または `pretty` |
//! | `LOG_FILE` | No | 追加のログファイル出力先 |
//! | `RUST_LOG` | No | ログレベル（デフォルト: `info,remindmail=debug`） |

use std::sync::Arc;

use anyhow::Context as _;
use remindmail_dispatcher::{
    config::{DispatcherConfig, NotificationBackend, NotificationConfig, StoreConfig},
    runner::run_dispatch_loop,
    usecase::{DispatchCycle, DueScheduler, MessageRenderer},
};
use remindmail_domain::clock::SystemClock;
use remindmail_infra::{
    db,
    notification::{NoopNotificationSender, NotificationSender, SmtpNotificationSender},
    repository::{FileNotificationRepository, NotificationRepository, PostgresNotificationRepository},
    tabular::PostgresTabularSource,
};
use remindmail_shared::observability::{TracingConfig, init_tracing};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let _tracing_guard = init_tracing(TracingConfig::from_env("remindmail-dispatcher"));

    let config = DispatcherConfig::from_env().context("設定の読み込みに失敗しました")?;

    tracing::info!(
        interval = ?config.dispatch_interval,
        store = config.store.kind(),
        backend = %config.notification.backend,
        interval_policy = %config.interval_fallback,
        "配信サービスを起動します"
    );

    let store = build_store(&config.store).await?;
    let sender = build_sender(&config.notification)?;
    let renderer = MessageRenderer::new(Arc::new(PostgresTabularSource::new()));
    let scheduler = DueScheduler::new(Arc::new(SystemClock), config.interval_fallback);
    let cycle = DispatchCycle::new(store, renderer, sender, scheduler);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        if shutdown_tx.send(true).is_err() {
            tracing::debug!("配信ループは既に停止しています");
        }
    });

    run_dispatch_loop(&cycle, config.dispatch_interval, shutdown_rx).await;

    tracing::info!("配信サービスを停止しました");
    Ok(())
}

/// 設定に応じて通知ストアを組み立てる
async fn build_store(config: &StoreConfig) -> anyhow::Result<Arc<dyn NotificationRepository>> {
    match config {
        StoreConfig::File { path } => {
            tracing::info!(path = %path.display(), "ファイルの通知ストアを使用します");
            Ok(Arc::new(FileNotificationRepository::new(path)))
        }
        StoreConfig::Postgres {
            database_url,
            run_migrations,
        } => {
            let pool = db::create_pool(database_url)
                .await
                .context("データベース接続に失敗しました")?;
            tracing::info!("データベースに接続しました");

            if *run_migrations {
                db::run_migrations(&pool)
                    .await
                    .context("マイグレーションの適用に失敗しました")?;
                tracing::info!("マイグレーションを適用しました");
            }

            Ok(Arc::new(PostgresNotificationRepository::new(pool)))
        }
    }
}

/// 設定に応じて送信バックエンドを組み立てる
fn build_sender(config: &NotificationConfig) -> anyhow::Result<Arc<dyn NotificationSender>> {
    match config.backend {
        NotificationBackend::Smtp => {
            tracing::info!(
                host = %config.smtp_host,
                port = config.smtp_port,
                tls = config.smtp_use_tls,
                "SMTP でメールを送信します"
            );
            let sender =
                SmtpNotificationSender::new(&config.smtp_host, config.smtp_port, config.smtp_use_tls)
                    .context("SMTP 送信の初期化に失敗しました")?;
            Ok(Arc::new(sender))
        }
        NotificationBackend::Noop => {
            tracing::warn!("Noop: メールは送信せずログ出力のみ行います（最終送信日時は更新されます）");
            Ok(Arc::new(NoopNotificationSender))
        }
    }
}

/// Ctrl-C または SIGTERM を待つ
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl-C の監視に失敗しました");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM の監視に失敗しました");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Ctrl-C を受信しました。停止します"),
        () = terminate => tracing::info!("SIGTERM を受信しました。停止します"),
    }
}
