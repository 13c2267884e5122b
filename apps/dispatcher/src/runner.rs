//! # 配信ループ
//!
//! 一定間隔で配信サイクルを起動する。
//!
//! - 起動直後に 1 回目のサイクルを実行する
//! - サイクルは順番に await するため、前のサイクルが終わるまで次は始まらない
//! - サイクルが間隔より長引いた場合、取りこぼしたティックはまとめて実行せずスキップする
//! - 停止要求を受けたらティック待ちをやめ、実行中のサイクルは通知の合間で止める

use std::time::Duration;

use tokio::{sync::watch, time::MissedTickBehavior};

use crate::usecase::DispatchCycle;

/// 停止要求まで配信サイクルを繰り返す
///
/// 戻り値は実行したサイクルの回数。
pub async fn run_dispatch_loop(
    cycle: &DispatchCycle,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> usize {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(period = ?period, "配信ループを開始します");

    let mut cycles = 0;
    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            _ = ticker.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        cycles += 1;
        match cycle.run_one_cycle_until(&shutdown).await {
            Ok(report) => tracing::debug!(
                cycle = cycles,
                sent = report.sent(),
                failed = report.failed(),
                skipped = report.skipped(),
                "配信サイクルが終了しました"
            ),
            Err(e) => tracing::error!(
                cycle = cycles,
                error = %e,
                "配信サイクルを中断しました。次のティックで再試行します"
            ),
        }
    }

    tracing::info!(cycles, "配信ループを停止しました");
    cycles
}
