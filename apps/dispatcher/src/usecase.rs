//! # ユースケース層
//!
//! 1 回の配信サイクルを構成する処理をまとめる。
//!
//! - [`DueScheduler`]: 送信期限に達した通知の判定
//! - [`MessageRenderer`]: 本文の生成
//! - [`DispatchCycle`]: 読み込み → 判定 → 生成 → 送信 → 保存

mod dispatch;
mod due;
mod render;

pub use dispatch::{CycleError, CycleReport, DispatchCycle, RecordOutcome, RecordReport, SkipReason};
pub use due::DueScheduler;
pub use render::{MessageRenderer, RenderError, RenderedBody};
