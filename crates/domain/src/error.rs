//! # ドメイン層エラー定義
//!
//! 値オブジェクトの生成時に検出される検証エラー。
//!
//! 配信サイクル全体のエラー分類は
//! [`NotificationError`](crate::notification::NotificationError) を参照。
//! 本モジュールのエラーは設定値の不備として
//! [`NotificationError::ConfigurationDefect`](crate::notification::NotificationError::ConfigurationDefect)
//! に変換される。
//!
//! ## 使用例
//!
//! ```rust
//! use remindmail_domain::DomainError;
//!
//! fn validate_subject(subject: &str) -> Result<(), DomainError> {
//!     if subject.is_empty() {
//!         return Err(DomainError::Validation("件名は必須です".to_string()));
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// ドメイン層で発生するエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// バリデーションエラー
    ///
    /// 設定値がドメインの不変条件に違反している場合に使用する。
    ///
    /// # 例
    ///
    /// - 通知 ID が空
    /// - リマインド間隔が負の値、または解釈できない書式
    #[error("バリデーションエラー: {0}")]
    Validation(String),
}
