//! # テスト用モック
//!
//! 配信サイクルのテストで使用するインメモリ実装。
//! `test-utils` feature を有効にすることで、他クレートからも利用可能。
//!
//! ```toml
//! [dev-dependencies]
//! remindmail-infra = { workspace = true, features = ["test-utils"] }
//! ```

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use remindmail_domain::{
    notification::{AuditFields, EmailMessage, NotificationError, NotificationRecord},
    report::TabularResult,
};

use crate::{
    error::InfraError,
    notification::NotificationSender,
    repository::NotificationRepository,
    tabular::TabularSource,
};

// ===== MockNotificationRepository =====

/// インメモリの通知ストア
///
/// 読み込み・保存それぞれを失敗させるスイッチを持つ。
#[derive(Clone, Default)]
pub struct MockNotificationRepository {
    records:   Arc<Mutex<Vec<NotificationRecord>>>,
    saved:     Arc<Mutex<Vec<NotificationRecord>>>,
    fail_load: Arc<Mutex<bool>>,
    fail_save: Arc<Mutex<bool>>,
}

impl MockNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<NotificationRecord>) -> Self {
        let mock = Self::new();
        *mock.records.lock().unwrap() = records;
        mock
    }

    /// 運用中に通知が追加された状態を再現する
    pub fn add_record(&self, record: NotificationRecord) {
        self.records.lock().unwrap().push(record);
    }

    /// `load_all` をストア到達不能として失敗させる
    pub fn set_load_failure(&self, fail: bool) {
        *self.fail_load.lock().unwrap() = fail;
    }

    /// `save` を失敗させる
    pub fn set_save_failure(&self, fail: bool) {
        *self.fail_save.lock().unwrap() = fail;
    }

    /// 現在ストアにあるレコード
    pub fn records(&self) -> Vec<NotificationRecord> {
        self.records.lock().unwrap().clone()
    }

    /// `save` が成功した順のレコード
    pub fn saved(&self) -> Vec<NotificationRecord> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationRepository for MockNotificationRepository {
    async fn load_all(&self) -> Result<Vec<NotificationRecord>, InfraError> {
        if *self.fail_load.lock().unwrap() {
            return Err(InfraError::unexpected("通知ストアに接続できません"));
        }
        Ok(self.records.lock().unwrap().clone())
    }

    async fn save(&self, record: &NotificationRecord) -> Result<(), InfraError> {
        if *self.fail_save.lock().unwrap() {
            return Err(InfraError::unexpected("通知ストアに書き込めません"));
        }

        let mut records = self.records.lock().unwrap();
        match records.iter_mut().find(|r| r.id() == record.id()) {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }
        self.saved.lock().unwrap().push(record.clone());
        Ok(())
    }
}

// ===== MockNotificationSender =====

/// 送信を記録するだけの NotificationSender
///
/// 特定の宛先への送信を失敗させられる。
#[derive(Clone, Default)]
pub struct MockNotificationSender {
    sent:               Arc<Mutex<Vec<(EmailMessage, AuditFields)>>>,
    attempts:           Arc<Mutex<Vec<EmailMessage>>>,
    failing_recipients: Arc<Mutex<HashSet<String>>>,
}

impl MockNotificationSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定した宛先（`to` 全体で一致）への送信を失敗させる
    pub fn fail_for(&self, to: impl Into<String>) {
        self.failing_recipients.lock().unwrap().insert(to.into());
    }

    /// 送信に成功したメール
    pub fn sent_emails(&self) -> Vec<EmailMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(email, _)| email.clone())
            .collect()
    }

    /// 送信に成功したメールと監査フィールド
    pub fn sent_with_audit(&self) -> Vec<(EmailMessage, AuditFields)> {
        self.sent.lock().unwrap().clone()
    }

    /// 失敗を含むすべての送信試行
    pub fn attempts(&self) -> Vec<EmailMessage> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSender for MockNotificationSender {
    async fn send_email(
        &self,
        email: &EmailMessage,
        audit: &AuditFields,
    ) -> Result<(), NotificationError> {
        self.attempts.lock().unwrap().push(email.clone());

        if self.failing_recipients.lock().unwrap().contains(&email.to) {
            return Err(NotificationError::TransportFailure(format!(
                "宛先に送信できません: {}",
                email.to
            )));
        }

        self.sent
            .lock()
            .unwrap()
            .push((email.clone(), audit.clone()));
        Ok(())
    }
}

// ===== MockTabularSource =====

/// 固定の結果を返す TabularSource
///
/// 実行されたクエリを記録する。
#[derive(Clone, Default)]
pub struct MockTabularSource {
    result:  Arc<Mutex<TabularResult>>,
    fail:    Arc<Mutex<bool>>,
    queries: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockTabularSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(result: TabularResult) -> Self {
        let mock = Self::new();
        *mock.result.lock().unwrap() = result;
        mock
    }

    /// `fetch` を失敗させる
    pub fn set_failure(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    /// 実行された `(接続文字列, クエリ)` の一覧
    pub fn queries(&self) -> Vec<(String, String)> {
        self.queries.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }
}

#[async_trait]
impl TabularSource for MockTabularSource {
    async fn fetch(&self, connection: &str, query: &str) -> Result<TabularResult, InfraError> {
        self.queries
            .lock()
            .unwrap()
            .push((connection.to_string(), query.to_string()));

        if *self.fail.lock().unwrap() {
            return Err(InfraError::unexpected("データソースに接続できません"));
        }
        Ok(self.result.lock().unwrap().clone())
    }
}
