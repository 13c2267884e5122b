//! # FileNotificationRepository
//!
//! JSON ファイルを通知ストアとして使うリポジトリ。
//! データベースを用意しない単体運用や開発環境向け。
//!
//! ## ファイル形式
//!
//! 通知ドキュメントの JSON 配列。
//!
//! ```json
//! [
//!   {
//!     "id": "weekly-report",
//!     "to": "team@example.com",
//!     "from": "noreply@example.com",
//!     "subject": "週次レポート",
//!     "render": { "mode": "static", "body": "Hello", "html": false },
//!     "interval": "24h",
//!     "last_notified_at": null
//!   }
//! ]
//! ```
//!
//! ## 設計方針
//!
//! - **ファイルなしは空**: ファイルが存在しない場合は通知 0 件として扱う
//! - **アトミックな書き込み**: 一時ファイルに書いてから rename する
//! - **読み込めないドキュメントも保持**: ID が不正なドキュメントは読み込み時にスキップするが、
//!   保存時はファイル上にそのまま残す
//! - **ID は一意**: 前後の空白を除いた ID が重複する場合は先頭のドキュメントだけを読み込む。
//!   `save` が更新するのも先頭のドキュメントなので、後続の重複が未送信のまま毎回送られることはない

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use remindmail_domain::{
    DomainError,
    notification::{NewNotificationRecord, NotificationId, NotificationRecord, RenderMode},
    schedule::IntervalSetting,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::NotificationRepository;
use crate::error::InfraError;

/// ファイル上の通知ドキュメント
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct NotificationDocument {
    id:               String,
    #[serde(default)]
    to:               String,
    #[serde(default)]
    from:             String,
    #[serde(default)]
    subject:          String,
    render:           RenderMode,
    interval:         IntervalSetting,
    #[serde(default)]
    last_notified_at: Option<DateTime<Utc>>,
}

impl From<&NotificationRecord> for NotificationDocument {
    fn from(record: &NotificationRecord) -> Self {
        Self {
            id:               record.id().as_str().to_string(),
            to:               record.to().to_string(),
            from:             record.sender().to_string(),
            subject:          record.subject().to_string(),
            render:           record.render_mode().clone(),
            interval:         record.interval().clone(),
            last_notified_at: record.last_notified_at(),
        }
    }
}

impl TryFrom<NotificationDocument> for NotificationRecord {
    type Error = DomainError;

    fn try_from(document: NotificationDocument) -> Result<Self, Self::Error> {
        Ok(NotificationRecord::new(NewNotificationRecord {
            id:               NotificationId::new(document.id)?,
            to:               document.to,
            from:             document.from,
            subject:          document.subject,
            render_mode:      document.render,
            interval:         document.interval,
            last_notified_at: document.last_notified_at,
        }))
    }
}

/// JSON ファイル実装の NotificationRepository
#[derive(Debug)]
pub struct FileNotificationRepository {
    path:       PathBuf,
    /// 読み込み→書き込みの間に別の保存が割り込まないようにする
    write_lock: Mutex<()>,
}

impl FileNotificationRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path:       path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_documents(&self) -> Result<Vec<NotificationDocument>, InfraError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn write_documents(&self, documents: &[NotificationDocument]) -> Result<(), InfraError> {
        let mut json = serde_json::to_vec_pretty(documents)?;
        json.push(b'\n');

        let tmp_path = self.temp_path();
        tokio::fs::write(&tmp_path, &json).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "notifications.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl NotificationRepository for FileNotificationRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(path = %self.path.display()))]
    async fn load_all(&self) -> Result<Vec<NotificationRecord>, InfraError> {
        let documents = self.read_documents().await?;

        let mut seen = HashSet::new();
        let records = documents
            .into_iter()
            .filter_map(|document| {
                let id = document.id.clone();
                NotificationRecord::try_from(document)
                    .inspect_err(|e| {
                        tracing::warn!(
                            notification_id = %id,
                            error = %e,
                            "通知ドキュメントを読み込めないためスキップします"
                        );
                    })
                    .ok()
            })
            .filter(|record| {
                let first = seen.insert(record.id().clone());
                if !first {
                    tracing::warn!(
                        notification_id = %record.id(),
                        "ID が重複する通知ドキュメントをスキップします"
                    );
                }
                first
            })
            .collect();

        Ok(records)
    }

    #[tracing::instrument(skip_all, level = "debug", fields(notification_id = %record.id()))]
    async fn save(&self, record: &NotificationRecord) -> Result<(), InfraError> {
        let _guard = self.write_lock.lock().await;

        let mut documents = self.read_documents().await?;
        let document = NotificationDocument::from(record);

        match documents.iter_mut().find(|d| d.id.trim() == document.id) {
            Some(existing) => *existing = document,
            None => documents.push(document),
        }

        self.write_documents(&documents).await
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use remindmail_domain::schedule::ReminderInterval;

    use super::*;
    use crate::error::InfraErrorKind;

    fn make_record(id: &str) -> NotificationRecord {
        NotificationRecord::new(NewNotificationRecord {
            id:               NotificationId::new(id).unwrap(),
            to:               "team@example.com".to_string(),
            from:             "noreply@example.com".to_string(),
            subject:          "週次レポート".to_string(),
            render_mode:      RenderMode::Static {
                body: Some("Hello".to_string()),
                html: false,
            },
            interval:         ReminderInterval::hours(24).unwrap().into(),
            last_notified_at: None,
        })
    }

    #[tokio::test]
    async fn test_ファイルがなければ空を返す() {
        let dir = tempfile::tempdir().unwrap();
        let sut = FileNotificationRepository::new(dir.path().join("missing.json"));

        let records = sut.load_all().await.unwrap();

        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_壊れたjsonはシリアライズエラー() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notifications.json");
        std::fs::write(&path, "[{ not json").unwrap();
        let sut = FileNotificationRepository::new(&path);

        let err = sut.load_all().await.unwrap_err();

        assert!(matches!(err.kind(), InfraErrorKind::Serialization(_)));
    }

    #[tokio::test]
    async fn test_保存したレコードを読み込める() {
        let dir = tempfile::tempdir().unwrap();
        let sut = FileNotificationRepository::new(dir.path().join("notifications.json"));
        let now = DateTime::parse_from_rfc3339("2026-03-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let record = make_record("weekly-report").mark_notified(now);

        sut.save(&record).await.unwrap();
        let loaded = sut.load_all().await.unwrap();

        assert_eq!(loaded, vec![record]);
    }

    #[tokio::test]
    async fn test_同じidの保存は置き換えになる() {
        let dir = tempfile::tempdir().unwrap();
        let sut = FileNotificationRepository::new(dir.path().join("notifications.json"));
        sut.save(&make_record("a")).await.unwrap();
        sut.save(&make_record("b")).await.unwrap();

        let updated = make_record("a").mark_notified(Utc::now());
        sut.save(&updated).await.unwrap();

        let loaded = sut.load_all().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0], updated);
        assert_eq!(loaded[1].id().as_str(), "b");
    }

    #[tokio::test]
    async fn test_idが不正なドキュメントはスキップされ保存時も残る() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notifications.json");
        std::fs::write(
            &path,
            r#"[
                {"id": "", "render": {"mode": "static"}, "interval": "1h"},
                {"id": "ok", "to": "a@example.com", "from": "s@example.com",
                 "render": {"mode": "static", "body": "x"}, "interval": "1h"}
            ]"#,
        )
        .unwrap();
        let sut = FileNotificationRepository::new(&path);

        let loaded = sut.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id().as_str(), "ok");

        sut.save(&loaded[0].clone().mark_notified(Utc::now()))
            .await
            .unwrap();
        let raw: Vec<serde_json::Value> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw.len(), 2);
    }

    #[tokio::test]
    async fn test_idが重複するドキュメントは先頭だけを読み込む() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notifications.json");
        std::fs::write(
            &path,
            r#"[
                {"id": "daily", "to": "first@example.com", "render": {"mode": "static", "body": "x"}, "interval": "24h"},
                {"id": " daily", "to": "second@example.com", "render": {"mode": "static", "body": "y"}, "interval": "24h"}
            ]"#,
        )
        .unwrap();
        let sut = FileNotificationRepository::new(&path);

        let loaded = sut.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].to(), "first@example.com");

        // 保存後も読み込まれるのは送信済みになった先頭のドキュメント
        let now = Utc::now();
        sut.save(&loaded[0].clone().mark_notified(now)).await.unwrap();
        let reloaded = sut.load_all().await.unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded[0].last_notified_at(), Some(now));
    }

    #[tokio::test]
    async fn test_書き込み後に一時ファイルが残らない() {
        let dir = tempfile::tempdir().unwrap();
        let sut = FileNotificationRepository::new(dir.path().join("notifications.json"));

        sut.save(&make_record("a")).await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("notifications.json")]);
    }
}
