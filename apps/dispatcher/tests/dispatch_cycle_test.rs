//! DispatchCycle 統合テスト
//!
//! インメモリのモック（通知ストア・送信・データソース）と手動で進める時計を使い、
//! 複数サイクルにまたがる配信の振る舞いを検証する。
//!
//! 実行方法:
//! ```bash
//! cargo test -p remindmail-dispatcher --test dispatch_cycle_test
//! ```

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use pretty_assertions::assert_eq;
use remindmail_dispatcher::usecase::{
    CycleError,
    DispatchCycle,
    DueScheduler,
    MessageRenderer,
    RecordOutcome,
    SkipReason,
};
use remindmail_domain::{
    clock::ManualClock,
    notification::{
        DynamicSource,
        NewNotificationRecord,
        NotificationError,
        NotificationId,
        NotificationRecord,
        RenderMode,
    },
    report::TabularResult,
    schedule::{IntervalFallback, ReminderInterval},
};
use remindmail_infra::{
    mock::{MockNotificationRepository, MockNotificationSender, MockTabularSource},
    repository::{FileNotificationRepository, NotificationRepository},
};
use tokio_test::assert_ok;

fn start() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-02T08:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn static_record(id: &str, to: &str) -> NotificationRecord {
    NotificationRecord::new(NewNotificationRecord {
        id:               NotificationId::new(id).unwrap(),
        to:               to.to_string(),
        from:             "reminder@example.com".to_string(),
        subject:          format!("{id} のリマインド"),
        render_mode:      RenderMode::Static {
            body: Some("Hello".to_string()),
            html: false,
        },
        interval:         ReminderInterval::hours(24).unwrap().into(),
        last_notified_at: None,
    })
}

fn dynamic_record(id: &str) -> NotificationRecord {
    NotificationRecord::new(NewNotificationRecord {
        id:               NotificationId::new(id).unwrap(),
        to:               "ops@example.com".to_string(),
        from:             "reports@example.com".to_string(),
        subject:          "未処理チケット".to_string(),
        render_mode:      RenderMode::Dynamic(DynamicSource {
            connection:         "postgres://localhost/tickets".to_string(),
            query_fragments:    vec!["SELECT 1".to_string(), "FROM T".to_string()],
            template_fragments: vec!["<table><tr>{headers}</tr>{body}</table>".to_string()],
        }),
        interval:         ReminderInterval::zero().into(),
        last_notified_at: None,
    })
}

struct Fixture {
    store:  MockNotificationRepository,
    sender: MockNotificationSender,
    source: MockTabularSource,
    clock:  Arc<ManualClock>,
    cycle:  DispatchCycle,
}

impl Fixture {
    fn new(records: Vec<NotificationRecord>, source: MockTabularSource) -> Self {
        let store = MockNotificationRepository::with_records(records);
        let sender = MockNotificationSender::new();
        let clock = Arc::new(ManualClock::new(start()));
        let cycle = DispatchCycle::new(
            Arc::new(store.clone()),
            MessageRenderer::new(Arc::new(source.clone())),
            Arc::new(sender.clone()),
            DueScheduler::new(clock.clone(), IntervalFallback::NeverDue),
        );
        Self {
            store,
            sender,
            source,
            clock,
            cycle,
        }
    }
}

#[tokio::test]
async fn 前回送信から30時間経過した24時間間隔の通知を送信し最終送信日時を更新する() {
    let record = static_record("daily", "team@example.com").mark_notified(start() - Duration::hours(30));
    let fx = Fixture::new(vec![record], MockTabularSource::new());

    let report = fx.cycle.run_one_cycle().await.unwrap();

    assert_eq!(report.outcome_of("daily"), Some(RecordOutcome::Sent { saved: true }));
    let sent = fx.sender.sent_emails();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "team@example.com");
    assert_eq!(sent[0].body, "Hello");
    assert_eq!(fx.store.records()[0].last_notified_at(), Some(start()));

    // 送信直後は期限外
    fx.clock.advance(Duration::minutes(1));
    let report = fx.cycle.run_one_cycle().await.unwrap();
    assert_eq!(report.outcome_of("daily"), Some(RecordOutcome::Skipped(SkipReason::NotDue)));
    assert_eq!(fx.sender.attempts().len(), 1);

    // 間隔が経過すると再送する
    fx.clock.advance(Duration::hours(24));
    let report = fx.cycle.run_one_cycle().await.unwrap();
    assert_eq!(report.sent(), 1);
    assert_eq!(fx.sender.sent_emails().len(), 2);
}

#[tokio::test]
async fn サイクルの間に追加された通知は次のサイクルで送信する() {
    let fx = Fixture::new(
        vec![static_record("daily", "team@example.com")],
        MockTabularSource::new(),
    );
    fx.cycle.run_one_cycle().await.unwrap();

    fx.store.add_record(static_record("weekly", "ops@example.com"));
    fx.clock.advance(Duration::minutes(1));
    let report = fx.cycle.run_one_cycle().await.unwrap();

    assert_eq!(report.outcome_of("daily"), Some(RecordOutcome::Skipped(SkipReason::NotDue)));
    assert_eq!(report.outcome_of("weekly"), Some(RecordOutcome::Sent { saved: true }));
    let recipients: Vec<String> = fx.sender.sent_emails().into_iter().map(|e| e.to).collect();
    assert_eq!(recipients, vec!["team@example.com", "ops@example.com"]);
}

#[tokio::test]
async fn 三件目の送信が失敗しても四件目以降を処理し成功分だけ保存する() {
    let records: Vec<_> = (1..=5)
        .map(|n| static_record(&format!("n{n}"), &format!("user{n}@example.com")))
        .collect();
    let fx = Fixture::new(records, MockTabularSource::new());
    fx.sender.fail_for("user3@example.com");

    let report = fx.cycle.run_one_cycle().await.unwrap();

    assert_eq!(fx.sender.attempts().len(), 5);
    assert_eq!(report.sent(), 4);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.outcome_of("n3"), Some(RecordOutcome::SendFailed));

    let saved: Vec<String> = fx.store.saved().iter().map(|r| r.id().to_string()).collect();
    assert_eq!(saved, vec!["n1", "n2", "n4", "n5"]);

    let failed = fx
        .store
        .records()
        .into_iter()
        .find(|r| r.id().as_str() == "n3")
        .unwrap();
    assert_eq!(failed.last_notified_at(), None);
}

#[tokio::test]
async fn 通知ストアを読み込めないサイクルは送信せず次のサイクルは通常どおり動く() {
    let fx = Fixture::new(
        vec![static_record("daily", "team@example.com")],
        MockTabularSource::new(),
    );
    fx.store.set_load_failure(true);

    let err = fx.cycle.run_one_cycle().await.unwrap_err();

    assert!(matches!(
        err,
        CycleError::StoreUnavailable(NotificationError::StoreUnavailable(_))
    ));
    assert!(fx.sender.attempts().is_empty());

    fx.store.set_load_failure(false);
    let report = fx.cycle.run_one_cycle().await.unwrap();

    assert_eq!(report.sent(), 1);
}

#[tokio::test]
async fn 動的な本文は逆順に組み立てたクエリの結果からhtmlテーブルを生成する() {
    let source = MockTabularSource::with_result(TabularResult::new(
        vec!["id".to_string(), "title".to_string()],
        vec![
            vec!["1".to_string(), "ログイン不可".to_string()],
            vec!["2".to_string(), "請求書の誤り".to_string()],
            vec!["3".to_string(), "パスワード再発行".to_string()],
        ],
    ));
    let fx = Fixture::new(vec![dynamic_record("tickets")], source);

    let report = fx.cycle.run_one_cycle().await.unwrap();

    assert_eq!(report.sent(), 1);
    assert_eq!(
        fx.source.queries(),
        vec![(
            "postgres://localhost/tickets".to_string(),
            "FROM T\nSELECT 1\n".to_string()
        )]
    );

    let email = &fx.sender.sent_emails()[0];
    assert!(email.is_html);
    assert_eq!(email.body.matches("<th style='text-align:left'>").count(), 2);
    assert_eq!(email.body.matches("<tr>\n").count(), 3);
    assert!(!email.body.contains("{headers}"));
    assert!(!email.body.contains("{body}"));
    let first = email.body.find("ログイン不可").unwrap();
    let last = email.body.find("パスワード再発行").unwrap();
    assert!(first < last);
}

#[tokio::test]
async fn 動的な本文の結果が0件なら送信せずエラーも伝播しない() {
    let fx = Fixture::new(vec![dynamic_record("tickets")], MockTabularSource::new());

    let report = fx.cycle.run_one_cycle().await.unwrap();

    assert_eq!(report.outcome_of("tickets"), Some(RecordOutcome::RenderFailed));
    assert!(fx.sender.attempts().is_empty());
    assert!(fx.store.saved().is_empty());
}

#[tokio::test]
async fn 静的な本文の通知はデータソースを呼ばない() {
    let fx = Fixture::new(
        vec![static_record("daily", "team@example.com")],
        MockTabularSource::with_result(TabularResult::new(
            vec!["n".to_string()],
            vec![vec!["1".to_string()]],
        )),
    );

    fx.cycle.run_one_cycle().await.unwrap();

    assert_eq!(fx.source.call_count(), 0);
}

#[tokio::test]
async fn ファイルストアと組み合わせて送信結果が永続化される() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notifications.json");
    let store = Arc::new(FileNotificationRepository::new(&path));
    assert_ok!(store.save(&static_record("daily", "team@example.com")).await);

    let sender = MockNotificationSender::new();
    let clock = Arc::new(ManualClock::new(start()));
    let cycle = DispatchCycle::new(
        store.clone(),
        MessageRenderer::new(Arc::new(MockTabularSource::new())),
        Arc::new(sender.clone()),
        DueScheduler::new(clock, IntervalFallback::NeverDue),
    );

    let report = cycle.run_one_cycle().await.unwrap();

    assert_eq!(report.outcome_of("daily"), Some(RecordOutcome::Sent { saved: true }));
    let reloaded = store.load_all().await.unwrap();
    assert_eq!(reloaded[0].last_notified_at(), Some(start()));
}

#[tokio::test]
async fn 同じidのドキュメントが重複していても間隔内に再送しない() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notifications.json");
    std::fs::write(
        &path,
        r#"[
            {"id": "daily", "to": "team@example.com", "from": "reminder@example.com",
             "render": {"mode": "static", "body": "Hello"}, "interval": "24h"},
            {"id": "daily", "to": "team@example.com", "from": "reminder@example.com",
             "render": {"mode": "static", "body": "Hello"}, "interval": "24h"}
        ]"#,
    )
    .unwrap();
    let store = Arc::new(FileNotificationRepository::new(&path));
    let sender = MockNotificationSender::new();
    let clock = Arc::new(ManualClock::new(start()));
    let cycle = DispatchCycle::new(
        store,
        MessageRenderer::new(Arc::new(MockTabularSource::new())),
        Arc::new(sender.clone()),
        DueScheduler::new(clock.clone(), IntervalFallback::NeverDue),
    );

    for _ in 0..3 {
        cycle.run_one_cycle().await.unwrap();
        clock.advance(Duration::minutes(1));
    }

    assert_eq!(sender.sent_emails().len(), 1);
}
