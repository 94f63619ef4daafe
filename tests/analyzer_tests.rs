//! Analysis pipeline against a mocked Gmail client

mod common;

use common::{create_test_message, create_unread_message, page, MockGmailClient};
use futures::StreamExt;
use gmail_newsletters::analyzer::{self, AnalysisEvent};
use gmail_newsletters::client::GmailClient;
use gmail_newsletters::config::AnalysisConfig;
use gmail_newsletters::error::GmailError;
use gmail_newsletters::models::Frequency;
use std::sync::Arc;

fn config(queries: &[&str]) -> AnalysisConfig {
    AnalysisConfig {
        queries: queries.iter().map(|q| q.to_string()).collect(),
        period_days: 30,
        page_size: 2,
        max_messages_per_query: 100,
        max_messages: 100,
        batch_size: 2,
        max_concurrent_requests: 4,
        min_emails: 2,
        recent_subjects: 3,
    }
}

fn mailbox_mock() -> MockGmailClient {
    let mut mock = MockGmailClient::new();

    mock.expect_list_messages().returning(|q| {
        match (q.query.as_deref(), q.page_token.as_deref()) {
            (Some("newsletter newer_than:30d"), None) => Ok(page(&["m1", "m2"], Some("p2"))),
            (Some("newsletter newer_than:30d"), Some("p2")) => Ok(page(&["m3"], None)),
            (Some("unsubscribe newer_than:30d"), None) => Ok(page(&["m2", "m4"], None)),
            other => panic!("unexpected list request: {:?}", other),
        }
    });

    mock.expect_get_metadata().returning(|id| {
        Ok(match id {
            "m1" => create_unread_message("m1", "digest@weekly.io", "Issue 1", 0),
            "m2" => create_unread_message("m2", "digest@weekly.io", "Issue 2", 7),
            "m3" => create_test_message("m3", "digest@weekly.io", "Issue 3"),
            _ => create_test_message(id, "once@rare.org", "Hello"),
        })
    });

    mock
}

#[tokio::test]
async fn test_analysis_event_sequence() {
    let client: Arc<dyn GmailClient> = Arc::new(mailbox_mock());
    let events: Vec<AnalysisEvent> = analyzer::analyze(client, config(&["newsletter", "unsubscribe"]))
        .collect()
        .await;

    assert!(matches!(&events[0], AnalysisEvent::Started { queries } if queries.len() == 2));
    assert_eq!(
        events[1],
        AnalysisEvent::QueryCompleted {
            query: "newsletter newer_than:30d".to_string(),
            found: 3,
            unique_total: 3,
        }
    );
    assert_eq!(
        events[2],
        AnalysisEvent::QueryCompleted {
            query: "unsubscribe newer_than:30d".to_string(),
            found: 2,
            unique_total: 4,
        }
    );

    let progress: Vec<(usize, usize)> = events
        .iter()
        .filter_map(|e| match e {
            AnalysisEvent::FetchProgress { fetched, total } => Some((*fetched, *total)),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![(2, 4), (4, 4)]);

    match events.last() {
        Some(AnalysisEvent::Complete {
            subscriptions,
            messages_scanned,
        }) => {
            assert_eq!(*messages_scanned, 4);
            // once@rare.org is below min_emails
            assert_eq!(subscriptions.len(), 1);
            let sub = &subscriptions[0];
            assert_eq!(sub.sender_email, "digest@weekly.io");
            assert_eq!(sub.total_emails, 3);
            assert_eq!(sub.frequency, Frequency::Occasional);
            assert!(sub.has_unsubscribe_link);
            assert_eq!(sub.recent_subjects[0], "Issue 2");
        }
        other => panic!("expected Complete, got {:?}", other),
    }
}

#[tokio::test]
async fn test_analysis_errors_when_every_query_fails() {
    let mut mock = MockGmailClient::new();
    mock.expect_list_messages()
        .times(2)
        .returning(|_| Err(GmailError::NetworkError("connection reset".to_string())));
    mock.expect_get_metadata().never();

    let client: Arc<dyn GmailClient> = Arc::new(mock);
    let events: Vec<AnalysisEvent> = analyzer::analyze(client, config(&["a", "b"])).collect().await;

    assert_eq!(events.len(), 4);
    assert!(matches!(events[1], AnalysisEvent::QueryFailed { .. }));
    assert!(matches!(events[2], AnalysisEvent::QueryFailed { .. }));
    assert_eq!(
        events[3],
        AnalysisEvent::Error {
            error: "All search queries failed".to_string()
        }
    );
}

#[tokio::test]
async fn test_analysis_survives_partial_failures() {
    let mut mock = MockGmailClient::new();
    mock.expect_list_messages().returning(|q| match q.query.as_deref() {
        Some("good newer_than:30d") => Ok(page(&["m1", "m2", "m3"], None)),
        _ => Err(GmailError::ApiError("Invalid query".to_string())),
    });
    mock.expect_get_metadata().returning(|id| match id {
        "m3" => Err(GmailError::NotFound("m3".to_string())),
        _ => Ok(create_test_message(id, "team@product.com", "Release notes")),
    });

    let client: Arc<dyn GmailClient> = Arc::new(mock);
    let subscriptions = analyzer::collect_analysis(client, config(&["bad", "good"]))
        .await
        .unwrap();

    assert_eq!(subscriptions.len(), 1);
    assert_eq!(subscriptions[0].total_emails, 2);
}

#[tokio::test]
async fn test_analysis_respects_message_caps() {
    let mut mock = MockGmailClient::new();
    mock.expect_list_messages()
        .returning(|_| Ok(page(&["m1", "m2", "m3", "m4", "m5"], None)));
    mock.expect_get_metadata()
        .times(3)
        .returning(|id| Ok(create_test_message(id, "deals@shop.com", "Sale")));

    let mut cfg = config(&["sale"]);
    cfg.max_messages_per_query = 4;
    cfg.max_messages = 3;

    let client: Arc<dyn GmailClient> = Arc::new(mock);
    let events: Vec<AnalysisEvent> = analyzer::analyze(client, cfg).collect().await;

    assert!(events.contains(&AnalysisEvent::QueryCompleted {
        query: "sale newer_than:30d".to_string(),
        found: 4,
        unique_total: 4,
    }));
    assert!(matches!(
        events.last(),
        Some(AnalysisEvent::Complete { messages_scanned: 3, .. })
    ));
}
