//! Spam marking and restoring against a mocked Gmail client

mod common;

use common::{create_full_message, fast_bulk_config, page, MockGmailClient};
use futures::StreamExt;
use gmail_newsletters::bulk::{self, BulkEvent};
use gmail_newsletters::client::GmailClient;
use gmail_newsletters::error::GmailError;
use gmail_newsletters::models::{FilterSpec, SenderRef};
use mockall::Sequence;
use std::sync::Arc;

fn has(labels: &[String], label: &str) -> bool {
    labels.iter().any(|l| l == label)
}

fn sender(email: &str, total: usize) -> SenderRef {
    SenderRef {
        sender: String::new(),
        sender_email: email.to_string(),
        total_emails: total,
    }
}

#[tokio::test]
async fn test_mark_spam_moves_messages_and_creates_filter() {
    let mut mock = MockGmailClient::new();
    mock.expect_list_messages()
        .withf(|q| q.query.as_deref() == Some("from:digest@weekly.io") && q.include_spam_trash)
        .times(1)
        .returning(|_| Ok(page(&["m1", "m2", "m3"], None)));
    mock.expect_batch_modify()
        .withf(|ids, add, remove| {
            ids.len() == 3 && has(add, "SPAM") && has(remove, "INBOX") && has(remove, "UNREAD")
        })
        .times(1)
        .returning(|ids, _, _| Ok(ids.len()));
    mock.expect_get_full().times(3).returning(|id| {
        Ok(create_full_message(
            id,
            &[
                ("Subject", "[Weekly] Issue"),
                ("List-Unsubscribe", "<https://weekly.io/u>"),
            ],
            "Read online",
        ))
    });
    mock.expect_create_filter()
        .withf(|f| f.from.as_deref() == Some("digest@weekly.io") && f.adds("SPAM"))
        .times(1)
        .returning(|_| Ok("filter-1".to_string()));

    let report = bulk::mark_spam(&mock, &fast_bulk_config(), "digest@weekly.io", "Weekly", 0)
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.total_found, 3);
    assert_eq!(report.marked_as_spam, 3);
    assert!(report.filter_created);
    assert!(report.newsletter_patterns.has_list_unsubscribe);
    assert!(report.newsletter_patterns.is_newsletter);
    assert!(report.summary.contains("filter was created"));
}

#[tokio::test]
async fn test_mark_spam_without_messages_is_not_found() {
    let mut mock = MockGmailClient::new();
    mock.expect_list_messages().returning(|_| Ok(page(&[], None)));
    mock.expect_batch_modify().never();
    mock.expect_create_filter().never();

    let err = bulk::mark_spam(&mock, &fast_bulk_config(), "nobody@none.com", "Nobody", 0)
        .await
        .unwrap_err();
    assert!(matches!(err, GmailError::NotFound(_)));
}

#[tokio::test]
async fn test_mark_spam_reports_filter_failure() {
    let mut mock = MockGmailClient::new();
    mock.expect_list_messages().returning(|_| Ok(page(&["m1"], None)));
    mock.expect_batch_modify().returning(|ids, _, _| Ok(ids.len()));
    mock.expect_get_full()
        .returning(|id| Ok(create_full_message(id, &[("Subject", "Hi")], "")));
    mock.expect_create_filter()
        .returning(|_| Err(GmailError::FilterError("Filter already exists".to_string())));

    let report = bulk::mark_spam(&mock, &fast_bulk_config(), "a@b.com", "A", 0)
        .await
        .unwrap();
    assert!(!report.filter_created);
    assert_eq!(report.summary, "1 newsletters marked as spam.");
}

#[tokio::test]
async fn test_collect_stops_at_expected_total() {
    let mut mock = MockGmailClient::new();
    let mut seq = Sequence::new();
    mock.expect_list_messages()
        .times(1)
        .in_sequence(&mut seq)
        .withf(|q| q.page_token.is_none())
        .returning(|_| Ok(page(&["m1", "m2"], Some("p2"))));
    mock.expect_list_messages()
        .times(1)
        .in_sequence(&mut seq)
        .withf(|q| q.page_token.as_deref() == Some("p2"))
        .returning(|_| Ok(page(&["m3", "m4"], Some("p3"))));

    let query = gmail_newsletters::models::ListQuery::new("from:a@b.com", 2);
    let collected = bulk::collect_messages(&mock, &fast_bulk_config(), query, 3, 50).await;

    assert_eq!(collected.ids.len(), 4);
    assert_eq!(collected.pages, 2);
    assert!(collected.error.is_none());
}

#[tokio::test]
async fn test_collect_respects_page_cap() {
    let mut mock = MockGmailClient::new();
    mock.expect_list_messages()
        .times(3)
        .returning(|_| Ok(page(&["x"], Some("more"))));

    let query = gmail_newsletters::models::ListQuery::new("from:a@b.com", 1);
    let collected = bulk::collect_messages(&mock, &fast_bulk_config(), query, 0, 3).await;
    assert_eq!(collected.pages, 3);
}

#[tokio::test]
async fn test_unmark_spam_falls_back_to_search_operators() {
    let mut mock = MockGmailClient::new();
    mock.expect_list_messages()
        .withf(|q| !q.label_ids.is_empty())
        .times(1)
        .returning(|_| Err(GmailError::BadRequest("Invalid label: SPAM".to_string())));
    mock.expect_list_messages()
        .withf(|q| q.label_ids.is_empty() && q.query.as_deref() == Some("from:deals@shop.com in:spam"))
        .times(1)
        .returning(|_| Ok(page(&["s1", "s2"], None)));
    mock.expect_batch_modify()
        .withf(|_, add, remove| has(add, "INBOX") && has(remove, "SPAM"))
        .times(1)
        .returning(|ids, _, _| Ok(ids.len()));
    mock.expect_batch_modify()
        .withf(|_, add, remove| has(add, "UNREAD") && remove.is_empty())
        .times(1)
        .returning(|ids, _, _| Ok(ids.len()));
    mock.expect_list_filters().returning(|| {
        Ok(vec![
            FilterSpec {
                id: Some("f-spam".to_string()),
                ..FilterSpec::from_sender("deals@shop.com", "SPAM")
            },
            FilterSpec {
                id: Some("f-other".to_string()),
                ..FilterSpec::from_sender("friend@mail.com", "SPAM")
            },
        ])
    });
    mock.expect_delete_filter()
        .withf(|id| id == "f-spam")
        .times(1)
        .returning(|_| Ok(()));

    let report = bulk::unmark_spam(&mock, &fast_bulk_config(), "deals@shop.com", "Shop")
        .await
        .unwrap();

    assert_eq!(report.total_found, 2);
    assert_eq!(report.restored_to_inbox, 2);
    assert_eq!(report.success_rate, 100);
    assert_eq!(report.filters_removed, 1);
    assert_eq!(report.pages, 1);
}

#[tokio::test]
async fn test_unmark_spam_with_empty_spam_folder() {
    let mut mock = MockGmailClient::new();
    mock.expect_list_messages().returning(|_| Ok(page(&[], None)));
    mock.expect_batch_modify().never();

    let report = bulk::unmark_spam(&mock, &fast_bulk_config(), "quiet@list.org", "Quiet")
        .await
        .unwrap();
    assert!(report.success);
    assert_eq!(report.total_found, 0);
    assert_eq!(report.summary, "No spam messages found from Quiet.");
}

#[tokio::test]
async fn test_mark_all_spam_stream() {
    let mut mock = MockGmailClient::new();
    mock.expect_list_messages().returning(|q| match q.query.as_deref() {
        Some("from:broken@fail.com") => Err(GmailError::ServerError {
            status: 500,
            message: "backend".to_string(),
        }),
        _ => Ok(page(&["a1", "a2"], None)),
    });
    mock.expect_batch_modify().returning(|ids, _, _| Ok(ids.len()));
    mock.expect_create_filter()
        .times(1)
        .returning(|_| Ok("filter".to_string()));

    let client: Arc<dyn GmailClient> = Arc::new(mock);
    let events: Vec<BulkEvent> = bulk::mark_all_spam(
        client,
        fast_bulk_config(),
        vec![sender("broken@fail.com", 5), sender("ok@news.com", 2)],
    )
    .collect()
    .await;

    assert!(matches!(
        events[0],
        BulkEvent::Start {
            total_newsletters: 2,
            ..
        }
    ));
    assert!(matches!(events[1], BulkEvent::Processing { current: 1, .. }));
    assert!(
        matches!(&events[2], BulkEvent::ErrorNewsletter { newsletter, .. } if newsletter == "broken@fail.com")
    );
    assert!(matches!(events[3], BulkEvent::Processing { current: 2, .. }));
    assert!(matches!(
        events[4],
        BulkEvent::Marked {
            total_marked: 2,
            marked_in_newsletter: 2,
            ..
        }
    ));

    let complete = serde_json::to_value(events.last().unwrap()).unwrap();
    assert_eq!(complete["type"], "complete");
    assert_eq!(complete["totalMarked"], 2);
    assert_eq!(complete["totalFiltersCreated"], 1);
    assert_eq!(complete["processedNewsletters"][0]["email"], "ok@news.com");
    assert_eq!(complete["processedNewsletters"][0]["marked"], 2);
}

#[tokio::test]
async fn test_unmark_all_spam_reports_batch_failure() {
    let mut mock = MockGmailClient::new();
    mock.expect_list_messages().returning(|_| Ok(page(&["s1"], None)));
    mock.expect_batch_modify()
        .returning(|_, _, _| Err(GmailError::Forbidden("insufficient scope".to_string())));
    mock.expect_list_filters().never();

    let client: Arc<dyn GmailClient> = Arc::new(mock);
    let events: Vec<BulkEvent> =
        bulk::unmark_all_spam(client, fast_bulk_config(), vec![sender("x@y.com", 1)])
            .collect()
            .await;

    let error = serde_json::to_value(&events[2]).unwrap();
    assert_eq!(error["type"], "error_newsletter");
    assert_eq!(error["newsletter"], "x@y.com");

    match events.last() {
        Some(BulkEvent::RestoreComplete {
            total_restored,
            processed_newsletters,
            ..
        }) => {
            assert_eq!(*total_restored, 0);
            assert!(processed_newsletters.is_empty());
        }
        other => panic!("expected completion, got {:?}", other),
    }
}

#[tokio::test]
async fn test_bulk_streams_reject_empty_input() {
    let client: Arc<dyn GmailClient> = Arc::new(MockGmailClient::new());
    let events: Vec<BulkEvent> = bulk::unmark_all_spam(client, fast_bulk_config(), vec![])
        .collect()
        .await;

    assert_eq!(events.len(), 1);
    let error = serde_json::to_value(&events[0]).unwrap();
    assert_eq!(error["type"], "error");
    assert_eq!(error["error"], "No newsletters to restore");
}

#[tokio::test]
async fn test_spam_count_uses_estimate() {
    let mut mock = MockGmailClient::new();
    mock.expect_list_messages()
        .withf(|q| q.query.as_deref() == Some("from:a@b.com in:spam") && q.max_results == 1)
        .returning(|_| {
            let mut p = page(&["only-one"], None);
            p.result_size_estimate = 42;
            Ok(p)
        });

    assert_eq!(bulk::spam_count(&mock, "a@b.com").await.unwrap(), 42);
}
