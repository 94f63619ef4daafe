//! Common test utilities and fixtures
#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use gmail_newsletters::client::GmailClient;
use gmail_newsletters::config::BulkConfig;
use gmail_newsletters::error::Result;
use gmail_newsletters::models::{FilterSpec, ListQuery, MessageContent, MessageMetadata, MessagePage};
use mockall::mock;

/// Create a newsletter message with default values
pub fn create_test_message(id: &str, sender: &str, subject: &str) -> MessageMetadata {
    MessageMetadata {
        id: id.to_string(),
        thread_id: format!("thread_{}", id),
        sender_email: sender.to_string(),
        sender_name: "Test Sender".to_string(),
        subject: subject.to_string(),
        date_received: Some(Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()),
        labels: vec!["INBOX".to_string()],
        list_unsubscribe: Some(format!("<mailto:unsubscribe@{}>", domain(sender))),
        list_id: None,
    }
}

/// Same as `create_test_message`, still unread and received `days` after 2024-01-01
pub fn create_unread_message(id: &str, sender: &str, subject: &str, days: i64) -> MessageMetadata {
    let mut message = create_test_message(id, sender, subject);
    message.labels.push("UNREAD".to_string());
    message.date_received = message.date_received.map(|d| d + chrono::Duration::days(days));
    message
}

fn domain(sender: &str) -> &str {
    sender.split('@').nth(1).unwrap_or("example.com")
}

/// Full message with the given headers and one text body
pub fn create_full_message(id: &str, headers: &[(&str, &str)], body: &str) -> MessageContent {
    MessageContent {
        id: id.to_string(),
        headers: headers
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect(),
        bodies: vec![body.to_string()],
    }
}

/// A page of message ids
pub fn page(ids: &[&str], next_page_token: Option<&str>) -> MessagePage {
    MessagePage {
        ids: ids.iter().map(|s| s.to_string()).collect(),
        next_page_token: next_page_token.map(str::to_string),
        result_size_estimate: ids.len() as u32,
    }
}

/// Bulk settings without the politeness delays
pub fn fast_bulk_config() -> BulkConfig {
    BulkConfig {
        page_delay_ms: 0,
        batch_delay_ms: 0,
        ..BulkConfig::default()
    }
}

// Mock implementation of GmailClient for testing
mock! {
    pub GmailClient {}

    #[async_trait::async_trait]
    impl GmailClient for GmailClient {
        async fn profile_email(&self) -> Result<String>;
        async fn list_messages(&self, query: &ListQuery) -> Result<MessagePage>;
        async fn get_metadata(&self, id: &str) -> Result<MessageMetadata>;
        async fn get_full(&self, id: &str) -> Result<MessageContent>;
        async fn batch_modify(&self, ids: &[String], add: &[String], remove: &[String]) -> Result<usize>;
        async fn create_filter(&self, filter: &FilterSpec) -> Result<String>;
        async fn list_filters(&self) -> Result<Vec<FilterSpec>>;
        async fn delete_filter(&self, filter_id: &str) -> Result<()>;
        async fn send_raw(&self, rfc822: &str) -> Result<()>;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_message() {
        let msg = create_test_message("msg1", "news@example.com", "Weekly digest");
        assert_eq!(msg.id, "msg1");
        assert_eq!(msg.thread_id, "thread_msg1");
        assert_eq!(msg.list_unsubscribe.as_deref(), Some("<mailto:unsubscribe@example.com>"));
        assert!(!msg.is_unread());
    }

    #[test]
    fn test_create_unread_message() {
        let msg = create_unread_message("msg2", "news@example.com", "Issue 2", 3);
        assert!(msg.is_unread());
        assert_eq!(
            msg.date_received,
            Some(Utc.with_ymd_and_hms(2024, 1, 4, 10, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_page() {
        let p = page(&["a", "b"], Some("next"));
        assert_eq!(p.ids, vec!["a", "b"]);
        assert_eq!(p.next_page_token.as_deref(), Some("next"));
        assert_eq!(p.result_size_estimate, 2);
    }
}
