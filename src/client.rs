//! Gmail API client with rate limiting and retry logic

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use google_gmail1::api::{
    BatchModifyMessagesRequest, Filter, FilterAction, FilterCriteria, Message, MessagePart,
};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::auth::GmailHub;
use crate::error::{GmailError, Result};
use crate::headers::{self, parse_sender};
use crate::models::{FilterSpec, ListQuery, MessageContent, MessageMetadata, MessagePage};

const MODIFY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";
const SETTINGS_SCOPE: &str = "https://www.googleapis.com/auth/gmail.settings.basic";
const SEND_SCOPE: &str = "https://www.googleapis.com/auth/gmail.send";

/// Gmail's hard cap on ids per batchModify call
pub const MAX_BATCH_MODIFY: usize = 1000;

/// Headers requested with `format=metadata`
pub const METADATA_HEADERS: &[&str] = &["From", "Subject", "Date", "List-Unsubscribe", "List-Id"];

/// Gmail operations used by the analysis, bulk and subscription flows
#[async_trait]
pub trait GmailClient: Send + Sync {
    /// Address of the authenticated account
    async fn profile_email(&self) -> Result<String>;

    /// Fetch one page of message ids
    async fn list_messages(&self, query: &ListQuery) -> Result<MessagePage>;

    async fn get_metadata(&self, id: &str) -> Result<MessageMetadata>;

    /// Full message with decoded text/plain and text/html parts
    async fn get_full(&self, id: &str) -> Result<MessageContent>;

    /// Add/remove labels on many messages, chunked at 1000 ids per call
    async fn batch_modify(&self, ids: &[String], add: &[String], remove: &[String]) -> Result<usize>;

    async fn create_filter(&self, filter: &FilterSpec) -> Result<String>;

    async fn list_filters(&self) -> Result<Vec<FilterSpec>>;

    async fn delete_filter(&self, filter_id: &str) -> Result<()>;

    /// Send an RFC 822 message from the authenticated account
    async fn send_raw(&self, rfc822: &str) -> Result<()>;
}

/// Production Gmail client
///
/// Concurrency is bounded by a semaphore shared by every call. Transient
/// failures (429, 5xx, network) are retried with exponential backoff.
pub struct ProductionGmailClient {
    hub: GmailHub,
    rate_limiter: Arc<Semaphore>,
    timeout: Duration,
}

impl ProductionGmailClient {
    /// * `max_concurrent` - Maximum in-flight requests (stay at or below 50)
    pub fn new(hub: GmailHub, max_concurrent: usize) -> Self {
        Self {
            hub,
            rate_limiter: Arc::new(Semaphore::new(max_concurrent.max(1))),
            timeout: Duration::from_secs(30),
        }
    }

    async fn permit(&self) -> Result<tokio::sync::SemaphorePermit<'_>> {
        self.rate_limiter.acquire().await.map_err(|e| {
            GmailError::Unknown(format!("Failed to acquire rate limit permit: {}", e))
        })
    }

    /// Run an API future under the client timeout
    async fn timed<T, Fut>(&self, operation_name: &str, call: Fut) -> Result<T>
    where
        Fut: std::future::Future<Output = std::result::Result<T, google_gmail1::Error>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(GmailError::from),
            Err(_) => {
                warn!("Gmail API {} call timed out after {:?}", operation_name, self.timeout);
                Err(GmailError::NetworkError(format!(
                    "API call timed out after {:?}",
                    self.timeout
                )))
            }
        }
    }

    /// Check if an error is retryable
    fn should_retry(error: &GmailError) -> bool {
        error.is_transient()
    }

    /// Execute an async operation with exponential backoff retry
    async fn with_retry<T, F, Fut>(
        operation_name: &str,
        max_retries: u32,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut delay = Duration::from_secs(1);
        let mut attempts = 0;

        loop {
            attempts += 1;
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if Self::should_retry(&e) && attempts <= max_retries => {
                    if let GmailError::RateLimitExceeded { retry_after } = e {
                        delay = delay.max(Duration::from_secs(retry_after));
                    }
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                        operation_name, attempts, max_retries + 1, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay * 2, Duration::from_secs(30));
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Convert a metadata-format message into `MessageMetadata`
fn parse_message_metadata(msg: Message) -> Result<MessageMetadata> {
    let id = msg
        .id
        .ok_or_else(|| GmailError::InvalidMessageFormat("Missing message ID".to_string()))?;

    let headers = collect_headers(msg.payload.as_ref());
    let from = headers::header_value(&headers, "From").unwrap_or_default();
    let (sender_name, sender_email) = parse_sender(from);

    let date_received = headers::header_value(&headers, "Date")
        .and_then(|d| headers::parse_date(d).ok())
        .or_else(|| {
            msg.internal_date
                .and_then(chrono::DateTime::<chrono::Utc>::from_timestamp_millis)
        });

    Ok(MessageMetadata {
        id,
        thread_id: msg.thread_id.unwrap_or_default(),
        sender_email,
        sender_name,
        subject: headers::header_value(&headers, "Subject")
            .unwrap_or_default()
            .to_string(),
        date_received,
        labels: msg.label_ids.unwrap_or_default(),
        list_unsubscribe: headers::header_value(&headers, "List-Unsubscribe").map(str::to_string),
        list_id: headers::header_value(&headers, "List-Id").map(str::to_string),
    })
}

fn parse_message_content(msg: Message) -> Result<MessageContent> {
    let id = msg
        .id
        .ok_or_else(|| GmailError::InvalidMessageFormat("Missing message ID".to_string()))?;

    let mut bodies = Vec::new();
    if let Some(payload) = msg.payload.as_ref() {
        collect_text_parts(payload, &mut bodies);
    }

    Ok(MessageContent {
        id,
        headers: collect_headers(msg.payload.as_ref()),
        bodies,
    })
}

fn collect_headers(payload: Option<&MessagePart>) -> Vec<(String, String)> {
    payload
        .and_then(|p| p.headers.as_ref())
        .map(|headers| {
            headers
                .iter()
                .filter_map(|h| Some((h.name.clone()?, h.value.clone()?)))
                .collect()
        })
        .unwrap_or_default()
}

/// Walk the MIME tree and decode every text part
fn collect_text_parts(part: &MessagePart, out: &mut Vec<String>) {
    let is_text = part
        .mime_type
        .as_deref()
        .map(|m| m.starts_with("text/"))
        .unwrap_or(true);

    if is_text {
        if let Some(data) = part.body.as_ref().and_then(|b| b.data.as_ref()) {
            let text = decode_body(data);
            if !text.is_empty() {
                out.push(text);
            }
        }
    }

    for sub in part.parts.iter().flatten() {
        collect_text_parts(sub, out);
    }
}

/// Body bytes normally arrive decoded; fall back to base64url when they don't.
pub fn decode_body(data: &[u8]) -> String {
    let raw = String::from_utf8_lossy(data);
    let trimmed = raw.trim();

    let looks_encoded = !trimmed.is_empty()
        && trimmed.len() % 4 != 1
        && trimmed
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'+' | b'/' | b'='));

    if looks_encoded {
        let decoded = general_purpose::URL_SAFE_NO_PAD
            .decode(trimmed.trim_end_matches('='))
            .or_else(|_| general_purpose::STANDARD.decode(trimmed));
        if let Ok(bytes) = decoded {
            if let Ok(text) = String::from_utf8(bytes) {
                return text;
            }
        }
    }

    raw.into_owned()
}

fn non_empty(labels: &[String]) -> Option<Vec<String>> {
    if labels.is_empty() {
        None
    } else {
        Some(labels.to_vec())
    }
}

fn filter_from_api(f: Filter) -> Option<FilterSpec> {
    let id = f.id?;
    let criteria = f.criteria.unwrap_or_default();
    let action = f.action.unwrap_or_default();

    Some(FilterSpec {
        id: Some(id),
        from: criteria.from,
        subject: criteria.subject,
        query: criteria.query,
        add_label_ids: action.add_label_ids.unwrap_or_default(),
        remove_label_ids: action.remove_label_ids.unwrap_or_default(),
    })
}

fn filter_to_api(filter: &FilterSpec) -> Filter {
    Filter {
        criteria: Some(FilterCriteria {
            from: filter.from.clone(),
            subject: filter.subject.clone(),
            query: filter.query.clone(),
            ..Default::default()
        }),
        action: Some(FilterAction {
            add_label_ids: non_empty(&filter.add_label_ids),
            remove_label_ids: non_empty(&filter.remove_label_ids),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[async_trait]
impl GmailClient for ProductionGmailClient {
    async fn profile_email(&self) -> Result<String> {
        Self::with_retry("get_profile", 3, || async {
            let _permit = self.permit().await?;
            let (_, profile) = self
                .timed(
                    "get_profile",
                    self.hub.users().get_profile("me").add_scope(MODIFY_SCOPE).doit(),
                )
                .await?;

            profile
                .email_address
                .ok_or_else(|| GmailError::ApiError("Profile has no email address".to_string()))
        })
        .await
    }

    async fn list_messages(&self, query: &ListQuery) -> Result<MessagePage> {
        Self::with_retry("list_messages", 3, || async {
            let _permit = self.permit().await?;

            let mut call = self
                .hub
                .users()
                .messages_list("me")
                .max_results(query.max_results)
                .include_spam_trash(query.include_spam_trash);

            if let Some(q) = query.query.as_deref() {
                call = call.q(q);
            }
            for label in &query.label_ids {
                call = call.add_label_ids(label);
            }
            if let Some(token) = query.page_token.as_deref() {
                call = call.page_token(token);
            }

            let (_, response) = self
                .timed("list_messages", call.add_scope(MODIFY_SCOPE).doit())
                .await?;

            let ids = response
                .messages
                .unwrap_or_default()
                .into_iter()
                .filter_map(|m| m.id)
                .collect::<Vec<_>>();

            debug!(
                "Listed {} messages for {:?} (next page: {})",
                ids.len(),
                query.query,
                response.next_page_token.is_some()
            );

            Ok(MessagePage {
                ids,
                next_page_token: response.next_page_token,
                result_size_estimate: response.result_size_estimate.unwrap_or(0),
            })
        })
        .await
    }

    async fn get_metadata(&self, id: &str) -> Result<MessageMetadata> {
        Self::with_retry("get_metadata", 3, || async {
            let _permit = self.permit().await?;

            let mut call = self.hub.users().messages_get("me", id).format("metadata");
            for header in METADATA_HEADERS {
                call = call.add_metadata_headers(header);
            }

            let (_, msg) = self
                .timed("get_metadata", call.add_scope(MODIFY_SCOPE).doit())
                .await?;
            parse_message_metadata(msg)
        })
        .await
    }

    async fn get_full(&self, id: &str) -> Result<MessageContent> {
        Self::with_retry("get_full", 3, || async {
            let _permit = self.permit().await?;
            let (_, msg) = self
                .timed(
                    "get_full",
                    self.hub
                        .users()
                        .messages_get("me", id)
                        .format("full")
                        .add_scope(MODIFY_SCOPE)
                        .doit(),
                )
                .await?;
            parse_message_content(msg)
        })
        .await
    }

    async fn batch_modify(&self, ids: &[String], add: &[String], remove: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut total_modified = 0;

        for chunk in ids.chunks(MAX_BATCH_MODIFY) {
            Self::with_retry("batch_modify", 3, || async {
                let _permit = self.permit().await?;
                let request = BatchModifyMessagesRequest {
                    ids: Some(chunk.to_vec()),
                    add_label_ids: non_empty(add),
                    remove_label_ids: non_empty(remove),
                };

                self.timed(
                    "batch_modify",
                    self.hub
                        .users()
                        .messages_batch_modify(request, "me")
                        .add_scope(MODIFY_SCOPE)
                        .doit(),
                )
                .await?;
                Ok(())
            })
            .await?;

            total_modified += chunk.len();
        }

        Ok(total_modified)
    }

    async fn create_filter(&self, filter: &FilterSpec) -> Result<String> {
        Self::with_retry("create_filter", 3, || async {
            let _permit = self.permit().await?;
            let (_, created) = self
                .timed(
                    "create_filter",
                    self.hub
                        .users()
                        .settings_filters_create(filter_to_api(filter), "me")
                        .add_scope(SETTINGS_SCOPE)
                        .doit(),
                )
                .await?;

            created
                .id
                .ok_or_else(|| GmailError::FilterError("Created filter has no ID".to_string()))
        })
        .await
    }

    async fn list_filters(&self) -> Result<Vec<FilterSpec>> {
        Self::with_retry("list_filters", 3, || async {
            let _permit = self.permit().await?;
            let (_, response) = self
                .timed(
                    "list_filters",
                    self.hub
                        .users()
                        .settings_filters_list("me")
                        .add_scope(SETTINGS_SCOPE)
                        .doit(),
                )
                .await?;

            let filters: Vec<FilterSpec> = response
                .filter
                .unwrap_or_default()
                .into_iter()
                .filter_map(filter_from_api)
                .collect();

            debug!("Successfully parsed {} filters", filters.len());
            Ok(filters)
        })
        .await
    }

    async fn delete_filter(&self, filter_id: &str) -> Result<()> {
        Self::with_retry("delete_filter", 3, || async {
            let _permit = self.permit().await?;
            self.timed(
                "delete_filter",
                self.hub
                    .users()
                    .settings_filters_delete("me", filter_id)
                    .add_scope(SETTINGS_SCOPE)
                    .doit(),
            )
            .await?;
            Ok(())
        })
        .await
    }

    async fn send_raw(&self, rfc822: &str) -> Result<()> {
        // Not retried: a timed-out send may still have been delivered
        let _permit = self.permit().await?;
        let content_type = "message/rfc822".parse().map_err(|_| {
            GmailError::InvalidMessageFormat("invalid message content type".to_string())
        })?;

        self.timed(
            "send",
            self.hub
                .users()
                .messages_send(Message::default(), "me")
                .add_scope(SEND_SCOPE)
                .upload(Cursor::new(rfc822.as_bytes().to_vec()), content_type),
        )
        .await?;
        Ok(())
    }
}

// Implement GmailClient for Arc<ProductionGmailClient> to allow shared ownership
#[async_trait]
impl GmailClient for Arc<ProductionGmailClient> {
    async fn profile_email(&self) -> Result<String> {
        self.as_ref().profile_email().await
    }

    async fn list_messages(&self, query: &ListQuery) -> Result<MessagePage> {
        self.as_ref().list_messages(query).await
    }

    async fn get_metadata(&self, id: &str) -> Result<MessageMetadata> {
        self.as_ref().get_metadata(id).await
    }

    async fn get_full(&self, id: &str) -> Result<MessageContent> {
        self.as_ref().get_full(id).await
    }

    async fn batch_modify(&self, ids: &[String], add: &[String], remove: &[String]) -> Result<usize> {
        self.as_ref().batch_modify(ids, add, remove).await
    }

    async fn create_filter(&self, filter: &FilterSpec) -> Result<String> {
        self.as_ref().create_filter(filter).await
    }

    async fn list_filters(&self) -> Result<Vec<FilterSpec>> {
        self.as_ref().list_filters().await
    }

    async fn delete_filter(&self, filter_id: &str) -> Result<()> {
        self.as_ref().delete_filter(filter_id).await
    }

    async fn send_raw(&self, rfc822: &str) -> Result<()> {
        self.as_ref().send_raw(rfc822).await
    }
}

/// Build a plain-text RFC 822 message
pub fn compose_plain_message(from: &str, to: &str, subject: &str, body: &str) -> String {
    [
        format!("From: {}", from),
        format!("To: {}", to),
        format!("Subject: {}", subject),
        "Content-Type: text/plain; charset=utf-8".to_string(),
        String::new(),
        body.to_string(),
    ]
    .join("\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use google_gmail1::api::{MessagePartBody, MessagePartHeader};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn header(name: &str, value: &str) -> MessagePartHeader {
        MessagePartHeader {
            name: Some(name.to_string()),
            value: Some(value.to_string()),
        }
    }

    #[test]
    fn test_should_retry_transient_errors() {
        assert!(ProductionGmailClient::should_retry(&GmailError::ServerError {
            status: 500,
            message: "Internal error".to_string(),
        }));
        assert!(ProductionGmailClient::should_retry(&GmailError::RateLimitExceeded {
            retry_after: 5
        }));
        assert!(ProductionGmailClient::should_retry(&GmailError::NetworkError(
            "connection reset".to_string()
        )));
    }

    #[test]
    fn test_should_not_retry_permanent_errors() {
        assert!(!ProductionGmailClient::should_retry(&GmailError::AuthError(
            "invalid token".to_string()
        )));
        assert!(!ProductionGmailClient::should_retry(&GmailError::NotFound(
            "gone".to_string()
        )));
    }

    #[test]
    fn test_parse_message_metadata() {
        let msg = Message {
            id: Some("m1".to_string()),
            thread_id: Some("t1".to_string()),
            label_ids: Some(vec!["INBOX".to_string(), "UNREAD".to_string()]),
            payload: Some(MessagePart {
                headers: Some(vec![
                    header("From", "\"Shop News\" <News@Shop.com>"),
                    header("Subject", "Big sale"),
                    header("Date", "Wed, 02 Oct 2024 08:00:00 +0000"),
                    header("List-Unsubscribe", "<https://shop.com/u>"),
                    header("List-Id", "<news.shop.com>"),
                ]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let meta = parse_message_metadata(msg).unwrap();
        assert_eq!(meta.sender_email, "news@shop.com");
        assert_eq!(meta.sender_name, "Shop News");
        assert_eq!(meta.subject, "Big sale");
        assert!(meta.date_received.is_some());
        assert!(meta.is_unread());
        assert_eq!(meta.list_unsubscribe.as_deref(), Some("<https://shop.com/u>"));
        assert_eq!(meta.list_id.as_deref(), Some("<news.shop.com>"));
    }

    #[test]
    fn test_parse_message_metadata_missing_id() {
        let err = parse_message_metadata(Message::default()).unwrap_err();
        assert!(matches!(err, GmailError::InvalidMessageFormat(_)));
    }

    #[test]
    fn test_parse_message_content_walks_parts() {
        let msg = Message {
            id: Some("m2".to_string()),
            payload: Some(MessagePart {
                mime_type: Some("multipart/alternative".to_string()),
                headers: Some(vec![header("Subject", "Hello")]),
                parts: Some(vec![
                    MessagePart {
                        mime_type: Some("text/plain".to_string()),
                        body: Some(MessagePartBody {
                            data: Some(b"plain text, unsubscribe here".to_vec()),
                            ..Default::default()
                        }),
                        ..Default::default()
                    },
                    MessagePart {
                        mime_type: Some("image/png".to_string()),
                        body: Some(MessagePartBody {
                            data: Some(vec![0x89, 0x50]),
                            ..Default::default()
                        }),
                        ..Default::default()
                    },
                ]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let content = parse_message_content(msg).unwrap();
        assert_eq!(content.subject(), "Hello");
        assert_eq!(content.bodies, vec!["plain text, unsubscribe here".to_string()]);
    }

    #[test]
    fn test_decode_body_passthrough_and_base64() {
        assert_eq!(decode_body(b"<p>Hello world</p>"), "<p>Hello world</p>");

        let encoded = general_purpose::URL_SAFE_NO_PAD.encode("Hi there, unsubscribe?");
        assert_eq!(decode_body(encoded.as_bytes()), "Hi there, unsubscribe?");
    }

    #[test]
    fn test_filter_api_conversion() {
        let spec = FilterSpec::from_sender("news@shop.com", "TRASH");
        let api = filter_to_api(&spec);
        let action = api.action.clone().unwrap();
        assert_eq!(action.add_label_ids, Some(vec!["TRASH".to_string()]));
        assert_eq!(api.criteria.clone().unwrap().from.as_deref(), Some("news@shop.com"));

        let back = filter_from_api(Filter {
            id: Some("f1".to_string()),
            ..api
        })
        .unwrap();
        assert_eq!(back.id.as_deref(), Some("f1"));
        assert!(back.targets_sender("news@shop.com"));
        assert!(back.removes("INBOX"));

        assert!(filter_from_api(Filter::default()).is_none());
    }

    #[test]
    fn test_compose_plain_message() {
        let raw = compose_plain_message("me@x.com", "list@y.com", "Unsubscribe Request", "Please remove me");
        assert!(raw.starts_with("From: me@x.com\r\nTo: list@y.com\r\nSubject: Unsubscribe Request"));
        assert!(raw.ends_with("\r\n\r\nPlease remove me"));
    }

    #[tokio::test]
    async fn test_with_retry_succeeds_after_transient_error() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempt_count);

        let result = ProductionGmailClient::with_retry("test_op", 3, || {
            let count = Arc::clone(&counter);
            async move {
                if count.fetch_add(1, Ordering::SeqCst) < 1 {
                    Err(GmailError::NetworkError("Connection timeout".to_string()))
                } else {
                    Ok("success".to_string())
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(attempt_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_with_retry_fails_on_permanent_error() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempt_count);

        let result = ProductionGmailClient::with_retry("test_op", 3, || {
            let count = Arc::clone(&counter);
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Err::<String, _>(GmailError::BadRequest("Invalid query".to_string()))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempt_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_exhausts_all_retries() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempt_count);
        let started = tokio::time::Instant::now();

        let result = ProductionGmailClient::with_retry("test_op", 3, || {
            let count = Arc::clone(&counter);
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Err::<String, _>(GmailError::ServerError {
                    status: 503,
                    message: "unavailable".to_string(),
                })
            }
        })
        .await;

        assert!(result.is_err());
        // initial + 3 retries
        assert_eq!(attempt_count.load(Ordering::SeqCst), 4);
        // 1s + 2s + 4s
        assert_eq!(started.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_backoff_is_capped() {
        let started = tokio::time::Instant::now();

        let result = ProductionGmailClient::with_retry("test_op", 6, || async {
            Err::<(), _>(GmailError::NetworkError("reset".to_string()))
        })
        .await;

        assert!(result.is_err());
        // 1 + 2 + 4 + 8 + 16 + 30
        assert_eq!(started.elapsed(), Duration::from_secs(61));
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_honours_retry_after() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempt_count);
        let started = tokio::time::Instant::now();

        let result = ProductionGmailClient::with_retry("test_op", 3, || {
            let count = Arc::clone(&counter);
            async move {
                if count.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(GmailError::RateLimitExceeded { retry_after: 10 })
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }
}
