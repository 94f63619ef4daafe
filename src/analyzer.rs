//! Newsletter discovery: multi-query search, metadata fetch, sender
//! aggregation and classification, reported as a stream of events.

use async_stream::stream;
use chrono::{DateTime, Utc};
use futures::stream::{self as futures_stream, Stream, StreamExt};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::classifier;
use crate::client::GmailClient;
use crate::config::AnalysisConfig;
use crate::error::{GmailError, Result};
use crate::models::{ListQuery, MessageMetadata, Subscription};

/// Progress and result events of one analysis run
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AnalysisEvent {
    Started {
        queries: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    QueryCompleted {
        query: String,
        found: usize,
        unique_total: usize,
    },
    QueryFailed {
        query: String,
        error: String,
    },
    FetchProgress {
        fetched: usize,
        total: usize,
    },
    #[serde(rename_all = "camelCase")]
    Complete {
        subscriptions: Vec<Subscription>,
        messages_scanned: usize,
    },
    Error {
        error: String,
    },
}

pub type AnalysisStream = Pin<Box<dyn Stream<Item = AnalysisEvent> + Send>>;

/// Search query for one configured keyword, limited to the analysis period
pub fn period_query(query: &str, period_days: u32) -> String {
    format!("{} newer_than:{}d", query, period_days)
}

/// Run the analysis, yielding progress events and a final `Complete`
pub fn analyze(client: Arc<dyn GmailClient>, config: AnalysisConfig) -> AnalysisStream {
    Box::pin(stream! {
        yield AnalysisEvent::Started { queries: config.queries.clone() };

        let mut seen = HashSet::new();
        let mut ids: Vec<String> = Vec::new();
        let mut failed_queries = 0;

        for query in &config.queries {
            let full_query = period_query(query, config.period_days);
            match list_query_ids(client.as_ref(), &full_query, &config).await {
                Ok(found) => {
                    let count = found.len();
                    for id in found {
                        if seen.insert(id.clone()) {
                            ids.push(id);
                        }
                    }
                    info!("Query '{}' found {} messages ({} unique so far)", full_query, count, ids.len());
                    yield AnalysisEvent::QueryCompleted {
                        query: full_query,
                        found: count,
                        unique_total: ids.len(),
                    };
                }
                Err(e) => {
                    warn!("Query '{}' failed: {}", full_query, e);
                    failed_queries += 1;
                    yield AnalysisEvent::QueryFailed { query: full_query, error: e.to_string() };
                }
            }
        }

        if failed_queries > 0 && failed_queries == config.queries.len() {
            yield AnalysisEvent::Error { error: "All search queries failed".to_string() };
            return;
        }

        ids.truncate(config.max_messages);
        let total = ids.len();
        let mut messages = Vec::with_capacity(total);

        for batch in ids.chunks(config.batch_size.max(1)) {
            let fetched = fetch_batch(client.as_ref(), batch, config.max_concurrent_requests).await;
            messages.extend(fetched);
            yield AnalysisEvent::FetchProgress { fetched: messages.len(), total };
        }

        let subscriptions = aggregate(&messages, config.min_emails, config.recent_subjects);
        info!(
            "Analysis complete: {} senders from {} messages",
            subscriptions.len(),
            messages.len()
        );

        yield AnalysisEvent::Complete { subscriptions, messages_scanned: messages.len() };
    })
}

/// Drain `analyze` and return the subscriptions from its `Complete` event
pub async fn collect_analysis(client: Arc<dyn GmailClient>, config: AnalysisConfig) -> Result<Vec<Subscription>> {
    let mut events = analyze(client, config);

    while let Some(event) = events.next().await {
        match event {
            AnalysisEvent::Complete { subscriptions, .. } => return Ok(subscriptions),
            AnalysisEvent::Error { error } => return Err(GmailError::ApiError(error)),
            other => debug!("Analysis event: {:?}", other),
        }
    }

    Err(GmailError::Unknown("Analysis ended without a result".to_string()))
}

async fn list_query_ids(client: &dyn GmailClient, query: &str, config: &AnalysisConfig) -> Result<Vec<String>> {
    let mut ids = Vec::new();
    let mut page_token = None;

    loop {
        let request = ListQuery::new(query, config.page_size).page(page_token);
        let page = client.list_messages(&request).await?;
        ids.extend(page.ids);

        if ids.len() >= config.max_messages_per_query {
            ids.truncate(config.max_messages_per_query);
            break;
        }
        match page.next_page_token {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    Ok(ids)
}

/// Fetch metadata concurrently; failures are logged and dropped
async fn fetch_batch(client: &dyn GmailClient, ids: &[String], concurrency: usize) -> Vec<MessageMetadata> {
    let results: Vec<Result<MessageMetadata>> = futures_stream::iter(ids.to_vec())
        .map(|id: String| async move {
            let result = client.get_metadata(&id).await;
            if let Err(e) = &result {
                warn!("Failed to fetch message {}: {}", id, e);
            }
            result
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    results.into_iter().filter_map(|r| r.ok()).collect()
}

#[derive(Default)]
struct SenderStats {
    name: String,
    total: usize,
    unread: usize,
    list_unsubscribe: usize,
    has_list_id: bool,
    subjects: Vec<(Option<DateTime<Utc>>, String)>,
    first: Option<DateTime<Utc>>,
    last: Option<DateTime<Utc>>,
}

/// Group messages by sender and classify senders with at least `min_emails`
pub fn aggregate(messages: &[MessageMetadata], min_emails: usize, recent_subjects: usize) -> Vec<Subscription> {
    let mut senders: HashMap<&str, SenderStats> = HashMap::new();

    for msg in messages {
        if msg.sender_email.is_empty() {
            continue;
        }
        let stats = senders.entry(msg.sender_email.as_str()).or_default();
        if stats.name.is_empty() {
            stats.name = msg.sender_name.clone();
        }
        stats.total += 1;
        if msg.is_unread() {
            stats.unread += 1;
        }
        if msg.list_unsubscribe.is_some() {
            stats.list_unsubscribe += 1;
        }
        stats.has_list_id |= msg.list_id.is_some();
        stats.subjects.push((msg.date_received, msg.subject.clone()));

        if let Some(date) = msg.date_received {
            stats.first = Some(stats.first.map_or(date, |d| d.min(date)));
            stats.last = Some(stats.last.map_or(date, |d| d.max(date)));
        }
    }

    let mut subscriptions: Vec<Subscription> = senders
        .into_iter()
        .filter(|(_, stats)| stats.total >= min_emails)
        .map(|(email, stats)| build_subscription(email, stats, recent_subjects))
        .collect();

    subscriptions.sort_by(|a, b| {
        b.total_emails
            .cmp(&a.total_emails)
            .then_with(|| a.sender_email.cmp(&b.sender_email))
    });
    subscriptions
}

fn build_subscription(email: &str, mut stats: SenderStats, recent_subjects: usize) -> Subscription {
    let all_subjects: Vec<String> = stats.subjects.iter().map(|(_, s)| s.clone()).collect();

    // Undated subjects sort last
    stats.subjects.sort_by(|a, b| b.0.cmp(&a.0));
    let mut recent: Vec<String> = Vec::new();
    for (_, subject) in &stats.subjects {
        if recent.len() >= recent_subjects {
            break;
        }
        if !subject.is_empty() && !recent.contains(subject) {
            recent.push(subject.clone());
        }
    }

    let name = if stats.name.is_empty() { email.to_string() } else { stats.name };

    Subscription {
        category: classifier::categorize(&name, email, &all_subjects),
        frequency: classifier::frequency(stats.total),
        engagement: classifier::engagement(stats.total, stats.unread),
        reliability: classifier::reliability(stats.total, stats.list_unsubscribe, stats.has_list_id),
        sender: name,
        sender_email: email.to_string(),
        total_emails: stats.total,
        has_unsubscribe_link: stats.list_unsubscribe > 0,
        has_list_id: stats.has_list_id,
        recent_subjects: recent,
        first_email_date: stats.first,
        last_email_date: stats.last,
    }
}
