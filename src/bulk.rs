//! Bulk label operations per sender: spam marking and restoring, filter
//! management, and the streamed multi-sender variants.

use async_stream::stream;
use futures::stream::Stream;
use serde::Serialize;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::classifier::{self, NewsletterPatterns};
use crate::client::GmailClient;
use crate::config::BulkConfig;
use crate::error::{GmailError, Result};
use crate::models::{FilterSpec, ListQuery, SenderRef};

/// Messages sampled for pattern detection before creating a spam filter
const PATTERN_SAMPLE: usize = 10;

/// Result of paginating one sender's messages
#[derive(Debug, Default)]
pub struct Collected {
    pub ids: Vec<String>,
    pub pages: usize,
    /// Listing error that stopped pagination early
    pub error: Option<GmailError>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MarkSpamReport {
    pub success: bool,
    pub message: String,
    pub total_found: usize,
    pub marked_as_spam: usize,
    pub filter_created: bool,
    pub sender_email: String,
    pub sender_name: String,
    pub newsletter_patterns: NewsletterPatterns,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UnmarkSpamReport {
    pub success: bool,
    pub message: String,
    pub total_found: usize,
    pub restored_to_inbox: usize,
    pub success_rate: u32,
    pub filters_removed: usize,
    pub sender_email: String,
    pub sender_name: String,
    pub pages: usize,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedSender {
    pub email: String,
    pub sender: String,
    pub total_emails: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marked: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restored: Option<usize>,
}

/// Progress events of the multi-sender operations
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BulkEvent {
    #[serde(rename_all = "camelCase")]
    Start { message: String, total_newsletters: usize },
    Processing {
        current: usize,
        total: usize,
        newsletter: String,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    Marked {
        current: usize,
        total: usize,
        total_marked: usize,
        newsletter: String,
        marked_in_newsletter: usize,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    Restored {
        current: usize,
        total: usize,
        total_restored: usize,
        newsletter: String,
        restored_in_newsletter: usize,
        message: String,
    },
    ErrorNewsletter { newsletter: String, error: String },
    #[serde(rename = "complete", rename_all = "camelCase")]
    MarkComplete {
        total_marked: usize,
        total_filters_created: usize,
        processed_newsletters: Vec<ProcessedSender>,
        message: String,
    },
    #[serde(rename = "complete", rename_all = "camelCase")]
    RestoreComplete {
        total_restored: usize,
        total_filters_removed: usize,
        processed_newsletters: Vec<ProcessedSender>,
        message: String,
    },
    Error {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
}

pub type BulkStream = Pin<Box<dyn Stream<Item = BulkEvent> + Send>>;

fn from_query(sender_email: &str) -> String {
    format!("from:{}", sender_email)
}

fn labels(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Page cap for a sender with `total_emails` known messages
pub fn pages_for(total_emails: usize, page_size: u32) -> usize {
    let total = if total_emails == 0 { 100 } else { total_emails };
    total.div_ceil(page_size.max(1) as usize) + 2
}

fn is_label_error(e: &GmailError) -> bool {
    e.to_string().to_lowercase().contains("label")
}

/// Count of `from:` messages on the first page
pub async fn email_count(client: &dyn GmailClient, config: &BulkConfig, sender_email: &str) -> Result<usize> {
    let page = client
        .list_messages(&ListQuery::new(from_query(sender_email), config.page_size))
        .await?;
    Ok(page.ids.len())
}

/// Estimated number of the sender's messages currently in spam
pub async fn spam_count(client: &dyn GmailClient, sender_email: &str) -> Result<u32> {
    let query = ListQuery::new(format!("from:{} in:spam", sender_email), 1).include_spam_trash();
    Ok(client.list_messages(&query).await?.result_size_estimate)
}

/// Paginate `query` until there is no next page, `max_pages` is reached or
/// `expected_total` ids are collected.
///
/// A page rejected for its label ids is retried once with the labels moved
/// into the search (`in:<label>`). Any other listing error stops pagination.
pub async fn collect_messages(
    client: &dyn GmailClient,
    config: &BulkConfig,
    query: ListQuery,
    expected_total: usize,
    max_pages: usize,
) -> Collected {
    let mut collected = Collected::default();
    let mut page_token: Option<String> = None;

    loop {
        let request = query.clone().page(page_token.take());
        let page = match client.list_messages(&request).await {
            Ok(page) => page,
            Err(e) if !request.label_ids.is_empty() && is_label_error(&e) => {
                warn!("Label listing failed ({}), retrying with search operators", e);
                match client.list_messages(&labels_as_search(&request)).await {
                    Ok(page) => page,
                    Err(retry_err) => {
                        error!("Retry with search operators failed: {}", retry_err);
                        collected.error = Some(retry_err);
                        break;
                    }
                }
            }
            Err(e) => {
                error!("Listing {:?} failed: {}", request.query, e);
                collected.error = Some(e);
                break;
            }
        };

        collected.pages += 1;
        collected.ids.extend(page.ids);
        debug!(
            "Page {}: {} messages collected for {:?}",
            collected.pages,
            collected.ids.len(),
            query.query
        );

        if expected_total > 0 && collected.ids.len() >= expected_total {
            break;
        }
        match page.next_page_token {
            Some(token) if collected.pages < max_pages => {
                page_token = Some(token);
                tokio::time::sleep(Duration::from_millis(config.page_delay_ms)).await;
            }
            _ => break,
        }
    }

    collected
}

fn labels_as_search(request: &ListQuery) -> ListQuery {
    let mut terms: Vec<String> = request.query.iter().cloned().collect();
    terms.extend(request.label_ids.iter().map(|l| format!("in:{}", l.to_lowercase())));

    ListQuery {
        query: Some(terms.join(" ")),
        label_ids: Vec::new(),
        ..request.clone()
    }
}

/// Apply a label change in `batch_size` chunks; failed chunks are skipped.
/// Returns the number of messages changed.
async fn modify_in_batches(
    client: &dyn GmailClient,
    ids: &[String],
    batch_size: usize,
    add: &[String],
    remove: &[String],
    pause: Option<Duration>,
) -> usize {
    let mut modified = 0;
    let batches: Vec<&[String]> = ids.chunks(batch_size.max(1)).collect();

    for (i, batch) in batches.iter().enumerate() {
        match client.batch_modify(batch, add, remove).await {
            Ok(n) => {
                modified += n;
                debug!("Modified {}/{} messages", modified, ids.len());
            }
            Err(e) => error!("Batch {} of {} failed: {}", i + 1, batches.len(), e),
        }
        if let Some(pause) = pause {
            if i + 1 < batches.len() {
                tokio::time::sleep(pause).await;
            }
        }
    }

    modified
}

/// Delete filters for `sender_email` that send mail to spam or trash
pub async fn remove_spam_filters(client: &dyn GmailClient, sender_email: &str) -> Result<usize> {
    let filters = client.list_filters().await?;
    let mut removed = 0;

    for filter in filters
        .iter()
        .filter(|f| f.targets_sender(sender_email) && (f.adds("SPAM") || f.adds("TRASH")))
    {
        let Some(id) = filter.id.as_deref() else {
            continue;
        };
        match client.delete_filter(id).await {
            Ok(()) => {
                info!("Removed filter {} for {}", id, sender_email);
                removed += 1;
            }
            Err(e) => warn!("Failed to remove filter {}: {}", id, e),
        }
    }

    Ok(removed)
}

/// Move every message from `sender_email` to spam and filter future mail
pub async fn mark_spam(
    client: &dyn GmailClient,
    config: &BulkConfig,
    sender_email: &str,
    sender_name: &str,
    expected_total: usize,
) -> Result<MarkSpamReport> {
    let query = ListQuery::new(from_query(sender_email), config.page_size).include_spam_trash();
    let collected = collect_messages(client, config, query, expected_total, config.max_pages).await;

    if collected.ids.is_empty() {
        return Err(GmailError::NotFound(format!("No messages found from {}", sender_email)));
    }
    info!("Found {} messages from {}", collected.ids.len(), sender_email);

    let marked = modify_in_batches(
        client,
        &collected.ids,
        config.modify_batch_size,
        &labels(&["SPAM"]),
        &labels(&["INBOX", "UNREAD"]),
        None,
    )
    .await;

    let mut sample = Vec::new();
    for id in collected.ids.iter().take(PATTERN_SAMPLE) {
        match client.get_full(id).await {
            Ok(content) => sample.push(content),
            Err(e) => debug!("Skipping pattern sample {}: {}", id, e),
        }
    }
    let patterns = classifier::detect_newsletter_patterns(&sample);

    let filter = classifier::spam_filter_for(sender_email, &patterns);
    let filter_created = match client.create_filter(&filter).await {
        Ok(id) => {
            info!("Created spam filter {} for {}", id, sender_email);
            true
        }
        Err(e) => {
            warn!("Failed to create spam filter for {}: {}", sender_email, e);
            false
        }
    };

    let summary = if filter_created {
        format!(
            "{} newsletters marked as spam and a filter was created. Future newsletters from {} will go to spam.",
            marked, sender_email
        )
    } else {
        format!("{} newsletters marked as spam.", marked)
    };

    Ok(MarkSpamReport {
        success: true,
        message: "Newsletters marked as spam".to_string(),
        total_found: collected.ids.len(),
        marked_as_spam: marked,
        filter_created,
        sender_email: sender_email.to_string(),
        sender_name: sender_name.to_string(),
        newsletter_patterns: patterns,
        summary,
    })
}

/// Restore the sender's spam to the inbox and drop its spam filters
pub async fn unmark_spam(
    client: &dyn GmailClient,
    config: &BulkConfig,
    sender_email: &str,
    sender_name: &str,
) -> Result<UnmarkSpamReport> {
    let query = ListQuery::new(from_query(sender_email), config.page_size)
        .with_label("SPAM")
        .include_spam_trash();
    let collected = collect_messages(client, config, query, 0, config.max_pages).await;
    let found = collected.ids.len();

    if found == 0 {
        return Ok(UnmarkSpamReport {
            success: true,
            message: "No spam messages from this sender".to_string(),
            total_found: 0,
            restored_to_inbox: 0,
            success_rate: 0,
            filters_removed: 0,
            sender_email: sender_email.to_string(),
            sender_name: sender_name.to_string(),
            pages: collected.pages,
            summary: format!("No spam messages found from {}.", sender_name),
        });
    }

    let restored = modify_in_batches(
        client,
        &collected.ids,
        config.modify_batch_size,
        &labels(&["INBOX"]),
        &labels(&["SPAM"]),
        Some(Duration::from_millis(config.batch_delay_ms)),
    )
    .await;

    let filters_removed = match remove_spam_filters(client, sender_email).await {
        Ok(n) => n,
        Err(e) => {
            error!("Failed to remove filters for {}: {}", sender_email, e);
            0
        }
    };

    let recent: Vec<String> = collected.ids.iter().take(config.unread_restore_count).cloned().collect();
    if !recent.is_empty() {
        if let Err(e) = client.batch_modify(&recent, &labels(&["UNREAD"]), &[]).await {
            warn!("Could not mark restored messages unread: {}", e);
        }
    }

    let success_rate = ((restored as f64 / found as f64) * 100.0).round() as u32;
    let summary = if filters_removed > 0 {
        format!(
            "{} of {} messages ({}%) from {} restored and {} filter(s) removed.",
            restored, found, success_rate, sender_name, filters_removed
        )
    } else {
        format!(
            "{} of {} messages ({}%) from {} restored.",
            restored, found, success_rate, sender_name
        )
    };

    Ok(UnmarkSpamReport {
        success: true,
        message: format!("{} messages restored", restored),
        total_found: found,
        restored_to_inbox: restored,
        success_rate,
        filters_removed,
        sender_email: sender_email.to_string(),
        sender_name: sender_name.to_string(),
        pages: collected.pages,
        summary,
    })
}

/// Mark every listed sender as spam, one after another
pub fn mark_all_spam(client: Arc<dyn GmailClient>, config: BulkConfig, senders: Vec<SenderRef>) -> BulkStream {
    Box::pin(stream! {
        if senders.is_empty() {
            yield BulkEvent::Error { error: "No newsletters to mark as spam".to_string(), details: None };
            return;
        }

        let total = senders.len();
        yield BulkEvent::Start {
            message: format!("Marking {} newsletters as spam...", total),
            total_newsletters: total,
        };

        let spam = labels(&["SPAM"]);
        let strip = labels(&["INBOX", "UNREAD"]);
        let mut total_marked = 0;
        let mut total_filters_created = 0;
        let mut processed = Vec::new();

        for (i, sender) in senders.iter().enumerate() {
            let current = i + 1;
            let name = display_name(sender);
            yield BulkEvent::Processing {
                current,
                total,
                newsletter: name.clone(),
                message: format!("Processing {} ({}/{})...", name, current, total),
            };

            let query = ListQuery::new(from_query(&sender.sender_email), config.page_size).include_spam_trash();
            let max_pages = pages_for(sender.total_emails, config.page_size);
            let collected = collect_messages(client.as_ref(), &config, query, sender.total_emails, max_pages).await;

            if let (true, Some(e)) = (collected.ids.is_empty(), collected.error.as_ref()) {
                yield BulkEvent::ErrorNewsletter { newsletter: name.clone(), error: e.to_string() };
                continue;
            }

            let mut failure = None;
            for batch in collected.ids.chunks(config.modify_batch_size.max(1)) {
                match client.batch_modify(batch, &spam, &strip).await {
                    Ok(n) => {
                        total_marked += n;
                        yield BulkEvent::Marked {
                            current,
                            total,
                            total_marked,
                            newsletter: name.clone(),
                            marked_in_newsletter: n,
                            message: format!("{} messages marked as spam...", total_marked),
                        };
                    }
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }
            if let Some(e) = failure {
                error!("Marking {} failed: {}", sender.sender_email, e);
                yield BulkEvent::ErrorNewsletter { newsletter: name.clone(), error: e.to_string() };
                continue;
            }

            match client.create_filter(&FilterSpec::from_sender(&sender.sender_email, "SPAM")).await {
                Ok(_) => total_filters_created += 1,
                Err(e) => warn!("Filter not created for {}: {}", sender.sender_email, e),
            }

            processed.push(ProcessedSender {
                email: sender.sender_email.clone(),
                sender: name,
                total_emails: collected.ids.len(),
                marked: Some(collected.ids.len()),
                restored: None,
            });
        }

        info!("Bulk spam complete: {} messages, {} filters", total_marked, total_filters_created);
        yield BulkEvent::MarkComplete {
            total_marked,
            total_filters_created,
            processed_newsletters: processed,
            message: format!(
                "Done! {} messages marked as spam and {} filters created.",
                total_marked, total_filters_created
            ),
        };
    })
}

/// Restore every listed sender from spam and remove their filters
pub fn unmark_all_spam(client: Arc<dyn GmailClient>, config: BulkConfig, senders: Vec<SenderRef>) -> BulkStream {
    Box::pin(stream! {
        if senders.is_empty() {
            yield BulkEvent::Error { error: "No newsletters to restore".to_string(), details: None };
            return;
        }

        let total = senders.len();
        yield BulkEvent::Start {
            message: format!("Restoring {} newsletters from spam...", total),
            total_newsletters: total,
        };

        let inbox = labels(&["INBOX"]);
        let spam = labels(&["SPAM"]);
        let mut total_restored = 0;
        let mut total_filters_removed = 0;
        let mut processed = Vec::new();

        for (i, sender) in senders.iter().enumerate() {
            let current = i + 1;
            let name = display_name(sender);
            yield BulkEvent::Processing {
                current,
                total,
                newsletter: name.clone(),
                message: format!("Processing {} ({}/{})...", name, current, total),
            };

            let query = ListQuery::new(from_query(&sender.sender_email), config.page_size)
                .with_label("SPAM")
                .include_spam_trash();
            let collected = collect_messages(client.as_ref(), &config, query, 0, config.max_pages).await;

            if let (true, Some(e)) = (collected.ids.is_empty(), collected.error.as_ref()) {
                yield BulkEvent::ErrorNewsletter { newsletter: name.clone(), error: e.to_string() };
                continue;
            }

            let mut failure = None;
            for batch in collected.ids.chunks(config.modify_batch_size.max(1)) {
                match client.batch_modify(batch, &inbox, &spam).await {
                    Ok(n) => {
                        total_restored += n;
                        yield BulkEvent::Restored {
                            current,
                            total,
                            total_restored,
                            newsletter: name.clone(),
                            restored_in_newsletter: n,
                            message: format!("{} messages restored...", total_restored),
                        };
                    }
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }
            if let Some(e) = failure {
                error!("Restoring {} failed: {}", sender.sender_email, e);
                yield BulkEvent::ErrorNewsletter { newsletter: name.clone(), error: e.to_string() };
                continue;
            }

            match remove_spam_filters(client.as_ref(), &sender.sender_email).await {
                Ok(n) => total_filters_removed += n,
                Err(e) => warn!("Filters not removed for {}: {}", sender.sender_email, e),
            }

            processed.push(ProcessedSender {
                email: sender.sender_email.clone(),
                sender: name,
                total_emails: collected.ids.len(),
                marked: None,
                restored: Some(collected.ids.len()),
            });
        }

        info!("Bulk restore complete: {} messages, {} filters removed", total_restored, total_filters_removed);
        yield BulkEvent::RestoreComplete {
            total_restored,
            total_filters_removed,
            processed_newsletters: processed,
            message: format!(
                "Done! {} messages restored and {} filters removed.",
                total_restored, total_filters_removed
            ),
        };
    })
}

fn display_name(sender: &SenderRef) -> String {
    if sender.sender.is_empty() {
        sender.sender_email.clone()
    } else {
        sender.sender.clone()
    }
}
