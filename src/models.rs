use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Header subset fetched for every scanned message.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MessageMetadata {
    pub id: String,
    pub thread_id: String,
    pub sender_email: String,
    pub sender_name: String,
    pub subject: String,
    pub date_received: Option<DateTime<Utc>>,
    pub labels: Vec<String>,
    pub list_unsubscribe: Option<String>,
    pub list_id: Option<String>,
}

impl MessageMetadata {
    pub fn is_unread(&self) -> bool {
        self.labels.iter().any(|l| l == "UNREAD")
    }
}

/// A fully fetched message: all headers plus decoded text parts.
#[derive(Debug, Clone, Default)]
pub struct MessageContent {
    pub id: String,
    pub headers: Vec<(String, String)>,
    pub bodies: Vec<String>,
}

impl MessageContent {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        crate::headers::header_value(&self.headers, name)
    }

    pub fn subject(&self) -> &str {
        self.header("Subject").unwrap_or_default()
    }
}

/// Parameters of a single `users.messages.list` page request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    pub query: Option<String>,
    pub label_ids: Vec<String>,
    pub include_spam_trash: bool,
    pub max_results: u32,
    pub page_token: Option<String>,
}

impl ListQuery {
    pub fn new(query: impl Into<String>, max_results: u32) -> Self {
        Self {
            query: Some(query.into()),
            max_results,
            ..Default::default()
        }
    }

    pub fn include_spam_trash(mut self) -> Self {
        self.include_spam_trash = true;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label_ids.push(label.into());
        self
    }

    pub fn page(mut self, token: Option<String>) -> Self {
        self.page_token = token;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct MessagePage {
    pub ids: Vec<String>,
    pub next_page_token: Option<String>,
    pub result_size_estimate: u32,
}

/// Criteria and action of a Gmail filter, as created or listed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub id: Option<String>,
    pub from: Option<String>,
    pub subject: Option<String>,
    pub query: Option<String>,
    pub add_label_ids: Vec<String>,
    pub remove_label_ids: Vec<String>,
}

impl FilterSpec {
    /// `from:` filter that files mail under `add` and strips INBOX and UNREAD.
    pub fn from_sender(sender_email: &str, add: &str) -> Self {
        Self {
            from: Some(sender_email.to_string()),
            add_label_ids: vec![add.to_string()],
            remove_label_ids: vec!["INBOX".to_string(), "UNREAD".to_string()],
            ..Default::default()
        }
    }

    pub fn adds(&self, label: &str) -> bool {
        self.add_label_ids.iter().any(|l| l == label)
    }

    pub fn removes(&self, label: &str) -> bool {
        self.remove_label_ids.iter().any(|l| l == label)
    }

    /// True when the filter criteria target `sender_email`.
    pub fn targets_sender(&self, sender_email: &str) -> bool {
        let sender = sender_email.to_lowercase();
        let from_matches = self
            .from
            .as_deref()
            .map(|f| f.trim().to_lowercase() == sender)
            .unwrap_or(false);
        let query_matches = self
            .query
            .as_deref()
            .map(|q| q.to_lowercase().contains(&sender))
            .unwrap_or(false);
        from_matches || query_matches
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Category {
    Professional,
    Commercial,
    News,
    Social,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Professional => "Professional",
            Category::Commercial => "Commercial",
            Category::News => "News",
            Category::Social => "Social",
            Category::Other => "Other",
        }
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "professional" => Ok(Category::Professional),
            "commercial" => Ok(Category::Commercial),
            "news" => Ok(Category::News),
            "social" => Ok(Category::Social),
            "other" => Ok(Category::Other),
            other => Err(format!("unknown category '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Frequency {
    Frequent,
    Regular,
    Occasional,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Level {
    High,
    Medium,
    Low,
}

/// Aggregated view of one newsletter sender.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub sender: String,
    pub sender_email: String,
    pub total_emails: usize,
    pub category: Category,
    pub frequency: Frequency,
    pub engagement: Level,
    pub reliability: Level,
    pub has_unsubscribe_link: bool,
    pub has_list_id: bool,
    pub recent_subjects: Vec<String>,
    pub first_email_date: Option<DateTime<Utc>>,
    pub last_email_date: Option<DateTime<Utc>>,
}

/// Sender reference accepted by the bulk operations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SenderRef {
    #[serde(default)]
    pub sender: String,
    #[serde(alias = "email")]
    pub sender_email: String,
    #[serde(default)]
    pub total_emails: usize,
}

impl From<&Subscription> for SenderRef {
    fn from(sub: &Subscription) -> Self {
        Self {
            sender: sub.sender.clone(),
            sender_email: sub.sender_email.clone(),
            total_emails: sub.total_emails,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewsletterGroupItem {
    pub id: String,
    pub group_id: String,
    pub sender_email: String,
    pub sender_name: Option<String>,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewsletterGroup {
    pub id: String,
    pub user_email: String,
    pub group_name: String,
    pub description: Option<String>,
    pub color: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub newsletter_count: usize,
    pub newsletters: Vec<NewsletterGroupItem>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    Subscribed,
    Pending,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Subscribed => "SUBSCRIBED",
            SubscriptionStatus::Pending => "PENDING",
        }
    }

    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("SUBSCRIBED") {
            SubscriptionStatus::Subscribed
        } else {
            SubscriptionStatus::Pending
        }
    }
}

/// Outcome of a subscribe attempt, kept per (user, sender).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRecord {
    pub user_email: String,
    pub sender_email: String,
    pub sender_name: Option<String>,
    pub status: SubscriptionStatus,
    pub subscribe_link: Option<String>,
    pub subscribe_email: Option<String>,
    pub method: Option<String>,
    pub last_updated: DateTime<Utc>,
}
