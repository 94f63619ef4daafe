//! Sender heuristics: category, cadence, engagement and newsletter detection

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::content;
use crate::models::{Category, FilterSpec, Frequency, Level, MessageContent};

/// Sender keywords per category, checked in order.
static SENDER_KEYWORDS: Lazy<Vec<(Category, Vec<&'static str>)>> = Lazy::new(|| {
    vec![
        (
            Category::Professional,
            vec!["github", "linkedin", "gitlab", "jira", "atlassian", "slack"],
        ),
        (
            Category::Commercial,
            vec!["shop", "store", "buy", "deal", "sale", "offer", "promo", "order"],
        ),
        (
            Category::News,
            vec!["news", "newsletter", "digest", "weekly", "daily", "bulletin"],
        ),
        (
            Category::Social,
            vec!["social", "community", "facebook", "twitter", "instagram", "meetup", "reddit"],
        ),
    ]
});

static SUBJECT_PATTERNS: Lazy<SubjectPatterns> = Lazy::new(|| SubjectPatterns {
    professional: Regex::new(r"(?i)(pull request|merge request|build (failed|passed)|job alert|invitation to connect)")
        .unwrap(),
    commercial: Regex::new(r"(?i)(sale|discount|offer|deal|promo|coupon|% off|order)").unwrap(),
    news: Regex::new(r"(?i)(newsletter|digest|weekly|daily|bulletin|edition|issue #?\d+)").unwrap(),
    social: Regex::new(r"(?i)(mentioned you|new follower|friend request|commented on|community)")
        .unwrap(),
});

struct SubjectPatterns {
    professional: Regex,
    commercial: Regex,
    news: Regex,
    social: Regex,
}

const NEWSLETTER_SUBJECT_KEYWORDS: &[&str] = &[
    "newsletter",
    "update",
    "digest",
    "weekly",
    "monthly",
    "subscription",
    "boletín",
    "noticia",
    "actualización",
];

static BRACKET_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[([^\]]+)\]").unwrap());
static COLON_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([^:]+):").unwrap());

/// Category from sender identity, falling back to subject lines.
pub fn categorize(sender_name: &str, sender_email: &str, subjects: &[String]) -> Category {
    let text = format!("{}{}", sender_name, sender_email).to_lowercase();

    for (category, keywords) in SENDER_KEYWORDS.iter() {
        if keywords.iter().any(|k| text.contains(k)) {
            return *category;
        }
    }

    let patterns = &*SUBJECT_PATTERNS;
    let checks = [
        (&patterns.professional, Category::Professional),
        (&patterns.commercial, Category::Commercial),
        (&patterns.news, Category::News),
        (&patterns.social, Category::Social),
    ];

    // Majority of subjects must agree
    for (re, category) in checks {
        let hits = subjects.iter().filter(|s| re.is_match(s)).count();
        if hits > 0 && hits * 2 >= subjects.len() {
            return category;
        }
    }

    Category::Other
}

pub fn frequency(total_emails: usize) -> Frequency {
    if total_emails > 10 {
        Frequency::Frequent
    } else if total_emails > 5 {
        Frequency::Regular
    } else {
        Frequency::Occasional
    }
}

/// Engagement from the share of messages already read.
pub fn engagement(total_emails: usize, unread: usize) -> Level {
    if total_emails == 0 {
        return Level::Low;
    }
    let read_ratio = 1.0 - (unread.min(total_emails) as f64 / total_emails as f64);

    if read_ratio >= 0.7 {
        Level::High
    } else if read_ratio >= 0.3 {
        Level::Medium
    } else {
        Level::Low
    }
}

/// How well-behaved the sender is as a mailing list.
pub fn reliability(total_emails: usize, list_unsubscribe_count: usize, has_list_id: bool) -> Level {
    let consistent_unsubscribe = total_emails > 0 && list_unsubscribe_count * 2 >= total_emails;

    match (consistent_unsubscribe, has_list_id) {
        (true, true) => Level::High,
        (true, false) | (false, true) => Level::Medium,
        (false, false) => Level::Low,
    }
}

/// Signals gathered from a sample of full messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsletterPatterns {
    pub is_newsletter: bool,
    pub has_list_unsubscribe: bool,
    pub has_newsletter_keywords: bool,
    pub has_unsubscribe_link: bool,
    pub common_subject_prefix: Option<String>,
    pub list_id: Option<String>,
    pub score: u32,
}

pub fn detect_newsletter_patterns(messages: &[MessageContent]) -> NewsletterPatterns {
    let mut patterns = NewsletterPatterns::default();
    let mut subjects = Vec::with_capacity(messages.len());

    for message in messages {
        if message.header("List-Unsubscribe").is_some() {
            patterns.has_list_unsubscribe = true;
        }
        if patterns.list_id.is_none() {
            patterns.list_id = message.header("List-Id").map(str::to_string);
        }
        if content::has_unsubscribe_text(&message.bodies) {
            patterns.has_unsubscribe_link = true;
        }

        let subject = message.subject().to_string();
        let lower = subject.to_lowercase();
        if NEWSLETTER_SUBJECT_KEYWORDS.iter().any(|k| lower.contains(k)) {
            patterns.has_newsletter_keywords = true;
        }
        subjects.push(subject);
    }

    patterns.common_subject_prefix = find_common_prefix(&subjects);

    patterns.score = (if patterns.has_list_unsubscribe { 3 } else { 0 })
        + (if patterns.has_unsubscribe_link { 2 } else { 0 })
        + (if patterns.has_newsletter_keywords { 2 } else { 0 })
        + (if patterns.list_id.is_some() { 2 } else { 0 })
        + (if patterns.common_subject_prefix.is_some() { 1 } else { 0 });
    patterns.is_newsletter = patterns.score >= 3;

    patterns
}

/// Shared subject prefix such as `[Weekly]`, `Digest:` or a leading word.
///
/// Needs at least three subjects; a candidate must cover 70% of them.
pub fn find_common_prefix(subjects: &[String]) -> Option<String> {
    if subjects.len() < 3 {
        return None;
    }
    let covers = |count: usize| count as f64 >= subjects.len() as f64 * 0.7;

    let brackets: Vec<&str> = subjects
        .iter()
        .filter_map(|s| BRACKET_PREFIX.captures(s).and_then(|c| c.get(1)))
        .map(|m| m.as_str())
        .collect();
    if covers(brackets.len()) {
        return Some(format!("[{}]", brackets[0]));
    }

    let colons: Vec<&str> = subjects
        .iter()
        .filter_map(|s| COLON_PREFIX.captures(s).and_then(|c| c.get(1)))
        .map(|m| m.as_str())
        .collect();
    if covers(colons.len()) {
        return Some(format!("{}:", colons[0]));
    }

    let mut counts: Vec<(&str, usize)> = Vec::new();
    for subject in subjects {
        let word = subject.split(' ').next().unwrap_or_default();
        match counts.iter_mut().find(|(w, _)| *w == word) {
            Some((_, n)) => *n += 1,
            None => counts.push((word, 1)),
        }
    }
    // First-seen word wins ties
    let (word, count) = counts
        .iter()
        .fold(None::<(&str, usize)>, |best, &(w, n)| match best {
            Some((_, bn)) if bn >= n => best,
            _ => Some((w, n)),
        })?;

    (covers(count) && !word.is_empty()).then(|| word.to_string())
}

/// Filter applied to future mail after marking a sender as spam.
pub fn spam_filter_for(sender_email: &str, patterns: &NewsletterPatterns) -> FilterSpec {
    let mut filter = FilterSpec::from_sender(sender_email, "SPAM");

    if let Some(prefix) = &patterns.common_subject_prefix {
        let subject: String = prefix.chars().filter(|c| !matches!(c, ':' | '[' | ']')).collect();
        let subject = subject.trim();
        if !subject.is_empty() {
            filter.subject = Some(subject.to_string());
        }
    } else if patterns.has_newsletter_keywords {
        filter.query = Some(format!(
            "from:{} (newsletter OR subscription OR update OR digest)",
            sender_email
        ));
    }

    filter
}
