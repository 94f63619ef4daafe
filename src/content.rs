//! Scans decoded message bodies for unsubscribe and subscribe targets.

use once_cell::sync::Lazy;
use regex::Regex;

static UNSUBSCRIBE_TEXT: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)unsubscribe").unwrap(),
        Regex::new(r"(?i)opt-out").unwrap(),
        Regex::new(r"(?i)cancelar suscripci[óo]n").unwrap(),
        Regex::new(r"(?i)darse de baja").unwrap(),
    ]
});

static UNSUBSCRIBE_LINKS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(
            r#"(?i)https?://[^\s<>"]+?(?:unsubscribe|opt-?out|remove|cancelar|unsub|preferences)[^\s<>"]{0,100}"#,
        )
        .unwrap(),
        Regex::new(
            r#"(?i)<a[^>]+?href=["']([^"']+?(?:unsubscribe|opt-?out|remove|cancelar|unsub)[^"']+?)["'][^>]*>"#,
        )
        .unwrap(),
    ]
});

static SUBSCRIBE_LINKS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r#"(?i)https?://[^\s<>"]+?(?:subscribe|signup|sign-up|join|newsletter)[^\s<>"]{0,100}"#)
            .unwrap(),
        Regex::new(
            r#"(?i)<a[^>]+?href=["']([^"']+?(?:subscribe|signup|sign-up|join|newsletter)[^"']+?)["'][^>]*>"#,
        )
        .unwrap(),
    ]
});

static SUBSCRIBE_MAILTO: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r#"(?i)mailto:([^\s<>"]+?(?:subscribe|join|list)[^\s<>"]*)"#).unwrap(),
        Regex::new(r#"(?i)<a[^>]+?href=["']mailto:([^"'?]+)[^"']*["'][^>]*subscribe[^>]*>"#).unwrap(),
    ]
});

static WEBSITE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)https?://(?:www\.)?[a-z0-9-]+\.[a-z]{2,}/?").unwrap());

static URL: Lazy<Regex> = Lazy::new(|| Regex::new(r#"https?://[^\s<>"']+"#).unwrap());

/// Links and addresses that may accept a subscription.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscribeTargets {
    pub link: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
}

impl SubscribeTargets {
    pub fn is_empty(&self) -> bool {
        self.link.is_none() && self.email.is_none() && self.website.is_none()
    }
}

pub fn has_unsubscribe_text(bodies: &[String]) -> bool {
    bodies
        .iter()
        .any(|body| UNSUBSCRIBE_TEXT.iter().any(|re| re.is_match(body)))
}

pub fn find_unsubscribe_link(bodies: &[String]) -> Option<String> {
    bodies.iter().find_map(|body| first_link(body, &UNSUBSCRIBE_LINKS))
}

pub fn find_subscribe_targets(bodies: &[String]) -> SubscribeTargets {
    let mut targets = SubscribeTargets::default();

    for body in bodies {
        if targets.link.is_none() {
            targets.link = first_link(body, &SUBSCRIBE_LINKS);
        }
        if targets.email.is_none() {
            targets.email = subscribe_address(body);
        }
        if targets.website.is_none() {
            targets.website = WEBSITE.find(body).map(|m| m.as_str().to_string());
        }
        if targets.link.is_some() {
            break;
        }
    }

    targets
}

/// First URL matched by any pattern, tried in order.
fn first_link(body: &str, patterns: &[Regex]) -> Option<String> {
    patterns.iter().find_map(|re| {
        let matched = re.find(body)?;
        let url = URL.find(matched.as_str())?;
        let cleaned = clean_url(url.as_str());
        (!cleaned.is_empty()).then_some(cleaned)
    })
}

fn subscribe_address(body: &str) -> Option<String> {
    SUBSCRIBE_MAILTO.iter().find_map(|re| {
        re.captures_iter(body)
            .filter_map(|c| c.get(1))
            .map(|m| {
                m.as_str()
                    .split('?')
                    .next()
                    .unwrap_or_default()
                    .trim_matches(|c| matches!(c, '<' | '>' | '"'))
                    .to_string()
            })
            // leave-list addresses also contain "subscribe"
            .find(|addr| addr.contains('@') && !addr.to_lowercase().contains("unsub"))
    })
}

fn clean_url(raw: &str) -> String {
    raw.replace("&amp;", "&")
        .trim_end_matches(['.', ',', ';', ')'])
        .to_string()
}
