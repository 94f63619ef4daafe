//! HTTP client and page inspection shared by the unsubscribe and subscribe flows.

use reqwest::redirect::Policy;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use url::Url;

use crate::config::HttpConfig;
use crate::error::{GmailError, Result};

/// Phrases that confirm an unsubscribe went through
pub const SUCCESS_PHRASES: &[&str] = &[
    "successfully unsubscribed",
    "you have been unsubscribed",
    "unsubscribe successful",
    "you are now unsubscribed",
    "removed from our list",
    "successfully removed",
    "unsubscribed successfully",
];

const BUTTON_KEYWORDS: &[&str] = &["unsubscribe", "confirm", "remove"];

/// Client used for third-party pages: browser user agent, bounded redirects
pub fn build_http_client(config: &HttpConfig) -> Result<reqwest::Client> {
    reqwest::ClientBuilder::new()
        .use_rustls_tls()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.timeout_secs))
        .redirect(Policy::limited(config.max_redirects))
        .build()
        .map_err(|e| GmailError::HttpError(format!("Failed to build HTTP client: {}", e)))
}

/// An element that looks like an unsubscribe control
#[derive(Debug, Clone, PartialEq)]
pub struct ButtonCandidate {
    pub text: String,
    pub href: Option<String>,
    pub form_action: Option<String>,
}

/// Owned summary of an HTML page
#[derive(Debug, Clone, Default)]
pub struct PageInspection {
    /// Lowercased body text
    pub text: String,
    pub buttons: Vec<ButtonCandidate>,
}

impl PageInspection {
    pub fn has_success_phrase(&self) -> bool {
        contains_any(&self.text, SUCCESS_PHRASES)
    }
}

pub fn contains_any(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| text.contains(n))
}

/// Lowercased text content of `<body>` (or the whole document)
pub fn page_text(html: &str) -> String {
    let document = Html::parse_document(html);
    body_text(&document)
}

fn body_text(document: &Html) -> String {
    let text: String = match Selector::parse("body").ok().and_then(|sel| document.select(&sel).next()) {
        Some(body) => body.text().collect(),
        None => document.root_element().text().collect(),
    };
    text.to_lowercase()
}

/// Parse a page and pick up to `max_buttons` unsubscribe controls
pub fn inspect_page(html: &str, max_buttons: usize) -> PageInspection {
    let document = Html::parse_document(html);
    let mut inspection = PageInspection {
        text: body_text(&document),
        buttons: Vec::new(),
    };

    let Ok(selector) = Selector::parse("button, input[type=\"submit\"], a") else {
        return inspection;
    };

    for el in document.select(&selector) {
        if inspection.buttons.len() >= max_buttons {
            break;
        }
        let text = el.text().collect::<String>().trim().to_string();
        let value = el.value().attr("value").unwrap_or_default().to_lowercase();
        let href = el.value().attr("href").map(str::to_string);

        let lower_text = text.to_lowercase();
        let matches = contains_any(&lower_text, BUTTON_KEYWORDS)
            || value.contains("unsubscribe")
            || href
                .as_deref()
                .map(|h| h.to_lowercase().contains("unsubscribe"))
                .unwrap_or(false);

        if matches {
            inspection.buttons.push(ButtonCandidate {
                text,
                href,
                form_action: enclosing_form_action(el),
            });
        }
    }

    inspection
}

fn enclosing_form_action(el: ElementRef<'_>) -> Option<String> {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == "form")
        .and_then(|form| form.value().attr("action"))
        .map(str::to_string)
}

/// Resolve a possibly relative link against the page it came from
pub fn resolve_url(base: &str, href: &str) -> Result<String> {
    if href.starts_with("http://") || href.starts_with("https://") {
        return Ok(href.to_string());
    }
    let base = Url::parse(base).map_err(|e| GmailError::HttpError(format!("Invalid URL {}: {}", base, e)))?;
    base.join(href)
        .map(|u| u.to_string())
        .map_err(|e| GmailError::HttpError(format!("Invalid link {}: {}", href, e)))
}

/// Add `email=<address>` to a URL's query string
pub fn with_email_param(link: &str, email: &str) -> Result<String> {
    let mut url = Url::parse(link).map_err(|e| GmailError::HttpError(format!("Invalid URL {}: {}", link, e)))?;
    url.query_pairs_mut().append_pair("email", email);
    Ok(url.to_string())
}
