//! Subscribe (or re-subscribe) to a sender: mail the list address, hit the
//! subscribe link, or point at the website's signup form. Blocking filters
//! are removed and recent mail restored to the inbox.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::client::{compose_plain_message, GmailClient};
use crate::content::{self, SubscribeTargets};
use crate::error::Result;
use crate::groups::NewsletterStore;
use crate::headers;
use crate::models::{ListQuery, SubscriptionRecord, SubscriptionStatus};
use crate::web;

const LISTED_MESSAGES: u32 = 20;
const SCANNED_MESSAGES: usize = 10;
const RESTORED_MESSAGES: usize = 50;

/// Subject and body variants tried in order
const SUBSCRIBE_EMAILS: &[(&str, &str)] = &[
    ("Subscribe", "Please subscribe this email address to your mailing list."),
    ("Subscribe Request", "subscribe"),
    ("Newsletter Subscription", "I would like to subscribe to your newsletter."),
];

const CONFIRMATION_KEYWORDS: &[&str] = &[
    "confirm",
    "verification",
    "check your email",
    "verify",
    "activation",
    "pending",
];

const SIGNUP_KEYWORDS: &[&str] = &["subscribe", "newsletter", "signup", "join our list"];

static FORM_ACTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<form[^>]+action=["']([^"']+)["'][^>]*>"#).unwrap());

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SubscribeMethod {
    Email,
    HttpLink,
    WebsiteForm,
}

impl SubscribeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscribeMethod::Email => "email",
            SubscribeMethod::HttpLink => "http-link",
            SubscribeMethod::WebsiteForm => "website-form",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeReport {
    pub success: bool,
    pub method: Option<SubscribeMethod>,
    pub message: String,
    pub requires_manual_action: bool,
    pub subscribe_link: Option<String>,
    pub subscribe_email: Option<String>,
    pub restored_count: usize,
}

/// Outcome of an HTTP subscribe attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpSubscribe {
    pub success: bool,
    pub requires_confirmation: bool,
}

/// Subscribe `user_email` to `sender_email`
pub async fn subscribe(
    client: &dyn GmailClient,
    http: &reqwest::Client,
    store: &NewsletterStore,
    sender_email: &str,
    sender_name: &str,
    user_email: &str,
) -> Result<SubscribeReport> {
    let listed = client
        .list_messages(&ListQuery::new(format!("from:{}", sender_email), LISTED_MESSAGES).include_spam_trash())
        .await?;

    let targets = find_targets(client, &listed.ids).await;
    debug!("Subscribe targets for {}: {:?}", sender_email, targets);

    let mut success = false;
    let mut method = None;
    let mut requires_manual_action = false;
    let mut message = String::new();

    if let Some(address) = targets.email.as_deref() {
        match send_subscribe_email(client, address, user_email).await {
            Ok(()) => {
                success = true;
                method = Some(SubscribeMethod::Email);
                message = "Subscription email sent".to_string();
            }
            Err(e) => warn!("Subscribe email to {} failed: {}", address, e),
        }
    }

    if let (false, Some(link)) = (success, targets.link.as_deref()) {
        let outcome = http_subscribe(http, link, user_email).await;
        if outcome.success {
            success = true;
            method = Some(SubscribeMethod::HttpLink);
            requires_manual_action = outcome.requires_confirmation;
            message = "Subscription submitted through the link".to_string();
        }
    }

    let mut form_url = None;
    if let (false, None, Some(site)) = (success, targets.link.as_deref(), targets.website.as_deref()) {
        if let Some(found) = find_signup_form(http, site).await {
            method = Some(SubscribeMethod::WebsiteForm);
            requires_manual_action = true;
            form_url = Some(found);
        }
    }

    let subscribe_link = form_url
        .clone()
        .or_else(|| targets.link.clone())
        .or_else(|| targets.website.clone());

    let record = SubscriptionRecord {
        user_email: user_email.to_string(),
        sender_email: sender_email.to_string(),
        sender_name: Some(sender_name.to_string()).filter(|s| !s.is_empty()),
        status: if success {
            SubscriptionStatus::Subscribed
        } else {
            SubscriptionStatus::Pending
        },
        subscribe_link: targets.link.clone().or_else(|| targets.website.clone()),
        subscribe_email: targets.email.clone(),
        method: method.map(|m| m.as_str().to_string()),
        last_updated: Utc::now(),
    };
    if let Err(e) = store.upsert_subscription_record(&record) {
        warn!("Could not save subscription record for {}: {}", sender_email, e);
    }

    match remove_blocking_filters(client, sender_email).await {
        Ok(n) if n > 0 => info!("Removed {} blocking filter(s) for {}", n, sender_email),
        Ok(_) => {}
        Err(e) => warn!("Failed to remove filters for {}: {}", sender_email, e),
    }

    let mut restored_count = 0;
    if success && !listed.ids.is_empty() {
        let ids: Vec<String> = listed.ids.iter().take(RESTORED_MESSAGES).cloned().collect();
        match client
            .batch_modify(&ids, &["INBOX".to_string()], &["SPAM".to_string(), "TRASH".to_string()])
            .await
        {
            Ok(n) => restored_count = n,
            Err(e) => warn!("Failed to restore messages from {}: {}", sender_email, e),
        }
    }

    if !success {
        message = if requires_manual_action {
            "A subscription form was found. Please complete it manually.".to_string()
        } else {
            "No automatic subscription method found. Try contacting the sender directly.".to_string()
        };
    }

    Ok(SubscribeReport {
        success: success || method.is_some(),
        method,
        message,
        requires_manual_action,
        subscribe_link,
        subscribe_email: targets.email,
        restored_count,
    })
}

/// Scan listed messages for subscribe targets, stopping at the first link or address
async fn find_targets(client: &dyn GmailClient, ids: &[String]) -> SubscribeTargets {
    let mut targets = SubscribeTargets::default();

    for id in ids.iter().take(SCANNED_MESSAGES) {
        let message = match client.get_full(id).await {
            Ok(m) => m,
            Err(e) => {
                debug!("Skipping message {}: {}", id, e);
                continue;
            }
        };

        if let Some(list_subscribe) = message.header("List-Subscribe") {
            let header = headers::parse_list_header(list_subscribe);
            if let Some(url) = header.primary_url() {
                targets.link = Some(url.to_string());
            }
            if header.mailto.is_some() {
                targets.email = header.mailto;
            }
        }

        if targets.link.is_none() {
            let found = content::find_subscribe_targets(&message.bodies);
            targets.link = found.link;
            if found.email.is_some() {
                targets.email = found.email;
            }
            if found.website.is_some() {
                targets.website = found.website;
            }
        }

        if targets.link.is_some() || targets.email.is_some() {
            break;
        }
    }

    targets
}

async fn send_subscribe_email(client: &dyn GmailClient, to: &str, user_email: &str) -> Result<()> {
    let mut last_error = None;

    for (subject, body) in SUBSCRIBE_EMAILS {
        match client.send_raw(&compose_plain_message(user_email, to, subject, body)).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                debug!("Subscribe email variant '{}' failed: {}", subject, e);
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

pub fn requires_confirmation(body: &str) -> bool {
    let lower = body.to_lowercase();
    web::contains_any(&lower, CONFIRMATION_KEYWORDS)
}

/// POST JSON to API-looking links, then fall back to GET with `email=`
pub async fn http_subscribe(http: &reqwest::Client, link: &str, user_email: &str) -> HttpSubscribe {
    let lower = link.to_lowercase();

    if lower.contains("api") || lower.contains("subscribe") {
        let payload = json!({ "email": user_email, "subscribe": true, "action": "subscribe" });
        match http.post(link).json(&payload).send().await {
            Ok(r) if r.status().is_success() || r.status().is_redirection() => {
                let body = r.text().await.unwrap_or_default();
                return HttpSubscribe {
                    success: true,
                    requires_confirmation: requires_confirmation(&body),
                };
            }
            Ok(r) => debug!("POST {} returned {}, trying GET", link, r.status()),
            Err(e) => debug!("POST {} failed ({}), trying GET", link, e),
        }
    }

    let get_url = match web::with_email_param(link, user_email) {
        Ok(url) => url,
        Err(e) => {
            debug!("Cannot build GET url for {}: {}", link, e);
            return HttpSubscribe {
                success: false,
                requires_confirmation: true,
            };
        }
    };

    match http.get(&get_url).send().await {
        Ok(r) if r.status().is_success() || r.status().is_redirection() => {
            let body = r.text().await.unwrap_or_default();
            HttpSubscribe {
                success: true,
                requires_confirmation: requires_confirmation(&body),
            }
        }
        Ok(r) => {
            debug!("GET {} returned {}", get_url, r.status());
            HttpSubscribe {
                success: false,
                requires_confirmation: true,
            }
        }
        Err(e) => {
            debug!("GET {} failed: {}", get_url, e);
            HttpSubscribe {
                success: false,
                requires_confirmation: true,
            }
        }
    }
}

/// Signup form URL on the sender's website, or the site itself when it
/// mentions subscribing but has no form action
pub async fn find_signup_form(http: &reqwest::Client, site: &str) -> Option<String> {
    let response = match http.get(site).send().await {
        Ok(r) => r,
        Err(e) => {
            debug!("Website {} unreachable: {}", site, e);
            return None;
        }
    };
    let html = response.text().await.ok()?;

    if !web::contains_any(&html.to_lowercase(), SIGNUP_KEYWORDS) {
        return None;
    }

    let action = FORM_ACTION
        .captures(&html)
        .and_then(|c| c.get(1))
        .and_then(|m| web::resolve_url(site, m.as_str()).ok());

    Some(action.unwrap_or_else(|| site.to_string()))
}

/// Delete `from:` filters for the sender that skip the inbox or send to spam/trash
pub async fn remove_blocking_filters(client: &dyn GmailClient, sender_email: &str) -> Result<usize> {
    let sender = sender_email.to_lowercase();
    let mut removed = 0;

    for filter in client.list_filters().await? {
        let from_sender = filter
            .from
            .as_deref()
            .map(|f| f.trim().to_lowercase() == sender)
            .unwrap_or(false);
        let blocks = filter.removes("INBOX") || filter.adds("TRASH") || filter.adds("SPAM");

        if let (true, true, Some(id)) = (from_sender, blocks, filter.id.as_deref()) {
            match client.delete_filter(id).await {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to delete filter {}: {}", id, e),
            }
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_confirmation() {
        assert!(requires_confirmation("Please CHECK YOUR EMAIL to finish"));
        assert!(requires_confirmation(r#"{"status":"pending"}"#));
        assert!(!requires_confirmation("Welcome aboard!"));
    }

    #[test]
    fn test_method_names() {
        assert_eq!(serde_json::to_value(SubscribeMethod::HttpLink).unwrap(), "http-link");
        assert_eq!(SubscribeMethod::WebsiteForm.as_str(), "website-form");
    }

    #[test]
    fn test_form_action_regex() {
        let html = r#"<div><form class="signup" action="/newsletter/join" method="post"></form></div>"#;
        let action = FORM_ACTION.captures(html).and_then(|c| c.get(1)).map(|m| m.as_str());
        assert_eq!(action, Some("/newsletter/join"));
    }
}
