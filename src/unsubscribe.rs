//! Best-effort unsubscribe: RFC 8058 one-click, the unsubscribe page flow,
//! and a mailto fallback. Future mail is filtered and existing mail archived
//! whatever the outcome.

use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::client::{compose_plain_message, GmailClient};
use crate::config::HttpConfig;
use crate::content;
use crate::error::{GmailError, Result};
use crate::headers;
use crate::models::{FilterSpec, ListQuery};
use crate::web::{self, contains_any, SUCCESS_PHRASES};

/// Messages listed for the sender; the newest is inspected
const LISTED_MESSAGES: u32 = 10;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum UnsubscribeMethod {
    OneClickGmail,
    GmailLinkFlow,
    AlternativeLink,
    Email,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UnsubscribeReport {
    pub success: bool,
    pub method: Option<UnsubscribeMethod>,
    pub message: String,
    pub steps: Vec<String>,
    pub final_url: Option<String>,
    pub filter_created: bool,
    pub archived_count: usize,
    pub button_url: Option<String>,
    pub found_one_click: bool,
    pub found_list_unsubscribe: bool,
    pub found_in_content: bool,
}

/// Result of following one unsubscribe link
#[derive(Debug, Clone, Default)]
pub struct LinkOutcome {
    pub success: bool,
    pub message: String,
    pub steps: Vec<String>,
    pub final_url: Option<String>,
}

/// Unsubscribe from `sender_email` on behalf of `user_email`
pub async fn unsubscribe(
    client: &dyn GmailClient,
    http: &reqwest::Client,
    config: &HttpConfig,
    sender_email: &str,
    user_email: &str,
) -> Result<UnsubscribeReport> {
    let listed = client
        .list_messages(&ListQuery::new(format!("from:{}", sender_email), LISTED_MESSAGES))
        .await?;
    let Some(newest) = listed.ids.first() else {
        return Err(GmailError::NotFound(format!("No messages found from {}", sender_email)));
    };

    let message = client.get_full(newest).await?;
    let list_unsubscribe = message.header("List-Unsubscribe").unwrap_or_default().to_string();
    let one_click = message.header("List-Unsubscribe-Post").is_some();

    let targets = headers::parse_list_header(&list_unsubscribe);
    let button_url = targets.primary_url().map(str::to_string);
    let body_link = if button_url.is_none() {
        content::find_unsubscribe_link(&message.bodies)
    } else {
        None
    };
    let link = button_url.clone().or_else(|| body_link.clone());

    let mut report = UnsubscribeReport {
        success: false,
        method: None,
        message: String::new(),
        steps: Vec::new(),
        final_url: None,
        filter_created: false,
        archived_count: 0,
        button_url: button_url.clone(),
        found_one_click: one_click,
        found_list_unsubscribe: !list_unsubscribe.is_empty(),
        found_in_content: body_link.is_some(),
    };

    if let (true, Some(url)) = (one_click, button_url.as_deref()) {
        report.steps.push("Trying one-click unsubscribe...".to_string());
        match one_click_unsubscribe(http, config, url).await {
            Ok(true) => {
                report.steps.push("One-click unsubscribe succeeded".to_string());
                succeed(
                    &mut report,
                    UnsubscribeMethod::OneClickGmail,
                    "Unsubscribed with one-click".to_string(),
                    None,
                );
            }
            Ok(false) => report.steps.push("One-click failed, trying next method...".to_string()),
            Err(e) => report.steps.push(format!("One-click error: {}", e)),
        }
    }

    if let (false, Some(url)) = (report.success, button_url.as_deref()) {
        report.steps.push(format!("Opening unsubscribe link: {}", url));
        let outcome = follow_unsubscribe_link(http, config, url, user_email).await;
        report.steps.extend(outcome.steps);
        if outcome.success {
            succeed(&mut report, UnsubscribeMethod::GmailLinkFlow, outcome.message, outcome.final_url);
        }
    }

    if let Some(alt) = link.as_deref().filter(|l| Some(*l) != button_url.as_deref()) {
        if !report.success {
            report.steps.push(format!("Trying alternative link: {}", alt));
            let outcome = follow_unsubscribe_link(http, config, alt, user_email).await;
            report.steps.extend(outcome.steps);
            if outcome.success {
                succeed(&mut report, UnsubscribeMethod::AlternativeLink, outcome.message, outcome.final_url);
            }
        }
    }

    if let (false, Some(address)) = (report.success, targets.mailto.as_deref()) {
        report.steps.push(format!("Sending unsubscribe email to {}", address));
        match send_unsubscribe_email(client, address, user_email).await {
            Ok(()) => {
                report.steps.push("Unsubscribe email sent".to_string());
                succeed(
                    &mut report,
                    UnsubscribeMethod::Email,
                    "Unsubscribe email sent".to_string(),
                    None,
                );
            }
            Err(e) => report.steps.push(format!("Failed to send email: {}", e)),
        }
    }

    match client.create_filter(&FilterSpec::from_sender(sender_email, "TRASH")).await {
        Ok(_) => {
            report.filter_created = true;
            report.steps.push("Gmail filter created".to_string());
        }
        Err(e) => {
            warn!("Filter creation failed for {}: {}", sender_email, e);
            report.steps.push("Could not create filter".to_string());
        }
    }

    match client
        .batch_modify(&listed.ids, &[], &["UNREAD".to_string(), "INBOX".to_string()])
        .await
    {
        Ok(n) => {
            report.archived_count = n;
            report.steps.push(format!("{} messages archived", n));
        }
        Err(e) => {
            warn!("Archiving failed for {}: {}", sender_email, e);
            report.steps.push("Could not archive messages".to_string());
        }
    }

    if !report.success {
        report.message =
            "Filter created and messages archived. Automatic unsubscribe was not possible.".to_string();
    }
    info!(
        "Unsubscribe from {}: success={} method={:?}",
        sender_email, report.success, report.method
    );

    Ok(report)
}

fn succeed(report: &mut UnsubscribeReport, method: UnsubscribeMethod, message: String, final_url: Option<String>) {
    report.success = true;
    report.method = Some(method);
    report.message = message;
    if final_url.is_some() {
        report.final_url = final_url;
    }
}

/// RFC 8058 POST; any 2xx/3xx status counts
pub async fn one_click_unsubscribe(http: &reqwest::Client, config: &HttpConfig, url: &str) -> Result<bool> {
    let response = http
        .post(url)
        .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body("List-Unsubscribe=One-Click")
        .timeout(Duration::from_secs(config.one_click_timeout_secs))
        .send()
        .await?;

    let status = response.status();
    debug!("One-click POST to {} returned {}", url, status);
    Ok(status.is_success() || status.is_redirection())
}

/// Open an unsubscribe page and try to complete it the way a person would
pub async fn follow_unsubscribe_link(
    http: &reqwest::Client,
    config: &HttpConfig,
    url: &str,
    user_email: &str,
) -> LinkOutcome {
    let mut outcome = LinkOutcome::default();
    outcome.steps.push("Opening unsubscribe page...".to_string());

    let response = match http
        .get(url)
        .header(
            reqwest::header::ACCEPT,
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        )
        .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
        .send()
        .await
    {
        Ok(r) if r.status().as_u16() < 500 => r,
        Ok(r) => {
            outcome.message = format!("Unsubscribe page returned {}", r.status());
            outcome.steps.push(format!("Error: {}", outcome.message));
            return outcome;
        }
        Err(e) => {
            outcome.message = e.to_string();
            outcome.steps.push(format!("Error: {}", e));
            return outcome;
        }
    };

    let final_url = response.url().to_string();
    outcome.final_url = Some(final_url.clone());
    outcome.steps.push(format!("Page loaded: {}", final_url));

    let body = response.text().await.unwrap_or_default();
    let page = web::inspect_page(&body, config.max_buttons);

    if page.has_success_phrase() {
        outcome.steps.push("Unsubscribe confirmed on page load".to_string());
        return done(outcome, "Unsubscribed by opening the link", None);
    }

    outcome.steps.push("Looking for an unsubscribe button...".to_string());
    if !page.buttons.is_empty() {
        outcome.steps.push(format!("Found {} candidate button(s)", page.buttons.len()));
    }

    for button in &page.buttons {
        outcome.steps.push(format!("Trying button: \"{}\"", button.text));

        if let Some(href) = button.href.as_deref().filter(|h| h.starts_with("http")) {
            match http.get(href).header(reqwest::header::REFERER, &final_url).send().await {
                Ok(r) => {
                    let landed = r.url().to_string();
                    let text = web::page_text(&r.text().await.unwrap_or_default());
                    if contains_any(&text, SUCCESS_PHRASES) {
                        outcome.steps.push("Unsubscribe succeeded".to_string());
                        return done(outcome, "Unsubscribed after clicking the button", Some(landed));
                    }
                }
                Err(e) => outcome.steps.push(format!("Click failed: {}", e)),
            }
        }

        if let Some(action) = button.form_action.as_deref() {
            match submit_form(http, &final_url, action, user_email).await {
                Ok((true, landed)) => {
                    outcome.steps.push("Form submitted".to_string());
                    return done(outcome, "Unsubscribed after submitting the form", Some(landed));
                }
                Ok((false, _)) => {}
                Err(e) => outcome.steps.push(format!("Form submission failed: {}", e)),
            }
        }
    }

    outcome.steps.push("Trying a direct POST...".to_string());
    let payload = json!({ "email": user_email, "action": "unsubscribe", "confirm": "yes" });
    match http.post(&final_url).json(&payload).send().await {
        Ok(r) => {
            let text = web::page_text(&r.text().await.unwrap_or_default());
            if contains_any(&text, SUCCESS_PHRASES) {
                outcome.steps.push("Direct POST succeeded".to_string());
                return done(outcome, "Unsubscribed with a direct POST", None);
            }
        }
        Err(e) => outcome.steps.push(format!("Direct POST failed: {}", e)),
    }

    outcome.steps.push("Could not complete the unsubscribe automatically".to_string());
    outcome.message = "Manual action required".to_string();
    outcome
}

fn done(mut outcome: LinkOutcome, message: &str, final_url: Option<String>) -> LinkOutcome {
    outcome.success = true;
    outcome.message = message.to_string();
    if final_url.is_some() {
        outcome.final_url = final_url;
    }
    outcome
}

async fn submit_form(
    http: &reqwest::Client,
    page_url: &str,
    action: &str,
    user_email: &str,
) -> Result<(bool, String)> {
    let form_url = web::resolve_url(page_url, action)?;
    let response = http
        .post(&form_url)
        .header(reqwest::header::REFERER, page_url)
        .form(&[("email", user_email), ("unsubscribe", "true"), ("confirm", "yes")])
        .send()
        .await?;

    let landed = response.url().to_string();
    let text = web::page_text(&response.text().await?);
    Ok((contains_any(&text, SUCCESS_PHRASES), landed))
}

async fn send_unsubscribe_email(client: &dyn GmailClient, to: &str, user_email: &str) -> Result<()> {
    let raw = compose_plain_message(
        user_email,
        to,
        "Unsubscribe Request",
        "Please unsubscribe this email address from your mailing list.",
    );
    client.send_raw(&raw).await
}
