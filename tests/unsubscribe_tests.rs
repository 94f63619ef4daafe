//! Unsubscribe flows against a wiremock site and a mocked Gmail client

mod common;

use common::{create_full_message, page, MockGmailClient};
use gmail_newsletters::config::HttpConfig;
use gmail_newsletters::error::GmailError;
use gmail_newsletters::unsubscribe::{self, UnsubscribeMethod};
use gmail_newsletters::web;
use wiremock::matchers::{body_string, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SENDER: &str = "news@brand.com";
const USER: &str = "me@mail.com";

/// Gmail side: one message with `headers`, filter and archive succeed
fn gmail_with(headers: Vec<(String, String)>, body: impl Into<String>) -> MockGmailClient {
    let body = body.into();
    let mut mock = MockGmailClient::new();
    mock.expect_list_messages()
        .withf(|q| q.query.as_deref() == Some("from:news@brand.com"))
        .returning(|_| Ok(page(&["newest", "older"], None)));
    mock.expect_get_full()
        .withf(|id| id == "newest")
        .returning(move |id| {
            let pairs: Vec<(&str, &str)> = headers.iter().map(|(n, v)| (n.as_str(), v.as_str())).collect();
            Ok(create_full_message(id, &pairs, &body))
        });
    mock.expect_create_filter()
        .withf(|f| f.from.as_deref() == Some(SENDER) && f.adds("TRASH"))
        .times(1)
        .returning(|_| Ok("filter-1".to_string()));
    mock.expect_batch_modify()
        .withf(|ids, add, remove| {
            ids.len() == 2 && add.is_empty() && remove.iter().any(|l| l == "INBOX")
        })
        .times(1)
        .returning(|ids, _, _| Ok(ids.len()));
    mock
}

fn http() -> (reqwest::Client, HttpConfig) {
    let config = HttpConfig::default();
    (web::build_http_client(&config).unwrap(), config)
}

#[tokio::test]
async fn test_one_click_unsubscribe() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/one-click"))
        .and(body_string("List-Unsubscribe=One-Click"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let header = format!("<{}/one-click>, <mailto:leave@brand.com>", server.uri());
    let gmail = gmail_with(
        vec![
            ("List-Unsubscribe".to_string(), header),
            ("List-Unsubscribe-Post".to_string(), "List-Unsubscribe=One-Click".to_string()),
        ],
        "",
    );
    let (client, config) = http();

    let report = unsubscribe::unsubscribe(&gmail, &client, &config, SENDER, USER)
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.method, Some(UnsubscribeMethod::OneClickGmail));
    assert!(report.found_one_click);
    assert!(report.found_list_unsubscribe);
    assert!(!report.found_in_content);
    assert!(report.filter_created);
    assert_eq!(report.archived_count, 2);
}

#[tokio::test]
async fn test_link_flow_submits_unsubscribe_form() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/unsubscribe"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body>
                <p>Sorry to see you go.</p>
                <form action="/confirm" method="post">
                    <button type="submit">Unsubscribe</button>
                </form>
            </body></html>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/confirm"))
        .and(body_string_contains("email=me%40mail.com"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><body>You have been unsubscribed.</body></html>"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let header = format!("<{}/unsubscribe>", server.uri());
    let gmail = gmail_with(vec![("List-Unsubscribe".to_string(), header)], "");
    let (client, config) = http();

    let report = unsubscribe::unsubscribe(&gmail, &client, &config, SENDER, USER)
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.method, Some(UnsubscribeMethod::GmailLinkFlow));
    assert!(!report.found_one_click);
    assert!(report.final_url.unwrap().ends_with("/confirm"));
    assert!(report.steps.iter().any(|s| s == "Form submitted"));
}

#[tokio::test]
async fn test_body_link_used_when_header_missing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/optout/42"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><body>You have been successfully unsubscribed.</body></html>"),
        )
        .mount(&server)
        .await;

    let body = format!("<a href=\"{}/optout/42\">Unsubscribe</a> from these emails", server.uri());
    let gmail = gmail_with(vec![("Subject".to_string(), "Deals".to_string())], body);
    let (client, config) = http();

    let report = unsubscribe::unsubscribe(&gmail, &client, &config, SENDER, USER)
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.method, Some(UnsubscribeMethod::AlternativeLink));
    assert!(report.found_in_content);
    assert!(report.button_url.is_none());
}

#[tokio::test]
async fn test_mailto_fallback_sends_email() {
    let mut gmail = gmail_with(
        vec![("List-Unsubscribe".to_string(), "<mailto:leave@brand.com?subject=stop>".to_string())],
        "",
    );
    gmail
        .expect_send_raw()
        .withf(|raw| raw.contains("To: leave@brand.com") && raw.contains("From: me@mail.com"))
        .times(1)
        .returning(|_| Ok(()));
    let (client, config) = http();

    let report = unsubscribe::unsubscribe(&gmail, &client, &config, SENDER, USER)
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.method, Some(UnsubscribeMethod::Email));
    assert_eq!(report.message, "Unsubscribe email sent");
}

#[tokio::test]
async fn test_no_method_still_filters_and_archives() {
    let gmail = gmail_with(vec![("Subject".to_string(), "Hello".to_string())], "plain text");
    let (client, config) = http();

    let report = unsubscribe::unsubscribe(&gmail, &client, &config, SENDER, USER)
        .await
        .unwrap();

    assert!(!report.success);
    assert!(report.method.is_none());
    assert!(report.filter_created);
    assert_eq!(report.archived_count, 2);
    assert!(report.message.contains("Automatic unsubscribe was not possible"));
}

#[tokio::test]
async fn test_unsubscribe_without_messages() {
    let mut gmail = MockGmailClient::new();
    gmail.expect_list_messages().returning(|_| Ok(page(&[], None)));
    let (client, config) = http();

    let err = unsubscribe::unsubscribe(&gmail, &client, &config, SENDER, USER)
        .await
        .unwrap_err();
    assert!(matches!(err, GmailError::NotFound(_)));
}

#[tokio::test]
async fn test_one_click_rejected_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let (client, config) = http();

    let accepted = unsubscribe::one_click_unsubscribe(&client, &config, &format!("{}/gone", server.uri()))
        .await
        .unwrap();
    assert!(!accepted);
}
