//! Gmail Newsletter Manager
//!
//! Finds the newsletters in a Gmail mailbox and helps get rid of (or get
//! back) the ones you no longer read.
//!
//! # Overview
//!
//! - **Authentication**: OAuth2 installed-app flow with token caching and logout
//! - **Analysis**: Concurrent header scans that aggregate mail per sender and
//!   classify each sender by category, frequency and engagement
//! - **Bulk Actions**: Move a sender's mail to spam (and back) with filters
//!   that keep future mail in the right place
//! - **Unsubscribe / Subscribe**: RFC 8058 one-click, unsubscribe page flows
//!   and mailto fallbacks, plus re-subscription
//! - **Groups**: User-defined newsletter groups persisted in SQLite
//! - **HTTP API**: axum routes with Server-Sent Events for long operations
//!
//! # Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use gmail_newsletters::{analyzer, auth, client::ProductionGmailClient, config::Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!
//!     let hub = auth::initialize_gmail_hub(
//!         "credentials.json".as_ref(),
//!         ".gmail-newsletters/token.json".as_ref(),
//!     )
//!     .await?;
//!
//!     let client = Arc::new(ProductionGmailClient::new(
//!         hub,
//!         config.analysis.max_concurrent_requests,
//!     ));
//!
//!     let subscriptions = analyzer::collect_analysis(Arc::new(client), config.analysis).await?;
//!     println!("{} newsletter senders", subscriptions.len());
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`auth`] - OAuth2 authentication, Gmail API initialization, logout
//! - [`client`] - Rate-limited Gmail API client with retry logic
//! - [`headers`] / [`content`] - Header and body parsing
//! - [`classifier`] - Sender categorization and pattern detection
//! - [`analyzer`] - Streaming mailbox analysis
//! - [`bulk`] - Spam marking and restoring, single and multi-sender
//! - [`unsubscribe`] / [`subscribe`] - Subscription management over HTTP and mail
//! - [`web`] - HTTP client and page inspection helpers
//! - [`groups`] - SQLite newsletter groups and subscription records
//! - [`cache`] - Last analysis result on disk
//! - [`server`] - HTTP API
//! - [`cli`] - Command-line interface
//! - [`config`] - Configuration management
//! - [`error`] - Error types and result aliases
//! - [`models`] - Core data structures

pub mod analyzer;
pub mod auth;
pub mod bulk;
pub mod cache;
pub mod classifier;
pub mod cli;
pub mod client;
pub mod config;
pub mod content;
pub mod error;
pub mod groups;
pub mod headers;
pub mod models;
pub mod server;
pub mod subscribe;
pub mod unsubscribe;
pub mod web;

// Re-export commonly used types for convenience
pub use error::{GmailError, Result};

pub use models::{
    Category, FilterSpec, Frequency, Level, ListQuery, MessageContent, MessageMetadata, MessagePage,
    NewsletterGroup, NewsletterGroupItem, SenderRef, Subscription, SubscriptionRecord,
    SubscriptionStatus,
};

pub use config::{AnalysisConfig, BulkConfig, Config, HttpConfig, ServerConfig, StoreConfig};

pub use client::{GmailClient, ProductionGmailClient};

pub use analyzer::{AnalysisEvent, AnalysisStream};
pub use bulk::{BulkEvent, BulkStream, MarkSpamReport, UnmarkSpamReport};
pub use classifier::NewsletterPatterns;
pub use groups::NewsletterStore;
pub use subscribe::SubscribeReport;
pub use unsubscribe::UnsubscribeReport;

pub use cli::{Cli, Commands, ProgressReporter};
