//! Command-line interface

use clap::{Parser, Subcommand};
use futures::StreamExt;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::analyzer::{self, AnalysisEvent};
use crate::bulk::{BulkEvent, BulkStream, ProcessedSender};
use crate::cache::SubscriptionCache;
use crate::client::{GmailClient, ProductionGmailClient};
use crate::config::Config;
use crate::error::{GmailError, Result};
use crate::models::{Category, NewsletterGroup, SenderRef, Subscription};

#[derive(Parser, Debug)]
#[command(name = "newsletters")]
#[command(version = "0.1.0")]
#[command(about = "Find, group and clean up Gmail newsletter subscriptions", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to OAuth2 credentials file
    #[arg(long, default_value = "credentials.json")]
    pub credentials: PathBuf,

    /// Path to token cache file
    #[arg(long, default_value = ".gmail-newsletters/token.json")]
    pub token_cache: PathBuf,

    /// Path to the cached analysis result
    #[arg(long, default_value = ".gmail-newsletters/subscriptions.json")]
    pub cache_file: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authenticate with Gmail API
    Auth {
        /// Force re-authentication even if token exists
        #[arg(long)]
        force: bool,
    },

    /// Revoke the OAuth grant and delete the cached token
    Logout,

    /// Generate example configuration file
    InitConfig {
        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },

    /// Scan the mailbox for newsletter senders
    Analyze {
        /// Print the result as JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Count messages from a sender
    Count { sender: String },

    /// Count a sender's messages currently in spam
    SpamCount { sender: String },

    /// Move every message from a sender to spam and filter future mail
    MarkSpam {
        sender: String,

        /// Display name used in the report
        #[arg(long)]
        name: Option<String>,

        /// Expected number of messages (sizes the page cap)
        #[arg(long)]
        expected: Option<usize>,
    },

    /// Restore a sender's spam to the inbox and remove its spam filters
    UnmarkSpam {
        sender: String,

        #[arg(long)]
        name: Option<String>,
    },

    /// Mark several senders as spam (defaults to every analyzed sender)
    MarkAllSpam {
        #[command(flatten)]
        selection: SenderSelection,
    },

    /// Restore several senders from spam (defaults to every analyzed sender)
    UnmarkAllSpam {
        #[command(flatten)]
        selection: SenderSelection,
    },

    /// Unsubscribe from a sender, filter future mail and archive existing mail
    Unsubscribe { sender: String },

    /// Subscribe again to a sender
    Subscribe {
        sender: String,

        #[arg(long)]
        name: Option<String>,
    },

    /// Manage newsletter groups
    Groups {
        #[command(subcommand)]
        command: GroupCommands,
    },

    /// Serve the HTTP API
    Serve {
        /// Address to bind, overrides server.bind
        #[arg(long)]
        bind: Option<String>,
    },
}

/// Which analyzed senders a bulk command acts on
#[derive(clap::Args, Debug, Clone)]
pub struct SenderSelection {
    /// Sender addresses; repeatable
    #[arg(long = "sender")]
    pub senders: Vec<String>,

    /// Only senders of this category
    #[arg(long)]
    pub category: Option<Category>,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Subcommand, Debug)]
pub enum GroupCommands {
    /// List groups
    List,

    /// Show one group with its newsletters
    Show { id: String },

    /// Create a group, optionally with initial senders
    Create {
        name: String,

        #[arg(long)]
        description: Option<String>,

        /// Hex color such as #3b82f6
        #[arg(long)]
        color: Option<String>,

        /// Initial member addresses; repeatable
        #[arg(long = "sender")]
        senders: Vec<String>,
    },

    /// Rename or recolor a group
    Update {
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        color: Option<String>,
    },

    /// Delete a group and its memberships
    Delete {
        id: String,

        #[arg(short, long)]
        yes: bool,
    },

    /// Add a sender to a group
    Add {
        id: String,
        sender: String,

        #[arg(long)]
        name: Option<String>,
    },

    /// Remove a sender from a group
    Remove { id: String, sender: String },
}

/// Truncate a string to max_len characters, adding "..." if truncated
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_len.saturating_sub(3)).collect::<String>())
    }
}

/// Progress reporter using indicatif
pub struct ProgressReporter {
    multi: MultiProgress,
    spinner_style: ProgressStyle,
    bar_style: ProgressStyle,
}

impl ProgressReporter {
    /// Share the MultiProgress that the log writer prints through
    pub fn with_multi_progress(multi: MultiProgress) -> Self {
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        let bar_style = ProgressStyle::default_bar()
            .template("[{elapsed:>6}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");

        Self {
            multi,
            spinner_style,
            bar_style,
        }
    }

    pub fn multi_progress(&self) -> &MultiProgress {
        &self.multi
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    pub fn add_progress_bar(&self, len: u64, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new(len));
        pb.set_style(self.bar_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Finish a spinner and clear it from the multi-progress display
    pub fn finish_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        let _ = self.multi.println(format!("  ✓ {}", msg));
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::with_multi_progress(MultiProgress::new())
    }
}

/// Authenticate and wrap the hub in the rate-limited client
pub async fn connect(cli: &Cli, config: &Config) -> Result<Arc<dyn GmailClient>> {
    let hub = crate::auth::initialize_gmail_hub(&cli.credentials, &cli.token_cache).await?;
    let client = Arc::new(ProductionGmailClient::new(
        hub,
        config.analysis.max_concurrent_requests,
    ));
    Ok(Arc::new(client))
}

/// Drive an analysis stream to completion, mirroring its events on the terminal
pub async fn run_analysis(
    client: Arc<dyn GmailClient>,
    config: &Config,
    reporter: &ProgressReporter,
) -> Result<(Vec<Subscription>, usize)> {
    let mut events = analyzer::analyze(client, config.analysis.clone());
    let spinner = reporter.add_spinner("Searching for newsletters...");
    let mut bar: Option<ProgressBar> = None;

    while let Some(event) = events.next().await {
        match event {
            AnalysisEvent::Started { queries } => {
                spinner.set_message(format!("Running {} searches...", queries.len()));
            }
            AnalysisEvent::QueryCompleted {
                query,
                found,
                unique_total,
            } => {
                spinner.set_message(format!(
                    "'{}': {} messages ({} unique so far)",
                    query, found, unique_total
                ));
            }
            AnalysisEvent::QueryFailed { query, error } => {
                warn!("Search '{}' failed: {}", query, error);
            }
            AnalysisEvent::FetchProgress { fetched, total } => {
                let pb = bar.get_or_insert_with(|| {
                    reporter.finish_spinner(&spinner, "Search complete");
                    reporter.add_progress_bar(total as u64, "Fetching headers")
                });
                pb.set_position(fetched as u64);
            }
            AnalysisEvent::Complete {
                subscriptions,
                messages_scanned,
            } => {
                match bar.take() {
                    Some(pb) => pb.finish_and_clear(),
                    None => spinner.finish_and_clear(),
                }
                info!(
                    "Found {} newsletter senders in {} messages",
                    subscriptions.len(),
                    messages_scanned
                );
                return Ok((subscriptions, messages_scanned));
            }
            AnalysisEvent::Error { error } => {
                spinner.finish_and_clear();
                if let Some(pb) = bar.take() {
                    pb.finish_and_clear();
                }
                return Err(GmailError::ApiError(error));
            }
        }
    }

    Err(GmailError::Unknown("Analysis ended without a result".to_string()))
}

/// Drive a bulk stream to completion; returns the processed senders
pub async fn run_bulk(mut events: BulkStream, reporter: &ProgressReporter) -> Result<Vec<ProcessedSender>> {
    let mut bar: Option<ProgressBar> = None;

    while let Some(event) = events.next().await {
        match event {
            BulkEvent::Start {
                message,
                total_newsletters,
            } => {
                let _ = reporter.multi_progress().println(&message);
                bar = Some(reporter.add_progress_bar(total_newsletters as u64, "Starting"));
            }
            BulkEvent::Processing { newsletter, .. } => {
                if let Some(pb) = &bar {
                    pb.set_message(truncate_string(&newsletter, 40));
                }
            }
            BulkEvent::Marked { current, message, .. } | BulkEvent::Restored { current, message, .. } => {
                if let Some(pb) = &bar {
                    pb.set_position(current as u64);
                }
                info!("{}", message);
            }
            BulkEvent::ErrorNewsletter { newsletter, error } => {
                if let Some(pb) = &bar {
                    pb.inc(1);
                }
                warn!("{}: {}", newsletter, error);
            }
            BulkEvent::MarkComplete {
                message,
                processed_newsletters,
                ..
            }
            | BulkEvent::RestoreComplete {
                message,
                processed_newsletters,
                ..
            } => {
                if let Some(pb) = bar.take() {
                    pb.finish_and_clear();
                }
                println!("{}", message);
                return Ok(processed_newsletters);
            }
            BulkEvent::Error { error, details } => {
                if let Some(pb) = bar.take() {
                    pb.finish_and_clear();
                }
                let message = match details {
                    Some(details) => format!("{} ({})", error, details),
                    None => error,
                };
                return Err(GmailError::ApiError(message));
            }
        }
    }

    Err(GmailError::Unknown("Bulk operation ended without a result".to_string()))
}

/// Resolve the senders a bulk command should touch from the analysis cache
pub async fn select_senders(cache_file: &Path, selection: &SenderSelection) -> Result<Vec<SenderRef>> {
    if !selection.senders.is_empty() && selection.category.is_none() {
        // Explicit addresses work without a cache; totals come from it when present
        let cache = SubscriptionCache::load(cache_file).await.ok();
        return Ok(selection
            .senders
            .iter()
            .map(|email| {
                cache
                    .as_ref()
                    .and_then(|c| c.find(email))
                    .map(SenderRef::from)
                    .unwrap_or_else(|| SenderRef {
                        sender: email.clone(),
                        sender_email: email.clone(),
                        total_emails: 0,
                    })
            })
            .collect());
    }

    let cache = SubscriptionCache::load(cache_file).await?;
    let mut senders = cache.senders(selection.category);
    if !selection.senders.is_empty() {
        senders.retain(|s| {
            selection
                .senders
                .iter()
                .any(|e| e.eq_ignore_ascii_case(&s.sender_email))
        });
    }
    Ok(senders)
}

/// Ask before a destructive action unless `--yes` was given
pub fn confirm(prompt: &str, assume_yes: bool) -> Result<bool> {
    if assume_yes {
        return Ok(true);
    }

    inquire::Confirm::new(prompt)
        .with_default(false)
        .prompt()
        .map_err(|e| match e {
            inquire::InquireError::OperationCanceled | inquire::InquireError::OperationInterrupted => {
                GmailError::OperationCancelled("Prompt cancelled".to_string())
            }
            other => GmailError::Unknown(format!("Prompt failed: {}", other)),
        })
}

pub fn print_subscriptions(subscriptions: &[Subscription]) {
    if subscriptions.is_empty() {
        println!("No newsletter senders found.");
        return;
    }

    println!(
        "\n{:<32} {:<36} {:>6}  {:<13} {:<10} {:<10}",
        "SENDER", "EMAIL", "COUNT", "CATEGORY", "FREQUENCY", "ENGAGEMENT"
    );
    println!("{}", "-".repeat(112));
    for sub in subscriptions {
        println!(
            "{:<32} {:<36} {:>6}  {:<13} {:<10} {:<10}",
            truncate_string(&sub.sender, 32),
            truncate_string(&sub.sender_email, 36),
            sub.total_emails,
            sub.category.as_str(),
            format!("{:?}", sub.frequency).to_lowercase(),
            format!("{:?}", sub.engagement).to_lowercase(),
        );
    }
    println!("\n{} senders", subscriptions.len());
}

pub fn print_group(group: &NewsletterGroup, detailed: bool) {
    println!(
        "{}  {} ({} newsletters) {}",
        group.id, group.group_name, group.newsletter_count, group.color
    );
    if let Some(description) = group.description.as_deref().filter(|d| !d.is_empty()) {
        println!("    {}", description);
    }
    if detailed {
        for item in &group.newsletters {
            match item.sender_name.as_deref() {
                Some(name) => println!("    - {} <{}>", name, item.sender_email),
                None => println!("    - {}", item.sender_email),
            }
        }
    }
}

/// Follow-up advice printed under a failed command
pub fn error_hint(error: &GmailError) -> Option<&'static [&'static str]> {
    let lines: &'static [&'static str] = match error {
        GmailError::AuthError(_) => &[
            "Make sure your credentials.json file is valid.",
            "You can download it from Google Cloud Console.",
            "Try running: newsletters auth --force",
        ],
        GmailError::ApiError(_) | GmailError::ServerError { .. } => &[
            "This may be a temporary Gmail API error.",
            "Try running the command again.",
        ],
        GmailError::RateLimitExceeded { .. } => &[
            "You've hit Gmail API rate limits.",
            "Wait a few seconds and try again.",
            "Consider reducing analysis.max_concurrent_requests in config.",
        ],
        GmailError::ConfigError(_) => &[
            "Check your configuration file for errors.",
            "Run: newsletters init-config --force",
        ],
        GmailError::CacheError(_) => &["Run: newsletters analyze"],
        _ => return None,
    };
    Some(lines)
}
