use anyhow::Result;
use clap::Parser;
use gmail_newsletters::cache::SubscriptionCache;
use gmail_newsletters::cli::{self, Cli, Commands, GroupCommands, ProgressReporter};
use gmail_newsletters::config::Config;
use gmail_newsletters::error::GmailError;
use gmail_newsletters::groups::{GroupMember, GroupUpdate, NewsletterStore};
use gmail_newsletters::server::{self, AppState};
use gmail_newsletters::{auth, bulk, subscribe, unsubscribe, web};
use indicatif::MultiProgress;
use std::io::Write;
use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// A writer that prints through MultiProgress to avoid progress bar conflicts
#[derive(Clone)]
struct MultiProgressWriter {
    multi: Arc<MultiProgress>,
    buffer: Arc<std::sync::Mutex<Vec<u8>>>,
}

impl MultiProgressWriter {
    fn new(multi: Arc<MultiProgress>) -> Self {
        Self {
            multi,
            buffer: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }
}

impl Write for MultiProgressWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.extend_from_slice(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let Ok(mut buffer) = self.buffer.lock() else {
            return Ok(());
        };
        if !buffer.is_empty() {
            let msg = String::from_utf8_lossy(&buffer);
            let msg = msg.trim_end_matches('\n');
            if !msg.is_empty() {
                let _ = self.multi.println(msg);
            }
            buffer.clear();
        }
        Ok(())
    }
}

impl Drop for MultiProgressWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// MakeWriter implementation for tracing
#[derive(Clone)]
struct MultiProgressMakeWriter {
    multi: Arc<MultiProgress>,
}

impl<'a> MakeWriter<'a> for MultiProgressMakeWriter {
    type Writer = MultiProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        MultiProgressWriter::new(Arc::clone(&self.multi))
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        display_error(&e);
        process::exit(1);
    }
}

/// Display error with context
fn display_error(error: &anyhow::Error) {
    eprintln!("Error: {}", error);

    for cause in error.chain().skip(1) {
        eprintln!("  Caused by: {}", cause);
    }

    match error.downcast_ref::<GmailError>().and_then(cli::error_hint) {
        Some(lines) => {
            eprintln!("\nHint: {}", lines[0]);
            for line in &lines[1..] {
                eprintln!("      {}", line);
            }
        }
        None => eprintln!("\nFor help, run: newsletters --help"),
    }
}

async fn run() -> Result<()> {
    // yup-oauth2, hyper-rustls and reqwest each pull rustls; pick one provider up front
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_newsletters=debug,info"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_newsletters=info,warn,error"))
    };

    let multi_progress = Arc::new(MultiProgress::new());
    let make_writer = MultiProgressMakeWriter {
        multi: Arc::clone(&multi_progress),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(make_writer)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let reporter = ProgressReporter::with_multi_progress((*multi_progress).clone());

    if let Commands::InitConfig { force } = &cli.command {
        if cli.config.exists() && !force {
            return Err(GmailError::ConfigError(format!(
                "Configuration file already exists at {:?}. Use --force to overwrite.",
                cli.config
            ))
            .into());
        }

        Config::create_example(&cli.config).await?;
        println!("Created example configuration file at: {:?}", cli.config);
        println!("\nKey settings to review:");
        println!("  - analysis.queries: searches that surface newsletters");
        println!("  - analysis.period_days: how far back to scan");
        println!("  - bulk.max_pages: page cap for a single sender");
        println!("  - server.bind: address of the HTTP API");
        return Ok(());
    }

    let config = Config::load(&cli.config).await?;

    match &cli.command {
        Commands::InitConfig { .. } => Ok(()),

        Commands::Auth { force } => {
            tracing::info!("Authenticating with Gmail API...");

            if *force && cli.token_cache.exists() {
                tokio::fs::remove_file(&cli.token_cache).await?;
                tracing::info!("Removed existing token cache");
            }

            let client = cli::connect(&cli, &config).await?;
            println!("Successfully authenticated with Gmail API");
            println!("Token cached at: {:?}", cli.token_cache);
            println!("Connected to account: {}", client.profile_email().await?);
            Ok(())
        }

        Commands::Logout => {
            let http = web::build_http_client(&config.http)?;
            if auth::logout(&http, auth::REVOKE_ENDPOINT, &cli.token_cache).await? {
                println!("Logged out; token cache removed");
            } else {
                println!("Not logged in");
            }
            Ok(())
        }

        Commands::Analyze { json } => {
            let client = cli::connect(&cli, &config).await?;
            let account = client.profile_email().await?;
            let (subscriptions, scanned) = cli::run_analysis(client, &config, &reporter).await?;

            SubscriptionCache::new(account, subscriptions.clone())
                .save(&cli.cache_file)
                .await?;

            if *json {
                println!("{}", serde_json::to_string_pretty(&subscriptions)?);
            } else {
                cli::print_subscriptions(&subscriptions);
                println!("Scanned {} messages; result cached at {:?}", scanned, cli.cache_file);
            }
            Ok(())
        }

        Commands::Count { sender } => {
            let client = cli::connect(&cli, &config).await?;
            let count = bulk::email_count(client.as_ref(), &config.bulk, sender).await?;
            println!("{}: {} messages", sender, count);
            Ok(())
        }

        Commands::SpamCount { sender } => {
            let client = cli::connect(&cli, &config).await?;
            let count = bulk::spam_count(client.as_ref(), sender).await?;
            println!("{}: {} messages in spam", sender, count);
            Ok(())
        }

        Commands::MarkSpam {
            sender,
            name,
            expected,
        } => {
            let cached = SubscriptionCache::load(&cli.cache_file).await.ok();
            let known = cached.as_ref().and_then(|c| c.find(sender));
            let expected = expected.or(known.map(|s| s.total_emails)).unwrap_or(0);
            let name = name
                .clone()
                .or_else(|| known.map(|s| s.sender.clone()))
                .unwrap_or_else(|| sender.clone());

            let client = cli::connect(&cli, &config).await?;
            let spinner = reporter.add_spinner(&format!("Marking mail from {} as spam...", sender));
            let report = bulk::mark_spam(client.as_ref(), &config.bulk, sender, &name, expected).await;
            spinner.finish_and_clear();

            let report = report?;
            println!("{}", report.summary);
            if !report.filter_created {
                println!("Warning: the spam filter could not be created");
            }
            Ok(())
        }

        Commands::UnmarkSpam { sender, name } => {
            let name = name.clone().unwrap_or_else(|| sender.clone());
            let client = cli::connect(&cli, &config).await?;
            let spinner = reporter.add_spinner(&format!("Restoring mail from {}...", sender));
            let report = bulk::unmark_spam(client.as_ref(), &config.bulk, sender, &name).await;
            spinner.finish_and_clear();

            println!("{}", report?.summary);
            Ok(())
        }

        Commands::MarkAllSpam { selection } => {
            let senders = cli::select_senders(&cli.cache_file, selection).await?;
            if senders.is_empty() {
                println!("No senders selected");
                return Ok(());
            }
            if !cli::confirm(
                &format!("Mark all mail from {} senders as spam?", senders.len()),
                selection.yes,
            )? {
                println!("Aborted");
                return Ok(());
            }

            let client = cli::connect(&cli, &config).await?;
            let processed =
                cli::run_bulk(bulk::mark_all_spam(client, config.bulk.clone(), senders), &reporter).await?;
            for sender in processed {
                println!("  {} <{}>: {} marked", sender.sender, sender.email, sender.marked.unwrap_or(0));
            }
            Ok(())
        }

        Commands::UnmarkAllSpam { selection } => {
            let senders = cli::select_senders(&cli.cache_file, selection).await?;
            if senders.is_empty() {
                println!("No senders selected");
                return Ok(());
            }
            if !cli::confirm(
                &format!("Restore spam from {} senders to the inbox?", senders.len()),
                selection.yes,
            )? {
                println!("Aborted");
                return Ok(());
            }

            let client = cli::connect(&cli, &config).await?;
            let processed =
                cli::run_bulk(bulk::unmark_all_spam(client, config.bulk.clone(), senders), &reporter).await?;
            for sender in processed {
                println!(
                    "  {} <{}>: {} restored",
                    sender.sender,
                    sender.email,
                    sender.restored.unwrap_or(0)
                );
            }
            Ok(())
        }

        Commands::Unsubscribe { sender } => {
            let client = cli::connect(&cli, &config).await?;
            let http = web::build_http_client(&config.http)?;
            let user_email = client.profile_email().await?;

            let report =
                unsubscribe::unsubscribe(client.as_ref(), &http, &config.http, sender, &user_email).await?;
            for step in &report.steps {
                println!("  - {}", step);
            }
            println!("{}", report.message);
            if let Some(url) = report.final_url.as_deref().filter(|_| !report.success) {
                println!("Finish manually at: {}", url);
            }
            Ok(())
        }

        Commands::Subscribe { sender, name } => {
            let client = cli::connect(&cli, &config).await?;
            let http = web::build_http_client(&config.http)?;
            let store = NewsletterStore::open(&config.store.path)?;
            let user_email = client.profile_email().await?;
            let name = name.clone().unwrap_or_default();

            let report =
                subscribe::subscribe(client.as_ref(), &http, &store, sender, &name, &user_email).await?;
            println!("{}", report.message);
            if report.requires_manual_action {
                if let Some(link) = &report.subscribe_link {
                    println!("Complete the subscription at: {}", link);
                }
            }
            if report.restored_count > 0 {
                println!("Restored {} messages to the inbox", report.restored_count);
            }
            Ok(())
        }

        Commands::Groups { command } => {
            let client = cli::connect(&cli, &config).await?;
            let user_email = client.profile_email().await?;
            let store = NewsletterStore::open(&config.store.path)?;
            run_groups(&store, &user_email, command)
        }

        Commands::Serve { bind } => {
            let addr: SocketAddr = match bind {
                Some(b) => b
                    .parse()
                    .map_err(|e| GmailError::ConfigError(format!("Invalid bind address '{}': {}", b, e)))?,
                None => config.bind_addr()?,
            };

            let client = cli::connect(&cli, &config).await?;
            let user_email = client.profile_email().await?;
            let state = AppState {
                client,
                http: web::build_http_client(&config.http)?,
                store: Arc::new(NewsletterStore::open(&config.store.path)?),
                config: Arc::new(config),
                user_email,
            };

            server::serve(state, addr).await?;
            Ok(())
        }
    }
}

fn run_groups(store: &NewsletterStore, user_email: &str, command: &GroupCommands) -> Result<()> {
    match command {
        GroupCommands::List => {
            let groups = store.list_groups(user_email)?;
            if groups.is_empty() {
                println!("No groups yet");
            }
            for group in &groups {
                cli::print_group(group, false);
            }
        }
        GroupCommands::Show { id } => {
            cli::print_group(&store.get_group(user_email, id)?, true);
        }
        GroupCommands::Create {
            name,
            description,
            color,
            senders,
        } => {
            let members: Vec<GroupMember> = senders
                .iter()
                .map(|email| GroupMember {
                    sender_email: email.clone(),
                    sender_name: None,
                })
                .collect();
            let (group, added) = store.create_group(
                user_email,
                name,
                description.as_deref(),
                color.as_deref(),
                &members,
            )?;
            println!("Created group {} with {} newsletters", group.id, added);
        }
        GroupCommands::Update {
            id,
            name,
            description,
            color,
        } => {
            let update = GroupUpdate {
                group_name: name.clone(),
                description: description.clone(),
                color: color.clone(),
            };
            let group = store.update_group(user_email, id, &update)?;
            cli::print_group(&group, false);
        }
        GroupCommands::Delete { id, yes } => {
            let group = store.get_group(user_email, id)?;
            if !cli::confirm(&format!("Delete group '{}'?", group.group_name), *yes)? {
                println!("Aborted");
                return Ok(());
            }
            let deleted = store.delete_group(user_email, id)?;
            println!(
                "Deleted group '{}' ({} newsletters removed)",
                deleted.group_name, deleted.newsletters_removed
            );
        }
        GroupCommands::Add { id, sender, name } => {
            store.add_newsletter(user_email, id, sender, name.as_deref())?;
            println!("Added {} to group {}", sender, id);
        }
        GroupCommands::Remove { id, sender } => {
            let item = store.remove_newsletter(user_email, id, sender)?;
            println!("Removed {} from group {}", item.sender_email, id);
        }
    }
    Ok(())
}
