use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::warn;

use mail_rules::clock::SystemClock;
use mail_rules::config::SyncConfig;
use mail_rules::provider::{ClientSecrets, ConsentFlow, GmailClient, TokenManager};
use mail_rules::rules::load_rules;
use mail_rules::store::{LibSqlBackend, MessageStore};
use mail_rules::sync::{SyncOrchestrator, fetch_messages};

/// How long `auth` waits for the browser redirect.
const CONSENT_TIMEOUT: Duration = Duration::from_secs(300);

/// Gmail rule runner: fetch messages into a local database and relabel
/// them according to a JSON rule list.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Database file (overrides MAIL_RULES_DB_PATH).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create or upgrade the database schema.
    Migrate,
    /// Authorize Gmail access in a browser and save the token file.
    Auth,
    /// Fetch recent messages and store the new ones.
    Fetch {
        /// How many recent messages to list (overrides MAIL_RULES_FETCH_LIMIT).
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Apply the rule file to every unprocessed message.
    ApplyRules {
        /// Rules file (overrides MAIL_RULES_RULES_FILE).
        #[arg(long)]
        rules: Option<PathBuf>,
    },
    /// Fetch, then apply rules.
    Sync {
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        rules: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let mut config = SyncConfig::from_env().context("invalid configuration")?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }

    if let Command::Auth = cli.command {
        return authorize(&config).await;
    }

    let store = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("failed to open database at {}", config.db_path.display()))?,
    );

    match cli.command {
        Command::Auth => {}
        Command::Migrate => {
            store.run_migrations().await.context("migration failed")?;
            eprintln!("Database ready at {}", config.db_path.display());
        }
        Command::Fetch { limit } => {
            if let Some(limit) = limit {
                config.fetch_limit = limit;
            }
            fetch(&config, store).await?;
        }
        Command::ApplyRules { rules } => {
            if let Some(rules) = rules {
                config.rules_file = rules;
            }
            apply_rules(&config, store).await?;
        }
        Command::Sync { limit, rules } => {
            if let Some(limit) = limit {
                config.fetch_limit = limit;
            }
            if let Some(rules) = rules {
                config.rules_file = rules;
            }
            fetch(&config, store.clone()).await?;
            apply_rules(&config, store).await?;
        }
    }

    Ok(())
}

/// Run the browser consent flow and write the token file.
async fn authorize(config: &SyncConfig) -> anyhow::Result<()> {
    let secrets = ClientSecrets::load(&config.credentials_file)?;
    let flow = ConsentFlow::new(secrets, &config.token_url);
    let pending = flow.start().await?;
    eprintln!(
        "Open this URL in a browser to authorize mail-rules:\n\n{}\n",
        pending.url()
    );
    pending
        .complete(&config.token_file, CONSENT_TIMEOUT)
        .await
        .context("authorization failed")?;
    eprintln!("Token saved to {}", config.token_file.display());
    Ok(())
}

/// Make sure a usable token exists, running the consent flow when the
/// stored one is missing, unreadable or revoked.
async fn ensure_authorized(config: &SyncConfig) -> anyhow::Result<()> {
    let tokens = TokenManager::new(&config.token_file, &config.token_url);
    match tokens.access_token().await {
        Ok(_) => Ok(()),
        Err(e) if e.needs_consent() => {
            warn!(error = %e, "Stored token unusable; starting authorization");
            authorize(config).await
        }
        Err(e) => Err(e).context("failed to obtain access token"),
    }
}

fn gmail_client(config: &SyncConfig) -> Arc<GmailClient> {
    let tokens = Arc::new(TokenManager::new(&config.token_file, &config.token_url));
    Arc::new(GmailClient::new(&config.api_base, tokens))
}

async fn fetch(config: &SyncConfig, store: Arc<LibSqlBackend>) -> anyhow::Result<()> {
    ensure_authorized(config).await?;
    let client = gmail_client(config);
    let report = fetch_messages(client.as_ref(), store.as_ref(), config.fetch_limit)
        .await
        .context("fetch failed")?;
    eprintln!(
        "Fetched {} messages: {} new, {} already stored, {} failed",
        report.listed, report.inserted, report.already_stored, report.failed
    );
    Ok(())
}

async fn apply_rules(config: &SyncConfig, store: Arc<LibSqlBackend>) -> anyhow::Result<()> {
    let rules = load_rules(&config.rules_file)?;
    ensure_authorized(config).await?;
    let orchestrator = SyncOrchestrator::new(store, gmail_client(config), Arc::new(SystemClock));
    let report = orchestrator
        .run_pass(&rules)
        .await
        .context("rules pass failed")?;
    eprintln!(
        "Pass {}: {} evaluated, {} relabelled, {} unmatched, {} failed",
        report.pass_id,
        report.evaluated(),
        report.committed(),
        report.unmatched(),
        report.failed()
    );
    Ok(())
}
