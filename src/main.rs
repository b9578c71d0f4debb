//! # Lumi: Multi-Tenant FAQ Answering Server
//!
//! Usage:
//!   lumi serve                           # Start the HTTP API (default port 8000)
//!   lumi create-tenant acme              # Create a tenant (or show the existing one)
//!   lumi setup-db --sample-data          # Migrate the database and seed sample FAQs
//!   lumi reindex --tenant acme           # Embed FAQs with a missing or stale embedding

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lumi_channels::WhatsAppChannel;
use lumi_core::config::LumiConfig;
use lumi_core::observability::Metrics;
use lumi_core::traits::{FaqStore, TenantStore};
use lumi_core::types::Tenant;
use lumi_db::SqliteStore;
use lumi_gateway::AppState;
use lumi_knowledge::FaqIndexer;
use tracing_subscriber::EnvFilter;

const SAMPLE_TENANT: &str = "sample";
const SAMPLE_API_KEY: &str = "sample_api_key";
const SAMPLE_FAQS: &[(&str, &str)] = &[
    (
        "What is Lumi?",
        "Lumi is an AI-powered knowledge base system.",
    ),
    (
        "How do I add new FAQs?",
        "You can add new FAQs through the admin API.",
    ),
    (
        "What technologies does Lumi use?",
        "Lumi is written in Rust and uses Axum, SQLite and OpenAI-compatible models.",
    ),
    (
        "Is Lumi open source?",
        "Yes, Lumi is available under the MIT license.",
    ),
];

#[derive(Parser)]
#[command(name = "lumi", version, about = "Lumi: multi-tenant FAQ answering API")]
struct Cli {
    /// Config file (default: $LUMI_CONFIG or ~/.lumi/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP API server
    Serve {
        /// Bind address (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Create a tenant; prints the existing one if the name is taken
    CreateTenant {
        name: String,
        /// API key for the tenant (generated by the admin API otherwise)
        #[arg(long)]
        api_key: Option<String>,
        /// Default system prompt for the tenant's queries
        #[arg(long)]
        system_prompt: Option<String>,
    },
    /// Create or migrate the database schema
    SetupDb {
        /// Seed the "sample" tenant with example FAQs
        #[arg(long)]
        sample_data: bool,
    },
    /// Compute embeddings for FAQs that have none or one of the wrong width
    Reindex {
        /// Tenant id or name (default: all tenants)
        #[arg(long)]
        tenant: Option<String>,
    },
}

fn expand_path(p: &str) -> String {
    shellexpand::tilde(p).to_string()
}

fn load_config(path: Option<&Path>) -> Result<LumiConfig> {
    let config = match path {
        Some(path) => {
            let mut config = LumiConfig::load_from(path)?;
            config.apply_overrides_from(|key| std::env::var(key).ok());
            config
        }
        None => LumiConfig::load()?,
    };
    config.validate()?;
    Ok(config)
}

fn open_store(config: &LumiConfig) -> Result<Arc<SqliteStore>> {
    let db_path = expand_path(&config.database.path);
    let store = SqliteStore::open(Path::new(&db_path))
        .with_context(|| format!("failed to open database at {db_path}"))?;
    tracing::info!("Database ready: {db_path}");
    Ok(Arc::new(store))
}

async fn find_tenant(store: &SqliteStore, key: &str) -> Result<Option<Tenant>> {
    if let Some(tenant) = store.get_tenant(key).await? {
        return Ok(Some(tenant));
    }
    Ok(store.get_tenant_by_name(key).await?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "lumi=debug,lumi_gateway=debug,lumi_knowledge=debug,lumi_providers=debug,lumi_channels=debug,lumi_db=debug,tower_http=debug"
    } else {
        "lumi=info,lumi_gateway=info,lumi_knowledge=info,lumi_providers=info,lumi_channels=info,lumi_db=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }
            serve(config).await
        }
        Command::CreateTenant { name, api_key, system_prompt } => {
            create_tenant(&config, &name, api_key.as_deref(), system_prompt.as_deref()).await
        }
        Command::SetupDb { sample_data } => setup_db(&config, sample_data).await,
        Command::Reindex { tenant } => reindex(&config, tenant.as_deref()).await,
    }
}

async fn serve(config: LumiConfig) -> Result<()> {
    let store = open_store(&config)?;
    let embedder = lumi_providers::create_embedding_provider(&config.embedding)
        .context("failed to initialise embedding provider")?;
    let chat = lumi_providers::create_chat_provider(&config.llm)
        .context("failed to initialise chat provider")?;
    let channel = Arc::new(WhatsAppChannel::new(config.whatsapp.clone())?);

    tracing::info!(
        "Models: chat={}/{} embedding={}/{} ({} dims)",
        chat.name(),
        config.llm.model,
        embedder.name(),
        embedder.model_name(),
        embedder.dimensions()
    );
    if config.gateway.admin_token.is_empty() {
        tracing::warn!("Admin API is unauthenticated. Set LUMI_ADMIN_TOKEN for production.");
    }
    if config.whatsapp.verify_token.is_empty() {
        tracing::warn!("WH_TOKEN is not set; webhook verification will be refused");
    }

    let state = AppState::new(
        config,
        store,
        embedder,
        chat,
        channel,
        Arc::new(Metrics::new()),
    );
    lumi_gateway::start(state).await
}

async fn create_tenant(
    config: &LumiConfig,
    name: &str,
    api_key: Option<&str>,
    system_prompt: Option<&str>,
) -> Result<()> {
    let store = open_store(config)?;
    if let Some(existing) = store.get_tenant_by_name(name).await? {
        println!("Tenant '{}' already exists.", existing.name);
        println!("   ID:      {}", existing.id);
        println!("   API key: {}", existing.api_key.as_deref().unwrap_or("(none)"));
        return Ok(());
    }

    let tenant = store.create_tenant(name, api_key, system_prompt).await?;
    println!("Tenant created:");
    println!("   Name:    {}", tenant.name);
    println!("   ID:      {}", tenant.id);
    println!("   API key: {}", tenant.api_key.as_deref().unwrap_or("(none)"));
    Ok(())
}

async fn setup_db(config: &LumiConfig, sample_data: bool) -> Result<()> {
    let store = open_store(config)?;
    println!("Database schema is up to date.");
    if !sample_data {
        return Ok(());
    }

    let tenant = match store.get_tenant_by_name(SAMPLE_TENANT).await? {
        Some(t) => t,
        None => {
            store
                .create_tenant(SAMPLE_TENANT, Some(SAMPLE_API_KEY), None)
                .await?
        }
    };
    if !store.list_faqs(&tenant.id).await?.is_empty() {
        println!("Sample tenant already has FAQs; nothing to seed.");
        return Ok(());
    }

    // FAQs are seeded either way; without a provider they wait for `lumi reindex`.
    let indexer = match lumi_providers::create_embedding_provider(&config.embedding) {
        Ok(embedder) => Some(FaqIndexer::new(
            embedder,
            store.clone(),
            Arc::new(Metrics::new()),
        )),
        Err(e) => {
            tracing::warn!("Embedding provider unavailable ({e}); seeding FAQs without embeddings");
            None
        }
    };

    let mut embedded = 0;
    for (question, answer) in SAMPLE_FAQS {
        let faq = match &indexer {
            Some(indexer) => indexer.create_faq(&tenant.id, question, answer).await?,
            None => store.create_faq(&tenant.id, question, answer, None).await?,
        };
        if faq.has_embedding() {
            embedded += 1;
        }
    }

    println!("Sample data created:");
    println!("   Tenant:  {} ({})", tenant.name, tenant.id);
    println!("   API key: {}", tenant.api_key.as_deref().unwrap_or("(none)"));
    println!("   FAQs:    {} ({} embedded)", SAMPLE_FAQS.len(), embedded);
    Ok(())
}

async fn reindex(config: &LumiConfig, tenant: Option<&str>) -> Result<()> {
    let store = open_store(config)?;
    let tenant_id = match tenant {
        Some(key) => Some(
            find_tenant(&store, key)
                .await?
                .with_context(|| format!("tenant '{key}' not found"))?
                .id,
        ),
        None => None,
    };

    let embedder = lumi_providers::create_embedding_provider(&config.embedding)
        .context("failed to initialise embedding provider")?;
    let indexer = FaqIndexer::new(embedder, store.clone(), Arc::new(Metrics::new()));
    let report = indexer.backfill(tenant_id.as_deref()).await?;

    println!(
        "Reindex complete: {} embedded, {} failed",
        report.embedded, report.failed
    );
    if report.failed > 0 {
        anyhow::bail!("{} FAQ(s) could not be embedded", report.failed);
    }
    Ok(())
}
