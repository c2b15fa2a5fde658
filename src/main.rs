// src/main.rs
// groupfeed CLI - browse a follow group's dynamic feed

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use groupfeed::api::{BiliClient, FeedApi, RelationApi};
use groupfeed::config::{self, Config};
use groupfeed::display::{TracingObserver, button_label};
use groupfeed::feed::{FeedFilterEngine, FeedReader, SelectOutcome, TransformChain, extract_author_id};
use groupfeed::membership::MembershipCache;
use groupfeed::store::{self, JsonFileStore};
use groupfeed::tasks::backfill::ChannelTrigger;
use groupfeed::utils::{SystemClock, truncate};

#[derive(Parser)]
#[command(name = "groupfeed")]
#[command(about = "Filter the dynamic feed down to one follow group")]
#[command(version)]
struct Cli {
    /// Verbose logging (also GROUPFEED_DEBUG=1)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List follow groups
    Groups,

    /// Show a group's member ids
    Members {
        group_id: i64,
        /// Ignore the cached listing
        #[arg(long)]
        refresh: bool,
    },

    /// Filter the feed to a group
    Select {
        group_id: i64,
        /// Display name (looked up when omitted)
        #[arg(long)]
        name: Option<String>,
    },

    /// Stop filtering
    Clear,

    /// Drop every cached member listing
    ClearCache,

    /// Show the active group and filter counters
    Status,

    /// Read the feed through the filter
    Feed {
        /// Pages to deliver
        #[arg(long, default_value_t = 3)]
        pages: usize,
    },
}

/// Everything a command needs, wired from one `Config`
struct App {
    client: Arc<BiliClient>,
    store: Arc<JsonFileStore>,
    engine: Arc<FeedFilterEngine>,
    continuations: tokio::sync::mpsc::UnboundedReceiver<()>,
}

impl App {
    fn build(config: &Config) -> Self {
        let client = Arc::new(BiliClient::new(&config.api));
        let store = Arc::new(JsonFileStore::open(&config.state_path));
        let cache = MembershipCache::new(
            client.clone(),
            store.clone(),
            Arc::new(SystemClock),
            &config.filter,
        );
        let (trigger, continuations) = ChannelTrigger::channel();
        let engine = Arc::new(FeedFilterEngine::new(
            cache,
            store.clone(),
            Arc::new(TracingObserver),
            Arc::new(trigger),
            &config.filter,
        ));
        // Every page waits for this; start it before any command runs
        engine.spawn_initialize();
        Self {
            client,
            store,
            engine,
            continuations,
        }
    }
}

async fn run_groups(app: &App) -> Result<()> {
    let active = store::saved_group(app.store.as_ref()).map(|(id, _)| id);
    for group in app.client.list_groups().await? {
        let marker = if Some(group.id) == active { "*" } else { " " };
        println!(
            "{} {:>10}  {} ({})",
            marker, group.id, group.name, group.reported_count
        );
    }
    Ok(())
}

async fn run_members(app: &App, group_id: i64, refresh: bool) -> Result<()> {
    let cache = app.engine.cache();
    if refresh {
        cache.invalidate(group_id);
    }
    let load = cache.load_with_status(group_id).await;
    let mut ids: Vec<&String> = load.ids.iter().collect();
    ids.sort();
    for id in &ids {
        println!("{}", id);
    }
    if !load.complete {
        eprintln!("warning: listing incomplete, {} member(s) gathered", ids.len());
    }
    info!(group_id, members = ids.len(), "Listed members");
    Ok(())
}

async fn run_select(app: &App, group_id: i64, name: Option<String>) -> Result<()> {
    let name = match name {
        Some(name) => name,
        None => app
            .client
            .list_groups()
            .await?
            .into_iter()
            .find(|g| g.id == group_id)
            .map(|g| g.name)
            .unwrap_or_default(),
    };

    app.engine.initialize().await;
    match app.engine.select_group(group_id, &name).await? {
        SelectOutcome::Selected { members, complete } => {
            let group = app.engine.active_group().await;
            println!("{} ({} members)", button_label(group.as_ref()), members);
            if !complete {
                eprintln!("warning: member listing incomplete, filter may hide some authors");
            }
        }
        SelectOutcome::Empty => println!("Group {} has no members, filter unchanged", group_id),
        SelectOutcome::Superseded => println!("Selection superseded"),
    }
    Ok(())
}

async fn run_clear_cache(app: &App) -> Result<()> {
    let groups = app.client.list_groups().await?;
    let active = store::saved_group(app.store.as_ref()).map(|(id, _)| id);
    let cleared = app.engine.cache().clear_all(&groups, active);
    println!("Cleared cached members of {} group(s)", cleared);
    Ok(())
}

async fn run_status(app: &App) -> Result<()> {
    app.engine.initialize().await;
    println!("{}", button_label(app.engine.active_group().await.as_ref()));
    println!("{}", app.engine.status_line().await);
    if let Some(group) = app.engine.active_group().await {
        if let Some(entry) = app.engine.cache().cached(group.id) {
            println!(
                "{} member(s) cached at {}",
                entry.member_ids.len(),
                entry.fetched_at.to_rfc3339()
            );
        }
    }
    println!("state: {}", app.store.path().display());
    Ok(())
}

async fn run_feed(app: App, pages: usize) -> Result<()> {
    let App {
        client,
        engine,
        continuations,
        ..
    } = app;

    let chain = TransformChain::new().with(engine.clone());
    let feed: Arc<dyn FeedApi> = client;
    let mut reader = FeedReader::new(feed, chain, engine.clone(), continuations);

    let summary = reader
        .read(pages, |item: &Value| {
            let author = extract_author_id(item).unwrap_or_else(|| "?".to_string());
            let name = item
                .pointer("/modules/module_author/name")
                .and_then(Value::as_str)
                .unwrap_or("");
            let text = item
                .pointer("/modules/module_dynamic/desc/text")
                .and_then(Value::as_str)
                .unwrap_or("");
            println!("[{}] {}: {}", author, name, truncate(&text.replace('\n', " "), 60));
        })
        .await?;

    info!(
        fetched = summary.pages_fetched,
        continuations = summary.continuations,
        items = summary.items_delivered,
        "Feed read"
    );
    println!("{}", engine.status_line().await);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging first, so config file and env problems are visible
    let debug = config::env::debug_requested(cli.debug);
    let log_level = if debug { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = Config::load();
    config.debug |= debug;

    if config.api.cookie.is_none() {
        info!("No GROUPFEED_COOKIE set, relation endpoints will likely refuse");
    }

    let app = App::build(&config);
    match cli.command {
        Commands::Groups => run_groups(&app).await?,
        Commands::Members { group_id, refresh } => run_members(&app, group_id, refresh).await?,
        Commands::Select { group_id, name } => run_select(&app, group_id, name).await?,
        Commands::Clear => {
            app.engine.clear_filter().await?;
            println!("Filter cleared");
        }
        Commands::ClearCache => run_clear_cache(&app).await?,
        Commands::Status => run_status(&app).await?,
        Commands::Feed { pages } => run_feed(app, pages).await?,
    }

    Ok(())
}
