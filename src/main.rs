use chrono::Utc;
use clap::{Parser, Subcommand};
use log::{error, info, warn};

use link_portal::cache::CacheCategory;
use link_portal::config::service::LoadedConfig;
use link_portal::config::settings::RuntimeOptions;
use link_portal::diagnostics;
use link_portal::rss::FeedItem;
use link_portal::Portal;

#[derive(Parser)]
#[command(name = "link-portal")]
#[command(author, version, about = "Cached link portal with feed retrieval", long_about = None)]
struct Cli {
    /// Configuration document location: a file path or an http(s) URL
    #[arg(long, global = true)]
    config: Option<String>,

    /// JSON proxy endpoint used for feed fetches
    #[arg(long, global = true)]
    proxy: Option<String>,

    /// Directory for the on-disk cache; in-memory when omitted
    #[arg(long, global = true)]
    storage: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the configuration and print every category with its items
    Show,
    /// Reload the configuration from its origin and redisplay everything
    Refresh,
    /// Fetch all feeds and print their health records
    Health,
    /// Cache maintenance
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Check the configuration document and report problems
    Validate,
    /// Search configured links
    Search { term: String },
    /// Keep feeds refreshed on the configured interval
    Watch,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Print the effective cache policy and the stored entries
    Stats,
    /// Evict cached entries: everything, or one category (rss, config)
    Clear { category: Option<String> },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    // CLI flags overlay the PORTAL_* environment.
    let env_options = RuntimeOptions::from_env();
    let options = RuntimeOptions {
        config_location: cli.config.unwrap_or(env_options.config_location),
        proxy_url: cli.proxy.unwrap_or(env_options.proxy_url),
        storage_dir: cli.storage.or(env_options.storage_dir),
    };

    info!("🔗 Link portal starting (config: {})", options.config_location);
    let portal = Portal::new(&options)?;

    match cli.command.unwrap_or(Commands::Show) {
        Commands::Show => show(&portal).await?,
        Commands::Refresh => refresh(&portal).await?,
        Commands::Health => health(&portal).await?,
        Commands::Cache { action } => match action {
            CacheAction::Stats => cache_stats(&portal).await,
            CacheAction::Clear { category } => cache_clear(&portal, category.as_deref()).await?,
        },
        Commands::Validate => validate(&portal).await?,
        Commands::Search { term } => search(&portal, &term).await?,
        Commands::Watch => watch(&portal).await?,
    }
    Ok(())
}

async fn show(portal: &Portal) -> anyhow::Result<()> {
    let loaded = unpack(portal.load().await)?;
    print_portal(portal, &loaded).await;
    Ok(())
}

/// Hot reload: evict cached config and feeds, then refetch and redisplay.
async fn refresh(portal: &Portal) -> anyhow::Result<()> {
    let loaded = unpack(portal.reload().await)?;
    print_portal(portal, &loaded).await;
    Ok(())
}

/// Categories with their links and items, then the portal-wide feed.
async fn print_portal(portal: &Portal, loaded: &LoadedConfig) {
    for category in loaded.config.categories() {
        println!(
            "\n{} {}",
            category.icon.as_deref().unwrap_or("📁"),
            category.display_name()
        );
        for link in category.links.as_deref().unwrap_or(&[]) {
            println!(
                "  {} {}  {}",
                link.icon.as_deref().unwrap_or("🔗"),
                link.title.as_deref().unwrap_or("(untitled)"),
                link.url.as_deref().unwrap_or("")
            );
        }
        if category.rss_feed.is_some() {
            let items = portal.category_items(category).await;
            if items.is_empty() {
                println!("  (no items)");
            }
            for item in items {
                print_item(category.rss_icon.as_deref().unwrap_or("📰"), &item);
            }
        }
    }

    if loaded.config.rss_feed.is_some() {
        println!("\n📰 Feed");
        let items = portal.main_feed_items().await;
        if items.is_empty() {
            println!("  (no items)");
        }
        for item in items {
            print_item("📰", &item);
        }
    }
}

fn print_item(icon: &str, item: &FeedItem) {
    let published = item
        .published_at
        .map(|t| t.format("%Y-%m-%d").to_string())
        .unwrap_or_default();
    println!("  {} {}  {}  {}", icon, item.title, item.url, published);
}

async fn health(portal: &Portal) -> anyhow::Result<()> {
    unpack(portal.load().await)?;
    portal.refresh_all().await;

    let rows = diagnostics::health_rows(portal.feed_health());
    if rows.is_empty() {
        println!("(no feeds configured)");
    }
    for row in rows {
        let status = if row.ok { "✅" } else { "❌" };
        let ago = (Utc::now() - row.last_attempt_at).num_seconds();
        println!(
            "{} {}  avg {:.0}ms over {} load(s), {} consecutive failure(s), last attempt {}s ago",
            status, row.url, row.avg_latency_ms, row.success_count, row.consecutive_failures, ago
        );
    }
    Ok(())
}

async fn cache_stats(portal: &Portal) {
    // Stats stay useful even when no configuration can be loaded.
    if let Err(err) = portal.load().await {
        warn!("Proceeding without configuration: {}", err);
    }
    let report = diagnostics::cache_report(portal.cache_summary(), portal.cache_entries().await);
    println!("Policy: {}", report.summary);
    if report.entries.is_empty() {
        println!("(cache is empty)");
    }
    for row in report.entries {
        println!(
            "  {:<50} age {:>6}s  {:>8.1} KB",
            row.name, row.age_secs, row.size_kb
        );
    }
}

async fn cache_clear(portal: &Portal, category: Option<&str>) -> anyhow::Result<()> {
    let evicted = match category {
        None => portal.clear_cache().await,
        Some(label) => {
            let category = CacheCategory::ALL
                .into_iter()
                .find(|c| c.label() == label)
                .ok_or_else(|| anyhow::anyhow!("unknown cache category '{}' (rss, config)", label))?;
            portal.clear_cache_category(category).await
        }
    };
    println!("Evicted {} cache entr{}", evicted, if evicted == 1 { "y" } else { "ies" });
    Ok(())
}

async fn validate(portal: &Portal) -> anyhow::Result<()> {
    let report = portal.validate_config().await?;
    for e in &report.errors {
        println!("error: {}", e);
    }
    for w in &report.warnings {
        println!("warning: {}", w);
    }
    if !report.is_valid() {
        anyhow::bail!("configuration failed validation");
    }
    println!("✅ Configuration is structurally valid");
    Ok(())
}

async fn search(portal: &Portal, term: &str) -> anyhow::Result<()> {
    unpack(portal.load().await)?;
    let hits = portal.search(term);
    if hits.is_empty() {
        println!("(no matches)");
    }
    for hit in hits {
        println!("  [{}] {}  {}", hit.category, hit.title, hit.url);
    }
    Ok(())
}

async fn watch(portal: &Portal) -> anyhow::Result<()> {
    let loaded = unpack(portal.load().await)?;
    print_portal(portal, &loaded).await;
    portal.watch().await?;
    Ok(())
}

fn unpack(result: link_portal::Result<LoadedConfig>) -> anyhow::Result<LoadedConfig> {
    match result {
        Ok(loaded) => {
            if loaded.degraded() {
                warn!("⚠️  Serving a stale configuration; the origin is unreachable");
            }
            Ok(loaded)
        }
        Err(err) => {
            error!("❌ No configuration available: {}", err);
            Err(err.into())
        }
    }
}

fn setup_logging(verbose: bool) -> Result<(), fern::InitError> {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}] {}",
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .level_for("reqwest", log::LevelFilter::Warn)
        .level_for("hyper", log::LevelFilter::Warn)
        .chain(std::io::stdout())
        .apply()?;
    Ok(())
}
