//! SynNovel CLI - release sync for a private novel catalog.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use synnovel::config::Config;
use synnovel::console::Console;
use synnovel::model::{Novel, NovelConfig, ReleaseFormat};
use synnovel::release::ReleaseKey;
use synnovel::resolver::ResolveInput;
use synnovel::{
    CatalogScanner, JsonFileStore, RequestLayer, SeriesResolver, Store, SubmitLedger,
    SyncOrchestrator, build_pending,
};

/// Keeps a private novel catalog in sync with a public release tracker.
#[derive(Parser, Debug)]
#[command(name = "synnovel")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file to use instead of the default location.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Refresh published releases from the tracker.
    Sync {
        /// Only sync this novel (repeatable).
        #[arg(long = "novel")]
        novels: Vec<String>,

        /// Only sync the stored selection.
        #[arg(long, conflicts_with = "novels")]
        selected: bool,
    },

    /// List chapters that still need a release submitted.
    Pending {
        /// Only list this novel (repeatable).
        #[arg(long = "novel")]
        novels: Vec<String>,
    },

    /// Resolve a novel to its tracker series page.
    Resolve { slug: String },

    /// List live submit locks.
    Locks {
        /// Delete expired locks first.
        #[arg(long)]
        prune: bool,
    },

    /// Remove a submit lock, making the release pending again.
    Unlock { slug: String, key: ReleaseKey },

    /// Record a release as published.
    Confirm { slug: String, key: ReleaseKey },

    /// Import novels from a JSON array of novel records.
    Import { file: PathBuf },

    /// Set how a novel maps to the tracker. An empty value clears a field.
    Configure {
        slug: String,

        /// Tracker slug or series URL.
        #[arg(long)]
        slug_hint: Option<String>,

        /// Series name as known on the tracker.
        #[arg(long)]
        series_name: Option<String>,

        /// Group name as known on the tracker.
        #[arg(long)]
        group_name: Option<String>,

        /// Release text style: chapter or c.
        #[arg(long)]
        format: Option<ReleaseFormat>,
    },

    /// Show or replace the selection used by `sync --selected`.
    Select {
        slugs: Vec<String>,

        /// Clear the selection.
        #[arg(long, conflicts_with = "slugs")]
        clear: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => Config::config_path()?,
    };
    let config = Config::load_from(&config_path).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let console = Console::new().with_debug(config.debug);
    let store: Arc<dyn Store> = Arc::new(JsonFileStore::new(config.store_path()?, console));

    match args.command {
        Command::Sync { novels, selected } => {
            let scope = if selected {
                let doc = store.get().await.context("Failed to read store")?;
                if doc.meta.selected_novels.is_empty() {
                    console.warning("No novels selected; use `synnovel select <SLUG>...`");
                    return Ok(());
                }
                Some(doc.meta.selected_novels)
            } else {
                (!novels.is_empty()).then_some(novels)
            };
            run_sync(&config, &config_path, store, scope, console).await?;
        }
        Command::Pending { novels } => {
            let doc = store.get().await.context("Failed to read store")?;
            let scope = (!novels.is_empty()).then_some(novels);
            let ttl = chrono::Duration::days(config.submission.lock_ttl_days);
            let items = build_pending(&doc, scope.as_deref(), Utc::now(), ttl);

            console.section(&format!("Pending releases: {}", console.count(items.len())));
            for item in &items {
                println!(
                    "  {} {:>6}  {}  {}",
                    item.slug,
                    item.release_key.to_string(),
                    item.release_text,
                    console.muted(&item.link)
                );
            }
            if let Some(marker) = &doc.pending_submission {
                console.info(&format!(
                    "Pending submission: {} {} ({})",
                    marker.slug, marker.release_key, marker.display_text
                ));
            }
        }
        Command::Resolve { slug } => {
            let doc = store.get().await.context("Failed to read store")?;
            let novel = doc
                .novels
                .get(&slug)
                .ok_or_else(|| anyhow::anyhow!("Unknown novel: {}", slug))?;
            let novel_config = doc.novel_configs.get(&slug).cloned().unwrap_or_default();

            let (resolver, _) = remote_clients(&config, &config_path, console)?;
            console.step(&format!("Resolving {}...", novel.title));
            let resolution = resolver
                .resolve(ResolveInput {
                    slug_hint: novel_config.remote_slug_hint.as_deref(),
                    series_name: novel_config.remote_series_name.as_deref(),
                    novel_title: &novel.title,
                    previous_slug: doc
                        .published_releases
                        .get(&slug)
                        .map(|r| r.remote_slug.as_str()),
                })
                .await
                .with_context(|| format!("Failed to resolve {}", slug))?;

            console.success(&format!(
                "{} → {} via {}",
                slug,
                config.remote.series_url(&resolution.resolved_slug),
                resolution.source
            ));
        }
        Command::Locks { prune } => {
            let ledger = SubmitLedger::new(store, &config.submission);
            let now = Utc::now();
            if prune {
                let pruned = ledger.prune_expired_locks(now).await?;
                console.success(&format!("Pruned {} expired locks", console.count(pruned)));
            }

            let locks = ledger.live_locks(now).await?;
            console.section(&format!("Live submit locks: {}", console.count(locks.len())));
            for (key, lock) in &locks {
                let expires = lock.created_at + ledger.lock_ttl();
                println!(
                    "  {}  {}",
                    key,
                    console.muted(&format!(
                        "{}, expires {}",
                        lock.reason,
                        expires.format("%Y-%m-%d %H:%M UTC")
                    ))
                );
            }
        }
        Command::Unlock { slug, key } => {
            let ledger = SubmitLedger::new(store, &config.submission);
            if ledger.clear_lock(&slug, key).await? {
                console.success(&format!("Unlocked {} {}", slug, key));
            } else {
                console.warning(&format!("No lock for {} {}", slug, key));
            }
        }
        Command::Confirm { slug, key } => {
            let ledger = SubmitLedger::new(store, &config.submission);
            ledger.confirm(&slug, key).await?;
            console.success(&format!("Recorded {} {} as published", slug, key));
        }
        Command::Import { file } => {
            let content = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let novels: Vec<Novel> = serde_json::from_str(&content)
                .with_context(|| format!("Invalid novel list in {}", file.display()))?;

            let mut doc = store.get().await.context("Failed to read store")?;
            let count = novels.len();
            for novel in novels {
                doc.upsert_novel(novel);
            }
            store.set(doc).await.context("Failed to write store")?;
            console.success(&format!("Imported {} novels", console.count(count)));
        }
        Command::Configure {
            slug,
            slug_hint,
            series_name,
            group_name,
            format,
        } => {
            let doc = store.get().await.context("Failed to read store")?;
            if !doc.novels.contains_key(&slug) {
                console.warning(&format!("{} is not in the catalog yet", slug));
            }

            let mut novel_config: NovelConfig =
                doc.novel_configs.get(&slug).cloned().unwrap_or_default();
            apply_field(&mut novel_config.remote_slug_hint, slug_hint);
            apply_field(&mut novel_config.remote_series_name, series_name);
            apply_field(&mut novel_config.remote_group_name, group_name);
            if let Some(format) = format {
                novel_config.release_format = format;
            }

            store
                .update(
                    &format!("novelConfigs.{}", slug),
                    serde_json::to_value(&novel_config)?,
                )
                .await
                .context("Failed to write store")?;
            console.success(&format!("Updated mapping for {}", slug));
        }
        Command::Select { slugs, clear } => {
            if slugs.is_empty() && !clear {
                let selected = store.get_path("meta.selectedNovels", json!([])).await?;
                console.info(&format!("Selected novels: {}", selected));
                return Ok(());
            }

            let doc = store.get().await.context("Failed to read store")?;
            for slug in slugs.iter().filter(|s| !doc.novels.contains_key(*s)) {
                console.warning(&format!("{} is not in the catalog", slug));
            }
            store
                .update("meta.selectedNovels", json!(slugs))
                .await
                .context("Failed to write store")?;
            console.success(&format!("Selected {} novels", console.count(slugs.len())));
        }
    }

    Ok(())
}

/// Sets `Some(value)` or clears on an empty value; `None` leaves the field.
fn apply_field(field: &mut Option<String>, value: Option<String>) {
    if let Some(value) = value {
        let value = value.trim();
        *field = (!value.is_empty()).then(|| value.to_string());
    }
}

/// Builds the resolver and scanner over one shared request layer.
fn remote_clients(
    config: &Config,
    config_path: &Path,
    console: Console,
) -> Result<(SeriesResolver, CatalogScanner)> {
    let site = url::Url::parse(&config.remote.base_url)
        .with_context(|| format!("Invalid remote base URL: {}", config.remote.base_url))?;
    let layer = Arc::new(
        RequestLayer::new(&config.request, &site, config_path.parent(), console)
            .context("Failed to create HTTP client")?,
    );

    let resolver = SeriesResolver::new(layer.clone(), &config.remote, &config.resolver, console);
    let scanner = CatalogScanner::new(layer, &config.remote, console);
    Ok((resolver, scanner))
}

async fn run_sync(
    config: &Config,
    config_path: &Path,
    store: Arc<dyn Store>,
    scope: Option<Vec<String>>,
    console: Console,
) -> Result<()> {
    console.section("SynNovel - Release Sync");

    let (resolver, scanner) = remote_clients(config, config_path, console)?;
    let orchestrator = SyncOrchestrator::new(store, resolver, scanner, &config.sync, console);

    let report = orchestrator
        .sync(scope.as_deref())
        .await
        .context("Sync failed")?;

    console.section("Done!");
    console.info(&format!(
        "Synced {}, failed {}, locks cleared {}",
        console.count(report.synced),
        report.failed.len(),
        report.locks_cleared
    ));
    for (slug, reason) in &report.failed {
        console.error(&format!("{}: {}", slug, reason));
    }

    Ok(())
}
