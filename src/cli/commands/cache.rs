//! Cache command - inspect and reset the build cache index

use crate::cache::{CacheOptions, CacheRetriever, CacheStore, Classification, DependencyHasher};
use crate::cancel::Cancellation;
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::cli::commands::select_artifacts;
use crate::config::{Config, ConfigManager};
use crate::error::SkiffResult;
use crate::orchestration::factory::{create_registry, detect_daemon};
use crate::ui::{self, UiContext};
use console::style;
use std::sync::Arc;

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config, cancel: &Cancellation) -> SkiffResult<()> {
    let index_path = ConfigManager::index_path(config);

    match args.action {
        CacheAction::List { format } => {
            let store = CacheStore::load(index_path).await;
            list_entries(&store, format)
        }
        CacheAction::Check { artifacts } => check(config, &artifacts, cancel).await,
        CacheAction::Clear { yes } => clear(index_path, yes).await,
        CacheAction::Path => {
            println!("{}", index_path.display());
            Ok(())
        }
    }
}

/// Shorten `sha256:<hex>` for table display
fn short_digest(digest: &str) -> String {
    if digest.is_empty() {
        return "-".to_string();
    }
    let (algo, hex) = digest.split_once(':').unwrap_or(("", digest));
    let hex: String = hex.chars().take(12).collect();
    if algo.is_empty() {
        hex
    } else {
        format!("{}:{}", algo, hex)
    }
}

fn list_entries(store: &CacheStore, format: OutputFormat) -> SkiffResult<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(store.entries())?);
        }
        OutputFormat::Plain => {
            for hash in store.entries().keys() {
                println!("{}", hash);
            }
        }
        OutputFormat::Table => {
            if store.is_empty() {
                println!("No cache entries in {}", store.path().display());
                return Ok(());
            }

            println!("{:<20} {:<22} {:<22}", "HASH", "DIGEST", "ID");
            println!("{}", "-".repeat(66));
            for (hash, details) in store.entries() {
                let hash: String = hash.chars().take(16).collect();
                println!(
                    "{:<20} {:<22} {:<22}",
                    hash,
                    short_digest(&details.digest),
                    short_digest(&details.id)
                );
            }
            println!();
            println!("Total: {} entr{}", store.len(), if store.len() == 1 { "y" } else { "ies" });
        }
    }
    Ok(())
}

/// Classify without retagging, pushing or building
async fn check(config: &Config, names: &[String], cancel: &Cancellation) -> SkiffResult<()> {
    let ctx = UiContext::detect();
    let artifacts = select_artifacts(config, names)?;
    let store = CacheStore::load(ConfigManager::index_path(config)).await;

    let options = CacheOptions::from_config(&config.cache);
    let mut retriever = CacheRetriever::new(options, Arc::new(DependencyHasher::new()));
    if let Some(daemon) = detect_daemon(config).await {
        retriever = retriever.with_daemon(Arc::new(daemon));
    }
    if let Some(registry) = create_registry(config) {
        retriever = retriever.with_registry(Arc::new(registry));
    }

    ui::intro(&ctx, "skiff cache check");
    let classifications = retriever.classify_all(artifacts, store.entries(), cancel).await?;
    for classification in &classifications {
        report_classification(&ctx, classification);
    }
    Ok(())
}

fn report_classification(ctx: &UiContext, classification: &Classification) {
    let name = &classification.artifact.image_name;
    match &classification.decision {
        Err(e) => ui::step_warn_hint(ctx, &format!("{}: rebuild", name), &e.to_string()),
        Ok(details) if details.needs_rebuild => ui::step_info(ctx, &format!("{}: rebuild", name)),
        Ok(details) if details.needs_retag => {
            let action = if details.needs_push { "retag + push" } else { "retag" };
            ui::step_ok_detail(
                ctx,
                &format!("{}: {} {}", name, action, details.prebuilt_image),
                &details.hash_tag,
            )
        }
        Ok(details) => ui::step_ok_detail(ctx, &format!("{}: cached", name), &details.hash_tag),
    }
}

async fn clear(index_path: std::path::PathBuf, yes: bool) -> SkiffResult<()> {
    let ctx = UiContext::detect().with_auto_yes(yes);
    let mut store = CacheStore::load(index_path).await;

    if store.is_empty() && !store.path().exists() {
        ui::step_info(&ctx, "Cache index is already empty");
        return Ok(());
    }

    let prompt = format!("Remove {} cache entries?", store.len());
    if !ui::confirm(&ctx, &prompt, false).await? {
        println!("Aborted. Use {} to skip confirmation.", style("--yes").cyan());
        return Ok(());
    }

    let count = store.len();
    store.clear().await?;
    ui::step_ok_detail(&ctx, &format!("Removed {} cache entries", count), &store.path().display().to_string());
    Ok(())
}
