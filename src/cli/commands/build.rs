//! Build command - build artifacts through the cache

use crate::artifact::BuildResult;
use crate::cache::{CacheOptions, CacheRetriever, CacheStore, CacheUpdater, DependencyHasher};
use crate::cancel::{CancelHandle, Cancellation};
use crate::cli::args::{BuildArgs, OutputFormat};
use crate::cli::commands::select_artifacts;
use crate::config::{Config, ConfigManager};
use crate::error::SkiffResult;
use crate::orchestration::factory::require_daemon;
use crate::orchestration::{DistributionRegistry, PodmanBuilder};
use crate::pipeline::{BuildPipeline, BuildReport};
use crate::ui::{self, TaskSpinner, UiContext};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Execute the build command
pub async fn execute(
    args: BuildArgs,
    config: &Config,
    handle: &CancelHandle,
    cancel: &Cancellation,
) -> SkiffResult<()> {
    let ctx = UiContext::detect();
    let artifacts = select_artifacts(config, &args.artifacts)?;
    let options = cache_options(&args, config);
    debug!("Cache options: {:?}", options);

    if let Some(secs) = args.timeout {
        handle.cancel_after(Duration::from_secs(secs));
    }

    if args.format == OutputFormat::Table {
        ui::intro(&ctx, "skiff build");
    }

    let daemon = require_daemon(config).await?;
    let push = options.push_images || !options.local_cluster;
    let builder = PodmanBuilder::new(daemon.clone(), push, ctx.clone());

    let daemon = Arc::new(daemon);
    let mut retriever = CacheRetriever::new(options.clone(), Arc::new(DependencyHasher::new()))
        .with_daemon(daemon.clone());
    let mut updater =
        CacheUpdater::new(options.local_cluster, options.query_timeout).with_daemon(daemon);
    if !options.local_cluster {
        let registry = Arc::new(DistributionRegistry::new(&config.registry));
        retriever = retriever.with_registry(registry.clone());
        updater = updater.with_registry(registry);
    }

    let mut store = CacheStore::load(ConfigManager::index_path(config)).await;
    let pipeline = BuildPipeline::new(retriever, updater, Arc::new(builder));

    let mut spinner = TaskSpinner::new(&ctx);
    if args.format == OutputFormat::Table {
        spinner.start(&format!("Building {} artifact(s)...", artifacts.len()));
    }
    let report = match pipeline.run(artifacts, &mut store, cancel).await {
        Ok(report) => report,
        Err(e) => {
            if args.format == OutputFormat::Table {
                spinner.stop_error("Build failed");
            }
            return Err(e);
        }
    };

    match args.format {
        OutputFormat::Table => {
            spinner.stop(&format!(
                "{} cached, {} built",
                report.cached.len(),
                report.built.len()
            ));
            print_report(&ctx, &report, options.use_cache);
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report.results)?),
        OutputFormat::Plain => {
            for result in &report.results {
                println!("{}", result.tag);
            }
        }
    }

    Ok(())
}

/// Config values with command-line overrides applied
fn cache_options(args: &BuildArgs, config: &Config) -> CacheOptions {
    let mut options = CacheOptions::from_config(&config.cache);
    if args.no_cache {
        options.use_cache = false;
    }
    if args.local_cluster {
        options.local_cluster = true;
    }
    if args.remote_cluster {
        options.local_cluster = false;
    }
    if args.push {
        options.push_images = true;
    }
    options
}

fn describe(result: &BuildResult, report: &BuildReport) -> String {
    let source = if report.cached.contains(&result.image_name) {
        "cached"
    } else {
        "built"
    };
    format!("{} ({})", result.tag, source)
}

fn print_report(ctx: &UiContext, report: &BuildReport, use_cache: bool) {
    let lines: Vec<String> = report
        .results
        .iter()
        .map(|r| format!("{} -> {}", r.image_name, describe(r, report)))
        .collect();
    ui::note(ctx, "Images", &lines.join("\n"));

    if use_cache && report.update.updated > 0 && !report.update.persisted {
        ui::step_warn_hint(
            ctx,
            "Build cache was not saved",
            "The next run will rebuild these images",
        );
    }
    ui::outro_success(ctx, "Build complete");
}
