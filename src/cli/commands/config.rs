//! Config command - show or initialize configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager};
use crate::error::{SkiffError, SkiffResult};
use crate::ui::{self, UiContext};
use tokio::fs;

/// Starter skiff.toml written by `config init`
const CONFIG_TEMPLATE: &str = r#"[general]
log_format = "text"

[cache]
enabled = true
# Images are consumed straight from the local daemon. Set to false when
# deploying to a cluster that pulls from a registry.
local_cluster = true
push_images = false
concurrency = 4
query_timeout_secs = 30

[daemon]
binary = "podman"

[registry]
insecure = []
timeout_secs = 10

# [[artifacts]]
# image = "registry.example.com/team/web"
# context = "web"
# dockerfile = "Dockerfile"
# dependencies = ["src", "Cargo.toml", "Cargo.lock"]
# build_args = { PROFILE = "release" }
"#;

/// Execute the config command
pub async fn execute(args: ConfigArgs, config: &Config, manager: &ConfigManager) -> SkiffResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
        Some(ConfigAction::Init { force }) => init_config(manager, force).await?,
    }
    Ok(())
}

fn show_config(config: &Config) -> SkiffResult<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

async fn init_config(manager: &ConfigManager, force: bool) -> SkiffResult<()> {
    let ctx = UiContext::detect();
    let path = manager.path();

    if path.exists() && !force {
        ui::step_warn_hint(
            &ctx,
            &format!("Config already exists at {}", path.display()),
            "Use --force to overwrite",
        );
        return Ok(());
    }

    fs::write(path, CONFIG_TEMPLATE)
        .await
        .map_err(|e| SkiffError::io(format!("writing config to {}", path.display()), e))?;

    ui::step_ok_detail(&ctx, "Configuration initialized", &path.display().to_string());
    Ok(())
}
