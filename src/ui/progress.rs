//! Spinners and build progress with CI fallback

use super::context::UiContext;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// A task spinner with CI fallback
pub struct TaskSpinner {
    spinner: Option<cliclack::ProgressBar>,
    interactive: bool,
}

impl TaskSpinner {
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            spinner: None,
            interactive: ctx.use_fancy_output(),
        }
    }

    pub fn start(&mut self, message: &str) {
        if self.interactive {
            let spinner = cliclack::spinner();
            spinner.start(message);
            self.spinner = Some(spinner);
        } else {
            println!("{} {}", style("...").dim(), message);
        }
    }

    /// Stop with success message
    pub fn stop(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.stop(message);
        } else {
            println!("{} {}", style("[OK]").green(), message);
        }
    }

    /// Stop with error message
    pub fn stop_error(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.error(message);
        } else {
            println!("{} {}", style("[FAIL]").red(), message);
        }
    }
}

/// Progress bar for one `podman build`.
///
/// Tracks `STEP N/M:` lines in an indicatif bar when interactive, and
/// echoes only the step lines otherwise.
pub struct BuildProgress {
    bar: Option<ProgressBar>,
}

impl BuildProgress {
    pub fn new(ctx: &UiContext, image: &str) -> Self {
        let bar = if ctx.use_fancy_output() {
            let bar = ProgressBar::new(0);
            if let Ok(bar_style) = ProgressStyle::default_bar().template(
                "  {spinner:.blue} {prefix}  {bar:20.blue/dim} {pos}/{len} {msg:.dim}  {elapsed:.dim}",
            ) {
                bar.set_style(bar_style.progress_chars("━╸─"));
            }
            bar.set_prefix(image.to_string());
            bar.enable_steady_tick(Duration::from_millis(120));
            Some(bar)
        } else {
            println!("Building {}...", image);
            None
        };
        Self { bar }
    }

    /// Feed one line of builder output
    pub fn on_line(&self, line: String) {
        match (parse_step_line(&line), &self.bar) {
            (Some((n, total, instruction)), Some(bar)) => {
                bar.set_length(total);
                bar.set_position(n);
                bar.set_message(truncate(instruction, 60));
            }
            (Some((n, total, instruction)), None) => {
                println!("  STEP {}/{}: {}", n, total, instruction);
            }
            (None, Some(bar)) => {
                let trimmed = line.trim();
                if !trimmed.is_empty() && !is_build_noise(trimmed) {
                    bar.set_message(truncate(trimmed, 60));
                }
            }
            (None, None) => {}
        }
    }

    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.finish_and_clear();
        }
    }
}

/// Shorten `line` to at most `max` characters
fn truncate(line: &str, max: usize) -> String {
    if line.chars().count() <= max {
        return line.to_string();
    }
    let head: String = line.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", head)
}

/// Podman bookkeeping lines
fn is_build_noise(line: &str) -> bool {
    line.starts_with("-->")
        || line.starts_with("--->")
        || line.starts_with("Removing intermediate")
        || line.starts_with("COMMIT")
        || line.starts_with("Successfully tagged")
}

/// Parse `STEP N/M: INSTRUCTION args...`
fn parse_step_line(line: &str) -> Option<(u64, u64, &str)> {
    let rest = line.strip_prefix("STEP ")?;
    let (counts, instruction) = rest.split_once(':')?;
    let (n, total) = counts.split_once('/')?;
    Some((n.parse().ok()?, total.parse().ok()?, instruction.trim()))
}
