//! Terminal output for skiff commands
//!
//! Uses `cliclack` when attached to a terminal and falls back to plain,
//! greppable lines in CI or when piped.
//!
//! ```rust,ignore
//! use skiff::ui::{self, UiContext, TaskSpinner};
//!
//! let ctx = UiContext::detect();
//! ui::intro(&ctx, "skiff build");
//!
//! let mut spinner = TaskSpinner::new(&ctx);
//! spinner.start("Checking build cache...");
//! spinner.stop("2 cached, 1 to build");
//!
//! ui::outro_success(&ctx, "Build complete");
//! ```

mod context;
mod output;
mod progress;
mod prompts;
mod theme;

pub use context::UiContext;
pub use output::{
    intro, note, outro_success, step_info, step_ok_detail, step_warn_hint,
};
pub use progress::{BuildProgress, TaskSpinner};
pub use prompts::confirm;
pub use theme::{init_theme, SkiffTheme};
