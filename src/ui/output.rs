//! Formatted command output

use super::context::UiContext;
use console::{style, StyledObject};

/// Plain-mode line with a bracketed status marker
fn plain_step(marker: StyledObject<&str>, message: &str) {
    println!("  {} {}", marker, message);
}

/// Command banner
pub fn intro(ctx: &UiContext, title: &str) {
    if ctx.use_fancy_output() {
        cliclack::intro(style(title).blue().bold()).ok();
    } else {
        println!("{}", style(title).blue().bold());
    }
}

pub fn outro_success(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::outro(style(message).green().bold()).ok();
    } else {
        println!();
        println!("{} {}", style("[OK]").green(), message);
    }
}

/// Titled block, e.g. the resolved image list
pub fn note(ctx: &UiContext, title: &str, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::note(title, message).ok();
    } else {
        println!("{}:", style(title).bold());
        for line in message.lines() {
            println!("  {}", line);
        }
    }
}

pub fn step_ok_detail(ctx: &UiContext, message: &str, detail: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::success(format!("{} ({})", message, style(detail).dim())).ok();
    } else {
        plain_step(style("[OK]").green(), &format!("{} ({})", message, detail));
    }
}

pub fn step_info(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::info(message).ok();
    } else {
        plain_step(style("[INFO]").cyan(), message);
    }
}

pub fn step_warn_hint(ctx: &UiContext, message: &str, hint: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::warning(format!("{} - {}", message, style(hint).dim())).ok();
    } else {
        plain_step(style("[WARN]").yellow(), &format!("{} - {}", message, hint));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_non_interactive() {
        let ctx = UiContext::non_interactive();
        intro(&ctx, "skiff build");
        step_ok_detail(&ctx, "web", "cached");
        step_warn_hint(&ctx, "Cache not saved", "check permissions");
        note(&ctx, "Images", "web -> web:abc\napi -> api:def");
        outro_success(&ctx, "Done");
    }
}
