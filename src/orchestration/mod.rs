//! Container runtime and registry collaborators
//!
//! The build cache talks to the outside world only through these traits:
//! - [`DaemonClient`]: the local image store (Podman)
//! - [`RegistryClient`]: remote manifests (OCI distribution API)
//! - [`Builder`]: turns artifacts into images

pub mod builder;
mod daemon;
pub mod factory;
pub mod podman;
pub mod registry;

pub use builder::{build_tag, Builder, PodmanBuilder};
pub use daemon::DaemonClient;
pub use podman::PodmanDaemon;
pub use registry::{DistributionRegistry, ImageReference, RegistryClient};

use crate::error::{SkiffError, SkiffResult};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Max number of output lines to include in build error messages.
const BUILD_ERROR_TAIL_LINES: usize = 50;

/// Extract the useful tail of build output for error diagnostics.
pub(crate) fn build_error_output(lines: &[String]) -> String {
    let start = lines.len().saturating_sub(BUILD_ERROR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Stream stdout+stderr from a child process, calling `on_output` for each line.
///
/// Returns all collected output lines for error reporting. This is a standalone
/// async function (not behind `async_trait`) to avoid lifetime issues with the
/// `dyn Fn` callback.
pub(crate) async fn stream_child_output(
    child: &mut tokio::process::Child,
    on_output: &(dyn Fn(String) + Send + Sync),
) -> SkiffResult<Vec<String>> {
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| SkiffError::Internal("child stderr not piped".to_string()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| SkiffError::Internal("child stdout not piped".to_string()))?;

    let mut stderr_reader = BufReader::new(stderr).lines();
    let mut stdout_reader = BufReader::new(stdout).lines();

    let mut all_output = Vec::new();
    let mut stderr_done = false;
    let mut stdout_done = false;

    while !stderr_done || !stdout_done {
        tokio::select! {
            line = stderr_reader.next_line(), if !stderr_done => {
                match line {
                    Ok(Some(line)) => {
                        on_output(line.clone());
                        all_output.push(line);
                    }
                    _ => stderr_done = true,
                }
            }
            line = stdout_reader.next_line(), if !stdout_done => {
                match line {
                    Ok(Some(line)) => {
                        on_output(line.clone());
                        all_output.push(line);
                    }
                    _ => stdout_done = true,
                }
            }
        }
    }

    Ok(all_output)
}
