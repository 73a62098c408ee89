//! Collaborator construction from configuration

use crate::config::Config;
use crate::error::{SkiffError, SkiffResult};
use crate::orchestration::podman::PodmanDaemon;
use crate::orchestration::registry::DistributionRegistry;
use tracing::{debug, warn};

/// The local daemon, if enabled and reachable
pub async fn detect_daemon(config: &Config) -> Option<PodmanDaemon> {
    if !config.daemon.enabled {
        debug!("Local daemon disabled in config");
        return None;
    }

    let daemon = PodmanDaemon::new(&config.daemon.binary);
    if daemon.is_available().await {
        Some(daemon)
    } else {
        warn!("{} is not available, skipping local image lookups", config.daemon.binary);
        None
    }
}

/// The local daemon, failing when it can't be used
pub async fn require_daemon(config: &Config) -> SkiffResult<PodmanDaemon> {
    detect_daemon(config)
        .await
        .ok_or_else(|| SkiffError::DaemonNotFound(config.daemon.binary.clone()))
}

/// Registry client for remote-cluster runs. Local clusters never consult
/// the registry.
pub fn create_registry(config: &Config) -> Option<DistributionRegistry> {
    if config.cache.local_cluster {
        None
    } else {
        Some(DistributionRegistry::new(&config.registry))
    }
}
