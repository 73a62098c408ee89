//! Remote registry lookups
//!
//! Resolves a tag to its manifest digest with a `HEAD` against the OCI
//! distribution API. Handles the anonymous bearer-token handshake that
//! Docker Hub, GHCR and most hosted registries require for pulls.

use crate::config::schema::RegistryConfig;
use crate::error::{SkiffError, SkiffResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::debug;

const DOCKER_HUB: &str = "docker.io";
const DOCKER_HUB_HOST: &str = "registry-1.docker.io";

const MANIFEST_ACCEPT: &str = "application/vnd.oci.image.index.v1+json, \
     application/vnd.docker.distribution.manifest.list.v2+json, \
     application/vnd.oci.image.manifest.v1+json, \
     application/vnd.docker.distribution.manifest.v2+json";

/// Registry queries the cache needs
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Manifest digest for `reference`, `None` if the registry doesn't have it
    async fn remote_digest(&self, reference: &str) -> SkiffResult<Option<String>>;

    /// Whether `reference` exists remotely with exactly `digest`
    async fn digest_exists_remotely(&self, reference: &str, digest: &str) -> SkiffResult<bool> {
        if digest.is_empty() {
            return Ok(false);
        }
        let remote = self.remote_digest(reference).await?;
        Ok(remote.as_deref() == Some(digest))
    }
}

/// A parsed `[registry/]repository[:tag|@digest]` reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Registry host as written (`docker.io` for unqualified names)
    pub registry: String,
    /// Repository path within the registry
    pub repository: String,
    /// Tag or digest
    pub reference: String,
}

impl ImageReference {
    /// Parse with Docker's normalization rules
    pub fn parse(input: &str) -> SkiffResult<Self> {
        let invalid = || SkiffError::InvalidReference(input.to_string());
        if input.is_empty() || input.contains(char::is_whitespace) {
            return Err(invalid());
        }

        let (name, reference) = match input.split_once('@') {
            Some((name, digest)) => (name, digest.to_string()),
            None => {
                let last_segment = input.rfind('/').map(|i| i + 1).unwrap_or(0);
                match input[last_segment..].rfind(':') {
                    Some(i) => (
                        &input[..last_segment + i],
                        input[last_segment + i + 1..].to_string(),
                    ),
                    None => (input, "latest".to_string()),
                }
            }
        };

        if name.is_empty() || reference.is_empty() {
            return Err(invalid());
        }

        let (registry, repository) = match name.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (first.to_string(), rest.to_string())
            }
            _ => (DOCKER_HUB.to_string(), name.to_string()),
        };

        let repository = if registry == DOCKER_HUB && !repository.contains('/') {
            format!("library/{}", repository)
        } else {
            repository
        };

        if repository.is_empty() || repository.ends_with('/') {
            return Err(invalid());
        }

        Ok(Self {
            registry,
            repository,
            reference,
        })
    }

    /// Host to contact for the distribution API
    pub fn api_host(&self) -> &str {
        if self.registry == DOCKER_HUB {
            DOCKER_HUB_HOST
        } else {
            &self.registry
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = if self.reference.contains(':') { '@' } else { ':' };
        write!(f, "{}/{}{}{}", self.registry, self.repository, sep, self.reference)
    }
}

/// Parse a `WWW-Authenticate: Bearer k="v",...` challenge
fn parse_bearer_challenge(header: &str) -> Option<HashMap<String, String>> {
    let params = header
        .trim()
        .strip_prefix("Bearer ")
        .or_else(|| header.trim().strip_prefix("bearer "))?;

    let mut out = HashMap::new();
    let mut rest = params.trim();
    while !rest.is_empty() {
        let (key, after_key) = rest.split_once('=')?;
        let after_key = after_key.trim_start();
        let (value, remainder) = if let Some(quoted) = after_key.strip_prefix('"') {
            let end = quoted.find('"')?;
            (&quoted[..end], &quoted[end + 1..])
        } else {
            match after_key.find(',') {
                Some(end) => (&after_key[..end], &after_key[end..]),
                None => (after_key, ""),
            }
        };
        out.insert(key.trim().to_string(), value.to_string());
        rest = remainder.trim_start_matches(',').trim();
    }

    out.contains_key("realm").then_some(out)
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// Registry client speaking the OCI distribution API over `ureq`
#[derive(Clone)]
pub struct DistributionRegistry {
    agent: ureq::Agent,
    insecure: Vec<String>,
}

impl DistributionRegistry {
    pub fn new(config: &RegistryConfig) -> Self {
        let agent_config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .build();

        Self {
            agent: ureq::Agent::new_with_config(agent_config),
            insecure: config.insecure.clone(),
        }
    }

    fn scheme(&self, registry: &str) -> &'static str {
        let local = registry == "localhost"
            || registry.starts_with("localhost:")
            || registry.starts_with("127.0.0.1");
        if local || self.insecure.iter().any(|r| r == registry) {
            "http"
        } else {
            "https"
        }
    }

    fn head_manifest(
        &self,
        url: &str,
        token: Option<&str>,
    ) -> SkiffResult<ureq::http::Response<ureq::Body>> {
        let mut request = self.agent.head(url).header("Accept", MANIFEST_ACCEPT);
        if let Some(token) = token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }
        request
            .call()
            .map_err(|e| SkiffError::registry(url, e.to_string()))
    }

    fn fetch_token(&self, challenge: &str, image: &ImageReference) -> SkiffResult<String> {
        let params = parse_bearer_challenge(challenge).ok_or_else(|| {
            SkiffError::registry(image.to_string(), format!("unsupported auth challenge: {}", challenge))
        })?;

        let realm = &params["realm"];
        let scope = params
            .get("scope")
            .cloned()
            .unwrap_or_else(|| format!("repository:{}:pull", image.repository));

        let mut request = self.agent.get(realm).query("scope", &scope);
        if let Some(service) = params.get("service") {
            request = request.query("service", service);
        }

        let mut response = request
            .call()
            .map_err(|e| SkiffError::registry(realm, e.to_string()))?;
        if !response.status().is_success() {
            return Err(SkiffError::registry(
                image.to_string(),
                format!("token endpoint returned {}", response.status()),
            ));
        }

        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| SkiffError::registry(realm, e.to_string()))?;
        let token: TokenResponse = serde_json::from_str(&body)?;

        token.token.or(token.access_token).ok_or_else(|| {
            SkiffError::registry(image.to_string(), "token endpoint returned no token")
        })
    }

    /// Blocking digest lookup, run on the blocking pool
    fn fetch_digest(&self, image: &ImageReference) -> SkiffResult<Option<String>> {
        let url = format!(
            "{}://{}/v2/{}/manifests/{}",
            self.scheme(&image.registry),
            image.api_host(),
            image.repository,
            image.reference
        );
        debug!("Resolving remote digest: HEAD {}", url);

        let mut response = self.head_manifest(&url, None)?;
        if response.status().as_u16() == 401 {
            let challenge = response
                .headers()
                .get("www-authenticate")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            let token = self.fetch_token(&challenge, image)?;
            response = self.head_manifest(&url, Some(&token))?;
        }

        match response.status().as_u16() {
            200 => {
                let digest = response
                    .headers()
                    .get("docker-content-digest")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                if digest.is_none() {
                    return Err(SkiffError::registry(
                        image.to_string(),
                        "response carried no Docker-Content-Digest",
                    ));
                }
                Ok(digest)
            }
            404 => Ok(None),
            status => Err(SkiffError::registry(
                image.to_string(),
                format!("manifest lookup returned {}", status),
            )),
        }
    }
}

#[async_trait]
impl RegistryClient for DistributionRegistry {
    async fn remote_digest(&self, reference: &str) -> SkiffResult<Option<String>> {
        let image = ImageReference::parse(reference)?;
        let client = self.clone();
        tokio::task::spawn_blocking(move || client.fetch_digest(&image))
            .await
            .map_err(|e| SkiffError::Internal(format!("registry task failed: {}", e)))?
    }
}
