//! Cached per-server availability of a blob.
//!
//! Each (server, hash) pair moves `unknown → checking → available |
//! unavailable | error`. A settled answer younger than the TTL is served from
//! the cache without probing. `error` is never trusted and is re-probed on
//! the next check.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use blossom_client::{BatchCancel, BlobServer, Slot, fan_out};
use blossom_protocol::ServerEndpoint;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::TtlCache;

const UPDATE_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AvailabilityStatus {
    #[default]
    Unknown,
    Checking,
    Available,
    Unavailable,
    Error,
}

impl AvailabilityStatus {
    /// A probe answered definitively.
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Available | Self::Unavailable)
    }
}

/// What is known about one server holding one blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerAvailability {
    /// Normalized server origin.
    pub server: String,
    /// The URL that was (or will be) probed.
    pub url: String,
    pub status: AvailabilityStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServerAvailability {
    pub fn unknown(server: &ServerEndpoint, sha256: &str, ext: Option<&str>) -> Self {
        Self {
            server: server.base_url().to_string(),
            url: server.blob_url(sha256, ext),
            status: AvailabilityStatus::Unknown,
            http_status: None,
            content_length: None,
            last_checked_at: None,
            error: None,
        }
    }

    fn with_status(mut self, status: AvailabilityStatus) -> Self {
        self.status = status;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvailabilityConfig {
    /// How long a settled answer is reused without probing.
    pub ttl: Duration,
}

impl Default for AvailabilityConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
        }
    }
}

/// Broadcast on every status change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityUpdate {
    /// Set when the probe was part of [`AvailabilityChecker::check_variant`].
    pub variant: Option<String>,
    pub sha256: String,
    pub availability: ServerAvailability,
}

/// Read-only view of one logical asset across its servers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantAvailability {
    pub variant: String,
    pub sha256: String,
    pub servers: Vec<ServerAvailability>,
}

impl VariantAvailability {
    /// URLs of servers that answered "present", in server order.
    pub fn available_urls(&self) -> Vec<&str> {
        self.servers
            .iter()
            .filter(|s| s.status == AvailabilityStatus::Available)
            .map(|s| s.url.as_str())
            .collect()
    }

    pub fn is_available(&self) -> bool {
        self.servers
            .iter()
            .any(|s| s.status == AvailabilityStatus::Available)
    }
}

struct VariantEntry {
    sha256: String,
    ext: Option<String>,
    servers: Vec<ServerEndpoint>,
}

type CacheKey = (String, String);

struct Inner {
    cache: TtlCache<CacheKey, ServerAvailability>,
    variants: DashMap<String, VariantEntry>,
    updates: broadcast::Sender<AvailabilityUpdate>,
    cancel: BatchCancel,
}

impl Inner {
    fn publish(&self, variant: Option<&str>, sha256: &str, availability: &ServerAvailability) {
        // No subscribers is fine.
        let _ = self.updates.send(AvailabilityUpdate {
            variant: variant.map(str::to_string),
            sha256: sha256.to_string(),
            availability: availability.clone(),
        });
    }

    fn store(&self, variant: Option<&str>, sha256: &str, availability: ServerAvailability) {
        self.cache.insert(
            (availability.server.clone(), sha256.to_string()),
            availability.clone(),
        );
        self.publish(variant, sha256, &availability);
    }

    fn current(&self, server: &ServerEndpoint, sha256: &str, ext: Option<&str>) -> ServerAvailability {
        self.cache
            .get(&cache_key(server, sha256))
            .unwrap_or_else(|| ServerAvailability::unknown(server, sha256, ext))
    }
}

fn cache_key(server: &ServerEndpoint, sha256: &str) -> CacheKey {
    (server.base_url().to_string(), sha256.to_ascii_lowercase())
}

/// Probes which servers hold a blob, caching answers per (server, hash).
///
/// Cloning is cheap and clones share the cache, the subscribers and the
/// cancellation scope.
#[derive(Clone)]
pub struct AvailabilityChecker {
    inner: Arc<Inner>,
}

impl Default for AvailabilityChecker {
    fn default() -> Self {
        Self::new(AvailabilityConfig::default())
    }
}

impl AvailabilityChecker {
    pub fn new(config: AvailabilityConfig) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                cache: TtlCache::new(config.ttl),
                variants: DashMap::new(),
                updates,
                cancel: BatchCancel::new(),
            }),
        }
    }

    /// Stream of status changes from every check on this checker.
    pub fn subscribe(&self) -> broadcast::Receiver<AvailabilityUpdate> {
        self.inner.updates.subscribe()
    }

    /// Cancels the checks in flight. Probes already sent still land in the
    /// cache, and checks started after the cancel probe as usual.
    pub fn cancel_token(&self) -> CancellationToken {
        self.inner.cancel.token()
    }

    /// Last known status for `server` holding `sha256`.
    pub fn status(&self, server: &ServerEndpoint, sha256: &str) -> AvailabilityStatus {
        self.inner
            .cache
            .get(&cache_key(server, sha256))
            .map(|a| a.status)
            .unwrap_or_default()
    }

    /// Probes every server for `sha256`, reusing fresh answers.
    ///
    /// The map is keyed by normalized server origin. Probe failures become
    /// [`AvailabilityStatus::Error`] entries; nothing here fails as a whole.
    pub async fn check(
        &self,
        servers: &[Arc<dyn BlobServer>],
        sha256: &str,
        ext: Option<&str>,
    ) -> HashMap<String, ServerAvailability> {
        self.check_inner(None, servers, sha256, ext).await
    }

    /// Like [`check`](Self::check), and remembers `servers` as the locations
    /// of the logical asset `variant`.
    pub async fn check_variant(
        &self,
        variant: &str,
        servers: &[Arc<dyn BlobServer>],
        sha256: &str,
        ext: Option<&str>,
    ) -> VariantAvailability {
        self.inner.variants.insert(
            variant.to_string(),
            VariantEntry {
                sha256: sha256.to_ascii_lowercase(),
                ext: ext.map(str::to_string),
                servers: servers.iter().map(|s| s.endpoint().clone()).collect(),
            },
        );
        self.check_inner(Some(variant), servers, sha256, ext).await;
        self.variant_snapshot(variant)
            .unwrap_or_else(|| VariantAvailability {
                variant: variant.to_string(),
                sha256: sha256.to_ascii_lowercase(),
                servers: Vec::new(),
            })
    }

    /// Current cached view of `variant`, without probing.
    pub fn variant_snapshot(&self, variant: &str) -> Option<VariantAvailability> {
        let entry = self.inner.variants.get(variant)?;
        let servers = entry
            .servers
            .iter()
            .map(|server| self.inner.current(server, &entry.sha256, entry.ext.as_deref()))
            .collect();
        Some(VariantAvailability {
            variant: variant.to_string(),
            sha256: entry.sha256.clone(),
            servers,
        })
    }

    /// Forgets `variant` and drops expired cache entries.
    pub fn forget_variant(&self, variant: &str) {
        self.inner.variants.remove(variant);
        self.inner.cache.purge_stale();
    }

    async fn check_inner(
        &self,
        variant: Option<&str>,
        servers: &[Arc<dyn BlobServer>],
        sha256: &str,
        ext: Option<&str>,
    ) -> HashMap<String, ServerAvailability> {
        let sha256 = sha256.to_ascii_lowercase();
        let inner = &self.inner;
        let mut results = HashMap::with_capacity(servers.len());

        let mut seen = HashSet::new();
        let servers: Vec<Arc<dyn BlobServer>> = servers
            .iter()
            .filter(|s| seen.insert(s.endpoint().base_url().to_string()))
            .cloned()
            .collect();

        let cancel = inner.cancel.token();
        let mut to_probe = Vec::new();
        for server in servers {
            let endpoint = server.endpoint();
            let checking = inner
                .current(endpoint, &sha256, ext)
                .with_status(AvailabilityStatus::Checking);
            let kept = inner.cache.replace_unless(
                cache_key(endpoint, &sha256),
                checking.clone(),
                |existing, fresh| {
                    fresh
                        && (existing.status.is_settled()
                            || existing.status == AvailabilityStatus::Checking)
                },
            );
            match kept {
                Some(existing) => {
                    debug!(server = %endpoint, sha256 = %sha256, status = ?existing.status, "availability cached");
                    results.insert(existing.server.clone(), existing);
                }
                None => {
                    inner.publish(variant, &sha256, &checking);
                    to_probe.push(server);
                }
            }
        }

        if to_probe.is_empty() {
            return results;
        }

        let variant_owned = variant.map(str::to_string);
        let ext_owned = ext.map(str::to_string);
        let slots = fan_out(&to_probe, &cancel, |server| {
            let inner = Arc::clone(inner);
            let sha256 = sha256.clone();
            let variant = variant_owned.clone();
            let ext = ext_owned.clone();
            async move {
                let availability = probe(server.as_ref(), &sha256, ext.as_deref()).await;
                inner.store(variant.as_deref(), &sha256, availability.clone());
                availability
            }
        })
        .await;

        for (slot, server) in slots.into_iter().zip(&to_probe) {
            let availability = match slot {
                Slot::Done(availability) => availability,
                Slot::Failed(message) => {
                    let mut failed = inner
                        .current(server.endpoint(), &sha256, ext)
                        .with_status(AvailabilityStatus::Error);
                    failed.last_checked_at = Some(Utc::now());
                    failed.error = Some(message);
                    inner.store(variant, &sha256, failed.clone());
                    failed
                }
                Slot::Detached => inner.current(server.endpoint(), &sha256, ext),
            };
            results.insert(availability.server.clone(), availability);
        }

        info!(
            sha256 = %sha256,
            probed = to_probe.len(),
            available = results
                .values()
                .filter(|a| a.status == AvailabilityStatus::Available)
                .count(),
            "availability check finished"
        );
        results
    }
}

async fn probe(server: &dyn BlobServer, sha256: &str, ext: Option<&str>) -> ServerAvailability {
    let mut availability = ServerAvailability::unknown(server.endpoint(), sha256, ext);
    availability.last_checked_at = Some(Utc::now());

    match server.head_blob(sha256, ext).await {
        Ok(head) => {
            availability.http_status = Some(head.status);
            if head.is_present() {
                availability.status = AvailabilityStatus::Available;
                availability.content_length = head.content_length;
            } else {
                availability.status = AvailabilityStatus::Unavailable;
            }
            debug!(server = %server.endpoint(), sha256, status = head.status, "availability probe");
        }
        Err(e) => {
            warn!(server = %server.endpoint(), sha256, error = %e, "availability probe failed");
            availability.status = AvailabilityStatus::Error;
            availability.http_status = e.status();
            availability.error = Some(e.to_string());
        }
    }
    availability
}
