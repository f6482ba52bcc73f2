//! Mirror health probing and the cached fastest-mirror choice.

use futures_util::future::join_all;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::DownloadConfig;
use crate::utils::{HttpClient, BROWSER_USER_AGENT};

/// Latency measured for one mirror; `None` when the probe failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorProbe {
    pub mirror: String,
    pub latency: Option<Duration>,
}

/// Picks the lowest-latency mirror and remembers it for a while
///
/// The cache has its own lock. Concurrent callers that find it stale wait for
/// one probe instead of probing in parallel.
#[derive(Debug)]
pub struct MirrorSelector {
    client: HttpClient,
    mirrors: Vec<String>,
    probe_id: String,
    probe_timeout: Duration,
    cache_ttl: Duration,
    best: Mutex<Option<(String, Instant)>>,
}

impl MirrorSelector {
    pub fn new(client: HttpClient, config: &DownloadConfig) -> Self {
        Self {
            client,
            mirrors: config.mirrors.clone(),
            probe_id: config.probe_id.clone(),
            probe_timeout: Duration::from_secs(config.probe_timeout_seconds),
            cache_ttl: Duration::from_secs(config.mirror_cache_seconds),
            best: Mutex::new(None),
        }
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn mirrors(&self) -> &[String] {
        &self.mirrors
    }

    /// Artifact URL on a given mirror
    pub fn artifact_url(mirror: &str, artifact_id: &str) -> String {
        format!("{}{}.pdf", mirror, artifact_id)
    }

    /// Current best mirror, probing when the cached choice is missing or stale
    pub async fn best(&self) -> Option<String> {
        let first = self.mirrors.first()?;

        let mut cached = self.best.lock().await;
        if let Some((mirror, chosen_at)) = cached.as_ref() {
            if chosen_at.elapsed() < self.cache_ttl {
                return Some(mirror.clone());
            }
        }

        let probes = self.probe().await;
        let fastest = probes
            .iter()
            .filter_map(|p| p.latency.map(|latency| (latency, &p.mirror)))
            .min_by_key(|(latency, _)| *latency)
            .map(|(_, mirror)| mirror.clone());

        let chosen = match fastest {
            Some(mirror) => {
                tracing::info!("Selected mirror {}", mirror);
                mirror
            }
            None => {
                tracing::warn!("All mirror probes failed, falling back to {}", first);
                first.clone()
            }
        };
        *cached = Some((chosen.clone(), Instant::now()));
        Some(chosen)
    }

    /// Mirrors in attempt order: the best one first, then the rest as configured
    pub async fn ordered(&self) -> Vec<String> {
        let Some(best) = self.best().await else {
            return Vec::new();
        };
        let mut ordered = Vec::with_capacity(self.mirrors.len());
        ordered.push(best.clone());
        ordered.extend(self.mirrors.iter().filter(|m| **m != best).cloned());
        ordered
    }

    /// Forget the cached choice so the next download probes again
    pub async fn invalidate(&self) {
        *self.best.lock().await = None;
        tracing::info!("Mirror cache cleared");
    }

    /// Probe every mirror in parallel with a cheap HEAD request
    pub async fn probe(&self) -> Vec<MirrorProbe> {
        let checks = self.mirrors.iter().map(|mirror| async move {
            let url = Self::artifact_url(mirror, &self.probe_id);
            let started = Instant::now();
            let request = self
                .client
                .head(&url)
                .header("User-Agent", BROWSER_USER_AGENT)
                .send();

            let latency = match tokio::time::timeout(self.probe_timeout, request).await {
                Ok(Ok(response)) if response.status().is_success() => Some(started.elapsed()),
                Ok(Ok(response)) => {
                    tracing::debug!("Mirror {} answered {}", mirror, response.status());
                    None
                }
                Ok(Err(e)) => {
                    tracing::debug!("Mirror {} unreachable: {}", mirror, e);
                    None
                }
                Err(_) => {
                    tracing::debug!("Mirror {} timed out", mirror);
                    None
                }
            };
            MirrorProbe {
                mirror: mirror.clone(),
                latency,
            }
        });
        join_all(checks).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector(mirrors: Vec<String>) -> MirrorSelector {
        let config = DownloadConfig {
            mirrors,
            probe_id: "2301.00001".to_string(),
            ..DownloadConfig::default()
        };
        MirrorSelector::new(HttpClient::new().unwrap(), &config)
            .with_probe_timeout(Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_fastest_healthy_mirror_wins() {
        let mut server = mockito::Server::new_async().await;
        let healthy = server
            .mock("HEAD", "/b/2301.00001.pdf")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let a = format!("{}/a/", server.url());
        let b = format!("{}/b/", server.url());
        let selector = selector(vec![a.clone(), b.clone()]);

        assert_eq!(selector.best().await, Some(b.clone()));
        assert_eq!(selector.ordered().await, vec![b, a]);

        // Second lookup is served from the cache
        healthy.assert_async().await;
    }

    #[tokio::test]
    async fn test_all_failed_falls_back_to_first() {
        let server = mockito::Server::new_async().await;
        let a = format!("{}/a/", server.url());
        let b = format!("{}/b/", server.url());
        let selector = selector(vec![a.clone(), b.clone()]);

        let probes = selector.probe().await;
        assert!(probes.iter().all(|p| p.latency.is_none()));
        assert_eq!(selector.best().await, Some(a));
    }

    #[tokio::test]
    async fn test_invalidate_forces_new_probe() {
        let mut server = mockito::Server::new_async().await;
        let probe = server
            .mock("HEAD", "/a/2301.00001.pdf")
            .with_status(200)
            .expect(2)
            .create_async()
            .await;

        let selector = selector(vec![format!("{}/a/", server.url())]);
        selector.best().await;
        selector.best().await;
        selector.invalidate().await;
        selector.best().await;

        probe.assert_async().await;
    }

    #[tokio::test]
    async fn test_no_mirrors() {
        let selector = selector(vec![]);
        assert_eq!(selector.best().await, None);
        assert!(selector.ordered().await.is_empty());
    }

    #[test]
    fn test_artifact_url() {
        assert_eq!(
            MirrorSelector::artifact_url("https://arxiv.org/pdf/", "2301.00001"),
            "https://arxiv.org/pdf/2301.00001.pdf"
        );
    }
}
