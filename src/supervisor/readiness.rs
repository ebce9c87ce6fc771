//! Readiness detection for a freshly spawned agent

use std::time::Duration;

use regex::Regex;
use tokio::sync::{mpsc, oneshot};

use super::process::Internal;
use crate::config::ReadinessProbe;
use crate::error::SupervisorError;

/// Compiled form of a [`ReadinessProbe`]
#[derive(Debug, Clone)]
pub enum Readiness {
    Immediate,
    Stdout(Regex),
    Http { url: String, interval: Duration },
}

impl Readiness {
    pub fn compile(probe: &ReadinessProbe) -> Result<Self, SupervisorError> {
        Ok(match probe {
            ReadinessProbe::None => Readiness::Immediate,
            ReadinessProbe::Stdout { pattern } => Readiness::Stdout(Regex::new(pattern)?),
            ReadinessProbe::Http { url, interval_ms } => Readiness::Http {
                url: url.clone(),
                interval: Duration::from_millis((*interval_ms).max(10)),
            },
        })
    }

    pub fn stdout_pattern(&self) -> Option<&Regex> {
        match self {
            Readiness::Stdout(re) => Some(re),
            _ => None,
        }
    }
}

/// Match a stdout line against the readiness pattern.
/// Returns `Some(endpoint)` on a match; the endpoint is capture group 1.
pub fn match_line(pattern: &Regex, line: &str) -> Option<Option<String>> {
    let caps = pattern.captures(line)?;
    Some(caps.get(1).map(|m| m.as_str().to_string()))
}

/// Poll `url` until it answers 2xx, then report the generation as ready.
/// Stops early when `cancel` fires or is dropped.
pub(super) fn spawn_http_probe(
    url: String,
    interval: Duration,
    generation: u64,
    internal: mpsc::UnboundedSender<Internal>,
    mut cancel: oneshot::Receiver<()>,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = &mut cancel => return,
                _ = tokio::time::sleep(interval) => {}
            }

            let probe_url = url.clone();
            let healthy = tokio::task::spawn_blocking(move || {
                ureq::get(&probe_url)
                    .timeout(Duration::from_secs(2))
                    .call()
                    .is_ok()
            })
            .await
            .unwrap_or(false);

            if healthy {
                tracing::debug!(url = %url, generation, "readiness probe succeeded");
                let _ = internal.send(Internal::Ready {
                    generation,
                    endpoint: None,
                });
                return;
            }
        }
    });
}
