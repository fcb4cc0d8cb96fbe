// ─── Version Resolver ───
// Discovers the patch containers of a branch by probing `1.pwr`, `2.pwr`, ...
// with HEAD requests until the first one that is missing.

use std::sync::Arc;

use reqwest::Client;
use tracing::{debug, info, instrument, warn};

use crate::core::config::LauncherConfig;
use crate::core::error::LauncherResult;
use crate::core::progress::{Reporter, Status};

use super::model::{validate_branch, GameVersion};

#[derive(Debug)]
enum ProbeOutcome {
    Exists,
    Missing(u16),
    /// The short probe timeout fired.
    TimedOut,
    /// The request could not be sent at all. Not proof of absence.
    Unreachable(reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct VersionResolver {
    client: Client,
    config: Arc<LauncherConfig>,
}

impl VersionResolver {
    pub fn new(client: Client, config: Arc<LauncherConfig>) -> Self {
        Self { client, config }
    }

    /// Versions of `branch`, the synthetic latest entry first and the
    /// numbered ones ascending after it. Never empty.
    ///
    /// Artifacts are assumed contiguous from `1`: probing stops at the first
    /// missing id. A probe that could not even be sent skips to the next id
    /// without retrying.
    #[instrument(skip(self, reporter))]
    pub async fn discover(
        &self,
        branch: &str,
        reporter: &Reporter,
    ) -> LauncherResult<Vec<GameVersion>> {
        validate_branch(branch)?;
        reporter.status(Status::CheckingVersions {
            branch: branch.to_string(),
        });

        let max_probe = self.config.max_probe.max(1);
        let mut found = Vec::new();

        for id in 1..=max_probe {
            let url = self.config.patch_url(branch, id);
            match self.probe(&url).await {
                ProbeOutcome::Exists => {
                    debug!("Found artifact {}", url);
                    found.push(GameVersion::numbered(branch, id));
                    reporter.percent(id as f64 * 100.0 / max_probe as f64);
                }
                ProbeOutcome::Missing(status) => {
                    debug!("Artifact {} missing (HTTP {}), stopping", url, status);
                    break;
                }
                ProbeOutcome::TimedOut => {
                    warn!("Probe for {} timed out, stopping", url);
                    break;
                }
                ProbeOutcome::Unreachable(err) => {
                    warn!("Probe for {} could not be sent: {}", url, err);
                    continue;
                }
            }
        }

        reporter.done();
        let versions = with_latest(branch, found);
        info!("Found {} versions for branch {}", versions.len(), branch);
        reporter.status(Status::VersionsFound {
            count: versions.len(),
        });
        Ok(versions)
    }

    async fn probe(&self, url: &str) -> ProbeOutcome {
        let result = self
            .client
            .head(url)
            .timeout(self.config.probe_timeout)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => ProbeOutcome::Exists,
            Ok(response) => ProbeOutcome::Missing(response.status().as_u16()),
            Err(err) if err.is_timeout() => ProbeOutcome::TimedOut,
            Err(err) => ProbeOutcome::Unreachable(err),
        }
    }
}

/// Prepend the synthetic latest entry. With nothing discovered it points at
/// artifact `1` as a best-effort placeholder.
fn with_latest(branch: &str, mut found: Vec<GameVersion>) -> Vec<GameVersion> {
    found.sort_by_key(|v| v.artifact_id);
    found.dedup_by_key(|v| v.artifact_id);

    let latest_id = found.last().map_or(1, |v| v.artifact_id);
    let mut versions = Vec::with_capacity(found.len() + 1);
    versions.push(GameVersion::latest(branch, latest_id));
    versions.extend(found);
    versions
}
