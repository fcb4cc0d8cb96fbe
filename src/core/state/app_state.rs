use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::core::config::LauncherConfig;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::pipeline::Pipeline;
use crate::core::version::GameVersion;

/// State shared by every front-end command.
pub type SharedState = Arc<Mutex<AppState>>;

/// Caller-side state: the pipeline plus the last discovery result per
/// branch. Only the version cache outlives a single pipeline call.
#[derive(Debug)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
    versions: HashMap<String, Vec<GameVersion>>,
}

impl AppState {
    pub fn new(config: LauncherConfig) -> LauncherResult<Self> {
        Ok(Self::with_pipeline(Pipeline::new(config)?))
    }

    pub fn with_pipeline(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            versions: HashMap::new(),
        }
    }

    pub fn shared(self) -> SharedState {
        Arc::new(Mutex::new(self))
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub fn cached_versions(&self, branch: &str) -> Option<&[GameVersion]> {
        self.versions.get(branch).map(Vec::as_slice)
    }

    pub fn remember_versions(&mut self, branch: &str, versions: Vec<GameVersion>) {
        self.versions.insert(branch.to_string(), versions);
    }

    /// Look a version up by `"latest"` or its artifact id in the cached list
    /// of `branch`.
    pub fn find_version(&self, branch: &str, selector: &str) -> LauncherResult<GameVersion> {
        self.versions
            .get(branch)
            .and_then(|versions| versions.iter().find(|v| v.matches_selector(selector)))
            .cloned()
            .ok_or_else(|| LauncherError::UnknownVersion {
                branch: branch.to_string(),
                version: selector.to_string(),
            })
    }
}
