// ─── Progress Reporting ───
// Every pipeline call takes a `Reporter`; the caller owns the receiving end
// and marshals events onto its own presentation context.

use serde::Serialize;
use tokio::sync::mpsc;

/// Pipeline phase, rendered and localized by the front-end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Status {
    CheckingVersions { branch: String },
    VersionsFound { count: usize },
    CheckingRuntime,
    DownloadingRuntime,
    ExtractingRuntime,
    SystemRuntimeFallback,
    CheckingGame,
    GameInstalled,
    Downloading { version: String },
    PatchCached,
    Installing,
    DownloadingPatcher,
    ExtractingPatcher,
    ApplyingPatch,
    InstallComplete,
    Launching,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Progress {
    /// 0.0 ..= 100.0
    Percent(f64),
    /// Work is happening but its size is unknown.
    Indeterminate,
}

impl Progress {
    /// Flat representation used by progress bars: a percentage, or `-1.0`
    /// for indeterminate work.
    pub fn as_value(&self) -> f64 {
        match self {
            Progress::Percent(value) => *value,
            Progress::Indeterminate => -1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ProgressEvent {
    Status(Status),
    Progress(Progress),
}

/// Sending half of a progress channel. Cloning shares the channel, so
/// events from one run stay ordered.
#[derive(Debug, Clone, Default)]
pub struct Reporter {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl Reporter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Reporter that drops every event.
    pub fn silent() -> Self {
        Self { tx: None }
    }

    pub fn status(&self, status: Status) {
        self.send(ProgressEvent::Status(status));
    }

    pub fn percent(&self, value: f64) {
        self.send(ProgressEvent::Progress(Progress::Percent(
            value.clamp(0.0, 100.0),
        )));
    }

    pub fn indeterminate(&self) {
        self.send(ProgressEvent::Progress(Progress::Indeterminate));
    }

    pub fn done(&self) {
        self.percent(100.0);
    }

    fn send(&self, event: ProgressEvent) {
        // A closed receiver only means nobody is watching anymore.
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
pub(crate) fn drain(rx: &mut mpsc::UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
