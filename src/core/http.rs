use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING};
use reqwest::Client;

use crate::core::config::LauncherConfig;

const APP_USER_AGENT: &str = concat!("HyTaLauncher/", env!("CARGO_PKG_VERSION"));

/// Shared client for probes, metadata and artifact downloads.
///
/// Only the connection phase is bounded here: artifact bodies can take
/// minutes, so short per-request timeouts are applied by the callers that
/// need them (probes, descriptors).
pub fn build_http_client(config: &LauncherConfig) -> Result<Client, reqwest::Error> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

    Client::builder()
        .user_agent(APP_USER_AGENT)
        .default_headers(default_headers)
        .connect_timeout(config.probe_timeout.max(Duration::from_secs(1)))
        .build()
}
