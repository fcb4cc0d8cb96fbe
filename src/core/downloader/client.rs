use std::path::Path;

use futures_util::StreamExt;
use reqwest::Client;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument};

use crate::core::config::LauncherConfig;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::progress::Reporter;

/// Streaming HTTP-to-disk downloader.
///
/// Bodies are never held in memory: chunks go straight through a fixed-size
/// write buffer, so memory use does not depend on the artifact size.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
    buffer_size: usize,
}

impl Downloader {
    pub fn new(client: Client, buffer_size: usize) -> Self {
        Self {
            client,
            buffer_size: buffer_size.max(4096),
        }
    }

    pub fn from_config(client: Client, config: &LauncherConfig) -> Self {
        Self::new(client, config.download_buffer_size)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    // ── Single file download ────────────────────────────

    /// Stream `url` into `dest`, replacing whatever was there.
    ///
    /// Reports a percentage when the server announces a length, otherwise a
    /// single indeterminate signal. A failure midway leaves the partial file
    /// on disk; callers write to a temporary name and rename on success.
    /// Returns the number of bytes written.
    #[instrument(skip(self, reporter), fields(dest = %dest.display()))]
    pub async fn fetch(&self, url: &str, dest: &Path, reporter: &Reporter) -> LauncherResult<u64> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::FetchFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }

        let total_bytes = response.content_length().filter(|len| *len > 0);
        match total_bytes {
            Some(total) => info!("Downloading {} ({} bytes)", url, total),
            None => {
                info!("Downloading {} (unknown size)", url);
                reporter.indeterminate();
            }
        }

        let file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| LauncherError::Io {
                path: dest.to_path_buf(),
                source: e,
            })?;
        let mut writer = BufWriter::with_capacity(self.buffer_size, file);

        let mut stream = response.bytes_stream();
        let mut downloaded = 0_u64;
        let mut last_permille = 0_u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| LauncherError::Io {
                    path: dest.to_path_buf(),
                    source: e,
                })?;
            downloaded += chunk.len() as u64;

            if let Some(total) = total_bytes {
                let permille = downloaded.saturating_mul(1000) / total;
                if permille != last_permille {
                    last_permille = permille;
                    reporter.percent(downloaded as f64 / total as f64 * 100.0);
                }
            }
        }

        // Flush inside the scope so the handle is closed before anyone
        // renames or opens the file.
        writer.flush().await.map_err(|e| LauncherError::Io {
            path: dest.to_path_buf(),
            source: e,
        })?;
        drop(writer);

        if let Some(total) = total_bytes {
            if downloaded < total {
                return Err(LauncherError::DownloadTruncated {
                    url: url.to_string(),
                    received: downloaded,
                    expected: total,
                });
            }
        }

        debug!("Downloaded: {} -> {:?} ({} bytes)", url, dest, downloaded);
        Ok(downloaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use crate::core::progress::{drain, Progress, ProgressEvent};

    fn downloader() -> Downloader {
        Downloader::new(Client::new(), 64 * 1024)
    }

    #[tokio::test]
    async fn streams_body_with_percentages() {
        let mut server = mockito::Server::new_async().await;
        let body: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();
        let mock = server
            .mock("GET", "/release/1.pwr")
            .with_status(200)
            .with_body(body.clone())
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("cache").join("release_1.pwr");
        let (reporter, mut rx) = Reporter::channel();

        let written = downloader()
            .fetch(&format!("{}/release/1.pwr", server.url()), &dest, &reporter)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(written, body.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), body);

        let events = drain(&mut rx);
        assert!(!events.is_empty());
        assert!(!events.contains(&ProgressEvent::Progress(Progress::Indeterminate)));
        assert_eq!(
            events.last(),
            Some(&ProgressEvent::Progress(Progress::Percent(100.0)))
        );
    }

    #[tokio::test]
    async fn unknown_length_reports_indeterminate() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/chunked")
            .with_status(200)
            .with_chunked_body(|w| w.write_all(b"no length here"))
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("chunked.bin");
        let (reporter, mut rx) = Reporter::channel();

        downloader()
            .fetch(&format!("{}/chunked", server.url()), &dest, &reporter)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"no length here");
        let events = drain(&mut rx);
        assert_eq!(events, vec![ProgressEvent::Progress(Progress::Indeterminate)]);
    }

    #[tokio::test]
    async fn non_success_status_is_fatal() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/missing.pwr")
            .with_status(404)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("missing.pwr");
        let err = downloader()
            .fetch(
                &format!("{}/missing.pwr", server.url()),
                &dest,
                &Reporter::silent(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, LauncherError::FetchFailed { status: 404, .. }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn short_body_is_a_network_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0_u8; 1024];
            let _ = tokio::io::AsyncReadExt::read(&mut socket, &mut request).await;
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nshort")
                .await;
        });

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("jre.zip");
        let err = downloader()
            .fetch(&format!("http://{addr}/jre.zip"), &dest, &Reporter::silent())
            .await
            .unwrap_err();

        assert!(err.is_network(), "{err}");
    }

    #[tokio::test]
    async fn overwrites_existing_file() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/jre.zip")
            .with_status(200)
            .with_body("new")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("jre.zip");
        std::fs::write(&dest, "stale content that is longer").unwrap();

        downloader()
            .fetch(&format!("{}/jre.zip", server.url()), &dest, &Reporter::silent())
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "new");
    }
}
