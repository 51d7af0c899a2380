//! Streamed binary download

use super::ProgressTracker;
use crate::error::{DownloadError, Error, Result};
use crate::retry::{RetryPolicy, with_retry};
use futures::StreamExt;
use std::path::Path;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

/// Stream `url` into a freshly truncated file at `path`
///
/// Only the request itself (up to a success status) goes through `retry`; a
/// stream that breaks midway is terminal. The file is flushed, synced and
/// closed before this returns, and a partial file is left in place on error.
pub async fn download_to_file(
    client: &reqwest::Client,
    retry: &dyn RetryPolicy,
    url: &url::Url,
    path: &Path,
    tracker: &mut ProgressTracker,
) -> Result<u64> {
    tracing::info!(url = %url, path = ?path, "starting download");

    let response = with_retry(retry, "download_request", || async move {
        let response = client
            .get(url.clone())
            .send()
            .await
            .map_err(|source| DownloadError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok::<_, DownloadError>(response)
    })
    .await?;

    tracker.set_total(response.content_length());

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .await
        .map_err(|e| Error::file_io(path, e))?;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|source| {
            tracing::warn!(
                url = %url,
                path = ?path,
                bytes = tracker.bytes(),
                error = %source,
                "download stream failed, partial artifact left on disk"
            );
            DownloadError::Transport {
                url: url.to_string(),
                source,
            }
        })?;

        file.write_all(&chunk)
            .await
            .map_err(|e| Error::file_io(path, e))?;
        tracker.advance(chunk.len());
    }

    file.flush().await.map_err(|e| Error::file_io(path, e))?;
    file.sync_all().await.map_err(|e| Error::file_io(path, e))?;
    drop(file);

    Ok(tracker.bytes())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::TransferObserver;
    use crate::retry::{ExponentialBackoff, NoRetry};
    use crate::config::RetryConfig;
    use crate::types::{Progress, SessionId, SessionOutcome, TransferStage};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use wiremock::matchers::{method, path as url_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Progress>>);

    impl TransferObserver for Recorder {
        fn on_progress(&self, progress: &Progress) {
            self.0.lock().unwrap().push(progress.clone());
        }

        fn on_outcome(&self, _session_id: SessionId, _outcome: &SessionOutcome) {}
    }

    fn tracker(recorder: &Arc<Recorder>) -> ProgressTracker {
        ProgressTracker::new(
            SessionId::new(),
            TransferStage::Downloading,
            None,
            recorder.clone(),
        )
    }

    /// Single-connection HTTP server that answers with `response` verbatim
    /// and then closes the socket
    async fn raw_server(response: &'static [u8]) -> url::Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket.write_all(response).await.unwrap();
            socket.flush().await.unwrap();
            socket.shutdown().await.ok();
        });

        url::Url::parse(&format!("http://{}/app.ipa", addr)).unwrap()
    }

    #[tokio::test]
    async fn writes_body_and_reports_monotonic_progress() {
        let server = MockServer::start().await;
        let body = vec![7u8; 256 * 1024];
        Mock::given(method("GET"))
            .and(url_path("/builds/42/App-Release.ipa"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let temp = tempfile::tempdir().unwrap();
        let target = temp.path().join("App-Release.ipa");
        let url = url::Url::parse(&format!("{}/builds/42/App-Release.ipa", server.uri())).unwrap();
        let recorder = Arc::new(Recorder::default());
        let mut tracker = tracker(&recorder);

        let bytes = download_to_file(&reqwest::Client::new(), &NoRetry, &url, &target, &mut tracker)
            .await
            .unwrap();

        assert_eq!(bytes, body.len() as u64);
        assert_eq!(std::fs::read(&target).unwrap(), body);

        let events = recorder.0.lock().unwrap();
        assert!(!events.is_empty());
        assert!(events.windows(2).all(|w| w[0].bytes <= w[1].bytes));
        assert_eq!(events.last().unwrap().bytes, body.len() as u64);
        assert_eq!(events.last().unwrap().total, Some(body.len() as u64));
    }

    #[tokio::test]
    async fn existing_file_is_truncated_not_appended() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fresh".to_vec()))
            .mount(&server)
            .await;

        let temp = tempfile::tempdir().unwrap();
        let target = temp.path().join("app.apk");
        std::fs::write(&target, b"stale contents that are longer").unwrap();

        let url = url::Url::parse(&format!("{}/app.apk", server.uri())).unwrap();
        let recorder = Arc::new(Recorder::default());
        download_to_file(
            &reqwest::Client::new(),
            &NoRetry,
            &url,
            &target,
            &mut tracker(&recorder),
        )
        .await
        .unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"fresh");
    }

    #[tokio::test]
    async fn error_status_creates_no_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let temp = tempfile::tempdir().unwrap();
        let target = temp.path().join("app.ipa");
        let url = url::Url::parse(&format!("{}/app.ipa", server.uri())).unwrap();
        let recorder = Arc::new(Recorder::default());

        let err = download_to_file(
            &reqwest::Client::new(),
            &NoRetry,
            &url,
            &target,
            &mut tracker(&recorder),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            Error::Download(DownloadError::HttpStatus { status: 404, .. })
        ));
        assert!(!target.exists());
        assert!(recorder.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn server_errors_are_retried_under_backoff_policy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
            .mount(&server)
            .await;

        let policy = ExponentialBackoff::new(RetryConfig {
            max_attempts: 2,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(10),
            backoff_multiplier: 2.0,
            jitter: false,
        });

        let temp = tempfile::tempdir().unwrap();
        let target = temp.path().join("app.ipa");
        let url = url::Url::parse(&format!("{}/app.ipa", server.uri())).unwrap();
        let recorder = Arc::new(Recorder::default());

        let bytes = download_to_file(
            &reqwest::Client::new(),
            &policy,
            &url,
            &target,
            &mut tracker(&recorder),
        )
        .await
        .unwrap();

        assert_eq!(bytes, 2);
    }

    #[tokio::test]
    async fn chunked_body_counts_bytes_without_percent() {
        let url = raw_server(
            b"HTTP/1.1 200 OK\r\n\
              Transfer-Encoding: chunked\r\n\
              Connection: close\r\n\r\n\
              5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n",
        )
        .await;

        let temp = tempfile::tempdir().unwrap();
        let target = temp.path().join("app.ipa");
        let recorder = Arc::new(Recorder::default());
        let mut tracker = tracker(&recorder);

        let bytes = download_to_file(&reqwest::Client::new(), &NoRetry, &url, &target, &mut tracker)
            .await
            .unwrap();

        assert_eq!(bytes, 11);
        assert_eq!(tracker.total(), None);
        assert_eq!(std::fs::read(&target).unwrap(), b"hello world");

        let events = recorder.0.lock().unwrap();
        assert!(!events.is_empty());
        assert!(events.iter().all(|p| p.total.is_none() && p.percent().is_none()));
        assert!(events.windows(2).all(|w| w[0].bytes <= w[1].bytes));
        assert_eq!(events.last().unwrap().bytes, 11);
    }

    #[tokio::test]
    async fn broken_stream_leaves_partial_artifact() {
        let url = raw_server(
            b"HTTP/1.1 200 OK\r\n\
              Content-Length: 1000\r\n\
              Connection: close\r\n\r\n\
              IPA-CONTENT-1",
        )
        .await;

        let temp = tempfile::tempdir().unwrap();
        let target = temp.path().join("app.ipa");
        let recorder = Arc::new(Recorder::default());

        let err = download_to_file(
            &reqwest::Client::new(),
            &NoRetry,
            &url,
            &target,
            &mut tracker(&recorder),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            Error::Download(DownloadError::Transport { .. })
        ));
        assert_eq!(std::fs::read(&target).unwrap(), b"IPA-CONTENT-1");
    }
}
