use anyhow::Context;
use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::{Client, Response};
use std::path::Path;
use tokio::io::AsyncWriteExt;

use crate::tagger::Cover;
use crate::utils::validate_url;
use crate::{MusicDlError, Result};

/// Fetches arbitrary binary content over HTTP(S)
#[derive(Debug, Clone, Default)]
pub struct RemoteFetcher {
    client: Client,
}

impl RemoteFetcher {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// Single GET; any transport error or non-success status is a fetch error
    async fn get(&self, url: &str) -> Result<Response> {
        let parsed = validate_url(url).map_err(|e| MusicDlError::Fetch(e.to_string()))?;

        tracing::debug!("GET {}", parsed);

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| MusicDlError::Fetch(format!("{}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(MusicDlError::Fetch(format!("{}: HTTP {}", url, response.status())).into());
        }

        Ok(response)
    }

    /// Retrieve the whole body into memory
    pub async fn fetch_buffer(&self, url: &str) -> Result<Bytes> {
        let response = self.get(url).await?;

        let body = response
            .bytes()
            .await
            .map_err(|e| MusicDlError::Fetch(format!("{}: {}", url, e)))?;

        tracing::debug!("Fetched {} bytes from {}", body.len(), url);
        Ok(body)
    }

    /// Download an image for embedding as cover art
    pub async fn download_image(&self, url: &str) -> Result<Cover> {
        let response = self.get(url).await?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_string())
            .filter(|ct| ct.starts_with("image/"));

        let data = response
            .bytes()
            .await
            .map_err(|e| MusicDlError::Fetch(format!("{}: {}", url, e)))?;

        let mime_type = content_type.unwrap_or_else(|| guess_image_mime(url).to_string());

        Ok(Cover {
            mime_type,
            data: data.to_vec(),
        })
    }

    /// Stream a URL to disk, returning the number of bytes written.
    ///
    /// The body goes to a temporary file next to `path` that is renamed into place only
    /// once the transfer completes, so a failed download leaves nothing at `path`.
    pub async fn download_to_file(&self, url: &str, path: &Path) -> Result<u64> {
        let response = self.get(url).await?;

        let parent = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let partial = tempfile::Builder::new()
            .prefix(".musicdl-")
            .suffix(".part")
            .tempfile_in(parent)
            .with_context(|| format!("Failed to create temporary file in {}", parent.display()))?;

        let mut file = tokio::fs::File::from_std(partial.as_file().try_clone()?);
        let mut written = 0u64;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| MusicDlError::Fetch(format!("{}: {}", url, e)))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        partial
            .persist(path)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to save {}", path.display()))?;

        tracing::info!("Saved {} bytes from {} to {}", written, url, path.display());
        Ok(written)
    }
}

/// Fetch a URL into memory with a default client
pub async fn get_buffer_from_url(url: &str) -> Result<Bytes> {
    RemoteFetcher::new().fetch_buffer(url).await
}

fn guess_image_mime(url: &str) -> &'static str {
    let path = url::Url::parse(url)
        .map(|parsed| parsed.path().to_lowercase())
        .unwrap_or_default();

    match Path::new(&path).extension().and_then(|ext| ext.to_str()) {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error_kind, ErrorKind};
    use httpmock::prelude::*;
    use httpmock::MockServer;

    #[tokio::test]
    async fn test_fetch_buffer_success() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET).path("/cover.png");
            then.status(200).body(b"\x89PNG data".to_vec());
        });

        let body = RemoteFetcher::new()
            .fetch_buffer(&server.url("/cover.png"))
            .await
            .unwrap();

        mock.assert();
        assert_eq!(&body[..], b"\x89PNG data");
    }

    #[tokio::test]
    async fn test_fetch_buffer_404_is_fetch_error() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET).path("/image.png");
            then.status(404).body("not found");
        });

        let err = get_buffer_from_url(&server.url("/image.png"))
            .await
            .unwrap_err();

        mock.assert();
        assert_eq!(error_kind(&err), Some(ErrorKind::Fetch));
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn test_fetch_buffer_rejects_non_http() {
        let err = get_buffer_from_url("ftp://example.com/image.png")
            .await
            .unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::Fetch));
    }

    #[tokio::test]
    async fn test_download_image_uses_content_type() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/art");
            then.status(200)
                .header("content-type", "image/png; charset=binary")
                .body(vec![1u8, 2, 3]);
        });

        let cover = RemoteFetcher::new()
            .download_image(&server.url("/art"))
            .await
            .unwrap();
        assert_eq!(cover.mime_type, "image/png");
        assert_eq!(cover.data, vec![1u8, 2, 3]);
    }

    #[test]
    fn test_guess_image_mime() {
        assert_eq!(guess_image_mime("https://i.scdn.co/a/B.PNG"), "image/png");
        assert_eq!(guess_image_mime("https://i.scdn.co/a/b.webp?x=1"), "image/webp");
        assert_eq!(guess_image_mime("https://i.scdn.co/image/ab67616d"), "image/jpeg");
    }

    #[tokio::test]
    async fn test_download_to_file_streams_body() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/track.mp3");
            then.status(200).body(vec![7u8; 4096]);
        });

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track.mp3");
        let written = RemoteFetcher::new()
            .download_to_file(&server.url("/track.mp3"), &path)
            .await
            .unwrap();

        assert_eq!(written, 4096);
        assert_eq!(std::fs::read(&path).unwrap().len(), 4096);
    }

    #[tokio::test]
    async fn test_download_to_file_truncated_body_leaves_nothing() {
        use tokio::io::AsyncReadExt;

        // Promise 1000 bytes, send a few, then hang up
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\npartial")
                .await
                .unwrap();
        });

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track.mp3");
        let err = RemoteFetcher::new()
            .download_to_file(&format!("http://{}/track.mp3", addr), &path)
            .await
            .unwrap_err();

        assert_eq!(error_kind(&err), Some(ErrorKind::Fetch));
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
