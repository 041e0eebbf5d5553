//! HTTP transfer against the device: connectivity preflight, single-shot
//! multipart upload, sequential strip upload, and image dismiss.
//!
//! Every attempt runs `preflight -> upload -> done`; there is no automatic
//! retry at any level, the caller owns that policy. Strip uploads are
//! strictly serialized in index order because the device assembles fragments
//! one at a time in bounded memory.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;

use crate::error::{Error, Result};
use crate::sjpg::SjpgContainer;

/// The device replies with hand-rolled JSON; matching the raw marker avoids
/// depending on its exact shape.
const SUCCESS_MARKER: &str = "\"success\":true";

pub struct TransferClient {
    http: reqwest::Client,
    base_url: String,
    /// Client-side deadline per request. Unrelated to the display timeout
    /// passed through to the device.
    request_timeout: Duration,
}

impl TransferClient {
    /// `host` is an IP/hostname (optionally with port), or a full
    /// `http(s)://` URL.
    pub fn new(host: &str, request_timeout: Duration) -> Self {
        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", host.trim_end_matches('/'))
        };
        Self {
            http: reqwest::Client::new(),
            base_url,
            request_timeout,
        }
    }

    /// Cheap reachability probe, run before any upload bytes are sent. Any
    /// evaluated HTTP response counts as reachable; only network-level
    /// failures abort.
    pub async fn preflight(&self) -> Result<()> {
        let url = format!("{}/", self.base_url);
        match self
            .http
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await
        {
            Ok(resp) => {
                tracing::debug!(status = %resp.status(), "device reachable");
                Ok(())
            }
            Err(e) => Err(Error::DeviceUnreachable(e.to_string())),
        }
    }

    /// Preflight, then upload the whole payload in one multipart POST.
    pub async fn send_single(
        &self,
        payload: Vec<u8>,
        filename: &str,
        content_type: &str,
        display_timeout: u64,
    ) -> Result<()> {
        self.preflight().await?;
        self.upload_single(payload, filename, content_type, display_timeout)
            .await
    }

    /// Preflight, then upload strips sequentially. `range` optionally limits
    /// the attempt to an inclusive `[start, end]` index window (debugging
    /// aid); `total` and geometry always describe the whole container.
    pub async fn send_strips(
        &self,
        image: &SjpgContainer,
        display_timeout: u64,
        range: Option<(usize, usize)>,
    ) -> Result<()> {
        self.preflight().await?;
        self.upload_strips(image, display_timeout, range).await
    }

    async fn upload_single(
        &self,
        payload: Vec<u8>,
        filename: &str,
        content_type: &str,
        display_timeout: u64,
    ) -> Result<()> {
        let size = payload.len();
        let part = reqwest::multipart::Part::bytes(payload)
            .file_name(filename.to_string())
            .mime_str(content_type)
            .map_err(|e| Error::InvalidParameter(format!("invalid mime '{content_type}': {e}")))?;
        let form = reqwest::multipart::Form::new().part("image", part);
        tracing::info!(bytes = size, timeout = display_timeout, "uploading single payload");
        let resp = self
            .http
            .post(format!("{}/api/display/image", self.base_url))
            .query(&[("timeout", display_timeout)])
            .multipart(form)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| Error::UploadRejected {
                strip: None,
                reason: e.to_string(),
            })?;
        check_reply(resp, None).await
    }

    async fn upload_strips(
        &self,
        image: &SjpgContainer,
        display_timeout: u64,
        range: Option<(usize, usize)>,
    ) -> Result<()> {
        let total = image.strip_count();
        if total == 0 {
            return Err(Error::InvalidParameter("container holds no strips".into()));
        }
        let (first, last) = range.unwrap_or((0, total - 1));
        if first > last || last >= total {
            return Err(Error::InvalidParameter(format!(
                "strip range {first}..={last} outside 0..{total}"
            )));
        }

        let url = format!("{}/api/display/strip", self.base_url);
        for (i, strip) in image.strips.iter().enumerate().take(last + 1).skip(first) {
            let resp = self
                .http
                .post(&url)
                .query(&[
                    ("index", i as u64),
                    ("total", total as u64),
                    ("width", image.width as u64),
                    ("height", image.height as u64),
                    ("timeout", display_timeout),
                ])
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(strip.clone())
                .timeout(self.request_timeout)
                .send()
                .await
                .map_err(|e| Error::UploadRejected {
                    strip: Some(i),
                    reason: e.to_string(),
                })?;
            check_reply(resp, Some(i)).await?;
            tracing::info!(strip = i, total, bytes = strip.len(), "strip uploaded");
        }
        Ok(())
    }

    /// Tell the device to drop the currently displayed image.
    pub async fn dismiss(&self) -> Result<()> {
        let resp = self
            .http
            .delete(format!("{}/api/display/image", self.base_url))
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| Error::UploadRejected {
                strip: None,
                reason: e.to_string(),
            })?;
        check_reply(resp, None).await
    }
}

async fn check_reply(resp: reqwest::Response, strip: Option<usize>) -> Result<()> {
    let status = resp.status();
    let body = resp.text().await.map_err(|e| Error::UploadRejected {
        strip,
        reason: format!("failed reading response body: {e}"),
    })?;
    if status == StatusCode::OK && body.contains(SUCCESS_MARKER) {
        Ok(())
    } else {
        Err(Error::UploadRejected {
            strip,
            reason: format!("HTTP {status}: {body}"),
        })
    }
}
