//! HTTP backend.
//!
//! JSON endpoints for reconciliation and finalization, multipart for chunk
//! bytes. Uses `reqwest` with optional Bearer token authentication.

use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::trace;

use shardlift_protocol::constants::{
    CANCEL_PATH, CHECK_PATH, CHUNK_PATH, COMPLETE_PATH, INIT_PATH, fields,
};
use shardlift_protocol::{
    CancelRequest, CheckRequest, CheckResponse, ChunkFields, ChunkResponse, CompleteRequest,
    CompleteResponse, InitRequest, InitResponse,
};

use crate::backend::{BackendFuture, ProgressFn, UploadBackend};
use crate::error::BackendError;

/// Slice size used when streaming a chunk body.
const STREAM_SLICE: usize = 64 * 1024;

/// Timeout for JSON calls when none is configured.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Backend reached over HTTP.
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpBackend {
    /// Creates a backend rooted at `base_url`.
    pub fn new(base_url: &str, token: Option<&str>) -> Result<Self, BackendError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|_| BackendError::Config("invalid token".into()))?,
            );
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Overrides the timeout of JSON calls. Chunk uploads are bounded by
    /// the engine's own per-chunk timeout instead.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Performs a JSON POST and decodes the JSON answer.
    async fn post_json<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, BackendError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let resp = self
            .http
            .post(self.url(path))
            .timeout(self.request_timeout)
            .json(body)
            .send()
            .await?;
        let body = read_success(resp).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Returns the body of a 2xx response, or an API error.
async fn read_success(resp: reqwest::Response) -> Result<Vec<u8>, BackendError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(BackendError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(resp.bytes().await?.to_vec())
}

/// Wraps chunk bytes in a body that reports progress as it is consumed.
fn progress_body(data: Vec<u8>, progress: ProgressFn) -> reqwest::Body {
    let slices: Vec<Vec<u8>> = data.chunks(STREAM_SLICE).map(<[u8]>::to_vec).collect();
    let mut sent = 0u64;
    let stream = futures_util::stream::iter(slices).map(move |slice| {
        sent += slice.len() as u64;
        progress(sent);
        Ok::<_, std::io::Error>(slice)
    });
    reqwest::Body::wrap_stream(stream)
}

impl UploadBackend for HttpBackend {
    fn check(&self, req: &CheckRequest) -> BackendFuture<'_, CheckResponse> {
        let req = req.clone();
        Box::pin(async move { self.post_json(CHECK_PATH, &req).await })
    }

    fn initialize(&self, req: &InitRequest) -> BackendFuture<'_, InitResponse> {
        let req = req.clone();
        Box::pin(async move { self.post_json(INIT_PATH, &req).await })
    }

    fn upload_chunk(
        &self,
        chunk: &ChunkFields,
        data: Vec<u8>,
        progress: ProgressFn,
    ) -> BackendFuture<'_, ChunkResponse> {
        let chunk = chunk.clone();
        Box::pin(async move {
            let len = data.len() as u64;
            let part = Part::stream_with_length(progress_body(data, progress), len)
                .file_name(format!("{}.part{}", chunk.file_name, chunk.chunk_index))
                .mime_str("application/octet-stream")?;

            let mut form = Form::new()
                .part(fields::CHUNK, part)
                .text(fields::FILE_NAME, chunk.file_name.clone())
                .text(fields::FINGERPRINT, chunk.fingerprint.clone())
                .text(fields::CHUNK_INDEX, chunk.chunk_index.to_string());
            if !chunk.chunk_fingerprint.is_empty() {
                form = form.text(fields::CHUNK_FINGERPRINT, chunk.chunk_fingerprint.clone());
            }

            trace!(chunk = chunk.chunk_index, bytes = len, "posting chunk");
            let resp = self
                .http
                .post(self.url(CHUNK_PATH))
                .multipart(form)
                .send()
                .await?;
            let body = read_success(resp).await?;
            Ok(serde_json::from_slice(&body)?)
        })
    }

    fn complete(&self, req: &CompleteRequest) -> BackendFuture<'_, CompleteResponse> {
        let req = req.clone();
        Box::pin(async move { self.post_json(COMPLETE_PATH, &req).await })
    }

    fn cancel(&self, req: &CancelRequest) -> BackendFuture<'_, ()> {
        let req = req.clone();
        Box::pin(async move {
            let resp = self
                .http
                .post(self.url(CANCEL_PATH))
                .timeout(self.request_timeout)
                .json(&req)
                .send()
                .await?;
            read_success(resp).await.map(|_| ())
        })
    }
}
