//! HTTP gateway implementation.
//!
//! This module speaks the bucket endpoint's JSON protocol. The actual HTTP
//! client is abstracted via a trait so hosts can plug in whichever library
//! they already ship (ureq, reqwest, a platform bridge, ...).

use crate::config::SyncConfig;
use crate::credentials::CredentialProvider;
use crate::error::{SyncError, SyncResult};
use crate::gateway::{MemoryRemote, RemoteGateway};
use kvsync_protocol::{
    decode_pull_body, encode_pull_body, parse_pull_url, pull_url, Bucket, BucketSnapshot,
    PushBody,
};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

/// HTTP method used by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// Fetch a bucket.
    Get,
    /// Replace a bucket.
    Put,
}

/// A request handed to an [`HttpClient`].
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Request method.
    pub method: HttpMethod,
    /// Absolute URL including any query string.
    pub url: String,
    /// Header name/value pairs.
    pub headers: Vec<(String, String)>,
    /// JSON body, if any.
    pub body: Option<Vec<u8>>,
    /// Time allowed for the whole exchange.
    pub timeout: Duration,
}

impl HttpRequest {
    /// Returns the first header named `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A response returned by an [`HttpClient`].
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Raw body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// `send` returns `Err` only when no HTTP response was obtained (DNS,
/// connect, TLS, timeout). Any status code, including errors, is `Ok`.
pub trait HttpClient: Send + Sync {
    /// Performs a blocking HTTP exchange.
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, String>;
}

/// Remote gateway speaking to the bucket endpoint over HTTP.
///
/// - pull: `GET {sync_url}?field=<bucket>` returning the bucket object
/// - push: `PUT {sync_url}` with `{"userData": <snapshot>, "field": <bucket>}`
///
/// The credential travels in a configurable header. Without a credential
/// no request is made.
pub struct HttpGateway<C: HttpClient, P: CredentialProvider> {
    sync_url: String,
    credential_header: String,
    timeout: Duration,
    client: C,
    credentials: P,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient, P: CredentialProvider> HttpGateway<C, P> {
    /// Creates a new HTTP gateway.
    pub fn new(config: &SyncConfig, client: C, credentials: P) -> Self {
        Self {
            sync_url: config.sync_url(),
            credential_header: config.credential_header.clone(),
            timeout: config.request_timeout,
            client,
            credentials,
            last_error: RwLock::new(None),
        }
    }

    /// Returns the bucket endpoint URL.
    pub fn sync_url(&self) -> &str {
        &self.sync_url
    }

    /// Returns the last transport error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn execute(&self, method: HttpMethod, url: String, body: Option<Vec<u8>>) -> SyncResult<Vec<u8>> {
        let token = self
            .credentials
            .credential()
            .ok_or(SyncError::Unauthenticated)?;

        let request = HttpRequest {
            method,
            url,
            headers: vec![
                (self.credential_header.clone(), token),
                ("content-type".into(), "application/json".into()),
            ],
            body,
            timeout: self.timeout,
        };

        let response = self.client.send(request).map_err(|e| {
            *self.last_error.write() = Some(e.clone());
            SyncError::Unreachable(e)
        })?;
        *self.last_error.write() = None;

        match response.status {
            200..=299 => Ok(response.body),
            401 | 403 => Err(SyncError::Unauthenticated),
            status => Err(SyncError::server(
                status,
                String::from_utf8_lossy(&response.body).into_owned(),
            )),
        }
    }
}

impl<C: HttpClient, P: CredentialProvider> RemoteGateway for HttpGateway<C, P> {
    fn pull(&self, bucket: &Bucket) -> SyncResult<BucketSnapshot> {
        let url = pull_url(&self.sync_url, bucket)?;
        let body = self.execute(HttpMethod::Get, url, None)?;
        Ok(decode_pull_body(&body)?)
    }

    fn push(&self, bucket: &Bucket, snapshot: &BucketSnapshot) -> SyncResult<()> {
        let body = PushBody::new(bucket, snapshot.clone()).encode()?;
        self.execute(HttpMethod::Put, self.sync_url.clone(), Some(body))?;
        Ok(())
    }
}

/// Trait for servers that can answer loopback requests.
pub trait LoopbackServer: Send + Sync {
    /// Handles a request. `Err` means the request never reached the server.
    fn handle(&self, request: &HttpRequest) -> Result<HttpResponse, String>;
}

impl<S: LoopbackServer + ?Sized> LoopbackServer for Arc<S> {
    fn handle(&self, request: &HttpRequest) -> Result<HttpResponse, String> {
        (**self).handle(request)
    }
}

/// An HTTP client that routes requests directly to an in-process server.
///
/// Useful for testing the HTTP gateway without actual network overhead.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }
}

impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        self.server.handle(&request)
    }
}

impl LoopbackServer for MemoryRemote {
    fn handle(&self, request: &HttpRequest) -> Result<HttpResponse, String> {
        let token = request.header(self.credential_header());

        let result = match request.method {
            HttpMethod::Get => parse_pull_url(&request.url)
                .map_err(SyncError::from)
                .and_then(|bucket| self.handle_pull(token, &bucket))
                .and_then(|snapshot| Ok(encode_pull_body(&snapshot)?)),
            HttpMethod::Put => PushBody::decode(request.body.as_deref().unwrap_or_default())
                .map_err(SyncError::from)
                .and_then(|body| self.handle_push(token, &body.bucket(), &body.user_data))
                .map(|()| br#"{"success":true}"#.to_vec()),
        };

        match result {
            Ok(body) => Ok(HttpResponse::new(200, body)),
            Err(SyncError::Unreachable(message)) => Err(message),
            Err(SyncError::Unauthenticated) => Ok(HttpResponse::new(401, r#"{"error":"USER NOT LOGIN"}"#)),
            Err(SyncError::ServerError { status, message }) => Ok(HttpResponse::new(status, message)),
            Err(SyncError::Protocol(err)) => Ok(HttpResponse::new(400, err.to_string())),
            Err(other) => Ok(HttpResponse::new(500, other.to_string())),
        }
    }
}
