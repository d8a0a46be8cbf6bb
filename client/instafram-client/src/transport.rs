//! HTTP transport for the InstaFram REST backend
//!
//! Requests are described as plain [`ApiRequest`] values and sent through the
//! [`Transport`] trait, so the API layer can be exercised against an
//! in-process fake. [`HttpTransport`] is the reqwest implementation.

use crate::config::ClientConfig;
use crate::session::Session;
use async_trait::async_trait;
use instafram_common::{ApiError, Envelope};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

pub const HEADER_REFRESH_TOKEN: &str = "x-refresh-token";
pub const HEADER_CLIENT_ID: &str = "x-client-id";
pub const HEADER_API_KEY: &str = "x-api-key";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// File attached to a multipart body
#[derive(Debug, Clone, PartialEq)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Body {
    #[default]
    Empty,
    Json(Value),
    Multipart {
        fields: Vec<(String, String)>,
        files: Vec<FilePart>,
    },
}

/// Transport-neutral description of one API call
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Body,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: Body::Empty,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn query(mut self, name: &str, value: impl ToString) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }

    pub fn page(self, page: u32) -> Self {
        self.query("page", page)
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, ApiError> {
        self.body = Body::Json(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn multipart(mut self, fields: Vec<(String, String)>, files: Vec<FilePart>) -> Self {
        self.body = Body::Multipart { fields, files };
        self
    }

    /// Value of a query parameter, if present
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Sends requests and hands back the decoded envelope
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<Envelope<Value>, ApiError>;
}

/// reqwest-backed transport
pub struct HttpTransport {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    session: Arc<Session>,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig, session: Arc<Session>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ApiError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.api.base_url.clone(),
            api_key: config.api.api_key.clone(),
            session,
        })
    }

    fn build(&self, request: ApiRequest) -> Result<reqwest::RequestBuilder, ApiError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
            Method::Delete => self.client.delete(&url),
        };

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        let session = self.session.snapshot();
        if let Some(tokens) = &session.tokens {
            builder = builder
                .bearer_auth(&tokens.access_token)
                .header(HEADER_REFRESH_TOKEN, &tokens.refresh_token);
        }
        if let Some(user_id) = &session.user_id {
            builder = builder.header(HEADER_CLIENT_ID, user_id);
        }
        if let Some(key) = &self.api_key {
            builder = builder.header(HEADER_API_KEY, key);
        }

        builder = match request.body {
            Body::Empty => builder,
            Body::Json(value) => builder.json(&value),
            Body::Multipart { fields, files } => {
                let mut form = Form::new();
                for (name, value) in fields {
                    form = form.text(name, value);
                }
                for file in files {
                    let part = Part::bytes(file.bytes)
                        .file_name(file.file_name)
                        .mime_str(&file.mime)
                        .map_err(|e| ApiError::Validation(format!("Invalid file type: {}", e)))?;
                    form = form.part(file.field, part);
                }
                builder.multipart(form)
            }
        };

        Ok(builder)
    }
}

fn map_send_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout(err.to_string())
    } else {
        ApiError::Network(err.to_string())
    }
}

/// Decode a response body, falling back to the HTTP status when the body is
/// not an envelope
pub(crate) fn decode_envelope(status: u16, bytes: &[u8]) -> Result<Envelope<Value>, ApiError> {
    match serde_json::from_slice::<Envelope<Value>>(bytes) {
        Ok(mut envelope) => {
            if !(200..300).contains(&status) && envelope.is_success() {
                envelope.status = status;
            }
            Ok(envelope)
        }
        Err(e) if (200..300).contains(&status) => Err(ApiError::Decode(e.to_string())),
        Err(_) => {
            let text = String::from_utf8_lossy(bytes);
            let message = if text.trim().is_empty() {
                format!("HTTP {}", status)
            } else {
                text.into_owned()
            };
            Ok(Envelope::error(status, None, message))
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<Envelope<Value>, ApiError> {
        let method = request.method;
        let path = request.path.clone();
        debug!(%method, path = %path, "Sending request");

        let response = self
            .build(request)?
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(map_send_error)?;
        let envelope = decode_envelope(status, &bytes)?;

        if !envelope.is_success() {
            warn!(%method, path = %path, status, message = %envelope.message, "Request rejected");
        }
        Ok(envelope)
    }
}
