use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use orion_error::prelude::*;
use parking_lot::Mutex;

use gf_config::EndpointsConfig;

use crate::error::{RuntimeReason, RuntimeResult};

/// A destination capable of accepting a delivered notification body.
///
/// Implementors must be cheap to hold across `.await` points; the per-hook
/// dispatch loop calls `send` once per retry attempt.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, endpoint: &str, body: &str) -> RuntimeResult<()>;
}

/// `local://` — delivers straight into an in-process mpsc sink, used by
/// tests and by channel subscribers that live in the same process.
pub struct LocalTransport {
    sinks: Mutex<HashMap<String, tokio::sync::mpsc::Sender<String>>>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self {
            sinks: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, name: impl Into<String>, tx: tokio::sync::mpsc::Sender<String>) {
        self.sinks.lock().insert(name.into(), tx);
    }
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn send(&self, endpoint: &str, body: &str) -> RuntimeResult<()> {
        let tx = self.sinks.lock().get(endpoint).cloned();
        let Some(tx) = tx else {
            return Err(StructError::from(RuntimeReason::Queue(format!(
                "no local subscriber registered for {endpoint:?}"
            ))));
        };
        tx.send(body.to_string())
            .await
            .map_err(|e| StructError::from(RuntimeReason::Queue(format!("local send: {e}"))))
    }
}

/// `http://` / `https://` — POSTs the notification body as JSON.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, endpoint: &str, body: &str) -> RuntimeResult<()> {
        let resp = self
            .client
            .post(endpoint)
            .header("content-type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| StructError::from(RuntimeReason::Queue(format!("http send: {e}"))))?;
        if !resp.status().is_success() {
            return Err(StructError::from(RuntimeReason::Queue(format!(
                "http endpoint {endpoint:?} returned {}",
                resp.status()
            ))));
        }
        Ok(())
    }
}

/// `log://` — appends the body to a `tracing` event; used for tests and for
/// endpoints that only need an audit trail rather than live delivery.
pub struct LogTransport;

#[async_trait]
impl Transport for LogTransport {
    async fn send(&self, endpoint: &str, body: &str) -> RuntimeResult<()> {
        gf_info!(hook, endpoint = endpoint, body = body, "delivered");
        Ok(())
    }
}

/// Scheme-dispatched transport registry. `endpoint` strings are
/// `scheme://rest`; the scheme selects the transport, the full endpoint
/// string (including scheme) is passed through to it unchanged.
pub struct TransportRegistry {
    local: Arc<LocalTransport>,
    http: Arc<HttpTransport>,
    log: Arc<LogTransport>,
    endpoints: EndpointsConfig,
}

impl TransportRegistry {
    pub fn new(local: Arc<LocalTransport>, endpoints: EndpointsConfig) -> Self {
        Self {
            local,
            http: Arc::new(HttpTransport::new()),
            log: Arc::new(LogTransport),
            endpoints,
        }
    }

    fn scheme_of(endpoint: &str) -> Option<&str> {
        endpoint.split_once("://").map(|(scheme, _)| scheme)
    }

    pub async fn send(&self, endpoint: &str, body: &str) -> RuntimeResult<()> {
        let Some(scheme) = Self::scheme_of(endpoint) else {
            return Err(StructError::from(RuntimeReason::UnsupportedScheme(
                endpoint.to_string(),
            )));
        };
        if !self.endpoints.is_enabled(scheme) {
            return Err(StructError::from(RuntimeReason::UnsupportedScheme(
                format!("{scheme} (disabled by config)"),
            )));
        }
        match scheme {
            "local" => self.local.send(endpoint, body).await,
            "http" | "https" => self.http.send(endpoint, body).await,
            "log" | "file" => self.log.send(endpoint, body).await,
            other => Err(StructError::from(RuntimeReason::UnsupportedScheme(
                other.to_string(),
            ))),
        }
    }
}
