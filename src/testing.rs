//! Test doubles shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore};

use crate::fetcher::{FetchFailure, Fetcher};

/// Serves canned bodies by URL; unknown URLs answer 404.
#[derive(Default)]
pub struct StaticFetcher {
    bodies: HashMap<String, String>,
    delays: HashMap<String, Duration>,
    gate: Option<Arc<Semaphore>>,
    entered: Arc<Notify>,
    calls: Arc<AtomicUsize>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, body: &str) -> Self {
        self.bodies.insert(url.to_string(), body.to_string());
        self
    }

    pub fn with_delay(mut self, url: &str, delay: Duration) -> Self {
        self.delays.insert(url.to_string(), delay);
        self
    }

    /// Every fetch waits for a permit on `gate` before answering.
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Notified each time a fetch starts.
    pub fn entered(&self) -> Arc<Notify> {
        self.entered.clone()
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();

        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| FetchFailure::Aborted(e.to_string()))?;
            permit.forget();
        }
        if let Some(delay) = self.delays.get(url) {
            tokio::time::sleep(*delay).await;
        }

        self.bodies
            .get(url)
            .cloned()
            .ok_or(FetchFailure::Status(404))
    }
}

/// A minimal valid subscription with one proxy, one group and one rule.
pub fn sample_config(proxy: &str, domain: &str) -> String {
    format!(
        r#"port: 7890
mode: rule
proxies:
  - {{name: {proxy}, type: ss, server: {proxy}.example.net, port: 443, cipher: aes-128-gcm, password: pw}}
proxy-groups:
  - {{name: Proxy, type: select, proxies: [{proxy}, DIRECT]}}
rules:
  - DOMAIN,{domain},Proxy
  - MATCH,Proxy
"#
    )
}
