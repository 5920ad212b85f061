use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::fetcher::{FetchFailure, Fetcher};

pub const DEFAULT_USER_AGENT: &str = concat!("clash.meta submerge/", env!("CARGO_PKG_VERSION"));

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> reqwest::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .user_agent(user_agent)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchFailure> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchFailure::Status(status.as_u16()));
        }

        Ok(response.text().await?)
    }
}
