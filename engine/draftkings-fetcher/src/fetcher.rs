use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Proxy};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::{DraftKingsConfig, RetryConfig, SubcategoryTarget};

/// Raw response for one subcategory
#[derive(Debug, Clone)]
pub struct FetchedSubcategory {
    pub target: SubcategoryTarget,
    pub payload: serde_json::Value,
    pub fetched_at: DateTime<Utc>,
}

/// HTTP client for the DraftKings sportsbook API
pub struct DraftKingsFetcher {
    config: DraftKingsConfig,
    retry: RetryConfig,
    /// One client per configured proxy, or a single direct client
    clients: Vec<Client>,
}

impl DraftKingsFetcher {
    pub fn new(config: DraftKingsConfig, retry: RetryConfig) -> Result<Self> {
        let clients = build_clients(&config)?;
        info!("HTTP clients ready: {} (proxies configured: {})", clients.len(), config.proxies.len());
        Ok(Self { config, retry, clients })
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Fill the URL template for one subcategory
    pub fn subcategory_url(&self, category_id: u64, subcategory_id: u64) -> String {
        self.config
            .url_template
            .replace("{eventgroup_id}", &self.config.eventgroup_id.to_string())
            .replace("{category_id}", &category_id.to_string())
            .replace("{subcategory_id}", &subcategory_id.to_string())
    }

    /// Fetch one subcategory with a politeness delay and retries
    pub async fn fetch_subcategory(&self, category_id: u64, subcategory_id: u64) -> Result<serde_json::Value> {
        let url = self.subcategory_url(category_id, subcategory_id);
        run_with_retry(|| self.request(&url), &self.retry).await
    }

    async fn request(&self, url: &str) -> Result<serde_json::Value> {
        let delay = politeness_delay(self.config.sleep_secs_min, self.config.sleep_secs_max);
        sleep(delay).await;

        info!("Fetching {}", url);
        let response = self.pick_client().get(url).send().await.context("Failed to send request")?;

        if !response.status().is_success() {
            anyhow::bail!("API request failed with status: {}", response.status());
        }

        response.json().await.context("Failed to parse response JSON")
    }

    /// Random client for the next attempt
    fn pick_client(&self) -> &Client {
        let index = rand::thread_rng().gen_range(0..self.clients.len());
        &self.clients[index]
    }

    /// Fetch every configured subcategory; failures are logged and skipped
    pub async fn fetch_all(&self) -> Vec<FetchedSubcategory> {
        let mut fetched = Vec::with_capacity(self.config.subcategories.len());

        for target in &self.config.subcategories {
            match self.fetch_subcategory(target.category_id, target.subcategory_id).await {
                Ok(payload) => fetched.push(FetchedSubcategory {
                    target: target.clone(),
                    payload,
                    fetched_at: Utc::now(),
                }),
                Err(e) => error!("Giving up on {}: {:#}", target.name, e),
            }
        }

        info!(
            "Fetched {} of {} subcategories",
            fetched.len(),
            self.config.subcategories.len()
        );
        fetched
    }
}

fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes()).with_context(|| format!("Invalid header name: {}", name))?;
        let value = HeaderValue::from_str(value).with_context(|| format!("Invalid value for header {}", name))?;
        map.insert(name, value);
    }
    Ok(map)
}

fn build_clients(config: &DraftKingsConfig) -> Result<Vec<Client>> {
    let headers = header_map(&config.headers)?;
    let builder = || {
        Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .default_headers(headers.clone())
    };

    if config.proxies.is_empty() {
        let client = builder().build().context("Failed to create HTTP client")?;
        return Ok(vec![client]);
    }

    config
        .proxies
        .iter()
        .map(|url| {
            let proxy = Proxy::all(url.as_str()).with_context(|| format!("Invalid proxy: {}", url))?;
            builder()
                .proxy(proxy)
                .build()
                .with_context(|| format!("Failed to create HTTP client for proxy {}", url))
        })
        .collect()
}

/// Uniform random delay in `[min_secs, max_secs]`
fn politeness_delay(min_secs: f64, max_secs: f64) -> Duration {
    if max_secs <= min_secs {
        return Duration::from_secs_f64(min_secs.max(0.0));
    }
    Duration::from_secs_f64(rand::thread_rng().gen_range(min_secs..=max_secs))
}

/// Run `f` until it succeeds, backing off exponentially between attempts
pub async fn run_with_retry<F, Fut, T>(mut f: F, retry_config: &RetryConfig) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = Duration::from_secs(retry_config.initial_delay_secs);
    let attempts = retry_config.max_retries + 1;
    let mut attempt = 1;

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt >= attempts => {
                return Err(e.context(format!("Failed after {} attempts", attempts)));
            }
            Err(e) => {
                warn!("Attempt {} failed: {}, retrying in {:?}", attempt, e, delay);
                sleep(delay).await;

                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * retry_config.backoff_multiplier)
                        .min(retry_config.max_delay_secs as f64),
                );
                attempt += 1;
            }
        }
    }
}
