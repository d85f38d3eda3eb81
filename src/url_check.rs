//! Detects postings whose URL now redirects elsewhere and closes them.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use diesel::{pg::PgConnection, prelude::*};
use reqwest::{header, redirect, Client};
use serde::Serialize;
use tokio::task;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    db::{lower, PgPool},
    schema::{companies, postings},
    store::postings::close_posting,
};

pub const CLOSED_NOTE: &str = "Closed automatically by check_posting_urls command";

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Hosts that redirect regardless of whether the posting is still open.
const SKIPPED_HOSTS: &[&str] = &[
    "linkedin.com",
    "www.linkedin.com",
    "timescale.com",
    "www.timescale.com",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status: u16,
    pub location: Option<String>,
}

impl ProbeResponse {
    pub fn is_redirect(&self) -> bool {
        (300..=399).contains(&self.status)
    }
}

#[async_trait]
pub trait UrlProbe: Send + Sync {
    /// Issues a single request without following redirects.
    async fn head(&self, url: &str) -> Result<ProbeResponse>;
}

pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(Duration::from_secs(config.url_check_timeout_secs))
    }
}

#[async_trait]
impl UrlProbe for HttpProbe {
    async fn head(&self, url: &str) -> Result<ProbeResponse> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        Ok(ProbeResponse {
            status: response.status().as_u16(),
            location,
        })
    }
}

pub fn should_skip(url: &str) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_ascii_lowercase))
        .is_some_and(|host| SKIPPED_HOSTS.contains(&host.as_str()))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CheckSummary {
    pub checked: usize,
    pub closed: usize,
    pub skipped: usize,
    pub failed: usize,
}

fn load_open_postings(
    conn: &mut PgConnection,
    company_names: &[String],
) -> Result<Vec<(Uuid, String)>> {
    let mut query = postings::table
        .inner_join(companies::table)
        .filter(postings::closed.is_null())
        .select((postings::id, postings::url))
        .order((lower(companies::name).asc(), postings::id.asc()))
        .into_boxed();
    if !company_names.is_empty() {
        let names: Vec<String> = company_names
            .iter()
            .map(|name| name.trim().to_lowercase())
            .collect();
        query = query.filter(lower(companies::name).eq_any(names));
    }
    query.load(conn).context("failed to load open postings")
}

/// Probes every open posting, optionally limited to the named companies
/// (case-insensitive), in company name order. Redirecting postings are
/// closed; request failures are logged and left open.
pub async fn check_open_postings(
    pool: &PgPool,
    probe: &dyn UrlProbe,
    company_names: &[String],
    delay: Duration,
) -> Result<CheckSummary> {
    let loader_pool = pool.clone();
    let names = company_names.to_vec();
    let open = task::spawn_blocking(move || {
        let mut conn = loader_pool
            .get()
            .context("failed to get database connection")?;
        load_open_postings(&mut conn, &names)
    })
    .await
    .context("open posting loader panicked")??;

    let mut summary = CheckSummary::default();
    for (posting_id, url) in open {
        if should_skip(&url) {
            summary.skipped += 1;
            continue;
        }

        let response = match probe.head(&url).await {
            Ok(response) => response,
            Err(err) => {
                warn!(url = %url, error = %err, "posting URL check failed, skipping");
                summary.failed += 1;
                continue;
            }
        };
        summary.checked += 1;

        if response.is_redirect() {
            let closer_pool = pool.clone();
            task::spawn_blocking(move || -> Result<()> {
                let mut conn = closer_pool
                    .get()
                    .context("failed to get database connection")?;
                close_posting(&mut conn, posting_id, Some(CLOSED_NOTE))
                    .with_context(|| format!("failed to close posting {posting_id}"))?;
                Ok(())
            })
            .await
            .context("posting close task panicked")??;
            summary.closed += 1;
            info!(
                url = %url,
                location = response.location.as_deref().unwrap_or("-"),
                "closed redirecting posting"
            );
        } else {
            info!(url = %url, status = response.status, "posting URL responded normally");
        }

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    Ok(summary)
}
