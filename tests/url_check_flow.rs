mod common;

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use common::{acquire_db_lock, TestApp};
use jobdb::models::Priority;
use jobdb::store::postings::find;
use jobdb::url_check::{check_open_postings, ProbeResponse, UrlProbe, CLOSED_NOTE};

/// Answers from a fixed table and records every URL it was asked about.
struct FakeProbe {
    responses: HashMap<String, u16>,
    requested: Mutex<Vec<String>>,
}

impl FakeProbe {
    fn new(responses: &[(&str, u16)]) -> Self {
        Self {
            responses: responses
                .iter()
                .map(|(url, status)| (url.to_string(), *status))
                .collect(),
            requested: Mutex::new(Vec::new()),
        }
    }

    fn requested(&self) -> Vec<String> {
        self.requested
            .lock()
            .map(|urls| urls.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl UrlProbe for FakeProbe {
    async fn head(&self, url: &str) -> Result<ProbeResponse> {
        self.requested
            .lock()
            .map_err(|_| anyhow!("probe log poisoned"))?
            .push(url.to_string());
        let Some(status) = self.responses.get(url) else {
            bail!("connection refused");
        };
        Ok(ProbeResponse {
            status: *status,
            location: (300..400)
                .contains(status)
                .then(|| "https://elsewhere.example/".to_string()),
        })
    }
}

#[tokio::test]
async fn redirecting_postings_are_closed() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };
    let company = app.insert_company("Initech", Priority::High).await?;
    let moved = app
        .insert_posting(company.id, "https://jobs.example/initech/moved", true, 3)
        .await?;
    let live = app
        .insert_posting(company.id, "https://jobs.example/initech/live", true, 2)
        .await?;
    let linkedin = app
        .insert_posting(company.id, "https://www.linkedin.com/jobs/view/42/", true, 1)
        .await?;
    let unreachable = app
        .insert_posting(company.id, "https://jobs.example/initech/down", true, 1)
        .await?;
    let already_closed = app
        .insert_posting(company.id, "https://jobs.example/initech/old", true, 9)
        .await?;
    app.close(already_closed.id).await?;

    let probe = FakeProbe::new(&[
        ("https://jobs.example/initech/moved", 301),
        ("https://jobs.example/initech/live", 200),
        ("https://jobs.example/initech/old", 302),
    ]);

    let summary = check_open_postings(&app.state.pool, &probe, &[], Duration::ZERO).await?;
    assert_eq!(summary.checked, 2);
    assert_eq!(summary.closed, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 1);

    let requested = probe.requested();
    assert!(!requested.iter().any(|url| url.contains("linkedin")));
    assert!(!requested.iter().any(|url| url.ends_with("/old")));

    let ids = [moved.id, live.id, linkedin.id, unreachable.id];
    let stored = app
        .with_conn(move |conn| {
            let mut found = Vec::with_capacity(ids.len());
            for id in ids {
                found.push(find(conn, id)?);
            }
            Ok(found)
        })
        .await?;
    let [moved, live, linkedin, unreachable] = stored.as_slice() else {
        bail!("expected four postings, got {}", stored.len());
    };
    assert!(moved.closed.is_some());
    assert_eq!(moved.closed_note, CLOSED_NOTE);
    assert!(live.closed.is_none());
    assert!(linkedin.closed.is_none());
    assert!(unreachable.closed.is_none());

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn company_filter_limits_checked_postings() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };
    let initech = app.insert_company("Initech", Priority::High).await?;
    let initrode = app.insert_company("Initrode", Priority::Normal).await?;
    app.insert_posting(initech.id, "https://jobs.example/initech/1", true, 1)
        .await?;
    let other = app
        .insert_posting(initrode.id, "https://jobs.example/initrode/1", true, 1)
        .await?;

    let probe = FakeProbe::new(&[
        ("https://jobs.example/initech/1", 200),
        ("https://jobs.example/initrode/1", 301),
    ]);

    let summary = check_open_postings(
        &app.state.pool,
        &probe,
        &["INITECH".to_string()],
        Duration::ZERO,
    )
    .await?;
    assert_eq!(summary.checked, 1);
    assert_eq!(summary.closed, 0);
    assert_eq!(probe.requested(), vec!["https://jobs.example/initech/1"]);
    let other_id = other.id;
    let other = app.with_conn(move |conn| Ok(find(conn, other_id)?)).await?;
    assert!(other.closed.is_none());

    app.cleanup().await?;
    Ok(())
}
