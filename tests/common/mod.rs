use std::env;

use anyhow::{anyhow, ensure, Context, Result};
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::{Duration as ChronoDuration, NaiveDateTime, Utc};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::PgConnection;
use http_body_util::BodyExt;
use jobdb::auth::api_key::create_api_key;
use jobdb::auth::jwt::JwtService;
use jobdb::config::AppConfig;
use jobdb::db::{self, PgPool};
use jobdb::models::{Application, Company, NewApplication, NewCompany, NewPosting, Posting, Priority};
use jobdb::routes;
use jobdb::schema::{applications, companies, postings};
use jobdb::state::AppState;
use jobdb::store::users::create_user;
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub struct TestApp {
    pub state: AppState,
    router: Router,
}

impl TestApp {
    /// Returns `None` when `TEST_DATABASE_URL` is not set so that database
    /// tests are skipped instead of failing.
    pub async fn new() -> Result<Option<Self>> {
        let Ok(database_url) = env::var("TEST_DATABASE_URL") else {
            eprintln!("TEST_DATABASE_URL not set, skipping database test");
            return Ok(None);
        };

        let config = AppConfig {
            database_url: database_url.clone(),
            database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            jwt_secret: "test-secret".to_string(),
            jwt_issuer: "test-issuer".to_string(),
            jwt_audience: "test-audience".to_string(),
            jwt_expiry_minutes: 60,
            cors_allowed_origin: None,
            url_check_timeout_secs: 1,
            url_check_delay_ms: 0,
        };

        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let jwt = JwtService::from_config(&config)?;
        let state = AppState::new(pool.clone(), config, jwt);
        let router = routes::create_router(state.clone());

        Ok(Some(Self { state, router }))
    }

    pub async fn cleanup(&self) -> Result<()> {
        self.with_conn(|conn| truncate_all(conn)).await
    }

    pub async fn insert_user(&self, username: &str, password: &str, role: &str) -> Result<Uuid> {
        let username = username.to_string();
        let password = password.to_string();
        let role = role.to_string();
        self.with_conn(move |conn| {
            let user = create_user(conn, &username, &password, &role)
                .context("failed to insert user")?;
            Ok(user.id)
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn api_key(&self, user_id: Uuid) -> Result<String> {
        self.with_conn(move |conn| {
            let key = create_api_key(conn, user_id, None, "tests")
                .context("failed to insert API key")?;
            Ok(key.key)
        })
        .await
    }

    pub async fn login_token(&self, username: &str, password: &str) -> Result<String> {
        #[derive(Serialize)]
        struct LoginPayload<'a> {
            username: &'a str,
            password: &'a str,
        }

        let response = self
            .post_json(
                "/api/auth/login",
                &LoginPayload { username, password },
                None,
            )
            .await?;

        ensure!(
            response.status() == StatusCode::OK,
            "login failed with status {}",
            response.status()
        );

        #[derive(serde::Deserialize)]
        struct LoginResponse {
            access_token: String,
        }
        let parsed: LoginResponse = read_json(response).await?;
        Ok(parsed.access_token)
    }

    #[allow(dead_code)]
    pub async fn insert_company(&self, name: &str, priority: Priority) -> Result<Company> {
        let slug = name.to_lowercase().replace(|ch: char| !ch.is_alphanumeric(), "-");
        let new_company = NewCompany {
            id: Uuid::new_v4(),
            name: name.to_string(),
            hq: String::new(),
            url: format!("https://{slug}.example"),
            careers_url: format!("https://{slug}.example/careers"),
            careers_urls: Vec::new(),
            employees_est: String::new(),
            employees_est_source: String::new(),
            how_found: String::new(),
            priority: priority.as_i32(),
            notes: String::new(),
            filed: None,
        };
        self.with_conn(move |conn| {
            diesel::insert_into(companies::table)
                .values(&new_company)
                .get_result(conn)
                .context("failed to insert company")
        })
        .await
    }

    /// Inserts a posting created `age_days` ago.
    #[allow(dead_code)]
    pub async fn insert_posting(
        &self,
        company_id: Uuid,
        url: &str,
        in_jurisdiction: bool,
        age_days: i64,
    ) -> Result<Posting> {
        let new_posting = NewPosting {
            id: Uuid::new_v4(),
            company_id,
            url: url.to_string(),
            job_board_urls: Vec::new(),
            title: "Software Engineer".to_string(),
            closed: None,
            closed_note: String::new(),
            location: "Remote".to_string(),
            in_jurisdiction,
            jurisdiction: String::new(),
            notes: String::new(),
        };
        let created_at = days_ago(age_days);
        self.with_conn(move |conn| {
            diesel::insert_into(postings::table)
                .values((&new_posting, postings::created_at.eq(created_at)))
                .get_result(conn)
                .context("failed to insert posting")
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn close(&self, posting_id: Uuid) -> Result<()> {
        let now = Utc::now().naive_utc();
        self.with_conn(move |conn| {
            diesel::update(postings::table.find(posting_id))
                .set(postings::closed.eq(Some(now)))
                .execute(conn)
                .context("failed to close posting")?;
            Ok(())
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn insert_application(
        &self,
        user_id: Uuid,
        posting_id: Uuid,
        reported: bool,
    ) -> Result<Application> {
        let now = Utc::now().naive_utc();
        let new_application = NewApplication {
            id: Uuid::new_v4(),
            user_id,
            posting_id,
            bona_fide: None,
            applied: now,
            reported: reported.then_some(now),
            notes: String::new(),
        };
        self.with_conn(move |conn| {
            diesel::insert_into(applications::table)
                .values(&new_application)
                .get_result(conn)
                .context("failed to insert application")
        })
        .await
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        self.send(Method::POST, path, Some(("application/json", body)), token)
            .await
    }

    #[allow(dead_code)]
    pub async fn patch_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        self.send(Method::PATCH, path, Some(("application/json", body)), token)
            .await
    }

    #[allow(dead_code)]
    pub async fn post_csv(
        &self,
        path: &str,
        csv: &str,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send(
            Method::POST,
            path,
            Some(("text/csv", csv.as_bytes().to_vec())),
            token,
        )
        .await
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        self.send(Method::GET, path, None, token).await
    }

    #[allow(dead_code)]
    pub async fn delete(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        self.send(Method::DELETE, path, None, token).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<(&str, Vec<u8>)>,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some((content_type, bytes)) => builder
                .header("content-type", content_type)
                .body(Body::from(bytes))?,
            None => builder.body(Body::empty())?,
        };
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("connection task panicked")?
    }
}

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

#[allow(dead_code)]
pub async fn read_json<T: DeserializeOwned>(response: hyper::Response<Body>) -> Result<T> {
    let body = body_to_vec(response.into_body()).await?;
    serde_json::from_slice(&body).with_context(|| {
        format!(
            "unexpected response body: {}",
            String::from_utf8_lossy(&body)
        )
    })
}

/// Message carried in an `{"error": ...}` response body.
#[allow(dead_code)]
pub async fn read_error(response: hyper::Response<Body>) -> Result<String> {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        error: String,
    }
    let parsed: ErrorBody = read_json(response).await?;
    Ok(parsed.error)
}

#[allow(dead_code)]
pub fn days_ago(days: i64) -> NaiveDateTime {
    (Utc::now() - ChronoDuration::days(days)).naive_utc()
}

async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        db::run_migrations(&mut conn)?;
        truncate_all(&mut conn)?;
        Ok(())
    })
    .await
    .context("migration task panicked")?
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute(
        "TRUNCATE TABLE api_keys, applications, postings, companies, users RESTART IDENTITY CASCADE;",
    )
    .context("failed to truncate tables")?;
    Ok(())
}
