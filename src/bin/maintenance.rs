use std::env;
use std::io::{self, BufRead};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing_subscriber::EnvFilter;

use jobdb::{
    auth::api_key::create_api_key,
    config::AppConfig,
    db::{self, PgPool},
    models::{ROLE_ADMIN, ROLE_USER},
    store::users::{create_user, find_by_username},
    url_check::{check_open_postings, HttpProbe},
};

const USAGE: &str = "Usage: maintenance <command>

Commands:
  migrate                                  apply pending database migrations
  create-user <username> [--admin]         create a user; password is read from stdin
  create-api-key <username> [comment]      issue an API key for a user
  check-posting-urls [--company NAME ...]  close open postings whose URL redirects";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let mut args = env::args().skip(1);
    let command = args.next();
    let rest: Vec<String> = args.collect();
    match command.as_deref() {
        Some("migrate") => migrate()?,
        Some("create-user") => add_user(&rest)?,
        Some("create-api-key") => add_api_key(&rest)?,
        Some("check-posting-urls") => check_posting_urls(&rest).await?,
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        None => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn connect() -> Result<(AppConfig, PgPool)> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        "loaded jobdb configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    Ok((config, pool))
}

fn migrate() -> Result<()> {
    let (_, pool) = connect()?;
    let mut conn = pool.get().context("failed to get database connection")?;
    let applied = db::run_migrations(&mut conn)?;
    println!("Applied {applied} migration(s).");
    Ok(())
}

fn add_user(args: &[String]) -> Result<()> {
    let mut username = None;
    let mut role = ROLE_USER;
    for arg in args {
        match arg.as_str() {
            "--admin" => role = ROLE_ADMIN,
            other if username.is_none() => username = Some(other.to_string()),
            other => bail!("unexpected argument: {other}"),
        }
    }
    let username = username.context("create-user requires a username")?;

    let mut password = String::new();
    io::stdin()
        .lock()
        .read_line(&mut password)
        .context("failed to read password from stdin")?;
    let password = password.trim_end_matches(['\r', '\n']);
    if password.len() < 8 {
        bail!("password must be at least 8 characters");
    }

    let (_, pool) = connect()?;
    let mut conn = pool.get().context("failed to get database connection")?;
    let user = create_user(&mut conn, &username, password, role)
        .with_context(|| format!("failed to create user {username}"))?;
    println!("Created {} user {} ({}).", user.role, user.username, user.id);
    Ok(())
}

fn add_api_key(args: &[String]) -> Result<()> {
    let username = args.first().context("create-api-key requires a username")?;
    let comment = args.get(1).map(String::as_str).unwrap_or_default();

    let (_, pool) = connect()?;
    let mut conn = pool.get().context("failed to get database connection")?;
    let user = find_by_username(&mut conn, username)
        .context("failed to look up user")?
        .with_context(|| format!("no user named {username}"))?;
    let api_key = create_api_key(&mut conn, user.id, None, comment)
        .context("failed to create API key")?;
    println!("{}", api_key.key);
    Ok(())
}

async fn check_posting_urls(args: &[String]) -> Result<()> {
    let mut companies = Vec::new();
    let mut args = args.iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-c" | "--company" => {
                let name = args.next().context("--company requires a name")?;
                companies.push(name.clone());
            }
            other => bail!("unexpected argument: {other}"),
        }
    }

    let (config, pool) = connect()?;
    let probe = HttpProbe::from_config(&config)?;
    let delay = Duration::from_millis(config.url_check_delay_ms);

    let summary = check_open_postings(&pool, &probe, &companies, delay).await?;
    println!(
        "Checked {} posting(s): {} closed, {} skipped, {} failed.",
        summary.checked, summary.closed, summary.skipped, summary.failed
    );
    Ok(())
}
