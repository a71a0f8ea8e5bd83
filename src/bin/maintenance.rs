use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing_subscriber::EnvFilter;

use docdesk::{
    auth::jwt::JwtService,
    config::AppConfig,
    db,
    lifecycle::DocumentService,
    repository::PgDocumentRepository,
    storage::LocalBlobStore,
    validation::UploadValidator,
};

const USAGE: &str = "Usage:
  maintenance reconcile-orphans [--apply] [--min-age-minutes N]
  maintenance issue-token <user-id> <role> [username]";

const DEFAULT_MIN_AGE_MINUTES: u64 = 60;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        Some("reconcile-orphans") => reconcile_orphans(args.collect()).await?,
        Some("issue-token") => issue_token(args.collect())?,
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

async fn reconcile_orphans(args: Vec<String>) -> Result<()> {
    let mut apply = false;
    let mut min_age_minutes = DEFAULT_MIN_AGE_MINUTES;
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--apply" => apply = true,
            "--min-age-minutes" => {
                let value = iter
                    .next()
                    .context("--min-age-minutes requires a value")?;
                min_age_minutes = value
                    .parse()
                    .context("--min-age-minutes must be a non-negative integer")?;
            }
            other => bail!("unknown argument '{other}'\n{USAGE}"),
        }
    }

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        upload_dir = %config.upload_dir.display(),
        apply,
        min_age_minutes,
        "loaded backend configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    let repository = Arc::new(PgDocumentRepository::new(pool));
    let blobs = Arc::new(LocalBlobStore::new(config.upload_dir.clone()));
    let service = DocumentService::new(
        repository,
        blobs,
        UploadValidator::new(config.upload_max_bytes),
    );

    let report = service
        .reconcile_orphans(Duration::from_secs(min_age_minutes.saturating_mul(60)), apply)
        .await
        .context("orphan reconciliation failed")?;

    println!(
        "Scanned {} blobs, {} orphaned ({} interrupted uploads), {} too recent to judge.",
        report.scanned,
        report.orphaned.len(),
        report.partial,
        report.skipped_recent
    );
    for path in &report.orphaned {
        println!("  {path}");
    }
    if apply {
        println!("Removed {} orphaned blobs.", report.removed);
    } else if !report.orphaned.is_empty() {
        println!("Dry run; pass --apply to delete them.");
    }
    Ok(())
}

fn issue_token(args: Vec<String>) -> Result<()> {
    let (user_id, role) = match (args.first(), args.get(1)) {
        (Some(user_id), Some(role)) => (user_id, role),
        _ => bail!("issue-token needs a user id and a role\n{USAGE}"),
    };
    let username = args.get(2).unwrap_or(user_id);

    let config = AppConfig::from_env()?;
    let jwt = JwtService::from_config(&config)?;
    let token = jwt.generate_token(user_id, username, role)?;
    println!("{token}");
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
