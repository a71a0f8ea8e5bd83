use std::env;
use std::path::PathBuf;

use anyhow::{ensure, Context, Result};
use url::Url;

use crate::db::DEFAULT_MAX_POOL_SIZE;
use crate::validation::DEFAULT_MAX_UPLOAD_BYTES;

pub const DEFAULT_UPLOAD_DIR: &str = "./uploads/documents";
pub const DEFAULT_REVIEWER_ROLES: &str = "admin,reviewer";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_pool_size: u32,
    pub server_host: String,
    pub server_port: u16,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub jwt_expiry_minutes: i64,
    pub cors_allowed_origin: Option<String>,
    pub upload_dir: PathBuf,
    pub upload_max_bytes: u64,
    pub reviewer_roles: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_pool_size =
            parse_pool_size(env::var("DATABASE_MAX_POOL_SIZE").ok().as_deref())?;
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("SERVER_PORT must be a valid u16")?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        let jwt_issuer = env::var("JWT_ISSUER").unwrap_or_else(|_| "docdesk".to_string());
        let jwt_audience =
            env::var("JWT_AUDIENCE").unwrap_or_else(|_| "docdesk-clients".to_string());
        let jwt_expiry_minutes = env::var("JWT_EXPIRY_MINUTES")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .context("JWT_EXPIRY_MINUTES must be an integer")?;
        let cors_allowed_origin = env::var("CORS_ALLOWED_ORIGIN").ok();
        let upload_dir = env::var("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_UPLOAD_DIR));
        let upload_max_bytes: u64 = env::var("UPLOAD_MAX_BYTES")
            .unwrap_or_else(|_| DEFAULT_MAX_UPLOAD_BYTES.to_string())
            .parse()
            .context("UPLOAD_MAX_BYTES must be a positive integer")?;
        ensure!(upload_max_bytes > 0, "UPLOAD_MAX_BYTES must be greater than zero");
        let reviewer_roles = parse_roles(
            &env::var("REVIEWER_ROLES").unwrap_or_else(|_| DEFAULT_REVIEWER_ROLES.to_string()),
        );

        Ok(Self {
            database_url,
            database_max_pool_size,
            server_host,
            server_port,
            jwt_secret,
            jwt_issuer,
            jwt_audience,
            jwt_expiry_minutes,
            cors_allowed_origin,
            upload_dir,
            upload_max_bytes,
            reviewer_roles,
        })
    }

    pub fn redacted_database_url(&self) -> String {
        redact_database_url(&self.database_url)
    }

    pub fn is_reviewer_role(&self, role: &str) -> bool {
        self.reviewer_roles
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(role.trim()))
    }
}

pub fn parse_roles(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|role| role.trim().to_lowercase())
        .filter(|role| !role.is_empty())
        .collect()
}

fn parse_pool_size(raw: Option<&str>) -> Result<u32> {
    let Some(raw) = raw else {
        return Ok(DEFAULT_MAX_POOL_SIZE);
    };
    let size: u32 = raw
        .trim()
        .parse()
        .context("DATABASE_MAX_POOL_SIZE must be a positive integer")?;
    ensure!(size > 0, "DATABASE_MAX_POOL_SIZE must be greater than zero");
    Ok(size)
}

fn redact_database_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut parsed) => {
            let _ = parsed.set_password(Some("*****"));
            parsed.to_string()
        }
        Err(_) => "***".to_string(),
    }
}
