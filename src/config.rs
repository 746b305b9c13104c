// src/config.rs

use dotenvy::dotenv;
use std::env;

/// Default per-attempt time budget, in seconds.
pub const DEFAULT_ATTEMPT_DURATION_SECS: i64 = 3600;

/// How often the background sweeper looks for attempts whose time is up.
pub const EXPIRY_SWEEP_INTERVAL_SECS: u64 = 1;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    /// Token lifetime in seconds.
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    /// Whether a student may change an already-recorded answer before
    /// submitting. When disabled, a recorded answer slot is locked.
    pub allow_answer_revision: bool,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");

        let jwt_expiration = env::var("JWT_EXPIRATION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(86400);

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let admin_username = env::var("ADMIN_USERNAME").ok();
        let admin_password = env::var("ADMIN_PASSWORD").ok();

        let allow_answer_revision = env::var("ALLOW_ANSWER_REVISION")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            admin_username,
            admin_password,
            allow_answer_revision,
        }
    }
}
