//! Process configuration loaded from the environment (spec.md §6
//! "Environment variables (recognized)").

use waypoint_core::defaults;
use waypoint_transport::ServerMode;

/// Everything `main` needs before it can construct a [`crate::state::ServerContext`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub mode: ServerMode,
    pub server_api_key: Option<String>,
    pub allow_no_api_key: bool,
    pub require_https: bool,
    pub auth_jwks_url: Option<String>,
    pub auth_expected_aud: Option<String>,
    pub issuer: String,
    pub rate_limit_max_requests: u32,
    pub rate_limit_period_secs: u64,
    pub rate_limit_enabled: bool,
    pub allowed_origins: Vec<String>,
    pub session_ttl_secs: i64,
    pub session_cleanup_interval_secs: u64,
}

fn env_var(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl ServerConfig {
    pub fn from_env() -> Self {
        // `DB_PATH` is spec.md's name for the embedded store's location;
        // this system's store is PostgreSQL (see DESIGN.md), so
        // `DATABASE_URL` is the primary variable, with `DB_PATH` accepted
        // as a fallback alias for a reader coming from the spec's table.
        let database_url = std::env::var("DATABASE_URL")
            .or_else(|_| std::env::var("DB_PATH"))
            .unwrap_or_else(|_| "postgres://localhost/waypoint".to_string());

        let host = env_var("HOST", "0.0.0.0");
        let port = env_parse("SERVER_PORT", defaults::SERVER_PORT);

        let issuer = std::env::var("ISSUER_URL").unwrap_or_else(|_| format!("http://{host}:{port}"));

        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        Self {
            database_url,
            host,
            port,
            mode: ServerMode::from_env(),
            server_api_key: std::env::var("SERVER_API_KEY").ok(),
            allow_no_api_key: env_parse("ALLOW_NO_API_KEY", false),
            require_https: env_parse("REQUIRE_HTTPS", false),
            auth_jwks_url: std::env::var("AUTH_JWKS_URL").ok(),
            auth_expected_aud: std::env::var("AUTH_EXPECTED_AUD").ok(),
            issuer,
            rate_limit_max_requests: env_parse("RATE_LIMIT_MAX_REQUESTS", defaults::RATE_LIMIT_MAX_REQUESTS),
            rate_limit_period_secs: env_parse("RATE_LIMIT_PERIOD_SECS", 60u64),
            rate_limit_enabled: env_parse("RATE_LIMIT_ENABLED", true),
            allowed_origins,
            session_ttl_secs: env_parse("MCP_SESSION_TIMEOUT_SECONDS", defaults::SESSION_TTL_SECS),
            session_cleanup_interval_secs: env_parse(
                "MCP_SESSION_CLEANUP_INTERVAL_SECONDS",
                defaults::SESSION_CLEANUP_INTERVAL_SECS,
            ),
        }
    }
}
