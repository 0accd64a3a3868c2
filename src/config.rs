use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    /// Deployment environment name, surfaced by the healthcheck.
    pub env: String,
    pub database_url: String,
    pub db_max_connections: u32,
    /// Token-bucket refill rate, tokens/second, per client IP.
    pub limiter_rps: f64,
    /// Token-bucket capacity per client IP.
    pub limiter_burst: u32,
    pub limiter_enabled: bool,
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    Ok(Config {
        port: env_or("CATALOG_PORT", 4000),
        env: std::env::var("CATALOG_ENV").unwrap_or_else(|_| "development".into()),
        database_url: std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/catalog".into()),
        db_max_connections: env_or("CATALOG_DB_MAX_CONNS", 25),
        limiter_rps: env_or("CATALOG_LIMITER_RPS", 2.0),
        limiter_burst: env_or("CATALOG_LIMITER_BURST", 4),
        limiter_enabled: env_or("CATALOG_LIMITER_ENABLED", true),
    })
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_or_falls_back_on_missing_or_garbage() {
        assert_eq!(env_or("CATALOG_TEST_UNSET_VAR", 7_u16), 7);
        std::env::set_var("CATALOG_TEST_GARBAGE_VAR", "not-a-number");
        assert_eq!(env_or("CATALOG_TEST_GARBAGE_VAR", 7_u16), 7);
        std::env::remove_var("CATALOG_TEST_GARBAGE_VAR");
    }
}
