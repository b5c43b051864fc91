pub mod analytics;
pub mod domain;
pub mod ingest;
pub mod storage;

pub mod config {
    use anyhow::Context;

    pub const DEFAULT_TOP_N: usize = 5;
    pub const DEFAULT_PORT: u16 = 3000;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub sentry_dsn: Option<String>,
        pub default_top_n: usize,
        pub port: u16,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                default_top_n: parse_var("DEFAULT_TOP_N")?.unwrap_or(DEFAULT_TOP_N),
                port: parse_var("PORT")?.unwrap_or(DEFAULT_PORT),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }
    }

    fn parse_var<T>(name: &str) -> anyhow::Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match std::env::var(name) {
            Ok(s) if !s.trim().is_empty() => {
                let v = s
                    .trim()
                    .parse::<T>()
                    .with_context(|| format!("{name} is not valid (got {s:?})"))?;
                Ok(Some(v))
            }
            _ => Ok(None),
        }
    }
}
