/// Application-wide configuration, loaded from the environment by
/// [`crate::config::load_app_config`].
///
/// `database_url` is optional because the CSV sink needs no database; the
/// CLI enforces its presence when the database sink is selected.
#[derive(Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub target_base_url: String,
    pub request_timeout_secs: u64,
    pub max_concurrent_extractors: usize,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub queue_capacity: usize,
    pub batch_size: usize,
    pub token_ttl_secs: u64,
    pub inter_page_delay_ms: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[redacted]"),
            )
            .field("log_level", &self.log_level)
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("target_base_url", &self.target_base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field(
                "max_concurrent_extractors",
                &self.max_concurrent_extractors,
            )
            .field("max_retries", &self.max_retries)
            .field("backoff_base_ms", &self.backoff_base_ms)
            .field("queue_capacity", &self.queue_capacity)
            .field("batch_size", &self.batch_size)
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("inter_page_delay_ms", &self.inter_page_delay_ms)
            .finish()
    }
}
