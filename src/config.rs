use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use tracing::{info, warn};
use url::Url;

use crate::moderation::{CacheSettings, DecisionPolicy};
use crate::scorer::HttpScorerConfig;

const ENV_PREFIX: &str = "MODERATOR_";

/// Configuration for the moderation service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeratorConfig {
    pub server: ServerConfig,
    pub scorer: ScorerConfig,
    pub policy: PolicyConfig,
    pub cache: CacheConfig,
    pub review: ReviewConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorerConfig {
    /// Model service endpoint (required)
    pub url: String,
    /// Bearer secret for the model service
    pub secret: String,
    /// Multipart field carrying the media
    pub field: String,
    pub timeout_secs: u64,
    /// Refuse plain-HTTP scorer endpoints
    pub require_https: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub threshold_low: f64,
    pub threshold_high: f64,
    pub repeat_offense_limit: u32,
    pub mute_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// 0 keeps records forever
    pub ttl_secs: u64,
    /// 0 is unbounded
    pub capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Pending cases older than this are re-announced
    pub overdue_after_mins: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub postgres_url: String,
    /// If false, state is kept in memory only
    pub postgres_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Emit span events for every HTTP request
    pub log_requests: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Accepted API keys; empty disables authentication
    pub api_keys: Vec<String>,
}

impl Default for ModeratorConfig {
    fn default() -> Self {
        let policy = DecisionPolicy::default();
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8780,
            },
            scorer: ScorerConfig {
                url: String::new(), // must be configured
                secret: String::new(),
                field: "file".to_string(),
                timeout_secs: 30,
                require_https: false,
            },
            policy: PolicyConfig {
                threshold_low: policy.threshold_low,
                threshold_high: policy.threshold_high,
                repeat_offense_limit: policy.repeat_offense_limit,
                mute_days: policy.mute_days,
            },
            cache: CacheConfig {
                ttl_secs: 7 * 24 * 60 * 60,
                capacity: 100_000,
            },
            review: ReviewConfig {
                overdue_after_mins: 60,
                sweep_interval_secs: 300,
            },
            database: DatabaseConfig {
                postgres_url: "postgresql://localhost:5432/moderator".to_string(),
                postgres_enabled: false,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                log_requests: false,
            },
            api: ApiConfig::default(),
        }
    }
}

/// Parse `MODERATOR_<name>` if present
fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    let key = format!("{}{}", ENV_PREFIX, name);
    match lookup(&key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("Invalid {} value", key)),
        None => Ok(None),
    }
}

impl ModeratorConfig {
    /// Load configuration from environment variables and validate it
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        // Server
        if let Some(host) = parse_var(&lookup, "HOST")? {
            config.server.host = host;
        }
        if let Some(port) = parse_var(&lookup, "PORT")? {
            config.server.port = port;
        }

        // Scorer
        config.scorer.url = parse_var(&lookup, "SCORER_URL")?
            .context("MODERATOR_SCORER_URL environment variable is required")?;
        if let Some(secret) = parse_var(&lookup, "SCORER_SECRET")? {
            config.scorer.secret = secret;
        }
        if let Some(field) = parse_var(&lookup, "SCORER_FIELD")? {
            config.scorer.field = field;
        }
        if let Some(timeout) = parse_var(&lookup, "SCORER_TIMEOUT_SECS")? {
            config.scorer.timeout_secs = timeout;
        }
        if let Some(require_https) = parse_var(&lookup, "REQUIRE_HTTPS")? {
            config.scorer.require_https = require_https;
        }

        // Decision policy
        if let Some(low) = parse_var(&lookup, "THRESHOLD_LOW")? {
            config.policy.threshold_low = low;
        }
        if let Some(high) = parse_var(&lookup, "THRESHOLD_HIGH")? {
            config.policy.threshold_high = high;
        }
        if let Some(limit) = parse_var(&lookup, "REPEAT_OFFENSE_LIMIT")? {
            config.policy.repeat_offense_limit = limit;
        }
        if let Some(days) = parse_var(&lookup, "MUTE_DAYS")? {
            config.policy.mute_days = days;
        }

        // Cache
        if let Some(ttl) = parse_var(&lookup, "CACHE_TTL_SECS")? {
            config.cache.ttl_secs = ttl;
        }
        if let Some(capacity) = parse_var(&lookup, "CACHE_CAPACITY")? {
            config.cache.capacity = capacity;
        }

        // Review
        if let Some(mins) = parse_var(&lookup, "REVIEW_OVERDUE_MINS")? {
            config.review.overdue_after_mins = mins;
        }
        if let Some(secs) = parse_var(&lookup, "SWEEP_INTERVAL_SECS")? {
            config.review.sweep_interval_secs = secs;
        }

        // Database
        if let Some(url) = parse_var(&lookup, "POSTGRES_URL")? {
            config.database.postgres_url = url;
        }
        if let Some(enabled) = parse_var(&lookup, "POSTGRES_ENABLED")? {
            config.database.postgres_enabled = enabled;
        }

        // Logging
        if let Some(level) = parse_var(&lookup, "LOG_LEVEL")? {
            config.logging.level = level;
        }
        if let Some(log_requests) = parse_var(&lookup, "LOG_REQUESTS")? {
            config.logging.log_requests = log_requests;
        }

        // API keys
        if let Some(keys) = parse_var::<String, _>(&lookup, "API_KEYS")? {
            config.api.api_keys = keys
                .split(',')
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect();
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for consistency
    pub fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            return Err(anyhow::anyhow!("Server host cannot be empty"));
        }

        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port must be non-zero"));
        }

        let scorer_url = Url::parse(&self.scorer.url)
            .with_context(|| format!("Invalid scorer URL: {}", self.scorer.url))?;
        if self.scorer.require_https && scorer_url.scheme() != "https" {
            return Err(anyhow::anyhow!(
                "HTTPS is required but scorer URL is not HTTPS: {}",
                self.scorer.url
            ));
        }

        if self.scorer.field.is_empty() {
            return Err(anyhow::anyhow!("Scorer form field cannot be empty"));
        }

        if self.scorer.timeout_secs == 0 {
            return Err(anyhow::anyhow!("Scorer timeout must be non-zero"));
        }

        self.to_policy()
            .validate()
            .context("Invalid decision policy")?;

        if self.review.sweep_interval_secs == 0 {
            return Err(anyhow::anyhow!("Sweep interval must be non-zero"));
        }

        if self.scorer.secret.is_empty() {
            warn!("MODERATOR_SCORER_SECRET not set, scorer requests are unauthenticated");
        }

        if self.api.api_keys.is_empty() {
            warn!("MODERATOR_API_KEYS not set, the admin API is unauthenticated");
        }

        Ok(())
    }

    pub fn to_policy(&self) -> DecisionPolicy {
        DecisionPolicy {
            threshold_low: self.policy.threshold_low,
            threshold_high: self.policy.threshold_high,
            repeat_offense_limit: self.policy.repeat_offense_limit,
            mute_days: self.policy.mute_days,
        }
    }

    pub fn to_cache_settings(&self) -> CacheSettings {
        CacheSettings {
            ttl: (self.cache.ttl_secs > 0)
                .then(|| chrono::Duration::seconds(self.cache.ttl_secs.min(i64::MAX as u64) as i64)),
            capacity: (self.cache.capacity > 0).then_some(self.cache.capacity),
        }
    }

    pub fn to_scorer_config(&self) -> HttpScorerConfig {
        HttpScorerConfig {
            url: self.scorer.url.clone(),
            secret: self.scorer.secret.clone(),
            field: self.scorer.field.clone(),
            timeout_secs: self.scorer.timeout_secs,
            require_https: self.scorer.require_https,
        }
    }

    pub fn overdue_after(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.review.overdue_after_mins.min(i64::MAX as u64) as i64)
    }

    /// Log the effective configuration with secrets masked
    pub fn log_summary(&self) {
        info!(
            "Server: {}:{}",
            self.server.host, self.server.port
        );
        info!(
            "Scorer: {} (field '{}', timeout {}s, secret {})",
            sanitize_for_logging(&self.scorer.url),
            self.scorer.field,
            self.scorer.timeout_secs,
            mask_secret(&self.scorer.secret)
        );
        info!(
            "Policy: allow < {:.2} <= review < {:.2} <= remove, mute at {} offense(s) for {} day(s)",
            self.policy.threshold_low,
            self.policy.threshold_high,
            self.policy.repeat_offense_limit,
            self.policy.mute_days
        );
        info!(
            "Cache: ttl {}s, capacity {}",
            self.cache.ttl_secs, self.cache.capacity
        );
        if self.database.postgres_enabled {
            info!(
                "Store: PostgreSQL at {}",
                sanitize_for_logging(&self.database.postgres_url)
            );
        } else {
            info!("Store: in-memory (state is lost on restart)");
        }
        info!("API keys configured: {}", self.api.api_keys.len());
    }
}

/// Mask a secret value, keeping just enough to tell keys apart
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    match chars.len() {
        0 => "<unset>".to_string(),
        n if n <= 8 => "***".to_string(),
        n => format!(
            "{}***{}",
            chars[..2].iter().collect::<String>(),
            chars[n - 2..].iter().collect::<String>()
        ),
    }
}

/// Strip credentials and query strings from URLs before they reach the logs
pub fn sanitize_for_logging(data: &str) -> String {
    let Ok(mut url) = Url::parse(data) else {
        return data.to_string();
    };

    if url.password().is_some() {
        let _ = url.set_password(Some("***"));
    }
    if url.query().is_some() {
        url.set_query(Some("***"));
    }

    url.to_string()
}
