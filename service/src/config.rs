use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use serde_aux::prelude::deserialize_option_number_from_string;

/// Application configuration loaded from multiple sources.
///
/// Configuration is loaded in priority order (lowest to highest):
/// 1. Struct defaults
/// 2. config.yaml file (if exists)
/// 3. Environment variables with EC_ prefix (always wins)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub swagger: SwaggerConfig,
    #[serde(default)]
    pub congress_api: CongressApiConfig,
    #[serde(default)]
    pub geocoder: GeocoderConfig,
    #[serde(default)]
    pub form_fill: FormFillConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database host.
    #[serde(default = "default_db_host")]
    pub host: String,

    /// Database port.
    #[serde(default = "default_db_port")]
    pub port: u16,

    /// Database name.
    #[serde(default = "default_db_name")]
    pub name: String,

    /// Database user (required, no compiled-in default).
    #[serde(default)]
    pub user: String,

    /// Database password (required, no compiled-in default).
    #[serde(default)]
    pub password: String,

    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Optional custom migrations directory path.
    pub migrations_dir: Option<String>,
}

impl DatabaseConfig {
    /// Assemble a `PostgreSQL` connection URL from individual fields.
    #[must_use]
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.name
        )
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// HTTP server port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// HTTP server bind address.
    #[serde(default = "default_host")]
    pub host: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level filter (debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SwaggerConfig {
    /// Enable Swagger UI at /swagger-ui.
    /// Enable in development via `EC_SWAGGER__ENABLED=true`
    #[serde(default)]
    pub enabled: bool,
}

/// District lookup service (zip and coordinate queries).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CongressApiConfig {
    #[serde(default = "default_congress_base_url")]
    pub base_url: String,

    /// Sent as `X-API-Key`.
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_congress_timeout_secs")]
    pub timeout_secs: u64,
}

impl CongressApiConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for CongressApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_congress_base_url(),
            api_key: String::new(),
            timeout_secs: default_congress_timeout_secs(),
        }
    }
}

/// Geocoding service used by the address resolver.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeocoderConfig {
    #[serde(default = "default_geocode_url")]
    pub geocode_url: String,

    #[serde(default = "default_reverse_geocode_url")]
    pub reverse_geocode_url: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_geocoder_version")]
    pub version: String,

    /// Hard request timeout; a slow geocoder is a failed geocode.
    #[serde(default = "default_geocoder_timeout_ms")]
    pub timeout_ms: u64,
}

impl GeocoderConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            geocode_url: default_geocode_url(),
            reverse_geocode_url: default_reverse_geocode_url(),
            api_key: String::new(),
            version: default_geocoder_version(),
            timeout_ms: default_geocoder_timeout_ms(),
        }
    }
}

/// Third-party web form filling service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FormFillConfig {
    #[serde(default = "default_form_fill_base_url")]
    pub base_url: String,

    #[serde(default = "default_discover_path")]
    pub discover_path: String,

    #[serde(default = "default_submit_path")]
    pub submit_path: String,

    #[serde(default = "default_form_fill_timeout_secs")]
    pub timeout_secs: u64,

    /// Attach the message's email uid as `campaign_tag` on submissions.
    #[serde(default)]
    pub send_campaign_tag: bool,
}

impl FormFillConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for FormFillConfig {
    fn default() -> Self {
        Self {
            base_url: default_form_fill_base_url(),
            discover_path: default_discover_path(),
            submit_path: default_submit_path(),
            timeout_secs: default_form_fill_timeout_secs(),
            send_campaign_tag: false,
        }
    }
}

/// Inbound address handling.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmailConfig {
    /// Address that stands for "all of my legislators".
    #[serde(default = "default_catch_all")]
    pub catch_all: String,

    /// Domain constituents write to.
    #[serde(default = "default_public_domain")]
    pub public_domain: String,

    /// Domain legislator addresses are stored under.
    #[serde(default = "default_legislator_domain")]
    pub legislator_domain: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            catch_all: default_catch_all(),
            public_domain: default_public_domain(),
            legislator_domain: default_legislator_domain(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Trailing window length in hours.
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u32,

    /// Messages allowed inside the window before sends are blocked.
    #[serde(default = "default_max_per_interval")]
    pub max_per_interval: u32,
}

impl RateLimitConfig {
    #[must_use]
    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.interval_hours))
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            interval_hours: default_interval_hours(),
            max_per_interval: default_max_per_interval(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct DeliveryConfig {
    /// Attempts per message, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Messages delivered in parallel by one worker.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// How long an attempt may hold a message before another worker may claim it.
    #[serde(default = "default_lease_secs")]
    pub lease_secs: u64,

    /// When false the worker logs queued messages instead of submitting them.
    #[serde(default = "default_true")]
    pub submit_messages: bool,

    /// How often queued messages with a free lease are re-enqueued.
    #[serde(default = "default_recovery_interval_secs")]
    pub recovery_interval_secs: u64,
}

impl DeliveryConfig {
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    #[must_use]
    pub const fn lease(&self) -> Duration {
        Duration::from_secs(self.lease_secs)
    }

    #[must_use]
    pub const fn recovery_interval(&self) -> Duration {
        Duration::from_secs(self.recovery_interval_secs)
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            max_concurrent: default_max_concurrent(),
            lease_secs: default_lease_secs(),
            submit_messages: default_true(),
            recovery_interval_secs: default_recovery_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NotificationsConfig {
    /// POST notification events here as JSON. Events are only logged when unset.
    #[serde(default)]
    pub webhook_url: Option<String>,

    #[serde(default, deserialize_with = "deserialize_option_number_from_string")]
    pub webhook_timeout_secs: Option<u64>,
}

// These functions cannot be const because serde uses function pointers for defaults
#[allow(clippy::missing_const_for_fn)]
fn default_max_connections() -> u32 {
    10
}

#[allow(clippy::missing_const_for_fn)]
fn default_port() -> u16 {
    8080
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_db_host() -> String {
    "localhost".to_string()
}

#[allow(clippy::missing_const_for_fn)]
fn default_db_port() -> u16 {
    5432
}

fn default_db_name() -> String {
    "emailcongress".to_string()
}

fn default_congress_base_url() -> String {
    "https://congress.api.sunlightfoundation.com".to_string()
}

#[allow(clippy::missing_const_for_fn)]
fn default_congress_timeout_secs() -> u64 {
    10
}

fn default_geocode_url() -> String {
    "https://geoservices.tamu.edu/Services/Geocode/WebService/GeocoderWebServiceHttpNonParsed_V04_01.aspx".to_string()
}

fn default_reverse_geocode_url() -> String {
    "https://geoservices.tamu.edu/Services/ReverseGeocoding/WebService/v04_01/HTTP/default.aspx"
        .to_string()
}

fn default_geocoder_version() -> String {
    "4.01".to_string()
}

#[allow(clippy::missing_const_for_fn)]
fn default_geocoder_timeout_ms() -> u64 {
    4_000
}

fn default_form_fill_base_url() -> String {
    "http://localhost:9292".to_string()
}

fn default_discover_path() -> String {
    "discover-form-elements".to_string()
}

fn default_submit_path() -> String {
    "fill-out-form".to_string()
}

#[allow(clippy::missing_const_for_fn)]
fn default_form_fill_timeout_secs() -> u64 {
    30
}

fn default_catch_all() -> String {
    "myreps@emailcongress.us".to_string()
}

fn default_public_domain() -> String {
    "emailcongress.us".to_string()
}

fn default_legislator_domain() -> String {
    "opencongress.org".to_string()
}

#[allow(clippy::missing_const_for_fn)]
fn default_interval_hours() -> u32 {
    24
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_per_interval() -> u32 {
    5
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_attempts() -> u32 {
    5
}

#[allow(clippy::missing_const_for_fn)]
fn default_retry_delay_ms() -> u64 {
    60_000
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_concurrent() -> usize {
    8
}

#[allow(clippy::missing_const_for_fn)]
fn default_lease_secs() -> u64 {
    300
}

#[allow(clippy::missing_const_for_fn)]
fn default_recovery_interval_secs() -> u64 {
    300
}

#[allow(clippy::missing_const_for_fn)]
fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                host: default_db_host(),
                port: default_db_port(),
                name: default_db_name(),
                user: String::new(),
                password: String::new(),
                max_connections: default_max_connections(),
                migrations_dir: None,
            },
            server: ServerConfig {
                port: default_port(),
                host: default_host(),
            },
            logging: LoggingConfig {
                level: default_log_level(),
            },
            swagger: SwaggerConfig::default(),
            congress_api: CongressApiConfig::default(),
            geocoder: GeocoderConfig::default(),
            form_fill: FormFillConfig::default(),
            email: EmailConfig::default(),
            rate_limit: RateLimitConfig::default(),
            delivery: DeliveryConfig::default(),
            notifications: NotificationsConfig::default(),
        }
    }
}

/// Configuration loading and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Figment(#[from] Box<figment::Error>),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Sources are merged in priority order:
    /// 1. Struct defaults (lowest)
    /// 2. config.yaml file (if exists)
    /// 3. Environment variables with EC_ prefix (highest)
    ///
    /// # Errors
    /// Returns an error if configuration cannot be loaded or is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config.yaml")
    }

    /// Load configuration with a custom YAML file path.
    ///
    /// # Errors
    /// Returns an error if configuration cannot be loaded or is invalid.
    pub fn load_from(yaml_path: &str) -> Result<Self, ConfigError> {
        let config: Self = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Yaml::file(yaml_path))
            .merge(Env::prefixed("EC_").split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.user.is_empty() {
            return Err(ConfigError::Validation(
                "database.user is required. Set EC_DATABASE__USER environment variable or configure in config.yaml.".into(),
            ));
        }

        if self.database.password.is_empty() {
            return Err(ConfigError::Validation(
                "database.password is required. Set EC_DATABASE__PASSWORD environment variable or configure in config.yaml.".into(),
            ));
        }

        if self.database.port == 0 {
            return Err(ConfigError::Validation(
                "database.port cannot be 0".into(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigError::Validation("server.port cannot be 0".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Validation(
                "database.max_connections cannot be 0".into(),
            ));
        }

        for (key, url) in [
            ("congress_api.base_url", &self.congress_api.base_url),
            ("geocoder.geocode_url", &self.geocoder.geocode_url),
            (
                "geocoder.reverse_geocode_url",
                &self.geocoder.reverse_geocode_url,
            ),
            ("form_fill.base_url", &self.form_fill.base_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::Validation(format!(
                    "{key} must start with http:// or https://, got: '{url}'"
                )));
            }
        }

        if self.geocoder.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "geocoder.timeout_ms cannot be 0".into(),
            ));
        }

        if !self.email.catch_all.contains('@') {
            return Err(ConfigError::Validation(format!(
                "email.catch_all must be an email address, got: '{}'",
                self.email.catch_all
            )));
        }

        if self.rate_limit.interval_hours == 0 {
            return Err(ConfigError::Validation(
                "rate_limit.interval_hours cannot be 0".into(),
            ));
        }

        if self.delivery.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "delivery.max_attempts must be at least 1".into(),
            ));
        }

        if self.delivery.max_concurrent == 0 {
            return Err(ConfigError::Validation(
                "delivery.max_concurrent cannot be 0".into(),
            ));
        }

        if self.delivery.lease_secs == 0 {
            return Err(ConfigError::Validation(
                "delivery.lease_secs cannot be 0".into(),
            ));
        }

        // An attempt waits on one round of concurrent form submissions.
        let attempt_bound = self.form_fill.timeout_secs.saturating_mul(2);
        if self.delivery.lease_secs <= attempt_bound {
            return Err(ConfigError::Validation(format!(
                "delivery.lease_secs ({}) must exceed twice form_fill.timeout_secs ({})",
                self.delivery.lease_secs, self.form_fill.timeout_secs
            )));
        }

        if self.delivery.recovery_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "delivery.recovery_interval_secs cannot be 0".into(),
            ));
        }

        Ok(())
    }
}
