//! Configuration loaded from environment variables.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Pipeline configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Number-rental provider configuration
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Registration target configuration
    #[serde(default)]
    pub target: TargetConfig,

    /// Runtime behaviour
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Record store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Pacing between items and rounds
    #[serde(default)]
    pub pacing: PacingConfig,

    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Provider API key
    #[serde(default)]
    pub api_key: Option<SecretString>,

    /// Provider API base URL
    #[serde(default = "default_provider_url")]
    pub base_url: String,

    /// Country identifier for number orders
    #[serde(default = "default_country")]
    pub country: String,

    /// Service identifier for number orders
    #[serde(default = "default_service")]
    pub service: String,

    /// Operator identifier for number orders
    #[serde(default = "default_operator")]
    pub operator: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    /// Login page of the registration target
    #[serde(default = "default_login_url")]
    pub login_url: String,

    /// Default account password, used for signup and login
    #[serde(default)]
    pub password: Option<SecretString>,

    /// Full name submitted at signup
    #[serde(default = "default_full_name")]
    pub full_name: String,

    /// PIN submitted at signup
    #[serde(default = "default_pin")]
    pub pin: SecretString,

    /// Security answer submitted at signup
    #[serde(default = "default_security_answer")]
    pub security_answer: String,

    /// Domain for generated email addresses
    #[serde(default = "default_email_domain")]
    pub email_domain: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    /// How long a record may wait for its OTP before expiring
    #[serde(default = "default_expire_after", with = "humantime_serde")]
    pub expire_after: Duration,

    /// Run browser-backed gateways without a window
    #[serde(default = "default_true")]
    pub headless: bool,

    /// Slow-motion delay for browser-backed gateways
    #[serde(default, with = "humantime_serde")]
    pub slow_mo: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Path to the JSON record file
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// Enable persistence (if false, records are in-memory only)
    #[serde(default = "default_true")]
    pub persist: bool,

    /// Directory for batch-login cohort snapshots
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,
}

/// Fixed delays between items and rounds of each workflow.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PacingConfig {
    #[serde(default = "default_one_second", with = "humantime_serde")]
    pub create_delay: Duration,

    #[serde(default = "default_one_second", with = "humantime_serde")]
    pub send_otp_delay: Duration,

    #[serde(default = "default_check_otp_delay", with = "humantime_serde")]
    pub check_otp_delay: Duration,

    /// Item delay inside OTP retry rounds
    #[serde(default = "default_retry_item_delay", with = "humantime_serde")]
    pub retry_item_delay: Duration,

    #[serde(default = "default_otp_round_interval", with = "humantime_serde")]
    pub otp_round_interval: Duration,

    #[serde(default = "default_otp_rounds")]
    pub otp_rounds: u32,

    #[serde(default = "default_one_second", with = "humantime_serde")]
    pub login_item_delay: Duration,

    /// Pause before each batch-login retry round
    #[serde(default = "default_login_retry_pause", with = "humantime_serde")]
    pub login_retry_pause: Duration,

    /// Retry rounds after the first batch-login pass
    #[serde(default = "default_login_retry_rounds")]
    pub login_retry_rounds: u32,

    /// Auto-complete wait between create and send-otp
    #[serde(default = "default_after_create_wait", with = "humantime_serde")]
    pub after_create_wait: Duration,

    /// Auto-complete wait between send-otp and the OTP retry loop
    #[serde(default = "default_after_send_wait", with = "humantime_serde")]
    pub after_send_wait: Duration,
}

impl PacingConfig {
    /// Same round structure with every delay set to zero.
    pub fn immediate() -> Self {
        Self {
            create_delay: Duration::ZERO,
            send_otp_delay: Duration::ZERO,
            check_otp_delay: Duration::ZERO,
            retry_item_delay: Duration::ZERO,
            otp_round_interval: Duration::ZERO,
            login_item_delay: Duration::ZERO,
            login_retry_pause: Duration::ZERO,
            after_create_wait: Duration::ZERO,
            after_send_wait: Duration::ZERO,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default implementations
impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_provider_url(),
            country: default_country(),
            service: default_service(),
            operator: default_operator(),
        }
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            login_url: default_login_url(),
            password: None,
            full_name: default_full_name(),
            pin: default_pin(),
            security_answer: default_security_answer(),
            email_domain: default_email_domain(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            expire_after: default_expire_after(),
            headless: true,
            slow_mo: Duration::ZERO,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            persist: true,
            export_dir: default_export_dir(),
        }
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            create_delay: default_one_second(),
            send_otp_delay: default_one_second(),
            check_otp_delay: default_check_otp_delay(),
            retry_item_delay: default_retry_item_delay(),
            otp_round_interval: default_otp_round_interval(),
            otp_rounds: default_otp_rounds(),
            login_item_delay: default_one_second(),
            login_retry_pause: default_login_retry_pause(),
            login_retry_rounds: default_login_retry_rounds(),
            after_create_wait: default_after_create_wait(),
            after_send_wait: default_after_send_wait(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default value functions
fn default_provider_url() -> String {
    "http://localhost:8090".into()
}

fn default_country() -> String {
    "6".into()
}

fn default_service() -> String {
    "default".into()
}

fn default_operator() -> String {
    "any".into()
}

fn default_login_url() -> String {
    "http://localhost:3000/login".into()
}

fn default_full_name() -> String {
    "Test Account".into()
}

fn default_pin() -> SecretString {
    SecretString::new("000000".into())
}

fn default_security_answer() -> String {
    "000000".into()
}

fn default_email_domain() -> String {
    "example.com".into()
}

fn default_expire_after() -> Duration {
    record_store::DEFAULT_EXPIRY
}

fn default_store_path() -> PathBuf {
    PathBuf::from("records.json")
}

fn default_export_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_one_second() -> Duration {
    Duration::from_secs(1)
}

fn default_check_otp_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_retry_item_delay() -> Duration {
    Duration::from_millis(300)
}

fn default_otp_round_interval() -> Duration {
    Duration::from_secs(20)
}

fn default_otp_rounds() -> u32 {
    5
}

fn default_login_retry_pause() -> Duration {
    Duration::from_secs(5)
}

fn default_login_retry_rounds() -> u32 {
    2
}

fn default_after_create_wait() -> Duration {
    Duration::from_secs(5)
}

fn default_after_send_wait() -> Duration {
    Duration::from_secs(10)
}

fn default_log_level() -> String {
    "info".into()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    // Phone numbers and PINs must stay strings.
                    .try_parsing(false),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}
