use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Top-level config (certwatch.toml + CERTWATCH_* env overrides).
///
/// Env vars use `__` between nesting levels because key names themselves
/// contain underscores, e.g. `CERTWATCH_CERTIFICATE__RENEWAL_WINDOW_DAYS=14`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CertwatchConfig {
    #[serde(default)]
    pub certificate: CertificateConfig,
    #[serde(default)]
    pub dns: DnsConfig,
    #[serde(default)]
    pub acme: AcmeConfig,
    #[serde(default)]
    pub deploy: DeployConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub notifiers: NotifiersConfig,
}

/// What to renew and when.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateConfig {
    /// Base domain; the tool always requests `domain` plus `*.domain`.
    /// A leading `*.` is stripped on load.
    pub domain: Option<String>,
    /// Which acme.sh DNS plugin performs the DNS-01 challenge.
    pub dns_api: Option<DnsApi>,
    /// ACME account contact email.
    pub acme_email: Option<String>,
    /// Renew once fewer than this many days of validity remain.
    #[serde(default = "default_renewal_window_days")]
    pub renewal_window_days: i64,
    /// Normal cadence for re-checking when no renewal is due.
    #[serde(default = "default_check_interval_days")]
    pub check_interval_days: i64,
    /// Directory the issued certificate files are installed into.
    #[serde(default = "default_output_path")]
    pub output_path: String,
    #[serde(default = "default_key_filename")]
    pub key_filename: String,
    #[serde(default = "default_fullchain_filename")]
    pub fullchain_filename: String,
    #[serde(default = "default_cert_filename")]
    pub cert_filename: String,
    #[serde(default = "default_ca_filename")]
    pub ca_filename: String,
}

impl Default for CertificateConfig {
    fn default() -> Self {
        Self {
            domain: None,
            dns_api: None,
            acme_email: None,
            renewal_window_days: default_renewal_window_days(),
            check_interval_days: default_check_interval_days(),
            output_path: default_output_path(),
            key_filename: default_key_filename(),
            fullchain_filename: default_fullchain_filename(),
            cert_filename: default_cert_filename(),
            ca_filename: default_ca_filename(),
        }
    }
}

/// Supported acme.sh DNS plugins.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DnsApi {
    /// DNSPod.
    DnsDp,
    /// Aliyun DNS.
    DnsAli,
    /// Cloudflare (global API key).
    DnsCf,
}

impl DnsApi {
    /// The acme.sh plugin name passed to `--dns`.
    pub fn as_str(&self) -> &'static str {
        match self {
            DnsApi::DnsDp => "dns_dp",
            DnsApi::DnsAli => "dns_ali",
            DnsApi::DnsCf => "dns_cf",
        }
    }
}

impl std::fmt::Display for DnsApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DnsApi {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "dns_dp" => Ok(DnsApi::DnsDp),
            "dns_ali" => Ok(DnsApi::DnsAli),
            "dns_cf" => Ok(DnsApi::DnsCf),
            other => Err(format!("unsupported dns_api: {other}")),
        }
    }
}

/// DNS provider API credentials, injected into the tool's environment.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DnsConfig {
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
}

/// How the external issuance tool is invoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcmeConfig {
    /// Path to the acme.sh entry point.
    #[serde(default = "default_acme_command")]
    pub command: String,
    /// CA shortname passed to `--server`.
    #[serde(default = "default_acme_server")]
    pub server: String,
    #[serde(default = "default_key_length")]
    pub key_length: String,
    /// Hard wall-clock limit per tool invocation; the child is killed after it.
    #[serde(default = "default_acme_timeout_secs")]
    pub timeout_secs: u64,
    /// Substrings (matched case-insensitively against combined tool output)
    /// that mark a failure as rate limiting rather than a terminal error.
    #[serde(default = "default_rate_limit_markers")]
    pub rate_limit_markers: Vec<String>,
}

impl Default for AcmeConfig {
    fn default() -> Self {
        Self {
            command: default_acme_command(),
            server: default_acme_server(),
            key_length: default_key_length(),
            timeout_secs: default_acme_timeout_secs(),
            rate_limit_markers: default_rate_limit_markers(),
        }
    }
}

/// Optional NAS deployment via the tool's synology_dsm hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    #[serde(default)]
    pub enabled: bool,
    pub hostname: Option<String>,
    #[serde(default = "default_deploy_port")]
    pub port: u16,
    #[serde(default = "default_deploy_scheme")]
    pub scheme: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Certificate description shown in DSM; empty selects the default slot.
    #[serde(default)]
    pub certificate_name: String,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            hostname: None,
            port: default_deploy_port(),
            scheme: default_deploy_scheme(),
            username: None,
            password: None,
            certificate_name: String::new(),
        }
    }
}

/// Scheduler loop tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Where the scheduler persists its state between runs.
    #[serde(default = "default_state_path")]
    pub state_path: String,
    /// TLS probe timeout.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// Retry delay after a rate-limited (transient) issuance failure.
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
            probe_timeout_secs: default_probe_timeout_secs(),
            retry_backoff_secs: default_retry_backoff_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NotifiersConfig {
    pub wecom: Option<WeComConfig>,
    pub webhook: Option<WebhookConfig>,
}

/// WeCom (企业微信) group-robot webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeComConfig {
    pub webhook_url: String,
}

/// Generic JSON webhook receiver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
}

fn default_renewal_window_days() -> i64 {
    30
}
fn default_check_interval_days() -> i64 {
    30
}
fn default_output_path() -> String {
    "/output".to_string()
}
fn default_key_filename() -> String {
    "privkey.pem".to_string()
}
fn default_fullchain_filename() -> String {
    "fullchain.pem".to_string()
}
fn default_cert_filename() -> String {
    "cert.pem".to_string()
}
fn default_ca_filename() -> String {
    "ca.pem".to_string()
}
fn default_acme_command() -> String {
    "/root/.acme.sh/acme.sh".to_string()
}
fn default_acme_server() -> String {
    "letsencrypt".to_string()
}
fn default_key_length() -> String {
    "ec-256".to_string()
}
fn default_acme_timeout_secs() -> u64 {
    300
}
fn default_rate_limit_markers() -> Vec<String> {
    vec![
        "ratelimited".to_string(),
        "rate limit".to_string(),
        "too many certificates".to_string(),
    ]
}
fn default_deploy_port() -> u16 {
    5001
}
fn default_deploy_scheme() -> String {
    "https".to_string()
}
fn default_probe_timeout_secs() -> u64 {
    10
}
fn default_retry_backoff_secs() -> u64 {
    3600
}
fn default_state_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.certwatch/state.json", home)
}

impl CertwatchConfig {
    /// Load config from a TOML file with CERTWATCH_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.certwatch/certwatch.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let mut config: CertwatchConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("CERTWATCH_").split("__"))
            .extract()
            .map_err(|e| crate::error::CertwatchError::Config(e.to_string()))?;

        if let Some(domain) = config.certificate.domain.take() {
            config.certificate.domain = Some(normalize_domain(&domain));
        }

        Ok(config)
    }

    /// Check that every setting required to issue a certificate is present.
    ///
    /// Collects all missing keys into a single error so the operator can fix
    /// them in one pass.
    pub fn validate(&self) -> crate::error::Result<()> {
        let mut missing: Vec<&str> = Vec::new();

        if is_blank(&self.certificate.domain) {
            missing.push("certificate.domain");
        }
        if self.certificate.dns_api.is_none() {
            missing.push("certificate.dns_api");
        }
        if is_blank(&self.certificate.acme_email) {
            missing.push("certificate.acme_email");
        }
        if is_blank(&self.dns.api_key) {
            missing.push("dns.api_key");
        }
        if is_blank(&self.dns.api_secret) {
            missing.push("dns.api_secret");
        }
        if self.deploy.enabled {
            if is_blank(&self.deploy.hostname) {
                missing.push("deploy.hostname");
            }
            if is_blank(&self.deploy.username) {
                missing.push("deploy.username");
            }
            if is_blank(&self.deploy.password) {
                missing.push("deploy.password");
            }
        }

        if !missing.is_empty() {
            return Err(crate::error::CertwatchError::Config(format!(
                "missing required settings: {}",
                missing.join(", ")
            )));
        }

        if self.certificate.renewal_window_days < 1 {
            return Err(crate::error::CertwatchError::Config(
                "certificate.renewal_window_days must be at least 1".to_string(),
            ));
        }
        if self.certificate.check_interval_days < 1 {
            return Err(crate::error::CertwatchError::Config(
                "certificate.check_interval_days must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// The validated base domain. Empty until [`validate`](Self::validate) passes.
    pub fn domain(&self) -> &str {
        self.certificate.domain.as_deref().unwrap_or("")
    }
}

/// Strip a leading wildcard label; the wildcard is implied everywhere else.
fn normalize_domain(domain: &str) -> String {
    match domain.strip_prefix("*.") {
        Some(base) => {
            warn!(input = %domain, base = %base, "wildcard prefix stripped from configured domain");
            base.to_string()
        }
        None => domain.to_string(),
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.certwatch/certwatch.toml", home)
}
