use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use certwatch_core::{CertwatchConfig, DnsApi};
use certwatch_probe::not_after_from_pem;
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::classify::{failure_kind, FailureKind};
use crate::error::Result;
use crate::runner::{self, CommandOutput};

/// What came of one issuance attempt.
#[derive(Debug, Clone)]
pub enum IssueOutcome {
    /// Certificate issued and installed. `new_expiry` is read back from the
    /// installed fullchain file; `deploy_warning` is set when the optional
    /// deploy step failed afterwards.
    Issued {
        new_expiry: Option<DateTime<Utc>>,
        deploy_warning: Option<String>,
    },
    /// The CA refused with a rate-limit response.
    RateLimited { detail: String },
    /// Any other failure, including timeouts and a missing acme.sh.
    Failed { detail: String },
}

/// Certificate issuance.
#[async_trait]
pub trait CertIssuer: Send + Sync {
    /// Issue (or renew) the wildcard pair for `domain`, install the files and
    /// deploy them where configured.
    ///
    /// Never fails upward: every problem is folded into the outcome.
    async fn issue_and_deploy(&self, domain: &str) -> IssueOutcome;
}

/// Drives the `acme.sh` client: prepare, issue via DNS-01, install, then
/// optionally deploy to a Synology NAS.
pub struct AcmeShIssuer {
    config: Arc<CertwatchConfig>,
}

impl AcmeShIssuer {
    pub fn new(config: Arc<CertwatchConfig>) -> Self {
        Self { config }
    }

    fn limit(&self) -> Duration {
        Duration::from_secs(self.config.acme.timeout_secs)
    }

    fn output_file(&self, name: &str) -> PathBuf {
        Path::new(&self.config.certificate.output_path).join(name)
    }

    /// Environment variables acme.sh expects for the configured DNS provider.
    fn dns_credentials(&self) -> Vec<(String, String)> {
        let key = self.config.dns.api_key.clone().unwrap_or_default();
        let secret = self.config.dns.api_secret.clone().unwrap_or_default();
        match self.config.certificate.dns_api {
            Some(DnsApi::DnsDp) => vec![("DP_Id".into(), key), ("DP_Key".into(), secret)],
            Some(DnsApi::DnsAli) => vec![("Ali_Key".into(), key), ("Ali_Secret".into(), secret)],
            Some(DnsApi::DnsCf) => vec![("CF_Key".into(), key), ("CF_Email".into(), secret)],
            None => Vec::new(),
        }
    }

    fn deploy_credentials(&self) -> Vec<(String, String)> {
        let deploy = &self.config.deploy;
        vec![
            ("SYNO_Scheme".into(), deploy.scheme.clone()),
            ("SYNO_Hostname".into(), deploy.hostname.clone().unwrap_or_default()),
            ("SYNO_Port".into(), deploy.port.to_string()),
            ("SYNO_Username".into(), deploy.username.clone().unwrap_or_default()),
            ("SYNO_Password".into(), deploy.password.clone().unwrap_or_default()),
            ("SYNO_Certificate".into(), deploy.certificate_name.clone()),
        ]
    }

    async fn run_step(&self, args: Vec<String>, envs: Vec<(String, String)>) -> Result<CommandOutput> {
        runner::run(&self.config.acme.command, &args, &envs, self.limit()).await
    }

    /// One-time client setup. Safe to repeat; failures are logged and the
    /// issue step proceeds anyway.
    async fn prepare(&self) {
        let mut steps = vec![
            (
                "set default CA",
                strings(&["--set-default-ca", "--server", &self.config.acme.server]),
            ),
            (
                "set renew days",
                strings(&[
                    "--set-renew-days",
                    &self.config.certificate.renewal_window_days.to_string(),
                ]),
            ),
        ];
        if let Some(email) = &self.config.certificate.acme_email {
            steps.insert(
                1,
                (
                    "register account",
                    strings(&["--register-account", "-m", email]),
                ),
            );
        }

        for (step, args) in steps {
            match self.run_step(args, Vec::new()).await {
                Ok(out) if out.success() => {}
                Ok(out) => warn!(step, detail = %out.error_excerpt(), "acme.sh setup step failed"),
                Err(e) => warn!(step, error = %e, "acme.sh setup step failed"),
            }
        }
    }

    async fn run_issue(&self, domain: &str) -> Result<CommandOutput> {
        let wildcard = format!("*.{domain}");
        let args = strings(&[
            "--issue",
            "--dns",
            self.config
                .certificate
                .dns_api
                .map(|api| api.as_str())
                .unwrap_or_default(),
            "-d",
            domain,
            "-d",
            &wildcard,
            "--keylength",
            &self.config.acme.key_length,
            "--server",
            &self.config.acme.server,
            "--log",
        ]);
        self.run_step(args, self.dns_credentials()).await
    }

    async fn run_install(&self, domain: &str) -> Result<CommandOutput> {
        let cert = &self.config.certificate;
        tokio::fs::create_dir_all(&cert.output_path).await?;

        let args = strings(&[
            "--install-cert",
            "-d",
            domain,
            "--ecc",
            "--key-file",
            &self.output_file(&cert.key_filename).to_string_lossy(),
            "--fullchain-file",
            &self.output_file(&cert.fullchain_filename).to_string_lossy(),
            "--cert-file",
            &self.output_file(&cert.cert_filename).to_string_lossy(),
            "--ca-file",
            &self.output_file(&cert.ca_filename).to_string_lossy(),
        ]);
        self.run_step(args, Vec::new()).await
    }

    async fn run_deploy(&self, domain: &str) -> Result<CommandOutput> {
        let args = strings(&[
            "--deploy",
            "-d",
            domain,
            "--ecc",
            "--deploy-hook",
            "synology_dsm",
        ]);
        self.run_step(args, self.deploy_credentials()).await
    }

    /// `notAfter` of the freshly installed fullchain. The live endpoint still
    /// serves the old certificate at this point, so the file is the only
    /// truthful source.
    async fn read_installed_expiry(&self) -> Option<DateTime<Utc>> {
        let path = self.output_file(&self.config.certificate.fullchain_filename);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "installed certificate not readable");
                return None;
            }
        };
        match not_after_from_pem(&bytes) {
            Ok(not_after) => Some(not_after),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "installed certificate not parseable");
                None
            }
        }
    }
}

#[async_trait]
impl CertIssuer for AcmeShIssuer {
    async fn issue_and_deploy(&self, domain: &str) -> IssueOutcome {
        info!(%domain, "requesting wildcard certificate");
        self.prepare().await;

        let issued = match self.run_issue(domain).await {
            Ok(out) => out,
            Err(e) => {
                error!(%domain, error = %e, "certificate issue step could not run");
                return IssueOutcome::Failed {
                    detail: e.to_string(),
                };
            }
        };
        if !issued.success() {
            let detail = issued.error_excerpt();
            return match failure_kind(&issued.combined(), &self.config.acme.rate_limit_markers) {
                FailureKind::RateLimited => {
                    error!(%domain, "CA rate limit hit");
                    IssueOutcome::RateLimited { detail }
                }
                FailureKind::Other => {
                    error!(%domain, code = ?issued.code, "certificate issue failed");
                    IssueOutcome::Failed { detail }
                }
            };
        }
        info!(%domain, "certificate issued");

        let installed = match self.run_install(domain).await {
            Ok(out) => out,
            Err(e) => {
                error!(%domain, error = %e, "certificate install step could not run");
                return IssueOutcome::Failed {
                    detail: format!("certificate install failed: {e}"),
                };
            }
        };
        if !installed.success() {
            error!(%domain, code = ?installed.code, "certificate install failed");
            return IssueOutcome::Failed {
                detail: format!("certificate install failed: {}", installed.error_excerpt()),
            };
        }
        info!(%domain, path = %self.config.certificate.output_path, "certificate files installed");

        let new_expiry = self.read_installed_expiry().await;

        let deploy_warning = if self.config.deploy.enabled {
            match self.run_deploy(domain).await {
                Ok(out) if out.success() => {
                    info!(%domain, "certificate deployed to NAS");
                    None
                }
                Ok(out) => {
                    warn!(%domain, code = ?out.code, "certificate deploy failed after successful issue");
                    Some(out.error_excerpt())
                }
                Err(e) => {
                    warn!(%domain, error = %e, "certificate deploy step could not run");
                    Some(e.to_string())
                }
            }
        } else {
            None
        };

        IssueOutcome::Issued {
            new_expiry,
            deploy_warning,
        }
    }
}

fn strings(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// Installs `body` as an executable fake acme.sh and returns its path.
    fn fake_acme(dir: &TempDir, body: &str) -> String {
        let path = dir.path().join("acme.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn test_config(command: String, output_dir: &Path) -> Arc<CertwatchConfig> {
        let mut config = CertwatchConfig::default();
        config.certificate.domain = Some("example.com".to_string());
        config.certificate.dns_api = Some(DnsApi::DnsDp);
        config.certificate.acme_email = Some("ops@example.com".to_string());
        config.certificate.output_path = output_dir.to_string_lossy().into_owned();
        config.dns.api_key = Some("id-123".to_string());
        config.dns.api_secret = Some("key-456".to_string());
        config.acme.command = command;
        config.acme.timeout_secs = 5;
        Arc::new(config)
    }

    /// Writes a fullchain file expiring at midnight UTC on the given date.
    fn install_fullchain(config: &CertwatchConfig, year: i32, month: u8, day: u8) {
        use rcgen::{date_time_ymd, CertificateParams, KeyPair};

        let key_pair = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(vec!["example.com".to_string()]).unwrap();
        params.not_before = date_time_ymd(2024, 1, 1);
        params.not_after = date_time_ymd(year, month, day);
        let cert = params.self_signed(&key_pair).unwrap();

        let path = Path::new(&config.certificate.output_path)
            .join(&config.certificate.fullchain_filename);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, cert.pem()).unwrap();
    }

    #[tokio::test]
    async fn successful_issue_reports_installed_expiry() {
        let dir = TempDir::new().unwrap();
        let command = fake_acme(&dir, "exit 0");
        let config = test_config(command, &dir.path().join("out"));
        install_fullchain(&config, 2031, 3, 20);

        let outcome = AcmeShIssuer::new(config).issue_and_deploy("example.com").await;
        match outcome {
            IssueOutcome::Issued {
                new_expiry,
                deploy_warning,
            } => {
                assert_eq!(
                    new_expiry,
                    Some(Utc.with_ymd_and_hms(2031, 3, 20, 0, 0, 0).unwrap())
                );
                assert!(deploy_warning.is_none());
            }
            other => panic!("expected Issued, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn dns_credentials_reach_the_child_environment() {
        let dir = TempDir::new().unwrap();
        let command = fake_acme(
            &dir,
            r#"case "$*" in
  *--issue*)
    [ "$DP_Id" = "id-123" ] && [ "$DP_Key" = "key-456" ] && exit 0
    echo "credentials missing" >&2
    exit 1 ;;
  *) exit 0 ;;
esac"#,
        );
        let config = test_config(command, &dir.path().join("out"));
        install_fullchain(&config, 2030, 1, 1);

        let outcome = AcmeShIssuer::new(config).issue_and_deploy("example.com").await;
        assert!(matches!(outcome, IssueOutcome::Issued { .. }), "{outcome:?}");
    }

    #[tokio::test]
    async fn rate_limited_output_is_classified_transient() {
        let dir = TempDir::new().unwrap();
        let command = fake_acme(
            &dir,
            r#"case "$*" in
  *--issue*)
    echo 'Create new order error. {"type":"urn:ietf:params:acme:error:rateLimited"}'
    exit 1 ;;
  *) exit 0 ;;
esac"#,
        );
        let config = test_config(command, &dir.path().join("out"));

        let outcome = AcmeShIssuer::new(config).issue_and_deploy("example.com").await;
        match outcome {
            IssueOutcome::RateLimited { detail } => {
                assert!(detail.contains("rateLimited"), "{detail}");
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn generic_failure_is_terminal_with_tool_output() {
        let dir = TempDir::new().unwrap();
        let command = fake_acme(
            &dir,
            r#"case "$*" in
  *--issue*)
    echo "Verify error: DNS problem: NXDOMAIN" >&2
    exit 1 ;;
  *) exit 0 ;;
esac"#,
        );
        let config = test_config(command, &dir.path().join("out"));

        let outcome = AcmeShIssuer::new(config).issue_and_deploy("example.com").await;
        match outcome {
            IssueOutcome::Failed { detail } => {
                assert!(detail.contains("DNS problem"), "{detail}");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn install_failure_is_terminal() {
        let dir = TempDir::new().unwrap();
        let command = fake_acme(
            &dir,
            r#"case "$*" in
  *--install-cert*)
    echo "can not write key file" >&2
    exit 1 ;;
  *) exit 0 ;;
esac"#,
        );
        let config = test_config(command, &dir.path().join("out"));

        let outcome = AcmeShIssuer::new(config).issue_and_deploy("example.com").await;
        match outcome {
            IssueOutcome::Failed { detail } => {
                assert!(detail.contains("install failed"), "{detail}");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn hanging_tool_times_out_as_terminal_failure() {
        let dir = TempDir::new().unwrap();
        let command = fake_acme(
            &dir,
            r#"case "$*" in
  *--issue*) sleep 30 ;;
  *) exit 0 ;;
esac"#,
        );
        let mut config = test_config(command, &dir.path().join("out")).as_ref().clone();
        config.acme.timeout_secs = 1;

        let outcome = AcmeShIssuer::new(Arc::new(config)).issue_and_deploy("example.com").await;
        match outcome {
            IssueOutcome::Failed { detail } => {
                assert!(detail.contains("did not finish"), "{detail}");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn deploy_failure_downgrades_to_warning() {
        let dir = TempDir::new().unwrap();
        let command = fake_acme(
            &dir,
            r#"case "$*" in
  *--deploy*)
    echo "DSM login failed" >&2
    exit 1 ;;
  *) exit 0 ;;
esac"#,
        );
        let mut config = test_config(command, &dir.path().join("out")).as_ref().clone();
        config.deploy.enabled = true;
        config.deploy.hostname = Some("nas.internal".to_string());
        config.deploy.username = Some("certadmin".to_string());
        config.deploy.password = Some("secret".to_string());
        let config = Arc::new(config);
        install_fullchain(&config, 2030, 6, 1);

        let outcome = AcmeShIssuer::new(config).issue_and_deploy("example.com").await;
        match outcome {
            IssueOutcome::Issued { deploy_warning, .. } => {
                let warning = deploy_warning.expect("deploy warning");
                assert!(warning.contains("DSM login failed"), "{warning}");
            }
            other => panic!("expected Issued with warning, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn setup_step_failures_do_not_block_issue() {
        let dir = TempDir::new().unwrap();
        let command = fake_acme(
            &dir,
            r#"case "$*" in
  *--set-default-ca*|*--register-account*|*--set-renew-days*)
    echo "setup refused" >&2
    exit 1 ;;
  *) exit 0 ;;
esac"#,
        );
        let config = test_config(command, &dir.path().join("out"));
        install_fullchain(&config, 2030, 1, 1);

        let outcome = AcmeShIssuer::new(config).issue_and_deploy("example.com").await;
        assert!(matches!(outcome, IssueOutcome::Issued { .. }), "{outcome:?}");
    }

    #[tokio::test]
    async fn unreadable_installed_certificate_leaves_expiry_unset() {
        let dir = TempDir::new().unwrap();
        let command = fake_acme(&dir, "exit 0");
        let config = test_config(command, &dir.path().join("out"));
        // No fullchain file is written.

        let outcome = AcmeShIssuer::new(config).issue_and_deploy("example.com").await;
        match outcome {
            IssueOutcome::Issued { new_expiry, .. } => assert!(new_expiry.is_none()),
            other => panic!("expected Issued, got {other:?}"),
        }
    }
}
