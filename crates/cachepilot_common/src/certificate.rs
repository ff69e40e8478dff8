//! Certificate expiry inspection
//!
//! Reads `notAfter` from an X.509 certificate with `openssl x509` and
//! classifies it against a warning threshold.

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::command_exec::{GuardedCommand, DEFAULT_TIMEOUT_SECS};
use crate::error::{ValidationError, ValidationResult};
use crate::health::TriStateCode;

pub const DEFAULT_WARN_DAYS: i64 = 30;
const SECONDS_PER_DAY: i64 = 86_400;

/// Transient view of one certificate, built per inspection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRecord {
    pub path: PathBuf,
    pub expiry_epoch: i64,
    pub warn_days: i64,
}

impl CertificateRecord {
    /// Whole days left, truncated toward zero (negative once expired)
    pub fn days_remaining(&self, now_epoch: i64) -> i64 {
        (self.expiry_epoch - now_epoch) / SECONDS_PER_DAY
    }

    pub fn classify(&self, now_epoch: i64) -> TriStateCode {
        classify_expiry(self.expiry_epoch, now_epoch, self.warn_days)
    }
}

/// Expired -> Unhealthy; fewer than `warn_days` whole days left -> Degraded.
///
/// Exactly `warn_days` remaining is healthy.
pub fn classify_expiry(expiry_epoch: i64, now_epoch: i64, warn_days: i64) -> TriStateCode {
    if expiry_epoch < now_epoch {
        return TriStateCode::Unhealthy;
    }
    let days_left = (expiry_epoch - now_epoch) / SECONDS_PER_DAY;
    if days_left < warn_days {
        TriStateCode::Degraded
    } else {
        TriStateCode::Healthy
    }
}

/// Parse `openssl x509 -enddate` output (`notAfter=Jun  1 12:00:00 2026 GMT`).
pub fn parse_not_after(output: &str) -> ValidationResult<i64> {
    let line = output
        .lines()
        .find_map(|l| l.trim().strip_prefix("notAfter="))
        .ok_or_else(|| {
            ValidationError::certificate(TriStateCode::Unhealthy, "no notAfter field in output")
        })?;

    // collapse the space padding openssl uses for single-digit days
    let normalized = line.split_whitespace().collect::<Vec<_>>().join(" ");
    let parsed = NaiveDateTime::parse_from_str(&normalized, "%b %d %H:%M:%S %Y GMT").map_err(|e| {
        ValidationError::certificate(
            TriStateCode::Unhealthy,
            format!("unparseable expiry '{}': {}", line, e),
        )
    })?;

    Ok(parsed.and_utc().timestamp())
}

/// Reads certificate expiry through the guarded `openssl` invocation
#[derive(Debug, Clone)]
pub struct CertificateInspector {
    timeout: Duration,
}

impl Default for CertificateInspector {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }
}

impl CertificateInspector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub async fn read_expiry(&self, cert_file: &Path) -> ValidationResult<i64> {
        if !cert_file.is_file() {
            return Err(ValidationError::certificate(
                TriStateCode::Unhealthy,
                format!("certificate not found: {}", cert_file.display()),
            ));
        }

        let output = GuardedCommand::new("openssl")
            .args(["x509", "-enddate", "-noout", "-in"])
            .untrusted_arg(cert_file.to_string_lossy())
            .timeout(self.timeout)
            .run_checked()
            .await
            .map_err(|e| {
                ValidationError::certificate(
                    TriStateCode::Unhealthy,
                    format!("cannot read {}: {}", cert_file.display(), e),
                )
            })?;

        parse_not_after(&output.stdout)
    }

    pub async fn inspect(&self, cert_file: &Path, warn_days: i64) -> ValidationResult<CertificateRecord> {
        let expiry_epoch = self.read_expiry(cert_file).await?;
        Ok(CertificateRecord {
            path: cert_file.to_path_buf(),
            expiry_epoch,
            warn_days,
        })
    }

    /// Classify a certificate file.
    ///
    /// `Err` only when the file is missing or its expiry cannot be read;
    /// an expired certificate is `Ok(Unhealthy)`.
    pub async fn verify_certificate_validity(
        &self,
        cert_file: &Path,
        warn_days: i64,
    ) -> ValidationResult<TriStateCode> {
        let record = self.inspect(cert_file, warn_days).await?;
        let now = Utc::now().timestamp();
        let code = record.classify(now);

        match code {
            TriStateCode::Unhealthy => {
                warn!("[CERT] {} has expired", cert_file.display())
            }
            TriStateCode::Degraded => warn!(
                "[CERT] {} expires in {} days",
                cert_file.display(),
                record.days_remaining(now)
            ),
            TriStateCode::Healthy => debug!(
                "[CERT] {} valid for {} days",
                cert_file.display(),
                record.days_remaining(now)
            ),
        }

        Ok(code)
    }
}

/// Convenience wrapper with the default timeout.
pub async fn verify_certificate_validity(
    cert_file: &Path,
    warn_days: i64,
) -> ValidationResult<TriStateCode> {
    CertificateInspector::default()
        .verify_certificate_validity(cert_file, warn_days)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::find_in_path;
    use tempfile::TempDir;

    const NOW: i64 = 1_800_000_000;

    #[test]
    fn test_classification_boundaries() {
        let day = SECONDS_PER_DAY;
        assert_eq!(classify_expiry(NOW + 29 * day, NOW, 30), TriStateCode::Degraded);
        assert_eq!(classify_expiry(NOW + 31 * day, NOW, 30), TriStateCode::Healthy);
        assert_eq!(classify_expiry(NOW + 30 * day, NOW, 30), TriStateCode::Healthy);
        // 29 days and 23 hours truncates to 29
        assert_eq!(classify_expiry(NOW + 30 * day - 3600, NOW, 30), TriStateCode::Degraded);
        assert_eq!(classify_expiry(NOW - 1, NOW, 30), TriStateCode::Unhealthy);
        assert_eq!(classify_expiry(NOW, NOW, 0), TriStateCode::Healthy);
    }

    #[test]
    fn test_record_days_remaining() {
        let record = CertificateRecord {
            path: PathBuf::from("/var/cachepilot/ca/ca.crt"),
            expiry_epoch: NOW + 10 * SECONDS_PER_DAY + 5,
            warn_days: 30,
        };
        assert_eq!(record.days_remaining(NOW), 10);
        assert_eq!(record.classify(NOW), TriStateCode::Degraded);
    }

    #[test]
    fn test_parse_not_after() {
        let epoch = parse_not_after("notAfter=Jun  1 12:00:00 2026 GMT\n").unwrap();
        assert_eq!(epoch, 1_780_315_200);
        let epoch = parse_not_after("notAfter=Dec 24 00:00:00 2030 GMT").unwrap();
        assert_eq!(epoch, 1_924_300_800);
    }

    #[test]
    fn test_parse_not_after_garbage() {
        assert!(parse_not_after("subject=CN = test").is_err());
        assert!(parse_not_after("notAfter=tomorrow").is_err());
    }

    #[tokio::test]
    async fn test_missing_certificate() {
        let err = verify_certificate_validity(Path::new("/nonexistent/tenant.crt"), 30)
            .await
            .unwrap_err();
        assert!(matches!(err, ValidationError::Certificate { .. }));
    }

    #[tokio::test]
    async fn test_real_certificates_when_openssl_present() {
        if find_in_path("openssl").is_none() {
            return;
        }
        let temp = TempDir::new().unwrap();

        for (days, expected) in [(29, TriStateCode::Degraded), (31, TriStateCode::Healthy)] {
            let cert = temp.path().join(format!("cert{}.crt", days));
            let key = temp.path().join(format!("cert{}.key", days));
            let status = std::process::Command::new("openssl")
                .args(["req", "-x509", "-newkey", "rsa:2048", "-nodes", "-subj", "/CN=tenant"])
                .arg("-days")
                .arg(days.to_string())
                .arg("-keyout")
                .arg(&key)
                .arg("-out")
                .arg(&cert)
                .output()
                .unwrap();
            assert!(status.status.success());

            let code = verify_certificate_validity(&cert, 30).await.unwrap();
            assert_eq!(code, expected, "certificate valid for {} days", days);
        }
    }
}
