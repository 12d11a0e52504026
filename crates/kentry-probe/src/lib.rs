//! HTTP health probe for VRRP check scripts.
//!
//! keepalived treats a check script's exit status as the health verdict. The
//! probe issues a single GET and reports healthy only when the server answers
//! with `200`; any other status, a transport failure or an unusable URL is
//! unhealthy. The supervisor also uses [`normalise_url`] to validate the URL
//! given on its command line before the daemon starts.

use std::time::Duration;

use thiserror::Error;
use tracing::debug;
use url::Url;

/// Tracing target for probe operations.
const PROBE_TARGET: &str = "kentry_probe";

/// Upper bound on a single probe request.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors raised while interpreting a probe URL.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The URL could not be parsed, even with the default scheme applied.
    #[error("'{url}' is not a valid URL: {source}")]
    InvalidUrl {
        /// URL as supplied.
        url: String,
        /// Underlying parser error.
        #[source]
        source: url::ParseError,
    },
    /// The URL uses a scheme the probe cannot speak.
    #[error("'{url}' uses unsupported scheme '{scheme}'")]
    UnsupportedScheme {
        /// URL as supplied.
        url: String,
        /// Offending scheme.
        scheme: String,
    },
}

/// Verdict of a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The endpoint answered `200`.
    Healthy,
    /// Anything else.
    Unhealthy {
        /// Why the endpoint was judged unhealthy.
        reason: String,
    },
}

impl ProbeOutcome {
    /// Returns `true` for [`ProbeOutcome::Healthy`].
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

/// Parses a probe URL, assuming `http` when no scheme is given.
///
/// # Errors
///
/// Returns [`ProbeError::InvalidUrl`] when the text is not a URL and
/// [`ProbeError::UnsupportedScheme`] for anything other than HTTP(S).
///
/// # Examples
///
/// ```
/// let url = kentry_probe::normalise_url("haproxy:8080/health").unwrap();
/// assert_eq!(url.as_str(), "http://haproxy:8080/health");
/// ```
pub fn normalise_url(raw: &str) -> Result<Url, ProbeError> {
    let trimmed = raw.trim();
    let parsed = match Url::parse(trimmed) {
        Ok(url) if url.has_host() => Ok(url),
        // `host:port/path` parses with `host` as the scheme.
        Ok(_) | Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse(&format!("http://{trimmed}"))
        }
        Err(error) => Err(error),
    };
    let url = parsed.map_err(|source| ProbeError::InvalidUrl {
        url: raw.to_owned(),
        source,
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ProbeError::UnsupportedScheme {
            url: raw.to_owned(),
            scheme: other.to_owned(),
        }),
    }
}

/// Issues one GET against `url` and classifies the answer.
#[must_use]
pub fn probe(url: &Url, timeout: Duration) -> ProbeOutcome {
    let agent = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .new_agent();
    let outcome = match agent.get(url.as_str()).call() {
        Ok(response) if response.status() == 200 => ProbeOutcome::Healthy,
        Ok(response) => ProbeOutcome::Unhealthy {
            reason: format!("status {}", response.status()),
        },
        Err(ureq::Error::StatusCode(code)) => ProbeOutcome::Unhealthy {
            reason: format!("status {code}"),
        },
        Err(error) => ProbeOutcome::Unhealthy {
            reason: error.to_string(),
        },
    };
    debug!(target: PROBE_TARGET, %url, ?outcome, "probe finished");
    outcome
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("http://10.0.0.1/health", "http://10.0.0.1/health")]
    #[case("https://lb.example/ok", "https://lb.example/ok")]
    #[case("10.0.0.1:8080/health", "http://10.0.0.1:8080/health")]
    #[case("haproxy/stats", "http://haproxy/stats")]
    fn applies_default_scheme(#[case] raw: &str, #[case] expected: &str) {
        let url = normalise_url(raw).expect("url should normalise");
        assert_eq!(url.as_str(), expected);
    }

    #[test]
    fn rejects_non_http_schemes() {
        let error = normalise_url("ftp://files.example/x").expect_err("ftp is unsupported");
        assert!(matches!(error, ProbeError::UnsupportedScheme { .. }));
    }

    #[test]
    fn rejects_garbage() {
        let error = normalise_url("http://[::1").expect_err("unterminated IPv6 host");
        assert!(matches!(error, ProbeError::InvalidUrl { .. }));
    }
}
