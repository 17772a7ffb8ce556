//! Cluster server URL validation: credentials, connectivity probe and error shaping.

use std::time::Duration;

use percent_encoding::percent_decode_str;
use quarry_config::{LOCAL_ONLY_SERVER, redact_password};
use reqwest::blocking::Client;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use super::REGISTRAR_TARGET;
use super::errors::ServerUrlError;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Basic-auth credentials for the cluster server.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// User name.
    pub username: String,
    /// Password, possibly empty.
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"****")
            .finish()
    }
}

/// Failure to resolve credentials for the server.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct AuthError {
    message: String,
}

impl AuthError {
    /// Builds an error with the given explanation.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Extracts credentials to present to the cluster server.
pub trait AuthResolver: Send + Sync {
    /// Returns credentials for `server`, or `None` for anonymous access.
    fn resolve(&self, server: &str) -> Result<Option<Credentials>, AuthError>;
}

/// Reads credentials from the `user:password@` portion of the server URL.
#[derive(Debug, Default, Clone, Copy)]
pub struct UrlAuthResolver;

impl AuthResolver for UrlAuthResolver {
    fn resolve(&self, server: &str) -> Result<Option<Credentials>, AuthError> {
        let Ok(url) = Url::parse(server) else {
            return Ok(None);
        };
        if url.username().is_empty() {
            return Ok(None);
        }
        let decode = |raw: &str| percent_decode_str(raw).decode_utf8_lossy().into_owned();
        Ok(Some(Credentials {
            username: decode(url.username()),
            password: url.password().map(decode).unwrap_or_default(),
        }))
    }
}

/// Failure of a connectivity probe.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The probe URL could not be built from the server argument.
    #[error("invalid server address: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The address has no authority to direct a request at.
    #[error("server address has no host component")]
    NoAuthority,
    /// The request failed before a response arrived.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// The server answered with a non-success status.
    #[error("server responded with status {0}")]
    Status(u16),
}

/// The server and credentials a probe is directed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    /// Server argument as supplied by the operator.
    pub server: String,
    /// Credentials resolved for the server, if any.
    pub credentials: Option<Credentials>,
}

/// Checks that the cluster server answers with the supplied credentials.
pub trait ServerProbe: Send + Sync {
    /// Performs one probe; failures are never retried.
    fn probe(&self, target: &ProbeTarget) -> Result<(), ProbeError>;
}

/// Issues `GET <server>/pools` with basic auth.
///
/// A blocking client is built per probe and dropped before returning, so the
/// probe never owns a client once the async runtime starts.
#[derive(Debug, Clone, Copy)]
pub struct HttpServerProbe {
    timeout: Duration,
}

impl HttpServerProbe {
    /// Builds a probe with the default request timeout.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_timeout(PROBE_TIMEOUT)
    }

    /// Builds a probe that gives up after `timeout`.
    #[must_use]
    pub const fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for HttpServerProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerProbe for HttpServerProbe {
    fn probe(&self, target: &ProbeTarget) -> Result<(), ProbeError> {
        let url = pools_url(&target.server)?;
        let client = Client::builder().timeout(self.timeout).build()?;
        let mut request = client.get(url);
        if let Some(credentials) = &target.credentials {
            request = request.basic_auth(&credentials.username, Some(&credentials.password));
        }
        let response = request.send()?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ProbeError::Status(status.as_u16()))
        }
    }
}

/// `<server>/pools` with any userinfo removed; credentials travel in a header.
fn pools_url(server: &str) -> Result<Url, ProbeError> {
    let base = server.trim_end_matches('/');
    let mut url = Url::parse(&format!("{base}/pools"))?;
    if url.set_username("").is_err() || url.set_password(None).is_err() {
        return Err(ProbeError::NoAuthority);
    }
    Ok(url)
}

/// How the node relates to a cluster server after validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerCheck {
    /// `--server .`: no cluster server is consulted.
    LocalOnly,
    /// The server answered the probe.
    Reachable,
}

/// Validates `server`, resolving credentials before probing connectivity.
///
/// A failed probe is classified by the shape of the argument: anything not
/// starting with `http://` or `https://` is reported as not being a URL,
/// everything else as unreachable.
pub fn validate_server(
    server: &str,
    auth: &dyn AuthResolver,
    probe: &dyn ServerProbe,
) -> Result<ServerCheck, ServerUrlError> {
    if server.is_empty() {
        return Err(ServerUrlError::Missing);
    }
    if server == LOCAL_ONLY_SERVER {
        debug!(target: REGISTRAR_TARGET, "local-only server; skipping probe");
        return Ok(ServerCheck::LocalOnly);
    }
    let redacted = redact_password(server);
    let credentials = auth
        .resolve(server)
        .map_err(|source| ServerUrlError::Auth {
            server: redacted.clone(),
            source,
        })?;
    let target = ProbeTarget {
        server: server.to_owned(),
        credentials,
    };
    match probe.probe(&target) {
        Ok(()) => {
            info!(target: REGISTRAR_TARGET, server = %redacted, "cluster server reachable");
            Ok(ServerCheck::Reachable)
        }
        Err(source) if has_http_scheme(server) => Err(ServerUrlError::Unreachable {
            server: redacted,
            source,
        }),
        Err(source) => Err(ServerUrlError::NotAUrl {
            server: redacted,
            source,
        }),
    }
}

fn has_http_scheme(server: &str) -> bool {
    let lower = server.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use mockall::mock;
    use rstest::rstest;

    use super::*;

    mock! {
        Probe {}
        impl ServerProbe for Probe {
            fn probe(&self, target: &ProbeTarget) -> Result<(), ProbeError>;
        }
    }

    fn failing_probe() -> MockProbe {
        let mut probe = MockProbe::new();
        probe
            .expect_probe()
            .returning(|_| Err(ProbeError::Status(503)));
        probe
    }

    #[rstest]
    fn empty_server_is_missing() {
        let probe = MockProbe::new();
        let error = validate_server("", &UrlAuthResolver, &probe).expect_err("missing");
        assert!(matches!(error, ServerUrlError::Missing));
    }

    #[rstest]
    fn local_only_sentinel_never_probes() {
        let probe = MockProbe::new();
        let check = validate_server(".", &UrlAuthResolver, &probe).expect("local only");
        assert_eq!(check, ServerCheck::LocalOnly);
    }

    #[rstest]
    fn malformed_and_unreachable_messages_differ() {
        let probe = failing_probe();
        let malformed = validate_server("not a url", &UrlAuthResolver, &probe)
            .expect_err("malformed")
            .to_string();
        let unreachable = validate_server("http://127.0.0.1:1", &UrlAuthResolver, &probe)
            .expect_err("unreachable")
            .to_string();
        assert!(malformed.contains("not a URL"), "{malformed}");
        assert!(unreachable.contains("auth is correct"), "{unreachable}");
        assert_ne!(malformed, unreachable);
    }

    #[rstest]
    fn credentials_are_passed_to_the_probe() {
        let mut probe = MockProbe::new();
        probe
            .expect_probe()
            .withf(|target| target.server == "http://admin:s%40cret@db:8091")
            .once()
            .returning(|target| match &target.credentials {
                Some(found) if found.username == "admin" && found.password == "s@cret" => Ok(()),
                _ => Err(ProbeError::Status(401)),
            });
        let check = validate_server("http://admin:s%40cret@db:8091", &UrlAuthResolver, &probe)
            .expect("probe accepts credentials");
        assert_eq!(check, ServerCheck::Reachable);
    }

    #[rstest]
    fn auth_failures_are_reported_before_probing() {
        struct RejectingResolver;
        impl AuthResolver for RejectingResolver {
            fn resolve(&self, _server: &str) -> Result<Option<Credentials>, AuthError> {
                Err(AuthError::new("credential helper unavailable"))
            }
        }
        let probe = MockProbe::new();
        let error = validate_server("http://db:8091", &RejectingResolver, &probe)
            .expect_err("auth failure");
        assert!(matches!(error, ServerUrlError::Auth { .. }));
    }

    #[rstest]
    fn pools_url_strips_userinfo() {
        let url = pools_url("http://admin:pw@db:8091/").expect("url");
        assert_eq!(url.as_str(), "http://db:8091/pools");
    }

    #[rstest]
    fn error_text_never_leaks_passwords() {
        let probe = failing_probe();
        let text = validate_server("http://admin:hunter2@db:8091", &UrlAuthResolver, &probe)
            .expect_err("unreachable")
            .to_string();
        assert!(!text.contains("hunter2"), "{text}");
    }

    #[rstest]
    fn http_probe_reports_closed_ports_as_unreachable() {
        let error = validate_server("http://127.0.0.1:1", &UrlAuthResolver, &HttpServerProbe::new())
            .expect_err("nothing listens on port 1");
        assert!(matches!(error, ServerUrlError::Unreachable { .. }));
    }

    #[rstest]
    fn http_probe_rejects_non_urls() {
        let error = validate_server("not a url", &UrlAuthResolver, &HttpServerProbe::new())
            .expect_err("not a url");
        assert!(matches!(error, ServerUrlError::NotAUrl { .. }));
    }
}
