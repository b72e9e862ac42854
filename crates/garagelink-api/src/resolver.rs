// ── Address resolution ──
//
// Turns the configured host identifier into something the websocket can
// dial. Called once per connection attempt and never cached: the
// controller picks up a fresh DHCP lease more often than one would like.

use std::net::IpAddr;
use std::time::Duration;

use futures_util::future::BoxFuture;
use mdns_sd::{HostnameResolutionEvent, ServiceDaemon};
use secrecy::SecretString;
use tracing::debug;
use url::Url;

use crate::error::Error;

const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(5);

// ── Credentials / Endpoint ───────────────────────────────────────────

/// Basic-auth credentials presented during the websocket handshake.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

/// A dialable address for one connection attempt.
#[derive(Debug, Clone)]
pub struct Endpoint {
    /// Resolved address (or the static host, when resolution is disabled).
    pub host: String,
    pub port: u16,
    pub credentials: Option<Credentials>,
}

impl Endpoint {
    /// `ws://host:port/` without userinfo.
    pub fn base_url(&self) -> Result<Url, Error> {
        Ok(Url::parse(&format!("ws://{}/", self.authority()))?)
    }

    /// Connection target with the password masked, for logs and notes.
    pub fn redacted(&self) -> String {
        match self.credentials {
            Some(ref creds) => format!("ws://{}:****@{}/", creds.username, self.authority()),
            None => format!("ws://{}/", self.authority()),
        }
    }

    /// `host:port`, IPv6 literals bracketed.
    fn authority(&self) -> String {
        match self.host.parse::<IpAddr>() {
            Ok(IpAddr::V6(v6)) => format!("[{v6}]:{}", self.port),
            _ => format!("{}:{}", self.host, self.port),
        }
    }
}

// ── Resolve trait ────────────────────────────────────────────────────

/// Name → address lookup.
///
/// Object-safe so the connection manager can hold an `Arc<dyn Resolve>`
/// and tests can substitute their own.
pub trait Resolve: Send + Sync {
    /// Resolve a non-literal host identifier to a dialable host string.
    fn resolve<'a>(&'a self, host: &'a str) -> BoxFuture<'a, Result<String, Error>>;
}

/// Build a fresh [`Endpoint`] for one connection attempt.
///
/// Literal IP addresses are returned unchanged without consulting `resolver`.
pub async fn resolve_endpoint(
    resolver: &dyn Resolve,
    host: &str,
    port: u16,
    credentials: Option<&Credentials>,
) -> Result<Endpoint, Error> {
    let literal = host.trim_start_matches('[').trim_end_matches(']');
    let address = match literal.parse::<IpAddr>() {
        Ok(ip) => ip.to_string(),
        Err(_) => resolver.resolve(host).await?,
    };

    Ok(Endpoint {
        host: address,
        port,
        credentials: credentials.cloned(),
    })
}

// ── StaticResolver ───────────────────────────────────────────────────

/// Hands the host through untouched and lets the socket layer deal with it.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticResolver;

impl Resolve for StaticResolver {
    fn resolve<'a>(&'a self, host: &'a str) -> BoxFuture<'a, Result<String, Error>> {
        Box::pin(async move { Ok(host.to_string()) })
    }
}

// ── NameResolver ─────────────────────────────────────────────────────

/// Multicast DNS for `.local` and single-label names, system DNS otherwise.
///
/// IPv4 answers win over IPv6 when both are offered.
#[derive(Debug, Clone)]
pub struct NameResolver {
    timeout: Duration,
}

impl NameResolver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn resolve_mdns(&self, host: &str) -> Result<IpAddr, Error> {
        let hostname = mdns_hostname(host);
        debug!(host, %hostname, "resolving via mDNS");

        let daemon = ServiceDaemon::new().map_err(|e| resolution_error(host, e))?;
        let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
        let receiver = daemon
            .resolve_hostname(&hostname, Some(timeout_ms))
            .map_err(|e| resolution_error(host, e))?;

        let lookup = async {
            while let Ok(event) = receiver.recv_async().await {
                match event {
                    HostnameResolutionEvent::AddressesFound(_, addrs) => {
                        if let Some(ip) = pick_address(addrs) {
                            return Some(ip);
                        }
                    }
                    HostnameResolutionEvent::SearchTimeout(_) => return None,
                    _ => {}
                }
            }
            None
        };
        let outcome = tokio::time::timeout(self.timeout, lookup).await;

        if let Err(e) = daemon.shutdown() {
            debug!(error = %e, "mDNS daemon shutdown failed");
        }

        match outcome {
            Ok(Some(ip)) => Ok(ip),
            Ok(None) => Err(resolution_error(host, "no mDNS answer")),
            Err(_) => Err(resolution_error(
                host,
                format!("mDNS lookup timed out after {}ms", self.timeout.as_millis()),
            )),
        }
    }

    async fn resolve_dns(&self, host: &str) -> Result<IpAddr, Error> {
        debug!(host, "resolving via system DNS");

        let addrs = tokio::time::timeout(self.timeout, tokio::net::lookup_host((host, 0)))
            .await
            .map_err(|_| {
                resolution_error(
                    host,
                    format!("DNS lookup timed out after {}ms", self.timeout.as_millis()),
                )
            })?
            .map_err(|e| resolution_error(host, e))?;

        pick_address(addrs.map(|sa| sa.ip()))
            .ok_or_else(|| resolution_error(host, "no addresses returned"))
    }
}

impl Default for NameResolver {
    fn default() -> Self {
        Self::new(DEFAULT_RESOLVE_TIMEOUT)
    }
}

impl Resolve for NameResolver {
    fn resolve<'a>(&'a self, host: &'a str) -> BoxFuture<'a, Result<String, Error>> {
        Box::pin(async move {
            let ip = if is_local_name(host) {
                self.resolve_mdns(host).await?
            } else {
                self.resolve_dns(host).await?
            };
            debug!(host, %ip, "resolved");
            Ok(ip.to_string())
        })
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn resolution_error(host: &str, reason: impl std::fmt::Display) -> Error {
    Error::Resolution {
        host: host.to_string(),
        reason: reason.to_string(),
    }
}

/// Whether `host` should be looked up over multicast DNS.
fn is_local_name(host: &str) -> bool {
    let name = host.trim_end_matches('.').to_ascii_lowercase();
    if name == "localhost" {
        return false;
    }
    name.ends_with(".local") || !name.contains('.')
}

/// Fully-qualified mDNS hostname, e.g. `garage` → `garage.local.`.
fn mdns_hostname(host: &str) -> String {
    let name = host.trim_end_matches('.').to_ascii_lowercase();
    if name.ends_with(".local") {
        format!("{name}.")
    } else {
        format!("{name}.local.")
    }
}

fn pick_address(addrs: impl IntoIterator<Item = IpAddr>) -> Option<IpAddr> {
    let mut fallback = None;
    for ip in addrs {
        if ip.is_ipv4() {
            return Some(ip);
        }
        fallback.get_or_insert(ip);
    }
    fallback
}

// ── Tests ────────────────────────────────────────────────────────────
