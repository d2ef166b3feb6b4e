//! Tool server descriptors

use std::collections::HashSet;
use std::fmt;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use astra_common::ToolServer;
use serde::{Deserialize, Serialize};

use super::error::{LifecycleError, Result};
use crate::config::keys::{DEFAULT_TOOL_HOST, TOOL_SERVERS_PREFIX};
use crate::config::ConfigStore;

/// Static definition of one tool server
#[derive(Clone)]
pub struct ServerDescriptor {
    name: String,
    host: String,
    port: u16,
    app: Arc<dyn ToolServer>,
}

impl ServerDescriptor {
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        app: Arc<dyn ToolServer>,
    ) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            app,
        }
    }

    /// Build a descriptor from `tool_servers.<name>.{host,port}`.
    ///
    /// `host` defaults to `127.0.0.1`; `port` is required.
    pub fn from_config(
        store: &ConfigStore,
        name: impl Into<String>,
        app: Arc<dyn ToolServer>,
    ) -> Result<Self> {
        let name = name.into();
        let host_key = format!("{}.{}.host", TOOL_SERVERS_PREFIX, name);
        let port_key = format!("{}.{}.port", TOOL_SERVERS_PREFIX, name);

        let host = store.get(&host_key, DEFAULT_TOOL_HOST.to_string());
        let port = store
            .get_value(&port_key)
            .and_then(|v| serde_json::from_value::<u16>(v).ok())
            .ok_or(LifecycleError::MissingSetting { key: port_key })?;

        Ok(Self::new(name, host, port, app))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn app(&self) -> &Arc<dyn ToolServer> {
        &self.app
    }

    /// `host:port` as passed to bind, with IPv6 literals bracketed
    pub fn addr(&self) -> String {
        join_host_port(&self.host, self.port)
    }

    /// True when both descriptors would bind the same socket.
    ///
    /// Hosts are compared after resolution, so `localhost` clashes with
    /// `127.0.0.1`, and an unspecified host (`0.0.0.0`, `::`) clashes with any
    /// host on the same port. Port 0 never clashes.
    pub(crate) fn conflicts_with(&self, other: &ServerDescriptor) -> bool {
        if self.port == 0 || self.port != other.port {
            return false;
        }

        match (self.resolve(), other.resolve()) {
            (Some(mine), Some(theirs)) => {
                mine.iter().chain(theirs.iter()).any(IpAddr::is_unspecified)
                    || !mine.is_disjoint(&theirs)
            }
            // Unresolvable names only clash when spelled the same
            _ => self.host.eq_ignore_ascii_case(&other.host),
        }
    }

    fn resolve(&self) -> Option<HashSet<IpAddr>> {
        let addrs: HashSet<IpAddr> = (bare_host(&self.host), self.port)
            .to_socket_addrs()
            .ok()?
            .map(|addr: SocketAddr| addr.ip())
            .collect();
        (!addrs.is_empty()).then_some(addrs)
    }

    pub fn endpoint(&self) -> ServerEndpoint {
        ServerEndpoint {
            name: self.name.clone(),
            host: self.host.clone(),
            port: self.port,
        }
    }
}

impl fmt::Debug for ServerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerDescriptor")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("kind", &self.app.kind())
            .finish()
    }
}

/// Where the request layer can reach a registered tool server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEndpoint {
    pub name: String,
    pub host: String,
    pub port: u16,
}

impl ServerEndpoint {
    pub fn base_url(&self) -> String {
        format!("http://{}", join_host_port(&self.host, self.port))
    }

    /// SSE address used for client sessions
    pub fn sse_url(&self) -> String {
        format!("{}/sse", self.base_url())
    }
}

fn bare_host(host: &str) -> &str {
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host)
}

fn join_host_port(host: &str, port: u16) -> String {
    let host = bare_host(host);
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> Arc<dyn ToolServer> {
        Arc::new(axum::Router::<()>::new())
    }

    #[test]
    fn test_endpoint_urls() {
        let d = ServerDescriptor::new("weather", "127.0.0.1", 9001, app());
        assert_eq!(d.addr(), "127.0.0.1:9001");
        assert_eq!(d.endpoint().sse_url(), "http://127.0.0.1:9001/sse");
    }

    #[test]
    fn test_ipv6_hosts_are_bracketed() {
        let d = ServerDescriptor::new("weather", "::1", 9001, app());
        assert_eq!(d.addr(), "[::1]:9001");
        assert_eq!(d.endpoint().sse_url(), "http://[::1]:9001/sse");

        let d = ServerDescriptor::new("weather", "[::1]", 9001, app());
        assert_eq!(d.addr(), "[::1]:9001");
    }

    #[test]
    fn test_address_conflicts() {
        let d = |host: &str, port| ServerDescriptor::new("x", host, port, app());

        assert!(d("127.0.0.1", 9001).conflicts_with(&d("127.0.0.1", 9001)));
        assert!(d("localhost", 9001).conflicts_with(&d("127.0.0.1", 9001)));
        assert!(d("0.0.0.0", 9001).conflicts_with(&d("127.0.0.1", 9001)));
        assert!(d("::1", 9001).conflicts_with(&d("[::1]", 9001)));

        assert!(!d("127.0.0.1", 9001).conflicts_with(&d("127.0.0.1", 9002)));
        assert!(!d("127.0.0.1", 9001).conflicts_with(&d("127.0.0.2", 9001)));
        assert!(!d("0.0.0.0", 0).conflicts_with(&d("0.0.0.0", 0)));
    }

    #[test]
    fn test_from_config() {
        let store = ConfigStore::new();
        store.set("tool_servers.weather.port", 9001).unwrap();
        store.set("tool_servers.stock.port", 9002).unwrap();
        store.set("tool_servers.stock.host", "0.0.0.0").unwrap();

        let weather = ServerDescriptor::from_config(&store, "weather", app()).unwrap();
        assert_eq!((weather.host(), weather.port()), ("127.0.0.1", 9001));

        let stock = ServerDescriptor::from_config(&store, "stock", app()).unwrap();
        assert_eq!((stock.host(), stock.port()), ("0.0.0.0", 9002));
    }

    #[test]
    fn test_from_config_requires_valid_port() {
        let store = ConfigStore::new();
        let err = ServerDescriptor::from_config(&store, "weather", app()).unwrap_err();
        assert!(matches!(err, LifecycleError::MissingSetting { ref key } if key == "tool_servers.weather.port"));

        store.set("tool_servers.weather.port", 70000).unwrap();
        assert!(ServerDescriptor::from_config(&store, "weather", app()).is_err());
    }
}
