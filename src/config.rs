//! Service configuration, read once at startup.
//!
//! | Field | Variable | Default |
//! |---|---|---|
//! | `service_name` | `APP_NAME` | `microservice` |
//! | `service_description` | `APP_DESCRIPTION` | `Go microservice` |
//! | `version` | `APP_VERSION` | the crate version |
//! | `port` | `PORT` | `8080` |
//! | `hostname` | `HOSTNAME`, then `gethostname(2)` | `unknown` |
//!
//! An unset or empty variable falls back to its default. Only a value that is
//! present and unusable (a non-numeric `PORT`) fails startup.

use std::net::SocketAddr;

use crate::error::ConfigError;

pub const DEFAULT_SERVICE_NAME: &str = "microservice";
pub const DEFAULT_SERVICE_DESCRIPTION: &str = "Go microservice";
pub const DEFAULT_PORT: u16 = 8080;
pub const UNKNOWN_HOST: &str = "unknown";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub service_name: String,
    pub service_description: String,
    pub version: String,
    pub port: u16,
    pub hostname: String,
}

impl Config {
    /// Reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key → value source. Used by tests to avoid
    /// touching the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let port = match get("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort(raw))?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            service_name: get("APP_NAME").unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_owned()),
            service_description: get("APP_DESCRIPTION")
                .unwrap_or_else(|| DEFAULT_SERVICE_DESCRIPTION.to_owned()),
            version: get("APP_VERSION").unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_owned()),
            port,
            hostname: get("HOSTNAME").unwrap_or_else(system_hostname),
        })
    }

    /// Address the server listens on: every interface, configured port.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_owned(),
            service_description: DEFAULT_SERVICE_DESCRIPTION.to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            port: DEFAULT_PORT,
            hostname: UNKNOWN_HOST.to_owned(),
        }
    }
}

/// The kernel's host name. Non-UTF-8 bytes are replaced rather than rejected.
fn system_hostname() -> String {
    let name = gethostname::gethostname();
    let name = name.to_string_lossy();
    let name = name.trim();
    if name.is_empty() {
        UNKNOWN_HOST.to_owned()
    } else {
        name.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = Config::from_lookup(lookup(&[("HOSTNAME", "pod-1")])).unwrap();
        assert_eq!(cfg.service_name, "microservice");
        assert_eq!(cfg.service_description, "Go microservice");
        assert_eq!(cfg.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.hostname, "pod-1");
    }

    #[test]
    fn empty_values_count_as_unset() {
        let cfg = Config::from_lookup(lookup(&[("APP_NAME", ""), ("PORT", "")])).unwrap();
        assert_eq!(cfg.service_name, "microservice");
        assert_eq!(cfg.port, 8080);
    }

    #[test]
    fn overrides_from_environment() {
        let cfg = Config::from_lookup(lookup(&[
            ("APP_NAME", "orders"),
            ("APP_DESCRIPTION", "order service"),
            ("APP_VERSION", "2.3.4"),
            ("PORT", "9090"),
        ]))
        .unwrap();
        assert_eq!(cfg.service_name, "orders");
        assert_eq!(cfg.service_description, "order service");
        assert_eq!(cfg.version, "2.3.4");
        assert_eq!(cfg.listen_addr(), "0.0.0.0:9090".parse().unwrap());
    }

    #[test]
    fn hostname_falls_back_to_the_kernel_name() {
        let cfg = Config::from_lookup(lookup(&[])).unwrap();
        assert!(!cfg.hostname.is_empty());
        assert_eq!(cfg.hostname, system_hostname());
        assert_eq!(cfg.hostname, cfg.hostname.trim());
    }

    #[test]
    fn invalid_port_is_rejected() {
        let err = Config::from_lookup(lookup(&[("PORT", "http")])).unwrap_err();
        assert_eq!(err, ConfigError::InvalidPort("http".to_owned()));
    }
}
