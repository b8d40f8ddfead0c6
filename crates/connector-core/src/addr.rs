//! Bind address parsing.
//!
//! The daemon accepts listen addresses of the form `host:port`, `:port`
//! (all interfaces) or `[v6]:port`. Clients dial and verify the same
//! address, so the host half doubles as the pinned TLS server name.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Host used to dial and verify a daemon bound to every interface.
pub const LOOPBACK_NAME: &str = "localhost";

/// A validated `host:port` listen address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindAddr {
    host: String,
    port: u16,
}

impl BindAddr {
    /// Parse a listen address such as `:30001`, `127.0.0.1:30001` or
    /// `[::1]:30001`.
    pub fn parse(raw: &str) -> Result<Self> {
        let malformed = |reason: &str| Error::Config(format!("invalid bind address {raw:?}: {reason}"));

        if raw.chars().any(char::is_whitespace) {
            return Err(malformed("contains whitespace"));
        }

        let (host, port) = raw
            .rsplit_once(':')
            .ok_or_else(|| malformed("expected host:port"))?;

        let host = match host.strip_prefix('[') {
            Some(inner) => {
                let inner = inner
                    .strip_suffix(']')
                    .ok_or_else(|| malformed("unterminated IPv6 bracket"))?;
                inner
                    .parse::<std::net::Ipv6Addr>()
                    .map_err(|_| malformed("bracketed host is not an IPv6 address"))?;
                inner
            }
            None if host.contains(':') => {
                return Err(malformed("IPv6 hosts must be bracketed"));
            }
            None => host,
        };

        let port = port
            .parse::<u16>()
            .map_err(|_| malformed("port is not a number in 1-65535"))?;
        if port == 0 {
            return Err(malformed("port must be non-zero"));
        }

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    /// Host part as written, without brackets. Empty for `:port`.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Host parsed as an IP literal, if it is one.
    pub fn ip(&self) -> Option<IpAddr> {
        self.host.parse().ok()
    }

    /// Whether the address listens on every interface (`:port`,
    /// `0.0.0.0:port`, `[::]:port`).
    pub fn is_wildcard(&self) -> bool {
        self.host.is_empty() || self.ip().is_some_and(|ip| ip.is_unspecified())
    }

    /// Host to dial and to expect in the peer certificate.
    ///
    /// Wildcard binds resolve to `localhost`, which every generated leaf
    /// lists as a SAN.
    pub fn dial_host(&self) -> &str {
        if self.is_wildcard() {
            LOOPBACK_NAME
        } else {
            &self.host
        }
    }

    /// `host:port` authority for building a dial URI, bracketing IPv6.
    pub fn dial_authority(&self) -> String {
        match self.ip() {
            Some(IpAddr::V6(v6)) if !self.is_wildcard() => format!("[{v6}]:{}", self.port),
            _ => format!("{}:{}", self.dial_host(), self.port),
        }
    }
}

impl FromStr for BindAddr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for BindAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}
