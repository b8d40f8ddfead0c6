//! Subject alternative names for leaf certificates.

use std::net::IpAddr;

use connector_core::BindAddr;
use rcgen::SanType;
use rcgen::string::Ia5String;

use crate::error::CertError;

/// Ordered, de-duplicated SAN set.
#[derive(Debug, Default)]
pub(crate) struct SubjectNames {
    dns: Vec<String>,
    ips: Vec<IpAddr>,
}

impl SubjectNames {
    /// Add a host given as a bare name, an IP literal, or a `host:port`
    /// address. Ports are dropped and empty hosts ignored.
    pub(crate) fn add_host(&mut self, raw: &str) {
        let raw = raw.trim();
        let host = match BindAddr::parse(raw) {
            Ok(addr) => addr.host().to_string(),
            Err(_) => raw.trim_start_matches('[').trim_end_matches(']').to_string(),
        };
        if host.is_empty() {
            return;
        }
        match host.parse::<IpAddr>() {
            Ok(ip) => self.add_ip(ip),
            Err(_) => {
                let host = host.to_ascii_lowercase();
                if !self.dns.contains(&host) {
                    self.dns.push(host);
                }
            }
        }
    }

    pub(crate) fn add_ip(&mut self, ip: IpAddr) {
        if !self.ips.contains(&ip) {
            self.ips.push(ip);
        }
    }

    pub(crate) fn dns_names(&self) -> &[String] {
        &self.dns
    }

    pub(crate) fn ip_addresses(&self) -> &[IpAddr] {
        &self.ips
    }

    /// Convert to rcgen SANs, DNS names first.
    pub(crate) fn to_san_types(&self) -> Result<Vec<SanType>, CertError> {
        let mut sans = Vec::with_capacity(self.dns.len() + self.ips.len());
        for name in &self.dns {
            let name = Ia5String::try_from(name.as_str())
                .map_err(|e| CertError::Generation(format!("invalid DNS name {name:?}: {e}")))?;
            sans.push(SanType::DnsName(name));
        }
        sans.extend(self.ips.iter().copied().map(SanType::IpAddress));
        Ok(sans)
    }
}
