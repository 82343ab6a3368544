//! Content domain resolver
//!
//! Clients of the access point may type the domain of a piece of content
//! instead of the librarian's address. Such requests are redirected to the
//! matching content, or to a not-found page.

use crate::archive::Archive;
use crate::config::ResolverConfig;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use tracing::info;
use url::Url;

/// Inclusive range of IPv4 addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ipv4Range {
    start: Ipv4Addr,
    end: Ipv4Addr,
}

impl Ipv4Range {
    pub fn new(start: Ipv4Addr, end: Ipv4Addr) -> Result<Self> {
        if start > end {
            return Err(Error::Config(format!(
                "IP range start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let parse = |addr: &str| {
            addr.trim()
                .parse::<Ipv4Addr>()
                .map_err(|e| Error::Config(format!("Invalid IPv4 address '{}': {}", addr, e)))
        };
        Self::new(parse(start)?, parse(end)?)
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        self.start <= addr && addr <= self.end
    }

    /// IPv6 clients are never in range, except IPv4-mapped addresses
    pub fn contains_ip(&self, addr: IpAddr) -> bool {
        match addr {
            IpAddr::V4(v4) => self.contains(v4),
            IpAddr::V6(v6) => v6.to_ipv4_mapped().is_some_and(|v4| self.contains(v4)),
        }
    }
}

/// URL of the first content whose URL mentions `domain`
pub async fn get_content_url(archive: &Archive, root_url: &Url, domain: &str, path: &str) -> Result<Url> {
    let matched = archive.content_for_domain(domain).await?;
    let Some(record) = matched.first() else {
        return Ok(root_url.join("content-not-found")?);
    };
    let mut url = root_url.join(&format!("content/{}/", record.md5))?;
    url.query_pairs_mut().append_pair("path", path);
    Ok(url)
}

fn strip_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((name, port)) if !name.contains(']') && port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

/// Redirects access-point clients from content domains to the content
#[derive(Debug, Clone)]
pub struct ContentResolver {
    root_url: Url,
    clients: Ipv4Range,
}

impl ContentResolver {
    pub fn new(root_url: Url, clients: Ipv4Range) -> Self {
        Self { root_url, clients }
    }

    pub fn from_config(config: &ResolverConfig) -> Result<Self> {
        let (start, end) = &config.client_ip_range;
        Ok(Self::new(
            Url::parse(&config.root_url)?,
            Ipv4Range::parse(start, end)?,
        ))
    }

    pub fn root_url(&self) -> &Url {
        &self.root_url
    }

    fn is_regular_access(&self, target_host: &str) -> bool {
        self.root_url
            .host_str()
            .is_some_and(|root| root.eq_ignore_ascii_case(strip_port(target_host)))
    }

    /// Redirect target for a request, or `None` when it should be served as is
    pub async fn resolve(
        &self,
        archive: &Archive,
        client: IpAddr,
        target_host: &str,
        path: &str,
    ) -> Result<Option<Url>> {
        if self.is_regular_access(target_host) || !self.clients.contains_ip(client) {
            return Ok(None);
        }

        info!(client = %client, domain = %target_host, path = %path, "Resolving content domain");
        let url = get_content_url(archive, &self.root_url, strip_port(target_host), path).await?;
        info!(redirect = %url, "Resolved content domain");
        Ok(Some(url))
    }
}
