use std::net::{IpAddr, SocketAddr};

use tracing::debug;
use trust_dns_resolver::TokioAsyncResolver;

use crate::core::{Error, Result};

/// Resolves a peer given as an IP literal or a host name.
///
/// Host names go through the system resolver configuration. When several
/// addresses come back, the first one in the same family as `local` wins,
/// falling back to the first address of any family.
pub async fn resolve_peer(host: &str, port: u16, local: Option<SocketAddr>) -> Result<SocketAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }

    let resolver = TokioAsyncResolver::tokio_from_system_conf()
        .map_err(|e| Error::resolve(format!("cannot load resolver configuration: {}", e)))?;
    let lookup = resolver
        .lookup_ip(host)
        .await
        .map_err(|e| Error::resolve(format!("cannot resolve {}: {}", host, e)))?;

    let candidates: Vec<IpAddr> = lookup.iter().collect();
    let ip = pick_address(&candidates, local)
        .ok_or_else(|| Error::resolve(format!("{} has no addresses", host)))?;
    debug!(%host, %ip, "resolved peer");

    Ok(SocketAddr::new(ip, port))
}

fn pick_address(candidates: &[IpAddr], local: Option<SocketAddr>) -> Option<IpAddr> {
    let preferred = local.and_then(|local| {
        candidates
            .iter()
            .copied()
            .find(|ip| ip.is_ipv4() == local.is_ipv4())
    });
    preferred.or_else(|| candidates.first().copied())
}
