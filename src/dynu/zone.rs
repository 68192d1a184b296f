use tracing::debug;

use super::{Domain, DynuClient, DynuError};

/// Domain and node a challenge record is written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedZone {
    pub domain_id: String,
    pub node: String,
}

impl DynuClient {
    /// Resolves the owning domain through the root lookup endpoint.
    ///
    /// The root lookup only knows the flat zone model, so a node that still
    /// contains a separator is checked against the full domain list in case a
    /// deeper subdomain is managed as its own domain.
    #[tracing::instrument(skip(self))]
    pub async fn resolve_zone(&self, fqdn: &str) -> Result<ResolvedZone, DynuError> {
        let hostname = fqdn.trim_end_matches('.');
        let root = self.get_root(hostname).await?;
        let fallback = ResolvedZone {
            domain_id: root.id.to_string(),
            node: root.node,
        };

        if !fallback.node.contains('.') {
            return Ok(fallback);
        }

        let domains = self.list_domains().await?;
        match find_domain(hostname, &domains) {
            Ok(zone) => Ok(zone),
            Err(DynuError::DomainNotFound(_)) => {
                debug!(node = %fallback.node, "no subdomain matched, using root lookup");
                Ok(fallback)
            }
            Err(e) => Err(e),
        }
    }

    /// Resolves a zone that was named explicitly in the solver config.
    #[tracing::instrument(skip(self))]
    pub async fn resolve_named_zone(
        &self,
        zone_name: &str,
        fqdn: &str,
    ) -> Result<ResolvedZone, DynuError> {
        let zone = normalize(zone_name);
        let domain = self
            .list_domains()
            .await?
            .into_iter()
            .find(|d| normalize(&d.name).eq_ignore_ascii_case(zone))
            .ok_or_else(|| DynuError::DomainNotFound(zone.to_owned()))?;

        Ok(ResolvedZone {
            domain_id: domain.id.to_string(),
            node: record_name_in_zone(zone, fqdn)?.to_owned(),
        })
    }
}

/// Finds the managed domain with the longest name that is a suffix of `fqdn`.
///
/// Leading labels are dropped one at a time until a candidate equals a domain
/// name; the node is whatever precedes the matched name.
pub fn find_domain(fqdn: &str, domains: &[Domain]) -> Result<ResolvedZone, DynuError> {
    let host = normalize(fqdn);
    let mut candidate = host;

    while !candidate.is_empty() {
        if let Some(domain) = domains
            .iter()
            .find(|d| normalize(&d.name).eq_ignore_ascii_case(candidate))
        {
            let node = host[..host.len() - candidate.len()].trim_end_matches('.');
            return Ok(ResolvedZone {
                domain_id: domain.id.to_string(),
                node: node.to_owned(),
            });
        }

        candidate = match candidate.split_once('.') {
            Some((_, rest)) => rest,
            None => break,
        };
    }

    Err(DynuError::DomainNotFound(host.to_owned()))
}

/// Returns the part of `fqdn` in front of `zone`.
pub fn record_name_in_zone<'a>(zone: &str, fqdn: &'a str) -> Result<&'a str, DynuError> {
    let host = normalize(fqdn);
    let zone = normalize(zone);

    if host.eq_ignore_ascii_case(zone) {
        return Ok("");
    }

    let split = host.len().checked_sub(zone.len() + 1);
    match split {
        Some(i)
            if host.as_bytes()[i] == b'.' && host[i + 1..].eq_ignore_ascii_case(zone) =>
        {
            Ok(&host[..i])
        }
        _ => Err(DynuError::NotInZone {
            fqdn: host.to_owned(),
            zone: zone.to_owned(),
        }),
    }
}

/// Strips the leftmost label, so `_acme-challenge.example` becomes `example`.
pub fn base_record_name(record_name: &str) -> &str {
    record_name
        .split_once('.')
        .map(|(_, rest)| rest)
        .unwrap_or("")
}

fn normalize(name: &str) -> &str {
    name.trim_end_matches('.')
}
