use crate::types::{DetectionRecord, Severity};
use std::collections::HashSet;
use tracing::debug;
use url::Url;

const BLACKLISTED_DOMAINS: &[&str] = &["malicious-example.com", "phishing-site.org", "badwebsite.net"];
const MALWARE_DOMAINS: &[&str] = &["malware.wicar.org", "testmalware.com"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReputationHit {
    Blacklisted,
    Malware,
}

impl ReputationHit {
    pub fn to_record(self) -> DetectionRecord {
        match self {
            ReputationHit::Blacklisted => DetectionRecord::new(
                "Domain Reputation Threat Detected",
                Severity::Critical,
                "Reputation",
                "Blacklisted Domain",
            ),
            ReputationHit::Malware => DetectionRecord::new(
                "Malware Domain Detected",
                Severity::Critical,
                "Reputation",
                "Malware Domain",
            ),
        }
    }
}

/// Static block-list lookups on a URL's hostname.
///
/// Every failure path answers "not a threat": an unparsable URL is never
/// reported to the caller.
pub struct DomainReputation {
    blacklisted: HashSet<String>,
    malware: HashSet<String>,
}

impl DomainReputation {
    pub fn new() -> Self {
        Self::with_lists(BLACKLISTED_DOMAINS, MALWARE_DOMAINS)
    }

    pub fn with_lists(blacklisted: &[&str], malware: &[&str]) -> Self {
        Self {
            blacklisted: blacklisted.iter().map(|d| d.to_lowercase()).collect(),
            malware: malware.iter().map(|d| d.to_lowercase()).collect(),
        }
    }

    pub fn is_blacklisted(&self, url: &str) -> bool {
        hostname(url).is_some_and(|host| self.blacklisted.contains(&host))
    }

    pub fn is_malware_domain(&self, url: &str) -> bool {
        hostname(url).is_some_and(|host| self.malware.contains(&host))
    }

    pub fn check(&self, url: &str) -> Option<ReputationHit> {
        if self.is_blacklisted(url) {
            Some(ReputationHit::Blacklisted)
        } else if self.is_malware_domain(url) {
            Some(ReputationHit::Malware)
        } else {
            None
        }
    }
}

impl Default for DomainReputation {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowercased host of `url`, if it has one.
pub fn hostname(url: &str) -> Option<String> {
    if url.trim().is_empty() {
        return None;
    }
    match Url::parse(url.trim()) {
        Ok(parsed) => parsed.host_str().map(|h| h.to_lowercase()),
        Err(e) => {
            debug!("Domain parsing error for {:?}: {}", url, e);
            None
        }
    }
}
