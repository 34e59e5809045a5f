//! Placement rules: opaque filters deciding whether an offer may host a pod.

use berth_core::Offer;

use crate::requirement::OfferRequirement;

/// Decides whether an offer is an acceptable home for a pod.
pub trait PlacementRule: Send + Sync {
    /// Whether `offer` may be used for `requirement`.
    fn accepts(&self, offer: &Offer, requirement: &OfferRequirement) -> bool;
}

impl<F> PlacementRule for F
where
    F: Fn(&Offer, &OfferRequirement) -> bool + Send + Sync,
{
    fn accepts(&self, offer: &Offer, requirement: &OfferRequirement) -> bool {
        self(offer, requirement)
    }
}

/// Only accepts offers from the listed hosts.
///
/// Parsed from placement expressions of the form `hostname:<host>[,<host>...]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostnameRule {
    hostnames: Vec<String>,
}

impl HostnameRule {
    /// Rule accepting the given hosts.
    pub fn new(hostnames: Vec<String>) -> Self {
        Self { hostnames }
    }

    /// Parse a placement expression; `None` if it is not a hostname rule.
    pub fn parse(expression: &str) -> Option<Self> {
        let hosts = expression.strip_prefix("hostname:")?;
        let hostnames: Vec<String> = hosts
            .split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(str::to_string)
            .collect();
        if hostnames.is_empty() {
            None
        } else {
            Some(Self { hostnames })
        }
    }
}

impl PlacementRule for HostnameRule {
    fn accepts(&self, offer: &Offer, _requirement: &OfferRequirement) -> bool {
        self.hostnames.iter().any(|h| *h == offer.hostname)
    }
}
