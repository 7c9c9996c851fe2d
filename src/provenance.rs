//! Which ticketing site a show came from, and which site wins a conflict.

use crate::constants::{DAMAI_DOMAIN, DAMAI_SOURCE, SHOWSTART_DOMAIN, SHOWSTART_SOURCE};
use serde::{Deserialize, Serialize};

/// One known upstream site. Lower `rank` is more authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRule {
    pub name: String,
    pub domain: String,
    pub rank: u32,
}

impl SourceRule {
    pub fn new(name: &str, domain: &str, rank: u32) -> Self {
        Self {
            name: name.to_string(),
            domain: domain.to_string(),
            rank,
        }
    }
}

/// Ordered list of source rules consulted during reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePolicy {
    rules: Vec<SourceRule>,
}

impl Default for SourcePolicy {
    fn default() -> Self {
        Self::new(vec![
            SourceRule::new(DAMAI_SOURCE, DAMAI_DOMAIN, 0),
            SourceRule::new(SHOWSTART_SOURCE, SHOWSTART_DOMAIN, 1),
        ])
    }
}

impl SourcePolicy {
    pub fn new(rules: Vec<SourceRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[SourceRule] {
        &self.rules
    }

    /// First rule whose domain appears in the URL. `None` means unknown provenance.
    pub fn classify(&self, detail_url: Option<&str>) -> Option<&SourceRule> {
        let url = detail_url?;
        self.rules
            .iter()
            .find(|rule| !rule.domain.is_empty() && url.contains(rule.domain.as_str()))
    }

    pub fn source_name(&self, detail_url: Option<&str>) -> &str {
        self.classify(detail_url)
            .map(|rule| rule.name.as_str())
            .unwrap_or("unknown")
    }
}
