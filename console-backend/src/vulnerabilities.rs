//! Vulnerability summaries per image and per team.

use std::collections::HashSet;

use async_graphql::SimpleObject;
use async_trait::async_trait;

/// Reported severity of a finding. Anything else reported by the scanner is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Unassigned,
}

impl Severity {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "CRITICAL" => Some(Severity::Critical),
            "HIGH" => Some(Severity::High),
            "MEDIUM" => Some(Severity::Medium),
            "LOW" => Some(Severity::Low),
            "UNASSIGNED" => Some(Severity::Unassigned),
            _ => None,
        }
    }

    fn weight(&self) -> i32 {
        match self {
            Severity::Critical => 10,
            Severity::High | Severity::Unassigned => 5,
            Severity::Medium => 3,
            Severity::Low => 1,
        }
    }
}

/// A single vulnerability reported against a component of an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub id: String,
    pub aliases: Vec<String>,
    pub component: String,
    pub severity: String,
}

impl Finding {
    /// CVE identifier when the finding or one of its aliases has one, its own id otherwise.
    pub fn canonical_id(&self) -> &str {
        if self.id.starts_with("CVE-") {
            return &self.id;
        }
        self.aliases
            .iter()
            .find(|alias| alias.starts_with("CVE-"))
            .unwrap_or(&self.id)
    }
}

/// What the scanner knows about one image.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImageFindings {
    pub has_bom: bool,
    pub findings: Vec<Finding>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, SimpleObject)]
pub struct Summary {
    pub critical: i32,
    pub high: i32,
    pub medium: i32,
    pub low: i32,
    pub unassigned: i32,
    pub total: i32,
    pub risk_score: i32,
}

impl Summary {
    /// Reported for images that have never been scanned.
    pub const NO_BOM: Summary = Summary {
        critical: -1,
        high: -1,
        medium: -1,
        low: -1,
        unassigned: -1,
        total: -1,
        risk_score: -1,
    };

    pub fn has_bom(&self) -> bool {
        *self != Self::NO_BOM
    }

    fn add(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
            Severity::Unassigned => self.unassigned += 1,
        }
        self.total += 1;
        self.risk_score += severity.weight();
    }
}

/// Count findings per severity bucket.
///
/// Findings are deduplicated by canonical CVE id and component, so the same CVE reported under a
/// GHSA alias and under its CVE id for one component counts once.
pub fn summarize(findings: &[Finding], has_bom: bool) -> Summary {
    if !has_bom {
        return Summary::NO_BOM;
    }

    let mut seen = HashSet::new();
    let mut summary = Summary::default();
    for finding in findings {
        let Some(severity) = Severity::parse(&finding.severity) else {
            continue;
        };
        if !seen.insert((finding.canonical_id(), finding.component.as_str())) {
            continue;
        }
        summary.add(severity);
    }
    summary
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, SimpleObject)]
pub struct TeamSummary {
    pub summary: Summary,
    pub apps_with_bom: i32,
    pub apps_without_bom: i32,
}

/// Sum app summaries, skipping apps without a BOM.
pub fn team_summary<'a>(summaries: impl IntoIterator<Item = &'a Summary>) -> TeamSummary {
    let mut team = TeamSummary::default();
    for summary in summaries {
        if !summary.has_bom() {
            team.apps_without_bom += 1;
            continue;
        }
        team.apps_with_bom += 1;
        team.summary.critical += summary.critical;
        team.summary.high += summary.high;
        team.summary.medium += summary.medium;
        team.summary.low += summary.low;
        team.summary.unassigned += summary.unassigned;
        team.summary.total += summary.total;
        team.summary.risk_score += summary.risk_score;
    }
    team
}

#[async_trait]
pub trait VulnerabilitySource: Send + Sync {
    /// Findings for `image` (`name:tag`). `None` when the scanner has no project for it.
    async fn findings(&self, image: &str) -> anyhow::Result<Option<ImageFindings>>;
}
