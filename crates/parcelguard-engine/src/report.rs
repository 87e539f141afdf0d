//! Read-side filtering and aggregates over the current overlap set.
//!
//! Nothing here mutates state and nothing is cached: every call works on the
//! records it is given.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::classify::{Severity, SeverityThresholds};
use crate::error::Result;
use crate::model::{OverlapRecord, OwnerInfo, ParcelId, ResolutionState};
use crate::resolution::ResolutionLedger;
use crate::store::ParcelStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ownership {
    SameOwner,
    DifferentOwner,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    PercentageDesc,
    AreaDesc,
    DiscoveredDesc,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlapFilter {
    /// Any of these tiers; empty means all.
    pub severities: Vec<Severity>,
    pub ownership: Option<Ownership>,
    pub state: Option<ResolutionState>,
    pub min_percentage: Option<f64>,
    /// Case-insensitive match on parcel id, title, region, owner name or email.
    pub text: Option<String>,
    pub sort: SortKey,
    pub limit: Option<usize>,
}

impl OverlapFilter {
    pub fn needs_context(&self) -> bool {
        self.text.as_deref().is_some_and(|t| !t.trim().is_empty())
    }
}

/// Display data for the parcels referenced by a record set.
#[derive(Debug, Clone, Default)]
pub struct ReportContext {
    parcels: HashMap<ParcelId, ParcelSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParcelSummary {
    pub title: String,
    pub region: Option<String>,
    pub owner: Option<OwnerInfo>,
}

impl ReportContext {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Look up every parcel referenced by `records`. Deleted parcels are
    /// simply absent.
    pub fn build(store: &dyn ParcelStore, records: &[OverlapRecord]) -> Result<Self> {
        let mut parcels = HashMap::new();
        for id in records
            .iter()
            .flat_map(|r| [&r.parcel_a_id, &r.parcel_b_id])
        {
            if parcels.contains_key(id) {
                continue;
            }
            if let Some(parcel) = store.get_parcel(id)? {
                let owner = store.get_owner(id)?;
                parcels.insert(
                    id.clone(),
                    ParcelSummary {
                        title: parcel.title,
                        region: parcel.region,
                        owner,
                    },
                );
            }
        }
        Ok(Self { parcels })
    }

    pub fn insert(&mut self, id: ParcelId, summary: ParcelSummary) {
        self.parcels.insert(id, summary);
    }

    pub fn summary(&self, id: &ParcelId) -> Option<&ParcelSummary> {
        self.parcels.get(id)
    }

    fn matches(&self, id: &ParcelId, needle: &str) -> bool {
        if id.as_str().to_lowercase().contains(needle) {
            return true;
        }
        let Some(summary) = self.parcels.get(id) else {
            return false;
        };
        let hit = |s: &str| s.to_lowercase().contains(needle);
        hit(&summary.title)
            || summary.region.as_deref().is_some_and(hit)
            || summary
                .owner
                .as_ref()
                .is_some_and(|o| hit(&o.name) || hit(&o.email))
    }
}

pub fn filter_overlaps(
    records: &[OverlapRecord],
    filter: &OverlapFilter,
    context: &ReportContext,
    ledger: &ResolutionLedger,
) -> Vec<OverlapRecord> {
    let needle = filter
        .text
        .as_deref()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty());

    let mut out: Vec<OverlapRecord> = records
        .iter()
        .filter(|r| filter.severities.is_empty() || filter.severities.contains(&r.severity))
        .filter(|r| match filter.ownership {
            Some(Ownership::SameOwner) => r.same_owner,
            Some(Ownership::DifferentOwner) => !r.same_owner,
            None => true,
        })
        .filter(|r| filter.state.map_or(true, |s| ledger.state(&r.id) == s))
        .filter(|r| filter.min_percentage.map_or(true, |m| r.overlap_percentage >= m))
        .filter(|r| match &needle {
            Some(needle) => {
                context.matches(&r.parcel_a_id, needle) || context.matches(&r.parcel_b_id, needle)
            }
            None => true,
        })
        .cloned()
        .collect();

    match filter.sort {
        SortKey::PercentageDesc => crate::scanner::sort_records(&mut out),
        SortKey::AreaDesc => out.sort_by(|x, y| {
            y.overlap_area_m2
                .total_cmp(&x.overlap_area_m2)
                .then_with(|| x.id.cmp(&y.id))
        }),
        SortKey::DiscoveredDesc => out.sort_by(|x, y| {
            y.discovered_at
                .cmp(&x.discovered_at)
                .then_with(|| x.id.cmp(&y.id))
        }),
    }
    if let Some(limit) = filter.limit {
        out.truncate(limit);
    }
    out
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverlapStats {
    pub total: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    /// Records at or above the display-only critical label.
    pub critical: usize,
    pub same_owner: usize,
    pub different_owner: usize,
    /// Records whose pair has not been resolved yet.
    pub open: usize,
    pub total_overlap_area_m2: f64,
    pub max_percentage: f64,
}

impl OverlapStats {
    pub fn compute(
        records: &[OverlapRecord],
        thresholds: &SeverityThresholds,
        ledger: &ResolutionLedger,
    ) -> Self {
        let mut stats = OverlapStats {
            total: records.len(),
            by_severity: Severity::ALL.iter().map(|&s| (s, 0)).collect(),
            ..OverlapStats::default()
        };
        for record in records {
            *stats.by_severity.entry(record.severity).or_default() += 1;
            if thresholds.is_critical(record.overlap_percentage) {
                stats.critical += 1;
            }
            if record.same_owner {
                stats.same_owner += 1;
            } else {
                stats.different_owner += 1;
            }
            if ledger.state(&record.id) == ResolutionState::Open {
                stats.open += 1;
            }
            stats.total_overlap_area_m2 += record.overlap_area_m2;
            stats.max_percentage = stats.max_percentage.max(record.overlap_percentage);
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PairKey;
    use chrono::{Duration, Utc};

    fn record(a: &str, b: &str, pct: f64, same_owner: bool) -> OverlapRecord {
        let id = PairKey::new(&ParcelId::from(a), &ParcelId::from(b)).unwrap();
        OverlapRecord {
            parcel_a_id: id.low().clone(),
            parcel_b_id: id.high().clone(),
            id,
            overlap_percentage: pct,
            overlap_area_m2: pct * 10.0,
            intersection_geometry: None,
            same_owner,
            severity: SeverityThresholds::default().classify(pct),
            discovered_at: Utc::now() - Duration::seconds(pct as i64),
        }
    }

    fn records() -> Vec<OverlapRecord> {
        vec![
            record("a", "b", 12.0, true),
            record("c", "d", 60.0, false),
            record("e", "f", 25.0, false),
        ]
    }

    #[test]
    fn filters_by_severity_and_ownership() {
        let ledger = ResolutionLedger::new();
        let ctx = ReportContext::empty();

        let blocked = filter_overlaps(
            &records(),
            &OverlapFilter {
                severities: vec![Severity::Blocked],
                ..OverlapFilter::default()
            },
            &ctx,
            &ledger,
        );
        assert_eq!(blocked.len(), 2);
        assert_eq!(blocked[0].overlap_percentage, 60.0);

        let same = filter_overlaps(
            &records(),
            &OverlapFilter {
                ownership: Some(Ownership::SameOwner),
                ..OverlapFilter::default()
            },
            &ctx,
            &ledger,
        );
        assert_eq!(same.len(), 1);
        assert_eq!(same[0].parcel_a_id.as_str(), "a");
    }

    #[test]
    fn text_search_covers_title_region_and_owner() {
        let mut ctx = ReportContext::empty();
        ctx.insert(
            ParcelId::from("c"),
            ParcelSummary {
                title: "Riverside plot".to_string(),
                region: Some("Kiambu".to_string()),
                owner: None,
            },
        );
        ctx.insert(
            ParcelId::from("f"),
            ParcelSummary {
                title: String::new(),
                region: None,
                owner: Some(OwnerInfo {
                    id: "o".to_string(),
                    name: "Wanjiru".to_string(),
                    email: "w@example.com".to_string(),
                    phone: None,
                }),
            },
        );
        let ledger = ResolutionLedger::new();
        let search = |text: &str| {
            filter_overlaps(
                &records(),
                &OverlapFilter {
                    text: Some(text.to_string()),
                    ..OverlapFilter::default()
                },
                &ctx,
                &ledger,
            )
            .into_iter()
            .map(|r| r.id.to_string())
            .collect::<Vec<_>>()
        };
        assert_eq!(search("riverside"), vec!["c|d"]);
        assert_eq!(search("KIAMBU"), vec!["c|d"]);
        assert_eq!(search("wanjiru"), vec!["e|f"]);
        assert_eq!(search("w@example"), vec!["e|f"]);
        assert!(search("nowhere").is_empty());
    }

    #[test]
    fn sort_and_limit() {
        let ledger = ResolutionLedger::new();
        let ctx = ReportContext::empty();
        let newest = filter_overlaps(
            &records(),
            &OverlapFilter {
                sort: SortKey::DiscoveredDesc,
                limit: Some(1),
                ..OverlapFilter::default()
            },
            &ctx,
            &ledger,
        );
        // Lowest percentage was discovered most recently in the fixture.
        assert_eq!(newest.len(), 1);
        assert_eq!(newest[0].overlap_percentage, 12.0);
    }

    #[test]
    fn stats_are_recomputed_from_records() {
        let stats = OverlapStats::compute(
            &records(),
            &SeverityThresholds::default(),
            &ResolutionLedger::new(),
        );
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_severity[&Severity::Blocked], 2);
        assert_eq!(stats.by_severity[&Severity::High], 1);
        assert_eq!(stats.by_severity[&Severity::Low], 0);
        assert_eq!(stats.critical, 1);
        assert_eq!(stats.same_owner, 1);
        assert_eq!(stats.different_owner, 2);
        assert_eq!(stats.open, 3);
        assert_eq!(stats.max_percentage, 60.0);
        assert!((stats.total_overlap_area_m2 - 970.0).abs() < 1e-9);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["by_severity"]["blocked"], 2);
    }
}
