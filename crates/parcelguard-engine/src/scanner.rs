//! Pairwise overlap scanner.
//!
//! ```text
//! parcels ──► prepare (validate, bbox, area; once per parcel)
//!                │
//!                ▼
//!         candidate pairs (i < j) ── bbox disjoint? ──► rejected (counted)
//!                │
//!                ▼
//!         exact intersection ──► overlap_measure ──► OverlapRecord (≥ min_reportable)
//! ```
//!
//! A scan works on the snapshot it is handed and never re-reads the store.
//! Bad parcels and failed pairs become [`ScanWarning`]s; they never abort the
//! batch. Rows of the pair matrix run independently (optionally on the rayon
//! pool) and their outputs are merged and sorted at the end, so the result is
//! identical whatever the scheduling.

use std::time::Instant;

use ahash::AHashSet;
use chrono::{DateTime, Utc};
use geo::{MultiPolygon, Polygon};
use parcelguard_geometry::{
    area, boxes_disjoint, intersect_prepared, multi_area, overlap_measure, polygons_equivalent,
    BoundingBox, GeometryError,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::{CandidateStrategy, EngineConfig};
use crate::error::{OverlapError, Result};
use crate::model::{OverlapRecord, PairKey, Parcel, ParcelId};
use crate::spatial::CandidateIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanWarningKind {
    InvalidGeometry,
    DuplicateParcelId,
    IntersectionComputationFailed,
}

/// A parcel or pair that was skipped, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanWarning {
    pub kind: ScanWarningKind,
    pub parcel_ids: Vec<ParcelId>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub parcels_received: usize,
    /// Draft or archived parcels filtered out.
    pub parcels_ineligible: usize,
    pub duplicate_ids: usize,
    pub parcels_invalid: usize,
    pub parcels_scanned: usize,
    pub pairs_total: u64,
    pub bbox_rejected: u64,
    pub candidate_pairs: u64,
    pub intersections_computed: u64,
    pub duplicate_fast_path: u64,
    pub intersection_failures: u64,
    pub records_emitted: usize,
    pub elapsed_ms: u64,
}

/// Output of one scan invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    /// Sorted by percentage (desc), then by pair id.
    pub records: Vec<OverlapRecord>,
    pub warnings: Vec<ScanWarning>,
    pub stats: ScanStats,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ScanReport {
    /// Parcels left out because of bad geometry or a repeated id.
    pub fn skipped_parcels(&self) -> usize {
        self.stats.parcels_invalid + self.stats.duplicate_ids
    }
}

/// A parcel with everything the pair loop needs computed once.
struct PreparedParcel<'a> {
    parcel: &'a Parcel,
    polygon: Polygon<f64>,
    bbox: BoundingBox,
    area_m2: f64,
}

#[derive(Default)]
struct RowOutcome {
    records: Vec<OverlapRecord>,
    warnings: Vec<ScanWarning>,
    candidate_pairs: u64,
    intersections_computed: u64,
    duplicate_fast_path: u64,
    intersection_failures: u64,
}

#[derive(Debug, Clone)]
pub struct OverlapScanner {
    config: EngineConfig,
}

impl OverlapScanner {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// All reportable overlaps among `parcels`.
    pub fn scan(&self, parcels: &[Parcel]) -> ScanReport {
        let clock = Instant::now();
        let started_at = Utc::now();
        let mut stats = ScanStats {
            parcels_received: parcels.len(),
            ..ScanStats::default()
        };
        let mut warnings = Vec::new();

        let prepared = self.prepare_all(parcels, &mut stats, &mut warnings);
        let n = prepared.len();
        stats.parcels_scanned = n;
        stats.pairs_total = (n as u64) * (n.saturating_sub(1) as u64) / 2;

        let index = match self.config.candidate_strategy {
            CandidateStrategy::RTree => {
                Some(CandidateIndex::build(prepared.iter().map(|p| &p.bbox)))
            }
            CandidateStrategy::BruteForce => None,
        };

        let row = |i: usize| -> RowOutcome {
            let a = &prepared[i];
            let candidates: Vec<usize> = match &index {
                Some(index) => index
                    .candidates_after(i, &a.bbox)
                    .into_iter()
                    .filter(|&j| !boxes_disjoint(&a.bbox, &prepared[j].bbox))
                    .collect(),
                None => ((i + 1)..n)
                    .filter(|&j| !boxes_disjoint(&a.bbox, &prepared[j].bbox))
                    .collect(),
            };
            self.compare_row(
                a,
                candidates.into_iter().map(|j| &prepared[j]),
                self.config.min_reportable_pct,
                started_at,
            )
        };

        let rows: Vec<RowOutcome> = if self.config.parallel {
            (0..n).into_par_iter().map(&row).collect()
        } else {
            (0..n).map(&row).collect()
        };

        let report = self.finish(rows, warnings, stats, started_at, clock);
        tracing::info!(
            parcels = report.stats.parcels_scanned,
            skipped = report.skipped_parcels(),
            pairs = report.stats.pairs_total,
            bbox_rejected = report.stats.bbox_rejected,
            intersections = report.stats.intersections_computed,
            records = report.stats.records_emitted,
            elapsed_ms = report.stats.elapsed_ms,
            "overlap scan finished"
        );
        report
    }

    /// Overlaps between one new `candidate` and the `existing` parcels.
    ///
    /// Used at creation time, so the candidate is compared regardless of its
    /// status and an invalid candidate boundary is an error rather than a
    /// warning. The reporting floor never hides a blocked overlap here.
    pub fn scan_candidate(&self, candidate: &Parcel, existing: &[Parcel]) -> Result<ScanReport> {
        let clock = Instant::now();
        let started_at = Utc::now();
        let prepared_candidate = self
            .prepare(candidate)
            .map_err(|err| OverlapError::invalid_geometry(&candidate.id, err))?;

        let others: Vec<Parcel> = existing
            .iter()
            .filter(|p| p.id != candidate.id)
            .cloned()
            .collect();
        let mut stats = ScanStats {
            parcels_received: others.len() + 1,
            ..ScanStats::default()
        };
        let mut warnings = Vec::new();
        let prepared = self.prepare_all(&others, &mut stats, &mut warnings);
        stats.parcels_scanned = prepared.len() + 1;
        stats.pairs_total = prepared.len() as u64;

        let row = self.compare_row(
            &prepared_candidate,
            prepared
                .iter()
                .filter(|b| !boxes_disjoint(&prepared_candidate.bbox, &b.bbox)),
            self.config
                .min_reportable_pct
                .min(self.config.thresholds.block_pct),
            started_at,
        );

        Ok(self.finish(vec![row], warnings, stats, started_at, clock))
    }

    /// Measure a single pair, ignoring the reporting threshold.
    ///
    /// Returns `Ok(None)` when the parcels do not overlap with positive area.
    pub fn compare(&self, a: &Parcel, b: &Parcel) -> Result<Option<OverlapRecord>> {
        let pa = self
            .prepare(a)
            .map_err(|err| OverlapError::invalid_geometry(&a.id, err))?;
        let pb = self
            .prepare(b)
            .map_err(|err| OverlapError::invalid_geometry(&b.id, err))?;
        if boxes_disjoint(&pa.bbox, &pb.bbox) {
            return Ok(None);
        }

        let mut row = RowOutcome::default();
        self.compare_pair(&pa, &pb, Utc::now(), &mut row)
            .map_err(|err| match (err, PairKey::new(&a.id, &b.id)) {
                (GeometryError::IntersectionComputationFailed { reason }, Some(overlap_id)) => {
                    OverlapError::IntersectionComputationFailed { overlap_id, reason }
                }
                (err, _) => OverlapError::invalid_geometry(&a.id, err),
            })
    }

    // ========================================================================
    // Preparation
    // ========================================================================

    fn prepare_all<'a>(
        &self,
        parcels: &'a [Parcel],
        stats: &mut ScanStats,
        warnings: &mut Vec<ScanWarning>,
    ) -> Vec<PreparedParcel<'a>> {
        let mut seen: AHashSet<&ParcelId> = AHashSet::with_capacity(parcels.len());
        let mut prepared = Vec::with_capacity(parcels.len());

        for parcel in parcels {
            if !parcel.status.is_scannable() {
                stats.parcels_ineligible += 1;
                continue;
            }
            if !seen.insert(&parcel.id) {
                stats.duplicate_ids += 1;
                tracing::warn!(parcel_id = %parcel.id, "duplicate parcel id in scan input, keeping the first");
                warnings.push(ScanWarning {
                    kind: ScanWarningKind::DuplicateParcelId,
                    parcel_ids: vec![parcel.id.clone()],
                    message: format!("parcel {} appears more than once", parcel.id),
                });
                continue;
            }
            match self.prepare(parcel) {
                Ok(p) => prepared.push(p),
                Err(err) => {
                    stats.parcels_invalid += 1;
                    tracing::warn!(parcel_id = %parcel.id, error = %err, "skipping parcel with invalid boundary");
                    warnings.push(ScanWarning {
                        kind: ScanWarningKind::InvalidGeometry,
                        parcel_ids: vec![parcel.id.clone()],
                        message: err.to_string(),
                    });
                }
            }
        }
        prepared
    }

    fn prepare<'a>(
        &self,
        parcel: &'a Parcel,
    ) -> std::result::Result<PreparedParcel<'a>, GeometryError> {
        let polygon = parcel.boundary.to_polygon()?;
        let bbox = BoundingBox::of(&polygon).ok_or_else(|| GeometryError::InvalidGeometry {
            reason: "boundary has no extent".to_string(),
        })?;

        let area_m2 = match parcel.area_m2 {
            Some(stored) if self.config.trust_stored_area && stored.is_finite() && stored > 0.0 => {
                stored
            }
            _ => area(&polygon, self.config.coordinate_space),
        };
        if area_m2 <= self.config.area_epsilon_m2 {
            return Err(GeometryError::InvalidGeometry {
                reason: format!("degenerate boundary area ({area_m2} m²)"),
            });
        }

        Ok(PreparedParcel {
            parcel,
            polygon,
            bbox,
            area_m2,
        })
    }

    // ========================================================================
    // Pair loop
    // ========================================================================

    fn compare_row<'p, 'a: 'p>(
        &self,
        a: &PreparedParcel<'a>,
        candidates: impl Iterator<Item = &'p PreparedParcel<'a>>,
        floor_pct: f64,
        discovered_at: DateTime<Utc>,
    ) -> RowOutcome {
        let mut row = RowOutcome::default();

        for b in candidates {
            row.candidate_pairs += 1;
            match self.compare_pair(a, b, discovered_at, &mut row) {
                Ok(Some(record)) if record.overlap_percentage >= floor_pct => {
                    row.records.push(record);
                }
                Ok(_) => {}
                Err(err) => {
                    row.intersection_failures += 1;
                    tracing::warn!(
                        parcel_a = %a.parcel.id,
                        parcel_b = %b.parcel.id,
                        error = %err,
                        "skipping pair after geometry failure"
                    );
                    row.warnings.push(ScanWarning {
                        kind: ScanWarningKind::IntersectionComputationFailed,
                        parcel_ids: vec![a.parcel.id.clone(), b.parcel.id.clone()],
                        message: err.to_string(),
                    });
                }
            }
        }
        row
    }

    /// Exact overlap of one pair. Always measured in canonical id order so
    /// `(a, b)` and `(b, a)` produce the same record.
    fn compare_pair<'p>(
        &self,
        a: &'p PreparedParcel<'p>,
        b: &'p PreparedParcel<'p>,
        discovered_at: DateTime<Utc>,
        row: &mut RowOutcome,
    ) -> std::result::Result<Option<OverlapRecord>, GeometryError> {
        let (a, b) = if a.parcel.id <= b.parcel.id { (a, b) } else { (b, a) };
        let Some(id) = PairKey::new(&a.parcel.id, &b.parcel.id) else {
            return Ok(None);
        };
        let space = self.config.coordinate_space;

        let (geometry, intersection_area) = if self.config.exact_duplicate_fast_path
            && polygons_equivalent(&a.polygon, &b.polygon)
        {
            row.duplicate_fast_path += 1;
            (
                Some(MultiPolygon::new(vec![a.polygon.clone()])),
                a.area_m2.min(b.area_m2),
            )
        } else {
            row.intersections_computed += 1;
            match intersect_prepared(&a.polygon, &b.polygon)? {
                Some(geometry) => {
                    let inter = multi_area(&geometry, space);
                    (Some(geometry), inter)
                }
                None => (None, 0.0),
            }
        };

        let Some(measure) = overlap_measure(
            intersection_area,
            a.area_m2,
            b.area_m2,
            self.config.area_epsilon_m2,
        ) else {
            return Ok(None);
        };
        if measure.area_m2 <= 0.0 {
            return Ok(None);
        }

        Ok(Some(OverlapRecord {
            parcel_a_id: a.parcel.id.clone(),
            parcel_b_id: b.parcel.id.clone(),
            id,
            overlap_percentage: measure.percentage,
            overlap_area_m2: measure.area_m2,
            intersection_geometry: geometry,
            same_owner: a.parcel.owner_id == b.parcel.owner_id,
            severity: self.config.thresholds.classify(measure.percentage),
            discovered_at,
        }))
    }

    fn finish(
        &self,
        rows: Vec<RowOutcome>,
        mut warnings: Vec<ScanWarning>,
        mut stats: ScanStats,
        started_at: DateTime<Utc>,
        clock: Instant,
    ) -> ScanReport {
        let mut records = Vec::new();
        for row in rows {
            stats.candidate_pairs += row.candidate_pairs;
            stats.intersections_computed += row.intersections_computed;
            stats.duplicate_fast_path += row.duplicate_fast_path;
            stats.intersection_failures += row.intersection_failures;
            records.extend(row.records);
            warnings.extend(row.warnings);
        }
        stats.bbox_rejected = stats.pairs_total.saturating_sub(stats.candidate_pairs);

        sort_records(&mut records);
        stats.records_emitted = records.len();
        stats.elapsed_ms = clock.elapsed().as_millis() as u64;

        ScanReport {
            records,
            warnings,
            stats,
            started_at,
            finished_at: Utc::now(),
        }
    }
}

/// Percentage descending, ties broken by pair id.
pub fn sort_records(records: &mut [OverlapRecord]) {
    records.sort_by(|x, y| {
        y.overlap_percentage
            .total_cmp(&x.overlap_percentage)
            .then_with(|| x.id.cmp(&y.id))
    });
}
