//! Engine configuration.

use std::path::Path;

use parcelguard_geometry::CoordinateSpace;
use serde::{Deserialize, Serialize};

use crate::classify::SeverityThresholds;
use crate::error::{OverlapError, Result};

/// How candidate pairs are generated before the exact intersection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStrategy {
    /// Every unordered pair, each rejected by a bounding-box test.
    BruteForce,
    /// R-tree over bounding boxes; only intersecting envelopes are visited.
    #[default]
    RTree,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub thresholds: SeverityThresholds,
    /// Overlaps below this percentage are not reported at all.
    pub min_reportable_pct: f64,
    pub coordinate_space: CoordinateSpace,
    pub candidate_strategy: CandidateStrategy,
    /// Spread the pairwise loop over the rayon pool.
    pub parallel: bool,
    /// Skip the boolean op when two boundaries are the same ring.
    pub exact_duplicate_fast_path: bool,
    /// Use `Parcel::area_m2` from the store instead of recomputing it.
    pub trust_stored_area: bool,
    /// Intersection areas at or below this are float noise.
    pub area_epsilon_m2: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thresholds: SeverityThresholds::default(),
            min_reportable_pct: 10.0,
            coordinate_space: CoordinateSpace::Geographic,
            candidate_strategy: CandidateStrategy::RTree,
            parallel: true,
            exact_duplicate_fast_path: true,
            trust_stored_area: false,
            area_epsilon_m2: 1e-9,
        }
    }
}

impl EngineConfig {
    /// Metric-coordinate configuration, mostly useful for fixtures.
    pub fn projected() -> Self {
        Self {
            coordinate_space: CoordinateSpace::Projected,
            ..Self::default()
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            OverlapError::InvalidConfig(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(contents: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(contents)
            .map_err(|e| OverlapError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.thresholds;
        let in_range = |v: f64| v.is_finite() && (0.0..=100.0).contains(&v);

        for (name, value) in [
            ("warning_pct", t.warning_pct),
            ("block_pct", t.block_pct),
            ("critical_label_pct", t.critical_label_pct),
            ("min_reportable_pct", self.min_reportable_pct),
        ] {
            if !in_range(value) {
                return Err(OverlapError::InvalidConfig(format!(
                    "{name} must be within [0, 100], got {value}"
                )));
            }
        }
        if t.warning_pct >= t.block_pct {
            return Err(OverlapError::InvalidConfig(format!(
                "warning_pct ({}) must be below block_pct ({})",
                t.warning_pct, t.block_pct
            )));
        }
        if t.critical_label_pct < t.block_pct {
            return Err(OverlapError::InvalidConfig(format!(
                "critical_label_pct ({}) must not be below block_pct ({})",
                t.critical_label_pct, t.block_pct
            )));
        }
        if self.min_reportable_pct > t.block_pct {
            return Err(OverlapError::InvalidConfig(format!(
                "min_reportable_pct ({}) must not exceed block_pct ({})",
                self.min_reportable_pct, t.block_pct
            )));
        }
        if !self.area_epsilon_m2.is_finite() || self.area_epsilon_m2 < 0.0 {
            return Err(OverlapError::InvalidConfig(format!(
                "area_epsilon_m2 must be a non-negative number, got {}",
                self.area_epsilon_m2
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.thresholds.warning_pct, 10.0);
        assert_eq!(config.thresholds.block_pct, 20.0);
        assert_eq!(config.min_reportable_pct, 10.0);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{"coordinate_space": "projected", "thresholds": {"block_pct": 30.0}}"#,
        )
        .unwrap();
        assert_eq!(config.coordinate_space, CoordinateSpace::Projected);
        assert_eq!(config.thresholds.block_pct, 30.0);
        assert_eq!(config.thresholds.warning_pct, 10.0);
        assert_eq!(config.candidate_strategy, CandidateStrategy::RTree);
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let err = EngineConfig::from_json_str(
            r#"{"thresholds": {"warning_pct": 25.0, "block_pct": 20.0}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, OverlapError::InvalidConfig(_)));
    }

    #[test]
    fn out_of_range_percentages_are_rejected() {
        assert!(EngineConfig::from_json_str(r#"{"min_reportable_pct": 150.0}"#).is_err());
        assert!(EngineConfig::from_json_str(
            r#"{"thresholds": {"critical_label_pct": 15.0}}"#
        )
        .is_err());
    }

    #[test]
    fn reporting_floor_above_block_threshold_is_rejected() {
        let err = EngineConfig::from_json_str(r#"{"min_reportable_pct": 30.0}"#).unwrap_err();
        assert!(matches!(err, OverlapError::InvalidConfig(ref msg) if msg.contains("block_pct")));
        EngineConfig::from_json_str(r#"{"min_reportable_pct": 20.0}"#).unwrap();
    }

    #[test]
    fn config_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"parallel": false}"#).unwrap();
        let config = EngineConfig::from_json_file(&path).unwrap();
        assert!(!config.parallel);
    }
}
