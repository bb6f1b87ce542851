use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use props_model::PlayerFantasyProjection;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::models::PropOffer;

/// Timestamp embedded in snapshot file names
pub fn snapshot_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d%H%M%S").to_string()
}

/// Writes raw responses, parsed offers and projections as JSON files
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    root: PathBuf,
}

impl SnapshotWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `raw/<subcategory>_<ts>.json`
    pub fn write_raw(&self, subcategory: &str, raw: &serde_json::Value, timestamp: &str) -> Result<PathBuf> {
        self.write_json("raw", &format!("{}_{}.json", file_stem(subcategory), timestamp), raw)
    }

    /// `parsed/parsed_props_<ts>.json`
    pub fn write_parsed(&self, offers: &[PropOffer], timestamp: &str) -> Result<PathBuf> {
        self.write_json("parsed", &format!("parsed_props_{}.json", timestamp), &offers)
    }

    /// `projections/<system>_<ts>.json`
    pub fn write_projections(
        &self,
        scoring_system: &str,
        projections: &[PlayerFantasyProjection],
        timestamp: &str,
    ) -> Result<PathBuf> {
        self.write_json(
            "projections",
            &format!("{}_{}.json", file_stem(scoring_system), timestamp),
            &projections,
        )
    }

    fn write_json<T: Serialize + ?Sized>(&self, dir: &str, file_name: &str, value: &T) -> Result<PathBuf> {
        let dir = self.root.join(dir);
        fs::create_dir_all(&dir).with_context(|| format!("Failed to create directory: {:?}", dir))?;

        let path = dir.join(file_name);
        let body = serde_json::to_string_pretty(value).context("Failed to serialize snapshot")?;
        fs::write(&path, body).with_context(|| format!("Failed to write snapshot: {:?}", path))?;

        debug!("Wrote snapshot {:?}", path);
        Ok(path)
    }
}

/// Load offers back from a parsed snapshot
pub fn read_parsed(path: &Path) -> Result<Vec<PropOffer>> {
    let body = fs::read_to_string(path).with_context(|| format!("Failed to read snapshot: {:?}", path))?;
    serde_json::from_str(&body).with_context(|| format!("Failed to parse snapshot: {:?}", path))
}

/// Lowercase file-name-safe form of a market or scoring-system name
fn file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    stem.split('_').filter(|part| !part.is_empty()).collect::<Vec<_>>().join("_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use props_model::Position;
    use std::collections::BTreeMap;

    fn offer() -> PropOffer {
        PropOffer {
            subcategory_id: Some("9524".to_string()),
            subcategory_name: "Pass Yards O/U".to_string(),
            offer_label: Some("Tua Tagovailoa Passing Yards".to_string()),
            provider_offer_id: None,
            event_id: Some("30451278".to_string()),
            event_name: None,
            participant: "Tua Tagovailoa".to_string(),
            line: 245.5,
            over_odds: Some(-115),
            under_odds: Some(-105),
            timestamp: Utc.with_ymd_and_hms(2024, 9, 12, 18, 5, 9).unwrap(),
        }
    }

    #[test]
    fn test_snapshot_timestamp_format() {
        let at = Utc.with_ymd_and_hms(2024, 9, 12, 18, 5, 9).unwrap();
        assert_eq!(snapshot_timestamp(at), "20240912180509");
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("Pass Yards O/U"), "pass_yards_o_u");
        assert_eq!(file_stem("half_ppr"), "half_ppr");
    }

    #[test]
    fn test_snapshot_layout() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::new(dir.path());
        let ts = "20240912180509";

        let raw = writer
            .write_raw("TD Scorer", &serde_json::json!({ "eventGroup": {} }), ts)
            .unwrap();
        assert_eq!(raw, dir.path().join("raw").join("td_scorer_20240912180509.json"));

        let parsed = writer.write_parsed(&[offer()], ts).unwrap();
        assert_eq!(parsed, dir.path().join("parsed").join("parsed_props_20240912180509.json"));
        assert_eq!(read_parsed(&parsed).unwrap(), vec![offer()]);

        let projection = PlayerFantasyProjection {
            player_id: "Tua Tagovailoa".to_string(),
            position: Position::QB,
            scoring_system: "ppr".to_string(),
            fpts_total: 17.84,
            category_breakdown: BTreeMap::new(),
            completeness_flag: false,
            missing_categories: vec![],
            failed_categories: BTreeMap::new(),
            zero_weighted_categories: vec![],
        };
        let path = writer.write_projections("ppr", &[projection], ts).unwrap();
        assert!(path.ends_with("projections/ppr_20240912180509.json"));
        let body = fs::read_to_string(path).unwrap();
        assert!(body.contains("\"fpts_total\": 17.84"));
    }
}
