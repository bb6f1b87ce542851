//! CSV ingestion for the weekly stats and player tables the model reads

use anyhow::{Context, Result};
use props_model::Position;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

/// One player-week from a weekly stats export
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WeeklyStatRow {
    pub player_id: String,
    pub player_display_name: String,
    pub position: String,
    pub season: i32,
    pub week: i32,
    #[serde(default)]
    pub passing_yards: Option<f64>,
    #[serde(default)]
    pub passing_tds: Option<f64>,
    #[serde(default)]
    pub interceptions: Option<f64>,
    #[serde(default)]
    pub rushing_yards: Option<f64>,
    #[serde(default)]
    pub receiving_yards: Option<f64>,
    #[serde(default)]
    pub receptions: Option<f64>,
}

/// One row of a player id crosswalk
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlayerRow {
    #[serde(rename = "name", alias = "display_name")]
    pub display_name: String,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub gsis_id: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
}

/// Weekly rows for fantasy positions; other positions and bad rows are skipped
pub fn read_weekly_stats<R: Read>(reader: R) -> Result<Vec<WeeklyStatRow>> {
    let mut reader = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();
    let mut skipped = 0usize;

    for result in reader.deserialize::<WeeklyStatRow>() {
        match result {
            Ok(mut row) => match row.position.parse::<Position>() {
                Ok(position) => {
                    row.position = position.as_str().to_string();
                    rows.push(row);
                }
                Err(_) => skipped += 1,
            },
            Err(e) => {
                warn!("Skipping malformed weekly row: {}", e);
                skipped += 1;
            }
        }
    }

    info!("Read {} weekly rows ({} skipped)", rows.len(), skipped);
    Ok(rows)
}

/// Player rows with a usable name, first row wins per (name, position).
/// Blank names and bad rows are skipped.
pub fn read_players<R: Read>(reader: R) -> Result<Vec<PlayerRow>> {
    let mut reader = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();
    let mut seen = HashSet::new();

    for result in reader.deserialize::<PlayerRow>() {
        match result {
            Ok(mut row) => {
                row.display_name = row.display_name.trim().to_string();
                if row.display_name.is_empty() {
                    continue;
                }
                if !seen.insert((row.display_name.clone(), row.position.clone())) {
                    continue;
                }
                rows.push(row);
            }
            Err(e) => warn!("Skipping malformed player row: {}", e),
        }
    }

    info!("Read {} player rows", rows.len());
    Ok(rows)
}

pub fn read_weekly_stats_file(path: &Path) -> Result<Vec<WeeklyStatRow>> {
    let file = File::open(path).with_context(|| format!("Failed to open weekly stats CSV {:?}", path))?;
    read_weekly_stats(file)
}

pub fn read_players_file(path: &Path) -> Result<Vec<PlayerRow>> {
    let file = File::open(path).with_context(|| format!("Failed to open player CSV {:?}", path))?;
    read_players(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_weekly_rows_map_by_header() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "player_id,player_name,player_display_name,position,recent_team,season,week,completions,passing_yards,passing_tds,interceptions,rushing_yards,receptions,receiving_yards"
        )
        .unwrap();
        writeln!(file, "00-0034857,J.Allen,Josh Allen,QB,BUF,2023,1,29,297,1,3,14,0,0").unwrap();
        writeln!(file, "00-0036389,J.Hurts,Jalen Hurts,qb,PHI,2023,1,22,170,1,0,37,,").unwrap();
        writeln!(file, "00-0033873,J.Tucker,Justin Tucker,K,BAL,2023,1,0,0,0,0,0,0,0").unwrap();
        writeln!(file, "broken,row").unwrap();

        let rows = read_weekly_stats_file(file.path()).unwrap();
        assert_eq!(rows.len(), 2);

        let allen = &rows[0];
        assert_eq!(allen.player_display_name, "Josh Allen");
        assert_eq!(allen.position, "QB");
        assert_eq!((allen.season, allen.week), (2023, 1));
        assert_eq!(allen.passing_yards, Some(297.0));
        assert_eq!(allen.interceptions, Some(3.0));

        assert_eq!(rows[1].position, "QB");
        assert_eq!(rows[1].rushing_yards, Some(37.0));
        assert_eq!(rows[1].receiving_yards, None);
    }

    #[test]
    fn test_player_rows_map_by_header() {
        let csv = "mfl_id,gsis_id,name,merge_name,position,team\n\
                   13604,00-0036389,Jalen Hurts,jalen hurts,QB,PHI\n\
                   14777,,Puka Nacua,puka nacua,WR,LAR\n\
                   14777,,Puka Nacua,puka nacua,WR,LA\n\
                   1,,  ,blank,WR,\n";
        let rows = read_players(csv.as_bytes()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].display_name, "Jalen Hurts");
        assert_eq!(rows[0].gsis_id.as_deref(), Some("00-0036389"));
        assert_eq!(rows[1].position.as_deref(), Some("WR"));
        assert_eq!(rows[1].team.as_deref(), Some("LAR"));
        assert_eq!(rows[1].gsis_id, None);
    }

    #[test]
    fn test_missing_file() {
        assert!(read_players_file(Path::new("/nonexistent/players.csv")).is_err());
    }
}
