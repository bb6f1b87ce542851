use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use props_model::{PlayerFantasyProjection, Position};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use std::collections::HashMap;
use tracing::{info, warn};

use crate::config::DatabaseConfig;
use crate::ingest::{PlayerRow, WeeklyStatRow};
use crate::models::{MarketEvaluationRow, PropOffer};

/// Weekly stat columns that may be interpolated into the history query
pub const HISTORICAL_FIELDS: [&str; 6] = [
    "passing_yards",
    "rushing_yards",
    "receiving_yards",
    "receptions",
    "passing_tds",
    "interceptions",
];

const CREATE_OFFERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS fact_dk_offers (
    id BIGSERIAL PRIMARY KEY,
    subcategory_id TEXT,
    subcategory_name TEXT NOT NULL,
    offer_label TEXT,
    provider_offer_id TEXT,
    event_id TEXT,
    event_name TEXT,
    participant_name TEXT NOT NULL,
    outcome_line DOUBLE PRECISION NOT NULL,
    over_odds INTEGER,
    under_odds INTEGER,
    fetched_at TIMESTAMPTZ NOT NULL
)
"#;

const CREATE_PROJECTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS fact_prop_projections (
    player_id TEXT NOT NULL,
    position TEXT NOT NULL,
    scoring_system TEXT NOT NULL,
    fpts_total DOUBLE PRECISION NOT NULL,
    completeness_flag BOOLEAN NOT NULL,
    missing_categories TEXT NOT NULL,
    category_breakdown TEXT NOT NULL,
    computed_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (player_id, scoring_system)
)
"#;

// Columns added after the first release of fact_prop_projections
const ALTER_PROJECTIONS_TABLE: [&str; 2] = [
    "ALTER TABLE fact_prop_projections ADD COLUMN IF NOT EXISTS fpts_display DOUBLE PRECISION",
    "ALTER TABLE fact_prop_projections ADD COLUMN IF NOT EXISTS failed_categories TEXT NOT NULL DEFAULT '{}'",
];

const CREATE_EVALUATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS fact_prop_market_evaluations (
    id BIGSERIAL PRIMARY KEY,
    player_id TEXT NOT NULL,
    position TEXT NOT NULL,
    stat_category TEXT NOT NULL,
    outcome_line DOUBLE PRECISION NOT NULL,
    over_odds INTEGER,
    under_odds INTEGER,
    mean_outcome DOUBLE PRECISION,
    fair_probability DOUBLE PRECISION,
    fair_odds INTEGER,
    bonus_probability DOUBLE PRECISION,
    error_kind TEXT,
    error_message TEXT,
    computed_at TIMESTAMPTZ NOT NULL,
    CHECK ((mean_outcome IS NULL) <> (error_kind IS NULL))
)
"#;

const CREATE_PLAYERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS players (
    display_name TEXT NOT NULL,
    position TEXT NOT NULL,
    gsis_id TEXT,
    team TEXT,
    PRIMARY KEY (display_name, position)
)
"#;

const CREATE_WEEKLY_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS fact_player_weekly (
    player_id TEXT NOT NULL,
    player_display_name TEXT NOT NULL,
    position TEXT NOT NULL,
    season INTEGER NOT NULL,
    week INTEGER NOT NULL,
    passing_yards DOUBLE PRECISION,
    passing_tds DOUBLE PRECISION,
    interceptions DOUBLE PRECISION,
    rushing_yards DOUBLE PRECISION,
    receiving_yards DOUBLE PRECISION,
    receptions DOUBLE PRECISION,
    PRIMARY KEY (player_id, season, week)
)
"#;

/// Rows per multi-row INSERT; keeps bind parameters well under the Postgres limit
const INSERT_BATCH_SIZE: usize = 1000;

/// Text columns of a projection row. Categories that were never offered go to
/// `missing`; categories whose markets all failed go to `failed` with the error.
#[derive(Debug, PartialEq)]
struct ProjectionColumns {
    missing: String,
    failed: String,
    breakdown: String,
}

impl ProjectionColumns {
    fn new(projection: &PlayerFantasyProjection) -> Result<Self> {
        let missing = projection
            .missing_categories
            .iter()
            .filter(|c| !projection.failed_categories.contains_key(c))
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(",");
        Ok(Self {
            missing,
            failed: serde_json::to_string(&projection.failed_categories)
                .context("Failed to serialize failed categories")?,
            breakdown: serde_json::to_string(&projection.category_breakdown)
                .context("Failed to serialize category breakdown")?,
        })
    }
}

/// Postgres access for offers, projections and historical stats
pub struct PropsStore {
    pool: PgPool,
}

impl PropsStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self { pool })
    }

    /// Create the offer, projection and evaluation tables if they are missing
    pub async fn ensure_schema(&self) -> Result<()> {
        let statements = [CREATE_OFFERS_TABLE, CREATE_PROJECTIONS_TABLE, CREATE_EVALUATIONS_TABLE]
            .into_iter()
            .chain(ALTER_PROJECTIONS_TABLE);
        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to create props tables")?;
        }
        Ok(())
    }

    /// Create the player and weekly stats tables the model reads
    pub async fn ensure_history_schema(&self) -> Result<()> {
        for statement in [CREATE_PLAYERS_TABLE, CREATE_WEEKLY_TABLE] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to create history tables")?;
        }
        Ok(())
    }

    pub async fn insert_offers(&self, offers: &[PropOffer]) -> Result<usize> {
        let mut tx = self.pool.begin().await.context("Failed to start transaction")?;
        for offer in offers {
            sqlx::query(
                r#"
                INSERT INTO fact_dk_offers (
                    subcategory_id, subcategory_name, offer_label, provider_offer_id,
                    event_id, event_name, participant_name, outcome_line,
                    over_odds, under_odds, fetched_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(&offer.subcategory_id)
            .bind(&offer.subcategory_name)
            .bind(&offer.offer_label)
            .bind(&offer.provider_offer_id)
            .bind(&offer.event_id)
            .bind(&offer.event_name)
            .bind(&offer.participant)
            .bind(offer.line)
            .bind(offer.over_odds)
            .bind(offer.under_odds)
            .bind(offer.timestamp)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to store offer for {}", offer.participant))?;
        }
        tx.commit().await.context("Failed to commit offers")?;

        info!("Stored {} offers in fact_dk_offers", offers.len());
        Ok(offers.len())
    }

    pub async fn upsert_projections(
        &self,
        projections: &[PlayerFantasyProjection],
        computed_at: DateTime<Utc>,
    ) -> Result<usize> {
        for projection in projections {
            let columns = ProjectionColumns::new(projection)?;

            sqlx::query(
                r#"
                INSERT INTO fact_prop_projections (
                    player_id, position, scoring_system, fpts_total, fpts_display,
                    completeness_flag, missing_categories, failed_categories,
                    category_breakdown, computed_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT (player_id, scoring_system)
                DO UPDATE SET
                    position = EXCLUDED.position,
                    fpts_total = EXCLUDED.fpts_total,
                    fpts_display = EXCLUDED.fpts_display,
                    completeness_flag = EXCLUDED.completeness_flag,
                    missing_categories = EXCLUDED.missing_categories,
                    failed_categories = EXCLUDED.failed_categories,
                    category_breakdown = EXCLUDED.category_breakdown,
                    computed_at = EXCLUDED.computed_at
                "#,
            )
            .bind(&projection.player_id)
            .bind(projection.position.as_str())
            .bind(&projection.scoring_system)
            .bind(projection.fpts_total)
            .bind(projection.display_fpts())
            .bind(projection.completeness_flag)
            .bind(columns.missing)
            .bind(columns.failed)
            .bind(columns.breakdown)
            .bind(computed_at)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to store projection for {}", projection.player_id))?;
        }

        info!("Upserted {} projections", projections.len());
        Ok(projections.len())
    }

    /// One row per market line, solved or not
    pub async fn insert_evaluations(&self, rows: &[MarketEvaluationRow], computed_at: DateTime<Utc>) -> Result<usize> {
        for chunk in rows.chunks(INSERT_BATCH_SIZE) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                r#"
                INSERT INTO fact_prop_market_evaluations (
                    player_id, position, stat_category, outcome_line, over_odds, under_odds,
                    mean_outcome, fair_probability, fair_odds, bonus_probability,
                    error_kind, error_message, computed_at
                )
                "#,
            );
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(&row.player_id)
                    .push_bind(&row.position)
                    .push_bind(&row.stat_category)
                    .push_bind(row.line)
                    .push_bind(row.over_odds)
                    .push_bind(row.under_odds)
                    .push_bind(row.mean_outcome)
                    .push_bind(row.fair_probability)
                    .push_bind(row.fair_odds)
                    .push_bind(row.bonus_probability)
                    .push_bind(&row.error_kind)
                    .push_bind(&row.error_message)
                    .push_bind(computed_at);
            });
            qb.build()
                .execute(&self.pool)
                .await
                .context("Failed to store market evaluations")?;
        }

        info!("Stored {} market evaluations", rows.len());
        Ok(rows.len())
    }

    /// Insert or refresh player rows; rows without a position are stored with an empty one
    pub async fn insert_players(&self, rows: &[PlayerRow]) -> Result<u64> {
        let mut written = 0;
        for chunk in rows.chunks(INSERT_BATCH_SIZE) {
            let mut qb: QueryBuilder<Postgres> =
                QueryBuilder::new("INSERT INTO players (display_name, position, gsis_id, team) ");
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(&row.display_name)
                    .push_bind(row.position.as_deref().unwrap_or(""))
                    .push_bind(&row.gsis_id)
                    .push_bind(&row.team);
            });
            qb.push(
                " ON CONFLICT (display_name, position) DO UPDATE SET \
                 gsis_id = EXCLUDED.gsis_id, team = EXCLUDED.team",
            );
            let result = qb.build().execute(&self.pool).await.context("Failed to store players")?;
            written += result.rows_affected();
        }

        info!("Stored {} players", written);
        Ok(written)
    }

    /// Insert weekly stat rows; already ingested player-weeks are left alone
    pub async fn insert_weekly_stats(&self, rows: &[WeeklyStatRow]) -> Result<u64> {
        let mut written = 0;
        for chunk in rows.chunks(INSERT_BATCH_SIZE) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                r#"
                INSERT INTO fact_player_weekly (
                    player_id, player_display_name, position, season, week,
                    passing_yards, passing_tds, interceptions,
                    rushing_yards, receiving_yards, receptions
                )
                "#,
            );
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(&row.player_id)
                    .push_bind(&row.player_display_name)
                    .push_bind(&row.position)
                    .push_bind(row.season)
                    .push_bind(row.week)
                    .push_bind(row.passing_yards)
                    .push_bind(row.passing_tds)
                    .push_bind(row.interceptions)
                    .push_bind(row.rushing_yards)
                    .push_bind(row.receiving_yards)
                    .push_bind(row.receptions);
            });
            qb.push(" ON CONFLICT (player_id, season, week) DO NOTHING");
            let result = qb
                .build()
                .execute(&self.pool)
                .await
                .context("Failed to store weekly stats")?;
            written += result.rows_affected();
        }

        info!("Stored {} of {} weekly rows", written, rows.len());
        Ok(written)
    }

    /// Display name -> position for fantasy-relevant players
    pub async fn load_player_positions(&self) -> Result<HashMap<String, Position>> {
        let rows = sqlx::query(
            "SELECT display_name, position FROM players WHERE position IN ('QB', 'RB', 'WR', 'TE')",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to load player positions")?;

        let mut positions = HashMap::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("display_name")?;
            let position: String = row.try_get("position")?;
            match position.parse::<Position>() {
                Ok(position) => {
                    positions.insert(name, position);
                }
                Err(e) => warn!("Skipping {}: {}", name, e),
            }
        }

        info!("Loaded positions for {} players", positions.len());
        Ok(positions)
    }

    /// Positive weekly values of one stat column for a position
    pub async fn load_weekly_values(&self, position: Position, field: &str) -> Result<Vec<f64>> {
        if !HISTORICAL_FIELDS.contains(&field) {
            anyhow::bail!("Refusing to query unknown stat column: {}", field);
        }

        let query = format!(
            "SELECT {field}::DOUBLE PRECISION FROM fact_player_weekly WHERE position = $1 AND {field} > 0"
        );
        let values: Vec<f64> = sqlx::query_scalar(&query)
            .bind(position.as_str())
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to load weekly {} for {}", field, position))?;

        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use props_model::StatCategory;
    use std::collections::BTreeMap;

    #[test]
    fn test_failed_categories_kept_apart_from_missing() {
        let projection = PlayerFantasyProjection {
            player_id: "Dak Prescott".to_string(),
            position: Position::QB,
            scoring_system: "ppr".to_string(),
            fpts_total: 19.263,
            category_breakdown: BTreeMap::new(),
            completeness_flag: false,
            missing_categories: vec![StatCategory::PassYards, StatCategory::Interceptions],
            failed_categories: BTreeMap::from([(
                StatCategory::PassYards,
                "Insufficient history for QB pass_yards: no values".to_string(),
            )]),
            zero_weighted_categories: vec![],
        };

        let columns = ProjectionColumns::new(&projection).unwrap();
        assert_eq!(columns.missing, "interceptions");
        let failed: BTreeMap<String, String> = serde_json::from_str(&columns.failed).unwrap();
        assert!(failed["pass_yards"].contains("Insufficient history"));
        assert_eq!(columns.breakdown, "{}");
        assert_eq!(projection.display_fpts(), 19.3);
    }
}
