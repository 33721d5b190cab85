//! Points ledger and leveling.
//!
//! The ledger is append-only: points are never deleted or edited, only
//! countered by an explicit reversal entry. Cumulative experience is
//! always the sum of the entries, so the total cannot silently drift.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::LearnError;
use crate::shared::schema::learn_points_ledger;
use crate::shared::state::AppState;
use crate::shared::utils::DbPool;

// Grant magnitudes per reason.
pub const LESSON_COMPLETE_POINTS: i32 = 25;
pub const ASSIGNMENT_GRADED_POINTS: i32 = 50;
pub const BADGE_BONUS_POINTS: i32 = 15;

// ----- Models -----

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = learn_points_ledger)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub learner_id: Uuid,
    pub event_id: Option<Uuid>,
    pub reason: String,
    pub points: i32,
    pub reverses: Option<Uuid>,
    pub granted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    LessonComplete,
    AssignmentGraded,
    BadgeBonus,
    Reversal,
}

impl From<&str> for ReasonCode {
    fn from(s: &str) -> Self {
        match s {
            "assignment_graded" => Self::AssignmentGraded,
            "badge_bonus" => Self::BadgeBonus,
            "reversal" => Self::Reversal,
            _ => Self::LessonComplete,
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LessonComplete => write!(f, "lesson_complete"),
            Self::AssignmentGraded => write!(f, "assignment_graded"),
            Self::BadgeBonus => write!(f, "badge_bonus"),
            Self::Reversal => write!(f, "reversal"),
        }
    }
}

// ----- Level table -----

#[derive(Debug, Clone, Serialize)]
pub struct LevelDef {
    pub level: i32,
    pub threshold: i64,
    pub name: &'static str,
    pub benefits: &'static [&'static str],
}

/// Static level table, ascending thresholds, level 1 at 0.
pub static LEVELS: Lazy<Vec<LevelDef>> = Lazy::new(|| {
    vec![
        LevelDef {
            level: 1,
            threshold: 0,
            name: "Newcomer",
            benefits: &[],
        },
        LevelDef {
            level: 2,
            threshold: 50,
            name: "Explorer",
            benefits: &["profile badge frame"],
        },
        LevelDef {
            level: 3,
            threshold: 150,
            name: "Builder",
            benefits: &["community channel access"],
        },
        LevelDef {
            level: 4,
            threshold: 350,
            name: "Practitioner",
            benefits: &["mentor office hours"],
        },
        LevelDef {
            level: 5,
            threshold: 700,
            name: "Specialist",
            benefits: &["project showcase slot"],
        },
        LevelDef {
            level: 6,
            threshold: 1200,
            name: "Mentor",
            benefits: &["mentor office hours", "cohort spotlight"],
        },
    ]
});

/// Validate the threshold table. A table without a level-1 entry at
/// threshold 0, or with non-increasing thresholds, is a fatal
/// configuration error.
pub fn validate_levels(table: &[LevelDef]) -> Result<(), LearnError> {
    let first = table
        .first()
        .ok_or_else(|| LearnError::Configuration("level table is empty".to_string()))?;
    if first.threshold != 0 {
        return Err(LearnError::Configuration(
            "level table must start at threshold 0".to_string(),
        ));
    }
    for pair in table.windows(2) {
        if pair[1].threshold <= pair[0].threshold {
            return Err(LearnError::Configuration(format!(
                "level thresholds must be strictly increasing ({} then {})",
                pair[0].threshold, pair[1].threshold
            )));
        }
    }
    Ok(())
}

/// Highest level whose threshold does not exceed `experience`.
pub fn level_for(table: &[LevelDef], experience: i64) -> Result<&LevelDef, LearnError> {
    validate_levels(table)?;
    let idx = table.partition_point(|l| l.threshold <= experience);
    // idx >= 1 because threshold 0 always qualifies.
    Ok(&table[idx - 1])
}

/// Progress through the current level as a percentage, clamped to
/// [0, 100]. At the max defined level there is no next threshold and the
/// answer is 100.
pub fn level_progress(table: &[LevelDef], experience: i64) -> Result<i32, LearnError> {
    let current = level_for(table, experience)?;
    let next = table.iter().find(|l| l.threshold > current.threshold);
    let pct = match next {
        Some(next) => {
            let span = (next.threshold - current.threshold) as f64;
            ((experience - current.threshold) as f64 / span * 100.0).round() as i32
        }
        None => 100,
    };
    Ok(pct.clamp(0, 100))
}

// ----- Ledger operations -----

/// Append a grant entry. Grant reasons demand a positive magnitude;
/// negative points only enter through `reverse_entry`.
pub fn award_points(
    conn: &mut PgConnection,
    learner_id: Uuid,
    reason: ReasonCode,
    points: i32,
    event_id: Option<Uuid>,
) -> Result<LedgerEntry, LearnError> {
    if reason == ReasonCode::Reversal {
        return Err(LearnError::Validation(
            "reversals go through reverse_entry".to_string(),
        ));
    }
    if points <= 0 {
        return Err(LearnError::Validation(format!(
            "grant magnitude must be positive, got {points}"
        )));
    }

    let entry = LedgerEntry {
        id: Uuid::new_v4(),
        learner_id,
        event_id,
        reason: reason.to_string(),
        points,
        reverses: None,
        granted_at: Utc::now(),
    };

    diesel::insert_into(learn_points_ledger::table)
        .values(&entry)
        .execute(conn)?;

    Ok(entry)
}

/// Append a reversal countering an existing grant. History is never
/// deleted; a second reversal of the same entry is rejected.
pub fn reverse_entry(conn: &mut PgConnection, entry_id: Uuid) -> Result<LedgerEntry, LearnError> {
    let original: LedgerEntry = learn_points_ledger::table
        .filter(learn_points_ledger::id.eq(entry_id))
        .first(conn)
        .optional()?
        .ok_or_else(|| LearnError::NotFound(format!("ledger entry {entry_id} not found")))?;

    if original.reverses.is_some() {
        return Err(LearnError::Validation(
            "cannot reverse a reversal entry".to_string(),
        ));
    }

    let already: i64 = learn_points_ledger::table
        .filter(learn_points_ledger::reverses.eq(entry_id))
        .count()
        .get_result(conn)?;
    if already > 0 {
        return Err(LearnError::Validation(format!(
            "ledger entry {entry_id} is already reversed"
        )));
    }

    let entry = LedgerEntry {
        id: Uuid::new_v4(),
        learner_id: original.learner_id,
        event_id: None,
        reason: ReasonCode::Reversal.to_string(),
        points: -original.points,
        reverses: Some(entry_id),
        granted_at: Utc::now(),
    };

    diesel::insert_into(learn_points_ledger::table)
        .values(&entry)
        .execute(conn)?;

    Ok(entry)
}

/// Cumulative experience = sum of every ledger entry.
pub fn total_experience(conn: &mut PgConnection, learner_id: Uuid) -> Result<i64, LearnError> {
    let entries: Vec<i32> = learn_points_ledger::table
        .filter(learn_points_ledger::learner_id.eq(learner_id))
        .select(learn_points_ledger::points)
        .load(conn)?;
    Ok(entries.iter().map(|p| *p as i64).sum())
}

// ----- Engine -----

pub struct PointsEngine {
    db: DbPool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LearnerPoints {
    pub learner_id: Uuid,
    pub total_experience: i64,
    pub level: i32,
    pub level_name: String,
    pub level_progress: i32,
    pub entries: Vec<LedgerEntry>,
}

impl PointsEngine {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub async fn learner_points(&self, learner_id: Uuid) -> Result<LearnerPoints, LearnError> {
        let mut conn = self.db.get()?;

        let entries: Vec<LedgerEntry> = learn_points_ledger::table
            .filter(learn_points_ledger::learner_id.eq(learner_id))
            .order(learn_points_ledger::granted_at.asc())
            .load(&mut conn)?;

        let total: i64 = entries.iter().map(|e| e.points as i64).sum();
        let level = level_for(&LEVELS, total)?;
        let progress = level_progress(&LEVELS, total)?;

        Ok(LearnerPoints {
            learner_id,
            total_experience: total,
            level: level.level,
            level_name: level.name.to_string(),
            level_progress: progress,
            entries,
        })
    }

    pub async fn reverse(&self, entry_id: Uuid) -> Result<LedgerEntry, LearnError> {
        let mut conn = self.db.get()?;
        conn.transaction(|conn| reverse_entry(conn, entry_id))
    }
}

// ----- HTTP handlers -----

/// Static level table.
pub async fn list_levels() -> impl IntoResponse {
    Json(serde_json::json!({
        "success": true,
        "data": &*LEVELS
    }))
}

/// Ledger view with derived level for one learner.
pub async fn get_learner_points(
    State(state): State<Arc<AppState>>,
    Path(learner_id): Path<Uuid>,
) -> impl IntoResponse {
    let engine = PointsEngine::new(state.conn.clone());

    match engine.learner_points(learner_id).await {
        Ok(points) => Json(serde_json::json!({
            "success": true,
            "data": points
        }))
        .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Append a reversal entry for a grant.
pub async fn reverse_points(
    State(state): State<Arc<AppState>>,
    Path(entry_id): Path<Uuid>,
) -> impl IntoResponse {
    let engine = PointsEngine::new(state.conn.clone());

    match engine.reverse(entry_id).await {
        Ok(entry) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "success": true,
                "data": entry
            })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

pub fn configure_points_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/learn/levels", get(list_levels))
        .route("/api/learn/learners/:id/points", get(get_learner_points))
        .route("/api/learn/points/:id/reverse", post(reverse_points))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(thresholds: &[(i32, i64)]) -> Vec<LevelDef> {
        thresholds
            .iter()
            .map(|(level, threshold)| LevelDef {
                level: *level,
                threshold: *threshold,
                name: "L",
                benefits: &[],
            })
            .collect()
    }

    #[test]
    fn test_level_for_thresholds() {
        let t = table(&[(1, 0), (2, 50), (3, 150)]);
        assert_eq!(level_for(&t, 0).unwrap().level, 1);
        assert_eq!(level_for(&t, 49).unwrap().level, 1);
        assert_eq!(level_for(&t, 50).unwrap().level, 2);
        assert_eq!(level_for(&t, 149).unwrap().level, 2);
        assert_eq!(level_for(&t, 150).unwrap().level, 3);
        assert_eq!(level_for(&t, 1_000_000).unwrap().level, 3);
    }

    #[test]
    fn test_level_progress_between_thresholds() {
        // 75 XP with thresholds [0, 50, 150]: level 2, 25% of the way to 3.
        let t = table(&[(1, 0), (2, 50), (3, 150)]);
        assert_eq!(level_for(&t, 75).unwrap().level, 2);
        assert_eq!(level_progress(&t, 75).unwrap(), 25);
    }

    #[test]
    fn test_level_progress_at_max_level() {
        let t = table(&[(1, 0), (2, 50)]);
        assert_eq!(level_progress(&t, 50).unwrap(), 100);
        assert_eq!(level_progress(&t, 9999).unwrap(), 100);
    }

    #[test]
    fn test_missing_base_level_is_configuration_error() {
        let t = table(&[(1, 10), (2, 50)]);
        assert!(matches!(
            level_for(&t, 5),
            Err(LearnError::Configuration(_))
        ));
    }

    #[test]
    fn test_non_increasing_thresholds_rejected() {
        let t = table(&[(1, 0), (2, 50), (3, 50)]);
        assert!(matches!(
            level_for(&t, 5),
            Err(LearnError::Configuration(_))
        ));
    }

    #[test]
    fn test_level_monotonicity() {
        let t = table(&[(1, 0), (2, 50), (3, 150), (4, 400)]);
        let mut last = 0;
        for xp in 0..500 {
            let level = level_for(&t, xp).unwrap().level;
            assert!(level >= last, "level dropped at xp {xp}");
            last = level;
        }
    }

    #[test]
    fn test_builtin_level_table_is_valid() {
        validate_levels(&LEVELS).unwrap();
    }

    #[test]
    fn test_reason_code_round_trip() {
        assert_eq!(ReasonCode::from("badge_bonus"), ReasonCode::BadgeBonus);
        assert_eq!(ReasonCode::from("reversal"), ReasonCode::Reversal);
        assert_eq!(ReasonCode::LessonComplete.to_string(), "lesson_complete");
    }
}
