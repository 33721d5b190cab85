//! Leaderboard ranking.
//!
//! Rankings are a read-time projection over the points ledger. Windowed
//! totals are summed from ledger timestamps on every read; nothing keeps
//! a separately mutable weekly/monthly counter that could drift.

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::LearnError;
use crate::progress::Learner;
use crate::shared::schema::{learn_learners, learn_points_ledger};
use crate::shared::state::AppState;
use crate::shared::utils::DbPool;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    AllTime,
    Weekly,
    Monthly,
}

impl Timeframe {
    /// Rolling window length; all-time has none.
    pub fn window(&self) -> Option<Duration> {
        match self {
            Self::AllTime => None,
            Self::Weekly => Some(Duration::days(7)),
            Self::Monthly => Some(Duration::days(30)),
        }
    }

    /// Earliest `granted_at` still inside the window, or `None` for an
    /// unbounded timeframe.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.window().map(|w| now - w)
    }
}

impl From<&str> for Timeframe {
    fn from(s: &str) -> Self {
        match s {
            "weekly" => Self::Weekly,
            "monthly" => Self::Monthly,
            _ => Self::AllTime,
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AllTime => write!(f, "all_time"),
            Self::Weekly => write!(f, "weekly"),
            Self::Monthly => write!(f, "monthly"),
        }
    }
}

/// One learner's resolved point totals, ready for ranking.
#[derive(Debug, Clone)]
pub struct RankRow {
    pub learner_id: Uuid,
    pub display_name: String,
    pub cohort: String,
    pub total_points: i64,
    pub weekly_points: i64,
    pub monthly_points: i64,
    /// When the cumulative total first reached its current value. A later
    /// dip-and-return (a reversal pair) does not push it forward. Earlier
    /// achievement wins ties.
    pub achieved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardEntry {
    pub learner_id: Uuid,
    pub display_name: String,
    pub cohort: String,
    pub total_points: i64,
    pub weekly_points: i64,
    pub monthly_points: i64,
    pub rank: usize,
    /// Carried from the previous snapshot for trend arrows only; never an
    /// input to the ranking itself.
    pub previous_rank: Option<usize>,
}

/// Previous rank per (cohort key, timeframe), kept in-process.
#[derive(Default)]
pub struct SnapshotStore {
    inner: RwLock<HashMap<(String, Timeframe), HashMap<Uuid, usize>>>,
}

// ----- Pure ranking -----

fn metric(row: &RankRow, timeframe: Timeframe) -> i64 {
    match timeframe {
        Timeframe::AllTime => row.total_points,
        Timeframe::Weekly => row.weekly_points,
        Timeframe::Monthly => row.monthly_points,
    }
}

/// Total-order ranking: metric descending, then earliest achieved-at,
/// then learner id. Ranks are 1..N with no gaps, and the same input
/// always produces the same output.
pub fn rank_rows(mut rows: Vec<RankRow>, timeframe: Timeframe) -> Vec<(usize, RankRow)> {
    rows.sort_by(|a, b| {
        metric(b, timeframe)
            .cmp(&metric(a, timeframe))
            .then_with(|| {
                let at_a = a.achieved_at.unwrap_or(DateTime::<Utc>::MAX_UTC);
                let at_b = b.achieved_at.unwrap_or(DateTime::<Utc>::MAX_UTC);
                at_a.cmp(&at_b)
            })
            .then_with(|| a.learner_id.cmp(&b.learner_id))
    });
    rows.into_iter()
        .enumerate()
        .map(|(i, row)| (i + 1, row))
        .collect()
}

/// Fold one learner's ledger (time-ascending) into a rank row. A row
/// whose data cannot be resolved is an error for that learner only.
pub fn resolve_row(
    learner: &Learner,
    entries: &[(DateTime<Utc>, i32)],
    now: DateTime<Utc>,
) -> Result<RankRow, LearnError> {
    let total: i64 = entries.iter().map(|(_, p)| *p as i64).sum();
    if total < 0 {
        return Err(LearnError::Validation(format!(
            "learner {} has a negative cumulative total {total}",
            learner.id
        )));
    }

    let weekly_cutoff = Timeframe::Weekly.cutoff(now);
    let monthly_cutoff = Timeframe::Monthly.cutoff(now);

    let mut weekly = 0i64;
    let mut monthly = 0i64;
    let mut running = 0i64;
    let mut achieved_at = None;

    for (granted_at, points) in entries {
        let points = *points as i64;
        running += points;
        // First prefix position where the running sum attains the final
        // total; once set it stays, so a reversal pair later in the
        // history cannot reset it.
        if achieved_at.is_none() && points != 0 && running == total {
            achieved_at = Some(*granted_at);
        }
        if weekly_cutoff.map_or(true, |c| *granted_at >= c) {
            weekly += points;
        }
        if monthly_cutoff.map_or(true, |c| *granted_at >= c) {
            monthly += points;
        }
    }

    Ok(RankRow {
        learner_id: learner.id,
        display_name: learner.display_name.clone(),
        cohort: learner.cohort.clone(),
        total_points: total,
        weekly_points: weekly,
        monthly_points: monthly,
        achieved_at,
    })
}

// ----- Engine -----

pub struct LeaderboardEngine {
    db: DbPool,
    snapshots: Arc<SnapshotStore>,
}

impl LeaderboardEngine {
    pub fn new(db: DbPool, snapshots: Arc<SnapshotStore>) -> Self {
        Self { db, snapshots }
    }

    pub async fn rank(
        &self,
        cohort: Option<String>,
        timeframe: Timeframe,
    ) -> Result<Vec<LeaderboardEntry>, LearnError> {
        let mut conn = self.db.get()?;

        // One repeatable-read transaction gives every learner's totals
        // from the same instant.
        let (learners, ledger) = conn.build_transaction().repeatable_read().run(
            |conn| -> Result<(Vec<Learner>, Vec<(Uuid, DateTime<Utc>, i32)>), LearnError> {
                let mut query = learn_learners::table
                    .filter(learn_learners::active.eq(true))
                    .into_boxed();
                if let Some(cohort) = &cohort {
                    query = query.filter(learn_learners::cohort.eq(cohort));
                }
                let learners: Vec<Learner> = query.load(conn)?;

                let ids: Vec<Uuid> = learners.iter().map(|l| l.id).collect();
                let ledger: Vec<(Uuid, DateTime<Utc>, i32)> = if ids.is_empty() {
                    Vec::new()
                } else {
                    learn_points_ledger::table
                        .filter(learn_points_ledger::learner_id.eq_any(&ids))
                        .order(learn_points_ledger::granted_at.asc())
                        .select((
                            learn_points_ledger::learner_id,
                            learn_points_ledger::granted_at,
                            learn_points_ledger::points,
                        ))
                        .load(conn)?
                };
                Ok((learners, ledger))
            },
        )?;

        let now = Utc::now();
        let mut by_learner: HashMap<Uuid, Vec<(DateTime<Utc>, i32)>> = HashMap::new();
        for (learner_id, granted_at, points) in ledger {
            by_learner
                .entry(learner_id)
                .or_default()
                .push((granted_at, points));
        }

        // One bad learner must not abort the cohort: log and exclude.
        let mut rows = Vec::with_capacity(learners.len());
        for learner in &learners {
            let entries = by_learner.remove(&learner.id).unwrap_or_default();
            match resolve_row(learner, &entries, now) {
                Ok(row) => rows.push(row),
                Err(e) => {
                    tracing::warn!(learner_id = %learner.id, error = %e,
                        "excluding learner from leaderboard");
                }
            }
        }

        let ranked = rank_rows(rows, timeframe);

        let key = (cohort.unwrap_or_else(|| "*".to_string()), timeframe);
        let previous = {
            let snapshots = self.snapshots.inner.read().await;
            snapshots.get(&key).cloned().unwrap_or_default()
        };

        let entries: Vec<LeaderboardEntry> = ranked
            .into_iter()
            .map(|(rank, row)| LeaderboardEntry {
                previous_rank: previous.get(&row.learner_id).copied(),
                learner_id: row.learner_id,
                display_name: row.display_name,
                cohort: row.cohort,
                total_points: row.total_points,
                weekly_points: row.weekly_points,
                monthly_points: row.monthly_points,
                rank,
            })
            .collect();

        let current: HashMap<Uuid, usize> =
            entries.iter().map(|e| (e.learner_id, e.rank)).collect();
        self.snapshots.inner.write().await.insert(key, current);

        Ok(entries)
    }
}

// ----- HTTP handlers -----

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub cohort: Option<String>,
    pub timeframe: Option<String>,
}

/// Ranked learners for a cohort and timeframe.
pub async fn get_leaderboard(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LeaderboardQuery>,
) -> impl IntoResponse {
    let engine = LeaderboardEngine::new(state.conn.clone(), state.leaderboard_snapshots.clone());
    let timeframe = query
        .timeframe
        .as_deref()
        .map(Timeframe::from)
        .unwrap_or(Timeframe::AllTime);

    match engine.rank(query.cohort, timeframe).await {
        Ok(entries) => Json(serde_json::json!({
            "success": true,
            "data": entries
        }))
        .into_response(),
        Err(e) => e.into_response(),
    }
}

pub fn configure_leaderboard_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/learn/leaderboard", get(get_leaderboard))
}
