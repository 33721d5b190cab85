//! Badge catalog and idempotent awarding.
//!
//! Badges are static definitions; per-learner grants are rows created at
//! most once per (learner, badge). The grant insert ignores conflicts, so
//! re-evaluating an already-earned badge is a harmless no-op.

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::LearnError;
use crate::shared::schema::learn_badge_grants;
use crate::shared::state::AppState;
use crate::shared::utils::DbPool;

// ----- Definitions -----

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BadgeTrigger {
    LessonCompleted,
    PhaseCompleted,
}

/// Eligibility predicate, evaluated against a learner snapshot. A closed
/// enum keeps every badge condition inspectable and testable.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum BadgePredicate {
    LessonsCompletedAtLeast(i64),
    PhasesCompletedAtLeast(i64),
    ExperienceAtLeast(i64),
    ProgramCompleted,
}

#[derive(Debug, Clone, Serialize)]
pub struct BadgeDef {
    pub id: &'static str,
    pub name: &'static str,
    pub icon: &'static str,
    pub category: &'static str,
    pub trigger: BadgeTrigger,
    pub predicate: BadgePredicate,
}

pub static BADGES: Lazy<Vec<BadgeDef>> = Lazy::new(|| {
    vec![
        BadgeDef {
            id: "first-steps",
            name: "First Steps",
            icon: "footprints",
            category: "progress",
            trigger: BadgeTrigger::LessonCompleted,
            predicate: BadgePredicate::LessonsCompletedAtLeast(1),
        },
        BadgeDef {
            id: "ten-lessons",
            name: "Deep Diver",
            icon: "waves",
            category: "progress",
            trigger: BadgeTrigger::LessonCompleted,
            predicate: BadgePredicate::LessonsCompletedAtLeast(10),
        },
        BadgeDef {
            id: "phase-breaker",
            name: "Phase Breaker",
            icon: "unlock",
            category: "milestone",
            trigger: BadgeTrigger::PhaseCompleted,
            predicate: BadgePredicate::PhasesCompletedAtLeast(1),
        },
        BadgeDef {
            id: "graduate",
            name: "Graduate",
            icon: "graduation-cap",
            category: "milestone",
            trigger: BadgeTrigger::PhaseCompleted,
            predicate: BadgePredicate::ProgramCompleted,
        },
        BadgeDef {
            id: "xp-500",
            name: "Point Collector",
            icon: "star",
            category: "points",
            trigger: BadgeTrigger::LessonCompleted,
            predicate: BadgePredicate::ExperienceAtLeast(500),
        },
    ]
});

pub fn badge_by_id(id: &str) -> Option<&'static BadgeDef> {
    BADGES.iter().find(|b| b.id == id)
}

/// The learner state predicates are checked against. Built inside the
/// progress transaction so every badge sees the same instant.
#[derive(Debug, Clone, Copy, Default)]
pub struct LearnerSnapshot {
    pub lessons_completed: i64,
    pub phases_completed: i64,
    pub total_experience: i64,
    pub program_completed: bool,
}

impl BadgePredicate {
    pub fn is_satisfied(&self, snapshot: &LearnerSnapshot) -> bool {
        match self {
            Self::LessonsCompletedAtLeast(n) => snapshot.lessons_completed >= *n,
            Self::PhasesCompletedAtLeast(n) => snapshot.phases_completed >= *n,
            Self::ExperienceAtLeast(n) => snapshot.total_experience >= *n,
            Self::ProgramCompleted => snapshot.program_completed,
        }
    }
}

// ----- Grants -----

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = learn_badge_grants)]
pub struct BadgeGrant {
    pub id: Uuid,
    pub learner_id: Uuid,
    pub badge_id: String,
    /// The progress event whose evaluation created the grant, so a
    /// replayed event can report the same badges it earned.
    pub event_id: Option<Uuid>,
    pub earned_at: DateTime<Utc>,
}

/// Evaluate the catalog against a snapshot for one trigger and grant
/// whatever is newly earned. Returns only the grants created by this
/// call; already-held badges are skipped by the conflict target.
pub fn evaluate_badges(
    conn: &mut PgConnection,
    learner_id: Uuid,
    trigger: BadgeTrigger,
    snapshot: &LearnerSnapshot,
    event_id: Option<Uuid>,
) -> Result<Vec<BadgeGrant>, LearnError> {
    let mut awarded = Vec::new();

    for def in BADGES.iter().filter(|b| b.trigger == trigger) {
        if !def.predicate.is_satisfied(snapshot) {
            continue;
        }

        let grant = BadgeGrant {
            id: Uuid::new_v4(),
            learner_id,
            badge_id: def.id.to_string(),
            event_id,
            earned_at: Utc::now(),
        };

        let inserted = diesel::insert_into(learn_badge_grants::table)
            .values(&grant)
            .on_conflict((
                learn_badge_grants::learner_id,
                learn_badge_grants::badge_id,
            ))
            .do_nothing()
            .execute(conn)?;

        if inserted > 0 {
            awarded.push(grant);
        }
    }

    Ok(awarded)
}

pub fn grants_for(conn: &mut PgConnection, learner_id: Uuid) -> Result<Vec<BadgeGrant>, LearnError> {
    Ok(learn_badge_grants::table
        .filter(learn_badge_grants::learner_id.eq(learner_id))
        .order(learn_badge_grants::earned_at.asc())
        .load(conn)?)
}

/// Grants created by one progress event.
pub fn grants_for_event(
    conn: &mut PgConnection,
    learner_id: Uuid,
    event_id: Uuid,
) -> Result<Vec<BadgeGrant>, LearnError> {
    Ok(learn_badge_grants::table
        .filter(learn_badge_grants::learner_id.eq(learner_id))
        .filter(learn_badge_grants::event_id.eq(event_id))
        .order(learn_badge_grants::earned_at.asc())
        .load(conn)?)
}

// ----- Engine -----

pub struct BadgeEngine {
    db: DbPool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EarnedBadge {
    pub badge: &'static BadgeDef,
    pub earned_at: DateTime<Utc>,
}

impl BadgeEngine {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// A learner's earned badges as full catalog records. Grants whose
    /// badge id no longer exists in the catalog are logged and skipped
    /// rather than invented.
    pub async fn earned(&self, learner_id: Uuid) -> Result<Vec<EarnedBadge>, LearnError> {
        let mut conn = self.db.get()?;
        let grants = grants_for(&mut conn, learner_id)?;

        let mut earned = Vec::with_capacity(grants.len());
        for grant in grants {
            match badge_by_id(&grant.badge_id) {
                Some(def) => earned.push(EarnedBadge {
                    badge: def,
                    earned_at: grant.earned_at,
                }),
                None => {
                    tracing::warn!(badge_id = %grant.badge_id, learner_id = %learner_id,
                        "grant references a badge missing from the catalog");
                }
            }
        }
        Ok(earned)
    }
}

// ----- HTTP handlers -----

/// Static badge catalog.
pub async fn list_badges() -> impl IntoResponse {
    Json(serde_json::json!({
        "success": true,
        "data": &*BADGES
    }))
}

/// Earned badges for one learner.
pub async fn get_learner_badges(
    State(state): State<Arc<AppState>>,
    Path(learner_id): Path<Uuid>,
) -> impl IntoResponse {
    let engine = BadgeEngine::new(state.conn.clone());

    match engine.earned(learner_id).await {
        Ok(badges) => Json(serde_json::json!({
            "success": true,
            "data": badges
        }))
        .into_response(),
        Err(e) => e.into_response(),
    }
}

pub fn configure_badge_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/learn/badges", get(list_badges))
        .route("/api/learn/learners/:id/badges", get(get_learner_badges))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicates_against_snapshot() {
        let snapshot = LearnerSnapshot {
            lessons_completed: 3,
            phases_completed: 1,
            total_experience: 120,
            program_completed: false,
        };
        assert!(BadgePredicate::LessonsCompletedAtLeast(1).is_satisfied(&snapshot));
        assert!(BadgePredicate::LessonsCompletedAtLeast(3).is_satisfied(&snapshot));
        assert!(!BadgePredicate::LessonsCompletedAtLeast(4).is_satisfied(&snapshot));
        assert!(BadgePredicate::PhasesCompletedAtLeast(1).is_satisfied(&snapshot));
        assert!(!BadgePredicate::ExperienceAtLeast(500).is_satisfied(&snapshot));
        assert!(!BadgePredicate::ProgramCompleted.is_satisfied(&snapshot));
    }

    #[test]
    fn test_catalog_ids_are_unique() {
        let mut ids: Vec<&str> = BADGES.iter().map(|b| b.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), BADGES.len());
    }

    #[test]
    fn test_badge_lookup() {
        assert_eq!(badge_by_id("first-steps").unwrap().name, "First Steps");
        assert!(badge_by_id("no-such-badge").is_none());
    }
}
