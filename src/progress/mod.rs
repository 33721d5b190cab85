//! Progress store, aggregation and the progress-event pipeline.
//!
//! One incoming event ("lesson watched to completion", "assignment
//! graded") runs as a single database transaction: journal the event id,
//! advance the per-lesson record, re-derive phase/program aggregates and
//! unlocks, credit points, evaluate badges. A crash anywhere rolls the
//! whole unit back, and a retried event id replays as success without
//! crediting anything twice.

pub mod types;

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use diesel::prelude::*;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::badges::{self, BadgeTrigger, LearnerSnapshot};
use crate::curriculum::{self, ContentType, Curriculum, UnlockEvaluation};
use crate::error::LearnError;
use crate::points::{
    self, ReasonCode, ASSIGNMENT_GRADED_POINTS, BADGE_BONUS_POINTS, LESSON_COMPLETE_POINTS, LEVELS,
};
use crate::shared::schema::{
    learn_learners, learn_lesson_progress, learn_points_ledger, learn_progress_events,
    learn_programs,
};
use crate::shared::state::{AppState, LearnEvent};
use crate::shared::utils::DbPool;

pub use types::*;

// ----- Aggregation (pure) -----

/// Per-phase completion counts, kept as exact integers; percentages are
/// rounded once for display and never accumulated.
#[derive(Debug, Clone, Copy)]
pub struct PhaseStats {
    pub seq: i32,
    pub weight: Option<f64>,
    pub required_total: usize,
    pub required_completed: usize,
    pub lesson_total: usize,
}

/// A phase is complete when all required lessons are done. A phase whose
/// lessons are all optional is vacuously complete; an empty phase never
/// completes, so it never unlocks its successor.
pub fn phase_complete(stats: &PhaseStats) -> bool {
    if stats.required_total > 0 {
        stats.required_completed >= stats.required_total
    } else {
        stats.lesson_total > 0
    }
}

fn phase_percent_exact(stats: &PhaseStats) -> f64 {
    if stats.required_total > 0 {
        stats.required_completed as f64 / stats.required_total as f64 * 100.0
    } else if phase_complete(stats) {
        100.0
    } else {
        0.0
    }
}

/// Display percentage for one phase, rounded to the nearest integer.
pub fn phase_percent(stats: &PhaseStats) -> i32 {
    phase_percent_exact(stats).round() as i32
}

/// Program-wide percentage: equal-weight mean of the phase percentages,
/// or the explicit phase weights when the program defines them. Weight
/// validity is checked at curriculum build time.
pub fn overall_percent(all: &[PhaseStats]) -> i32 {
    if all.is_empty() {
        return 0;
    }
    let weighted = all.iter().all(|s| s.weight.is_some());
    let exact = if weighted {
        all.iter()
            .map(|s| phase_percent_exact(s) * s.weight.unwrap_or(0.0))
            .sum::<f64>()
    } else {
        all.iter().map(phase_percent_exact).sum::<f64>() / all.len() as f64
    };
    exact.round() as i32
}

// ----- Engine -----

pub struct ProgressEngine {
    db: DbPool,
}

impl ProgressEngine {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Read path of the store contract: a learner×lesson record, or
    /// NotFound returned (not thrown) when no interaction happened yet.
    pub async fn get_progress(
        &self,
        learner_id: Uuid,
        lesson_id: Uuid,
    ) -> Result<Option<ProgressRecord>, LearnError> {
        let mut conn = self.db.get()?;
        Ok(learn_lesson_progress::table
            .filter(learn_lesson_progress::learner_id.eq(learner_id))
            .filter(learn_lesson_progress::lesson_id.eq(lesson_id))
            .first(&mut conn)
            .optional()?)
    }

    /// Apply one progress event atomically. Returns the outcome plus the
    /// domain events to publish once the transaction has committed.
    pub async fn record_progress(
        &self,
        req: ProgressRequest,
    ) -> Result<(ProgressOutcome, Vec<LearnEvent>), LearnError> {
        let mut conn = self.db.get()?;
        conn.transaction(|conn| apply_progress_event(conn, &req))
    }

    /// Learner dashboard: enrollment, per-lesson statuses, derived unlock
    /// flags, overall progress, level and badges.
    pub async fn dashboard(&self, learner_id: Uuid) -> Result<DashboardResponse, LearnError> {
        let mut conn = self.db.get()?;

        let learner: Learner = learn_learners::table
            .filter(learn_learners::id.eq(learner_id))
            .first(&mut conn)
            .optional()?
            .ok_or_else(|| LearnError::NotFound(format!("learner {learner_id} not found")))?;

        let program_title: String = learn_programs::table
            .filter(learn_programs::id.eq(learner.program_id))
            .select(learn_programs::title)
            .first(&mut conn)?;

        let curriculum = curriculum::load_curriculum(&mut conn, learner.program_id)?;
        let view = build_program_view(&mut conn, &learner, &curriculum)?;

        let total = points::total_experience(&mut conn, learner_id)?;
        let level = points::level_for(&LEVELS, total)?;
        let level_progress = points::level_progress(&LEVELS, total)?;

        let grants = badges::grants_for(&mut conn, learner_id)?;
        let earned = grants
            .into_iter()
            .filter_map(|g| {
                badges::badge_by_id(&g.badge_id).map(|def| AwardedBadgeView {
                    badge: def,
                    earned_at: g.earned_at,
                    bonus_points: BADGE_BONUS_POINTS,
                })
            })
            .collect();

        Ok(DashboardResponse {
            enrollment: EnrollmentView {
                learner_id: learner.id,
                display_name: learner.display_name,
                cohort: learner.cohort,
                program_id: learner.program_id,
                program_title,
                enrolled_at: learner.enrolled_at,
                active: learner.active,
            },
            progress: view.program,
            level: LevelView {
                level: level.level,
                name: level.name.to_string(),
                total_experience: total,
                level_progress,
            },
            badges: earned,
        })
    }
}

// ----- Pipeline internals -----

struct ProgramView {
    program: ProgramProgress,
    stats: Vec<PhaseStats>,
    completed_phase_seqs: BTreeSet<i32>,
    unlocks: UnlockEvaluation,
    lessons_completed: i64,
}

fn completed_lessons(
    conn: &mut PgConnection,
    learner_id: Uuid,
    lesson_ids: &[Uuid],
) -> Result<HashSet<Uuid>, LearnError> {
    if lesson_ids.is_empty() {
        return Ok(HashSet::new());
    }
    let rows: Vec<Uuid> = learn_lesson_progress::table
        .filter(learn_lesson_progress::learner_id.eq(learner_id))
        .filter(learn_lesson_progress::lesson_id.eq_any(lesson_ids))
        .filter(learn_lesson_progress::status.eq(LessonStatus::Completed.to_string()))
        .select(learn_lesson_progress::lesson_id)
        .load(conn)?;
    Ok(rows.into_iter().collect())
}

fn phase_stats_from(curriculum: &Curriculum, done: &HashSet<Uuid>) -> Vec<PhaseStats> {
    curriculum
        .phases
        .iter()
        .map(|pc| PhaseStats {
            seq: pc.phase.seq,
            weight: pc.phase.weight,
            required_total: pc.lessons.iter().filter(|l| l.required).count(),
            required_completed: pc
                .lessons
                .iter()
                .filter(|l| l.required && done.contains(&l.id))
                .count(),
            lesson_total: pc.lessons.len(),
        })
        .collect()
}

fn completed_phase_seqs(stats: &[PhaseStats]) -> BTreeSet<i32> {
    stats
        .iter()
        .filter(|s| phase_complete(s))
        .map(|s| s.seq)
        .collect()
}

fn build_program_view(
    conn: &mut PgConnection,
    learner: &Learner,
    curriculum: &Curriculum,
) -> Result<ProgramView, LearnError> {
    let lesson_ids: Vec<Uuid> = curriculum
        .phases
        .iter()
        .flat_map(|pc| pc.lessons.iter().map(|l| l.id))
        .collect();

    let done = completed_lessons(conn, learner.id, &lesson_ids)?;

    let records: Vec<ProgressRecord> = if lesson_ids.is_empty() {
        Vec::new()
    } else {
        learn_lesson_progress::table
            .filter(learn_lesson_progress::learner_id.eq(learner.id))
            .filter(learn_lesson_progress::lesson_id.eq_any(&lesson_ids))
            .load(conn)?
    };
    let by_lesson: HashMap<Uuid, &ProgressRecord> =
        records.iter().map(|r| (r.lesson_id, r)).collect();

    let stats = phase_stats_from(curriculum, &done);
    let completed_seqs = completed_phase_seqs(&stats);
    let unlocks = curriculum::evaluate_unlocks(&curriculum.phase_seqs(), &completed_seqs);

    let mut phase_views = Vec::with_capacity(curriculum.phases.len());
    for (pc, stat) in curriculum.phases.iter().zip(stats.iter()) {
        let (unlocked, blocked_by_gap) = match unlocks.is_unlocked(pc.phase.seq) {
            Ok(flag) => (flag, false),
            Err(_) => (false, true),
        };
        let lessons = pc
            .lessons
            .iter()
            .map(|l| {
                let record = by_lesson.get(&l.id);
                LessonProgressView {
                    lesson_id: l.id,
                    seq: l.seq,
                    title: l.title.clone(),
                    content_type: l.content_type.clone(),
                    required: l.required,
                    status: record
                        .map(|r| LessonStatus::from(r.status.as_str()))
                        .unwrap_or(LessonStatus::NotStarted),
                    watch_seconds: record.map(|r| r.watch_seconds).unwrap_or(0),
                }
            })
            .collect();
        phase_views.push(PhaseProgressView {
            phase_id: pc.phase.id,
            seq: pc.phase.seq,
            title: pc.phase.title.clone(),
            percent: phase_percent(stat),
            completed: phase_complete(stat),
            unlocked,
            blocked_by_gap,
            lessons,
        });
    }

    Ok(ProgramView {
        program: ProgramProgress {
            program_id: curriculum.program.id,
            overall_percent: overall_percent(&stats),
            phases: phase_views,
        },
        stats,
        completed_phase_seqs: completed_seqs,
        unlocks,
        lessons_completed: done.len() as i64,
    })
}

fn apply_progress_event(
    conn: &mut PgConnection,
    req: &ProgressRequest,
) -> Result<(ProgressOutcome, Vec<LearnEvent>), LearnError> {
    let now = Utc::now();

    let learner: Learner = learn_learners::table
        .filter(learn_learners::id.eq(req.learner_id))
        .first(conn)
        .optional()?
        .ok_or_else(|| LearnError::NotFound(format!("learner {} not found", req.learner_id)))?;
    if !learner.active {
        return Err(LearnError::Validation(format!(
            "learner {} is deactivated",
            learner.id
        )));
    }

    let curriculum = curriculum::load_curriculum(conn, learner.program_id)?;
    let phase_of_lesson = curriculum
        .phases
        .iter()
        .find(|pc| pc.lessons.iter().any(|l| l.id == req.lesson_id));
    let (phase, lesson) = match phase_of_lesson {
        Some(pc) => (
            pc.phase.clone(),
            pc.lessons
                .iter()
                .find(|l| l.id == req.lesson_id)
                .cloned()
                .ok_or_else(|| LearnError::NotFound("lesson not found".to_string()))?,
        ),
        None => {
            return Err(LearnError::NotFound(format!(
                "lesson {} is not part of program {}",
                req.lesson_id, learner.program_id
            )))
        }
    };

    // Idempotency journal first: a replayed event id inserts nothing and
    // is answered from current state without side effects.
    let journal = ProgressEventRow {
        id: req.event_id,
        learner_id: req.learner_id,
        lesson_id: req.lesson_id,
        status: req.status.to_string(),
        watch_seconds: req.watch_seconds.unwrap_or(0),
        received_at: now,
    };
    let inserted = diesel::insert_into(learn_progress_events::table)
        .values(&journal)
        .on_conflict(learn_progress_events::id)
        .do_nothing()
        .execute(conn)?;

    if inserted == 0 {
        tracing::info!(event_id = %req.event_id, "duplicate progress event absorbed");
        return replay_outcome(conn, &learner, &curriculum, req, &lesson);
    }

    // The lesson's phase must be reachable before any write sticks.
    let pre_done = {
        let stats = phase_stats_from(
            &curriculum,
            &completed_lessons(
                conn,
                learner.id,
                &curriculum
                    .phases
                    .iter()
                    .flat_map(|pc| pc.lessons.iter().map(|l| l.id))
                    .collect::<Vec<_>>(),
            )?,
        );
        completed_phase_seqs(&stats)
    };
    let pre_unlocks = curriculum::evaluate_unlocks(&curriculum.phase_seqs(), &pre_done);
    if !pre_unlocks.is_unlocked(phase.seq)? {
        return Err(LearnError::Validation(format!(
            "phase {} is locked for learner {}",
            phase.seq, learner.id
        )));
    }

    // Advance the per-lesson record under the monotonic guard.
    let existing: Option<ProgressRecord> = learn_lesson_progress::table
        .filter(learn_lesson_progress::learner_id.eq(req.learner_id))
        .filter(learn_lesson_progress::lesson_id.eq(req.lesson_id))
        .first(conn)
        .optional()?;

    let old_status = existing
        .as_ref()
        .map(|r| LessonStatus::from(r.status.as_str()))
        .unwrap_or(LessonStatus::NotStarted);
    let status_advanced = req.status.rank() > old_status.rank();
    let new_status = if status_advanced { req.status } else { old_status };

    match &existing {
        Some(record) => {
            let watch = if old_status == LessonStatus::Completed {
                record.watch_seconds
            } else {
                req.watch_seconds.unwrap_or(record.watch_seconds)
            };
            diesel::update(
                learn_lesson_progress::table.filter(learn_lesson_progress::id.eq(record.id)),
            )
            .set((
                learn_lesson_progress::status.eq(new_status.to_string()),
                learn_lesson_progress::watch_seconds.eq(watch),
                learn_lesson_progress::completed_at.eq(if new_status == LessonStatus::Completed {
                    record.completed_at.or(Some(now))
                } else {
                    None
                }),
                learn_lesson_progress::updated_at.eq(now),
            ))
            .execute(conn)?;
        }
        None => {
            // Created lazily on first interaction.
            let record = ProgressRecord {
                id: Uuid::new_v4(),
                learner_id: req.learner_id,
                lesson_id: req.lesson_id,
                status: new_status.to_string(),
                watch_seconds: req.watch_seconds.unwrap_or(0),
                started_at: now,
                completed_at: (new_status == LessonStatus::Completed).then_some(now),
                updated_at: now,
            };
            diesel::insert_into(learn_lesson_progress::table)
                .values(&record)
                .execute(conn)?;
        }
    }

    let mut events = Vec::new();
    if status_advanced {
        events.push(LearnEvent::ProgressChanged {
            learner_id: learner.id,
            lesson_id: lesson.id,
            status: new_status.to_string(),
            at: now,
        });
    }

    // Re-derive aggregates and unlocks from the written state.
    let view = build_program_view(conn, &learner, &curriculum)?;

    // Edge-triggered: a phase fires exactly one unlock signal, at the
    // write that first completes it.
    let newly_completed: Vec<i32> = view
        .completed_phase_seqs
        .difference(&pre_done)
        .copied()
        .collect();
    let mut unlocked_phases = Vec::new();
    for seq in &newly_completed {
        let next_seq = seq + 1;
        if let Some(next) = curriculum.phase_by_seq(next_seq) {
            if view.unlocks.is_unlocked(next_seq)? {
                unlocked_phases.push(UnlockedPhaseRef {
                    phase_id: next.phase.id,
                    seq: next_seq,
                    title: next.phase.title.clone(),
                });
                events.push(LearnEvent::PhaseUnlocked {
                    learner_id: learner.id,
                    phase_id: next.phase.id,
                    phase_seq: next_seq,
                    at: now,
                });
            }
        }
    }

    // Credit experience for a completion, tagged with the event id so a
    // replay can account for it without re-crediting.
    let completed_now = status_advanced && new_status == LessonStatus::Completed;
    let mut points_awarded = 0;
    if completed_now {
        let (reason, magnitude) = match ContentType::from(lesson.content_type.as_str()) {
            ContentType::Assignment => (ReasonCode::AssignmentGraded, ASSIGNMENT_GRADED_POINTS),
            _ => (ReasonCode::LessonComplete, LESSON_COMPLETE_POINTS),
        };
        let entry = points::award_points(conn, learner.id, reason, magnitude, Some(req.event_id))?;
        points_awarded += entry.points;
        events.push(LearnEvent::PointsAwarded {
            learner_id: learner.id,
            reason: entry.reason.clone(),
            points: entry.points,
            at: now,
        });
    }

    // Badge evaluation sees the post-write state within this transaction.
    let mut badges_awarded = Vec::new();
    if completed_now {
        let total = points::total_experience(conn, learner.id)?;
        let snapshot = LearnerSnapshot {
            lessons_completed: view.lessons_completed,
            phases_completed: view.completed_phase_seqs.len() as i64,
            total_experience: total,
            program_completed: !view.stats.is_empty()
                && view.completed_phase_seqs.len() == view.stats.len(),
        };

        let mut grants = badges::evaluate_badges(
            conn,
            learner.id,
            BadgeTrigger::LessonCompleted,
            &snapshot,
            Some(req.event_id),
        )?;
        if !newly_completed.is_empty() {
            grants.extend(badges::evaluate_badges(
                conn,
                learner.id,
                BadgeTrigger::PhaseCompleted,
                &snapshot,
                Some(req.event_id),
            )?);
        }

        // The points engine consumes BadgeAwarded: each fresh grant earns
        // a bonus entry, keeping badge logic out of point magnitudes.
        for grant in grants {
            events.push(LearnEvent::BadgeAwarded {
                learner_id: learner.id,
                badge_id: grant.badge_id.clone(),
                at: now,
            });
            let bonus = points::award_points(
                conn,
                learner.id,
                ReasonCode::BadgeBonus,
                BADGE_BONUS_POINTS,
                Some(req.event_id),
            )?;
            points_awarded += bonus.points;
            if let Some(def) = badges::badge_by_id(&grant.badge_id) {
                badges_awarded.push(AwardedBadgeView {
                    badge: def,
                    earned_at: grant.earned_at,
                    bonus_points: bonus.points,
                });
            }
        }
    }

    // Aggregates may have shifted if a bonus landed; the progress view is
    // structural and unaffected by points, so the earlier view stands.
    let outcome = ProgressOutcome {
        progress: view.program,
        unlocked_phases,
        points_awarded,
        badges_awarded,
        duplicate: false,
    };

    Ok((outcome, events))
}

/// Answer a replayed event id from current state: identical persisted
/// state, points and badges read back from the ledger and grant rows
/// tagged with the event id, and no new side effects.
fn replay_outcome(
    conn: &mut PgConnection,
    learner: &Learner,
    curriculum: &Curriculum,
    req: &ProgressRequest,
    lesson: &curriculum::Lesson,
) -> Result<(ProgressOutcome, Vec<LearnEvent>), LearnError> {
    let view = build_program_view(conn, learner, curriculum)?;

    let credited: Vec<i32> = learn_points_ledger::table
        .filter(learn_points_ledger::learner_id.eq(learner.id))
        .filter(learn_points_ledger::event_id.eq(req.event_id))
        .select(learn_points_ledger::points)
        .load(conn)?;
    let points_awarded: i32 = credited.iter().sum();

    let badges_awarded: Vec<AwardedBadgeView> = badges::grants_for_event(conn, learner.id, req.event_id)?
        .into_iter()
        .filter_map(|g| {
            badges::badge_by_id(&g.badge_id).map(|def| AwardedBadgeView {
                badge: def,
                earned_at: g.earned_at,
                bonus_points: BADGE_BONUS_POINTS,
            })
        })
        .collect();

    // Only a journaled completion can have caused an unlock; replaying an
    // in-progress event must not take credit for a later completion. The
    // journal row is authoritative, not the retried request body.
    let journaled_status: String = learn_progress_events::table
        .filter(learn_progress_events::id.eq(req.event_id))
        .select(learn_progress_events::status)
        .first(conn)?;

    let mut unlocked_phases = Vec::new();
    if LessonStatus::from(journaled_status.as_str()) == LessonStatus::Completed {
        // Re-derive what this event unlocked, as if it were the most
        // recent write: remove the lesson from the completed set and diff.
        let lesson_ids: Vec<Uuid> = curriculum
            .phases
            .iter()
            .flat_map(|pc| pc.lessons.iter().map(|l| l.id))
            .collect();
        let mut done_before = completed_lessons(conn, learner.id, &lesson_ids)?;
        done_before.remove(&lesson.id);
        let before_seqs = completed_phase_seqs(&phase_stats_from(curriculum, &done_before));

        for seq in view.completed_phase_seqs.difference(&before_seqs) {
            let next_seq = seq + 1;
            if let Some(next) = curriculum.phase_by_seq(next_seq) {
                if matches!(view.unlocks.is_unlocked(next_seq), Ok(true)) {
                    unlocked_phases.push(UnlockedPhaseRef {
                        phase_id: next.phase.id,
                        seq: next_seq,
                        title: next.phase.title.clone(),
                    });
                }
            }
        }
    }

    Ok((
        ProgressOutcome {
            progress: view.program,
            unlocked_phases,
            points_awarded,
            badges_awarded,
            duplicate: true,
        },
        Vec::new(),
    ))
}

// ----- HTTP handlers -----

/// Apply a progress event.
pub async fn post_progress(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProgressRequest>,
) -> impl IntoResponse {
    let engine = ProgressEngine::new(state.conn.clone());

    match engine.record_progress(req).await {
        Ok((outcome, events)) => {
            for event in events {
                state.publish(event);
            }
            Json(serde_json::json!({
                "success": true,
                "data": outcome
            }))
            .into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Learner dashboard.
pub async fn get_dashboard(
    State(state): State<Arc<AppState>>,
    Path(learner_id): Path<Uuid>,
) -> impl IntoResponse {
    let engine = ProgressEngine::new(state.conn.clone());

    match engine.dashboard(learner_id).await {
        Ok(dashboard) => Json(serde_json::json!({
            "success": true,
            "data": dashboard
        }))
        .into_response(),
        Err(e) => e.into_response(),
    }
}

pub fn configure_progress_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/learn/progress", post(post_progress))
        .route("/api/learn/dashboard/:id", get(get_dashboard))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(seq: i32, done: usize, required: usize, total: usize) -> PhaseStats {
        PhaseStats {
            seq,
            weight: None,
            required_total: required,
            required_completed: done,
            lesson_total: total,
        }
    }

    #[test]
    fn test_phase_percent_halfway() {
        // Two required lessons, one done: 50%, phase not complete.
        let s = stats(1, 1, 2, 2);
        assert_eq!(phase_percent(&s), 50);
        assert!(!phase_complete(&s));
    }

    #[test]
    fn test_phase_percent_complete() {
        let s = stats(1, 2, 2, 2);
        assert_eq!(phase_percent(&s), 100);
        assert!(phase_complete(&s));
    }

    #[test]
    fn test_optional_lessons_excluded_from_denominator() {
        // 3 lessons, 2 required, both done: 100% even with the optional
        // one untouched.
        let s = stats(1, 2, 2, 3);
        assert_eq!(phase_percent(&s), 100);
        assert!(phase_complete(&s));
    }

    #[test]
    fn test_all_optional_phase_is_vacuously_complete() {
        let s = stats(1, 0, 0, 2);
        assert_eq!(phase_percent(&s), 100);
        assert!(phase_complete(&s));
    }

    #[test]
    fn test_empty_phase_never_completes() {
        let s = stats(1, 0, 0, 0);
        assert_eq!(phase_percent(&s), 0);
        assert!(!phase_complete(&s));
    }

    #[test]
    fn test_percent_rounds_to_nearest() {
        assert_eq!(phase_percent(&stats(1, 1, 3, 3)), 33);
        assert_eq!(phase_percent(&stats(1, 2, 3, 3)), 67);
    }

    #[test]
    fn test_overall_equal_weight_mean() {
        let all = [stats(1, 2, 2, 2), stats(2, 1, 2, 2), stats(3, 0, 2, 2)];
        // (100 + 50 + 0) / 3 = 50
        assert_eq!(overall_percent(&all), 50);
    }

    #[test]
    fn test_overall_respects_explicit_weights() {
        let mut a = stats(1, 2, 2, 2);
        let mut b = stats(2, 0, 2, 2);
        a.weight = Some(0.8);
        b.weight = Some(0.2);
        assert_eq!(overall_percent(&[a, b]), 80);
    }

    #[test]
    fn test_overall_empty_program() {
        assert_eq!(overall_percent(&[]), 0);
    }

    #[test]
    fn test_overall_uses_exact_counts_not_rounded_phases() {
        // Each phase alone rounds to 33, but the mean comes from exact
        // thirds: (1/3 + 1/3) / 2 * 100 = 33.33 -> 33, not from 33+33.
        let all = [stats(1, 1, 3, 3), stats(2, 1, 3, 3)];
        assert_eq!(overall_percent(&all), 33);
    }

    #[test]
    fn test_status_rank_is_monotonic() {
        assert!(LessonStatus::NotStarted.rank() < LessonStatus::InProgress.rank());
        assert!(LessonStatus::InProgress.rank() < LessonStatus::Completed.rank());
    }

    #[test]
    fn test_status_round_trip() {
        assert_eq!(LessonStatus::from("in_progress"), LessonStatus::InProgress);
        assert_eq!(LessonStatus::from("completed"), LessonStatus::Completed);
        assert_eq!(LessonStatus::from("junk"), LessonStatus::NotStarted);
        assert_eq!(LessonStatus::Completed.to_string(), "completed");
    }
}
