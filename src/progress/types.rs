//! Types for the progress module.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::badges::BadgeDef;
use crate::shared::schema::{learn_learners, learn_lesson_progress, learn_progress_events};

// ----- Learner -----

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = learn_learners)]
pub struct Learner {
    pub id: Uuid,
    pub display_name: String,
    pub cohort: String,
    pub program_id: Uuid,
    pub enrolled_at: DateTime<Utc>,
    pub active: bool,
}

// ----- Per-lesson progress -----

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = learn_lesson_progress)]
pub struct ProgressRecord {
    pub id: Uuid,
    pub learner_id: Uuid,
    pub lesson_id: Uuid,
    pub status: String,
    pub watch_seconds: i32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Idempotency journal row keyed by the caller's event id.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = learn_progress_events)]
pub struct ProgressEventRow {
    pub id: Uuid,
    pub learner_id: Uuid,
    pub lesson_id: Uuid,
    pub status: String,
    pub watch_seconds: i32,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LessonStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl LessonStatus {
    /// Ordering used by the monotonic guard: a write may only move a
    /// status forward.
    pub fn rank(&self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::InProgress => 1,
            Self::Completed => 2,
        }
    }
}

impl From<&str> for LessonStatus {
    fn from(s: &str) -> Self {
        match s {
            "in_progress" => Self::InProgress,
            "completed" => Self::Completed,
            _ => Self::NotStarted,
        }
    }
}

impl std::fmt::Display for LessonStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

// ----- Requests / responses -----

#[derive(Debug, Clone, Deserialize)]
pub struct ProgressRequest {
    pub learner_id: Uuid,
    pub lesson_id: Uuid,
    /// Unique per attempt; retries reuse it and are absorbed as no-ops.
    pub event_id: Uuid,
    pub status: LessonStatus,
    pub watch_seconds: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LessonProgressView {
    pub lesson_id: Uuid,
    pub seq: i32,
    pub title: String,
    pub content_type: String,
    pub required: bool,
    pub status: LessonStatus,
    pub watch_seconds: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhaseProgressView {
    pub phase_id: Uuid,
    pub seq: i32,
    pub title: String,
    pub percent: i32,
    pub completed: bool,
    pub unlocked: bool,
    /// True when a numbering gap earlier in the program prevents unlock
    /// evaluation for this phase; it is reported locked, never guessed.
    pub blocked_by_gap: bool,
    pub lessons: Vec<LessonProgressView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgramProgress {
    pub program_id: Uuid,
    pub overall_percent: i32,
    pub phases: Vec<PhaseProgressView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnlockedPhaseRef {
    pub phase_id: Uuid,
    pub seq: i32,
    pub title: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AwardedBadgeView {
    pub badge: &'static BadgeDef,
    pub earned_at: DateTime<Utc>,
    pub bonus_points: i32,
}

/// Result of one progress event: the new aggregate view plus everything
/// the event triggered.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressOutcome {
    pub progress: ProgramProgress,
    pub unlocked_phases: Vec<UnlockedPhaseRef>,
    pub points_awarded: i32,
    pub badges_awarded: Vec<AwardedBadgeView>,
    /// True when this call was absorbed as a replay of an earlier event.
    pub duplicate: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrollmentView {
    pub learner_id: Uuid,
    pub display_name: String,
    pub cohort: String,
    pub program_id: Uuid,
    pub program_title: String,
    pub enrolled_at: DateTime<Utc>,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LevelView {
    pub level: i32,
    pub name: String,
    pub total_experience: i64,
    pub level_progress: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardResponse {
    pub enrollment: EnrollmentView,
    pub progress: ProgramProgress,
    pub level: LevelView,
    pub badges: Vec<AwardedBadgeView>,
}
