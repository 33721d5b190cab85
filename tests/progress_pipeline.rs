//! End-to-end pipeline tests against a real Postgres instance.
//!
//! Skips cleanly when DATABASE_URL is unset or unreachable, so the suite
//! stays green on machines without a database.

use chrono::Utc;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use uuid::Uuid;

use learnserver::curriculum::{Lesson, Phase, Program};
use learnserver::progress::{Learner, LessonStatus, ProgressEngine, ProgressRequest};
use learnserver::shared::schema::{
    learn_learners, learn_lessons, learn_phases, learn_points_ledger, learn_programs,
};
use learnserver::shared::utils::DbPool;

fn connect() -> Option<DbPool> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let manager = ConnectionManager::<PgConnection>::new(url);
    let pool = Pool::builder().max_size(2).build(manager).ok()?;
    pool.get().ok()?;
    Some(pool)
}

fn ensure_tables(conn: &mut PgConnection) {
    let ddl = [
        "CREATE TABLE IF NOT EXISTS learn_programs (id UUID PRIMARY KEY, title TEXT NOT NULL, \
         cohort TEXT NOT NULL, created_at TIMESTAMPTZ NOT NULL)",
        "CREATE TABLE IF NOT EXISTS learn_phases (id UUID PRIMARY KEY, program_id UUID NOT NULL, \
         seq INT4 NOT NULL, title TEXT NOT NULL, weight FLOAT8, created_at TIMESTAMPTZ NOT NULL)",
        "CREATE TABLE IF NOT EXISTS learn_lessons (id UUID PRIMARY KEY, phase_id UUID NOT NULL, \
         seq INT4 NOT NULL, title TEXT NOT NULL, content_type TEXT NOT NULL, \
         required BOOL NOT NULL, duration_seconds INT4, created_at TIMESTAMPTZ NOT NULL)",
        "CREATE TABLE IF NOT EXISTS learn_learners (id UUID PRIMARY KEY, display_name TEXT NOT NULL, \
         cohort TEXT NOT NULL, program_id UUID NOT NULL, enrolled_at TIMESTAMPTZ NOT NULL, \
         active BOOL NOT NULL)",
        "CREATE TABLE IF NOT EXISTS learn_lesson_progress (id UUID PRIMARY KEY, \
         learner_id UUID NOT NULL, lesson_id UUID NOT NULL, status TEXT NOT NULL, \
         watch_seconds INT4 NOT NULL, started_at TIMESTAMPTZ NOT NULL, \
         completed_at TIMESTAMPTZ, updated_at TIMESTAMPTZ NOT NULL, \
         UNIQUE (learner_id, lesson_id))",
        "CREATE TABLE IF NOT EXISTS learn_progress_events (id UUID PRIMARY KEY, \
         learner_id UUID NOT NULL, lesson_id UUID NOT NULL, status TEXT NOT NULL, \
         watch_seconds INT4 NOT NULL, received_at TIMESTAMPTZ NOT NULL)",
        "CREATE TABLE IF NOT EXISTS learn_points_ledger (id UUID PRIMARY KEY, \
         learner_id UUID NOT NULL, event_id UUID, reason TEXT NOT NULL, points INT4 NOT NULL, \
         reverses UUID, granted_at TIMESTAMPTZ NOT NULL)",
        "CREATE TABLE IF NOT EXISTS learn_badge_grants (id UUID PRIMARY KEY, \
         learner_id UUID NOT NULL, badge_id TEXT NOT NULL, event_id UUID, \
         earned_at TIMESTAMPTZ NOT NULL, UNIQUE (learner_id, badge_id))",
    ];
    for stmt in ddl {
        diesel::sql_query(stmt).execute(conn).expect("ddl failed");
    }
}

struct Fixture {
    learner_id: Uuid,
    lesson1: Uuid,
    lesson2: Uuid,
    phase2: Uuid,
}

/// Program with phases [1,2,3]; phase 1 has two required lessons.
fn seed(conn: &mut PgConnection) -> Fixture {
    let now = Utc::now();
    let program_id = Uuid::new_v4();
    let cohort = format!("it-{}", Uuid::new_v4());

    diesel::insert_into(learn_programs::table)
        .values(&Program {
            id: program_id,
            title: "Integration Program".to_string(),
            cohort: cohort.clone(),
            created_at: now,
        })
        .execute(conn)
        .unwrap();

    let mut phase_ids = Vec::new();
    for seq in 1..=3 {
        let id = Uuid::new_v4();
        phase_ids.push(id);
        diesel::insert_into(learn_phases::table)
            .values(&Phase {
                id,
                program_id,
                seq,
                title: format!("Phase {seq}"),
                weight: None,
                created_at: now,
            })
            .execute(conn)
            .unwrap();
    }

    let mut lesson_ids = Vec::new();
    for seq in 1..=2 {
        let id = Uuid::new_v4();
        lesson_ids.push(id);
        diesel::insert_into(learn_lessons::table)
            .values(&Lesson {
                id,
                phase_id: phase_ids[0],
                seq,
                title: format!("Lesson {seq}"),
                content_type: "video".to_string(),
                required: true,
                duration_seconds: Some(900),
                created_at: now,
            })
            .execute(conn)
            .unwrap();
    }
    // Later phases need a lesson each so they are completable.
    for phase_id in &phase_ids[1..] {
        diesel::insert_into(learn_lessons::table)
            .values(&Lesson {
                id: Uuid::new_v4(),
                phase_id: *phase_id,
                seq: 1,
                title: "Lesson 1".to_string(),
                content_type: "document".to_string(),
                required: true,
                duration_seconds: None,
                created_at: now,
            })
            .execute(conn)
            .unwrap();
    }

    let learner_id = Uuid::new_v4();
    diesel::insert_into(learn_learners::table)
        .values(&Learner {
            id: learner_id,
            display_name: "Iris".to_string(),
            cohort,
            program_id,
            enrolled_at: now,
            active: true,
        })
        .execute(conn)
        .unwrap();

    Fixture {
        learner_id,
        lesson1: lesson_ids[0],
        lesson2: lesson_ids[1],
        phase2: phase_ids[1],
    }
}

fn completion(fixture: &Fixture, lesson_id: Uuid, event_id: Uuid) -> ProgressRequest {
    ProgressRequest {
        learner_id: fixture.learner_id,
        lesson_id,
        event_id,
        status: LessonStatus::Completed,
        watch_seconds: Some(900),
    }
}

#[tokio::test]
async fn test_phase_completion_unlocks_next_phase_once() {
    let Some(pool) = connect() else {
        println!("Skipping test - database not available");
        return;
    };
    ensure_tables(&mut pool.get().unwrap());
    let fixture = seed(&mut pool.get().unwrap());
    let engine = ProgressEngine::new(pool.clone());

    // First required lesson: halfway, nothing unlocked.
    let (outcome, _) = engine
        .record_progress(completion(&fixture, fixture.lesson1, Uuid::new_v4()))
        .await
        .unwrap();
    let phase1 = outcome
        .progress
        .phases
        .iter()
        .find(|p| p.seq == 1)
        .unwrap();
    assert_eq!(phase1.percent, 50);
    let phase2 = outcome
        .progress
        .phases
        .iter()
        .find(|p| p.seq == 2)
        .unwrap();
    assert!(!phase2.unlocked);
    assert!(outcome.unlocked_phases.is_empty());

    // Second required lesson: phase complete, exactly one unlock signal.
    let (outcome, events) = engine
        .record_progress(completion(&fixture, fixture.lesson2, Uuid::new_v4()))
        .await
        .unwrap();
    let phase1 = outcome
        .progress
        .phases
        .iter()
        .find(|p| p.seq == 1)
        .unwrap();
    assert_eq!(phase1.percent, 100);
    assert!(phase1.completed);
    assert_eq!(outcome.unlocked_phases.len(), 1);
    assert_eq!(outcome.unlocked_phases[0].phase_id, fixture.phase2);
    let unlock_signals = events
        .iter()
        .filter(|e| matches!(e, learnserver::shared::state::LearnEvent::PhaseUnlocked { .. }))
        .count();
    assert_eq!(unlock_signals, 1);
}

#[tokio::test]
async fn test_duplicate_event_id_credits_points_once() {
    let Some(pool) = connect() else {
        println!("Skipping test - database not available");
        return;
    };
    ensure_tables(&mut pool.get().unwrap());
    let fixture = seed(&mut pool.get().unwrap());
    let engine = ProgressEngine::new(pool.clone());

    let event_id = Uuid::new_v4();
    let (first, _) = engine
        .record_progress(completion(&fixture, fixture.lesson1, event_id))
        .await
        .unwrap();
    assert!(!first.duplicate);
    assert!(first.points_awarded > 0);

    let total_after_first: i64 = {
        let entries: Vec<i32> = learn_points_ledger::table
            .filter(learn_points_ledger::learner_id.eq(fixture.learner_id))
            .select(learn_points_ledger::points)
            .load(&mut pool.get().unwrap())
            .unwrap();
        entries.iter().map(|p| *p as i64).sum()
    };

    // Replay: same points and badges reported, nothing credited again.
    let (second, events) = engine
        .record_progress(completion(&fixture, fixture.lesson1, event_id))
        .await
        .unwrap();
    assert!(second.duplicate);
    assert_eq!(second.points_awarded, first.points_awarded);
    let first_badges: Vec<&str> = first.badges_awarded.iter().map(|b| b.badge.id).collect();
    let second_badges: Vec<&str> = second.badges_awarded.iter().map(|b| b.badge.id).collect();
    assert_eq!(first_badges, second_badges);
    assert!(events.is_empty());

    let total_after_second: i64 = {
        let entries: Vec<i32> = learn_points_ledger::table
            .filter(learn_points_ledger::learner_id.eq(fixture.learner_id))
            .select(learn_points_ledger::points)
            .load(&mut pool.get().unwrap())
            .unwrap();
        entries.iter().map(|p| *p as i64).sum()
    };
    assert_eq!(total_after_first, total_after_second);
}

#[tokio::test]
async fn test_replayed_in_progress_event_reports_no_unlocks() {
    let Some(pool) = connect() else {
        println!("Skipping test - database not available");
        return;
    };
    ensure_tables(&mut pool.get().unwrap());
    let fixture = seed(&mut pool.get().unwrap());
    let engine = ProgressEngine::new(pool.clone());

    // An in-progress event on lesson 2, then both lessons completed by
    // later events, which unlocks phase 2.
    let in_progress_event = Uuid::new_v4();
    engine
        .record_progress(ProgressRequest {
            learner_id: fixture.learner_id,
            lesson_id: fixture.lesson2,
            event_id: in_progress_event,
            status: LessonStatus::InProgress,
            watch_seconds: Some(120),
        })
        .await
        .unwrap();
    engine
        .record_progress(completion(&fixture, fixture.lesson1, Uuid::new_v4()))
        .await
        .unwrap();
    let (outcome, _) = engine
        .record_progress(completion(&fixture, fixture.lesson2, Uuid::new_v4()))
        .await
        .unwrap();
    assert_eq!(outcome.unlocked_phases.len(), 1);

    // Replaying the in-progress event must not claim the unlock the later
    // completion caused.
    let (replayed, _) = engine
        .record_progress(ProgressRequest {
            learner_id: fixture.learner_id,
            lesson_id: fixture.lesson2,
            event_id: in_progress_event,
            status: LessonStatus::InProgress,
            watch_seconds: Some(120),
        })
        .await
        .unwrap();
    assert!(replayed.duplicate);
    assert!(replayed.unlocked_phases.is_empty());
    assert_eq!(replayed.points_awarded, 0);
}

#[tokio::test]
async fn test_watch_time_alone_does_not_complete() {
    let Some(pool) = connect() else {
        println!("Skipping test - database not available");
        return;
    };
    ensure_tables(&mut pool.get().unwrap());
    let fixture = seed(&mut pool.get().unwrap());
    let engine = ProgressEngine::new(pool.clone());

    let (outcome, _) = engine
        .record_progress(ProgressRequest {
            learner_id: fixture.learner_id,
            lesson_id: fixture.lesson1,
            event_id: Uuid::new_v4(),
            status: LessonStatus::InProgress,
            watch_seconds: Some(890),
        })
        .await
        .unwrap();

    assert_eq!(outcome.points_awarded, 0);
    let record = engine
        .get_progress(fixture.learner_id, fixture.lesson1)
        .await
        .unwrap()
        .expect("record created lazily on first interaction");
    assert_eq!(record.status, "in_progress");
    assert_eq!(record.watch_seconds, 890);
}
