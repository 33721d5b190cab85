//! Diesel table declarations for the learning domain.

diesel::table! {
    learn_programs (id) {
        id -> Uuid,
        title -> Text,
        cohort -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    learn_phases (id) {
        id -> Uuid,
        program_id -> Uuid,
        seq -> Int4,
        title -> Text,
        weight -> Nullable<Float8>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    learn_lessons (id) {
        id -> Uuid,
        phase_id -> Uuid,
        seq -> Int4,
        title -> Text,
        content_type -> Text,
        required -> Bool,
        duration_seconds -> Nullable<Int4>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    learn_learners (id) {
        id -> Uuid,
        display_name -> Text,
        cohort -> Text,
        program_id -> Uuid,
        enrolled_at -> Timestamptz,
        active -> Bool,
    }
}

diesel::table! {
    learn_lesson_progress (id) {
        id -> Uuid,
        learner_id -> Uuid,
        lesson_id -> Uuid,
        status -> Text,
        watch_seconds -> Int4,
        started_at -> Timestamptz,
        completed_at -> Nullable<Timestamptz>,
        updated_at -> Timestamptz,
    }
}

// Idempotency journal: the primary key is the caller-supplied event id,
// so a replayed event is rejected by the unique constraint rather than
// re-applied.
diesel::table! {
    learn_progress_events (id) {
        id -> Uuid,
        learner_id -> Uuid,
        lesson_id -> Uuid,
        status -> Text,
        watch_seconds -> Int4,
        received_at -> Timestamptz,
    }
}

diesel::table! {
    learn_points_ledger (id) {
        id -> Uuid,
        learner_id -> Uuid,
        event_id -> Nullable<Uuid>,
        reason -> Text,
        points -> Int4,
        reverses -> Nullable<Uuid>,
        granted_at -> Timestamptz,
    }
}

diesel::table! {
    learn_badge_grants (id) {
        id -> Uuid,
        learner_id -> Uuid,
        badge_id -> Text,
        event_id -> Nullable<Uuid>,
        earned_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    learn_programs,
    learn_phases,
    learn_lessons,
    learn_learners,
    learn_lesson_progress,
    learn_progress_events,
    learn_points_ledger,
    learn_badge_grants,
);
