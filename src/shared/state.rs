use crate::leaderboard::SnapshotStore;
use crate::shared::utils::DbPool;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Domain event published to downstream consumers (notifications,
/// analytics). Delivery is fire-and-forget; the pipeline never depends
/// on anyone listening.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LearnEvent {
    ProgressChanged {
        learner_id: Uuid,
        lesson_id: Uuid,
        status: String,
        at: DateTime<Utc>,
    },
    PhaseUnlocked {
        learner_id: Uuid,
        phase_id: Uuid,
        phase_seq: i32,
        at: DateTime<Utc>,
    },
    PointsAwarded {
        learner_id: Uuid,
        reason: String,
        points: i32,
        at: DateTime<Utc>,
    },
    BadgeAwarded {
        learner_id: Uuid,
        badge_id: String,
        at: DateTime<Utc>,
    },
}

/// Shared application state handed to every axum handler.
pub struct AppState {
    pub conn: DbPool,
    pub events: broadcast::Sender<LearnEvent>,
    pub leaderboard_snapshots: Arc<SnapshotStore>,
}

impl AppState {
    pub fn new(conn: DbPool) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            conn,
            events,
            leaderboard_snapshots: Arc::new(SnapshotStore::default()),
        }
    }

    /// Publish without caring whether any subscriber is attached.
    pub fn publish(&self, event: LearnEvent) {
        let _ = self.events.send(event);
    }
}
