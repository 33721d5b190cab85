//! # learnserver
//!
//! Progressive-unlock learning progress and gamification service:
//! phase/lesson completion tracking with derived unlock gating, an
//! append-only points ledger with leveling, badge awarding and a
//! timeframe-scoped leaderboard, exposed over REST.

pub mod badges;
pub mod config;
pub mod curriculum;
pub mod error;
pub mod leaderboard;
pub mod points;
pub mod progress;
pub mod shared;

use axum::Router;
use std::sync::Arc;

use crate::shared::state::AppState;

/// All HTTP routes, one sub-router per module.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(progress::configure_progress_routes())
        .merge(curriculum::configure_curriculum_routes())
        .merge(points::configure_points_routes())
        .merge(leaderboard::configure_leaderboard_routes())
        .merge(badges::configure_badge_routes())
}
