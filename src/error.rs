use axum::{response::IntoResponse, Json};

/// Error taxonomy for the learning core.
///
/// `DuplicateEvent` never reaches callers on the happy path: the progress
/// pipeline absorbs a replayed event id and answers it as plain success.
#[derive(Debug, thiserror::Error)]
pub enum LearnError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Curriculum integrity error: {0}")]
    CurriculumIntegrity(String),
    #[error("Duplicate event: {0}")]
    DuplicateEvent(uuid::Uuid),
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Database error: {0}")]
    Database(String),
}

impl From<diesel::result::Error> for LearnError {
    fn from(e: diesel::result::Error) -> Self {
        match e {
            diesel::result::Error::NotFound => Self::NotFound("record not found".to_string()),
            other => Self::Database(other.to_string()),
        }
    }
}

impl From<diesel::r2d2::PoolError> for LearnError {
    fn from(e: diesel::r2d2::PoolError) -> Self {
        Self::StoreUnavailable(e.to_string())
    }
}

impl IntoResponse for LearnError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;
        let (status, message) = match &self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::StoreUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            Self::CurriculumIntegrity(msg) | Self::Configuration(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, msg.clone())
            }
            // Surfacing a duplicate as an error is a pipeline bug; answer
            // 500 rather than invent a success body here.
            Self::DuplicateEvent(id) => {
                (StatusCode::INTERNAL_SERVER_ERROR, format!("unhandled duplicate event {id}"))
            }
            Self::Database(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };
        (
            status,
            Json(serde_json::json!({ "success": false, "error": message })),
        )
            .into_response()
    }
}
