use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScoreError {
    #[error("category weights must sum to 100, got {sum:.2}")]
    InvalidWeightSum { sum: f64 },

    #[error("{stage}: {message}")]
    Persistence { stage: &'static str, message: String },

    #[error("component {category} failed for student {student_id}: {message}")]
    ComponentCompute {
        student_id: String,
        category: &'static str,
        message: String,
    },

    #[error("batch recalculation failed: {0}")]
    Orchestration(String),
}

impl ScoreError {
    pub fn persistence(stage: &'static str, err: impl std::fmt::Display) -> Self {
        ScoreError::Persistence {
            stage,
            message: err.to_string(),
        }
    }

    /// Error code used in IPC error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            ScoreError::InvalidWeightSum { .. } => "invalid_weight_sum",
            ScoreError::Persistence { .. } => "db_update_failed",
            ScoreError::ComponentCompute { .. } => "component_compute_failed",
            ScoreError::Orchestration(_) => "recalc_failed",
        }
    }
}

pub type Result<T> = std::result::Result<T, ScoreError>;
