use intray_core::IntrayError;

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error(transparent)]
    Core(#[from] IntrayError),

    #[error("failed to encode JSON output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("backends are inconsistent")]
    Inconsistent,
}

impl AdminError {
    /// 2 for drift found by `verify`, 1 for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            AdminError::Inconsistent => 2,
            AdminError::Core(_) | AdminError::Json(_) => 1,
        }
    }
}
