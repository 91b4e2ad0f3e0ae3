use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Player,
    Spot,
    Route,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Player => f.write_str("player"),
            EntityKind::Spot => f.write_str("spot"),
            EntityKind::Route => f.write_str("route"),
        }
    }
}

/// Every way a core operation can refuse a request. None of these leave
/// partial state behind.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("auto-log cooldown active for spot {spot_id}, retry in {retry_after_ms}ms")]
    CooldownActive { spot_id: String, retry_after_ms: i64 },
    #[error("invalid reward: {0}")]
    InvalidReward(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl EngineError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Rate limits are the only refusal a caller is expected to retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CooldownActive { .. })
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
