use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, LeadDeskError>;

#[derive(Error, Debug)]
pub enum LeadDeskError {
    #[error("Lead not found: {0}")]
    LeadNotFound(String),

    #[error("Agent not found: {0}")]
    AgentNotFound(Uuid),

    #[error("Agent {agent} is not the current assignee of lead {lead}")]
    NotCurrentAssignee { lead: Uuid, agent: Uuid },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Owner account cannot be deleted while members or leads still reference it")]
    OwnerDeletionForbidden,

    #[error("No owner agent exists")]
    NoOwnerAgent,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Lead {lead} was modified concurrently (expected version {expected})")]
    StaleVersion { lead: Uuid, expected: i64 },

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Dependency unavailable: {0}")]
    Dependency(String),

    #[error("Store call timed out after {0}ms")]
    Timeout(u64),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse failure class, used by the transport to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    Validation,
    Conflict,
    Unauthenticated,
    Dependency,
    Internal,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Validation => "validation_failed",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Unauthenticated => "unauthorized",
            ErrorKind::Dependency => "dependency_unavailable",
            ErrorKind::Internal => "internal_error",
        }
    }
}

impl LeadDeskError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LeadDeskError::LeadNotFound(_)
            | LeadDeskError::AgentNotFound(_)
            | LeadDeskError::NoOwnerAgent => ErrorKind::NotFound,
            LeadDeskError::NotCurrentAssignee { .. }
            | LeadDeskError::Forbidden(_)
            | LeadDeskError::OwnerDeletionForbidden => ErrorKind::Forbidden,
            LeadDeskError::Validation(_) => ErrorKind::Validation,
            LeadDeskError::DuplicateKey(_)
            | LeadDeskError::Conflict(_)
            | LeadDeskError::StaleVersion { .. } => ErrorKind::Conflict,
            LeadDeskError::Unauthenticated(_) => ErrorKind::Unauthenticated,
            LeadDeskError::Dependency(_)
            | LeadDeskError::Timeout(_)
            | LeadDeskError::Database(_) => ErrorKind::Dependency,
            LeadDeskError::Config(_) | LeadDeskError::Io(_) => ErrorKind::Internal,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        LeadDeskError::Validation(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        LeadDeskError::Forbidden(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignee_and_owner_rules_map_to_forbidden() {
        let err = LeadDeskError::NotCurrentAssignee {
            lead: Uuid::new_v4(),
            agent: Uuid::new_v4(),
        };
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(LeadDeskError::OwnerDeletionForbidden.kind(), ErrorKind::Forbidden);
    }

    #[test]
    fn test_store_races_map_to_conflict() {
        assert_eq!(
            LeadDeskError::DuplicateKey("2026-1016".into()).kind(),
            ErrorKind::Conflict
        );
        let stale = LeadDeskError::StaleVersion {
            lead: Uuid::new_v4(),
            expected: 3,
        };
        assert_eq!(stale.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_timeouts_are_dependency_failures() {
        assert_eq!(LeadDeskError::Timeout(250).kind(), ErrorKind::Dependency);
        assert_eq!(ErrorKind::Dependency.code(), "dependency_unavailable");
    }
}
