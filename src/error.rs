//! Error types for the network core.
//!
//! Propagation outcomes (halted target, expired TTL, ...) are not errors; see
//! [`crate::types::TerminationReason`].

use crate::types::AgentId;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum NetworkError {
    #[error("agent '{0}' is already registered")]
    DuplicateId(AgentId),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl NetworkError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}
