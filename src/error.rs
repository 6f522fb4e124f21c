use thiserror::Error;

use crate::world::EntityId;

/// Setup-time failures. The per-tick path never produces these.
#[derive(Debug, Error)]
pub enum ArenaError {
    /// A configuration value that sanitizing cannot repair.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// Group id 0 is reserved for "no group".
    #[error("group id 0 is reserved")]
    ReservedGroup,
    #[error("group id {0} exceeds the largest supported group id")]
    GroupOutOfRange(u32),
    #[error("group {0} has no registered settings")]
    UnknownGroup(u32),
    #[error("group {0} is already registered")]
    DuplicateGroup(u32),
    #[error("projectile template {0} is not registered")]
    UnknownTemplate(usize),
    #[error("entity {0:?} does not exist")]
    UnknownEntity(EntityId),
    #[error("config decode error: {0}")]
    Json(#[from] serde_json::Error),
}
