use std::io;

use thiserror::Error;

use crate::entity::EntityId;
use crate::grid::GridError;

/// Failure of a single entity's update. The scenario logs it and carries
/// on with the remaining fish.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("entity {0} is not in the scenario")]
    MissingEntity(EntityId),
    #[error("entity {0} is not a fish")]
    NotAFish(EntityId),
    #[error(transparent)]
    Grid(#[from] GridError),
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("scenario file I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("scenario file is malformed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("scenario file version {0} is not supported")]
    UnknownVersion(u32),
}
