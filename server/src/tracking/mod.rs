//! Live route tracking core.
//!
//! - [`connections`]: connection id -> driver id bindings
//! - [`history`]: append-only writes of position samples and archived routes
//! - [`session`]: the per-driver active-session state machine
//! - [`relay`]: fan-out of accepted positions and route-ended events
//! - [`roster`]: snapshot of active sessions plus the read-only REST handlers

pub mod connections;
pub mod history;
pub mod relay;
pub mod roster;
pub mod session;

use thiserror::Error;

use crate::store::StoreError;

/// Failures of a route session operation.
/// Missing-session outcomes are not errors; see `PositionOutcome` and `FinalizeOutcome`.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid driver id {0}")]
    InvalidDriverId(i64),

    #[error("unknown driver {0}")]
    UnknownDriver(i64),

    #[error("driver {0} is not active")]
    InactiveDriver(i64),

    #[error("unknown vehicle {0}")]
    UnknownVehicle(i64),

    #[error("vehicle {0} is not active")]
    InactiveVehicle(i64),

    #[error("invalid position: {0}")]
    InvalidPosition(String),

    #[error("route start for driver {0} kept conflicting with a concurrent start")]
    Conflict(i64),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SessionError {
    /// Error code reported to the immediate caller (HTTP-like).
    pub fn code(&self) -> u32 {
        match self {
            Self::InvalidDriverId(_)
            | Self::InactiveDriver(_)
            | Self::InactiveVehicle(_)
            | Self::InvalidPosition(_) => 400,
            Self::UnknownDriver(_) | Self::UnknownVehicle(_) => 404,
            Self::Conflict(_) => 409,
            Self::Store(_) => 500,
        }
    }
}
