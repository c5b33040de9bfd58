//! Cut-to-overlay orchestration on top of [`client_core::ObsClient`].
//!
//! [`CutSaga`] switches program to an overlay scene, plays a clip, switches back, and then
//! unwinds every temporary change it made through a [`rollback::Rollback`] ledger, whether the
//! run succeeded or not.

use client_core::ClientError;
use thiserror::Error;

pub mod best_effort;
pub mod plan;
pub mod rollback;
pub mod saga;
pub mod watcher;

pub use plan::CutPlan;
pub use saga::{CutOutcome, CutSaga};
pub use watcher::{HoldOutcome, HoldTimings};

#[derive(Debug, Error)]
pub enum SagaError {
    #[error(transparent)]
    Client(#[from] ClientError),
    /// Another run on the same saga has not finished yet.
    #[error("a cut is already in progress")]
    AlreadyRunning,
}
