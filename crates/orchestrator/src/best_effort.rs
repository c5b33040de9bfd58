use std::{fmt::Display, future::Future};

use tracing::debug;

/// Runs a step whose failure must not abort the caller. The error is logged and dropped.
pub async fn best_effort<T, E, F>(step: &str, fut: F) -> Option<T>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    match fut.await {
        Ok(value) => Some(value),
        Err(err) => {
            debug!(step, error = %err, "best-effort step failed (ignored)");
            None
        }
    }
}
