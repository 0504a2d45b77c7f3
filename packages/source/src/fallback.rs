//! Ordered fallback chains.
//!
//! Several lookups try a list of `(template, endpoint)` candidates until
//! one produces a result. [`first_success`] evaluates such a list in
//! order: `Ok(Some(_))` stops the chain, `Ok(None)` moves on to the next
//! candidate, and `Err(_)` aborts the whole chain.

use std::future::Future;

/// Evaluates `attempt` for each candidate in order and returns the first
/// produced value.
///
/// # Errors
///
/// Returns the first error produced by `attempt`; candidates after it are
/// not tried.
pub async fn first_success<C, T, E, F, Fut>(
    candidates: impl IntoIterator<Item = C>,
    mut attempt: F,
) -> Result<Option<T>, E>
where
    F: FnMut(C) -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    for candidate in candidates {
        if let Some(value) = attempt(candidate).await? {
            return Ok(Some(value));
        }
    }
    Ok(None)
}
