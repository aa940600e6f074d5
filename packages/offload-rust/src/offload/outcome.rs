//! Which path produced an offload result, and why the fallback ran.

use super::context::Unavailable;
use super::dispatch::DispatchError;

/// A transform result tagged with the path that produced it.
///
/// Callers that only want the value use [`Outcome::into_inner`]; the tag is for
/// logs, metrics, and tests.
#[derive(Debug)]
pub enum Outcome<T> {
    /// The background context produced the result.
    Background(T),
    /// The synchronous transform produced the result after the background path failed.
    Fallback { result: T, reason: FallbackReason },
}

impl<T> Outcome<T> {
    #[must_use]
    pub fn into_inner(self) -> T {
        match self {
            Self::Background(result) | Self::Fallback { result, .. } => result,
        }
    }

    #[must_use]
    pub fn result(&self) -> &T {
        match self {
            Self::Background(result) | Self::Fallback { result, .. } => result,
        }
    }

    #[must_use]
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }

    /// Why the fallback ran, if it did.
    #[must_use]
    pub fn reason(&self) -> Option<&FallbackReason> {
        match self {
            Self::Background(_) => None,
            Self::Fallback { reason, .. } => Some(reason),
        }
    }

    /// `"background"` or `"fallback"`.
    #[must_use]
    pub fn path(&self) -> &'static str {
        match self {
            Self::Background(_) => "background",
            Self::Fallback { .. } => "fallback",
        }
    }
}

/// Why an offload ran the synchronous transform.
#[derive(Debug, thiserror::Error)]
pub enum FallbackReason {
    #[error(transparent)]
    Unavailable(#[from] Unavailable),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl FallbackReason {
    /// Short label for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "unavailable",
            Self::Dispatch(e) => e.kind(),
        }
    }
}
