use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by the lifecycle engine. All of them are recoverable by
/// the caller; [`Error::is_retryable`] tells callers whether to retry the
/// same call or re-read authoritative state first.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input, rejected before any state mutation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A gated transition whose precondition is unsatisfied. The state is
    /// unchanged and the unmet condition is named.
    #[error("precondition not met: {condition}")]
    PreconditionNotMet { condition: &'static str },

    /// Lost the race on exclusive winner selection. The caller must
    /// re-fetch the authoritative `SelectedDeal` instead of retrying.
    #[error("auction already decided")]
    AlreadyDecided,

    /// An auction cannot be created from a shortlist with no active items.
    #[error("shortlist has no active items")]
    EmptyShortlist,

    /// The shortlist already holds the maximum number of active items.
    #[error("shortlist capacity of {} active items exceeded", model::SHORTLIST_CAPACITY)]
    CapacityExceeded,

    /// The referenced vehicle was sold or removed underneath the caller.
    #[error("vehicle is no longer available")]
    VehicleUnavailable,

    /// The auction is not accepting offers (wrong status or past deadline).
    #[error("auction is not open for offers")]
    AuctionNotOpen,

    /// A guarded update found the entity in a different state than the
    /// caller observed. Re-read before acting again.
    #[error("state changed concurrently: {0}")]
    StaleState(&'static str),

    /// A partner service could not be reached or timed out. Safe to retry;
    /// no state was changed.
    #[error("collaborator {name} unavailable")]
    CollaboratorUnavailable { name: &'static str },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl Error {
    /// Whether the caller may retry the same operation unchanged. Stale
    /// state and `AlreadyDecided` require a re-read first; validation and
    /// capacity errors require user correction.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CollaboratorUnavailable { .. } | Self::Database(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability_split() {
        assert!(Error::CollaboratorUnavailable { name: "payments" }.is_retryable());
        assert!(!Error::AlreadyDecided.is_retryable());
        assert!(!Error::StaleState("auction status").is_retryable());
        assert!(!Error::CapacityExceeded.is_retryable());
    }
}
