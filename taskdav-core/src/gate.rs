//! Translation of rights checks into protocol outcomes.

use crate::error::{DavError, DavResult, StoreError, StoreResult};

/// Result of one rights check.
#[derive(Debug, Clone, PartialEq)]
pub enum GateOutcome {
    Allowed,
    Forbidden,
    /// The check itself failed, e.g. the entity vanished.
    Error(StoreError),
}

impl From<StoreResult<bool>> for GateOutcome {
    fn from(check: StoreResult<bool>) -> Self {
        match check {
            Ok(true) => GateOutcome::Allowed,
            Ok(false) => GateOutcome::Forbidden,
            Err(err) => GateOutcome::Error(err),
        }
    }
}

/// How an explicit denial is reported.
///
/// Reads answer not-found so a client cannot probe for projects it has no
/// access to; writes answer forbidden.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    NotFound,
    Forbidden,
}

impl GateOutcome {
    pub fn enforce(self, denial: Denial, resource: &str) -> DavResult<()> {
        match self {
            GateOutcome::Allowed => Ok(()),
            GateOutcome::Forbidden => Err(match denial {
                Denial::NotFound => DavError::NotFound(resource.to_string()),
                Denial::Forbidden => DavError::Forbidden(resource.to_string()),
            }),
            GateOutcome::Error(err) => Err(err.into()),
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, GateOutcome::Allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denial_policy_picks_the_error() {
        let read = GateOutcome::from(Ok(false)).enforce(Denial::NotFound, "project 3");
        assert_eq!(read, Err(DavError::NotFound("project 3".into())));

        let write = GateOutcome::from(Ok(false)).enforce(Denial::Forbidden, "task 9");
        assert_eq!(write, Err(DavError::Forbidden("task 9".into())));
    }

    #[test]
    fn test_allowed_passes_under_both_policies() {
        assert!(GateOutcome::from(Ok(true)).is_allowed());
        assert_eq!(GateOutcome::Allowed.enforce(Denial::NotFound, "x"), Ok(()));
        assert_eq!(GateOutcome::Allowed.enforce(Denial::Forbidden, "x"), Ok(()));
    }

    #[test]
    fn test_failed_check_propagates_store_error() {
        let backend = StoreError::Backend("timeout".into());
        let outcome = GateOutcome::from(Err(backend.clone()));
        assert_eq!(
            outcome.enforce(Denial::Forbidden, "task 1"),
            Err(DavError::Store(backend))
        );

        let vanished = GateOutcome::from(Err(StoreError::ItemNotFound("1".into())));
        assert!(matches!(
            vanished.enforce(Denial::Forbidden, "task 1"),
            Err(DavError::NotFound(_))
        ));
    }
}
