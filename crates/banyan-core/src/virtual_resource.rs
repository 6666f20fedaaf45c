//! Shape validation and dispatch for the two list-valued virtual resources
//! rooted at `/tasks`: `add_continuations` and `remove_continuations`.
//!
//! A resource-level request is a list of `{targets, values}` entries; an
//! item-level request (either `POST /tasks/{id}/<res>` or an embedded key
//! inside `PATCH /tasks/{id}`) is wrapped into exactly one such entry before
//! reaching the same validators. `update_execution_data` is the third
//! virtual resource rooted at `/tasks`, but it carries no list to size-check
//! -- its own gating (token match, task-state lock) lives in
//! `execution::update_usage`.

use uuid::Uuid;

use crate::continuation::{ContinuationUpdate, MAX_CONT_SIZE, MAX_UPDATES};
use crate::error::CoordinatorError;

/// Wrap a single item-level `values` payload into the resource-level shape
/// every virtual-resource handler expects.
pub fn wrap_item_level(target: Uuid, values: Vec<Uuid>) -> Vec<ContinuationUpdate> {
    vec![ContinuationUpdate {
        targets: vec![target],
        values,
    }]
}

/// Shape validation shared by `add_continuations` / `remove_continuations`:
/// entry count and per-entry size, mirroring
/// `continuation::validate_updates` but exposed here too since the HTTP
/// layer validates shape before it ever constructs a `ContinuationUpdate`.
pub fn validate_shape(updates: &[ContinuationUpdate]) -> Result<(), CoordinatorError> {
    if updates.len() > MAX_UPDATES {
        return Err(CoordinatorError::SizeLimit);
    }
    for update in updates {
        if update.values.len() > MAX_CONT_SIZE || update.targets.is_empty() {
            return Err(CoordinatorError::SizeLimit);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_item_level_produces_a_single_entry() {
        let target = Uuid::new_v4();
        let values = vec![Uuid::new_v4(), Uuid::new_v4()];
        let wrapped = wrap_item_level(target, values.clone());
        assert_eq!(wrapped.len(), 1);
        assert_eq!(wrapped[0].targets, vec![target]);
        assert_eq!(wrapped[0].values, values);
    }

    #[test]
    fn validate_shape_rejects_too_many_updates() {
        let updates: Vec<ContinuationUpdate> = (0..MAX_UPDATES + 1)
            .map(|_| ContinuationUpdate {
                targets: vec![Uuid::new_v4()],
                values: vec![],
            })
            .collect();
        assert!(matches!(
            validate_shape(&updates),
            Err(CoordinatorError::SizeLimit)
        ));
    }

    #[test]
    fn validate_shape_rejects_oversized_values() {
        let updates = vec![ContinuationUpdate {
            targets: vec![Uuid::new_v4()],
            values: (0..MAX_CONT_SIZE + 1).map(|_| Uuid::new_v4()).collect(),
        }];
        assert!(matches!(
            validate_shape(&updates),
            Err(CoordinatorError::SizeLimit)
        ));
    }

    #[test]
    fn validate_shape_rejects_empty_targets() {
        let updates = vec![ContinuationUpdate {
            targets: vec![],
            values: vec![Uuid::new_v4()],
        }];
        assert!(matches!(
            validate_shape(&updates),
            Err(CoordinatorError::SizeLimit)
        ));
    }
}
