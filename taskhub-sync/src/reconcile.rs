//! Set reconciliation between a required and an existing issue list.

use serde::Serialize;

use taskhub_core::{fingerprint::outer_difference, IssueList};

/// The writes needed to turn `existing` into `required`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncPlan {
    pub to_create: IssueList,
    pub to_delete: IssueList,
}

impl SyncPlan {
    pub fn is_noop(&self) -> bool {
        self.to_create.is_empty() && self.to_delete.is_empty()
    }
}

/// Compute both one-sided differences under the chosen granularity.
///
/// Titles are the identity key, so `required` first collapses to one issue
/// per title (last wins) in either mode. Output order within each list is
/// unspecified.
pub fn reconcile(required: &IssueList, existing: &IssueList, title_only: bool) -> SyncPlan {
    let required = required.last_per_title().fingerprint_map(title_only);
    let existing = existing.fingerprint_map(title_only);
    SyncPlan {
        to_create: outer_difference(&required, &existing),
        to_delete: outer_difference(&existing, &required),
    }
}
