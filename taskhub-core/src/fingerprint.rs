//! SHA-256 fingerprints used as set keys when comparing issue lists.
//!
//! A fingerprint is the lowercase hex digest of either the title alone or the
//! issue's canonical form (`{title url origin}`). Hashing is a pure function:
//! every call builds its own hasher, so fingerprints can be computed from any
//! number of threads.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::types::{Issue, IssueList};

/// Fingerprint → issue. One entry per distinct fingerprint.
pub type FingerprintMap = HashMap<String, Issue>;

/// Deterministic fingerprint for `issue`.
///
/// `title_only` hashes the title; otherwise the canonical full value.
pub fn fingerprint(issue: &Issue, title_only: bool) -> String {
    if title_only {
        digest(&issue.title)
    } else {
        digest(&issue.canonical())
    }
}

/// Build the fingerprint map for `list` in one pass.
///
/// Issues sharing a fingerprint collapse to the last one in list order. Under
/// title-only comparison this means duplicate titles keep only the final
/// occurrence; the collision is logged.
pub fn fingerprint_map(list: &IssueList, title_only: bool) -> FingerprintMap {
    let mut map = HashMap::with_capacity(list.len());
    for issue in list {
        let key = fingerprint(issue, title_only);
        if let Some(previous) = map.insert(key, issue.clone()) {
            tracing::warn!(
                title = %previous.title,
                "duplicate fingerprint; keeping the last occurrence",
            );
        }
    }
    map
}

/// Issues in `a` whose fingerprint is absent from `b`.
///
/// Output order follows map iteration and is unspecified.
pub fn outer_difference(a: &FingerprintMap, b: &FingerprintMap) -> IssueList {
    a.iter()
        .filter(|(key, _)| !b.contains_key(*key))
        .map(|(_, issue)| issue.clone())
        .collect()
}

fn digest(input: &str) -> String {
    let mut h = Sha256::new();
    h.update(input.as_bytes());
    hex::encode(h.finalize())
}
