//! ETag computation for tree views.
//!
//! ETags are SHA-256 hashes over the sorted `(person, manager, assignment)`
//! triples of every node in the forest. Any committed write to the scope
//! replaces at least one assignment id, so it always changes the tag.

use ladder_core::{
  ids::{AssignmentId, PersonId},
  tree::Forest,
};
use sha2::{Digest, Sha256};

/// Compute a quoted strong ETag for `forest`.
pub fn compute_etag(forest: &Forest) -> String {
  let mut triples: Vec<(PersonId, Option<PersonId>, AssignmentId)> = forest
    .nodes()
    .map(|n| (n.person_id, n.manager_id, n.assignment_id))
    .collect();
  triples.sort();

  let mut hasher = Sha256::new();
  for (person, manager, assignment) in &triples {
    hasher.update(person.as_uuid().as_bytes());
    match manager {
      Some(m) => hasher.update(m.as_uuid().as_bytes()),
      None => hasher.update([0u8; 16]),
    }
    hasher.update(assignment.as_uuid().as_bytes());
  }
  format!("\"{}\"", hex::encode(hasher.finalize()))
}

/// Whether an `If-None-Match` header value matches `etag`.
///
/// Accepts `*`, comma-separated lists, weak validators and bare (unquoted)
/// tags.
pub fn if_none_match(header: &str, etag: &str) -> bool {
  let wanted = etag.trim_matches('"');
  header.split(',').map(str::trim).any(|candidate| {
    candidate == "*"
      || candidate.trim_start_matches("W/").trim_matches('"') == wanted
  })
}
