//! Diagnosis trigger policy.

/// Decide whether a diagnosis should run this turn, given how many
/// messages exist once the user's latest message is persisted.
///
/// Fires at the threshold and on every turn past it; it deliberately does
/// not remember whether a diagnosis already exists. Callers that want
/// at-most-one-per-question enforce that separately (see the
/// `diagnose_once` setting).
pub fn should_diagnose(message_count: usize, threshold: usize) -> bool {
    message_count >= threshold
}
