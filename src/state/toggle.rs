use crate::state::store::LogEvent;

/// Decide whether the next event for a user is a login or a logout.
///
/// The first event for a user is always a login; after that the state
/// strictly alternates off the most recent prior event. Callers must resolve
/// the identity first: this is never invoked for an unknown scan.
pub fn resolve(prior: &[LogEvent]) -> bool {
    match prior.last() {
        Some(event) => !event.was_login,
        None => true,
    }
}
