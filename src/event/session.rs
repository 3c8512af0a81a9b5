//! Sessions and event groups (spec.md §3, §4.2).

use super::types::{Event, EventGroup, SessionCallback};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// A FIFO of event generations plus a session-level callback.
///
/// `current_back` tracks which group [`super::engine::EventEngine::session_append`]
/// should append to (spec.md invariant E4: "append always targets the group
/// currently being assembled for the *next* generation, not the one mid-dispatch").
pub struct Session<D> {
    pub(crate) callback: Option<SessionCallback<D>>,
    pub(crate) groups: Mutex<VecDeque<Arc<EventGroup<D>>>>,
    pub(crate) current_back: Mutex<Arc<EventGroup<D>>>,
}

impl<D> Session<D> {
    pub(crate) fn new(root: Event<D>, callback: Option<SessionCallback<D>>) -> Arc<Self> {
        let group = Arc::new(EventGroup::new(0));
        group.events.lock().push_back(root);
        Arc::new(Self {
            callback,
            groups: Mutex::new(VecDeque::from([group.clone()])),
            current_back: Mutex::new(group),
        })
    }
}
