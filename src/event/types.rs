//! Shared types for the event engine (spec.md §3 "Event Engine").
//!
//! Grounded on `examples/other_examples`'s iota `EventBus` (listener
//! callbacks as `Box<dyn Fn + Send + Sync>`, dispatch by walking a
//! registered list) for the listener-callback shape, generalized to the
//! spec's richer session/generation model. A single `user` parameter the
//! C original would thread through every callback is dropped throughout
//! this module: a Rust closure already captures whatever context it needs,
//! so `cb: impl Fn(&Session<D>, &Event<D>) -> bool` plays the role of the
//! original's `cb(session, event, user)`.

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A stable 32-bit identifier for an event type, derived from a
/// human-readable name via [`crate::strid::strid`].
pub type EventTypeId = u32;

/// Renders an event's data to a human-readable string, capped at 4096
/// bytes per spec.md §6's documented formatter buffer maximum.
pub type Formatter<D> = Box<dyn Fn(&D) -> String + Send + Sync>;

const FORMATTER_CAP: usize = 4096;

/// Per-type registration record: a formatter and the head of an
/// atomically-prepended listener list.
pub(crate) struct EventDef<D> {
    formatter: Formatter<D>,
    pub(crate) listeners: ArcSwapOption<Listener<D>>,
}

impl<D> EventDef<D> {
    pub(crate) fn new(formatter: Formatter<D>) -> Self {
        Self {
            formatter,
            listeners: ArcSwapOption::from(None),
        }
    }

    pub(crate) fn render(&self, data: &D) -> String {
        let mut rendered = (self.formatter)(data);
        if rendered.len() > FORMATTER_CAP {
            rendered.truncate(FORMATTER_CAP);
            while !rendered.is_char_boundary(rendered.len()) {
                rendered.pop();
            }
        }
        rendered
    }
}

/// A registered listener. `callback` is logically removed by atomically
/// storing `None`; `destroy_callback` fires exactly once, during the next
/// maintenance pass (or at engine `destroy`), after physical unlink.
pub struct Listener<D> {
    pub(crate) callback: ArcSwapOption<dyn Fn(&super::session::Session<D>, &Event<D>) -> bool + Send + Sync>,
    pub(crate) destroy_callback: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    pub(crate) next: ArcSwapOption<Listener<D>>,
}

/// Invoked when an event is torn down, with `(type_id, data, dispatched)`.
/// `dispatched` is `true` iff the event actually reached [`Event::dispatched`]
/// before teardown (spec.md §7: "the event was at least offered to
/// listeners").
pub type EventDestroyCallback<D> = Box<dyn FnOnce(EventTypeId, &D, bool) + Send>;

/// One event in a session's generation.
pub struct Event<D> {
    pub(crate) type_id: EventTypeId,
    pub(crate) def: Arc<EventDef<D>>,
    pub(crate) data: D,
    pub(crate) depth: u32,
    pub(crate) dispatched: AtomicBool,
    pub(crate) destroy_callback: Mutex<Option<EventDestroyCallback<D>>>,
}

impl<D> Event<D> {
    pub fn type_id(&self) -> EventTypeId {
        self.type_id
    }

    pub fn data(&self) -> &D {
        &self.data
    }

    /// Generation depth (root event's group is depth 0).
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// `true` once every listener registered at dispatch time has had a
    /// chance to run (spec.md invariant E3).
    pub fn is_dispatched(&self) -> bool {
        self.dispatched.load(Ordering::Acquire)
    }

    /// Render this event's data through its type's formatter.
    pub fn render(&self) -> String {
        self.def.render(&self.data)
    }
}

/// A FIFO of events belonging to one "generation" of a session.
pub(crate) struct EventGroup<D> {
    pub(crate) depth: u32,
    pub(crate) events: Mutex<std::collections::VecDeque<Event<D>>>,
}

impl<D> EventGroup<D> {
    pub(crate) fn new(depth: u32) -> Self {
        Self {
            depth,
            events: Mutex::new(std::collections::VecDeque::new()),
        }
    }
}

/// The three reasons a session callback can be invoked (spec.md §4.2).
pub enum SessionCallbackReason<'a, D> {
    /// A listener ran and returned its result.
    ListenerResult { event: &'a Event<D>, result: bool },
    /// Every listener for `event` has had a chance to run. Set `*halt` to
    /// `true` to stop processing any further generations of this session.
    EventComplete {
        event: &'a Event<D>,
        depth: u32,
        halt: &'a mut bool,
    },
    /// The session has finished (drained or halted) and is being freed.
    SessionDestroy,
}

/// A session-level callback, invoked for each [`SessionCallbackReason`].
pub type SessionCallback<D> = Box<dyn Fn(SessionCallbackReason<'_, D>) + Send + Sync>;
