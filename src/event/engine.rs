//! The event engine: registration, dispatch workers, and maintenance
//! (spec.md §4.2).
//!
//! Grounded on the teacher's worker-pool/registry idiom (`dashmap::DashMap`
//! for the concurrently-read-mostly `eid -> EventDef` registry, matching how
//! the teacher indexes shared concurrent state elsewhere) and on
//! `crate::pool::Background` for the native-threaded workers and
//! maintenance pass already established by the store. The spec's two-tier
//! "condvar-guarded mutex for waiting workers, plus a separate spin lock for
//! the session-queue pointers" collapses here to one `parking_lot::Mutex` +
//! `parking_lot::Condvar` pair: `Mutex::lock` already gives the short
//! exclusive critical section the spin was for, and `Condvar` gives the
//! sleep/wake the mutex alone would not.

use super::session::Session;
use super::types::{
    Event, EventDef, EventDestroyCallback, EventTypeId, Formatter, Listener, SessionCallback,
    SessionCallbackReason,
};
use crate::mem::MemoryTracker;
use crate::pool::{interruptible_sleep, Background};
use arc_swap::ArcSwapOption;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

type ListenerCallback<D> = dyn Fn(&Session<D>, &Event<D>) -> bool + Send + Sync;

/// Parallel, multi-worker event dispatcher (spec.md §2 core B).
pub struct EventEngine<D> {
    defs: DashMap<EventTypeId, Arc<EventDef<D>>>,
    queue: Mutex<VecDeque<Arc<Session<D>>>>,
    queue_cv: Condvar,
    listener_lock: RwLock<()>,
    tracker: MemoryTracker,
    workers: Mutex<Vec<Background>>,
    maintenance: Mutex<Option<Background>>,
}

impl<D: Send + Sync + 'static> EventEngine<D> {
    /// Build the engine, spawning `worker_count` dispatch workers and one
    /// maintenance thread that sweeps logically-removed listeners every
    /// `maintenance_period`. Returns `None` if `worker_count` is zero.
    pub fn initialize(worker_count: usize, maintenance_period: Duration) -> Option<Arc<Self>> {
        if worker_count == 0 {
            return None;
        }
        let engine = Arc::new(Self {
            defs: DashMap::new(),
            queue: Mutex::new(VecDeque::new()),
            queue_cv: Condvar::new(),
            listener_lock: RwLock::new(()),
            tracker: MemoryTracker::new(),
            workers: Mutex::new(Vec::new()),
            maintenance: Mutex::new(None),
        });

        let mut workers = Vec::with_capacity(worker_count);
        for idx in 0..worker_count {
            let worker_engine = engine.clone();
            workers.push(Background::spawn(format!("event-worker-{idx}"), move |stop| {
                worker_engine.worker_loop(&stop);
            }));
        }
        *engine.workers.lock() = workers;

        let maintenance_engine = engine.clone();
        let poll = maintenance_period.min(Duration::from_millis(100));
        *engine.maintenance.lock() = Some(Background::spawn("event-maintenance", move |stop| {
            while interruptible_sleep(maintenance_period, &stop, poll) {
                maintenance_engine.maintenance_pass();
            }
        }));

        Some(engine)
    }

    fn worker_loop(&self, stop: &AtomicBool) {
        loop {
            let session = {
                let mut queue = self.queue.lock();
                loop {
                    if let Some(session) = queue.pop_front() {
                        break Some(session);
                    }
                    if stop.load(Ordering::Acquire) {
                        break None;
                    }
                    self.queue_cv.wait_for(&mut queue, Duration::from_millis(100));
                }
            };
            match session {
                Some(session) => self.process_session(session),
                None => break,
            }
        }
    }

    /// Register a new event type with its formatter. Returns `false` if
    /// `eid` is already registered.
    pub fn register_type(&self, eid: EventTypeId, formatter: Formatter<D>) -> bool {
        match self.defs.entry(eid) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(EventDef::new(formatter)));
                true
            }
        }
    }

    /// Head-prepend a listener onto `eid`'s list (spec.md §4.2: "listeners
    /// are added by atomically prepending to the head"). Returns `None` if
    /// `eid` was never registered.
    pub fn add_listener(
        &self,
        eid: EventTypeId,
        callback: impl Fn(&Session<D>, &Event<D>) -> bool + Send + Sync + 'static,
        destroy_callback: Option<Box<dyn FnOnce() + Send>>,
    ) -> Option<Arc<Listener<D>>> {
        let def = self.defs.get(&eid)?.clone();
        let _read = self.listener_lock.read();
        let listener = Arc::new(Listener {
            callback: ArcSwapOption::from(Some(Arc::new(callback) as Arc<ListenerCallback<D>>)),
            destroy_callback: Mutex::new(destroy_callback),
            next: ArcSwapOption::from(None),
        });
        def.listeners.rcu(|head| {
            listener.next.store(head.clone());
            Some(listener.clone())
        });
        self.tracker.record_alloc(std::mem::size_of::<Listener<D>>());
        Some(listener)
    }

    /// Logically remove a listener: its callback slot is cleared, so no
    /// in-flight or future dispatch invokes it again (spec.md invariant E1).
    /// Physical unlink happens later, on the next maintenance pass.
    pub fn remove_listener(&self, listener: &Arc<Listener<D>>) {
        let _read = self.listener_lock.read();
        listener.callback.store(None);
    }

    /// Start a new session rooted at one event of type `eid`. Returns `None`
    /// if `eid` was never registered.
    pub fn start_session(
        &self,
        eid: EventTypeId,
        data: D,
        event_destroy_callback: Option<EventDestroyCallback<D>>,
        session_callback: Option<SessionCallback<D>>,
    ) -> Option<Arc<Session<D>>> {
        let def = self.defs.get(&eid)?.clone();
        let event = Event {
            type_id: eid,
            def,
            data,
            depth: 0,
            dispatched: AtomicBool::new(false),
            destroy_callback: Mutex::new(event_destroy_callback),
        };
        let session = Session::new(event, session_callback);
        self.queue.lock().push_back(session.clone());
        self.queue_cv.notify_one();
        Some(session)
    }

    /// Cancel a session that has not yet been picked up by a worker. Returns
    /// `false` if the session was already being processed or had already
    /// finished.
    pub fn cancel_session(&self, session: &Arc<Session<D>>) -> bool {
        let removed = {
            let mut queue = self.queue.lock();
            if let Some(pos) = queue.iter().position(|s| Arc::ptr_eq(s, session)) {
                queue.remove(pos);
                true
            } else {
                false
            }
        };
        if removed {
            self.destroy_session(session);
        }
        removed
    }

    /// Append an event to the generation a session is currently assembling
    /// (spec.md invariant E4). Returns `false` if `eid` was never
    /// registered.
    pub fn session_append(
        &self,
        session: &Session<D>,
        eid: EventTypeId,
        data: D,
        event_destroy_callback: Option<EventDestroyCallback<D>>,
    ) -> bool {
        let Some(def) = self.defs.get(&eid).map(|d| d.clone()) else {
            return false;
        };
        let back = session.current_back.lock().clone();
        let event = Event {
            type_id: eid,
            def,
            data,
            depth: back.depth,
            dispatched: AtomicBool::new(false),
            destroy_callback: Mutex::new(event_destroy_callback),
        };
        back.events.lock().push_back(event);
        true
    }

    fn process_session(&self, session: Arc<Session<D>>) {
        let mut halted = false;
        loop {
            let group = match session.groups.lock().pop_front() {
                Some(group) => group,
                None => break,
            };
            let pending: Vec<Event<D>> = group.events.lock().drain(..).collect();
            if pending.is_empty() {
                continue;
            }
            if !halted {
                let next_group = Arc::new(super::types::EventGroup::new(group.depth + 1));
                *session.current_back.lock() = next_group.clone();
                session.groups.lock().push_back(next_group);
            }
            for event in pending {
                if halted {
                    self.destroy_event(event);
                    continue;
                }
                let stop = self.dispatch(&session, &event);
                self.destroy_event(event);
                if stop {
                    halted = true;
                }
            }
        }
        if let Some(cb) = &session.callback {
            cb(SessionCallbackReason::SessionDestroy);
        }
    }

    /// Walk `event`'s listener list under the structural read lock (E2),
    /// invoking every non-removed callback, then reports `EventComplete` to
    /// the session callback. Returns whether the session should halt.
    fn dispatch(&self, session: &Session<D>, event: &Event<D>) -> bool {
        {
            let _read = self.listener_lock.read();
            let mut cursor = event.def.listeners.load_full();
            while let Some(listener) = cursor {
                if let Some(cb) = listener.callback.load_full() {
                    let result = cb(session, event);
                    if let Some(session_cb) = &session.callback {
                        session_cb(SessionCallbackReason::ListenerResult { event, result });
                    }
                }
                cursor = listener.next.load_full();
            }
        }
        event.dispatched.store(true, Ordering::Release);
        let mut halt = false;
        if let Some(session_cb) = &session.callback {
            session_cb(SessionCallbackReason::EventComplete {
                event,
                depth: event.depth,
                halt: &mut halt,
            });
        }
        halt
    }

    fn destroy_event(&self, event: Event<D>) {
        let dispatched = event.dispatched.load(Ordering::Acquire);
        if let Some(cb) = event.destroy_callback.lock().take() {
            cb(event.type_id, &event.data, dispatched);
        }
    }

    fn destroy_session(&self, session: &Arc<Session<D>>) {
        let groups: Vec<Arc<super::types::EventGroup<D>>> = session.groups.lock().drain(..).collect();
        for group in groups {
            let events: Vec<Event<D>> = group.events.lock().drain(..).collect();
            for event in events {
                self.destroy_event(event);
            }
        }
        if let Some(cb) = &session.callback {
            cb(SessionCallbackReason::SessionDestroy);
        }
    }

    /// Physically unlink every logically-removed listener across all
    /// registered types, then runs each one's destroy callback exactly
    /// once (spec.md §4.2: "destroy callbacks never run while the
    /// structural write lock is held").
    fn maintenance_pass(&self) {
        let mut dropped: Vec<Arc<Listener<D>>> = Vec::new();
        {
            let _write = self.listener_lock.write();
            for entry in self.defs.iter() {
                let def = entry.value();
                let mut cursor = def.listeners.load_full();
                let mut kept = Vec::new();
                while let Some(node) = cursor {
                    cursor = node.next.load_full();
                    if node.callback.load().is_some() {
                        kept.push(node);
                    } else {
                        dropped.push(node);
                    }
                }
                let mut new_head: Option<Arc<Listener<D>>> = None;
                for node in kept.into_iter().rev() {
                    node.next.store(new_head.clone());
                    new_head = Some(node);
                }
                def.listeners.store(new_head);
            }
        }
        for listener in dropped {
            self.tracker.record_free(std::mem::size_of::<Listener<D>>());
            if let Some(cb) = listener.destroy_callback.lock().take() {
                cb();
            }
        }
    }

    pub fn live_listeners(&self) -> usize {
        self.tracker.live_objects()
    }

    /// Stop all workers and the maintenance thread, then forcibly destroy
    /// any sessions still queued (never reached a worker). In-flight
    /// sessions already popped by a worker finish normally — spec.md §5
    /// disallows mid-dispatch cancellation.
    pub fn destroy(&self) {
        if let Some(bg) = self.maintenance.lock().take() {
            bg.join();
        }
        let workers: Vec<Background> = std::mem::take(&mut *self.workers.lock());
        for worker in &workers {
            worker.request_stop();
        }
        self.queue_cv.notify_all();
        for worker in workers {
            worker.join();
        }
        let remaining: Vec<Arc<Session<D>>> = self.queue.lock().drain(..).collect();
        for session in remaining {
            self.destroy_session(&session);
        }
    }
}

impl<D> Drop for EventEngine<D> {
    fn drop(&mut self) {
        if let Some(bg) = self.maintenance.lock().take() {
            bg.join();
        }
        let workers: Vec<Background> = std::mem::take(&mut *self.workers.lock());
        for worker in &workers {
            worker.request_stop();
        }
        self.queue_cv.notify_all();
        for worker in workers {
            worker.join();
        }
    }
}
