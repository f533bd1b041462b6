//! Counting fake policies.
//!
//! [`CountingPolicy`] hands out [`FakeResource`]s and records every hook the
//! pool invokes, in order. Clones share the same record, so a test keeps one
//! clone as a probe while the pool owns the other.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use respool::Policy;

/// What the fake factory produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactoryMode {
    /// Every created resource passes validation.
    Valid,
    /// Every created resource fails validation.
    Invalid,
    /// Creation returns nothing.
    Absent,
}

/// A resource produced by [`CountingPolicy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeResource {
    /// Sequence number, starting at 0.
    pub id: usize,
    /// Whether the resource was created healthy.
    pub healthy: bool,
    /// Times this resource was activated.
    pub activations: usize,
}

/// One policy hook invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A create attempt; `None` when nothing was produced.
    Created(Option<usize>),
    /// Validation of a resource and its verdict.
    Validated(usize, bool),
    /// Activation of a resource.
    Activated(usize),
    /// Passivation of a resource.
    Passivated(usize),
    /// Destruction of a resource.
    Destroyed(usize),
}

/// Per-hook call totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// Create attempts, including ones that produced nothing.
    pub created: usize,
    /// Validate calls.
    pub validated: usize,
    /// Activate calls.
    pub activated: usize,
    /// Passivate calls.
    pub passivated: usize,
    /// Destroy calls.
    pub destroyed: usize,
}

#[derive(Debug)]
struct Record {
    mode: Mutex<FactoryMode>,
    reject: AtomicBool,
    next_id: AtomicUsize,
    events: Mutex<Vec<Event>>,
}

/// A [`Policy`] over [`FakeResource`]s that records every call.
#[derive(Debug, Clone)]
pub struct CountingPolicy {
    record: Arc<Record>,
}

impl Default for CountingPolicy {
    fn default() -> Self {
        Self::new(FactoryMode::Valid)
    }
}

impl CountingPolicy {
    /// Create a policy whose factory starts in `mode`.
    #[must_use]
    pub fn new(mode: FactoryMode) -> Self {
        Self {
            record: Arc::new(Record {
                mode: Mutex::new(mode),
                reject: AtomicBool::new(false),
                next_id: AtomicUsize::new(0),
                events: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Change what the factory produces from now on.
    pub fn set_mode(&self, mode: FactoryMode) {
        *self.record.mode.lock() = mode;
    }

    /// Make validation fail for every resource, including healthy ones.
    pub fn reject_all(&self, reject: bool) {
        self.record.reject.store(reject, Ordering::SeqCst);
    }

    /// Every hook call so far, in order.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.record.events.lock().clone()
    }

    /// Call totals so far.
    #[must_use]
    pub fn counts(&self) -> CallCounts {
        let mut counts = CallCounts::default();
        for event in self.record.events.lock().iter() {
            match event {
                Event::Created(_) => counts.created += 1,
                Event::Validated(..) => counts.validated += 1,
                Event::Activated(_) => counts.activated += 1,
                Event::Passivated(_) => counts.passivated += 1,
                Event::Destroyed(_) => counts.destroyed += 1,
            }
        }
        counts
    }

    /// Ids of destroyed resources, in destruction order.
    #[must_use]
    pub fn destroyed_ids(&self) -> Vec<usize> {
        self.record
            .events
            .lock()
            .iter()
            .filter_map(|event| match event {
                Event::Destroyed(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    /// Forget everything recorded so far.
    pub fn reset_events(&self) {
        self.record.events.lock().clear();
    }

    fn log(&self, event: Event) {
        tracing::trace!(?event, "policy hook");
        self.record.events.lock().push(event);
    }
}

impl Policy for CountingPolicy {
    type Resource = FakeResource;

    fn create(&self) -> Option<FakeResource> {
        let mode = *self.record.mode.lock();
        let healthy = match mode {
            FactoryMode::Valid => true,
            FactoryMode::Invalid => false,
            FactoryMode::Absent => {
                self.log(Event::Created(None));
                return None;
            }
        };

        let id = self.record.next_id.fetch_add(1, Ordering::SeqCst);
        self.log(Event::Created(Some(id)));
        Some(FakeResource {
            id,
            healthy,
            activations: 0,
        })
    }

    fn validate(&self, resource: &mut FakeResource) -> bool {
        let ok = resource.healthy && !self.record.reject.load(Ordering::SeqCst);
        self.log(Event::Validated(resource.id, ok));
        ok
    }

    fn activate(&self, resource: &mut FakeResource) {
        resource.activations += 1;
        self.log(Event::Activated(resource.id));
    }

    fn passivate(&self, resource: &mut FakeResource) {
        self.log(Event::Passivated(resource.id));
    }

    fn destroy(&self, resource: FakeResource) {
        self.log(Event::Destroyed(resource.id));
    }
}
