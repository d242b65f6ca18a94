#![forbid(unsafe_code)]

//! Per-update driver for fields that must be refreshed every frame.
//!
//! Most fields are lazy and only recompute when read. Some must be brought
//! up to date from the scene-graph loop itself: outputs that nobody reads
//! synchronously, or [`RealtimeField`](crate::realtime::RealtimeField)s that
//! pull values written by a device thread. Such fields are registered with
//! an [`EventSink`] and a [`Period`], and [`EventSink::tick`] is called once
//! per scene-graph update.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::time::Duration;

use tracing::{debug, debug_span};
use web_time::Instant;

use crate::config::GraphConfig;
use crate::field::{Field, FieldId, FieldRef, WeakFieldRef};

/// How often a registered field is refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Period {
    /// On every tick.
    #[default]
    EveryTick,
    /// On every n-th tick. `Count(0)` behaves like `Count(1)`.
    Count(u32),
    /// On the first tick at least this long after the previous refresh.
    Time(Duration),
}

struct Entry {
    id: FieldId,
    field: WeakFieldRef,
    period: Period,
    ticks_since: Cell<u32>,
    last_refresh: Cell<Option<Instant>>,
}

impl Entry {
    fn is_due(&self, now: Instant) -> bool {
        match self.period {
            Period::EveryTick => true,
            Period::Count(n) => {
                let seen = self.ticks_since.get() + 1;
                if seen >= n.max(1) {
                    self.ticks_since.set(0);
                    true
                } else {
                    self.ticks_since.set(seen);
                    false
                }
            }
            Period::Time(interval) => match self.last_refresh.get() {
                Some(last) if now.duration_since(last) < interval => false,
                _ => {
                    self.last_refresh.set(Some(now));
                    true
                }
            },
        }
    }
}

/// Fields refreshed from the scene-graph loop.
///
/// The sink holds its fields weakly; dropped fields are pruned on the next
/// tick.
#[derive(Default)]
pub struct EventSink {
    entries: RefCell<Vec<Entry>>,
    ticks: Cell<u64>,
}

impl EventSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Refresh `field` with `period`. Registering again changes the period.
    pub fn register(&self, field: &FieldRef, period: Period) {
        let id = field.base().id();
        let mut entries = self.entries.borrow_mut();
        if let Some(entry) = entries.iter_mut().find(|e| e.id == id) {
            entry.period = period;
            entry.ticks_since.set(0);
            return;
        }
        debug!(field = %field.base().full_name(), ?period, "registered with event sink");
        entries.push(Entry {
            id,
            field: field.base().weak(),
            period,
            ticks_since: Cell::new(0),
            last_refresh: Cell::new(None),
        });
    }

    /// Register with the period from the active [`GraphConfig`].
    pub fn register_default(&self, field: &FieldRef) {
        self.register(field, GraphConfig::current().realtime_period);
    }

    pub fn unregister(&self, field: &dyn Field) -> bool {
        let id = field.base().id();
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|e| e.id != id);
        entries.len() != before
    }

    #[must_use]
    pub fn contains(&self, field: &dyn Field) -> bool {
        let id = field.base().id();
        self.entries.borrow().iter().any(|e| e.id == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of completed ticks.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.ticks.get()
    }

    /// Bring every due field up to date. Returns how many were refreshed.
    pub fn tick(&self) -> usize {
        let tick = self.ticks.get() + 1;
        self.ticks.set(tick);
        let _span = debug_span!("tick", tick).entered();
        let now = Instant::now();

        // Collect first: refreshing may register or unregister fields.
        let due: Vec<FieldRef> = {
            let mut entries = self.entries.borrow_mut();
            entries.retain(|e| e.field.strong_count() > 0);
            entries
                .iter()
                .filter(|e| e.is_due(now))
                .filter_map(|e| e.field.upgrade())
                .collect()
        };
        for field in &due {
            field.up_to_date();
        }
        due.len()
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("fields", &self.len())
            .field("ticks", &self.ticks.get())
            .finish()
    }
}
