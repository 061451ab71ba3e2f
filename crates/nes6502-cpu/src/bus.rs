//! Shared-level broadcast bus with attachable harnesses.
//!
//! A [`Bus`] is a named rendezvous carrying a single scalar "level" and a set
//! of attached harnesses. Writing a new level notifies every other attached
//! harness whose callback is present and whose threshold window contains the
//! level. An NES instance wires up three of these: a 16-bit address bus, an
//! 8-bit data bus, and a 1-bit write signal.
//!
//! This re-expresses the observer pattern in `original_source/source/bus.hpp`
//! (`Bus`/`BusHarness`, raw owner pointers, a `bus_level_updated` callback)
//! without raw pointers or lifetime-circular references: devices hold a
//! cloned [`BusHandle`] rather than borrowing the bus, and the bus's
//! broadcast list holds boxed listener handles keyed by a small [`HarnessId`]
//! rather than `void *`. A `put` snapshots its harness list before invoking
//! any callback, so a callback is free to call `put` again (including on the
//! same bus) without deadlocking or corrupting iteration order.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

/// Identifies one device's attachment to a bus.
///
/// Assigned by the device itself (typically a small monotonically increasing
/// counter owned by the NES board), not by the bus.
pub type HarnessId = u32;

/// Receives bus broadcasts.
///
/// Implemented by devices that need to react to traffic on a bus they are
/// attached to (memory regions). Devices that only drive a bus (the CPU)
/// attach without a listener.
pub trait BusListener {
    /// Called once per `put` for every other attached harness whose
    /// threshold window contains the new level.
    fn on_bus_event(&mut self, owner: HarnessId, level: u32);
}

/// Errors raised by bus attachment.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// A harness with this id is already attached to the bus.
    #[error("harness {owner_name:?} (id {owner}) is already attached to bus {bus_name:?}")]
    AlreadyAttached {
        /// The harness id that was already present.
        owner: HarnessId,
        /// The harness's device name, for diagnostics.
        owner_name: &'static str,
        /// The bus it was already attached to.
        bus_name: &'static str,
    },
}

struct Harness {
    owner: HarnessId,
    owner_name: &'static str,
    listener: Option<Rc<RefCell<dyn BusListener>>>,
    /// Inclusive `[lower, upper]` window; `None` means "always notify".
    threshold: Option<(u32, u32)>,
}

impl Clone for Harness {
    fn clone(&self) -> Self {
        Self {
            owner: self.owner,
            owner_name: self.owner_name,
            listener: self.listener.clone(),
            threshold: self.threshold,
        }
    }
}

/// A named broadcast point: one scalar level, a set of attached harnesses.
pub struct Bus {
    name: &'static str,
    level: u32,
    harnesses: Vec<Harness>,
}

impl fmt::Debug for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus")
            .field("name", &self.name)
            .field("level", &self.level)
            .field("harness_count", &self.harnesses.len())
            .finish()
    }
}

impl Bus {
    /// Creates an empty bus at level 0.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            level: 0,
            harnesses: Vec::new(),
        }
    }

    /// Bus name, for diagnostics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of currently attached harnesses, in insertion order.
    #[must_use]
    pub fn harness_ids(&self) -> Vec<HarnessId> {
        self.harnesses.iter().map(|h| h.owner).collect()
    }

    fn attach(
        &mut self,
        owner: HarnessId,
        owner_name: &'static str,
        listener: Option<Rc<RefCell<dyn BusListener>>>,
        threshold: Option<(u32, u32)>,
    ) -> Result<(), BusError> {
        if self.harnesses.iter().any(|h| h.owner == owner) {
            return Err(BusError::AlreadyAttached {
                owner,
                owner_name,
                bus_name: self.name,
            });
        }
        log::debug!(
            "bus {}: attaching {} (id {}), total {} harnesses, has callback: {}",
            self.name,
            owner_name,
            owner,
            self.harnesses.len() + 1,
            listener.is_some(),
        );
        self.harnesses.push(Harness {
            owner,
            owner_name,
            listener,
            threshold,
        });
        Ok(())
    }

    fn get(&self) -> u32 {
        self.level
    }

    fn put(&mut self, level: u32, by: HarnessId) {
        self.level = level;
        // Snapshot so a re-entrant `put` from inside a callback sees a
        // frozen harness list for the duration of this broadcast.
        let snapshot: Vec<Harness> = self.harnesses.clone();
        for harness in &snapshot {
            if harness.owner == by {
                continue;
            }
            let Some(listener) = &harness.listener else {
                continue;
            };
            let in_window = harness
                .threshold
                .is_none_or(|(lo, hi)| level >= lo && level <= hi);
            if in_window {
                listener.borrow_mut().on_bus_event(harness.owner, level);
            }
        }
    }

    fn detach_all(&mut self) {
        self.harnesses.clear();
        self.level = 0;
    }
}

/// Shared handle to a [`Bus`].
///
/// Cloning a `BusHandle` is cheap (reference-counted) and is how every device
/// attached to a bus reaches it; devices never borrow a `&Bus` directly,
/// which avoids the lifetime-circular-reference problem the original raw
/// owner-pointer design has.
#[derive(Clone)]
pub struct BusHandle(Rc<RefCell<Bus>>);

impl BusHandle {
    /// Creates a new, unattached bus.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self(Rc::new(RefCell::new(Bus::new(name))))
    }

    /// Bus name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.0.borrow().name()
    }

    /// Attaches a harness with no callback (a pure driver, e.g. the CPU).
    ///
    /// # Errors
    ///
    /// Returns [`BusError::AlreadyAttached`] if `owner` is already attached.
    pub fn attach(&self, owner: HarnessId, owner_name: &'static str) -> Result<(), BusError> {
        self.0.borrow_mut().attach(owner, owner_name, None, None)
    }

    /// Attaches a harness with a callback invoked on every matching `put`.
    ///
    /// `threshold`, if present, restricts invocation to levels within the
    /// inclusive `[lower, upper]` window.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::AlreadyAttached`] if `owner` is already attached.
    pub fn attach_listener(
        &self,
        owner: HarnessId,
        owner_name: &'static str,
        listener: Rc<RefCell<dyn BusListener>>,
        threshold: Option<(u32, u32)>,
    ) -> Result<(), BusError> {
        self.0
            .borrow_mut()
            .attach(owner, owner_name, Some(listener), threshold)
    }

    /// Returns the current level.
    #[must_use]
    pub fn get(&self) -> u32 {
        self.0.borrow().get()
    }

    /// Sets the level and notifies every other attached harness in
    /// insertion order. `by` identifies the originator, which is never
    /// re-notified of its own write.
    pub fn put(&self, level: u32, by: HarnessId) {
        self.0.borrow_mut().put(level, by);
    }

    /// Unbinds every harness and resets the level to 0.
    pub fn detach_all(&self) {
        self.0.borrow_mut().detach_all();
    }

    /// Harness ids currently attached, in insertion order. Exposed for the
    /// structural-invariant tests in spec.md §8.
    #[must_use]
    pub fn harness_ids(&self) -> Vec<HarnessId> {
        self.0.borrow().harness_ids()
    }
}

impl fmt::Debug for BusHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.borrow().fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Recorder {
        events: Rc<RefCell<Vec<(HarnessId, u32)>>>,
    }

    impl BusListener for Recorder {
        fn on_bus_event(&mut self, owner: HarnessId, level: u32) {
            self.events.borrow_mut().push((owner, level));
        }
    }

    #[test]
    fn attach_rejects_duplicate_owner() {
        let bus = BusHandle::new("test");
        bus.attach(1, "a").unwrap();
        let err = bus.attach(1, "a-again").unwrap_err();
        assert_eq!(
            err,
            BusError::AlreadyAttached {
                owner: 1,
                owner_name: "a-again",
                bus_name: "test",
            }
        );
    }

    #[test]
    fn put_notifies_every_other_harness_in_order_excluding_originator() {
        let bus = BusHandle::new("test");
        let events = Rc::new(RefCell::new(Vec::new()));
        let a = Rc::new(RefCell::new(Recorder {
            events: events.clone(),
        }));
        let b = Rc::new(RefCell::new(Recorder {
            events: events.clone(),
        }));
        bus.attach_listener(1, "a", a, None).unwrap();
        bus.attach_listener(2, "b", b, None).unwrap();
        bus.attach(3, "driver").unwrap();

        bus.put(0x42, 3);

        assert_eq!(*events.borrow(), vec![(1, 0x42), (2, 0x42)]);
        assert_eq!(bus.get(), 0x42);
    }

    #[test]
    fn put_does_not_notify_the_originator() {
        let bus = BusHandle::new("test");
        let events = Rc::new(RefCell::new(Vec::new()));
        let a = Rc::new(RefCell::new(Recorder {
            events: events.clone(),
        }));
        bus.attach_listener(1, "a", a, None).unwrap();
        bus.put(7, 1);
        assert!(events.borrow().is_empty());
    }

    #[test]
    fn threshold_filters_callback_invocation() {
        let bus = BusHandle::new("test");
        let events = Rc::new(RefCell::new(Vec::new()));
        let a = Rc::new(RefCell::new(Recorder {
            events: events.clone(),
        }));
        bus.attach_listener(1, "a", a, Some((0x10, 0x1F))).unwrap();

        bus.put(0x05, 99);
        bus.put(0x15, 99);
        bus.put(0x20, 99);

        assert_eq!(*events.borrow(), vec![(1, 0x15)]);
    }

    #[test]
    fn detach_all_then_reattach_yields_only_reattached_harnesses_in_order() {
        let bus = BusHandle::new("test");
        bus.attach(1, "a").unwrap();
        bus.attach(2, "b").unwrap();
        bus.put(3, 9);

        bus.detach_all();
        assert!(bus.harness_ids().is_empty());
        assert_eq!(bus.get(), 0);

        bus.attach(5, "c").unwrap();
        bus.attach(4, "d").unwrap();
        assert_eq!(bus.harness_ids(), vec![5, 4]);
    }

    #[test]
    fn reentrant_put_from_within_a_callback_does_not_panic() {
        struct Reentrant {
            bus: BusHandle,
            seen: Rc<Cell<u32>>,
        }
        impl BusListener for Reentrant {
            fn on_bus_event(&mut self, _owner: HarnessId, level: u32) {
                self.seen.set(level);
                if level < 3 {
                    self.bus.put(level + 1, 2);
                }
            }
        }

        let bus = BusHandle::new("test");
        let seen = Rc::new(Cell::new(0));
        let listener = Rc::new(RefCell::new(Reentrant {
            bus: bus.clone(),
            seen: seen.clone(),
        }));
        bus.attach_listener(1, "reentrant", listener, None)
            .unwrap();
        bus.attach(2, "driver").unwrap();

        bus.put(1, 2);

        assert_eq!(seen.get(), 3);
        assert_eq!(bus.get(), 3);
    }

    proptest::proptest! {
        #[test]
        fn detach_all_then_reattach_always_yields_exactly_the_reattached_ids_in_order(
            first in proptest::collection::hash_set(0u32..1000, 0..8),
            second in proptest::collection::hash_set(0u32..1000, 0..8),
        ) {
            let bus = BusHandle::new("test");
            let mut first: Vec<u32> = first.into_iter().collect();
            first.sort_unstable();
            for id in &first {
                bus.attach(*id, "first").unwrap();
            }
            bus.detach_all();

            let mut second: Vec<u32> = second.into_iter().collect();
            second.sort_unstable();
            for id in &second {
                bus.attach(*id, "second").unwrap();
            }

            proptest::prop_assert_eq!(bus.harness_ids(), second);
        }
    }
}
