//! Bus-attached memory regions.
//!
//! A [`MemoryRegion`] is a passive bus listener bound to a byte backing
//! store, an address range, and a writeability flag. It reacts to traffic on
//! all three buses (address/data/write-signal) exactly the way the CPU's own
//! `read`/`write` primitives drive them (spec.md §4.2): an address-bus put
//! with the write signal low is a read (the region drives the data bus with
//! its backing byte), and the write-signal/data-bus puts that follow a write
//! sequence land the byte in the backing store once both the matching
//! address and the write signal are in place. Mirroring is just two or more
//! regions sharing the same `Rc<RefCell<Vec<u8>>>` backing store at adjacent
//! base addresses.

use std::cell::RefCell;
use std::rc::Rc;

use nes6502_cpu::bus::{BusError, BusHandle, BusListener, HarnessId};

/// A passive bus listener bound to a byte backing store and an address
/// window.
pub struct MemoryRegion {
    name: &'static str,
    backing: Rc<RefCell<Vec<u8>>>,
    base: u16,
    size: u16,
    writeable: bool,
    address_bus: BusHandle,
    data_bus: BusHandle,
    write_bus: BusHandle,
    harness_id: HarnessId,
}

impl MemoryRegion {
    /// Creates a region over `backing` (which must be at least `size` bytes
    /// long) covering `[base, base + size)`, and attaches it to all three
    /// buses under `harness_id`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::AlreadyAttached`] if `harness_id` is already
    /// attached to any of the three buses.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &'static str,
        backing: Rc<RefCell<Vec<u8>>>,
        base: u16,
        size: u16,
        writeable: bool,
        address_bus: BusHandle,
        data_bus: BusHandle,
        write_bus: BusHandle,
        harness_id: HarnessId,
    ) -> Result<Rc<RefCell<Self>>, BusError> {
        debug_assert!(
            backing.borrow().len() >= usize::from(size),
            "backing store shorter than the declared region size"
        );
        let region = Rc::new(RefCell::new(Self {
            name,
            backing,
            base,
            size,
            writeable,
            address_bus: address_bus.clone(),
            data_bus: data_bus.clone(),
            write_bus: write_bus.clone(),
            harness_id,
        }));
        address_bus.attach_listener(harness_id, name, region.clone(), None)?;
        data_bus.attach_listener(harness_id, name, region.clone(), None)?;
        write_bus.attach_listener(harness_id, name, region.clone(), None)?;
        Ok(region)
    }

    /// Re-attaches an already-constructed region to its three buses, for use
    /// after a `detach_all` (e.g. when loading a new cartridge).
    ///
    /// # Errors
    ///
    /// Returns [`BusError::AlreadyAttached`] if still attached.
    pub fn reattach(region: &Rc<RefCell<Self>>) -> Result<(), BusError> {
        let (name, harness_id, address_bus, data_bus, write_bus) = {
            let r = region.borrow();
            (
                r.name,
                r.harness_id,
                r.address_bus.clone(),
                r.data_bus.clone(),
                r.write_bus.clone(),
            )
        };
        address_bus.attach_listener(harness_id, name, region.clone(), None)?;
        data_bus.attach_listener(harness_id, name, region.clone(), None)?;
        write_bus.attach_listener(harness_id, name, region.clone(), None)?;
        Ok(())
    }

    fn offset_of(&self, addr: u16) -> Option<usize> {
        let addr = u32::from(addr);
        let base = u32::from(self.base);
        let end = base + u32::from(self.size);
        (addr >= base && addr < end).then(|| (addr - base) as usize)
    }

    /// Side-effect-free read for debug accessors: does not touch any bus.
    /// Returns `None` if `addr` falls outside this region's window.
    #[must_use]
    pub fn peek(&self, addr: u16) -> Option<u8> {
        self.offset_of(addr).map(|offset| self.backing.borrow()[offset])
    }

    /// This region's base address, for diagnostics.
    #[must_use]
    pub fn base(&self) -> u16 {
        self.base
    }
}

impl BusListener for MemoryRegion {
    fn on_bus_event(&mut self, _owner: HarnessId, _level: u32) {
        let addr = self.address_bus.get() as u16;
        let Some(offset) = self.offset_of(addr) else {
            return;
        };
        let write_asserted = self.write_bus.get() != 0;
        if write_asserted {
            if self.writeable {
                let value = self.data_bus.get() as u8;
                self.backing.borrow_mut()[offset] = value;
            }
        } else {
            let value = self.backing.borrow()[offset];
            self.data_bus.put(u32::from(value), self.harness_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire() -> (BusHandle, BusHandle, BusHandle) {
        (
            BusHandle::new("address"),
            BusHandle::new("data"),
            BusHandle::new("write"),
        )
    }

    #[test]
    fn read_drives_data_bus_from_backing_store() {
        let (address, data, write) = wire();
        let backing = Rc::new(RefCell::new(vec![0xABu8; 0x800]));
        let _region = MemoryRegion::new(
            "ram", backing, 0x0000, 0x0800, true, address.clone(), data.clone(), write.clone(), 1,
        )
        .unwrap();

        address.put(0x0010, 99);
        assert_eq!(data.get(), 0xAB);
    }

    #[test]
    fn write_stores_into_backing_store_when_writeable() {
        let (address, data, write) = wire();
        let backing = Rc::new(RefCell::new(vec![0u8; 0x800]));
        let _region = MemoryRegion::new(
            "ram", backing.clone(), 0x0000, 0x0800, true, address.clone(), data.clone(),
            write.clone(), 1,
        )
        .unwrap();

        address.put(0x0005, 99);
        write.put(1, 99);
        data.put(0x42, 99);
        write.put(0, 99);

        assert_eq!(backing.borrow()[0x0005], 0x42);
    }

    #[test]
    fn read_only_region_ignores_writes() {
        let (address, data, write) = wire();
        let backing = Rc::new(RefCell::new(vec![0x11u8; 0x100]));
        let _region = MemoryRegion::new(
            "rom", backing.clone(), 0x8000, 0x100, false, address.clone(), data.clone(),
            write.clone(), 1,
        )
        .unwrap();

        address.put(0x8000, 99);
        write.put(1, 99);
        data.put(0x99, 99);
        write.put(0, 99);

        assert_eq!(backing.borrow()[0], 0x11);
    }

    #[test]
    fn addresses_outside_the_window_are_ignored() {
        let (address, data, write) = wire();
        let backing = Rc::new(RefCell::new(vec![0x55u8; 0x10]));
        let _region = MemoryRegion::new(
            "small", backing, 0x2000, 0x10, true, address.clone(), data.clone(), write.clone(), 1,
        )
        .unwrap();

        data.put(0, 99); // prime to a known value
        address.put(0x3000, 99);
        assert_eq!(data.get(), 0); // untouched, no match
    }

    #[test]
    fn peek_reads_without_touching_any_bus() {
        let (address, data, write) = wire();
        let backing = Rc::new(RefCell::new(vec![0x7Eu8; 0x800]));
        let region = MemoryRegion::new(
            "ram", backing, 0x0000, 0x0800, true, address.clone(), data.clone(), write, 1,
        )
        .unwrap();

        assert_eq!(region.borrow().peek(0x0100), Some(0x7E));
        assert_eq!(region.borrow().peek(0x0900), None);
        assert_eq!(data.get(), 0); // the peek above never wrote to the data bus
    }
}
