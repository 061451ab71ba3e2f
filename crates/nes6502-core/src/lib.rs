//! NES board model: bus-mirrored internal RAM, iNES/NROM cartridge loading,
//! and the CPU/bus wiring that assembles them into a runnable platform.
//!
//! Built on [`nes6502_cpu`]'s broadcast-bus CPU core. This crate supplies
//! the rest of spec.md's platform: [`memory::MemoryRegion`] for RAM and
//! PRG-ROM, [`cartridge`] for iNES image parsing (mapper 0 / NROM only),
//! and [`board::NesBoard`] which wires a CPU and those regions onto three
//! shared buses.

#![warn(missing_docs)]

pub mod board;
pub mod cartridge;
pub mod memory;

pub use board::{BoardError, NesBoard};
pub use cartridge::{Cartridge, CartridgeError, CartridgeImage, Mirroring};
pub use memory::MemoryRegion;
