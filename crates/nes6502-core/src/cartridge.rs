//! iNES cartridge parsing and the attached PRG-ROM region(s).
//!
//! Grounded on the teacher's `rustynes-cpu/src/ines.rs` (header field shapes)
//! and `rustynes-mappers/src/rom.rs` + `mirroring.rs` (error enum and
//! mirroring enum shapes), narrowed to mapper 0 (NROM) per spec.md's Non-goals:
//! no NES 2.0, no submapper, no PRG-RAM/CHR-RAM accounting beyond reading and
//! discarding the CHR-ROM size byte.

use std::cell::RefCell;
use std::rc::Rc;

use nes6502_cpu::bus::{BusHandle, HarnessId};
use thiserror::Error;

use crate::memory::MemoryRegion;

const MAGIC: [u8; 4] = *b"NES\x1A";
const PRG_BANK_SIZE: usize = 16 * 1024;
const CHR_BANK_SIZE: usize = 8 * 1024;
const PRG_ROM_BASE: u16 = 0x8000;

/// Errors raised while parsing or loading an iNES cartridge image (spec.md
/// §7). Both are recoverable: the caller's previously loaded cartridge (or
/// lack of one) is left intact.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CartridgeError {
    /// The image is too short, has a bad magic number, or its declared
    /// PRG-ROM size doesn't fit the data available.
    #[error("invalid iNES header: {reason}")]
    InvalidHeader {
        /// Human-readable detail for diagnostics.
        reason: &'static str,
    },
    /// The image declares a format this core does not implement: a nonzero
    /// iNES version nibble (NES 2.0), or a mapper other than 0 (NROM).
    #[error("unsupported cartridge format: {reason}")]
    UnsupportedFormat {
        /// Human-readable detail for diagnostics.
        reason: &'static str,
    },
}

/// Nametable mirroring mode declared by the cartridge header (spec.md §3).
/// This core has no PPU to consult it, but it is part of the cartridge's
/// data model and is exposed for a future PPU or for host introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mirroring {
    /// Vertical arrangement (flags6 bit 0 set).
    Vertical,
    /// Horizontal arrangement (flags6 bit 0 clear, the default).
    Horizontal,
    /// Four-screen VRAM (flags6 bit 3 set, overrides bit 0).
    FourScreen,
}

/// The parsed contents of an iNES image, before any region is attached to a
/// bus. Produced by [`CartridgeImage::parse`]; consumed by [`Cartridge::load`].
#[derive(Debug, Clone)]
pub struct CartridgeImage {
    /// Mapper ID, extracted from the low/high nibbles of flags 6/7. Must be
    /// 0 (NROM) for this core.
    pub mapper_id: u8,
    /// Nametable mirroring declared by the header.
    pub mirroring: Mirroring,
    /// CHR-ROM size in 8 KiB units, read from byte 5. This core has no PPU
    /// to map CHR into, so the value is retained only for diagnostics.
    pub chr_rom_units: u8,
    /// Raw PRG-ROM bytes (16 KiB or 32 KiB).
    pub prg_rom: Vec<u8>,
}

impl CartridgeImage {
    /// Parses an iNES image per spec.md §6's header table.
    ///
    /// # Errors
    ///
    /// Returns [`CartridgeError::InvalidHeader`] if the image is too short,
    /// the magic number doesn't match, the declared PRG-ROM size is zero, or
    /// the data is truncated relative to the header's declared sizes.
    /// Returns [`CartridgeError::UnsupportedFormat`] if the iNES version
    /// nibble is nonzero, the mapper ID is not 0, or the declared PRG-ROM
    /// size is not 1 or 2 units (NROM supports only 16 KiB or 32 KiB).
    pub fn parse(bytes: &[u8]) -> Result<Self, CartridgeError> {
        if bytes.len() < 16 {
            return Err(CartridgeError::InvalidHeader {
                reason: "image shorter than the 16-byte iNES header",
            });
        }
        if bytes[0..4] != MAGIC {
            return Err(CartridgeError::InvalidHeader {
                reason: "missing 'NES\\x1A' magic number",
            });
        }

        let prg_rom_units = bytes[4];
        if prg_rom_units == 0 {
            return Err(CartridgeError::InvalidHeader {
                reason: "PRG-ROM size is zero",
            });
        }
        if prg_rom_units > 2 {
            return Err(CartridgeError::UnsupportedFormat {
                reason: "NROM supports only 16 KiB or 32 KiB PRG-ROM (1 or 2 units)",
            });
        }
        let chr_rom_units = bytes[5];

        let flags6 = bytes[6];
        let flags7 = bytes[7];

        if flags7 & 0x0F != 0 {
            return Err(CartridgeError::UnsupportedFormat {
                reason: "nonzero iNES version nibble (NES 2.0 is not supported)",
            });
        }

        let mapper_id = (flags6 >> 4) | (flags7 & 0xF0);
        if mapper_id != 0 {
            return Err(CartridgeError::UnsupportedFormat {
                reason: "only mapper 0 (NROM) is supported",
            });
        }

        let mirroring = if flags6 & 0x08 != 0 {
            Mirroring::FourScreen
        } else if flags6 & 0x01 != 0 {
            Mirroring::Vertical
        } else {
            Mirroring::Horizontal
        };
        let has_trainer = flags6 & 0x04 != 0;

        let mut offset = 16;
        if has_trainer {
            offset += 512;
        }

        let prg_rom_bytes = usize::from(prg_rom_units) * PRG_BANK_SIZE;
        if bytes.len() < offset + prg_rom_bytes {
            return Err(CartridgeError::InvalidHeader {
                reason: "PRG-ROM data truncated relative to the declared size",
            });
        }
        let prg_rom = bytes[offset..offset + prg_rom_bytes].to_vec();

        log::debug!(
            "cartridge: parsed {} KiB PRG-ROM, {} KiB CHR-ROM (unused), mapper {}, mirroring {:?}",
            prg_rom_bytes / 1024,
            usize::from(chr_rom_units) * CHR_BANK_SIZE / 1024,
            mapper_id,
            mirroring,
        );

        Ok(Self {
            mapper_id,
            mirroring,
            chr_rom_units,
            prg_rom,
        })
    }
}

/// A loaded cartridge: PRG-ROM region(s) attached to the three buses, plus
/// the metadata from its header.
pub struct Cartridge {
    mapper_id: u8,
    mirroring: Mirroring,
    regions: Vec<Rc<RefCell<MemoryRegion>>>,
}

impl Cartridge {
    /// Builds the PRG-ROM region(s) for `image` and attaches them to the
    /// three buses, allocating harness ids from `next_harness_id` (which is
    /// left one-past the last id used).
    ///
    /// A 16 KiB image is mirrored up to `$C000` per spec.md §6's memory map
    /// ("mirrored up from $C000 when only 16 KiB present"); a 32 KiB image
    /// occupies the full `$8000`-`$FFFF` window with no mirror.
    ///
    /// # Errors
    ///
    /// Propagates a [`nes6502_cpu::bus::BusError`] as an
    /// [`CartridgeError::InvalidHeader`] if a freshly allocated harness id
    /// somehow collides — not reachable in normal use since `next_harness_id`
    /// is always advanced past every id handed out.
    pub fn load(
        image: CartridgeImage,
        address_bus: &BusHandle,
        data_bus: &BusHandle,
        write_bus: &BusHandle,
        next_harness_id: &mut HarnessId,
    ) -> Result<Self, CartridgeError> {
        let len = image.prg_rom.len();
        let backing = Rc::new(RefCell::new(image.prg_rom));

        let mut regions = Vec::with_capacity(2);
        regions.push(Self::attach_region(
            "cartridge-prg-rom",
            backing.clone(),
            PRG_ROM_BASE,
            len as u16,
            address_bus,
            data_bus,
            write_bus,
            next_harness_id,
        )?);

        if len == PRG_BANK_SIZE {
            regions.push(Self::attach_region(
                "cartridge-prg-rom-mirror",
                backing,
                PRG_ROM_BASE + PRG_BANK_SIZE as u16,
                len as u16,
                address_bus,
                data_bus,
                write_bus,
                next_harness_id,
            )?);
        }

        Ok(Self {
            mapper_id: image.mapper_id,
            mirroring: image.mirroring,
            regions,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn attach_region(
        name: &'static str,
        backing: Rc<RefCell<Vec<u8>>>,
        base: u16,
        size: u16,
        address_bus: &BusHandle,
        data_bus: &BusHandle,
        write_bus: &BusHandle,
        next_harness_id: &mut HarnessId,
    ) -> Result<Rc<RefCell<MemoryRegion>>, CartridgeError> {
        let id = *next_harness_id;
        *next_harness_id += 1;
        MemoryRegion::new(
            name,
            backing,
            base,
            size,
            false,
            address_bus.clone(),
            data_bus.clone(),
            write_bus.clone(),
            id,
        )
        .map_err(|_| CartridgeError::InvalidHeader {
            reason: "internal harness id collision while attaching PRG-ROM",
        })
    }

    /// The mapper ID from the header (always 0 for a successfully loaded
    /// cartridge).
    #[must_use]
    pub fn mapper_id(&self) -> u8 {
        self.mapper_id
    }

    /// The nametable mirroring mode declared by the header.
    #[must_use]
    pub fn mirroring(&self) -> Mirroring {
        self.mirroring
    }

    /// The PRG-ROM memory region(s), for the board's side-effect-free debug
    /// reads.
    pub(crate) fn regions(&self) -> &[Rc<RefCell<MemoryRegion>>] {
        &self.regions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_bytes(prg_units: u8, flags6: u8, flags7: u8) -> Vec<u8> {
        let mut bytes = vec![0u8; 16];
        bytes[0..4].copy_from_slice(&MAGIC);
        bytes[4] = prg_units;
        bytes[5] = 0;
        bytes[6] = flags6;
        bytes[7] = flags7;
        bytes.extend(std::iter::repeat(0xEA).take(usize::from(prg_units) * PRG_BANK_SIZE));
        bytes
    }

    #[test]
    fn parses_a_minimal_16kib_nrom_image() {
        let bytes = image_bytes(1, 0, 0);
        let image = CartridgeImage::parse(&bytes).unwrap();
        assert_eq!(image.mapper_id, 0);
        assert_eq!(image.mirroring, Mirroring::Horizontal);
        assert_eq!(image.prg_rom.len(), PRG_BANK_SIZE);
    }

    #[test]
    fn vertical_mirroring_bit_is_read() {
        let bytes = image_bytes(1, 0x01, 0);
        let image = CartridgeImage::parse(&bytes).unwrap();
        assert_eq!(image.mirroring, Mirroring::Vertical);
    }

    #[test]
    fn four_screen_bit_overrides_vertical_bit() {
        let bytes = image_bytes(1, 0x09, 0);
        let image = CartridgeImage::parse(&bytes).unwrap();
        assert_eq!(image.mirroring, Mirroring::FourScreen);
    }

    #[test]
    fn trainer_is_skipped_before_prg_rom() {
        let mut bytes = vec![0u8; 16];
        bytes[0..4].copy_from_slice(&MAGIC);
        bytes[4] = 1;
        bytes[6] = 0x04; // trainer present
        bytes.extend(std::iter::repeat(0xFF).take(512));
        bytes.extend(std::iter::repeat(0x42).take(PRG_BANK_SIZE));
        let image = CartridgeImage::parse(&bytes).unwrap();
        assert_eq!(image.prg_rom[0], 0x42);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = image_bytes(1, 0, 0);
        bytes[0] = 0;
        assert!(matches!(
            CartridgeImage::parse(&bytes),
            Err(CartridgeError::InvalidHeader { .. })
        ));
    }

    #[test]
    fn rejects_nonzero_ines_version() {
        let bytes = image_bytes(1, 0, 0x08);
        assert!(matches!(
            CartridgeImage::parse(&bytes),
            Err(CartridgeError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn rejects_non_nrom_mapper() {
        let bytes = image_bytes(1, 0x10, 0);
        assert!(matches!(
            CartridgeImage::parse(&bytes),
            Err(CartridgeError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn rejects_prg_rom_unit_count_outside_nrom_sizes() {
        let bytes = image_bytes(4, 0, 0); // 64 KiB: not 16 or 32 KiB NROM
        assert!(matches!(
            CartridgeImage::parse(&bytes),
            Err(CartridgeError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn rejects_truncated_prg_rom() {
        let mut bytes = image_bytes(2, 0, 0);
        bytes.truncate(16 + PRG_BANK_SIZE); // declared 2 units, only provided 1
        assert!(matches!(
            CartridgeImage::parse(&bytes),
            Err(CartridgeError::InvalidHeader { .. })
        ));
    }

    #[test]
    fn a_16kib_image_is_mirrored_up_from_c000() {
        let bytes = image_bytes(1, 0, 0);
        let image = CartridgeImage::parse(&bytes).unwrap();
        let address_bus = BusHandle::new("address");
        let data_bus = BusHandle::new("data");
        let write_bus = BusHandle::new("write");
        let mut next_id = 5;
        let cart =
            Cartridge::load(image, &address_bus, &data_bus, &write_bus, &mut next_id).unwrap();
        assert_eq!(cart.regions().len(), 2);

        address_bus.put(0x8000, 99);
        let low = data_bus.get();
        address_bus.put(0xC000, 99);
        let mirrored = data_bus.get();
        assert_eq!(low, mirrored);
    }

    #[test]
    fn a_32kib_image_is_not_mirrored() {
        let bytes = image_bytes(2, 0, 0);
        let image = CartridgeImage::parse(&bytes).unwrap();
        let address_bus = BusHandle::new("address");
        let data_bus = BusHandle::new("data");
        let write_bus = BusHandle::new("write");
        let mut next_id = 5;
        let cart =
            Cartridge::load(image, &address_bus, &data_bus, &write_bus, &mut next_id).unwrap();
        assert_eq!(cart.regions().len(), 1);
    }
}
