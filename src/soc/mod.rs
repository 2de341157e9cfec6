//! The example SoC memory map and boot-image loader (spec §6).
//!
//! Grounded on the teacher's top-level board-assembly module: one function
//! builds the bus and attaches every region at its fixed offset, mirroring
//! how the original wires `MPU_ROM`/`L3_OCM_RAM`/`EMIF`/`DMM`/`LPDDR2` onto
//! a single flat decoder.

use std::fs;
use std::io;
use std::path::Path;

use crate::bus::{AddressableNode, Bus, Ram, Rom};

pub const MPU_ROM: (u32, u32) = (0x4002_8000, 0x4003_4000);
pub const L3_OCM_RAM: (u32, u32) = (0x4030_0000, 0x4030_E000);
pub const L3_OCM_RAM_VECTORS: u32 = 0x4030_D000;
pub const L4_CFG_DOMAIN: (u32, u32) = (0x4A00_0000, 0x4B00_0000);
pub const EMIF1: (u32, u32) = (0x4C00_0000, 0x4D00_0000);
pub const EMIF2: (u32, u32) = (0x4D00_0000, 0x4E00_0000);
pub const DMM: (u32, u32) = (0x4E00_0000, 0x5000_0000);
pub const LPDDR2: (u32, u32) = (0x8000_0000, 0x9000_0000);

fn words(range: (u32, u32)) -> usize {
    ((range.1 - range.0) / 4) as usize
}

/// Assemble the example SoC's address map onto a fresh flat bus.
pub fn build_bus() -> Bus {
    let mut bus = Bus::flat("soc");
    bus.attach(MPU_ROM.0, MPU_ROM.1, 0, Box::new(Rom::new("mpu_rom", words(MPU_ROM))));
    bus.attach(L3_OCM_RAM.0, L3_OCM_RAM.1, 0, Box::new(Ram::new("l3_ocm_ram", words(L3_OCM_RAM))));
    bus.attach(L4_CFG_DOMAIN.0, L4_CFG_DOMAIN.1, 0, Box::new(Ram::new("l4_cfg", words(L4_CFG_DOMAIN))));
    bus.attach(EMIF1.0, EMIF1.1, 0, Box::new(Ram::new("emif1", words(EMIF1))));
    bus.attach(EMIF2.0, EMIF2.1, 0, Box::new(Ram::new("emif2", words(EMIF2))));
    bus.attach(DMM.0, DMM.1, 0, Box::new(Ram::new("dmm", words(DMM))));
    bus.attach(LPDDR2.0, LPDDR2.1, 0, Box::new(Ram::new("lpddr2", words(LPDDR2))));
    bus
}

/// Load `path` as a little-endian stream of 32-bit words, writing each one
/// through `bus.write_default(base + i*4, word)` (spec §6).
pub fn load_image(bus: &mut dyn AddressableNode, path: &Path, base: u32) -> io::Result<()> {
    let bytes = fs::read(path)?;
    for (i, chunk) in bytes.chunks(4).enumerate() {
        let mut word_bytes = [0u8; 4];
        word_bytes[..chunk.len()].copy_from_slice(chunk);
        let word = u32::from_le_bytes(word_bytes);
        let addr = base.wrapping_add((i as u32) * 4);
        bus.write_default(addr, word)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
    }
    Ok(())
}

/// Load the vectors blob at [`L3_OCM_RAM_VECTORS`] and the OS image at the
/// RAM base, per spec §6's two-file boot layout.
pub fn boot(bus: &mut dyn AddressableNode, vectors_path: &Path, os_image_path: &Path) -> io::Result<()> {
    load_image(bus, vectors_path, L3_OCM_RAM_VECTORS)?;
    load_image(bus, os_image_path, L3_OCM_RAM.0)
}
