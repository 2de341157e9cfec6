//! Word-addressed backing-store Addressable Nodes: RAM and ROM.
//!
//! Grounded on the teacher's `core::memory` module: a plain, word-masking
//! backing store. ROM additionally rejects runtime writes per spec, with an
//! `init_write` escape used by image loading.

use super::{AddressableNode, BusError};

/// A plain word-addressed RAM region.
#[derive(Debug, Clone)]
pub struct Ram {
    name: String,
    words: Vec<u32>,
}

impl Ram {
    /// `size_words` is the number of 32-bit words backing this region.
    pub fn new(name: impl Into<String>, size_words: usize) -> Self {
        Self {
            name: name.into(),
            words: vec![0; size_words],
        }
    }

    fn index(&self, addr: u32) -> usize {
        ((addr & !3) as usize / 4) % self.words.len().max(1)
    }
}

impl AddressableNode for Ram {
    fn read(&mut self, addr: u32, _bank: Option<&str>) -> Result<u32, BusError> {
        let idx = self.index(addr);
        let value = self.words[idx];
        log::trace!("{}: read {value:#010x} from {addr:#010x}", self.name);
        Ok(value)
    }

    fn write(&mut self, addr: u32, value: u32, _bank: Option<&str>) -> Result<(), BusError> {
        let idx = self.index(addr);
        log::trace!("{}: write {value:#010x} to {addr:#010x}", self.name);
        self.words[idx] = value;
        Ok(())
    }
}

/// A word-addressed ROM region. Runtime writes fail; `init_write` is the
/// privileged bypass used while loading a boot image.
#[derive(Debug, Clone)]
pub struct Rom {
    name: String,
    words: Vec<u32>,
}

impl Rom {
    pub fn new(name: impl Into<String>, size_words: usize) -> Self {
        Self {
            name: name.into(),
            words: vec![0; size_words],
        }
    }

    fn index(&self, addr: u32) -> usize {
        ((addr & !3) as usize / 4) % self.words.len().max(1)
    }

    /// Privileged write used by the boot-image loader; bypasses the
    /// read-only check that guards runtime `write`.
    pub fn init_write(&mut self, addr: u32, value: u32) {
        let idx = self.index(addr);
        self.words[idx] = value;
    }
}

impl AddressableNode for Rom {
    fn read(&mut self, addr: u32, _bank: Option<&str>) -> Result<u32, BusError> {
        let idx = self.index(addr);
        Ok(self.words[idx])
    }

    fn write(&mut self, addr: u32, _value: u32, _bank: Option<&str>) -> Result<(), BusError> {
        log::warn!("{}: runtime write to read-only memory at {addr:#010x}", self.name);
        Err(BusError::ReadOnlyMemory { addr })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ram_round_trips_aligned_addresses() {
        let mut ram = Ram::new("ram", 16);
        ram.write_default(0x10, 0xDEAD_BEEF).unwrap();
        assert_eq!(ram.read_default(0x10).unwrap(), 0xDEAD_BEEF);
    }

    #[test]
    fn ram_masks_misaligned_addresses() {
        let mut ram = Ram::new("ram", 16);
        ram.write_default(0x13, 0x1234_5678).unwrap();
        assert_eq!(ram.read_default(0x10).unwrap(), 0x1234_5678);
    }

    #[test]
    fn rom_rejects_runtime_write_but_allows_init_write() {
        let mut rom = Rom::new("rom", 4);
        assert!(matches!(
            rom.write_default(0, 1),
            Err(BusError::ReadOnlyMemory { addr: 0 })
        ));
        rom.init_write(0, 0x42);
        assert_eq!(rom.read_default(0).unwrap(), 0x42);
    }
}
