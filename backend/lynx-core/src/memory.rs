//! The Memory Manager: work RAM plus the MAPCTL-selected overlay windows.
//!
//! MAPCTL lives at $FFF9 and controls four independent visibility bits (§4.3). Routing itself
//! — which component ultimately services a read or write once the window has been resolved — is
//! handled one level up in [`crate::bus::Bus`], since the Memory Manager has no ownership over
//! Suzy or Mikey's register banks.

use bincode::{Decode, Encode};
use jgenesis_common::num::GetBit;
use jgenesis_proc_macros::{FakeDecode, FakeEncode};

pub const SUZY_BASE: u16 = 0xFC00;
pub const SUZY_END: u16 = 0xFCFF;
pub const MIKEY_BASE: u16 = 0xFD00;
pub const MIKEY_END: u16 = 0xFDFF;
pub const BOOT_ROM_BASE: u16 = 0xFE00;
pub const VECTOR_BASE: u16 = 0xFFFA;
pub const MAPCTL_ADDRESS: u16 = 0xFFF9;

const WORK_RAM_LEN: usize = 0x10000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum Window {
    Suzy,
    Mikey,
    Rom,
    WorkRam,
}

/// The four MAPCTL-derived visibility flags. Bits 2 (Vector) and 3 (ROM) are independent of each
/// other, which is the correction this design makes relative to treating them as a single
/// "high memory" toggle.
#[derive(Debug, Clone, Copy, Default, Encode, Decode)]
struct MapctlFlags {
    suzy_hidden: bool,
    mikey_hidden: bool,
    vector_hidden: bool,
    rom_hidden: bool,
}

impl MapctlFlags {
    fn from_byte(byte: u8) -> Self {
        Self {
            suzy_hidden: byte.bit(0),
            mikey_hidden: byte.bit(1),
            vector_hidden: byte.bit(2),
            rom_hidden: byte.bit(3),
        }
    }
}

/// The 512-byte Mikey boot ROM occupying $FE00-$FFFF is proprietary firmware not distributed
/// with this crate; the host optionally supplies a dump (mirroring how the Game Boy core accepts
/// an optional DMG/CGB boot ROM). Without one, ROM-window reads fall back to open bus, which
/// means any software relying on the boot ROM's cart-header validation and rotation setup must be
/// started post-boot by the host instead.
#[derive(Debug, Clone, Default, FakeEncode, FakeDecode)]
struct BootRom(Option<Box<[u8]>>);

#[derive(Debug, Clone, Encode, Decode)]
pub struct MemoryManager {
    mapctl: u8,
    flags: MapctlFlags,
    open_bus: u8,
    work_ram: Box<[u8]>,
    boot_rom: BootRom,
}

impl MemoryManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            mapctl: 0,
            flags: MapctlFlags::default(),
            open_bus: 0,
            work_ram: vec![0; WORK_RAM_LEN].into_boxed_slice(),
            boot_rom: BootRom::default(),
        }
    }

    pub fn set_boot_rom(&mut self, rom: Option<Vec<u8>>) {
        self.boot_rom = BootRom(rom.map(Vec::into_boxed_slice));
    }

    /// Restores the boot ROM dump from `other` after a save-state load has reset it to `None`
    /// via `FakeDecode`; mirrors [`crate::cartridge::Cartridge::restore_rom_from`].
    pub fn restore_boot_rom_from(&mut self, other: &MemoryManager) {
        self.boot_rom = other.boot_rom.clone();
    }

    /// Reads through the boot ROM window ($FE00+, including vector space). Falls back to open
    /// bus when no boot ROM was supplied.
    #[must_use]
    pub fn read_rom_window(&self, address: u16) -> u8 {
        match &self.boot_rom.0 {
            Some(rom) => {
                let offset = (address - BOOT_ROM_BASE) as usize;
                rom.get(offset).copied().unwrap_or(self.open_bus)
            }
            None => self.open_bus,
        }
    }

    pub fn reset(&mut self) {
        self.mapctl = 0;
        self.flags = MapctlFlags::default();
        self.open_bus = 0;
    }

    #[must_use]
    pub fn mapctl(&self) -> u8 {
        self.mapctl
    }

    /// MAPCTL applies on write; a write to $FFF9 immediately changes which window subsequent
    /// accesses see.
    pub fn write_mapctl(&mut self, value: u8) {
        self.mapctl = value & 0x0F;
        self.flags = MapctlFlags::from_byte(self.mapctl);
    }

    /// Resolve which window a given address falls into for a *read*. MAPCTL read-routing mirrors
    /// write-routing except that reads always return the raw RAM byte underneath a hidden
    /// window's address range is not a thing in practice since the window literally *is* the
    /// overlay — this returns the window whose component should service the access.
    #[must_use]
    pub fn read_window(&self, address: u16) -> Window {
        if (SUZY_BASE..=SUZY_END).contains(&address) && !self.flags.suzy_hidden {
            return Window::Suzy;
        }
        if (MIKEY_BASE..=MIKEY_END).contains(&address) && !self.flags.mikey_hidden {
            return Window::Mikey;
        }
        if address >= VECTOR_BASE && !self.flags.vector_hidden {
            return Window::Rom;
        }
        if address >= BOOT_ROM_BASE && !self.flags.rom_hidden {
            return Window::Rom;
        }
        Window::WorkRam
    }

    /// Resolve the window for a *write*. Differs from `read_window` only in that a write
    /// targeting visible vector space ($FFFA+) is blocked entirely rather than falling through
    /// to RAM (vectors come from ROM, never from RAM, while Vector space is visible).
    #[must_use]
    pub fn write_window(&self, address: u16) -> Option<Window> {
        if (SUZY_BASE..=SUZY_END).contains(&address) && !self.flags.suzy_hidden {
            return Some(Window::Suzy);
        }
        if (MIKEY_BASE..=MIKEY_END).contains(&address) && !self.flags.mikey_hidden {
            return Some(Window::Mikey);
        }
        if address >= VECTOR_BASE && !self.flags.vector_hidden {
            log::trace!("blocked write to visible vector space at {address:04X}");
            return None;
        }
        if address >= BOOT_ROM_BASE && !self.flags.rom_hidden {
            // ROM window is visible but writes to it still land on work RAM underneath; only
            // vector space is write-blocked.
            return Some(Window::WorkRam);
        }
        Some(Window::WorkRam)
    }

    #[must_use]
    pub fn read_ram(&self, address: u16) -> u8 {
        self.work_ram[address as usize]
    }

    pub fn write_ram(&mut self, address: u16, value: u8) {
        self.work_ram[address as usize] = value;
        self.open_bus = value;
    }

    #[must_use]
    pub fn open_bus(&self) -> u8 {
        self.open_bus
    }

    pub fn set_open_bus(&mut self, value: u8) {
        self.open_bus = value;
    }

    #[must_use]
    pub fn work_ram(&self) -> &[u8] {
        &self.work_ram
    }

    pub fn work_ram_mut(&mut self) -> &mut [u8] {
        &mut self.work_ram
    }
}

impl Default for MemoryManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapctl_round_trip_reconstructs_flags() {
        for v in 0..=0x0Fu8 {
            let mut mem = MemoryManager::new();
            mem.write_mapctl(v);
            assert_eq!(mem.mapctl(), v);

            let suzy_visible = mem.read_window(SUZY_BASE) == Window::Suzy;
            assert_eq!(suzy_visible, !v.bit(0));
            let mikey_visible = mem.read_window(MIKEY_BASE) == Window::Mikey;
            assert_eq!(mikey_visible, !v.bit(1));
        }
    }

    #[test]
    fn mapctl_bit2_isolation_s7() {
        let mut mem = MemoryManager::new();
        mem.write_mapctl(0x04);
        assert_eq!(mem.read_window(0xFFFA), Window::WorkRam);
        assert_eq!(mem.read_window(BOOT_ROM_BASE), Window::Rom);
        assert_eq!(mem.read_window(SUZY_BASE), Window::Suzy);
        assert_eq!(mem.read_window(MIKEY_BASE), Window::Mikey);
    }

    #[test]
    fn vector_write_blocked_while_visible() {
        let mem = MemoryManager::new();
        assert_eq!(mem.write_window(0xFFFA), None);
    }

    #[test]
    fn vector_write_allowed_when_hidden() {
        let mut mem = MemoryManager::new();
        mem.write_mapctl(0x04);
        assert_eq!(mem.write_window(0xFFFA), Some(Window::WorkRam));
    }
}
