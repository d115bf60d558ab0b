//! The Lynx core's public interface and per-frame main loop.

use crate::bus::Bus;
use crate::cartridge::{Cartridge, CartridgeLoadError};
use crate::memory::MemoryManager;
use crate::mikey::Mikey;
use crate::mikey::display::{FRAMEBUFFER_LEN, LynxColor};
use crate::suzy::Suzy;
use bincode::{Decode, Encode};
use lynx_config::{LynxEmulatorConfig, LynxJoypadState, LynxRotation};
use thiserror::Error;
use w65c02_emu::W65C02;

/// Prefix identifying a lynx-core save state file, followed by a fixed-width version number.
/// Any other prefix, or a version this build does not recognize, is rejected outright rather than
/// attempting a best-effort decode.
const SAVE_STATE_MAGIC: &[u8; 8] = b"LYXSTATE";
const SAVE_STATE_VERSION: u16 = 1;

macro_rules! bincode_config {
    () => {
        bincode::config::standard()
            .with_little_endian()
            .with_fixed_int_encoding()
            .with_limit::<{ 16 * 1024 * 1024 }>()
    };
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cartridge load error: {0}")]
    Cartridge(#[from] CartridgeLoadError),
    #[error("save state has bad magic bytes, expected {SAVE_STATE_MAGIC:?}")]
    BadMagic,
    #[error("save state version mismatch: expected {expected}, found {found}")]
    SaveStateVersionMismatch { expected: u16, found: u16 },
    #[error("failed to decode save state: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}

/// One frame's worth of output the host pulls after every [`Core::run_frame`] call. Both buffers
/// are borrowed from `Core`'s own storage; the host is expected to copy out whatever it needs
/// before the next frame overwrites them.
#[derive(Debug)]
pub struct FrameOutput<'a> {
    /// Packed 4bpp framebuffer, `160*102/2` bytes, matching real Mikey DMA output.
    pub framebuffer: &'a [u8],
    pub audio: &'a [i16],
    pub duration_ticks: u32,
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct Core {
    cpu: W65C02,
    memory: MemoryManager,
    suzy: Suzy,
    mikey: Mikey,
    cartridge: Cartridge,
    rotation: LynxRotation,
    audio_enabled: bool,
    cycles_remainder: u32,
    audio_buffer: Vec<i16>,
    pending_tx: Vec<u16>,
}

impl Core {
    pub fn new(rom_bytes: Vec<u8>, config: LynxEmulatorConfig) -> Result<Self, LoadError> {
        let mut cartridge = Cartridge::load(rom_bytes)?;
        let rotation = config.rotation_override.unwrap_or(cartridge.info().rotation);

        let mut memory = MemoryManager::new();
        let mut suzy = Suzy::new();
        let mut mikey = Mikey::new();

        let cpu = {
            let mut bus = Bus::new(&mut memory, &mut suzy, &mut mikey, &mut cartridge);
            W65C02::new(&mut bus)
        };

        Ok(Self {
            cpu,
            memory,
            suzy,
            mikey,
            cartridge,
            rotation,
            audio_enabled: config.audio_enabled,
            cycles_remainder: 0,
            audio_buffer: Vec::new(),
            pending_tx: Vec::new(),
        })
    }

    pub fn reset(&mut self) {
        reset_to_power_on(
            &mut self.cpu,
            &mut self.memory,
            &mut self.suzy,
            &mut self.mikey,
            &mut self.cartridge,
        );
        self.cycles_remainder = 0;
    }

    #[must_use]
    pub fn rotation(&self) -> LynxRotation {
        self.rotation
    }

    pub fn set_buttons(&mut self, buttons: LynxJoypadState) {
        self.suzy.set_joypad(buttons);
    }

    pub fn comlynx_rx(&mut self, word: u16) {
        self.mikey.comlynx_rx(word);
    }

    /// Supplies a dump of Mikey's internal 512-byte boot ROM. Without one, reads through the ROM
    /// window fall back to open bus and the host is expected to have started the cartridge
    /// post-boot itself (cart header validation, rotation, stack setup).
    pub fn set_boot_rom(&mut self, rom: Option<Vec<u8>>) {
        self.memory.set_boot_rom(rom);
    }

    /// Advance the system by one frame (`CpuCyclesPerFrame` CPU cycles, carrying any leftover
    /// from a previous frame's final instruction into this one's budget). Per-instruction tick
    /// order: the CPU executes one instruction to completion against a freshly borrowed bus, then
    /// the returned cycle count is spent ticking Mikey's timer cascade and Suzy's DMA servicing.
    /// IRQ/NMI need no separate recompute step: each [`Bus`] is rebuilt from live component state
    /// before every `step`, and `W65C02::step` polls `BusInterface::irq`/`nmi` itself.
    pub fn run_frame(&mut self) -> FrameOutput<'_> {
        self.audio_buffer.clear();

        let mut cycles_run = self.cycles_remainder;
        while cycles_run < lynx_config::LYNX_CPU_CYCLES_PER_FRAME {
            let cycles = {
                let mut bus =
                    Bus::new(&mut self.memory, &mut self.suzy, &mut self.mikey, &mut self.cartridge);
                self.cpu.step(&mut bus)
            };

            for _ in 0..cycles {
                self.mikey.tick_cpu_cycle();
                self.mikey.service_display_dma(self.memory.work_ram());
                self.suzy.service_sprite_engine(
                    self.memory.work_ram_mut(),
                    self.mikey.display().display_address(),
                );

                if self.audio_enabled {
                    self.audio_buffer.push(self.mikey.mix_audio_sample());
                } else {
                    self.audio_buffer.push(0);
                }

                if let Some(word) = self.mikey.take_tx_event() {
                    self.pending_tx.push(word);
                }
            }

            cycles_run += cycles;
        }

        self.cycles_remainder = cycles_run - lynx_config::LYNX_CPU_CYCLES_PER_FRAME;

        FrameOutput {
            framebuffer: self.mikey.display().framebuffer(),
            audio: &self.audio_buffer,
            duration_ticks: cycles_run,
        }
    }

    /// Drain the TX words that departed the UART since the last call, for the host's ComLynx
    /// transport. Returned in departure order.
    pub fn take_comlynx_tx(&mut self) -> Vec<u16> {
        std::mem::take(&mut self.pending_tx)
    }

    #[must_use]
    pub fn framebuffer(&self) -> &[u8; FRAMEBUFFER_LEN] {
        self.mikey
            .display()
            .framebuffer()
            .try_into()
            .expect("display framebuffer is always FRAMEBUFFER_LEN bytes")
    }

    /// The live 16-entry palette DMA resolves packed framebuffer nibbles through. `framebuffer`
    /// stays packed 4bpp color *indices* (matching real Mikey DMA output and the host API's fixed
    /// `160*102/2`-byte contract), so a host that wants RGB output looks each nibble up here
    /// itself rather than the core pre-resolving and discarding the fixed-size contract.
    #[must_use]
    pub fn palette(&self) -> &[LynxColor; 16] {
        self.mikey.display().palette()
    }

    #[must_use]
    pub fn save_state(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(SAVE_STATE_MAGIC);
        bytes.extend_from_slice(&SAVE_STATE_VERSION.to_le_bytes());
        bincode::encode_into_std_write(self, &mut bytes, bincode_config!())
            .expect("in-memory encoding cannot fail");
        bytes
    }

    pub fn load_state(&mut self, bytes: &[u8]) -> Result<(), LoadError> {
        if bytes.len() < SAVE_STATE_MAGIC.len() + 2 || &bytes[..SAVE_STATE_MAGIC.len()] != SAVE_STATE_MAGIC {
            return Err(LoadError::BadMagic);
        }

        let version_offset = SAVE_STATE_MAGIC.len();
        let found_version =
            u16::from_le_bytes([bytes[version_offset], bytes[version_offset + 1]]);
        if found_version != SAVE_STATE_VERSION {
            return Err(LoadError::SaveStateVersionMismatch {
                expected: SAVE_STATE_VERSION,
                found: found_version,
            });
        }

        let body = &bytes[version_offset + 2..];
        let (mut decoded, _): (Core, usize) =
            bincode::decode_from_slice(body, bincode_config!())?;

        decoded.cartridge.restore_rom_from(&self.cartridge);
        decoded.memory.restore_boot_rom_from(&self.memory);
        *self = decoded;
        Ok(())
    }
}

/// Shared reset path for construction and explicit `reset()`. Mirrors how the other per-console
/// backends in this workspace reconstruct sub-component state rather than hand-rolling a reset
/// method per field.
fn reset_to_power_on(
    cpu: &mut W65C02,
    memory: &mut MemoryManager,
    suzy: &mut Suzy,
    mikey: &mut Mikey,
    cartridge: &mut Cartridge,
) {
    memory.reset();
    suzy.reset();
    mikey.reset();
    let _ = cartridge;
    let mut bus = Bus::new(memory, suzy, mikey, cartridge);
    cpu.reset(&mut bus);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_exposes_the_palette_mikey_display_dma_resolves_through() {
        // A host driving only the public Core API must be able to reach the palette: framebuffer
        // nibbles are raw palette indices, not pre-resolved colour, so without this accessor the
        // host has no way to turn the framebuffer into an actual image.
        let core = Core::new(vec![0u8; 1024], LynxEmulatorConfig::default()).unwrap();
        assert_eq!(core.palette().len(), 16);
        assert_eq!(core.palette(), core.mikey.display().palette());
    }
}
