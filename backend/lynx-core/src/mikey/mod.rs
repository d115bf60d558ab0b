//! Mikey: the Lynx's system chip. Hosts the eight cascadable timers, the four audio channels, the
//! DMA display engine, the UART/ComLynx serial port, and the IRQ aggregator (§4.4-4.5).
//!
//! Mikey owns no bus routing of its own; [`crate::bus::Bus`] decides when a Mikey-window address
//! should reach [`Mikey::read_register`] / [`Mikey::write_register`].

pub mod audio;
pub mod display;
pub mod timer;
pub mod uart;

use crate::mikey::audio::AudioChannelState;
use crate::mikey::display::DisplayEngine;
use crate::mikey::timer::TimerState;
use crate::mikey::uart::{Uart, UartEvent};
use bincode::{Decode, Encode};

pub const TIMER_COUNT: usize = 8;
pub const AUDIO_CHANNEL_COUNT: usize = 4;

const SERCTL_OFFSET: u16 = 0x8C;
const SERDAT_OFFSET: u16 = 0x8D;
const DISPLAY_ADDR_LOW_OFFSET: u16 = 0x94;
const DISPLAY_ADDR_HIGH_OFFSET: u16 = 0x95;
const PALETTE_START_OFFSET: u16 = 0xA0;
const PALETTE_END_OFFSET: u16 = 0xBF;

#[derive(Debug, Clone, Encode, Decode)]
pub struct Mikey {
    timers: [TimerState; TIMER_COUNT],
    audio_timers: [TimerState; AUDIO_CHANNEL_COUNT],
    audio_channels: [AudioChannelState; AUDIO_CHANNEL_COUNT],
    display: DisplayEngine,
    uart: Uart,
    irq_pending: u8,
    pending_tx_event: Option<u16>,
    dma_pending: bool,
}

impl Mikey {
    #[must_use]
    pub fn new() -> Self {
        Self {
            timers: std::array::from_fn(|i| TimerState::new(i as u8)),
            audio_timers: std::array::from_fn(|i| TimerState::new((TIMER_COUNT + i) as u8)),
            audio_channels: std::array::from_fn(|_| AudioChannelState::new()),
            display: DisplayEngine::new(),
            uart: Uart::new(),
            irq_pending: 0,
            pending_tx_event: None,
            dma_pending: false,
        }
    }

    pub fn reset(&mut self) {
        for timer in &mut self.timers {
            timer.reset();
        }
        for timer in &mut self.audio_timers {
            timer.reset();
        }
        for channel in &mut self.audio_channels {
            channel.reset();
        }
        self.display.reset();
        self.uart.reset();
        self.irq_pending = 0;
        self.pending_tx_event = None;
    }

    /// The `IrqEnabled` byte is not an independently-written register: each bit mirrors the
    /// corresponding timer's Control A bit 7, with Timer 4's bit (bit 4) instead mirroring the
    /// UART's own TX/RX IRQ enables (§4.4, §3.1 invariants).
    #[must_use]
    fn irq_enabled_byte(&self) -> u8 {
        let mut byte = 0u8;
        for (i, timer) in self.timers.iter().enumerate() {
            let enabled = if i == 4 { self.uart.irq_enabled() } else { timer.irq_enabled() };
            if enabled {
                byte |= 1 << i;
            }
        }
        byte
    }

    /// The aggregated IRQ line the CPU polls: true whenever any bit of `IrqPending` is both set
    /// and enabled.
    #[must_use]
    pub fn irq_line(&self) -> bool {
        self.irq_pending & self.irq_enabled_byte() != 0
    }

    #[must_use]
    pub fn irq_pending(&self) -> u8 {
        self.irq_pending
    }

    /// Advance every Mikey sub-device by one CPU cycle's worth of master ticks (4, at the 16 MHz
    /// master clock / 4 MHz CPU clock ratio). Timer cascade updates propagate in index order
    /// (Timer 0 -> Timer 7) within the same master tick, per the concurrency contract in §5.
    pub fn tick_cpu_cycle(&mut self) {
        for _ in 0..4 {
            self.tick_master();
        }
    }

    fn tick_master(&mut self) {
        let mut underflowed = [false; TIMER_COUNT];

        for i in 0..TIMER_COUNT {
            let outcome = if self.timers[i].is_linked() {
                let prev = (i + TIMER_COUNT - 1) % TIMER_COUNT;
                if underflowed[prev] { self.timers[i].tick_linked() } else { None }
            } else {
                self.timers[i].tick_master()
            };

            if let Some(outcome) = outcome {
                underflowed[i] = outcome.underflowed;
                if outcome.irq_requested {
                    self.irq_pending |= 1 << i;
                }

                if i == 2 && outcome.underflowed {
                    // Timer 2 drives the display DMA line-advance.
                    self.dma_pending = true;
                }
                if i == 4 && outcome.underflowed {
                    let (event, uart_irq_level) = self.uart.tick();
                    if let UartEvent::TxWordSent(word) = event {
                        self.pending_tx_event = Some(word);
                    }
                    if uart_irq_level {
                        self.irq_pending |= 1 << 4;
                    } else {
                        self.irq_pending &= !(1 << 4);
                    }
                }
            }
        }

        for i in 0..AUDIO_CHANNEL_COUNT {
            if self.audio_timers[i].tick_master().map(|o| o.underflowed).unwrap_or(false) {
                self.audio_channels[i].clock();
            }
        }
    }

    /// Drain and perform any display DMA advance queued by Timer 2's underflow this cycle.
    pub fn service_display_dma(&mut self, work_ram: &[u8]) {
        if std::mem::take(&mut self.dma_pending) {
            self.display.dma_scanline(work_ram);
        }
    }

    /// Drain the UART's departed TX word (if any) for the host's `on_comlynx_tx` callback.
    pub fn take_tx_event(&mut self) -> Option<u16> {
        self.pending_tx_event.take()
    }

    pub fn comlynx_rx(&mut self, word: u16) {
        self.uart.comlynx_rx(word);
    }

    #[must_use]
    pub fn display(&self) -> &DisplayEngine {
        &self.display
    }

    #[must_use]
    pub fn audio_channels(&self) -> &[AudioChannelState; AUDIO_CHANNEL_COUNT] {
        &self.audio_channels
    }

    /// Mix the four channels' current LFSR output into a single signed stereo sample. The host
    /// owns resampling/filtering; this crate only ever emits raw mixed samples.
    #[must_use]
    pub fn mix_audio_sample(&self) -> i16 {
        let mut sum = 0i32;
        for channel in &self.audio_channels {
            sum += i32::from(channel.output());
        }
        sum.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
    }

    #[must_use]
    pub fn read_register(&mut self, offset: u16) -> u8 {
        match offset {
            0x00..=0x1F => self.read_timer_register(offset),
            0x20..=0x3F => self.read_audio_register(offset),
            SERCTL_OFFSET => self.uart.read_serctl(),
            SERDAT_OFFSET => self.uart.read_serdat(),
            DISPLAY_ADDR_LOW_OFFSET => self.display.display_address() as u8,
            DISPLAY_ADDR_HIGH_OFFSET => (self.display.display_address() >> 8) as u8,
            0x80 => self.irq_pending,
            0x81 => self.irq_enabled_byte(),
            PALETTE_START_OFFSET..=PALETTE_END_OFFSET => self.read_palette(offset),
            _ => 0xFF,
        }
    }

    pub fn write_register(&mut self, offset: u16, value: u8) {
        match offset {
            0x00..=0x1F => self.write_timer_register(offset, value),
            0x20..=0x3F => self.write_audio_register(offset, value),
            SERCTL_OFFSET => self.uart.write_serctl(value),
            SERDAT_OFFSET => self.uart.write_serdat(value),
            DISPLAY_ADDR_LOW_OFFSET => self.display.set_display_address_low(value),
            DISPLAY_ADDR_HIGH_OFFSET => self.display.set_display_address_high(value),
            0x80 => {
                // Software clears IrqPending bits by writing 1s; the UART's bit 4 is
                // re-derived on the next tick regardless (HW Bug 13.2).
                self.irq_pending &= !value;
            }
            // IrqEnabled has no independent storage: it mirrors each timer's own Control A bit 7
            // (see `irq_enabled_byte`), so writes here are not meaningful on real hardware.
            0x81 => {}
            PALETTE_START_OFFSET..=PALETTE_END_OFFSET => self.write_palette(offset, value),
            _ => {}
        }
    }

    fn read_timer_register(&self, offset: u16) -> u8 {
        let timer = &self.timers[(offset / 4) as usize];
        match offset % 4 {
            0 => timer.backup(),
            1 => timer.control_a(),
            2 => timer.count(),
            3 => timer.control_b(),
            _ => unreachable!("offset % 4 is in 0..4"),
        }
    }

    fn write_timer_register(&mut self, offset: u16, value: u8) {
        let timer = &mut self.timers[(offset / 4) as usize];
        match offset % 4 {
            0 => timer.set_backup(value),
            1 => timer.set_control_a(value),
            2 => timer.set_count(value),
            3 => timer.set_control_b(value),
            _ => unreachable!("offset % 4 is in 0..4"),
        }
    }

    fn read_audio_register(&self, offset: u16) -> u8 {
        let rel = offset - 0x20;
        let channel_index = (rel / 8) as usize;
        let Some(channel) = self.audio_channels.get(channel_index) else { return 0xFF };
        let timer = &self.audio_timers[channel_index];
        match rel % 8 {
            0 => timer.backup(),
            1 => timer.control_a(),
            2 => timer.count(),
            3 => timer.control_b(),
            4 => channel.volume() as u8,
            5 => channel.feedback_select_byte(),
            6 => channel.shift_register() as u8,
            7 => (channel.shift_register() >> 8) as u8,
            _ => unreachable!("rel % 8 is in 0..8"),
        }
    }

    fn write_audio_register(&mut self, offset: u16, value: u8) {
        let rel = offset - 0x20;
        let channel_index = (rel / 8) as usize;
        if channel_index >= AUDIO_CHANNEL_COUNT {
            return;
        }
        let timer = &mut self.audio_timers[channel_index];
        let channel = &mut self.audio_channels[channel_index];
        match rel % 8 {
            0 => timer.set_backup(value),
            1 => timer.set_control_a(value),
            2 => timer.set_count(value),
            3 => timer.set_control_b(value),
            4 => channel.set_volume(value as i8),
            5 => channel.set_feedback_select(value),
            6 => {
                let hi = channel.shift_register() & 0xFF00;
                channel.set_shift_register(hi | u16::from(value));
            }
            7 => {
                let lo = channel.shift_register() & 0x00FF;
                channel.set_shift_register(lo | (u16::from(value) << 8));
            }
            _ => unreachable!("rel % 8 is in 0..8"),
        }
    }

    fn read_palette(&self, offset: u16) -> u8 {
        let rel = (offset - PALETTE_START_OFFSET) as usize;
        let index = rel / 2;
        let palette = self.display.palette();
        let Some(entry) = palette.get(index) else { return 0xFF };
        if rel % 2 == 0 { (entry.g << 4) | entry.r } else { entry.b }
    }

    fn write_palette(&mut self, offset: u16, value: u8) {
        let rel = (offset - PALETTE_START_OFFSET) as usize;
        let index = rel / 2;
        if rel % 2 == 0 {
            self.display.write_palette_green_red(index, value);
        } else {
            self.display.write_palette_blue(index, value);
        }
    }
}

impl Default for Mikey {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_irq_bit_tracks_enable() {
        let mut mikey = Mikey::new();
        mikey.write_timer_register(1, 0b1001_0000); // timer 0: reload+running, 1us prescale
        for _ in 0..(16 * 2) {
            mikey.tick_master();
        }
        assert_eq!(mikey.irq_pending() & 0x01, 0x01);
    }

    #[test]
    fn irq_enabled_bit4_mirrors_uart_enables_not_timer4_control_a() {
        let mut mikey = Mikey::new();
        // Timer 4's own Control A IRQ-enable bit (bit 7) must not influence IrqEnabled bit 4.
        mikey.write_timer_register(4 * 4 + 1, 0b1000_0000);
        assert_eq!(mikey.irq_enabled_byte() & 0x10, 0);

        mikey.uart.write_serctl(0x80); // TX IRQ enable
        assert_eq!(mikey.irq_enabled_byte() & 0x10, 0x10);
    }

    #[test]
    fn palette_register_round_trips() {
        let mut mikey = Mikey::new();
        mikey.write_register(PALETTE_START_OFFSET, 0x3A);
        mikey.write_register(PALETTE_START_OFFSET + 1, 0x05);
        assert_eq!(mikey.read_register(PALETTE_START_OFFSET), 0x3A);
        assert_eq!(mikey.read_register(PALETTE_START_OFFSET + 1), 0x05);
    }
}
