//! Mikey's eight cascadable timers (§4.4). Each ticks from either a power-of-two microsecond
//! prescaler or from the underflow of the previous timer in the chain.

use bincode::{Decode, Encode};
use jgenesis_common::num::GetBit;

/// The eight power-of-two microsecond periods a timer's clock source can select, indexed by the
/// low three bits of Control A. A value of 7 instead means "linked": the timer only ticks when
/// the previous timer (index - 1, wrapping from 0 to 7) underflows.
const PRESCALE_PERIODS_US: [u32; 7] = [1, 2, 4, 8, 16, 32, 64];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum ClockSource {
    PrescaledMicros(u32),
    Linked,
}

impl ClockSource {
    fn from_control_a(control_a: u8) -> Self {
        match control_a & 0x07 {
            7 => Self::Linked,
            n if (n as usize) < PRESCALE_PERIODS_US.len() => {
                Self::PrescaledMicros(PRESCALE_PERIODS_US[n as usize])
            }
            _ => Self::PrescaledMicros(1024),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct TimerOutcome {
    pub underflowed: bool,
    pub irq_requested: bool,
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct TimerState {
    index: u8,
    backup: u8,
    count: u8,
    control_a: u8,
    control_b: u8,
    running: bool,
    done: bool,
    clock_source: ClockSource,
    /// Countdown in master-tick units toward the next prescaler decrement; only meaningful for
    /// `ClockSource::PrescaledMicros`.
    prescale_accumulator: u32,
}

impl TimerState {
    #[must_use]
    pub fn new(index: u8) -> Self {
        Self {
            index,
            backup: 0,
            count: 0,
            control_a: 0,
            control_b: 0,
            running: false,
            done: false,
            clock_source: ClockSource::PrescaledMicros(1),
            prescale_accumulator: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.index);
    }

    #[must_use]
    pub fn backup(&self) -> u8 {
        self.backup
    }

    pub fn set_backup(&mut self, value: u8) {
        self.backup = value;
    }

    #[must_use]
    pub fn count(&self) -> u8 {
        self.count
    }

    pub fn set_count(&mut self, value: u8) {
        self.count = value;
    }

    #[must_use]
    pub fn control_a(&self) -> u8 {
        self.control_a
    }

    pub fn set_control_a(&mut self, value: u8) {
        self.control_a = value;
        self.clock_source = ClockSource::from_control_a(value);
        self.running = value.bit(3);
        // Writing Control A resets TimerDone per hardware (reading clears it; this core also
        // clears on write since software reconfiguring a timer should not see a stale done flag).
        self.done = false;
    }

    /// Control A bit 4: reload on underflow vs. one-shot.
    #[must_use]
    fn reload_enabled(&self) -> bool {
        self.control_a.bit(4)
    }

    /// Control A bit 7: IRQ enable.
    #[must_use]
    pub fn irq_enabled(&self) -> bool {
        self.control_a.bit(7)
    }

    #[must_use]
    pub fn control_b(&self) -> u8 {
        self.control_b
    }

    pub fn set_control_b(&mut self, value: u8) {
        self.control_b = value;
    }

    #[must_use]
    pub fn done(&self) -> bool {
        self.done
    }

    pub fn clear_done(&mut self) {
        self.done = false;
    }

    #[must_use]
    pub fn is_linked(&self) -> bool {
        self.clock_source == ClockSource::Linked
    }

    /// Advance this timer by one master tick (1/16 MHz). Returns the underflow outcome if the
    /// prescaler fires this tick; timers with a linked clock source never fire here (driven
    /// instead by [`Self::tick_linked`]).
    #[must_use]
    pub fn tick_master(&mut self) -> Option<TimerOutcome> {
        let ClockSource::PrescaledMicros(period_us) = self.clock_source else { return None };
        if !self.running {
            return None;
        }

        // 16 MHz master clock -> 16 ticks per microsecond.
        let ticks_per_period = period_us * 16;
        self.prescale_accumulator += 1;
        if self.prescale_accumulator < ticks_per_period {
            return None;
        }
        self.prescale_accumulator = 0;

        Some(self.underflow())
    }

    /// Drive this timer directly from the previous timer's underflow (linked clock source).
    #[must_use]
    pub fn tick_linked(&mut self) -> Option<TimerOutcome> {
        if !self.running || self.clock_source != ClockSource::Linked {
            return None;
        }
        Some(self.underflow())
    }

    fn underflow(&mut self) -> TimerOutcome {
        if self.count == 0 {
            if self.reload_enabled() {
                self.count = self.backup;
            }
            // Timer 4's underflow drives the UART instead of the normal TimerDone/IRQ path.
            let is_timer4 = self.index == 4;
            if !is_timer4 {
                self.done = true;
            }
            TimerOutcome { underflowed: true, irq_requested: !is_timer4 && self.irq_enabled() }
        } else {
            self.count -= 1;
            TimerOutcome { underflowed: false, irq_requested: false }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_reloads_to_backup_on_underflow() {
        let mut timer = TimerState::new(0);
        timer.set_backup(3);
        timer.set_count(0);
        timer.set_control_a(0b1001_0000); // reload enabled, running, prescale 1us
        let outcome = timer.underflow();
        assert!(outcome.underflowed);
        assert_eq!(timer.count(), 3);
    }

    #[test]
    fn timer_4_underflow_never_sets_done_or_requests_irq() {
        let mut timer = TimerState::new(4);
        timer.set_backup(0);
        timer.set_count(0);
        timer.set_control_a(0b1001_0000);
        let outcome = timer.underflow();
        assert!(outcome.underflowed);
        assert!(!outcome.irq_requested);
        assert!(!timer.done());
    }

    #[test]
    fn linked_clock_source_is_recognized() {
        let mut timer = TimerState::new(1);
        timer.set_control_a(0x07);
        assert!(timer.is_linked());
        assert!(timer.tick_master().is_none());
    }
}
