//! The Mikey UART / ComLynx serial port (§4.4) — the hardest subsystem in Mikey to get bit-exact.
//!
//! Driven entirely by Timer 4's underflow via [`Uart::tick`]. Countdowns use bit 31 as an
//! "inactive" sentinel rather than a bare `Option<u32>` so that save-state round-tripping matches
//! the spec's invariant language directly (§3.2).

use bincode::{Decode, Encode};

const QUEUE_CAPACITY: usize = 32;
const INACTIVE: u32 = 1 << 31;
const TX_PERIOD: u32 = 11;
const RX_PERIOD: u32 = 11;
const INTER_BYTE_GAP: u32 = 11 + 44;

#[derive(Debug, Clone, Copy, Encode, Decode)]
struct WordQueue {
    buffer: [u16; QUEUE_CAPACITY],
    head: usize,
    tail: usize,
    count: usize,
}

impl WordQueue {
    fn new() -> Self {
        Self { buffer: [0; QUEUE_CAPACITY], head: 0, tail: 0, count: 0 }
    }

    fn is_full(&self) -> bool {
        self.count == QUEUE_CAPACITY
    }

    fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Ordinary FIFO push at the tail, used for external ComLynx-bus arrivals.
    fn push_back(&mut self, word: u16) -> bool {
        if self.is_full() {
            return false;
        }
        self.buffer[self.tail] = word;
        self.tail = (self.tail + 1) % QUEUE_CAPACITY;
        self.count += 1;
        true
    }

    /// Front-insert used by TX self-loopback and SendBreak: decrements `head` and writes the new
    /// word there, so it is the very next word dequeued. Consecutive front-inserts therefore form
    /// LIFO order relative to each other while still preceding any back-inserted word.
    fn push_front(&mut self, word: u16) -> bool {
        if self.is_full() {
            return false;
        }
        self.head = (self.head + QUEUE_CAPACITY - 1) % QUEUE_CAPACITY;
        self.buffer[self.head] = word;
        self.count += 1;
        true
    }

    fn pop_front(&mut self) -> Option<u16> {
        if self.is_empty() {
            return None;
        }
        let word = self.buffer[self.head];
        self.head = (self.head + 1) % QUEUE_CAPACITY;
        self.count -= 1;
        Some(word)
    }
}

#[derive(Debug, Clone, Copy, Default, Encode, Decode)]
pub struct SerCtl {
    pub tx_irq_enable: bool,
    pub rx_irq_enable: bool,
    pub parity_enable: bool,
    pub send_break: bool,
    pub parity_even: bool,
}

impl SerCtl {
    fn write(&mut self, value: u8) -> bool {
        self.tx_irq_enable = value & 0x80 != 0;
        self.rx_irq_enable = value & 0x40 != 0;
        self.parity_enable = value & 0x10 != 0;
        self.send_break = value & 0x04 != 0;
        self.parity_even = value & 0x01 != 0;
        // bit 3: reset-errors, write-1-to-clear; returned so the caller clears overrun/framing.
        value & 0x08 != 0
    }
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct Uart {
    ctl: SerCtl,
    rx_queue: WordQueue,
    tx_data: u16,
    rx_data: u16,
    tx_countdown: u32,
    rx_countdown: u32,
    rx_ready: bool,
    overrun: bool,
    framing: bool,
    break_received: bool,
    ninth_bit_received: bool,
    irq_pending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UartEvent {
    None,
    TxWordSent(u16),
}

impl Uart {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ctl: SerCtl::default(),
            rx_queue: WordQueue::new(),
            tx_data: 0,
            rx_data: 0,
            tx_countdown: INACTIVE,
            rx_countdown: INACTIVE,
            rx_ready: false,
            overrun: false,
            framing: false,
            break_received: false,
            ninth_bit_received: false,
            irq_pending: false,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    #[must_use]
    pub fn read_serctl(&self) -> u8 {
        let tx_ready = self.tx_countdown & INACTIVE != 0;
        let mut byte = 0u8;
        byte |= u8::from(tx_ready) << 7;
        byte |= u8::from(self.rx_ready) << 6;
        byte |= u8::from(tx_ready) << 5; // TxEmpty mirrors TxRdy
        byte |= u8::from(self.overrun) << 3;
        byte |= u8::from(self.framing) << 2;
        byte |= u8::from(self.break_received) << 1;
        byte |= u8::from(self.ninth_bit_received);
        byte
    }

    pub fn write_serctl(&mut self, value: u8) {
        let reset_errors = self.ctl.write(value);
        if reset_errors {
            self.overrun = false;
            self.framing = false;
        }

        if self.ctl.send_break {
            // Enabling break immediately activates the TX countdown and front-inserts the break
            // code (word value 0, the conventional ComLynx break marker) into the local RX queue.
            if self.tx_countdown & INACTIVE != 0 {
                self.tx_countdown = TX_PERIOD;
            }
            self.rx_queue.push_front(0);
            self.kick_rx_countdown_if_idle();
        }
    }

    /// SERDAT write: stage a TX word, optionally tagging bit 8 from the software parity
    /// convention, start the TX countdown, and front-insert the word into the local RX queue
    /// (ComLynx self-loopback).
    pub fn write_serdat(&mut self, value: u8) {
        let mut word = u16::from(value);
        if !self.ctl.parity_enable && self.ctl.parity_even {
            word |= 0x100;
        }
        self.tx_data = word;
        if self.tx_countdown & INACTIVE != 0 {
            self.tx_countdown = TX_PERIOD;
        }

        self.rx_queue.push_front(word);
        self.kick_rx_countdown_if_idle();
    }

    /// SERDAT read: returns the low 8 bits of the current RX word and clears RxRdy.
    pub fn read_serdat(&mut self) -> u8 {
        self.rx_ready = false;
        self.rx_data as u8
    }

    /// External ComLynx bus arrival (ordinary back-insert, FIFO relative to other externals).
    /// Silently dropped if the queue is full, per the spec's `UartDrop` error kind.
    pub fn comlynx_rx(&mut self, word: u16) {
        if !self.rx_queue.push_back(word) {
            log::debug!("UART RX queue full; dropping incoming ComLynx word");
        }
        self.kick_rx_countdown_if_idle();
    }

    fn kick_rx_countdown_if_idle(&mut self) {
        if self.rx_countdown & INACTIVE != 0 {
            self.rx_countdown = RX_PERIOD;
        }
    }

    /// Advance by one Timer-4 underflow. Returns the TX-departure event (if any) for the host's
    /// `on_comlynx_tx` callback, and whether the UART's IRQ contribution (bit 4) is currently
    /// asserted after this tick.
    pub fn tick(&mut self) -> (UartEvent, bool) {
        let mut event = UartEvent::None;

        if self.tx_countdown & INACTIVE == 0 {
            if self.tx_countdown == 0 {
                if self.ctl.send_break {
                    self.tx_countdown = TX_PERIOD;
                    // Continuous retransmission of the break code; the host sees no discrete
                    // word depart while break is held.
                } else {
                    event = UartEvent::TxWordSent(self.tx_data);
                    self.tx_countdown = INACTIVE;
                }
            } else {
                self.tx_countdown -= 1;
            }
        }

        if self.rx_countdown & INACTIVE == 0 {
            if self.rx_countdown == 0 {
                self.expire_rx();
            } else {
                self.rx_countdown -= 1;
            }
        }

        let irq_level = self.irq_level();
        self.irq_pending = irq_level;
        (event, irq_level)
    }

    fn expire_rx(&mut self) {
        if self.rx_queue.is_empty() {
            self.rx_countdown = INACTIVE;
            return;
        }

        if self.rx_ready {
            self.overrun = true;
        }

        let word = self.rx_queue.pop_front().unwrap_or(0);
        self.rx_data = word;
        self.ninth_bit_received = word & 0x100 != 0;
        self.break_received = word == 0 && self.ctl.send_break;
        self.rx_ready = true;

        if self.rx_queue.is_empty() {
            self.rx_countdown = INACTIVE;
        } else {
            self.rx_countdown = INTER_BYTE_GAP;
        }
    }

    /// Level-sensitive recomputation of the UART's bit-4 IRQ contribution (HW Bug 13.2): if
    /// software clears bit 4 while TX-idle+enabled or RX-ready+enabled still holds, the next
    /// recompute (the next tick, or the next explicit poll) re-asserts it.
    #[must_use]
    pub fn irq_level(&self) -> bool {
        let tx_idle = self.tx_countdown & INACTIVE != 0;
        (tx_idle && self.ctl.tx_irq_enable) || (self.rx_ready && self.ctl.rx_irq_enable)
    }

    /// Whether either of SERCTL's TX/RX IRQ enable bits is set, independent of the current
    /// TX-idle/RX-ready state. Backs `IrqEnabled` bit 4, which mirrors these enables rather than
    /// Timer 4's own (unused) Control A bit 7.
    #[must_use]
    pub fn irq_enabled(&self) -> bool {
        self.ctl.tx_irq_enable || self.ctl.rx_irq_enable
    }
}

impl Default for Uart {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s3_loopback_then_external_delivery_order() {
        let mut uart = Uart::new();
        uart.comlynx_rx(0xEE);
        uart.write_serdat(0xAA);

        for _ in 0..12 {
            uart.tick();
        }
        assert!(uart.rx_ready);
        assert_eq!(uart.read_serdat(), 0xAA);

        for _ in 0..56 {
            uart.tick();
        }
        assert!(uart.rx_ready);
        assert_eq!(uart.read_serdat(), 0xEE);
    }

    #[test]
    fn s4_overrun_when_second_word_arrives_before_read() {
        let mut uart = Uart::new();
        uart.comlynx_rx(0x01);
        uart.comlynx_rx(0x02);

        for _ in 0..12 {
            uart.tick();
        }
        assert!(uart.rx_ready);

        for _ in 0..56 {
            uart.tick();
        }
        assert!(uart.overrun);
        assert_eq!(uart.rx_data as u8, 0x02);
    }

    #[test]
    fn queue_front_insert_is_lifo_among_loopbacks() {
        let mut queue = WordQueue::new();
        queue.push_back(1);
        queue.push_front(2);
        queue.push_front(3);
        // LIFO among the front-inserts (3, then 2), then the back-inserted 1.
        assert_eq!(queue.pop_front(), Some(3));
        assert_eq!(queue.pop_front(), Some(2));
        assert_eq!(queue.pop_front(), Some(1));
    }

    #[test]
    fn irq_bug_13_2_reasserts_after_software_clear() {
        let mut uart = Uart::new();
        uart.write_serctl(0x80); // TX IRQ enable only
        assert!(uart.irq_level());
        // Software "clearing" IrqPending bit 4 happens in the aggregator, not here; the UART's
        // own level recompute on the next tick must still observe TX-idle and reassert.
        let (_event, level) = uart.tick();
        assert!(level);
    }
}
