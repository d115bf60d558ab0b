//! Implementation of the 65C02's bus interface, which connects it to memory, Suzy, Mikey, and
//! the cartridge.

use crate::cartridge::{Bank, Cartridge};
use crate::memory::{MemoryManager, Window, MAPCTL_ADDRESS, MIKEY_BASE, SUZY_BASE};
use crate::mikey::Mikey;
use crate::suzy::Suzy;
use w65c02_emu::bus::BusInterface;

/// Cart I/O lines sit inside the Suzy register window but are routed straight to the cartridge
/// rather than to Suzy's own register file (§4.3).
const CART_BANK0_SELECT_OFFSET: u16 = 0xB2;
const CART_BANK1_SELECT_OFFSET: u16 = 0xB3;
const CART_DATA_OFFSET: u16 = 0xB8;
const EEPROM_SHIFT_OFFSET: u16 = 0xB9;

pub struct Bus<'a> {
    memory: &'a mut MemoryManager,
    suzy: &'a mut Suzy,
    mikey: &'a mut Mikey,
    cartridge: &'a mut Cartridge,
}

impl<'a> Bus<'a> {
    pub fn new(
        memory: &'a mut MemoryManager,
        suzy: &'a mut Suzy,
        mikey: &'a mut Mikey,
        cartridge: &'a mut Cartridge,
    ) -> Self {
        Self { memory, suzy, mikey, cartridge }
    }

    fn read_suzy_window(&mut self, address: u16) -> u8 {
        let offset = address - SUZY_BASE;
        match offset {
            CART_DATA_OFFSET => self.cartridge.read_data(),
            EEPROM_SHIFT_OFFSET => {
                let data_out =
                    self.cartridge.eeprom().map(|eeprom| eeprom.data_out()).unwrap_or(true);
                u8::from(data_out)
            }
            _ => self.suzy.read_register(offset),
        }
    }

    fn write_suzy_window(&mut self, address: u16, value: u8) {
        let offset = address - SUZY_BASE;
        match offset {
            CART_BANK0_SELECT_OFFSET => {
                self.cartridge.set_bank(Bank::Zero);
                self.cartridge.set_bank_page(value);
            }
            CART_BANK1_SELECT_OFFSET => {
                self.cartridge.set_bank(Bank::One);
                self.cartridge.set_bank_page(value);
            }
            CART_DATA_OFFSET => self.cartridge.set_bank_address_low(value),
            EEPROM_SHIFT_OFFSET => {
                if let Some(eeprom) = self.cartridge.eeprom_mut() {
                    eeprom.set_chip_select(value & 0x02 != 0);
                    eeprom.clock_bit(value & 0x01 != 0, value & 0x04 != 0);
                }
            }
            _ => self.suzy.write_register(offset, value),
        }
    }
}

impl BusInterface for Bus<'_> {
    fn read(&mut self, address: u16) -> u8 {
        // MAPCTL itself is not overlaid by anything; it must read back as the raw register byte
        // even while the ROM window (which otherwise covers $FE00-$FFFF) is visible.
        let value = if address == MAPCTL_ADDRESS {
            self.memory.mapctl()
        } else {
            match self.memory.read_window(address) {
                Window::Suzy => self.read_suzy_window(address),
                Window::Mikey => self.mikey.read_register(address - MIKEY_BASE),
                Window::Rom => self.memory.read_rom_window(address),
                Window::WorkRam => self.memory.read_ram(address),
            }
        };
        self.memory.set_open_bus(value);
        value
    }

    fn write(&mut self, address: u16, value: u8) {
        if address == MAPCTL_ADDRESS {
            self.memory.write_mapctl(value);
            return;
        }

        match self.memory.write_window(address) {
            Some(Window::Suzy) => self.write_suzy_window(address, value),
            Some(Window::Mikey) => self.mikey.write_register(address - MIKEY_BASE, value),
            Some(Window::Rom) | None => {}
            Some(Window::WorkRam) => self.memory.write_ram(address, value),
        }
    }

    fn irq(&self) -> bool {
        self.mikey.irq_line()
    }

    fn nmi(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Harness {
        memory: MemoryManager,
        suzy: Suzy,
        mikey: Mikey,
        cartridge: Cartridge,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                memory: MemoryManager::new(),
                suzy: Suzy::new(),
                mikey: Mikey::new(),
                cartridge: Cartridge::load(vec![0; 1024]).unwrap(),
            }
        }

        fn bus(&mut self) -> Bus<'_> {
            Bus::new(&mut self.memory, &mut self.suzy, &mut self.mikey, &mut self.cartridge)
        }
    }

    #[test]
    fn mapctl_reads_back_the_raw_register_even_with_rom_window_visible() {
        let mut harness = Harness::new();
        let mut bus = harness.bus();
        bus.write(MAPCTL_ADDRESS, 0x05);
        assert_eq!(bus.read(MAPCTL_ADDRESS), 0x05);
    }

    #[test]
    fn mapctl_reads_back_correctly_once_rom_window_is_hidden() {
        let mut harness = Harness::new();
        let mut bus = harness.bus();
        bus.write(MAPCTL_ADDRESS, 0x0F);
        assert_eq!(bus.read(MAPCTL_ADDRESS), 0x0F);
    }
}
