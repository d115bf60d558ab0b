mod api;
mod bus;
pub mod cartridge;
pub mod memory;
pub mod mikey;
pub mod suzy;

pub use api::{Core, FrameOutput, LoadError};
pub use cartridge::{CartInfo, CartridgeLoadError};
pub use mikey::display::{FRAMEBUFFER_LEN, LynxColor, SCREEN_HEIGHT, SCREEN_WIDTH};
