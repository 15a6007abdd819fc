//! Application tasks and the collaborator traits they drive
//!
//! The scheduler knows nothing about keyboards or LEDs. These tasks sit on
//! top of it and talk to the board through the traits below; the board
//! crate implements them over its HAL.
//!
//! Author: Moroya Sakamoto

use core::fmt;

pub mod display;
pub mod heartbeat;
pub mod keyboard;
pub mod monitor;

pub use display::DisplayTask;
pub use heartbeat::{HeartbeatConfig, HeartbeatTask};
pub use keyboard::{FnAction, KeyAction, KeyboardConfig, KeyboardTask, Keymap};
pub use monitor::{MonitorConfig, MonitorTask};

/// Text output (serial console, OLED line, ...)
pub trait DisplaySink {
    fn show(&mut self, text: &str);
}

/// Single status LED
pub trait StatusIndicator {
    fn set(&mut self, on: bool);
}

/// Key switch matrix
pub trait KeyMatrix {
    /// Is the switch at (`row`, `col`) closed?
    fn read(&mut self, row: usize, col: usize) -> bool;
}

/// HID usage id of a keyboard key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Keycode(pub u8);

impl Keycode {
    pub const A: Keycode = Keycode(0x04);
    pub const B: Keycode = Keycode(0x05);
    pub const C: Keycode = Keycode(0x06);
    pub const D: Keycode = Keycode(0x07);
    pub const E: Keycode = Keycode(0x08);
    pub const I: Keycode = Keycode(0x0C);
    pub const J: Keycode = Keycode(0x0D);
    pub const K: Keycode = Keycode(0x0E);
    pub const L: Keycode = Keycode(0x0F);
    pub const O: Keycode = Keycode(0x12);
    pub const P: Keycode = Keycode(0x13);
    pub const Q: Keycode = Keycode(0x14);
    pub const S: Keycode = Keycode(0x16);
    pub const U: Keycode = Keycode(0x18);
    pub const W: Keycode = Keycode(0x1A);
    pub const ONE: Keycode = Keycode(0x1E);
    pub const TWO: Keycode = Keycode(0x1F);
    pub const ENTER: Keycode = Keycode(0x28);
    pub const ESCAPE: Keycode = Keycode(0x29);
    pub const BACKSPACE: Keycode = Keycode(0x2A);
    pub const TAB: Keycode = Keycode(0x2B);
    pub const SPACE: Keycode = Keycode(0x2C);
    pub const F1: Keycode = Keycode(0x3A);
    pub const F2: Keycode = Keycode(0x3B);
    pub const PRINT_SCREEN: Keycode = Keycode(0x46);
    pub const HOME: Keycode = Keycode(0x4A);
    pub const PAGE_UP: Keycode = Keycode(0x4B);
    pub const END: Keycode = Keycode(0x4D);
    pub const PAGE_DOWN: Keycode = Keycode(0x4E);
    pub const RIGHT_ARROW: Keycode = Keycode(0x4F);
    pub const LEFT_ARROW: Keycode = Keycode(0x50);
    pub const DOWN_ARROW: Keycode = Keycode(0x51);
    pub const UP_ARROW: Keycode = Keycode(0x52);
    pub const LEFT_CONTROL: Keycode = Keycode(0xE0);
    pub const LEFT_SHIFT: Keycode = Keycode(0xE1);
    pub const LEFT_ALT: Keycode = Keycode(0xE2);
}

/// HID consumer-control usage (media keys)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConsumerCode(pub u16);

impl ConsumerCode {
    pub const PLAY_PAUSE: ConsumerCode = ConsumerCode(0xCD);
    pub const MUTE: ConsumerCode = ConsumerCode(0xE2);
    pub const VOLUME_INCREMENT: ConsumerCode = ConsumerCode(0xE9);
    pub const VOLUME_DECREMENT: ConsumerCode = ConsumerCode(0xEA);
}

/// Mouse buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// Pointer emulation event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerAction {
    Move { x: i8, y: i8 },
    Wheel(i8),
    Click(MouseButton),
}

/// USB HID transmitter
///
/// Errors are the transmitter's to report; the keyboard task contains them.
pub trait HidSink {
    type Error: fmt::Debug;

    fn press(&mut self, keys: &[Keycode]) -> Result<(), Self::Error>;

    fn release(&mut self, keys: &[Keycode]) -> Result<(), Self::Error>;

    fn release_all(&mut self) -> Result<(), Self::Error>;

    fn pointer(&mut self, action: PointerAction) -> Result<(), Self::Error>;

    /// Send one consumer-control usage (press and release)
    fn consumer(&mut self, code: ConsumerCode) -> Result<(), Self::Error>;

    /// Re-open the HID endpoints after a failure
    fn reconnect(&mut self) -> Result<(), Self::Error>;
}
