//! USB HID Usage IDs (page 0x07, Keyboard/Keypad page).
//!
//! Boot-protocol keyboards report pressed keys as Usage IDs, so this table is
//! both the scan-code vocabulary of [`crate::keymap::report`] and the key
//! vocabulary of [`crate::domain::action::Action::KeyPress`].
//!
//! Reference: USB HID Usage Tables 1.3, Section 10 (Keyboard/Keypad page 0x07).
//!
//! # What is a HID Usage ID? (for beginners)
//!
//! The **USB Human Interface Device (HID)** standard assigns a unique number to
//! every key on a keyboard.  These numbers are called *Usage IDs* and they are
//! grouped by *Usage Page*.  All keyboard keys are on page 0x07 ("Keyboard/Keypad").
//!
//! | Key          | HID Usage ID |
//! |--------------|-------------|
//! | Letter A     | 0x04        |
//! | Digit 1      | 0x1E        |
//! | Enter        | 0x28        |
//! | Left Ctrl    | 0xE0        |
//!
//! HID codes represent **physical key positions**, not characters.  A macro
//! pad sends 0x1E for its "1" key regardless of the host's keyboard layout,
//! which is exactly what makes the codes usable as stable mapping keys.
//!
//! Codes 0x00–0x03 are reserved (0x00 means "no key pressed" in a boot
//! report) and have no variant here.

use serde::{Deserialize, Serialize};

/// USB HID Usage ID for keyboard keys (page 0x07).
///
/// The discriminant of each variant is its Usage ID on the keyboard/keypad page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum HidKeyCode {
    // Letters (HID 0x04–0x1D)
    KeyA = 0x04,
    KeyB = 0x05,
    KeyC = 0x06,
    KeyD = 0x07,
    KeyE = 0x08,
    KeyF = 0x09,
    KeyG = 0x0A,
    KeyH = 0x0B,
    KeyI = 0x0C,
    KeyJ = 0x0D,
    KeyK = 0x0E,
    KeyL = 0x0F,
    KeyM = 0x10,
    KeyN = 0x11,
    KeyO = 0x12,
    KeyP = 0x13,
    KeyQ = 0x14,
    KeyR = 0x15,
    KeyS = 0x16,
    KeyT = 0x17,
    KeyU = 0x18,
    KeyV = 0x19,
    KeyW = 0x1A,
    KeyX = 0x1B,
    KeyY = 0x1C,
    KeyZ = 0x1D,

    // Digits (HID 0x1E–0x27)
    Digit1 = 0x1E,
    Digit2 = 0x1F,
    Digit3 = 0x20,
    Digit4 = 0x21,
    Digit5 = 0x22,
    Digit6 = 0x23,
    Digit7 = 0x24,
    Digit8 = 0x25,
    Digit9 = 0x26,
    Digit0 = 0x27,

    // Control keys (HID 0x28–0x38)
    Enter = 0x28,
    Escape = 0x29,
    Backspace = 0x2A,
    Tab = 0x2B,
    Space = 0x2C,
    Minus = 0x2D,
    Equal = 0x2E,
    BracketLeft = 0x2F,
    BracketRight = 0x30,
    Backslash = 0x31,
    NonUsHash = 0x32,
    Semicolon = 0x33,
    Quote = 0x34,
    Backquote = 0x35,
    Comma = 0x36,
    Period = 0x37,
    Slash = 0x38,

    // Lock keys
    CapsLock = 0x39,

    // Function keys (HID 0x3A–0x45)
    F1 = 0x3A,
    F2 = 0x3B,
    F3 = 0x3C,
    F4 = 0x3D,
    F5 = 0x3E,
    F6 = 0x3F,
    F7 = 0x40,
    F8 = 0x41,
    F9 = 0x42,
    F10 = 0x43,
    F11 = 0x44,
    F12 = 0x45,

    // Navigation cluster (HID 0x46–0x52)
    PrintScreen = 0x46,
    ScrollLock = 0x47,
    Pause = 0x48,
    Insert = 0x49,
    Home = 0x4A,
    PageUp = 0x4B,
    Delete = 0x4C,
    End = 0x4D,
    PageDown = 0x4E,
    ArrowRight = 0x4F,
    ArrowLeft = 0x50,
    ArrowDown = 0x51,
    ArrowUp = 0x52,

    // Numpad (HID 0x53–0x63)
    NumLock = 0x53,
    NumpadDivide = 0x54,
    NumpadMultiply = 0x55,
    NumpadSubtract = 0x56,
    NumpadAdd = 0x57,
    NumpadEnter = 0x58,
    Numpad1 = 0x59,
    Numpad2 = 0x5A,
    Numpad3 = 0x5B,
    Numpad4 = 0x5C,
    Numpad5 = 0x5D,
    Numpad6 = 0x5E,
    Numpad7 = 0x5F,
    Numpad8 = 0x60,
    Numpad9 = 0x61,
    Numpad0 = 0x62,
    NumpadDecimal = 0x63,

    // Application key (HID 0x65)
    ContextMenu = 0x65,

    // Modifier keys (HID 0xE0–0xE7)
    ControlLeft = 0xE0,
    ShiftLeft = 0xE1,
    AltLeft = 0xE2,
    MetaLeft = 0xE3,
    ControlRight = 0xE4,
    ShiftRight = 0xE5,
    AltRight = 0xE6,
    MetaRight = 0xE7,
}

impl HidKeyCode {
    /// Converts a raw Usage ID to a [`HidKeyCode`].
    ///
    /// Returns `None` for reserved and unassigned values.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x04 => Some(HidKeyCode::KeyA),
            0x05 => Some(HidKeyCode::KeyB),
            0x06 => Some(HidKeyCode::KeyC),
            0x07 => Some(HidKeyCode::KeyD),
            0x08 => Some(HidKeyCode::KeyE),
            0x09 => Some(HidKeyCode::KeyF),
            0x0A => Some(HidKeyCode::KeyG),
            0x0B => Some(HidKeyCode::KeyH),
            0x0C => Some(HidKeyCode::KeyI),
            0x0D => Some(HidKeyCode::KeyJ),
            0x0E => Some(HidKeyCode::KeyK),
            0x0F => Some(HidKeyCode::KeyL),
            0x10 => Some(HidKeyCode::KeyM),
            0x11 => Some(HidKeyCode::KeyN),
            0x12 => Some(HidKeyCode::KeyO),
            0x13 => Some(HidKeyCode::KeyP),
            0x14 => Some(HidKeyCode::KeyQ),
            0x15 => Some(HidKeyCode::KeyR),
            0x16 => Some(HidKeyCode::KeyS),
            0x17 => Some(HidKeyCode::KeyT),
            0x18 => Some(HidKeyCode::KeyU),
            0x19 => Some(HidKeyCode::KeyV),
            0x1A => Some(HidKeyCode::KeyW),
            0x1B => Some(HidKeyCode::KeyX),
            0x1C => Some(HidKeyCode::KeyY),
            0x1D => Some(HidKeyCode::KeyZ),
            0x1E => Some(HidKeyCode::Digit1),
            0x1F => Some(HidKeyCode::Digit2),
            0x20 => Some(HidKeyCode::Digit3),
            0x21 => Some(HidKeyCode::Digit4),
            0x22 => Some(HidKeyCode::Digit5),
            0x23 => Some(HidKeyCode::Digit6),
            0x24 => Some(HidKeyCode::Digit7),
            0x25 => Some(HidKeyCode::Digit8),
            0x26 => Some(HidKeyCode::Digit9),
            0x27 => Some(HidKeyCode::Digit0),
            0x28 => Some(HidKeyCode::Enter),
            0x29 => Some(HidKeyCode::Escape),
            0x2A => Some(HidKeyCode::Backspace),
            0x2B => Some(HidKeyCode::Tab),
            0x2C => Some(HidKeyCode::Space),
            0x2D => Some(HidKeyCode::Minus),
            0x2E => Some(HidKeyCode::Equal),
            0x2F => Some(HidKeyCode::BracketLeft),
            0x30 => Some(HidKeyCode::BracketRight),
            0x31 => Some(HidKeyCode::Backslash),
            0x32 => Some(HidKeyCode::NonUsHash),
            0x33 => Some(HidKeyCode::Semicolon),
            0x34 => Some(HidKeyCode::Quote),
            0x35 => Some(HidKeyCode::Backquote),
            0x36 => Some(HidKeyCode::Comma),
            0x37 => Some(HidKeyCode::Period),
            0x38 => Some(HidKeyCode::Slash),
            0x39 => Some(HidKeyCode::CapsLock),
            0x3A => Some(HidKeyCode::F1),
            0x3B => Some(HidKeyCode::F2),
            0x3C => Some(HidKeyCode::F3),
            0x3D => Some(HidKeyCode::F4),
            0x3E => Some(HidKeyCode::F5),
            0x3F => Some(HidKeyCode::F6),
            0x40 => Some(HidKeyCode::F7),
            0x41 => Some(HidKeyCode::F8),
            0x42 => Some(HidKeyCode::F9),
            0x43 => Some(HidKeyCode::F10),
            0x44 => Some(HidKeyCode::F11),
            0x45 => Some(HidKeyCode::F12),
            0x46 => Some(HidKeyCode::PrintScreen),
            0x47 => Some(HidKeyCode::ScrollLock),
            0x48 => Some(HidKeyCode::Pause),
            0x49 => Some(HidKeyCode::Insert),
            0x4A => Some(HidKeyCode::Home),
            0x4B => Some(HidKeyCode::PageUp),
            0x4C => Some(HidKeyCode::Delete),
            0x4D => Some(HidKeyCode::End),
            0x4E => Some(HidKeyCode::PageDown),
            0x4F => Some(HidKeyCode::ArrowRight),
            0x50 => Some(HidKeyCode::ArrowLeft),
            0x51 => Some(HidKeyCode::ArrowDown),
            0x52 => Some(HidKeyCode::ArrowUp),
            0x53 => Some(HidKeyCode::NumLock),
            0x54 => Some(HidKeyCode::NumpadDivide),
            0x55 => Some(HidKeyCode::NumpadMultiply),
            0x56 => Some(HidKeyCode::NumpadSubtract),
            0x57 => Some(HidKeyCode::NumpadAdd),
            0x58 => Some(HidKeyCode::NumpadEnter),
            0x59 => Some(HidKeyCode::Numpad1),
            0x5A => Some(HidKeyCode::Numpad2),
            0x5B => Some(HidKeyCode::Numpad3),
            0x5C => Some(HidKeyCode::Numpad4),
            0x5D => Some(HidKeyCode::Numpad5),
            0x5E => Some(HidKeyCode::Numpad6),
            0x5F => Some(HidKeyCode::Numpad7),
            0x60 => Some(HidKeyCode::Numpad8),
            0x61 => Some(HidKeyCode::Numpad9),
            0x62 => Some(HidKeyCode::Numpad0),
            0x63 => Some(HidKeyCode::NumpadDecimal),
            0x65 => Some(HidKeyCode::ContextMenu),
            0xE0 => Some(HidKeyCode::ControlLeft),
            0xE1 => Some(HidKeyCode::ShiftLeft),
            0xE2 => Some(HidKeyCode::AltLeft),
            0xE3 => Some(HidKeyCode::MetaLeft),
            0xE4 => Some(HidKeyCode::ControlRight),
            0xE5 => Some(HidKeyCode::ShiftRight),
            0xE6 => Some(HidKeyCode::AltRight),
            0xE7 => Some(HidKeyCode::MetaRight),
            _ => None,
        }
    }

    /// Returns the raw USB HID Usage ID value for this key code.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Human-readable key name, as shown in key pickers and logs.
    pub fn name(self) -> &'static str {
        match self {
            HidKeyCode::KeyA => "A",
            HidKeyCode::KeyB => "B",
            HidKeyCode::KeyC => "C",
            HidKeyCode::KeyD => "D",
            HidKeyCode::KeyE => "E",
            HidKeyCode::KeyF => "F",
            HidKeyCode::KeyG => "G",
            HidKeyCode::KeyH => "H",
            HidKeyCode::KeyI => "I",
            HidKeyCode::KeyJ => "J",
            HidKeyCode::KeyK => "K",
            HidKeyCode::KeyL => "L",
            HidKeyCode::KeyM => "M",
            HidKeyCode::KeyN => "N",
            HidKeyCode::KeyO => "O",
            HidKeyCode::KeyP => "P",
            HidKeyCode::KeyQ => "Q",
            HidKeyCode::KeyR => "R",
            HidKeyCode::KeyS => "S",
            HidKeyCode::KeyT => "T",
            HidKeyCode::KeyU => "U",
            HidKeyCode::KeyV => "V",
            HidKeyCode::KeyW => "W",
            HidKeyCode::KeyX => "X",
            HidKeyCode::KeyY => "Y",
            HidKeyCode::KeyZ => "Z",
            HidKeyCode::Digit1 => "1",
            HidKeyCode::Digit2 => "2",
            HidKeyCode::Digit3 => "3",
            HidKeyCode::Digit4 => "4",
            HidKeyCode::Digit5 => "5",
            HidKeyCode::Digit6 => "6",
            HidKeyCode::Digit7 => "7",
            HidKeyCode::Digit8 => "8",
            HidKeyCode::Digit9 => "9",
            HidKeyCode::Digit0 => "0",
            HidKeyCode::Enter => "Enter",
            HidKeyCode::Escape => "Escape",
            HidKeyCode::Backspace => "Backspace",
            HidKeyCode::Tab => "Tab",
            HidKeyCode::Space => "Space",
            HidKeyCode::Minus => "-",
            HidKeyCode::Equal => "=",
            HidKeyCode::BracketLeft => "[",
            HidKeyCode::BracketRight => "]",
            HidKeyCode::Backslash => "\\",
            HidKeyCode::NonUsHash => "Non-US #",
            HidKeyCode::Semicolon => ";",
            HidKeyCode::Quote => "'",
            HidKeyCode::Backquote => "`",
            HidKeyCode::Comma => ",",
            HidKeyCode::Period => ".",
            HidKeyCode::Slash => "/",
            HidKeyCode::CapsLock => "Caps Lock",
            HidKeyCode::F1 => "F1",
            HidKeyCode::F2 => "F2",
            HidKeyCode::F3 => "F3",
            HidKeyCode::F4 => "F4",
            HidKeyCode::F5 => "F5",
            HidKeyCode::F6 => "F6",
            HidKeyCode::F7 => "F7",
            HidKeyCode::F8 => "F8",
            HidKeyCode::F9 => "F9",
            HidKeyCode::F10 => "F10",
            HidKeyCode::F11 => "F11",
            HidKeyCode::F12 => "F12",
            HidKeyCode::PrintScreen => "Print Screen",
            HidKeyCode::ScrollLock => "Scroll Lock",
            HidKeyCode::Pause => "Pause",
            HidKeyCode::Insert => "Insert",
            HidKeyCode::Home => "Home",
            HidKeyCode::PageUp => "Page Up",
            HidKeyCode::Delete => "Delete",
            HidKeyCode::End => "End",
            HidKeyCode::PageDown => "Page Down",
            HidKeyCode::ArrowRight => "Right",
            HidKeyCode::ArrowLeft => "Left",
            HidKeyCode::ArrowDown => "Down",
            HidKeyCode::ArrowUp => "Up",
            HidKeyCode::NumLock => "Num Lock",
            HidKeyCode::NumpadDivide => "Keypad /",
            HidKeyCode::NumpadMultiply => "Keypad *",
            HidKeyCode::NumpadSubtract => "Keypad -",
            HidKeyCode::NumpadAdd => "Keypad +",
            HidKeyCode::NumpadEnter => "Keypad Enter",
            HidKeyCode::Numpad1 => "Keypad 1",
            HidKeyCode::Numpad2 => "Keypad 2",
            HidKeyCode::Numpad3 => "Keypad 3",
            HidKeyCode::Numpad4 => "Keypad 4",
            HidKeyCode::Numpad5 => "Keypad 5",
            HidKeyCode::Numpad6 => "Keypad 6",
            HidKeyCode::Numpad7 => "Keypad 7",
            HidKeyCode::Numpad8 => "Keypad 8",
            HidKeyCode::Numpad9 => "Keypad 9",
            HidKeyCode::Numpad0 => "Keypad 0",
            HidKeyCode::NumpadDecimal => "Keypad .",
            HidKeyCode::ContextMenu => "Menu",
            HidKeyCode::ControlLeft => "Left Ctrl",
            HidKeyCode::ShiftLeft => "Left Shift",
            HidKeyCode::AltLeft => "Left Alt",
            HidKeyCode::MetaLeft => "Left GUI",
            HidKeyCode::ControlRight => "Right Ctrl",
            HidKeyCode::ShiftRight => "Right Shift",
            HidKeyCode::AltRight => "Right Alt",
            HidKeyCode::MetaRight => "Right GUI",
        }
    }

    /// Returns `true` if this is a modifier key.
    pub fn is_modifier(self) -> bool {
        matches!(
            self,
            HidKeyCode::ControlLeft
                | HidKeyCode::ControlRight
                | HidKeyCode::ShiftLeft
                | HidKeyCode::ShiftRight
                | HidKeyCode::AltLeft
                | HidKeyCode::AltRight
                | HidKeyCode::MetaLeft
                | HidKeyCode::MetaRight
        )
    }

    /// Returns `true` for keys on the numeric keypad.
    pub fn is_keypad(self) -> bool {
        (0x54..=0x63).contains(&self.as_u8())
    }
}

impl std::fmt::Display for HidKeyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
