//! Emergency (EMCY) messages.

use std::fmt::Write as _;

/// One received emergency message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmergencyMessage {
    /// Emergency error code; `0` signals "error reset / no error".
    pub code: u16,
    /// Error register (object 0x1001).
    pub register: u8,
    /// Manufacturer-specific error field.
    pub manufacturer: [u8; 5],
}

impl EmergencyMessage {
    pub const fn new(code: u16, register: u8, manufacturer: [u8; 5]) -> Self {
        Self {
            code,
            register,
            manufacturer,
        }
    }

    #[inline]
    pub const fn is_error(&self) -> bool {
        self.code != 0
    }

    /// Report text: hex dump of the manufacturer field plus its printable form.
    pub fn describe(&self) -> String {
        let mut message = format!(
            "EMERGENCY: code: 0x{:04x} error register: 0x{:02x} manufacturer specific message (hex): ",
            self.code, self.register
        );
        for byte in self.manufacturer {
            let _ = write!(message, "{byte:02x} ");
        }
        message.push_str(" string: ");
        for byte in self.manufacturer {
            if (32..=127).contains(&byte) {
                message.push(char::from(byte));
            } else {
                message.push('.');
            }
        }
        message
    }
}
