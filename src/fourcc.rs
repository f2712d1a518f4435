//! Four-character codes
//!
//! Apple Event suites, event ids, keywords, and descriptor types are all
//! 32-bit big-endian packings of four 8-bit characters (`'core'`, `'getd'`).
//! Characters are mapped through Latin-1 so every code has a lossless string
//! form.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A packed four-character code (`OSType`, `DescType`, `AEKeyword`)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FourCharCode(u32);

impl FourCharCode {
    /// Build a code from its four bytes, most significant first
    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_be_bytes(bytes))
    }

    pub const fn from_u32(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }

    pub const fn to_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// Read a code stored as native-endian descriptor data
    pub fn from_ne_slice(data: &[u8]) -> Option<Self> {
        let bytes: [u8; 4] = data.try_into().ok()?;
        Some(Self(u32::from_ne_bytes(bytes)))
    }
}

impl fmt::Display for FourCharCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.to_bytes() {
            write!(f, "{}", char::from(byte))?;
        }
        Ok(())
    }
}

impl fmt::Debug for FourCharCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCharCode('{self}')")
    }
}

impl FromStr for FourCharCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut bytes = [0u8; 4];
        let mut len = 0;
        for ch in s.chars() {
            let byte = u8::try_from(u32::from(ch))
                .map_err(|_| Error::InvalidFourCharCode(s.to_string()))?;
            if len == 4 {
                return Err(Error::InvalidFourCharCode(s.to_string()));
            }
            bytes[len] = byte;
            len += 1;
        }
        if len != 4 {
            return Err(Error::InvalidFourCharCode(s.to_string()));
        }
        Ok(Self::from_bytes(bytes))
    }
}

impl From<FourCharCode> for String {
    fn from(code: FourCharCode) -> Self {
        code.to_string()
    }
}

/// Shorthand for compile-time codes: `fourcc(b"core")`
pub const fn fourcc(bytes: &[u8; 4]) -> FourCharCode {
    FourCharCode::from_bytes(*bytes)
}
