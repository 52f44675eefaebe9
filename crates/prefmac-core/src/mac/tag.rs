use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::error::MalformedInput;

/// Length of an HMAC-SHA256 tag in bytes.
pub const MAC_LEN: usize = 32;

/// An HMAC-SHA256 tag.
///
/// Equality is constant-time. `Display` renders 64 uppercase hex digits.
#[derive(Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacTag([u8; MAC_LEN]);

impl MacTag {
    /// Wraps raw tag bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; MAC_LEN]) -> Self {
        Self(bytes)
    }

    /// Parses a hex tag in either case, ignoring surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedInput::InvalidMac`] unless the input is exactly 64
    /// hex digits.
    pub fn parse(hex_tag: &str) -> Result<Self, MalformedInput> {
        let invalid = || MalformedInput::InvalidMac {
            value: hex_tag.to_string(),
        };
        let decoded = hex::decode(hex_tag.trim()).map_err(|_| invalid())?;
        let bytes: [u8; MAC_LEN] = decoded.try_into().map_err(|_| invalid())?;
        Ok(Self(bytes))
    }

    /// Raw tag bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; MAC_LEN] {
        &self.0
    }
}

impl PartialEq for MacTag {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes().ct_eq(other.as_bytes()).into()
    }
}

impl Eq for MacTag {}

impl fmt::Display for MacTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.as_bytes()))
    }
}

impl fmt::Debug for MacTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacTag({self})")
    }
}

impl FromStr for MacTag {
    type Err = MalformedInput;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for MacTag {
    type Error = MalformedInput;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MacTag> for String {
    fn from(value: MacTag) -> Self {
        value.to_string()
    }
}
