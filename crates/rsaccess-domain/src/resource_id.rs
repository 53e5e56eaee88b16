//! Opaque, checksummed external resource identifiers.
//!
//! A surrogate integer id is rendered as eight lowercase hex digits,
//! optionally prefixed by a resource type and a hyphen:
//!
//! ```text
//! 1000          -> "2f7ce362"
//! 1000, "cat"   -> "cat-2f7ce362"
//! ```
//!
//! The 32-bit block `id << 8 | check(id)` is run through a fixed four-round
//! Feistel permutation and XOR-whitened, so consecutive ids do not produce
//! consecutive strings and roughly 255 of every 256 random strings fail to
//! decode.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Largest id that fits in the 24-bit payload of an encoded block.
pub const MAX_RESOURCE_ID: i64 = 0x00FF_FFFF;

/// Number of hex digits in an encoded id.
pub const ENCODED_LEN: usize = 8;

const ROUND_KEYS: [u16; 4] = [0x5bd1, 0xe995, 0x27d4, 0x9f3b];
const WHITENING: u32 = 0x9cc1_dfe8;

fn checksum(id: u32) -> u32 {
    id.wrapping_mul(0x9e37_79b1) >> 24
}

fn round(half: u16, key: u16) -> u16 {
    let x = u32::from(half ^ key).wrapping_mul(0x045d_9f3b);
    ((x >> 16) ^ x) as u16
}

fn permute(block: u32) -> u32 {
    let (mut left, mut right) = ((block >> 16) as u16, block as u16);
    for key in ROUND_KEYS {
        let next = left ^ round(right, key);
        left = right;
        right = next;
    }
    (u32::from(left) << 16) | u32::from(right)
}

fn unpermute(block: u32) -> u32 {
    let (mut left, mut right) = ((block >> 16) as u16, block as u16);
    for key in ROUND_KEYS.iter().rev() {
        let previous = right ^ round(left, *key);
        right = left;
        left = previous;
    }
    (u32::from(left) << 16) | u32::from(right)
}

/// Validates a resource-type prefix: non-empty ASCII alphanumerics or `_`.
pub fn validate_prefix(prefix: &str) -> DomainResult<()> {
    if prefix.is_empty() {
        return Err(DomainError::invalid("resource type prefix cannot be empty"));
    }
    if !prefix
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(DomainError::invalid(format!(
            "resource type prefix '{prefix}' must contain only alphanumerics or '_'"
        )));
    }
    Ok(())
}

/// Encodes `id` as an eight-digit checksummed hex string, prefixed by
/// `prefix` and a hyphen when one is given.
///
/// Only ids in `0..=`[`MAX_RESOURCE_ID`] (24 bits) fit the encoded block. Any
/// other id, and a prefix that fails [`validate_prefix`], is rejected with
/// `InvalidParameter`.
pub fn encode(id: i64, prefix: Option<&str>) -> DomainResult<String> {
    if !(0..=MAX_RESOURCE_ID).contains(&id) {
        return Err(DomainError::invalid(format!(
            "resource id {id} is outside 0..={MAX_RESOURCE_ID}"
        )));
    }
    let id = id as u32;
    let encoded = permute((id << 8) | checksum(id)) ^ WHITENING;
    match prefix {
        Some(prefix) => {
            validate_prefix(prefix)?;
            Ok(format!("{prefix}-{encoded:08x}"))
        }
        None => Ok(format!("{encoded:08x}")),
    }
}

fn decode_digits(digits: &str) -> DomainResult<i64> {
    if digits.len() != ENCODED_LEN
        || !digits
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    {
        return Err(DomainError::invalid(format!(
            "'{digits}' is not {ENCODED_LEN} lowercase hex digits"
        )));
    }
    let value = u32::from_str_radix(digits, 16)
        .map_err(|e| DomainError::invalid(format!("'{digits}': {e}")))?;
    let block = unpermute(value ^ WHITENING);
    let id = block >> 8;
    if checksum(id) != block & 0xff {
        return Err(DomainError::invalid(format!(
            "'{digits}' has an invalid checksum"
        )));
    }
    Ok(i64::from(id))
}

/// Decodes a value produced by [`encode`].
///
/// When `prefix` is given the value must carry exactly that prefix; when it
/// is `None` the value must be unprefixed.
pub fn decode(value: &str, prefix: Option<&str>) -> DomainResult<i64> {
    match prefix {
        Some(expected) => {
            let (actual, id) = parse(value)?;
            if actual != expected {
                return Err(DomainError::invalid(format!(
                    "resource id '{value}' does not have prefix '{expected}'"
                )));
            }
            Ok(id)
        }
        None => decode_digits(value),
    }
}

/// Splits a prefixed resource id into its type prefix and integer id.
pub fn parse(value: &str) -> DomainResult<(String, i64)> {
    let split = value
        .len()
        .checked_sub(ENCODED_LEN + 1)
        .filter(|&at| at > 0 && value.as_bytes()[at] == b'-')
        .ok_or_else(|| {
            DomainError::invalid(format!(
                "'{value}' is not of the form <type>-<{ENCODED_LEN} hex digits>"
            ))
        })?;
    let (prefix, digits) = (&value[..split], &value[split + 1..]);
    validate_prefix(prefix)?;
    Ok((prefix.to_string(), decode_digits(digits)?))
}

/// A decoded resource id, optionally carrying its type prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId {
    pub resource_type: Option<String>,
    pub id: i64,
}

impl ResourceId {
    pub fn new(id: i64) -> Self {
        Self {
            resource_type: None,
            id,
        }
    }

    pub fn typed(resource_type: impl Into<String>, id: i64) -> Self {
        Self {
            resource_type: Some(resource_type.into()),
            id,
        }
    }

    /// Renders the textual form.
    pub fn encode(&self) -> DomainResult<String> {
        encode(self.id, self.resource_type.as_deref())
    }
}

impl FromStr for ResourceId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() == ENCODED_LEN {
            return Ok(Self::new(decode(s, None)?));
        }
        let (resource_type, id) = parse(s)?;
        Ok(Self::typed(resource_type, id))
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.encode() {
            Ok(encoded) => f.write_str(&encoded),
            Err(_) => write!(f, "<invalid resource id {}>", self.id),
        }
    }
}
