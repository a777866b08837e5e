//! Multibase text encodings used by docnet identifiers.
//!
//! Only the three bases the network actually emits are supported:
//! base32-lower (`b`, CIDs), base36-lower (`k`, stream and commit ids)
//! and base58btc (`z`, `did:key` and legacy CIDs).

use crate::error::{CoreError, Result};

const BASE32_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz234567";
const BASE36_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// A supported multibase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Base {
    /// RFC 4648 base32, lowercase, no padding.
    Base32Lower,
    /// Base36, lowercase.
    Base36Lower,
    /// Bitcoin-alphabet base58.
    Base58Btc,
}

impl Base {
    /// The multibase prefix character.
    pub const fn prefix(self) -> char {
        match self {
            Base::Base32Lower => 'b',
            Base::Base36Lower => 'k',
            Base::Base58Btc => 'z',
        }
    }

    /// Look up a base by its prefix character.
    pub fn from_prefix(prefix: char) -> Result<Self> {
        match prefix {
            'b' => Ok(Base::Base32Lower),
            'k' => Ok(Base::Base36Lower),
            'z' => Ok(Base::Base58Btc),
            other => Err(CoreError::UnsupportedMultibase(other)),
        }
    }

    /// Encode without the prefix.
    pub fn encode_raw(self, data: &[u8]) -> String {
        match self {
            Base::Base32Lower => base32_encode(data),
            Base::Base36Lower => base36_encode(data),
            Base::Base58Btc => bs58::encode(data).into_string(),
        }
    }

    /// Decode a string that carries no prefix.
    pub fn decode_raw(self, input: &str) -> Result<Vec<u8>> {
        match self {
            Base::Base32Lower => base32_decode(input),
            Base::Base36Lower => base36_decode(input),
            Base::Base58Btc => bs58::decode(input)
                .into_vec()
                .map_err(|e| CoreError::InvalidMultibase(e.to_string())),
        }
    }
}

/// Encode with the multibase prefix.
pub fn encode(base: Base, data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2 + 1);
    out.push(base.prefix());
    out.push_str(&base.encode_raw(data));
    out
}

/// Decode a prefixed multibase string.
pub fn decode(input: &str) -> Result<(Base, Vec<u8>)> {
    let mut chars = input.chars();
    let prefix = chars
        .next()
        .ok_or_else(|| CoreError::InvalidMultibase("empty string".into()))?;
    let base = Base::from_prefix(prefix)?;
    let bytes = base.decode_raw(chars.as_str())?;
    Ok((base, bytes))
}

// RFC 4648 Base32 encoding (lowercase, no padding)
fn base32_encode(data: &[u8]) -> String {
    let mut result = String::with_capacity((data.len() * 8 + 4) / 5);
    let mut buffer: u64 = 0;
    let mut bits_in_buffer = 0;

    for &byte in data {
        buffer = ((buffer << 8) | byte as u64) & 0xffff;
        bits_in_buffer += 8;

        while bits_in_buffer >= 5 {
            bits_in_buffer -= 5;
            let index = ((buffer >> bits_in_buffer) & 0x1f) as usize;
            result.push(BASE32_ALPHABET[index] as char);
        }
    }

    if bits_in_buffer > 0 {
        let index = ((buffer << (5 - bits_in_buffer)) & 0x1f) as usize;
        result.push(BASE32_ALPHABET[index] as char);
    }

    result
}

fn base32_decode(input: &str) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len() * 5 / 8);
    let mut buffer: u64 = 0;
    let mut bits_in_buffer = 0;

    for c in input.bytes() {
        let value = BASE32_ALPHABET
            .iter()
            .position(|a| *a == c)
            .ok_or_else(|| CoreError::InvalidMultibase(format!("bad base32 char {:?}", c as char)))?;

        buffer = ((buffer << 5) | value as u64) & 0xffff;
        bits_in_buffer += 5;

        if bits_in_buffer >= 8 {
            bits_in_buffer -= 8;
            out.push(((buffer >> bits_in_buffer) & 0xff) as u8);
        }
    }

    Ok(out)
}

// Leading zero bytes map to leading '0' digits, as in base58.
fn base36_encode(data: &[u8]) -> String {
    let zeros = data.iter().take_while(|b| **b == 0).count();

    // Little-endian base36 digits.
    let mut digits: Vec<u8> = Vec::with_capacity(data.len() * 2);
    for &byte in &data[zeros..] {
        let mut carry = byte as u32;
        for digit in digits.iter_mut() {
            carry += (*digit as u32) << 8;
            *digit = (carry % 36) as u8;
            carry /= 36;
        }
        while carry > 0 {
            digits.push((carry % 36) as u8);
            carry /= 36;
        }
    }

    let mut out = String::with_capacity(zeros + digits.len());
    out.extend(std::iter::repeat('0').take(zeros));
    out.extend(digits.iter().rev().map(|d| BASE36_ALPHABET[*d as usize] as char));
    out
}

fn base36_decode(input: &str) -> Result<Vec<u8>> {
    let zeros = input.bytes().take_while(|c| *c == b'0').count();

    // Little-endian bytes.
    let mut bytes: Vec<u8> = Vec::with_capacity(input.len());
    for c in input.bytes().skip(zeros) {
        let value = BASE36_ALPHABET
            .iter()
            .position(|a| *a == c)
            .ok_or_else(|| CoreError::InvalidMultibase(format!("bad base36 char {:?}", c as char)))?;

        let mut carry = value as u32;
        for byte in bytes.iter_mut() {
            carry += (*byte as u32) * 36;
            *byte = (carry & 0xff) as u8;
            carry >>= 8;
        }
        while carry > 0 {
            bytes.push((carry & 0xff) as u8);
            carry >>= 8;
        }
    }

    let mut out = vec![0u8; zeros];
    out.extend(bytes.iter().rev());
    Ok(out)
}
