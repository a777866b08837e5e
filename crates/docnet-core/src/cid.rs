//! Content identifiers.
//!
//! A CID names a commit block. Version 1 CIDs are
//! `varint(1) || varint(codec) || multihash`; version 0 CIDs are a bare
//! sha2-256 multihash. The canonical text form of a v1 CID is base32-lower
//! with the `b` prefix, which is what nodes report as a document tip.

use std::fmt;
use std::io::Read;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::{CoreError, Result};
use crate::multibase::{self, Base};

/// Multicodec codes for block formats.
pub mod codec {
    pub const RAW: u64 = 0x55;
    pub const DAG_PB: u64 = 0x70;
    pub const DAG_CBOR: u64 = 0x71;
    pub const DAG_JOSE: u64 = 0x85;
}

/// Multihash code for sha2-256.
pub const SHA2_256: u64 = 0x12;

const SHA2_256_LEN: u8 = 32;

/// A parsed content identifier.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cid {
    version: u64,
    codec: u64,
    /// Full multihash: `varint(code) || varint(len) || digest`.
    multihash: Vec<u8>,
}

impl Cid {
    /// Build a v1 CID over a sha2-256 digest of `data`.
    pub fn sha256(codec: u64, data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        let mut multihash = Vec::with_capacity(34);
        put_varint(&mut multihash, SHA2_256);
        multihash.push(SHA2_256_LEN);
        multihash.extend_from_slice(&digest);

        Self {
            version: 1,
            codec,
            multihash,
        }
    }

    /// CID version (0 or 1).
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Multicodec of the addressed block.
    pub fn codec(&self) -> u64 {
        self.codec
    }

    /// The full multihash bytes.
    pub fn multihash(&self) -> &[u8] {
        &self.multihash
    }

    /// Binary form.
    pub fn to_bytes(&self) -> Vec<u8> {
        if self.version == 0 {
            return self.multihash.clone();
        }

        let mut bytes = Vec::with_capacity(self.multihash.len() + 4);
        put_varint(&mut bytes, self.version);
        put_varint(&mut bytes, self.codec);
        bytes.extend_from_slice(&self.multihash);
        bytes
    }

    /// Parse a complete binary CID.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut input = bytes;
        let cid = Self::read_from(&mut input)?;
        if !input.is_empty() {
            return Err(CoreError::InvalidCid(format!(
                "{} trailing bytes",
                input.len()
            )));
        }
        Ok(cid)
    }

    /// Parse a CID from the front of `input`, advancing it past the CID.
    pub fn read_from(input: &mut &[u8]) -> Result<Self> {
        // v0: bare sha2-256 multihash
        if input.len() >= 2 && input[0] == SHA2_256 as u8 && input[1] == SHA2_256_LEN {
            let multihash = read_multihash(input)?;
            return Ok(Self {
                version: 0,
                codec: codec::DAG_PB,
                multihash,
            });
        }

        let version = read_varint(input)?;
        if version != 1 {
            return Err(CoreError::InvalidCid(format!("unsupported version {}", version)));
        }
        let codec = read_varint(input)?;
        let multihash = read_multihash(input)?;

        Ok(Self {
            version,
            codec,
            multihash,
        })
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.version == 0 {
            write!(f, "{}", Base::Base58Btc.encode_raw(&self.multihash))
        } else {
            write!(f, "{}", multibase::encode(Base::Base32Lower, &self.to_bytes()))
        }
    }
}

impl fmt::Debug for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cid({})", self)
    }
}

impl FromStr for Cid {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() == 46 && s.starts_with("Qm") {
            let bytes = Base::Base58Btc.decode_raw(s)?;
            return Self::from_bytes(&bytes);
        }
        let (_, bytes) = multibase::decode(s)?;
        Self::from_bytes(&bytes)
    }
}

impl Serialize for Cid {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Cid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Append an unsigned varint. Writing into a `Vec` cannot fail.
pub(crate) fn put_varint(buf: &mut Vec<u8>, value: u64) {
    let _ = leb128::write::unsigned(buf, value);
}

/// Read an unsigned varint from the front of `input`.
pub(crate) fn read_varint(input: &mut &[u8]) -> Result<u64> {
    leb128::read::unsigned(input).map_err(|e| CoreError::Varint(e.to_string()))
}

fn read_multihash(input: &mut &[u8]) -> Result<Vec<u8>> {
    let code = read_varint(input)?;
    let len = read_varint(input)?;
    if len > input.len() as u64 {
        return Err(CoreError::InvalidCid(format!(
            "multihash digest shorter than {} bytes",
            len
        )));
    }

    let mut digest = vec![0u8; len as usize];
    input
        .read_exact(&mut digest)
        .map_err(|_| CoreError::InvalidCid(format!("multihash digest shorter than {} bytes", len)))?;

    let mut multihash = Vec::with_capacity(digest.len() + 4);
    put_varint(&mut multihash, code);
    put_varint(&mut multihash, len);
    multihash.extend_from_slice(&digest);
    Ok(multihash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_cid_is_deterministic() {
        let a = Cid::sha256(codec::DAG_CBOR, b"hello");
        let b = Cid::sha256(codec::DAG_CBOR, b"hello");
        let c = Cid::sha256(codec::DAG_JOSE, b"hello");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.version(), 1);
        assert_eq!(a.multihash().len(), 34);
    }

    #[test]
    fn test_text_form_is_base32() {
        let cid = Cid::sha256(codec::DAG_CBOR, b"hello");
        let text = cid.to_string();

        // dag-cbor v1 CIDs always start with "bafyrei"
        assert!(text.starts_with("bafyrei"), "{}", text);
        assert_eq!(text.parse::<Cid>().unwrap(), cid);
    }

    #[test]
    fn test_base58_input_normalises_to_base32() {
        let cid = Cid::sha256(codec::DAG_JOSE, b"commit");
        let z = multibase::encode(Base::Base58Btc, &cid.to_bytes());

        let parsed: Cid = z.parse().unwrap();
        assert_eq!(parsed, cid);
        assert_eq!(parsed.to_string(), cid.to_string());
    }

    #[test]
    fn test_v0_cid() {
        let v1 = Cid::sha256(codec::DAG_PB, b"legacy");
        let v0_text = Base::Base58Btc.encode_raw(v1.multihash());
        assert!(v0_text.starts_with("Qm"));

        let v0: Cid = v0_text.parse().unwrap();
        assert_eq!(v0.version(), 0);
        assert_eq!(v0.to_string(), v0_text);
    }

    #[test]
    fn test_rejects_truncated_and_trailing_bytes() {
        let cid = Cid::sha256(codec::DAG_CBOR, b"x");
        let bytes = cid.to_bytes();

        assert!(Cid::from_bytes(&bytes[..bytes.len() - 1]).is_err());

        let mut long = bytes.clone();
        long.push(0);
        assert!(Cid::from_bytes(&long).is_err());
    }

    #[test]
    fn test_serde_uses_text_form() {
        let cid = Cid::sha256(codec::DAG_CBOR, b"serde");
        let json = serde_json::to_string(&cid).unwrap();
        assert_eq!(json, format!("\"{}\"", cid));

        let back: Cid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cid);
    }
}
