//! Stream and commit identifiers.
//!
//! Binary layouts (multibase base36-lower, `k` prefix):
//!
//! ```text
//! StreamId: varint(0xce) || varint(type) || genesis CID
//! CommitId: varint(0xce) || varint(type) || genesis CID || (0x00 | commit CID)
//! ```
//!
//! A zero byte in the commit slot means "the genesis commit".

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::cid::{put_varint, read_varint, Cid};
use crate::error::{CoreError, Result};
use crate::multibase::{self, Base};

/// Multicodec code prefixing stream and commit ids.
pub const STREAMID_CODEC: u64 = 0xce;

/// Stream type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u64)]
pub enum StreamType {
    Tile = 0,
    Caip10Link = 1,
    Model = 2,
    ModelInstanceDocument = 3,
    Unloadable = 4,
}

impl StreamType {
    /// Numeric code on the wire.
    pub const fn code(self) -> u64 {
        self as u64
    }

    /// Look up a stream type by code.
    pub fn from_code(code: u64) -> Result<Self> {
        match code {
            0 => Ok(StreamType::Tile),
            1 => Ok(StreamType::Caip10Link),
            2 => Ok(StreamType::Model),
            3 => Ok(StreamType::ModelInstanceDocument),
            4 => Ok(StreamType::Unloadable),
            other => Err(CoreError::UnknownStreamType(other)),
        }
    }
}

/// Identifier of a stream, derived from its genesis commit.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId {
    stream_type: StreamType,
    genesis: Cid,
}

impl StreamId {
    /// Create a stream id from its type and genesis CID.
    pub fn new(stream_type: StreamType, genesis: Cid) -> Self {
        Self {
            stream_type,
            genesis,
        }
    }

    /// The stream type.
    pub fn stream_type(&self) -> StreamType {
        self.stream_type
    }

    /// CID of the genesis commit.
    pub fn genesis(&self) -> &Cid {
        &self.genesis
    }

    /// Pin this stream at a commit.
    pub fn at_commit(&self, commit: Cid) -> CommitId {
        CommitId::new(self.clone(), commit)
    }

    /// Binary form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(48);
        put_varint(&mut bytes, STREAMID_CODEC);
        put_varint(&mut bytes, self.stream_type.code());
        bytes.extend_from_slice(&self.genesis.to_bytes());
        bytes
    }

    /// Parse a complete binary stream id.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut input = bytes;
        let id = Self::read_from(&mut input)?;
        if !input.is_empty() {
            return Err(CoreError::InvalidStreamId(
                "trailing bytes after genesis CID (is this a commit id?)".into(),
            ));
        }
        Ok(id)
    }

    fn read_from(input: &mut &[u8]) -> Result<Self> {
        let codec = read_varint(input)?;
        if codec != STREAMID_CODEC {
            return Err(CoreError::InvalidStreamId(format!(
                "expected codec 0x{:x}, got 0x{:x}",
                STREAMID_CODEC, codec
            )));
        }
        let stream_type = StreamType::from_code(read_varint(input)?)?;
        let genesis = Cid::read_from(input)?;
        Ok(Self {
            stream_type,
            genesis,
        })
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", multibase::encode(Base::Base36Lower, &self.to_bytes()))
    }
}

impl fmt::Debug for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StreamId({})", self)
    }
}

impl FromStr for StreamId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let (_, bytes) = multibase::decode(s)?;
        Self::from_bytes(&bytes)
    }
}

/// A stream pinned at one commit.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CommitId {
    stream_id: StreamId,
    /// `None` when pinned at genesis.
    commit: Option<Cid>,
}

impl CommitId {
    /// Create a commit id. A commit equal to the genesis CID is stored as genesis.
    pub fn new(stream_id: StreamId, commit: Cid) -> Self {
        let commit = if &commit == stream_id.genesis() {
            None
        } else {
            Some(commit)
        };
        Self { stream_id, commit }
    }

    /// The stream this commit belongs to.
    pub fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    /// The commit CID; the genesis CID when pinned at genesis.
    pub fn commit(&self) -> &Cid {
        self.commit.as_ref().unwrap_or(&self.stream_id.genesis)
    }

    /// Whether this points at the genesis commit.
    pub fn is_genesis(&self) -> bool {
        self.commit.is_none()
    }

    /// Binary form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.stream_id.to_bytes();
        match &self.commit {
            Some(cid) => bytes.extend_from_slice(&cid.to_bytes()),
            None => bytes.push(0x00),
        }
        bytes
    }

    /// Parse a complete binary commit id.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut input = bytes;
        let stream_id = StreamId::read_from(&mut input)?;

        if input.is_empty() {
            return Err(CoreError::InvalidStreamId(
                "commit id is missing its commit slot".into(),
            ));
        }

        let commit = if input == [0x00u8].as_slice() {
            None
        } else {
            let cid = Cid::read_from(&mut input)?;
            if !input.is_empty() {
                return Err(CoreError::InvalidStreamId(
                    "trailing bytes after commit CID".into(),
                ));
            }
            Some(cid)
        };

        Ok(Self { stream_id, commit })
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", multibase::encode(Base::Base36Lower, &self.to_bytes()))
    }
}

impl fmt::Debug for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommitId({})", self)
    }
}

impl FromStr for CommitId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let (_, bytes) = multibase::decode(s)?;
        Self::from_bytes(&bytes)
    }
}

macro_rules! serde_via_string {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(
                deserializer: D,
            ) -> std::result::Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

serde_via_string!(StreamId);
serde_via_string!(CommitId);
