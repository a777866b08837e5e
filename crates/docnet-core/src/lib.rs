//! # Docnet Core
//!
//! Pure primitives shared by the docnet suite: content identifiers, stream
//! and commit identifiers, and `did:key` identities.
//!
//! This crate contains no I/O and no networking. Everything here is
//! computation over identifiers and keys.
//!
//! ## Key Types
//!
//! - [`Cid`] - Content identifier of a commit block
//! - [`StreamId`] - Identifier of a stream (model or document)
//! - [`CommitId`] - A stream pinned at one commit; `commit()` is the tip
//! - [`Identity`] - Ed25519 key with its `did:key` and JWS signing
//!
//! ## Text Forms
//!
//! All identifiers use multibase text forms. CIDs render as base32-lower
//! (`b…`), stream and commit ids as base36-lower (`k…`). Two values are
//! equal exactly when their canonical text forms are equal.

pub mod cid;
pub mod error;
pub mod identity;
pub mod multibase;
pub mod stream_id;

pub use cid::{codec, Cid, SHA2_256};
pub use error::{CoreError, Result};
pub use identity::{verify_jws, DidKey, GeneralJws, Identity, JwsSignature, Seed};
pub use multibase::Base;
pub use stream_id::{CommitId, StreamId, StreamType, STREAMID_CODEC};
