//! `did:key` identities and JWS signing.
//!
//! An [`Identity`] is an Ed25519 signing key together with its `did:key`.
//! Writes and admin calls against a node are authenticated by signing a
//! JWS with that key (`alg: EdDSA`, `kid: <did>#<fragment>`).

use std::fmt;
use std::str::FromStr;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::multibase::{self, Base};

/// Multicodec prefix for an ed25519 public key (`0xed` as varint).
const ED25519_PUB_PREFIX: [u8; 2] = [0xed, 0x01];
const DID_KEY_PREFIX: &str = "did:key:";

/// A 32-byte seed from which an identity is derived.
#[derive(Clone, PartialEq, Eq)]
pub struct Seed([u8; 32]);

impl Seed {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl FromStr for Seed {
    type Err = CoreError;

    /// Parse a 64-character hex string, with or without `0x`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| CoreError::InvalidSeed(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| CoreError::InvalidSeed(format!("expected 32 bytes, got {}", b.len())))?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Seed(<redacted>)")
    }
}

/// A `did:key` decentralized identifier for an Ed25519 key.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DidKey(String);

impl DidKey {
    /// Derive the did for a public key.
    pub fn from_public_key(key: &VerifyingKey) -> Self {
        let mut bytes = Vec::with_capacity(34);
        bytes.extend_from_slice(&ED25519_PUB_PREFIX);
        bytes.extend_from_slice(key.as_bytes());
        Self(format!("{}{}", DID_KEY_PREFIX, multibase::encode(Base::Base58Btc, &bytes)))
    }

    /// The full did string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The method-specific id (`z6Mk…`), used as the key fragment.
    pub fn fragment(&self) -> &str {
        &self.0[DID_KEY_PREFIX.len()..]
    }

    /// The verification method id: `did:key:z…#z…`.
    pub fn key_id(&self) -> String {
        format!("{}#{}", self.0, self.fragment())
    }

    /// Recover the Ed25519 public key.
    pub fn public_key(&self) -> Result<VerifyingKey> {
        let (base, bytes) = multibase::decode(self.fragment())?;
        if base != Base::Base58Btc {
            return Err(CoreError::InvalidDid("did:key must be base58btc".into()));
        }
        let key = bytes
            .strip_prefix(&ED25519_PUB_PREFIX[..])
            .ok_or_else(|| CoreError::InvalidDid("not an ed25519 did:key".into()))?;
        let key: [u8; 32] = key
            .try_into()
            .map_err(|_| CoreError::InvalidDid("ed25519 key must be 32 bytes".into()))?;
        VerifyingKey::from_bytes(&key).map_err(|e| CoreError::InvalidDid(e.to_string()))
    }
}

impl FromStr for DidKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        if !s.starts_with(DID_KEY_PREFIX) || s.len() <= DID_KEY_PREFIX.len() {
            return Err(CoreError::InvalidDid(format!("not a did:key: {}", s)));
        }
        let did = Self(s.to_string());
        did.public_key()?;
        Ok(did)
    }
}

impl TryFrom<String> for DidKey {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<DidKey> for String {
    fn from(did: DidKey) -> Self {
        did.0
    }
}

impl fmt::Display for DidKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for DidKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DidKey({})", self.0)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct JwsHeader {
    alg: String,
    kid: String,
}

/// One signature of a general-serialization JWS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwsSignature {
    pub protected: String,
    pub signature: String,
}

/// A JWS in general JSON serialization, as carried in signed commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneralJws {
    pub payload: String,
    pub signatures: Vec<JwsSignature>,
}

impl GeneralJws {
    /// Collapse to compact form using the first signature.
    pub fn to_compact(&self) -> Result<String> {
        let sig = self
            .signatures
            .first()
            .ok_or_else(|| CoreError::InvalidJws("no signatures".into()))?;
        Ok(format!("{}.{}.{}", sig.protected, self.payload, sig.signature))
    }
}

/// An Ed25519 identity that can authenticate writes.
pub struct Identity {
    signing_key: SigningKey,
    did: DidKey,
}

impl Identity {
    /// Derive an identity from a seed.
    pub fn from_seed(seed: &Seed) -> Self {
        let signing_key = SigningKey::from_bytes(seed.as_bytes());
        let did = DidKey::from_public_key(&signing_key.verifying_key());
        Self { signing_key, did }
    }

    /// Generate a random identity.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut rand::rngs::OsRng);
        let did = DidKey::from_public_key(&signing_key.verifying_key());
        Self { signing_key, did }
    }

    /// The identity's did.
    pub fn did(&self) -> &DidKey {
        &self.did
    }

    /// Sign `payload` and return the general-serialization JWS.
    pub fn sign_general(&self, payload: &[u8]) -> Result<GeneralJws> {
        let header = JwsHeader {
            alg: "EdDSA".into(),
            kid: self.did.key_id(),
        };
        let protected = b64url(&serde_json::to_vec(&header)?);
        let payload = b64url(payload);

        let signing_input = format!("{}.{}", protected, payload);
        let signature = self.signing_key.sign(signing_input.as_bytes());

        Ok(GeneralJws {
            payload,
            signatures: vec![JwsSignature {
                protected,
                signature: b64url(&signature.to_bytes()),
            }],
        })
    }

    /// Sign `payload` and return the compact JWS.
    pub fn sign_jws(&self, payload: &[u8]) -> Result<String> {
        self.sign_general(payload)?.to_compact()
    }

    /// Sign the JSON encoding of `value` and return the compact JWS.
    pub fn sign_json<T: Serialize>(&self, value: &T) -> Result<String> {
        self.sign_jws(&serde_json::to_vec(value)?)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.did)
    }
}

/// Verify a compact JWS against the `did:key` named in its `kid`.
///
/// Returns the signer and the decoded payload.
pub fn verify_jws(compact: &str) -> Result<(DidKey, Vec<u8>)> {
    let mut parts = compact.split('.');
    let (protected, payload, signature) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(p), Some(s), None) => (h, p, s),
        _ => return Err(CoreError::InvalidJws("expected three segments".into())),
    };

    let header: JwsHeader = serde_json::from_slice(&b64url_decode(protected)?)?;
    if header.alg != "EdDSA" {
        return Err(CoreError::InvalidJws(format!("unsupported alg {}", header.alg)));
    }
    let did_str = header.kid.split('#').next().unwrap_or_default();
    let did: DidKey = did_str.parse()?;

    let sig_bytes = b64url_decode(signature)?;
    let sig = Signature::from_slice(&sig_bytes).map_err(|_| CoreError::SignatureFailed)?;

    let signing_input = format!("{}.{}", protected, payload);
    did.public_key()?
        .verify(signing_input.as_bytes(), &sig)
        .map_err(|_| CoreError::SignatureFailed)?;

    Ok((did, b64url_decode(payload)?))
}

fn b64url(data: &[u8]) -> String {
    base64::encode_config(data, base64::URL_SAFE_NO_PAD)
}

fn b64url_decode(data: &str) -> Result<Vec<u8>> {
    base64::decode_config(data, base64::URL_SAFE_NO_PAD)
        .map_err(|e| CoreError::InvalidJws(e.to_string()))
}
