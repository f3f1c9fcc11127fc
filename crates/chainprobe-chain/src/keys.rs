//! Signing keys and the account addresses derived from them.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use blake2::Blake2b;
use blake2::digest::consts::U32;
use ed25519_dalek::{Signer, SigningKey};
use k256::ecdsa::SigningKey as Secp256k1Key;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use sha3::{Digest, Keccak256, Sha3_256};

use crate::error::KeyError;

type Blake2b256 = Blake2b<U32>;

/// Signature scheme flag for ed25519 in keystores and serialized signatures.
pub const ED25519_FLAG: u8 = 0x00;

/// Human-readable part of bech32 private key exports.
const SUI_PRIVATE_KEY_HRP: &str = "suiprivkey";

const SECRET_LEN: usize = 32;
const KEYPAIR_LEN: usize = 64;

/// An ed25519 secret key. `Debug` never prints key material.
#[derive(Clone)]
pub struct Ed25519Signer {
    key: SigningKey,
}

impl Ed25519Signer {
    pub fn from_bytes(secret: &[u8]) -> Result<Self, KeyError> {
        let secret: [u8; SECRET_LEN] = secret
            .try_into()
            .map_err(|_| KeyError::Length(secret.len()))?;
        Ok(Self {
            key: SigningKey::from_bytes(&secret),
        })
    }

    /// Parse a hex secret, tolerating `0x` and `ed25519-priv-` prefixes.
    pub fn from_hex(input: &str) -> Result<Self, KeyError> {
        let trimmed = input.trim();
        let trimmed = trimmed.strip_prefix("ed25519-priv-").unwrap_or(trimmed);
        let trimmed = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(trimmed).map_err(|e| KeyError::Hex(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Parse a Sui key: a `suiprivkey1...` export, a keystore entry
    /// (base64 of `flag || secret`) or plain hex.
    pub fn from_sui_keystore(input: &str) -> Result<Self, KeyError> {
        let trimmed = input.trim();
        if trimmed.to_ascii_lowercase().starts_with(SUI_PRIVATE_KEY_HRP) {
            return Self::from_sui_bech32(trimmed);
        }
        if trimmed.starts_with("0x") || trimmed.len() == SECRET_LEN * 2 {
            return Self::from_hex(trimmed);
        }

        let bytes = BASE64
            .decode(trimmed)
            .map_err(|e| KeyError::Base64(e.to_string()))?;
        Self::from_flagged(&bytes)
    }

    /// Parse a bech32 `suiprivkey1...` export, whose payload is
    /// `flag || secret`.
    pub fn from_sui_bech32(input: &str) -> Result<Self, KeyError> {
        let (hrp, bytes) =
            bech32::decode(input.trim()).map_err(|e| KeyError::Bech32(e.to_string()))?;
        if hrp.to_lowercase() != SUI_PRIVATE_KEY_HRP {
            return Err(KeyError::Prefix(hrp.to_lowercase()));
        }
        Self::from_flagged(&bytes)
    }

    /// Parse a base58 keypair export (`secret || public`) or a bare
    /// base58 secret.
    pub fn from_base58_keypair(input: &str) -> Result<Self, KeyError> {
        let bytes = bs58::decode(input.trim())
            .into_vec()
            .map_err(|e| KeyError::Base58(e.to_string()))?;
        Self::from_keypair_bytes(&bytes)
    }

    /// Parse an `ed25519:<base58>` key string. The scheme prefix is
    /// optional; any other scheme is rejected.
    pub fn from_near_key(input: &str) -> Result<Self, KeyError> {
        let trimmed = input.trim();
        let encoded = match trimmed.split_once(':') {
            Some(("ed25519", encoded)) => encoded,
            Some((scheme, _)) => return Err(KeyError::Prefix(scheme.to_string())),
            None => trimmed,
        };
        Self::from_base58_keypair(encoded)
    }

    fn from_flagged(bytes: &[u8]) -> Result<Self, KeyError> {
        match bytes.split_first() {
            Some((&ED25519_FLAG, secret)) if secret.len() == SECRET_LEN => Self::from_bytes(secret),
            Some((&ED25519_FLAG, secret)) => Err(KeyError::Length(secret.len())),
            Some((&flag, _)) if bytes.len() == SECRET_LEN + 1 => Err(KeyError::Scheme(flag)),
            _ => Err(KeyError::Length(bytes.len())),
        }
    }

    fn from_keypair_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        match bytes.len() {
            SECRET_LEN => Self::from_bytes(bytes),
            KEYPAIR_LEN => {
                let (secret, public) = bytes.split_at(SECRET_LEN);
                let signer = Self::from_bytes(secret)?;
                if signer.public_key_bytes().as_slice() != public {
                    return Err(KeyError::KeypairMismatch);
                }
                Ok(signer)
            }
            other => Err(KeyError::Length(other)),
        }
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.key.verifying_key().to_bytes()
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.key.sign(message).to_bytes()
    }

    /// Single-signer account address: `sha3-256(pubkey || 0x00)`.
    pub fn aptos_address(&self) -> String {
        let mut hasher = Sha3_256::new();
        hasher.update(self.public_key_bytes());
        hasher.update([ED25519_FLAG]);
        format!("0x{}", hex::encode(hasher.finalize()))
    }

    /// Object-model account address: `blake2b-256(0x00 || pubkey)`.
    pub fn sui_address(&self) -> String {
        let mut hasher = Blake2b256::new();
        hasher.update([ED25519_FLAG]);
        hasher.update(self.public_key_bytes());
        format!("0x{}", hex::encode(hasher.finalize()))
    }

    /// Base58 public key, which doubles as the account address.
    pub fn base58_public_key(&self) -> String {
        bs58::encode(self.public_key_bytes()).into_string()
    }
}

impl fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ed25519Signer")
            .field("public_key", &hex::encode(self.public_key_bytes()))
            .finish_non_exhaustive()
    }
}

/// A secp256k1 secret key for EVM transactions. `Debug` prints the
/// derived address only.
#[derive(Clone)]
pub struct Secp256k1Signer {
    key: Secp256k1Key,
    address: [u8; 20],
}

impl Secp256k1Signer {
    /// Parse a 32-byte hex secret, with or without `0x`.
    pub fn from_hex(input: &str) -> Result<Self, KeyError> {
        let trimmed = input.trim();
        let trimmed = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(trimmed).map_err(|e| KeyError::Hex(e.to_string()))?;
        if bytes.len() != SECRET_LEN {
            return Err(KeyError::Length(bytes.len()));
        }
        let key = Secp256k1Key::from_slice(&bytes).map_err(|_| KeyError::Secp256k1)?;

        let point = key.verifying_key().as_affine().to_encoded_point(false);
        let hash = keccak256(&point.as_bytes()[1..]);
        let mut address = [0u8; 20];
        address.copy_from_slice(&hash[12..]);
        Ok(Self { key, address })
    }

    pub fn address_bytes(&self) -> [u8; 20] {
        self.address
    }

    /// Lowercase `0x`-prefixed address.
    pub fn address(&self) -> String {
        format!("0x{}", hex::encode(self.address))
    }

    /// Sign a 32-byte digest. Returns `r || s` (low-s) and the recovery id.
    pub fn sign_digest(&self, digest: &[u8; 32]) -> Result<([u8; 64], u8), KeyError> {
        let (signature, recovery) = self
            .key
            .sign_prehash_recoverable(digest)
            .map_err(|_| KeyError::Secp256k1)?;
        let mut rs = [0u8; 64];
        rs.copy_from_slice(&signature.to_bytes());
        Ok((rs, recovery.to_byte()))
    }
}

impl fmt::Debug for Secp256k1Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secp256k1Signer")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// Blake2b-256 digest, used for intent-message signing.
pub fn blake2b256(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}
