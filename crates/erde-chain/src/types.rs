use std::collections::BTreeMap;

pub use ethereum_types::{Address, U256};
use tiny_keccak::{Hasher, Keccak};

use crate::error::ChainError;

/// A user's on-chain positions pinned at a single block height.
///
/// `timestamp` is diagnostic only (stamped at read time) and must never
/// feed the Merkle root.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct UserSnapshot {
    pub address: Address,
    pub debt: U256,
    pub lp_shares: BTreeMap<Address, U256>,
    pub sp_shares: U256,
    pub timestamp: i64,
}

/// Contracts this engine reads from and writes to, pinned by configuration.
#[derive(Debug, Clone)]
pub struct ChainAddresses {
    pub vault: Address,
    pub stability_pool: Address,
    pub reward_distributor: Address,
    pub emission_manager: Address,
    pub lp_tokens: Vec<Address>,
}

/// `end >= start`.
pub fn validate_block_range(start: u64, end: u64) -> Result<(), ChainError> {
    if end < start {
        return Err(ChainError::InvalidBlockRange { start, end });
    }
    Ok(())
}

/// EIP-55 mixed-case checksum of a 20-byte address.
pub fn to_checksum(address: &Address) -> String {
    let lower = hex::encode(address.as_bytes());
    let mut hasher = Keccak::v256();
    let mut digest = [0u8; 32];
    hasher.update(lower.as_bytes());
    hasher.finalize(&mut digest);

    let mut checksummed = String::with_capacity(42);
    checksummed.push_str("0x");
    for (i, ch) in lower.chars().enumerate() {
        if ch.is_ascii_alphabetic() {
            let nibble = digest[i / 2];
            let bit = if i % 2 == 0 { nibble >> 4 } else { nibble & 0x0f };
            if bit >= 8 {
                checksummed.push(ch.to_ascii_uppercase());
            } else {
                checksummed.push(ch);
            }
        } else {
            checksummed.push(ch);
        }
    }
    checksummed
}

/// Parses a `0x`-prefixed address and requires it match its EIP-55 checksum
/// unless it was given in all-lowercase (the common "unchecksummed" form).
pub fn parse_checksummed_address(raw: &str) -> Result<Address, ChainError> {
    let trimmed = raw.strip_prefix("0x").unwrap_or(raw);
    if trimmed.len() != 40 || !trimmed.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ChainError::MalformedAddress(raw.to_string()));
    }
    let all_same_case =
        trimmed == trimmed.to_ascii_lowercase() || trimmed == trimmed.to_ascii_uppercase();
    let bytes = hex::decode(trimmed).map_err(|_| ChainError::MalformedAddress(raw.to_string()))?;
    let address = Address::from_slice(&bytes);
    if !all_same_case && to_checksum(&address) != format!("0x{trimmed}") {
        return Err(ChainError::MalformedAddress(raw.to_string()));
    }
    Ok(address)
}

pub fn selector(signature: &str) -> [u8; 4] {
    let mut hasher = Keccak::v256();
    let mut digest = [0u8; 32];
    hasher.update(signature.as_bytes());
    hasher.finalize(&mut digest);
    [digest[0], digest[1], digest[2], digest[3]]
}

pub fn encode_address(address: &Address) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_bytes());
    word
}

pub fn encode_u256(value: U256) -> [u8; 32] {
    let mut word = [0u8; 32];
    value.to_big_endian(&mut word);
    word
}

pub fn decode_address(word: &[u8]) -> Address {
    Address::from_slice(&word[12..32])
}

/// Parses a raw hex secp256k1 private key (`ADMIN_PRIVATE_KEY`). Shared by
/// [`address_from_private_key`] and the submitter, which signs
/// `setMerkleRoot` locally with the same key before broadcasting it.
pub fn secret_key_from_private_key(hex_key: &str) -> Result<secp256k1::SecretKey, ChainError> {
    let trimmed = hex_key.strip_prefix("0x").unwrap_or(hex_key);
    let bytes = hex::decode(trimmed).map_err(|_| ChainError::MalformedAddress(hex_key.to_string()))?;
    secp256k1::SecretKey::from_slice(&bytes)
        .map_err(|_| ChainError::MalformedAddress("invalid secp256k1 private key".to_string()))
}

/// Derives the Ethereum address controlled by a secp256k1 secret key
/// (`keccak256(pubkey)[12..]`, standard Ethereum account derivation).
pub fn address_from_secret_key(secret: &secp256k1::SecretKey) -> Address {
    let secp = secp256k1::Secp256k1::new();
    let public = secp256k1::PublicKey::from_secret_key(&secp, secret);
    let uncompressed = public.serialize_uncompressed();

    let mut hasher = Keccak::v256();
    let mut digest = [0u8; 32];
    hasher.update(&uncompressed[1..]);
    hasher.finalize(&mut digest);
    decode_address(&digest)
}

/// Derives the Ethereum address controlled by a raw secp256k1 private key.
/// Used wherever only the address is needed, e.g. comparing against the
/// distributor's on-chain owner.
pub fn address_from_private_key(hex_key: &str) -> Result<Address, ChainError> {
    let secret = secret_key_from_private_key(hex_key)?;
    Ok(address_from_secret_key(&secret))
}
