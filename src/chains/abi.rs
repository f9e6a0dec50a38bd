//! Minimal Solidity ABI codec
//!
//! Covers exactly what the vault client calls: function selectors, static
//! `address`/`uint256` arguments, dynamic `address[]`/`uint256[]` arguments,
//! and decoding of single `uint256`, `address` and `string` return values.

use anyhow::Result;
use ethereum_types::{Address, U256};
use sha3::{Digest, Keccak256};

/// `Error(string)` selector used by `require`/`revert` with a message.
const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// An argument to an encoded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Address(Address),
    Uint(U256),
    AddressArray(Vec<Address>),
    UintArray(Vec<U256>),
}

/// First four bytes of `keccak256(signature)`.
pub fn selector(signature: &str) -> [u8; 4] {
    let mut hasher = Keccak256::new();
    hasher.update(signature.as_bytes());
    let hash = hasher.finalize();
    [hash[0], hash[1], hash[2], hash[3]]
}

fn word_uint(value: &U256) -> [u8; 32] {
    let mut word = [0u8; 32];
    value.to_big_endian(&mut word);
    word
}

fn word_address(address: &Address) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_bytes());
    word
}

/// Encodes a call: selector followed by head/tail encoded arguments.
///
/// # Arguments
///
/// * `signature` - Canonical signature, e.g. `"approve(address,uint256)"`
/// * `args` - Arguments in declaration order
pub fn encode_call(signature: &str, args: &[Token]) -> Vec<u8> {
    let head_len = 32 * args.len();
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for arg in args {
        match arg {
            Token::Address(address) => head.extend_from_slice(&word_address(address)),
            Token::Uint(value) => head.extend_from_slice(&word_uint(value)),
            Token::AddressArray(items) => {
                head.extend_from_slice(&word_uint(&U256::from(head_len + tail.len())));
                tail.extend_from_slice(&word_uint(&U256::from(items.len())));
                for item in items {
                    tail.extend_from_slice(&word_address(item));
                }
            }
            Token::UintArray(items) => {
                head.extend_from_slice(&word_uint(&U256::from(head_len + tail.len())));
                tail.extend_from_slice(&word_uint(&U256::from(items.len())));
                for item in items {
                    tail.extend_from_slice(&word_uint(item));
                }
            }
        }
    }

    let mut data = Vec::with_capacity(4 + head.len() + tail.len());
    data.extend_from_slice(&selector(signature));
    data.extend_from_slice(&head);
    data.extend_from_slice(&tail);
    data
}

/// Decodes a `0x`-prefixed hex string; `"0x"` decodes to an empty vec.
pub fn decode_hex(value: &str) -> Result<Vec<u8>> {
    let stripped = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(stripped).map_err(|e| anyhow::anyhow!("Invalid hex data '{}': {}", value, e))
}

fn word_at(data: &[u8], index: usize) -> Result<&[u8]> {
    data.get(index * 32..(index + 1) * 32)
        .ok_or_else(|| anyhow::anyhow!("ABI data too short: {} bytes, need word {}", data.len(), index))
}

/// Decodes the first return word as `uint256`.
pub fn decode_uint(data: &[u8]) -> Result<U256> {
    Ok(U256::from_big_endian(word_at(data, 0)?))
}

/// Decodes the first return word as `address`.
pub fn decode_address(data: &[u8]) -> Result<Address> {
    Ok(Address::from_slice(&word_at(data, 0)?[12..]))
}

/// Decodes a `string` return value.
///
/// Some older tokens return `bytes32` for `symbol()`, so a single-word response
/// is read as right-padded bytes.
pub fn decode_string(data: &[u8]) -> Result<String> {
    if data.len() == 32 {
        let trimmed: Vec<u8> = data.iter().copied().take_while(|b| *b != 0).collect();
        return Ok(String::from_utf8_lossy(&trimmed).into_owned());
    }

    let offset = U256::from_big_endian(word_at(data, 0)?);
    if offset > U256::from(data.len()) {
        anyhow::bail!("ABI string offset {} out of range", offset);
    }
    let offset = offset.as_usize();
    let len_word = data
        .get(offset..offset + 32)
        .ok_or_else(|| anyhow::anyhow!("ABI string length word missing"))?;
    let len = U256::from_big_endian(len_word);
    if len > U256::from(data.len()) {
        anyhow::bail!("ABI string length {} out of range", len);
    }
    let len = len.as_usize();
    let bytes = data
        .get(offset + 32..offset + 32 + len)
        .ok_or_else(|| anyhow::anyhow!("ABI string truncated"))?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

/// Extracts the message from `Error(string)` revert data, if that is what it is.
pub fn decode_revert_data(data: &[u8]) -> Option<String> {
    if data.len() < 4 || data[..4] != ERROR_STRING_SELECTOR {
        return None;
    }
    decode_string(&data[4..]).ok()
}
