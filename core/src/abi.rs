//! Contract ABI encoding and decoding
//!
//! This is the single place where ledger-native 256-bit words are turned
//! into plain Rust integers. Everything above this layer works with `u64`
//! ids and counts and `i64` unix timestamps.

use sha3::{Digest, Keccak256};
use thiserror::Error;

use crate::address::Address;

const WORD: usize = 32;

/// `Error(string)` revert payload selector
pub const ERROR_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// `Panic(uint256)` revert payload selector
pub const PANIC_SELECTOR: [u8; 4] = [0x4e, 0x48, 0x7b, 0x71];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AbiError {
    #[error("Return data too short: need {need} bytes, have {have}")]
    OutOfBounds { need: usize, have: usize },

    #[error("Integer does not fit in 64 bits")]
    Overflow,

    #[error("Invalid boolean word")]
    InvalidBool,

    #[error("Invalid address word")]
    InvalidAddress,

    #[error("String is not valid UTF-8")]
    InvalidUtf8,
}

pub type Result<T> = std::result::Result<T, AbiError>;

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// First four bytes of the Keccak-256 hash of a canonical signature,
/// e.g. `vote(uint256,uint256)`.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// A value passed to or returned from the contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Uint(u64),
    Address(Address),
    Bool(bool),
    String(String),
    /// Dynamic array of static elements
    Array(Vec<Token>),
}

impl Token {
    fn is_dynamic(&self) -> bool {
        matches!(self, Token::String(_) | Token::Array(_))
    }

    fn static_word(&self) -> [u8; WORD] {
        let mut word = [0u8; WORD];
        match self {
            Token::Uint(v) => word[24..].copy_from_slice(&v.to_be_bytes()),
            Token::Address(a) => word[12..].copy_from_slice(a.as_bytes()),
            Token::Bool(b) => word[31] = u8::from(*b),
            Token::String(_) | Token::Array(_) => {}
        }
        word
    }

    fn tail(&self) -> Vec<u8> {
        match self {
            Token::String(s) => {
                let bytes = s.as_bytes();
                let mut out = Token::Uint(bytes.len() as u64).static_word().to_vec();
                out.extend_from_slice(bytes);
                out.resize(WORD + padded_len(bytes.len()), 0);
                out
            }
            Token::Array(items) => {
                let mut out = Token::Uint(items.len() as u64).static_word().to_vec();
                for item in items {
                    out.extend_from_slice(&item.static_word());
                }
                out
            }
            _ => Vec::new(),
        }
    }
}

fn padded_len(len: usize) -> usize {
    len.div_ceil(WORD) * WORD
}

/// Encode a tuple of tokens (head/tail layout, no selector)
pub fn encode(tokens: &[Token]) -> Vec<u8> {
    let head_len = tokens.len() * WORD;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for token in tokens {
        if token.is_dynamic() {
            let offset = (head_len + tail.len()) as u64;
            head.extend_from_slice(&Token::Uint(offset).static_word());
            tail.extend_from_slice(&token.tail());
        } else {
            head.extend_from_slice(&token.static_word());
        }
    }

    head.extend_from_slice(&tail);
    head
}

/// Selector followed by the encoded arguments
pub fn encode_call(signature: &str, args: &[Token]) -> Vec<u8> {
    let mut data = selector(signature).to_vec();
    data.extend_from_slice(&encode(args));
    data
}

/// Reads values out of a flat return tuple by slot index
pub struct Decoder<'a> {
    data: &'a [u8],
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn word_at(&self, offset: usize) -> Result<&'a [u8]> {
        let end = offset.checked_add(WORD).ok_or(AbiError::Overflow)?;
        self.data.get(offset..end).ok_or(AbiError::OutOfBounds {
            need: end,
            have: self.data.len(),
        })
    }

    fn u64_at(&self, offset: usize) -> Result<u64> {
        word_to_u64(self.word_at(offset)?)
    }

    pub fn uint(&self, slot: usize) -> Result<u64> {
        self.u64_at(slot * WORD)
    }

    /// Unix timestamp stored as uint256
    pub fn timestamp(&self, slot: usize) -> Result<i64> {
        i64::try_from(self.uint(slot)?).map_err(|_| AbiError::Overflow)
    }

    pub fn bool(&self, slot: usize) -> Result<bool> {
        match self.uint(slot) {
            Ok(0) => Ok(false),
            Ok(1) => Ok(true),
            Ok(_) | Err(AbiError::Overflow) => Err(AbiError::InvalidBool),
            Err(e) => Err(e),
        }
    }

    pub fn address(&self, slot: usize) -> Result<Address> {
        word_to_address(self.word_at(slot * WORD)?)
    }

    pub fn string(&self, slot: usize) -> Result<String> {
        let offset = self.uint(slot)? as usize;
        let len = self.u64_at(offset)? as usize;
        let start = offset + WORD;
        let end = start.checked_add(len).ok_or(AbiError::Overflow)?;
        let bytes = self.data.get(start..end).ok_or(AbiError::OutOfBounds {
            need: end,
            have: self.data.len(),
        })?;
        String::from_utf8(bytes.to_vec()).map_err(|_| AbiError::InvalidUtf8)
    }

    fn array_words(&self, slot: usize) -> Result<Vec<&'a [u8]>> {
        let offset = self.uint(slot)? as usize;
        let len = self.u64_at(offset)? as usize;
        (0..len)
            .map(|i| self.word_at(offset + WORD + i * WORD))
            .collect()
    }

    pub fn uint_array(&self, slot: usize) -> Result<Vec<u64>> {
        self.array_words(slot)?
            .into_iter()
            .map(word_to_u64)
            .collect()
    }

    pub fn address_array(&self, slot: usize) -> Result<Vec<Address>> {
        self.array_words(slot)?
            .into_iter()
            .map(word_to_address)
            .collect()
    }
}

fn word_to_u64(word: &[u8]) -> Result<u64> {
    if word[..24].iter().any(|b| *b != 0) {
        return Err(AbiError::Overflow);
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&word[24..]);
    Ok(u64::from_be_bytes(buf))
}

fn word_to_address(word: &[u8]) -> Result<Address> {
    if word[..12].iter().any(|b| *b != 0) {
        return Err(AbiError::InvalidAddress);
    }
    let mut buf = [0u8; 20];
    buf.copy_from_slice(&word[12..]);
    Ok(Address::new(buf))
}

/// Human-readable reason from revert data, if it carries one
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    if data.len() < 4 {
        return None;
    }
    let (selector, payload) = data.split_at(4);
    let decoder = Decoder::new(payload);
    if selector == ERROR_SELECTOR {
        decoder.string(0).ok()
    } else if selector == PANIC_SELECTOR {
        decoder.uint(0).ok().map(|code| format!("Panic code {:#x}", code))
    } else {
        None
    }
}
