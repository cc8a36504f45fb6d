//! 256-bit byte sets for O(1) membership testing
//!
//! `Set`, `NSet`, `OSet` and `RSet` test the next input byte against one of
//! these, and the bit-plane jump tables are built from them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A set of bytes stored as a 256-bit bitmap
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ByteSet {
    bits: [u64; 4],
}

impl ByteSet {
    /// Create an empty set
    #[inline]
    pub const fn new() -> Self {
        Self { bits: [0; 4] }
    }

    /// Create the set of all bytes
    #[inline]
    pub const fn full() -> Self {
        Self { bits: [u64::MAX; 4] }
    }

    /// Create a set from a list of bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut set = Self::new();
        for &b in bytes {
            set.insert(b);
        }
        set
    }

    /// Create a set from an inclusive byte range
    pub fn from_range(lo: u8, hi: u8) -> Self {
        let mut set = Self::new();
        for b in lo..=hi {
            set.insert(b);
        }
        set
    }

    /// Create a set of every byte satisfying `pred`
    pub fn from_fn(pred: impl Fn(u8) -> bool) -> Self {
        let mut set = Self::new();
        for b in 0..=255u8 {
            if pred(b) {
                set.insert(b);
            }
        }
        set
    }

    /// `[0-9]`
    pub fn ascii_digit() -> Self {
        Self::from_range(b'0', b'9')
    }

    /// `[ \t\r\n]`
    pub fn ascii_whitespace() -> Self {
        Self::from_bytes(b" \t\r\n")
    }

    /// `[a-zA-Z]`
    pub fn ascii_alphabetic() -> Self {
        Self::from_range(b'a', b'z').union(&Self::from_range(b'A', b'Z'))
    }

    /// Add a byte
    #[inline]
    pub fn insert(&mut self, b: u8) {
        self.bits[(b >> 6) as usize] |= 1u64 << (b & 63);
    }

    /// Remove a byte
    #[inline]
    pub fn remove(&mut self, b: u8) {
        self.bits[(b >> 6) as usize] &= !(1u64 << (b & 63));
    }

    /// Check if a byte is in the set
    #[inline(always)]
    pub fn contains(&self, b: u8) -> bool {
        self.bits[(b >> 6) as usize] & (1u64 << (b & 63)) != 0
    }

    /// Union of two sets
    #[inline]
    pub fn union(&self, other: &Self) -> Self {
        let mut bits = self.bits;
        for (a, b) in bits.iter_mut().zip(other.bits.iter()) {
            *a |= b;
        }
        Self { bits }
    }

    /// Complement of this set
    #[inline]
    pub fn complement(&self) -> Self {
        Self {
            bits: self.bits.map(|w| !w),
        }
    }

    /// Number of bytes in the set
    #[inline]
    pub fn len(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Whether the set is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bits == [0; 4]
    }

    /// Iterate over the bytes in ascending order
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=255u8).filter(move |&b| self.contains(b))
    }
}

impl fmt::Debug for ByteSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ByteSet{}", self)
    }
}

/// Ranges in bracket notation, e.g. `[0-9a-f]`
impl fmt::Display for ByteSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::from("[");
        let mut b = 0u16;
        while b < 256 {
            if !self.contains(b as u8) {
                b += 1;
                continue;
            }
            let lo = b as u8;
            while b < 256 && self.contains(b as u8) {
                b += 1;
            }
            let hi = (b - 1) as u8;
            out.push_str(&escape(lo));
            if hi > lo {
                out.push('-');
                out.push_str(&escape(hi));
            }
        }
        out.push(']');
        f.write_str(&out)
    }
}

fn escape(b: u8) -> String {
    match b {
        b'-' | b']' | b'\\' => format!("\\{}", b as char),
        0x21..=0x7e => (b as char).to_string(),
        _ => format!("\\x{:02x}", b),
    }
}
