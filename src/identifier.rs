//! Globally unique 128-bit identifiers.
//!
//! An [`Identifier`] names a component type (or anything else that needs a
//! stable cross-process identity) independently of Rust's own `TypeId`,
//! which is only stable within a single compilation. Two textual forms are
//! supported: 32 hex characters ("simple") and the hyphenated
//! 8-4-4-4-12 layout. Parsing is case-insensitive; formatting can emit
//! either case.

use std::fmt;

/// FxHash's seed, used to mix the two 64-bit halves of an [`Identifier`].
const SEED: u64 = 0x517c_c1b7_2722_0a95;

/// A 128-bit globally unique identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Identifier(u128);

/// Text formatting layout for an [`Identifier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// 32 contiguous hex characters, no separators.
    Simple,
    /// 8-4-4-4-12 hyphenated hex groups.
    Hyphenated,
}

/// Text case for an [`Identifier`]'s formatted output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Case {
    Lower,
    Upper,
}

/// Failure to parse an [`Identifier`] from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidFormat;

impl fmt::Display for InvalidFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "text is not a valid identifier (expected 32 hex chars or 8-4-4-4-12 hyphenated hex)")
    }
}

impl std::error::Error for InvalidFormat {}

impl Identifier {
    /// Construct an identifier directly from its 128-bit value.
    #[inline]
    pub const fn from_u128(value: u128) -> Self {
        Self(value)
    }

    /// The raw 128-bit value.
    #[inline]
    pub const fn as_u128(self) -> u128 {
        self.0
    }

    /// Parse an identifier from either textual layout, case-insensitively.
    pub fn parse(text: &str) -> Result<Self, InvalidFormat> {
        let hex: String = match text.len() {
            32 => {
                if text.contains('-') {
                    return Err(InvalidFormat);
                }
                text.to_owned()
            }
            36 => {
                let bytes = text.as_bytes();
                let hyphen_positions = [8, 13, 18, 23];
                for &p in &hyphen_positions {
                    if bytes[p] != b'-' {
                        return Err(InvalidFormat);
                    }
                }
                let mut hex = String::with_capacity(32);
                for (i, b) in bytes.iter().enumerate() {
                    if hyphen_positions.contains(&i) {
                        continue;
                    }
                    hex.push(*b as char);
                }
                hex
            }
            _ => return Err(InvalidFormat),
        };

        if hex.len() != 32 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(InvalidFormat);
        }

        let value = u128::from_str_radix(&hex, 16).map_err(|_| InvalidFormat)?;
        Ok(Self(value))
    }

    /// Format this identifier using the given layout and case.
    pub fn format(self, layout: Layout, case: Case) -> String {
        let hex = match case {
            Case::Lower => format!("{:032x}", self.0),
            Case::Upper => format!("{:032X}", self.0),
        };
        match layout {
            Layout::Simple => hex,
            Layout::Hyphenated => format!(
                "{}-{}-{}-{}-{}",
                &hex[0..8],
                &hex[8..12],
                &hex[12..16],
                &hex[16..20],
                &hex[20..32]
            ),
        }
    }

    /// The two 64-bit halves, high half first.
    #[inline]
    fn halves(self) -> (u64, u64) {
        ((self.0 >> 64) as u64, self.0 as u64)
    }

    /// FxHash-style 64-bit hash mixing the identifier's two halves.
    ///
    /// Mirrors the construction used throughout this crate's internal
    /// hash maps: rotate-left by 5, xor with the input, multiply by the
    /// seed constant.
    pub fn hash64(self) -> u64 {
        let (hi, lo) = self.halves();
        let h = Self::mix(0, hi);
        Self::mix(h, lo)
    }

    #[inline]
    fn mix(acc: u64, word: u64) -> u64 {
        (acc.rotate_left(5) ^ word).wrapping_mul(SEED)
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({})", self.format(Layout::Hyphenated, Case::Lower))
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format(Layout::Hyphenated, Case::Lower))
    }
}
