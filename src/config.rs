use std::{fmt, mem};

use serde::{Deserialize, Serialize};

use crate::cache::Line;

/// Width of a trace address in bits.
pub const ADDR_BITS: u32 = u64::BITS;

/// Shape of the simulated cache: `2^s` sets of `E` lines, each holding a
/// `2^b` byte block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawGeometry")]
pub struct Geometry {
    #[serde(rename = "s")]
    set_bits: u32,
    #[serde(rename = "E")]
    lines_per_set: usize,
    #[serde(rename = "b")]
    block_bits: u32,
}

#[derive(Deserialize)]
struct RawGeometry {
    s: u32,
    #[serde(rename = "E")]
    e: usize,
    b: u32,
}

impl TryFrom<RawGeometry> for Geometry {
    type Error = GeometryError;

    fn try_from(raw: RawGeometry) -> Result<Self, Self::Error> {
        Geometry::new(raw.s, raw.e, raw.b)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum GeometryError {
    NoLines,
    TooWide { set_bits: u32, block_bits: u32 },
    TooLarge { set_bits: u32, lines_per_set: usize },
}

impl fmt::Display for GeometryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeometryError::NoLines => write!(f, "a set must hold at least one line (E >= 1)"),
            GeometryError::TooWide {
                set_bits,
                block_bits,
            } => write!(
                f,
                "s + b = {} exceeds the {ADDR_BITS}-bit address width",
                *set_bits as u64 + *block_bits as u64
            ),
            GeometryError::TooLarge {
                set_bits,
                lines_per_set,
            } => write!(
                f,
                "2^{set_bits} sets of {lines_per_set} lines cannot be allocated"
            ),
        }
    }
}

impl std::error::Error for GeometryError {}

impl Geometry {
    pub fn new(set_bits: u32, lines_per_set: usize, block_bits: u32) -> Result<Self, GeometryError> {
        if lines_per_set < 1 {
            return Err(GeometryError::NoLines);
        }
        if set_bits as u64 + block_bits as u64 > ADDR_BITS as u64 {
            return Err(GeometryError::TooWide {
                set_bits,
                block_bits,
            });
        }
        let fits = 1usize
            .checked_shl(set_bits)
            .and_then(|sets| sets.checked_mul(lines_per_set))
            .and_then(|lines| lines.checked_mul(mem::size_of::<Line>()))
            .is_some_and(|bytes| bytes <= isize::MAX as usize);
        if !fits {
            return Err(GeometryError::TooLarge {
                set_bits,
                lines_per_set,
            });
        }
        Ok(Geometry {
            set_bits,
            lines_per_set,
            block_bits,
        })
    }

    pub fn set_bits(&self) -> u32 {
        self.set_bits
    }

    pub fn lines_per_set(&self) -> usize {
        self.lines_per_set
    }

    pub fn block_bits(&self) -> u32 {
        self.block_bits
    }

    pub fn n_sets(&self) -> usize {
        1 << self.set_bits
    }

    /// Block size in bytes, saturating for `b = 64`.
    pub fn block_size(&self) -> u64 {
        1u64.checked_shl(self.block_bits).unwrap_or(u64::MAX)
    }

    pub fn n_lines(&self) -> usize {
        self.n_sets() * self.lines_per_set
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "s={} E={} b={}",
            self.set_bits, self.lines_per_set, self.block_bits
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_sizes() {
        let g = Geometry::new(4, 2, 5).unwrap();
        assert_eq!(g.n_sets(), 16);
        assert_eq!(g.block_size(), 32);
        assert_eq!(g.n_lines(), 32);
    }

    #[test]
    fn rejects_empty_sets() {
        assert_eq!(Geometry::new(0, 0, 0), Err(GeometryError::NoLines));
    }

    #[test]
    fn rejects_fields_wider_than_an_address() {
        assert_eq!(
            Geometry::new(33, 1, 32),
            Err(GeometryError::TooWide {
                set_bits: 33,
                block_bits: 32
            })
        );
        assert!(Geometry::new(0, 1, 64).is_ok());
    }

    #[test]
    fn rejects_unallocatable_caches() {
        assert!(matches!(
            Geometry::new(64, 1, 0),
            Err(GeometryError::TooLarge { .. })
        ));
        assert!(matches!(
            Geometry::new(8, usize::MAX, 0),
            Err(GeometryError::TooLarge { .. })
        ));
    }

    #[test]
    fn loads_from_json() {
        let g: Geometry = serde_json::from_str(r#"{"s": 4, "E": 1, "b": 4}"#).unwrap();
        assert_eq!(g, Geometry::new(4, 1, 4).unwrap());
    }

    #[test]
    fn json_goes_through_validation() {
        let err = serde_json::from_str::<Geometry>(r#"{"s": 4, "E": 0, "b": 4}"#).unwrap_err();
        assert!(err.to_string().contains("at least one line"));
    }
}
