pub mod lru;

use std::fmt;

use crate::cache::{Addr, Line};

/// Decides hit, fill or victim for one access within the lines of its set.
/// `now` is the tick the cache clock assigned to this access.
pub trait Replace {
    fn access(&mut self, set: &mut [Line], addr: Addr, now: u64) -> AccessResult;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessResult {
    Hit,
    MissFill,
    MissEvict,
}

impl fmt::Display for AccessResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AccessResult::Hit => "hit",
            AccessResult::MissFill => "miss",
            AccessResult::MissEvict => "miss eviction",
        })
    }
}
