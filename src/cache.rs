use std::ops::Range;

use serde::Serialize;

use crate::{
    clock::Clock,
    config::{Geometry, GeometryError},
    replace::{AccessResult, Replace},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Addr {
    pub offset: u64,
    pub set: usize,
    pub tag: u64,
}

/// A run of address bits starting at `shift`. Shifts past the address width
/// read as zero.
#[derive(Debug)]
pub struct BitSection {
    shift: u32,
    mask: u64,
}

impl BitSection {
    fn new(shift: u32, width: u32) -> Self {
        let mask = 1u64
            .checked_shl(width)
            .map_or(u64::MAX, |bit| bit - 1);
        BitSection { shift, mask }
    }

    fn apply(&self, num: u64) -> u64 {
        num.checked_shr(self.shift).unwrap_or(0) & self.mask
    }
}

#[derive(Debug, Serialize)]
pub struct CacheStats {
    pub geometry: Geometry,
    pub accesses: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub miss_rate: f64,
}

/// Simulation context: line storage, the LRU clock and the counters. Set `i`
/// owns `lines[i * E..(i + 1) * E]`.
#[derive(Debug)]
pub struct Cache<R: Replace> {
    geometry: Geometry,
    pub lines: Vec<Line>,
    pub n_ways: usize,
    offset_sec: BitSection,
    set_sec: BitSection,
    tag_sec: BitSection,
    clock: Clock,
    repl: R,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<R: Replace> Cache<R> {
    /// Allocates an all-invalid cache, or `TooLarge` when the line storage
    /// cannot be reserved.
    pub fn new(geometry: Geometry, repl: R) -> Result<Self, GeometryError> {
        let set_bits = geometry.set_bits();
        let block_bits = geometry.block_bits();
        let offset_sec = BitSection::new(0, block_bits);
        let set_sec = BitSection::new(block_bits, set_bits);
        let tag_sec = BitSection::new(set_bits + block_bits, u64::BITS);

        let n_lines = geometry.n_lines();
        let mut lines = Vec::new();
        lines
            .try_reserve_exact(n_lines)
            .map_err(|_| GeometryError::TooLarge {
                set_bits,
                lines_per_set: geometry.lines_per_set(),
            })?;
        lines.resize(n_lines, Line::default());

        Ok(Cache {
            geometry,
            lines,
            n_ways: geometry.lines_per_set(),
            offset_sec,
            set_sec,
            tag_sec,
            clock: Clock::new(),
            repl,
            hits: 0,
            misses: 0,
            evictions: 0,
        })
    }

    /// Classifies one load or store and applies it to the cache.
    pub fn access(&mut self, addr: u64) -> AccessResult {
        let now = self.clock.tick();
        let addr = self.split_addr(addr);
        let set_range = self.get_set(addr.set);
        let result = self.repl.access(&mut self.lines[set_range], addr, now);
        log::trace!(
            "t={now} tag={:#x} set={} offset={:#x}: {result}",
            addr.tag,
            addr.set,
            addr.offset
        );
        match result {
            AccessResult::Hit => self.hits += 1,
            AccessResult::MissFill => self.misses += 1,
            AccessResult::MissEvict => {
                self.misses += 1;
                self.evictions += 1;
            }
        }
        result
    }

    pub fn split_addr(&self, addr: u64) -> Addr {
        let offset = self.offset_sec.apply(addr);
        let set = self.set_sec.apply(addr) as usize;
        let tag = self.tag_sec.apply(addr);
        Addr { offset, set, tag }
    }

    pub fn get_set(&self, set: usize) -> Range<usize> {
        set * self.n_ways..(set + 1) * self.n_ways
    }

    pub fn clear_stats(&mut self) {
        self.hits = 0;
        self.misses = 0;
        self.evictions = 0;
    }

    pub fn stats(&self) -> CacheStats {
        let accesses = self.hits + self.misses;
        let miss_rate = if accesses == 0 {
            0.0
        } else {
            self.misses as f64 / accesses as f64
        };

        CacheStats {
            geometry: self.geometry,
            accesses,
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            miss_rate,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Line {
    pub valid: bool,
    pub tag: u64,
    pub last_used: u64,
}

impl Line {
    pub fn holds(&self, tag: u64) -> bool {
        self.valid && self.tag == tag
    }

    pub fn fill(&mut self, addr: Addr, now: u64) {
        self.valid = true;
        self.tag = addr.tag;
        self.last_used = now;
    }

    pub fn touch(&mut self, now: u64) {
        self.last_used = now;
    }
}
