use crate::cache::{Addr, Line};

use super::{AccessResult, Replace};

/// True LRU over per-line timestamps. Ties on the oldest timestamp go to the
/// lowest way.
#[derive(Debug)]
pub struct Lru;

/// Way holding the smallest `last_used`; the first one wins on equal values.
pub fn victim_way(set: &[Line]) -> usize {
    let mut victim = 0;
    for (way, line) in set.iter().enumerate().skip(1) {
        if line.last_used < set[victim].last_used {
            victim = way;
        }
    }
    victim
}

impl Replace for Lru {
    fn access(&mut self, set_slice: &mut [Line], addr: Addr, now: u64) -> AccessResult {
        // First, look for a hit
        if let Some(block) = set_slice.iter_mut().find(|b| b.holds(addr.tag)) {
            block.touch(now);
            return AccessResult::Hit;
        }

        // Miss, take an empty line if there is one
        if let Some(vacant) = set_slice.iter_mut().find(|b| !b.valid) {
            vacant.fill(addr, now);
            return AccessResult::MissFill;
        }

        // No empty lines, evict
        let lru_way = victim_way(set_slice);
        set_slice[lru_way].fill(addr, now);
        AccessResult::MissEvict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cache::Cache, config::Geometry};

    fn cache(s: u32, e: usize, b: u32) -> Cache<Lru> {
        Cache::new(Geometry::new(s, e, b).unwrap(), Lru).unwrap()
    }

    fn tags(cache: &Cache<Lru>, set: usize) -> Vec<Option<u64>> {
        cache.lines[cache.get_set(set)]
            .iter()
            .map(|l| l.valid.then_some(l.tag))
            .collect()
    }

    fn line(tag: u64, last_used: u64) -> Line {
        Line {
            valid: true,
            tag,
            last_used,
        }
    }

    #[test]
    fn victim_is_oldest() {
        let set = [line(1, 7), line(2, 3), line(3, 9)];
        assert_eq!(victim_way(&set), 1);
    }

    #[test]
    fn victim_tie_goes_to_lowest_way() {
        let set = [line(1, 5), line(2, 2), line(3, 2), line(4, 2)];
        assert_eq!(victim_way(&set), 1);
        let set = [line(1, 4), line(2, 4)];
        assert_eq!(victim_way(&set), 0);
    }

    #[test]
    fn refreshed_line_survives() {
        // A, B, A, C in one 2-way set: B goes, A stays.
        let mut c = cache(0, 2, 0);
        let (a, b, cc) = (0x0, 0x1, 0x2);
        assert_eq!(c.access(a), AccessResult::MissFill);
        assert_eq!(c.access(b), AccessResult::MissFill);
        assert_eq!(c.access(a), AccessResult::Hit);
        assert_eq!(c.access(cc), AccessResult::MissEvict);
        assert_eq!(tags(&c, 0), vec![Some(a), Some(cc)]);
        assert_eq!(c.access(a), AccessResult::Hit);
        assert_eq!(c.access(b), AccessResult::MissEvict);
        assert_eq!(tags(&c, 0), vec![Some(a), Some(b)]);
    }

    #[test]
    fn fills_before_evicting() {
        let mut c = cache(0, 4, 0);
        for tag in 0..4 {
            assert_eq!(c.access(tag), AccessResult::MissFill);
        }
        for tag in 0..4 {
            assert_eq!(c.access(tag), AccessResult::Hit);
        }
        assert_eq!(c.stats().evictions, 0);
        assert_eq!(c.access(4), AccessResult::MissEvict);
        assert_eq!(tags(&c, 0), vec![Some(4), Some(1), Some(2), Some(3)]);
    }

    #[test]
    fn direct_mapped_evicts_the_occupant() {
        let mut c = cache(2, 1, 4);
        // Same set (bits 4..6 are zero), different tags.
        c.access(0x000);
        c.access(0x040);
        assert_eq!(tags(&c, 0), vec![Some(1)]);
        assert_eq!(c.access(0x000), AccessResult::MissEvict);
        assert_eq!(tags(&c, 0), vec![Some(0)]);
        assert!(tags(&c, 1).iter().all(Option::is_none));
    }

    #[test]
    fn repeated_hits_only_move_recency() {
        let mut c = cache(1, 2, 3);
        c.access(0x100);
        let before = c.stats();
        for _ in 0..10 {
            assert_eq!(c.access(0x104), AccessResult::Hit);
        }
        let after = c.stats();
        assert_eq!(after.misses, before.misses);
        assert_eq!(after.evictions, before.evictions);
        assert_eq!(after.hits, before.hits + 10);
        let set = c.split_addr(0x100).set;
        assert_eq!(c.lines[c.get_set(set)][0].last_used, 11);
    }

    #[test]
    fn one_line_per_tag() {
        let mut c = cache(0, 4, 0);
        for addr in [3, 1, 3, 3, 2, 1, 5, 3, 6, 7, 3] {
            c.access(addr);
            let set = &c.lines[c.get_set(0)];
            let valid: Vec<_> = set.iter().filter(|l| l.valid).map(|l| l.tag).collect();
            let mut dedup = valid.clone();
            dedup.sort_unstable();
            dedup.dedup();
            assert_eq!(valid.len(), dedup.len());
        }
    }

    /// Ordered list model: front is most recent.
    fn reference(geometry: Geometry, addrs: &[u64]) -> (u64, u64, u64) {
        let s = geometry.set_bits();
        let b = geometry.block_bits();
        let mut sets = vec![Vec::<u64>::new(); geometry.n_sets()];
        let (mut hits, mut misses, mut evictions) = (0, 0, 0);
        for &addr in addrs {
            let set = ((addr >> b) & ((1 << s) - 1)) as usize;
            let tag = addr >> (s + b);
            let order = &mut sets[set];
            if let Some(pos) = order.iter().position(|&t| t == tag) {
                order.remove(pos);
                hits += 1;
            } else {
                misses += 1;
                if order.len() == geometry.lines_per_set() {
                    order.pop();
                    evictions += 1;
                }
            }
            order.insert(0, tag);
        }
        (hits, misses, evictions)
    }

    #[test]
    fn matches_list_model_on_random_traces() {
        let mut rng = fastrand::Rng::with_seed(0x5eed);
        for _ in 0..50 {
            let geometry =
                Geometry::new(rng.u32(0..4), rng.usize(1..6), rng.u32(0..5)).unwrap();
            let addrs: Vec<u64> = (0..500).map(|_| rng.u64(0..1024)).collect();

            let mut c = Cache::new(geometry, Lru).unwrap();
            for &addr in &addrs {
                c.access(addr);
            }
            let stats = c.stats();
            assert_eq!(
                (stats.hits, stats.misses, stats.evictions),
                reference(geometry, &addrs),
                "geometry {geometry}"
            );
        }
    }
}
