/// Logical time for LRU ordering. Advances once per cache access, never
/// by wall clock.
#[derive(Debug, Default)]
pub struct Clock {
    pub now: u64,
}

impl Clock {
    pub fn new() -> Self {
        Clock { now: 0 }
    }

    pub fn tick(&mut self) -> u64 {
        self.now += 1;
        self.now
    }
}
