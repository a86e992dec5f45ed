// Minimal PRNG (no external crates).
//
// This is NOT cryptographically secure.
// Every subsystem owns one, seeded from the engine seed, so a run can be replayed exactly.

#[derive(Debug, Clone)]
pub struct Prng {
    state: u64,
}

impl Prng {
    pub fn new(seed: u64) -> Self {
        // Avoid a zero state.
        let seed = if seed == 0 { 0x9E3779B97F4A7C15 } else { seed };
        Self { state: seed }
    }

    pub fn from_state(state: u64) -> Self {
        Self::new(state)
    }

    pub fn state(&self) -> u64 {
        self.state
    }

    /// Derive an independent generator for a child component.
    ///
    /// The child seed goes through a splitmix64 finalizer so that siblings forked
    /// back to back do not walk correlated xorshift sequences.
    pub fn fork(&mut self) -> Prng {
        let mut z = self.next_u64().wrapping_add(0x9E3779B97F4A7C15);
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
        Prng::new(z ^ (z >> 31))
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        // xorshift64*
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    #[inline]
    pub fn next_f32_01(&mut self) -> f32 {
        // 24 mantissa bits keep the result strictly below 1.0.
        let x = self.next_u32() >> 8;
        (x as f32) / 16_777_216.0
    }

    #[inline]
    pub fn gen_range_f32(&mut self, low: f32, high: f32) -> f32 {
        low + (high - low) * self.next_f32_01()
    }

    #[inline]
    pub fn gen_range_usize(&mut self, low: usize, high: usize) -> usize {
        if high <= low {
            return low;
        }
        let span = (high - low) as u32;
        let v = self.next_u32() % span;
        low + v as usize
    }

    /// Bernoulli draw. Always consumes one sample, so gating a spawn on it keeps
    /// the stream aligned whether or not the event fires.
    #[inline]
    pub fn chance(&mut self, p: f32) -> bool {
        self.next_f32_01() < p
    }
}
