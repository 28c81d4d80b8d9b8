/// Seedable mulberry32 generator. Pre-match randomisation and bot pawn
/// sub-types go through this so a seeded match replays identically.
#[derive(Clone, Debug)]
pub struct Rng {
    state: u32,
}

impl Rng {
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    pub fn next_f32(&mut self) -> f32 {
        self.state = self.state.wrapping_add(0x6d2b79f5);
        let mut t = self.state;
        t = (t ^ (t >> 15)).wrapping_mul(t | 1);
        t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
        let out = t ^ (t >> 14);
        (out as f64 / 4_294_967_296.0).min(0.999_999) as f32
    }

    /// Inclusive on both ends.
    pub fn int(&mut self, min: i32, max: i32) -> i32 {
        if max <= min {
            return min;
        }
        let span = (max - min + 1) as f32;
        (min + (self.next_f32() * span).floor() as i32).min(max)
    }

    /// Uniform roll in `1..=100`, compared against configured percentages.
    pub fn roll_percent(&mut self) -> u8 {
        self.int(1, 100) as u8
    }

    pub fn bool(&mut self, probability: f32) -> bool {
        self.next_f32() < probability
    }

    pub fn pick_index(&mut self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        (self.next_f32() * len as f32).floor().min((len - 1) as f32) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_replays_same_sequence() {
        let mut a = Rng::new(77);
        let mut b = Rng::new(77);
        for _ in 0..64 {
            assert_eq!(a.roll_percent(), b.roll_percent());
            assert_eq!(a.pick_index(4), b.pick_index(4));
        }
    }

    #[test]
    fn roll_percent_stays_in_range() {
        let mut rng = Rng::new(3);
        for _ in 0..5_000 {
            let roll = rng.roll_percent();
            assert!((1..=100).contains(&roll));
        }
    }

    #[test]
    fn pick_index_handles_degenerate_lengths() {
        let mut rng = Rng::new(9);
        assert_eq!(rng.pick_index(0), 0);
        assert_eq!(rng.pick_index(1), 0);
        for _ in 0..1_000 {
            assert!(rng.pick_index(4) < 4);
        }
    }
}
