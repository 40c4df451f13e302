//! Replayable randomness for change distribution.
//!
//! A run either replays a caller-supplied list of values in `[0, 1)`, cycling
//! through it forever, or draws from an entropy-seeded generator. Both
//! backends record what they hand out so a system-random run can be replayed
//! exactly by passing the recorded values back in.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

enum Backend {
    Replay(VecDeque<f64>),
    System(StdRng),
}

pub struct RandomSource {
    backend: Backend,
    drawn: Vec<f64>,
}

impl RandomSource {
    /// Replay `values` cyclically; falls back to system randomness when empty.
    pub fn replay(values: impl IntoIterator<Item = f64>) -> Self {
        let values: VecDeque<f64> = values.into_iter().collect();
        if values.is_empty() {
            return Self::system();
        }
        Self {
            backend: Backend::Replay(values),
            drawn: Vec::new(),
        }
    }

    pub fn system() -> Self {
        Self {
            backend: Backend::System(StdRng::from_entropy()),
            drawn: Vec::new(),
        }
    }

    pub fn from_values(values: Option<&[f64]>) -> Self {
        match values {
            Some(v) => Self::replay(v.iter().copied()),
            None => Self::system(),
        }
    }

    pub fn is_replay(&self) -> bool {
        matches!(self.backend, Backend::Replay(_))
    }

    /// Next value in `[0, 1)`.
    pub fn next_value(&mut self) -> f64 {
        let value = match &mut self.backend {
            Backend::Replay(queue) => {
                // non-empty by construction
                let v = queue.pop_front().unwrap_or_default();
                queue.push_back(v);
                v
            }
            Backend::System(rng) => rng.r#gen::<f64>(),
        };
        self.drawn.push(value);
        value
    }

    /// Uniform integer in `min..=max`.
    pub fn int_between(&mut self, min: u64, max: u64) -> u64 {
        debug_assert!(min <= max);
        let span = max.saturating_sub(min) + 1;
        let offset = (self.next_value() * span as f64).floor() as u64;
        (min + offset).min(max)
    }

    /// Every value handed out so far, in order.
    pub fn drawn(&self) -> &[f64] {
        &self.drawn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_cycles_through_values() {
        let mut r = RandomSource::replay([0.1, 0.2, 0.3]);
        assert!(r.is_replay());
        let got: Vec<f64> = (0..7).map(|_| r.next_value()).collect();
        assert_eq!(got, vec![0.1, 0.2, 0.3, 0.1, 0.2, 0.3, 0.1]);
        assert_eq!(r.drawn().len(), 7);
    }

    #[test]
    fn empty_replay_falls_back_to_system() {
        let mut r = RandomSource::replay(std::iter::empty());
        assert!(!r.is_replay());
        let v = r.next_value();
        assert!((0.0..1.0).contains(&v));
    }

    #[test]
    fn int_between_covers_bounds() {
        let mut r = RandomSource::replay([0.0, 0.999_999, 0.5]);
        assert_eq!(r.int_between(2500, 5000), 2500);
        assert_eq!(r.int_between(2500, 5000), 5000);
        assert_eq!(r.int_between(0, 4), 2);
    }

    #[test]
    fn single_value_range() {
        let mut r = RandomSource::replay([0.75]);
        assert_eq!(r.int_between(3, 3), 3);
    }

    #[test]
    fn system_draws_replay_identically() {
        let mut system = RandomSource::system();
        let first: Vec<u64> = (0..20).map(|_| system.int_between(0, 9)).collect();

        let mut replay = RandomSource::replay(system.drawn().to_vec());
        let second: Vec<u64> = (0..20).map(|_| replay.int_between(0, 9)).collect();
        assert_eq!(first, second);
    }
}
