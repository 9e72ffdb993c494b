use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Uniform source of random 64-bit words.
///
/// Implementations must be safe to share across concurrent requests.
pub trait RandomSource: Send + Sync {
    fn next_u64(&self) -> u64;
}

/// Operating system CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

static FALLBACK_SEQ: AtomicU64 = AtomicU64::new(0);

impl RandomSource for OsRandom {
    fn next_u64(&self) -> u64 {
        match getrandom::u64() {
            Ok(value) => value,
            Err(err) => {
                tracing::error!("OS random source failed, using fallback: {}", err);
                fallback_u64()
            }
        }
    }
}

// splitmix64 over time and a process counter; only used if the OS source fails.
fn fallback_u64() -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let seq = FALLBACK_SEQ.fetch_add(1, Ordering::Relaxed);
    let mut z = nanos ^ seq.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Draw an index in `0..n` without modulo bias.
///
/// Draws below `2^64 mod n` are rejected so the accepted range is an exact
/// multiple of `n`.
pub fn uniform_index(rng: &dyn RandomSource, n: usize) -> usize {
    assert!(n > 0, "uniform_index called with empty range");
    let n = n as u64;
    let threshold = n.wrapping_neg() % n;
    loop {
        let draw = rng.next_u64();
        if draw >= threshold {
            return (draw % n) as usize;
        }
    }
}

/// Fisher-Yates shuffle in place.
pub fn shuffle<T>(rng: &dyn RandomSource, items: &mut [T]) {
    for i in (1..items.len()).rev() {
        let j = uniform_index(rng, i + 1);
        items.swap(i, j);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Replays a fixed sequence of draws, cycling when exhausted.
    pub(crate) struct ScriptedRandom {
        draws: Vec<u64>,
        cursor: Mutex<usize>,
    }

    impl ScriptedRandom {
        pub(crate) fn new(draws: Vec<u64>) -> Self {
            assert!(!draws.is_empty());
            Self { draws, cursor: Mutex::new(0) }
        }

        pub(crate) fn calls(&self) -> usize {
            *self.cursor.lock().unwrap()
        }
    }

    impl RandomSource for ScriptedRandom {
        fn next_u64(&self) -> u64 {
            let mut cursor = self.cursor.lock().unwrap();
            let value = self.draws[*cursor % self.draws.len()];
            *cursor += 1;
            value
        }
    }

    #[test]
    fn uniform_index_maps_draw_into_range() {
        let rng = ScriptedRandom::new(vec![u64::MAX, 7]);
        assert_eq!(uniform_index(&rng, 3), (u64::MAX % 3) as usize);
        assert_eq!(uniform_index(&rng, 3), 1);
    }

    #[test]
    fn uniform_index_rejects_biased_low_draws() {
        // 2^64 mod 3 == 1, so a draw of 0 is rejected and 5 is used instead.
        let rng = ScriptedRandom::new(vec![0, 5]);
        assert_eq!(uniform_index(&rng, 3), 2);
        assert_eq!(rng.calls(), 2);
    }

    #[test]
    fn power_of_two_ranges_never_reject() {
        let rng = ScriptedRandom::new(vec![0]);
        assert_eq!(uniform_index(&rng, 4), 0);
        assert_eq!(rng.calls(), 1);
    }

    #[test]
    fn single_element_range_is_always_zero() {
        let rng = OsRandom;
        for _ in 0..100 {
            assert_eq!(uniform_index(&rng, 1), 0);
        }
    }

    #[test]
    fn shuffle_is_a_permutation() {
        let rng = OsRandom;
        let mut items: Vec<u32> = (0..20).collect();
        shuffle(&rng, &mut items);
        let mut sorted = items.clone();
        sorted.sort();
        assert_eq!(sorted, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn os_random_indices_cover_the_range() {
        let rng = OsRandom;
        let mut seen = [0usize; 5];
        for _ in 0..1000 {
            seen[uniform_index(&rng, 5)] += 1;
        }
        assert!(seen.iter().all(|&count| count > 100), "skewed: {:?}", seen);
    }

    #[test]
    fn fallback_values_vary() {
        assert_ne!(fallback_u64(), fallback_u64());
    }
}
