//! Named, independently seeded random number streams.
//!
//! Every consumer of randomness defines its own stream type with `define_rng!` and draws
//! from it through a `RandomStreams` instance. A stream is created lazily the first time it
//! is used and seeded with `base_seed + hash(name)`, so adding draws to one stream never
//! shifts the values another stream produces. Each rollout owns its own `RandomStreams`
//! seeded from its rollout seed; there is no process-wide generator.

use std::any::{Any, TypeId};
use std::cell::{RefCell, RefMut};

use log::trace;
use rand::distr::uniform::{SampleRange, SampleUniform};
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::{Rng, RngCore, SeedableRng};

use crate::hashing::{hash_str, HashMap, HashMapExt};

/// Use this to define a unique type which will be used as a key to retrieve
/// an independent rng instance from `RandomStreams`.
#[macro_export]
macro_rules! define_rng {
    ($random_id:ident) => {
        #[derive(Copy, Clone)]
        struct $random_id;

        impl $crate::random::RngId for $random_id {
            type RngType = $crate::rand::rngs::SmallRng;

            fn get_name() -> &'static str {
                stringify!($random_id)
            }
        }

        // This ensures that you can't define two RngIds with the same name
        $crate::paste::paste! {
            #[doc(hidden)]
            #[no_mangle]
            #[allow(non_upper_case_globals)]
            pub static [<rng_name_duplication_guard_ $random_id>]: () = ();
        }
    };
}
pub use define_rng;

pub trait RngId: Copy + 'static {
    type RngType: SeedableRng + RngCore + 'static;
    fn get_name() -> &'static str;
}

/// A set of random streams sharing one base seed.
///
/// The streams are stored in a `RefCell` so that sampling only needs a shared borrow of the
/// owner, which lets the event handlers sample while they read other rollout state.
pub struct RandomStreams {
    base_seed: u64,
    rng_holders: RefCell<HashMap<TypeId, Box<dyn Any>>>,
}

impl RandomStreams {
    #[must_use]
    pub fn new(base_seed: u64) -> RandomStreams {
        trace!("initializing random streams with base seed {base_seed}");
        RandomStreams {
            base_seed,
            rng_holders: RefCell::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn base_seed(&self) -> u64 {
        self.base_seed
    }

    /// Gets a mutable reference to the random number generator associated with the given
    /// [`RngId`], creating it from the base seed on first use.
    fn get_rng<R: RngId>(&self) -> RefMut<'_, R::RngType> {
        let rng_holders = self.rng_holders.borrow_mut();
        RefMut::map(rng_holders, |holders| {
            let holder = holders.entry(TypeId::of::<R>()).or_insert_with(|| {
                let seed_offset = hash_str(R::get_name());
                trace!(
                    "creating new RNG `{}` (seed={})",
                    R::get_name(),
                    self.base_seed
                );
                Box::new(R::RngType::seed_from_u64(
                    self.base_seed.wrapping_add(seed_offset),
                ))
            });
            match holder.downcast_mut::<R::RngType>() {
                Some(rng) => rng,
                // Entries are keyed by the `TypeId` of `R`, so they always hold `R::RngType`.
                None => unreachable!("rng stored under the wrong RngId"),
            }
        })
    }

    /// Gets a random sample from the stream associated with the given [`RngId`] by applying
    /// the specified sampler function.
    pub fn sample<R: RngId, T>(&self, _rng_id: R, sampler: impl FnOnce(&mut R::RngType) -> T) -> T {
        let mut rng = self.get_rng::<R>();
        sampler(&mut rng)
    }

    /// Gets a random sample from the specified distribution using the stream associated
    /// with the given [`RngId`].
    pub fn sample_distr<R: RngId, T>(&self, _rng_id: R, distribution: impl Distribution<T>) -> T {
        let mut rng = self.get_rng::<R>();
        distribution.sample::<R::RngType>(&mut rng)
    }

    /// Gets a random sample within the range provided by `range`.
    pub fn sample_range<R: RngId, S, T>(&self, rng_id: R, range: S) -> T
    where
        S: SampleRange<T>,
        T: SampleUniform,
    {
        self.sample(rng_id, |rng| rng.random_range(range))
    }

    /// Gets a random boolean value which is true with probability `p`. Probabilities outside
    /// `[0, 1]` are clamped.
    pub fn sample_bool<R: RngId>(&self, rng_id: R, p: f64) -> bool {
        let p = p.clamp(0.0, 1.0);
        self.sample(rng_id, |rng| rng.random_bool(p))
    }

    /// Draws an index into `weights` with probability proportional to its weight. Returns
    /// `None` when the weights are empty, negative or sum to zero.
    pub fn sample_weighted<R: RngId>(&self, rng_id: R, weights: &[f64]) -> Option<usize> {
        let index = WeightedIndex::new(weights).ok()?;
        Some(self.sample_distr(rng_id, index))
    }
}

#[cfg(test)]
mod tests {
    use super::RandomStreams;
    use rand::RngCore;

    define_rng!(FooTestRng);
    define_rng!(BarTestRng);

    #[test]
    fn get_rng_basic() {
        let streams = RandomStreams::new(42);
        assert_ne!(
            streams.sample(FooTestRng, RngCore::next_u64),
            streams.sample(FooTestRng, RngCore::next_u64)
        );
    }

    #[test]
    fn multiple_rng_types() {
        let streams = RandomStreams::new(42);
        assert_ne!(
            streams.sample(FooTestRng, RngCore::next_u64),
            streams.sample(BarTestRng, RngCore::next_u64)
        );
    }

    #[test]
    fn same_seed_same_values() {
        let first = RandomStreams::new(42);
        let second = RandomStreams::new(42);
        // Interleaving draws from another stream must not change this one.
        let _ = second.sample(BarTestRng, RngCore::next_u64);
        for _ in 0..10 {
            assert_eq!(
                first.sample(FooTestRng, RngCore::next_u64),
                second.sample(FooTestRng, RngCore::next_u64)
            );
        }

        let other = RandomStreams::new(88);
        assert_ne!(
            RandomStreams::new(42).sample(FooTestRng, RngCore::next_u64),
            other.sample(FooTestRng, RngCore::next_u64)
        );
    }

    #[test]
    fn sample_weighted() {
        let streams = RandomStreams::new(42);
        let n_samples = 3000;
        let mut zero_counter = 0;
        for _ in 0..n_samples {
            if streams.sample_weighted(FooTestRng, &[1.0, 2.0]) == Some(0) {
                zero_counter += 1;
            }
        }
        // The expected value of `zero_counter` is 1000.
        assert!((zero_counter - 1000_i32).abs() < 100);
        assert_eq!(streams.sample_weighted(FooTestRng, &[0.0, 0.0]), None);
        assert_eq!(streams.sample_weighted(FooTestRng, &[]), None);
    }

    #[test]
    fn sample_range_and_bool() {
        let streams = RandomStreams::new(42);
        let result = streams.sample_range(FooTestRng, 0..10);
        assert!((0..10).contains(&result));
        assert!(streams.sample_bool(FooTestRng, 1.0));
        assert!(!streams.sample_bool(FooTestRng, 0.0));
        assert!(streams.sample_bool(FooTestRng, 7.0));
    }
}
