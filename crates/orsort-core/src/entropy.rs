//! Entropy / RNG: bulk random bytes and single-bit draws, both
//! thread-safe and fallible, as the only randomness surface the shuffle
//! and orp_id assignment depend on.
//!
//! The C source bookends a process-global entropy source with explicit
//! `entropy_init`/`entropy_free` and `rand_init`/`rand_free` calls. The
//! idiomatic Rust equivalent is RAII: `Entropy::init()` returns an owned
//! handle and teardown happens on `Drop` rather than through a paired
//! `_free` call.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::sync::Mutex;

use crate::error::SortError;

pub struct Entropy {
    rng: Mutex<StdRng>,
}

impl Entropy {
    /// Seeds the RNG from the OS entropy source. Fails only if the OS
    /// source itself is unavailable, mirroring `entropy_init`/`rand_init`
    /// being fallible in the original contract.
    pub fn init() -> Result<Self, SortError> {
        let rng =
            StdRng::from_rng(rand::thread_rng()).map_err(|e| SortError::Entropy(e.to_string()))?;
        Ok(Self {
            rng: Mutex::new(rng),
        })
    }

    /// A single fair coin draw.
    pub fn rand_bit(&self) -> Result<bool, SortError> {
        let mut rng = self.rng.lock().map_err(|_| poisoned())?;
        Ok(rng.next_u32() & 1 == 1)
    }

    /// Fills `buf` with uniformly random bytes.
    pub fn rand_bytes(&self, buf: &mut [u8]) -> Result<(), SortError> {
        let mut rng = self.rng.lock().map_err(|_| poisoned())?;
        rng.fill_bytes(buf);
        Ok(())
    }

    /// A uniformly random 64-bit value, used to mint fresh `orp_id`s.
    pub fn rand_u64(&self) -> Result<u64, SortError> {
        let mut rng = self.rng.lock().map_err(|_| poisoned())?;
        Ok(rng.next_u64())
    }

    /// A uniformly random `u32`, used by the shuffle's selection-sampling
    /// marking coins.
    pub fn rand_u32(&self) -> Result<u32, SortError> {
        let mut rng = self.rng.lock().map_err(|_| poisoned())?;
        Ok(rng.next_u32())
    }
}

fn poisoned() -> SortError {
    SortError::Entropy("entropy mutex poisoned by a panicking holder".to_string())
}
