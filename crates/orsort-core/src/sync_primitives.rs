//! Spin-lock, counting semaphore, condvar-backed barrier: the synchronization
//! primitives the task pool is built on. Lock-free where feasible; the
//! barrier is the one place a blocking condvar is used, matching the
//! suspension points called out for the concurrency model.

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};

/// A busy-spinning mutual-exclusion lock. Used for the task pool's FIFO,
/// which is held only for the duration of a queue push/pop and never across
/// a blocking call.
pub struct SpinLock<T> {
    locked: AtomicBool,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for SpinLock<T> {}
unsafe impl<T: Send> Sync for SpinLock<T> {}

pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<T> SpinLock<T> {
    pub fn new(data: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            data: UnsafeCell::new(data),
        }
    }

    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            std::hint::spin_loop();
        }
        SpinLockGuard { lock: self }
    }
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

/// A classic counting semaphore: `up()` increments and wakes one waiter,
/// `down()` blocks until the count is positive then decrements it.
pub struct Semaphore {
    count: Mutex<usize>,
    condvar: Condvar,
}

impl Semaphore {
    pub fn new(initial: usize) -> Self {
        Self {
            count: Mutex::new(initial),
            condvar: Condvar::new(),
        }
    }

    pub fn up(&self) {
        let mut count = self.count.lock().unwrap();
        *count += 1;
        self.condvar.notify_one();
    }

    pub fn down(&self) {
        let mut count = self.count.lock().unwrap();
        while *count == 0 {
            count = self.condvar.wait(count).unwrap();
        }
        *count -= 1;
    }
}

/// A rendezvous point for a fixed number of threads, analogous to the
/// original's `thread_wait_for_all`: every participant blocks until the Nth
/// one arrives, then all are released together.
pub struct Barrier {
    total: usize,
    state: Mutex<BarrierState>,
    condvar: Condvar,
}

struct BarrierState {
    arrived: usize,
    generation: u64,
}

impl Barrier {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            state: Mutex::new(BarrierState {
                arrived: 0,
                generation: 0,
            }),
            condvar: Condvar::new(),
        }
    }

    pub fn wait(&self) {
        let mut state = self.state.lock().unwrap();
        let my_generation = state.generation;
        state.arrived += 1;
        if state.arrived == self.total {
            state.arrived = 0;
            state.generation += 1;
            self.condvar.notify_all();
        } else {
            while state.generation == my_generation {
                state = self.condvar.wait(state).unwrap();
            }
        }
    }
}

/// A latch that lets worker loops exit (`release_all`) or re-enter
/// (`unrelease_all`) the task pool's pop loop, mirroring the source's
/// `work_done` flag gating `thread_work_pop`'s busy-spin.
pub struct ReleaseLatch {
    released: AtomicBool,
}

impl ReleaseLatch {
    pub fn new() -> Self {
        Self {
            released: AtomicBool::new(false),
        }
    }

    pub fn release_all(&self) {
        self.released.store(true, Ordering::Release);
    }

    pub fn unrelease_all(&self) {
        self.released.store(false, Ordering::Release);
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl Default for ReleaseLatch {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared slot used for first-error-wins publication inside iter-tasks:
/// `0` means no error yet, any other value is an index into an out-of-band
/// error table the caller maintains.
pub struct FirstErrorSlot(AtomicUsize);

impl FirstErrorSlot {
    pub fn new() -> Self {
        Self(AtomicUsize::new(0))
    }

    /// Publish `code` (must be nonzero) iff no error has been published yet.
    pub fn publish(&self, code: usize) {
        debug_assert_ne!(code, 0);
        let _ = self
            .0
            .compare_exchange(0, code, Ordering::Release, Ordering::Relaxed);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }
}

impl Default for FirstErrorSlot {
    fn default() -> Self {
        Self::new()
    }
}
