//! The work-stealing task pool: a FIFO of "single" and "iter" work items
//! consumed by a fixed pool of worker threads, following the
//! push → drain → wait pattern used throughout the pipeline stages.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::sync_primitives::{ReleaseLatch, Semaphore, SpinLock};

enum TaskBody {
    Single(Mutex<Option<Box<dyn FnOnce() + Send>>>),
    Iter {
        count: usize,
        next_index: AtomicUsize,
        func: Box<dyn Fn(usize) + Send + Sync>,
    },
}

struct TaskNode {
    body: TaskBody,
    remaining: AtomicUsize,
    done: Semaphore,
}

/// A handle returned by `push_single`/`push_iter`, passed to `wait`.
pub struct TaskHandle(Arc<TaskNode>);

enum Popped {
    Single(Arc<TaskNode>),
    IterShard(Arc<TaskNode>, usize),
}

struct Shared {
    queue: SpinLock<VecDeque<Arc<TaskNode>>>,
    latch: ReleaseLatch,
}

impl Shared {
    fn try_pop(&self) -> Option<Popped> {
        let mut q = self.queue.lock();
        loop {
            let front = q.front()?.clone();
            match &front.body {
                TaskBody::Single(_) => {
                    q.pop_front();
                    return Some(Popped::Single(front));
                }
                TaskBody::Iter { count, next_index, .. } => {
                    let idx = next_index.fetch_add(1, Ordering::Relaxed);
                    if idx < *count {
                        return Some(Popped::IterShard(front, idx));
                    }
                    // Every shard has been claimed; this node no longer needs
                    // to sit at the head of the FIFO. Threads still executing
                    // previously-claimed shards keep it alive via the Arc.
                    q.pop_front();
                }
            }
        }
    }
}

fn execute(popped: Popped) {
    match popped {
        Popped::Single(node) => {
            if let TaskBody::Single(slot) = &node.body {
                if let Some(f) = slot.lock().unwrap().take() {
                    f();
                }
            }
            if node.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                node.done.up();
            }
        }
        Popped::IterShard(node, idx) => {
            if let TaskBody::Iter { func, .. } = &node.body {
                func(idx);
            }
            if node.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                node.done.up();
            }
        }
    }
}

/// A fixed pool of OS threads pulling from one process-global FIFO, plus the
/// `push`/`drain`/`wait` surface the pipeline stages dispatch work through.
pub struct TaskPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl TaskPool {
    /// Spawns `num_threads.saturating_sub(1)` background workers; the
    /// caller's own thread is expected to act as the Nth puller by calling
    /// `drain()` between pushes, matching the "one of them doubles as the
    /// main thread" scheduling model.
    pub fn new(num_threads: usize) -> Self {
        let shared = Arc::new(Shared {
            queue: SpinLock::new(VecDeque::new()),
            latch: ReleaseLatch::new(),
        });

        let mut workers = Vec::new();
        for _ in 0..num_threads.saturating_sub(1) {
            let shared = Arc::clone(&shared);
            workers.push(std::thread::spawn(move || worker_loop(&shared)));
        }

        Self { shared, workers }
    }

    pub fn push_single<F>(&self, func: F) -> TaskHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let node = Arc::new(TaskNode {
            body: TaskBody::Single(Mutex::new(Some(Box::new(func)))),
            remaining: AtomicUsize::new(1),
            done: Semaphore::new(0),
        });
        self.shared.queue.lock().push_back(Arc::clone(&node));
        TaskHandle(node)
    }

    pub fn push_iter<F>(&self, count: usize, func: F) -> TaskHandle
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        debug_assert!(count > 0, "iter task with zero shards would never signal done");
        let node = Arc::new(TaskNode {
            body: TaskBody::Iter {
                count,
                next_index: AtomicUsize::new(0),
                func: Box::new(func),
            },
            remaining: AtomicUsize::new(count),
            done: Semaphore::new(0),
        });
        self.shared.queue.lock().push_back(Arc::clone(&node));
        TaskHandle(node)
    }

    /// The calling thread executes tasks from the FIFO until it is empty.
    pub fn drain(&self) {
        while let Some(popped) = self.shared.try_pop() {
            execute(popped);
        }
    }

    /// Convenience: push an iter task, help drain it, then block for completion.
    pub fn run_iter<F>(&self, count: usize, func: F)
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        if count == 0 {
            return;
        }
        let handle = self.push_iter(count, func);
        self.drain();
        self.wait(&handle);
    }

    pub fn wait(&self, handle: &TaskHandle) {
        handle.0.done.down();
    }

    pub fn barrier(&self) {
        self.drain();
    }
}

fn worker_loop(shared: &Arc<Shared>) {
    loop {
        match shared.try_pop() {
            Some(popped) => execute(popped),
            None => {
                if shared.latch.is_released() {
                    return;
                }
                std::hint::spin_loop();
            }
        }
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        self.shared.latch.release_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_task_runs_once() {
        let pool = TaskPool::new(4);
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        let handle = pool.push_single(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        pool.drain();
        pool.wait(&handle);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn iter_task_covers_every_shard_exactly_once() {
        let pool = TaskPool::new(4);
        let seen = Arc::new(Mutex::new(vec![0i64; 37]));
        let seen2 = Arc::clone(&seen);
        pool.run_iter(37, move |i| {
            seen2.lock().unwrap()[i] += 1;
        });
        assert!(seen.lock().unwrap().iter().all(|&c| c == 1));
    }

    #[test]
    fn iter_tasks_run_in_submission_order() {
        let pool = TaskPool::new(2);
        let order = Arc::new(Mutex::new(Vec::new()));
        for stage in 0..5 {
            let order = Arc::clone(&order);
            pool.run_iter(4, move |_i| {
                order.lock().unwrap().push(stage);
            });
        }
        let order = order.lock().unwrap();
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(*order, sorted, "stages must complete strictly in submission order");
    }

    #[test]
    fn first_error_wins_via_atomic_slot() {
        use crate::sync_primitives::FirstErrorSlot;
        let pool = TaskPool::new(4);
        let slot = Arc::new(FirstErrorSlot::new());
        let slot2 = Arc::clone(&slot);
        pool.run_iter(16, move |i| {
            if i % 3 == 0 {
                slot2.publish(i + 1);
            }
        });
        assert_ne!(slot.get(), 0);
        assert_eq!((slot.get() - 1) % 3, 0);
    }
}
