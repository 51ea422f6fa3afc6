//! The production `Transport`: point-to-point messaging over `mpi`'s
//! `SystemCommunicator`, with non-blocking `isend`/`irecv` realized as
//! blocking MPI calls dispatched to a background thread pool — the same
//! submit/poll-via-worker-threads shape the POSIX backend uses for async
//! I/O, swapped from file descriptors to communicator ranks.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use mpi::point_to_point::Status as MpiStatus;
use mpi::topology::{Communicator, SystemCommunicator};

use orsort_core::error::SortError;
use orsort_core::transport::{Completion, Status, Transport};

fn io_err(reason: impl std::fmt::Display) -> SortError {
    SortError::Transport { peer: usize::MAX, reason: reason.to_string() }
}

fn status_of(mpi_status: MpiStatus, count: usize) -> Status {
    Status {
        count,
        source: mpi_status.source_rank() as usize,
        tag: mpi_status.tag(),
    }
}

enum Op {
    Send { dest: usize, tag: i32, buf: Vec<u8> },
    Recv { src: Option<usize>, tag: Option<i32> },
}

/// A one-shot completion slot; `isend`/`irecv` hand the submitting side a
/// `Request` wrapping one of these, and `wait`/`waitany` block on it.
struct Slot {
    result: Mutex<Option<Result<Completion, SortError>>>,
    ready: Condvar,
}

impl Slot {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            result: Mutex::new(None),
            ready: Condvar::new(),
        })
    }

    fn publish(&self, result: Result<Completion, SortError>) {
        *self.result.lock().unwrap() = Some(result);
        self.ready.notify_all();
    }

    fn block(&self) -> Result<Completion, SortError> {
        let mut guard = self.result.lock().unwrap();
        loop {
            if let Some(result) = guard.take() {
                return result;
            }
            guard = self.ready.wait(guard).unwrap();
        }
    }

    fn is_ready(&self) -> bool {
        self.result.lock().unwrap().is_some()
    }
}

pub struct MpiRequest {
    slot: Arc<Slot>,
}

struct PendingOp {
    op: Op,
    slot: Arc<Slot>,
}

struct PoolShared {
    queue: Mutex<VecDeque<PendingOp>>,
    condvar: Condvar,
    shutdown: Mutex<bool>,
}

struct WorkerPool {
    shared: Arc<PoolShared>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    fn new(world: SystemCommunicator, num_threads: usize) -> Self {
        let shared = Arc::new(PoolShared {
            queue: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
            shutdown: Mutex::new(false),
        });

        let mut workers = Vec::with_capacity(num_threads);
        for _ in 0..num_threads.max(1) {
            let shared_ref = Arc::clone(&shared);
            workers.push(thread::spawn(move || worker_loop(world, &shared_ref)));
        }

        Self { shared, workers }
    }

    fn submit(&self, op: Op) -> Arc<Slot> {
        let slot = Slot::new();
        self.shared.queue.lock().unwrap().push_back(PendingOp { op, slot: Arc::clone(&slot) });
        self.shared.condvar.notify_one();
        slot
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        *self.shared.shutdown.lock().unwrap() = true;
        self.shared.condvar.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop(world: SystemCommunicator, shared: &PoolShared) {
    loop {
        let pending = {
            let mut q = shared.queue.lock().unwrap();
            loop {
                if let Some(p) = q.pop_front() {
                    break Some(p);
                }
                if *shared.shutdown.lock().unwrap() {
                    break None;
                }
                q = shared.condvar.wait(q).unwrap();
            }
        };
        let Some(PendingOp { op, slot }) = pending else { return };

        let result = match op {
            Op::Send { dest, tag, buf } => {
                world.process_at_rank(dest as i32).send_with_tag(&buf[..], tag);
                Ok(Completion {
                    status: Status { count: buf.len(), source: world.rank() as usize, tag },
                    data: None,
                })
            }
            Op::Recv { src, tag } => receive(world, src, tag),
        };
        slot.publish(result);
    }
}

fn receive(world: SystemCommunicator, src: Option<usize>, tag: Option<i32>) -> Result<Completion, SortError> {
    let (buf, mpi_status) = match (src, tag) {
        (Some(s), Some(t)) => world.process_at_rank(s as i32).receive_vec_with_tag::<u8>(t),
        (Some(s), None) => world.process_at_rank(s as i32).receive_vec::<u8>(),
        (None, Some(t)) => world.any_process().receive_vec_with_tag::<u8>(t),
        (None, None) => world.any_process().receive_vec::<u8>(),
    };

    let count = buf.len();
    Ok(Completion {
        status: status_of(mpi_status, count),
        data: Some(buf),
    })
}

/// MPI-backed `Transport`. Non-blocking `isend`/`irecv` calls are executed
/// as blocking MPI operations on a dedicated pool of background threads, so
/// `wait`/`waitany` simply block on the operation's completion slot.
pub struct MpiTransport {
    world: SystemCommunicator,
    pool: WorkerPool,
}

impl MpiTransport {
    pub fn new(world: SystemCommunicator) -> Self {
        tracing::debug!(
            world_rank = world.rank(),
            world_size = world.size(),
            "MPI transport initialized"
        );
        Self { world, pool: WorkerPool::new(world, 4) }
    }
}

impl Transport for MpiTransport {
    type Request = MpiRequest;

    fn world_rank(&self) -> usize {
        self.world.rank() as usize
    }

    fn world_size(&self) -> usize {
        self.world.size() as usize
    }

    fn send(&self, buf: &[u8], dest: usize, tag: i32) -> Result<(), SortError> {
        tracing::trace!(dest, tag, bytes = buf.len(), "blocking send");
        self.world.process_at_rank(dest as i32).send_with_tag(buf, tag);
        Ok(())
    }

    fn recv(&self, buf: &mut [u8], src: Option<usize>, tag: Option<i32>) -> Result<Status, SortError> {
        let completion = receive(self.world, src, tag)?;
        let data = completion.data.ok_or_else(|| io_err("blocking receive produced no data"))?;
        buf[..data.len()].copy_from_slice(&data);
        Ok(completion.status)
    }

    fn isend(&self, buf: Vec<u8>, dest: usize, tag: i32) -> Result<Self::Request, SortError> {
        let slot = self.pool.submit(Op::Send { dest, tag, buf });
        Ok(MpiRequest { slot })
    }

    fn irecv(&self, _max_len: usize, src: Option<usize>, tag: Option<i32>) -> Result<Self::Request, SortError> {
        let slot = self.pool.submit(Op::Recv { src, tag });
        Ok(MpiRequest { slot })
    }

    fn wait(&self, req: Self::Request) -> Result<Completion, SortError> {
        req.slot.block()
    }

    fn waitany(&self, reqs: &mut [Option<Self::Request>]) -> Result<(usize, Completion), SortError> {
        loop {
            for (i, slot) in reqs.iter().enumerate() {
                if slot.as_ref().is_some_and(|r| r.slot.is_ready()) {
                    let req = reqs[i].take().unwrap();
                    return Ok((i, req.slot.block()));
                }
            }
            thread::yield_now();
        }
    }

    fn cancel(&self, _req: Self::Request) -> Result<(), SortError> {
        // The request's MPI op may already be in flight on a worker thread;
        // there is no way to abort a blocking send/receive mid-call, so this
        // simply lets it run to completion and drops the result.
        Ok(())
    }
}
