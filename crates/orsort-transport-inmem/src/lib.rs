//! An in-process `Transport` that simulates `W` workers inside one address
//! space over plain mutexed inboxes, so the pipeline stages in
//! `orsort-core` can be exercised end-to-end without an MPI launcher.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

use orsort_core::error::SortError;
use orsort_core::transport::{Completion, Status, Transport};

struct Message {
    from: usize,
    tag: i32,
    bytes: Vec<u8>,
}

struct Inbox {
    queue: Mutex<VecDeque<Message>>,
    arrived: Condvar,
}

impl Inbox {
    fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            arrived: Condvar::new(),
        }
    }

    fn push(&self, msg: Message) {
        self.queue.lock().unwrap().push_back(msg);
        self.arrived.notify_all();
    }

    /// Removes and returns the first queued message matching `src`/`tag`
    /// (`None` meaning "any"), blocking until one arrives.
    fn take_matching(&self, src: Option<usize>, tag: Option<i32>) -> Message {
        let mut q = self.queue.lock().unwrap();
        loop {
            if let Some(pos) = q
                .iter()
                .position(|m| src.map_or(true, |s| s == m.from) && tag.map_or(true, |t| t == m.tag))
            {
                return q.remove(pos).unwrap();
            }
            q = self.arrived.wait(q).unwrap();
        }
    }

    /// Non-consuming check for a match, used by `waitany`'s polling loop.
    fn has_matching(&self, src: Option<usize>, tag: Option<i32>) -> bool {
        let q = self.queue.lock().unwrap();
        q.iter()
            .any(|m| src.map_or(true, |s| s == m.from) && tag.map_or(true, |t| t == m.tag))
    }
}

/// Shared switchboard every worker's `InMemoryTransport` routes through.
pub struct Hub {
    world_size: usize,
    inboxes: Vec<Inbox>,
}

impl Hub {
    pub fn new(world_size: usize) -> Arc<Self> {
        Arc::new(Self {
            world_size,
            inboxes: (0..world_size).map(|_| Inbox::new()).collect(),
        })
    }

    pub fn transport(self: &Arc<Self>, rank: usize) -> InMemoryTransport {
        assert!(rank < self.world_size);
        InMemoryTransport {
            hub: Arc::clone(self),
            rank,
        }
    }
}

pub struct InMemoryTransport {
    hub: Arc<Hub>,
    rank: usize,
}

/// A request against the in-memory hub. Sends complete the instant they are
/// posted (the message is already in the destination's inbox), so only the
/// receive side carries pending state the eventual `wait`/`waitany` call
/// resolves by blocking on the destination inbox's condvar.
pub enum InMemoryRequest {
    Send { dest: usize, len: usize },
    Recv { src: Option<usize>, tag: Option<i32> },
}

impl Transport for InMemoryTransport {
    type Request = InMemoryRequest;

    fn world_rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.hub.world_size
    }

    fn send(&self, buf: &[u8], dest: usize, tag: i32) -> Result<(), SortError> {
        self.hub.inboxes[dest].push(Message {
            from: self.rank,
            tag,
            bytes: buf.to_vec(),
        });
        Ok(())
    }

    fn recv(&self, buf: &mut [u8], src: Option<usize>, tag: Option<i32>) -> Result<Status, SortError> {
        let msg = self.hub.inboxes[self.rank].take_matching(src, tag);
        let count = msg.bytes.len();
        buf[..count].copy_from_slice(&msg.bytes);
        Ok(Status {
            count,
            source: msg.from,
            tag: msg.tag,
        })
    }

    fn isend(&self, buf: Vec<u8>, dest: usize, tag: i32) -> Result<Self::Request, SortError> {
        let len = buf.len();
        self.hub.inboxes[dest].push(Message {
            from: self.rank,
            tag,
            bytes: buf,
        });
        Ok(InMemoryRequest::Send { dest, len })
    }

    fn irecv(&self, _max_len: usize, src: Option<usize>, tag: Option<i32>) -> Result<Self::Request, SortError> {
        Ok(InMemoryRequest::Recv { src, tag })
    }

    fn wait(&self, req: Self::Request) -> Result<Completion, SortError> {
        match req {
            InMemoryRequest::Send { dest, len } => Ok(Completion {
                status: Status { count: len, source: self.rank, tag: 0 },
                data: None,
            }),
            InMemoryRequest::Recv { src, tag } => {
                let msg = self.hub.inboxes[self.rank].take_matching(src, tag);
                let count = msg.bytes.len();
                Ok(Completion {
                    status: Status { count, source: msg.from, tag: msg.tag },
                    data: Some(msg.bytes),
                })
            }
        }
    }

    fn waitany(&self, reqs: &mut [Option<Self::Request>]) -> Result<(usize, Completion), SortError> {
        loop {
            for (i, slot) in reqs.iter().enumerate() {
                let ready = match slot {
                    None => false,
                    Some(InMemoryRequest::Send { .. }) => true,
                    Some(InMemoryRequest::Recv { src, tag }) => self.hub.inboxes[self.rank].has_matching(*src, *tag),
                };
                if ready {
                    let req = reqs[i].take().unwrap();
                    let completion = self.wait(req)?;
                    return Ok((i, completion));
                }
            }
            // Nothing ready yet; block on our own inbox until something new
            // arrives, then re-scan every pending slot.
            let guard = self.hub.inboxes[self.rank].queue.lock().unwrap();
            let _unused = self.hub.inboxes[self.rank].arrived.wait(guard).unwrap();
        }
    }

    fn cancel(&self, _req: Self::Request) -> Result<(), SortError> {
        Ok(())
    }
}
