//! The transport adapter contract: a thin abstraction over whatever
//! authenticated point-to-point messaging library the deployment wraps.
//! Two realizations live elsewhere in this workspace: `orsort-transport-mpi`
//! (production, backed by the `mpi` crate) and `orsort-transport-inmem`
//! (test/demo, simulating `W` workers in one process).

use crate::error::SortError;

/// Completion status of a finished send or receive.
#[derive(Debug, Clone, Copy)]
pub struct Status {
    pub count: usize,
    pub source: usize,
    pub tag: i32,
}

/// The result of waiting on a request: its status, plus the received bytes
/// for a completed receive (`None` for a completed send).
pub struct Completion {
    pub status: Status,
    pub data: Option<Vec<u8>>,
}

/// Opaque, backend-specific in-flight request. Each `Transport`
/// implementation defines its own representation; the core only ever
/// threads it through `Option<T::Request>` arrays, using `None` as the
/// "Null request" sentinel from the external interface contract.
pub trait Transport: Send + Sync {
    type Request: Send;

    fn world_rank(&self) -> usize;
    fn world_size(&self) -> usize;

    /// Blocking send of a raw byte range. Implementations must copy `buf`
    /// before returning so the caller is free to reuse it.
    fn send(&self, buf: &[u8], dest: usize, tag: i32) -> Result<(), SortError>;

    /// Blocking receive into `buf`. `src`/`tag` of `None` mean ANY_SOURCE /
    /// ANY_TAG.
    fn recv(&self, buf: &mut [u8], src: Option<usize>, tag: Option<i32>) -> Result<Status, SortError>;

    /// Non-blocking send; `buf` is consumed (already copied into the
    /// request) so the caller's own buffer remains theirs to reuse.
    fn isend(&self, buf: Vec<u8>, dest: usize, tag: i32) -> Result<Self::Request, SortError>;

    /// Non-blocking receive; the request owns a buffer of up to `max_len`
    /// bytes, populated on completion.
    fn irecv(
        &self,
        max_len: usize,
        src: Option<usize>,
        tag: Option<i32>,
    ) -> Result<Self::Request, SortError>;

    fn wait(&self, req: Self::Request) -> Result<Completion, SortError>;

    /// Waits for the first request among `reqs` to complete; `None` entries
    /// are the Null sentinel and are skipped. Returns the index of the
    /// completed entry (left `None` in `reqs` afterward — it is the
    /// caller's job to repost or retire that slot).
    fn waitany(&self, reqs: &mut [Option<Self::Request>]) -> Result<(usize, Completion), SortError>;

    fn cancel(&self, req: Self::Request) -> Result<(), SortError>;
}
