pub mod config;
pub mod entropy;
pub mod error;
pub mod mergesort;
pub mod oblivious;
pub mod partition;
pub mod pipeline;
pub mod quickselect;
pub mod record;
pub mod shuffle;
pub mod sync_primitives;
pub mod taskpool;
pub mod transport;
pub mod worker;

// Re-export primary types for convenience
pub use entropy::Entropy;
pub use error::SortError;
pub use oblivious::{cmov_swap_bytes, cmov_swap_elems};
pub use pipeline::{nonoblivious_sort, orshuffle_sort};
pub use record::{cmp3, cmp3_record, cmp3_record_sample, Record, Sample, PAYLOAD_SIZE, RECORD_SIZE};
pub use taskpool::TaskPool;
pub use transport::{Completion, Status, Transport};
pub use worker::WorkerCoords;
