//! The pipeline orchestrator: top-level sequencing of shuffle →
//! orp_id assignment → distributed sample-partition → local merge sort,
//! owning the record array's backing allocation for the duration of one
//! sort invocation.

use std::sync::Arc;

use crate::entropy::Entropy;
use crate::error::SortError;
use crate::mergesort::mergesort;
use crate::partition::distributed_sample_partition;
use crate::record::Record;
use crate::shuffle::{assign_orp_ids, shuffle};
use crate::taskpool::TaskPool;
use crate::transport::Transport;

/// Runs distributed sample-partition followed by the local merge sort for
/// one worker's share of a globally `total_length`-record array.
///
/// `arr` must have `local_length` live records followed by at least
/// `local_length` records of scratch space; this doubled allocation is what
/// lets sample-partition write its redistributed output without clobbering
/// the records still being read out of the live range. The number of
/// records sample-partition actually receives is asserted equal to
/// `local_length` rather than threaded through as a separate merge-sort
/// length: the conservation invariant guarantees the two always agree, so
/// carrying both as distinct parameters would only invite them to drift.
pub fn nonoblivious_sort<T: Transport>(
    transport: &T,
    pool: &TaskPool,
    arr: &mut [Record],
    local_length: usize,
    total_length: usize,
) -> Result<(), SortError> {
    debug_assert!(arr.len() >= local_length * 2);
    let (live, scratch) = arr.split_at_mut(local_length);

    let received = distributed_sample_partition(transport, live, scratch, total_length)?;
    debug_assert_eq!(received, local_length, "conservation invariant: received count must equal local_length");
    mergesort(pool, scratch, live);
    Ok(())
}

/// Top-level entry point: permutes `arr` uniformly at random, assigns fresh
/// `orp_id`s, then routes and locally sorts via `nonoblivious_sort`.
///
/// `arr` must be sized as described by `nonoblivious_sort` (live range
/// followed by equal-sized scratch); `live_length` is the power-of-two
/// length of the live range that enters the shuffle.
pub fn orshuffle_sort<T: Transport>(
    transport: &T,
    pool: &TaskPool,
    entropy: &Arc<Entropy>,
    arr: &mut [Record],
    live_length: usize,
    total_length: usize,
) -> Result<(), SortError> {
    debug_assert!(live_length.is_power_of_two());
    debug_assert!(arr.len() >= live_length * 2);

    let (live, _scratch) = arr.split_at_mut(live_length);

    let mut marked = vec![false; live_length];
    let mut prefix = vec![0usize; live_length];
    shuffle(live, &mut marked, &mut prefix, entropy)?;
    drop(marked);
    drop(prefix);

    assign_orp_ids(pool, entropy, live)?;

    nonoblivious_sort(transport, pool, arr, live_length, total_length)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Completion, Status};

    struct SingleWorkerTransport;
    impl Transport for SingleWorkerTransport {
        type Request = ();
        fn world_rank(&self) -> usize {
            0
        }
        fn world_size(&self) -> usize {
            1
        }
        fn send(&self, _: &[u8], _: usize, _: i32) -> Result<(), SortError> {
            unreachable!()
        }
        fn recv(&self, _: &mut [u8], _: Option<usize>, _: Option<i32>) -> Result<Status, SortError> {
            unreachable!()
        }
        fn isend(&self, _: Vec<u8>, _: usize, _: i32) -> Result<Self::Request, SortError> {
            unreachable!()
        }
        fn irecv(&self, _: usize, _: Option<usize>, _: Option<i32>) -> Result<Self::Request, SortError> {
            unreachable!()
        }
        fn wait(&self, _: Self::Request) -> Result<Completion, SortError> {
            unreachable!()
        }
        fn waitany(&self, _: &mut [Option<Self::Request>]) -> Result<(usize, Completion), SortError> {
            unreachable!()
        }
        fn cancel(&self, _: Self::Request) -> Result<(), SortError> {
            unreachable!()
        }
    }

    #[test]
    fn single_worker_pipeline_sorts_and_preserves_keys() {
        let transport = SingleWorkerTransport;
        let pool = TaskPool::new(4);
        let entropy = Arc::new(Entropy::init().unwrap());

        let keys: Vec<u64> = vec![5, 3, 7, 1, 8, 2, 6, 4];
        let mut arr: Vec<Record> = keys.iter().map(|&k| Record::new(k, 0)).collect();
        arr.extend((0..keys.len()).map(|_| Record::new(0, 0)));

        orshuffle_sort(&transport, &pool, &entropy, &mut arr, keys.len(), keys.len()).unwrap();

        let sorted_keys: Vec<u64> = arr[..keys.len()].iter().map(|r| r.key).collect();
        let mut expected = keys.clone();
        expected.sort();
        assert_eq!(sorted_keys, expected);

        let mut ids: Vec<u64> = arr[..keys.len()].iter().map(|r| r.orp_id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), keys.len(), "orp_ids must be pairwise distinct after the pipeline");
    }

    #[test]
    fn all_equal_keys_still_produce_distinct_orp_ids() {
        let transport = SingleWorkerTransport;
        let pool = TaskPool::new(2);
        let entropy = Arc::new(Entropy::init().unwrap());

        let len = 16;
        let mut arr: Vec<Record> = (0..len).map(|_| Record::new(42, 0)).collect();
        arr.extend((0..len).map(|_| Record::new(0, 0)));

        orshuffle_sort(&transport, &pool, &entropy, &mut arr, len, len).unwrap();

        assert!(arr[..len].iter().all(|r| r.key == 42));
        let mut ids: Vec<u64> = arr[..len].iter().map(|r| r.orp_id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), len);
    }
}
