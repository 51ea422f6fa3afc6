//! The ORShuffle driver: recursive mark-and-compact construction yielding a
//! uniform random permutation of a power-of-two-sized local array, entirely
//! through the masked `cmov_swap` primitive.

use crate::entropy::Entropy;
use crate::error::SortError;
use crate::oblivious::cmov_swap_elems;
use crate::record::Record;
use crate::taskpool::TaskPool;

use crate::config::MARK_COINS;

/// Marks exactly `arr.len() / 2` positions using the streaming
/// selection-sampling algorithm: each position is selected with
/// probability `remaining_to_mark / remaining_total`, drawn in batches of
/// `MARK_COINS` to bound the number of entropy calls.
fn mark(arr_len: usize, entropy: &Entropy, marked: &mut [bool], prefix: &mut [usize]) -> Result<(), SortError> {
    let num_to_mark = arr_len / 2;
    let mut remaining_total = arr_len as u64;
    let mut remaining_to_mark = num_to_mark as u64;
    let mut running = 0usize;

    let mut i = 0;
    while i < arr_len {
        let batch = (arr_len - i).min(MARK_COINS);
        let mut coins = vec![0u32; batch];
        let mut coin_bytes = vec![0u8; batch * 4];
        entropy.rand_bytes(&mut coin_bytes)?;
        for (c, bytes) in coins.iter_mut().zip(coin_bytes.chunks_exact(4)) {
            *c = u32::from_le_bytes(bytes.try_into().unwrap());
        }
        for &coin in &coins {
            let scaled = (coin as u64 * remaining_total) >> 32;
            let select = remaining_total > 0 && scaled < remaining_to_mark;
            if select {
                running += 1;
                remaining_to_mark -= 1;
            }
            marked[i] = select;
            prefix[i] = running;
            remaining_total -= 1;
            i += 1;
        }
    }
    Ok(())
}

/// Obliviously moves marked elements to `[0, L/2)` and unmarked to
/// `[L/2, L)`, with a circular shift parameterized by `offset mod L/2`.
fn compact(arr: &mut [Record], marked: &[bool], prefix: &[usize], offset: usize) {
    let length = arr.len();
    if length < 2 {
        return;
    }
    if length == 2 {
        let cond = (!marked[0] && marked[1]) != (offset != 0);
        cmov_swap_elems(arr, 0, 1, cond);
        return;
    }

    let half = length / 2;
    let left_marked_count = prefix[half - 1] - prefix[0] + (marked[0] as usize);

    {
        let (left_arr, right_arr) = arr.split_at_mut(half);
        let (left_marked, right_marked) = marked.split_at(half);
        let (left_prefix, right_prefix) = prefix.split_at(half);
        compact(left_arr, left_marked, left_prefix, offset % half);
        compact(
            right_arr,
            right_marked,
            right_prefix,
            (offset + left_marked_count) % half,
        );
    }

    swap_range(arr, offset, left_marked_count);
}

/// Pairs index `i` with `i + L/2` across the whole array and conditionally
/// swaps, completing the compaction started by the two recursive halves.
///
/// Precondition (promoted from an implicit assumption in the source to an
/// explicit check): `arr.len()` is a power of two, so every index `i` in
/// `[0, L/2)` has exactly one remote counterpart `i + L/2`.
fn swap_range(arr: &mut [Record], offset: usize, left_marked_count: usize) {
    let length = arr.len();
    debug_assert!(length.is_power_of_two(), "swap_range requires a power-of-two length");
    let half = length / 2;

    let s = ((offset % half + left_marked_count) >= half) != (offset >= half);
    for i in 0..half {
        let cond = s != (i >= (offset + left_marked_count) % half);
        cmov_swap_elems(arr, i, i + half, cond);
    }
}

/// Recursively permutes `arr` uniformly at random. `marked`/`prefix` are
/// scratch arrays the same length as `arr`, allocated once by the caller at
/// shuffle entry.
pub fn shuffle(
    arr: &mut [Record],
    marked: &mut [bool],
    prefix: &mut [usize],
    entropy: &Entropy,
) -> Result<(), SortError> {
    let length = arr.len();
    if length < 2 {
        return Ok(());
    }
    if length == 2 {
        let bit = entropy.rand_bit()?;
        cmov_swap_elems(arr, 0, 1, bit);
        return Ok(());
    }

    mark(length, entropy, marked, prefix)?;
    compact(arr, marked, prefix, 0);

    let half = length / 2;
    let (left_arr, right_arr) = arr.split_at_mut(half);
    let (left_marked, right_marked) = marked.split_at_mut(half);
    let (left_prefix, right_prefix) = prefix.split_at_mut(half);
    shuffle(left_arr, left_marked, left_prefix, entropy)?;
    shuffle(right_arr, right_marked, right_prefix, entropy)?;
    Ok(())
}

/// Assigns a fresh uniform 64-bit `orp_id` to every record in `arr`, sharded
/// across the task pool as a single iter-task.
///
/// Every index in `[0, arr.len())` gets a freshly drawn id — ties in key
/// must break on a value no two records share, so a partial assignment
/// would leak which records a narrower range had skipped.
pub fn assign_orp_ids(
    pool: &TaskPool,
    entropy: &std::sync::Arc<Entropy>,
    arr: &mut [Record],
) -> Result<(), SortError> {
    let len = arr.len();
    if len == 0 {
        return Ok(());
    }

    struct ShardPtr {
        ptr: *mut Record,
        len: usize,
    }
    unsafe impl Send for ShardPtr {}
    unsafe impl Sync for ShardPtr {}
    impl ShardPtr {
        // Safety: callers only ever invoke this with indices in `[0, len)`,
        // and the task pool hands out each index to exactly one shard, so
        // no two shards ever dereference the same `Record`.
        unsafe fn get_mut(&self, i: usize) -> &mut Record {
            debug_assert!(i < self.len);
            unsafe { &mut *self.ptr.add(i) }
        }
    }

    let shard_ptr = std::sync::Arc::new(ShardPtr {
        ptr: arr.as_mut_ptr(),
        len,
    });
    let error_slot = std::sync::Arc::new(crate::sync_primitives::FirstErrorSlot::new());
    let entropy = std::sync::Arc::clone(entropy);

    let shard_ptr_for_closure = std::sync::Arc::clone(&shard_ptr);
    let error_slot_for_closure = std::sync::Arc::clone(&error_slot);
    pool.run_iter(len, move |i| match entropy.rand_u64() {
        Ok(fresh_id) => {
            let record = unsafe { shard_ptr_for_closure.get_mut(i) };
            record.orp_id = fresh_id;
        }
        Err(_) => error_slot_for_closure.publish(1),
    });

    if error_slot.get() != 0 {
        return Err(SortError::Entropy(
            "entropy source failed during orp_id assignment".to_string(),
        ));
    }
    Ok(())
}
