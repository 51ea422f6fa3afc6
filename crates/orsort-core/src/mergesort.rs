//! External merge sort: a parallel first pass that sorts fixed-size runs,
//! followed by parallel k-way merge passes until one run spans the array.

use crate::config::BUF;
use crate::record::{cmp3_record, Record};
use crate::sync_primitives::FirstErrorSlot;
use crate::taskpool::TaskPool;

fn ceil_div(a: usize, b: usize) -> usize {
    (a + b - 1) / b
}

/// Safety wrapper letting disjoint index-range shards mutate one backing
/// allocation from different task-pool threads, the same pattern used for
/// `orp_id` assignment in `shuffle.rs`.
struct ShardPtr {
    ptr: *mut Record,
}
unsafe impl Send for ShardPtr {}
unsafe impl Sync for ShardPtr {}
impl ShardPtr {
    fn new(slice: &mut [Record]) -> Self {
        Self { ptr: slice.as_mut_ptr() }
    }
    // Safety: the caller guarantees `start..end` is disjoint from every
    // other shard's range for the lifetime of this borrow.
    unsafe fn slice_mut(&self, start: usize, end: usize) -> &mut [Record] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.add(start), end - start) }
    }
}

/// Sorts `input` and `output` (both length `n`) into `output`, via a
/// parallel first pass of `BUF`-sized runs and parallel `BUF`-way merge
/// passes. After return, `output` holds the sorted array; `input`'s
/// contents are unspecified (used as merge scratch).
pub fn mergesort(pool: &TaskPool, input: &mut [Record], output: &mut [Record]) {
    let n = input.len();
    debug_assert_eq!(output.len(), n);
    if n == 0 {
        return;
    }

    let num_runs = ceil_div(n, BUF);
    let in_ptr = ShardPtr::new(input);
    pool.run_iter(num_runs, move |run_idx| {
        let start = run_idx * BUF;
        let end = (start + BUF).min(n);
        let shard = unsafe { in_ptr.slice_mut(start, end) };
        shard.sort_unstable_by(|a, b| cmp3_record(a, b).cmp(&0));
    });

    let mut in_buf: &mut [Record] = input;
    let mut out_buf: &mut [Record] = output;
    let mut run_len = BUF;

    while run_len < n {
        let group_span = run_len * BUF;
        let num_groups = ceil_div(n, group_span);

        let in_ptr = ShardPtr::new(in_buf);
        let out_ptr = ShardPtr::new(out_buf);
        pool.run_iter(num_groups, move |group_idx| {
            let group_start = group_idx * group_span;
            let group_end = (group_start + group_span).min(n);
            merge_group(&in_ptr, &out_ptr, group_start, group_end, run_len, n);
        });

        run_len *= BUF;
        std::mem::swap(&mut in_buf, &mut out_buf);
    }

    if !std::ptr::eq(in_buf.as_ptr(), output.as_ptr()) {
        output.copy_from_slice(in_buf);
    }
}

/// Merges the runs of length `run_len` inside `[group_start, group_end)`
/// of `in_ptr` into the same range of `out_ptr`, via a linear scan over
/// run-head cursors (acceptable per the component design; a heap would
/// also satisfy the contract).
fn merge_group(in_ptr: &ShardPtr, out_ptr: &ShardPtr, group_start: usize, group_end: usize, run_len: usize, n: usize) {
    let num_runs = ceil_div(group_end - group_start, run_len);
    let mut cursors: Vec<usize> = (0..num_runs).map(|i| group_start + i * run_len).collect();
    let ends: Vec<usize> = (0..num_runs)
        .map(|i| ((group_start + (i + 1) * run_len).min(group_end)).min(n))
        .collect();

    let input = unsafe { in_ptr.slice_mut(group_start, group_end) };
    let output = unsafe { out_ptr.slice_mut(group_start, group_end) };

    let mut out_idx = 0usize;
    loop {
        let mut best: Option<usize> = None;
        for run in 0..num_runs {
            if cursors[run] >= ends[run] {
                continue;
            }
            match best {
                None => best = Some(run),
                Some(b) => {
                    if cmp3_record(&input[cursors[run] - group_start], &input[cursors[b] - group_start]) < 0 {
                        best = Some(run);
                    }
                }
            }
        }
        let Some(run) = best else { break };
        output[out_idx] = input[cursors[run] - group_start];
        cursors[run] += 1;
        out_idx += 1;
    }
}
