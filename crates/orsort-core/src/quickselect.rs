//! Distributed quickselect: finds `W - 1` global order statistics across
//! worker-local arrays via master-elected pivot broadcast and Hoare
//! partitioning.
//!
//! This stage operates on already-shuffled data, so unlike `shuffle.rs` its
//! partitioning is deliberately not oblivious — it is plain data-dependent
//! Hoare partitioning, matching the partially-oblivious samplesort design
//! called out in the purpose & scope section.

use crate::config::QUICKSELECT_TAG;
use crate::error::SortError;
use crate::record::{cmp3_record_sample, Record, Sample};
use crate::transport::Transport;

/// Output of quickselect for one target rank: the pivot sample and the
/// local position (on this worker) at which records `< sample` end.
#[derive(Debug, Clone, Copy)]
pub struct QuickselectResult {
    pub sample: Sample,
    pub local_split: usize,
}

/// Finds a pivot for every entry of `targets` (sorted, global ranks) by
/// recursively narrowing `arr`'s window.
pub fn distributed_quickselect<T: Transport>(
    transport: &T,
    arr: &mut [Record],
    targets: &[usize],
) -> Result<Vec<QuickselectResult>, SortError> {
    let mut results: Vec<Option<QuickselectResult>> = vec![None; targets.len()];
    let len = arr.len();
    recurse(transport, arr, 0, len, targets, &mut results)?;
    results
        .into_iter()
        .enumerate()
        .map(|(i, r)| {
            r.ok_or_else(|| {
                SortError::InvariantViolation(format!("quickselect produced no sample for target #{i}"))
            })
        })
        .collect()
}

fn send_bool<T: Transport>(transport: &T, value: bool, dest: usize) -> Result<(), SortError> {
    transport.send(&[value as u8], dest, QUICKSELECT_TAG)
}

fn recv_bool<T: Transport>(transport: &T, src: usize) -> Result<bool, SortError> {
    let mut buf = [0u8; 1];
    transport.recv(&mut buf, Some(src), Some(QUICKSELECT_TAG))?;
    Ok(buf[0] != 0)
}

fn recurse<T: Transport>(
    transport: &T,
    arr: &mut [Record],
    left: usize,
    right: usize,
    targets: &[usize],
    results: &mut [Option<QuickselectResult>],
) -> Result<(), SortError> {
    if targets.is_empty() {
        return Ok(());
    }

    let world_size = transport.world_size();
    let world_rank = transport.world_rank();

    // 1. Readiness round + master election (lowest-ranked ready worker).
    let my_ready = left < right;
    let mut ready = vec![false; world_size];
    ready[world_rank] = my_ready;
    for peer in 0..world_size {
        if peer != world_rank {
            send_bool(transport, my_ready, peer)?;
        }
    }
    for peer in 0..world_size {
        if peer != world_rank {
            ready[peer] = recv_bool(transport, peer)?;
        }
    }
    let master_rank = ready
        .iter()
        .position(|&r| r)
        .ok_or_else(|| SortError::InvariantViolation("no ready worker in quickselect round".to_string()))?;

    // 2. Pivot broadcast: master picks arr[left] (data is pre-shuffled).
    let pivot: Sample = if world_rank == master_rank {
        let pivot = Sample::from_record(&arr[left]);
        for peer in 0..world_size {
            if peer != world_rank {
                transport.send(&pivot.to_bytes(), peer, QUICKSELECT_TAG)?;
            }
        }
        pivot
    } else {
        let mut buf = [0u8; 16];
        transport.recv(&mut buf, Some(master_rank), Some(QUICKSELECT_TAG))?;
        Sample::from_bytes(&buf)
    };

    // 3. Local Hoare partition of [left, right) around pivot. Master
    // excludes `left` itself from the scan (it holds the pivot).
    let mut scan_left = left + (world_rank == master_rank) as usize;
    let mut scan_right = right;
    while scan_left < scan_right {
        if cmp3_record_sample(&arr[scan_left], &pivot) <= 0 {
            scan_left += 1;
            continue;
        }
        if cmp3_record_sample(&arr[scan_right - 1], &pivot) > 0 {
            scan_right -= 1;
            continue;
        }
        arr.swap(scan_left, scan_right - 1);
        scan_left += 1;
        scan_right -= 1;
    }
    let mut partition_right = scan_right;
    if world_rank == master_rank {
        arr.swap(left, partition_right - 1);
        partition_right -= 1;
    }
    // The master's finalized pivot now sits at `partition_right`; the right
    // window must start just past it, or the master re-includes its own
    // pivot record in the recursion and `cur_pivot` never advances.
    let partition_left = partition_right + (world_rank == master_rank) as usize;

    // 4. Global rank of the pivot: master sums every peer's partition_right.
    let cur_pivot: usize = if world_rank == master_rank {
        let mut sum = partition_right;
        for peer in 0..world_size {
            if peer != world_rank {
                let mut buf = [0u8; 8];
                transport.recv(&mut buf, Some(peer), Some(QUICKSELECT_TAG))?;
                sum += usize::from_le_bytes(buf);
            }
        }
        for peer in 0..world_size {
            if peer != world_rank {
                transport.send(&sum.to_le_bytes(), peer, QUICKSELECT_TAG)?;
            }
        }
        sum
    } else {
        transport.send(&partition_right.to_le_bytes(), master_rank, QUICKSELECT_TAG)?;
        let mut buf = [0u8; 8];
        transport.recv(&mut buf, Some(master_rank), Some(QUICKSELECT_TAG))?;
        usize::from_le_bytes(buf)
    };

    // 5. Target dispatch via binary search on the (sorted) global target ranks.
    let geq_idx = targets.partition_point(|&t| t < cur_pivot);
    let is_exact = geq_idx < targets.len() && targets[geq_idx] == cur_pivot;
    let gt_idx = geq_idx + is_exact as usize;

    if is_exact {
        results[geq_idx] = Some(QuickselectResult {
            sample: pivot,
            local_split: partition_right,
        });
    }

    recurse(transport, arr, left, partition_right, &targets[..geq_idx], &mut results[..geq_idx])?;
    recurse(transport, arr, partition_left, right, &targets[gt_idx..], &mut results[gt_idx..])?;

    Ok(())
}
