//! Distributed sample-partition: after quickselect has already partitioned
//! each worker's local array into `W` pivot-delimited sub-ranges, this
//! pipelines the asynchronous bounded-buffer redistribution that routes
//! every record to its owning worker.

use crate::config::{BUF_CHUNK, SAMPLE_PARTITION_TAG};
use crate::error::SortError;
use crate::quickselect::distributed_quickselect;
use crate::record::{bytes_to_records, records_to_bytes, Record, RECORD_SIZE};
use crate::transport::Transport;
use crate::worker::{local_length, local_start};

/// Runs quickselect to find `world_size - 1` pivots splitting `arr` (a
/// worker's post-shuffle local array of `total_length`-scaled share) into
/// the `W` sub-ranges that belong to each worker, then drains those
/// sub-ranges into `out`, returning the number of records received (must
/// equal this worker's `local_length(total_length)`).
pub fn distributed_sample_partition<T: Transport>(
    transport: &T,
    arr: &mut [Record],
    out: &mut [Record],
    total_length: usize,
) -> Result<usize, SortError> {
    let world_size = transport.world_size();
    let world_rank = transport.world_rank();
    let local_len = arr.len();

    if world_size == 1 {
        out[..local_len].copy_from_slice(arr);
        return Ok(local_len);
    }

    let src_local_length = local_length(world_rank, world_size, total_length);

    // Quickselect's recursion resolves the same global rank on every worker
    // in lockstep, so the target list is simply the global cut points
    // themselves, not an offset relative to this worker's own sub-array.
    let targets: Vec<usize> = (1..world_size)
        .map(|i| local_start(i, world_size, total_length))
        .collect();
    let results = distributed_quickselect(transport, arr, &targets)?;

    let mut sample_idxs = vec![0usize; world_size];
    for (i, r) in results.iter().enumerate() {
        sample_idxs[i] = r.local_split;
    }
    sample_idxs[world_size - 1] = local_len;

    let mut sample_scan_idxs = vec![0usize; world_size];
    for i in 1..world_size {
        sample_scan_idxs[i] = sample_idxs[i - 1];
    }

    // 1. Copy our own sub-range directly into the output.
    let mut num_received = sample_idxs[world_rank] - sample_scan_idxs[world_rank];
    out[..num_received].copy_from_slice(&arr[sample_scan_idxs[world_rank]..sample_idxs[world_rank]]);
    sample_scan_idxs[world_rank] = sample_idxs[world_rank];

    // 2. Post one initial request per peer slot.
    let mut requests: Vec<Option<T::Request>> = (0..world_size).map(|_| None).collect();
    let mut active = 0usize;
    for i in 0..world_size {
        if i == world_rank {
            let remaining = src_local_length - num_received;
            if remaining > 0 {
                let chunk = remaining.min(BUF_CHUNK);
                requests[i] = Some(transport.irecv(chunk * RECORD_SIZE, None, Some(SAMPLE_PARTITION_TAG))?);
                active += 1;
            }
        } else if sample_scan_idxs[i] < sample_idxs[i] {
            let chunk = (sample_idxs[i] - sample_scan_idxs[i]).min(BUF_CHUNK);
            let bytes = records_to_bytes(&arr[sample_scan_idxs[i]..sample_scan_idxs[i] + chunk]);
            requests[i] = Some(transport.isend(bytes, i, SAMPLE_PARTITION_TAG)?);
            sample_scan_idxs[i] += chunk;
            active += 1;
        }
    }

    // 3. Drain until every peer slot has been retired.
    while active > 0 {
        let (index, completion) = transport.waitany(&mut requests)?;
        let mut keep_active = false;

        if index == world_rank {
            let data = completion
                .data
                .ok_or_else(|| SortError::InvariantViolation("receive completion carried no data".to_string()))?;
            let received = bytes_to_records(&data);
            let n = received.len();
            out[num_received..num_received + n].copy_from_slice(&received);
            num_received += n;

            let remaining = src_local_length - num_received;
            if remaining > 0 {
                let chunk = remaining.min(BUF_CHUNK);
                requests[index] = Some(transport.irecv(chunk * RECORD_SIZE, None, Some(SAMPLE_PARTITION_TAG))?);
                keep_active = true;
            }
        } else {
            let remaining = sample_idxs[index].saturating_sub(sample_scan_idxs[index]);
            if remaining > 0 {
                let chunk = remaining.min(BUF_CHUNK);
                let bytes = records_to_bytes(&arr[sample_scan_idxs[index]..sample_scan_idxs[index] + chunk]);
                requests[index] = Some(transport.isend(bytes, index, SAMPLE_PARTITION_TAG)?);
                sample_scan_idxs[index] += chunk;
                keep_active = true;
            }
        }

        if !keep_active {
            requests[index] = None;
            active -= 1;
        }
    }

    if num_received != src_local_length {
        return Err(SortError::InvariantViolation(format!(
            "sample-partition conservation violated on rank {world_rank}: received {num_received}, expected {src_local_length}"
        )));
    }

    Ok(num_received)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_worker_is_a_direct_copy() {
        struct NoopTransport;
        impl Transport for NoopTransport {
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
            fn recv(&self, _: &mut [u8], _: Option<usize>, _: Option<i32>) -> Result<crate::transport::Status, SortError> {
                unreachable!()
            }
            fn isend(&self, _: Vec<u8>, _: usize, _: i32) -> Result<Self::Request, SortError> {
                unreachable!()
            }
            fn irecv(&self, _: usize, _: Option<usize>, _: Option<i32>) -> Result<Self::Request, SortError> {
                unreachable!()
            }
            fn wait(&self, _: Self::Request) -> Result<crate::transport::Completion, SortError> {
                unreachable!()
            }
            fn waitany(
                &self,
                _: &mut [Option<Self::Request>],
            ) -> Result<(usize, crate::transport::Completion), SortError> {
                unreachable!()
            }
            fn cancel(&self, _: Self::Request) -> Result<(), SortError> {
                unreachable!()
            }
        }

        let transport = NoopTransport;
        let mut arr: Vec<Record> = (0..8u64).map(|k| Record::new(k, 0)).collect();
        let mut out = vec![Record::new(0, 0); 8];
        let n = distributed_sample_partition(&transport, &mut arr, &mut out, 8).unwrap();
        assert_eq!(n, 8);
        for i in 0..8 {
            assert_eq!(out[i].key, i as u64);
        }
    }
}
