//! The complete compile-time configuration surface of the core. There is no
//! runtime config file or environment tuning; everything a caller can vary
//! is injected as `WorkerCoords` (see `worker.rs`).

/// First-pass run length and merge fan-in for the external merge sort.
pub const BUF: usize = 1024;

/// Bound on in-flight records per peer during sample-partition.
pub const BUF_CHUNK: usize = 512;

/// Batch size for streaming selection-sampling coin draws during shuffle marking.
pub const MARK_COINS: usize = 2048;

/// Chunk size used when scanning swap_range in bulk (reserved for vectorized
/// implementations of cmov_swap over large payloads).
pub const SWAP_CHUNK: usize = 4096;

/// Transport tag used for the quickselect readiness/pivot/partition-count exchange.
pub const QUICKSELECT_TAG: i32 = 0x51_45;

/// Transport tag used for bulk record transfer during sample-partition.
pub const SAMPLE_PARTITION_TAG: i32 = 0x5A_50;

/// Round `n` up to the next power of two, the padding rule shuffle inputs
/// must satisfy before entering `shuffle`.
pub fn pad_to_power_of_two(n: usize) -> usize {
    n.next_power_of_two()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_non_power_of_two_up() {
        assert_eq!(pad_to_power_of_two(5), 8);
        assert_eq!(pad_to_power_of_two(8), 8);
        assert_eq!(pad_to_power_of_two(1), 1);
        assert_eq!(pad_to_power_of_two(0), 1);
    }
}
