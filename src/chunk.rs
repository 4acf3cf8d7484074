//! Chunk sizing policy for resumable transfers.
//!
//! The step function and the retry schedule must stay exactly as they are:
//! the storage proxy keys its resumable session bookkeeping on the same
//! boundaries, and a client that slices differently cannot resume.

use std::time::Duration;

pub const MIB: u64 = 1024 * 1024;

/// Delay before each chunk transmission attempt, first attempt included.
pub const CHUNK_RETRY_DELAYS: [Duration; 5] = [
    Duration::from_millis(0),
    Duration::from_millis(3000),
    Duration::from_millis(5000),
    Duration::from_millis(10000),
    Duration::from_millis(20000),
];

/// Chunk size as a step function of total file size.
pub fn chunk_size_for(total_bytes: u64) -> u64 {
    if total_bytes >= 5120 * MIB {
        200 * MIB
    } else if total_bytes >= 1024 * MIB {
        100 * MIB
    } else if total_bytes >= 100 * MIB {
        50 * MIB
    } else {
        15 * MIB
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_size_steps() {
        assert_eq!(chunk_size_for(50 * MIB), 15 * MIB);
        assert_eq!(chunk_size_for(150 * MIB), 50 * MIB);
        assert_eq!(chunk_size_for(1200 * MIB), 100 * MIB);
        assert_eq!(chunk_size_for(6000 * MIB), 200 * MIB);
    }

    #[test]
    fn test_chunk_size_boundaries() {
        assert_eq!(chunk_size_for(0), 15 * MIB);
        assert_eq!(chunk_size_for(100 * MIB - 1), 15 * MIB);
        assert_eq!(chunk_size_for(100 * MIB), 50 * MIB);
        assert_eq!(chunk_size_for(1024 * MIB), 100 * MIB);
        assert_eq!(chunk_size_for(5120 * MIB), 200 * MIB);
    }

    #[test]
    fn test_retry_schedule() {
        let millis: Vec<u64> = CHUNK_RETRY_DELAYS
            .iter()
            .map(|d| d.as_millis() as u64)
            .collect();
        assert_eq!(millis, vec![0, 3000, 5000, 10000, 20000]);
    }
}
