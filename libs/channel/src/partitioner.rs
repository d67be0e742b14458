//! Kafka-compatible partitioner.
//!
//! Keyed records are routed with murmur2 (`KAFKA_SEED`), the same hash the
//! Kafka default partitioner uses, so a match id lands on the same partition
//! in the in-process broker and on a real cluster with equal partition count.

use murmur2::{KAFKA_SEED, murmur2};
use rand::Rng;

/// Compute the target partition for a record.
///
/// - `explicit >= 0`: returned as is.
/// - non-empty key: `toPositive(murmur2(key)) % partition_count`.
/// - no key: random partition.
pub fn compute_partition(key: Option<&[u8]>, partition_count: i32, explicit: i32) -> i32 {
    debug_assert!(partition_count > 0, "partition_count must be positive");

    if explicit >= 0 {
        return explicit;
    }

    match key {
        Some(k) if !k.is_empty() => {
            let hash = murmur2(k, KAFKA_SEED);
            ((hash & 0x7fff_ffff) as i32) % partition_count
        }
        _ => rand::thread_rng().gen_range(0..partition_count),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_partition_passes_through() {
        assert_eq!(compute_partition(Some(b"key"), 10, 5), 5);
        assert_eq!(compute_partition(None, 10, 3), 3);
    }

    #[test]
    fn key_routing_is_deterministic() {
        let key = b"3f1c2a9e-5d0b-4b7e-9a51-0c6d8e2f7a10";
        let first = compute_partition(Some(key), 12, -1);
        for _ in 0..20 {
            assert_eq!(compute_partition(Some(key), 12, -1), first);
        }
        assert!((0..12).contains(&first));
    }

    #[test]
    fn empty_key_is_treated_as_unkeyed() {
        for _ in 0..50 {
            let p = compute_partition(Some(b""), 4, -1);
            assert!((0..4).contains(&p));
        }
    }

    #[test]
    fn single_partition_always_zero() {
        assert_eq!(compute_partition(Some(b"a"), 1, -1), 0);
        assert_eq!(compute_partition(None, 1, -1), 0);
    }
}
