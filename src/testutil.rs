//! Shared helpers for tests.

use rand::{distributions::Alphanumeric, Rng};

/// Deterministic key for the given ordinal, zero-padded so lexicographic
/// and numeric order agree.
pub(crate) fn test_key(i: usize) -> Vec<u8> {
    format!("bitsack-key-{i:09}").into_bytes()
}

/// Random alphanumeric value of the given length.
pub(crate) fn random_value(len: usize) -> Vec<u8> {
    rand::thread_rng().sample_iter(&Alphanumeric).take(len).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_sort_numerically() {
        assert!(test_key(9) < test_key(10));
        assert_eq!(random_value(32).len(), 32);
    }
}
