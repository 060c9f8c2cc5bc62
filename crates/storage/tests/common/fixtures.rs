use bytes::Bytes;
use deeds_core::Request;

pub const ORIGIN: &str = "https://deeds.example.test";

/// GET request for `path` under the test origin.
pub fn request(path: &str) -> Request {
    Request::for_path(ORIGIN, path).unwrap()
}

/// Generate deterministic test data using a seeded pseudo-random generator
/// Same seed produces same output (reproducible tests)
pub fn seeded_body(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    for chunk in data.chunks_mut(8) {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_body_deterministic() {
        assert_eq!(seeded_body(42, 1000), seeded_body(42, 1000));
        assert_ne!(seeded_body(42, 1000), seeded_body(43, 1000));
    }
}
