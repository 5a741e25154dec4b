//! Ring Hash Functions
//!
//! Every process in the cluster, and any external router sharing the ring,
//! must place points with the same function or keys will route differently.

/// Hash used for both virtual points and lookup keys
pub trait RingHasher: Send + Sync + 'static {
    fn hash(&self, bytes: &[u8]) -> u64;
}

/// MD5 digest truncated to its first four bytes, read little-endian
///
/// Matches the placement scheme used by the external routing tier, so the
/// values only span the lower 32 bits of the ring.
#[derive(Debug, Clone, Copy, Default)]
pub struct Md5Hasher;

impl RingHasher for Md5Hasher {
    fn hash(&self, bytes: &[u8]) -> u64 {
        let digest = md5::compute(bytes);
        u32::from_le_bytes([digest.0[0], digest.0[1], digest.0[2], digest.0[3]]) as u64
    }
}

impl<F> RingHasher for F
where
    F: Fn(&[u8]) -> u64 + Send + Sync + 'static,
{
    fn hash(&self, bytes: &[u8]) -> u64 {
        self(bytes)
    }
}
