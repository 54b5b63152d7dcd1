//! 32-bit MurmurHash3 (x86 variant).
//!
//! The cuckoo filter derives both its fingerprints and its bucket indices
//! from this function, so every constant below is load-bearing.

const C1: u32 = 0xcc9e_2d51;
const C2: u32 = 0x1b87_3593;

/// Hash `data` with the given `seed`.
#[must_use]
pub fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    let mut h = seed;

    let mut blocks = data.chunks_exact(4);
    for block in &mut blocks {
        let k = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
        h ^= mix_k(k);
        h = h.rotate_left(13);
        h = h.wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let tail = blocks.remainder();
    if !tail.is_empty() {
        let mut k = 0u32;
        for (i, byte) in tail.iter().enumerate() {
            k ^= u32::from(*byte) << (8 * i);
        }
        h ^= mix_k(k);
    }

    // Length is folded in modulo 2^32, matching the reference algorithm.
    h ^= data.len() as u32;
    fmix32(h)
}

#[inline]
fn mix_k(k: u32) -> u32 {
    k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2)
}

#[inline]
fn fmix32(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        assert_eq!(murmur3_32(b"", 0), 0);
        assert_eq!(murmur3_32(b"", 1), 0x514e_28b7);
        assert_eq!(murmur3_32(b"", 0xffff_ffff), 0x81f1_6f39);
    }

    #[test]
    fn test_single_zero_block() {
        assert_eq!(murmur3_32(&[0, 0, 0, 0], 0), 0x2362_f9de);
    }

    #[test]
    fn test_reference_strings() {
        assert_eq!(murmur3_32(b"Hello, world!", 0x9747_b28c), 0x2488_4cba);
        assert_eq!(
            murmur3_32(b"The quick brown fox jumps over the lazy dog", 0x9747_b28c),
            0x2fa8_26cd
        );
        assert_eq!(murmur3_32(b"aaaa", 0x9747_b28c), 0x5a97_808a);
    }

    #[test]
    fn test_tail_lengths() {
        assert_eq!(murmur3_32(b"a", 0x9747_b28c), 0x7fa0_9ea6);
        assert_eq!(murmur3_32(b"ab", 0), 0x9bbf_d75f);
        assert_eq!(murmur3_32(b"abc", 0x9747_b28c), 0xc84a_62dd);
    }

    #[test]
    fn test_deterministic() {
        let a = murmur3_32(b"example.com", 0x9747_b28c);
        let b = murmur3_32(b"example.com", 0x9747_b28c);
        assert_eq!(a, b);
        assert_eq!(a, 0xc203_d6ed);
        assert_ne!(a, murmur3_32(b"example.com", 0));
    }
}
