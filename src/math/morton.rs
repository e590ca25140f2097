//! Morton encoding (Z-order curve) for voxel addressing

/// Spread bits of a 21-bit integer into every third bit of a 64-bit integer.
///
/// Per-axis contributions land in disjoint bits, so `spread(x) | spread(y) << 1
/// | spread(z) << 2` is the Morton code and the terms can also be summed.
pub(crate) fn spread_bits(x: u32) -> u64 {
    let mut x = x as u64 & 0x1fffff; // 21 bits max
    x = (x | (x << 32)) & 0x1f00000000ffff;
    x = (x | (x << 16)) & 0x1f0000ff0000ff;
    x = (x | (x << 8)) & 0x100f00f00f00f00f;
    x = (x | (x << 4)) & 0x10c30c30c30c30c3;
    x = (x | (x << 2)) & 0x1249249249249249;
    x
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(x: u32, y: u32, z: u32) -> u64 {
        spread_bits(x) | (spread_bits(y) << 1) | (spread_bits(z) << 2)
    }

    #[test]
    fn test_brick_range_is_a_permutation() {
        let mut seen = [false; 64];
        for x in 0..4 {
            for y in 0..4 {
                for z in 0..4 {
                    let c = code(x, y, z) as usize;
                    assert!(c < 64);
                    assert!(!seen[c]);
                    seen[c] = true;
                }
            }
        }
    }

    #[test]
    fn test_ordering() {
        assert_eq!(code(1, 0, 0), 1);
        assert_eq!(code(0, 1, 0), 2);
        assert_eq!(code(0, 0, 1), 4);
        assert_eq!(code(1, 1, 1), 7);
        assert_eq!(spread_bits(0b11), 0b1001);
    }

    #[test]
    fn test_axes_are_additive() {
        assert_eq!(code(3, 2, 1), spread_bits(3) + (spread_bits(2) << 1) + (spread_bits(1) << 2));
    }
}
