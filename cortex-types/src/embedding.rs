//! Packed binary codec for embedding vectors.
//!
//! A vector is persisted as a densely packed little-endian IEEE-754 f32
//! sequence, `4 * D` bytes for dimension `D`. Readers recover the length by
//! dividing the byte length by four. This is an on-disk format; the
//! endianness must never change or existing documents become unreadable.

/// Pack a vector into little-endian f32 bytes.
pub fn vector_to_binary(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Unpack little-endian f32 bytes into a vector.
///
/// Trailing bytes that do not form a whole f32 are ignored.
pub fn binary_to_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_is_bit_exact() {
        let vector = vec![
            0.0_f32,
            -0.0,
            1.0,
            -1.5,
            f32::MIN_POSITIVE,
            f32::MAX,
            f32::MIN,
            std::f32::consts::PI,
        ];
        let back = binary_to_vector(&vector_to_binary(&vector));
        assert_eq!(back.len(), vector.len());
        for (a, b) in vector.iter().zip(&back) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn byte_length_is_four_per_dimension() {
        let vector = vec![0.5_f32; 1024];
        assert_eq!(vector_to_binary(&vector).len(), 4 * 1024);
    }

    #[test]
    fn known_little_endian_layout() {
        // 1.0f32 = 0x3F800000, little-endian on disk.
        assert_eq!(vector_to_binary(&[1.0]), vec![0x00, 0x00, 0x80, 0x3F]);
        assert_eq!(binary_to_vector(&[0x00, 0x00, 0x80, 0x3F]), vec![1.0]);
    }

    #[test]
    fn empty_vector() {
        assert!(vector_to_binary(&[]).is_empty());
        assert!(binary_to_vector(&[]).is_empty());
    }

    #[test]
    fn trailing_partial_float_ignored() {
        let mut bytes = vector_to_binary(&[2.0]);
        bytes.push(0xAB);
        assert_eq!(binary_to_vector(&bytes), vec![2.0]);
    }
}
