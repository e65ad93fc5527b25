//! Proquint workspace identities.
//!
//! A workspace identity is a random 64-bit value rendered as four
//! pronounceable five-letter quints (arxiv:0901.4016). Identities are
//! assigned once at creation and regenerated whenever a workspace is copied
//! or imported, because copies are logically distinct workspaces.

const CONSONANTS: &[u8; 16] = b"bdfghjklmnprstvz";
const VOWELS: &[u8; 4] = b"aiou";

/// Render one 16-bit value as a quint. Quints are big-endian: the most
/// significant nibble comes first.
pub fn u16_to_quint(v: u16) -> String {
    let chars = [
        CONSONANTS[usize::from((v >> 12) & 0xf)],
        VOWELS[usize::from((v >> 10) & 0x3)],
        CONSONANTS[usize::from((v >> 6) & 0xf)],
        VOWELS[usize::from((v >> 4) & 0x3)],
        CONSONANTS[usize::from(v & 0xf)],
    ];
    String::from_utf8_lossy(&chars).into_owned()
}

/// Render `v` as `quints` hyphen-separated quints, most significant first.
pub fn uint_to_quint(v: u64, quints: u32) -> String {
    debug_assert!(quints == 4 || v < 1u64.checked_shl(16 * quints).unwrap_or(u64::MAX));
    (0..quints)
        .rev()
        .map(|i| u16_to_quint((v >> (i * 16)) as u16))
        .collect::<Vec<_>>()
        .join("-")
}

/// Fresh workspace identity from 64 random bits.
pub fn random_id() -> String {
    uint_to_quint(rand::random::<u64>(), 4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vectors() {
        // 127.0.0.1 from the proquint paper.
        assert_eq!(uint_to_quint(0x7f00_0001, 2), "lusab-babad");
        assert_eq!(u16_to_quint(0x0000), "babab");
        assert_eq!(u16_to_quint(0xffff), "zuzuz");
    }

    #[test]
    fn four_quints_for_64_bits() {
        let id = uint_to_quint(u64::MAX, 4);
        assert_eq!(id, "zuzuz-zuzuz-zuzuz-zuzuz");
        assert_eq!(id.split('-').count(), 4);
    }

    #[test]
    fn random_ids_are_distinct() {
        let a = random_id();
        let b = random_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 4 * 5 + 3);
    }

    #[test]
    fn quints_are_pronounceable() {
        let id = random_id();
        for quint in id.split('-') {
            let bytes = quint.as_bytes();
            assert_eq!(bytes.len(), 5);
            for (i, b) in bytes.iter().enumerate() {
                if i % 2 == 0 {
                    assert!(CONSONANTS.contains(b));
                } else {
                    assert!(VOWELS.contains(b));
                }
            }
        }
    }
}
