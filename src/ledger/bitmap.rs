//! Packed bitmap over active ticks.
//!
//! A word maps 256 compressed ticks (tick / spacing); bit `b` of word `w`
//! is set iff compressed tick `w * 256 + b` is active. The bitmap always
//! mirrors the tick ledger's initialized set: flips are paired one-to-one
//! with activation and deactivation events. It exists to answer "next
//! active tick in this direction" in one word scan regardless of how many
//! ticks are active overall.
use std::collections::HashMap;

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickBitmap {
    words: HashMap<i16, U256>,
}

/// Compressed-tick coordinate, flooring toward negative infinity so the
/// grid stays aligned across zero.
fn compress(tick: i32, tick_spacing: i32) -> i32 {
    let mut compressed = tick / tick_spacing;
    if tick < 0 && tick % tick_spacing != 0 {
        compressed -= 1;
    }
    compressed
}

fn position(compressed: i32) -> (i16, u8) {
    ((compressed >> 8) as i16, (compressed & 0xff) as u8)
}

impl TickBitmap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggles the bit for `tick`. Errors if the tick is not on the
    /// spacing grid.
    pub fn flip(&mut self, tick: i32, tick_spacing: i32) -> Result<(), EngineError> {
        if tick % tick_spacing != 0 {
            return Err(EngineError::TickNotAligned { tick, spacing: tick_spacing });
        }
        let (word_pos, bit_pos) = position(tick / tick_spacing);
        let mask = U256::from(1u64) << bit_pos as usize;
        let word = self.words.entry(word_pos).or_default();
        *word ^= mask;
        if word.is_zero() {
            self.words.remove(&word_pos);
        }
        Ok(())
    }

    /// Whether the bit for an aligned tick is currently set.
    pub fn is_set(&self, tick: i32, tick_spacing: i32) -> bool {
        let (word_pos, bit_pos) = position(compress(tick, tick_spacing));
        self.words
            .get(&word_pos)
            .map(|word| word.bit(bit_pos as usize))
            .unwrap_or(false)
    }

    /// Nearest active tick at or beyond `tick` in the chosen direction,
    /// confined to `tick`'s own 256-bit word.
    ///
    /// Searching left (`lte`) includes `tick` itself; searching right
    /// starts one compressed tick above it. When the word holds no set
    /// bit on that side, the word-boundary tick is returned with
    /// `initialized == false` so the caller can resume from there.
    pub fn next_initialized_within_one_word(
        &self,
        tick: i32,
        tick_spacing: i32,
        lte: bool,
    ) -> (i32, bool) {
        let compressed = compress(tick, tick_spacing);

        if lte {
            let (word_pos, bit_pos) = position(compressed);
            // all bits at or to the right of the current bit
            let mask = (U256::from(1u64) << bit_pos as usize) - U256::from(1u64)
                + (U256::from(1u64) << bit_pos as usize);
            let masked = self.word(word_pos) & mask;

            let initialized = !masked.is_zero();
            let next = if initialized {
                let msb = (masked.bit_len() - 1) as i32;
                (compressed - (bit_pos as i32 - msb)) * tick_spacing
            } else {
                (compressed - bit_pos as i32) * tick_spacing
            };
            (next, initialized)
        } else {
            let (word_pos, bit_pos) = position(compressed + 1);
            // all bits at or to the left of the current bit
            let mask = !((U256::from(1u64) << bit_pos as usize) - U256::from(1u64));
            let masked = self.word(word_pos) & mask;

            let initialized = !masked.is_zero();
            let next = if initialized {
                let lsb = masked.trailing_zeros() as i32;
                (compressed + 1 + (lsb - bit_pos as i32)) * tick_spacing
            } else {
                (compressed + 1 + (255 - bit_pos as i32)) * tick_spacing
            };
            (next, initialized)
        }
    }

    fn word(&self, word_pos: i16) -> U256 {
        self.words.get(&word_pos).copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    #[test]
    fn test_flip_is_its_own_inverse() {
        let mut bitmap = TickBitmap::new();
        bitmap.flip(120, 60).unwrap();
        assert!(bitmap.is_set(120, 60));
        bitmap.flip(120, 60).unwrap();
        assert!(!bitmap.is_set(120, 60));
        assert_eq!(bitmap, TickBitmap::new());
    }

    #[test]
    fn test_flip_rejects_misaligned_tick() {
        let mut bitmap = TickBitmap::new();
        assert_eq!(
            bitmap.flip(61, 60),
            Err(EngineError::TickNotAligned { tick: 61, spacing: 60 })
        );
    }

    #[rstest]
    #[case(-1, 1)]
    #[case(-60, 60)]
    #[case(-61, 60)]
    #[case(255, 1)]
    #[case(-256, 1)]
    fn test_compress_floors(#[case] tick: i32, #[case] spacing: i32) {
        let compressed = compress(tick, spacing);
        assert!(compressed * spacing <= tick);
        assert!((compressed + 1) * spacing > tick);
    }

    #[test]
    fn test_search_left_includes_start() {
        let mut bitmap = TickBitmap::new();
        bitmap.flip(60, 60).unwrap();
        let (next, initialized) = bitmap.next_initialized_within_one_word(60, 60, true);
        assert_eq!((next, initialized), (60, true));
    }

    #[test]
    fn test_search_right_excludes_start() {
        let mut bitmap = TickBitmap::new();
        bitmap.flip(60, 60).unwrap();
        bitmap.flip(180, 60).unwrap();
        let (next, initialized) = bitmap.next_initialized_within_one_word(60, 60, false);
        assert_eq!((next, initialized), (180, true));
    }

    #[test]
    fn test_search_left_finds_lower_neighbor() {
        let mut bitmap = TickBitmap::new();
        bitmap.flip(-120, 60).unwrap();
        let (next, initialized) = bitmap.next_initialized_within_one_word(-61, 60, true);
        assert_eq!((next, initialized), (-120, true));
    }

    #[test]
    fn test_search_misses_return_word_boundary() {
        let bitmap = TickBitmap::new();

        let (next, initialized) = bitmap.next_initialized_within_one_word(0, 1, true);
        assert_eq!((next, initialized), (0, false));

        let (next, initialized) = bitmap.next_initialized_within_one_word(0, 1, false);
        assert_eq!((next, initialized), (255, false));

        let (next, initialized) = bitmap.next_initialized_within_one_word(-1, 1, true);
        assert_eq!((next, initialized), (-256, false));
    }

    #[test]
    fn test_search_does_not_skip_set_bits() {
        let mut bitmap = TickBitmap::new();
        for tick in [-240, -120, 0, 60, 240] {
            bitmap.flip(tick, 60).unwrap();
        }
        // walking left from 250 must visit each set tick in order
        let mut cursor = 250;
        let mut seen = Vec::new();
        while let (next, true) = bitmap.next_initialized_within_one_word(cursor, 60, true) {
            seen.push(next);
            cursor = next - 1;
        }
        assert_eq!(seen, vec![240, 60, 0, -120, -240]);
    }

    #[test]
    fn test_result_within_one_word_of_query() {
        let bitmap = TickBitmap::new();
        for start in [-1000, -257, -1, 0, 1, 255, 1000] {
            let (next, _) = bitmap.next_initialized_within_one_word(start, 1, true);
            assert!((start - next) < 256, "left search from {start} jumped to {next}");
            let (next, _) = bitmap.next_initialized_within_one_word(start, 1, false);
            assert!((next - start) <= 256, "right search from {start} jumped to {next}");
        }
    }
}
