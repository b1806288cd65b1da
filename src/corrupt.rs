//! Payload corruption strategies simulating transmission damage.
//!
//! Every strategy maps `(text, randomness)` to a mutated text.  Mutations
//! operate on character positions, and characters pushed outside printable
//! ASCII by a bit flip are remapped back into `[32, 126]`.  What changed is
//! reported on the `log` diagnostic channel; the returned text is the only
//! functional output, so control values computed elsewhere stay untouched.
//!
//! All strategies leave empty input unchanged, and the position-pair
//! strategies (`CharDeletion`, `CharSwap`) additionally leave single
//! characters unchanged.

use std::fmt;
use std::str::FromStr;

use rand::seq::index::sample;
use rand::Rng;
use thiserror::Error;

/// Inclusive printable-ASCII range kept by the bit-flip remap rule.
const PRINTABLE_MIN: u32 = 32;
const PRINTABLE_MAX: u32 = 126;

/// Errors produced by strategy selection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrategyParseError {
    /// The name does not match any of the eight recognised strategies.
    #[error("unknown corruption strategy: {0}")]
    UnknownStrategy(String),
}

/// A payload corruption strategy, in menu order (`1`..`8`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Flip one random bit of one random character.
    BitFlip,
    /// Replace one random character with a different uppercase letter.
    CharSubstitution,
    /// Delete one random character.
    CharDeletion,
    /// Insert one random lowercase letter at a random point.
    CharInsertion,
    /// Swap two adjacent characters.
    CharSwap,
    /// Flip one bit in each of several distinct positions.
    MultiBitFlip,
    /// Replace a contiguous run of characters with random uppercase letters.
    BurstError,
    /// Identity: forward the payload untouched.
    None,
}

/// All strategies, in menu order (`1`..`8`).
pub const STRATEGIES: [Strategy; 8] = [
    Strategy::BitFlip,
    Strategy::CharSubstitution,
    Strategy::CharDeletion,
    Strategy::CharInsertion,
    Strategy::CharSwap,
    Strategy::MultiBitFlip,
    Strategy::BurstError,
    Strategy::None,
];

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::BitFlip => "bit-flip",
            Strategy::CharSubstitution => "char-substitution",
            Strategy::CharDeletion => "char-deletion",
            Strategy::CharInsertion => "char-insertion",
            Strategy::CharSwap => "char-swap",
            Strategy::MultiBitFlip => "multi-bit-flip",
            Strategy::BurstError => "burst-error",
            Strategy::None => "none",
        };
        write!(f, "{name}")
    }
}

impl FromStr for Strategy {
    type Err = StrategyParseError;

    /// Parse a case-insensitive strategy name (dashes and underscores are
    /// interchangeable) or its menu number (`1`..`8`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalised = s.trim().to_ascii_lowercase().replace('_', "-");
        match normalised.as_str() {
            "1" | "bit-flip" => Ok(Strategy::BitFlip),
            "2" | "char-substitution" | "substitution" => Ok(Strategy::CharSubstitution),
            "3" | "char-deletion" | "deletion" => Ok(Strategy::CharDeletion),
            "4" | "char-insertion" | "insertion" => Ok(Strategy::CharInsertion),
            "5" | "char-swap" | "swap" => Ok(Strategy::CharSwap),
            "6" | "multi-bit-flip" => Ok(Strategy::MultiBitFlip),
            "7" | "burst-error" | "burst" => Ok(Strategy::BurstError),
            "8" | "none" => Ok(Strategy::None),
            _ => Err(StrategyParseError::UnknownStrategy(s.to_string())),
        }
    }
}

/// Apply `strategy` to `data`, drawing all randomness from `rng`.
///
/// Returns the mutated text.  Positions are character indices, not byte
/// offsets, so multi-byte characters are mutated as units.
pub fn corrupt<R: Rng + ?Sized>(data: &str, strategy: Strategy, rng: &mut R) -> String {
    if data.is_empty() {
        return data.to_string();
    }
    match strategy {
        Strategy::BitFlip => bit_flip(data, rng),
        Strategy::CharSubstitution => char_substitution(data, rng),
        Strategy::CharDeletion => char_deletion(data, rng),
        Strategy::CharInsertion => char_insertion(data, rng),
        Strategy::CharSwap => char_swap(data, rng),
        Strategy::MultiBitFlip => multi_bit_flip(data, rng),
        Strategy::BurstError => burst_error(data, rng),
        Strategy::None => data.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Per-strategy implementations
// ---------------------------------------------------------------------------

/// Flip one random bit of a code point, remapping out-of-range results
/// back into printable ASCII via `(value % 95) + 32`.
fn flip_one_bit<R: Rng + ?Sized>(c: char, rng: &mut R) -> char {
    let bit = rng.random_range(0..8u32);
    let mut value = (c as u32) ^ (1u32 << bit);
    if !(PRINTABLE_MIN..=PRINTABLE_MAX).contains(&value) {
        value = (value % 95) + PRINTABLE_MIN;
    }
    // The remap guarantees an ASCII result.
    value as u8 as char
}

fn random_uppercase<R: Rng + ?Sized>(rng: &mut R) -> char {
    (b'A' + rng.random_range(0..26u8)) as char
}

fn random_lowercase<R: Rng + ?Sized>(rng: &mut R) -> char {
    (b'a' + rng.random_range(0..26u8)) as char
}

fn bit_flip<R: Rng + ?Sized>(data: &str, rng: &mut R) -> String {
    let mut chars: Vec<char> = data.chars().collect();
    let pos = rng.random_range(0..chars.len());
    let original = chars[pos];
    chars[pos] = flip_one_bit(original, rng);
    log::debug!(
        "[corrupt] bit-flip '{original}' -> '{}' at position {pos}",
        chars[pos]
    );
    chars.into_iter().collect()
}

fn char_substitution<R: Rng + ?Sized>(data: &str, rng: &mut R) -> String {
    let mut chars: Vec<char> = data.chars().collect();
    let pos = rng.random_range(0..chars.len());
    let original = chars[pos];
    let mut replacement = original;
    while replacement == original {
        replacement = random_uppercase(rng);
    }
    chars[pos] = replacement;
    log::debug!("[corrupt] substitution '{original}' -> '{replacement}' at position {pos}");
    chars.into_iter().collect()
}

fn char_deletion<R: Rng + ?Sized>(data: &str, rng: &mut R) -> String {
    let mut chars: Vec<char> = data.chars().collect();
    if chars.len() < 2 {
        return data.to_string();
    }
    let pos = rng.random_range(0..chars.len());
    let deleted = chars.remove(pos);
    log::debug!("[corrupt] deleted '{deleted}' at position {pos}");
    chars.into_iter().collect()
}

fn char_insertion<R: Rng + ?Sized>(data: &str, rng: &mut R) -> String {
    let mut chars: Vec<char> = data.chars().collect();
    let pos = rng.random_range(0..=chars.len());
    let inserted = random_lowercase(rng);
    chars.insert(pos, inserted);
    log::debug!("[corrupt] inserted '{inserted}' at position {pos}");
    chars.into_iter().collect()
}

fn char_swap<R: Rng + ?Sized>(data: &str, rng: &mut R) -> String {
    let mut chars: Vec<char> = data.chars().collect();
    if chars.len() < 2 {
        return data.to_string();
    }
    let pos = rng.random_range(0..chars.len() - 1);
    chars.swap(pos, pos + 1);
    log::debug!(
        "[corrupt] swapped '{}' and '{}' at position {pos}",
        chars[pos + 1],
        chars[pos]
    );
    chars.into_iter().collect()
}

fn multi_bit_flip<R: Rng + ?Sized>(data: &str, rng: &mut R) -> String {
    let mut chars: Vec<char> = data.chars().collect();
    let upper = chars.len().min(4);
    // A single character gets exactly one flip; the 2..=upper draw needs
    // at least two positions to pick from.
    let count = if upper < 2 { upper } else { rng.random_range(2..=upper) };
    let positions = sample(rng, chars.len(), count);
    for pos in positions {
        let original = chars[pos];
        chars[pos] = flip_one_bit(original, rng);
        log::debug!(
            "[corrupt] multi-bit-flip '{original}' -> '{}' at position {pos}",
            chars[pos]
        );
    }
    chars.into_iter().collect()
}

fn burst_error<R: Rng + ?Sized>(data: &str, rng: &mut R) -> String {
    let mut chars: Vec<char> = data.chars().collect();
    if chars.len() < 3 {
        return multi_bit_flip(data, rng);
    }
    let run = rng.random_range(3..=chars.len().min(8));
    let start = rng.random_range(0..=chars.len() - run);
    for slot in chars.iter_mut().skip(start).take(run) {
        *slot = random_uppercase(rng);
    }
    log::debug!(
        "[corrupt] burst of {run} characters at positions {start}-{}",
        start + run - 1
    );
    chars.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn rng(seed: u64) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(seed)
    }

    #[test]
    fn empty_input_is_untouched_by_every_strategy() {
        for strategy in STRATEGIES {
            assert_eq!(corrupt("", strategy, &mut rng(1)), "");
        }
    }

    #[test]
    fn none_is_the_identity() {
        assert_eq!(corrupt("HELLO", Strategy::None, &mut rng(1)), "HELLO");
    }

    #[test]
    fn deletion_and_swap_skip_single_characters() {
        assert_eq!(corrupt("X", Strategy::CharDeletion, &mut rng(1)), "X");
        assert_eq!(corrupt("X", Strategy::CharSwap, &mut rng(1)), "X");
    }

    #[test]
    fn bit_flip_changes_one_position_and_stays_printable() {
        for seed in 0..32 {
            let out = corrupt("HELLO", Strategy::BitFlip, &mut rng(seed));
            assert_eq!(out.len(), 5);
            assert_ne!(out, "HELLO", "seed {seed} produced no visible change");
            let differing = out
                .chars()
                .zip("HELLO".chars())
                .filter(|(a, b)| a != b)
                .count();
            assert_eq!(differing, 1);
            assert!(out.bytes().all(|b| (32..=126).contains(&b)));
        }
    }

    #[test]
    fn substitution_swaps_in_a_different_uppercase_letter() {
        for seed in 0..32 {
            let out = corrupt("HELLO", Strategy::CharSubstitution, &mut rng(seed));
            assert_eq!(out.len(), 5);
            let changed: Vec<(char, char)> = out
                .chars()
                .zip("HELLO".chars())
                .filter(|(a, b)| a != b)
                .collect();
            assert_eq!(changed.len(), 1);
            assert!(changed[0].0.is_ascii_uppercase());
        }
    }

    #[test]
    fn deletion_removes_exactly_one_character() {
        let out = corrupt("HELLO", Strategy::CharDeletion, &mut rng(7));
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn insertion_adds_one_lowercase_letter() {
        for seed in 0..16 {
            let out = corrupt("HELLO", Strategy::CharInsertion, &mut rng(seed));
            assert_eq!(out.len(), 6);
            let added: Vec<char> = out.chars().filter(|c| c.is_ascii_lowercase()).collect();
            assert_eq!(added.len(), 1);
        }
    }

    #[test]
    fn swap_of_two_characters_is_deterministic() {
        // Only one swap position exists for a two-character payload.
        assert_eq!(corrupt("AB", Strategy::CharSwap, &mut rng(99)), "BA");
    }

    #[test]
    fn multi_bit_flip_touches_two_to_four_positions() {
        for seed in 0..32 {
            let out = corrupt("HELLOWORLD", Strategy::MultiBitFlip, &mut rng(seed));
            assert_eq!(out.len(), 10);
            let differing = out
                .chars()
                .zip("HELLOWORLD".chars())
                .filter(|(a, b)| a != b)
                .count();
            // Flips are independent, so a remapped flip can hand back the
            // original character; never more than four positions change.
            assert!(differing <= 4, "seed {seed} changed {differing} positions");
            assert!(out.bytes().all(|b| (32..=126).contains(&b)));
        }
    }

    #[test]
    fn multi_bit_flip_handles_a_single_character() {
        let out = corrupt("o", Strategy::MultiBitFlip, &mut rng(3));
        assert_eq!(out.len(), 1);
        assert!(out.bytes().all(|b| (32..=126).contains(&b)));
    }

    #[test]
    fn burst_replaces_a_contiguous_uppercase_run() {
        for seed in 0..32 {
            let original = "abcdefghij";
            let out = corrupt(original, Strategy::BurstError, &mut rng(seed));
            assert_eq!(out.len(), original.len());

            // The original is all lowercase, so the replaced run is exactly
            // the uppercase span.
            let changed: Vec<usize> = out
                .char_indices()
                .filter(|(_, c)| c.is_ascii_uppercase())
                .map(|(i, _)| i)
                .collect();
            assert!(
                (3..=8).contains(&changed.len()),
                "seed {seed} replaced {} characters",
                changed.len()
            );
            let contiguous = changed.windows(2).all(|pair| pair[1] == pair[0] + 1);
            assert!(contiguous, "seed {seed} produced a non-contiguous burst");
        }
    }

    #[test]
    fn burst_falls_back_to_bit_flips_on_short_input() {
        let out = corrupt("ab", Strategy::BurstError, &mut rng(5));
        assert_eq!(out.len(), 2);
        assert!(out.bytes().all(|b| (32..=126).contains(&b)));
    }

    #[test]
    fn parse_names_and_numbers() {
        assert_eq!("1".parse::<Strategy>().unwrap(), Strategy::BitFlip);
        assert_eq!("8".parse::<Strategy>().unwrap(), Strategy::None);
        assert_eq!("bit_flip".parse::<Strategy>().unwrap(), Strategy::BitFlip);
        assert_eq!("BURST".parse::<Strategy>().unwrap(), Strategy::BurstError);
        assert!("9".parse::<Strategy>().is_err());
    }
}
