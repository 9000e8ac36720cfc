//! Shortcut generation
//!
//! Shortcuts are random, not secret: they only need to make collisions unlikely

use rand::Rng;

/// Characters a shortcut is made of
const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Default length of a generated shortcut
pub const DEFAULT_LENGTH: usize = 8;

/// Generate a random shortcut of exactly `length` characters
pub fn generate(length: usize) -> String {
    let mut rng = rand::rng();

    (0..length)
        .map(|_| char::from(ALPHABET[rng.random_range(0..ALPHABET.len())]))
        .collect()
}
