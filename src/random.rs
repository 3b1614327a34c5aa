//! Random identifiers and secrets drawn from the thread-local CSPRNG.

use rand::Rng;

/// URL-safe alphabet used for generated secrets
const NANOID_ALPHABET: &[u8] = b"useandom-26T198340PX75pxJACKVERYMINDBUSHWOLF_GQZbfghjklqvwyzrict";

const ALPHANUMERIC: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Random string of `len` characters from the 64-symbol URL-safe alphabet.
pub fn nanoid(len: usize) -> String {
    random_string(NANOID_ALPHABET, len)
}

/// Random alphanumeric public identifier of `len` characters.
pub fn random_id(len: usize) -> String {
    random_string(ALPHANUMERIC, len)
}

fn random_string(alphabet: &[u8], len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| {
            let idx = rng.random_range(0..alphabet.len());
            alphabet[idx] as char
        })
        .collect()
}
