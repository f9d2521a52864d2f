//! Seed hashing for per-mountain visual variation.

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Hash `seed` and `salt` to a float in `[0, 1)`.
///
/// Different salts give independent values for the same seed, so one
/// mountain id can drive several unrelated parameters. FNV-1a over
/// `seed \0 salt`; the top 53 bits become the fraction.
pub fn hash_seed_to_unit_float(seed: &str, salt: &str) -> f64 {
    let mut hash = FNV_OFFSET;
    for byte in seed
        .as_bytes()
        .iter()
        .chain(std::iter::once(&0u8))
        .chain(salt.as_bytes())
    {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    (hash >> 11) as f64 / (1u64 << 53) as f64
}
