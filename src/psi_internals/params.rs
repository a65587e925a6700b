pub const SECRET_KEY_BYTE_LEN: usize = 32;
pub const BLINDED_ELEMENT_BYTE_LEN: usize = 32;
pub const HASH_TO_CURVE_UNIFORM_BYTE_LEN: usize = 64;

pub const WIRE_FORMAT_VERSION: u8 = 1;

// TurboSHAKE domain separators, must each be in [0x01, 0x7f].
pub const HASH_TO_CURVE_DOMAIN_SEPARATOR: u8 = 0x11;
pub const RAW_SET_DOMAIN_SEPARATOR: u8 = 0x12;
pub const BLOOM_FILTER_DOMAIN_SEPARATOR: u8 = 0x13;
pub const GCS_DOMAIN_SEPARATOR: u8 = 0x14;

/// Truncated hashes of the Raw encoding keep this many bits above log2(#server elements * #client queries).
pub const RAW_COLLISION_SECURITY_BITS: f64 = 40.0;
pub const MIN_RAW_HASH_BYTE_LEN: usize = 8;
pub const MAX_RAW_HASH_BYTE_LEN: usize = 32;

/// Per-query false positive rate is never driven below 2^-100.
pub const MIN_PER_QUERY_FPR: f64 = 7.888609052210118e-31;
pub const MAX_BLOOM_HASH_FUNCTION_COUNT: u32 = 128;
pub const MAX_GCS_UNIVERSE: u64 = 1u64 << 63;
pub const MAX_GCS_RICE_BITS: u8 = 63;

pub const KEY_GENERATION_MAX_ATTEMPT_COUNT: usize = 16;
