use super::{
    blinder::BlindedElement,
    branch_opt_util,
    error::PSIError,
    params::{BLOOM_FILTER_DOMAIN_SEPARATOR, MAX_BLOOM_HASH_FUNCTION_COUNT},
    serialization::{ByteReader, multiply_high},
};
use rayon::prelude::*;
use std::f64::consts::LN_2;
use turboshake::TurboShake128;

/// Bloom filter over blinded elements, bit `i` lives in byte `i / 8` at bit position `i % 8`.
///
/// An empty filter (`num_bits == 0`, `num_hash_functions == 0`) is legal, it is what a false positive rate of 1 yields,
/// and it reports every probed element as a member.
#[derive(Clone, Debug, PartialEq)]
pub struct BloomFilter {
    num_elements: usize,
    num_hash_functions: u32,
    num_bits: u64,
    bits: Vec<u8>,
}

impl BloomFilter {
    /// Optimal filter dimensions for `num_elements` insertions at the given per-query false positive rate.
    ///
    /// `m = ceil(-n * ln(p) / ln(2)^2)` and `k = round(m / n * ln(2))`, with `k >= 1` whenever `m > 0`.
    pub fn params_for(num_elements: usize, per_query_fpr: f64) -> (u64, u32) {
        let n = num_elements.max(1) as f64;

        let num_bits = (-n * per_query_fpr.ln() / (LN_2 * LN_2)).ceil();
        if num_bits <= 0.0 {
            return (0, 0);
        }

        let num_bits = num_bits as u64;
        let num_hash_functions = ((num_bits as f64 / n) * LN_2).round() as u32;

        (num_bits, num_hash_functions.clamp(1, MAX_BLOOM_HASH_FUNCTION_COUNT))
    }

    /// Inserts distinct blinded elements. The caller guarantees `elements` is non-empty.
    pub fn encode(elements: &[BlindedElement], per_query_fpr: f64) -> BloomFilter {
        let num_elements = elements.len();
        let (num_bits, num_hash_functions) = Self::params_for(num_elements, per_query_fpr);

        log::debug!(
            "bloom filter: {} elements, {} bits, {} hash functions, per-query fpr {:e}",
            num_elements,
            num_bits,
            num_hash_functions,
            per_query_fpr
        );

        let mut bits = vec![0u8; num_bits.div_ceil(8) as usize];

        if num_bits > 0 {
            let positions = elements
                .par_iter()
                .map(|element| bit_positions(element, num_hash_functions, num_bits))
                .collect::<Vec<Vec<u64>>>();

            positions.iter().flatten().for_each(|&pos| {
                bits[(pos / 8) as usize] |= 1u8 << (pos % 8);
            });
        }

        BloomFilter {
            num_elements,
            num_hash_functions,
            num_bits,
            bits,
        }
    }

    pub fn contains(&self, element: &BlindedElement) -> bool {
        if self.num_bits == 0 {
            return true;
        }

        bit_positions(element, self.num_hash_functions, self.num_bits)
            .into_iter()
            .all(|pos| (self.bits[(pos / 8) as usize] >> (pos % 8)) & 1 == 1)
    }

    /// `(1 - e^(-k * n / m))^k`, the expected rate at which a non-member is reported as member.
    pub fn false_positive_rate(&self) -> f64 {
        if self.num_bits == 0 {
            return 1.0;
        }

        let k = self.num_hash_functions as f64;
        let exponent = -k * (self.num_elements as f64) / (self.num_bits as f64);

        (-exponent.exp_m1()).powf(k)
    }

    pub fn num_elements(&self) -> usize {
        self.num_elements
    }

    pub fn num_hash_functions(&self) -> u32 {
        self.num_hash_functions
    }

    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.num_elements as u64).to_le_bytes());
        out.extend_from_slice(&self.num_hash_functions.to_le_bytes());
        out.extend_from_slice(&self.num_bits.to_le_bytes());
        out.extend_from_slice(&self.bits);
    }

    /// Parses a Bloom filter body, which must run to the end of `reader`.
    pub fn read_from(reader: &mut ByteReader) -> Result<BloomFilter, PSIError> {
        let num_elements = reader.read_len()?;
        let num_hash_functions = reader.read_u32()?;
        let num_bits = reader.read_u64()?;

        if branch_opt_util::unlikely(num_elements == 0) {
            return Err(PSIError::MalformedEncoding("encoded set has no elements"));
        }
        if branch_opt_util::unlikely((num_bits == 0) != (num_hash_functions == 0)) {
            return Err(PSIError::MalformedEncoding("bloom filter must have both bits and hash functions, or neither"));
        }
        if branch_opt_util::unlikely(num_hash_functions > MAX_BLOOM_HASH_FUNCTION_COUNT) {
            return Err(PSIError::MalformedEncoding("too many bloom filter hash functions"));
        }
        if branch_opt_util::unlikely(num_bits.div_ceil(8) != reader.remaining() as u64) {
            return Err(PSIError::MalformedEncoding("bloom filter bit length does not match buffer length"));
        }

        Ok(BloomFilter {
            num_elements,
            num_hash_functions,
            num_bits,
            bits: reader.read_bytes(reader.remaining())?.to_vec(),
        })
    }
}

/// `num_hash_functions` positions in `[0, num_bits)`, each from a fresh 64 -bit word of one TurboSHAKE128 stream.
fn bit_positions(element: &BlindedElement, num_hash_functions: u32, num_bits: u64) -> Vec<u64> {
    let mut hasher = TurboShake128::default();
    hasher.absorb(element.as_bytes());
    hasher.finalize::<BLOOM_FILTER_DOMAIN_SEPARATOR>();

    (0..num_hash_functions)
        .map(|_| {
            let mut word = [0u8; 8];
            hasher.squeeze(&mut word);
            multiply_high(u64::from_le_bytes(word), num_bits)
        })
        .collect()
}
