use super::{
    blinder::BlindedElement,
    branch_opt_util,
    error::PSIError,
    params::{GCS_DOMAIN_SEPARATOR, MAX_GCS_RICE_BITS, MAX_GCS_UNIVERSE},
    serialization::{BitReader, BitWriter, ByteReader, multiply_high},
};
use rayon::prelude::*;
use turboshake::TurboShake128;

/// Golomb-Compressed Set: blinded elements hashed into `[0, universe)`, sorted, delta encoded and Rice coded.
///
/// Membership is only answerable after the bit stream is expanded back into sorted values, see `decode`.
#[derive(Clone, Debug, PartialEq)]
pub struct GolombCompressedSet {
    num_elements: usize,
    universe: u64,
    rice_bits: u8,
    bit_len: u64,
    bits: Vec<u8>,
}

/// Expanded form of a `GolombCompressedSet`, ready for binary search.
#[derive(Clone, Debug, PartialEq)]
pub struct GcsDecoder {
    universe: u64,
    values: Vec<u64>,
}

impl GolombCompressedSet {
    /// Universe size s.t. a random probe is expected to hit one of the slots `num_elements` hashes occupy with probability `per_query_fpr`,
    /// i.e. the solution of `1 - (1 - 1/U)^n = p`.
    pub fn universe_for(num_elements: usize, per_query_fpr: f64) -> u64 {
        if per_query_fpr >= 1.0 {
            return 1;
        }

        let n = num_elements.max(1) as f64;
        let per_slot = -((-per_query_fpr).ln_1p() / n).exp_m1();
        let universe = (1.0 / per_slot).ceil();

        if universe.is_finite() { (universe as u64).clamp(1, MAX_GCS_UNIVERSE) } else { MAX_GCS_UNIVERSE }
    }

    /// Rice parameter `floor(log2(universe / n))`, close to optimal for geometrically distributed deltas of mean `universe / n`.
    pub fn rice_bits_for(universe: u64, num_values: usize) -> u8 {
        let mean_delta = universe / (num_values.max(1) as u64);
        if mean_delta == 0 {
            return 0;
        }

        (63 - mean_delta.leading_zeros() as u8).min(MAX_GCS_RICE_BITS)
    }

    /// Hashes distinct blinded elements into the universe and compresses them. The caller guarantees `elements` is non-empty.
    pub fn encode(elements: &[BlindedElement], per_query_fpr: f64) -> GolombCompressedSet {
        let universe = Self::universe_for(elements.len(), per_query_fpr);

        let mut values = elements
            .par_iter()
            .map(|element| hash_into_universe(element, universe))
            .collect::<Vec<u64>>();
        values.par_sort_unstable();
        values.dedup();

        let num_elements = values.len();
        let rice_bits = Self::rice_bits_for(universe, num_elements);
        let remainder_mask = if rice_bits == 0 { 0 } else { u64::MAX >> (64 - rice_bits as u32) };

        let mut writer = BitWriter::new();
        let mut previous = 0u64;
        for &value in &values {
            let delta = value - previous;
            writer.write_unary(delta >> rice_bits);
            writer.write_bits(delta & remainder_mask, rice_bits as usize);
            previous = value;
        }
        let (bits, bit_len) = writer.finish();

        log::debug!(
            "golomb compressed set: {} values in universe {}, rice parameter {}, {} bits, per-query fpr {:e}",
            num_elements,
            universe,
            rice_bits,
            bit_len,
            per_query_fpr
        );

        GolombCompressedSet {
            num_elements,
            universe,
            rice_bits,
            bit_len,
            bits,
        }
    }

    /// Expands the Rice coded deltas back into the strictly ascending values, checking that the stream holds exactly
    /// `num_elements` values inside the universe and nothing else.
    pub fn decode(&self) -> Result<GcsDecoder, PSIError> {
        let mut reader = BitReader::new(&self.bits, self.bit_len);
        let mut values = Vec::with_capacity(self.num_elements);
        let mut previous = 0u64;

        for idx in 0..self.num_elements {
            let quotient = reader.read_unary().ok_or(PSIError::MalformedEncoding("golomb stream ends mid value"))?;
            let remainder = reader
                .read_bits(self.rice_bits as usize)
                .ok_or(PSIError::MalformedEncoding("golomb stream ends mid value"))?;

            let delta = quotient
                .checked_mul(1u64 << self.rice_bits)
                .map(|high| high | remainder)
                .ok_or(PSIError::MalformedEncoding("golomb delta overflows"))?;

            if branch_opt_util::unlikely(idx > 0 && delta == 0) {
                return Err(PSIError::MalformedEncoding("golomb values are not strictly ascending"));
            }

            let value = previous.checked_add(delta).ok_or(PSIError::MalformedEncoding("golomb value overflows"))?;
            if branch_opt_util::unlikely(value >= self.universe) {
                return Err(PSIError::MalformedEncoding("golomb value outside of universe"));
            }

            values.push(value);
            previous = value;
        }

        if branch_opt_util::unlikely(!reader.is_exhausted()) {
            return Err(PSIError::MalformedEncoding("golomb stream has trailing bits"));
        }

        Ok(GcsDecoder {
            universe: self.universe,
            values,
        })
    }

    /// `n' / U`, the share of occupied slots, which is exactly the chance that a non-member hashes onto one of them.
    /// Colliding elements already share a slot in `n'`, so no collision term is applied on top.
    pub fn false_positive_rate(&self) -> f64 {
        self.num_elements as f64 / self.universe.max(1) as f64
    }

    pub fn num_elements(&self) -> usize {
        self.num_elements
    }

    pub fn universe(&self) -> u64 {
        self.universe
    }

    pub fn rice_bits(&self) -> u8 {
        self.rice_bits
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.num_elements as u64).to_le_bytes());
        out.extend_from_slice(&self.universe.to_le_bytes());
        out.push(self.rice_bits);
        out.extend_from_slice(&self.bit_len.to_le_bytes());
        out.extend_from_slice(&self.bits);
    }

    /// Parses a GCS body, which must run to the end of `reader`. Only the header is validated here, the bit stream
    /// itself is checked by `decode`.
    pub fn read_from(reader: &mut ByteReader) -> Result<GolombCompressedSet, PSIError> {
        let num_elements = reader.read_len()?;
        let universe = reader.read_u64()?;
        let rice_bits = reader.read_u8()?;
        let bit_len = reader.read_u64()?;

        if branch_opt_util::unlikely(num_elements == 0) {
            return Err(PSIError::MalformedEncoding("encoded set has no elements"));
        }
        if branch_opt_util::unlikely(universe == 0 || universe > MAX_GCS_UNIVERSE) {
            return Err(PSIError::MalformedEncoding("golomb universe out of range"));
        }
        if branch_opt_util::unlikely(num_elements as u64 > universe) {
            return Err(PSIError::MalformedEncoding("more golomb values than universe slots"));
        }
        if branch_opt_util::unlikely(rice_bits > MAX_GCS_RICE_BITS) {
            return Err(PSIError::MalformedEncoding("golomb rice parameter out of range"));
        }
        if branch_opt_util::unlikely(bit_len.div_ceil(8) != reader.remaining() as u64) {
            return Err(PSIError::MalformedEncoding("golomb bit length does not match buffer length"));
        }
        // Every value takes at least its unary terminator bit.
        if branch_opt_util::unlikely(num_elements as u64 > bit_len) {
            return Err(PSIError::MalformedEncoding("more golomb values than encoded bits"));
        }

        Ok(GolombCompressedSet {
            num_elements,
            universe,
            rice_bits,
            bit_len,
            bits: reader.read_bytes(reader.remaining())?.to_vec(),
        })
    }
}

impl GcsDecoder {
    pub fn contains(&self, element: &BlindedElement) -> bool {
        self.values.binary_search(&hash_into_universe(element, self.universe)).is_ok()
    }
}

fn hash_into_universe(element: &BlindedElement, universe: u64) -> u64 {
    let mut hasher = TurboShake128::default();
    hasher.absorb(element.as_bytes());
    hasher.finalize::<GCS_DOMAIN_SEPARATOR>();

    let mut word = [0u8; 8];
    hasher.squeeze(&mut word);

    multiply_high(u64::from_le_bytes(word), universe)
}
