use super::{
    blinder::BlindedElement,
    branch_opt_util,
    error::PSIError,
    params::{MAX_RAW_HASH_BYTE_LEN, MIN_RAW_HASH_BYTE_LEN, RAW_COLLISION_SECURITY_BITS, RAW_SET_DOMAIN_SEPARATOR},
    serialization::ByteReader,
};
use rayon::prelude::*;
use std::cmp::Ordering;
use turboshake::TurboShake128;

/// Sorted, deduplicated, fixed-width truncated hashes of the server's blinded elements, laid out back to back.
#[derive(Clone, Debug, PartialEq)]
pub struct RawSet {
    hash_byte_len: usize,
    num_elements: usize,
    hashes: Vec<u8>,
}

impl RawSet {
    /// Picks the narrowest hash width, in bytes, s.t. the chance of any of `num_client_queries` queries colliding with
    /// any of `num_elements` truncated hashes stays below 2^-RAW_COLLISION_SECURITY_BITS.
    pub fn hash_byte_len_for(num_elements: usize, num_client_queries: usize) -> usize {
        let pair_count = (num_elements.max(1) as f64) * (num_client_queries.max(1) as f64);
        let required_bits = pair_count.log2() + RAW_COLLISION_SECURITY_BITS;
        let required_bytes = (required_bits / 8.0).ceil() as usize;

        required_bytes.clamp(MIN_RAW_HASH_BYTE_LEN, MAX_RAW_HASH_BYTE_LEN)
    }

    /// Encodes distinct blinded elements. The caller guarantees `elements` is non-empty.
    pub fn encode(elements: &[BlindedElement], num_client_queries: usize) -> RawSet {
        let hash_byte_len = Self::hash_byte_len_for(elements.len(), num_client_queries);

        let mut truncated = elements
            .par_iter()
            .map(|element| truncated_hash(element, hash_byte_len))
            .collect::<Vec<[u8; MAX_RAW_HASH_BYTE_LEN]>>();
        truncated.par_sort_unstable();
        truncated.dedup();

        let num_elements = truncated.len();
        let mut hashes = Vec::with_capacity(num_elements * hash_byte_len);
        truncated.iter().for_each(|hash| hashes.extend_from_slice(&hash[..hash_byte_len]));

        log::debug!("raw set: {} elements, {} -bytes truncated hashes", num_elements, hash_byte_len);

        RawSet {
            hash_byte_len,
            num_elements,
            hashes,
        }
    }

    #[inline(always)]
    fn hash_at(&self, idx: usize) -> &[u8] {
        let offset = idx * self.hash_byte_len;
        &self.hashes[offset..offset + self.hash_byte_len]
    }

    /// Binary search for the truncated hash of `element`.
    pub fn contains(&self, element: &BlindedElement) -> bool {
        let needle = truncated_hash(element, self.hash_byte_len);
        let needle = &needle[..self.hash_byte_len];

        let (mut lo, mut hi) = (0, self.num_elements);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.hash_at(mid).cmp(needle) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return true,
            }
        }

        false
    }

    pub fn num_elements(&self) -> usize {
        self.num_elements
    }

    pub fn hash_byte_len(&self) -> usize {
        self.hash_byte_len
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.push(self.hash_byte_len as u8);
        out.extend_from_slice(&(self.num_elements as u64).to_le_bytes());
        out.extend_from_slice(&self.hashes);
    }

    /// Parses a Raw body, which must run to the end of `reader`.
    pub fn read_from(reader: &mut ByteReader) -> Result<RawSet, PSIError> {
        let hash_byte_len = reader.read_u8()? as usize;
        let num_elements = reader.read_len()?;

        if branch_opt_util::unlikely(!(MIN_RAW_HASH_BYTE_LEN..=MAX_RAW_HASH_BYTE_LEN).contains(&hash_byte_len)) {
            return Err(PSIError::MalformedEncoding("raw hash width out of range"));
        }
        if branch_opt_util::unlikely(num_elements == 0) {
            return Err(PSIError::MalformedEncoding("encoded set has no elements"));
        }

        let payload_len = num_elements
            .checked_mul(hash_byte_len)
            .ok_or(PSIError::MalformedEncoding("raw element count overflows"))?;
        if branch_opt_util::unlikely(payload_len != reader.remaining()) {
            return Err(PSIError::MalformedEncoding("raw payload length does not match element count"));
        }

        let raw_set = RawSet {
            hash_byte_len,
            num_elements,
            hashes: reader.read_bytes(payload_len)?.to_vec(),
        };

        let is_strictly_ascending = (1..num_elements).all(|idx| raw_set.hash_at(idx - 1) < raw_set.hash_at(idx));
        if branch_opt_util::unlikely(!is_strictly_ascending) {
            return Err(PSIError::MalformedEncoding("raw hashes are not strictly ascending"));
        }

        Ok(raw_set)
    }
}

/// First `hash_byte_len` bytes of the element's TurboSHAKE128 digest, zero padded to the maximum width.
fn truncated_hash(element: &BlindedElement, hash_byte_len: usize) -> [u8; MAX_RAW_HASH_BYTE_LEN] {
    let mut hasher = TurboShake128::default();
    hasher.absorb(element.as_bytes());
    hasher.finalize::<RAW_SET_DOMAIN_SEPARATOR>();

    let mut hash = [0u8; MAX_RAW_HASH_BYTE_LEN];
    hasher.squeeze(&mut hash[..hash_byte_len]);

    hash
}
