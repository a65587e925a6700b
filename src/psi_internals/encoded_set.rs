use super::{
    blinder::BlindedElement,
    bloom_filter::BloomFilter,
    branch_opt_util,
    data_structure::DataStructure,
    error::PSIError,
    golomb_compressed_set::{GcsDecoder, GolombCompressedSet},
    params::MIN_PER_QUERY_FPR,
    raw_set::RawSet,
    serialization::ByteReader,
};

/// The server's blinded set in one of its three wire representations.
///
/// Every variant is self-describing: its tag plus the parameters needed to answer membership queries travel with it.
#[derive(Clone, Debug, PartialEq)]
pub enum EncodedSet {
    Gcs(GolombCompressedSet),
    BloomFilter(BloomFilter),
    Raw(RawSet),
}

/// Membership oracle built from an `EncodedSet`. None of the variants has false negatives.
pub enum SetDecoder<'a> {
    Gcs(GcsDecoder),
    BloomFilter(&'a BloomFilter),
    Raw(&'a RawSet),
}

/// Fails unless `fpr` is in (0, 1] and there is something to encode.
pub fn check_encoding_arguments(fpr: f64, num_elements: usize) -> Result<(), PSIError> {
    // Written so that NaN is rejected too.
    if branch_opt_util::unlikely(!(fpr > 0.0 && fpr <= 1.0)) {
        return Err(PSIError::InvalidFalsePositiveRate(fpr));
    }
    if branch_opt_util::unlikely(num_elements == 0) {
        return Err(PSIError::EmptyServerInputSet);
    }

    Ok(())
}

/// Splits a false positive budget `fpr`, meant for a whole batch of `num_client_queries` membership queries, into the
/// per-query rate `p` s.t. `1 - (1 - p)^c = fpr`. Floored at `MIN_PER_QUERY_FPR`.
pub fn per_query_false_positive_rate(fpr: f64, num_client_queries: usize) -> f64 {
    if fpr >= 1.0 {
        return 1.0;
    }

    let c = num_client_queries.max(1) as f64;
    let p = -((-fpr).ln_1p() / c).exp_m1();

    p.max(MIN_PER_QUERY_FPR)
}

impl EncodedSet {
    /// Encodes a set of blinded elements.
    ///
    /// `num_client_queries` is the number of membership queries the decoding side is expected to run, Bloom filter and
    /// GCS are dimensioned s.t. all of those queries together see false positive rate `fpr`, while Raw widens its
    /// truncated hashes with it. Duplicates are dropped and elements are put in canonical order, so the result does not
    /// depend on the order of `elements`.
    pub fn encode(elements: &[BlindedElement], fpr: f64, data_structure: DataStructure, num_client_queries: usize) -> Result<EncodedSet, PSIError> {
        check_encoding_arguments(fpr, elements.len())?;

        let mut distinct = elements.to_vec();
        distinct.sort_unstable();
        distinct.dedup();

        let per_query_fpr = per_query_false_positive_rate(fpr, num_client_queries);

        Ok(match data_structure {
            DataStructure::Gcs => Self::Gcs(GolombCompressedSet::encode(&distinct, per_query_fpr)),
            DataStructure::BloomFilter => Self::BloomFilter(BloomFilter::encode(&distinct, per_query_fpr)),
            DataStructure::Raw => Self::Raw(RawSet::encode(&distinct, num_client_queries)),
        })
    }

    pub fn data_structure(&self) -> DataStructure {
        match self {
            Self::Gcs(_) => DataStructure::Gcs,
            Self::BloomFilter(_) => DataStructure::BloomFilter,
            Self::Raw(_) => DataStructure::Raw,
        }
    }

    pub fn num_elements(&self) -> usize {
        match self {
            Self::Gcs(gcs) => gcs.num_elements(),
            Self::BloomFilter(filter) => filter.num_elements(),
            Self::Raw(raw) => raw.num_elements(),
        }
    }

    /// Rate at which a single non-member query is reported as a member, derived from the encoded parameters alone.
    /// Raw's truncation collisions are below 2^-40 and are counted as zero.
    pub fn false_positive_rate(&self) -> f64 {
        match self {
            Self::Gcs(gcs) => gcs.false_positive_rate(),
            Self::BloomFilter(filter) => filter.false_positive_rate(),
            Self::Raw(_) => 0.0,
        }
    }

    /// Prepares the set for membership queries. Only GCS does real work here, expanding and validating its bit stream.
    pub fn decoder(&self) -> Result<SetDecoder<'_>, PSIError> {
        Ok(match self {
            Self::Gcs(gcs) => SetDecoder::Gcs(gcs.decode()?),
            Self::BloomFilter(filter) => SetDecoder::BloomFilter(filter),
            Self::Raw(raw) => SetDecoder::Raw(raw),
        })
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.push(self.data_structure().tag());

        match self {
            Self::Gcs(gcs) => gcs.write_to(out),
            Self::BloomFilter(filter) => filter.write_to(out),
            Self::Raw(raw) => raw.write_to(out),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        self.write_to(&mut bytes);
        bytes
    }

    /// Parses an encoded set occupying the rest of `reader`.
    pub fn read_from(reader: &mut ByteReader) -> Result<EncodedSet, PSIError> {
        let tag = reader.read_u8()?;
        let data_structure = DataStructure::try_from(tag as u32).map_err(|_| PSIError::MalformedMessage("unknown data structure tag"))?;

        let encoded_set = match data_structure {
            DataStructure::Gcs => Self::Gcs(GolombCompressedSet::read_from(reader)?),
            DataStructure::BloomFilter => Self::BloomFilter(BloomFilter::read_from(reader)?),
            DataStructure::Raw => Self::Raw(RawSet::read_from(reader)?),
        };

        Ok(encoded_set)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<EncodedSet, PSIError> {
        let mut reader = ByteReader::new(bytes);
        let encoded_set = Self::read_from(&mut reader)?;
        reader.finish()?;

        Ok(encoded_set)
    }
}

impl SetDecoder<'_> {
    /// Probabilistic membership test, `true` for every member and for non-members at the encoded false positive rate.
    pub fn test(&self, element: &BlindedElement) -> bool {
        match self {
            Self::Gcs(decoder) => decoder.contains(element),
            Self::BloomFilter(filter) => filter.contains(element),
            Self::Raw(raw) => raw.contains(element),
        }
    }
}

#[cfg(test)]
mod test {
    use crate::psi_internals::{
        blinder::{BlindedElement, hash_and_blind_all},
        data_structure::DataStructure,
        encoded_set::{EncodedSet, per_query_false_positive_rate},
        error::PSIError,
        params::MIN_PER_QUERY_FPR,
        secret_key::SecretKey,
    };
    use test_case::test_case;

    const ALL_DATA_STRUCTURES: [DataStructure; 3] = [DataStructure::Gcs, DataStructure::BloomFilter, DataStructure::Raw];

    fn blinded_elements(key: &SecretKey, prefix: &str, count: usize) -> Vec<BlindedElement> {
        let inputs = (0..count).map(|i| format!("{} {}", prefix, i)).collect::<Vec<String>>();
        hash_and_blind_all(key, &inputs, None).unwrap()
    }

    #[test_case(0.0 => matches Err(PSIError::InvalidFalsePositiveRate(_)); "Zero false positive rate is rejected")]
    #[test_case(-0.1 => matches Err(PSIError::InvalidFalsePositiveRate(_)); "Negative false positive rate is rejected")]
    #[test_case(1.5 => matches Err(PSIError::InvalidFalsePositiveRate(_)); "False positive rate above one is rejected")]
    #[test_case(f64::NAN => matches Err(PSIError::InvalidFalsePositiveRate(_)); "NaN false positive rate is rejected")]
    #[test_case(1.0 => matches Ok(_); "Unit false positive rate is accepted")]
    #[test_case(f64::MIN_POSITIVE => matches Ok(_); "Smallest positive false positive rate is accepted")]
    fn false_positive_rate_range_is_checked(fpr: f64) -> Result<EncodedSet, PSIError> {
        let key = SecretKey::from_bytes(&[1u8; 32]).unwrap();
        EncodedSet::encode(&blinded_elements(&key, "Element", 4), fpr, DataStructure::Gcs, 4)
    }

    #[test]
    fn empty_set_is_rejected_by_every_encoding() {
        for ds in ALL_DATA_STRUCTURES {
            assert_eq!(EncodedSet::encode(&[], 0.01, ds, 10), Err(PSIError::EmptyServerInputSet));
        }
    }

    #[test_case(1.0, 10 => 1.0; "Unit budget stays unit")]
    #[test_case(f64::MIN_POSITIVE, 10 => MIN_PER_QUERY_FPR; "Tiny budget is floored")]
    fn per_query_rate(fpr: f64, num_client_queries: usize) -> f64 {
        per_query_false_positive_rate(fpr, num_client_queries)
    }

    #[test]
    fn per_query_rate_splits_budget_across_queries() {
        let p = per_query_false_positive_rate(1e-3, 1000);
        assert!((p - 1e-6).abs() < 1e-9);

        let single = per_query_false_positive_rate(0.5, 1);
        assert!((single - 0.5).abs() < 1e-12);
        assert_eq!(per_query_false_positive_rate(1e-3, 0), per_query_false_positive_rate(1e-3, 1));
    }

    #[test]
    fn encoding_is_independent_of_input_order_and_duplicates() {
        let key = SecretKey::generate().unwrap();
        let elements = blinded_elements(&key, "Element", 100);

        let mut shuffled = elements.iter().rev().cloned().collect::<Vec<BlindedElement>>();
        shuffled.extend_from_slice(&elements[..10]);

        for ds in ALL_DATA_STRUCTURES {
            let encoded = EncodedSet::encode(&elements, 1e-9, ds, 10).unwrap();
            let encoded_shuffled = EncodedSet::encode(&shuffled, 1e-9, ds, 10).unwrap();

            assert_eq!(encoded.num_elements(), elements.len());
            assert_eq!(encoded, encoded_shuffled);
            assert_eq!(encoded.to_bytes(), encoded_shuffled.to_bytes());
        }
    }

    #[test]
    fn encoded_sets_survive_serialization_and_answer_identically() {
        let key = SecretKey::generate().unwrap();
        let members = blinded_elements(&key, "member", 300);
        let strangers = blinded_elements(&key, "stranger", 300);

        for ds in ALL_DATA_STRUCTURES {
            let encoded = EncodedSet::encode(&members, 1e-2, ds, strangers.len()).unwrap();
            let decoded = EncodedSet::from_bytes(&encoded.to_bytes()).unwrap();

            assert_eq!(decoded.data_structure(), ds);
            assert_eq!(decoded, encoded);

            let original_decoder = encoded.decoder().unwrap();
            let parsed_decoder = decoded.decoder().unwrap();

            assert!(members.iter().all(|e| parsed_decoder.test(e)), "false negative for {}", ds);
            assert!(strangers.iter().all(|e| original_decoder.test(e) == parsed_decoder.test(e)));
        }
    }

    #[test]
    fn raw_encoding_reports_zero_false_positive_rate() {
        let key = SecretKey::generate().unwrap();
        let encoded = EncodedSet::encode(&blinded_elements(&key, "Element", 10), 1.0, DataStructure::Raw, 10).unwrap();

        assert_eq!(encoded.false_positive_rate(), 0.0);
    }

    #[test]
    fn unknown_tag_and_trailing_bytes_are_rejected() {
        assert_eq!(EncodedSet::from_bytes(&[7u8]), Err(PSIError::MalformedMessage("unknown data structure tag")));

        let key = SecretKey::generate().unwrap();
        let mut bytes = EncodedSet::encode(&blinded_elements(&key, "Element", 10), 1e-3, DataStructure::Raw, 10)
            .unwrap()
            .to_bytes();
        bytes.push(0);

        assert!(matches!(EncodedSet::from_bytes(&bytes), Err(PSIError::MalformedEncoding(_))));
    }
}
