use super::error::PSIError;
use std::fmt::Display;

/// Wire representation used by the server to ship its blinded set to the client.
///
/// * `Gcs`: Golomb-Compressed Set, the smallest on the wire, slowest to encode and decode.
/// * `BloomFilter`: bit array probed by `k` hash functions.
/// * `Raw`: sorted truncated hashes, exact, but grows linearly with the server set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DataStructure {
    #[default]
    Gcs,
    BloomFilter,
    Raw,
}

impl DataStructure {
    pub const fn tag(self) -> u8 {
        match self {
            Self::Gcs => 0,
            Self::BloomFilter => 1,
            Self::Raw => 2,
        }
    }
}

impl TryFrom<u32> for DataStructure {
    type Error = PSIError;

    fn try_from(tag: u32) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(Self::Gcs),
            1 => Ok(Self::BloomFilter),
            2 => Ok(Self::Raw),
            _ => Err(PSIError::UnsupportedDataStructure(tag)),
        }
    }
}

impl Display for DataStructure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gcs => write!(f, "GCS"),
            Self::BloomFilter => write!(f, "BloomFilter"),
            Self::Raw => write!(f, "Raw"),
        }
    }
}

#[cfg(test)]
mod test {
    use crate::psi_internals::{data_structure::DataStructure, error::PSIError};
    use test_case::test_case;

    #[test_case(0 => Ok(DataStructure::Gcs); "Tag 0 is GCS")]
    #[test_case(1 => Ok(DataStructure::BloomFilter); "Tag 1 is Bloom filter")]
    #[test_case(2 => Ok(DataStructure::Raw); "Tag 2 is Raw")]
    #[test_case(3 => Err(PSIError::UnsupportedDataStructure(3)); "Unknown tag is rejected")]
    fn data_structure_from_tag(tag: u32) -> Result<DataStructure, PSIError> {
        DataStructure::try_from(tag)
    }

    #[test]
    fn default_is_gcs_and_tags_round_trip() {
        assert_eq!(DataStructure::default(), DataStructure::Gcs);

        for ds in [DataStructure::Gcs, DataStructure::BloomFilter, DataStructure::Raw] {
            assert_eq!(DataStructure::try_from(ds.tag() as u32), Ok(ds));
        }
    }
}
