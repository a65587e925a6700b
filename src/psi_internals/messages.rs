use super::{
    blinder::BlindedElement,
    branch_opt_util,
    encoded_set::EncodedSet,
    error::PSIError,
    params::{BLINDED_ELEMENT_BYTE_LEN, WIRE_FORMAT_VERSION},
    serialization::ByteReader,
};
use rayon::prelude::*;

/// Server's offline message: its blinded input set, encoded, plus the parameters it was encoded with.
#[derive(Clone, Debug, PartialEq)]
pub struct ServerSetup {
    pub fpr: f64,
    /// Distinct server inputs. A GCS may hold fewer values, as colliding elements share a slot.
    pub num_server_elements: u64,
    pub encoded_set: EncodedSet,
}

/// Client's online message: its inputs blinded once, in input order.
#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    pub reveal_intersection: bool,
    pub elements: Vec<BlindedElement>,
}

/// Server's answer to a `Request`: every request element blinded once more, at the same position.
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    pub elements: Vec<BlindedElement>,
}

fn read_version(reader: &mut ByteReader) -> Result<(), PSIError> {
    if branch_opt_util::unlikely(reader.read_u8()? != WIRE_FORMAT_VERSION) {
        return Err(PSIError::MalformedMessage("unsupported wire format version"));
    }
    Ok(())
}

fn write_elements(elements: &[BlindedElement], out: &mut Vec<u8>) {
    out.extend_from_slice(&(elements.len() as u64).to_le_bytes());
    out.reserve(elements.len() * BLINDED_ELEMENT_BYTE_LEN);
    elements.iter().for_each(|element| out.extend_from_slice(element.as_bytes()));
}

/// Reads a `u64` count followed by that many compressed points, in parallel. Any undecodable point fails the whole list.
fn read_elements(reader: &mut ByteReader) -> Result<Vec<BlindedElement>, PSIError> {
    let count = reader.read_len()?;
    let byte_len = count
        .checked_mul(BLINDED_ELEMENT_BYTE_LEN)
        .ok_or(PSIError::MalformedMessage("element count overflows"))?;
    let bytes = reader.read_bytes(byte_len)?;

    bytes
        .par_chunks_exact(BLINDED_ELEMENT_BYTE_LEN)
        .map(|chunk| {
            let mut point = [0u8; BLINDED_ELEMENT_BYTE_LEN];
            point.copy_from_slice(chunk);
            BlindedElement::from_bytes(&point)
        })
        .collect()
}

impl ServerSetup {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![WIRE_FORMAT_VERSION];
        bytes.extend_from_slice(&self.fpr.to_le_bytes());
        bytes.extend_from_slice(&self.num_server_elements.to_le_bytes());
        self.encoded_set.write_to(&mut bytes);

        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<ServerSetup, PSIError> {
        let mut reader = ByteReader::new(bytes);
        read_version(&mut reader)?;

        let fpr = reader.read_f64()?;
        if branch_opt_util::unlikely(!(fpr > 0.0 && fpr <= 1.0)) {
            return Err(PSIError::MalformedMessage("false positive rate out of range"));
        }

        let num_server_elements = reader.read_u64()?;
        let encoded_set = EncodedSet::read_from(&mut reader)?;
        reader.finish()?;

        Ok(ServerSetup {
            fpr,
            num_server_elements,
            encoded_set,
        })
    }
}

impl Request {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![WIRE_FORMAT_VERSION, self.reveal_intersection as u8];
        write_elements(&self.elements, &mut bytes);

        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Request, PSIError> {
        let mut reader = ByteReader::new(bytes);
        read_version(&mut reader)?;

        let reveal_intersection = match reader.read_u8()? {
            0 => false,
            1 => true,
            _ => return Err(PSIError::MalformedMessage("reveal intersection flag must be 0 or 1")),
        };
        let elements = read_elements(&mut reader)?;
        reader.finish()?;

        Ok(Request { reveal_intersection, elements })
    }
}

impl Response {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![WIRE_FORMAT_VERSION];
        write_elements(&self.elements, &mut bytes);

        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Response, PSIError> {
        let mut reader = ByteReader::new(bytes);
        read_version(&mut reader)?;

        let elements = read_elements(&mut reader)?;
        reader.finish()?;

        Ok(Response { elements })
    }
}

#[cfg(test)]
mod test {
    use crate::psi_internals::{
        blinder::hash_and_blind_all,
        data_structure::DataStructure,
        encoded_set::EncodedSet,
        error::PSIError,
        messages::{Request, Response, ServerSetup},
        secret_key::SecretKey,
    };
    use test_case::test_case;

    fn sample_request() -> Request {
        let key = SecretKey::from_bytes(&[7u8; 32]).unwrap();
        let inputs = (0..16).map(|i| format!("Element {}", i)).collect::<Vec<String>>();

        Request {
            reveal_intersection: true,
            elements: hash_and_blind_all(&key, &inputs, None).unwrap(),
        }
    }

    #[test]
    fn messages_survive_serialization_byte_for_byte() {
        let request = sample_request();
        let request_bytes = request.to_bytes();
        let parsed_request = Request::from_bytes(&request_bytes).unwrap();

        assert_eq!(parsed_request, request);
        assert_eq!(parsed_request.to_bytes(), request_bytes);

        let response = Response { elements: request.elements.clone() };
        let response_bytes = response.to_bytes();
        assert_eq!(Response::from_bytes(&response_bytes).unwrap().to_bytes(), response_bytes);

        for ds in [DataStructure::Gcs, DataStructure::BloomFilter, DataStructure::Raw] {
            let setup = ServerSetup {
                fpr: 1e-3,
                num_server_elements: request.elements.len() as u64,
                encoded_set: EncodedSet::encode(&request.elements, 1e-3, ds, 10).unwrap(),
            };
            let setup_bytes = setup.to_bytes();
            let parsed_setup = ServerSetup::from_bytes(&setup_bytes).unwrap();

            assert_eq!(parsed_setup, setup);
            assert_eq!(parsed_setup.to_bytes(), setup_bytes);
        }
    }

    #[test]
    fn empty_request_is_well_formed() {
        let request = Request {
            reveal_intersection: false,
            elements: Vec::new(),
        };

        assert_eq!(request.to_bytes(), [1u8, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(Request::from_bytes(&request.to_bytes()), Ok(request));
    }

    #[test_case(&[] => Err(PSIError::MalformedMessage("buffer is truncated")); "Empty buffer")]
    #[test_case(&[2, 0, 0, 0, 0, 0, 0, 0, 0, 0] => Err(PSIError::MalformedMessage("unsupported wire format version")); "Unknown version")]
    #[test_case(&[1, 2, 0, 0, 0, 0, 0, 0, 0, 0] => Err(PSIError::MalformedMessage("reveal intersection flag must be 0 or 1")); "Non boolean reveal flag")]
    #[test_case(&[1, 0, 1, 0, 0, 0, 0, 0, 0, 0] => Err(PSIError::MalformedMessage("buffer is truncated")); "Declared element is missing")]
    #[test_case(&[1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0] => Err(PSIError::MalformedMessage("trailing bytes after message")); "Trailing byte")]
    #[test_case(&[1, 0, 0, 0, 0, 0, 0, 0, 0, 0x20] => Err(PSIError::MalformedMessage("element count overflows")); "Overflowing element count")]
    fn malformed_request(bytes: &[u8]) -> Result<Request, PSIError> {
        Request::from_bytes(bytes)
    }

    #[test]
    fn request_with_undecodable_point_is_rejected() {
        let mut bytes = sample_request().to_bytes();
        // Byte 10 is the first byte of the first element, the all-0xff string is not a canonical encoding.
        bytes[10..42].copy_from_slice(&[0xffu8; 32]);

        assert_eq!(Request::from_bytes(&bytes), Err(PSIError::InvalidPoint));
    }

    #[test]
    fn setup_with_out_of_range_fpr_is_rejected() {
        let request = sample_request();
        let setup = ServerSetup {
            fpr: 1e-3,
            num_server_elements: 16,
            encoded_set: EncodedSet::encode(&request.elements, 1e-3, DataStructure::Raw, 16).unwrap(),
        };

        let mut bytes = setup.to_bytes();
        bytes[1..9].copy_from_slice(&2.0f64.to_le_bytes());

        assert_eq!(ServerSetup::from_bytes(&bytes), Err(PSIError::MalformedMessage("false positive rate out of range")));
    }
}
