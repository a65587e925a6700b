use super::{
    branch_opt_util,
    error::PSIError,
    params::{BLINDED_ELEMENT_BYTE_LEN, HASH_TO_CURVE_DOMAIN_SEPARATOR, HASH_TO_CURVE_UNIFORM_BYTE_LEN},
    secret_key::SecretKey,
};
use curve25519_dalek::{
    ristretto::{CompressedRistretto, RistrettoPoint},
    traits::IsIdentity,
};
use rayon::prelude::*;
use std::{
    cmp::Ordering as CmpOrdering,
    hash::{Hash, Hasher},
    sync::atomic::{AtomicBool, Ordering},
};
use turboshake::TurboShake128;

/// Hashes an arbitrary byte string onto Ristretto255.
///
/// The input is absorbed by TurboSHAKE128 under its own domain separator, 64 uniform bytes are squeezed out and mapped
/// to the group using the Elligator based `from_uniform_bytes`, which is a proper random oracle into the group.
pub fn hash_to_curve(input: &[u8]) -> Result<RistrettoPoint, PSIError> {
    let mut hasher = TurboShake128::default();
    hasher.absorb(input);
    hasher.finalize::<HASH_TO_CURVE_DOMAIN_SEPARATOR>();

    let mut uniform_bytes = [0u8; HASH_TO_CURVE_UNIFORM_BYTE_LEN];
    hasher.squeeze(&mut uniform_bytes);

    let point = RistrettoPoint::from_uniform_bytes(&uniform_bytes);
    if branch_opt_util::unlikely(point.is_identity()) {
        return Err(PSIError::InvalidPoint);
    }

    Ok(point)
}

/// A non-identity group element, carrying its 32 -bytes compressed encoding which is what gets hashed and sent.
///
/// Equality, ordering and hashing all follow the compressed encoding, which is canonical for Ristretto.
#[derive(Clone, Copy, Debug)]
pub struct BlindedElement {
    point: RistrettoPoint,
    compressed: [u8; BLINDED_ELEMENT_BYTE_LEN],
}

impl BlindedElement {
    fn from_point(point: RistrettoPoint) -> Result<BlindedElement, PSIError> {
        if branch_opt_util::unlikely(point.is_identity()) {
            return Err(PSIError::InvalidPoint);
        }

        Ok(BlindedElement {
            point,
            compressed: point.compress().to_bytes(),
        })
    }

    /// Computes `point * key`.
    pub fn blind(key: &SecretKey, point: &RistrettoPoint) -> Result<BlindedElement, PSIError> {
        Self::from_point(point * key.scalar())
    }

    /// Blinds an already blinded element once more. Scalar multiplication commutes, so the order in which the two
    /// parties apply their keys does not matter.
    pub fn reblind(&self, key: &SecretKey) -> Result<BlindedElement, PSIError> {
        Self::from_point(self.point * key.scalar())
    }

    /// Decodes an element received over the wire, rejecting non-canonical encodings and the identity.
    pub fn from_bytes(bytes: &[u8; BLINDED_ELEMENT_BYTE_LEN]) -> Result<BlindedElement, PSIError> {
        let point = CompressedRistretto(*bytes).decompress().ok_or(PSIError::InvalidPoint)?;
        Self::from_point(point)
    }

    pub fn as_bytes(&self) -> &[u8; BLINDED_ELEMENT_BYTE_LEN] {
        &self.compressed
    }
}

impl PartialEq for BlindedElement {
    fn eq(&self, other: &Self) -> bool {
        self.compressed == other.compressed
    }
}

impl Eq for BlindedElement {}

impl PartialOrd for BlindedElement {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for BlindedElement {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.compressed.cmp(&other.compressed)
    }
}

impl Hash for BlindedElement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.compressed.hash(state);
    }
}

/// Hashes every input onto the curve and blinds it with `key`, in parallel.
///
/// Output position `i` always holds the blinding of input `i`. If any element fails, or `cancel` gets set while the batch
/// is in flight, the whole batch fails.
pub fn hash_and_blind_all<T>(key: &SecretKey, inputs: &[T], cancel: Option<&AtomicBool>) -> Result<Vec<BlindedElement>, PSIError>
where
    T: AsRef<[u8]> + Sync,
{
    par_map_in_order(inputs, cancel, |input| BlindedElement::blind(key, &hash_to_curve(input.as_ref())?))
}

/// Applies one more layer of blinding with `key` to every element, in parallel and order-preserving.
pub fn reblind_all(key: &SecretKey, elements: &[BlindedElement], cancel: Option<&AtomicBool>) -> Result<Vec<BlindedElement>, PSIError> {
    par_map_in_order(elements, cancel, |element| element.reblind(key))
}

/// Removes the blinding of `key` from every element, by blinding with its inverse.
pub fn unblind_all(key: &SecretKey, elements: &[BlindedElement], cancel: Option<&AtomicBool>) -> Result<Vec<BlindedElement>, PSIError> {
    let inverse_key = key.invert();
    reblind_all(&inverse_key, elements, cancel)
}

fn par_map_in_order<I, F>(items: &[I], cancel: Option<&AtomicBool>, op: F) -> Result<Vec<BlindedElement>, PSIError>
where
    I: Sync,
    F: Fn(&I) -> Result<BlindedElement, PSIError> + Sync + Send,
{
    log::trace!("blinding batch of {} elements", items.len());

    items
        .par_iter()
        .map(|item| {
            if let Some(flag) = cancel {
                if branch_opt_util::unlikely(flag.load(Ordering::Relaxed)) {
                    return Err(PSIError::Cancelled);
                }
            }
            op(item)
        })
        .collect()
}

#[cfg(test)]
mod test {
    use crate::psi_internals::{
        blinder::{BlindedElement, hash_and_blind_all, hash_to_curve, reblind_all, unblind_all},
        error::PSIError,
        params::BLINDED_ELEMENT_BYTE_LEN,
        secret_key::SecretKey,
    };
    use proptest::prelude::*;
    use std::sync::atomic::AtomicBool;
    use test_case::test_case;

    fn key_from_seed(seed: u8) -> SecretKey {
        SecretKey::from_bytes(&[seed.max(1); 32]).expect("Non-zero key must be valid")
    }

    #[test]
    fn hash_to_curve_is_deterministic_and_input_sensitive() {
        let p0 = hash_to_curve(b"Element 0").unwrap();
        let p0_again = hash_to_curve(b"Element 0").unwrap();
        let p1 = hash_to_curve(b"Element 1").unwrap();
        let empty = hash_to_curve(b"").unwrap();

        assert_eq!(p0, p0_again);
        assert_ne!(p0, p1);
        assert_ne!(p0, empty);
    }

    #[test_case([0u8; BLINDED_ELEMENT_BYTE_LEN] => matches Err(PSIError::InvalidPoint); "Identity element is rejected")]
    #[test_case([0xffu8; BLINDED_ELEMENT_BYTE_LEN] => matches Err(PSIError::InvalidPoint); "Non-canonical encoding is rejected")]
    fn invalid_wire_points_are_rejected(bytes: [u8; BLINDED_ELEMENT_BYTE_LEN]) -> Result<BlindedElement, PSIError> {
        BlindedElement::from_bytes(&bytes)
    }

    #[test]
    fn blinded_element_decodes_from_its_own_encoding() {
        let key = key_from_seed(3);
        let blinded = BlindedElement::blind(&key, &hash_to_curve(b"Element 3").unwrap()).unwrap();
        let decoded = BlindedElement::from_bytes(blinded.as_bytes()).unwrap();

        assert_eq!(decoded, blinded);
    }

    #[test]
    fn batch_blinding_preserves_order() {
        let key = key_from_seed(9);
        let inputs = (0..64).map(|i| format!("Element {}", i)).collect::<Vec<String>>();

        let batch = hash_and_blind_all(&key, &inputs, None).unwrap();
        assert_eq!(batch.len(), inputs.len());

        for (input, blinded) in inputs.iter().zip(batch.iter()) {
            let expected = BlindedElement::blind(&key, &hash_to_curve(input.as_bytes()).unwrap()).unwrap();
            assert_eq!(&expected, blinded);
        }
    }

    #[test]
    fn empty_batch_is_not_an_error() {
        let key = key_from_seed(1);
        let inputs: Vec<&[u8]> = vec![];

        assert_eq!(hash_and_blind_all(&key, &inputs, None), Ok(vec![]));
    }

    #[test]
    fn cancelled_batch_fails_as_a_whole() {
        let key = key_from_seed(5);
        let inputs = (0..16).map(|i| format!("Element {}", i)).collect::<Vec<String>>();
        let cancel = AtomicBool::new(true);

        assert_eq!(hash_and_blind_all(&key, &inputs, Some(&cancel)), Err(PSIError::Cancelled));
    }

    #[test]
    fn unblinding_strips_exactly_one_layer() {
        let client_key = SecretKey::generate().unwrap();
        let server_key = SecretKey::generate().unwrap();
        let inputs = ["apple", "banana", "cherry"];

        let client_blinded = hash_and_blind_all(&client_key, &inputs, None).unwrap();
        let double_blinded = reblind_all(&server_key, &client_blinded, None).unwrap();
        let server_blinded = unblind_all(&client_key, &double_blinded, None).unwrap();

        assert_eq!(server_blinded, hash_and_blind_all(&server_key, &inputs, None).unwrap());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn blinding_commutes(k1 in 1u8..=255, k2 in 1u8..=255, input in prop::collection::vec(any::<u8>(), 0..64)) {
            let key1 = key_from_seed(k1);
            let key2 = key_from_seed(k2);
            let point = hash_to_curve(&input).unwrap();

            let one_then_two = BlindedElement::blind(&key1, &point).unwrap().reblind(&key2).unwrap();
            let two_then_one = BlindedElement::blind(&key2, &point).unwrap().reblind(&key1).unwrap();

            prop_assert_eq!(one_then_two, two_then_one);
        }

        #[test]
        fn restored_key_blinds_identically(seed in 1u8..=255, input in prop::collection::vec(any::<u8>(), 1..32)) {
            let key = key_from_seed(seed);
            let restored = SecretKey::from_bytes(&key.to_bytes()).unwrap();
            let point = hash_to_curve(&input).unwrap();

            prop_assert_eq!(BlindedElement::blind(&key, &point).unwrap(), BlindedElement::blind(&restored, &point).unwrap());
        }
    }
}
