use crate::psi_internals::{
    blinder::{hash_and_blind_all, unblind_all},
    branch_opt_util,
    error::PSIError,
    messages::{Request, Response, ServerSetup},
    params::SECRET_KEY_BYTE_LEN,
    secret_key::SecretKey,
};
use rayon::prelude::*;
use std::sync::atomic::AtomicBool;

/// Client side of the ECDH Private Set Intersection protocol.
///
/// Holds the client's secret blinding key and the session mode, both fixed at creation. The client keeps no per-request
/// state: the response carries one element per request element, in request order, which is all that is needed to map
/// matches back to the client's inputs.
#[derive(Clone, Debug)]
pub struct Client {
    key: SecretKey,
    reveal_intersection: bool,
}

impl Client {
    /// Creates a client with a freshly sampled secret key.
    ///
    /// `reveal_intersection` selects the session mode and must agree with the server's. In cardinality-only mode,
    /// `get_intersection` is unavailable.
    ///
    /// Cardinality-only mode does not hide which inputs matched from the client itself. The response keeps request order
    /// in both modes, so a client holding its exported key can recreate itself in reveal mode and call `get_intersection`
    /// on the same setup and response. The mode only restricts this API, it is no privacy guarantee against the client.
    pub fn create_with_new_key(reveal_intersection: bool) -> Result<Client, PSIError> {
        Ok(Client {
            key: SecretKey::generate()?,
            reveal_intersection,
        })
    }

    /// Creates a client from a previously exported secret key, see `get_private_key_bytes`.
    pub fn create_from_key(key: &[u8], reveal_intersection: bool) -> Result<Client, PSIError> {
        Ok(Client {
            key: SecretKey::from_bytes(key)?,
            reveal_intersection,
        })
    }

    pub fn get_private_key_bytes(&self) -> [u8; SECRET_KEY_BYTE_LEN] {
        self.key.to_bytes()
    }

    pub fn reveal_intersection(&self) -> bool {
        self.reveal_intersection
    }

    /// Hashes and blinds every client input, keeping input order, and serializes the result as a `Request`.
    ///
    /// An empty input set yields a valid, empty request.
    pub fn create_request<T>(&self, inputs: &[T]) -> Result<Vec<u8>, PSIError>
    where
        T: AsRef<[u8]> + Sync,
    {
        self.create_request_inner(inputs, None)
    }

    /// Same as `create_request`, but gives up with `Cancelled` as soon as `cancel` is observed set.
    pub fn create_request_cancellable<T>(&self, inputs: &[T], cancel: &AtomicBool) -> Result<Vec<u8>, PSIError>
    where
        T: AsRef<[u8]> + Sync,
    {
        self.create_request_inner(inputs, Some(cancel))
    }

    fn create_request_inner<T>(&self, inputs: &[T], cancel: Option<&AtomicBool>) -> Result<Vec<u8>, PSIError>
    where
        T: AsRef<[u8]> + Sync,
    {
        log::debug!("creating request for {} client inputs", inputs.len());

        let request = Request {
            reveal_intersection: self.reveal_intersection,
            elements: hash_and_blind_all(&self.key, inputs, cancel)?,
        };

        Ok(request.to_bytes())
    }

    /// Computes which client inputs are in the server's set.
    ///
    /// # Returns
    ///
    /// Ascending indices into the input slice passed to `create_request`. With Bloom filter or GCS encoding, a non-member
    /// may show up at the false positive rate the server chose, true members are always reported. Fails with
    /// `ProtocolModeMismatch` on a cardinality-only client.
    pub fn get_intersection(&self, setup: &[u8], response: &[u8]) -> Result<Vec<usize>, PSIError> {
        if branch_opt_util::unlikely(!self.reveal_intersection) {
            return Err(PSIError::ProtocolModeMismatch);
        }

        let (membership, _) = self.test_membership(setup, response)?;

        Ok(membership.iter().enumerate().filter(|&(_, &is_member)| is_member).map(|(idx, _)| idx).collect())
    }

    /// Computes the size of the intersection of client and server sets.
    ///
    /// The count of positive membership tests is corrected for the expected number of false positives of the encoding in
    /// use, see `corrected_intersection_size`. Available in both session modes.
    pub fn get_intersection_size(&self, setup: &[u8], response: &[u8]) -> Result<usize, PSIError> {
        let (membership, per_query_fpr) = self.test_membership(setup, response)?;

        let positives = membership.iter().filter(|&&is_member| is_member).count();
        let corrected = corrected_intersection_size(positives, membership.len(), per_query_fpr);

        log::debug!(
            "{} of {} client elements tested positive, per-query fpr {:e}, corrected intersection size {}",
            positives,
            membership.len(),
            per_query_fpr,
            corrected
        );

        Ok(corrected)
    }

    /// Strips the client's blinding from every response element, which leaves the server's blinding of the matching client
    /// input, and probes it against the server's encoded set. Also returns the encoding's per-query false positive rate.
    fn test_membership(&self, setup: &[u8], response: &[u8]) -> Result<(Vec<bool>, f64), PSIError> {
        let setup = ServerSetup::from_bytes(setup)?;
        let response = Response::from_bytes(response)?;

        log::debug!(
            "testing {} response elements against {} encoded server set of {} elements",
            response.elements.len(),
            setup.encoded_set.data_structure(),
            setup.encoded_set.num_elements()
        );

        let decoder = setup.encoded_set.decoder()?;
        let server_blinded = unblind_all(&self.key, &response.elements, None)?;

        let membership = server_blinded.par_iter().map(|element| decoder.test(element)).collect::<Vec<bool>>();

        Ok((membership, setup.encoded_set.false_positive_rate()))
    }
}

/// Estimates the true number of members among `num_queries` probes, `positives` of which tested positive against an
/// encoding with per-query false positive rate `per_query_fpr`.
///
/// `round((positives - fpr * c) / (1 - fpr))`, clamped to `[0, c]`. With `fpr >= 1` every probe is positive regardless
/// of membership, nothing can be recovered and `positives` is returned as is, clamped.
pub fn corrected_intersection_size(positives: usize, num_queries: usize, per_query_fpr: f64) -> usize {
    let positives = positives.min(num_queries);
    if per_query_fpr <= 0.0 || per_query_fpr >= 1.0 {
        return positives;
    }

    let expected_false_positives = per_query_fpr * num_queries as f64;
    let estimate = ((positives as f64 - expected_false_positives) / (1.0 - per_query_fpr)).round();

    estimate.clamp(0.0, num_queries as f64) as usize
}

#[cfg(test)]
mod test {
    use crate::{
        client::{Client, corrected_intersection_size},
        psi_internals::{error::PSIError, messages::Request},
    };
    use std::sync::atomic::AtomicBool;
    use test_case::test_case;

    const CLIENT_KEY: [u8; 32] = [
        0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31,
    ];

    #[test_case(5, 10, 0.0 => 5; "Exact encoding needs no correction")]
    #[test_case(10, 10, 1.0 => 10; "Unit rate returns raw count")]
    #[test_case(60, 1000, 0.01 => 51; "Expected false positives are subtracted")]
    #[test_case(3, 1000, 0.01 => 0; "Estimate is clamped at zero")]
    #[test_case(1000, 1000, 0.5 => 1000; "Estimate is clamped at client set size")]
    #[test_case(0, 0, 0.3 => 0; "Empty client set")]
    fn intersection_size_correction(positives: usize, num_queries: usize, per_query_fpr: f64) -> usize {
        corrected_intersection_size(positives, num_queries, per_query_fpr)
    }

    #[test_case(&[0u8; 31] => matches Err(PSIError::InvalidKeyLength { expected: 32, actual: 31 }); "Short key")]
    #[test_case(&[0u8; 32] => matches Err(PSIError::InvalidSecretKey); "Zero key")]
    #[test_case(&CLIENT_KEY => matches Ok(_); "Fixed key")]
    fn client_from_key(key: &[u8]) -> Result<Client, PSIError> {
        Client::create_from_key(key, true)
    }

    #[test]
    fn request_carries_mode_and_input_count() {
        let inputs = (0..10).map(|i| format!("Element {}", i)).collect::<Vec<String>>();

        for reveal_intersection in [false, true] {
            let client = Client::create_from_key(&CLIENT_KEY, reveal_intersection).unwrap();
            let request = Request::from_bytes(&client.create_request(&inputs).unwrap()).unwrap();

            assert_eq!(request.reveal_intersection, reveal_intersection);
            assert_eq!(request.elements.len(), inputs.len());
        }
    }

    #[test]
    fn cardinality_only_client_refuses_get_intersection() {
        let client = Client::create_from_key(&CLIENT_KEY, false).unwrap();
        assert_eq!(client.get_intersection(&[], &[]), Err(PSIError::ProtocolModeMismatch));
    }

    #[test]
    fn cancelled_request_fails() {
        let client = Client::create_with_new_key(true).unwrap();
        let cancel = AtomicBool::new(true);

        assert_eq!(client.create_request_cancellable(&["a", "b"], &cancel), Err(PSIError::Cancelled));
    }

    #[test]
    fn client_key_survives_export() {
        let client = Client::create_with_new_key(false).unwrap();
        let restored = Client::create_from_key(&client.get_private_key_bytes(), false).unwrap();

        assert_eq!(client.create_request(&["apple", "banana"]), restored.create_request(&["apple", "banana"]));
    }
}
