use crate::psi_internals::{
    blinder::{hash_and_blind_all, reblind_all},
    branch_opt_util,
    data_structure::DataStructure,
    encoded_set::{EncodedSet, check_encoding_arguments},
    error::PSIError,
    messages::{Request, Response, ServerSetup},
    params::SECRET_KEY_BYTE_LEN,
    secret_key::SecretKey,
};
use std::sync::atomic::AtomicBool;

/// Server side of the ECDH Private Set Intersection protocol.
///
/// Holds the server's secret blinding key and the session mode, both fixed at creation. A `Server` is immutable after
/// creation, so one instance can serve any number of concurrent requests.
#[derive(Clone, Debug)]
pub struct Server {
    key: SecretKey,
    reveal_intersection: bool,
}

impl Server {
    /// Creates a server with a freshly sampled secret key.
    ///
    /// `reveal_intersection` selects the session mode: if `false`, the client is only meant to learn the intersection size.
    /// The client must be created in the same mode.
    pub fn create_with_new_key(reveal_intersection: bool) -> Result<Server, PSIError> {
        Ok(Server {
            key: SecretKey::generate()?,
            reveal_intersection,
        })
    }

    /// Creates a server from a previously exported secret key, see `get_private_key_bytes`.
    pub fn create_from_key(key: &[u8], reveal_intersection: bool) -> Result<Server, PSIError> {
        Ok(Server {
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

    /// Creates the setup message, which the server sends to the client ahead of, or alongside, the response.
    ///
    /// Every input is hashed onto the curve and blinded with the server's key, then the blinded set is encoded with the
    /// chosen data structure.
    ///
    /// # Arguments
    ///
    /// * `fpr`: False positive rate in (0, 1], budgeted over all `num_client_inputs` membership tests the client will run.
    /// * `num_client_inputs`: Expected size of the client's input set, used to dimension the encoding.
    /// * `inputs`: Server's input set, must be non-empty. Duplicates are fine.
    /// * `data_structure`: Encoding used to ship the blinded set.
    ///
    /// # Returns
    ///
    /// Serialized `ServerSetup`, or `EmptyServerInputSet`/`InvalidFalsePositiveRate` if arguments are out of range. Its
    /// `num_server_elements` counts distinct server inputs, duplicates are dropped before encoding.
    pub fn create_setup_message<T>(&self, fpr: f64, num_client_inputs: usize, inputs: &[T], data_structure: DataStructure) -> Result<Vec<u8>, PSIError>
    where
        T: AsRef<[u8]> + Sync,
    {
        self.create_setup_message_inner(fpr, num_client_inputs, inputs, data_structure, None)
    }

    /// Same as `create_setup_message`, but gives up with `Cancelled` as soon as `cancel` is observed set.
    pub fn create_setup_message_cancellable<T>(
        &self,
        fpr: f64,
        num_client_inputs: usize,
        inputs: &[T],
        data_structure: DataStructure,
        cancel: &AtomicBool,
    ) -> Result<Vec<u8>, PSIError>
    where
        T: AsRef<[u8]> + Sync,
    {
        self.create_setup_message_inner(fpr, num_client_inputs, inputs, data_structure, Some(cancel))
    }

    fn create_setup_message_inner<T>(
        &self,
        fpr: f64,
        num_client_inputs: usize,
        inputs: &[T],
        data_structure: DataStructure,
        cancel: Option<&AtomicBool>,
    ) -> Result<Vec<u8>, PSIError>
    where
        T: AsRef<[u8]> + Sync,
    {
        // Fail before paying for the blinding.
        check_encoding_arguments(fpr, inputs.len())?;

        log::debug!(
            "creating setup message: {} server inputs, {} expected client inputs, {}, fpr {:e}",
            inputs.len(),
            num_client_inputs,
            data_structure,
            fpr
        );

        let mut blinded = hash_and_blind_all(&self.key, inputs, cancel)?;
        blinded.sort_unstable();
        blinded.dedup();

        let encoded_set = EncodedSet::encode(&blinded, fpr, data_structure, num_client_inputs)?;

        let setup = ServerSetup {
            fpr,
            num_server_elements: blinded.len() as u64,
            encoded_set,
        };

        Ok(setup.to_bytes())
    }

    /// Processes a client request, blinding every requested element once more with the server's key.
    ///
    /// The response keeps request order exactly, and the server learns nothing about which elements match. Fails with
    /// `ProtocolModeMismatch` if the request was created by a client in the other session mode.
    pub fn process_request(&self, request: &[u8]) -> Result<Vec<u8>, PSIError> {
        self.process_request_inner(request, None)
    }

    /// Same as `process_request`, but gives up with `Cancelled` as soon as `cancel` is observed set.
    pub fn process_request_cancellable(&self, request: &[u8], cancel: &AtomicBool) -> Result<Vec<u8>, PSIError> {
        self.process_request_inner(request, Some(cancel))
    }

    fn process_request_inner(&self, request: &[u8], cancel: Option<&AtomicBool>) -> Result<Vec<u8>, PSIError> {
        let request = Request::from_bytes(request)?;

        // Best-effort check, a client lying about its mode is not detected.
        if branch_opt_util::unlikely(request.reveal_intersection != self.reveal_intersection) {
            return Err(PSIError::ProtocolModeMismatch);
        }

        log::debug!("processing request of {} elements", request.elements.len());

        let response = Response {
            elements: reblind_all(&self.key, &request.elements, cancel)?,
        };

        Ok(response.to_bytes())
    }
}
