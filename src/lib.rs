//! ECDH-PSI: A Rust library implementation of two-party **P**rivate **S**et **I**ntersection (PSI), built on commutative blinding over the Ristretto255 prime-order group.
//!
//! This crate lets a client and a server learn the intersection of their private sets, or only its size, without revealing anything else about their sets to each other.
//! Each party blinds its hashed-to-curve elements with its own secret scalar. Because scalar multiplication commutes, a client element blinded by both parties equals
//! the matching server element blinded by both parties, so matches can be found without either side ever seeing the other's raw inputs.
//!
//! ## Features
//!
//! * **Private Set Intersection and Cardinality:** The session mode decides whether the client learns the indices of its intersecting inputs, or only the intersection size.
//! * **Compact Setup Messages:** The server's blinded set is shipped as a Golomb-Compressed Set (smallest, default), a Bloom filter, or a Raw set of truncated hashes (exact).
//!   GCS and Bloom filter trade a configurable false positive rate for size, and the intersection size is statistically corrected for it.
//! * **Parallelism:** Hashing and blinding of large input batches runs on rayon's thread pool, keeping input order. Batches can be cancelled through an `AtomicBool`.
//! * **Error Handling:** All fallible operations return `PSIError`, malformed or hostile messages are rejected, never panicked upon.
//!
//! ## Usage
//!
//! This crate is designed to be used in conjunction with other crates which provide a communication channel between client and server.
//! The protocol takes one round trip: the server sends its setup message, the client sends its request, the server answers with a response.
//! Messages are plain byte vectors.
//!
//! Add this crate as dependency to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! ecdh_psi = "=0.3.0"
//! ```
//!
//! Then, you can use it in your code:
//!
//! ```rust
//! use ecdh_psi::{Client, DataStructure, Server};
//!
//! fn main() {
//!     let client_inputs = ["apple", "banana", "cherry"];
//!     let server_inputs = ["banana", "cherry", "durian", "elderberry"];
//!
//!     let server = Server::create_with_new_key(true).expect("Server creation failed");
//!     let client = Client::create_with_new_key(true).expect("Client creation failed");
//!
//!     // Server encodes its blinded set, for a client expected to hold ~3 inputs
//!     let setup = server
//!         .create_setup_message(1e-6, client_inputs.len(), &server_inputs, DataStructure::Gcs)
//!         .expect("Server setup failed");
//!
//!     // Client blinds its inputs, server blinds them once more
//!     let request = client.create_request(&client_inputs).expect("Request creation failed");
//!     let response = server.process_request(&request).expect("Server failed to respond");
//!
//!     // Client finds its inputs in the server's set
//!     let intersection = client.get_intersection(&setup, &response).expect("Intersection failed");
//!     assert_eq!(intersection, vec![1, 2]);
//!
//!     let intersection_size = client.get_intersection_size(&setup, &response).expect("Intersection size failed");
//!     assert_eq!(intersection_size, 2);
//! }
//! ```
//!
//! ## Modules
//!
//! * `server`: Contains the `Server` struct, for creating setup messages from the server's set and answering client requests.
//! * `client`: Contains the `Client` struct, for creating requests and computing the intersection, or its size, from the server's messages.
//!
//! Protocol messages can be inspected by parsing them with `ServerSetup`, `Request` and `Response`, e.g. to log the encoding a server picked.
//!
//! Both parties must agree on the session mode beforehand. It is checked on a best-effort basis, but it is not cryptographically enforced.
//! Responses keep request order in both modes, so cardinality-only mode does not hide which of its inputs matched from the client.

mod psi_internals;

pub mod client;
pub mod server;

pub use client::Client;
pub use psi_internals::blinder::BlindedElement;
pub use psi_internals::data_structure::DataStructure;
pub use psi_internals::encoded_set::{EncodedSet, SetDecoder};
pub use psi_internals::error::PSIError;
pub use psi_internals::messages::{Request, Response, ServerSetup};
pub use psi_internals::params::{BLINDED_ELEMENT_BYTE_LEN, SECRET_KEY_BYTE_LEN};
pub use psi_internals::secret_key::SecretKey;
pub use server::Server;

/// Version of this library, which is the same for both protocol roles.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

mod test_psi;
