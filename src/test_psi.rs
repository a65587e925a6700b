#![cfg(test)]

use crate::{Client, DataStructure, PSIError, Server, version};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use test_case::test_case;

const CLIENT_KEY: [u8; 32] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31,
];
const SERVER_KEY: [u8; 32] = [
    1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32,
];

const ALL_DATA_STRUCTURES: [DataStructure; 3] = [DataStructure::Gcs, DataStructure::BloomFilter, DataStructure::Raw];

/// "Element 0" ..= "Element 9" for the client, every even "Element 0" ..= "Element 198" for the server.
fn scenario_inputs() -> (Vec<String>, Vec<String>) {
    let client_inputs = (0..10).map(|i| format!("Element {}", i)).collect();
    let server_inputs = (0..100).map(|i| format!("Element {}", 2 * i)).collect();

    (client_inputs, server_inputs)
}

/// Runs one protocol round trip, returning the setup message and the response.
fn run_protocol<T>(client: &Client, server: &Server, fpr: f64, client_inputs: &[T], server_inputs: &[T], ds: DataStructure) -> (Vec<u8>, Vec<u8>)
where
    T: AsRef<[u8]> + Sync,
{
    let setup = server.create_setup_message(fpr, client_inputs.len(), server_inputs, ds).expect("Server setup failed");
    let request = client.create_request(client_inputs).expect("Request creation failed");
    let response = server.process_request(&request).expect("Server failed to respond");

    (setup, response)
}

#[test_case(DataStructure::Gcs, true; "GCS revealing intersection")]
#[test_case(DataStructure::Gcs, false; "GCS revealing cardinality")]
#[test_case(DataStructure::BloomFilter, true; "Bloom filter revealing intersection")]
#[test_case(DataStructure::BloomFilter, false; "Bloom filter revealing cardinality")]
#[test_case(DataStructure::Raw, true; "Raw revealing intersection")]
#[test_case(DataStructure::Raw, false; "Raw revealing cardinality")]
fn even_elements_scenario_with_fixed_keys(ds: DataStructure, reveal_intersection: bool) {
    let (client_inputs, server_inputs) = scenario_inputs();

    let client = Client::create_from_key(&CLIENT_KEY, reveal_intersection).unwrap();
    let server = Server::create_from_key(&SERVER_KEY, reveal_intersection).unwrap();

    let (setup, response) = run_protocol(&client, &server, 1e-6, &client_inputs, &server_inputs, ds);

    assert_eq!(client.get_intersection_size(&setup, &response), Ok(5));
    if reveal_intersection {
        assert_eq!(client.get_intersection(&setup, &response), Ok(vec![0, 2, 4, 6, 8]));
    } else {
        assert_eq!(client.get_intersection(&setup, &response), Err(PSIError::ProtocolModeMismatch));
    }
}

#[test]
fn even_elements_scenario_with_loose_false_positive_rate() {
    let (client_inputs, server_inputs) = scenario_inputs();

    for ds in ALL_DATA_STRUCTURES {
        let client = Client::create_with_new_key(false).unwrap();
        let server = Server::create_with_new_key(false).unwrap();

        let (setup, response) = run_protocol(&client, &server, 0.001, &client_inputs, &server_inputs, ds);
        let intersection_size = client.get_intersection_size(&setup, &response).unwrap();

        assert!(intersection_size.abs_diff(5) <= 1, "{}: intersection size {}", ds, intersection_size);
    }
}

#[test]
fn raw_encoding_is_exact() {
    let mut rng = ChaCha8Rng::from_os_rng();

    let client = Client::create_with_new_key(true).unwrap();
    let server = Server::create_with_new_key(true).unwrap();

    // Random 16 -bytes inputs, every third client input is also held by the server.
    let client_inputs = (0..500)
        .map(|_| {
            let mut input = vec![0u8; 16];
            rng.fill_bytes(&mut input);
            input
        })
        .collect::<Vec<Vec<u8>>>();
    let mut server_inputs = client_inputs.iter().step_by(3).cloned().collect::<Vec<Vec<u8>>>();
    server_inputs.extend((0..1000).map(|i| format!("server only {}", i).into_bytes()));
    server_inputs.shuffle(&mut rng);

    let (setup, response) = run_protocol(&client, &server, 1.0, &client_inputs, &server_inputs, DataStructure::Raw);

    let expected = (0..client_inputs.len()).step_by(3).collect::<Vec<usize>>();
    assert_eq!(client.get_intersection(&setup, &response), Ok(expected.clone()));
    assert_eq!(client.get_intersection_size(&setup, &response), Ok(expected.len()));
}

#[test_case(DataStructure::Gcs; "GCS")]
#[test_case(DataStructure::BloomFilter; "Bloom filter")]
fn unit_false_positive_rate_matches_everything(ds: DataStructure) {
    let (client_inputs, server_inputs) = scenario_inputs();

    let client = Client::create_from_key(&CLIENT_KEY, true).unwrap();
    let server = Server::create_from_key(&SERVER_KEY, true).unwrap();

    let (setup, response) = run_protocol(&client, &server, 1.0, &client_inputs, &server_inputs, ds);

    assert_eq!(client.get_intersection_size(&setup, &response), Ok(client_inputs.len()));
    assert_eq!(client.get_intersection(&setup, &response), Ok((0..client_inputs.len()).collect()));
}

#[test_case(DataStructure::Gcs, 1e-12; "GCS")]
#[test_case(DataStructure::BloomFilter, 1e-12; "Bloom filter")]
#[test_case(DataStructure::Gcs, f64::MIN_POSITIVE; "GCS at smallest positive false positive rate")]
#[test_case(DataStructure::BloomFilter, f64::MIN_POSITIVE; "Bloom filter at smallest positive false positive rate")]
fn tiny_false_positive_rate_is_exact(ds: DataStructure, fpr: f64) {
    let client_inputs = (0..1000).map(|i| format!("Element {}", i)).collect::<Vec<String>>();
    let server_inputs = (0..1000).map(|i| format!("Element {}", 3 * i)).collect::<Vec<String>>();

    let client = Client::create_with_new_key(true).unwrap();
    let server = Server::create_with_new_key(true).unwrap();

    let (setup, response) = run_protocol(&client, &server, fpr, &client_inputs, &server_inputs, ds);

    let expected = (0..client_inputs.len()).step_by(3).collect::<Vec<usize>>();
    assert_eq!(client.get_intersection(&setup, &response), Ok(expected.clone()));
    assert_eq!(client.get_intersection_size(&setup, &response), Ok(expected.len()));
}

#[test_case(DataStructure::Gcs; "GCS")]
#[test_case(DataStructure::BloomFilter; "Bloom filter")]
fn corrected_intersection_size_is_close_to_true_size(ds: DataStructure) {
    const NUM_TRIALS: usize = 8;
    const NUM_CLIENT_INPUTS: usize = 100;
    const TRUE_INTERSECTION_SIZE: usize = 50;

    // Budget of 0.99 over 100 queries is ~4.5% per query, so ~2 of the 50 non-members are expected to test positive.
    const FPR: f64 = 0.99;

    let client_inputs = (0..NUM_CLIENT_INPUTS).map(|i| format!("client {}", i)).collect::<Vec<String>>();
    let mut server_inputs = client_inputs[..TRUE_INTERSECTION_SIZE].to_vec();
    server_inputs.extend((0..150).map(|i| format!("server {}", i)));

    let mut total_abs_error = 0;
    for _ in 0..NUM_TRIALS {
        let client = Client::create_with_new_key(false).unwrap();
        let server = Server::create_with_new_key(false).unwrap();

        let (setup, response) = run_protocol(&client, &server, FPR, &client_inputs, &server_inputs, ds);
        let intersection_size = client.get_intersection_size(&setup, &response).unwrap();

        let abs_error = intersection_size.abs_diff(TRUE_INTERSECTION_SIZE);
        assert!(abs_error <= 8, "{}: intersection size {}", ds, intersection_size);

        total_abs_error += abs_error;
    }

    let mean_abs_error = total_abs_error as f64 / NUM_TRIALS as f64;
    assert!(mean_abs_error <= 3.0, "{}: mean absolute error {}", ds, mean_abs_error);
}

#[test_case(DataStructure::Gcs; "GCS")]
#[test_case(DataStructure::BloomFilter; "Bloom filter")]
fn corrected_intersection_size_is_unbiased_at_high_false_positive_rate(ds: DataStructure) {
    const NUM_TRIALS: usize = 500;
    const TRUE_INTERSECTION_SIZE: usize = 5;

    // Budget of 0.999 over 10 queries is ~50% per query, where colliding GCS slots are common.
    const FPR: f64 = 0.999;

    let server_inputs = (0..1000).map(|i| format!("Element {}", 2 * i)).collect::<Vec<String>>();

    let client = Client::create_from_key(&CLIENT_KEY, false).unwrap();
    let server = Server::create_with_new_key(false).unwrap();

    let setup = server.create_setup_message(FPR, 10, &server_inputs, ds).unwrap();

    let mut total_intersection_size = 0;
    for trial in 0..NUM_TRIALS {
        // Same members every trial, fresh non-members.
        let mut client_inputs = (0..TRUE_INTERSECTION_SIZE).map(|i| format!("Element {}", 2 * i)).collect::<Vec<String>>();
        client_inputs.extend((0..5).map(|i| format!("trial {} outsider {}", trial, i)));

        let response = server.process_request(&client.create_request(&client_inputs).unwrap()).unwrap();
        total_intersection_size += client.get_intersection_size(&setup, &response).unwrap();
    }

    let mean_intersection_size = total_intersection_size as f64 / NUM_TRIALS as f64;
    assert!(
        (mean_intersection_size - TRUE_INTERSECTION_SIZE as f64).abs() < 0.45,
        "{}: mean intersection size {}",
        ds,
        mean_intersection_size
    );
}

#[test]
fn empty_server_input_set_is_rejected() {
    let server = Server::create_with_new_key(true).unwrap();
    let no_inputs: [&str; 0] = [];

    for ds in ALL_DATA_STRUCTURES {
        assert_eq!(server.create_setup_message(0.01, 10, &no_inputs, ds), Err(PSIError::EmptyServerInputSet));
    }
}

#[test]
fn empty_client_input_set_yields_empty_result() {
    let (_, server_inputs) = scenario_inputs();
    let no_inputs: [String; 0] = [];

    for ds in ALL_DATA_STRUCTURES {
        let client = Client::create_with_new_key(true).unwrap();
        let server = Server::create_with_new_key(true).unwrap();

        let (setup, response) = run_protocol(&client, &server, 0.01, &no_inputs, &server_inputs, ds);

        assert_eq!(client.get_intersection(&setup, &response), Ok(Vec::new()));
        assert_eq!(client.get_intersection_size(&setup, &response), Ok(0));
    }
}

#[test]
fn duplicate_client_inputs_are_all_reported() {
    let client_inputs = ["Element 2", "Element 3", "Element 2"];
    let server_inputs = ["Element 0", "Element 2", "Element 2", "Element 4"];

    let client = Client::create_from_key(&CLIENT_KEY, true).unwrap();
    let server = Server::create_from_key(&SERVER_KEY, true).unwrap();

    let (setup, response) = run_protocol(&client, &server, 1e-9, &client_inputs, &server_inputs, DataStructure::Raw);

    assert_eq!(client.get_intersection(&setup, &response), Ok(vec![0, 2]));
    assert_eq!(client.get_intersection_size(&setup, &response), Ok(2));
}

#[test]
fn mismatched_session_modes_are_rejected() {
    let client = Client::create_with_new_key(false).unwrap();
    let server = Server::create_with_new_key(true).unwrap();

    let request = client.create_request(&["Element 0"]).unwrap();
    assert_eq!(server.process_request(&request), Err(PSIError::ProtocolModeMismatch));
}

#[test]
fn cardinality_mode_does_not_hide_members_from_client() {
    let (client_inputs, server_inputs) = scenario_inputs();

    let client = Client::create_from_key(&CLIENT_KEY, false).unwrap();
    let server = Server::create_from_key(&SERVER_KEY, false).unwrap();

    let (setup, response) = run_protocol(&client, &server, 1e-9, &client_inputs, &server_inputs, DataStructure::Raw);
    assert_eq!(client.get_intersection(&setup, &response), Err(PSIError::ProtocolModeMismatch));

    // Responses keep request order, so the same key in reveal mode decodes the members anyway.
    let revealing_client = Client::create_from_key(&client.get_private_key_bytes(), true).unwrap();
    assert_eq!(revealing_client.get_intersection(&setup, &response), Ok(vec![0, 2, 4, 6, 8]));
}

#[test]
fn setup_message_is_deterministic_for_fixed_key() {
    let (_, server_inputs) = scenario_inputs();
    let mut shuffled_inputs = server_inputs.clone();
    shuffled_inputs.shuffle(&mut ChaCha8Rng::from_os_rng());

    let server = Server::create_from_key(&SERVER_KEY, true).unwrap();

    for ds in ALL_DATA_STRUCTURES {
        let setup = server.create_setup_message(0.01, 10, &server_inputs, ds).unwrap();
        let setup_again = server.create_setup_message(0.01, 10, &server_inputs, ds).unwrap();
        let setup_shuffled = server.create_setup_message(0.01, 10, &shuffled_inputs, ds).unwrap();

        assert_eq!(setup, setup_again);
        assert_eq!(setup, setup_shuffled);
    }
}

#[test]
fn restored_keys_reproduce_protocol_run() {
    let (client_inputs, server_inputs) = scenario_inputs();

    let client = Client::create_with_new_key(true).unwrap();
    let server = Server::create_with_new_key(true).unwrap();
    let restored_client = Client::create_from_key(&client.get_private_key_bytes(), true).unwrap();
    let restored_server = Server::create_from_key(&server.get_private_key_bytes(), true).unwrap();

    let (setup, response) = run_protocol(&client, &server, 1e-6, &client_inputs, &server_inputs, DataStructure::Gcs);

    // Restored parties answer byte for byte like the ones they were exported from.
    let restored_response = restored_server
        .process_request(&restored_client.create_request(&client_inputs).unwrap())
        .unwrap();

    assert_eq!(restored_response, response);
    assert_eq!(restored_client.get_intersection(&setup, &restored_response), client.get_intersection(&setup, &response));
}

#[test]
fn response_from_other_client_key_finds_nothing() {
    let (client_inputs, server_inputs) = scenario_inputs();

    let client = Client::create_from_key(&CLIENT_KEY, true).unwrap();
    let other_client = Client::create_with_new_key(true).unwrap();
    let server = Server::create_from_key(&SERVER_KEY, true).unwrap();

    let (setup, response) = run_protocol(&other_client, &server, 1e-9, &client_inputs, &server_inputs, DataStructure::Raw);

    assert_eq!(client.get_intersection(&setup, &response), Ok(Vec::new()));
}

#[test]
fn malformed_messages_are_rejected() {
    let (client_inputs, server_inputs) = scenario_inputs();

    let client = Client::create_from_key(&CLIENT_KEY, true).unwrap();
    let server = Server::create_from_key(&SERVER_KEY, true).unwrap();

    let (setup, response) = run_protocol(&client, &server, 1e-6, &client_inputs, &server_inputs, DataStructure::Gcs);

    assert!(matches!(
        client.get_intersection(&setup[..setup.len() - 1], &response),
        Err(PSIError::MalformedEncoding(_))
    ));
    assert!(matches!(
        client.get_intersection(&setup, &response[..response.len() - 1]),
        Err(PSIError::MalformedMessage(_))
    ));
    assert!(matches!(server.process_request(&[0xffu8; 16]), Err(PSIError::MalformedMessage(_))));
}

#[test]
fn version_is_semver() {
    let parts = version().split('.').collect::<Vec<&str>>();

    assert_eq!(parts.len(), 3);
    assert!(parts.iter().all(|part| part.parse::<u64>().is_ok()));
}
