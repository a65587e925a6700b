pub mod blinder;
pub mod bloom_filter;
pub mod branch_opt_util;
pub mod data_structure;
pub mod encoded_set;
pub mod error;
pub mod golomb_compressed_set;
pub mod messages;
pub mod params;
pub mod raw_set;
pub mod secret_key;
pub mod serialization;
