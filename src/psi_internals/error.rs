use std::{error::Error, fmt::Display};

#[derive(Debug, PartialEq)]
pub enum PSIError {
    // Key store
    KeyGeneration(String),
    InvalidKeyLength { expected: usize, actual: usize },
    InvalidSecretKey,

    // Blinding
    InvalidPoint,

    // Set encoding
    EmptyServerInputSet,
    InvalidFalsePositiveRate(f64),
    UnsupportedDataStructure(u32),
    MalformedEncoding(&'static str),

    // Protocol
    MalformedMessage(&'static str),
    ProtocolModeMismatch,
    Cancelled,
}

impl Display for PSIError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KeyGeneration(e) => write!(f, "Failed to generate secret key, randomness source failed with: {}", e),
            Self::InvalidKeyLength { expected, actual } => write!(f, "Secret key must be {} -bytes, but received {} -bytes", expected, actual),
            Self::InvalidSecretKey => write!(f, "Secret key must be a non-zero scalar."),

            Self::InvalidPoint => write!(f, "Curve point is either not decodable or the identity element."),

            Self::EmptyServerInputSet => write!(f, "Can not encode empty server input set."),
            Self::InvalidFalsePositiveRate(fpr) => write!(f, "False positive rate must be in (0, 1], but received {}", fpr),
            Self::UnsupportedDataStructure(tag) => write!(f, "Data structure tag '{}' is not one of GCS (0), BloomFilter (1) or Raw (2).", tag),
            Self::MalformedEncoding(reason) => write!(f, "Encoded set is malformed: {}", reason),

            Self::MalformedMessage(reason) => write!(f, "Protocol message is malformed: {}", reason),
            Self::ProtocolModeMismatch => write!(f, "Client and server disagree on whether the intersection is revealed or only its size."),
            Self::Cancelled => write!(f, "Batch operation was cancelled before completion."),
        }
    }
}

impl Error for PSIError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        None
    }
}
