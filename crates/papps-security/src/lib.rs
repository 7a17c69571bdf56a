mod digest;

pub use digest::{file_digest_hex, verify_file, ExpectedHash, HashAlgorithm, HashError};
