use std::fmt;
use std::fs::File;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use md5::{Digest, Md5};
use sha1::Sha1;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
}

impl HashAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
        }
    }

    /// Digest length in bytes.
    pub fn digest_len(self) -> usize {
        match self {
            Self::Md5 => 16,
            Self::Sha1 => 20,
        }
    }

    fn display_name(self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Sha1 => "SHA-1",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HashError {
    #[error("Invalid hash, expecting something matching algorithm:hexdigest")]
    Malformed,
    #[error("Unkown hash algorithm ({0}), expected 'md5' or 'sha1'.")]
    UnknownAlgorithm(String),
    #[error("Invalid hash, should be {expected} bytes long for {name}.")]
    WrongLength { expected: usize, name: &'static str },
}

/// A digest a downloaded file must match, written `algorithm:hexdigest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedHash {
    algorithm: HashAlgorithm,
    digest: Vec<u8>,
}

impl ExpectedHash {
    pub fn parse(input: &str) -> Result<Self, HashError> {
        let (name, hex_digest) = input.trim().split_once(':').ok_or(HashError::Malformed)?;
        let well_formed = !name.is_empty()
            && name.chars().all(|ch| ch.is_alphanumeric() || ch == '_')
            && !hex_digest.is_empty()
            && hex_digest.chars().all(|ch| ch.is_ascii_hexdigit());
        if !well_formed {
            return Err(HashError::Malformed);
        }

        let algorithm = match name {
            "md5" => HashAlgorithm::Md5,
            "sha1" => HashAlgorithm::Sha1,
            other => return Err(HashError::UnknownAlgorithm(other.to_string())),
        };
        let digest = hex::decode(hex_digest).map_err(|_| HashError::Malformed)?;
        if digest.len() != algorithm.digest_len() {
            return Err(HashError::WrongLength {
                expected: algorithm.digest_len(),
                name: algorithm.display_name(),
            });
        }

        Ok(Self { algorithm, digest })
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn hex_digest(&self) -> String {
        hex::encode(&self.digest)
    }

    pub fn matches_hex(&self, actual_hex: &str) -> bool {
        hex::decode(actual_hex)
            .map(|actual| actual == self.digest)
            .unwrap_or(false)
    }
}

impl fmt::Display for ExpectedHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.as_str(), self.hex_digest())
    }
}

pub fn file_digest_hex(algorithm: HashAlgorithm, path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let digest = match algorithm {
        HashAlgorithm::Md5 => {
            let mut hasher = Md5::new();
            io::copy(&mut file, &mut hasher)
                .with_context(|| format!("failed to hash {}", path.display()))?;
            hex::encode(hasher.finalize())
        }
        HashAlgorithm::Sha1 => {
            let mut hasher = Sha1::new();
            io::copy(&mut file, &mut hasher)
                .with_context(|| format!("failed to hash {}", path.display()))?;
            hex::encode(hasher.finalize())
        }
    };
    Ok(digest)
}

/// Returns whether the file at `path` hashes to `expected`.
pub fn verify_file(path: &Path, expected: &ExpectedHash) -> Result<bool> {
    let actual = file_digest_hex(expected.algorithm(), path)?;
    Ok(expected.matches_hex(&actual))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ABC_MD5: &str = "900150983cd24fb0d6963f7d28e17f72";
    const ABC_SHA1: &str = "a9993e364706816aba3e25717850c26c9cd0d89d";

    fn write_abc() -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().expect("must create temp file");
        std::fs::write(file.path(), b"abc").expect("must write payload");
        file
    }

    #[test]
    fn parse_accepts_md5_and_sha1() {
        let md5 = ExpectedHash::parse(&format!("md5:{ABC_MD5}")).expect("md5 must parse");
        assert_eq!(md5.algorithm(), HashAlgorithm::Md5);
        assert_eq!(md5.to_string(), format!("md5:{ABC_MD5}"));

        let sha1 = ExpectedHash::parse(&format!("sha1:{}", ABC_SHA1.to_uppercase()))
            .expect("sha1 must parse");
        assert_eq!(sha1.algorithm(), HashAlgorithm::Sha1);
        assert_eq!(sha1.hex_digest(), ABC_SHA1);
    }

    #[test]
    fn parse_checks_digest_length_per_algorithm() {
        assert_eq!(
            ExpectedHash::parse(&format!("md5:{ABC_SHA1}")),
            Err(HashError::WrongLength {
                expected: 16,
                name: "MD5"
            })
        );
        assert_eq!(
            ExpectedHash::parse(&format!("sha1:{ABC_MD5}"))
                .expect_err("short sha1")
                .to_string(),
            "Invalid hash, should be 20 bytes long for SHA-1."
        );
    }

    #[test]
    fn parse_rejects_unknown_or_malformed_values() {
        assert_eq!(
            ExpectedHash::parse("crc32:abcd")
                .expect_err("unknown algorithm")
                .to_string(),
            "Unkown hash algorithm (crc32), expected 'md5' or 'sha1'."
        );
        for input in ["md5", "md5:", ":abcd", "md5:xyz", "md-5:abcd", "md5:abc"] {
            assert_eq!(
                ExpectedHash::parse(input),
                Err(HashError::Malformed),
                "{input}"
            );
        }
    }

    #[test]
    fn file_digest_matches_known_vectors() {
        let file = write_abc();
        assert_eq!(
            file_digest_hex(HashAlgorithm::Md5, file.path()).expect("must hash"),
            ABC_MD5
        );
        assert_eq!(
            file_digest_hex(HashAlgorithm::Sha1, file.path()).expect("must hash"),
            ABC_SHA1
        );
    }

    #[test]
    fn verify_file_detects_mismatch() {
        let file = write_abc();
        let good = ExpectedHash::parse(&format!("sha1:{ABC_SHA1}")).expect("must parse");
        let bad = ExpectedHash::parse("md5:d41d8cd98f00b204e9800998ecf8427e").expect("must parse");
        assert!(verify_file(file.path(), &good).expect("must verify"));
        assert!(!verify_file(file.path(), &bad).expect("must verify"));
    }

    #[test]
    fn verify_file_errors_for_missing_file() {
        let good = ExpectedHash::parse(&format!("md5:{ABC_MD5}")).expect("must parse");
        let missing = std::env::temp_dir().join("papps-security-missing-file");
        assert!(verify_file(&missing, &good).is_err());
    }
}
