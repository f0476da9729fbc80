//! Content digests for deduplication
//!
//! Every file's identity in the store is the hex-encoded digest of its raw
//! bytes. The algorithm is fixed per store: it is recorded the first time a
//! database is opened and checked on every later open, since mixing two
//! algorithms in one store would break deduplication.
//!
//! ## Examples
//!
//! ```rust
//! use cairn::digest::{Digester, HashAlgorithm};
//!
//! let digester = Digester::new(HashAlgorithm::Sha256);
//! let hash = digester.digest_bytes(b"hello");
//! assert_eq!(
//!     hash.as_str(),
//!     "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
//! );
//! ```

use crate::error::{CairnError, Result};
use crate::types::ContentHash;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use tracing::trace;

/// Read buffer used when streaming file content into a hasher
const BUFFER_SIZE: usize = 8192;

/// Supported digest algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// SHA-256, 64 hex characters (default)
    #[default]
    Sha256,
    /// SHA-512, 128 hex characters
    Sha512,
    /// BLAKE3, 64 hex characters
    Blake3,
}

impl HashAlgorithm {
    /// Name as stored in the database and accepted on the command line
    pub fn as_str(self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha512 => "sha512",
            HashAlgorithm::Blake3 => "blake3",
        }
    }

    /// Length of a hex digest produced by this algorithm
    pub fn hex_len(self) -> usize {
        match self {
            HashAlgorithm::Sha512 => 128,
            HashAlgorithm::Sha256 | HashAlgorithm::Blake3 => 64,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = CairnError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(HashAlgorithm::Sha256),
            "sha512" | "sha-512" => Ok(HashAlgorithm::Sha512),
            "blake3" => Ok(HashAlgorithm::Blake3),
            other => Err(CairnError::InvalidConfiguration(format!(
                "unknown hash algorithm '{}' (expected sha256, sha512 or blake3)",
                other
            ))),
        }
    }
}

/// Incremental hasher over one of the supported algorithms
enum Hasher {
    Sha256(Sha256),
    Sha512(Sha512),
    Blake3(Box<blake3::Hasher>),
}

impl Hasher {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha256 => Hasher::Sha256(Sha256::new()),
            HashAlgorithm::Sha512 => Hasher::Sha512(Sha512::new()),
            HashAlgorithm::Blake3 => Hasher::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Sha256(h) => h.update(data),
            Hasher::Sha512(h) => h.update(data),
            Hasher::Blake3(h) => {
                h.update(data);
            }
        }
    }

    fn finalize(self) -> ContentHash {
        let hex = match self {
            Hasher::Sha256(h) => hex::encode(h.finalize()),
            Hasher::Sha512(h) => hex::encode(h.finalize()),
            Hasher::Blake3(h) => h.finalize().to_hex().to_string(),
        };
        ContentHash::new(hex)
    }
}

/// Computes content hashes with a fixed algorithm
///
/// Cheap to copy, so each worker thread can carry its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct Digester {
    algorithm: HashAlgorithm,
}

impl Digester {
    /// Create a digester for the given algorithm
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self { algorithm }
    }

    /// Algorithm in use
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Hash an in-memory buffer
    pub fn digest_bytes(&self, data: &[u8]) -> ContentHash {
        let mut hasher = Hasher::new(self.algorithm);
        hasher.update(data);
        hasher.finalize()
    }

    /// Hash everything a reader yields, streaming in fixed-size chunks
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the reader fails.
    pub fn digest_reader<R: Read>(&self, mut reader: R) -> std::io::Result<ContentHash> {
        let mut hasher = Hasher::new(self.algorithm);
        let mut buffer = vec![0u8; BUFFER_SIZE];

        loop {
            let n = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            hasher.update(&buffer[..n]);
        }

        Ok(hasher.finalize())
    }

    /// Hash a file's content without loading it whole
    ///
    /// # Errors
    ///
    /// Returns [`CairnError::FileRead`] if the file cannot be opened or read.
    pub fn digest_file(&self, path: &Path) -> Result<ContentHash> {
        let file = File::open(path).map_err(|source| CairnError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let hash = self
            .digest_reader(file)
            .map_err(|source| CairnError::FileRead {
                path: path.to_path_buf(),
                source,
            })?;
        trace!("Hashed {:?} -> {}", path, hash.short());
        Ok(hash)
    }
}
