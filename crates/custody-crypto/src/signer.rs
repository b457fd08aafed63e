use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

use custody_types::{Block, Digest};
use tracing::info;

/// Ed25519 signing key (private) held by the ledger writer.
pub struct SigningKey(ed25519_dalek::SigningKey);

/// Ed25519 verifying key (public).
#[derive(Clone, PartialEq, Eq)]
pub struct VerifyingKey(ed25519_dalek::VerifyingKey);

/// Ed25519 signature.
#[derive(Clone, PartialEq, Eq)]
pub struct Signature(ed25519_dalek::Signature);

impl SigningKey {
    /// Generate a new random signing key.
    pub fn generate() -> Self {
        let mut csprng = rand::thread_rng();
        Self(ed25519_dalek::SigningKey::generate(&mut csprng))
    }

    /// Create from raw 32-byte secret.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(ed25519_dalek::SigningKey::from_bytes(&bytes))
    }

    /// The corresponding public verifying key.
    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey(self.0.verifying_key())
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Signature {
        use ed25519_dalek::Signer;
        Signature(self.0.sign(message))
    }

    /// Sign the raw bytes of a block hash.
    pub fn sign_digest(&self, digest: &Digest) -> Signature {
        self.sign(digest.as_bytes())
    }

    /// Raw secret key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    /// Load the 32-byte seed at `path`, or generate and persist a new key.
    ///
    /// An existing file of the wrong size is an error, never silently replaced.
    pub fn load_or_generate(path: &Path) -> Result<Self, KeyFileError> {
        if path.exists() {
            let mut buf = Vec::new();
            File::open(path)?.read_to_end(&mut buf)?;
            let seed: [u8; 32] = buf
                .as_slice()
                .try_into()
                .map_err(|_| KeyFileError::Malformed { len: buf.len() })?;
            info!(path = %path.display(), "loaded writer key");
            return Ok(Self::from_bytes(seed));
        }

        let key = Self::generate();
        key.save(path)?;
        info!(path = %path.display(), "generated new writer key");
        Ok(key)
    }

    /// Write the 32-byte seed to `path` (owner-readable only on unix).
    pub fn save(&self, path: &Path) -> Result<(), KeyFileError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut f = options.open(path)?;
        f.write_all(self.as_bytes())?;
        f.sync_all()?;
        Ok(())
    }
}

impl VerifyingKey {
    /// Verify a signature on a message.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), SignatureError> {
        use ed25519_dalek::Verifier;
        self.0
            .verify(message, &signature.0)
            .map_err(|_| SignatureError::InvalidSignature)
    }

    /// Verify a block's stored signature against its stored hash.
    pub fn verify_block(&self, block: &Block) -> Result<(), SignatureError> {
        let signature = Signature::from_hex(&block.signature)?;
        self.verify(block.hash.as_bytes(), &signature)
    }

    /// Raw public key bytes.
    pub fn as_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Hex-encoded public key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_bytes())
    }

    /// Create from raw 32-byte public key.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, SignatureError> {
        let key = ed25519_dalek::VerifyingKey::from_bytes(&bytes)
            .map_err(|_| SignatureError::InvalidKey)?;
        Ok(Self(key))
    }

    /// Parse a hex-encoded public key.
    pub fn from_hex(s: &str) -> Result<Self, SignatureError> {
        let bytes: [u8; 32] = hex::decode(s)
            .ok()
            .and_then(|b| b.try_into().ok())
            .ok_or(SignatureError::InvalidKey)?;
        Self::from_bytes(bytes)
    }
}

impl Signature {
    /// Hex-encoded 64-byte signature.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_bytes())
    }

    /// Parse a hex-encoded 64-byte signature.
    pub fn from_hex(s: &str) -> Result<Self, SignatureError> {
        let bytes: [u8; 64] = hex::decode(s)
            .ok()
            .and_then(|b| b.try_into().ok())
            .ok_or(SignatureError::Malformed)?;
        Ok(Self(ed25519_dalek::Signature::from_bytes(&bytes)))
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningKey(<redacted>)")
    }
}

impl std::fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VerifyingKey({})", self.to_hex())
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({}...)", hex::encode(&self.0.to_bytes()[..8]))
    }
}

/// Errors from signing operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("malformed signature encoding")]
    Malformed,
    #[error("invalid key")]
    InvalidKey,
}

/// Errors from reading or writing the writer key file.
#[derive(Debug, thiserror::Error)]
pub enum KeyFileError {
    #[error("key file I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("key file holds {len} bytes, expected a 32-byte seed")]
    Malformed { len: usize },
}
