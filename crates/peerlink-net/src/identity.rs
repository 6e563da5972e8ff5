//! Identity providers: where the node's static key comes from.
//!
//! The peer layer asks for the key each time it listens or dials, so a
//! provider must hand back the same key for the lifetime of the process.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use zeroize::Zeroizing;

use peerlink_core::Keypair;

/// Hierarchical path of the node identity branch in the wallet.
pub const IDENTITY_DERIVATION_PATH: &str = "m/44'/0'/9'/0'/0'";

/// Context string for the BLAKE3 key derivation of the identity key.
const IDENTITY_CONTEXT: &str = "peerlink identity key m/44'/0'/9'/0'/0'";

pub trait IdentityProvider: Send + Sync {
    fn identity_key(&self) -> Result<Arc<Keypair>, IdentityError>;
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("failed to access {0}: {1}")]
    Io(PathBuf, std::io::Error),

    #[error("{0} does not hold a hex-encoded 32-byte key")]
    Malformed(PathBuf),
}

// ── StaticIdentity ────────────────────────────────────────────────────────────

/// A keypair supplied up front.
#[derive(Debug, Clone)]
pub struct StaticIdentity(Arc<Keypair>);

impl StaticIdentity {
    pub fn new(keypair: Keypair) -> Self {
        Self(Arc::new(keypair))
    }

    pub fn generate() -> Self {
        Self::new(Keypair::generate())
    }
}

impl From<Arc<Keypair>> for StaticIdentity {
    fn from(keypair: Arc<Keypair>) -> Self {
        Self(keypair)
    }
}

impl IdentityProvider for StaticIdentity {
    fn identity_key(&self) -> Result<Arc<Keypair>, IdentityError> {
        Ok(self.0.clone())
    }
}

// ── KeyFileIdentity ───────────────────────────────────────────────────────────

/// Private key stored hex-encoded in a file, generated on first use.
pub struct KeyFileIdentity {
    path: PathBuf,
    cached: Mutex<Option<Arc<Keypair>>>,
}

impl KeyFileIdentity {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_or_create(&self) -> Result<Keypair, IdentityError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => parse_key(text.trim()).ok_or_else(|| IdentityError::Malformed(self.path.clone())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let keypair = Keypair::generate();
                write_key(&self.path, &keypair)
                    .map_err(|e| IdentityError::Io(self.path.clone(), e))?;
                tracing::info!(path = %self.path.display(), "generated new identity key");
                Ok(keypair)
            }
            Err(e) => Err(IdentityError::Io(self.path.clone(), e)),
        }
    }
}

impl IdentityProvider for KeyFileIdentity {
    fn identity_key(&self) -> Result<Arc<Keypair>, IdentityError> {
        let mut cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(keypair) = cached.as_ref() {
            return Ok(keypair.clone());
        }
        let keypair = Arc::new(self.load_or_create()?);
        *cached = Some(keypair.clone());
        Ok(keypair)
    }
}

fn parse_key(text: &str) -> Option<Keypair> {
    let mut private = Zeroizing::new([0u8; 32]);
    hex::decode_to_slice(text, &mut private[..]).ok()?;
    Some(Keypair::from_private(*private))
}

fn write_key(path: &Path, keypair: &Keypair) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let text = Zeroizing::new(hex::encode(&keypair.private_bytes()[..]));

    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(path)?;
        file.write_all(text.as_bytes())
    }
    #[cfg(not(unix))]
    {
        std::fs::write(path, text.as_bytes())
    }
}

// ── SeedIdentity ──────────────────────────────────────────────────────────────

/// Identity key derived from the wallet seed along the identity branch.
pub struct SeedIdentity {
    keypair: Arc<Keypair>,
}

impl SeedIdentity {
    pub fn from_seed(seed: &[u8]) -> Self {
        let private = Zeroizing::new(blake3::derive_key(IDENTITY_CONTEXT, seed));
        Self {
            keypair: Arc::new(Keypair::from_private(*private)),
        }
    }

    /// Read a seed file: hex if it decodes as hex, raw bytes otherwise.
    pub fn from_file(path: &Path) -> Result<Self, IdentityError> {
        let raw = Zeroizing::new(
            std::fs::read(path).map_err(|e| IdentityError::Io(path.to_path_buf(), e))?,
        );
        let trimmed = std::str::from_utf8(&raw).map(str::trim).ok();
        let seed = match trimmed.and_then(|t| hex::decode(t).ok()) {
            Some(decoded) => Zeroizing::new(decoded),
            None => raw.clone(),
        };
        if seed.is_empty() {
            return Err(IdentityError::Malformed(path.to_path_buf()));
        }
        Ok(Self::from_seed(&seed))
    }
}

impl IdentityProvider for SeedIdentity {
    fn identity_key(&self) -> Result<Arc<Keypair>, IdentityError> {
        Ok(self.keypair.clone())
    }
}
