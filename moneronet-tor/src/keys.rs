//! Issuance of Tor v3 hidden-service credentials.
//!
//! A [`Credentials`] value holds exactly the three files tor expects inside a
//! `HiddenServiceDir`: the expanded ed25519 secret key, the public key and the
//! `hostname`. Once all three are present and non-empty the identity counts as
//! issued and must never be regenerated; [`already_issued`] is the gate every
//! caller checks before [`issue`].

use std::collections::BTreeMap;

use data_encoding::BASE32;
use ed25519_dalek::SigningKey;
use rand::{rngs::OsRng, RngCore};
use sha2::Sha512;
use sha3::{Digest, Sha3_256};
use thiserror::Error;

pub const FILENAME_SECRET_KEY: &str = "hs_ed25519_secret_key";
pub const FILENAME_PUBLIC_KEY: &str = "hs_ed25519_public_key";
pub const FILENAME_HOSTNAME: &str = "hostname";

pub const ONION_SUFFIX: &str = ".onion";

const REQUIRED_FILES: [&str; 3] = [FILENAME_SECRET_KEY, FILENAME_PUBLIC_KEY, FILENAME_HOSTNAME];

const SECRET_KEY_HEADER: &[u8; 32] = b"== ed25519v1-secret: type0 ==\x00\x00\x00";
const PUBLIC_KEY_HEADER: &[u8; 32] = b"== ed25519v1-public: type0 ==\x00\x00\x00";

const CHECKSUM_DOMAIN: &[u8] = b".onion checksum";
const ONION_VERSION: u8 = 0x03;

#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("entropy source exhausted while generating hidden-service key: {0}")]
    Entropy(#[source] rand::Error),
}

/// The secret payload of a hidden-service identity, keyed by tor file name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Credentials {
    files: BTreeMap<String, Vec<u8>>,
}

impl Credentials {
    /// Wraps whatever a stored secret currently carries. Partial or empty
    /// data is accepted; use [`already_issued`] to decide what to do with it.
    pub fn from_data(files: BTreeMap<String, Vec<u8>>) -> Self {
        Self { files }
    }

    /// Deterministically derives an identity from a 32-byte ed25519 seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let signing = SigningKey::from_bytes(&seed);
        let public = signing.verifying_key().to_bytes();

        let mut secret_file = SECRET_KEY_HEADER.to_vec();
        secret_file.extend_from_slice(&expand_secret_key(&seed));

        let mut public_file = PUBLIC_KEY_HEADER.to_vec();
        public_file.extend_from_slice(&public);

        let hostname = format!("{}{}", onion_address(&public), ONION_SUFFIX);

        let files = BTreeMap::from([
            (FILENAME_SECRET_KEY.to_owned(), secret_file),
            (FILENAME_PUBLIC_KEY.to_owned(), public_file),
            (FILENAME_HOSTNAME.to_owned(), hostname.into_bytes()),
        ]);
        Self { files }
    }

    pub fn get(&self, file: &str) -> Option<&[u8]> {
        self.files.get(file).map(Vec::as_slice)
    }

    /// The `<address>.onion` hostname, if present and valid UTF-8.
    pub fn hostname(&self) -> Option<&str> {
        self.get(FILENAME_HOSTNAME)
            .and_then(|raw| std::str::from_utf8(raw).ok())
            .map(str::trim)
            .filter(|host| !host.is_empty())
    }

    /// Raw public key bytes with the tor file header stripped.
    pub fn public_key(&self) -> Option<[u8; 32]> {
        let raw = self.get(FILENAME_PUBLIC_KEY)?;
        let key = raw.strip_prefix(PUBLIC_KEY_HEADER.as_slice())?;
        key.try_into().ok()
    }

    pub fn files(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.files
    }

    pub fn into_files(self) -> BTreeMap<String, Vec<u8>> {
        self.files
    }
}

/// True iff all three tor files are present and non-empty.
///
/// Contents are not validated: a populated but malformed identity is still
/// considered issued and left alone.
pub fn already_issued(credentials: &Credentials) -> bool {
    REQUIRED_FILES.iter().all(|file| {
        credentials
            .files
            .get(*file)
            .map(|value| !value.is_empty())
            .unwrap_or(false)
    })
}

/// Generates a fresh identity from the operating system's entropy source.
pub fn issue() -> Result<Credentials, CredentialsError> {
    issue_with(&mut OsRng)
}

/// Generates a fresh identity drawing the seed from `rng`.
pub fn issue_with<R: RngCore + ?Sized>(rng: &mut R) -> Result<Credentials, CredentialsError> {
    let mut seed = [0u8; 32];
    rng.try_fill_bytes(&mut seed)
        .map_err(CredentialsError::Entropy)?;
    Ok(Credentials::from_seed(seed))
}

/// Tor v3 onion address (without the `.onion` suffix) for an ed25519 public key.
///
/// `base32(pubkey || sha3_256(".onion checksum" || pubkey || 0x03)[..2] || 0x03)`,
/// lower-cased.
pub fn onion_address(public_key: &[u8; 32]) -> String {
    let mut hasher = Sha3_256::new();
    hasher.update(CHECKSUM_DOMAIN);
    hasher.update(public_key);
    hasher.update([ONION_VERSION]);
    let checksum = hasher.finalize();

    let mut raw = Vec::with_capacity(35);
    raw.extend_from_slice(public_key);
    raw.extend_from_slice(&checksum[..2]);
    raw.push(ONION_VERSION);

    BASE32.encode(&raw).to_ascii_lowercase()
}

// tor stores the clamped SHA-512 expansion of the seed, not the seed itself.
fn expand_secret_key(seed: &[u8; 32]) -> [u8; 64] {
    let digest = Sha512::digest(seed);
    let mut expanded = [0u8; 64];
    expanded.copy_from_slice(&digest);
    expanded[0] &= 248;
    expanded[31] &= 127;
    expanded[31] |= 64;
    expanded
}
