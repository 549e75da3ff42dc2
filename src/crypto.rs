use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use argon2::{Argon2, Params};
use rand::RngCore;
use zeroize::Zeroize;

const SALT_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;
const MAGIC: &[u8; 4] = b"LUNA";
const FORMAT_VERSION: u8 = 1;
/// magic || version || memory_kib (u32 LE) || iterations (u32 LE)
const HEADER_LEN: usize = MAGIC.len() + 1 + 4 + 4;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("key derivation failed")]
    KeyDerivation,
    #[error("encryption failed")]
    Encryption,
    #[error("decryption failed: wrong passphrase or corrupted data")]
    Decryption,
    #[error("not a vault file")]
    InvalidFormat,
    #[error("unsupported vault version {0}")]
    UnsupportedVersion(u8),
}

/// Argon2id cost used when sealing. Opening always uses the cost recorded
/// in the sealed blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 65536,
            iterations: 3,
        }
    }
}

impl KdfParams {
    fn header(&self) -> [u8; HEADER_LEN] {
        let mut header = [0u8; HEADER_LEN];
        header[..4].copy_from_slice(MAGIC);
        header[4] = FORMAT_VERSION;
        header[5..9].copy_from_slice(&self.memory_kib.to_le_bytes());
        header[9..13].copy_from_slice(&self.iterations.to_le_bytes());
        header
    }

    fn from_header(header: &[u8]) -> Result<Self, CryptoError> {
        if header.len() < HEADER_LEN || &header[..4] != MAGIC {
            return Err(CryptoError::InvalidFormat);
        }
        if header[4] != FORMAT_VERSION {
            return Err(CryptoError::UnsupportedVersion(header[4]));
        }
        let word = |at: usize| {
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(&header[at..at + 4]);
            u32::from_le_bytes(bytes)
        };
        Ok(Self {
            memory_kib: word(5),
            iterations: word(9),
        })
    }

    fn derive_key(&self, passphrase: &str, salt: &[u8]) -> Result<[u8; KEY_LEN], CryptoError> {
        let params = Params::new(self.memory_kib, self.iterations, 1, Some(KEY_LEN))
            .map_err(|_| CryptoError::KeyDerivation)?;
        let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

        let mut key = [0u8; KEY_LEN];
        argon2
            .hash_password_into(passphrase.as_bytes(), salt, &mut key)
            .map_err(|_| CryptoError::KeyDerivation)?;
        Ok(key)
    }
}

/// Encrypt `plaintext` under a key derived from `passphrase`.
///
/// Output: header || salt || nonce || ciphertext. The header is bound to the
/// ciphertext as associated data.
pub fn seal(passphrase: &str, kdf: KdfParams, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut salt = [0u8; SALT_LEN];
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    rand::thread_rng().fill_bytes(&mut nonce_bytes);

    let header = kdf.header();
    let mut key = kdf.derive_key(passphrase, &salt)?;
    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| CryptoError::Encryption);
    key.zeroize();

    let ciphertext = cipher?
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: plaintext,
                aad: &header,
            },
        )
        .map_err(|_| CryptoError::Encryption)?;

    let mut output = Vec::with_capacity(HEADER_LEN + SALT_LEN + NONCE_LEN + ciphertext.len());
    output.extend_from_slice(&header);
    output.extend_from_slice(&salt);
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

/// Reverse of [`seal`].
pub fn open(passphrase: &str, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < HEADER_LEN + SALT_LEN + NONCE_LEN {
        return Err(CryptoError::InvalidFormat);
    }
    let (header, rest) = sealed.split_at(HEADER_LEN);
    let (salt, rest) = rest.split_at(SALT_LEN);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);

    let kdf = KdfParams::from_header(header)?;
    let mut key = kdf.derive_key(passphrase, salt)?;
    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| CryptoError::Decryption);
    key.zeroize();

    cipher?
        .decrypt(
            Nonce::from_slice(nonce_bytes),
            Payload {
                msg: ciphertext,
                aad: header,
            },
        )
        .map_err(|_| CryptoError::Decryption)
}
