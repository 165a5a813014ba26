//! Strong-name key material.
//!
//! A `.snk` file holds either a CryptoAPI `PUBLICKEYBLOB` or a full `PRIVATEKEYBLOB` key pair;
//! `sn -p` output already is a strong-name public key blob. All three are normalized into the
//! blob stored in the `Assembly.PublicKey` column:
//!
//! ```text
//! u32 SigAlgId (0x2400) | u32 HashAlgId (0x8004) | u32 cbPublicKey | PUBLICKEYBLOB
//! ```
//!
//! The importer never holds the private key for signing, so images are written delay-signed:
//! the signature slot is reserved and zero-filled.

use std::path::Path;

use sha1::{Digest, Sha1};

use crate::{
    file::io::read_le,
    metadata::flags::HASH_ALGORITHM_SHA1,
    Error::{self, InvalidKey},
    Result,
};

/// `CALG_RSA_SIGN`
const CALG_RSA_SIGN: u32 = 0x0000_2400;
const PUBLICKEYBLOB: u8 = 0x06;
const PRIVATEKEYBLOB: u8 = 0x07;
const CUR_BLOB_VERSION: u8 = 0x02;
const MAGIC_RSA1: &[u8; 4] = b"RSA1";
const MAGIC_RSA2: &[u8; 4] = b"RSA2";

/// Size of `BLOBHEADER` + `RSAPUBKEY`.
const KEY_HEADER_SIZE: usize = 20;

/// The ECMA standard public key, which maps to the 128 byte signature of the platform key.
const ECMA_KEY: [u8; 16] = [0, 0, 0, 0, 0, 0, 0, 0, 4, 0, 0, 0, 0, 0, 0, 0];

/// A strong-name public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrongNameKey {
    public_key: Vec<u8>,
    signature_size: usize,
}

impl StrongNameKey {
    /// Read a key file from disk.
    ///
    /// # Errors
    /// Returns [`Error::FileError`] if the file cannot be read and [`Error::InvalidKey`] if it
    /// is not a recognized key blob.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        Self::from_bytes(&data)
    }

    /// Normalize a `.snk` key pair, a CryptoAPI public key blob or a strong-name public key blob.
    ///
    /// # Errors
    /// Returns [`Error::InvalidKey`] for anything else.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data == ECMA_KEY {
            return Ok(StrongNameKey {
                public_key: data.to_vec(),
                signature_size: 128,
            });
        }

        match data.first() {
            Some(&PUBLICKEYBLOB | &PRIVATEKEYBLOB) => Self::from_capi_blob(data),
            Some(_) if data.len() > 12 => Self::from_strong_name_blob(data),
            _ => Err(InvalidKey(format!("{} bytes is not a key blob", data.len()))),
        }
    }

    fn from_strong_name_blob(data: &[u8]) -> Result<Self> {
        let sig_alg = read_le::<u32>(data)?;
        let hash_alg = read_le::<u32>(&data[4..])?;
        let len = read_le::<u32>(&data[8..])? as usize;
        if sig_alg != CALG_RSA_SIGN || hash_alg != HASH_ALGORITHM_SHA1 || data.len() != 12 + len {
            return Err(InvalidKey(
                "unsupported strong-name public key header".to_string(),
            ));
        }

        let (_, signature_size) = rsa_public_part(&data[12..])?;
        Ok(StrongNameKey {
            public_key: data.to_vec(),
            signature_size,
        })
    }

    #[allow(clippy::cast_possible_truncation)]
    fn from_capi_blob(data: &[u8]) -> Result<Self> {
        let (public, signature_size) = rsa_public_part(data)?;

        let mut public_key = Vec::with_capacity(12 + public.len());
        public_key.extend_from_slice(&CALG_RSA_SIGN.to_le_bytes());
        public_key.extend_from_slice(&HASH_ALGORITHM_SHA1.to_le_bytes());
        public_key.extend_from_slice(&(public.len() as u32).to_le_bytes());
        public_key.extend_from_slice(&public);

        Ok(StrongNameKey {
            public_key,
            signature_size,
        })
    }

    /// The blob for the `Assembly.PublicKey` column.
    #[must_use]
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Size of the strong-name signature slot, the modulus length.
    #[must_use]
    pub fn signature_size(&self) -> usize {
        self.signature_size
    }

    /// The 8 byte public key token.
    #[must_use]
    pub fn token(&self) -> [u8; 8] {
        public_key_token(&self.public_key)
    }
}

/// Extract a `PUBLICKEYBLOB` from a CryptoAPI public or private key blob.
///
/// Returns the public blob and the modulus length in bytes.
fn rsa_public_part(data: &[u8]) -> Result<(Vec<u8>, usize)> {
    if data.len() < KEY_HEADER_SIZE {
        return Err(InvalidKey("truncated key blob header".to_string()));
    }

    let blob_type = data[0];
    if data[1] != CUR_BLOB_VERSION || read_le::<u32>(&data[4..])? != CALG_RSA_SIGN {
        return Err(InvalidKey("unsupported key algorithm".to_string()));
    }

    let magic = &data[8..12];
    let expected = if blob_type == PRIVATEKEYBLOB {
        MAGIC_RSA2
    } else {
        MAGIC_RSA1
    };
    if magic != expected {
        return Err(InvalidKey(format!(
            "bad RSA magic {:?}",
            String::from_utf8_lossy(magic)
        )));
    }

    let bit_len = read_le::<u32>(&data[12..])? as usize;
    if bit_len == 0 || bit_len % 8 != 0 {
        return Err(InvalidKey(format!("invalid modulus length {bit_len}")));
    }

    let modulus_len = bit_len / 8;
    let end = KEY_HEADER_SIZE + modulus_len;
    let Some(modulus) = data.get(KEY_HEADER_SIZE..end) else {
        return Err(InvalidKey("truncated modulus".to_string()));
    };

    let mut public = Vec::with_capacity(end);
    public.extend_from_slice(&[PUBLICKEYBLOB, CUR_BLOB_VERSION, 0, 0]);
    public.extend_from_slice(&CALG_RSA_SIGN.to_le_bytes());
    public.extend_from_slice(MAGIC_RSA1);
    public.extend_from_slice(&data[12..KEY_HEADER_SIZE]);
    public.extend_from_slice(modulus);
    Ok((public, modulus_len))
}

/// Public key token of `public_key`: the last 8 bytes of its SHA-1 hash, reversed.
#[must_use]
pub fn public_key_token(public_key: &[u8]) -> [u8; 8] {
    let mut hasher = Sha1::new();
    hasher.update(public_key);
    let hash = hasher.finalize();

    let mut token = [0_u8; 8];
    for (slot, byte) in token.iter_mut().zip(hash[hash.len() - 8..].iter().rev()) {
        *slot = *byte;
    }
    token
}

impl From<StrongNameKey> for Vec<u8> {
    fn from(key: StrongNameKey) -> Self {
        key.public_key
    }
}

impl TryFrom<&[u8]> for StrongNameKey {
    type Error = Error;

    fn try_from(data: &[u8]) -> Result<Self> {
        StrongNameKey::from_bytes(data)
    }
}
