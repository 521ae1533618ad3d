/// Request proof generation
///
/// Every outbound request carries a `key` field: the session token issued by
/// the gateway, encrypted with AES-128-CBC under the configured gateway
/// password and rendered as uppercase hex.
///
/// The initialization vector is a fixed public constant shared by every
/// gateway of this family. Reusing one IV for every encryption is a known
/// weakness of the wire protocol; it is kept as-is because the gateway
/// rejects anything else.
use aes::cipher::{block_padding::NoPadding, BlockEncryptMut, KeyIvInit};

use crate::errors::{GatewayError, Result};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;

/// AES block and key length in bytes
pub const KEY_LEN: usize = 16;

/// Fixed initialization vector mandated by the gateway protocol
pub const INIT_VECTOR: [u8; 16] = [
    0x17, 0x99, 0x6d, 0x09, 0x3d, 0x28, 0xdd, 0xb3,
    0xba, 0x69, 0x5a, 0x2e, 0x6f, 0x58, 0x56, 0x2e,
];

/// Key material derived from the configured gateway password
#[derive(Clone)]
pub struct SessionCipher {
    key: [u8; KEY_LEN],
}

impl SessionCipher {
    /// Build the cipher from the configured password
    ///
    /// # Errors
    /// Returns `GatewayError::InvalidToken` unless the password is exactly
    /// 16 bytes long.
    pub fn new(password: &str) -> Result<Self> {
        let key: [u8; KEY_LEN] = password
            .as_bytes()
            .try_into()
            .map_err(|_| GatewayError::InvalidToken { length: password.len() })?;

        Ok(Self { key })
    }

    /// Encrypt the session token and hex-encode the ciphertext
    ///
    /// An empty token (before the handshake completes) yields an empty proof.
    pub fn proof(&self, session_token: &str) -> Result<String> {
        let mut buffer = session_token.as_bytes().to_vec();
        let len = buffer.len();

        let encryptor = Aes128CbcEnc::new_from_slices(&self.key, &INIT_VECTOR)
            .map_err(|e| GatewayError::EncryptionError(e.to_string()))?;
        let ciphertext = encryptor
            .encrypt_padded_mut::<NoPadding>(&mut buffer, len)
            .map_err(|_| GatewayError::EncryptionError(format!(
                "session token length {} is not a multiple of {}",
                len, KEY_LEN
            )))?;

        Ok(hex::encode_upper(ciphertext))
    }
}

impl std::fmt::Debug for SessionCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCipher").finish_non_exhaustive()
    }
}
