use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use anyhow::{Context, Result};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use uuid::Uuid;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Parses the hex-encoded 32-byte master key from configuration.
pub fn parse_master_key(hex_key: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(hex_key.trim()).context("Master key is not valid hex")?;
    bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("Master key must be exactly 32 bytes"))
}

/// Derives the key protecting one supplier's documents from the master key.
pub fn derive_provider_key(master_key: &[u8; 32], provider_id: Uuid) -> Result<[u8; 32]> {
    let hk = Hkdf::<Sha256>::new(None, master_key);
    let info = format!("nitoagua-provider-documents-{provider_id}");
    let mut key = [0u8; 32];
    hk.expand(info.as_bytes(), &mut key)
        .map_err(|_| anyhow::anyhow!("Failed to derive provider key"))?;
    Ok(key)
}

/// Encrypts with AES-256-GCM under a fresh random nonce.
///
/// Output layout: `nonce (12) || ciphertext || tag (16)`.
pub fn encrypt_blob(plaintext: &[u8], key: &[u8; 32]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key).context("Failed to create cipher")?;

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| anyhow::anyhow!("Encryption failed: {}", e))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Reverses [`encrypt_blob`], failing on a wrong key or tampered data.
pub fn decrypt_blob(blob: &[u8], key: &[u8; 32]) -> Result<Vec<u8>> {
    if blob.len() < NONCE_LEN + TAG_LEN {
        anyhow::bail!("Encrypted blob is too short");
    }
    let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new_from_slice(key).context("Failed to create cipher")?;
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|e| anyhow::anyhow!("Decryption failed (data may be corrupted or tampered): {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_keys_are_deterministic_and_distinct() {
        let master = [7u8; 32];
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(derive_provider_key(&master, a).unwrap(), derive_provider_key(&master, a).unwrap());
        assert_ne!(derive_provider_key(&master, a).unwrap(), derive_provider_key(&master, b).unwrap());
    }

    #[test]
    fn round_trip() {
        let key = [42u8; 32];
        let plaintext = b"%PDF-1.4 cedula de identidad";
        let blob = encrypt_blob(plaintext, &key).unwrap();
        assert_eq!(blob.len(), NONCE_LEN + plaintext.len() + TAG_LEN);
        assert_ne!(&blob[NONCE_LEN..NONCE_LEN + plaintext.len()], &plaintext[..]);
        assert_eq!(decrypt_blob(&blob, &key).unwrap(), plaintext);
    }

    #[test]
    fn wrong_key_fails() {
        let blob = encrypt_blob(b"secreto", &[1u8; 32]).unwrap();
        assert!(decrypt_blob(&blob, &[2u8; 32]).is_err());
    }

    #[test]
    fn tampering_is_detected() {
        let key = [3u8; 32];
        let mut blob = encrypt_blob(b"licencia", &key).unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 1;
        assert!(decrypt_blob(&blob, &key).is_err());
        assert!(decrypt_blob(&blob[..10], &key).is_err());
    }

    #[test]
    fn master_key_must_be_32_hex_bytes() {
        assert!(parse_master_key(&"ab".repeat(32)).is_ok());
        assert!(parse_master_key(&"ab".repeat(16)).is_err());
        assert!(parse_master_key("zz").is_err());
    }
}
