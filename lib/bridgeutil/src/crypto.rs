use byteorder::{LittleEndian, WriteBytesExt};
use ctor::ctor;
use libsodium_sys;

pub const MAC_SIZE: usize = libsodium_sys::crypto_aead_chacha20poly1305_IETF_ABYTES as usize;
pub const KEY_SIZE: usize = libsodium_sys::crypto_aead_chacha20poly1305_IETF_KEYBYTES as usize;
pub const NONCE_SIZE: usize = libsodium_sys::crypto_aead_chacha20poly1305_IETF_NPUBBYTES as usize;

pub const PUBLIC_KEY_SIZE: usize = libsodium_sys::crypto_box_PUBLICKEYBYTES as usize;
pub const SECRET_KEY_SIZE: usize = libsodium_sys::crypto_box_SECRETKEYBYTES as usize;
pub const SEAL_OVERHEAD: usize = libsodium_sys::crypto_box_SEALBYTES as usize;

const NONCE_OFFSET: usize = NONCE_SIZE - 8;

/// Initialize the sodium infrastructure
#[ctor]
fn init_sodium() {
    unsafe {
        if libsodium_sys::sodium_init() < 0 {
            panic!("Cryptography initialization failed")
        }
    }
}

#[inline]
fn nonce_to_bytes(nonce: u64) -> [u8; NONCE_SIZE] {
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    (&mut nonce_bytes[NONCE_OFFSET..])
        .write_u64::<LittleEndian>(nonce)
        .expect("Error creating nonce");
    nonce_bytes
}

/// Encrypts the provided plain text into the cipher buffer. The encrypted message size will be the plain
/// text size plus the MAC size. The function will fail if the cipher slice is not large enough.
///
/// The additional data, nonce and key must match those used during encryption, the decryption will fail
/// otherwise.
#[inline]
pub fn encrypt(
    cipher: &mut [u8],
    plain: &[u8],
    additional_data: &[u8],
    nonce: u64,
    key: &[u8; KEY_SIZE],
) -> bool {
    let nonce_bytes = nonce_to_bytes(nonce);

    if cipher.len() != plain.len() + MAC_SIZE {
        panic!(
            "Encryption: cipher data length ({}) must be plain data length ({}) + MAC size ({})",
            cipher.len(),
            plain.len(),
            MAC_SIZE
        )
    }

    unsafe {
        let result = libsodium_sys::crypto_aead_chacha20poly1305_ietf_encrypt(
            cipher.as_mut_ptr(),
            ::std::ptr::null_mut(),
            plain.as_ptr(),
            plain.len() as u64,
            additional_data.as_ptr(),
            additional_data.len() as u64,
            ::std::ptr::null(),
            nonce_bytes.as_ptr(),
            key.as_ptr(),
        );

        result >= 0
    }
}

/// Decrypts the provided ciphertext into the plain buffer. The decoded message size is equal to the cipher
/// text length minus the MAC. The function will fail if the sizes do not match.
///
/// The additional data, nonce and key must match those used during encryption, the decryption will fail
/// otherwise.
#[inline]
pub fn decrypt(
    plain: &mut [u8],
    cipher: &[u8],
    additional_data: &[u8],
    nonce: u64,
    key: &[u8; KEY_SIZE],
) -> bool {
    let nonce_bytes = nonce_to_bytes(nonce);

    if cipher.len() != plain.len() + MAC_SIZE {
        panic!(
            "Decryption: cipher data length ({}) must be plain data length ({}) + MAC size ({})",
            cipher.len(),
            plain.len(),
            MAC_SIZE
        )
    }

    unsafe {
        let result = libsodium_sys::crypto_aead_chacha20poly1305_ietf_decrypt(
            plain.as_mut_ptr(),
            ::std::ptr::null_mut(),
            ::std::ptr::null_mut(),
            cipher.as_ptr(),
            cipher.len() as u64,
            additional_data.as_ptr(),
            additional_data.len() as u64,
            nonce_bytes.as_ptr(),
            key.as_ptr(),
        );

        result >= 0
    }
}

/// Fills the provided buffer with cryptographically secure random bytes
#[inline]
pub fn random_bytes(out: &mut [u8]) {
    unsafe {
        libsodium_sys::randombytes_buf(out.as_mut_ptr() as *mut ::std::ffi::c_void, out.len());
    }
}

/// A long-term Curve25519 keypair. Nodes use one to authenticate incoming connections;
/// clients and peers use one to prove their identity to the authenticator.
pub struct KeyPair {
    pub public_key: [u8; PUBLIC_KEY_SIZE],
    pub secret_key: [u8; SECRET_KEY_SIZE],
}

/// Generates a new long-term keypair.
pub fn generate_keypair() -> KeyPair {
    let mut public_key = [0u8; PUBLIC_KEY_SIZE];
    let mut secret_key = [0u8; SECRET_KEY_SIZE];

    unsafe {
        if libsodium_sys::crypto_box_keypair(public_key.as_mut_ptr(), secret_key.as_mut_ptr()) != 0 {
            panic!("Keypair generation failed")
        }
    }

    KeyPair { public_key, secret_key }
}

/// Anonymously encrypts `plain` so that only the holder of the secret key matching
/// `recipient_public_key` can decrypt it. The authenticator's challenge/response handshake
/// uses this: a connecting peer seals its claimed identity under the node's public key to
/// prove it holds the matching secret key.
pub fn seal(plain: &[u8], recipient_public_key: &[u8; PUBLIC_KEY_SIZE]) -> Vec<u8> {
    let mut cipher = vec![0u8; plain.len() + SEAL_OVERHEAD];

    unsafe {
        let result = libsodium_sys::crypto_box_seal(
            cipher.as_mut_ptr(),
            plain.as_ptr(),
            plain.len() as u64,
            recipient_public_key.as_ptr(),
        );

        if result != 0 {
            panic!("Seal failed")
        }
    }

    cipher
}

/// Opens a message produced by `seal`. Returns `None` if the ciphertext does not decrypt
/// under the supplied keypair (forged or corrupted challenge).
pub fn open_sealed(
    cipher: &[u8],
    public_key: &[u8; PUBLIC_KEY_SIZE],
    secret_key: &[u8; SECRET_KEY_SIZE],
) -> Option<Vec<u8>> {
    if cipher.len() < SEAL_OVERHEAD {
        return None;
    }

    let mut plain = vec![0u8; cipher.len() - SEAL_OVERHEAD];

    unsafe {
        let result = libsodium_sys::crypto_box_seal_open(
            plain.as_mut_ptr(),
            cipher.as_ptr(),
            cipher.len() as u64,
            public_key.as_ptr(),
            secret_key.as_ptr(),
        );

        if result != 0 {
            return None;
        }
    }

    Some(plain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aead_round_trips() {
        let key = [7u8; KEY_SIZE];
        let plain = b"dummy's hand";
        let mut cipher = vec![0u8; plain.len() + MAC_SIZE];
        assert!(encrypt(&mut cipher, plain, b"ad", 1, &key));

        let mut decoded = vec![0u8; plain.len()];
        assert!(decrypt(&mut decoded, &cipher, b"ad", 1, &key));
        assert_eq!(&decoded[..], &plain[..]);
    }

    #[test]
    fn aead_rejects_wrong_nonce() {
        let key = [7u8; KEY_SIZE];
        let plain = b"declarer plays dummy";
        let mut cipher = vec![0u8; plain.len() + MAC_SIZE];
        assert!(encrypt(&mut cipher, plain, b"ad", 1, &key));

        let mut decoded = vec![0u8; plain.len()];
        assert!(!decrypt(&mut decoded, &cipher, b"ad", 2, &key));
    }

    #[test]
    fn seal_round_trips() {
        let pair = generate_keypair();
        let sealed = seal(b"user-id-claim", &pair.public_key);
        let opened = open_sealed(&sealed, &pair.public_key, &pair.secret_key).unwrap();
        assert_eq!(opened, b"user-id-claim");
    }
}
