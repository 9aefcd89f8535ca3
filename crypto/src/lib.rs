/*++

Licensed under the Apache-2.0 license.

File Name:

   lib.rs

Abstract:

    File contains crypto utilities needed to generate the secure
    certificate partition.

--*/

mod loader;

pub use loader::{load_certificate, load_private_key};

use openssl::bn::{BigNum, BigNumContext};
use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::sha::Sha256;
use openssl::sign::Signer;
use openssl::symm::{Cipher, Crypter, Mode};

use secure_cert_gen::SecureCertCrypto;
use secure_cert_types::{Encoding, KeyMaterial, RsaKeyNumbers, SecureCertError};

#[derive(Default)]
pub struct OsslCrypto {}

impl SecureCertCrypto for OsslCrypto {
    /// Calculate SHA-256 digest
    fn sha256_digest(&self, data: &[u8]) -> Result<[u8; 32], SecureCertError> {
        let mut engine = Sha256::new();
        engine.update(data);
        Ok(engine.finish())
    }

    fn hmac_sha256(&self, key: &[u8], data: &[u8]) -> Result<[u8; 32], SecureCertError> {
        hmac_sha256(key, data).map_err(crypto_err)
    }

    fn aes_256_cbc_encrypt(
        &self,
        key: &[u8; 32],
        iv: &[u8; 16],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, SecureCertError> {
        aes_256_cbc(Mode::Encrypt, key, iv, plaintext).map_err(crypto_err)
    }

    fn rand_bytes(&self, buf: &mut [u8]) -> Result<(), SecureCertError> {
        openssl::rand::rand_bytes(buf).map_err(crypto_err)
    }
}

/// Re-parse canonical key material and extract the numbers the DS
/// parameter derivation operates on. Fails with `UnsupportedKeyType` for
/// anything but RSA.
pub fn rsa_key_numbers(key: &KeyMaterial) -> Result<RsaKeyNumbers, SecureCertError> {
    let pkey: PKey<Private> = match key.encoding {
        Encoding::Pem => PKey::private_key_from_pem(&key.bytes),
        Encoding::Der => PKey::private_key_from_der(&key.bytes),
    }
    .map_err(crypto_err)?;

    let rsa = pkey
        .rsa()
        .map_err(|_| SecureCertError::UnsupportedKeyType)?;
    montgomery_numbers(&rsa).map_err(crypto_err)
}

/// Montgomery parameters for the key's modulus at precision
/// `2 * key_size` bits: `R' = 2^(2*key_size) mod M` and
/// `M' = (-M^-1) mod 2^32`.
fn montgomery_numbers(rsa: &Rsa<Private>) -> Result<RsaKeyNumbers, ErrorStack> {
    let bit_length = rsa.n().num_bits() as u32;
    let mut ctx = BigNumContext::new()?;
    let one = BigNum::from_u32(1)?;

    let mut rr = BigNum::new()?;
    rr.lshift(&one, (2 * bit_length) as i32)?;
    let mut rinv = BigNum::new()?;
    rinv.nnmod(&rr, rsa.n(), &mut ctx)?;

    let mut word = BigNum::new()?;
    word.lshift(&one, 32)?;
    let mut inv = BigNum::new()?;
    inv.mod_inverse(rsa.n(), &word, &mut ctx)?;
    let mut neg = BigNum::new()?;
    neg.checked_sub(&word, &inv)?;
    let mprime = {
        let bytes = neg.to_vec();
        let mut word = [0u8; 4];
        word[4 - bytes.len()..].copy_from_slice(&bytes);
        u32::from_be_bytes(word)
    };

    Ok(RsaKeyNumbers {
        y_le: to_le_bytes(rsa.d()),
        m_le: to_le_bytes(rsa.n()),
        rinv_le: to_le_bytes(&rinv),
        mprime,
        bit_length,
    })
}

/// Little-endian magnitude of a big number, unpadded.
fn to_le_bytes(bn: &openssl::bn::BigNumRef) -> Vec<u8> {
    let mut bytes = bn.to_vec();
    bytes.reverse();
    bytes
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<[u8; 32], ErrorStack> {
    let pkey = PKey::hmac(key)?;
    let mut signer = Signer::new(MessageDigest::sha256(), &pkey)?;
    signer.update(data)?;
    let mut out = [0u8; 32];
    signer.sign(&mut out)?;
    Ok(out)
}

fn aes_256_cbc(mode: Mode, key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>, ErrorStack> {
    let cipher = Cipher::aes_256_cbc();
    let mut crypter = Crypter::new(cipher, mode, key, Some(iv))?;
    // the DS plaintext is block-aligned by construction
    crypter.pad(false);
    let mut out = vec![0u8; data.len() + cipher.block_size()];
    let mut count = crypter.update(data, &mut out)?;
    count += crypter.finalize(&mut out[count..])?;
    out.truncate(count);
    Ok(out)
}

fn crypto_err(err: ErrorStack) -> SecureCertError {
    SecureCertError::Crypto(err.to_string())
}
