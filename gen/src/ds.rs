/*++

Licensed under the Apache-2.0 license.

File Name:

   ds.rs

Abstract:

    Derivation of the encrypted parameter block for the DS peripheral.

--*/

use secure_cert_types::{
    DsParams, RsaKeyNumbers, SecureCertError, Target, WrappingKey, DS_IV_BYTE_SIZE,
};
use zeroize::Zeroize;

use crate::SecureCertCrypto;

/// Trailer appended to the DS plaintext block: eight bytes of 0x08.
const DS_TRAILER: [u8; 8] = [0x08; 8];

/// Derive the parameters the DS peripheral needs to perform RSA
/// private-key operations with `key` without ever seeing it in plaintext.
///
/// The layout of the encrypted block is fixed by the accelerator:
///
/// ```text
/// Y || M || Rb || MD || M' || LENGTH || 0x08*8
/// ```
///
/// where Y, M and Rb are little-endian and zero-padded to the largest
/// modulus size the target supports, and MD is the SHA-256 of
/// `Y || M || Rb || M' || LENGTH || IV`.
pub fn derive_ds_params<C: SecureCertCrypto>(
    crypto: &C,
    key: &RsaKeyNumbers,
    wrapping_key: Option<&WrappingKey>,
    target: Target,
    efuse_key_id: u8,
) -> Result<DsParams, SecureCertError> {
    let Some(wrapping_key) = wrapping_key else {
        return Err(SecureCertError::NoWrappingKey);
    };

    let supported = target
        .supported_rsa_sizes()
        .ok_or(SecureCertError::DsNotSupported(target))?;
    if !supported.contains(&key.bit_length) {
        return Err(SecureCertError::UnsupportedModulusSize {
            bits: key.bit_length,
            target,
            supported,
        });
    }
    let max_len = target
        .max_rsa_size()
        .ok_or(SecureCertError::DsNotSupported(target))? as usize
        / 8;

    let mut iv = [0u8; DS_IV_BYTE_SIZE];
    crypto.rand_bytes(&mut iv)?;

    let mut y = pad_le(&key.y_le, max_len);
    let mut m = pad_le(&key.m_le, max_len);
    let mut rinv = pad_le(&key.rinv_le, max_len);

    // M' and the accelerator's word-count parameter, packed as two
    // little-endian 32-bit words.
    let length = key.bit_length / 32 - 1;
    let mut packed = [0u8; 8];
    packed[..4].copy_from_slice(&key.mprime.to_le_bytes());
    packed[4..].copy_from_slice(&length.to_le_bytes());

    let mut md_in = Vec::with_capacity(3 * max_len + packed.len() + iv.len());
    md_in.extend_from_slice(&y);
    md_in.extend_from_slice(&m);
    md_in.extend_from_slice(&rinv);
    md_in.extend_from_slice(&packed);
    md_in.extend_from_slice(&iv);
    assert_eq!(md_in.len(), 3 * max_len + 8 + 16);
    let md = crypto.sha256_digest(&md_in)?;
    md_in.zeroize();

    let mut plaintext = Vec::with_capacity(3 * max_len + md.len() + packed.len() + 8);
    plaintext.extend_from_slice(&y);
    plaintext.extend_from_slice(&m);
    plaintext.extend_from_slice(&rinv);
    plaintext.extend_from_slice(&md);
    plaintext.extend_from_slice(&packed);
    plaintext.extend_from_slice(&DS_TRAILER);
    assert_eq!(plaintext.len(), 3 * max_len + 32 + 8 + 8);

    y.zeroize();
    m.zeroize();
    rinv.zeroize();

    let mut aes_key = crypto.hmac_sha256(wrapping_key.as_bytes(), &[0xFF; 32])?;
    let ciphertext = crypto.aes_256_cbc_encrypt(&aes_key, &iv, &plaintext)?;
    aes_key.zeroize();
    plaintext.zeroize();

    Ok(DsParams {
        ciphertext,
        iv,
        bit_length: key.bit_length,
        efuse_key_id,
    })
}

/// Zero-pad a little-endian magnitude to `len` bytes.
fn pad_le(bytes: &[u8], len: usize) -> Vec<u8> {
    let mut out = bytes.to_vec();
    debug_assert!(out.len() <= len);
    out.resize(len, 0);
    out
}
