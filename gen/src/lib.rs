/*++

Licensed under the Apache-2.0 license.

File Name:

   lib.rs

Abstract:

    Secure certificate partition generator.

--*/

mod ds;
mod partition;
mod reader;

pub use ds::derive_ds_params;
pub use partition::{
    generate_partition_ds, generate_partition_no_ds, PartitionBuilder, PartitionImage,
};
pub use reader::{TlvReader, TlvRecord};

use secure_cert_types::SecureCertError;

/// Crypto primitives the generator needs; implemented by the backend
/// crate, mocked in tests.
pub trait SecureCertCrypto {
    /// Calculate SHA-256 digest
    fn sha256_digest(&self, data: &[u8]) -> Result<[u8; 32], SecureCertError>;

    /// Calculate HMAC-SHA256 of `data` under `key`
    fn hmac_sha256(&self, key: &[u8], data: &[u8]) -> Result<[u8; 32], SecureCertError>;

    /// AES-256-CBC encrypt a block-aligned plaintext; the cipher itself
    /// must not add padding.
    fn aes_256_cbc_encrypt(
        &self,
        key: &[u8; 32],
        iv: &[u8; 16],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, SecureCertError>;

    /// Fill `buf` with cryptographically secure random bytes
    fn rand_bytes(&self, buf: &mut [u8]) -> Result<(), SecureCertError>;
}
