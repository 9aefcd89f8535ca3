/*++

Licensed under the Apache-2.0 license.

File Name:

   error.rs

Abstract:

    Error type shared across the secure certificate tooling.

--*/

use std::path::PathBuf;

use thiserror::Error;

use crate::Target;

/// Every failure is terminal for the run; nothing in the pipeline retries.
#[derive(Debug, Error)]
pub enum SecureCertError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("{}: unsupported encoding, expected PEM or DER", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("only RSA private keys can be used with the DS peripheral")]
    UnsupportedKeyType,

    #[error("private key password is missing or incorrect")]
    BadPassword,

    #[error(
        "RSA key size {bits} is not supported on {target}; supported sizes are {supported:?}"
    )]
    UnsupportedModulusSize {
        bits: u32,
        target: Target,
        supported: &'static [u32],
    },

    #[error("target {0} has no DS peripheral")]
    DsNotSupported(Target),

    #[error("unknown target chip: {0}")]
    UnknownTarget(String),

    #[error("no wrapping key available for DS parameter derivation")]
    NoWrappingKey,

    #[error("eFuse key block {0} is not usable for a DS wrapping key; rerun with a different key id")]
    SlotUnusable(u32),

    #[error("read-back of eFuse key block {0} does not match the generated key; rerun with a different key id")]
    ProvisioningVerificationFailed(u32),

    #[error("TLV record of {needed} bytes does not fit in the remaining {available} bytes of the partition")]
    RecordTooLarge { needed: usize, available: usize },

    #[error("malformed TLV record at offset {0}: {1}")]
    MalformedRecord(usize, &'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("crypto backend failure: {0}")]
    Crypto(String),

    #[error("eFuse tool failure: {0}")]
    KeyStore(String),
}
