/*++

Licensed under the Apache-2.0 license.

File Name:

   lib.rs

Abstract:

    File contains data structures for the secure certificate partition.

--*/

mod error;
mod target;

pub use error::SecureCertError;
pub use target::Target;

use zerocopy::byteorder::{LittleEndian, U16, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Marker at the start of every TLV record.
pub const TLV_MAGIC: u32 = 0xBA5E_BA11;

/// Total size of the secure certificate partition.
pub const PARTITION_BYTE_SIZE: usize = 0x2000;

/// Minimum flash address alignment required to write to an encrypted
/// partition on the device; every encoded record is a multiple of this.
pub const FLASH_WRITE_ALIGNMENT: usize = 16;

/// Erase value the unused tail of the partition is filled with.
pub const FLASH_ERASE_VALUE: u8 = 0xFF;

pub const TLV_HEADER_BYTE_SIZE: usize = core::mem::size_of::<TlvHeader>();
pub const TLV_FOOTER_BYTE_SIZE: usize = 4;

pub const WRAPPING_KEY_BYTE_SIZE: usize = 32;
pub const DS_IV_BYTE_SIZE: usize = 16;

/// eFuse purpose tag a key block must carry to be usable by the DS
/// peripheral.
pub const DS_KEY_PURPOSE: &str = "HMAC_DOWN_DIGITAL_SIGNATURE";

/// Number of eFuse key blocks (BLOCK_KEY0..BLOCK_KEY5).
pub const EFUSE_KEY_BLOCK_COUNT: u32 = 6;

/// Record types understood by the firmware-side TLV parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlvType {
    CaCert = 0,
    DevCert = 1,
    PrivKey = 2,
    DsData = 3,
    DsContext = 4,
    End = 50,
    UserData1 = 51,
    UserData2 = 52,
    UserData3 = 53,
    UserData4 = 54,
    UserData5 = 55,
}

impl From<TlvType> for u16 {
    fn from(value: TlvType) -> Self {
        value as u16
    }
}

impl TryFrom<u16> for TlvType {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TlvType::CaCert),
            1 => Ok(TlvType::DevCert),
            2 => Ok(TlvType::PrivKey),
            3 => Ok(TlvType::DsData),
            4 => Ok(TlvType::DsContext),
            50 => Ok(TlvType::End),
            51 => Ok(TlvType::UserData1),
            52 => Ok(TlvType::UserData2),
            53 => Ok(TlvType::UserData3),
            54 => Ok(TlvType::UserData4),
            55 => Ok(TlvType::UserData5),
            other => Err(other),
        }
    }
}

/// TLV record header. A 4-byte CRC-32 footer over header, payload, and
/// padding follows each record.
#[repr(C)]
#[derive(AsBytes, FromBytes, FromZeroes, Unaligned, Default, Debug, Clone, Copy)]
pub struct TlvHeader {
    /// Must equal [`TLV_MAGIC`]
    pub magic: U32<LittleEndian>,

    pub reserved: U32<LittleEndian>,

    /// Record type ([`TlvType`])
    pub tlv_type: U16<LittleEndian>,

    /// Payload length, excluding padding
    pub length: U16<LittleEndian>,
}

/// Fixed-size prefix of the DS_DATA record payload; the DS ciphertext
/// follows immediately after.
#[repr(C)]
#[derive(AsBytes, FromBytes, FromZeroes, Unaligned, Default, Debug, Clone, Copy)]
pub struct DsDataHeader {
    /// RSA length parameter consumed by the accelerator: key bits / 32 - 1
    pub rsa_length: U32<LittleEndian>,

    /// AES-CBC initialization vector
    pub iv: [u8; DS_IV_BYTE_SIZE],
}

/// Payload of the DS_CONTEXT record, mirroring the in-memory context
/// struct the firmware hands to the DS driver.
#[repr(C)]
#[derive(AsBytes, FromBytes, FromZeroes, Unaligned, Default, Debug, Clone, Copy)]
pub struct DsContext {
    /// Context pointer slot, always zero in flash
    pub reserved: U32<LittleEndian>,

    /// eFuse key block holding the wrapping key
    pub efuse_key_id: u8,

    pub pad: u8,

    /// RSA modulus length in bits
    pub rsa_key_bits: U16<LittleEndian>,
}

/// Serialization a key or certificate was loaded from (and re-encoded in).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Pem,
    Der,
}

/// A private key in canonical unencrypted form.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    #[zeroize(skip)]
    pub encoding: Encoding,

    pub bytes: Vec<u8>,

    #[zeroize(skip)]
    pub bit_length: u32,
}

/// An X.509 certificate in canonical form.
#[derive(Debug, Clone)]
pub struct CertMaterial {
    pub encoding: Encoding,

    pub bytes: Vec<u8>,
}

/// 256-bit symmetric key that wraps the DS parameters. Lives in an eFuse
/// key block on the device; on the host only for the duration of a run.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct WrappingKey([u8; WRAPPING_KEY_BYTE_SIZE]);

impl WrappingKey {
    pub fn new(bytes: [u8; WRAPPING_KEY_BYTE_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; WRAPPING_KEY_BYTE_SIZE] {
        &self.0
    }
}

/// RSA private-key numbers, little-endian and unpadded, plus the
/// precomputed Montgomery parameters for the key's modulus.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct RsaKeyNumbers {
    /// Private exponent Y
    pub y_le: Vec<u8>,

    /// Modulus M
    pub m_le: Vec<u8>,

    /// R' = 2^(2*bit_length) mod M
    pub rinv_le: Vec<u8>,

    /// M' = (-M^-1) mod 2^32
    #[zeroize(skip)]
    pub mprime: u32,

    #[zeroize(skip)]
    pub bit_length: u32,
}

/// Output of DS parameter derivation; contains no plaintext key material.
#[derive(Debug, Clone)]
pub struct DsParams {
    /// AES-256-CBC ciphertext of the DS plaintext block
    pub ciphertext: Vec<u8>,

    pub iv: [u8; DS_IV_BYTE_SIZE],

    /// Modulus length of the wrapped RSA key, in bits
    pub bit_length: u32,

    /// eFuse key block holding the wrapping key
    pub efuse_key_id: u8,
}

#[cfg(test)]
mod tests {
    use super::*;
    use zerocopy::AsBytes;

    #[test]
    fn test_tlv_header_layout() {
        let header = TlvHeader {
            magic: TLV_MAGIC.into(),
            reserved: 0.into(),
            tlv_type: u16::from(TlvType::DevCert).into(),
            length: 0x1234.into(),
        };
        assert_eq!(TLV_HEADER_BYTE_SIZE, 12);
        assert_eq!(
            header.as_bytes(),
            [0x11, 0xBA, 0x5E, 0xBA, 0, 0, 0, 0, 1, 0, 0x34, 0x12]
        );
    }

    #[test]
    fn test_ds_context_layout() {
        let ctx = DsContext {
            reserved: 0.into(),
            efuse_key_id: 1,
            pad: 0,
            rsa_key_bits: 2048.into(),
        };
        assert_eq!(ctx.as_bytes(), [0, 0, 0, 0, 1, 0, 0x00, 0x08]);
    }

    #[test]
    fn test_tlv_type_round_trip() {
        for ty in [
            TlvType::CaCert,
            TlvType::DevCert,
            TlvType::PrivKey,
            TlvType::DsData,
            TlvType::DsContext,
            TlvType::End,
            TlvType::UserData5,
        ] {
            assert_eq!(TlvType::try_from(u16::from(ty)), Ok(ty));
        }
        assert_eq!(TlvType::try_from(49), Err(49));
    }
}
