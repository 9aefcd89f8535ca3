/*++

Licensed under the Apache-2.0 license.

File Name:

   partition.rs

Abstract:

    TLV encoding of the secure certificate partition image.

--*/

use crc::{crc32, Hasher32};
use secure_cert_types::{
    CertMaterial, DsContext, DsDataHeader, DsParams, Encoding, KeyMaterial, SecureCertError,
    TlvHeader, TlvType, FLASH_ERASE_VALUE, FLASH_WRITE_ALIGNMENT, PARTITION_BYTE_SIZE,
    TLV_FOOTER_BYTE_SIZE, TLV_HEADER_BYTE_SIZE, TLV_MAGIC,
};
use zerocopy::AsBytes;

/// A fully assembled partition image, ready to be flashed.
pub struct PartitionImage {
    data: Vec<u8>,
}

impl PartitionImage {
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

/// Builds a partition by appending TLV records back to back, starting at
/// offset 0. Encoding is all-or-nothing: an oversized record fails the
/// push and the caller discards the builder.
pub struct PartitionBuilder {
    data: Vec<u8>,
    offset: usize,
}

impl Default for PartitionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PartitionBuilder {
    pub fn new() -> Self {
        Self::with_size(PARTITION_BYTE_SIZE)
    }

    pub fn with_size(size: usize) -> Self {
        Self {
            data: vec![FLASH_ERASE_VALUE; size],
            offset: 0,
        }
    }

    /// Append one TLV record immediately after the previous one.
    pub fn push(&mut self, tlv_type: TlvType, payload: &[u8]) -> Result<(), SecureCertError> {
        let padded = payload.len().next_multiple_of(FLASH_WRITE_ALIGNMENT);
        let total = TLV_HEADER_BYTE_SIZE + padded + TLV_FOOTER_BYTE_SIZE;
        let available = self.data.len() - self.offset;
        if total > available || payload.len() > u16::MAX as usize {
            return Err(SecureCertError::RecordTooLarge {
                needed: total,
                available,
            });
        }

        let header = TlvHeader {
            magic: TLV_MAGIC.into(),
            reserved: 0.into(),
            tlv_type: u16::from(tlv_type).into(),
            length: (payload.len() as u16).into(),
        };

        let record = &mut self.data[self.offset..self.offset + total];
        record[..TLV_HEADER_BYTE_SIZE].copy_from_slice(header.as_bytes());
        record[TLV_HEADER_BYTE_SIZE..TLV_HEADER_BYTE_SIZE + payload.len()]
            .copy_from_slice(payload);
        record[TLV_HEADER_BYTE_SIZE + payload.len()..TLV_HEADER_BYTE_SIZE + padded].fill(0);

        // CRC over header, payload and padding; 0xffffffff is the
        // starting value used at the time of calculation.
        let mut digest = crc32::Digest::new_with_initial(crc32::IEEE, 0xFFFF_FFFF);
        digest.write(&record[..total - TLV_FOOTER_BYTE_SIZE]);
        record[total - TLV_FOOTER_BYTE_SIZE..].copy_from_slice(&digest.sum32().to_le_bytes());

        self.offset += total;
        log::info!("{:?} tlv: total length = {}", tlv_type, total);
        Ok(())
    }

    pub fn finish(self) -> PartitionImage {
        log::info!("total length of tlv data = {}", self.offset);
        PartitionImage { data: self.data }
    }
}

/// Certificate payload bytes: the firmware's string parser expects PEM
/// payloads to be NUL-terminated, DER payloads are written verbatim.
fn cert_payload(cert: &CertMaterial) -> Vec<u8> {
    terminated(cert.encoding, &cert.bytes)
}

fn key_payload(key: &KeyMaterial) -> Vec<u8> {
    terminated(key.encoding, &key.bytes)
}

fn terminated(encoding: Encoding, bytes: &[u8]) -> Vec<u8> {
    let mut payload = bytes.to_vec();
    if encoding == Encoding::Pem {
        payload.push(0);
    }
    payload
}

/// Assemble the DS-backed document shape: device certificate, optional CA
/// certificate, DS data, DS context.
pub fn generate_partition_ds(
    device_cert: &CertMaterial,
    ca_cert: Option<&CertMaterial>,
    ds: &DsParams,
) -> Result<PartitionImage, SecureCertError> {
    let mut builder = PartitionBuilder::new();
    builder.push(TlvType::DevCert, &cert_payload(device_cert))?;
    if let Some(ca_cert) = ca_cert {
        builder.push(TlvType::CaCert, &cert_payload(ca_cert))?;
    }

    let ds_header = DsDataHeader {
        rsa_length: (ds.bit_length / 32 - 1).into(),
        iv: ds.iv,
    };
    let mut ds_data = ds_header.as_bytes().to_vec();
    ds_data.extend_from_slice(&ds.ciphertext);
    builder.push(TlvType::DsData, &ds_data)?;

    let ctx = DsContext {
        reserved: 0.into(),
        efuse_key_id: ds.efuse_key_id,
        pad: 0,
        rsa_key_bits: (ds.bit_length as u16).into(),
    };
    builder.push(TlvType::DsContext, ctx.as_bytes())?;

    Ok(builder.finish())
}

/// Assemble the plaintext-key document shape: device certificate,
/// optional CA certificate, raw private key.
pub fn generate_partition_no_ds(
    device_cert: &CertMaterial,
    ca_cert: Option<&CertMaterial>,
    key: &KeyMaterial,
) -> Result<PartitionImage, SecureCertError> {
    let mut builder = PartitionBuilder::new();
    builder.push(TlvType::DevCert, &cert_payload(device_cert))?;
    if let Some(ca_cert) = ca_cert {
        builder.push(TlvType::CaCert, &cert_payload(ca_cert))?;
    }
    builder.push(TlvType::PrivKey, &key_payload(key))?;
    Ok(builder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TlvReader;
    use secure_cert_types::DS_IV_BYTE_SIZE;

    fn pem_cert(len: usize) -> CertMaterial {
        CertMaterial {
            encoding: Encoding::Pem,
            bytes: vec![b'C'; len],
        }
    }

    #[test]
    fn test_record_alignment() {
        for len in 0..=256 {
            let mut builder = PartitionBuilder::with_size(PARTITION_BYTE_SIZE);
            builder.push(TlvType::UserData1, &vec![0xAB; len]).unwrap();
            let image = builder.finish();
            let record = TlvReader::new(image.as_bytes()).next().unwrap().unwrap();
            assert_eq!(record.end_offset % FLASH_WRITE_ALIGNMENT, 0, "payload len {len}");
            assert_eq!(record.payload.len(), len);
        }
    }

    #[test]
    fn test_round_trip() {
        let payloads: [&[u8]; 3] = [b"first", &[0u8; 16], &[0xFFu8; 33]];
        let mut builder = PartitionBuilder::new();
        builder.push(TlvType::UserData1, payloads[0]).unwrap();
        builder.push(TlvType::UserData2, payloads[1]).unwrap();
        builder.push(TlvType::UserData3, payloads[2]).unwrap();
        let image = builder.finish();

        let records: Vec<_> = TlvReader::new(image.as_bytes())
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(records.len(), 3);
        for (record, payload) in records.iter().zip(payloads) {
            assert_eq!(record.payload, payload);
        }
        assert_eq!(records[0].tlv_type, u16::from(TlvType::UserData1));
    }

    #[test]
    fn test_known_record_bytes() {
        // CRC reference value from zlib.crc32(record, 0xffffffff)
        let mut builder = PartitionBuilder::new();
        builder.push(TlvType::DevCert, b"abc").unwrap();
        let image = builder.finish();
        let tlv = &image.as_bytes()[..32];
        // header: magic, reserved, type=1, len=3
        assert_eq!(&tlv[..12], [0x11, 0xBA, 0x5E, 0xBA, 0, 0, 0, 0, 1, 0, 3, 0]);
        // payload then zero padding to 16
        assert_eq!(&tlv[12..15], b"abc");
        assert_eq!(&tlv[15..28], [0u8; 13]);
        assert_eq!(&tlv[28..32], 0x79E9_1BA1u32.to_le_bytes());
    }

    #[test]
    fn test_record_too_large() {
        let mut builder = PartitionBuilder::new();
        let err = builder
            .push(TlvType::UserData1, &vec![0; PARTITION_BYTE_SIZE])
            .unwrap_err();
        assert!(matches!(err, SecureCertError::RecordTooLarge { .. }));
        // nothing was written
        assert!(builder.finish().as_bytes().iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_pem_nul_termination() {
        let image = generate_partition_no_ds(
            &pem_cert(10),
            None,
            &KeyMaterial {
                encoding: Encoding::Der,
                bytes: vec![0x30, 0x82, 0x01, 0x00],
                bit_length: 2048,
            },
        )
        .unwrap();
        let records: Vec<_> = TlvReader::new(image.as_bytes())
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(records.len(), 2);
        // PEM cert gains a trailing NUL, DER key does not
        assert_eq!(records[0].payload, b"CCCCCCCCCC\0");
        assert_eq!(records[1].payload, [0x30, 0x82, 0x01, 0x00]);
    }

    #[test]
    fn test_ds_document_shape() {
        let ds = DsParams {
            ciphertext: vec![0x5A; 128],
            iv: [0x1F; DS_IV_BYTE_SIZE],
            bit_length: 2048,
            efuse_key_id: 1,
        };
        let image = generate_partition_ds(&pem_cert(400), None, &ds).unwrap();
        assert_eq!(image.as_bytes().len(), PARTITION_BYTE_SIZE);

        let records: Vec<_> = TlvReader::new(image.as_bytes())
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].tlv_type, u16::from(TlvType::DevCert));
        assert_eq!(records[0].payload.len(), 401);

        assert_eq!(records[1].tlv_type, u16::from(TlvType::DsData));
        let ds_data = records[1].payload;
        assert_eq!(&ds_data[..4], (2048u32 / 32 - 1).to_le_bytes());
        assert_eq!(&ds_data[4..20], &[0x1F; 16]);
        assert_eq!(&ds_data[20..], &[0x5A; 128]);

        assert_eq!(records[2].tlv_type, u16::from(TlvType::DsContext));
        assert_eq!(records[2].payload, [0, 0, 0, 0, 1, 0, 0x00, 0x08]);

        // everything after the last record is erase filler
        let last = records[2].end_offset;
        assert!(image.as_bytes()[last..].iter().all(|&b| b == 0xFF));
    }
}
