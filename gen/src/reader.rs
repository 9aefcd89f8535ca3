/*++

Licensed under the Apache-2.0 license.

File Name:

   reader.rs

Abstract:

    Record-by-record parsing of a secure certificate partition image.

--*/

use crc::{crc32, Hasher32};
use secure_cert_types::{
    SecureCertError, TlvHeader, FLASH_WRITE_ALIGNMENT, TLV_FOOTER_BYTE_SIZE, TLV_HEADER_BYTE_SIZE,
    TLV_MAGIC,
};
use zerocopy::FromBytes;

/// One decoded TLV record. `tlv_type` is kept raw so images containing
/// types this build does not know about still parse.
#[derive(Debug)]
pub struct TlvRecord<'a> {
    pub tlv_type: u16,

    pub payload: &'a [u8],

    /// Offset of the record header within the image
    pub offset: usize,

    /// Offset one past the record's CRC footer
    pub end_offset: usize,
}

/// Iterates the records of a partition image, mirroring the firmware-side
/// parser: records are read back to back from offset 0 until the magic
/// stops matching (the erase filler never matches).
pub struct TlvReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> TlvReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn read_record(&mut self) -> Option<Result<TlvRecord<'a>, SecureCertError>> {
        let offset = self.offset;
        let remaining = &self.data[offset..];
        let header = TlvHeader::read_from_prefix(remaining)?;
        if header.magic.get() != TLV_MAGIC {
            return None;
        }

        let payload_len = header.length.get() as usize;
        let padded = payload_len.next_multiple_of(FLASH_WRITE_ALIGNMENT);
        let total = TLV_HEADER_BYTE_SIZE + padded + TLV_FOOTER_BYTE_SIZE;
        if remaining.len() < total {
            return Some(Err(SecureCertError::MalformedRecord(
                offset,
                "record length exceeds image bounds",
            )));
        }

        let mut digest = crc32::Digest::new_with_initial(crc32::IEEE, 0xFFFF_FFFF);
        digest.write(&remaining[..total - TLV_FOOTER_BYTE_SIZE]);
        let stored = u32::from_le_bytes(
            remaining[total - TLV_FOOTER_BYTE_SIZE..total]
                .try_into()
                .unwrap(),
        );
        if digest.sum32() != stored {
            return Some(Err(SecureCertError::MalformedRecord(
                offset,
                "CRC mismatch",
            )));
        }

        self.offset += total;
        Some(Ok(TlvRecord {
            tlv_type: header.tlv_type.get(),
            payload: &remaining[TLV_HEADER_BYTE_SIZE..TLV_HEADER_BYTE_SIZE + payload_len],
            offset,
            end_offset: offset + total,
        }))
    }
}

impl<'a> Iterator for TlvReader<'a> {
    type Item = Result<TlvRecord<'a>, SecureCertError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_record()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PartitionBuilder;
    use secure_cert_types::TlvType;

    #[test]
    fn test_empty_image_has_no_records() {
        let image = PartitionBuilder::new().finish();
        assert!(TlvReader::new(image.as_bytes()).next().is_none());
    }

    #[test]
    fn test_corrupted_payload_fails_crc() {
        let mut builder = PartitionBuilder::new();
        builder.push(TlvType::UserData1, b"payload").unwrap();
        let mut data = builder.finish().into_vec();
        data[TLV_HEADER_BYTE_SIZE] ^= 0x01;
        let result = TlvReader::new(&data).next().unwrap();
        assert!(matches!(
            result,
            Err(SecureCertError::MalformedRecord(0, "CRC mismatch"))
        ));
    }

    #[test]
    fn test_truncated_record() {
        let mut builder = PartitionBuilder::new();
        builder.push(TlvType::UserData1, b"payload").unwrap();
        let data = builder.finish().into_vec();
        let result = TlvReader::new(&data[..16]).next().unwrap();
        assert!(matches!(result, Err(SecureCertError::MalformedRecord(0, _))));
    }
}
