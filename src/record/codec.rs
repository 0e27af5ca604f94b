//! Field codec for record bodies
//!
//! A record body is its declared fields written back to back in declaration
//! order. Strings are length-prefixed (u32 LE) UTF-8, integers are i64 LE.
//! There are no per-field tags: the schema stored in the artifact header
//! says what comes next.

use thiserror::Error;

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors raised while decoding a record body
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("Record body truncated: needed {needed} bytes at position {position}")]
    Truncated { position: usize, needed: usize },

    #[error("Invalid UTF-8 in field at position {0}")]
    InvalidUtf8(usize),

    #[error("Record body has {0} trailing bytes")]
    TrailingBytes(usize),

    #[error("Field length {0} exceeds body size")]
    LengthOverflow(u64),
}

/// Appends encoded fields to a buffer.
#[derive(Debug, Default)]
pub struct FieldWriter {
    buf: Vec<u8>,
}

impl FieldWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Reuses an existing allocation; the buffer is cleared first.
    pub fn with_buffer(mut buf: Vec<u8>) -> Self {
        buf.clear();
        Self { buf }
    }

    pub fn put_str(&mut self, value: &str) {
        self.buf
            .extend_from_slice(&(value.len() as u32).to_le_bytes());
        self.buf.extend_from_slice(value.as_bytes());
    }

    pub fn put_int(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Reads fields back out of an encoded body.
#[derive(Debug)]
pub struct FieldReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> FieldReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    fn take(&mut self, needed: usize) -> CodecResult<&'a [u8]> {
        let end = self
            .position
            .checked_add(needed)
            .filter(|end| *end <= self.data.len())
            .ok_or(CodecError::Truncated {
                position: self.position,
                needed,
            })?;
        let slice = &self.data[self.position..end];
        self.position = end;
        Ok(slice)
    }

    pub fn take_str(&mut self) -> CodecResult<String> {
        let mut len_buf = [0u8; 4];
        len_buf.copy_from_slice(self.take(4)?);
        let len = u32::from_le_bytes(len_buf) as u64;
        if len > self.remaining() as u64 {
            return Err(CodecError::LengthOverflow(len));
        }

        let start = self.position;
        let bytes = self.take(len as usize)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8(start))
    }

    pub fn take_int(&mut self) -> CodecResult<i64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(i64::from_le_bytes(buf))
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    /// Fails unless every byte of the body was consumed.
    pub fn finish(self) -> CodecResult<()> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(CodecError::TrailingBytes(n)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_fields_read_back_in_order() {
        let mut writer = FieldWriter::new();
        writer.put_str("d1");
        writer.put_int(-7);
        writer.put_str("");
        let bytes = writer.into_bytes();

        let mut reader = FieldReader::new(&bytes);
        assert_eq!(reader.take_str().unwrap(), "d1");
        assert_eq!(reader.take_int().unwrap(), -7);
        assert_eq!(reader.take_str().unwrap(), "");
        reader.finish().unwrap();
    }

    #[test]
    fn test_truncated_body() {
        let mut writer = FieldWriter::new();
        writer.put_str("abcdef");
        let bytes = writer.into_bytes();

        let mut reader = FieldReader::new(&bytes[..6]);
        assert!(matches!(
            reader.take_str(),
            Err(CodecError::LengthOverflow(6))
        ));

        let mut reader = FieldReader::new(&bytes[..2]);
        assert!(matches!(reader.take_str(), Err(CodecError::Truncated { .. })));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut writer = FieldWriter::new();
        writer.put_int(1);
        writer.put_int(2);
        let bytes = writer.into_bytes();

        let mut reader = FieldReader::new(&bytes);
        reader.take_int().unwrap();
        assert_eq!(reader.finish(), Err(CodecError::TrailingBytes(8)));
    }

    #[test]
    fn test_invalid_utf8() {
        let mut bytes = 2u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0xC3, 0x28]);
        let mut reader = FieldReader::new(&bytes);
        assert_eq!(reader.take_str(), Err(CodecError::InvalidUtf8(4)));
    }
}
