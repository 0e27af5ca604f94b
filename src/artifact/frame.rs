//! Log frames
//!
//! Each record in the log is one frame:
//!
//! ```text
//! +------------------+
//! | Frame Length     | (u32 LE, whole frame including this field)
//! +------------------+
//! | Raw Length       | (u32 LE, encoded body size before compression)
//! +------------------+
//! | Compressed Body  | (zstd)
//! +------------------+
//! | Checksum         | (u32 LE)
//! +------------------+
//! ```
//!
//! Checksum covers all bytes except the checksum itself.

use std::io;

use super::checksum::compute_checksum;

/// Length + raw length + checksum
pub const FRAME_OVERHEAD: usize = 4 + 4 + 4;

/// Compresses an encoded record body into a complete frame.
pub fn encode_frame(body: &[u8], level: i32) -> io::Result<Vec<u8>> {
    let compressed = zstd::bulk::compress(body, level)?;
    let frame_length = FRAME_OVERHEAD + compressed.len();
    let frame_length = u32::try_from(frame_length).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Record too large for a frame: {} bytes", frame_length),
        )
    })?;

    let mut frame = Vec::with_capacity(frame_length as usize);
    frame.extend_from_slice(&frame_length.to_le_bytes());
    frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
    frame.extend_from_slice(&compressed);

    let checksum = compute_checksum(&frame);
    frame.extend_from_slice(&checksum.to_le_bytes());
    Ok(frame)
}

/// Reads the frame length prefix.
pub fn frame_length(prefix: [u8; 4]) -> usize {
    u32::from_le_bytes(prefix) as usize
}

/// Verifies a complete frame and returns the decompressed body.
pub fn decode_frame(frame: &[u8]) -> io::Result<Vec<u8>> {
    if frame.len() < FRAME_OVERHEAD {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "Frame too short",
        ));
    }

    let declared = frame_length([frame[0], frame[1], frame[2], frame[3]]);
    if declared != frame.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Frame length mismatch: declared {}, got {}",
                declared,
                frame.len()
            ),
        ));
    }

    let checksum_offset = frame.len() - 4;
    let stored_checksum = u32::from_le_bytes([
        frame[checksum_offset],
        frame[checksum_offset + 1],
        frame[checksum_offset + 2],
        frame[checksum_offset + 3],
    ]);
    let computed_checksum = compute_checksum(&frame[..checksum_offset]);
    if computed_checksum != stored_checksum {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Checksum mismatch: computed {:08x}, stored {:08x}",
                computed_checksum, stored_checksum
            ),
        ));
    }

    let raw_length = u32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]) as usize;
    if raw_length == 0 {
        return Ok(Vec::new());
    }

    let body = zstd::bulk::decompress(&frame[8..checksum_offset], raw_length)?;
    if body.len() != raw_length {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Decompressed size mismatch: expected {}, got {}",
                raw_length,
                body.len()
            ),
        ));
    }

    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body() -> Vec<u8> {
        b"The iSearch collection: physics papers, book records, metadata. ".repeat(8)
    }

    #[test]
    fn test_frame_roundtrip() {
        let frame = encode_frame(&body(), 3).unwrap();
        assert_eq!(frame_length([frame[0], frame[1], frame[2], frame[3]]), frame.len());
        assert_eq!(decode_frame(&frame).unwrap(), body());
    }

    #[test]
    fn test_repetitive_body_compresses() {
        let frame = encode_frame(&body(), 3).unwrap();
        assert!(frame.len() < body().len());
    }

    #[test]
    fn test_empty_body() {
        let frame = encode_frame(&[], 3).unwrap();
        assert!(decode_frame(&frame).unwrap().is_empty());
    }

    #[test]
    fn test_checksum_detects_corruption() {
        let mut frame = encode_frame(&body(), 3).unwrap();
        let mid = frame.len() / 2;
        frame[mid] ^= 0xFF;

        let err = decode_frame(&frame).unwrap_err();
        assert!(err.to_string().contains("Checksum mismatch"));
    }

    #[test]
    fn test_truncated_frame() {
        let frame = encode_frame(&body(), 3).unwrap();
        let err = decode_frame(&frame[..frame.len() - 1]).unwrap_err();
        assert!(err.to_string().contains("length mismatch"));
    }
}
