//! Record serialization and length-prefixed framing.
//!
//! Records cross process boundaries as opaque byte frames. A [`Codec`] turns a
//! record into bytes on the worker side and back on the coordinator side;
//! transports only ever see the framed bytes.

use crate::error::{PrefetchError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{ErrorKind, Read, Write};

/// Upper bound on a single frame, guarding against corrupt length prefixes.
pub const MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

pub trait Codec: Clone + Send + 'static {
    fn encode<T: Serialize>(&self, record: &T) -> Result<Vec<u8>>;
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, record: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(record)?)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Write one frame as a little-endian `u32` length followed by the payload.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<()> {
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len as usize <= MAX_FRAME_LEN)
        .ok_or_else(|| {
            PrefetchError::Io(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("frame of {} bytes is too large", payload.len()),
            ))
        })?;

    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(payload);
    writer.write_all(&buf)?;
    Ok(())
}

/// Read one frame. Returns `Ok(None)` on a clean end of stream between frames.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut header = [0u8; 4];
    let mut filled = 0;
    while filled < header.len() {
        match reader.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(PrefetchError::Disconnected),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    let len = u32::from_le_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(PrefetchError::Io(std::io::Error::new(
            ErrorKind::InvalidData,
            format!("frame length {} exceeds limit", len),
        )));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => PrefetchError::Disconnected,
        _ => PrefetchError::Io(e),
    })?;
    Ok(Some(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Cursor;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        id: u32,
        tags: Vec<String>,
    }

    #[test]
    fn test_json_codec_nested_record() {
        let codec = JsonCodec;
        let record = Sample {
            id: 7,
            tags: vec!["a".into(), "b".into()],
        };
        let bytes = codec.encode(&record).unwrap();
        let decoded: Sample = codec.decode(&bytes).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_json_codec_rejects_garbage() {
        let result: Result<Sample> = JsonCodec.decode(b"not json");
        assert!(matches!(result, Err(PrefetchError::Serialization(_))));
    }

    #[test]
    fn test_frames_back_to_back() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"first").unwrap();
        write_frame(&mut buf, b"").unwrap();
        write_frame(&mut buf, b"third").unwrap();

        let mut reader = Cursor::new(buf);
        assert_eq!(read_frame(&mut reader).unwrap().unwrap(), b"first");
        assert_eq!(read_frame(&mut reader).unwrap().unwrap(), b"");
        assert_eq!(read_frame(&mut reader).unwrap().unwrap(), b"third");
        assert!(read_frame(&mut reader).unwrap().is_none());
    }

    #[test]
    fn test_truncated_frame_is_disconnect() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"payload").unwrap();
        buf.truncate(6);

        let result = read_frame(&mut Cursor::new(buf));
        assert!(matches!(result, Err(PrefetchError::Disconnected)));
    }

    #[test]
    fn test_oversized_length_prefix_rejected() {
        let buf = u32::MAX.to_le_bytes().to_vec();
        let result = read_frame(&mut Cursor::new(buf));
        assert!(matches!(result, Err(PrefetchError::Io(_))));
    }
}
