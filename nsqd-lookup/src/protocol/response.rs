use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};

/// Upper bound on a lookupd response frame
pub const MAX_RESPONSE_SIZE: usize = 1024 * 1024;

/// Read one response frame: 4-byte big-endian length, then the payload
pub async fn read_response<R>(reader: &mut R) -> Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let size = reader.read_u32().await? as usize;
    if size > MAX_RESPONSE_SIZE {
        return Err(Error::Protocol(format!(
            "response of {size} bytes exceeds limit of {MAX_RESPONSE_SIZE}"
        )));
    }

    let mut payload = vec![0u8; size];
    reader.read_exact(&mut payload).await?;
    Ok(Bytes::from(payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_response() {
        let mut frame = 2u32.to_be_bytes().to_vec();
        frame.extend_from_slice(b"OK");

        let response = read_response(&mut frame.as_slice()).await.unwrap();
        assert_eq!(response, Bytes::from_static(b"OK"));
    }

    #[tokio::test]
    async fn test_truncated_response_is_io_error() {
        let mut frame = 10u32.to_be_bytes().to_vec();
        frame.extend_from_slice(b"OK");

        let err = read_response(&mut frame.as_slice()).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[tokio::test]
    async fn test_oversized_response_rejected() {
        let frame = u32::MAX.to_be_bytes();

        let err = read_response(&mut frame.as_slice()).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }
}
