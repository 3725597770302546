//! The wire framing shared by control messages and file-transfer payloads.
//!
//! A frame is an ASCII decimal length, one space, then exactly that many bytes. Control
//! messages and raw file chunks use the same shape; the only difference is what the caller
//! does with the payload once it's read.

use crate::error::{Error, ErrorKind, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Frames announcing a length above this are rejected outright.
pub const MAX_FRAME_LEN: u64 = 16 * 1024 * 1024;

/// The chunk size used for both uploads and downloads.
pub const TMP_BUFF_SIZE: usize = 64 * 1024;

/// Reads one length-prefixed control message and returns its payload as a `String`.
///
/// Fails with [`ErrorKind::ConnectionClosed`] on EOF before a full frame arrives, with
/// [`ErrorKind::FrameTooLarge`] if the announced length exceeds [`MAX_FRAME_LEN`], and with
/// [`ErrorKind::RecvFailed`] on any other I/O error. `ErrorKind::Interrupted` is retried
/// transparently by `tokio`'s `AsyncReadExt`, so no explicit retry loop is needed here.
pub async fn recv_msg<R>(stream: &mut R) -> Result<String>
where
    R: AsyncRead + Unpin,
{
    let len = read_length_prefix(stream).await?;
    let mut buf = vec![0u8; len as usize];
    read_exact_or_closed(stream, &mut buf).await?;
    String::from_utf8(buf).map_err(|e| Error::with_source(ErrorKind::RecvFailed, "frame was not valid UTF-8", e))
}

/// Writes a length-prefixed control message.
pub async fn send_msg<W>(stream: &mut W, payload: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    send_frame_header(stream, payload.len() as u64).await?;
    stream
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| Error::with_source(ErrorKind::SendFailed, "failed writing frame payload", e))?;
    stream
        .flush()
        .await
        .map_err(|e| Error::with_source(ErrorKind::SendFailed, "failed flushing frame payload", e))
}

/// Writes the length-prefix header for an upcoming raw byte stream (used to announce a file
/// transfer's total size once, before the chunked body follows outside of any further
/// framing).
pub async fn send_frame_header<W>(stream: &mut W, len: u64) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if len > MAX_FRAME_LEN {
        return Err(Error::new(ErrorKind::FrameTooLarge, format!("refusing to announce a frame of {len} bytes")));
    }
    let header = format!("{len} ");
    stream
        .write_all(header.as_bytes())
        .await
        .map_err(|e| Error::with_source(ErrorKind::SendFailed, "failed writing frame header", e))
}

/// Reads up to `max` bytes from `reader` and writes them verbatim to `stream`, returning the
/// number of bytes actually sent. Used to push one bounded chunk of an upload or download
/// payload onto the wire.
pub async fn send_file_chunk<R, W>(stream: &mut W, reader: &mut R, max: usize) -> Result<usize>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; max];
    let n = reader
        .read(&mut buf)
        .await
        .map_err(|e| Error::with_source(ErrorKind::FileOpenFailed, "failed reading local chunk", e))?;
    if n == 0 {
        return Ok(0);
    }
    stream
        .write_all(&buf[..n])
        .await
        .map_err(|e| Error::with_source(ErrorKind::SendFailed, "failed writing chunk to peer", e))?;
    Ok(n)
}

/// Reads up to `max` bytes directly from `stream` into `buf`, returning the number of bytes
/// written. Callers seek `writer` to the desired offset before calling this; the write target
/// is a `&mut [u8]` scratch buffer the caller then writes to disk, matching how the server
/// appends received bytes to a `.part` file one chunk at a time.
pub async fn recv_file_chunk<R>(stream: &mut R, buf: &mut [u8]) -> Result<usize>
where
    R: AsyncRead + Unpin,
{
    let n = stream
        .read(buf)
        .await
        .map_err(|e| Error::with_source(ErrorKind::RecvFailed, "failed reading chunk from peer", e))?;
    if n == 0 {
        return Err(Error::from(ErrorKind::ConnectionClosed));
    }
    Ok(n)
}

async fn read_length_prefix<R>(stream: &mut R) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut digits = Vec::with_capacity(8);
    loop {
        let mut byte = [0u8; 1];
        let n = stream
            .read(&mut byte)
            .await
            .map_err(|e| Error::with_source(ErrorKind::RecvFailed, "failed reading frame length", e))?;
        if n == 0 {
            if digits.is_empty() {
                return Err(Error::from(ErrorKind::ConnectionClosed));
            }
            return Err(Error::new(ErrorKind::ConnectionClosed, "connection closed mid-frame-header"));
        }
        match byte[0] {
            b' ' => break,
            b'0'..=b'9' => digits.push(byte[0]),
            _ => return Err(Error::new(ErrorKind::InvalidCommand, "non-digit byte in frame length prefix")),
        }
        if digits.len() > 20 {
            return Err(Error::new(ErrorKind::FrameTooLarge, "frame length prefix too long"));
        }
    }
    let text = std::str::from_utf8(&digits).expect("ASCII digits are valid UTF-8");
    let len: u64 = text.parse().map_err(|_| Error::new(ErrorKind::InvalidCommand, "unparseable frame length"))?;
    if len > MAX_FRAME_LEN {
        return Err(Error::new(ErrorKind::FrameTooLarge, format!("peer announced a frame of {len} bytes")));
    }
    Ok(len)
}

async fn read_exact_or_closed<R>(stream: &mut R, buf: &mut [u8]) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    match stream.read_exact(buf).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(Error::from(ErrorKind::ConnectionClosed)),
        Err(e) => Err(Error::with_source(ErrorKind::RecvFailed, "failed reading frame payload", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn round_trips_a_control_message() {
        let mut wire = Vec::new();
        send_msg(&mut wire, "hello world").await.unwrap();
        assert_eq!(wire, b"11 hello world");

        let mut cursor = Cursor::new(wire);
        let got = recv_msg(&mut cursor).await.unwrap();
        assert_eq!(got, "hello world");
    }

    #[tokio::test]
    async fn round_trips_an_empty_message() {
        let mut wire = Vec::new();
        send_msg(&mut wire, "").await.unwrap();
        let mut cursor = Cursor::new(wire);
        assert_eq!(recv_msg(&mut cursor).await.unwrap(), "");
    }

    #[tokio::test]
    async fn rejects_oversized_frames() {
        let mut wire = Cursor::new(format!("{} ", MAX_FRAME_LEN + 1).into_bytes());
        let err = recv_msg(&mut wire).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FrameTooLarge);
    }

    #[tokio::test]
    async fn reports_connection_closed_mid_frame() {
        let mut wire = Cursor::new(b"10 abc".to_vec());
        let err = recv_msg(&mut wire).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionClosed);
    }

    #[tokio::test]
    async fn reports_connection_closed_on_clean_eof() {
        let mut wire = Cursor::new(Vec::new());
        let err = recv_msg(&mut wire).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionClosed);
    }
}
