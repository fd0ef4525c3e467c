// Accept loop and per-peer request/reply loop.

use super::{Inner, ServerState};
use crate::{log_debug, log_error, log_info, log_warn, Result, RpcResponse};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

/// Back-off after a failed accept, so a persistent error does not spin.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

pub(super) async fn serve<T>(inner: Arc<Inner<T>>, listener: TcpListener)
where
    T: Send + Sync + 'static,
{
    // ---
    let mut stop = inner.shutdown.subscribe();

    loop {
        if *stop.borrow() {
            break;
        }

        tokio::select! {
            biased;

            _ = stop.changed() => {}

            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    log_info!("rpc peer {peer} connected");
                    match serve_peer(&inner, stream, &mut stop).await {
                        Ok(()) => log_info!("rpc peer {peer} done"),
                        Err(e) => log_warn!("rpc peer {peer} dropped: {e}"),
                    }
                    inner.set_state(ServerState::AwaitingRequest);
                }
                Err(e) => {
                    log_error!("accept failed: {e}");
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
            },
        }
    }

    drop(listener);
    inner.set_state(ServerState::Stopped);
    log_info!("rpc server stopped");
}

/// One read from the peer.
#[derive(Debug, PartialEq, Eq)]
enum Frame {
    /// A complete request is in the buffer, terminator stripped.
    Request,
    /// The line exceeded the size limit and was discarded.
    Oversized,
    /// The peer hung up.
    Closed,
}

/// Read the next newline-terminated request into `buf` as raw bytes.
///
/// No UTF-8 check happens here; undecodable bytes reach the request decoder
/// and are answered like any other bad payload. At most `limit + 1` bytes are
/// buffered; the remainder of a longer line is read and dropped.
async fn read_frame<R>(reader: &mut R, buf: &mut Vec<u8>, limit: usize) -> std::io::Result<Frame>
where
    R: AsyncBufRead + Unpin,
{
    // ---
    let cap = limit as u64 + 1;
    buf.clear();

    let read = (&mut *reader).take(cap).read_until(b'\n', buf).await?;
    if read == 0 {
        return Ok(Frame::Closed);
    }

    if buf.ends_with(b"\n") || buf.len() <= limit {
        if buf.ends_with(b"\n") {
            buf.pop();
        }
        if buf.ends_with(b"\r") {
            buf.pop();
        }
        return Ok(Frame::Request);
    }

    loop {
        buf.clear();
        let read = (&mut *reader).take(cap).read_until(b'\n', buf).await?;
        if read == 0 || buf.ends_with(b"\n") {
            break;
        }
    }
    buf.clear();
    Ok(Frame::Oversized)
}

/// Serve one connection until the peer hangs up or stop is raised.
///
/// The next request is read only after the previous reply has been written.
async fn serve_peer<T>(
    inner: &Inner<T>,
    stream: TcpStream,
    stop: &mut watch::Receiver<bool>,
) -> Result<()>
where
    T: Send + Sync + 'static,
{
    // ---
    let limit = inner.config.max_request_bytes;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        inner.set_state(ServerState::AwaitingRequest);

        if *stop.borrow() {
            return Ok(());
        }

        let frame = tokio::select! {
            biased;

            _ = stop.changed() => return Ok(()),
            frame = read_frame(&mut reader, &mut buf, limit) => frame?,
        };

        let response = match frame {
            Frame::Closed => return Ok(()),
            Frame::Request => inner.process(&buf, true).await,
            Frame::Oversized => {
                log_warn!("rejecting request over {limit} bytes");
                RpcResponse::failure()
            }
        };

        inner.set_state(if response.is_success() {
            ServerState::RepliedSuccess
        } else {
            ServerState::RepliedFailure
        });

        let mut payload = response.encode()?;
        payload.push(b'\n');
        writer.write_all(&payload).await?;
        log_debug!("replied {:?}", response.status);
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    async fn frames(input: &[u8], limit: usize) -> Vec<(Frame, Vec<u8>)> {
        // ---
        let mut reader = BufReader::new(input);
        let mut buf = Vec::new();
        let mut out = Vec::new();
        loop {
            let frame = read_frame(&mut reader, &mut buf, limit).await.unwrap();
            if frame == Frame::Closed {
                return out;
            }
            out.push((frame, buf.clone()));
        }
    }

    #[tokio::test]
    async fn test_frames_strip_terminators() {
        // ---
        let got = frames(b"{\"cmd\":\"a\"}\r\n\n{\"cmd\":\"b\"}", 64).await;
        assert_eq!(
            got,
            vec![
                (Frame::Request, b"{\"cmd\":\"a\"}".to_vec()),
                (Frame::Request, Vec::new()),
                (Frame::Request, b"{\"cmd\":\"b\"}".to_vec()),
            ]
        );
    }

    #[tokio::test]
    async fn test_frames_keep_invalid_utf8() {
        // ---
        let got = frames(b"{\"cmd\":\"\xff\xfe\"}\n", 64).await;
        assert_eq!(got, vec![(Frame::Request, b"{\"cmd\":\"\xff\xfe\"}".to_vec())]);
    }

    #[tokio::test]
    async fn test_oversized_line_is_skipped() {
        // ---
        let mut input = vec![b'x'; 50];
        input.extend_from_slice(b"\nshort\n");
        input.extend_from_slice(&[b'y'; 9]);

        let got = frames(&input, 8).await;
        assert_eq!(
            got,
            vec![
                (Frame::Oversized, Vec::new()),
                (Frame::Request, b"short".to_vec()),
                (Frame::Oversized, Vec::new()),
            ]
        );
    }

    #[tokio::test]
    async fn test_line_at_limit_is_accepted() {
        // ---
        let got = frames(b"12345678\n", 8).await;
        assert_eq!(got, vec![(Frame::Request, b"12345678".to_vec())]);
    }
}
