//! Newline-delimited JSON listener.
//!
//! Each line is either a control command (`{"command":"startAll","mode":"standard"}`),
//! answered with one `CommandResult` line, or a pushed read payload, routed
//! into ingestion without a reply. Lines that are neither are logged and skipped.
//! A line longer than [`MAX_LINE_BYTES`] closes the connection.

use std::io;
use std::net::SocketAddr;

use tagflow_core::{Command, TagService};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::output::render_json_line;

/// Longest accepted line, newline excluded.
const MAX_LINE_BYTES: usize = 256 * 1024;

/// Accept connections until `cancel` fires.
pub async fn serve(listener: TcpListener, service: TagService, push_reader: String, cancel: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let service = service.clone();
                    let push_reader = push_reader.clone();
                    let cancel = cancel.child_token();
                    tokio::spawn(async move {
                        handle_connection(stream, peer, &service, &push_reader, cancel).await;
                    });
                }
                Err(e) => warn!(error = %e, "accept failed"),
            },
        }
    }
    debug!("listener stopped");
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    service: &TagService,
    push_reader: &str,
    cancel: CancellationToken,
) {
    info!(%peer, "listener connection opened");
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    loop {
        let line = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            line = read_line_capped(&mut reader, MAX_LINE_BYTES) => line,
        };
        match line {
            Ok(Some(line)) => {
                if let Err(e) = handle_line(line.trim(), service, push_reader, &mut write_half).await {
                    warn!(%peer, error = %e, "write to listener connection failed");
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(%peer, error = %e, "read from listener connection failed");
                break;
            }
        }
    }
    info!(%peer, "listener connection closed");
}

async fn handle_line<W: AsyncWrite + Unpin>(
    line: &str,
    service: &TagService,
    push_reader: &str,
    out: &mut W,
) -> std::io::Result<()> {
    if line.is_empty() {
        return Ok(());
    }

    if let Ok(command) = serde_json::from_str::<Command>(line) {
        debug!(?command, "control command received");
        let result = service.execute(command).await;
        let mut reply = render_json_line(&result);
        reply.push('\n');
        return out.write_all(reply.as_bytes()).await;
    }

    if let Err(e) = service.route_push(push_reader, line.as_bytes()) {
        warn!(kind = %e.kind(), error = %e, "unrecognised line skipped");
    }
    Ok(())
}

/// Read one newline-terminated line of at most `max` bytes.
///
/// `Ok(None)` at end of stream. A longer line, or one that is not UTF-8,
/// fails with [`io::ErrorKind::InvalidData`].
async fn read_line_capped<R: AsyncBufRead + Unpin>(reader: &mut R, max: usize) -> io::Result<Option<String>> {
    let limit = u64::try_from(max).unwrap_or(u64::MAX).saturating_add(1);
    let mut buf = Vec::new();
    let read = (&mut *reader).take(limit).read_until(b'\n', &mut buf).await?;
    if read == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
    } else if buf.len() > max {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("line longer than {max} bytes"),
        ));
    }
    String::from_utf8(buf)
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tagflow_core::ServiceConfig;

    fn service() -> TagService {
        TagService::from_config(ServiceConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn commands_get_one_reply_line() {
        let mut out = Vec::new();
        handle_line(r#"{"command":"snapshot"}"#, &service(), "push", &mut out)
            .await
            .unwrap();

        let reply = String::from_utf8(out).unwrap();
        assert!(reply.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(reply.trim()).unwrap();
        assert_eq!(value["success"], true);
    }

    #[tokio::test]
    async fn pushed_reads_and_garbage_get_no_reply() {
        let service = service();
        let mut out = Vec::new();
        handle_line(r#"{"data":{"idHex":"4646","antenna":1}}"#, &service, "push", &mut out)
            .await
            .unwrap();
        handle_line("not json at all", &service, "push", &mut out)
            .await
            .unwrap();
        handle_line("   ", &service, "push", &mut out).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn lines_are_capped() {
        let input: &[u8] = b"short\nexactly8\n0123456789\ntail";
        let mut reader = BufReader::new(input);

        assert_eq!(read_line_capped(&mut reader, 8).await.unwrap().unwrap(), "short");
        assert_eq!(read_line_capped(&mut reader, 8).await.unwrap().unwrap(), "exactly8");
        let err = read_line_capped(&mut reader, 8).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        let mut reader = BufReader::new(&b"tail"[..]);
        assert_eq!(read_line_capped(&mut reader, 8).await.unwrap().unwrap(), "tail");
        assert!(read_line_capped(&mut reader, 8).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_line_closes_the_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(serve(listener, service(), "push".into(), cancel.clone()));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let huge = vec![b'x'; MAX_LINE_BYTES + 1];
        // The server may close before the whole line is written.
        let _ = stream.write_all(&huge).await;
        let mut rest = Vec::new();
        // Either a clean close or a reset, never a reply.
        if let Ok(read) = stream.read_to_end(&mut rest).await {
            assert_eq!(read, 0);
        }

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn serves_over_tcp_until_cancelled() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(serve(listener, service(), "push".into(), cancel.clone()));

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        write_half.write_all(b"{\"command\":\"health\"}\n").await.unwrap();
        let mut lines = BufReader::new(read_half).lines();
        let reply = lines.next_line().await.unwrap().unwrap();
        assert!(reply.contains("\"success\":true"));

        cancel.cancel();
        task.await.unwrap();
    }
}
