//! The per-line relay loop: read, decode, forward, emit.
//!
//! Strictly turn-taking: for each inbound line exactly one outbound line is
//! written and flushed before the next read, so responses can never reorder
//! relative to requests. Decode and forwarding failures never escape;
//! they are answered with a protocol error envelope. Only stream failures
//! (inbound read, outbound write) propagate, ending the session.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::error::{ForwardError, FramingError, RelayError};
use crate::jsonrpc::{self, Envelope};

use super::forward::Forwarder;
use super::RelaySession;

/// Maximum length of one inbound line (10 MB).
///
/// Enforced while reading, so a newline-less flood cannot buffer unboundedly
/// and a crafted line cannot allocate an oversized value tree.
pub const MAX_LINE_BYTES: usize = 10 * 1024 * 1024;

/// Run the relay loop until end-of-stream, a fatal stream error, or
/// cancellation.
///
/// The writer is shared behind a mutex with the (currently idle) reverse
/// direction so outbound lines can never interleave mid-line.
///
/// # Errors
///
/// Returns [`RelayError`] only for failures of the streams themselves;
/// per-line failures are emitted as error envelopes and the loop continues.
pub async fn pump<R, W>(
    session: &RelaySession,
    mut reader: R,
    writer: Arc<Mutex<W>>,
) -> Result<(), RelayError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let forwarder = Forwarder::new(session);
    let shutdown = session.lifecycle.shutdown_token();
    let mut raw = Vec::new();
    let mut seq: u64 = 0;

    loop {
        raw.clear();

        let bytes_read = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                session.diagnostics.record("relay loop: shutdown signal received");
                break;
            }
            result = read_bounded_line(&mut reader, &mut raw, MAX_LINE_BYTES) => match result {
                Ok(n) => n,
                Err(FramingError::MessageTooLarge { max_bytes }) => {
                    seq += 1;
                    session.diagnostics.record(&format!(
                        "message #{seq}: inbound line exceeded {max_bytes} bytes, rejecting"
                    ));
                    let envelope = jsonrpc::error_envelope(
                        None,
                        jsonrpc::PARSE_ERROR,
                        "Parse error: message too large",
                    );
                    emit(session, &writer, &envelope).await?;
                    continue;
                }
                Err(e) => return Err(RelayError::Stream(e)),
            }
        };

        if bytes_read == 0 {
            session.diagnostics.record("inbound stream closed (EOF)");
            break;
        }

        // Strict UTF-8: lossy replacement would silently corrupt message
        // content, so a bad line is answered like any other parse failure.
        let line = match String::from_utf8(raw.clone()) {
            Ok(line) => line,
            Err(_) => {
                seq += 1;
                session
                    .diagnostics
                    .record(&format!("message #{seq}: inbound line is not valid UTF-8"));
                let envelope = jsonrpc::error_envelope(
                    None,
                    jsonrpc::PARSE_ERROR,
                    "Parse error: invalid UTF-8",
                );
                emit(session, &writer, &envelope).await?;
                continue;
            }
        };

        // Blank lines are keep-alive noise: no output, no message record.
        if line.trim().is_empty() {
            continue;
        }

        seq += 1;
        session.diagnostics.record(&format!("=== message #{seq} ==="));
        session
            .diagnostics
            .record(&format!("raw input: {}", line.trim_end()));

        let envelope = match jsonrpc::decode_line(&line) {
            Ok(request) => match forwarder.forward(&request).await {
                Ok(response) => response,
                Err(ForwardError::Cancelled) => {
                    session
                        .diagnostics
                        .record(&format!("message #{seq}: forward aborted by shutdown"));
                    break;
                }
                Err(e) => {
                    session
                        .diagnostics
                        .record(&format!("message #{seq}: forward failed: {e}"));
                    jsonrpc::error_envelope(
                        request.get("id").cloned(),
                        jsonrpc::INTERNAL_ERROR,
                        &format!("Internal error: {e}"),
                    )
                }
            },
            Err(e) => {
                session
                    .diagnostics
                    .record(&format!("message #{seq}: decode failed: {e}"));
                jsonrpc::error_envelope(
                    jsonrpc::recover_id(&line),
                    jsonrpc::PARSE_ERROR,
                    &format!("Parse error: {e}"),
                )
            }
        };

        emit(session, &writer, &envelope).await?;
        session
            .diagnostics
            .record(&format!("=== message #{seq} completed ==="));
    }

    Ok(())
}

/// Serialize one envelope, write it as a line, and flush.
async fn emit<W>(
    session: &RelaySession,
    writer: &Mutex<W>,
    envelope: &Envelope,
) -> Result<(), RelayError>
where
    W: AsyncWrite + Unpin,
{
    let mut json = serde_json::to_string(envelope).map_err(RelayError::Encode)?;
    session
        .diagnostics
        .record(&format!("sending to stdout: {json}"));
    json.push('\n');

    let mut guard = writer.lock().await;
    guard.write_all(json.as_bytes()).await?;
    guard.flush().await?;
    Ok(())
}

/// Read one newline-terminated line into `buf`, refusing to buffer more than
/// `max_bytes`.
///
/// Bytes are accumulated raw so multi-byte UTF-8 sequences straddling
/// internal buffer boundaries are never corrupted; the caller converts once
/// the full line is assembled.
///
/// # Returns
///
/// - `Ok(n)` with `n > 0`: a complete line (delimiter included) is in `buf`
/// - `Ok(0)`: end of stream
/// - `Err(MessageTooLarge)`: the cap was hit; the rest of the offending line
///   has been discarded so the next read starts on a fresh line
/// - `Err(Io)`: the stream failed
pub(crate) async fn read_bounded_line<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max_bytes: usize,
) -> Result<usize, FramingError>
where
    R: AsyncBufRead + Unpin,
{
    use tokio::io::AsyncBufReadExt;

    let mut total = 0usize;
    loop {
        let chunk = reader.fill_buf().await?;
        if chunk.is_empty() {
            // EOF: return whatever was accumulated (possibly a final line
            // with no trailing delimiter).
            return Ok(total);
        }

        match chunk.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                let take = pos + 1;
                if total + take > max_bytes {
                    reader.consume(take);
                    return Err(FramingError::MessageTooLarge { max_bytes });
                }
                buf.extend_from_slice(&chunk[..take]);
                reader.consume(take);
                return Ok(total + take);
            }
            None => {
                let take = chunk.len();
                if total + take > max_bytes {
                    reader.consume(take);
                    discard_to_newline(reader).await?;
                    return Err(FramingError::MessageTooLarge { max_bytes });
                }
                buf.extend_from_slice(chunk);
                total += take;
                reader.consume(take);
            }
        }
    }
}

/// Skip to the end of an oversized line so the reader is positioned at the
/// start of the next one.
async fn discard_to_newline<R>(reader: &mut R) -> Result<(), FramingError>
where
    R: AsyncBufRead + Unpin,
{
    use tokio::io::AsyncBufReadExt;

    loop {
        let chunk = reader.fill_buf().await?;
        if chunk.is_empty() {
            return Ok(());
        }
        match chunk.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                reader.consume(pos + 1);
                return Ok(());
            }
            None => {
                let len = chunk.len();
                reader.consume(len);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn test_read_single_line() {
        let mut reader = BufReader::new(&b"{\"id\":1}\nnext\n"[..]);
        let mut buf = Vec::new();
        let n = read_bounded_line(&mut reader, &mut buf, 1024).await.unwrap();
        assert_eq!(n, 9);
        assert_eq!(buf, b"{\"id\":1}\n");
    }

    #[tokio::test]
    async fn test_read_final_line_without_delimiter() {
        let mut reader = BufReader::new(&b"tail"[..]);
        let mut buf = Vec::new();
        let n = read_bounded_line(&mut reader, &mut buf, 1024).await.unwrap();
        assert_eq!(n, 4);
        assert_eq!(buf, b"tail");
    }

    #[tokio::test]
    async fn test_read_eof() {
        let mut reader = BufReader::new(&b""[..]);
        let mut buf = Vec::new();
        let n = read_bounded_line(&mut reader, &mut buf, 1024).await.unwrap();
        assert_eq!(n, 0);
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_line_rejected_and_skipped() {
        let mut data = vec![b'x'; 64];
        data.push(b'\n');
        data.extend_from_slice(b"ok\n");
        let mut reader = BufReader::new(&data[..]);

        let mut buf = Vec::new();
        let err = read_bounded_line(&mut reader, &mut buf, 16)
            .await
            .unwrap_err();
        assert!(matches!(err, FramingError::MessageTooLarge { max_bytes: 16 }));

        // The next read must land on the line after the oversized one.
        buf.clear();
        let n = read_bounded_line(&mut reader, &mut buf, 16).await.unwrap();
        assert_eq!(n, 3);
        assert_eq!(buf, b"ok\n");
    }

    #[tokio::test]
    async fn test_oversized_line_spanning_buffers() {
        // Small BufReader capacity forces multiple fill_buf cycles.
        let mut data = vec![b'y'; 40];
        data.push(b'\n');
        data.extend_from_slice(b"after\n");
        let mut reader = BufReader::with_capacity(8, &data[..]);

        let mut buf = Vec::new();
        let err = read_bounded_line(&mut reader, &mut buf, 16)
            .await
            .unwrap_err();
        assert!(matches!(err, FramingError::MessageTooLarge { .. }));

        buf.clear();
        let n = read_bounded_line(&mut reader, &mut buf, 16).await.unwrap();
        assert_eq!(n, 6);
        assert_eq!(buf, b"after\n");
    }
}
