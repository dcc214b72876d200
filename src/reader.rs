//! Single-producer stream reader: input lines in, [`Job`]s out.

use crate::config::INITIAL_LINE_BUFFER;
use crate::error::ReadError;
use crate::queue::{Job, JobSender};
use memchr::memchr;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Line splitter that refuses, rather than truncates, lines above a maximum.
pub struct LineReader<R> {
    inner: BufReader<R>,
    max_line_bytes: usize,
    line: u64,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(reader: R, max_line_bytes: usize) -> Self {
        Self {
            inner: BufReader::with_capacity(INITIAL_LINE_BUFFER, reader),
            max_line_bytes,
            line: 0,
        }
    }

    /// Next line with its 1-based number. The `\n` and a trailing `\r` are stripped;
    /// a final line without terminator is still returned.
    pub async fn next_line(&mut self) -> Result<Option<(u64, Vec<u8>)>, ReadError> {
        let mut buf = Vec::new();
        let mut saw_data = false;

        loop {
            let available = self.inner.fill_buf().await?;
            if available.is_empty() {
                if !saw_data {
                    return Ok(None);
                }
                break;
            }
            saw_data = true;

            let (len, terminated) = match memchr(b'\n', available) {
                Some(pos) => (pos, true),
                None => (available.len(), false),
            };
            if buf.len() + len > self.max_line_bytes {
                return Err(ReadError::LineTooLong {
                    line: self.line + 1,
                    max: self.max_line_bytes,
                });
            }
            buf.extend_from_slice(&available[..len]);

            if terminated {
                self.inner.consume(len + 1);
                break;
            }
            self.inner.consume(len);
        }

        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
        self.line += 1;
        Ok(Some((self.line, buf)))
    }
}

/// What the reader saw before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadSummary {
    pub lines: u64,
    pub enqueued: u64,
}

/// Reads `input` line by line and pushes every line onto the queue.
///
/// Empty lines are pushed too; the decode stage rejects them with their line number.
///
/// Returns once the input is exhausted or the run is cancelled; the queue is
/// closed when `queue` is dropped on return.
pub async fn stream_lines<R>(
    input: R,
    queue: JobSender,
    cancel: CancellationToken,
    max_line_bytes: usize,
) -> Result<ReadSummary, ReadError>
where
    R: AsyncRead + Unpin,
{
    let mut reader = LineReader::new(input, max_line_bytes);
    let mut summary = ReadSummary::default();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = reader.next_line() => next?,
        };
        let Some((line, raw)) = next else {
            break;
        };
        summary.lines = line;

        if queue.push(Job { line, raw }, &cancel).await.is_err() {
            break;
        }
        summary.enqueued += 1;
    }

    debug!(
        lines = summary.lines,
        enqueued = summary.enqueued,
        "Stream reader finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue;

    async fn read_all(input: &[u8], max: usize) -> Result<Vec<(u64, Vec<u8>)>, ReadError> {
        let mut reader = LineReader::new(input, max);
        let mut lines = Vec::new();
        while let Some(line) = reader.next_line().await? {
            lines.push(line);
        }
        Ok(lines)
    }

    #[tokio::test]
    async fn splits_lines_and_numbers_them() {
        let lines = read_all(b"{\"a\":1}\n{\"a\":2}\n", 1024).await.unwrap();
        assert_eq!(
            lines,
            vec![(1, b"{\"a\":1}".to_vec()), (2, b"{\"a\":2}".to_vec())]
        );
    }

    #[tokio::test]
    async fn last_line_without_newline_and_crlf() {
        let lines = read_all(b"one\r\ntwo", 1024).await.unwrap();
        assert_eq!(lines, vec![(1, b"one".to_vec()), (2, b"two".to_vec())]);
    }

    #[tokio::test]
    async fn empty_input_has_no_lines() {
        assert!(read_all(b"", 1024).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn oversized_line_fails_instead_of_truncating() {
        let input = b"short\nthis line is far too long\nshort\n";
        let err = read_all(input, 10).await.unwrap_err();
        assert!(matches!(err, ReadError::LineTooLong { line: 2, max: 10 }));
    }

    #[tokio::test]
    async fn line_at_exact_limit_is_accepted() {
        let lines = read_all(b"0123456789\n", 10).await.unwrap();
        assert_eq!(lines[0].1.len(), 10);
    }

    #[tokio::test]
    async fn stream_enqueues_empty_lines_too() {
        let token = CancellationToken::new();
        let (tx, rx) = queue::bounded(8);
        let input: &[u8] = b"{\"a\":1}\n\n   \n{\"a\":2}\n";

        let summary = stream_lines(input, tx, token.clone(), 1024).await.unwrap();
        assert_eq!(summary, ReadSummary { lines: 4, enqueued: 4 });

        let lines: Vec<(u64, Vec<u8>)> = [
            rx.pop(&token).await.unwrap(),
            rx.pop(&token).await.unwrap(),
            rx.pop(&token).await.unwrap(),
            rx.pop(&token).await.unwrap(),
        ]
        .into_iter()
        .map(|job| (job.line, job.raw))
        .collect();
        assert_eq!(lines[1], (2, Vec::new()));
        assert_eq!(lines[2], (3, b"   ".to_vec()));
        assert_eq!(lines[3].0, 4);
        assert!(rx.pop(&token).await.is_none());
    }

    #[tokio::test]
    async fn cancelled_stream_enqueues_nothing() {
        let token = CancellationToken::new();
        token.cancel();
        let (tx, rx) = queue::bounded(8);
        let input: &[u8] = b"{\"a\":1}\n{\"a\":2}\n";

        let summary = stream_lines(input, tx, token, 1024).await.unwrap();
        assert_eq!(summary.enqueued, 0);
        assert!(rx.pop(&CancellationToken::new()).await.is_none());
    }
}
