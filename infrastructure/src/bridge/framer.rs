//! Newline framing of the worker's output streams.
//!
//! [`LineFramer`] turns an arbitrary byte stream into trimmed, non-empty
//! lines. Partial lines spanning several reads are reassembled by
//! [`LineCodec`]; an unterminated last line is still emitted at EOF.
//!
//! Framing works on bytes. A line that is not valid UTF-8 is decoded lossily
//! and handed on like any other, and a line over the length limit is skipped
//! up to its newline. Neither ends the stream; only an I/O error does.

use bytes::{Buf, BytesMut};
use futures::StreamExt;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio_util::codec::{Decoder, FramedRead};

/// Default upper bound for a single line (1 MiB).
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Failure reading the framed stream.
#[derive(Error, Debug)]
pub enum FramerError {
    /// The line was discarded; the framer continues with the next one.
    #[error("line exceeds {0} bytes")]
    LineTooLong(usize),

    /// The stream is finished after this.
    #[error("stream read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// One decoded frame.
#[derive(Debug, PartialEq, Eq)]
pub enum Frame {
    Line(String),
    /// A line longer than the limit was (or is being) skipped.
    TooLong,
}

/// Byte-level `\n` decoder with a length bound.
///
/// Behaves like `LinesCodec` except that it never fails on encoding and an
/// oversized line is reported as a [`Frame::TooLong`] item, so the
/// surrounding `FramedRead` keeps going.
#[derive(Debug)]
pub struct LineCodec {
    max_length: usize,
    next_index: usize,
    discarding: bool,
}

impl LineCodec {
    pub fn new_with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
            discarding: false,
        }
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

impl Decoder for LineCodec {
    type Item = Frame;
    type Error = std::io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, Self::Error> {
        loop {
            let read_to = self.max_length.saturating_add(1).min(buf.len());
            let newline = buf[self.next_index..read_to]
                .iter()
                .position(|b| *b == b'\n');

            match (self.discarding, newline) {
                (true, Some(offset)) => {
                    buf.advance(self.next_index + offset + 1);
                    self.discarding = false;
                    self.next_index = 0;
                }
                (true, None) => {
                    buf.advance(read_to);
                    self.next_index = 0;
                    if buf.is_empty() {
                        return Ok(None);
                    }
                }
                (false, Some(offset)) => {
                    let end = self.next_index + offset;
                    self.next_index = 0;
                    let line = buf.split_to(end + 1);
                    return Ok(Some(Frame::Line(lossy(&line[..end]))));
                }
                (false, None) if buf.len() > self.max_length => {
                    self.discarding = true;
                    return Ok(Some(Frame::TooLong));
                }
                (false, None) => {
                    self.next_index = read_to;
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, Self::Error> {
        if let Some(frame) = self.decode(buf)? {
            return Ok(Some(frame));
        }
        self.next_index = 0;
        if self.discarding {
            self.discarding = false;
            buf.clear();
            return Ok(None);
        }
        if buf.is_empty() {
            return Ok(None);
        }
        let rest = buf.split_to(buf.len());
        Ok(Some(Frame::Line(lossy(&rest))))
    }
}

/// Splits a byte stream into trimmed, non-empty text lines.
pub struct LineFramer<R> {
    inner: FramedRead<R, LineCodec>,
    max_length: usize,
}

impl<R: AsyncRead + Unpin> LineFramer<R> {
    pub fn new(reader: R) -> Self {
        Self::with_max_length(reader, DEFAULT_MAX_LINE_LENGTH)
    }

    pub fn with_max_length(reader: R, max_length: usize) -> Self {
        Self {
            inner: FramedRead::new(reader, LineCodec::new_with_max_length(max_length)),
            max_length,
        }
    }

    /// Next non-empty line, `None` at end of stream.
    ///
    /// [`FramerError::LineTooLong`] is reported once per skipped line and the
    /// framer stays usable. After [`FramerError::Io`] the stream is finished.
    pub async fn next_line(&mut self) -> Option<Result<String, FramerError>> {
        loop {
            match self.inner.next().await? {
                Ok(Frame::Line(line)) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    return Some(Ok(trimmed.to_string()));
                }
                Ok(Frame::TooLong) => {
                    return Some(Err(FramerError::LineTooLong(self.max_length)));
                }
                Err(e) => return Some(Err(FramerError::Io(e))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    async fn collect<R: AsyncRead + Unpin>(framer: &mut LineFramer<R>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = framer.next_line().await {
            lines.push(line.unwrap());
        }
        lines
    }

    #[tokio::test]
    async fn splits_trims_and_skips_empty_lines() {
        let input: &[u8] = b"  {\"a\":1}  \n\n   \n{\"b\":2}\r\nlast";
        let mut framer = LineFramer::new(input);
        assert_eq!(collect(&mut framer).await, vec!["{\"a\":1}", "{\"b\":2}", "last"]);
    }

    #[tokio::test]
    async fn reassembles_lines_across_reads() {
        let (mut tx, rx) = tokio::io::duplex(16);
        let writer = tokio::spawn(async move {
            tx.write_all(b"{\"command\":").await.unwrap();
            tokio::task::yield_now().await;
            tx.write_all(b"\"get_ports\"}\nsecond").await.unwrap();
            tokio::task::yield_now().await;
            tx.write_all(b" line\n").await.unwrap();
        });

        let mut framer = LineFramer::new(rx);
        let lines = collect(&mut framer).await;
        writer.await.unwrap();

        assert_eq!(lines, vec!["{\"command\":\"get_ports\"}", "second line"]);
    }

    #[tokio::test]
    async fn oversized_line_is_skipped_and_framing_continues() {
        let input: &[u8] = b"ok\n0123456789abcdef\nafter\n";
        let mut framer = LineFramer::with_max_length(input, 8);

        assert_eq!(framer.next_line().await.unwrap().unwrap(), "ok");
        assert!(matches!(
            framer.next_line().await,
            Some(Err(FramerError::LineTooLong(8)))
        ));
        assert_eq!(framer.next_line().await.unwrap().unwrap(), "after");
        assert!(framer.next_line().await.is_none());
    }

    #[tokio::test]
    async fn oversized_line_split_across_reads_is_reported_once() {
        let (mut tx, rx) = tokio::io::duplex(4);
        let writer = tokio::spawn(async move {
            tx.write_all(b"0123456789").await.unwrap();
            tokio::task::yield_now().await;
            tx.write_all(b"abcdefghij\nnext\n").await.unwrap();
        });

        let mut framer = LineFramer::with_max_length(rx, 8);
        assert!(matches!(
            framer.next_line().await,
            Some(Err(FramerError::LineTooLong(8)))
        ));
        assert_eq!(framer.next_line().await.unwrap().unwrap(), "next");
        assert!(framer.next_line().await.is_none());
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn unterminated_oversized_tail_is_dropped_at_eof() {
        let input: &[u8] = b"first\n0123456789abcdef";
        let mut framer = LineFramer::with_max_length(input, 8);

        assert_eq!(framer.next_line().await.unwrap().unwrap(), "first");
        assert!(matches!(
            framer.next_line().await,
            Some(Err(FramerError::LineTooLong(8)))
        ));
        assert!(framer.next_line().await.is_none());
    }

    #[tokio::test]
    async fn invalid_utf8_is_decoded_lossily() {
        let input: &[u8] = b"\xff noise\n{\"command\":\"get_ports\"}\n";
        let mut framer = LineFramer::new(input);
        assert_eq!(
            collect(&mut framer).await,
            vec!["\u{fffd} noise", "{\"command\":\"get_ports\"}"]
        );
    }

    #[tokio::test]
    async fn empty_stream_ends_immediately() {
        let input: &[u8] = b"";
        let mut framer = LineFramer::new(input);
        assert!(framer.next_line().await.is_none());
    }
}
