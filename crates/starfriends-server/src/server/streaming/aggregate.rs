//! Client-streaming aggregation.
//!
//! A client-streaming call folds an unbounded sequence of inbound messages
//! into one per-call session and answers exactly once, after the client
//! signals end-of-input:
//!
//! ```text
//! OPEN --(message: fold)--> OPEN
//! OPEN --(end-of-input)---> CLOSING --(finish)--> DONE, one response
//! OPEN --(error)----------> DONE, no response, session dropped
//! ```
//!
//! Sessions treat the inbound messages as one continuous input, so the final
//! result does not depend on how the client chunked it.

use super::{MessageSource, io::next_message};
use crate::server::{streaming::tokenize::count_words, telemetry::increment_messages_received};
use bytes::Bytes;
use starfriends_core::{
    Error, Result,
    proto::{TokenizeRequest, ZipRequest},
};
use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Write};
use tokio_util::sync::CancellationToken;
use zip::{CompressionMethod, ZipWriter, result::ZipError, write::SimpleFileOptions};

/// Per-call accumulator state of a client-streaming call.
///
/// A session is owned by exactly one call and is dropped, finished or not,
/// when the call ends.
pub trait Accumulator: Send {
    type Item: Send;
    type Output: Send;

    /// Folds one inbound message into the session.
    fn fold(&mut self, item: Self::Item) -> Result<()>;

    /// Seals the session into the single response payload.
    fn finish(self) -> Result<Self::Output>;
}

/// Drives `session` from `source` until end-of-input and returns the sealed
/// result.
///
/// # Errors
///
/// Any receive, fold or finish error aborts the call. The partially built
/// session is dropped and nothing is returned for it.
pub async fn aggregate<A, S>(
    source: &mut S,
    mut session: A,
    shutdown: &CancellationToken,
) -> Result<A::Output>
where
    A: Accumulator,
    S: MessageSource<A::Item>,
{
    let mut received = 0_u64;

    while let Some(item) = next_message(source, shutdown).await? {
        session.fold(item)?;
        received += 1;
        increment_messages_received(1);
    }

    tracing::debug!(received, "end of input, sealing session");
    session.finish()
}

/// Builds a ZIP archive with one entry per streamed file.
pub struct ZipSession {
    writer: ZipWriter<Cursor<Vec<u8>>>,
    names: HashSet<String>,
}

impl Default for ZipSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ZipSession {
    pub fn new() -> Self {
        Self {
            writer: ZipWriter::new(Cursor::new(Vec::new())),
            names: HashSet::new(),
        }
    }
}

impl Accumulator for ZipSession {
    type Item = ZipRequest;
    type Output = Bytes;

    fn fold(&mut self, file: ZipRequest) -> Result<()> {
        if file.file_name.is_empty() {
            return Err(Error::invalid("file_name must not be empty"));
        }
        if !self.names.insert(file.file_name.clone()) {
            return Err(Error::invalid(format!(
                "duplicate file_name {:?}",
                file.file_name
            )));
        }

        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        self.writer
            .start_file(file.file_name, options)
            .map_err(archive_error)?;
        self.writer
            .write_all(&file.contents)
            .map_err(|e| Error::Archive {
                context: e.to_string(),
            })
    }

    fn finish(self) -> Result<Bytes> {
        let cursor = self.writer.finish().map_err(archive_error)?;
        Ok(Bytes::from(cursor.into_inner()))
    }
}

fn archive_error(e: ZipError) -> Error {
    Error::Archive {
        context: e.to_string(),
    }
}

/// Counts whitespace-delimited words across the concatenated stream.
///
/// A word or a UTF-8 sequence may straddle two messages. Bytes after the last
/// complete word stay pending until more input or end-of-input arrives.
#[derive(Debug, Default)]
pub struct WordCountSession {
    words: HashMap<String, i64>,
    pending: Vec<u8>,
}

impl Accumulator for WordCountSession {
    type Item = TokenizeRequest;
    type Output = HashMap<String, i64>;

    fn fold(&mut self, request: TokenizeRequest) -> Result<()> {
        self.pending.extend_from_slice(&request.file_contents);

        let ready = complete_words(&self.pending);
        let consumed = ready.len();
        count_words(ready, &mut self.words);
        self.pending.drain(..consumed);
        Ok(())
    }

    fn finish(self) -> Result<HashMap<String, i64>> {
        let Self { mut words, pending } = self;
        count_words(&String::from_utf8_lossy(&pending), &mut words);
        Ok(words)
    }
}

/// Longest prefix of `bytes` that is valid UTF-8 and ends with whitespace.
///
/// No word in the prefix can continue into bytes that arrive later.
fn complete_words(bytes: &[u8]) -> &str {
    let valid = match core::str::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => core::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or_default(),
    };

    valid
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace())
        .map_or("", |(at, c)| &valid[..at + c.len_utf8()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::io::Read;
    use tonic::Status;
    use zip::ZipArchive;

    fn text(s: &str) -> core::result::Result<TokenizeRequest, Status> {
        Ok(TokenizeRequest {
            file_contents: Bytes::copy_from_slice(s.as_bytes()),
        })
    }

    fn file(name: &str, contents: &str) -> core::result::Result<ZipRequest, Status> {
        Ok(ZipRequest {
            file_name: name.to_string(),
            contents: Bytes::copy_from_slice(contents.as_bytes()),
        })
    }

    async fn count(
        messages: Vec<core::result::Result<TokenizeRequest, Status>>,
    ) -> Result<HashMap<String, i64>> {
        let mut source = stream::iter(messages);
        aggregate(
            &mut source,
            WordCountSession::default(),
            &CancellationToken::new(),
        )
        .await
    }

    fn expected(pairs: &[(&str, i64)]) -> HashMap<String, i64> {
        pairs.iter().map(|(w, n)| ((*w).to_string(), *n)).collect()
    }

    #[tokio::test]
    async fn word_count_is_chunk_invariant() {
        let want = expected(&[("the", 2), ("cat", 1), ("sat", 1), ("on", 1), ("mat", 1)]);

        let whole = count(vec![text("the cat sat on the mat")]).await.unwrap();
        let split = count(vec![text("the cat sat on"), text("the mat")]).await.unwrap();
        assert_eq!(whole, want);
        assert_eq!(split, want);

        let words = ["the", "cat", "sat", "on", "the", "mat"];
        for boundary in 0..=words.len() {
            let (head, tail) = words.split_at(boundary);
            let counts = count(vec![text(&head.join(" ")), text(&tail.join(" "))])
                .await
                .unwrap();
            assert_eq!(counts, want, "split after {boundary} words");
        }
    }

    fn chunk(b: &[u8]) -> core::result::Result<TokenizeRequest, Status> {
        Ok(TokenizeRequest {
            file_contents: Bytes::copy_from_slice(b),
        })
    }

    #[tokio::test]
    async fn word_count_survives_splits_at_every_byte() {
        for sentence in [
            "the cat sat on the mat",
            "déjà vu: naïve café, très café\u{3000}über",
        ] {
            let whole = count(vec![text(sentence)]).await.unwrap();
            let raw = sentence.as_bytes();

            for at in 0..=raw.len() {
                let (head, tail) = raw.split_at(at);
                let split = count(vec![chunk(head), chunk(tail)]).await.unwrap();
                assert_eq!(split, whole, "split {sentence:?} at byte {at}");
            }
        }
    }

    #[tokio::test]
    async fn words_may_straddle_several_messages() {
        let counts = count(vec![
            text("the ca"),
            text("t s"),
            text("a"),
            text("t on the mat"),
        ])
        .await
        .unwrap();

        assert_eq!(
            counts,
            expected(&[("the", 2), ("cat", 1), ("sat", 1), ("on", 1), ("mat", 1)])
        );
    }

    #[tokio::test]
    async fn multibyte_character_split_across_messages_is_reassembled() {
        let counts = count(vec![chunk(b"caf\xc3"), chunk(b"\xa9 bar")])
            .await
            .unwrap();

        assert_eq!(counts, expected(&[("café", 1), ("bar", 1)]));
    }

    #[test]
    fn complete_words_stops_at_the_last_whitespace() {
        assert_eq!(complete_words(b"the ca"), "the ");
        assert_eq!(complete_words(b"cat"), "");
        assert_eq!(complete_words(b"a\xe3\x80\x80b"), "a\u{3000}");
        assert_eq!(complete_words(b"a b\xc3"), "a ");
    }

    #[tokio::test]
    async fn empty_stream_still_answers_once() {
        assert!(count(Vec::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn abort_before_end_of_input_yields_no_result() {
        let result = count(vec![
            text("the cat"),
            Err(Status::cancelled("client disconnected")),
            text("never folded"),
        ])
        .await;

        assert_eq!(result, Err(Error::RequestCancelled));
    }

    #[tokio::test]
    async fn zips_every_streamed_file() {
        let mut source = stream::iter(vec![file("a.txt", "alpha"), file("dir/b.txt", "bravo")]);

        let zipped = aggregate(&mut source, ZipSession::new(), &CancellationToken::new())
            .await
            .unwrap();

        let mut archive = ZipArchive::new(Cursor::new(zipped.to_vec())).unwrap();
        assert_eq!(archive.len(), 2);
        let mut contents = String::new();
        archive
            .by_name("dir/b.txt")
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "bravo");
    }

    #[tokio::test]
    async fn rejects_empty_and_duplicate_names() {
        for files in [
            vec![file("", "x")],
            vec![file("a.txt", "x"), file("a.txt", "y")],
        ] {
            let mut source = stream::iter(files);
            let result = aggregate(&mut source, ZipSession::new(), &CancellationToken::new()).await;
            assert!(matches!(result, Err(Error::InvalidArgument { .. })));
        }
    }

    #[tokio::test]
    async fn transport_fault_discards_partial_archive() {
        let mut source = stream::iter(vec![
            file("a.txt", "alpha"),
            Err(Status::unknown("h2 stream reset")),
        ]);

        let result = aggregate(&mut source, ZipSession::new(), &CancellationToken::new()).await;

        assert!(matches!(result, Err(Error::Transport { .. })));
    }
}
