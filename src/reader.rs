//! Reading many inputs in the background.
//!
//! A [`DescriptorReader`] hands its inputs to a producer thread, which
//! parses them one after another and sends the results through a bounded
//! queue. The consumer drains the queue with a blocking iterator.

use std::path::PathBuf;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::config::ReaderConfig;
use crate::dispatch::{DescriptorParser, Document, UnparseableDocument};
use crate::meta::RawDocument;

/// One input of a batch.
#[derive(Debug, Clone)]
pub enum ReaderInput {
    /// A file, whose name also serves as the filename hint.
    File(PathBuf),
    /// Bytes already in memory, with an optional filename hint.
    Bytes { name: Option<String>, bytes: Vec<u8> },
}

impl From<PathBuf> for ReaderInput {
    fn from(path: PathBuf) -> Self {
        ReaderInput::File(path)
    }
}

/// One result of a batch, tagged with the input it came from.
#[derive(Debug)]
pub enum DescriptorResult {
    Parsed {
        source: Option<String>,
        document: Document,
    },
    Unparseable {
        source: Option<String>,
        document: UnparseableDocument,
    },
}

impl DescriptorResult {
    pub fn source(&self) -> Option<&str> {
        match self {
            DescriptorResult::Parsed { source, .. } | DescriptorResult::Unparseable { source, .. } => {
                source.as_deref()
            }
        }
    }

    pub fn parsed(self) -> Option<Document> {
        match self {
            DescriptorResult::Parsed { document, .. } => Some(document),
            DescriptorResult::Unparseable { .. } => None,
        }
    }
}

#[derive(Debug)]
enum Message {
    Result(DescriptorResult),
    /// All inputs were processed.
    Finished,
}

/// Parses batches of inputs on a producer thread.
#[derive(Debug, Clone, Default)]
pub struct DescriptorReader {
    config: ReaderConfig,
}

impl DescriptorReader {
    pub fn new(config: ReaderConfig) -> Self {
        DescriptorReader { config }
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Parse the given files.
    pub fn read_files<P: Into<PathBuf>>(&self, paths: impl IntoIterator<Item = P>) -> DescriptorIter {
        self.read(paths.into_iter().map(|p| ReaderInput::File(p.into())).collect())
    }

    /// Start parsing `inputs` in the background.
    pub fn read(&self, inputs: Vec<ReaderInput>) -> DescriptorIter {
        let (tx, rx) = sync_channel(self.config.queue_capacity);
        let parser = DescriptorParser::new(self.config.parse_options.clone());
        let handle = thread::spawn(move || produce(&parser, inputs, &tx));
        DescriptorIter {
            rx,
            handle: Some(handle),
            done: false,
            complete: false,
        }
    }
}

/// The producer loop. Stops early if an input cannot be read or the
/// consumer went away; only a full run ends with `Finished`.
fn produce(parser: &DescriptorParser, inputs: Vec<ReaderInput>, tx: &SyncSender<Message>) {
    for input in inputs {
        let (source, bytes) = match input {
            ReaderInput::File(path) => match std::fs::read(&path) {
                Ok(bytes) => (Some(path.display().to_string()), bytes),
                Err(error) => {
                    warn!(path = %path.display(), %error, "could not read input, stopping");
                    return;
                }
            },
            ReaderInput::Bytes { name, bytes } => (name, bytes),
        };
        for result in parse_input(parser, source, bytes) {
            if tx.send(Message::Result(result)).is_err() {
                debug!("consumer dropped the queue, stopping");
                return;
            }
        }
    }
    // the consumer may be gone already
    let _ = tx.send(Message::Finished);
}

fn parse_input(
    parser: &DescriptorParser,
    source: Option<String>,
    bytes: Vec<u8>,
) -> Vec<DescriptorResult> {
    let buf: Arc<[u8]> = bytes.into();
    let hint = source.as_deref().map(file_name);
    match parser.parse(buf.clone(), hint) {
        Ok(results) => results
            .into_iter()
            .map(|result| match result {
                Ok(document) => DescriptorResult::Parsed {
                    source: source.clone(),
                    document,
                },
                Err(document) => DescriptorResult::Unparseable {
                    source: source.clone(),
                    document,
                },
            })
            .collect(),
        Err(error) => {
            warn!(source = source.as_deref(), %error, "could not split input");
            vec![DescriptorResult::Unparseable {
                source,
                document: UnparseableDocument::new(RawDocument::new(buf), error),
            }]
        }
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Blocking iterator over the results of a [`DescriptorReader`].
#[derive(Debug)]
pub struct DescriptorIter {
    rx: Receiver<Message>,
    handle: Option<JoinHandle<()>>,
    done: bool,
    complete: bool,
}

impl DescriptorIter {
    /// Whether the producer got through all inputs. Only meaningful once
    /// the iterator is exhausted.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    fn finish(&mut self) {
        self.done = true;
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("descriptor reader thread panicked");
            }
        }
    }
}

impl Iterator for DescriptorIter {
    type Item = DescriptorResult;

    fn next(&mut self) -> Option<DescriptorResult> {
        if self.done {
            return None;
        }
        match self.rx.recv() {
            Ok(Message::Result(result)) => Some(result),
            Ok(Message::Finished) => {
                self.complete = true;
                self.finish();
                None
            }
            Err(_) => {
                self.finish();
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;
    use crate::config::ReaderConfigBuilder;
    use crate::descriptor::tests::RELAY;

    fn bytes(name: &str, text: &str) -> ReaderInput {
        ReaderInput::Bytes {
            name: Some(name.to_string()),
            bytes: text.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_reads_all_inputs() {
        let config = ReaderConfigBuilder::default().queue_capacity(1).build().unwrap();
        let reader = DescriptorReader::new(config);
        let mut iter = reader.read(vec![
            bytes("a", &format!("{RELAY}{RELAY}")),
            bytes("b", "garbage\n"),
            bytes("c", RELAY),
        ]);
        let results: Vec<_> = iter.by_ref().collect();
        assert_eq!(results.len(), 4);
        assert!(iter.is_complete());
        assert_eq!(results[0].source(), Some("a"));
        assert!(matches!(results[2], DescriptorResult::Unparseable { .. }));
        assert_eq!(results[3].source(), Some("c"));
        assert_eq!(results.into_iter().filter_map(DescriptorResult::parsed).count(), 3);
    }

    #[test]
    #[traced_test]
    fn test_missing_file_closes_queue() {
        let reader = DescriptorReader::default();
        let mut iter = reader.read(vec![
            bytes("a", RELAY),
            ReaderInput::File(PathBuf::from("/nonexistent/descriptor-file")),
            bytes("c", RELAY),
        ]);
        assert!(iter.next().is_some());
        assert!(iter.next().is_none());
        assert!(!iter.is_complete());
        assert!(iter.next().is_none());
        assert!(logs_contain("could not read input"));
    }

    #[test]
    fn test_dropping_iterator_stops_producer() {
        let config = ReaderConfigBuilder::default().queue_capacity(1).build().unwrap();
        let reader = DescriptorReader::new(config);
        let inputs = (0..50).map(|i| bytes(&i.to_string(), RELAY)).collect();
        let mut iter = reader.read(inputs);
        assert!(iter.next().is_some());
        drop(iter);
    }

    #[test]
    fn test_file_name_hint() {
        assert_eq!(file_name("a/b/2023-11-20-12-02-00"), "2023-11-20-12-02-00");
        assert_eq!(file_name("plain"), "plain");
    }
}
