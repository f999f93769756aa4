// FASTQ reader module using bio::io::fastq
//
// This module provides a wrapper around bio::io::fastq with:
// - Automatic gzip detection by magic bytes (BGZF reads as multi-member gzip)
// - Batch reading to match our processing pattern
// - Conversion of raw records into encoded single or paired queries
//
// Mate 2 of a pair is reverse-complemented on load so that both mates of a
// fragment share the orientation of the reference strand they came from.

use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use bio::io::fastq;
use crossbeam_channel::{Receiver, Sender, bounded};
use log::{debug, info, warn};

use crate::core::utils::xzopen;
use crate::error::{MapperError, Result};
use crate::pipelines::linear::index::sequence::Sequence;
use crate::pipelines::linear::query::Query;

/// Batch of FASTQ reads, still as raw text.
#[derive(Debug, Default)]
pub struct ReadBatch {
    pub names: Vec<String>,
    pub seqs: Vec<Vec<u8>>,
}

impl ReadBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of reads in this batch
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Encode every read. Fails on the first invalid base.
    pub fn into_sequences(self) -> Result<Vec<Sequence>> {
        self.names
            .into_iter()
            .zip(self.seqs)
            .map(|(name, seq)| Sequence::from_text(name, &seq))
            .collect()
    }
}

/// FASTQ reader with automatic gzip detection
pub struct FastqReader {
    records: fastq::Records<BufReader<Box<dyn BufRead + Send>>>,
}

impl FastqReader {
    /// Open a FASTQ file, plain or gzip-compressed. `-` reads stdin.
    pub fn new(path: &Path) -> io::Result<Self> {
        let fastq_reader = fastq::Reader::new(xzopen(path)?);
        Ok(Self {
            records: fastq_reader.records(),
        })
    }

    /// Read a batch of reads (up to batch_size)
    ///
    /// Returns an empty batch when EOF is reached.
    pub fn read_batch(&mut self, batch_size: usize) -> io::Result<ReadBatch> {
        let mut batch = ReadBatch::new();

        for _ in 0..batch_size {
            match self.records.next() {
                Some(Ok(record)) => {
                    batch.names.push(record.id().to_string());
                    batch.seqs.push(record.seq().to_vec());
                }
                Some(Err(e)) => return Err(io::Error::other(e)),
                None => break,
            }
        }

        Ok(batch)
    }
}

/// Turns one or two FASTQ streams into batches of queries.
pub struct QueryReader {
    first: FastqReader,
    second: Option<FastqReader>,
    expected_inner_distance: i64,
    spacing_deviation_per_unit_penalty: f64,
}

impl QueryReader {
    pub fn single(path: &Path) -> Result<Self> {
        Ok(Self {
            first: FastqReader::new(path)?,
            second: None,
            expected_inner_distance: 0,
            spacing_deviation_per_unit_penalty: 1.0,
        })
    }

    /// Mate pairs read in lockstep from two files.
    pub fn paired(
        path1: &Path,
        path2: &Path,
        expected_inner_distance: i64,
        spacing_deviation_per_unit_penalty: f64,
    ) -> Result<Self> {
        Ok(Self {
            first: FastqReader::new(path1)?,
            second: Some(FastqReader::new(path2)?),
            expected_inner_distance,
            spacing_deviation_per_unit_penalty,
        })
    }

    pub fn is_paired(&self) -> bool {
        self.second.is_some()
    }

    /// Up to `batch_size` queries; empty at EOF.
    pub fn read_batch(&mut self, batch_size: usize) -> Result<Vec<Query>> {
        let batch1 = self.first.read_batch(batch_size)?;
        let Some(second) = self.second.as_mut() else {
            return batch1.into_sequences()?.into_iter().map(Query::single).collect();
        };

        let batch2 = second.read_batch(batch_size)?;
        if batch1.len() != batch2.len() {
            return Err(MapperError::Parse(format!(
                "paired inputs have different read counts ({} vs {} in this batch)",
                batch1.len(),
                batch2.len()
            )));
        }
        batch1
            .into_sequences()?
            .into_iter()
            .zip(batch2.into_sequences()?)
            .map(|(mate1, mate2)| {
                Query::paired(
                    mate1,
                    mate2.reverse_complement(),
                    self.expected_inner_distance,
                    self.spacing_deviation_per_unit_penalty,
                )
            })
            .collect()
    }

    /// Drain the reader.
    pub fn read_all(&mut self) -> Result<Vec<Query>> {
        const CHUNK: usize = 4096;
        let mut queries = Vec::new();
        loop {
            let batch = self.read_batch(CHUNK)?;
            if batch.is_empty() {
                return Ok(queries);
            }
            queries.extend(batch);
        }
    }
}

/// Load every read of a FASTQ file as a single-component query.
pub fn load_queries(path: &Path) -> Result<Vec<Query>> {
    let queries = QueryReader::single(path)?.read_all()?;
    info!("Loaded {} reads from {}", queries.len(), path.display());
    Ok(queries)
}

/// Load mate pairs from two FASTQ files. Mate 2 is reverse-complemented.
pub fn load_paired_queries(
    path1: &Path,
    path2: &Path,
    expected_inner_distance: i64,
    spacing_deviation_per_unit_penalty: f64,
) -> Result<Vec<Query>> {
    let queries = QueryReader::paired(
        path1,
        path2,
        expected_inner_distance,
        spacing_deviation_per_unit_penalty,
    )?
    .read_all()?;
    info!(
        "Loaded {} read pairs from {} and {}",
        queries.len(),
        path1.display(),
        path2.display()
    );
    Ok(queries)
}

// =============================================================================
// DOUBLE-BUFFERED QUERY READER
// =============================================================================
//
// A background thread parses and encodes the next batch while the pool aligns
// the current one. The channel holds one batch, so at most one batch is
// waiting while another is in flight.

type QueryBatchResult = Result<Vec<Query>>;

pub struct DoubleBufferedQueryReader {
    receiver: Receiver<QueryBatchResult>,
    reader_thread: Option<JoinHandle<()>>,
}

impl DoubleBufferedQueryReader {
    /// Spawn the reader thread. Paths are opened before spawning so that a
    /// missing file is reported here.
    pub fn new(
        path1: &Path,
        path2: Option<&Path>,
        batch_size: usize,
        expected_inner_distance: i64,
        spacing_deviation_per_unit_penalty: f64,
    ) -> Result<Self> {
        let reader = match path2 {
            Some(path2) => QueryReader::paired(
                path1,
                path2,
                expected_inner_distance,
                spacing_deviation_per_unit_penalty,
            )?,
            None => QueryReader::single(path1)?,
        };
        let source: PathBuf = path1.to_path_buf();
        let (sender, receiver) = bounded(1);
        let reader_thread = thread::spawn(move || {
            Self::reader_loop(reader, batch_size.max(1), sender);
            debug!("Query reader for {} finished", source.display());
        });
        Ok(Self {
            receiver,
            reader_thread: Some(reader_thread),
        })
    }

    fn reader_loop(mut reader: QueryReader, batch_size: usize, sender: Sender<QueryBatchResult>) {
        loop {
            let batch = reader.read_batch(batch_size);
            let done = matches!(&batch, Ok(b) if b.is_empty()) || batch.is_err();
            if sender.send(batch).is_err() || done {
                return;
            }
        }
    }

    /// Next pre-read batch, or `None` at EOF.
    pub fn next_batch(&self) -> Result<Option<Vec<Query>>> {
        match self.receiver.recv() {
            Ok(Ok(batch)) if batch.is_empty() => Ok(None),
            Ok(Ok(batch)) => Ok(Some(batch)),
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(None),
        }
    }
}

impl Drop for DoubleBufferedQueryReader {
    fn drop(&mut self) {
        // Disconnect first so a reader blocked on a full channel exits.
        drop(std::mem::replace(&mut self.receiver, crossbeam_channel::never()));
        if let Some(handle) = self.reader_thread.take() {
            join_reader_thread(handle);
        }
    }
}

/// Join a reader thread, logging a panic instead of propagating it.
///
/// Returns whether the thread finished normally.
pub(crate) fn join_reader_thread(handle: JoinHandle<()>) -> bool {
    match handle.join() {
        Ok(()) => true,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            warn!("Query reader thread panicked: {}", message);
            false
        }
    }
}
