// FASTA reader module using bio::io::fasta
//
// This module provides a wrapper around bio::io::fasta with:
// - Automatic gzip detection by magic bytes (concatenated members and BGZF included)
// - Encoding of every record into 4-bit base masks on load
//
// Reference sequences are loaded whole; the hash-block database needs random
// access to every base.

use std::io::{self, BufRead, BufReader};
use std::path::Path;

use bio::io::fasta;
use log::info;

use crate::core::utils::xzopen;
use crate::error::Result;
use crate::pipelines::linear::index::sequence::Sequence;

/// FASTA reader with automatic gzip detection
pub struct FastaReader {
    records: fasta::Records<BufReader<Box<dyn BufRead + Send>>>,
}

impl FastaReader {
    /// Open a FASTA file, plain or gzip-compressed. `-` reads stdin.
    pub fn new(path: &Path) -> io::Result<Self> {
        let fasta_reader = fasta::Reader::new(xzopen(path)?);
        Ok(Self {
            records: fasta_reader.records(),
        })
    }

    /// Read the next FASTA record
    ///
    /// Returns `Ok(Some(record))` if a record is found, `Ok(None)` at EOF,
    /// and `Err(e)` on a parse error.
    pub fn read_record(&mut self) -> io::Result<Option<fasta::Record>> {
        match self.records.next() {
            Some(Ok(record)) => Ok(Some(record)),
            Some(Err(e)) => Err(io::Error::other(e)),
            None => Ok(None),
        }
    }
}

/// Load and encode every record of a FASTA file.
///
/// Fails on the first base outside the IUPAC alphabet.
pub fn load_sequences(path: &Path) -> Result<Vec<Sequence>> {
    let mut reader = FastaReader::new(path)?;
    let mut sequences = Vec::new();
    let mut total_bases = 0usize;
    while let Some(record) = reader.read_record()? {
        let sequence = Sequence::from_text(record.id(), record.seq())?;
        total_bases += sequence.len();
        sequences.push(sequence);
    }
    info!(
        "Loaded {} sequences ({} bp) from {}",
        sequences.len(),
        total_bases,
        path.display()
    );
    Ok(sequences)
}
