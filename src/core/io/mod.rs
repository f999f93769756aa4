//! Input and output for the mapper.
//!
//! - `fasta_reader` - reference sequences (plain or gzip FASTA)
//! - `fastq_reader` - reads and mate pairs, in batches or all at once
//! - `alignment_writer` - tab-separated alignment lines

pub mod alignment_writer;
pub mod fasta_reader;
pub mod fastq_reader;
