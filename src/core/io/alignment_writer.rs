//! Tab-separated alignment output.
//!
//! One line per component of every reported alignment:
//!
//! ```text
//! query  rank  component  reference  strand  ref_start  ref_end  query_start  query_end  penalty  cigar
//! ```
//!
//! Reference coordinates are 0-based half-open on the forward strand. The
//! CIGAR reads along the strand the component aligned to. Queries without an
//! alignment get a single line with `*` in every alignment column.

use std::io::{self, Write};

use crate::pipelines::linear::query::QueryAlignments;

pub const HEADER: &str =
    "#query\trank\tcomponent\treference\tstrand\tref_start\tref_end\tquery_start\tquery_end\tpenalty\tcigar";

/// Write the header line.
pub fn write_header<W: Write>(out: &mut W) -> io::Result<()> {
    writeln!(out, "{HEADER}")
}

/// Write every result, in order. Returns the number of lines written.
pub fn write_alignments<W: Write>(out: &mut W, results: &[QueryAlignments]) -> io::Result<usize> {
    let mut lines = 0;
    for result in results {
        let name = result.query.name();
        if result.is_empty() {
            writeln!(out, "{name}\t*\t*\t*\t*\t*\t*\t*\t*\t*\t*")?;
            lines += 1;
            continue;
        }
        for (rank, alignment) in result.alignments.iter().enumerate() {
            for (component, placed) in alignment.components.iter().enumerate() {
                let range = placed.forward_reference_range();
                let query_range = placed.query_range();
                writeln!(
                    out,
                    "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{:.3}\t{}",
                    name,
                    rank,
                    component,
                    placed.reference.name(),
                    if placed.is_reverse { '-' } else { '+' },
                    range.start,
                    range.end,
                    query_range.start,
                    query_range.end,
                    placed.penalty(),
                    placed.block.cigar(),
                )?;
                lines += 1;
            }
        }
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alignment::AlignedBlock;
    use crate::pipelines::linear::index::sequence::Sequence;
    use crate::pipelines::linear::query::{Query, QueryAlignment, SequenceAlignment};
    use std::sync::Arc;

    #[test]
    fn test_lines_per_component() {
        let reference = Arc::new(Sequence::from_text("chr1", b"TTTTACGTACGTTTTT").unwrap());
        let reverse = Arc::new(reference.reverse_complement());
        let query = Arc::new(Query::single(Sequence::from_text("read1", b"ACGTACGT").unwrap()).unwrap());

        let forward_hit = SequenceAlignment {
            query: Arc::clone(&query.components()[0]),
            reference: Arc::clone(&reference),
            reference_index: 0,
            is_reverse: false,
            block: AlignedBlock::exact(0, 4, "ACGTACGT"),
        };
        let reverse_hit = SequenceAlignment {
            query: Arc::clone(&query.components()[0]),
            reference: Arc::clone(&reverse),
            reference_index: 1,
            is_reverse: true,
            block: AlignedBlock::exact(0, 4, "ACGTACGT"),
        };
        let results = vec![
            QueryAlignments {
                query: Arc::clone(&query),
                alignments: vec![
                    QueryAlignment::new(vec![forward_hit], 0.0),
                    QueryAlignment::new(vec![reverse_hit], 0.0),
                ],
            },
            QueryAlignments {
                query: Arc::new(Query::single(Sequence::from_text("lost", b"GGGG").unwrap()).unwrap()),
                alignments: Vec::new(),
            },
        ];

        let mut out = Vec::new();
        write_header(&mut out).unwrap();
        assert_eq!(write_alignments(&mut out, &results).unwrap(), 3);
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], HEADER);
        assert_eq!(lines[1], "read1\t0\t0\tchr1\t+\t4\t12\t0\t8\t0.000\t8=");
        assert_eq!(lines[2], "read1\t1\t0\tchr1\t-\t4\t12\t0\t8\t0.000\t8=");
        assert!(lines[3].starts_with("lost\t*"));
    }
}
