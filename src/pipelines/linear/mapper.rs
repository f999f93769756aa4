use anyhow::{Context, Result, bail};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::sync::Arc;

use crate::core::io::alignment_writer::{write_alignments, write_header};
use crate::core::io::fasta_reader::load_sequences;
use crate::core::io::fastq_reader::DoubleBufferedQueryReader;
use crate::core::utils::realtime;
use crate::pipelines::linear::index::{DatabaseConfig, HashBlockDatabase, SequenceDatabase};
use crate::pipelines::linear::map_opt::MapCliOptions;
use crate::pipelines::linear::orchestrator::AlignerPool;
use crate::pipelines::linear::query::Query;

/// Align every query in `opts.queries` (and its mates, if given) against
/// `opts.reference` and write tab-separated results.
pub fn main_align(opts: &MapCliOptions, num_threads: usize) -> Result<()> {
    let start_time = realtime();

    let params = opts.alignment_parameters().context("Invalid alignment options")?;
    let search = opts.search_parameters().context("Invalid search options")?;
    log::debug!("Alignment parameters: {}", params.cache_key());

    let (inner_distance, deviation) = match (&opts.paired_queries, &opts.spacing) {
        (Some(_), Some(spacing)) => (spacing.mean, spacing.deviation),
        (Some(_), None) => bail!("--paired-queries requires --spacing MEAN,DEVIATION"),
        (None, _) => (0, 1.0),
    };

    let references = load_sequences(&opts.reference)
        .with_context(|| format!("Error loading reference {}", opts.reference.display()))?;
    if references.is_empty() {
        bail!("Reference {} contains no sequences", opts.reference.display());
    }
    let mut database = HashBlockDatabase::new(SequenceDatabase::new(references, true), DatabaseConfig::default())
        .context("Error creating hash-block database")?;

    let mut writer: Box<dyn Write> = match &opts.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Error creating output file {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout())),
    };
    write_header(&mut writer).context("Error writing header")?;

    let reader = DoubleBufferedQueryReader::new(
        &opts.queries,
        opts.paired_queries.as_deref(),
        opts.batch_size,
        inner_distance,
        deviation,
    )
    .with_context(|| format!("Error opening queries {}", opts.queries.display()))?;

    let mut pool = AlignerPool::new(database.view(), params, search, num_threads)?;
    log::info!("Aligning with {} threads", pool.num_threads());

    let mut indexed_through = 0usize;
    let mut total_queries = 0usize;
    let mut mapped_queries = 0usize;
    let mut batch_index = 0usize;

    while let Some(batch) = reader.next_batch().context("Error reading queries")? {
        // Index levels are built on demand for the longest component seen so far.
        let longest = batch
            .iter()
            .flat_map(|q| q.components().iter().map(|c| c.len()))
            .max()
            .unwrap_or(0);
        if longest > indexed_through {
            database
                .require_set_up_through_size(longest)
                .context("Error building index levels")?;
            pool.setup(database.view());
            indexed_through = longest;
        }

        let queries: Vec<Arc<Query>> = batch.into_iter().map(Arc::new).collect();
        let batch_start = realtime();
        let results = pool.align_all(&queries).context("Error aligning batch")?;
        write_alignments(&mut writer, &results).context("Error writing alignments")?;

        total_queries += results.len();
        mapped_queries += results.iter().filter(|r| !r.is_empty()).count();
        log::debug!(
            "Batch {}: {} queries in {:.2}s",
            batch_index,
            results.len(),
            realtime() - batch_start
        );
        batch_index += 1;
    }
    writer.flush().context("Error flushing output")?;

    let stats = pool.stats();
    log::info!(
        "Processed {} queries ({} mapped) in {} batches, {:.2}s",
        total_queries,
        mapped_queries,
        batch_index,
        realtime() - start_time
    );
    log::debug!(
        "{} candidates, {} alignments computed, {} cache hits, {} reported",
        stats.candidates,
        stats.alignments_computed,
        stats.cache_hits,
        stats.alignments_reported
    );
    Ok(())
}
