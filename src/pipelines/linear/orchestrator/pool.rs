//! Fixed pool of aligner workers.
//!
//! Each call to [`AlignerPool::align_all`] is one batch. Workers are moved
//! into scoped threads together with their caches, pull `(index, query)` jobs
//! from a bounded channel, and send results back on an unbounded one so the
//! producer never blocks on a full result queue. Workers come back to the
//! pool when their thread ends.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, unbounded};
use log::debug;

use super::worker::{AlignerWorker, WorkerStats};
use crate::error::Result;
use crate::pipelines::linear::index::database::HashBlockDatabaseView;
use crate::pipelines::linear::map_opt::{AlignmentParameters, SearchParameters};
use crate::pipelines::linear::query::{Query, QueryAlignments};

pub struct AlignerPool {
    workers: Vec<AlignerWorker>,
    stats: WorkerStats,
}

impl AlignerPool {
    pub fn new(
        view: Arc<HashBlockDatabaseView>,
        params: AlignmentParameters,
        search: SearchParameters,
        num_threads: usize,
    ) -> Result<Self> {
        let workers = (0..num_threads.max(1))
            .map(|_| {
                let mut worker = AlignerWorker::new(params.clone(), search.clone())?;
                worker.setup(Arc::clone(&view));
                Ok(worker)
            })
            .collect::<Result<Vec<_>>>()?;
        debug!("Aligner pool: {} workers", workers.len());
        Ok(Self {
            workers,
            stats: WorkerStats::default(),
        })
    }

    /// Point every worker at a newer snapshot of the database.
    pub fn setup(&mut self, view: Arc<HashBlockDatabaseView>) {
        for worker in &mut self.workers {
            worker.setup(Arc::clone(&view));
        }
    }

    pub fn num_threads(&self) -> usize {
        self.workers.len()
    }

    /// Accumulated statistics of every batch run so far.
    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Align one batch. Results are in the order of `queries`.
    pub fn align_all(&mut self, queries: &[Arc<Query>]) -> Result<Vec<QueryAlignments>> {
        if queries.is_empty() {
            return Ok(Vec::new());
        }
        let active = self.workers.len().min(queries.len());
        let mut idle = self.workers.split_off(active);
        let busy = std::mem::take(&mut self.workers);

        let (job_tx, job_rx) = bounded::<(usize, Arc<Query>)>(active * 2);
        let (result_tx, result_rx) = unbounded::<(usize, Result<QueryAlignments>)>();

        let returned: Vec<AlignerWorker> = thread::scope(|scope| {
            let handles: Vec<_> = busy
                .into_iter()
                .map(|mut worker| {
                    let job_rx = job_rx.clone();
                    let result_tx = result_tx.clone();
                    scope.spawn(move || {
                        worker.before_batch();
                        for (index, query) in job_rx {
                            if result_tx.send((index, worker.align(&query))).is_err() {
                                break;
                            }
                        }
                        worker.after_batch();
                        worker
                    })
                })
                .collect();
            drop(job_rx);
            drop(result_tx);

            for (index, query) in queries.iter().enumerate() {
                if job_tx.send((index, Arc::clone(query))).is_err() {
                    break;
                }
            }
            drop(job_tx);

            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                .collect()
        });

        let mut total = WorkerStats::default();
        for worker in returned.iter().chain(&idle) {
            total.merge(worker.total_stats());
        }
        self.workers = returned;
        self.workers.append(&mut idle);
        let previous_total = self.stats;
        self.stats = total;
        debug!(
            "Aligner pool batch: {} queries on {} threads, {} cache hits",
            self.stats.queries - previous_total.queries,
            active,
            self.stats.cache_hits - previous_total.cache_hits
        );

        let mut results: Vec<Option<QueryAlignments>> = (0..queries.len()).map(|_| None).collect();
        for (index, result) in result_rx {
            results[index] = Some(result?);
        }
        Ok(results.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::compute::encoding::SINGLE_BASES;
    use crate::pipelines::linear::index::database::{DatabaseConfig, HashBlockDatabase};
    use crate::pipelines::linear::index::sequence::Sequence;
    use crate::pipelines::linear::index::sequence_database::SequenceDatabase;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_results_keep_input_order() {
        let mut rng = StdRng::seed_from_u64(31);
        let reference: Vec<u8> = (0..4000).map(|_| SINGLE_BASES[rng.gen_range(0..4)]).collect();
        let mut db = HashBlockDatabase::new(
            SequenceDatabase::new(vec![Sequence::new("chr", reference.clone())], true),
            DatabaseConfig::default(),
        )
        .unwrap();
        db.require_set_up_through_size(128).unwrap();

        let starts = [3000usize, 100, 2200, 700, 1500, 3300, 40];
        let queries: Vec<Arc<Query>> = starts
            .iter()
            .map(|&s| Arc::new(Query::single(Sequence::new(format!("r{s}"), reference[s..s + 70].to_vec())).unwrap()))
            .collect();

        let mut pool = AlignerPool::new(db.view(), AlignmentParameters::default(), SearchParameters::default(), 3).unwrap();
        let results = pool.align_all(&queries).unwrap();
        assert_eq!(results.len(), starts.len());
        for (result, &start) in results.iter().zip(&starts) {
            assert_eq!(result.query.name(), format!("r{start}"));
            assert_eq!(result.best().unwrap().components[0].reference_range(), start..start + 70);
        }
        assert_eq!(pool.stats().queries, starts.len());
        assert_eq!(pool.num_threads(), 3);

        // A second batch reuses the same workers.
        let again = pool.align_all(&queries[..2]).unwrap();
        assert_eq!(again.len(), 2);
        assert_eq!(pool.stats().queries, starts.len() + 2);
        assert_eq!(pool.num_threads(), 3);
    }

    #[test]
    fn test_empty_batch() {
        let db = HashBlockDatabase::new(
            SequenceDatabase::new(vec![Sequence::from_text("a", b"ACGTACGT").unwrap()], true),
            DatabaseConfig::default(),
        )
        .unwrap();
        let mut pool = AlignerPool::new(db.view(), AlignmentParameters::default(), SearchParameters::default(), 2).unwrap();
        assert!(pool.align_all(&[]).unwrap().is_empty());
    }
}
