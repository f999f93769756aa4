use clap::Args;
use std::path::PathBuf;

use crate::error::{MapperError, Result};

// Mapping options: penalty model, candidate search limits and the CLI surface.

/// Penalty model and result filtering for alignment.
///
/// A gap of length `k` costs `start + k * extension`.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentParameters {
    pub mutation_penalty: f64,
    pub insertion_start_penalty: f64,
    pub insertion_extension_penalty: f64,
    pub deletion_start_penalty: f64,
    pub deletion_extension_penalty: f64,
    /// Maximum penalty per aligned query base.
    pub max_error_rate: f64,
    /// Cost scale for a base compared with an overlapping ambiguity code.
    pub ambiguity_penalty: f64,
    /// Cost per clipped query base beyond the free allowance.
    pub unaligned_penalty: f64,
    pub max_num_matches: usize,
    /// Keep alignments within this much of the best penalty.
    pub max_penalty_span: f64,
}

impl Default for AlignmentParameters {
    fn default() -> Self {
        Self {
            mutation_penalty: 1.0,
            insertion_start_penalty: 1.5,
            insertion_extension_penalty: 0.6,
            deletion_start_penalty: 1.5,
            deletion_extension_penalty: 0.1,
            max_error_rate: 0.1,
            ambiguity_penalty: 1.0,
            unaligned_penalty: 1.0,
            max_num_matches: 10,
            max_penalty_span: 0.0,
        }
    }
}

impl AlignmentParameters {
    /// Validate parameters, reporting every problem at once.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        let positive = [
            ("mutation_penalty", self.mutation_penalty),
            ("insertion_start_penalty", self.insertion_start_penalty),
            ("deletion_start_penalty", self.deletion_start_penalty),
            ("ambiguity_penalty", self.ambiguity_penalty),
            ("unaligned_penalty", self.unaligned_penalty),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                errors.push(format!("{name} must be a finite value > 0, got {value}"));
            }
        }
        // A free gap extension is allowed as long as opening one costs something.
        let non_negative = [
            ("insertion_extension_penalty", self.insertion_extension_penalty),
            ("deletion_extension_penalty", self.deletion_extension_penalty),
            ("max_error_rate", self.max_error_rate),
            ("max_penalty_span", self.max_penalty_span),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                errors.push(format!("{name} must be a finite value >= 0, got {value}"));
            }
        }
        if self.max_num_matches < 1 {
            errors.push(format!("max_num_matches must be >= 1, got {}", self.max_num_matches));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(MapperError::invalid("alignment parameters", errors.join("; ")))
        }
    }

    /// Largest penalty allowed for `aligned_length` query bases.
    pub fn max_penalty(&self, aligned_length: usize) -> f64 {
        self.max_error_rate * aligned_length as f64
    }

    /// Longest single gap affordable for a query of `query_length` bases.
    pub fn max_gap_length(&self, query_length: usize) -> usize {
        let budget = self.max_penalty(query_length);
        let longest = |start: f64, extension: f64| -> usize {
            if budget < start + extension {
                0
            } else if extension <= 0.0 {
                query_length
            } else {
                ((budget - start) / extension + 1e-9).floor() as usize
            }
        };
        longest(self.insertion_start_penalty, self.insertion_extension_penalty)
            .max(longest(self.deletion_start_penalty, self.deletion_extension_penalty))
            .min(query_length)
    }

    /// Stable text form, used to key cached results.
    pub fn cache_key(&self) -> String {
        format!(
            "mutation={:?};insertion={:?},{:?};deletion={:?},{:?};max_error_rate={:?};ambiguity={:?};unaligned={:?};max_num_matches={};max_penalty_span={:?}",
            self.mutation_penalty,
            self.insertion_start_penalty,
            self.insertion_extension_penalty,
            self.deletion_start_penalty,
            self.deletion_extension_penalty,
            self.max_error_rate,
            self.ambiguity_penalty,
            self.unaligned_penalty,
            self.max_num_matches,
            self.max_penalty_span,
        )
    }
}

/// Limits for candidate offset discovery.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParameters {
    /// Anchors with more reference hits than this are skipped.
    pub max_anchor_hits: usize,
    /// Offsets below `best * good_priority_fraction` are dropped.
    pub good_priority_fraction: f64,
    /// Candidate offsets examined per query.
    pub max_candidates: usize,
}

impl Default for SearchParameters {
    fn default() -> Self {
        Self {
            max_anchor_hits: 64,
            good_priority_fraction: 0.25,
            max_candidates: 32,
        }
    }
}

impl SearchParameters {
    pub fn validate(&self) -> Result<()> {
        if self.max_anchor_hits < 1 {
            return Err(MapperError::invalid("max_anchor_hits", "must be >= 1"));
        }
        if !(0.0..=1.0).contains(&self.good_priority_fraction) {
            return Err(MapperError::invalid(
                "good_priority_fraction",
                format!("must be in [0, 1], got {}", self.good_priority_fraction),
            ));
        }
        if self.max_candidates < 1 {
            return Err(MapperError::invalid("max_candidates", "must be >= 1"));
        }
        Ok(())
    }
}

/// Filters for downstream variant detection. Carried, not consumed, here.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationDetectionParameters {
    pub min_snp_depth: u32,
    pub min_snp_fraction: f64,
    pub min_indel_depth: u32,
    pub min_indel_fraction: f64,
}

impl Default for MutationDetectionParameters {
    fn default() -> Self {
        Self {
            min_snp_depth: 5,
            min_snp_fraction: 0.9,
            min_indel_depth: 5,
            min_indel_fraction: 0.9,
        }
    }
}

impl MutationDetectionParameters {
    pub fn validate(&self) -> Result<()> {
        for (name, fraction) in [
            ("min_snp_fraction", self.min_snp_fraction),
            ("min_indel_fraction", self.min_indel_fraction),
        ] {
            if !(0.0..=1.0).contains(&fraction) {
                return Err(MapperError::invalid(name, format!("must be in [0, 1], got {fraction}")));
            }
        }
        Ok(())
    }
}

/// Expected spacing between paired mates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpacingOverride {
    /// Expected inner distance (bases between the mates).
    pub mean: i64,
    /// Distance deviation that costs one penalty unit.
    pub deviation: f64,
}

/// Parse gap penalties "START,EXTENSION"
pub fn parse_gap_penalties(s: &str) -> std::result::Result<(f64, f64), String> {
    let parts: Vec<&str> = s.split(',').collect();
    match parts.as_slice() {
        [start, extension] => {
            let start = start
                .trim()
                .parse::<f64>()
                .map_err(|_| format!("Invalid gap start penalty: {}", start))?;
            let extension = extension
                .trim()
                .parse::<f64>()
                .map_err(|_| format!("Invalid gap extension penalty: {}", extension))?;
            Ok((start, extension))
        }
        _ => Err(format!("Gap penalty must be FLOAT,FLOAT: {}", s)),
    }
}

/// Parse paired spacing "MEAN,DEVIATION"
pub fn parse_spacing(s: &str) -> std::result::Result<SpacingOverride, String> {
    let parts: Vec<&str> = s.split(',').collect();
    match parts.as_slice() {
        [mean, deviation] => {
            let mean = mean
                .trim()
                .parse::<i64>()
                .map_err(|_| format!("Invalid spacing mean: {}", mean))?;
            let deviation = deviation
                .trim()
                .parse::<f64>()
                .map_err(|_| format!("Invalid spacing deviation: {}", deviation))?;
            if !(deviation.is_finite() && deviation > 0.0) {
                return Err(format!("Spacing deviation must be > 0: {}", s));
            }
            Ok(SpacingOverride { mean, deviation })
        }
        _ => Err(format!("Spacing must be INT,FLOAT: {}", s)),
    }
}

#[derive(Debug, Clone, Args)]
pub struct MapCliOptions {
    /// Reference sequences (FASTA, optionally gzipped)
    #[arg(short = 'r', long, value_name = "REF.FA")]
    pub reference: PathBuf,

    /// Query reads (FASTQ or FASTA, optionally gzipped)
    #[arg(short = 'q', long, value_name = "READS.FQ")]
    pub queries: PathBuf,

    /// Second mates for paired-end queries
    #[arg(long, value_name = "READS2.FQ", requires = "spacing")]
    pub paired_queries: Option<PathBuf>,

    /// Expected inner distance between mates and the deviation costing one penalty unit
    #[arg(long, value_name = "INT,FLOAT", value_parser = parse_spacing)]
    pub spacing: Option<SpacingOverride>,

    // ===== Penalty Options =====
    /// Penalty for a substitution
    #[arg(long, value_name = "FLOAT", default_value_t = 1.0)]
    pub mutation_penalty: f64,

    /// Insertion penalties: start and per-base extension
    #[arg(long, value_name = "FLOAT,FLOAT", default_value = "1.5,0.6")]
    pub insertion_penalty: String,

    /// Deletion penalties: start and per-base extension
    #[arg(long, value_name = "FLOAT,FLOAT", default_value = "1.5,0.1")]
    pub deletion_penalty: String,

    /// Maximum penalty per aligned query base
    #[arg(short = 'e', long, value_name = "FLOAT", default_value_t = 0.1)]
    pub max_error_rate: f64,

    /// Penalty scale for ambiguity codes
    #[arg(long, value_name = "FLOAT", default_value_t = 1.0)]
    pub ambiguity_penalty: f64,

    /// Penalty per clipped query base
    #[arg(long, value_name = "FLOAT", default_value_t = 1.0)]
    pub unaligned_penalty: f64,

    /// Maximum alignments reported per query
    #[arg(short = 'N', long, value_name = "INT", default_value_t = 10)]
    pub max_num_matches: usize,

    /// Report alignments within this penalty of the best
    #[arg(long, value_name = "FLOAT", default_value_t = 0.0)]
    pub max_penalty_span: f64,

    // ===== Search Options =====
    /// Skip anchors with more reference hits than this
    #[arg(long, value_name = "INT", default_value_t = 64)]
    pub max_anchor_hits: usize,

    /// Candidate offsets examined per query
    #[arg(long, value_name = "INT", default_value_t = 32)]
    pub max_candidates: usize,

    // ===== Output Options =====
    /// Output file (default: stdout)
    #[arg(short = 'o', long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Verbosity level (1=error, 2=warning, 3=info, 4=debug, 5=trace)
    #[arg(short = 'v', long, value_name = "INT", default_value_t = 3)]
    pub verbosity: i32,

    // ===== Processing Options =====
    /// Number of threads (default: all available cores)
    #[arg(short = 't', long, value_name = "INT")]
    pub threads: Option<usize>,

    /// Queries aligned per batch
    #[arg(long, value_name = "INT", default_value_t = 4096)]
    pub batch_size: usize,
}

impl MapCliOptions {
    pub fn alignment_parameters(&self) -> Result<AlignmentParameters> {
        let (insertion_start, insertion_extension) =
            parse_gap_penalties(&self.insertion_penalty).map_err(|e| MapperError::invalid("insertion_penalty", e))?;
        let (deletion_start, deletion_extension) =
            parse_gap_penalties(&self.deletion_penalty).map_err(|e| MapperError::invalid("deletion_penalty", e))?;
        let params = AlignmentParameters {
            mutation_penalty: self.mutation_penalty,
            insertion_start_penalty: insertion_start,
            insertion_extension_penalty: insertion_extension,
            deletion_start_penalty: deletion_start,
            deletion_extension_penalty: deletion_extension,
            max_error_rate: self.max_error_rate,
            ambiguity_penalty: self.ambiguity_penalty,
            unaligned_penalty: self.unaligned_penalty,
            max_num_matches: self.max_num_matches,
            max_penalty_span: self.max_penalty_span,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn search_parameters(&self) -> Result<SearchParameters> {
        let search = SearchParameters {
            max_anchor_hits: self.max_anchor_hits,
            max_candidates: self.max_candidates,
            ..SearchParameters::default()
        };
        search.validate()?;
        Ok(search)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let params = AlignmentParameters::default();
        assert_eq!(params.mutation_penalty, 1.0);
        assert_eq!(params.insertion_start_penalty, 1.5);
        assert_eq!(params.insertion_extension_penalty, 0.6);
        assert_eq!(params.deletion_start_penalty, 1.5);
        assert_eq!(params.deletion_extension_penalty, 0.1);
        assert_eq!(params.max_error_rate, 0.1);
        assert_eq!(params.max_penalty_span, 0.0);
        assert!(params.validate().is_ok());
        assert!(SearchParameters::default().validate().is_ok());
        assert!(MutationDetectionParameters::default().validate().is_ok());
    }

    #[test]
    fn test_validate_collects_errors() {
        let params = AlignmentParameters {
            mutation_penalty: -1.0,
            max_error_rate: f64::NAN,
            max_num_matches: 0,
            ..AlignmentParameters::default()
        };
        match params.validate() {
            Err(MapperError::InvalidParameter { reason, .. }) => {
                assert!(reason.contains("mutation_penalty"));
                assert!(reason.contains("max_error_rate"));
                assert!(reason.contains("max_num_matches"));
            }
            other => panic!("expected InvalidParameter, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_penalties_rejected() {
        let params = AlignmentParameters {
            mutation_penalty: 0.0,
            ..AlignmentParameters::default()
        };
        assert!(matches!(params.validate(), Err(MapperError::InvalidParameter { .. })));

        let params = AlignmentParameters {
            insertion_start_penalty: 0.0,
            deletion_start_penalty: 0.0,
            ambiguity_penalty: 0.0,
            unaligned_penalty: 0.0,
            ..AlignmentParameters::default()
        };
        match params.validate() {
            Err(MapperError::InvalidParameter { reason, .. }) => {
                for name in ["insertion_start_penalty", "deletion_start_penalty", "ambiguity_penalty", "unaligned_penalty"] {
                    assert!(reason.contains(name), "{name} missing from {reason}");
                }
                assert!(!reason.contains("mutation_penalty"));
            }
            other => panic!("expected InvalidParameter, got {other:?}"),
        }

        // Free extension and an exact-match-only error rate stay valid.
        let params = AlignmentParameters {
            insertion_extension_penalty: 0.0,
            deletion_extension_penalty: 0.0,
            max_error_rate: 0.0,
            ..AlignmentParameters::default()
        };
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_max_gap_length() {
        let params = AlignmentParameters::default();
        // Budget 2.6: deletions reach (2.6 - 1.5) / 0.1 = 11 bases.
        assert_eq!(params.max_gap_length(26), 11);
        // Budget 1.0 cannot pay for any gap.
        assert_eq!(params.max_gap_length(10), 0);
        let free_extension = AlignmentParameters {
            deletion_extension_penalty: 0.0,
            ..AlignmentParameters::default()
        };
        assert_eq!(free_extension.max_gap_length(20), 20);
    }

    #[test]
    fn test_cache_key_is_stable_and_distinguishing() {
        let a = AlignmentParameters::default();
        let b = AlignmentParameters {
            ambiguity_penalty: 0.5,
            ..AlignmentParameters::default()
        };
        assert_eq!(a.cache_key(), AlignmentParameters::default().cache_key());
        assert_ne!(a.cache_key(), b.cache_key());
        assert!(a.cache_key().starts_with("mutation=1.0;"));
    }

    #[test]
    fn test_parse_gap_penalties() {
        assert_eq!(parse_gap_penalties("1.5,0.6"), Ok((1.5, 0.6)));
        assert!(parse_gap_penalties("1.5").is_err());
        assert!(parse_gap_penalties("x,1").is_err());
    }

    #[test]
    fn test_parse_spacing() {
        assert_eq!(parse_spacing("200,25"), Ok(SpacingOverride { mean: 200, deviation: 25.0 }));
        assert!(parse_spacing("200,0").is_err());
        assert!(parse_spacing("200").is_err());
        assert!(parse_spacing("-20,3.5").is_ok());
    }
}
