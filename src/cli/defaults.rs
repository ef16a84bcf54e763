//! Default values for calling parameters exposed on the command line
//!

/// Copy number states are modeled in [0, MAX_COPY_NUMBER)
pub const MAX_COPY_NUMBER: usize = 5;

/// Worker thread count is clamped to this value when not set explicitly
pub const MAX_CORE_NUMBER: usize = 30;

/// Cap on the enumerated offspring genotype vector list
pub const MAX_OFFSPRING_GENOTYPES: usize = 500;

/// Seed for the offspring genotype subsampling generator
pub const GENOTYPE_SUBSAMPLE_SEED: u64 = 42;

/// Largest allele-set size for no-pedigree copy number combinations
pub const MAX_ALLELE_NUMBER: usize = 3;

/// Probability of an offspring allele count unreachable from either parent
pub const DE_NOVO_RATE: f64 = 1e-6;

/// Minimum het SNV observations per sample for allele evidence to be used
pub const READ_COUNTS_THRESHOLD: usize = 4;

/// Allele density (observations per kb) below which segments are reported in
/// debug logging; the allele-evidence decision itself rests on observation
/// counts
pub const ALLELE_DENSITY_THRESHOLD: f64 = 0.1;

/// At most this many SNV observations are scored per segment
pub const PER_SEGMENT_ALLELE_MAX_COUNTS: usize = 100;

/// Minimum total reads for one SNV observation to be loaded
pub const MEDIAN_COVERAGE_THRESHOLD: u32 = 4;

/// Bins trimmed from each segment end before the median coverage is taken
pub const NUMBER_OF_TRIMMED_BINS: usize = 2;

/// Coverage observations are capped at this multiple of the sample mean
pub const MAX_COVERAGE_FACTOR: f64 = 3.0;

/// Maximum value for all phred-scaled quality outputs
pub const MAX_QSCORE: f64 = 60.0;

/// Calls with quality below this value are marked as filtered
pub const QUALITY_FILTER_THRESHOLD: f64 = 7.0;

/// De novo qualities below this value are not reported
pub const DE_NOVO_QUALITY_FILTER_THRESHOLD: f64 = 20.0;

/// Calls below this size receive a length filter label
pub const MINIMUM_CALL_SIZE: i64 = 0;

/// Largest gap in bases bridged by the final segment merge
pub const MAX_MERGE_GAP: i64 = 10_000;
