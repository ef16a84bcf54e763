mod defaults;

use camino::Utf8PathBuf;
use clap::Parser;
use simple_error::{bail, SimpleResult};

use self::defaults::*;

/// Parse a `SAMPLE=PATH` command line argument
fn parse_sample_file_arg(arg: &str) -> Result<(String, Utf8PathBuf), String> {
    match arg.split_once('=') {
        Some((sample_name, path)) if !sample_name.is_empty() && !path.is_empty() => {
            Ok((sample_name.to_string(), Utf8PathBuf::from(path)))
        }
        _ => Err("expected SAMPLE=PATH".to_string()),
    }
}

#[derive(Parser)]
#[command(
    author,
    version,
    about,
    help_template = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}"
)]
#[clap(rename_all = "kebab_case")]
pub struct Settings {
    /// Directory for all command output (must not already exist)
    #[arg(long, value_name = "DIR", default_value = "kindred_output")]
    pub output_dir: Utf8PathBuf,

    /// Per-sample segmentation input. Can be specified multiple times to
    /// call over multiple samples.
    #[arg(long, value_name = "SAMPLE=PATH", required = true, value_parser = parse_sample_file_arg)]
    pub segments: Vec<(String, Utf8PathBuf)>,

    /// Per-sample SNV B-allele observation input
    #[arg(long, value_name = "SAMPLE=PATH", value_parser = parse_sample_file_arg)]
    pub allele_counts: Vec<(String, Utf8PathBuf)>,

    /// Pedigree file enabling the joint family transmission model.
    ///
    /// Without a pedigree all samples are called under the independent model.
    ///
    #[arg(long, value_name = "FILE")]
    pub pedigree: Option<Utf8PathBuf>,

    /// Expected-ploidy bed file overriding the diploid default per interval
    #[arg(long, value_name = "FILE")]
    pub ploidy_bed: Option<Utf8PathBuf>,

    /// Bed file of common CNV regions used to build alternative segmentations
    #[arg(long, value_name = "FILE")]
    pub common_cnv_bed: Option<Utf8PathBuf>,

    /// Number of threads to use. Defaults to all logical cpus detected,
    /// bounded by --max-core-number.
    #[arg(long = "threads", value_name = "THREAD_COUNT")]
    thread_count_option: Option<usize>,

    /// This value will be filled in by thread_count_option
    #[arg(hide = true, default_value_t = 0)]
    pub thread_count: usize,

    /// Overwrite an existing output directory
    #[arg(long)]
    pub clobber: bool,

    /// Turn on extra debug logging
    #[arg(long)]
    pub debug: bool,

    /// Copy number states are modeled in [0, max-copy-number)
    #[arg(hide = true, long, default_value_t = MAX_COPY_NUMBER)]
    pub max_copy_number: usize,

    /// Upper bound on the default worker thread count
    #[arg(hide = true, long, default_value_t = MAX_CORE_NUMBER)]
    pub max_core_number: usize,

    /// Cap on the enumerated offspring genotype vector list
    #[arg(hide = true, long, default_value_t = MAX_OFFSPRING_GENOTYPES)]
    pub max_offspring_genotypes: usize,

    /// Seed for offspring genotype subsampling, making large-pedigree runs
    /// reproducible
    #[arg(hide = true, long, default_value_t = GENOTYPE_SUBSAMPLE_SEED)]
    pub genotype_subsample_seed: u64,

    /// Largest allele-set size for no-pedigree copy number combinations
    #[arg(hide = true, long, default_value_t = MAX_ALLELE_NUMBER)]
    pub max_allele_number: usize,

    /// Probability of an offspring allele count unreachable from either parent
    #[arg(hide = true, long, default_value_t = DE_NOVO_RATE)]
    pub de_novo_rate: f64,

    /// Minimum het SNV observations per sample for allele evidence to be used
    #[arg(hide = true, long, default_value_t = READ_COUNTS_THRESHOLD)]
    pub read_counts_threshold: usize,

    /// Allele density in observations per kb below which segments are
    /// reported in debug logging
    #[arg(hide = true, long, default_value_t = ALLELE_DENSITY_THRESHOLD)]
    pub allele_density_threshold: f64,

    /// At most this many SNV observations are scored per segment
    #[arg(hide = true, long, default_value_t = PER_SEGMENT_ALLELE_MAX_COUNTS)]
    pub per_segment_allele_max_counts: usize,

    /// Minimum total reads for one SNV observation to be loaded
    #[arg(hide = true, long, default_value_t = MEDIAN_COVERAGE_THRESHOLD)]
    pub median_coverage_threshold: u32,

    /// Bins trimmed from each segment end before the median coverage is taken
    #[arg(hide = true, long, default_value_t = NUMBER_OF_TRIMMED_BINS)]
    pub number_of_trimmed_bins: usize,

    /// Coverage observations are capped at this multiple of the sample mean
    #[arg(hide = true, long, default_value_t = MAX_COVERAGE_FACTOR)]
    pub max_coverage_factor: f64,

    /// Max quality score for all quality outputs
    #[arg(hide = true, long, default_value_t = MAX_QSCORE)]
    pub max_qscore: f64,

    /// Minimum quality score below which calls are marked as filtered
    #[arg(long, default_value_t = QUALITY_FILTER_THRESHOLD)]
    pub quality_filter_threshold: f64,

    /// Minimum de novo quality score for reporting
    #[arg(long, default_value_t = DE_NOVO_QUALITY_FILTER_THRESHOLD)]
    pub de_novo_quality_filter_threshold: f64,

    /// Calls below this size receive a length filter label
    #[arg(long, default_value_t = MINIMUM_CALL_SIZE)]
    pub minimum_call_size: i64,

    /// Largest gap in bases bridged by the final segment merge
    #[arg(hide = true, long, default_value_t = MAX_MERGE_GAP)]
    pub max_merge_gap: i64,
}

/// Checks if a directory does not exist
///
pub fn check_novel_dirname(dirname: &Utf8PathBuf, label: &str) -> SimpleResult<()> {
    if dirname.exists() {
        bail!("{} already exists: \"{}\"", label, dirname);
    }
    Ok(())
}

/// Validate settings and update parameters that can't be processed by clap
///
pub fn validate_and_fix_settings_impl(mut settings: Settings) -> SimpleResult<Settings> {
    settings.thread_count = match settings.thread_count_option {
        Some(count) => {
            if count == 0 {
                bail!("--threads argument must be greater than 0");
            }
            count
        }
        None => std::cmp::min(num_cpus::get(), settings.max_core_number),
    };

    if settings.max_copy_number <= 2 {
        bail!("--max-copy-number must be greater than 2");
    }
    if settings.max_offspring_genotypes == 0 {
        bail!("--max-offspring-genotypes must be greater than 0");
    }
    if settings.max_allele_number == 0 {
        bail!("--max-allele-number must be greater than 0");
    }

    // Check for repeated sample names and missing input files
    let mut sample_names = std::collections::HashSet::new();
    for (sample_name, _) in settings.segments.iter() {
        if !sample_names.insert(sample_name.as_str()) {
            bail!("Duplicated sample name in --segments: '{sample_name}'");
        }
    }

    let mut input_files = settings
        .segments
        .iter()
        .chain(settings.allele_counts.iter())
        .map(|(_, path)| path)
        .collect::<Vec<_>>();
    input_files.extend(
        [
            settings.pedigree.as_ref(),
            settings.ploidy_bed.as_ref(),
            settings.common_cnv_bed.as_ref(),
        ]
        .into_iter()
        .flatten(),
    );
    for filename in input_files {
        if !filename.is_file() {
            bail!("Input file does not exist: '{filename}'");
        }
    }

    Ok(settings)
}

/// Validate settings and update to parameters that can't be processed
/// automatically by clap.
///
pub fn validate_and_fix_settings(settings: Settings) -> Settings {
    match validate_and_fix_settings_impl(settings) {
        Ok(settings) => settings,
        Err(msg) => {
            eprintln!("Invalid command-line setting: {}", msg);
            std::process::exit(exitcode::USAGE);
        }
    }
}

pub fn parse_settings() -> Settings {
    Settings::parse()
}
