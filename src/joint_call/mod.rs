mod cohort_caller;
mod haplotype_select;
mod merge;
mod pedigree_caller;

use std::ops::Range;
use std::sync::mpsc::channel;
use std::time::Instant;

pub use self::cohort_caller::CohortCaller;
use self::haplotype_select::select_haplotype;
pub use self::merge::merge_called_segments;
pub use self::pedigree_caller::PedigreeCaller;

use log::{debug, info};

use crate::cli::Settings;
use crate::depth_model::DepthLikelihoodModel;
use crate::genotype::Genotype;
use crate::read_inputs::CallInputs;
use crate::run_stats::{write_call_run_stats, CallRunStats};
use crate::sample::Sample;
use crate::segment::{Haplotype, MultiSampleSegment, SampleSegmentData, SegmentSet};
use crate::vcf_output::write_cnv_vcf_files;

/// Read-only calling parameters shared across worker threads
#[derive(Clone, Debug)]
pub struct CallerParams {
    /// Copy number states are restricted to [0, max_copy_number)
    pub max_copy_number: usize,

    /// Cap on the enumerated offspring genotype vector list
    pub max_offspring_genotypes: usize,

    /// Seed for offspring genotype subsampling
    pub genotype_subsample_seed: u64,

    /// Largest allele-set size used for no-pedigree copy number combinations
    pub max_allele_number: usize,

    /// Probability of an offspring allele count unreachable from either parent
    pub de_novo_rate: f64,

    /// Minimum het SNV observations per sample for allele evidence to be used
    pub read_counts_threshold: usize,

    /// Allele density (observations per kb) below which segments are
    /// reported in debug logging
    pub allele_density_threshold: f64,

    /// At most this many SNV observations are scored per segment
    pub per_segment_allele_max_counts: usize,

    /// Minimum total reads for one SNV observation to be loaded
    pub median_coverage_threshold: u32,

    /// Bins trimmed from each segment end before the median coverage is taken
    pub number_of_trimmed_bins: usize,

    /// Coverage observations are capped at this multiple of the sample mean
    pub max_coverage_factor: f64,

    pub max_qscore: f64,
    pub quality_filter_threshold: f64,
    pub de_novo_quality_filter_threshold: f64,

    /// Calls below this size receive a length filter label
    pub minimum_call_size: i64,

    /// Largest gap in bases bridged by the final segment merge
    pub max_merge_gap: i64,
}

impl CallerParams {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_copy_number: settings.max_copy_number,
            max_offspring_genotypes: settings.max_offspring_genotypes,
            genotype_subsample_seed: settings.genotype_subsample_seed,
            max_allele_number: settings.max_allele_number,
            de_novo_rate: settings.de_novo_rate,
            read_counts_threshold: settings.read_counts_threshold,
            allele_density_threshold: settings.allele_density_threshold,
            per_segment_allele_max_counts: settings.per_segment_allele_max_counts,
            median_coverage_threshold: settings.median_coverage_threshold,
            number_of_trimmed_bins: settings.number_of_trimmed_bins,
            max_coverage_factor: settings.max_coverage_factor,
            max_qscore: settings.max_qscore,
            quality_filter_threshold: settings.quality_filter_threshold,
            de_novo_quality_filter_threshold: settings.de_novo_quality_filter_threshold,
            minimum_call_size: settings.minimum_call_size,
            max_merge_gap: settings.max_merge_gap,
        }
    }
}

/// Copy number inference over one multi-sample segment
///
/// `call` assigns copy numbers and returns the maximum joint likelihood with
/// whatever evidence the downstream quality pass needs; the three methods run
/// in strict sequence on the same worker for each segment.
///
pub trait SegmentCaller: Sync {
    type Evidence: Send;

    fn call(&self, segment: &mut MultiSampleSegment) -> (f64, Self::Evidence);

    fn assign_qualities(&self, segment: &mut MultiSampleSegment, evidence: &Self::Evidence);

    fn assign_major_chrom_counts(&self, segment: &mut MultiSampleSegment);
}

/// Partition [0, set_count) into contiguous worker ranges
///
/// Each range spans step+1 indices for step = set_count / worker_count, with
/// the final range closed at set_count-1.
///
pub fn partition_segment_set_ranges(set_count: usize, worker_count: usize) -> Vec<Range<usize>> {
    assert!(worker_count > 0);

    let mut ranges = Vec::new();
    if set_count == 0 {
        return ranges;
    }

    let step = set_count / worker_count;
    let mut start = 0;
    while start < set_count {
        let end = std::cmp::min(start + step + 1, set_count);
        ranges.push(start..end);
        start = end;
    }
    ranges
}

/// Run calling, haplotype selection, and quality assignment on one segment set
fn process_segment_set<C: SegmentCaller>(caller: &C, segment_set: &mut SegmentSet) {
    let haplotypes = [Haplotype::A, Haplotype::B];

    let mut evidence: [Option<Vec<(f64, C::Evidence)>>; 2] = [None, None];
    for (slot, &haplotype) in haplotypes.iter().enumerate() {
        if let Some(segments) = segment_set.haplotype_segments_mut(haplotype) {
            evidence[slot] = Some(
                segments
                    .iter_mut()
                    .map(|segment| caller.call(segment))
                    .collect(),
            );
        }
    }

    fn max_likelihoods<E>(evidence: &Option<Vec<(f64, E)>>) -> Option<Vec<f64>> {
        evidence
            .as_ref()
            .map(|x| x.iter().map(|(likelihood, _)| *likelihood).collect())
    }
    let likelihoods_a = max_likelihoods(&evidence[0]);
    let likelihoods_b = max_likelihoods(&evidence[1]);
    let selected = select_haplotype(likelihoods_a.as_deref(), likelihoods_b.as_deref());
    segment_set.select(selected);

    let selected_slot = match selected {
        Haplotype::A => 0,
        Haplotype::B => 1,
    };
    let selected_evidence = evidence[selected_slot].take().unwrap();
    let segments = segment_set.haplotype_segments_mut(selected).unwrap();
    for (segment, (_, segment_evidence)) in segments.iter_mut().zip(selected_evidence.iter()) {
        caller.assign_qualities(segment, segment_evidence);
        caller.assign_major_chrom_counts(segment);
    }
}

/// Run the segment-set sweep over multiple worker threads
///
/// Segment sets are split into contiguous index ranges and moved into the
/// workers, so no mutable state is shared while the sweep runs.
///
pub fn call_all_segment_sets<C: SegmentCaller>(
    caller: &C,
    segment_sets: Vec<SegmentSet>,
    worker_count: usize,
) -> Vec<SegmentSet> {
    let set_count = segment_sets.len();
    if set_count == 0 {
        return segment_sets;
    }

    let ranges = partition_segment_set_ranges(set_count, worker_count);

    let mut chunks = Vec::with_capacity(ranges.len());
    let mut rest = segment_sets;
    for range in ranges.iter().rev() {
        chunks.push(rest.split_off(range.start));
    }
    chunks.reverse();

    let worker_pool = rayon::ThreadPoolBuilder::new()
        .num_threads(worker_count)
        .build()
        .unwrap();

    let (tx, rx) = channel();
    worker_pool.scope(move |scope| {
        for (chunk_index, mut chunk) in chunks.into_iter().enumerate() {
            let tx = tx.clone();
            scope.spawn(move |_| {
                for segment_set in chunk.iter_mut() {
                    process_segment_set(caller, segment_set);
                }
                tx.send((chunk_index, chunk)).unwrap();
            });
        }
    });

    let mut called_chunks: Vec<(usize, Vec<SegmentSet>)> = rx.iter().collect();
    called_chunks.sort_by_key(|(chunk_index, _)| *chunk_index);
    called_chunks
        .into_iter()
        .flat_map(|(_, chunk)| chunk)
        .collect()
}

/// Major chromosome count of copy numbers with a fixed allele split
///
/// For copy numbers above 2 the MCC comes from the assigned genotype instead.
///
pub(super) fn default_major_chrom_count(copy_number: usize) -> usize {
    if copy_number == 2 {
        1
    } else {
        copy_number
    }
}

/// True when every sample has enough het SNV observations for allele
/// evidence to refine the segment's MCC assignments
///
/// Allele density is evaluated for diagnostics only; the decision rests on
/// the per-sample observation counts alone.
///
pub(super) fn use_allele_information(
    segment: &MultiSampleSegment,
    read_counts_threshold: usize,
    allele_density_threshold: f64,
) -> bool {
    let kilobases = segment.segment.range.size() as f64 / 1000.0;
    let min_density = segment
        .samples
        .iter()
        .map(|sample_data| sample_data.allele_counts.len() as f64 / kilobases)
        .fold(f64::INFINITY, f64::min);
    if min_density < allele_density_threshold {
        debug!(
            "Low allele density {min_density:.3}/kb at {:?}",
            segment.segment
        );
    }

    segment
        .samples
        .iter()
        .all(|sample_data| sample_data.allele_counts.len() >= read_counts_threshold)
}

/// SNV observations to score for one sample, bounded by the per-segment cap
pub(super) fn capped_allele_counts(
    sample_data: &SampleSegmentData,
    per_segment_allele_max_counts: usize,
) -> &[(u32, u32)] {
    let count = std::cmp::min(sample_data.allele_counts.len(), per_segment_allele_max_counts);
    &sample_data.allele_counts[..count]
}

/// Assign one sample's MCC by maximum allele-count likelihood
pub(super) fn assign_independent_mcc(
    depth_model: &dyn DepthLikelihoodModel,
    genotypes_by_cn: &[Vec<Genotype>],
    sample_data: &mut SampleSegmentData,
    per_segment_allele_max_counts: usize,
) {
    let copy_number = sample_data.call.copy_number;
    let major_chrom_count = if copy_number > 2 {
        let allele_counts = capped_allele_counts(sample_data, per_segment_allele_max_counts);
        let candidates = &genotypes_by_cn[copy_number];
        let best = depth_model
            .best_genotype(allele_counts, candidates)
            .unwrap();
        candidates[best.index].major_count()
    } else {
        default_major_chrom_count(copy_number)
    };
    sample_data.call.major_chrom_count = Some(major_chrom_count);
}

/// Median segment coverage for one sample, capped by the sample's maximum
pub(super) fn capped_coverage(
    sample: &Sample,
    sample_data: &SampleSegmentData,
    number_of_trimmed_bins: usize,
) -> f64 {
    sample_data
        .median_coverage(number_of_trimmed_bins)
        .min(sample.max_coverage)
}

/// Call, merge, and report copy number variants over all segment sets
pub fn run_joint_call(settings: &Settings, inputs: CallInputs) {
    let params = CallerParams::from_settings(settings);
    let CallInputs {
        chrom_list,
        samples,
        pedigree,
        segment_sets,
    } = inputs;

    let mut run_stats = CallRunStats {
        sample_count: samples.len(),
        segment_set_count: segment_sets.len(),
        alternative_haplotype_count: segment_sets
            .iter()
            .filter(|x| x.haplotype_b.is_some())
            .count(),
        ..Default::default()
    };

    let start = Instant::now();
    let called_sets = match &pedigree {
        Some(pedigree) => {
            info!(
                "Starting pedigree copy number calling on {} segment sets",
                run_stats.segment_set_count
            );
            let caller = PedigreeCaller::new(&samples, pedigree, &params);
            call_all_segment_sets(&caller, segment_sets, settings.thread_count)
        }
        None => {
            info!(
                "Starting independent copy number calling on {} segment sets",
                run_stats.segment_set_count
            );
            let caller = CohortCaller::new(&samples, &params);
            call_all_segment_sets(&caller, segment_sets, settings.thread_count)
        }
    };
    run_stats.total_call_time_secs = start.elapsed().as_secs_f64();
    info!("Finished copy number calling on all segment sets");

    let merged_segments = merge_called_segments(called_sets, &params);
    run_stats.merged_segment_count = merged_segments.len();
    run_stats.de_novo_candidate_count = merged_segments
        .iter()
        .flat_map(|segment| segment.samples.iter())
        .filter(|sample_data| {
            sample_data
                .call
                .de_novo_qscore
                .is_some_and(|dqs| dqs >= params.de_novo_quality_filter_threshold)
        })
        .count();

    write_cnv_vcf_files(
        &settings.output_dir,
        &chrom_list,
        &samples,
        &merged_segments,
        &params,
    );

    write_call_run_stats(&settings.output_dir, &run_stats);
}
