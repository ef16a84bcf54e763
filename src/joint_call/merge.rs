use super::CallerParams;
use crate::genome_segment::{get_segment_distance, GenomeSegment};
use crate::segment::{MultiSampleSegment, SegmentSet};

/// True when two adjacent segments carry an identical copy number call in
/// every sample and sit within the merge gap
fn is_mergeable(
    previous: &MultiSampleSegment,
    next: &MultiSampleSegment,
    max_merge_gap: i64,
) -> bool {
    let within_gap = match get_segment_distance(&previous.segment, &next.segment) {
        Some(distance) => distance as i64 <= max_merge_gap,
        None => false,
    };
    within_gap
        && previous
            .samples
            .iter()
            .zip(next.samples.iter())
            .all(|(a, b)| a.call.copy_number == b.call.copy_number)
}

/// Collapse a run of mergeable segments into a single segment
///
/// Copy numbers carry over unchanged; QS and DQS average over the inputs
/// (DQS over the inputs defining it), and MCC survives only when identical
/// across the run.
///
fn merge_segment_run(mut run: Vec<MultiSampleSegment>) -> MultiSampleSegment {
    if run.len() == 1 {
        return run.pop().unwrap();
    }

    let segment = GenomeSegment::new(
        run[0].segment.chrom_index,
        run[0].segment.range.start,
        run.last().unwrap().segment.range.end,
    );

    let sample_count = run[0].samples.len();
    let mut merged_samples = Vec::with_capacity(sample_count);
    for sample_index in 0..sample_count {
        let mut merged = run[0].samples[sample_index].clone();
        merged.bin_depths.clear();
        merged.allele_counts.clear();

        let mut qscore_sum = 0.0;
        let mut dqs_sum = 0.0;
        let mut dqs_count = 0usize;
        let mut uniform_mcc = merged.call.major_chrom_count;
        for input in run.iter() {
            let sample_data = &input.samples[sample_index];
            merged.bin_depths.extend_from_slice(&sample_data.bin_depths);
            merged
                .allele_counts
                .extend_from_slice(&sample_data.allele_counts);
            qscore_sum += sample_data.call.qscore;
            if let Some(dqs) = sample_data.call.de_novo_qscore {
                dqs_sum += dqs;
                dqs_count += 1;
            }
            if sample_data.call.major_chrom_count != uniform_mcc {
                uniform_mcc = None;
            }
        }

        merged.call.qscore = qscore_sum / run.len() as f64;
        merged.call.de_novo_qscore = match dqs_count {
            0 => None,
            _ => Some(dqs_sum / dqs_count as f64),
        };
        merged.call.major_chrom_count = uniform_mcc;
        merged_samples.push(merged);
    }

    MultiSampleSegment {
        segment,
        samples: merged_samples,
    }
}

/// Apply quality and call-size filter labels to a final segment
fn assign_filters(segment: &mut MultiSampleSegment, params: &CallerParams) {
    let undersized = segment.segment.range.size() < params.minimum_call_size;
    for sample_data in segment.samples.iter_mut() {
        let mut labels = Vec::new();
        if sample_data.call.qscore < params.quality_filter_threshold {
            labels.push(format!("q{:.0}", params.quality_filter_threshold));
        }
        if undersized {
            labels.push(format!("L{}", params.minimum_call_size));
        }
        sample_data.call.filter = match labels.is_empty() {
            true => None,
            false => Some(labels.join(";")),
        };
    }
}

/// Merge the called segments of all segment sets into the final call list
///
/// The selected haplotype's segments from every set are concatenated, sorted
/// by genomic position, and adjacent segments sharing an identical
/// multi-sample copy number vector within the merge gap are collapsed.
///
pub fn merge_called_segments(
    segment_sets: Vec<SegmentSet>,
    params: &CallerParams,
) -> Vec<MultiSampleSegment> {
    let mut segments = segment_sets
        .into_iter()
        .flat_map(|segment_set| segment_set.into_selected_segments())
        .collect::<Vec<_>>();
    segments.sort_by(|a, b| a.segment.cmp(&b.segment));

    let mut merged = Vec::new();
    let mut run: Vec<MultiSampleSegment> = Vec::new();
    for segment in segments {
        if let Some(last) = run.last() {
            if !is_mergeable(last, &segment, params.max_merge_gap) {
                merged.push(merge_segment_run(std::mem::take(&mut run)));
            }
        }
        run.push(segment);
    }
    if !run.is_empty() {
        merged.push(merge_segment_run(run));
    }

    for segment in merged.iter_mut() {
        assign_filters(segment, params);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::{SampleSegmentData, SegmentCall};

    fn test_params() -> CallerParams {
        CallerParams {
            max_copy_number: 5,
            max_offspring_genotypes: 500,
            genotype_subsample_seed: 42,
            max_allele_number: 3,
            de_novo_rate: 1e-6,
            read_counts_threshold: 4,
            allele_density_threshold: 0.1,
            per_segment_allele_max_counts: 100,
            median_coverage_threshold: 4,
            number_of_trimmed_bins: 0,
            max_coverage_factor: 3.0,
            max_qscore: 60.0,
            quality_filter_threshold: 7.0,
            de_novo_quality_filter_threshold: 20.0,
            minimum_call_size: 1000,
            max_merge_gap: 10_000,
        }
    }

    fn make_segment(start: i64, end: i64, copy_numbers: &[usize], qscores: &[f64]) -> MultiSampleSegment {
        MultiSampleSegment {
            segment: GenomeSegment::new(0, start, end),
            samples: copy_numbers
                .iter()
                .zip(qscores.iter())
                .map(|(&copy_number, &qscore)| SampleSegmentData {
                    call: SegmentCall {
                        copy_number,
                        qscore,
                        ..Default::default()
                    },
                    ..Default::default()
                })
                .collect(),
        }
    }

    fn selected_set(segment: MultiSampleSegment) -> SegmentSet {
        let mut segment_set = SegmentSet::from_single(segment);
        segment_set.select(crate::segment::Haplotype::A);
        segment_set
    }

    /// Three adjacent segments with identical calls collapse to one with the
    /// mean quality
    #[test]
    fn test_merge_adjacent_identical_calls() {
        let params = test_params();
        let segment_sets = vec![
            selected_set(make_segment(0, 10_000, &[2, 1], &[30.0, 20.0])),
            selected_set(make_segment(10_000, 20_000, &[2, 1], &[40.0, 30.0])),
            selected_set(make_segment(20_000, 30_000, &[2, 1], &[50.0, 40.0])),
        ];

        let merged = merge_called_segments(segment_sets, &params);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].segment.range.start, 0);
        assert_eq!(merged[0].segment.range.end, 30_000);
        approx::assert_ulps_eq!(merged[0].samples[0].call.qscore, 40.0, max_ulps = 4);
        approx::assert_ulps_eq!(merged[0].samples[1].call.qscore, 30.0, max_ulps = 4);
    }

    /// A copy number difference in any sample blocks the merge
    #[test]
    fn test_no_merge_across_cn_change() {
        let params = test_params();
        let segment_sets = vec![
            selected_set(make_segment(0, 10_000, &[2, 1], &[30.0, 20.0])),
            selected_set(make_segment(10_000, 20_000, &[2, 2], &[30.0, 20.0])),
        ];

        let merged = merge_called_segments(segment_sets, &params);
        assert_eq!(merged.len(), 2);
    }

    /// Segments separated by more than the merge gap stay apart
    #[test]
    fn test_no_merge_across_large_gap() {
        let params = test_params();
        let segment_sets = vec![
            selected_set(make_segment(0, 10_000, &[1], &[30.0])),
            selected_set(make_segment(30_000, 40_000, &[1], &[30.0])),
        ];

        let merged = merge_called_segments(segment_sets, &params);
        assert_eq!(merged.len(), 2);
    }

    /// Merging is stable: a second pass reproduces the same list
    #[test]
    fn test_merge_stability() {
        let params = test_params();
        let segment_sets = vec![
            selected_set(make_segment(0, 10_000, &[2, 1], &[30.0, 20.0])),
            selected_set(make_segment(10_000, 20_000, &[2, 1], &[40.0, 30.0])),
            selected_set(make_segment(25_000, 30_000, &[2, 2], &[50.0, 40.0])),
            selected_set(make_segment(60_000, 70_000, &[2, 1], &[50.0, 40.0])),
        ];

        let merged = merge_called_segments(segment_sets, &params);
        let remerged = merge_called_segments(
            merged.iter().cloned().map(selected_set).collect(),
            &params,
        );

        assert_eq!(merged.len(), remerged.len());
        for (a, b) in merged.iter().zip(remerged.iter()) {
            assert_eq!(a.segment, b.segment);
            for (sample_a, sample_b) in a.samples.iter().zip(b.samples.iter()) {
                assert_eq!(sample_a.call.copy_number, sample_b.call.copy_number);
                approx::assert_ulps_eq!(
                    sample_a.call.qscore,
                    sample_b.call.qscore,
                    max_ulps = 4
                );
            }
        }
    }

    /// Quality and size filter labels land on the final calls
    #[test]
    fn test_filter_labels() {
        let params = test_params();
        let segment_sets = vec![
            selected_set(make_segment(0, 500, &[1], &[3.0])),
            selected_set(make_segment(40_000, 60_000, &[1], &[30.0])),
        ];

        let merged = merge_called_segments(segment_sets, &params);
        assert_eq!(
            merged[0].samples[0].call.filter.as_deref(),
            Some("q7;L1000")
        );
        assert_eq!(merged[1].samples[0].call.filter, None);
    }
}
