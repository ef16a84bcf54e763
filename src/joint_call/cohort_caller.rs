use super::{
    assign_independent_mcc, capped_coverage, use_allele_information, CallerParams, SegmentCaller,
};
use crate::genotype::{copy_number_combinations, genotypes_by_copy_number, Genotype};
use crate::quality::copy_number_qscore;
use crate::sample::Sample;
use crate::segment::{MultiSampleSegment, SegmentCall};

/// Independent copy number caller for samples without pedigree structure
///
/// Every copy-number combination is scored as the sum over samples of its
/// best in-combination depth likelihood; the winning combination restricts
/// each sample's states before the per-sample assignment.
///
pub struct CohortCaller<'a> {
    samples: &'a [Sample],
    params: &'a CallerParams,
    combinations: Vec<Vec<usize>>,
    genotypes_by_cn: Vec<Vec<Genotype>>,
}

impl<'a> CohortCaller<'a> {
    pub fn new(samples: &'a [Sample], params: &'a CallerParams) -> Self {
        Self {
            samples,
            params,
            combinations: copy_number_combinations(
                params.max_copy_number,
                params.max_allele_number,
            ),
            genotypes_by_cn: genotypes_by_copy_number(params.max_copy_number),
        }
    }

    fn sample_likelihoods(&self, segment: &MultiSampleSegment) -> Vec<Vec<f64>> {
        self.samples
            .iter()
            .zip(segment.samples.iter())
            .map(|(sample, sample_data)| {
                let coverage =
                    capped_coverage(sample, sample_data, self.params.number_of_trimmed_bins);
                let mut likelihoods = sample.depth_model.copy_number_likelihoods(coverage);
                assert_eq!(likelihoods.len(), self.params.max_copy_number);
                for value in likelihoods.iter_mut() {
                    if !value.is_finite() {
                        *value = 0.0;
                    }
                }
                likelihoods
            })
            .collect()
    }
}

impl SegmentCaller for CohortCaller<'_> {
    /// Per-sample depth likelihood vectors restricted to the selected
    /// combination's states
    type Evidence = Vec<Vec<f64>>;

    fn call(&self, segment: &mut MultiSampleSegment) -> (f64, Vec<Vec<f64>>) {
        // Reset the call state before inference
        for sample_data in segment.samples.iter_mut() {
            sample_data.call = SegmentCall::default();
        }

        let likelihoods = self.sample_likelihoods(segment);

        // With a single sample the combination search is redundant
        if likelihoods.len() == 1 {
            let mut best_cn = 0;
            for (copy_number, &likelihood) in likelihoods[0].iter().enumerate() {
                if likelihood > likelihoods[0][best_cn] {
                    best_cn = copy_number;
                }
            }
            segment.samples[0].call.copy_number = best_cn;
            let best_likelihood = likelihoods[0][best_cn];
            return (best_likelihood, likelihoods);
        }

        let mut best_combination: Option<&Vec<usize>> = None;
        let mut best_total = 0.0;
        for combination in self.combinations.iter() {
            let total: f64 = likelihoods
                .iter()
                .map(|sample_likelihoods| {
                    combination
                        .iter()
                        .map(|&copy_number| sample_likelihoods[copy_number])
                        .fold(0.0, f64::max)
                })
                .sum();
            if best_combination.is_none() || total > best_total {
                best_combination = Some(combination);
                best_total = total;
            }
        }
        let combination = best_combination.unwrap();

        let mut restricted = Vec::with_capacity(likelihoods.len());
        for (sample_index, sample_likelihoods) in likelihoods.iter().enumerate() {
            // Combination entries are ascending, so ties resolve to the
            // lowest copy number
            let mut best_cn = combination[0];
            for &copy_number in combination.iter() {
                if sample_likelihoods[copy_number] > sample_likelihoods[best_cn] {
                    best_cn = copy_number;
                }
            }
            segment.samples[sample_index].call.copy_number = best_cn;

            let mut restricted_likelihoods = vec![0.0; self.params.max_copy_number];
            for &copy_number in combination.iter() {
                restricted_likelihoods[copy_number] = sample_likelihoods[copy_number];
            }
            restricted.push(restricted_likelihoods);
        }

        (best_total, restricted)
    }

    fn assign_qualities(&self, segment: &mut MultiSampleSegment, evidence: &Vec<Vec<f64>>) {
        for (sample_data, restricted_likelihoods) in
            segment.samples.iter_mut().zip(evidence.iter())
        {
            sample_data.call.qscore = copy_number_qscore(
                restricted_likelihoods,
                sample_data.call.copy_number,
                self.params.max_qscore,
            );
        }
    }

    fn assign_major_chrom_counts(&self, segment: &mut MultiSampleSegment) {
        if !use_allele_information(
            segment,
            self.params.read_counts_threshold,
            self.params.allele_density_threshold,
        ) {
            return;
        }
        for (sample, sample_data) in self.samples.iter().zip(segment.samples.iter_mut()) {
            assign_independent_mcc(
                sample.depth_model.as_ref(),
                &self.genotypes_by_cn,
                sample_data,
                self.params.per_segment_allele_max_counts,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::depth_model::GaussianDepthModel;
    use crate::genome_segment::GenomeSegment;
    use crate::sample::Kin;
    use crate::segment::SampleSegmentData;

    fn make_samples(count: usize) -> Vec<Sample> {
        (0..count)
            .map(|index| {
                Sample::new(
                    format!("sample{index}"),
                    Kin::Other,
                    30.0,
                    3.0,
                    Box::new(GaussianDepthModel::new(30.0, 5)),
                )
            })
            .collect()
    }

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
            minimum_call_size: 0,
            max_merge_gap: 10_000,
        }
    }

    fn make_segment(coverages: &[f64]) -> MultiSampleSegment {
        MultiSampleSegment {
            segment: GenomeSegment::new(0, 0, 10_000),
            samples: coverages
                .iter()
                .map(|&coverage| SampleSegmentData {
                    bin_depths: vec![coverage; 10],
                    ..Default::default()
                })
                .collect(),
        }
    }

    /// Uniform single-copy loss across four samples
    #[test]
    fn test_uniform_loss() {
        let samples = make_samples(4);
        let params = test_params();
        let caller = CohortCaller::new(&samples, &params);

        let mut segment = make_segment(&[15.0, 15.0, 15.0, 15.0]);
        let (_, evidence) = caller.call(&mut segment);
        caller.assign_qualities(&mut segment, &evidence);

        for sample_data in segment.samples.iter() {
            assert_eq!(sample_data.call.copy_number, 1);
            assert!(sample_data.call.qscore >= params.quality_filter_threshold);
        }
    }

    /// Mixed states are recovered through a multi-state combination
    #[test]
    fn test_mixed_states() {
        let samples = make_samples(3);
        let params = test_params();
        let caller = CohortCaller::new(&samples, &params);

        let mut segment = make_segment(&[30.0, 15.0, 45.0]);
        caller.call(&mut segment);

        assert_eq!(segment.samples[0].call.copy_number, 2);
        assert_eq!(segment.samples[1].call.copy_number, 1);
        assert_eq!(segment.samples[2].call.copy_number, 3);
    }

    /// The single-sample path skips the combination search
    #[test]
    fn test_single_sample() {
        let samples = make_samples(1);
        let params = test_params();
        let caller = CohortCaller::new(&samples, &params);

        let mut segment = make_segment(&[60.0]);
        let (best_likelihood, evidence) = caller.call(&mut segment);

        assert_eq!(segment.samples[0].call.copy_number, 4);
        approx::assert_ulps_eq!(best_likelihood, evidence[0][4], max_ulps = 4);
    }

    /// No-pedigree MCC assignment takes the per-sample argmax
    #[test]
    fn test_independent_mcc() {
        let samples = make_samples(2);
        let params = test_params();
        let caller = CohortCaller::new(&samples, &params);

        let mut segment = make_segment(&[45.0, 30.0]);
        segment.samples[0].allele_counts = vec![(20, 10), (10, 20), (21, 9), (9, 21)];
        segment.samples[1].allele_counts = vec![(15, 15), (16, 14), (14, 16), (15, 15)];

        caller.call(&mut segment);
        caller.assign_major_chrom_counts(&mut segment);

        // Copy number 3 with a 2:1 imbalance takes MCC 2; diploid takes MCC 1
        assert_eq!(segment.samples[0].call.copy_number, 3);
        assert_eq!(segment.samples[0].call.major_chrom_count, Some(2));
        assert_eq!(segment.samples[1].call.major_chrom_count, Some(1));
    }

    /// Allele evidence below the read count threshold leaves MCC unset
    #[test]
    fn test_mcc_gate() {
        let samples = make_samples(2);
        let params = test_params();
        let caller = CohortCaller::new(&samples, &params);

        let mut segment = make_segment(&[30.0, 30.0]);
        segment.samples[0].allele_counts = vec![(15, 15), (16, 14), (14, 16), (15, 15)];
        segment.samples[1].allele_counts = vec![(15, 15)];

        caller.call(&mut segment);
        caller.assign_major_chrom_counts(&mut segment);

        assert!(segment.samples[0].call.major_chrom_count.is_none());
        assert!(segment.samples[1].call.major_chrom_count.is_none());
    }
}
