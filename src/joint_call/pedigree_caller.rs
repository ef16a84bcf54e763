use super::{
    assign_independent_mcc, capped_allele_counts, capped_coverage, default_major_chrom_count,
    use_allele_information, CallerParams, SegmentCaller,
};
use crate::copy_number_distribution::CopyNumberDistribution;
use crate::genotype::{
    cn_allele_set, genotypes_by_copy_number, offspring_genotype_vectors, parental_genotypes,
    Genotype,
};
use crate::pedigree::Pedigree;
use crate::quality::{de_novo_qscore, marginal_qscore};
use crate::sample::Sample;
use crate::segment::{MultiSampleSegment, SegmentCall};
use crate::transition::TransitionMatrix;

/// Joint copy number caller over a two-parent pedigree
///
/// Parent depth evidence combines with a Mendelian transmission model to
/// score every (parent1, parent2, offspring...) copy number configuration;
/// the maximum joint likelihood assigns the calls and the accumulated
/// distribution drives quality and de novo scoring.
///
pub struct PedigreeCaller<'a> {
    samples: &'a [Sample],
    pedigree: &'a Pedigree,
    params: &'a CallerParams,
    transitions: TransitionMatrix,
    offspring_genotypes: Vec<Vec<Genotype>>,
    genotypes_by_cn: Vec<Vec<Genotype>>,
}

impl<'a> PedigreeCaller<'a> {
    pub fn new(samples: &'a [Sample], pedigree: &'a Pedigree, params: &'a CallerParams) -> Self {
        let parental = parental_genotypes(params.max_copy_number);
        let offspring_genotypes = offspring_genotype_vectors(
            &parental,
            pedigree.probands.len(),
            params.max_offspring_genotypes,
            params.genotype_subsample_seed,
        );
        Self {
            samples,
            pedigree,
            params,
            transitions: TransitionMatrix::new(params.max_copy_number),
            offspring_genotypes,
            genotypes_by_cn: genotypes_by_copy_number(params.max_copy_number),
        }
    }

    /// True when genotype `gc` could be transmitted given parental genotype `gp`
    ///
    /// Consistency requires that one of the parent's two allele counts appears
    /// among the offspring allele counts.
    ///
    fn is_pedigree_consistent(gc: Genotype, gp: Genotype) -> bool {
        gp.counts_a == gc.counts_a
            || gp.counts_a == gc.counts_b
            || gp.counts_b == gc.counts_a
            || gp.counts_b == gc.counts_b
    }

    /// True when the proband's call is explainable as a CNV inherited from a
    /// parent carrying a shared allele set at the same expected ploidy
    fn is_common_cnv(&self, segment: &MultiSampleSegment, proband_index: usize) -> bool {
        let proband_cn = segment.samples[proband_index].call.copy_number;
        let proband_ploidy =
            self.samples[proband_index].expected_ploidy(&segment.segment) as usize;
        let proband_alleles = cn_allele_set(proband_cn);

        self.pedigree.parents.iter().any(|&parent_index| {
            let parent_cn = segment.samples[parent_index].call.copy_number;
            let parent_ploidy =
                self.samples[parent_index].expected_ploidy(&segment.segment) as usize;
            parent_ploidy == proband_ploidy
                && parent_cn != parent_ploidy
                && cn_allele_set(parent_cn)
                    .iter()
                    .any(|allele| proband_alleles.contains(allele))
        })
    }

    /// Check the eligibility conditions for de novo scoring of one proband
    fn is_de_novo_candidate(&self, segment: &MultiSampleSegment, proband_index: usize) -> bool {
        let proband_call = &segment.samples[proband_index].call;
        let proband_ploidy =
            self.samples[proband_index].expected_ploidy(&segment.segment) as usize;
        if proband_call.copy_number == proband_ploidy {
            return false;
        }

        // The event must not be explainable by inheritance: either both
        // parents sit at their expected ploidies, or no parent shares the CNV
        let parents_at_reference = self.pedigree.parents.iter().all(|&parent_index| {
            let parent_ploidy =
                self.samples[parent_index].expected_ploidy(&segment.segment) as usize;
            segment.samples[parent_index].call.copy_number == parent_ploidy
        });
        if !parents_at_reference && self.is_common_cnv(segment, proband_index) {
            return false;
        }

        // Sibling calls must be reference or at least not a shared family CNV
        for &sibling_index in self.pedigree.probands.iter() {
            if sibling_index == proband_index {
                continue;
            }
            let sibling_ploidy =
                self.samples[sibling_index].expected_ploidy(&segment.segment) as usize;
            let sibling_at_reference =
                segment.samples[sibling_index].call.copy_number == sibling_ploidy;
            if !sibling_at_reference && self.is_common_cnv(segment, sibling_index) {
                return false;
            }
        }

        // Parent and proband calls all need to clear the quality filter
        let quality_threshold = self.params.quality_filter_threshold;
        self.pedigree
            .parents
            .iter()
            .all(|&parent_index| segment.samples[parent_index].call.qscore > quality_threshold)
            && proband_call.qscore > quality_threshold
    }

    /// Assign MCC values from the best pedigree-consistent genotype
    /// configuration of the parent pair and all inherited offspring
    fn assign_pedigree_mcc(&self, segment: &mut MultiSampleSegment) {
        let [parent1, parent2] = self.pedigree.parents;
        let parent1_cn = segment.samples[parent1].call.copy_number;
        let parent2_cn = segment.samples[parent2].call.copy_number;
        let max_counts = self.params.per_segment_allele_max_counts;

        let mut best_likelihood = 0.0;
        let mut best_assignment: Option<(Genotype, Genotype, Vec<Option<Genotype>>)> = None;

        for &gp1 in self.genotypes_by_cn[parent1_cn].iter() {
            let parent1_likelihood = self.samples[parent1].depth_model.genotype_likelihood(
                capped_allele_counts(&segment.samples[parent1], max_counts),
                gp1,
            );
            for &gp2 in self.genotypes_by_cn[parent2_cn].iter() {
                let parent2_likelihood = self.samples[parent2].depth_model.genotype_likelihood(
                    capped_allele_counts(&segment.samples[parent2], max_counts),
                    gp2,
                );

                let mut likelihood = parent1_likelihood * parent2_likelihood;
                let mut offspring_genotypes = Vec::with_capacity(self.pedigree.probands.len());
                for &child_index in self.pedigree.probands.iter() {
                    let child_call = &segment.samples[child_index].call;
                    if child_call.de_novo_qscore.is_some() {
                        // De novo calls don't constrain the inherited configuration
                        offspring_genotypes.push(None);
                        continue;
                    }
                    let candidates = self.genotypes_by_cn[child_call.copy_number]
                        .iter()
                        .copied()
                        .filter(|&gc| {
                            Self::is_pedigree_consistent(gc, gp1)
                                && Self::is_pedigree_consistent(gc, gp2)
                        })
                        .collect::<Vec<_>>();
                    let best = self.samples[child_index].depth_model.best_genotype(
                        capped_allele_counts(&segment.samples[child_index], max_counts),
                        &candidates,
                    );
                    match best {
                        Some(best) => {
                            likelihood *= best.likelihood;
                            offspring_genotypes.push(Some(candidates[best.index]));
                        }
                        None => offspring_genotypes.push(None),
                    }
                }

                if best_assignment.is_none() || likelihood > best_likelihood {
                    best_likelihood = likelihood;
                    best_assignment = Some((gp1, gp2, offspring_genotypes));
                }
            }
        }

        let (gp1, gp2, offspring_genotypes) = best_assignment.unwrap();
        let assign = |call: &mut SegmentCall, genotype: Genotype| {
            let mcc = if call.copy_number > 2 {
                genotype.major_count()
            } else {
                default_major_chrom_count(call.copy_number)
            };
            call.major_chrom_count = Some(mcc);
        };
        assign(&mut segment.samples[parent1].call, gp1);
        assign(&mut segment.samples[parent2].call, gp2);

        for (child_slot, &child_index) in self.pedigree.probands.iter().enumerate() {
            match offspring_genotypes[child_slot] {
                Some(genotype) => assign(&mut segment.samples[child_index].call, genotype),
                None => {
                    // De novo or unconstrained offspring fall back to the
                    // per-sample assignment
                    assign_independent_mcc(
                        self.samples[child_index].depth_model.as_ref(),
                        &self.genotypes_by_cn,
                        &mut segment.samples[child_index],
                        max_counts,
                    );
                }
            }
        }
    }
}

impl SegmentCaller for PedigreeCaller<'_> {
    type Evidence = CopyNumberDistribution;

    fn call(&self, segment: &mut MultiSampleSegment) -> (f64, CopyNumberDistribution) {
        let max_cn = self.params.max_copy_number;
        let axis_samples = self.pedigree.axis_samples();

        // Reset the call state before inference
        for sample_data in segment.samples.iter_mut() {
            sample_data.call = SegmentCall::default();
        }

        let likelihoods = axis_samples
            .iter()
            .map(|&sample_index| {
                let coverage = capped_coverage(
                    &self.samples[sample_index],
                    &segment.samples[sample_index],
                    self.params.number_of_trimmed_bins,
                );
                let mut sample_likelihoods = self.samples[sample_index]
                    .depth_model
                    .copy_number_likelihoods(coverage);
                assert_eq!(sample_likelihoods.len(), max_cn);
                for value in sample_likelihoods.iter_mut() {
                    if !value.is_finite() {
                        *value = 0.0;
                    }
                }
                sample_likelihoods
            })
            .collect::<Vec<_>>();

        let mut dist = CopyNumberDistribution::new(self.pedigree.axis_count(), max_cn);
        let mut best_likelihood = 0.0;
        let mut index = vec![0usize; axis_samples.len()];

        for parent1_cn in 0..max_cn {
            for parent2_cn in 0..max_cn {
                let parent_likelihood = likelihoods[0][parent1_cn] * likelihoods[1][parent2_cn];
                index[0] = parent1_cn;
                index[1] = parent2_cn;

                for offspring in self.offspring_genotypes.iter() {
                    let mut likelihood = parent_likelihood;
                    for (child_slot, genotype) in offspring.iter().enumerate() {
                        let mendelian = self.transitions.prob(parent1_cn, genotype.counts_a)
                            * self.transitions.prob(parent2_cn, genotype.counts_b);
                        let transmission = if mendelian > 0.0 {
                            mendelian
                        } else {
                            self.params.de_novo_rate
                        };
                        let child_cn = std::cmp::min(genotype.total(), max_cn - 1);
                        likelihood *=
                            transmission * likelihoods[2 + child_slot][child_cn];
                        index[2 + child_slot] = child_cn;
                    }
                    if !likelihood.is_finite() {
                        likelihood = 0.0;
                    }

                    dist.record_max(&index, likelihood);
                    if likelihood > best_likelihood {
                        best_likelihood = likelihood;
                        for (axis, &sample_index) in axis_samples.iter().enumerate() {
                            segment.samples[sample_index].call.copy_number = index[axis];
                        }
                    }
                }
            }
        }

        (best_likelihood, dist)
    }

    fn assign_qualities(&self, segment: &mut MultiSampleSegment, dist: &CopyNumberDistribution) {
        let axis_samples = self.pedigree.axis_samples();
        for (axis, &sample_index) in axis_samples.iter().enumerate() {
            let copy_number = segment.samples[sample_index].call.copy_number;
            segment.samples[sample_index].call.qscore =
                marginal_qscore(dist, axis, copy_number, self.params.max_qscore);
        }

        for (proband_slot, &proband_index) in self.pedigree.probands.iter().enumerate() {
            if !self.is_de_novo_candidate(segment, proband_index) {
                continue;
            }
            let proband_cn = segment.samples[proband_index].call.copy_number;
            segment.samples[proband_index].call.de_novo_qscore = de_novo_qscore(
                dist,
                2 + proband_slot,
                proband_cn,
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
        self.assign_pedigree_mcc(segment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::depth_model::GaussianDepthModel;
    use crate::genome_segment::GenomeSegment;
    use crate::sample::Kin;
    use crate::segment::SampleSegmentData;

    fn make_sample(name: &str, kin: Kin, mean_coverage: f64) -> Sample {
        Sample::new(
            name.to_string(),
            kin,
            mean_coverage,
            3.0,
            Box::new(GaussianDepthModel::new(mean_coverage, 5)),
        )
    }

    fn trio_samples() -> Vec<Sample> {
        vec![
            make_sample("child", Kin::Proband, 30.0),
            make_sample("father", Kin::Parent, 30.0),
            make_sample("mother", Kin::Parent, 30.0),
        ]
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

    fn trio_segment(
        child_coverage: f64,
        parent1_coverage: f64,
        parent2_coverage: f64,
    ) -> MultiSampleSegment {
        let sample_data = |coverage: f64| SampleSegmentData {
            bin_depths: vec![coverage; 10],
            ..Default::default()
        };
        MultiSampleSegment {
            segment: GenomeSegment::new(0, 0, 10_000),
            samples: vec![
                sample_data(child_coverage),
                sample_data(parent1_coverage),
                sample_data(parent2_coverage),
            ],
        }
    }

    /// Trio with diploid coverage everywhere calls diploid with no de novo
    #[test]
    fn test_trio_all_diploid() {
        let samples = trio_samples();
        let pedigree = Pedigree::from_samples(&samples).unwrap();
        let params = test_params();
        let caller = PedigreeCaller::new(&samples, &pedigree, &params);

        let mut segment = trio_segment(30.0, 30.0, 30.0);
        let (best_likelihood, dist) = caller.call(&mut segment);
        caller.assign_qualities(&mut segment, &dist);

        for sample_data in segment.samples.iter() {
            assert_eq!(sample_data.call.copy_number, 2);
            assert!(sample_data.call.qscore >= params.quality_filter_threshold);
            assert!(sample_data.call.de_novo_qscore.is_none());
        }
        assert!(best_likelihood > 0.0);
        approx::assert_ulps_eq!(dist.max_likelihood(), best_likelihood, max_ulps = 4);
    }

    /// De novo deletion: diploid parents, single-copy child
    #[test]
    fn test_trio_de_novo_deletion() {
        let samples = trio_samples();
        let pedigree = Pedigree::from_samples(&samples).unwrap();
        let params = test_params();
        let caller = PedigreeCaller::new(&samples, &pedigree, &params);

        let mut segment = trio_segment(15.0, 30.0, 30.0);
        let (_, dist) = caller.call(&mut segment);
        caller.assign_qualities(&mut segment, &dist);

        assert_eq!(segment.samples[0].call.copy_number, 1);
        assert_eq!(segment.samples[1].call.copy_number, 2);
        assert_eq!(segment.samples[2].call.copy_number, 2);

        let dqs = segment.samples[0].call.de_novo_qscore.unwrap();
        assert!(dqs > 20.0);
    }

    /// Duplication shared with parent1 is called but not flagged de novo
    #[test]
    fn test_trio_inherited_duplication() {
        let samples = trio_samples();
        let pedigree = Pedigree::from_samples(&samples).unwrap();
        let params = test_params();
        let caller = PedigreeCaller::new(&samples, &pedigree, &params);

        let mut segment = trio_segment(45.0, 45.0, 30.0);
        let (_, dist) = caller.call(&mut segment);
        caller.assign_qualities(&mut segment, &dist);

        assert_eq!(segment.samples[0].call.copy_number, 3);
        assert_eq!(segment.samples[1].call.copy_number, 3);
        assert_eq!(segment.samples[2].call.copy_number, 2);
        assert!(segment.samples[0].call.de_novo_qscore.is_none());
    }

    /// With no probands the joint parse reduces to two independent argmaxes
    #[test]
    fn test_parents_only_reduces_to_independent_argmax() {
        let samples = vec![
            make_sample("father", Kin::Parent, 30.0),
            make_sample("mother", Kin::Parent, 30.0),
        ];
        let pedigree = Pedigree {
            parents: [0, 1],
            probands: Vec::new(),
        };
        let params = test_params();
        let caller = PedigreeCaller::new(&samples, &pedigree, &params);

        let sample_data = |coverage: f64| SampleSegmentData {
            bin_depths: vec![coverage; 10],
            ..Default::default()
        };
        let mut segment = MultiSampleSegment {
            segment: GenomeSegment::new(0, 0, 10_000),
            samples: vec![sample_data(45.0), sample_data(15.0)],
        };

        let (best_likelihood, _) = caller.call(&mut segment);
        assert_eq!(segment.samples[0].call.copy_number, 3);
        assert_eq!(segment.samples[1].call.copy_number, 1);

        // The joint maximum factorizes into the two independent maxima
        let expected: f64 = [(0usize, 45.0), (1usize, 15.0)]
            .iter()
            .map(|&(sample_index, coverage)| {
                samples[sample_index]
                    .depth_model
                    .copy_number_likelihoods(coverage)
                    .into_iter()
                    .fold(0.0, f64::max)
            })
            .product();
        approx::assert_ulps_eq!(best_likelihood, expected, max_ulps = 4);
    }

    /// Swapping the parents leaves every copy number call unchanged
    #[test]
    fn test_parent_swap_symmetry() {
        let params = test_params();

        let samples = trio_samples();
        let pedigree = Pedigree::from_samples(&samples).unwrap();
        let caller = PedigreeCaller::new(&samples, &pedigree, &params);
        let mut segment = trio_segment(45.0, 45.0, 30.0);
        caller.call(&mut segment);

        let swapped_pedigree = Pedigree {
            parents: [pedigree.parents[1], pedigree.parents[0]],
            probands: pedigree.probands.clone(),
        };
        let swapped_caller = PedigreeCaller::new(&samples, &swapped_pedigree, &params);
        let mut swapped_segment = trio_segment(45.0, 45.0, 30.0);
        swapped_caller.call(&mut swapped_segment);

        for (sample_data, swapped_data) in
            segment.samples.iter().zip(swapped_segment.samples.iter())
        {
            assert_eq!(
                sample_data.call.copy_number,
                swapped_data.call.copy_number
            );
        }
    }

    /// MCC assignment is skipped entirely without allele evidence
    #[test]
    fn test_mcc_skipped_without_allele_evidence() {
        let samples = trio_samples();
        let pedigree = Pedigree::from_samples(&samples).unwrap();
        let params = test_params();
        let caller = PedigreeCaller::new(&samples, &pedigree, &params);

        let mut segment = trio_segment(30.0, 30.0, 30.0);
        let (_, dist) = caller.call(&mut segment);
        caller.assign_qualities(&mut segment, &dist);
        caller.assign_major_chrom_counts(&mut segment);

        for sample_data in segment.samples.iter() {
            assert!(sample_data.call.major_chrom_count.is_none());
        }
    }

    /// An inherited duplication gets a pedigree-consistent MCC from allele counts
    #[test]
    fn test_pedigree_mcc_assignment() {
        let samples = trio_samples();
        let pedigree = Pedigree::from_samples(&samples).unwrap();
        let params = test_params();
        let caller = PedigreeCaller::new(&samples, &pedigree, &params);

        let mut segment = trio_segment(45.0, 45.0, 30.0);

        // Child and parent1 carry a 2:1 allele imbalance, parent2 is balanced
        let imbalanced = vec![(20u32, 10u32), (10, 20), (21, 9), (9, 21)];
        let balanced = vec![(15u32, 15u32), (14, 16), (16, 14), (15, 15)];
        segment.samples[0].allele_counts = imbalanced.clone();
        segment.samples[1].allele_counts = imbalanced;
        segment.samples[2].allele_counts = balanced;

        let (_, dist) = caller.call(&mut segment);
        caller.assign_qualities(&mut segment, &dist);
        caller.assign_major_chrom_counts(&mut segment);

        assert_eq!(segment.samples[0].call.major_chrom_count, Some(2));
        assert_eq!(segment.samples[1].call.major_chrom_count, Some(2));
        assert_eq!(segment.samples[2].call.major_chrom_count, Some(1));
    }
}
