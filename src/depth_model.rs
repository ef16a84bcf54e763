use statrs::distribution::{Binomial, Continuous, Discrete, Normal};

use crate::genotype::Genotype;
use crate::prob_utils::{error_prob_to_phred, get_complement_prob, normalize_distro};

/// Result of scoring a candidate genotype list against allele-count evidence
#[derive(Clone, Copy, Debug)]
pub struct BestGenotype {
    /// Index of the best candidate in the input list
    pub index: usize,

    /// Likelihood of the best candidate
    pub likelihood: f64,

    /// Phred-scaled confidence in the best candidate relative to the rest of
    /// the candidate list
    pub qscore: f64,
}

/// Per-sample likelihood model over depth and allele-count observations
///
/// The model is constructed once per sample and shared read-only across
/// worker threads.
///
pub trait DepthLikelihoodModel: Send + Sync {
    /// Unnormalized likelihood of each copy number state given the observed
    /// segment coverage
    ///
    /// The returned vector has one entry per copy number in
    /// [0, max_copy_number).
    ///
    fn copy_number_likelihoods(&self, coverage: f64) -> Vec<f64>;

    /// Joint likelihood of a segment's allele-count observations under the
    /// candidate genotype
    fn genotype_likelihood(&self, allele_counts: &[(u32, u32)], genotype: Genotype) -> f64;

    /// Score a candidate genotype list, reporting the best entry
    ///
    /// Returns None for an empty candidate list.
    ///
    fn best_genotype(
        &self,
        allele_counts: &[(u32, u32)],
        candidates: &[Genotype],
    ) -> Option<BestGenotype>;
}

/// Depth likelihoods from per-state Gaussians with a shared variance
///
/// The expected depth at copy number cn is cn haploid coverages. The variance
/// is shared across states so that equally good fits at different copy
/// numbers score equally; allele evidence uses a binomial read-count model.
///
pub struct GaussianDepthModel {
    haploid_coverage: f64,
    depth_stddev: f64,
    max_copy_number: usize,
}

impl GaussianDepthModel {
    pub fn new(mean_coverage: f64, max_copy_number: usize) -> Self {
        assert!(mean_coverage > 0.0);
        assert!(max_copy_number > 2);
        Self {
            haploid_coverage: mean_coverage / 2.0,
            depth_stddev: mean_coverage.sqrt(),
            max_copy_number,
        }
    }

    /// Expected major-allele fraction for a genotype, kept off the boundaries
    /// to account for sequencing noise
    fn major_allele_fraction(genotype: Genotype) -> f64 {
        let total = genotype.total();
        if total == 0 {
            0.5
        } else {
            (genotype.major_count() as f64 / total as f64).clamp(0.01, 0.99)
        }
    }
}

impl DepthLikelihoodModel for GaussianDepthModel {
    fn copy_number_likelihoods(&self, coverage: f64) -> Vec<f64> {
        assert!(coverage >= 0.0);

        // Bound the observation to retain numerical stability in depth spikes
        let coverage = coverage.min(self.haploid_coverage * 2.0 * self.max_copy_number as f64);

        (0..self.max_copy_number)
            .map(|cn| {
                let expected_depth = self.haploid_coverage * cn as f64;
                let nd = Normal::new(expected_depth, self.depth_stddev).unwrap();
                nd.pdf(coverage)
            })
            .collect()
    }

    fn genotype_likelihood(&self, allele_counts: &[(u32, u32)], genotype: Genotype) -> f64 {
        let fraction = Self::major_allele_fraction(genotype);

        let mut likelihood = 1.0;
        for &(count_a, count_b) in allele_counts {
            let total = (count_a + count_b) as u64;
            if total == 0 {
                continue;
            }
            let major = std::cmp::max(count_a, count_b) as u64;
            let bd = Binomial::new(fraction, total).unwrap();
            likelihood *= bd.pmf(major);
        }
        likelihood
    }

    fn best_genotype(
        &self,
        allele_counts: &[(u32, u32)],
        candidates: &[Genotype],
    ) -> Option<BestGenotype> {
        if candidates.is_empty() {
            return None;
        }

        let likelihoods = candidates
            .iter()
            .map(|&genotype| self.genotype_likelihood(allele_counts, genotype))
            .collect::<Vec<_>>();

        let mut pdf = likelihoods.clone();
        let (index, qscore) = match normalize_distro(&mut pdf) {
            Some(index) => (index, error_prob_to_phred(get_complement_prob(&pdf, index))),
            None => (0, 0.0),
        };

        Some(BestGenotype {
            index,
            likelihood: likelihoods[index],
            qscore,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_number_likelihoods() {
        let model = GaussianDepthModel::new(30.0, 5);
        let lhoods = model.copy_number_likelihoods(30.0);

        assert_eq!(lhoods.len(), 5);

        // Diploid coverage should peak at copy number 2
        let best = lhoods
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap()
            .0;
        assert_eq!(best, 2);

        // Density at the state mean is 1 / sqrt(2 pi sigma^2)
        let expected_peak = 1.0 / (2.0 * std::f64::consts::PI * 30.0).sqrt();
        approx::assert_abs_diff_eq!(lhoods[2], expected_peak, epsilon = 1e-12);
    }

    #[test]
    fn test_copy_number_likelihoods_haploid_peak() {
        let model = GaussianDepthModel::new(30.0, 5);
        let lhoods = model.copy_number_likelihoods(15.0);
        let best = lhoods
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap()
            .0;
        assert_eq!(best, 1);
    }

    /// Equally good fits at different copy numbers carry equal likelihood
    #[test]
    fn test_matched_fits_score_equally() {
        let model = GaussianDepthModel::new(30.0, 5);
        let diploid_fit = model.copy_number_likelihoods(30.0)[2];
        let haploid_fit = model.copy_number_likelihoods(15.0)[1];
        assert_eq!(diploid_fit, haploid_fit);
    }

    #[test]
    fn test_genotype_likelihood_favors_balanced_het() {
        let model = GaussianDepthModel::new(30.0, 5);
        let counts = [(15u32, 15u32), (14, 16), (16, 14)];

        let balanced = model.genotype_likelihood(&counts, Genotype::new(1, 1));
        let skewed = model.genotype_likelihood(&counts, Genotype::new(2, 1));
        assert!(balanced > skewed);
    }

    #[test]
    fn test_best_genotype() {
        let model = GaussianDepthModel::new(30.0, 5);

        // Two-thirds major allele fraction matches a (2,1) genotype
        let counts = [(20u32, 10u32), (10, 20), (21, 9)];
        let candidates = [Genotype::new(1, 1), Genotype::new(2, 1), Genotype::new(3, 0)];

        let best = model.best_genotype(&counts, &candidates).unwrap();
        assert_eq!(best.index, 1);
        assert!(best.qscore > 0.0);

        assert!(model.best_genotype(&counts, &[]).is_none());
    }
}
