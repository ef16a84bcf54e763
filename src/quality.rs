use crate::copy_number_distribution::CopyNumberDistribution;
use crate::prob_utils::{error_prob_to_phred, get_complement_prob, normalize_distro};

/// Copy number state treated as the reference in de novo scoring
///
/// Diploid is used regardless of the sample's expected ploidy, which
/// understates de novo quality on haploid regions.
const DE_NOVO_REFERENCE_STATE: usize = 2;

/// Floor applied to the de novo error probability before phred conversion
const MIN_DE_NOVO_ERROR_PROB: f64 = 1e-6;

/// Phred-scaled quality of a copy number choice given a per-sample
/// likelihood vector
///
/// The score reflects the probability mass on all states other than the
/// chosen one, clipped to [0, max_qscore].
///
pub fn copy_number_qscore(likelihoods: &[f64], copy_number: usize, max_qscore: f64) -> f64 {
    let chosen = std::cmp::min(copy_number, likelihoods.len() - 1);

    let mut pdf = likelihoods.to_vec();
    if normalize_distro(&mut pdf).is_none() {
        return 0.0;
    }

    let error_prob = get_complement_prob(&pdf, chosen);
    error_prob_to_phred(error_prob).clamp(0.0, max_qscore)
}

/// Per-sample qscore from the joint distribution, marginalizing over all
/// other pedigree members
pub fn marginal_qscore(
    dist: &CopyNumberDistribution,
    axis: usize,
    copy_number: usize,
    max_qscore: f64,
) -> f64 {
    copy_number_qscore(&dist.marginal(axis), copy_number, max_qscore)
}

/// Phred-scaled quality of a proband's copy number call being de novo,
/// conditioned on diploid evidence in the rest of the pedigree
///
/// The numerator restricts the joint distribution to the single index tuple
/// with every other member at the reference state; the denominator is the
/// proband's max-marginal at the called state. Returns None when the
/// distribution carries no mass for the call.
///
pub fn de_novo_qscore(
    dist: &CopyNumberDistribution,
    proband_axis: usize,
    proband_cn: usize,
    max_qscore: f64,
) -> Option<f64> {
    let mut reference_index = vec![DE_NOVO_REFERENCE_STATE; dist.axis_count()];
    reference_index[proband_axis] = proband_cn;
    let numerator = dist.get(&reference_index);

    let marginal = dist.marginal(proband_axis);
    let denominator = marginal[proband_cn];
    if denominator <= 0.0 {
        return None;
    }

    let alt_mass = marginal[proband_cn] + marginal[DE_NOVO_REFERENCE_STATE];
    if alt_mass <= 0.0 {
        return None;
    }
    let marginal_alt_prob = marginal[proband_cn] / alt_mass;

    let de_novo_error =
        (1.0 - numerator / denominator) * (1.0 - marginal_alt_prob);
    let qscore = error_prob_to_phred(de_novo_error.max(MIN_DE_NOVO_ERROR_PROB));
    Some(qscore.clamp(0.0, max_qscore))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_number_qscore() {
        // Error mass of 0.001 converts to Q30
        let likelihoods = [0.0005, 0.999, 0.0005, 0.0, 0.0];
        let qscore = copy_number_qscore(&likelihoods, 1, 60.0);
        approx::assert_abs_diff_eq!(qscore, 30.0, epsilon = 1e-9);
    }

    #[test]
    fn test_copy_number_qscore_clipping() {
        // All mass on the chosen state clips to the max
        let likelihoods = [0.0, 1.0, 0.0];
        assert_eq!(copy_number_qscore(&likelihoods, 1, 60.0), 60.0);

        // Degenerate input scores zero
        let likelihoods = [0.0, 0.0, 0.0];
        assert_eq!(copy_number_qscore(&likelihoods, 1, 60.0), 0.0);

        // Out of range choices are capped onto the final state
        let likelihoods = [0.2, 0.2, 0.6];
        let qscore = copy_number_qscore(&likelihoods, 10, 60.0);
        approx::assert_abs_diff_eq!(
            qscore,
            error_prob_to_phred(0.4),
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_marginal_qscore() {
        let mut dist = CopyNumberDistribution::new(3, 5);
        dist.record_max(&[2, 2, 1], 0.999);
        dist.record_max(&[2, 2, 2], 0.001);

        let qscore = marginal_qscore(&dist, 2, 1, 60.0);
        approx::assert_abs_diff_eq!(qscore, 30.0, epsilon = 1e-9);
    }

    #[test]
    fn test_de_novo_qscore_confident_event() {
        // Nearly all mass sits on a diploid pedigree with a single-copy child
        let mut dist = CopyNumberDistribution::new(3, 5);
        dist.record_max(&[2, 2, 1], 0.99);
        dist.record_max(&[2, 2, 2], 1e-8);
        dist.record_max(&[1, 2, 1], 1e-6);

        let dqs = de_novo_qscore(&dist, 2, 1, 60.0).unwrap();
        assert!(dqs > 20.0);
    }

    #[test]
    fn test_de_novo_qscore_no_mass() {
        let mut dist = CopyNumberDistribution::new(3, 5);
        dist.record_max(&[2, 2, 2], 1.0);
        assert_eq!(de_novo_qscore(&dist, 2, 3, 60.0), None);
    }
}
