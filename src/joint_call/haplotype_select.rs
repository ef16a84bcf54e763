use crate::segment::Haplotype;

/// Choose a segment set's haplotype from per-segment maximum joint likelihoods
///
/// With both haplotypes present the one with the higher average per-segment
/// maximum wins, with ties kept on haplotype A. A set carrying a single
/// haplotype selects it directly.
///
pub fn select_haplotype(
    likelihoods_a: Option<&[f64]>,
    likelihoods_b: Option<&[f64]>,
) -> Haplotype {
    fn average(likelihoods: &[f64]) -> f64 {
        assert!(!likelihoods.is_empty());
        likelihoods.iter().sum::<f64>() / likelihoods.len() as f64
    }

    match (likelihoods_a, likelihoods_b) {
        (Some(a), Some(b)) => {
            if average(b) > average(a) {
                Haplotype::B
            } else {
                Haplotype::A
            }
        }
        (Some(_), None) => Haplotype::A,
        (None, Some(_)) => Haplotype::B,
        (None, None) => panic!("segment set carries no haplotypes"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_haplotype() {
        assert_eq!(select_haplotype(Some(&[0.5]), None), Haplotype::A);
        assert_eq!(select_haplotype(None, Some(&[0.5])), Haplotype::B);
    }

    #[test]
    fn test_average_comparison() {
        // One strong segment beats a strong/weak pair on average
        assert_eq!(
            select_haplotype(Some(&[0.8]), Some(&[0.8, 0.2])),
            Haplotype::A
        );
        assert_eq!(
            select_haplotype(Some(&[0.2, 0.4]), Some(&[0.5, 0.7])),
            Haplotype::B
        );
    }

    #[test]
    fn test_tie_keeps_haplotype_a() {
        assert_eq!(
            select_haplotype(Some(&[0.5, 0.5]), Some(&[0.5])),
            Haplotype::A
        );
    }
}
