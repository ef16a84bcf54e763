use statrs::distribution::{Discrete, Poisson};

/// Parent copy number to offspring allele count transition probabilities
///
/// Row cn holds P(offspring allele count = g | parent copy number = cn) as a
/// Poisson pmf with rate max(cn/2, 0.1). Row 0 is overridden so that a zero
/// copy parent can only transmit zero alleles; transmission events outside
/// the matrix support are handled by the caller's de novo rate.
///
pub struct TransitionMatrix {
    probs: Vec<Vec<f64>>,
}

impl TransitionMatrix {
    pub fn new(max_copy_number: usize) -> Self {
        let mut probs = Vec::with_capacity(max_copy_number);
        for parent_cn in 0..max_copy_number {
            let row = if parent_cn == 0 {
                let mut row = vec![0.0; max_copy_number];
                row[0] = 1.0;
                row
            } else {
                let rate = (parent_cn as f64 / 2.0).max(0.1);
                let pd = Poisson::new(rate).unwrap();
                (0..max_copy_number)
                    .map(|allele_count| pd.pmf(allele_count as u64))
                    .collect()
            };
            probs.push(row);
        }
        Self { probs }
    }

    pub fn prob(&self, parent_cn: usize, allele_count: usize) -> f64 {
        self.probs[parent_cn][allele_count]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_copy_row() {
        let matrix = TransitionMatrix::new(5);
        assert_eq!(matrix.prob(0, 0), 1.0);
        for allele_count in 1..5 {
            assert_eq!(matrix.prob(0, allele_count), 0.0);
        }
    }

    #[test]
    fn test_poisson_rows() {
        let matrix = TransitionMatrix::new(5);

        // Value should match dpois(1, 1) in R
        approx::assert_ulps_eq!(matrix.prob(2, 1), 0.36787944117144233, max_ulps = 4);

        // A diploid parent most often transmits one allele
        let row2 = (0..5).map(|g| matrix.prob(2, g)).collect::<Vec<_>>();
        let best = row2
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap()
            .0;
        assert_eq!(best, 1);

        // All entries are proper probabilities
        for parent_cn in 0..5 {
            for allele_count in 0..5 {
                let p = matrix.prob(parent_cn, allele_count);
                assert!((0.0..=1.0).contains(&p));
            }
        }
    }
}
