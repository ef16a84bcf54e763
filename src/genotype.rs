use std::collections::HashSet;

use itertools::Itertools;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Ordered allele-count pair for one sample at one segment
///
/// For offspring genotypes, `counts_a` is the allele count transmitted by
/// parent1 and `counts_b` the count transmitted by parent2.
///
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Genotype {
    pub counts_a: usize,
    pub counts_b: usize,
}

impl Genotype {
    pub fn new(counts_a: usize, counts_b: usize) -> Self {
        Self { counts_a, counts_b }
    }

    pub fn total(&self) -> usize {
        self.counts_a + self.counts_b
    }

    /// The larger of the two allele counts
    pub fn major_count(&self) -> usize {
        std::cmp::max(self.counts_a, self.counts_b)
    }
}

/// All (a,b) genotypes with a+b below the copy number cap
///
/// Order is deterministic: total allele count ascending, then `counts_a`
/// ascending within each total.
///
pub fn parental_genotypes(max_copy_number: usize) -> Vec<Genotype> {
    let mut genotypes = Vec::new();
    for total in 0..max_copy_number {
        for counts_a in 0..=total {
            genotypes.push(Genotype::new(counts_a, total - counts_a));
        }
    }
    genotypes
}

/// Genotypes partitioning each copy number into its (a, cn-a) splits
///
/// Indexed by copy number for cn in [0, max_copy_number); entry cn holds
/// cn+1 genotypes.
///
pub fn genotypes_by_copy_number(max_copy_number: usize) -> Vec<Vec<Genotype>> {
    (0..max_copy_number)
        .map(|cn| {
            (0..=cn)
                .map(|counts_a| Genotype::new(counts_a, cn - counts_a))
                .collect()
        })
        .collect()
}

/// The set of allele counts a chromosome can carry at the given total copy number
///
pub fn cn_allele_set(copy_number: usize) -> Vec<usize> {
    match copy_number {
        0 => vec![0],
        1 => vec![0, 1],
        _ => (1..=copy_number).collect(),
    }
}

/// All copy-number combinations with up to `max_allele_number` distinct states
///
/// Returns the union over r in [1, max_allele_number] of all r-subsets of
/// [0, max_copy_number), each subset sorted ascending.
///
pub fn copy_number_combinations(
    max_copy_number: usize,
    max_allele_number: usize,
) -> Vec<Vec<usize>> {
    let mut combinations = Vec::new();
    for subset_size in 1..=max_allele_number {
        for combination in (0..max_copy_number).combinations(subset_size) {
            combinations.push(combination);
        }
    }
    combinations
}

/// Per-offspring genotype vectors over the parental genotype list
///
/// When the full Cartesian product is within `max_vectors` the enumeration is
/// exhaustive and in product order. Above the cap the product is uniformly
/// sub-sampled without replacement to exactly `max_vectors` entries, using a
/// seeded generator so repeat runs produce identical calls.
///
pub fn offspring_genotype_vectors(
    parental: &[Genotype],
    offspring_count: usize,
    max_vectors: usize,
    seed: u64,
) -> Vec<Vec<Genotype>> {
    assert!(!parental.is_empty());
    assert!(max_vectors > 0);

    if offspring_count == 0 {
        return vec![Vec::new()];
    }

    let base = parental.len();
    let decode = |flat_index: usize| -> Vec<Genotype> {
        let mut digits = vec![Genotype::new(0, 0); offspring_count];
        let mut rest = flat_index;
        for digit in digits.iter_mut().rev() {
            *digit = parental[rest % base];
            rest /= base;
        }
        digits
    };

    match base.checked_pow(offspring_count as u32) {
        Some(total) if total <= max_vectors => (0..total).map(decode).collect(),
        Some(total) => {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut indices = rand::seq::index::sample(&mut rng, total, max_vectors).into_vec();
            indices.sort_unstable();
            indices.into_iter().map(decode).collect()
        }
        None => {
            // The product size overflows usize, so draw distinct vectors directly
            let mut rng = StdRng::seed_from_u64(seed);
            let mut seen = HashSet::new();
            let mut vectors = Vec::with_capacity(max_vectors);
            while vectors.len() < max_vectors {
                let vector = (0..offspring_count)
                    .map(|_| parental[rng.gen_range(0..base)])
                    .collect::<Vec<_>>();
                if seen.insert(vector.clone()) {
                    vectors.push(vector);
                }
            }
            vectors
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parental_genotypes() {
        let genotypes = parental_genotypes(5);
        assert_eq!(genotypes.len(), 5 * 6 / 2);

        // Deterministic order: total ascending, counts_a ascending
        assert_eq!(genotypes[0], Genotype::new(0, 0));
        assert_eq!(genotypes[1], Genotype::new(0, 1));
        assert_eq!(genotypes[2], Genotype::new(1, 0));
        assert_eq!(genotypes[3], Genotype::new(0, 2));

        assert!(genotypes.iter().all(|g| g.total() < 5));
    }

    #[test]
    fn test_genotypes_by_copy_number() {
        let by_cn = genotypes_by_copy_number(5);
        assert_eq!(by_cn.len(), 5);
        for (cn, genotypes) in by_cn.iter().enumerate() {
            assert_eq!(genotypes.len(), cn + 1);
            assert!(genotypes.iter().all(|g| g.total() == cn));
        }
    }

    #[test]
    fn test_cn_allele_set() {
        assert_eq!(cn_allele_set(0), vec![0]);
        assert_eq!(cn_allele_set(1), vec![0, 1]);
        assert_eq!(cn_allele_set(2), vec![1, 2]);
        assert_eq!(cn_allele_set(4), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_copy_number_combinations() {
        let combinations = copy_number_combinations(5, 3);

        // No duplicates
        let unique = combinations.iter().collect::<HashSet<_>>();
        assert_eq!(unique.len(), combinations.len());

        // Every singleton is present
        for cn in 0..5 {
            assert!(combinations.contains(&vec![cn]));
        }

        // 5 singletons + 10 pairs + 10 triples
        assert_eq!(combinations.len(), 25);
    }

    #[test]
    fn test_offspring_genotype_vectors_exhaustive() {
        let parental = parental_genotypes(3);
        let vectors = offspring_genotype_vectors(&parental, 2, 500, 42);

        // 6 parental genotypes below the cap, so 36 pairs with no subsampling
        assert_eq!(vectors.len(), 36);
        assert_eq!(vectors[0], vec![Genotype::new(0, 0), Genotype::new(0, 0)]);

        let unique = vectors.iter().collect::<HashSet<_>>();
        assert_eq!(unique.len(), vectors.len());
    }

    #[test]
    fn test_offspring_genotype_vectors_subsampled() {
        let parental = parental_genotypes(5);

        // 15^3 = 3375 > 500, so the product is subsampled to the cap
        let vectors = offspring_genotype_vectors(&parental, 3, 500, 42);
        assert_eq!(vectors.len(), 500);

        let unique = vectors.iter().collect::<HashSet<_>>();
        assert_eq!(unique.len(), vectors.len());

        // Same seed reproduces the same selection, a different seed does not
        let replay = offspring_genotype_vectors(&parental, 3, 500, 42);
        assert_eq!(vectors, replay);
        let other = offspring_genotype_vectors(&parental, 3, 500, 43);
        assert_ne!(vectors, other);
    }

    #[test]
    fn test_offspring_genotype_vectors_no_offspring() {
        let parental = parental_genotypes(5);
        let vectors = offspring_genotype_vectors(&parental, 0, 500, 42);
        assert_eq!(vectors, vec![Vec::new()]);
    }
}
