use std::collections::HashMap;

use crate::depth_model::DepthLikelihoodModel;
use crate::genome_segment::GenomeSegment;

/// Pedigree role of a sample
#[derive(Clone, Copy, Debug, Eq, PartialEq, strum::Display)]
pub enum Kin {
    Parent,
    Proband,
    Other,
}

/// Immutable sample identity and derived metadata
///
/// Constructed once per run from the external loaders and shared read-only
/// across worker threads; all mutable per-segment call state lives on the
/// segments instead.
///
pub struct Sample {
    pub name: String,
    pub kin: Kin,

    /// Mean per-bin coverage over all input segments
    pub mean_coverage: f64,

    /// Coverage observations are capped at this value before likelihood
    /// evaluation
    pub max_coverage: f64,

    /// Expected copy number overrides from the ploidy bed, half-open intervals
    pub ploidy_regions: Vec<(GenomeSegment, u32)>,

    /// Depth and allele-count likelihood model for this sample
    pub depth_model: Box<dyn DepthLikelihoodModel>,
}

impl Sample {
    pub fn new(
        name: String,
        kin: Kin,
        mean_coverage: f64,
        max_coverage_factor: f64,
        depth_model: Box<dyn DepthLikelihoodModel>,
    ) -> Self {
        assert!(mean_coverage > 0.0);
        Self {
            name,
            kin,
            mean_coverage,
            max_coverage: mean_coverage * max_coverage_factor,
            ploidy_regions: Vec::new(),
            depth_model,
        }
    }

    /// Expected copy number of this sample over a genomic interval
    ///
    /// Intervals without a ploidy bed override default to 2. An interval
    /// straddling different overrides takes the majority vote by overlap
    /// length.
    ///
    pub fn expected_ploidy(&self, segment: &GenomeSegment) -> u32 {
        let default_ploidy = 2;
        let segment_size = segment.range.size();

        // Start with assuming everything is 2 copy, then remove non-2s
        let mut ploidy_lookup = HashMap::new();
        ploidy_lookup.insert(default_ploidy, segment_size);

        for (region, ploidy) in self.ploidy_regions.iter() {
            if *ploidy == default_ploidy || !region.intersect(segment) {
                continue;
            }
            let overlap_start = std::cmp::max(segment.range.start, region.range.start);
            let overlap_end = std::cmp::min(segment.range.end, region.range.end);
            let overlap = overlap_end - overlap_start;
            assert!(overlap > 0);

            *ploidy_lookup.entry(default_ploidy).or_insert(0) -= overlap;
            *ploidy_lookup.entry(*ploidy).or_insert(0) += overlap;
        }

        ploidy_lookup
            .iter()
            .max_by(|a, b| a.1.cmp(b.1))
            .map(|(&ploidy, _)| ploidy)
            .unwrap()
    }
}
