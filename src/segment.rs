use crate::genome_segment::GenomeSegment;

/// Mutable call state for one sample at one segment
#[derive(Clone, Debug)]
pub struct SegmentCall {
    /// Total copy number
    pub copy_number: usize,

    /// Major chromosome count, set only when allele evidence is usable
    pub major_chrom_count: Option<usize>,

    /// Phred-scaled copy number quality
    pub qscore: f64,

    /// Phred-scaled de novo quality, set only on probands with a putative
    /// de novo event
    pub de_novo_qscore: Option<f64>,

    /// Filter labels applied to the final call, joined with ';'
    pub filter: Option<String>,
}

impl Default for SegmentCall {
    fn default() -> Self {
        Self {
            copy_number: 2,
            major_chrom_count: None,
            qscore: 0.0,
            de_novo_qscore: None,
            filter: None,
        }
    }
}

/// Depth and allele evidence for one sample at one segment
#[derive(Clone, Debug, Default)]
pub struct SampleSegmentData {
    /// Median depth of each bin covering the segment
    pub bin_depths: Vec<f64>,

    /// B-allele SNV observations as (count_a, count_b) pairs
    pub allele_counts: Vec<(u32, u32)>,

    pub call: SegmentCall,
}

impl SampleSegmentData {
    /// Median bin depth after trimming `trimmed_bins` bins from each end
    ///
    /// Trimming only applies when enough bins remain afterwards, so short
    /// segments fall back to the plain median.
    ///
    pub fn median_coverage(&self, trimmed_bins: usize) -> f64 {
        if self.bin_depths.is_empty() {
            return 0.0;
        }

        let mut depths = self.bin_depths.clone();
        depths.sort_by(|a, b| a.partial_cmp(b).unwrap());

        let depths = if depths.len() > 2 * trimmed_bins {
            &depths[trimmed_bins..depths.len() - trimmed_bins]
        } else {
            &depths[..]
        };

        let mid = depths.len() / 2;
        if depths.len() % 2 == 1 {
            depths[mid]
        } else {
            (depths[mid - 1] + depths[mid]) / 2.0
        }
    }
}

/// One candidate interval carrying the evidence and call state of every sample
///
/// Sample entries follow the working sample list order.
///
#[derive(Clone, Debug)]
pub struct MultiSampleSegment {
    pub segment: GenomeSegment,
    pub samples: Vec<SampleSegmentData>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Haplotype {
    A,
    B,
}

/// Two alternative segmentations of the same genomic span
///
/// At most one of the two lists may be absent; the selected haplotype is
/// written exactly once per set and identifies the list realizing the final
/// calls.
///
pub struct SegmentSet {
    pub haplotype_a: Option<Vec<MultiSampleSegment>>,
    pub haplotype_b: Option<Vec<MultiSampleSegment>>,
    pub selected: Option<Haplotype>,
}

impl SegmentSet {
    pub fn from_single(segment: MultiSampleSegment) -> Self {
        Self {
            haplotype_a: Some(vec![segment]),
            haplotype_b: None,
            selected: None,
        }
    }

    pub fn from_alternatives(
        haplotype_a: Vec<MultiSampleSegment>,
        haplotype_b: Vec<MultiSampleSegment>,
    ) -> Self {
        assert!(!haplotype_a.is_empty() && !haplotype_b.is_empty());
        Self {
            haplotype_a: Some(haplotype_a),
            haplotype_b: Some(haplotype_b),
            selected: None,
        }
    }

    pub fn haplotype_segments(&self, haplotype: Haplotype) -> Option<&Vec<MultiSampleSegment>> {
        match haplotype {
            Haplotype::A => self.haplotype_a.as_ref(),
            Haplotype::B => self.haplotype_b.as_ref(),
        }
    }

    pub fn haplotype_segments_mut(
        &mut self,
        haplotype: Haplotype,
    ) -> Option<&mut Vec<MultiSampleSegment>> {
        match haplotype {
            Haplotype::A => self.haplotype_a.as_mut(),
            Haplotype::B => self.haplotype_b.as_mut(),
        }
    }

    pub fn select(&mut self, haplotype: Haplotype) {
        assert!(self.haplotype_segments(haplotype).is_some());
        assert!(self.selected.is_none() || self.selected == Some(haplotype));
        self.selected = Some(haplotype);
    }

    pub fn selected_segments(&self) -> &[MultiSampleSegment] {
        let haplotype = self.selected.expect("haplotype not yet selected");
        self.haplotype_segments(haplotype).unwrap()
    }

    /// Consume the set, returning the selected haplotype's segment list
    pub fn into_selected_segments(mut self) -> Vec<MultiSampleSegment> {
        let haplotype = self.selected.expect("haplotype not yet selected");
        match haplotype {
            Haplotype::A => self.haplotype_a.take().unwrap(),
            Haplotype::B => self.haplotype_b.take().unwrap(),
        }
    }
}

/// Per-sample SNV observations for one chromosome, sorted by position
pub type ChromAlleleCounts = Vec<(i64, u32, u32)>;

/// SNV observations for one sample indexed by chromosome
pub type SampleAlleleCounts = Vec<ChromAlleleCounts>;

/// An input candidate segment before segment set construction
pub struct SegmentInput {
    pub segment: GenomeSegment,

    /// Per-bin median depths for each sample; bin counts match across samples
    pub sample_bin_depths: Vec<Vec<f64>>,
}

/// Bucket each sample's SNV observations into the segment interval
fn bucket_allele_counts(
    segment: &GenomeSegment,
    allele_counts: &[SampleAlleleCounts],
) -> Vec<Vec<(u32, u32)>> {
    allele_counts
        .iter()
        .map(|sample_counts| {
            let chrom_counts = match sample_counts.get(segment.chrom_index) {
                Some(x) => x,
                None => return Vec::new(),
            };
            let begin = chrom_counts.partition_point(|&(pos, _, _)| pos < segment.range.start);
            let end = chrom_counts.partition_point(|&(pos, _, _)| pos < segment.range.end);
            chrom_counts[begin..end]
                .iter()
                .map(|&(_, count_a, count_b)| (count_a, count_b))
                .collect()
        })
        .collect()
}

/// Build one multi-sample segment over an interval from a bin slice of the input
fn build_segment(
    input: &SegmentInput,
    allele_counts: &[SampleAlleleCounts],
    interval: GenomeSegment,
    bin_range: std::ops::Range<usize>,
) -> MultiSampleSegment {
    let bucketed = bucket_allele_counts(&interval, allele_counts);
    let samples = input
        .sample_bin_depths
        .iter()
        .zip(bucketed)
        .map(|(bin_depths, sample_allele_counts)| SampleSegmentData {
            bin_depths: bin_depths[bin_range.clone()].to_vec(),
            allele_counts: sample_allele_counts,
            call: SegmentCall::default(),
        })
        .collect();
    MultiSampleSegment {
        segment: interval,
        samples,
    }
}

/// Boundaries strictly inside the segment where common CNV regions start or end
fn get_common_cnv_boundaries(
    segment: &GenomeSegment,
    common_cnv_regions: &[GenomeSegment],
) -> Vec<i64> {
    let mut boundaries = Vec::new();
    for region in common_cnv_regions {
        if !region.intersect(segment) {
            continue;
        }
        for pos in [region.range.start, region.range.end] {
            if pos > segment.range.start && pos < segment.range.end {
                boundaries.push(pos);
            }
        }
    }
    boundaries.sort_unstable();
    boundaries.dedup();
    boundaries
}

/// Build segment sets from input segments and optional common CNV regions
///
/// A segment overlapping common CNV boundaries gets an alternative haplotype
/// that splits it at those boundaries, with bins assigned to sub-intervals by
/// midpoint and SNV observations re-bucketed by position. All other segments
/// become single-haplotype sets.
///
pub fn build_segment_sets(
    segment_inputs: Vec<SegmentInput>,
    allele_counts: &[SampleAlleleCounts],
    common_cnv_regions: &[GenomeSegment],
) -> Vec<SegmentSet> {
    let mut segment_sets = Vec::with_capacity(segment_inputs.len());

    for input in segment_inputs {
        let bin_count = input.sample_bin_depths.first().map_or(0, |x| x.len());
        let whole =
            build_segment(&input, allele_counts, input.segment.clone(), 0..bin_count);

        let boundaries = get_common_cnv_boundaries(&input.segment, common_cnv_regions);
        if boundaries.is_empty() || bin_count == 0 {
            segment_sets.push(SegmentSet::from_single(whole));
            continue;
        }

        // Cut points bracketing each sub-interval of the alternative haplotype
        let mut cuts = vec![input.segment.range.start];
        cuts.extend(boundaries);
        cuts.push(input.segment.range.end);

        let bin_size = input.segment.range.size() as f64 / bin_count as f64;
        let bin_interval_index = |bin_index: usize| -> usize {
            let midpoint =
                input.segment.range.start as f64 + (bin_index as f64 + 0.5) * bin_size;
            let interval = cuts.partition_point(|&cut| (cut as f64) <= midpoint);
            interval.saturating_sub(1).min(cuts.len() - 2)
        };

        let mut pieces = Vec::new();
        let mut piece_start_bin = 0;
        let mut degenerate = false;
        for interval_index in 0..cuts.len() - 1 {
            let piece_end_bin = (piece_start_bin..bin_count)
                .find(|&bin_index| bin_interval_index(bin_index) != interval_index)
                .unwrap_or(bin_count);
            if piece_end_bin == piece_start_bin {
                // A sub-interval smaller than one bin has no depth evidence
                degenerate = true;
                break;
            }
            let interval = GenomeSegment::new(
                input.segment.chrom_index,
                cuts[interval_index],
                cuts[interval_index + 1],
            );
            pieces.push(build_segment(
                &input,
                allele_counts,
                interval,
                piece_start_bin..piece_end_bin,
            ));
            piece_start_bin = piece_end_bin;
        }

        if degenerate {
            segment_sets.push(SegmentSet::from_single(whole));
        } else {
            segment_sets.push(SegmentSet::from_alternatives(vec![whole], pieces));
        }
    }

    segment_sets
}
