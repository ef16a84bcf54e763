use std::fs::File;
use std::io::{BufRead, BufReader};

use camino::Utf8Path;
use log::info;
use simple_error::{bail, SimpleResult};

use crate::cli::Settings;
use crate::depth_model::GaussianDepthModel;
use crate::genome_segment::{ChromList, GenomeSegment};
use crate::pedigree::{read_pedigree_file, Pedigree};
use crate::sample::{Kin, Sample};
use crate::segment::{build_segment_sets, SampleAlleleCounts, SegmentInput, SegmentSet};

/// All loaded inputs required to run the calling pipeline
pub struct CallInputs {
    pub chrom_list: ChromList,
    pub samples: Vec<Sample>,
    pub pedigree: Option<Pedigree>,
    pub segment_sets: Vec<SegmentSet>,
}

/// One sample's parsed segmentation input
struct SampleSegments {
    segments: Vec<GenomeSegment>,
    bin_depths: Vec<Vec<f64>>,
}

fn read_lines(filename: &Utf8Path) -> SimpleResult<Vec<String>> {
    let file = match File::open(filename) {
        Ok(file) => file,
        Err(err) => bail!("Unable to open input file '{filename}': {err}"),
    };
    let mut lines = Vec::new();
    for line in BufReader::new(file).lines() {
        match line {
            Ok(line) => lines.push(line),
            Err(err) => bail!("Unable to read input file '{filename}': {err}"),
        }
    }
    Ok(lines)
}

fn parse_pos(field: &str, filename: &Utf8Path, line_number: usize) -> SimpleResult<i64> {
    match field.parse::<i64>() {
        Ok(value) if value >= 0 => Ok(value),
        _ => bail!("Invalid coordinate '{field}' on line {line_number} of '{filename}'"),
    }
}

/// Read one sample's segmentation file
///
/// Each line holds a half-open interval and its per-bin median depths:
/// `chrom begin end depth,depth,...`
///
fn read_segment_file(
    filename: &Utf8Path,
    sample_name: &str,
    chrom_list: &mut ChromList,
) -> SimpleResult<SampleSegments> {
    let mut segments = Vec::new();
    let mut bin_depths = Vec::new();

    for (line_index, line) in read_lines(filename)?.iter().enumerate() {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line_number = line_index + 1;

        let fields = line.split_whitespace().collect::<Vec<_>>();
        if fields.len() != 4 {
            bail!(
                "Unexpected column count on line {line_number} of segment file '{filename}' for sample '{sample_name}'"
            );
        }

        let chrom_index = chrom_list.add_chrom(fields[0]);
        let begin = parse_pos(fields[1], filename, line_number)?;
        let end = parse_pos(fields[2], filename, line_number)?;
        if end <= begin {
            bail!(
                "Invalid interval on line {line_number} of segment file '{filename}' for sample '{sample_name}'"
            );
        }

        let mut depths = Vec::new();
        for depth_field in fields[3].split(',') {
            let depth = match depth_field.parse::<f64>() {
                Ok(depth) if depth.is_finite() && depth >= 0.0 => depth,
                _ => bail!(
                    "Invalid bin depth '{depth_field}' on line {line_number} of segment file '{filename}' for sample '{sample_name}'"
                ),
            };
            depths.push(depth);
        }

        segments.push(GenomeSegment::new(chrom_index, begin, end));
        bin_depths.push(depths);
    }

    if segments.is_empty() {
        bail!("Segment file '{filename}' for sample '{sample_name}' contains no segments");
    }

    Ok(SampleSegments {
        segments,
        bin_depths,
    })
}

/// Read one sample's SNV B-allele observation file
///
/// Each line holds `chrom pos count_a count_b`; observations with fewer
/// total reads than the coverage threshold are dropped.
///
fn read_allele_count_file(
    filename: &Utf8Path,
    sample_name: &str,
    chrom_list: &ChromList,
    min_total_count: u32,
) -> SimpleResult<SampleAlleleCounts> {
    let mut counts: SampleAlleleCounts = vec![Vec::new(); chrom_list.data.len()];

    for (line_index, line) in read_lines(filename)?.iter().enumerate() {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line_number = line_index + 1;

        let fields = line.split_whitespace().collect::<Vec<_>>();
        if fields.len() != 4 {
            bail!(
                "Unexpected column count on line {line_number} of allele count file '{filename}' for sample '{sample_name}'"
            );
        }

        let chrom_index = match chrom_list.get_index(fields[0]) {
            Some(chrom_index) => chrom_index,
            None => bail!(
                "Allele count file '{filename}' for sample '{sample_name}' includes chromosome '{}', which is not found in the segmentation input",
                fields[0]
            ),
        };
        let pos = parse_pos(fields[1], filename, line_number)?;

        let parse_count = |field: &str| -> SimpleResult<u32> {
            match field.parse::<u32>() {
                Ok(count) => Ok(count),
                Err(_) => bail!(
                    "Invalid allele count '{field}' on line {line_number} of '{filename}'"
                ),
            }
        };
        let count_a = parse_count(fields[2])?;
        let count_b = parse_count(fields[3])?;

        // Only use observations with enough reads to inform the allele split
        if count_a + count_b < min_total_count {
            continue;
        }
        counts[chrom_index].push((pos, count_a, count_b));
    }

    for chrom_counts in counts.iter_mut() {
        chrom_counts.sort_unstable();
    }
    Ok(counts)
}

/// Read the expected-ploidy bed file
///
/// Each line holds `chrom start end ploidy [sample]`; entries without a
/// sample column apply to every sample.
///
fn read_ploidy_bed_file(
    filename: &Utf8Path,
    chrom_list: &ChromList,
    sample_names: &[String],
) -> SimpleResult<Vec<Vec<(GenomeSegment, u32)>>> {
    let mut sample_regions = vec![Vec::new(); sample_names.len()];

    for (line_index, line) in read_lines(filename)?.iter().enumerate() {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line_number = line_index + 1;

        let fields = line.split_whitespace().collect::<Vec<_>>();
        if fields.len() != 4 && fields.len() != 5 {
            bail!("Unexpected column count on line {line_number} of ploidy bed file '{filename}'");
        }

        let chrom_index = match chrom_list.get_index(fields[0]) {
            Some(chrom_index) => chrom_index,
            None => bail!(
                "Ploidy bed file '{filename}' includes chromosome '{}', which is not found in the segmentation input",
                fields[0]
            ),
        };
        let start = parse_pos(fields[1], filename, line_number)?;
        let end = parse_pos(fields[2], filename, line_number)?;
        let ploidy = match fields[3].parse::<u32>() {
            Ok(ploidy) => ploidy,
            Err(_) => bail!(
                "Invalid ploidy '{}' on line {line_number} of '{filename}'",
                fields[3]
            ),
        };

        let region = (GenomeSegment::new(chrom_index, start, end), ploidy);
        match fields.get(4) {
            Some(&sample_name) => {
                match sample_names.iter().position(|name| name == sample_name) {
                    Some(sample_index) => sample_regions[sample_index].push(region),
                    None => bail!(
                        "Ploidy bed file '{filename}' names unknown sample '{sample_name}' on line {line_number}"
                    ),
                }
            }
            None => {
                for regions in sample_regions.iter_mut() {
                    regions.push(region.clone());
                }
            }
        }
    }

    Ok(sample_regions)
}

/// Read the common CNV bed file used for alternative segment partitionings
fn read_common_cnv_bed_file(
    filename: &Utf8Path,
    chrom_list: &ChromList,
) -> SimpleResult<Vec<GenomeSegment>> {
    let mut regions = Vec::new();

    for (line_index, line) in read_lines(filename)?.iter().enumerate() {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line_number = line_index + 1;

        let fields = line.split_whitespace().collect::<Vec<_>>();
        if fields.len() < 3 {
            bail!(
                "Unexpected column count on line {line_number} of common CNV bed file '{filename}'"
            );
        }

        let chrom_index = match chrom_list.get_index(fields[0]) {
            Some(chrom_index) => chrom_index,
            None => bail!(
                "Common CNV bed file '{filename}' includes chromosome '{}', which is not found in the segmentation input",
                fields[0]
            ),
        };
        let start = parse_pos(fields[1], filename, line_number)?;
        let end = parse_pos(fields[2], filename, line_number)?;
        regions.push(GenomeSegment::new(chrom_index, start, end));
    }

    Ok(regions)
}

/// Resolve the working sample list as (name, kin, segment file) entries
///
/// With a pedigree the list follows pedigree order (probands first, parents
/// last); without one it follows the command line with no kinship assigned.
///
fn resolve_sample_list(
    settings: &Settings,
) -> SimpleResult<Vec<(String, Kin, camino::Utf8PathBuf)>> {
    let find_segment_file = |sample_name: &str| {
        settings
            .segments
            .iter()
            .find(|(name, _)| name == sample_name)
            .map(|(_, path)| path.clone())
    };

    match &settings.pedigree {
        Some(pedigree_filename) => {
            let members = read_pedigree_file(pedigree_filename)?;
            let mut sample_list = Vec::new();
            for (sample_name, kin) in members {
                match find_segment_file(&sample_name) {
                    Some(path) => sample_list.push((sample_name, kin, path)),
                    None => bail!(
                        "Pedigree member '{sample_name}' has no --segments input"
                    ),
                }
            }
            for (sample_name, _) in settings.segments.iter() {
                if !sample_list.iter().any(|(name, _, _)| name == sample_name) {
                    bail!(
                        "Sample '{sample_name}' is missing from pedigree file '{pedigree_filename}'"
                    );
                }
            }
            Ok(sample_list)
        }
        None => Ok(settings
            .segments
            .iter()
            .map(|(name, path)| (name.clone(), Kin::Other, path.clone()))
            .collect()),
    }
}

/// Load and cross-validate all inputs for the calling pipeline
pub fn load_call_inputs(settings: &Settings) -> SimpleResult<CallInputs> {
    let sample_list = resolve_sample_list(settings)?;
    let sample_names = sample_list
        .iter()
        .map(|(name, _, _)| name.clone())
        .collect::<Vec<_>>();

    // Read per-sample segmentation inputs onto a shared chromosome index
    let mut chrom_list = ChromList::new();
    let mut all_sample_segments = Vec::new();
    for (sample_name, _, filename) in sample_list.iter() {
        info!("Reading segmentation input for sample '{sample_name}' from '{filename}'");
        all_sample_segments.push(read_segment_file(filename, sample_name, &mut chrom_list)?);
    }

    // All samples must present an identical candidate segment list
    let first = &all_sample_segments[0];
    for (sample_index, sample_segments) in all_sample_segments.iter().enumerate().skip(1) {
        if sample_segments.segments != first.segments {
            bail!(
                "Segment intervals for sample '{}' disagree with sample '{}'",
                sample_names[sample_index],
                sample_names[0]
            );
        }
        for (segment_index, depths) in sample_segments.bin_depths.iter().enumerate() {
            if depths.len() != first.bin_depths[segment_index].len() {
                bail!(
                    "Bin counts for sample '{}' disagree with sample '{}' at segment {}",
                    sample_names[sample_index],
                    sample_names[0],
                    segment_index
                );
            }
        }
    }

    // Sample mean coverage over all segment bins
    let mean_coverages = all_sample_segments
        .iter()
        .enumerate()
        .map(|(sample_index, sample_segments)| {
            let mut total = 0.0;
            let mut count = 0usize;
            for depths in sample_segments.bin_depths.iter() {
                total += depths.iter().sum::<f64>();
                count += depths.len();
            }
            if count == 0 || total <= 0.0 {
                bail!(
                    "No usable depth bins found for sample '{}'",
                    sample_names[sample_index]
                );
            }
            Ok(total / count as f64)
        })
        .collect::<SimpleResult<Vec<_>>>()?;

    // Optional per-sample SNV allele observations
    let mut allele_counts =
        vec![vec![Vec::new(); chrom_list.data.len()]; sample_list.len()];
    for (filename_sample, filename) in settings.allele_counts.iter() {
        let sample_index = match sample_names.iter().position(|name| name == filename_sample) {
            Some(sample_index) => sample_index,
            None => bail!(
                "--allele-counts names unknown sample '{filename_sample}'"
            ),
        };
        info!("Reading allele counts for sample '{filename_sample}' from '{filename}'");
        allele_counts[sample_index] = read_allele_count_file(
            filename,
            filename_sample,
            &chrom_list,
            settings.median_coverage_threshold,
        )?;
    }
    // Optional expected-ploidy overrides
    let ploidy_regions = match &settings.ploidy_bed {
        Some(filename) => read_ploidy_bed_file(filename, &chrom_list, &sample_names)?,
        None => vec![Vec::new(); sample_list.len()],
    };

    // Optional common CNV regions driving alternative segmentations
    let common_cnv_regions = match &settings.common_cnv_bed {
        Some(filename) => read_common_cnv_bed_file(filename, &chrom_list)?,
        None => Vec::new(),
    };

    // Assemble samples with their likelihood models
    let mut samples = Vec::new();
    for (sample_index, (sample_name, kin, _)) in sample_list.iter().enumerate() {
        let mean_coverage = mean_coverages[sample_index];
        info!(
            "Sample '{sample_name}' ({kin}): mean coverage {mean_coverage:.3}"
        );
        let mut sample = Sample::new(
            sample_name.clone(),
            *kin,
            mean_coverage,
            settings.max_coverage_factor,
            Box::new(GaussianDepthModel::new(
                mean_coverage,
                settings.max_copy_number,
            )),
        );
        sample.ploidy_regions = ploidy_regions[sample_index].clone();
        samples.push(sample);
    }

    let pedigree = match settings.pedigree {
        Some(_) => Some(Pedigree::from_samples(&samples)?),
        None => None,
    };

    // Build segment sets from the shared interval list
    let segment_inputs = first
        .segments
        .iter()
        .enumerate()
        .map(|(segment_index, segment)| SegmentInput {
            segment: segment.clone(),
            sample_bin_depths: all_sample_segments
                .iter()
                .map(|sample_segments| sample_segments.bin_depths[segment_index].clone())
                .collect(),
        })
        .collect::<Vec<_>>();
    let segment_sets = build_segment_sets(segment_inputs, &allele_counts, &common_cnv_regions);

    info!(
        "Loaded {} samples and {} segment sets over {} chromosomes",
        samples.len(),
        segment_sets.len(),
        chrom_list.data.len()
    );

    Ok(CallInputs {
        chrom_list,
        samples,
        pedigree,
        segment_sets,
    })
}
