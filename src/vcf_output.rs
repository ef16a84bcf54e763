use std::fs::File;
use std::io::{BufWriter, Write};

use camino::Utf8Path;
use log::info;
use unwrap::unwrap;

use crate::genome_segment::ChromList;
use crate::joint_call::CallerParams;
use crate::sample::Sample;
use crate::segment::{MultiSampleSegment, SampleSegmentData};

/// True when the sample's call differs from its expected copy number
fn is_variant_sample(
    segment: &MultiSampleSegment,
    sample: &Sample,
    sample_data: &SampleSegmentData,
) -> bool {
    sample_data.call.copy_number != sample.expected_ploidy(&segment.segment) as usize
}

/// Assign a symbolic alt allele to the CNV segment
///
/// A segment is a deletion or duplication when every variant sample moves the
/// same direction relative to its expected copy number; mixed directions take
/// the more general CNV type. Returns None when no sample is variant.
///
fn get_cnv_type(segment: &MultiSampleSegment, samples: &[Sample]) -> Option<&'static str> {
    let mut del = 0;
    let mut dup = 0;
    for (sample, sample_data) in samples.iter().zip(segment.samples.iter()) {
        let expected = sample.expected_ploidy(&segment.segment) as usize;
        match sample_data.call.copy_number.cmp(&expected) {
            std::cmp::Ordering::Less => del += 1,
            std::cmp::Ordering::Greater => dup += 1,
            std::cmp::Ordering::Equal => (),
        }
    }
    let total = del + dup;
    if total == 0 {
        None
    } else if del == total {
        Some("DEL")
    } else if dup == total {
        Some("DUP")
    } else {
        Some("CNV")
    }
}

fn write_vcf_header(
    f: &mut BufWriter<File>,
    chrom_list: &ChromList,
    sample_names: &[&str],
    params: &CallerParams,
) {
    let quality_filter = format!("q{:.0}", params.quality_filter_threshold);
    let size_filter = format!("L{}", params.minimum_call_size);

    writeln!(f, "##fileformat=VCFv4.2").unwrap();
    writeln!(
        f,
        "##source={}_v{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    )
    .unwrap();
    writeln!(f, "##FILTER=<ID=PASS,Description=\"All filters passed\">").unwrap();
    writeln!(
        f,
        "##FILTER=<ID={quality_filter},Description=\"Quality below {:.0}\">",
        params.quality_filter_threshold
    )
    .unwrap();
    writeln!(
        f,
        "##FILTER=<ID={size_filter},Description=\"Call smaller than {} bases\">",
        params.minimum_call_size
    )
    .unwrap();
    writeln!(
        f,
        "##INFO=<ID=END,Number=1,Type=Integer,Description=\"End position of the variant\">"
    )
    .unwrap();
    writeln!(
        f,
        "##INFO=<ID=SVLEN,Number=1,Type=Integer,Description=\"Length of the variant\">"
    )
    .unwrap();
    writeln!(
        f,
        "##INFO=<ID=SVTYPE,Number=1,Type=String,Description=\"Type of the variant\">"
    )
    .unwrap();
    writeln!(f, "##ALT=<ID=DEL,Description=\"Deletion\">").unwrap();
    writeln!(f, "##ALT=<ID=DUP,Description=\"Duplication\">").unwrap();
    writeln!(f, "##ALT=<ID=CNV,Description=\"Copy number variant\">").unwrap();
    writeln!(
        f,
        "##FORMAT=<ID=CN,Number=1,Type=Integer,Description=\"Copy number\">"
    )
    .unwrap();
    writeln!(
        f,
        "##FORMAT=<ID=MCC,Number=1,Type=Integer,Description=\"Major chromosome count\">"
    )
    .unwrap();
    writeln!(
        f,
        "##FORMAT=<ID=QS,Number=1,Type=Float,Description=\"Phred-scaled copy number quality\">"
    )
    .unwrap();
    writeln!(
        f,
        "##FORMAT=<ID=DQ,Number=1,Type=Float,Description=\"Phred-scaled de novo quality\">"
    )
    .unwrap();
    for chrom_label in chrom_list.data.iter() {
        writeln!(f, "##contig=<ID={chrom_label}>").unwrap();
    }
    writeln!(
        f,
        "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\t{}",
        sample_names.join("\t")
    )
    .unwrap();
}

/// Format one sample's CN:MCC:QS:DQ entry
fn format_sample_fields(sample_data: &SampleSegmentData, params: &CallerParams) -> String {
    let mcc = match sample_data.call.major_chrom_count {
        Some(mcc) => mcc.to_string(),
        None => ".".to_string(),
    };
    let dq = match sample_data.call.de_novo_qscore {
        Some(dqs) if dqs >= params.de_novo_quality_filter_threshold => format!("{dqs:.2}"),
        _ => ".".to_string(),
    };
    format!(
        "{}:{}:{:.2}:{}",
        sample_data.call.copy_number, mcc, sample_data.call.qscore, dq
    )
}

/// Record-level filter: the labels shared by every emitted sample's call
///
/// Per-sample labels are assigned by the final merge; a record passes when
/// any emitted sample carries an unfiltered call.
///
fn get_record_filter(segment: &MultiSampleSegment, sample_indices: &[usize]) -> String {
    let mut shared: Option<Vec<&str>> = None;
    for &sample_index in sample_indices {
        let labels = match segment.samples[sample_index].call.filter.as_deref() {
            Some(filter) => filter.split(';').collect::<Vec<_>>(),
            None => Vec::new(),
        };
        shared = Some(match shared {
            Some(shared) => shared.into_iter().filter(|x| labels.contains(x)).collect(),
            None => labels,
        });
    }
    match shared {
        Some(labels) if !labels.is_empty() => labels.join(";"),
        _ => "PASS".to_string(),
    }
}

/// Write CNV records for a subset of samples to one VCF file
fn write_cnv_vcf_file(
    filename: &Utf8Path,
    chrom_list: &ChromList,
    samples: &[Sample],
    sample_indices: &[usize],
    segments: &[MultiSampleSegment],
    params: &CallerParams,
) {
    info!("Writing copy number variants to file: '{filename}'");

    let f = unwrap!(
        File::create(filename),
        "Unable to create vcf output file: '{}'",
        filename
    );
    let mut f = BufWriter::new(f);

    let sample_names = sample_indices
        .iter()
        .map(|&sample_index| samples[sample_index].name.as_str())
        .collect::<Vec<_>>();
    write_vcf_header(&mut f, chrom_list, &sample_names, params);

    for segment in segments {
        // Only emit records where an included sample is a variant
        let any_variant = sample_indices.iter().any(|&sample_index| {
            is_variant_sample(segment, &samples[sample_index], &segment.samples[sample_index])
        });
        if !any_variant {
            continue;
        }

        let sv_type = match get_cnv_type(segment, samples) {
            Some(sv_type) => sv_type,
            None => continue,
        };

        let chrom_label = chrom_list.label(segment.segment.chrom_index);
        let pos = segment.segment.range.start + 1;
        let end = segment.segment.range.end;
        let id = format!("{}:{chrom_label}:{pos}-{end}", env!("CARGO_PKG_NAME"));

        let qual = sample_indices
            .iter()
            .filter(|&&sample_index| {
                is_variant_sample(
                    segment,
                    &samples[sample_index],
                    &segment.samples[sample_index],
                )
            })
            .map(|&sample_index| segment.samples[sample_index].call.qscore)
            .fold(0.0, f64::max);

        let sample_fields = sample_indices
            .iter()
            .map(|&sample_index| format_sample_fields(&segment.samples[sample_index], params))
            .collect::<Vec<_>>();

        writeln!(
            f,
            "{chrom_label}\t{pos}\t{id}\tN\t<{sv_type}>\t{qual:.2}\t{filter}\tEND={end};SVTYPE={sv_type};SVLEN={svlen}\tCN:MCC:QS:DQ\t{fields}",
            filter = get_record_filter(segment, sample_indices),
            svlen = segment.segment.range.size(),
            fields = sample_fields.join("\t")
        )
        .unwrap();
    }
}

/// Write the multi-sample VCF plus one single-sample VCF per pedigree member
pub fn write_cnv_vcf_files(
    output_dir: &Utf8Path,
    chrom_list: &ChromList,
    samples: &[Sample],
    segments: &[MultiSampleSegment],
    params: &CallerParams,
) {
    let all_indices = (0..samples.len()).collect::<Vec<_>>();
    write_cnv_vcf_file(
        &output_dir.join("cnv.vcf"),
        chrom_list,
        samples,
        &all_indices,
        segments,
        params,
    );

    for (sample_index, sample) in samples.iter().enumerate() {
        write_cnv_vcf_file(
            &output_dir.join(format!("{}.cnv.vcf", sample.name)),
            chrom_list,
            samples,
            &[sample_index],
            segments,
            params,
        );
    }
}
