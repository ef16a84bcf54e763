//! Track stats for the whole kindred run
//!

use std::fs::File;

use camino::Utf8Path;
use log::info;
use serde::{Deserialize, Serialize};
use unwrap::unwrap;

#[derive(Default, Deserialize, Serialize)]
pub struct CallRunStats {
    pub sample_count: usize,
    pub segment_set_count: usize,

    /// Segment sets carrying an alternative common-CNV haplotype
    pub alternative_haplotype_count: usize,

    pub merged_segment_count: usize,

    /// Proband calls passing the de novo quality filter
    pub de_novo_candidate_count: usize,

    pub total_call_time_secs: f64,
}

/// Write run_stats structure out in json format
pub fn write_call_run_stats(output_dir: &Utf8Path, run_stats: &CallRunStats) {
    let filename = output_dir.join("run_stats.json");

    info!("Writing run statistics to file: '{filename}'");

    let f = unwrap!(
        File::create(&filename),
        "Unable to create run statistics json file: '{}'",
        filename
    );

    serde_json::to_writer_pretty(&f, &run_stats).unwrap();
}
