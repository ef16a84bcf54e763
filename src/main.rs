mod cli;
mod copy_number_distribution;
mod depth_model;
mod genome_segment;
mod genotype;
mod joint_call;
mod pedigree;
mod prob_utils;
mod quality;
mod read_inputs;
mod run_stats;
mod sample;
mod segment;
mod transition;
mod vcf_output;

use std::path::Path;
use std::process;

use hhmmss::Hhmmss;
use log::info;
use simple_error::SimpleResult;

use crate::joint_call::run_joint_call;
use crate::read_inputs::load_call_inputs;

static PROG_NAME: &str = env!("CARGO_PKG_NAME");
static PROG_VERSION: &str = env!("CARGO_PKG_VERSION");

fn setup_logger(output_dir: Option<&Path>, debug: bool) -> Result<(), fern::InitError> {
    let level = if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    let logger = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                PROG_NAME,
                record.level(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr());

    let logger = if let Some(output_dir) = output_dir {
        let log_filename = output_dir.join(PROG_NAME.to_string() + ".log");
        logger.chain(fern::log_file(log_filename)?)
    } else {
        logger
    };

    logger.apply()?;
    Ok(())
}

/// Check and create output directory, then setup logger to write there
///
/// All error messaging in this method needs to account for no logger being setup yet.
///
fn setup_output_dir_and_logger(settings: &cli::Settings) {
    let mut output_dir_exists = false;
    if let Err(msg) = cli::check_novel_dirname(&settings.output_dir, "Output directory") {
        if settings.clobber && settings.output_dir.is_dir() {
            output_dir_exists = true;
        } else {
            eprintln!("Invalid command-line setting: {}", msg);
            std::process::exit(exitcode::USAGE);
        }
    };
    if !output_dir_exists {
        match std::fs::create_dir_all(&settings.output_dir) {
            Ok(_) => {}
            Err(e) => {
                panic!(
                    "Can't create new output directory at '{}': {}",
                    settings.output_dir, e
                );
            }
        }
    }
    setup_logger(Some(settings.output_dir.as_std_path()), settings.debug).unwrap();
}

fn run(settings: &cli::Settings) -> SimpleResult<()> {
    info!("Starting {PROG_NAME} {PROG_VERSION}");
    info!(
        "cmdline: {}",
        std::env::args().collect::<Vec<_>>().join(" ")
    );
    info!("Running on {} threads", settings.thread_count);

    let start = std::time::Instant::now();

    let inputs = load_call_inputs(settings)?;
    run_joint_call(settings, inputs);

    info!(
        "{PROG_NAME} completed. Total Runtime: {}",
        start.elapsed().hhmmssxxx()
    );
    Ok(())
}

fn main() {
    let settings = cli::parse_settings();

    // Validation of output_dir needs to be handled separately so that we don't log error messages
    // before logging is setup.
    setup_output_dir_and_logger(&settings);

    let settings = cli::validate_and_fix_settings(settings);

    if let Err(err) = run(&settings) {
        eprintln!("{}", err);
        process::exit(exitcode::DATAERR);
    }
}
