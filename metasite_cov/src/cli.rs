use std::{num::NonZeroUsize, path::PathBuf};

use clap::{
    crate_authors, crate_description, crate_name, crate_version, value_parser, Arg, ArgAction,
    ArgMatches, Command,
};

use utils::{init_log, LogLevel};

use crate::{config::Config, matrix::ZeroRowPolicy};

/// Set up definition of command options for clap
fn cli_model() -> Command {
    Command::new(crate_name!())
        .about(crate_description!())
        .version(crate_version!())
        .author(crate_authors!())
        .arg(
            Arg::new("timestamp")
                .short('X')
                .long("timestamp")
                .value_parser(value_parser!(stderrlog::Timestamp))
                .value_name("GRANULARITY")
                .default_value("none")
                .help("Prepend log entries with a timestamp"),
        )
        .arg(
            Arg::new("loglevel")
                .short('l')
                .long("loglevel")
                .value_name("LOGLEVEL")
                .value_parser(value_parser!(LogLevel))
                .ignore_case(true)
                .default_value("info")
                .help("Set log level"),
        )
        .arg(
            Arg::new("quiet")
                .action(ArgAction::SetTrue)
                .long("quiet")
                .conflicts_with("loglevel")
                .help("Silence all output"),
        )
        .arg(
            Arg::new("threads")
                .short('t')
                .long("threads")
                .value_parser(value_parser!(NonZeroUsize))
                .value_name("INT")
                .default_value("1")
                .help("Set number of threads used to read coverage"),
        )
        .arg(
            Arg::new("bam")
                .short('b')
                .long("bam")
                .value_parser(value_parser!(PathBuf))
                .value_name("PATH")
                .required(true)
                .help("Input SAM/BAM/CRAM file (must be indexed)"),
        )
        .arg(
            Arg::new("sites")
                .short('s')
                .long("sites")
                .value_parser(value_parser!(PathBuf))
                .value_name("PATH")
                .required(true)
                .help("Tab separated site file (contig, -, position, -, score, strand)"),
        )
        .arg(
            Arg::new("range")
                .short('r')
                .long("range")
                .value_parser(value_parser!(usize))
                .value_name("INT")
                .required(true)
                .help("Range around each site (+- range); must be >= 5"),
        )
        .arg(
            Arg::new("sample")
                .short('n')
                .long("sample")
                .value_parser(value_parser!(String))
                .value_name("STRING")
                .required(true)
                .help("Sample name (used as prefix for output file names)"),
        )
        .arg(
            Arg::new("min_score")
                .short('S')
                .long("min-score")
                .value_parser(value_parser!(f64))
                .value_name("FLOAT")
                .help("Minimum site score (column 5 of site file)"),
        )
        .arg(
            Arg::new("min_coverage")
                .short('c')
                .long("min-coverage")
                .value_parser(value_parser!(u32))
                .value_name("INT")
                .default_value("0")
                .help("Discard sites with coverage below this anywhere in the range"),
        )
        .arg(
            Arg::new("focus_range")
                .short('f')
                .long("focus-range")
                .value_parser(value_parser!(usize))
                .value_name("INT")
                .default_value("5")
                .help("Range of focus profile around each site; must be <= range"),
        )
        .arg(
            Arg::new("focus_relative")
                .action(ArgAction::SetTrue)
                .long("focus-relative")
                .help("Scale focus profile by its value at the site"),
        )
        .arg(
            Arg::new("zero_rows")
                .short('z')
                .long("zero-rows")
                .value_parser(value_parser!(ZeroRowPolicy))
                .value_name("POLICY")
                .ignore_case(true)
                .default_value("exclude")
                .help("Handling of sites with no coverage: exclude, zero or fail"),
        )
        .arg(
            Arg::new("min_qual")
                .short('q')
                .long("min-qual")
                .value_parser(value_parser!(u8))
                .value_name("INT")
                .default_value("15")
                .help("Minimum base quality for a base to be counted"),
        )
        .arg(
            Arg::new("min_mapq")
                .short('Q')
                .long("min-mapq")
                .value_parser(value_parser!(u8))
                .value_name("INT")
                .default_value("0")
                .help("Minimum mapping quality for a read to be counted"),
        )
        .arg(
            Arg::new("reference")
                .short('T')
                .long("reference")
                .value_parser(value_parser!(PathBuf))
                .value_name("PATH")
                .help("Reference FASTA file (required for CRAM input)"),
        )
        .arg(
            Arg::new("output_dir")
                .short('d')
                .long("output-dir")
                .value_parser(value_parser!(PathBuf))
                .value_name("PATH")
                .help("Set output directory [default: current directory]"),
        )
}

fn config_from_matches(m: &ArgMatches) -> anyhow::Result<Config> {
    // Range is checked before the input files
    let mut cfg = Config::new(
        m.get_one::<PathBuf>("bam")
            .expect("Missing input file")
            .to_owned(),
        m.get_one::<PathBuf>("sites")
            .expect("Missing site file")
            .to_owned(),
        *m.get_one::<usize>("range").expect("Missing range"),
        m.get_one::<String>("sample")
            .expect("Missing sample name")
            .clone(),
    )?;

    cfg.set_focus_range(
        *m.get_one::<usize>("focus_range")
            .expect("Missing default focus range"),
    )?;

    if let Some(x) = m.get_one::<f64>("min_score") {
        cfg.set_score_cutoff(*x)
    }
    if let Some(x) = m.get_one::<u32>("min_coverage") {
        cfg.set_min_coverage(*x)
    }
    if m.get_flag("focus_relative") {
        cfg.set_focus_relative()
    }
    if let Some(p) = m.get_one::<ZeroRowPolicy>("zero_rows") {
        cfg.set_zero_rows(*p)
    }
    if let Some(x) = m.get_one::<u8>("min_qual") {
        cfg.set_min_qual(*x)
    }
    if let Some(x) = m.get_one::<u8>("min_mapq") {
        cfg.set_min_mapq(*x)
    }
    if let Some(p) = m.get_one::<PathBuf>("reference") {
        cfg.set_reference(p.to_owned())?
    }
    if let Some(p) = m.get_one::<PathBuf>("output_dir") {
        cfg.set_output_dir(p.to_owned())
    }
    if let Some(x) = m.get_one::<NonZeroUsize>("threads") {
        cfg.set_threads(usize::from(*x))
    }

    Ok(cfg)
}

/// Handle command line options.  Set up Config structure
pub fn handle_cli() -> anyhow::Result<Config> {
    // Get matches from command line
    let m = cli_model().get_matches();

    // Setup logging
    init_log(&m)?;

    debug!("Processing command line options");
    config_from_matches(&m)
}
