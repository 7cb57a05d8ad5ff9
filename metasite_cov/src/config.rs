use std::path::{Path, PathBuf};

use crate::{depth::ReadFilter, error::MetaSiteError, matrix::ZeroRowPolicy};

pub const MIN_RANGE: usize = 5;
pub const DEFAULT_FOCUS_RANGE: usize = 5;

/// Config
///
/// Configuration info for the program
/// This is generated from the command line arguments
/// Once set it is read only
///
/// bam - path to input SAM/BAM/CRAM file
/// sites - path to site table
/// range - half width of the window around each site (>= 5)
/// sample - sample name, used as prefix for output files
/// score_cutoff - minimum site score (sites without a numeric score are an error if set)
/// min_coverage - sites with any position below this depth are discarded
/// focus_range - half width of the focus profile (<= range)
/// focus_relative - scale focus profile by its value at the site
/// zero_rows - handling of sites with no coverage
/// reference - reference FASTA (needed for CRAM)
/// output_dir - output directory
/// min_mapq, min_qual - read and base filters for depth calculation
/// threads - number of extraction threads
///
pub struct Config {
    bam: PathBuf,
    sites: PathBuf,
    range: usize,
    sample: String,
    score_cutoff: Option<f64>,
    min_coverage: u32,
    focus_range: usize,
    focus_relative: bool,
    zero_rows: ZeroRowPolicy,
    reference: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    min_mapq: u8,
    min_qual: u8,
    threads: usize,
}

/// Check that the window half width is acceptable
pub fn check_range(range: usize) -> Result<(), MetaSiteError> {
    if range >= MIN_RANGE {
        Ok(())
    } else {
        Err(MetaSiteError::InvalidRange(range))
    }
}

/// Check that focus half width lies in 1..=range
pub fn check_focus_range(focus: usize, range: usize) -> Result<(), MetaSiteError> {
    if focus > 0 && focus <= range {
        Ok(())
    } else {
        Err(MetaSiteError::InvalidFocusRange { focus, range })
    }
}

/// Check that an input file exists
pub fn check_file(p: &Path) -> Result<(), MetaSiteError> {
    if p.is_file() {
        Ok(())
    } else {
        Err(MetaSiteError::MissingInput(p.to_owned()))
    }
}

impl Config {
    /// Validation is done before any file access: range first, then existence of
    /// the input files
    pub fn new(
        bam: PathBuf,
        sites: PathBuf,
        range: usize,
        sample: String,
    ) -> Result<Self, MetaSiteError> {
        check_range(range)?;
        check_file(&bam)?;
        check_file(&sites)?;
        Ok(Self {
            bam,
            sites,
            range,
            sample,
            score_cutoff: None,
            min_coverage: 0,
            focus_range: DEFAULT_FOCUS_RANGE,
            focus_relative: false,
            zero_rows: ZeroRowPolicy::default(),
            reference: None,
            output_dir: None,
            min_mapq: 0,
            min_qual: 15,
            threads: 1,
        })
    }

    pub fn set_score_cutoff(&mut self, x: f64) {
        self.score_cutoff = Some(x)
    }

    pub fn set_min_coverage(&mut self, x: u32) {
        self.min_coverage = x
    }

    pub fn set_focus_range(&mut self, x: usize) -> Result<(), MetaSiteError> {
        check_focus_range(x, self.range)?;
        self.focus_range = x;
        Ok(())
    }

    pub fn set_focus_relative(&mut self) {
        self.focus_relative = true
    }

    pub fn set_zero_rows(&mut self, p: ZeroRowPolicy) {
        self.zero_rows = p
    }

    pub fn set_reference(&mut self, p: PathBuf) -> Result<(), MetaSiteError> {
        check_file(&p)?;
        self.reference = Some(p);
        Ok(())
    }

    pub fn set_output_dir(&mut self, d: PathBuf) {
        self.output_dir = Some(d)
    }

    pub fn set_min_mapq(&mut self, x: u8) {
        self.min_mapq = x
    }

    pub fn set_min_qual(&mut self, x: u8) {
        self.min_qual = x
    }

    pub fn set_threads(&mut self, x: usize) {
        self.threads = x.max(1)
    }

    pub fn bam(&self) -> &Path {
        &self.bam
    }

    pub fn sites(&self) -> &Path {
        &self.sites
    }

    pub fn range(&self) -> usize {
        self.range
    }

    pub fn sample(&self) -> &str {
        &self.sample
    }

    pub fn score_cutoff(&self) -> Option<f64> {
        self.score_cutoff
    }

    pub fn min_coverage(&self) -> u32 {
        self.min_coverage
    }

    pub fn focus_range(&self) -> usize {
        self.focus_range
    }

    pub fn focus_relative(&self) -> bool {
        self.focus_relative
    }

    pub fn zero_rows(&self) -> ZeroRowPolicy {
        self.zero_rows
    }

    pub fn reference(&self) -> Option<&Path> {
        self.reference.as_deref()
    }

    pub fn output_dir(&self) -> Option<&Path> {
        self.output_dir.as_deref()
    }

    pub fn read_filter(&self) -> ReadFilter {
        ReadFilter::new(self.min_mapq, self.min_qual)
    }

    pub fn threads(&self) -> usize {
        self.threads
    }
}
