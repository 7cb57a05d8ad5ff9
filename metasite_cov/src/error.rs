use std::path::PathBuf;

use thiserror::Error;

/// Fatal conditions of a meta-site run
///
/// These are wrapped in anyhow::Error as they propagate, with file and line
/// context added; use downcast_ref to get the variant back
#[derive(Error, Debug, PartialEq)]
pub enum MetaSiteError {
    #[error("Input file {0} not found")]
    MissingInput(PathBuf),

    #[error("Range must be >= 5 (found {0})")]
    InvalidRange(usize),

    #[error("Focus range must be between 1 and the range {range} (found {focus})")]
    InvalidFocusRange { focus: usize, range: usize },

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Coverage vector for site {site} has length {found}; expected {expected}")]
    InconsistentWindow {
        site: String,
        expected: usize,
        found: usize,
    },

    #[error("Site {0} has zero coverage across its window and cannot be normalized")]
    DegenerateRow(String),

    #[error("Contig {0} not found in alignment file")]
    UnknownContig(String),
}
