use std::{fmt, io::BufRead, path::Path, str::FromStr};

use anyhow::Context;
use compress_io::compress::CompressIo;
use utils::get_next_line;

use crate::{diag::Diagnostics, error::MetaSiteError};

// Columns used from the site table
const CTG_COL: usize = 0;
const POS_COL: usize = 2;
const SCORE_COL: usize = 4;
const STRAND_COL: usize = 5;
const MIN_COLUMNS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strand {
    Plus,
    Minus,
}

impl FromStr for Strand {
    type Err = MetaSiteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "+" => Ok(Self::Plus),
            "-" => Ok(Self::Minus),
            _ => Err(MetaSiteError::MalformedInput(format!(
                "Illegal strand '{}' (expected '+' or '-')",
                s
            ))),
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Plus => f.write_str("+"),
            Self::Minus => f.write_str("-"),
        }
    }
}

/// Site
///
/// contig - reference sequence name
/// position - 0-based coordinate of the site
/// strand - determines whether the window is read forward or mirrored
/// score - from column 5 of the site table if numeric
///
#[derive(Debug, Clone, PartialEq)]
pub struct Site {
    contig: String,
    position: usize,
    strand: Strand,
    score: Option<f64>,
}

impl Site {
    pub fn new(contig: &str, position: usize, strand: Strand, score: Option<f64>) -> Self {
        Self {
            contig: contig.to_owned(),
            position,
            strand,
            score,
        }
    }

    pub fn contig(&self) -> &str {
        &self.contig
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn strand(&self) -> Strand {
        self.strand
    }

    pub fn score(&self) -> Option<f64> {
        self.score
    }

    /// Identity key used for the coverage tables (contig:position:strand)
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.contig, self.position, self.strand)
    }
}

fn skip_line(fields: &[&str]) -> bool {
    match fields.first() {
        None => true,
        Some(s) => {
            s.is_empty() || s.starts_with('#') || s.starts_with("track") || s.starts_with("browser")
        }
    }
}

fn parse_site(fields: &[&str], score_cutoff: Option<f64>) -> anyhow::Result<Option<Site>> {
    if fields.len() < MIN_COLUMNS {
        return Err(MetaSiteError::MalformedInput(format!(
            "Found {} columns; at least {} are required",
            fields.len(),
            MIN_COLUMNS
        ))
        .into());
    }
    let position = fields[POS_COL].parse::<usize>().map_err(|_| {
        MetaSiteError::MalformedInput(format!("Illegal site position '{}'", fields[POS_COL]))
    })?;
    let strand = fields[STRAND_COL].parse::<Strand>()?;
    let score = fields[SCORE_COL].parse::<f64>().ok();

    if let Some(cutoff) = score_cutoff {
        match score {
            Some(x) if x >= cutoff => (),
            Some(_) => return Ok(None),
            None => {
                return Err(MetaSiteError::MalformedInput(format!(
                    "Score '{}' is not numeric but a score cutoff was requested",
                    fields[SCORE_COL]
                ))
                .into())
            }
        }
    }
    Ok(Some(Site::new(fields[CTG_COL], position, strand, score)))
}

/// Read sites from a reader.  name is only used for error messages
pub fn read_sites<R: BufRead>(
    mut rdr: R,
    name: &str,
    score_cutoff: Option<f64>,
    diag: &dyn Diagnostics,
) -> anyhow::Result<Vec<Site>> {
    let mut buf = String::new();
    let mut line = 0;
    let mut n_below_cutoff = 0;
    let mut sites = Vec::new();

    while let Some(fields) = get_next_line(&mut rdr, &mut buf)
        .with_context(|| format!("Error after reading {} lines from {}", line, name))?
    {
        line += 1;
        if skip_line(&fields) {
            continue;
        }
        match parse_site(&fields, score_cutoff)
            .with_context(|| format!("{}:{} Error parsing site", name, line))?
        {
            Some(site) => {
                diag.trace(format_args!("Adding site {} (score {:?})", site.key(), site.score()));
                sites.push(site)
            }
            None => n_below_cutoff += 1,
        }
    }

    diag.debug(format_args!(
        "Finished reading in {} lines from {}; found {} sites ({} below score cutoff)",
        line,
        name,
        sites.len(),
        n_below_cutoff
    ));
    if sites.is_empty() {
        diag.warn(format_args!("No sites retained from {}", name))
    }
    Ok(sites)
}

/// Read site table from file (compressed or not)
pub fn read_site_file<P: AsRef<Path>>(
    fname: P,
    score_cutoff: Option<f64>,
    diag: &dyn Diagnostics,
) -> anyhow::Result<Vec<Site>> {
    let fname = fname.as_ref();
    diag.debug(format_args!("Reading in site list from {}", fname.display()));

    let rdr = CompressIo::new()
        .path(fname)
        .bufreader()
        .with_context(|| format!("Error opening site file {}", fname.display()))?;

    read_sites(rdr, &fname.display().to_string(), score_cutoff, diag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::testing::RecordingSink;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::io::Write;

    const TABLE: &str = "chr1\t99\t100\t101\t7.5\t+\tx\n\
                         # comment\n\
                         \n\
                         chr1\t199\t200\t201\t2\t-\n\
                         chr2\t9\t10\t11\t.\t+\n";

    fn load(s: &str, cutoff: Option<f64>) -> anyhow::Result<Vec<Site>> {
        read_sites(s.as_bytes(), "test", cutoff, &RecordingSink::default())
    }

    fn kind(e: &anyhow::Error) -> Option<&MetaSiteError> {
        e.downcast_ref::<MetaSiteError>()
    }

    #[rstest]
    fn test_read_all_sites() {
        let sites = load(TABLE, None).unwrap();
        assert_eq!(
            sites,
            vec![
                Site::new("chr1", 100, Strand::Plus, Some(7.5)),
                Site::new("chr1", 200, Strand::Minus, Some(2.0)),
                Site::new("chr2", 10, Strand::Plus, None),
            ]
        );
        assert_eq!(sites[1].key(), "chr1:200:-");
    }

    #[rstest]
    #[case(2.0, 2)]
    #[case(5.0, 1)]
    #[case(10.0, 0)]
    fn test_score_cutoff(#[case] cutoff: f64, #[case] n: usize) {
        let table = "chr1\t0\t100\t0\t7.5\t+\nchr1\t0\t200\t0\t2\t-\n";
        assert_eq!(load(table, Some(cutoff)).unwrap().len(), n);
    }

    #[rstest]
    fn test_non_numeric_score_with_cutoff() {
        let e = load(TABLE, Some(1.0)).unwrap_err();
        assert!(matches!(kind(&e), Some(MetaSiteError::MalformedInput(_))));
        assert!(format!("{:#}", e).contains("test:5"));
    }

    #[rstest]
    #[case("chr1\t0\t100\t0\t1\n")]
    #[case("chr1\t0\tabc\t0\t1\t+\n")]
    #[case("chr1\t0\t-5\t0\t1\t+\n")]
    #[case("chr1\t0\t100\t0\t1\t.\n")]
    fn test_malformed_rows(#[case] table: &str) {
        let e = load(table, None).unwrap_err();
        assert!(matches!(kind(&e), Some(MetaSiteError::MalformedInput(_))));
    }

    #[rstest]
    fn test_empty_table_warns() {
        let sink = RecordingSink::default();
        let sites = read_sites("".as_bytes(), "empty", None, &sink).unwrap();
        assert!(sites.is_empty());
        assert_eq!(sink.messages_at(log::Level::Warn).len(), 1);
    }

    #[rstest]
    fn test_read_site_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sites.bed");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(TABLE.as_bytes()).unwrap();
        drop(f);
        let sites = read_site_file(&path, None, &RecordingSink::default()).unwrap();
        assert_eq!(sites.len(), 3);
    }
}
