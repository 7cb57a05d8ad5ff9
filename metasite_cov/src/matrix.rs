use std::{collections::HashSet, fmt, str::FromStr};

use crate::{diag::Diagnostics, error::MetaSiteError, site::Site};

/// Raw coverage vectors, one row per site, all of the same width
///
/// Rows are kept in the order they were added; site keys are unique
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageMatrix {
    width: usize,
    rows: Vec<(String, Vec<u32>)>,
}

impl CoverageMatrix {
    pub fn new(half_width: usize) -> Self {
        Self {
            width: 2 * half_width,
            rows: Vec::new(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[(String, Vec<u32>)] {
        &self.rows
    }

    fn push(&mut self, key: String, cov: Vec<u32>) -> Result<(), MetaSiteError> {
        if cov.len() != self.width {
            Err(MetaSiteError::InconsistentWindow {
                site: key,
                expected: self.width,
                found: cov.len(),
            })
        } else {
            self.rows.push((key, cov));
            Ok(())
        }
    }

    /// Rows with min(row) >= floor.  Order and content of rows are unchanged
    pub fn filter_min_depth(&self, floor: u32) -> Self {
        Self {
            width: self.width,
            rows: self
                .rows
                .iter()
                .filter(|(_, v)| v.iter().min().map(|m| *m >= floor).unwrap_or(true))
                .cloned()
                .collect(),
        }
    }
}

/// Collects coverage vectors for sites into a CoverageMatrix
pub struct MatrixBuilder<'a> {
    matrix: CoverageMatrix,
    keys: HashSet<String>,
    diag: &'a dyn Diagnostics,
}

impl<'a> MatrixBuilder<'a> {
    pub fn new(half_width: usize, diag: &'a dyn Diagnostics) -> Self {
        Self {
            matrix: CoverageMatrix::new(half_width),
            keys: HashSet::new(),
            diag,
        }
    }

    /// Add coverage for a site.  Repeated sites are skipped (the first entry is kept)
    pub fn add(&mut self, site: &Site, cov: Vec<u32>) -> Result<(), MetaSiteError> {
        let key = site.key();
        if self.keys.contains(&key) {
            self.diag
                .warn(format_args!("Site {} occurs more than once; skipping", key));
            return Ok(());
        }
        self.matrix.push(key.clone(), cov)?;
        self.keys.insert(key);
        Ok(())
    }

    pub fn finish(self) -> CoverageMatrix {
        self.matrix
    }
}

/// How rows with zero coverage across the whole window are normalized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZeroRowPolicy {
    #[default]
    Exclude,
    Zero,
    Fail,
}

impl FromStr for ZeroRowPolicy {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exclude" => Ok(Self::Exclude),
            "zero" => Ok(Self::Zero),
            "fail" => Ok(Self::Fail),
            _ => Err("expected one of exclude, zero or fail"),
        }
    }
}

impl fmt::Display for ZeroRowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::Exclude => "exclude",
            Self::Zero => "zero",
            Self::Fail => "fail",
        };
        f.write_str(s)
    }
}

/// Round to 2 decimal places, ties to even
fn round2(x: f64) -> f64 {
    (x * 100.0).round_ties_even() / 100.0
}

/// Per-site scaled coverage in [0, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedMatrix {
    width: usize,
    rows: Vec<(String, Vec<f64>)>,
}

impl NormalizedMatrix {
    /// Every row must have length width
    pub fn from_rows(
        width: usize,
        rows: Vec<(String, Vec<f64>)>,
    ) -> Result<Self, MetaSiteError> {
        if let Some((k, v)) = rows.iter().find(|(_, v)| v.len() != width) {
            Err(MetaSiteError::InconsistentWindow {
                site: k.clone(),
                expected: width,
                found: v.len(),
            })
        } else {
            Ok(Self { width, rows })
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn half_width(&self) -> usize {
        self.width >> 1
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[(String, Vec<f64>)] {
        &self.rows
    }

    /// Columns [a, b) of every row, or None if [a, b) is not within the matrix
    pub fn columns(&self, a: usize, b: usize) -> Option<Self> {
        if a > b || b > self.width {
            return None;
        }
        Some(Self {
            width: b - a,
            rows: self
                .rows
                .iter()
                .map(|(k, v)| (k.clone(), v[a..b].to_vec()))
                .collect(),
        })
    }

    /// Scale a row so its maximum is 1.  The row must not be all zero
    fn scale_row(v: &[f64]) -> Vec<f64> {
        let max = v.iter().copied().fold(0.0, f64::max);
        v.iter().map(|x| round2(x / max)).collect()
    }
}

/// Divide every row by its maximum, rounding to 2 decimal places
pub fn normalize(
    cm: &CoverageMatrix,
    policy: ZeroRowPolicy,
    diag: &dyn Diagnostics,
) -> anyhow::Result<NormalizedMatrix> {
    let mut rows = Vec::with_capacity(cm.len());
    let mut n_zero = 0;
    for (key, v) in cm.rows() {
        let max = v.iter().copied().max().unwrap_or(0);
        if max == 0 {
            n_zero += 1;
            match policy {
                ZeroRowPolicy::Exclude => continue,
                ZeroRowPolicy::Zero => rows.push((key.clone(), vec![0.0; v.len()])),
                ZeroRowPolicy::Fail => return Err(MetaSiteError::DegenerateRow(key.clone()).into()),
            }
        } else {
            let v: Vec<f64> = v.iter().map(|x| *x as f64).collect();
            rows.push((key.clone(), NormalizedMatrix::scale_row(&v)))
        }
    }
    if n_zero > 0 {
        diag.warn(format_args!(
            "{} sites with zero coverage across the window ({} policy)",
            n_zero, policy
        ))
    }
    Ok(NormalizedMatrix::from_rows(cm.width(), rows)?)
}
