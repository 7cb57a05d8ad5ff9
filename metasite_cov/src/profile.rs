use crate::{
    config::check_focus_range, diag::Diagnostics, error::MetaSiteError, matrix::NormalizedMatrix,
};

/// Column sums of a normalized matrix indexed by position relative to the site
///
/// values[i] is at relative position i - (half_width - 1), so the profile runs
/// from -(half_width - 1) to +half_width
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    half_width: usize,
    values: Vec<f64>,
}

impl Profile {
    pub fn half_width(&self) -> usize {
        self.half_width
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn first_position(&self) -> i64 {
        1 - self.half_width as i64
    }

    /// Value at a relative position
    pub fn get(&self, rel_pos: i64) -> Option<f64> {
        let i = rel_pos - self.first_position();
        if i < 0 {
            None
        } else {
            self.values.get(i as usize).copied()
        }
    }

    /// (relative position, value) pairs in order
    pub fn iter(&self) -> impl Iterator<Item = (i64, f64)> + '_ {
        let x0 = self.first_position();
        self.values
            .iter()
            .enumerate()
            .map(move |(i, v)| (x0 + i as i64, *v))
    }

    /// Divide all values by the value at relative position 0.
    /// Returns None if that value is 0
    pub fn relative_to_site(&self) -> Option<Self> {
        match self.get(0) {
            Some(z) if z != 0.0 => Some(Self {
                half_width: self.half_width,
                values: self.values.iter().map(|x| x / z).collect(),
            }),
            _ => None,
        }
    }
}

/// Sum the normalized matrix column-wise
pub fn aggregate(nm: &NormalizedMatrix) -> Profile {
    let mut values = vec![0.0; nm.width()];
    for (_, v) in nm.rows() {
        for (s, x) in values.iter_mut().zip(v.iter()) {
            *s += *x
        }
    }
    Profile {
        half_width: nm.half_width(),
        values,
    }
}

/// Aggregate only the central 2 * focus_half_width columns of the matrix.
///
/// If relative is set then the profile is scaled by its value at the site; where that
/// value is zero the unscaled profile is returned with a warning.
/// focus_half_width must be between 1 and the half width of the matrix
pub fn focus(
    nm: &NormalizedMatrix,
    focus_half_width: usize,
    relative: bool,
    diag: &dyn Diagnostics,
) -> Result<Profile, MetaSiteError> {
    let hw = nm.half_width();
    check_focus_range(focus_half_width, hw)?;
    let cols = nm
        .columns(hw - focus_half_width, hw + focus_half_width)
        .ok_or(MetaSiteError::InvalidFocusRange {
            focus: focus_half_width,
            range: hw,
        })?;
    let prof = aggregate(&cols);
    Ok(if relative {
        prof.relative_to_site().unwrap_or_else(|| {
            diag.warn(format_args!(
                "Focus profile is zero at the site; leaving it unscaled"
            ));
            prof
        })
    } else {
        prof
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::testing::RecordingSink;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    fn row(k: &str, v: &[f64]) -> (String, Vec<f64>) {
        (k.to_owned(), v.to_vec())
    }

    #[fixture]
    fn nm() -> NormalizedMatrix {
        let a: Vec<f64> = (1..=12).map(|x| x as f64 / 12.0).collect();
        let b: Vec<f64> = (1..=12).rev().map(|x| x as f64 / 12.0).collect();
        let c = vec![0.5; 12];
        let rows = vec![row("a", &a), row("b", &b), row("c", &c)];
        NormalizedMatrix::from_rows(12, rows).unwrap()
    }

    #[rstest]
    fn test_aggregate_positions(nm: NormalizedMatrix) {
        let p = aggregate(&nm);
        let pos: Vec<_> = p.iter().map(|(x, _)| x).collect();
        assert_eq!(pos, (-5..=6).collect::<Vec<_>>());
        for v in p.values() {
            assert!((v - (13.0 / 12.0 + 0.5)).abs() < 1e-12);
        }
    }

    #[rstest]
    fn test_aggregate_commutative(nm: NormalizedMatrix) {
        let mut rows = nm.rows().to_vec();
        rows.reverse();
        rows.swap(0, 1);
        let shuffled = NormalizedMatrix::from_rows(12, rows).unwrap();
        let (p1, p2) = (aggregate(&shuffled), aggregate(&nm));
        assert_eq!(p1.half_width(), p2.half_width());
        for (x, y) in p1.values().iter().zip(p2.values()) {
            assert!((x - y).abs() < 1e-12);
        }
    }

    #[rstest]
    fn test_aggregate_empty() {
        let p = aggregate(&NormalizedMatrix::from_rows(10, Vec::new()).unwrap());
        assert_eq!(p.values(), &[0.0; 10]);
        assert_eq!(p.get(-4), Some(0.0));
        assert_eq!(p.get(-5), None);
        assert_eq!(p.get(6), None);
    }

    #[rstest]
    fn test_focus_full_width_is_meta_profile(nm: NormalizedMatrix) {
        let sink = RecordingSink::default();
        assert_eq!(focus(&nm, 6, false, &sink), Ok(aggregate(&nm)));
    }

    #[rstest]
    fn test_focus_slices_centre() {
        let v: Vec<f64> = (0..10).map(|x| x as f64 / 10.0).collect();
        let nm = NormalizedMatrix::from_rows(10, vec![row("a", &v)]).unwrap();
        let sink = RecordingSink::default();
        let p = focus(&nm, 2, false, &sink).unwrap();
        assert_eq!(
            p.iter().collect::<Vec<_>>(),
            vec![(-1, 0.3), (0, 0.4), (1, 0.5), (2, 0.6)]
        );
        // Full profile agrees at the same relative positions
        let full = aggregate(&nm);
        for (x, y) in p.iter() {
            assert_eq!(full.get(x), Some(y));
        }
    }

    #[rstest]
    fn test_focus_relative() {
        // Relative position 0 is column 3 for a half width of 4
        let v = vec![0.0, 0.0, 0.25, 1.0, 0.5, 0.5, 0.0, 0.0];
        let nm = NormalizedMatrix::from_rows(8, vec![row("a", &v), row("b", &v)]).unwrap();
        let sink = RecordingSink::default();
        let p = focus(&nm, 2, true, &sink).unwrap();
        assert_eq!(p.values(), &[0.25, 1.0, 0.5, 0.5]);
        assert_eq!(p.get(0), Some(1.0));
        assert!(sink.messages_at(log::Level::Warn).is_empty());
    }

    #[rstest]
    fn test_focus_relative_zero_at_site() {
        let v = vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let nm = NormalizedMatrix::from_rows(6, vec![row("a", &v)]).unwrap();
        let sink = RecordingSink::default();
        let p = focus(&nm, 3, true, &sink).unwrap();
        assert_eq!(p.values(), v.as_slice());
        assert_eq!(sink.messages_at(log::Level::Warn).len(), 1);
    }

    #[rstest]
    #[case(0)]
    #[case(7)]
    fn test_focus_out_of_range(nm: NormalizedMatrix, #[case] f: usize) {
        let sink = RecordingSink::default();
        assert_eq!(
            focus(&nm, f, false, &sink),
            Err(MetaSiteError::InvalidFocusRange { focus: f, range: 6 })
        );
    }
}
