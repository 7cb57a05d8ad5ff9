use crate::{
    depth::DepthSource,
    error::MetaSiteError,
    site::{Site, Strand},
};

/// Half-open genomic interval queried for a site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: i64,
    pub end: i64,
}

impl Window {
    /// Query interval for a site.  Minus strand windows are shifted one base to the left
    /// so that after reversal the output lines up with plus strand windows.
    pub fn for_site(site: &Site, half_width: usize) -> Self {
        let p = site.position() as i64;
        let hw = half_width as i64;
        match site.strand() {
            Strand::Plus => Self {
                start: p - hw,
                end: p + hw,
            },
            Strand::Minus => Self {
                start: p - (hw + 1),
                end: p + (hw - 1),
            },
        }
    }

    pub fn len(&self) -> usize {
        (self.end - self.start) as usize
    }
}

/// Get the oriented coverage vector for a site.
///
/// All depth channels returned by the source are summed, and the result is reversed
/// for sites on the minus strand
pub fn extract_window<D: DepthSource + ?Sized>(
    src: &mut D,
    site: &Site,
    half_width: usize,
) -> anyhow::Result<Vec<u32>> {
    let win = Window::for_site(site, half_width);
    let channels = src.get_depth(site.contig(), win.start, win.end)?;

    let mut cov = vec![0u32; win.len()];
    for ch in channels.iter() {
        if ch.len() != cov.len() {
            return Err(MetaSiteError::InconsistentWindow {
                site: site.key(),
                expected: cov.len(),
                found: ch.len(),
            }
            .into());
        }
        for (c, d) in cov.iter_mut().zip(ch.iter()) {
            *c += *d
        }
    }
    if site.strand() == Strand::Minus {
        cov.reverse()
    }
    Ok(cov)
}
