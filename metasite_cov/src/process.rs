use std::{
    sync::atomic::{AtomicBool, Ordering},
    thread,
};

use anyhow::Context;
use crossbeam_channel::{bounded, Receiver, Sender};

use crate::{
    config::Config,
    depth::{DepthSource, HtsDepth},
    diag::Diagnostics,
    matrix::{normalize, CoverageMatrix, MatrixBuilder, NormalizedMatrix, ZeroRowPolicy},
    output,
    profile::{aggregate, focus, Profile},
    site::{read_site_file, Site},
    window::extract_window,
};

/// Settings for the steps after coverage collection
#[derive(Debug, Clone, Copy)]
pub struct ProfileParams {
    pub min_coverage: u32,
    pub zero_rows: ZeroRowPolicy,
    pub focus_range: usize,
    pub focus_relative: bool,
}

impl From<&Config> for ProfileParams {
    fn from(cfg: &Config) -> Self {
        Self {
            min_coverage: cfg.min_coverage(),
            zero_rows: cfg.zero_rows(),
            focus_range: cfg.focus_range(),
            focus_relative: cfg.focus_relative(),
        }
    }
}

/// Everything computed for one run
pub struct MetaSiteResults {
    pub raw: CoverageMatrix,
    pub normalized: NormalizedMatrix,
    pub meta: Profile,
    pub focus: Profile,
}

/// Collect coverage for all sites from a single depth source
pub fn collect_coverage<D: DepthSource + ?Sized>(
    src: &mut D,
    sites: &[Site],
    range: usize,
    diag: &dyn Diagnostics,
) -> anyhow::Result<CoverageMatrix> {
    let mut builder = MatrixBuilder::new(range, diag);
    for site in sites.iter() {
        let cov = extract_window(src, site, range)
            .with_context(|| format!("Error getting coverage for site {}", site.key()))?;
        diag.trace(format_args!("Site {}: {:?}", site.key(), cov));
        builder.add(site, cov)?;
    }
    Ok(builder.finish())
}

type ExtractResult = anyhow::Result<(usize, Vec<u32>)>;

/// Read-only state shared by the extract tasks
struct ExtractShared<'a, F> {
    open: &'a F,
    sites: &'a [Site],
    range: usize,
    stop: &'a AtomicBool,
    diag: &'a dyn Diagnostics,
}

fn extract_task<D, F>(
    sh: &ExtractShared<'_, F>,
    ix: usize,
    recv: Receiver<usize>,
    snd: Sender<ExtractResult>,
) where
    D: DepthSource,
    F: Fn() -> anyhow::Result<D>,
{
    sh.diag.debug(format_args!("Extract task {} starting up", ix));
    let mut src = match (sh.open)() {
        Ok(s) => s,
        Err(e) => {
            sh.stop.store(true, Ordering::Relaxed);
            let _ = snd.send(Err(e));
            return;
        }
    };
    while let Ok(i) = recv.recv() {
        if sh.stop.load(Ordering::Relaxed) {
            break;
        }
        let site = &sh.sites[i];
        let res = extract_window(&mut src, site, sh.range)
            .with_context(|| format!("Error getting coverage for site {}", site.key()))
            .map(|cov| (i, cov));
        let failed = res.is_err();
        if failed {
            sh.stop.store(true, Ordering::Relaxed)
        }
        if snd.send(res).is_err() || failed {
            break;
        }
    }
    sh.diag.debug(format_args!("Extract task {} closing down", ix));
}

/// Collect coverage for all sites using nt worker threads.
///
/// Each worker opens its own depth source with open().  The matrix rows are in the
/// same order as the sites, so the result is the same as for collect_coverage.  The
/// first error stops the remaining jobs and is returned
pub fn collect_coverage_parallel<D, F>(
    open: F,
    nt: usize,
    sites: &[Site],
    range: usize,
    diag: &dyn Diagnostics,
) -> anyhow::Result<CoverageMatrix>
where
    D: DepthSource,
    F: Fn() -> anyhow::Result<D> + Sync,
{
    let nt = nt.max(1);
    let stop = AtomicBool::new(false);
    let shared = ExtractShared {
        open: &open,
        sites,
        range,
        stop: &stop,
        diag,
    };
    let mut cov: Vec<Option<Vec<u32>>> = vec![None; sites.len()];
    let mut first_err = None;

    thread::scope(|sc| {
        let (send_job, recv_job) = bounded(nt * 8);
        let (send_res, recv_res) = bounded(nt * 8);

        for ix in 0..nt {
            let (r, s) = (recv_job.clone(), send_res.clone());
            let sh = &shared;
            sc.spawn(move || extract_task(sh, ix + 1, r, s));
        }
        drop(recv_job);
        drop(send_res);

        // Feed jobs from a separate thread so that results can be collected here
        let stop = &stop;
        sc.spawn(move || {
            for i in 0..sites.len() {
                if stop.load(Ordering::Relaxed) || send_job.send(i).is_err() {
                    break;
                }
            }
        });

        for res in recv_res.iter() {
            match res {
                Ok((i, v)) => cov[i] = Some(v),
                Err(e) => {
                    if first_err.is_none() {
                        first_err = Some(e)
                    }
                }
            }
        }
    });

    if let Some(e) = first_err {
        return Err(e);
    }

    let mut builder = MatrixBuilder::new(range, diag);
    for (site, c) in sites.iter().zip(cov) {
        let c = c.ok_or_else(|| anyhow!("No coverage collected for site {}", site.key()))?;
        builder.add(site, c)?;
    }
    Ok(builder.finish())
}

/// Filter, normalize and aggregate the raw coverage matrix
pub fn summarize(
    raw: CoverageMatrix,
    params: &ProfileParams,
    diag: &dyn Diagnostics,
) -> anyhow::Result<MetaSiteResults> {
    let filtered = raw.filter_min_depth(params.min_coverage);
    diag.debug(format_args!(
        "{} of {} sites have minimum coverage >= {}",
        filtered.len(),
        raw.len(),
        params.min_coverage
    ));
    if filtered.is_empty() && !raw.is_empty() {
        diag.warn(format_args!(
            "All sites removed by minimum coverage filter ({})",
            params.min_coverage
        ))
    }
    let normalized = normalize(&filtered, params.zero_rows, diag)?;
    if normalized.is_empty() {
        diag.warn(format_args!("No sites left after filtering; profiles will be zero"))
    }
    diag.info(format_args!(
        "Aggregating {} sites over range {}",
        normalized.len(),
        raw.width() >> 1
    ));
    let meta = aggregate(&normalized);
    diag.debug(format_args!(
        "Meta profile covers positions {} to {}",
        meta.first_position(),
        meta.half_width()
    ));
    diag.info(format_args!(
        "Aggregating focus profile over range {}",
        params.focus_range
    ));
    let focus = focus(&normalized, params.focus_range, params.focus_relative, diag)?;
    Ok(MetaSiteResults {
        raw,
        normalized,
        meta,
        focus,
    })
}

/// Run the complete analysis described by cfg and write the output files
pub fn process_sites(cfg: &Config, diag: &dyn Diagnostics) -> anyhow::Result<()> {
    diag.info(format_args!("Running input file {}", cfg.bam().display()));

    let sites = read_site_file(cfg.sites(), cfg.score_cutoff(), diag)
        .with_context(|| "Could not read from site file")?;

    let open = || HtsDepth::open(cfg.bam(), cfg.reference(), cfg.read_filter(), diag);
    let raw = if cfg.threads() > 1 {
        collect_coverage_parallel(open, cfg.threads(), &sites, cfg.range(), diag)?
    } else {
        let mut src = open()?;
        collect_coverage(&mut src, &sites, cfg.range(), diag)?
    };
    diag.debug(format_args!("Collected coverage for {} sites", raw.len()));

    let res = summarize(raw, &ProfileParams::from(cfg), diag)?;
    output::output_results(cfg, &res, diag)?;
    diag.info(format_args!(
        "Finished successfully: {} of {} sites used in profiles",
        res.normalized.len(),
        res.raw.len()
    ));
    Ok(())
}
