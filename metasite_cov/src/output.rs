use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Context;
use compress_io::compress::CompressIo;

use crate::{
    config::Config, diag::Diagnostics, matrix::CoverageMatrix, process::MetaSiteResults,
    profile::Profile,
};

fn get_file_path(dir: Option<&Path>, name: String) -> PathBuf {
    let mut p = dir.map(|d| d.to_owned()).unwrap_or_else(PathBuf::new);
    p.push(name);
    p
}

/// Raw coverage table: one row per site, one column per window position
pub fn write_raw_table<W: Write + ?Sized>(
    wrt: &mut W,
    cm: &CoverageMatrix,
) -> anyhow::Result<()> {
    write!(wrt, "site")?;
    for i in 0..cm.width() {
        write!(wrt, "\t{}", i)?;
    }
    writeln!(wrt)?;
    for (key, v) in cm.rows() {
        write!(wrt, "{}", key)?;
        for x in v.iter() {
            write!(wrt, "\t{}", x)?;
        }
        writeln!(wrt)?;
    }
    Ok(())
}

/// Profile as comma separated (relative position, value) rows
pub fn write_profile<W: Write + ?Sized>(wrt: &mut W, prof: &Profile) -> anyhow::Result<()> {
    writeln!(wrt, "position,coverage")?;
    for (x, v) in prof.iter() {
        writeln!(wrt, "{},{:.4}", x, v)?;
    }
    Ok(())
}

fn output_file<F>(path: &Path, diag: &dyn Diagnostics, f: F) -> anyhow::Result<()>
where
    F: FnOnce(&mut dyn Write) -> anyhow::Result<()>,
{
    diag.debug(format_args!("Writing {}", path.display()));
    let mut wrt = CompressIo::new()
        .path(path)
        .bufwriter()
        .with_context(|| format!("problem creating output file {}", path.display()))?;
    f(&mut wrt).with_context(|| format!("Error writing to {}", path.display()))?;
    wrt.flush()
        .with_context(|| format!("Error writing to {}", path.display()))
}

/// Write raw coverage table, meta profile and focus profile for the sample
pub fn output_results(
    cfg: &Config,
    res: &MetaSiteResults,
    diag: &dyn Diagnostics,
) -> anyhow::Result<()> {
    let dir = cfg.output_dir();
    if let Some(d) = dir {
        if !d.exists() {
            fs::create_dir_all(d)
                .with_context(|| format!("Error creating output directory {}", d.display()))?;
        }
    }
    let (sample, range) = (cfg.sample(), cfg.range());

    let p = get_file_path(dir, format!("{}_coverageSite_range{}.tsv", sample, range));
    output_file(&p, diag, |w| write_raw_table(w, &res.raw))?;

    let p = get_file_path(dir, format!("{}_plotData_line_range{}.csv", sample, range));
    output_file(&p, diag, |w| write_profile(w, &res.meta))?;

    let p = get_file_path(
        dir,
        format!("{}_plotData_bar_range{}.csv", sample, cfg.focus_range()),
    );
    output_file(&p, diag, |w| write_profile(w, &res.focus))?;

    diag.info(format_args!("Output written for sample {}", sample));
    Ok(())
}
