mod cli;
mod config;
mod depth;
mod diag;
mod error;
mod matrix;
mod output;
mod process;
mod profile;
mod site;
mod window;

#[macro_use]
extern crate log;
#[macro_use]
extern crate anyhow;

use anyhow::Context;

use crate::diag::LogSink;

fn main() -> anyhow::Result<()> {
    let cfg = cli::handle_cli().with_context(|| "Error processing command line arguments")?;
    process::process_sites(&cfg, &LogSink)
}
