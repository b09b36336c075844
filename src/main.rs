//! The CLI entry point (§6): parses `Opt`, lowers it (plus an optional
//! `--config-file`) into a [`Context`], and runs the pass pipeline to
//! completion. Replaces the teacher's `tokio`-driven `git fast-import`
//! pipeline with the synchronous, multi-pass pipeline described in §5 -
//! there is no long-lived worker process to join here, so there is no
//! `tokio` runtime at all.

mod config;
mod error;
mod mirror;
mod output;
mod pipeline;

use structopt::StructOpt;

use config::{Context, Opt};
use error::{Classify, Kind};

fn main() {
    let opt = Opt::from_args();
    pretty_env_logger::formatted_timed_builder()
        .filter_level(verbosity_to_level(opt.verbose))
        .init();

    let result = Context::from_opt(opt).and_then(|mut ctx| pipeline::run(&mut ctx));

    if let Err(e) = result {
        match e.classify() {
            Kind::Fatal => log::error!("{}", e),
            Kind::Internal => log::error!("{} (this is a bug)", e),
            Kind::Anomaly => unreachable!("pipeline errors are never Kind::Anomaly"),
        }
        std::process::exit(1);
    }
}

fn verbosity_to_level(verbose: u8) -> log::LevelFilter {
    match verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    }
}
