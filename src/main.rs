use std::io::{stdout, BufWriter};
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use kenrich::api;
use kenrich::cli::{Args, Command, OutputFormat};
use kenrich::data::KmerData;
use kenrich::error::Result;

fn main() {
    let args = Args::parse();

    let default_level = if args.quiet { "error" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(args) {
        eprintln!("kenrich: {err}");
        process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let data = dispatch(&args)?;
    let writer = BufWriter::new(stdout());
    match args.format {
        OutputFormat::Tsv => data.write_tsv(writer),
        OutputFormat::Json => data.write_json(writer),
    }
}

fn dispatch(args: &Args) -> Result<KmerData> {
    match &args.command {
        Command::Count { path, common } => {
            let opts = common.to_options(false, 1, args.quiet);
            api::count(path, &opts)
        }
        Command::Enrich {
            test,
            control,
            common,
            normalize,
        } => {
            let opts = common.to_options(*normalize, 1, args.quiet);
            api::enrichment(test.as_path(), control.as_deref(), &opts)
        }
        Command::Ikke {
            test,
            control,
            iters,
            common,
            normalize,
        } => {
            let opts = common.to_options(*normalize, *iters, args.quiet);
            api::ikke(test.as_path(), control.as_deref(), &opts)
        }
    }
}
