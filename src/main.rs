use anyhow::Result;
use std::{env, path::PathBuf};
use structopt::StructOpt;
use tracing_subscriber::{filter::LevelFilter, prelude::*, EnvFilter};
use tsit_blocks::config;

#[derive(Debug, Clone, StructOpt)]
/// Builds the content/style translator and runs it on random inputs.
pub struct Args {
    #[structopt(long, default_value = "config.json5")]
    pub config: PathBuf,
    /// Overrides the directory where the weights are saved.
    #[structopt(long)]
    pub output_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    // setup tracing
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true).compact();
    let filter_layer = {
        let filter = EnvFilter::from_default_env();
        if env::var("RUST_LOG").is_err() {
            filter.add_directive(LevelFilter::INFO.into())
        } else {
            filter
        }
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();

    // parse config
    let Args { config, output_dir } = Args::from_args();
    let mut config = config::Config::load(&config)?;
    if output_dir.is_some() {
        config.run.output_dir = output_dir;
    }

    tsit_blocks::start(config)
}
