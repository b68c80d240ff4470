use std::{path::PathBuf, process, sync::Arc};

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use structopt::StructOpt;

use gossamer_core::ParameterVector;
use gossamer_node::{logging, settings::Settings, Streamer};

#[macro_use]
extern crate tracing;

/// Weight initialization amplitude for seeded runs.
const INIT_AMPLITUDE: f32 = 0.01;

#[derive(Debug, StructOpt)]
#[structopt(name = "node", about = "A Gossamer gossip replica node.")]
struct Opt {
    /// Path of the configuration file
    #[structopt(short, parse(from_os_str))]
    config_path: PathBuf,
}

fn main() {
    let opt = Opt::from_args();

    let settings = Settings::new(opt.config_path).unwrap_or_else(|err| {
        eprintln!("{}", err);
        process::exit(1);
    });
    let Settings {
        cluster, params, log,
    } = settings;
    logging::configure(log);

    let topology = cluster.topology().unwrap_or_else(|err| {
        eprintln!("{}", err);
        process::exit(1);
    });
    let layout = cluster.layout();
    let params = Arc::new(match params.seed {
        Some(seed) => ParameterVector::randomized(
            params.len,
            layout,
            &mut ChaCha20Rng::seed_from_u64(seed),
            INIT_AMPLITUDE,
        ),
        None => ParameterVector::zeroed(params.len, layout),
    });
    info!(
        "replicating {} parameters in {} blocks of {}",
        params.len(),
        layout.blocks(params.len()),
        layout.block_len()
    );

    let streamer = Streamer::new(params, topology, layout)
        .unwrap_or_else(|err| {
            eprintln!("{}", err);
            process::exit(1);
        })
        .on_ready(|| info!("all blocks received at least once; weights ready"));

    let handle = streamer.start().unwrap_or_else(|err| {
        eprintln!("{}", err);
        process::exit(1);
    });

    // The streamer runs for the process lifetime; returning means the
    // endpoint failed for good.
    if let Err(err) = handle.join() {
        error!("gossip streamer failed: {}", err);
        process::exit(1);
    }
}
