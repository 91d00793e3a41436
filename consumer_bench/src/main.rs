use std::error::Error;
use std::time::Instant;

use clap::Parser;
use serde_derive::{Deserialize, Serialize};

use mmqueue::{open_context, MemoryMappedQueue, QueueConfig};

#[derive(Parser)]
struct Opts {
    #[clap(short = 'c', long = "config", default_value = "mmqueue-consumer.toml")]
    config: String,
}

#[derive(Default, Debug, Serialize, Deserialize)]
struct ConsumerConfig {
    queue: QueueConfig,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();
    let opts: Opts = Opts::parse();
    let cfg: ConsumerConfig = confy::load_path(&opts.config)?;
    let queue = open_context(&cfg.queue)?;
    run(&queue)?;
    queue.close()?;
    Ok(())
}

fn run(queue: &MemoryMappedQueue) -> Result<(), Box<dyn Error>> {
    let start = Instant::now();
    let mut count = 0u64;

    while queue.dequeue()?.is_some() {
        count += 1;
        if count % 1_000_000 == 0 {
            eprint!("\rTotal {count} ops");
        }
    }
    let duration = start.elapsed();

    let millis = duration.as_millis().max(1);
    let iops = ((count as f64) / (millis as f64)) * 1_000f64;
    println!(
        "\n{:#?}K messages read/s. Total time: {:#?}",
        (iops / 1000f64) as u64,
        duration
    );
    Ok(())
}
