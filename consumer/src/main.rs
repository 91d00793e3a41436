use std::error::Error;

use clap::Parser;
use serde_derive::{Deserialize, Serialize};

use mmqueue::{open_context, MemoryMappedQueue, QueueConfig};

#[derive(Parser)]
struct Opts {
    #[clap(short = 'c', long = "config", default_value = "mmqueue-consumer.toml")]
    config: String,
    /// Print every drained element instead of a periodic sample.
    #[clap(long)]
    verbose: bool,
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
    run(&queue, &opts)?;
    queue.close()?;
    Ok(())
}

fn run(queue: &MemoryMappedQueue, opts: &Opts) -> Result<(), Box<dyn Error>> {
    let width = (queue.slot_size() as usize).min(8);
    let mut drained = 0u64;

    while let Some(bytes) = queue.dequeue()? {
        let mut word = [0u8; 8];
        word[..width].copy_from_slice(&bytes[..width]);
        let value = u64::from_le_bytes(word);
        drained += 1;
        if opts.verbose || drained % 10_000 == 0 {
            println!("{drained}: {value}");
        }
    }

    println!(
        "drained {} elements, queue size now {}/{}",
        drained,
        queue.size(),
        queue.capacity()
    );
    Ok(())
}
