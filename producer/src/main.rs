use std::error::Error;

use clap::Parser;
use serde_derive::{Deserialize, Serialize};

use mmqueue::{create_context, Enqueue, MemoryMappedQueue, QueueConfig};

#[derive(Parser)]
struct Opts {
    #[clap(short = 'c', long = "config", default_value = "mmqueue-producer.toml")]
    config: String,
    /// Number of elements to enqueue.
    #[clap(short = 'n', long = "count", default_value_t = 1000)]
    count: u64,
    /// Force mapped pages to disk before exiting.
    #[clap(long)]
    flush: bool,
}

#[derive(Default, Debug, Serialize, Deserialize)]
struct ProducerConfig {
    queue: QueueConfig,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();
    let opts: Opts = Opts::parse();
    let cfg: ProducerConfig = confy::load_path(&opts.config)?;
    let queue = create_context(&cfg.queue)?;
    run(&queue, &opts)?;
    if opts.flush {
        queue.flush()?;
    }
    queue.close()?;
    Ok(())
}

fn run(queue: &MemoryMappedQueue, opts: &Opts) -> Result<(), Box<dyn Error>> {
    let slot_size = queue.slot_size() as usize;
    let width = slot_size.min(8);
    let mut buff = vec![0u8; slot_size];

    let mut enqueued = 0u64;
    let mut rejected = 0u64;
    for n in 0..opts.count {
        buff.fill(0);
        buff[..width].copy_from_slice(&n.to_le_bytes()[..width]);
        match queue.enqueue(&buff)? {
            Enqueue::Enqueued => enqueued += 1,
            Enqueue::Full => rejected += 1,
        }
    }

    println!(
        "enqueued {} elements ({} rejected as full), queue size now {}/{}",
        enqueued,
        rejected,
        queue.size(),
        queue.capacity()
    );
    Ok(())
}
