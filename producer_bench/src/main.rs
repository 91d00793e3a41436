use std::error::Error;
use std::time::Instant;

use clap::Parser;
use serde_derive::{Deserialize, Serialize};

use mmqueue::{create_context, Enqueue, MemoryMappedQueue, QueueConfig};

#[derive(Parser)]
struct Opts {
    #[clap(short = 'c', long = "config", default_value = "mmqueue-producer.toml")]
    config: String,
    /// Number of enqueue operations to time.
    #[clap(short = 'n', long = "count", default_value_t = 10_000_000)]
    count: u64,
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
    queue.close()?;
    Ok(())
}

fn run(queue: &MemoryMappedQueue, opts: &Opts) -> Result<(), Box<dyn Error>> {
    let slot_size = queue.slot_size() as usize;
    let width = slot_size.min(8);
    let mut buff = vec![0u8; slot_size];

    let start = Instant::now();
    let mut called = 0u64;
    while called < opts.count {
        buff[..width].copy_from_slice(&called.to_le_bytes()[..width]);
        if queue.enqueue(&buff)? == Enqueue::Full {
            // The queue is bounded; make room so the loop keeps measuring
            // the enqueue path rather than spinning on rejections.
            queue.dequeue()?;
            continue;
        }
        if called % 1_000_000 == 0 {
            eprint!("\rTotal {called} ops");
        }
        called += 1;
    }
    let duration = start.elapsed();

    let millis = duration.as_millis().max(1);
    let iops = ((called as f64) / (millis as f64)) * 1_000f64;
    println!(
        "\n{:#?}K messages write/s. Total time: {:#?}, busy iterations: {}",
        (iops / 1000f64) as u64,
        duration,
        queue.busy_iterations()
    );
    Ok(())
}
