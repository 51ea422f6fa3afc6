use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use mpi::topology::Communicator;
use serde::Serialize;

use orsort_core::config::pad_to_power_of_two;
use orsort_core::record::Record;
use orsort_core::worker::WorkerCoords;
use orsort_core::{orshuffle_sort, Entropy, TaskPool};
use orsort_transport_mpi::MpiTransport;

/// Obliviously shuffles and sorts a generated batch of records across the
/// MPI world, then prints per-rank timing.
#[derive(Parser, Debug)]
#[command(name = "sort-cli", about = "Oblivious-shuffle samplesort demo driver")]
struct CliArgs {
    /// Records to generate per worker before padding to the next power of two.
    #[arg(short = 'n', long = "records-per-worker", default_value_t = 1 << 16)]
    records_per_worker: usize,

    /// Number of task-pool threads per worker.
    #[arg(short = 'j', long = "threads", default_value_t = 4)]
    threads: usize,

    /// Emit a one-line JSON summary (rank 0 only) instead of plain text.
    #[arg(long = "json")]
    json: bool,
}

#[derive(Serialize)]
struct JsonSummary {
    total_records: usize,
    world_size: usize,
    elapsed_ms: u128,
}

fn generate_batch(world_rank: usize, count: usize) -> Vec<Record> {
    // Deterministic demo data: reverse-ordered keys offset by rank, so a
    // successful sort is trivially checkable by eye. Real record ingestion
    // is the caller's responsibility.
    (0..count)
        .map(|i| Record::new(((world_rank + 1) * count - i) as u64, 0))
        .collect()
}

fn main() {
    let universe = mpi::initialize().expect("MPI_Init failed");
    let world = universe.world();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = CliArgs::parse();

    let coords = WorkerCoords {
        world_rank: world.rank() as usize,
        world_size: world.size() as usize,
        num_threads: args.threads,
    };

    let _span = tracing::info_span!("worker", rank = coords.world_rank).entered();

    let live_length = pad_to_power_of_two(args.records_per_worker);
    let total_length = live_length * coords.world_size;

    let mut arr: Vec<Record> = generate_batch(coords.world_rank, args.records_per_worker);
    arr.resize(live_length, Record::new(u64::MAX, 0));
    arr.resize(live_length * 2, Record::new(0, 0));

    let transport = MpiTransport::new(world);
    let pool = TaskPool::new(coords.num_threads);
    let entropy = Arc::new(Entropy::init().expect("failed to initialize entropy source"));

    let start = Instant::now();
    let result = orshuffle_sort(&transport, &pool, &entropy, &mut arr, live_length, total_length);
    let elapsed = start.elapsed();

    match result {
        Ok(()) => {
            tracing::info!(rank = coords.world_rank, elapsed_ms = elapsed.as_millis(), "sort completed");
            if coords.world_rank == 0 {
                if args.json {
                    let summary = JsonSummary {
                        total_records: total_length,
                        world_size: coords.world_size,
                        elapsed_ms: elapsed.as_millis(),
                    };
                    println!("{}", serde_json::to_string(&summary).expect("JsonSummary always serializes"));
                } else {
                    println!("orshuffle_sort: {total_length} records across {} workers in {:?}", coords.world_size, elapsed);
                }
            }
        }
        Err(err) => {
            tracing::error!(rank = coords.world_rank, error = %err, "sort failed");
            world.barrier();
            std::process::exit(1);
        }
    }

    world.barrier();
}
