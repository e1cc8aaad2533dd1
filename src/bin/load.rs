//! sstbatch Load Tool
//!
//! Bulk loads synthetic sorted rows into an in-memory, pre-split store and
//! reports what the batcher did.

use std::sync::Arc;

use clap::Parser;
use sstbatch::keys::{family_key, SplitKeyFormat};
use sstbatch::{BatcherConfig, MemStore, RangeDescriptorCache, SstBatcher};
use tracing_subscriber::{fmt, EnvFilter};

/// sstbatch bulk load driver
#[derive(Parser, Debug)]
#[command(name = "sstbatch-load")]
#[command(about = "Bulk load synthetic rows through the SST batcher")]
#[command(version)]
struct Args {
    /// Number of rows to load
    #[arg(short, long, default_value = "100000")]
    rows: u64,

    /// Column families per row (1 = plain keys)
    #[arg(short, long, default_value = "1")]
    families: u8,

    /// Value size in bytes
    #[arg(short, long, default_value = "100")]
    value_size: usize,

    /// Pre-split the store every N rows (0 = single range)
    #[arg(short, long, default_value = "25000")]
    split_every: u64,

    /// SST size flush threshold in KB
    #[arg(short = 'm', long, default_value = "1024")]
    max_sst_kb: u64,

    /// Disable proactive split/scatter requests
    #[arg(long)]
    no_scatter: bool,
}

fn row_key(row: u64) -> Vec<u8> {
    format!("row{:012}", row).into_bytes()
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sstbatch=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("sstbatch load v{}", sstbatch::VERSION);
    tracing::info!(
        "Loading {} rows x {} families, {} byte values",
        args.rows,
        args.families,
        args.value_size
    );

    let format = if args.families > 1 {
        SplitKeyFormat::FamilySuffix
    } else {
        SplitKeyFormat::Raw
    };

    let config = match BatcherConfig::builder()
        .max_sst_size(args.max_sst_kb * 1024)
        .split_key_format(format)
        .scatter_splits(!args.no_scatter)
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let splits: Vec<Vec<u8>> = if args.split_every > 0 {
        (args.split_every..args.rows)
            .step_by(args.split_every as usize)
            .map(row_key)
            .collect()
    } else {
        Vec::new()
    };
    let store = Arc::new(MemStore::with_splits(&splits));
    tracing::info!("Store pre-split into {} ranges", store.range_count());

    let range_cache: Arc<dyn RangeDescriptorCache> = store.clone();
    let mut batcher = match SstBatcher::with_store(config, store.clone(), Some(range_cache)) {
        Ok(b) => b,
        Err(e) => {
            tracing::error!("Failed to create batcher: {}", e);
            std::process::exit(1);
        }
    };

    let value = vec![b'v'; args.value_size];
    for row in 0..args.rows {
        let row = row_key(row);
        for family in 0..args.families.max(1) {
            let key = if args.families > 1 {
                family_key(&row, family)
            } else {
                row.clone()
            };
            if let Err(e) = batcher.add_key(&key, &value) {
                tracing::error!("Load failed at {}: {}", key.escape_ascii(), e);
                std::process::exit(1);
            }
        }
    }

    if let Err(e) = batcher.flush() {
        tracing::error!("Final flush failed: {}", e);
        std::process::exit(1);
    }
    batcher.close();

    let summary = batcher.summary();
    let counts = batcher.flush_counts();
    tracing::info!(
        "Loaded {} rows, {} entries, {} bytes",
        summary.rows,
        summary.entries,
        summary.data_size
    );
    tracing::info!(
        "Flushes: {} total ({} size, {} range, {} manual), {} files, {} range splits",
        counts.total,
        counts.size,
        counts.range_boundary,
        counts.manual,
        counts.files,
        batcher.sender().range_splits()
    );
    tracing::info!(
        "Split/scatter: {} requested, {} failed; store has {} ranges, {} keys",
        counts.split_requests,
        batcher.split_scatter_failures(),
        store.range_count(),
        store.len()
    );
}
