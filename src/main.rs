//! Command-line entry point: parse arguments, announce, run the worker
//! pool, and assemble the finished file.
use anyhow::Context;
use bitpour::download::{self, TaskQueue, Worker};
use bitpour::torrent::TorrentFile;
use bitpour::tracker;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "Download a single-file torrent")]
struct Args {
    /// Path to the .torrent metainfo file
    torrent: PathBuf,

    /// Number of concurrent peer sessions
    #[arg(long, default_value_t = 40)]
    workers: usize,

    /// Port advertised to the tracker (no listener is opened)
    #[arg(long, default_value_t = 6881)]
    port: u16,

    /// Directory the finished file is written into
    #[arg(long, default_value = ".")]
    output: PathBuf,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let torrent = TorrentFile::open(&args.torrent)
        .with_context(|| format!("could not load {}", args.torrent.display()))?;
    info!(
        name = %torrent.name,
        length = torrent.total_length(),
        pieces = torrent.num_pieces(),
        info_hash = %hex::encode(torrent.info_hash),
        "metainfo loaded"
    );

    let client = tracker::Client::new(args.port)?;
    let response = client.announce(&torrent).await?;
    anyhow::ensure!(!response.peers.is_empty(), "tracker returned no peers");
    info!(
        peers = response.peers.len(),
        interval = response.interval,
        "tracker responded"
    );

    let peers = Arc::new(TaskQueue::new());
    for peer in response.peers {
        peers.put(peer);
    }
    let pieces = Arc::new(TaskQueue::new());
    for task in download::piece_tasks(&torrent) {
        pieces.put(task);
    }
    let finished = Arc::new(TaskQueue::new());

    let mut pool = JoinSet::new();
    for id in 0..args.workers {
        let worker = Worker::new(
            id,
            &torrent,
            client.peer_id(),
            peers.clone(),
            pieces.clone(),
            finished.clone(),
        );
        pool.spawn(worker.run());
    }

    // If no peer can serve some piece this wait never ends: there is no
    // fallback peer source once the announce list is exhausted.
    pieces.join().await;

    pool.abort_all();
    while pool.join_next().await.is_some() {}

    let out_path = args.output.join(&torrent.name);
    download::writer::assemble(&out_path, finished.drain(), torrent.total_length()).await?;

    println!(
        "wrote {} ({} bytes, {} pieces) to {}",
        torrent.name,
        torrent.total_length(),
        torrent.num_pieces(),
        out_path.display()
    );
    Ok(())
}
