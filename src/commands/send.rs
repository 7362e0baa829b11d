use std::error::Error;
use std::fs;
use std::path::Path;
use std::time::Duration;

use indicatif::{HumanBytes, ProgressBar};
use log::debug;

use crate::fsys;
use crate::networking;
use crate::sender::{self, SendSource};

/// Function handler to kickoff sender logic:
///     - Validate the input path and scan it (recursively for folders)
///     - Wait for the receiving peer to connect on the given port
///     - Offer the file/folder and stream it once accepted
pub async fn run(path: &str, recursive: bool, port: u16) -> Result<(), Box<dyn Error>> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(format!("Path does not exist: {}", path.display()).into());
    }

    // scanning computes every file's checksum, which takes a moment on
    // big folders
    let spinner = ProgressBar::new_spinner();
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message("Preparing files");

    let source = if fs::metadata(path)?.is_dir() {
        debug!("scanning folder {} (recursive: {})", path.display(), recursive);
        SendSource::Tree(fsys::Directory::scan(path, recursive)?)
    } else {
        SendSource::SingleFile(fsys::File::probe(path)?)
    };
    spinner.finish_and_clear();

    println!(
        "Serving \"{}\" ({}) on port {}",
        source.name(),
        HumanBytes(source.total_size()),
        port
    );
    println!("Waiting for the receiver to connect...");

    let (stream, peer_addr) = tokio::select! {
        accepted = networking::listen_for_peer(port) => accepted?,
        _ = tokio::signal::ctrl_c() => {
            println!("\nCancelled");
            return Ok(());
        }
    };
    println!("New connection from {}", peer_addr);

    let summary = sender::serve(stream, source, true).await?;

    if summary.rejected {
        println!("The receiver rejected the transfer");
    } else {
        println!(
            "Transfer complete! {} file(s) sent, {} skipped, {} transmitted",
            summary.files_sent,
            summary.files_skipped,
            HumanBytes(summary.bytes_sent)
        );
    }

    Ok(())
}
