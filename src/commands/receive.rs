use std::error::Error;
use std::io::{self, Write};
use std::path::Path;

use indicatif::HumanBytes;
use log::debug;

use crate::networking;
use crate::protocol::TransferOffer;
use crate::receiver;

/// Function handler to kickoff receiver logic:
///     - Connect to the sending peer
///     - Show the offer and ask whether to download it
///     - Receive everything into the downloads folder
pub async fn run(address: &str, port: u16, downloads: &str) -> Result<(), Box<dyn Error>> {
    println!("Connecting to {}:{}...", address, port);
    let stream = networking::connect_to_peer(address, port).await?;
    println!("Connected");

    debug!("downloading into {}", downloads);
    let summary = receiver::download(stream, Path::new(downloads), prompt_for_offer, true).await?;

    if !summary.accepted {
        println!("Transfer declined");
        return Ok(());
    }

    println!(
        "Done! {} file(s) received, {} already present, {} written",
        summary.files_received,
        summary.files_skipped,
        HumanBytes(summary.bytes_written)
    );
    for name in &summary.corrupted {
        eprintln!("Warning: \"{}\" arrived corrupted and may be unusable", name);
    }

    Ok(())
}

/// Prints the offer and asks for confirmation. An empty answer counts as
/// yes.
fn prompt_for_offer(offer: &TransferOffer) -> bool {
    match offer {
        TransferOffer::File(file) => {
            println!("| Filename: {}", file.name);
            println!("| Size: {}", HumanBytes(file.size));
            println!("| Checksum: {}", file.checksum);
        }
        TransferOffer::Directory { name, size } => {
            println!("| Directory: {}", name);
            println!("| Size: {}", HumanBytes(*size));
        }
    }

    print!("| Download? [Y/n]: ");
    let _ = io::stdout().flush();

    let mut answer = String::new();
    if io::stdin().read_line(&mut answer).is_err() {
        return false;
    }

    let answer = answer.trim();
    answer.is_empty() || answer.eq_ignore_ascii_case("y")
}
