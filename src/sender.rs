use std::collections::{BTreeMap, VecDeque};

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::signal;

use crate::cryptography;
use crate::error::{Result, TransferError};
use crate::fsys;
use crate::networking;
use crate::protocol::{self, construct, decode, Header, Packet};
use crate::transfer;
use crate::KEY_SIZE;

/// What the sender is serving: one file or a scanned directory tree.
pub enum SendSource {
    SingleFile(fsys::File),
    Tree(fsys::Directory),
}

impl SendSource {
    pub fn name(&self) -> &str {
        match self {
            SendSource::SingleFile(file) => &file.name,
            SendSource::Tree(directory) => &directory.name,
        }
    }

    pub fn total_size(&self) -> u64 {
        match self {
            SendSource::SingleFile(file) => file.size,
            SendSource::Tree(directory) => directory.size,
        }
    }
}

#[derive(Debug, Default)]
pub struct SendSummary {
    pub files_sent: u64,
    /// Files the receiver already had; their full size still counts
    /// toward progress.
    pub files_skipped: u64,
    pub bytes_sent: u64,
    pub rejected: bool,
}

/// The write half of the session plus the session key. Everything leaving
/// the sender goes through here.
struct Outbox {
    write_half: OwnedWriteHalf,
    key: [u8; KEY_SIZE],
}

impl Outbox {
    async fn send_plain(&mut self, packet: &Packet) -> Result<()> {
        protocol::write_packet(&mut self.write_half, packet).await
    }

    async fn send_sealed(&mut self, mut packet: Packet) -> Result<()> {
        packet.encrypt_body(&self.key)?;
        protocol::write_packet(&mut self.write_half, &packet).await
    }
}

/// Runs the sending side of a session over an established connection:
/// deliver the session key and the offer, then stream files one READY
/// token at a time until everything is on the other side.
pub async fn serve(stream: TcpStream, source: SendSource, show_progress: bool) -> Result<SendSummary> {
    let (read_half, write_half) = stream.into_split();
    let mut packets = networking::spawn_packet_pump(read_half);

    let mut outbox = Outbox {
        write_half,
        key: cryptography::generate_session_key(),
    };

    let key_packet = construct::encryption_key_packet(&outbox.key);
    outbox.send_plain(&key_packet).await?;
    debug!("session key delivered");

    let offer_packet = match &source {
        SendSource::SingleFile(file) => construct::offer_file_packet(file),
        SendSource::Tree(directory) => construct::offer_directory_packet(directory),
    };
    let total_size = source.total_size();
    outbox.send_sealed(offer_packet).await?;
    debug!("transfer offer sent, {} bytes total", total_size);

    // enumeration order doubles as the id order the files stream in
    let (mut queue, mut symlinks) = enumerate(source);

    let bar = progress_bar(total_size, show_progress);
    let budget = transfer::piece_budget(true);

    let mut summary = SendSummary::default();
    let mut allowed = false;
    let mut can_send = false;
    let mut announced = false;

    loop {
        let mut packet = tokio::select! {
            maybe = packets.recv() => maybe.ok_or(TransferError::Disconnected)?,
            _ = signal::ctrl_c() => {
                info!("interrupted, disconnecting");
                let _ = outbox.send_plain(&Packet::new(Header::Bye)).await;
                break;
            }
        };

        packet.decrypt_body(&outbox.key)?;

        match packet.header {
            Header::Accept => {
                debug!("transfer accepted");
                allowed = true;
            }
            Header::Ready => {
                can_send = true;
            }
            Header::AlreadyHave => {
                // the receiver refused the stream the last FILE packet
                // opened; drop the file and move on
                let id = decode::decode_file_id(&packet.body)?;
                let current = queue.keys().next().copied();

                if let Some(mut file) = queue.remove(&id) {
                    debug!("receiver already has \"{}\"", file.name);
                    file.close();
                    summary.files_skipped += 1;
                    bar.inc(file.size);
                    if current == Some(id) {
                        announced = false;
                    }
                    can_send = true;
                }
            }
            Header::Reject => {
                info!("transfer rejected by the receiver");
                summary.rejected = true;
                // the receiver may already be gone, a failed goodbye is
                // not worth a non-zero exit
                let _ = outbox.send_plain(&Packet::new(Header::Done)).await;
                let _ = outbox.send_plain(&Packet::new(Header::Bye)).await;
                break;
            }
            Header::Bye => {
                info!("peer disconnected");
                break;
            }
            other => {
                return Err(TransferError::Protocol(format!(
                    "unexpected {} packet from the receiver",
                    other
                )));
            }
        }

        // one content packet per READY token
        if allowed && can_send {
            can_send = false;
            let finished = send_next_content(
                &mut outbox,
                &mut queue,
                &mut symlinks,
                &mut announced,
                budget,
                &bar,
                &mut summary,
            )
            .await?;

            if finished {
                debug!("transfer finished");
                break;
            }
        }
    }

    bar.finish_and_clear();
    Ok(summary)
}

/// Emits exactly one content packet: the next FILE announcement, a piece
/// of the current file, its ENDFILE, or a SYMLINK. Once nothing is left
/// it emits DONE and BYE! instead and reports the session finished.
async fn send_next_content(
    outbox: &mut Outbox,
    queue: &mut BTreeMap<u64, fsys::File>,
    symlinks: &mut VecDeque<fsys::Symlink>,
    announced: &mut bool,
    budget: u64,
    bar: &ProgressBar,
    summary: &mut SendSummary,
) -> Result<bool> {
    if let Some(mut entry) = queue.first_entry() {
        let id = *entry.key();
        let file = entry.get_mut();

        if !*announced {
            debug!("announcing \"{}\" (id {})", file.name, id);
            let packet = construct::file_packet(file);
            outbox.send_sealed(packet).await?;
            *announced = true;
        } else if let Some(piece) = transfer::next_piece(file, budget)? {
            summary.bytes_sent += piece.len() as u64;
            bar.inc(piece.len() as u64);
            outbox.send_sealed(construct::file_bytes_packet(id, &piece)).await?;
        } else {
            debug!("fully sent \"{}\" -- {} bytes", file.name, file.size);
            file.close();
            outbox
                .send_sealed(construct::file_id_packet(Header::EndFile, id))
                .await?;
            entry.remove();
            summary.files_sent += 1;
            *announced = false;
        }

        return Ok(false);
    }

    if let Some(symlink) = symlinks.pop_front() {
        debug!("sending symlink {} -> {}", symlink.path, symlink.target);
        outbox.send_sealed(construct::symlink_packet(&symlink)).await?;
        return Ok(false);
    }

    outbox.send_plain(&Packet::new(Header::Done)).await?;
    outbox.send_plain(&Packet::new(Header::Bye)).await?;
    Ok(true)
}

fn enumerate(source: SendSource) -> (BTreeMap<u64, fsys::File>, VecDeque<fsys::Symlink>) {
    let mut queue = BTreeMap::new();
    let mut symlinks = VecDeque::new();

    match source {
        SendSource::SingleFile(mut file) => {
            file.id = 0;
            queue.insert(file.id, file);
        }
        SendSource::Tree(directory) => {
            for (index, mut file) in directory.files.into_iter().enumerate() {
                file.id = index as u64;
                queue.insert(file.id, file);
            }
            symlinks.extend(directory.symlinks);
        }
    }

    (queue, symlinks)
}

fn progress_bar(total_size: u64, show_progress: bool) -> ProgressBar {
    if !show_progress {
        return ProgressBar::hidden();
    }

    let bar = ProgressBar::new(total_size);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta}) {msg}")
            .unwrap(),
    );
    bar
}
