use std::collections::BTreeMap;
use std::fs;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::signal;

use crate::checksum;
use crate::error::{Result, TransferError};
use crate::fsys;
use crate::networking;
use crate::protocol::{self, construct, decode, Header, Packet, TransferOffer};
use crate::KEY_SIZE;

#[derive(Debug, Default)]
pub struct ReceiveSummary {
    pub accepted: bool,
    pub files_received: u64,
    /// Offered files an identical local copy already satisfied.
    pub files_skipped: u64,
    pub bytes_written: u64,
    /// Names of files whose checksum did not match after ENDFILE.
    pub corrupted: Vec<String>,
}

/// Everything the receive loop carries between packets.
struct Session {
    write_half: OwnedWriteHalf,
    key: [u8; KEY_SIZE],
    /// Effective write root: the downloads root itself, or the created
    /// child directory when a directory offer was accepted.
    write_root: PathBuf,
    /// Files announced with FILE and not yet finished, by id.
    accepted: BTreeMap<u64, fsys::File>,
    bar: ProgressBar,
    summary: ReceiveSummary,
}

impl Session {
    async fn send(&mut self, packet: &Packet) -> Result<()> {
        protocol::write_packet(&mut self.write_half, packet).await
    }

    async fn send_sealed(&mut self, mut packet: Packet) -> Result<()> {
        packet.encrypt_body(&self.key)?;
        protocol::write_packet(&mut self.write_half, &packet).await
    }

    async fn send_ready(&mut self) -> Result<()> {
        self.send(&Packet::new(Header::Ready)).await
    }
}

/// Runs the receiving side of a session over an established connection.
///
/// The first packet must deliver the session key, the second the offer.
/// `decide` is consulted once with the decoded offer; on rejection the
/// session ends cleanly without receiving any content. Accepted content
/// is written under `downloads_root`, which is created if missing.
pub async fn download<F>(
    stream: TcpStream,
    downloads_root: &Path,
    decide: F,
    show_progress: bool,
) -> Result<ReceiveSummary>
where
    F: FnOnce(&TransferOffer) -> bool,
{
    fs::create_dir_all(downloads_root)?;

    let (read_half, write_half) = stream.into_split();
    let mut packets = networking::spawn_packet_pump(read_half);

    // the session key always comes first and is never encrypted
    let first = packets.recv().await.ok_or(TransferError::Disconnected)?;
    if first.header != Header::EncryptionKey {
        return Err(TransferError::Protocol(format!(
            "expected the session key, got {}",
            first.header
        )));
    }
    let key_bytes = decode::decode_encryption_key(&first.body)?;
    let key: [u8; KEY_SIZE] = key_bytes
        .try_into()
        .map_err(|_| TransferError::Crypto("session key must be 32 bytes".to_string()))?;
    debug!("session key installed");

    let mut offer_packet = packets.recv().await.ok_or(TransferError::Disconnected)?;
    if offer_packet.header != Header::TransferOffer {
        return Err(TransferError::Protocol(format!(
            "expected a transfer offer, got {}",
            offer_packet.header
        )));
    }
    offer_packet.decrypt_body(&key)?;
    let offer = decode::decode_transfer_offer(&offer_packet.body)?;

    let mut session = Session {
        write_half,
        key,
        write_root: downloads_root.to_path_buf(),
        accepted: BTreeMap::new(),
        bar: ProgressBar::hidden(),
        summary: ReceiveSummary::default(),
    };

    if !decide(&offer) {
        info!("offer declined");
        session.send(&Packet::new(Header::Reject)).await?;
        let _ = session.send(&Packet::new(Header::Bye)).await;
        return Ok(session.summary);
    }
    session.summary.accepted = true;

    // a directory offer gets its own child directory under the root and
    // all subsequent writes are scoped to it
    if let TransferOffer::Directory { name, .. } = &offer {
        session.write_root = session.write_root.join(name);
        fs::create_dir_all(&session.write_root)?;
    }
    session.bar = progress_bar(offer.total_size(), show_progress);

    session.send(&Packet::new(Header::Accept)).await?;
    session.send_ready().await?;
    debug!("offer accepted, receiving into {}", session.write_root.display());

    loop {
        let mut packet = tokio::select! {
            maybe = packets.recv() => maybe.ok_or(TransferError::Disconnected)?,
            _ = signal::ctrl_c() => {
                info!("interrupted, disconnecting");
                break;
            }
        };

        packet.decrypt_body(&session.key)?;

        match packet.header {
            Header::File => session.handle_file(&packet.body).await?,
            Header::FileBytes => session.handle_file_bytes(&packet.body).await?,
            Header::EndFile => session.handle_end_file(&packet.body).await?,
            Header::Symlink => session.handle_symlink(&packet.body).await?,
            Header::Done => {
                debug!("transfer done");
                break;
            }
            Header::Bye => {
                info!("peer disconnected");
                break;
            }
            other => {
                return Err(TransferError::Protocol(format!(
                    "unexpected {} packet from the sender",
                    other
                )));
            }
        }
    }

    session.bar.finish_and_clear();
    let _ = session.send(&Packet::new(Header::Bye)).await;
    Ok(session.summary)
}

impl Session {
    /// A file was announced: place it under the write root, or answer
    /// ALREADYHAVE when an identical copy is already there.
    async fn handle_file(&mut self, body: &[u8]) -> Result<()> {
        let mut file = decode::decode_file(body)?;

        let output_path = if file.relative_path.is_empty() {
            self.write_root.join(&file.name)
        } else {
            self.write_root.join(&file.relative_path)
        };
        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent)?;
        }
        file.path = output_path;

        debug!(
            "incoming file \"{}\" (id {}, {} bytes) -> {}",
            file.name,
            file.id,
            file.size,
            file.path.display()
        );

        if file.path.exists() {
            let mut existing = fs::File::open(&file.path)?;
            let existing_checksum = checksum::partial_checksum(&mut existing)?;

            if existing_checksum == file.checksum {
                debug!("already have \"{}\"", file.name);
                self.bar.inc(file.size);
                self.summary.files_skipped += 1;
                let reply = construct::file_id_packet(Header::AlreadyHave, file.id);
                return self.send_sealed(reply).await;
            }

            // a stale copy, replace it with the incoming bytes
            fs::remove_file(&file.path)?;
        }

        self.accepted.insert(file.id, file);
        self.send_ready().await
    }

    /// A piece of file contents: write it at the current cursor.
    async fn handle_file_bytes(&mut self, body: &[u8]) -> Result<()> {
        let (id, data) = decode::decode_file_bytes(body)?;

        if let Some(file) = self.accepted.get_mut(&id) {
            let offset = file.transferred;
            let handle = file.open()?;
            handle.seek(SeekFrom::Start(offset))?;
            handle.write_all(data)?;
            file.close();

            file.transferred += data.len() as u64;
            self.summary.bytes_written += data.len() as u64;
            self.bar.inc(data.len() as u64);
        } else {
            // possibly a piece of a file that was already finalized
            debug!("ignoring bytes for unknown file id {}", id);
        }

        self.send_ready().await
    }

    /// The file is complete: verify its checksum and retire it.
    async fn handle_end_file(&mut self, body: &[u8]) -> Result<()> {
        let id = decode::decode_file_id(body)?;

        if let Some(mut file) = self.accepted.remove(&id) {
            let on_disk_checksum = checksum::partial_checksum(file.open()?)?;
            file.close();

            if on_disk_checksum != file.checksum {
                warn!(
                    "checksum mismatch for \"{}\": expected {}, got {}",
                    file.name, file.checksum, on_disk_checksum
                );
                eprintln!("| \"{}\" is corrupted", file.name);
                self.summary.corrupted.push(file.name.clone());
            } else {
                debug!("fully received \"{}\" -- {} bytes", file.name, file.size);
            }
            self.summary.files_received += 1;
        }

        self.send_ready().await
    }

    /// Recreate a symlink under the write root. Failure here is not worth
    /// aborting a whole transfer over.
    async fn handle_symlink(&mut self, body: &[u8]) -> Result<()> {
        let (path, target) = decode::decode_symlink(body)?;

        if let Err(e) = create_symlink(&self.write_root, &path, &target) {
            warn!("could not create symlink {} -> {}: {}", path, target, e);
        } else {
            debug!("created symlink {} -> {}", path, target);
        }

        self.send_ready().await
    }
}

#[cfg(unix)]
fn create_symlink(write_root: &Path, path: &str, target: &str) -> std::io::Result<()> {
    let link_path = write_root.join(path);
    if let Some(parent) = link_path.parent() {
        fs::create_dir_all(parent)?;
    }
    std::os::unix::fs::symlink(target, link_path)
}

#[cfg(not(unix))]
fn create_symlink(_write_root: &Path, _path: &str, _target: &str) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "symlinks are not supported on this platform",
    ))
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
