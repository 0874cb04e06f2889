use std::io::SeekFrom;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

/// Follow one log file from its current end, pushing complete lines into the
/// shared line channel. A file that shrinks or is replaced (rotation) is
/// reopened from offset zero; a closed channel ends the tailer quietly.
pub(crate) async fn tail_file(
    path: PathBuf,
    poll: Duration,
    tx: mpsc::Sender<String>,
    mut stop: watch::Receiver<bool>,
) {
    let mut file = match File::open(&path).await {
        Ok(f) => f,
        Err(e) => {
            warn!("cannot open log file {:?}: {}", path, e);
            return;
        }
    };
    let mut pos = match file.seek(SeekFrom::End(0)).await {
        Ok(p) => p,
        Err(e) => {
            warn!("cannot seek log file {:?}: {}", path, e);
            return;
        }
    };

    let mut pending: Vec<u8> = Vec::new();
    let mut buf = vec![0u8; 16 * 1024];

    loop {
        tokio::select! {
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
            _ = tokio::time::sleep(poll) => {
                match tokio::fs::metadata(&path).await {
                    Ok(meta) => {
                        if meta.len() < pos {
                            debug!("log file {:?} rotated, reopening", path);
                            match File::open(&path).await {
                                Ok(f) => {
                                    file = f;
                                    pos = 0;
                                }
                                Err(_) => continue,
                            }
                        }
                    }
                    // Rotation window where the file is briefly absent.
                    Err(_) => continue,
                }

                loop {
                    match file.read(&mut buf).await {
                        Ok(0) => break,
                        Ok(n) => {
                            pos += n as u64;
                            pending.extend_from_slice(&buf[..n]);
                            while let Some(i) = pending.iter().position(|&b| b == b'\n') {
                                let line: Vec<u8> = pending.drain(..=i).collect();
                                let text = String::from_utf8_lossy(&line[..line.len() - 1])
                                    .trim_end_matches('\r')
                                    .to_string();
                                if tx.send(text).await.is_err() {
                                    // Receiver gone mid-write: the pipeline
                                    // is closing, not an error.
                                    return;
                                }
                            }
                        }
                        Err(e) => {
                            debug!("read error on {:?}: {}", path, e);
                            break;
                        }
                    }
                }
            }
        }
    }

    // Let an unterminated trailing line flush before the channel closes.
    if !pending.is_empty() {
        let _ = tx
            .send(String::from_utf8_lossy(&pending).trim_end_matches('\r').to_string())
            .await;
    }
}
