use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use log::{debug, error, info};
use tokio::sync::oneshot;

use crate::models::Sample;

use super::entry::TrailEntry;

const TRAILS_DIR: &str = "trails";

enum TrailCommand {
    Open(PathBuf, oneshot::Sender<Result<()>>),
    Append(String),
    Close(oneshot::Sender<Option<PathBuf>>),
    Shutdown,
}

struct TrailWriterInner {
    sender: mpsc::Sender<TrailCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for TrailWriterInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(TrailCommand::Shutdown) {
                error!("Failed to send shutdown to trail writer thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join trail writer thread: {join_err:?}");
            }
        }
    }
}

/// Appends emitted samples to one text file per recording session.
///
/// All disk I/O happens on a dedicated thread; `write` only enqueues a line so it is
/// safe to call from a selector consumer.
#[derive(Clone)]
pub struct TrailWriter {
    inner: Arc<TrailWriterInner>,
    trails_dir: Arc<PathBuf>,
}

impl TrailWriter {
    pub fn new(base_dir: &Path) -> Result<Self> {
        let trails_dir = base_dir.join(TRAILS_DIR);
        fs::create_dir_all(&trails_dir).with_context(|| {
            format!("failed to create trails directory {}", trails_dir.display())
        })?;

        let (command_tx, command_rx) = mpsc::channel::<TrailCommand>();

        let worker = thread::Builder::new()
            .name("stoptrack-trail".into())
            .spawn(move || run_worker(command_rx))
            .context("failed to spawn trail writer thread")?;

        Ok(Self {
            inner: Arc::new(TrailWriterInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            trails_dir: Arc::new(trails_dir),
        })
    }

    pub fn trails_dir(&self) -> &Path {
        self.trails_dir.as_path()
    }

    /// Start a new `trail_<unixMillis>.txt`, closing any file still open.
    pub async fn new_trail_file(&self) -> Result<PathBuf> {
        let path = self
            .trails_dir
            .join(format!("trail_{}.txt", Utc::now().timestamp_millis()));

        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(TrailCommand::Open(path.clone(), reply_tx))?;
        reply_rx
            .await
            .map_err(|_| anyhow!("trail writer thread dropped open request"))??;

        info!("Made new trail file at {}", path.display());
        Ok(path)
    }

    /// Enqueue one trail line. Dropped when no file is open.
    pub fn write(&self, sample: &Sample, is_stopped: bool) {
        let entry = TrailEntry::from_sample(sample, is_stopped);
        if let Err(err) = self.send(TrailCommand::Append(entry.to_string())) {
            error!("Failed to queue trail entry {entry}: {err}");
        }
    }

    /// Flush and close the current file. Returns its path, if one was open.
    pub async fn close_trail_file(&self) -> Result<Option<PathBuf>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(TrailCommand::Close(reply_tx))?;
        reply_rx
            .await
            .map_err(|_| anyhow!("trail writer thread dropped close request"))
    }

    fn send(&self, command: TrailCommand) -> Result<()> {
        self.inner
            .sender
            .send(command)
            .map_err(|_| anyhow!("trail writer thread is not running"))
    }
}

struct OpenTrail {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl OpenTrail {
    fn close(mut self) -> PathBuf {
        if let Err(err) = self.writer.flush() {
            error!("Failed to flush trail {}: {err}", self.path.display());
        }
        self.path
    }
}

fn run_worker(command_rx: mpsc::Receiver<TrailCommand>) {
    let mut current: Option<OpenTrail> = None;

    while let Ok(command) = command_rx.recv() {
        match command {
            TrailCommand::Open(path, reply) => {
                if let Some(previous) = current.take() {
                    previous.close();
                }
                let result = File::create(&path)
                    .with_context(|| format!("failed to create trail file {}", path.display()))
                    .map(|file| {
                        current = Some(OpenTrail {
                            path,
                            writer: BufWriter::new(file),
                        });
                    });
                let _ = reply.send(result);
            }
            TrailCommand::Append(line) => match current.as_mut() {
                Some(trail) => match writeln!(trail.writer, "{line}") {
                    Ok(()) => debug!("Wrote: {line}"),
                    Err(err) => error!("Failed to write to {}: {err}", trail.path.display()),
                },
                None => debug!("No trail file open, dropping {line}"),
            },
            TrailCommand::Close(reply) => {
                let closed = current.take().map(OpenTrail::close);
                let _ = reply.send(closed);
            }
            TrailCommand::Shutdown => break,
        }
    }

    if let Some(trail) = current.take() {
        trail.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_owned)
            .collect()
    }

    #[tokio::test]
    async fn writes_one_line_per_sample() {
        let dir = tempfile::tempdir().unwrap();
        let writer = TrailWriter::new(dir.path()).unwrap();
        assert!(writer.trails_dir().is_dir());

        let path = writer.new_trail_file().await.unwrap();
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("trail_"));

        writer.write(&Sample::new(-31.95, 115.86, 1000, 5.0), false);
        writer.write(&Sample::new(-31.951, 115.861, 2000, 5.0), true);

        let closed = writer.close_trail_file().await.unwrap();
        assert_eq!(closed.as_deref(), Some(path.as_path()));
        assert_eq!(
            read_lines(&path),
            vec![
                "-31.950000,115.860000,1000,Moving",
                "-31.951000,115.861000,2000,Stopped",
            ]
        );
    }

    #[tokio::test]
    async fn lines_without_open_file_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let writer = TrailWriter::new(dir.path()).unwrap();

        writer.write(&Sample::new(0.0, 0.0, 1, 1.0), false);
        assert_eq!(writer.close_trail_file().await.unwrap(), None);
        assert_eq!(fs::read_dir(writer.trails_dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let writer = TrailWriter::new(dir.path()).unwrap();
        writer.new_trail_file().await.unwrap();
        assert!(writer.close_trail_file().await.unwrap().is_some());
        assert!(writer.close_trail_file().await.unwrap().is_none());
    }
}
