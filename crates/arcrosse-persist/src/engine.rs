use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::housekeeping::run_housekeeping;
use crate::{PersistConfig, PersistError, Result};

/// How long the worker sleeps in `recv_timeout` before re-checking its
/// housekeeping deadline. Purely an upper bound on housekeeping latency.
const IDLE_WAKE: Duration = Duration::from_secs(60);

/// Completion callback a write job fires with its success flag.
pub type Completion = Box<dyn FnOnce(bool) + Send + 'static>;

/// One queued write: an owned payload destined for `path` at `offset`.
pub struct WriteJob {
    pub path: PathBuf,
    pub payload: Vec<u8>,
    pub offset: u64,
    pub done: Option<Completion>,
}

enum Message {
    Write(WriteJob),
    Flush(mpsc::SyncSender<()>),
    Shutdown,
}

/// Aggregate worker counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistStats {
    pub pending: u64,
    pub completed: u64,
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    pending: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Handle to the background persistence worker.
///
/// Dropping the engine flushes the queue, stops the worker, and joins it.
pub struct PersistenceEngine {
    config: PersistConfig,
    tx: Sender<Message>,
    counters: Arc<Counters>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PersistenceEngine {
    pub fn new(config: PersistConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.cache_dir)?;

        let (tx, rx) = mpsc::channel::<Message>();
        let counters = Arc::new(Counters::default());

        let worker_counters = Arc::clone(&counters);
        let worker_config = config.clone();
        let worker = std::thread::Builder::new()
            .name("arcrosse-persist".to_owned())
            .spawn(move || {
                let mut last_housekeeping = Instant::now();
                loop {
                    match rx.recv_timeout(IDLE_WAKE) {
                        Ok(Message::Write(job)) => {
                            worker_counters.pending.fetch_sub(1, Ordering::Relaxed);
                            let success = match write_job(&job) {
                                Ok(()) => true,
                                Err(err) => {
                                    warn!(path = %job.path.display(), error = %err, "write job failed");
                                    false
                                }
                            };
                            if success {
                                worker_counters.completed.fetch_add(1, Ordering::Relaxed);
                            } else {
                                worker_counters.failed.fetch_add(1, Ordering::Relaxed);
                            }
                            if let Some(done) = job.done {
                                done(success);
                            }
                        }
                        Ok(Message::Flush(ack)) => {
                            // All earlier messages have been processed; the
                            // ack releases the flushing caller.
                            let _ = ack.send(());
                        }
                        Ok(Message::Shutdown) => break,
                        Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => break,
                    }

                    if last_housekeeping.elapsed() >= worker_config.housekeeping_interval {
                        if let Err(err) = run_housekeeping(&worker_config) {
                            warn!(error = %err, "housekeeping failed");
                        }
                        last_housekeeping = Instant::now();
                    }
                }
                debug!("persistence worker stopped");
            })?;

        Ok(Self {
            config,
            tx,
            counters,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn config(&self) -> &PersistConfig {
        &self.config
    }

    /// Queue a write. Jobs for the same file execute in submission order.
    pub fn queue_write(
        &self,
        path: PathBuf,
        payload: Vec<u8>,
        offset: u64,
        done: Option<Completion>,
    ) -> Result<()> {
        self.counters.pending.fetch_add(1, Ordering::Relaxed);
        self.tx
            .send(Message::Write(WriteJob {
                path,
                payload,
                offset,
                done,
            }))
            .map_err(|_| {
                self.counters.pending.fetch_sub(1, Ordering::Relaxed);
                PersistError::WorkerGone
            })
    }

    /// Block until every previously queued write has completed.
    pub fn flush(&self) -> Result<()> {
        let (ack_tx, ack_rx) = mpsc::sync_channel(1);
        self.tx
            .send(Message::Flush(ack_tx))
            .map_err(|_| PersistError::WorkerGone)?;
        ack_rx.recv().map_err(|_| PersistError::WorkerGone)
    }

    /// Run housekeeping on the caller's thread, regardless of the worker's
    /// schedule.
    pub fn run_housekeeping(&self) -> Result<crate::HousekeepingReport> {
        run_housekeeping(&self.config)
    }

    pub fn stats(&self) -> PersistStats {
        PersistStats {
            pending: self.counters.pending.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

impl Drop for PersistenceEngine {
    fn drop(&mut self) {
        let _ = self.flush();
        let _ = self.tx.send(Message::Shutdown);
        if let Ok(mut guard) = self.worker.lock() {
            if let Some(handle) = guard.take() {
                let _ = handle.join();
            }
        }
    }
}

fn write_job(job: &WriteJob) -> std::io::Result<()> {
    if let Some(parent) = job.path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = open_for(&job.path, job.offset)?;
    file.seek(SeekFrom::Start(job.offset))?;
    file.write_all(&job.payload)?;
    Ok(())
}

/// Offset 0 replaces the file; a non-zero offset updates it in place,
/// creating it first when absent.
fn open_for(path: &Path, offset: u64) -> std::io::Result<std::fs::File> {
    if offset == 0 {
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
    } else {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
    }
}
