//! Debounced, atomic, per-collection snapshot persistence.
//!
//! All file I/O runs on one dedicated thread driving a current-thread tokio
//! runtime. Every mutation re-arms a per-collection timer; when it fires,
//! the current document list is serialized to `{name}.json.tmp` and renamed
//! over `{name}.json`. A failed write leaves the collection dirty and the
//! timer re-armed, so no mutation is lost while the process lives.

use crate::collection::Collection;
use crate::document::Document;
use crate::errors::DbError;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SaveOutcome {
    Saved,
    /// Nothing to persist.
    Clean,
    /// Another snapshot of this collection is in flight.
    Busy,
}

enum Msg {
    Arm(Arc<Collection>, Duration),
    Cancel(String),
    Shutdown(std::sync::mpsc::Sender<()>),
}

/// Clonable handle collections use to (re)arm their debounce timer.
#[derive(Clone)]
pub(crate) struct PersisterHandle {
    tx: mpsc::UnboundedSender<Msg>,
}

impl PersisterHandle {
    pub(crate) fn arm(&self, col: Arc<Collection>, delay: Duration) {
        let _ = self.tx.send(Msg::Arm(col, delay));
    }

    pub(crate) fn cancel(&self, name: &str) {
        let _ = self.tx.send(Msg::Cancel(name.to_string()));
    }
}

pub(crate) struct Persister {
    handle: PersisterHandle,
    thread: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl Persister {
    pub(crate) fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let thread = std::thread::Builder::new()
            .name("plumedb-persister".into())
            .spawn(move || run_dispatcher(rx))
            .ok();
        if thread.is_none() {
            log::error!("failed to spawn persister thread; snapshots disabled");
        }
        Self { handle: PersisterHandle { tx }, thread: Mutex::new(thread) }
    }

    pub(crate) fn handle(&self) -> PersisterHandle {
        self.handle.clone()
    }

    pub(crate) fn cancel(&self, name: &str) {
        self.handle.cancel(name);
    }

    /// Stops the timer thread. Pending timers are cancelled; dirty
    /// collections are the caller's responsibility to flush.
    pub(crate) fn shutdown(&self) {
        let Some(thread) = self.thread.lock().take() else { return };
        let (ack_tx, ack_rx) = std::sync::mpsc::channel();
        if self.handle.tx.send(Msg::Shutdown(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
        let _ = thread.join();
    }
}

impl Drop for Persister {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_dispatcher(mut rx: mpsc::UnboundedReceiver<Msg>) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_time().build() {
        Ok(rt) => rt,
        Err(e) => {
            log::error!("persister runtime failed to start: {e}");
            return;
        }
    };
    runtime.block_on(async move {
        let mut timers: HashMap<String, tokio::task::JoinHandle<()>> = HashMap::new();
        while let Some(msg) = rx.recv().await {
            match msg {
                Msg::Arm(col, delay) => {
                    if let Some(pending) = timers.remove(col.name()) {
                        pending.abort();
                    }
                    let name = col.name().to_string();
                    timers.insert(name, tokio::spawn(run_timer(col, delay)));
                }
                Msg::Cancel(name) => {
                    if let Some(pending) = timers.remove(&name) {
                        pending.abort();
                    }
                }
                Msg::Shutdown(ack) => {
                    for (_, pending) in timers.drain() {
                        pending.abort();
                    }
                    let _ = ack.send(());
                    break;
                }
            }
        }
    });
}

/// Sleeps out the debounce window, then snapshots. A busy or failed save
/// re-arms by looping; a clean or successful save ends the timer.
async fn run_timer(col: Arc<Collection>, delay: Duration) {
    loop {
        tokio::time::sleep(delay).await;
        match save_now(&col, false) {
            Ok(SaveOutcome::Saved | SaveOutcome::Clean) => break,
            Ok(SaveOutcome::Busy) => {}
            Err(e) => {
                log::error!("snapshot of collection {} failed: {e}", col.name());
            }
        }
    }
}

/// Writes one atomic snapshot of the collection if it is dirty.
///
/// With `force` the call waits for any in-flight snapshot instead of
/// reporting `Busy`; `close()` uses that to flush synchronously.
pub(crate) fn save_now(col: &Collection, force: bool) -> Result<SaveOutcome, DbError> {
    let _guard = if force {
        col.save_lock.lock()
    } else {
        match col.save_lock.try_lock() {
            Some(guard) => guard,
            None => return Ok(SaveOutcome::Busy),
        }
    };
    let (documents, version) = {
        let st = col.state.lock();
        if !st.dirty {
            return Ok(SaveOutcome::Clean);
        }
        (st.data.clone(), st.version)
    };
    let json = serde_json::to_string_pretty(&documents)?;
    write_atomic(&col.file_path, json.as_bytes())?;
    {
        let mut st = col.state.lock();
        // A mutation that landed mid-write keeps the collection dirty.
        if st.version == version {
            st.dirty = false;
        }
        st.last_save = Some(Utc::now());
    }
    log::debug!(target: "plumedb::ops",
        "snapshot collection={} documents={}", col.name(), documents.len());
    Ok(SaveOutcome::Saved)
}

/// `{name}.json.tmp` + fsync + rename, so readers only ever observe a
/// complete file.
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = tmp_path(path);
    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)
}

fn tmp_path(path: &Path) -> std::path::PathBuf {
    let mut name = path.file_name().map_or_else(Default::default, |n| n.to_os_string());
    name.push(".tmp");
    path.with_file_name(name)
}

/// Reads a snapshot file into documents.
pub(crate) fn load_documents(path: &Path) -> Result<Vec<Document>, DbError> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Removes a snapshot file; absent files are fine.
pub(crate) fn delete_snapshot(path: &Path) -> Result<bool, DbError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
