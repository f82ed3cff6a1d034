//! Persisted state history.
//!
//! Records are appended as JSON Lines to a single file. Reads and writes are
//! blocking file I/O, so async callers go through `spawn_blocking`. Which
//! entities get recorded is decided by the include/exclude filter: an exclude
//! match always wins, and an empty include list records everything else.

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task;

use crate::config::{EntityFilterConfig, HistoryConfig, EVENT_STATE_CHANGED};
use crate::error::StoreError;

use super::bus::{EventBus, ListenerHandle};
use super::states::{StateChangedData, StateRecord};

struct Inner {
    path: PathBuf,
    include: EntityFilterConfig,
    exclude: EntityFilterConfig,
    max_records: usize,
    /// Records on disk. The lock also serializes appends and compaction so
    /// lines never interleave.
    records: Mutex<usize>,
}

/// Handle to the history file, cheap to clone into blocking tasks
#[derive(Clone)]
pub struct HistoryStore {
    inner: Arc<Inner>,
}

impl HistoryStore {
    /// Open (creating if needed) the history file and compact it to `max_records`.
    pub fn open(config: &HistoryConfig) -> Result<Self, StoreError> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.path)?;

        let store = Self {
            inner: Arc::new(Inner {
                path: config.path.clone(),
                include: config.include.clone(),
                exclude: config.exclude.clone(),
                max_records: config.max_records,
                records: Mutex::new(0),
            }),
        };

        let dropped = {
            let mut records = store.lock_records();
            store.compact(&mut records)?
        };
        if dropped > 0 {
            tracing::info!(
                path = %config.path.display(),
                dropped,
                kept = config.max_records,
                "Compacted state history"
            );
        }

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Check if state changes of this entity are persisted
    pub fn is_entity_tracked(&self, entity_id: &str) -> bool {
        if self.inner.exclude.matches(entity_id) {
            return false;
        }
        self.inner.include.is_empty() || self.inner.include.matches(entity_id)
    }

    fn lock_records(&self) -> MutexGuard<'_, usize> {
        self.inner
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Append one record (blocking).
    ///
    /// The file never holds more than `max_records` records once this returns.
    pub fn append(&self, record: &StateRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut records = self.lock_records();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        *records += 1;

        if *records > self.inner.max_records {
            let dropped = self.compact(&mut records)?;
            tracing::debug!(
                path = %self.inner.path.display(),
                dropped,
                "Trimmed state history"
            );
        }
        Ok(())
    }

    /// The last `n` recorded states of an entity, most recent last (blocking).
    ///
    /// Lines that fail to parse are skipped with a warning.
    pub fn last_states(&self, entity_id: &str, n: usize) -> Result<Vec<StateRecord>, StoreError> {
        if n == 0 {
            return Ok(Vec::new());
        }

        let file = match File::open(&self.inner.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut window = VecDeque::with_capacity(n);
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: StateRecord = match serde_json::from_str(&line) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(
                        path = %self.inner.path.display(),
                        line = index + 1,
                        error = %e,
                        "Skipping unreadable history record"
                    );
                    continue;
                }
            };
            if record.entity_id != entity_id {
                continue;
            }
            if window.len() == n {
                window.pop_front();
            }
            window.push_back(record);
        }

        Ok(window.into())
    }

    /// `last_states` on the blocking pool; the caller awaits the result.
    pub async fn last_states_async(
        &self,
        entity_id: &str,
        n: usize,
    ) -> Result<Vec<StateRecord>, StoreError> {
        let store = self.clone();
        let entity_id = entity_id.to_string();
        task::spawn_blocking(move || store.last_states(&entity_id, n)).await?
    }

    /// Rewrite the file keeping only the newest `max_records` lines, and
    /// resync `records` with what is on disk.
    ///
    /// Returns the number of dropped lines.
    fn compact(&self, records: &mut usize) -> Result<usize, StoreError> {
        let max_records = self.inner.max_records;
        let contents = fs::read_to_string(&self.inner.path)?;
        let lines: Vec<&str> = contents.lines().filter(|l| !l.trim().is_empty()).collect();
        if lines.len() <= max_records {
            *records = lines.len();
            return Ok(0);
        }

        let dropped = lines.len() - max_records;
        let mut kept = lines[dropped..].join("\n");
        kept.push('\n');

        let tmp_path = self.inner.path.with_extension("jsonl.tmp");
        fs::write(&tmp_path, kept)?;
        fs::rename(&tmp_path, &self.inner.path)?;
        *records = max_records;
        Ok(dropped)
    }

    /// Persist every tracked `state_changed` event.
    ///
    /// Appends run on the blocking pool inside the listener task, so the
    /// code that set the state never waits for the write.
    pub fn spawn_writer(&self, bus: &EventBus) -> ListenerHandle {
        let store = self.clone();
        bus.listen(EVENT_STATE_CHANGED, move |event| {
            let store = store.clone();
            async move {
                let data: StateChangedData = match serde_json::from_value(event.data) {
                    Ok(data) => data,
                    Err(e) => {
                        tracing::warn!(error = %e, "Malformed state_changed event");
                        return;
                    }
                };
                if !store.is_entity_tracked(&data.entity_id) {
                    return;
                }

                let entity_id = data.entity_id.clone();
                let writer = store.clone();
                let result = task::spawn_blocking(move || writer.append(&data.new_state))
                    .await
                    .map_err(StoreError::from)
                    .and_then(|r| r);
                if let Err(e) = result {
                    tracing::error!(entity_id = %entity_id, error = %e, "Failed to record state history");
                }
            }
        })
    }
}
