//! # Store Adapter
//!
//! Wraps the physical key-value engine behind the contract the graph layers
//! rely on: named ordered sub-maps, stable read snapshots, and atomic
//! multi-map commit from a single writer.
//!
//! Concretely the engine here is a copy-on-write B-tree image per epoch.
//! Readers pin the epoch current at begin-time; the writer stages a private
//! clone and publishes it as the next epoch on commit. One bincode image per
//! database path carries the store across process restarts, and a
//! process-global registry hands the same core to every `Context` opened on
//! one path.

pub mod state;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::{Error, Result};

pub use state::{MapId, OrderedMap, StoreState, prefix_end};
use state::StoreImage;

/// A pinned read view: the epoch image current when the transaction began.
pub type Snapshot = Arc<StoreState>;

struct Epoch {
    sequence: u64,
    state: Snapshot,
}

/// Shared store for one database path. All `Context` values over the path
/// hold the same core via the registry.
pub struct StoreCore {
    path: PathBuf,
    current: RwLock<Epoch>,
    writer_live: AtomicBool,
}

impl StoreCore {
    /// Pin the current epoch for a reader.
    pub fn snapshot(&self) -> Snapshot {
        self.current.read().state.clone()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Claim the single-writer slot. Fails fast when a writer is live.
    pub fn begin_write(self: &Arc<Self>) -> Result<WriterToken> {
        if self
            .writer_live
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::WriterBusy);
        }
        Ok(WriterToken { core: Arc::clone(self) })
    }

    /// Publish a writer's staged state as the next epoch. The image is
    /// persisted before the swap, so a failed write publishes nothing.
    pub fn publish(&self, state: StoreState) -> Result<()> {
        persist_image(&self.path, &state)?;
        let mut current = self.current.write();
        current.sequence += 1;
        current.state = Arc::new(state);
        debug!(path = %self.path.display(), epoch = current.sequence, "store epoch published");
        Ok(())
    }
}

/// Ownership of the writer slot; released on drop, which is what makes
/// "drop without commit" equivalent to rollback.
pub struct WriterToken {
    core: Arc<StoreCore>,
}

impl WriterToken {
    pub fn core(&self) -> &Arc<StoreCore> {
        &self.core
    }
}

impl Drop for WriterToken {
    fn drop(&mut self) {
        self.core.writer_live.store(false, Ordering::Release);
    }
}

/// Open (or attach to) the store for `path`. In-process opens of the same
/// path share one core; a fresh open loads the persisted image if present.
pub fn open(path: &Path) -> Result<Arc<StoreCore>> {
    let path = std::path::absolute(path)?;
    let mut registry = registry().lock();

    if let Some(core) = registry.get(&path).and_then(Weak::upgrade) {
        return Ok(core);
    }

    let state = load_image(&path)?;
    let core = Arc::new(StoreCore {
        path: path.clone(),
        current: RwLock::new(Epoch { sequence: 0, state: Arc::new(state) }),
        writer_live: AtomicBool::new(false),
    });
    registry.insert(path, Arc::downgrade(&core));
    Ok(core)
}

fn registry() -> &'static Mutex<HashMap<PathBuf, Weak<StoreCore>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<PathBuf, Weak<StoreCore>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

fn load_image(path: &Path) -> Result<StoreState> {
    if !path.exists() {
        debug!(path = %path.display(), "new database");
        return Ok(StoreState::default());
    }
    let raw = fs::read(path)?;
    let image: StoreImage =
        bincode::deserialize(&raw).map_err(|e| Error::Storage(e.to_string()))?;
    debug!(path = %path.display(), bytes = raw.len(), "database image loaded");
    Ok(StoreState::from(image))
}

fn persist_image(path: &Path, state: &StoreState) -> Result<()> {
    let raw = bincode::serialize(&StoreImage::from(state))
        .map_err(|e| Error::Storage(e.to_string()))?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    // Temp-and-rename so a crash mid-write never truncates the live image.
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, &raw)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
