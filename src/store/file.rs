use super::{StoreState, TopologySnapshot, TopomStore};
use crate::core::{Result, TopomError};
use crate::models::{Group, GroupId, Proxy, SlotMapping, TopomModel};
use async_trait::async_trait;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{Level, event};

#[derive(Clone, Copy)]
enum LockMode {
    Shared,
    Exclusive,
}

/// Store persisted as a single JSON document shared by every process that opens it.
///
/// Each operation takes an OS lock on `<path>.lock`, re-reads the document,
/// and for mutations writes `<path>.tmp` and renames it over the document before
/// the lock is released. No state is cached between operations, so every
/// compare-and-swap is checked against what is on disk.
///
/// After [`TopomStore::acquire`] succeeds, mutations through this handle fail
/// with `Locked` once the document names a different manager.
pub struct FileStore {
    path: PathBuf,
    lock_path: PathBuf,
    max_slot_num: u32,
    owner: Mutex<Option<String>>,
}

impl FileStore {
    /// Opens the document at `path`, creating it with `max_slot_num` empty slots when absent.
    pub async fn open(path: impl AsRef<Path>, max_slot_num: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let store = Self {
            lock_path: path.with_extension("lock"),
            path,
            max_slot_num,
            owner: Mutex::new(None),
        };

        let created = store
            .with_lock(LockMode::Exclusive, move |path| match read_state(path)? {
                Some(state) if state.snapshot.max_slot_num() != max_slot_num => {
                    Err(TopomError::Validation(format!(
                        "store {} holds {} slots, configured max_slot_num is {}",
                        path.display(),
                        state.snapshot.max_slot_num(),
                        max_slot_num
                    )))
                }
                Some(_) => Ok(false),
                None => {
                    write_state(path, &StoreState::new(max_slot_num))?;
                    Ok(true)
                }
            })
            .await?;
        event!(
            Level::DEBUG,
            path = %store.path.display(),
            created,
            "file store opened"
        );
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn max_slot_num(&self) -> u32 {
        self.max_slot_num
    }

    /// Runs `work` on a blocking thread while holding the document lock.
    async fn with_lock<T, F>(&self, mode: LockMode, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Path) -> Result<T> + Send + 'static,
    {
        let path = self.path.clone();
        let lock_path = self.lock_path.clone();
        tokio::task::spawn_blocking(move || {
            let lock = open_lock_file(&lock_path)?;
            let locked = match mode {
                LockMode::Shared => lock.lock_shared(),
                LockMode::Exclusive => lock.lock_exclusive(),
            };
            locked.map_err(|err| {
                TopomError::Store(format!("lock {}: {}", lock_path.display(), err))
            })?;
            // Closing the handle releases the lock.
            work(&path)
        })
        .await
        .map_err(|err| TopomError::Store(format!("file store task failed: {}", err)))?
    }

    async fn load<T, F>(&self, read: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(StoreState) -> T + Send + 'static,
    {
        self.with_lock(LockMode::Shared, move |path| {
            Ok(read(read_existing_state(path)?))
        })
        .await
    }

    /// Applies `apply` to the on-disk state and writes the result back.
    ///
    /// With `fenced`, the write is refused unless the document still names the
    /// manager this handle acquired for.
    async fn transact<T, F>(&self, fenced: bool, apply: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut StoreState) -> Result<T> + Send + 'static,
    {
        let owner = if fenced {
            self.owner.lock().await.clone()
        } else {
            None
        };
        self.with_lock(LockMode::Exclusive, move |path| {
            let mut state = read_existing_state(path)?;
            if let Some(owner) = owner.as_deref() {
                check_owner(&state, owner)?;
            }
            let out = apply(&mut state)?;
            write_state(path, &state)?;
            Ok(out)
        })
        .await
    }

    async fn mutate<T, F>(&self, apply: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut StoreState) -> Result<T> + Send + 'static,
    {
        self.transact(true, apply).await
    }
}

fn open_lock_file(lock_path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(lock_path)
        .map_err(|err| TopomError::Store(format!("open {}: {}", lock_path.display(), err)))
}

fn read_state(path: &Path) -> Result<Option<StoreState>> {
    if !path.try_exists()? {
        return Ok(None);
    }
    let bytes = fs::read(path)?;
    let state = serde_json::from_slice::<StoreState>(&bytes).map_err(|err| {
        TopomError::Serialization(format!("parse store {}: {}", path.display(), err))
    })?;
    Ok(Some(state))
}

fn read_existing_state(path: &Path) -> Result<StoreState> {
    read_state(path)?
        .ok_or_else(|| TopomError::Store(format!("store {} has been removed", path.display())))
}

fn write_state(path: &Path, state: &StoreState) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    let json = serde_json::to_vec_pretty(state)?;
    fs::write(&tmp_path, json)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn check_owner(state: &StoreState, owner: &str) -> Result<()> {
    match &state.topom {
        Some(holder) if holder.token == owner => Ok(()),
        Some(holder) => Err(TopomError::Locked(format!(
            "store was taken over by topom {} at {}",
            holder.token, holder.admin_addr
        ))),
        None => Err(TopomError::Locked(
            "store lock was released by another process".to_string(),
        )),
    }
}

#[async_trait]
impl TopomStore for FileStore {
    async fn acquire(&self, model: &TopomModel) -> Result<()> {
        let model = model.clone();
        let token = model.token.clone();
        self.transact(false, move |state| state.acquire(&model))
            .await?;
        *self.owner.lock().await = Some(token);
        Ok(())
    }

    /// Drops the manager registration.
    ///
    /// A handle that acquired the store leaves a newer holder's lock in place;
    /// a handle that never acquired clears whatever lock is recorded.
    async fn release(&self) -> Result<()> {
        let owner = self.owner.lock().await.take();
        self.transact(false, move |state| {
            let held_by_other = matches!(
                (&state.topom, owner.as_deref()),
                (Some(holder), Some(owner)) if holder.token != owner
            );
            if !held_by_other {
                state.release();
            }
            Ok(())
        })
        .await
    }

    async fn load_topom(&self) -> Result<Option<TopomModel>> {
        self.load(|state| state.topom).await
    }

    async fn load_snapshot(&self) -> Result<TopologySnapshot> {
        self.load(|state| state.snapshot).await
    }

    async fn compare_and_swap_slot(
        &self,
        expected: &SlotMapping,
        next: SlotMapping,
    ) -> Result<()> {
        let expected = *expected;
        self.mutate(move |state| state.compare_and_swap_slot(&expected, next))
            .await
    }

    async fn compare_and_swap_slots(
        &self,
        expected: &[SlotMapping],
        next: Vec<SlotMapping>,
    ) -> Result<()> {
        let expected = expected.to_vec();
        self.mutate(move |state| state.compare_and_swap_slots(&expected, next))
            .await
    }

    async fn update_slot_mapping(&self, mapping: SlotMapping) -> Result<()> {
        self.mutate(move |state| state.update_slot_mapping(mapping))
            .await
    }

    async fn allocate_action_indexes(&self, count: u64) -> Result<u64> {
        self.mutate(move |state| Ok(state.allocate_action_indexes(count)))
            .await
    }

    async fn update_group(&self, group: Group) -> Result<()> {
        self.mutate(move |state| state.update_group(group)).await
    }

    async fn remove_group(&self, gid: GroupId) -> Result<()> {
        self.mutate(move |state| state.remove_group(gid)).await
    }

    async fn update_proxy(&self, proxy: Proxy) -> Result<()> {
        self.mutate(move |state| state.update_proxy(proxy)).await
    }

    async fn remove_proxy(&self, token: &str) -> Result<()> {
        let token = token.to_string();
        self.mutate(move |state| state.remove_proxy(&token)).await
    }
}
