//! In-process stores for tests and local runs. Each store can be told to fail
//! or stall so partial-failure paths can be exercised deterministically.

use async_trait::async_trait;
use bytes::Bytes;
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
    time::Duration,
};
use uuid::Uuid;

use crate::storage::{ContentStore, RenditionStore, StorageError, Variant};

#[derive(Debug, Default, Clone)]
struct Faults {
    fail_writes: bool,
    fail_deletes: bool,
    write_delay: Option<Duration>,
}

#[derive(Debug, Default)]
struct State {
    objects: HashMap<String, Bytes>,
    faults: Faults,
    deletes: usize,
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
pub struct MemoryContentStore {
    state: Mutex<State>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        lock(&self.state).faults.fail_writes = fail;
    }

    pub fn fail_deletes(&self, fail: bool) {
        lock(&self.state).faults.fail_deletes = fail;
    }

    pub fn delay_writes(&self, delay: Duration) {
        lock(&self.state).faults.write_delay = Some(delay);
    }

    pub fn contains(&self, key: &str) -> bool {
        lock(&self.state).objects.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        lock(&self.state).objects.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.state).objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn delete_calls(&self) -> usize {
        lock(&self.state).deletes
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn put(&self, key: &str, data: Bytes, _content_type: &str) -> Result<(), StorageError> {
        let faults = lock(&self.state).faults.clone();
        if let Some(delay) = faults.write_delay {
            tokio::time::sleep(delay).await;
        }
        if faults.fail_writes {
            return Err(StorageError::Backend(format!("injected put failure for `{}`", key)));
        }

        lock(&self.state).objects.insert(key.to_string(), data);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut state = lock(&self.state);
        state.deletes += 1;
        if state.faults.fail_deletes {
            return Err(StorageError::Backend(format!("injected delete failure for `{}`", key)));
        }
        state.objects.remove(key);
        Ok(())
    }
}

#[derive(Debug)]
pub struct MemoryRenditionStore {
    state: Mutex<State>,
    delivery_base: String,
}

impl Default for MemoryRenditionStore {
    fn default() -> Self {
        Self::new("https://images.example.test")
    }
}

impl MemoryRenditionStore {
    pub fn new(delivery_base: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            delivery_base: delivery_base.into(),
        }
    }

    pub fn fail_uploads(&self, fail: bool) {
        lock(&self.state).faults.fail_writes = fail;
    }

    pub fn fail_deletes(&self, fail: bool) {
        lock(&self.state).faults.fail_deletes = fail;
    }

    pub fn delay_uploads(&self, delay: Duration) {
        lock(&self.state).faults.write_delay = Some(delay);
    }

    pub fn contains(&self, image_id: &str) -> bool {
        lock(&self.state).objects.contains_key(image_id)
    }

    pub fn len(&self) -> usize {
        lock(&self.state).objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn delete_calls(&self) -> usize {
        lock(&self.state).deletes
    }
}

#[async_trait]
impl RenditionStore for MemoryRenditionStore {
    async fn upload(&self, data: Bytes, file_name: &str) -> Result<String, StorageError> {
        let faults = lock(&self.state).faults.clone();
        if let Some(delay) = faults.write_delay {
            tokio::time::sleep(delay).await;
        }
        if faults.fail_writes {
            return Err(StorageError::Rejected(format!(
                "injected upload failure for `{}`",
                file_name
            )));
        }

        let image_id = Uuid::new_v4().simple().to_string();
        lock(&self.state).objects.insert(image_id.clone(), data);
        Ok(image_id)
    }

    async fn delete(&self, image_id: &str) -> Result<(), StorageError> {
        let mut state = lock(&self.state);
        state.deletes += 1;
        if state.faults.fail_deletes {
            return Err(StorageError::Rejected(format!(
                "injected delete failure for `{}`",
                image_id
            )));
        }
        state.objects.remove(image_id);
        Ok(())
    }

    fn derived_url(&self, image_id: &str, variant: Variant) -> String {
        format!("{}/{}/{}", self.delivery_base, image_id, variant.as_str())
    }
}
