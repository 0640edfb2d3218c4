use crate::operation::{Operation, OperationId, OperationParams};
use crate::CoreError;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// In-memory store of every operation created in this process.
///
/// Records are never evicted. Reads return owned snapshots; updates are
/// applied to a draft copy and swapped in under the write lock, so a reader
/// sees either the old record or the new one, never a mix.
#[derive(Debug, Default)]
pub struct OperationRegistry {
    ops: RwLock<HashMap<OperationId, Operation>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new `pending` operation and return its fresh id.
    pub fn create(&self, params: OperationParams) -> OperationId {
        let mut ops = self.write();
        let id = loop {
            let candidate = OperationId::generate();
            if !ops.contains_key(&candidate) {
                break candidate;
            }
        };
        ops.insert(id.clone(), Operation::new(id.clone(), params));
        id
    }

    pub fn get(&self, id: &OperationId) -> Result<Operation, CoreError> {
        self.read()
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::OperationNotFound(id.to_string()))
    }

    /// Apply `mutation` to the record. If it returns an error the record is
    /// left exactly as it was.
    pub fn update<T>(
        &self,
        id: &OperationId,
        mutation: impl FnOnce(&mut Operation) -> Result<T, CoreError>,
    ) -> Result<T, CoreError> {
        let mut ops = self.write();
        let current = ops
            .get_mut(id)
            .ok_or_else(|| CoreError::OperationNotFound(id.to_string()))?;
        let mut draft = current.clone();
        let out = mutation(&mut draft)?;
        *current = draft;
        Ok(out)
    }

    pub fn count(&self) -> usize {
        self.read().len()
    }

    // A panic while holding the lock cannot leave a half-written record
    // (updates swap whole drafts), so poisoned guards are safe to reuse.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<OperationId, Operation>> {
        self.ops.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<OperationId, Operation>> {
        self.ops.write().unwrap_or_else(PoisonError::into_inner)
    }
}
