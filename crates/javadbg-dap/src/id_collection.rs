use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

/// Two-way mapping between values and small positive integer ids.
///
/// Ids are minted densely from `start`. Creating an id for a value that is
/// already present returns the existing id.
#[derive(Debug)]
pub struct IdCollection<T> {
    start: i64,
    next: i64,
    by_id: HashMap<i64, T>,
    by_value: HashMap<T, i64>,
}

impl<T: Eq + Hash + Clone> Default for IdCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Eq + Hash + Clone> IdCollection<T> {
    pub fn new() -> Self {
        Self::with_start(1)
    }

    /// `start` is clamped to 1: id 0 means "no handle" on the wire.
    pub fn with_start(start: i64) -> Self {
        let start = start.max(1);
        Self {
            start,
            next: start,
            by_id: HashMap::new(),
            by_value: HashMap::new(),
        }
    }

    pub fn create(&mut self, value: T) -> i64 {
        if let Some(id) = self.by_value.get(&value) {
            return *id;
        }
        let id = self.next;
        self.next += 1;
        self.by_value.insert(value.clone(), id);
        self.by_id.insert(id, value);
        id
    }

    pub fn get(&self, id: i64) -> Option<&T> {
        self.by_id.get(&id)
    }

    pub fn remove(&mut self, id: i64) -> Option<T> {
        let value = self.by_id.remove(&id)?;
        self.by_value.remove(&value);
        Some(value)
    }

    /// Drops every mapping and restarts numbering at `start`.
    pub fn reset(&mut self) {
        self.by_id.clear();
        self.by_value.clear();
        self.next = self.start;
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Handles for debuggee entities, grouped by an owner (a thread id).
///
/// Handles are never removed one by one: they go away in bulk when their
/// owner resumes, or all at once when the whole debuggee resumes. A lookup of
/// a purged handle yields `None`.
#[derive(Debug)]
pub struct RecyclableObjectPool<K, T> {
    objects: IdCollection<T>,
    by_owner: HashMap<K, BTreeSet<i64>>,
}

impl<K: Eq + Hash, T: Eq + Hash + Clone> Default for RecyclableObjectPool<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash, T: Eq + Hash + Clone> RecyclableObjectPool<K, T> {
    pub fn new() -> Self {
        Self {
            objects: IdCollection::new(),
            by_owner: HashMap::new(),
        }
    }

    pub fn add_object(&mut self, owner: K, value: T) -> i64 {
        let id = self.objects.create(value);
        self.by_owner.entry(owner).or_default().insert(id);
        id
    }

    pub fn get_object_by_id(&self, id: i64) -> Option<&T> {
        if id <= 0 {
            return None;
        }
        self.objects.get(id)
    }

    /// Purges the handles owned by `owner` and returns how many were dropped.
    pub fn remove_objects_by_owner(&mut self, owner: &K) -> usize {
        let Some(ids) = self.by_owner.remove(owner) else {
            return 0;
        };
        ids.iter().filter(|id| self.objects.remove(**id).is_some()).count()
    }

    /// Purges every handle. Numbering continues, so stale ids stay stale.
    pub fn remove_all_objects(&mut self) {
        self.by_owner.clear();
        self.objects.by_id.clear();
        self.objects.by_value.clear();
    }

    /// Purges every handle and restarts numbering. Used when a session ends.
    pub fn reset(&mut self) {
        self.by_owner.clear();
        self.objects.reset();
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
