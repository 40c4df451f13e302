//! In-memory change pool.
//!
//! `MemoryChangePool` is cheap to clone and shared between concurrent runs;
//! each run takes its own `PoolSession`, which is what implements
//! [`ChangeAllocator`]. The pool mutex is held only for one select-and-claim,
//! never across an await.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;

use super::policy::select_candidate;
use super::{ChangeAllocator, ChangeInput, OutputId};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("output {0} is not allocated to this session")]
    NotAllocated(OutputId),

    #[error("change pool mutex poisoned by a prior panic")]
    Poisoned,
}

type SessionId = u64;

#[derive(Debug)]
struct Entry {
    input: ChangeInput,
    holder: Option<SessionId>,
}

#[derive(Debug, Default)]
struct Shared {
    entries: Mutex<Vec<Entry>>,
    next_session: AtomicU64,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryChangePool {
    shared: Arc<Shared>,
}

impl MemoryChangePool {
    pub fn new(candidates: impl IntoIterator<Item = ChangeInput>) -> Self {
        let pool = Self::default();
        if let Ok(mut entries) = pool.shared.entries.lock() {
            for input in candidates {
                push_unique(&mut entries, input);
            }
        }
        pool
    }

    /// Add a candidate. Returns `false` if the output id is already pooled.
    pub fn insert(&self, input: ChangeInput) -> Result<bool, PoolError> {
        let mut entries = self.lock()?;
        Ok(push_unique(&mut entries, input))
    }

    /// Open a new run-scoped session.
    pub fn session(&self) -> PoolSession {
        let id = self.shared.next_session.fetch_add(1, Ordering::Relaxed);
        PoolSession {
            pool: self.clone(),
            id,
            held: Vec::new(),
        }
    }

    /// Candidates not claimed by any session.
    pub fn available(&self) -> Result<Vec<ChangeInput>, PoolError> {
        let entries = self.lock()?;
        Ok(entries
            .iter()
            .filter(|e| e.holder.is_none())
            .map(|e| e.input)
            .collect())
    }

    /// Candidates currently claimed by some session.
    pub fn allocated(&self) -> Result<Vec<ChangeInput>, PoolError> {
        let entries = self.lock()?;
        Ok(entries
            .iter()
            .filter(|e| e.holder.is_some())
            .map(|e| e.input)
            .collect())
    }

    pub fn len(&self) -> Result<usize, PoolError> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, PoolError> {
        Ok(self.lock()?.is_empty())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<Entry>>, PoolError> {
        self.shared.entries.lock().map_err(|_| PoolError::Poisoned)
    }
}

fn push_unique(entries: &mut Vec<Entry>, input: ChangeInput) -> bool {
    if entries.iter().any(|e| e.input.output_id == input.output_id) {
        return false;
    }
    entries.push(Entry {
        input,
        holder: None,
    });
    true
}

/// One run's claims against a [`MemoryChangePool`].
#[derive(Debug)]
pub struct PoolSession {
    pool: MemoryChangePool,
    id: SessionId,
    held: Vec<ChangeInput>,
}

impl PoolSession {
    /// Candidates this session currently holds, in claim order.
    pub fn held(&self) -> &[ChangeInput] {
        &self.held
    }

    /// Remove every held candidate from the pool: they are now spent.
    pub fn finalize(mut self) -> Result<Vec<ChangeInput>, PoolError> {
        let mut entries = self.pool.lock()?;
        entries.retain(|e| e.holder != Some(self.id));
        Ok(std::mem::take(&mut self.held))
    }

    /// Return every held candidate to the pool. Returns how many were released.
    pub fn abort(&mut self) -> Result<usize, PoolError> {
        let mut entries = self.pool.lock()?;
        let mut released = 0;
        for entry in entries.iter_mut().filter(|e| e.holder == Some(self.id)) {
            entry.holder = None;
            released += 1;
        }
        self.held.clear();
        Ok(released)
    }

    fn claim(
        &mut self,
        target_satoshis: u64,
        exact_satoshis: Option<u64>,
    ) -> Result<Option<ChangeInput>, PoolError> {
        let mut entries = self.pool.lock()?;
        let free: Vec<ChangeInput> = entries
            .iter()
            .filter(|e| e.holder.is_none())
            .map(|e| e.input)
            .collect();

        let Some(chosen) = select_candidate(&free, target_satoshis, exact_satoshis) else {
            return Ok(None);
        };
        if let Some(entry) = entries
            .iter_mut()
            .find(|e| e.input.output_id == chosen.output_id)
        {
            entry.holder = Some(self.id);
        }
        self.held.push(chosen);
        Ok(Some(chosen))
    }

    fn give_back(&mut self, output_id: OutputId) -> Result<(), PoolError> {
        let Some(pos) = self.held.iter().position(|c| c.output_id == output_id) else {
            return Err(PoolError::NotAllocated(output_id));
        };
        let mut entries = self.pool.lock()?;
        let entry = entries
            .iter_mut()
            .find(|e| e.input.output_id == output_id && e.holder == Some(self.id))
            .ok_or(PoolError::NotAllocated(output_id))?;
        entry.holder = None;
        self.held.remove(pos);
        Ok(())
    }
}

impl ChangeAllocator for PoolSession {
    type Error = PoolError;

    async fn allocate(
        &mut self,
        target_satoshis: u64,
        exact_satoshis: Option<u64>,
    ) -> Result<Option<ChangeInput>, PoolError> {
        self.claim(target_satoshis, exact_satoshis)
    }

    async fn release(&mut self, output_id: OutputId) -> Result<(), PoolError> {
        self.give_back(output_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(output_id: OutputId, satoshis: u64) -> ChangeInput {
        ChangeInput {
            output_id,
            satoshis,
        }
    }

    fn small_pool() -> MemoryChangePool {
        MemoryChangePool::new([input(1, 1000), input(2, 5000), input(3, 2500)])
    }

    #[test]
    fn duplicate_ids_are_ignored() {
        let pool = MemoryChangePool::new([input(1, 1000), input(1, 2000)]);
        assert_eq!(pool.len().unwrap(), 1);
        assert!(!pool.insert(input(1, 3000)).unwrap());
        assert!(pool.insert(input(2, 3000)).unwrap());
        assert_eq!(pool.len().unwrap(), 2);
    }

    #[test]
    fn claimed_candidates_are_invisible_to_other_sessions() {
        let pool = small_pool();
        let mut a = pool.session();
        let mut b = pool.session();

        let got_a = a.claim(2000, None).unwrap().unwrap();
        assert_eq!(got_a.output_id, 3);
        let got_b = b.claim(2000, None).unwrap().unwrap();
        assert_eq!(got_b.output_id, 2);
        assert_eq!(pool.available().unwrap(), vec![input(1, 1000)]);
        assert_eq!(pool.allocated().unwrap().len(), 2);
    }

    #[test]
    fn release_returns_candidate() {
        let pool = small_pool();
        let mut s = pool.session();
        let got = s.claim(5000, None).unwrap().unwrap();
        s.give_back(got.output_id).unwrap();
        assert!(s.held().is_empty());
        assert_eq!(pool.available().unwrap().len(), 3);
    }

    #[test]
    fn release_of_foreign_claim_is_rejected() {
        let pool = small_pool();
        let mut a = pool.session();
        let mut b = pool.session();
        let got = a.claim(5000, None).unwrap().unwrap();

        assert_eq!(b.give_back(got.output_id), Err(PoolError::NotAllocated(2)));
        assert_eq!(b.give_back(99), Err(PoolError::NotAllocated(99)));
        // still held by `a`
        assert_eq!(pool.allocated().unwrap(), vec![got]);
    }

    #[test]
    fn double_release_is_rejected() {
        let pool = small_pool();
        let mut s = pool.session();
        let got = s.claim(1, Some(1000)).unwrap().unwrap();
        s.give_back(got.output_id).unwrap();
        assert_eq!(s.give_back(got.output_id), Err(PoolError::NotAllocated(1)));
    }

    #[test]
    fn exhausted_pool_returns_none() {
        let pool = MemoryChangePool::new([input(1, 1000)]);
        let mut s = pool.session();
        assert!(s.claim(10, None).unwrap().is_some());
        assert!(s.claim(10, None).unwrap().is_none());
    }

    #[test]
    fn finalize_removes_held_candidates() {
        let pool = small_pool();
        let mut s = pool.session();
        s.claim(1000, Some(1000)).unwrap();
        s.claim(2500, None).unwrap();
        let spent = s.finalize().unwrap();
        assert_eq!(spent.len(), 2);
        assert_eq!(pool.len().unwrap(), 1);
        assert_eq!(pool.available().unwrap(), vec![input(2, 5000)]);
    }

    #[test]
    fn abort_releases_everything_held() {
        let pool = small_pool();
        let mut s = pool.session();
        s.claim(1, None).unwrap();
        s.claim(1, None).unwrap();
        assert_eq!(s.abort().unwrap(), 2);
        assert!(s.held().is_empty());
        assert!(pool.allocated().unwrap().is_empty());
    }
}
