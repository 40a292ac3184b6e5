//! The fact store boundary.
//!
//! Facts are named, externally stored records with monotonically increasing
//! version stamps. The resolver never writes facts itself; update scripts do,
//! through whatever handle the embedder gives them. The resolver only reads
//! stamps and brackets every update pass in one store transaction.
//!
//! # Atomicity precondition
//!
//! The rollback performed on a failed pass undoes the resolver's own stamp
//! bookkeeping and the transaction's effects, nothing more. If an update
//! script writes outside the transaction, those writes survive a failed pass.
//! Correctness therefore requires that the store transaction encompass every
//! write any script performs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::error::StoreError;
use crate::stamp::Stamp;

/// Opaque handle for an open store transaction.
///
/// Obtained, committed or rolled back once per top-level update request;
/// never held across requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHandle(pub u64);

/// Boundary trait for the transactional fact store.
///
/// All methods take `&self`; interior mutability is the store's business.
/// This lets update scripts share the store with the resolver through
/// [`Arc`] without aliasing trouble.
pub trait FactStore {
    /// Current stamp of a fact. Pure, non-blocking lookup.
    ///
    /// Must never decrease for a given fact while the process runs. Reads
    /// made inside an open transaction observe that transaction's own writes.
    fn fact_stamp(&self, fact: &str) -> Stamp;

    /// Ensure a fact exists in the store.
    ///
    /// Called by the graph builder for every fact reference; this is the only
    /// implicit-creation path in the system. Must be idempotent. The default
    /// implementation succeeds without doing anything, for stores that create
    /// facts lazily.
    fn register_fact(&self, fact: &str) -> Result<(), StoreError> {
        let _ = fact;
        Ok(())
    }

    /// Begin an atomic unit of work.
    fn start_transaction(&self) -> Result<TxHandle, StoreError>;

    /// Best-effort atomic commit of an open transaction.
    fn commit_transaction(&self, tx: TxHandle) -> Result<(), StoreError>;

    /// Unconditional, non-failing discard of an open transaction's effects.
    fn rollback_transaction(&self, tx: TxHandle);
}

impl<S: FactStore + ?Sized> FactStore for &S {
    fn fact_stamp(&self, fact: &str) -> Stamp {
        (**self).fact_stamp(fact)
    }

    fn register_fact(&self, fact: &str) -> Result<(), StoreError> {
        (**self).register_fact(fact)
    }

    fn start_transaction(&self) -> Result<TxHandle, StoreError> {
        (**self).start_transaction()
    }

    fn commit_transaction(&self, tx: TxHandle) -> Result<(), StoreError> {
        (**self).commit_transaction(tx)
    }

    fn rollback_transaction(&self, tx: TxHandle) {
        (**self).rollback_transaction(tx)
    }
}

impl<S: FactStore + ?Sized> FactStore for Arc<S> {
    fn fact_stamp(&self, fact: &str) -> Stamp {
        (**self).fact_stamp(fact)
    }

    fn register_fact(&self, fact: &str) -> Result<(), StoreError> {
        (**self).register_fact(fact)
    }

    fn start_transaction(&self) -> Result<TxHandle, StoreError> {
        (**self).start_transaction()
    }

    fn commit_transaction(&self, tx: TxHandle) -> Result<(), StoreError> {
        (**self).commit_transaction(tx)
    }

    fn rollback_transaction(&self, tx: TxHandle) {
        (**self).rollback_transaction(tx)
    }
}

/// In-memory fact store with write-buffered transactions.
///
/// Writes made while a transaction is open land in a pending buffer that is
/// applied on commit and discarded on rollback; stamp reads inside the
/// transaction observe the buffer. One transaction may be open at a time,
/// matching the resolver's single-threaded execution model.
///
/// This is the stock store for tests and small embeddings; production
/// embedders implement [`FactStore`] over their own database.
#[derive(Debug, Default)]
pub struct MemoryFactStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    facts: HashMap<String, Stamp>,
    tx: Option<PendingTx>,
    next_handle: u64,
}

#[derive(Debug)]
struct PendingTx {
    handle: TxHandle,
    writes: HashMap<String, Stamp>,
}

impl MemoryFactStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance a fact's stamp by one, returning the new stamp.
    ///
    /// Inside an open transaction the write is buffered; otherwise it is
    /// applied directly (an "external writer" from the resolver's point of
    /// view). Bumping implicitly registers the fact.
    pub fn bump(&self, fact: &str) -> Stamp {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let next = inner.current(fact).next();
        match &mut inner.tx {
            Some(tx) => {
                tx.writes.insert(fact.to_string(), next);
            }
            None => {
                inner.facts.insert(fact.to_string(), next);
            }
        }
        next
    }
}

impl MemoryInner {
    fn current(&self, fact: &str) -> Stamp {
        if let Some(tx) = &self.tx {
            if let Some(stamp) = tx.writes.get(fact) {
                return *stamp;
            }
        }
        self.facts.get(fact).copied().unwrap_or(Stamp::ZERO)
    }
}

impl FactStore for MemoryFactStore {
    fn fact_stamp(&self, fact: &str) -> Stamp {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.current(fact)
    }

    fn register_fact(&self, fact: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.facts.entry(fact.to_string()).or_insert(Stamp::ZERO);
        Ok(())
    }

    fn start_transaction(&self) -> Result<TxHandle, StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.tx.is_some() {
            return Err(StoreError::invalid("transaction already open"));
        }
        let handle = TxHandle(inner.next_handle);
        inner.next_handle += 1;
        inner.tx = Some(PendingTx {
            handle,
            writes: HashMap::new(),
        });
        debug!(handle = handle.0, "transaction opened");
        Ok(handle)
    }

    fn commit_transaction(&self, tx: TxHandle) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match inner.tx.take() {
            Some(pending) if pending.handle == tx => {
                for (fact, stamp) in pending.writes {
                    inner.facts.insert(fact, stamp);
                }
                debug!(handle = tx.0, "transaction committed");
                Ok(())
            }
            other => {
                inner.tx = other;
                Err(StoreError::invalid("commit of unknown transaction"))
            }
        }
    }

    fn rollback_transaction(&self, tx: TxHandle) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match inner.tx.take() {
            Some(pending) if pending.handle == tx => {
                debug!(handle = tx.0, "transaction rolled back");
            }
            other => inner.tx = other,
        }
    }
}
