//! Shared fixtures: a counting/fault-injecting store and a small scripted
//! backend.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use target_flow::{
    FactStore, MemoryFactStore, Resolver, ScriptBackend, ScriptContext, ScriptCreateError,
    ScriptOutcome, Stamp, StoreError, TargetDecl, TxHandle, UpdateScript,
};

/// Store wrapper that counts transaction calls and can inject failures.
#[derive(Default)]
pub struct ChaosStore {
    inner: MemoryFactStore,
    pub begins: AtomicUsize,
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
    pub fail_begin: AtomicBool,
    pub fail_commit: AtomicBool,
}

impl ChaosStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bump a fact, buffered when called inside an open transaction.
    pub fn bump(&self, fact: &str) -> Stamp {
        self.inner.bump(fact)
    }
}

impl FactStore for ChaosStore {
    fn fact_stamp(&self, fact: &str) -> Stamp {
        self.inner.fact_stamp(fact)
    }

    fn register_fact(&self, fact: &str) -> Result<(), StoreError> {
        self.inner.register_fact(fact)
    }

    fn start_transaction(&self) -> Result<TxHandle, StoreError> {
        self.begins.fetch_add(1, Ordering::SeqCst);
        if self.fail_begin.load(Ordering::SeqCst) {
            return Err(StoreError::with_code("injected begin failure", 11));
        }
        self.inner.start_transaction()
    }

    fn commit_transaction(&self, tx: TxHandle) -> Result<(), StoreError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        if self.fail_commit.load(Ordering::SeqCst) {
            // A failed commit invalidates the transaction either way.
            self.inner.rollback_transaction(tx);
            return Err(StoreError::with_code("injected commit failure", 5));
        }
        self.inner.commit_transaction(tx)
    }

    fn rollback_transaction(&self, tx: TxHandle) {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.inner.rollback_transaction(tx)
    }
}

/// Shared record of script executions, in order.
#[derive(Clone, Default)]
pub struct RunLog(Arc<Mutex<Vec<String>>>);

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

enum Behavior {
    /// Bump the named fact through the store, report `Updated`.
    Bump(String),
    /// Do nothing, report `Unchanged`.
    Noop,
    /// Report `Failed` with the given code.
    Fail(i32),
    /// Fail the first execution, then behave like `Bump`.
    Flaky { fact: String, failed: bool },
    /// Increment the `counter` context slot, report `Updated`.
    CtxIncr,
}

pub struct TestScript {
    store: Arc<ChaosStore>,
    log: RunLog,
    kind: String,
    source: String,
    behavior: Behavior,
}

impl UpdateScript for TestScript {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn source(&self) -> &str {
        &self.source
    }

    fn execute(&mut self, ctx: &mut ScriptContext) -> ScriptOutcome {
        self.log.push(format!("{} {}", self.kind, self.source));
        match &mut self.behavior {
            Behavior::Bump(fact) => {
                self.store.bump(fact);
                ScriptOutcome::Updated
            }
            Behavior::Noop => ScriptOutcome::Unchanged,
            Behavior::Fail(code) => ScriptOutcome::Failed(*code),
            Behavior::Flaky { fact, failed } => {
                if !*failed {
                    *failed = true;
                    ScriptOutcome::Failed(-5)
                } else {
                    self.store.bump(fact);
                    ScriptOutcome::Updated
                }
            }
            Behavior::CtxIncr => {
                if let Some(counter) = ctx.get_mut::<u32>("counter") {
                    *counter += 1;
                }
                ScriptOutcome::Updated
            }
        }
    }
}

/// Backend with a handful of scripted behaviors, selected by kind:
/// `bump <fact>`, `noop`, `fail <code>`, `flaky <fact>`, `ctx-incr`.
pub struct TestBackend {
    pub store: Arc<ChaosStore>,
    pub log: RunLog,
}

impl ScriptBackend for TestBackend {
    fn create(
        &self,
        kind: &str,
        source: &str,
    ) -> Result<Box<dyn UpdateScript>, ScriptCreateError> {
        let behavior = match kind {
            "bump" => Behavior::Bump(source.to_string()),
            "noop" => Behavior::Noop,
            "fail" => Behavior::Fail(source.trim().parse().unwrap_or(-1)),
            "flaky" => Behavior::Flaky {
                fact: source.to_string(),
                failed: false,
            },
            "ctx-incr" => Behavior::CtxIncr,
            _ => return Err(ScriptCreateError::UnsupportedKind),
        };
        Ok(Box::new(TestScript {
            store: Arc::clone(&self.store),
            log: self.log.clone(),
            kind: kind.to_string(),
            source: source.to_string(),
            behavior,
        }))
    }
}

/// Build a resolver over a fresh [`ChaosStore`] and [`TestBackend`].
///
/// Run with `RUST_LOG=target_flow=trace` to see the update walk.
pub fn resolver(
    decls: Vec<TargetDecl>,
    auto_update: Option<&str>,
) -> (Resolver<Arc<ChaosStore>>, Arc<ChaosStore>, RunLog) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let store = Arc::new(ChaosStore::new());
    let log = RunLog::new();
    let backend = TestBackend {
        store: Arc::clone(&store),
        log: log.clone(),
    };
    let resolver = Resolver::new(
        Arc::clone(&store),
        &backend,
        decls,
        auto_update.map(String::from),
    )
    .expect("graph construction failed");
    (resolver, store, log)
}
