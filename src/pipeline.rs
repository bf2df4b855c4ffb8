//! Streaming pipeline: row producer -> entity mapper -> consumer
//!
//! ```text
//! row thread            rendezvous          map thread            rendezvous     consumer
//!     │                     │                   │                     │              │
//!     ├─ RowSource.next() ─►│ Result<Row> ─────►│ map_row()           │              │
//!     │                     │                   ├─ Entity ───────────►│ ────────────►│ ImportBuffer
//!     │                     │                   ├─ Entity ───────────►│ ────────────►│
//! ```
//!
//! Both channels have capacity 0, so a stage blocks until the next one takes
//! its item. Closing the entity channel is the only end-of-data signal.
//! Dropping the stream closes the channels from the consumer side, which
//! unblocks and stops both stages.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::error::{ImportError, Result};
use crate::graph::Entity;
use crate::mapping::EntityMapper;
use crate::reader::{Row, RowSource};

/// Run-wide cancellation flag, shared by stages and signal handlers
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Underlying flag, for `signal_hook::flag::register`
    pub fn as_arc(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

#[derive(Debug, Default)]
pub struct StageCounters {
    rows: AtomicU64,
    entities: AtomicU64,
    skipped: AtomicU64,
}

impl StageCounters {
    pub fn rows(&self) -> u64 {
        self.rows.load(Ordering::Relaxed)
    }

    pub fn entities(&self) -> u64 {
        self.entities.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
}

fn row_stage(source: RowSource, tx: Sender<Result<Row>>, cancel: CancelFlag, counters: Arc<StageCounters>) {
    for item in source {
        if cancel.is_cancelled() {
            break;
        }
        let failed = item.is_err();
        if item.is_ok() {
            counters.rows.fetch_add(1, Ordering::Relaxed);
        }
        if tx.send(item).is_err() || failed {
            break;
        }
    }
}

fn map_stage(
    mapper: EntityMapper,
    rx: Receiver<Result<Row>>,
    tx: Sender<Result<Entity>>,
    cancel: CancelFlag,
    counters: Arc<StageCounters>,
) {
    for item in rx.iter() {
        if cancel.is_cancelled() {
            return;
        }
        let mapped = match item.and_then(|row| mapper.map_row(&row)) {
            Ok(mapped) => mapped,
            Err(e) => {
                let _ = tx.send(Err(e));
                return;
            }
        };
        if mapped.skipped > 0 {
            counters.skipped.fetch_add(mapped.skipped as u64, Ordering::Relaxed);
        }
        for entity in mapped.entities {
            if tx.send(Ok(entity)).is_err() {
                return;
            }
            counters.entities.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Consumer end of a running pipeline
pub struct EntityStream {
    rx: Option<Receiver<Result<Entity>>>,
    handles: Vec<JoinHandle<()>>,
    cancel: CancelFlag,
    counters: Arc<StageCounters>,
    done: bool,
}

/// Start both stages for one file.
pub fn spawn(source: RowSource, mapper: EntityMapper, cancel: CancelFlag) -> Result<EntityStream> {
    let (row_tx, row_rx) = bounded::<Result<Row>>(0);
    let (entity_tx, entity_rx) = bounded::<Result<Entity>>(0);
    let counters = Arc::new(StageCounters::default());

    let producer = {
        let cancel = cancel.clone();
        let counters = Arc::clone(&counters);
        thread::Builder::new()
            .name("graphbulk-rows".into())
            .spawn(move || row_stage(source, row_tx, cancel, counters))?
    };
    let mapper_handle = {
        let cancel = cancel.clone();
        let counters = Arc::clone(&counters);
        thread::Builder::new()
            .name("graphbulk-map".into())
            .spawn(move || map_stage(mapper, row_rx, entity_tx, cancel, counters))?
    };

    Ok(EntityStream {
        rx: Some(entity_rx),
        handles: vec![producer, mapper_handle],
        cancel,
        counters,
        done: false,
    })
}

impl EntityStream {
    pub fn counters(&self) -> &StageCounters {
        &self.counters
    }

    /// Close the consumer side and wait for both stages.
    pub fn join(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        self.rx.take();
        let mut result = Ok(());
        for handle in self.handles.drain(..) {
            let name = handle.thread().name().unwrap_or("stage").to_string();
            if handle.join().is_err() {
                result = Err(ImportError::Pipeline(format!("{} thread panicked", name)));
            }
        }
        result
    }
}

impl Iterator for EntityStream {
    type Item = Result<Entity>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let rx = self.rx.as_ref()?;
        match rx.recv() {
            Ok(item) => Some(item),
            Err(_) => {
                self.done = true;
                // stages exit early on cancellation, which also closes the channel
                if self.cancel.is_cancelled() {
                    Some(Err(ImportError::Cancelled))
                } else {
                    None
                }
            }
        }
    }
}

impl Drop for EntityStream {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::error!("pipeline shutdown: {}", e);
        }
    }
}
