//! Import run context
//!
//! One `Importer` owns everything a run mutates: the import buffer (and its
//! identity cache), the protocol client and the run statistics. Files are
//! processed one after another; each file's pipeline is fully drained before
//! the next one starts, and the single consumer loop here is the only writer
//! of the buffer.

use crate::config::{FileSchema, ImportConfig, ImportOptions};
use crate::error::{ImportError, Result};
use crate::graph::Entity;
use crate::mapping::EntityMapper;
use crate::pipeline::{self, CancelFlag};
use crate::protocol::{BulkClient, Transport};
use crate::reader::{RowReader, RowSource};
use crate::storage::{Batch, ImportBuffer, LabelCount};

/// Totals for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub files: u64,
    pub rows: u64,
    /// Nodes and edges acknowledged by the store
    pub nodes: u64,
    pub edges: u64,
    pub duplicate_nodes: u64,
    /// Records dropped by lenient mode
    pub skipped_records: u64,
    pub batches: u64,
    /// Serialized records per label, nodes first
    pub labels: Vec<(String, u64)>,
}

impl ImportStats {
    pub fn label_count(&self, label: &str) -> Option<u64> {
        self.labels
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, n)| *n)
    }
}

pub struct Importer<T: Transport> {
    buffer: ImportBuffer,
    client: BulkClient<T>,
    options: ImportOptions,
    cancel: CancelFlag,
    stats: ImportStats,
}

impl<T: Transport> Importer<T> {
    pub fn new(transport: T, graph: &str, options: ImportOptions, cancel: CancelFlag) -> Self {
        Self {
            buffer: ImportBuffer::new(options.node_batch_size, options.edge_batch_size),
            client: BulkClient::new(transport, graph),
            options,
            cancel,
            stats: ImportStats::default(),
        }
    }

    pub fn from_config(transport: T, config: &ImportConfig, cancel: CancelFlag) -> Self {
        Self::new(transport, &config.store.graph, config.import.clone(), cancel)
    }

    pub fn client(&self) -> &BulkClient<T> {
        &self.client
    }

    pub fn buffer(&self) -> &ImportBuffer {
        &self.buffer
    }

    pub fn stats(&self) -> &ImportStats {
        &self.stats
    }

    /// Import every file in order, then finish the run.
    pub fn run(&mut self, files: &[FileSchema]) -> Result<ImportStats> {
        for schema in files {
            self.import_file(schema)?;
        }
        self.finish()
    }

    pub fn import_file(&mut self, schema: &FileSchema) -> Result<()> {
        let reader = RowReader::open(schema)?;
        if schema.columns.is_empty() {
            let columns = match reader.header() {
                Some(header) if !header.is_empty() => header.to_vec(),
                _ => {
                    return Err(ImportError::InvalidConfig(format!(
                        "{}: no columns configured and no header row",
                        schema.filename
                    )))
                }
            };
            let schema = FileSchema {
                columns,
                ..schema.clone()
            };
            return self.import_source(&schema, reader.into_source());
        }
        self.import_source(schema, reader.into_source())
    }

    /// Drive one file's rows through the pipeline into the buffer.
    pub fn import_source(&mut self, schema: &FileSchema, source: RowSource) -> Result<()> {
        self.check_cancelled()?;
        tracing::info!("importing {}", schema.filename);

        self.buffer.register_schema(schema)?;
        let mapper = EntityMapper::new(schema, self.options.mode)?;
        let mut stream = pipeline::spawn(source, mapper, self.cancel.clone())?;

        let interval = self.options.progress_interval as u64;
        let mut entities = 0u64;
        for item in stream.by_ref() {
            match item? {
                Entity::Node(node) => self.buffer.push_node(node)?,
                Entity::Edge(edge) => self.buffer.push_edge(edge)?,
            }
            entities += 1;
            if interval > 0 && entities % interval == 0 {
                tracing::info!(
                    "{}: {} entities read, {} nodes / {} edges pending",
                    schema.filename,
                    entities,
                    self.buffer.pending_node_count(),
                    self.buffer.pending_edge_count()
                );
            }
            if self.buffer.should_flush() {
                let batch = self.buffer.flush()?;
                self.send(batch)?;
            }
        }

        let rows = stream.counters().rows();
        let skipped = stream.counters().skipped();
        stream.join()?;

        self.stats.files += 1;
        self.stats.rows += rows;
        self.stats.skipped_records += skipped;
        tracing::info!(
            "finished {}: {} rows, {} entities, {} skipped",
            schema.filename,
            rows,
            entities,
            skipped
        );
        Ok(())
    }

    /// Final forced flush, then the terminal resolution check.
    pub fn finish(&mut self) -> Result<ImportStats> {
        let batch = self.buffer.finish()?;
        self.send(batch)?;

        self.stats.duplicate_nodes = self.buffer.duplicate_nodes();
        let counts = self.buffer.label_counts();
        self.stats.labels = counts.iter().map(|c| (c.label.clone(), c.flushed)).collect();
        log_summary(&self.stats, &counts);

        self.buffer.check_resolved()?;
        Ok(self.stats.clone())
    }

    fn send(&mut self, batch: Batch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.check_cancelled()?;
        let ack = self.client.send(&batch)?;
        self.stats.batches += 1;
        self.stats.nodes += ack.nodes_created.unwrap_or(batch.node_count);
        self.stats.edges += ack.edges_created.unwrap_or(batch.edge_count);
        Ok(())
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            tracing::warn!("import cancelled");
            return Err(ImportError::Cancelled);
        }
        Ok(())
    }
}

fn log_summary(stats: &ImportStats, counts: &[LabelCount]) {
    tracing::info!(
        "import summary: {} files, {} rows, {} nodes, {} edges in {} batches ({} duplicate nodes, {} skipped records)",
        stats.files,
        stats.rows,
        stats.nodes,
        stats.edges,
        stats.batches,
        stats.duplicate_nodes,
        stats.skipped_records
    );
    for c in counts {
        tracing::info!(
            "  {}{}: {}",
            if c.is_node { "" } else { ":" },
            c.label,
            c.flushed
        );
        if c.pending > 0 {
            tracing::warn!("  :{} has {} unresolved edges", c.label, c.pending);
        }
    }
}
