//! Import buffer: per-label accumulation, id assignment and batch encoding
//!
//! Records are held as domain values until a flush cycle, which materializes
//! wire bytes lazily:
//!
//! ```text
//! push_node / push_edge ──► LabelBuffer.pending ──(threshold)──► flush()
//!                                                                 │
//!   node labels first: assign dense ids, encode records  ◄────────┤
//!   edge labels next:  resolve endpoints via IdCache     ◄────────┘
//!                      resolved -> encode, missing -> stay pending
//! ```
//!
//! Ids are assigned at serialization time, in payload order, so the ids in the
//! cache match the positions the store gives the nodes.

use std::collections::HashMap;

use crate::config::FileSchema;
use crate::error::{DanglingReference, Endpoint, ImportError, Result};
use crate::graph::{Edge, IdCache, Node};
use crate::storage::codec;

/// Encoded bytes for one label in one batch
#[derive(Debug, Clone, PartialEq)]
pub struct LabelBlob {
    pub label: String,
    /// True when `bytes` starts with the label header (first flush of the label)
    pub has_header: bool,
    pub record_count: u64,
    pub property_count: usize,
    pub bytes: Vec<u8>,
}

/// One ready-to-send bulk-load message
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub node_count: u64,
    pub edge_count: u64,
    pub node_blobs: Vec<LabelBlob>,
    pub edge_blobs: Vec<LabelBlob>,
}

impl Batch {
    pub fn is_empty(&self) -> bool {
        self.node_count == 0 && self.edge_count == 0
    }

    pub fn node_label_count(&self) -> usize {
        self.node_blobs.len()
    }

    pub fn edge_label_count(&self) -> usize {
        self.edge_blobs.len()
    }

    pub fn byte_len(&self) -> usize {
        self.node_blobs
            .iter()
            .chain(self.edge_blobs.iter())
            .map(|b| b.bytes.len())
            .sum()
    }
}

/// Lifecycle of a buffered edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeState {
    /// Waiting for one or both endpoints to get an id
    Pending,
    /// Input exhausted and an endpoint never appeared
    TerminallyUnresolved,
}

#[derive(Debug, Clone)]
pub struct PendingEdge {
    pub edge: Edge,
    pub state: EdgeState,
    /// Flush cycles this edge has survived
    pub attempts: u32,
}

enum Resolution {
    Resolved { src: u64, dst: u64 },
    Deferred,
}

fn resolve(ids: &IdCache, edge: &Edge) -> Result<Resolution> {
    let src = match ids.get(&edge.src_label, &edge.src_key) {
        Ok(id) => id,
        Err(e) if e.is_soft() => return Ok(Resolution::Deferred),
        Err(e) => return Err(e),
    };
    let dst = match ids.get(&edge.dst_label, &edge.dst_key) {
        Ok(id) => id,
        Err(e) if e.is_soft() => return Ok(Resolution::Deferred),
        Err(e) => return Err(e),
    };
    Ok(Resolution::Resolved { src, dst })
}

/// Accumulated, not-yet-flushed records for one label
#[derive(Debug)]
pub struct LabelBuffer<T> {
    label: String,
    property_names: Vec<String>,
    header_written: bool,
    pending: Vec<T>,
    added_since_flush: usize,
    flushed: u64,
}

impl<T> LabelBuffer<T> {
    fn new(label: &str, property_names: Vec<String>) -> Self {
        Self {
            label: label.to_string(),
            property_names,
            header_written: false,
            pending: Vec::new(),
            added_since_flush: 0,
            flushed: 0,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn property_names(&self) -> &[String] {
        &self.property_names
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn flushed(&self) -> u64 {
        self.flushed
    }

    pub fn header_written(&self) -> bool {
        self.header_written
    }

    /// Wrap this cycle's records into a blob, prefixing the header once per label.
    fn seal(&mut self, records: Vec<u8>, count: u64) -> Option<LabelBlob> {
        if count == 0 {
            return None;
        }
        let has_header = !self.header_written;
        let bytes = if has_header {
            let mut bytes = Vec::with_capacity(records.len() + self.label.len() + 64);
            codec::write_header(&mut bytes, &self.label, &self.property_names);
            bytes.extend_from_slice(&records);
            bytes
        } else {
            records
        };
        self.header_written = true;
        self.flushed += count;
        Some(LabelBlob {
            label: self.label.clone(),
            has_header,
            record_count: count,
            property_count: self.property_names.len(),
            bytes,
        })
    }
}

/// Arena of label buffers, kept in registration order
#[derive(Debug)]
struct LabelArena<T> {
    buffers: Vec<LabelBuffer<T>>,
    index: HashMap<String, usize>,
}

impl<T> LabelArena<T> {
    fn new() -> Self {
        Self {
            buffers: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn register(&mut self, label: &str, property_names: Vec<String>) -> Result<()> {
        match self.index.get(label) {
            Some(&idx) => {
                if self.buffers[idx].property_names != property_names {
                    return Err(ImportError::LabelConflict(label.to_string()));
                }
                Ok(())
            }
            None => {
                self.index.insert(label.to_string(), self.buffers.len());
                self.buffers.push(LabelBuffer::new(label, property_names));
                Ok(())
            }
        }
    }

    fn get_mut(&mut self, label: &str) -> Result<&mut LabelBuffer<T>> {
        match self.index.get(label) {
            Some(&idx) => Ok(&mut self.buffers[idx]),
            None => Err(ImportError::UnknownLabel(label.to_string())),
        }
    }

    fn contains(&self, label: &str) -> bool {
        self.index.contains_key(label)
    }
}

/// Per-label summary used for end-of-run reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelCount {
    pub label: String,
    pub is_node: bool,
    pub flushed: u64,
    pub pending: usize,
}

#[derive(Debug)]
pub struct ImportBuffer {
    ids: IdCache,
    nodes: LabelArena<Node>,
    edges: LabelArena<PendingEdge>,
    node_batch_size: usize,
    edge_batch_size: usize,
    flush_due: bool,
    closed: bool,
    duplicate_nodes: u64,
}

impl ImportBuffer {
    pub fn new(node_batch_size: usize, edge_batch_size: usize) -> Self {
        Self {
            ids: IdCache::new(),
            nodes: LabelArena::new(),
            edges: LabelArena::new(),
            node_batch_size: node_batch_size.max(1),
            edge_batch_size: edge_batch_size.max(1),
            flush_due: false,
            closed: false,
            duplicate_nodes: 0,
        }
    }

    /// Register every label a file can produce.
    ///
    /// A label seen in an earlier file must keep the same property list, since
    /// its header has possibly been sent already.
    pub fn register_schema(&mut self, schema: &FileSchema) -> Result<()> {
        for mapping in &schema.nodes {
            self.nodes.register(&mapping.label, mapping.property_names())?;
        }
        for mapping in &schema.edges {
            self.edges.register(&mapping.label, mapping.property_names())?;
        }
        Ok(())
    }

    pub fn ids(&self) -> &IdCache {
        &self.ids
    }

    pub fn push_node(&mut self, node: Node) -> Result<()> {
        self.ensure_open()?;
        let threshold = self.node_batch_size;
        let buffer = self.nodes.get_mut(&node.label)?;
        buffer.pending.push(node);
        buffer.added_since_flush += 1;
        if buffer.added_since_flush >= threshold {
            self.flush_due = true;
        }
        Ok(())
    }

    pub fn push_edge(&mut self, edge: Edge) -> Result<()> {
        self.ensure_open()?;
        let threshold = self.edge_batch_size;
        let buffer = self.edges.get_mut(&edge.label)?;
        buffer.pending.push(PendingEdge {
            edge,
            state: EdgeState::Pending,
            attempts: 0,
        });
        buffer.added_since_flush += 1;
        if buffer.added_since_flush >= threshold {
            self.flush_due = true;
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(ImportError::InvalidArgument(
                "import buffer already finished".into(),
            ));
        }
        Ok(())
    }

    /// A label crossed its kind's threshold since the last cycle.
    pub fn should_flush(&self) -> bool {
        self.flush_due
    }

    /// Run one flush cycle over every label. Returns an empty batch when
    /// nothing could be serialized.
    pub fn flush(&mut self) -> Result<Batch> {
        let mut batch = Batch::default();

        for buffer in &mut self.nodes.buffers {
            buffer.added_since_flush = 0;
            if buffer.pending.is_empty() {
                continue;
            }
            let mut records = Vec::new();
            let mut count = 0u64;
            for node in buffer.pending.drain(..) {
                if self.ids.contains(&node.label, &node.key) {
                    self.duplicate_nodes += 1;
                    tracing::debug!("skipping duplicate node {}:{}", node.label, node.key);
                    continue;
                }
                self.ids.put(&node.label, &node.key)?;
                codec::write_properties(&mut records, &node.properties);
                count += 1;
            }
            if let Some(blob) = buffer.seal(records, count) {
                batch.node_count += blob.record_count;
                batch.node_blobs.push(blob);
            }
        }

        let mut deferred_total = 0usize;
        for buffer in &mut self.edges.buffers {
            buffer.added_since_flush = 0;
            if buffer.pending.is_empty() {
                continue;
            }
            let mut records = Vec::new();
            let mut count = 0u64;
            let mut deferred = Vec::new();
            for mut pending in buffer.pending.drain(..) {
                match resolve(&self.ids, &pending.edge)? {
                    Resolution::Resolved { src, dst } => {
                        codec::write_edge(&mut records, src, dst, &pending.edge.properties);
                        count += 1;
                    }
                    Resolution::Deferred => {
                        pending.attempts += 1;
                        deferred.push(pending);
                    }
                }
            }
            deferred_total += deferred.len();
            buffer.pending = deferred;
            if let Some(blob) = buffer.seal(records, count) {
                batch.edge_count += blob.record_count;
                batch.edge_blobs.push(blob);
            }
        }

        self.flush_due = false;
        tracing::debug!(
            "flush cycle: {} nodes / {} labels, {} edges / {} labels, {} edges deferred, {} bytes",
            batch.node_count,
            batch.node_label_count(),
            batch.edge_count,
            batch.edge_label_count(),
            deferred_total,
            batch.byte_len()
        );
        Ok(batch)
    }

    /// Final forced flush. Edges still pending afterwards can never resolve.
    pub fn finish(&mut self) -> Result<Batch> {
        self.ensure_open()?;
        let batch = self.flush()?;
        self.closed = true;
        for buffer in &mut self.edges.buffers {
            for pending in &mut buffer.pending {
                pending.state = EdgeState::TerminallyUnresolved;
            }
        }
        Ok(batch)
    }

    /// Every endpoint that is still missing, one entry per endpoint.
    pub fn dangling_references(&self) -> Vec<DanglingReference> {
        let mut out = Vec::new();
        for buffer in &self.edges.buffers {
            for pending in &buffer.pending {
                let edge = &pending.edge;
                if !self.ids.contains(&edge.src_label, &edge.src_key) {
                    out.push(DanglingReference {
                        edge_label: edge.label.clone(),
                        endpoint: Endpoint::Source,
                        node_label: edge.src_label.clone(),
                        natural_key: edge.src_key.clone(),
                    });
                }
                if !self.ids.contains(&edge.dst_label, &edge.dst_key) {
                    out.push(DanglingReference {
                        edge_label: edge.label.clone(),
                        endpoint: Endpoint::Destination,
                        node_label: edge.dst_label.clone(),
                        natural_key: edge.dst_key.clone(),
                    });
                }
            }
        }
        out
    }

    /// Terminal check after `finish`: any pending edge is a dangling reference.
    pub fn check_resolved(&self) -> Result<()> {
        let dangling = self.dangling_references();
        if dangling.is_empty() {
            return Ok(());
        }
        for buffer in &self.edges.buffers {
            if buffer.pending.is_empty() {
                continue;
            }
            let missing_labels: Vec<&str> = buffer
                .pending
                .iter()
                .flat_map(|p| [p.edge.src_label.as_str(), p.edge.dst_label.as_str()])
                .filter(|l| !self.nodes.contains(l))
                .collect();
            if !missing_labels.is_empty() {
                tracing::warn!(
                    "edge label {} references node labels with no mapping: {:?}",
                    buffer.label,
                    missing_labels
                );
            }
        }
        Err(ImportError::UnresolvedReferences(dangling))
    }

    pub fn pending_edges(&self) -> impl Iterator<Item = &PendingEdge> {
        self.edges.buffers.iter().flat_map(|b| b.pending.iter())
    }

    pub fn pending_edge_count(&self) -> usize {
        self.edges.buffers.iter().map(|b| b.pending.len()).sum()
    }

    pub fn pending_node_count(&self) -> usize {
        self.nodes.buffers.iter().map(|b| b.pending.len()).sum()
    }

    pub fn duplicate_nodes(&self) -> u64 {
        self.duplicate_nodes
    }

    pub fn label_counts(&self) -> Vec<LabelCount> {
        let nodes = self.nodes.buffers.iter().map(|b| LabelCount {
            label: b.label.clone(),
            is_node: true,
            flushed: b.flushed,
            pending: b.pending.len(),
        });
        let edges = self.edges.buffers.iter().map(|b| LabelCount {
            label: b.label.clone(),
            is_node: false,
            flushed: b.flushed,
            pending: b.pending.len(),
        });
        nodes.chain(edges).collect()
    }
}
