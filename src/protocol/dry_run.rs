//! Transport that decodes batches and logs them instead of sending

use super::{BulkRequest, Reply, Transport};
use crate::error::{ImportError, Result};
use crate::storage::codec::Decoder;
use crate::storage::LabelBlob;

/// Summary of one decoded blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobSummary {
    pub label: String,
    pub header: Option<Vec<String>>,
    pub records: u64,
    pub bytes: usize,
}

#[derive(Debug, Default)]
pub struct DryRunTransport {
    submissions: u64,
    history: Vec<BlobSummary>,
}

impl DryRunTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submissions(&self) -> u64 {
        self.submissions
    }

    pub fn history(&self) -> &[BlobSummary] {
        &self.history
    }

    fn inspect(blob: &LabelBlob, is_edge: bool) -> Result<BlobSummary> {
        let mut dec = Decoder::new(&blob.bytes);
        let header = if blob.has_header {
            let h = dec.read_header()?;
            if h.label != blob.label || h.property_names.len() != blob.property_count {
                return Err(ImportError::Protocol(format!(
                    "header for {} does not match its blob ({} / {} properties)",
                    blob.label,
                    h.label,
                    h.property_names.len()
                )));
            }
            Some(h.property_names)
        } else {
            None
        };

        let mut records = 0u64;
        while !dec.is_empty() {
            if is_edge {
                dec.read_edge(blob.property_count)?;
            } else {
                dec.read_node(blob.property_count)?;
            }
            records += 1;
        }
        if records != blob.record_count {
            return Err(ImportError::Protocol(format!(
                "{}: decoded {} records, blob claims {}",
                blob.label, records, blob.record_count
            )));
        }
        Ok(BlobSummary {
            label: blob.label.clone(),
            header,
            records,
            bytes: blob.bytes.len(),
        })
    }
}

impl Transport for DryRunTransport {
    fn submit(&mut self, request: &BulkRequest<'_>) -> Result<Reply> {
        self.submissions += 1;
        tracing::info!(
            "[dry-run] {} batch #{}{}: {} nodes / {} labels, {} edges / {} labels",
            request.graph,
            self.submissions,
            if request.begin { " (BEGIN)" } else { "" },
            request.node_count,
            request.node_label_count(),
            request.edge_count,
            request.edge_label_count()
        );

        let blobs = request
            .node_blobs
            .iter()
            .map(|b| (b, false))
            .chain(request.edge_blobs.iter().map(|b| (b, true)));
        for (blob, is_edge) in blobs {
            let summary = Self::inspect(blob, is_edge)?;
            tracing::info!(
                "[dry-run]   {}{} {} records, {} bytes{}",
                if is_edge { ":" } else { "" },
                summary.label,
                summary.records,
                summary.bytes,
                summary
                    .header
                    .as_ref()
                    .map(|h| format!(", header {:?}", h))
                    .unwrap_or_default()
            );
            self.history.push(summary);
        }

        Ok(Reply::Status(format!(
            "{} nodes created, {} edges created",
            request.node_count, request.edge_count
        )))
    }
}
