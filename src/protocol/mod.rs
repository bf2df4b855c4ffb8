//! Bulk-load protocol client
//!
//! The store receives batches through one command:
//!
//! ```text
//! GRAPH.BULK <graph> [BEGIN] <node_count> <edge_count> <node_labels> <edge_labels> <node blobs..> <edge blobs..>
//! ```
//!
//! `BEGIN` goes on the first batch of a run only; the store uses it to create
//! the target graph. Any send failure or error reply ends the run.

pub mod dry_run;
pub mod resp;

use crate::error::{ImportError, Result};
use crate::storage::{Batch, LabelBlob};

pub use dry_run::DryRunTransport;
pub use resp::RespTransport;

pub const BULK_COMMAND: &str = "GRAPH.BULK";
pub const BEGIN_MARKER: &str = "BEGIN";

/// Decoded store reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Status(String),
    Error(String),
    Integer(i64),
    Bulk(Option<Vec<u8>>),
    Array(Option<Vec<Reply>>),
}

/// One bulk-load submission, as seen by the transport
#[derive(Debug, Clone, Copy)]
pub struct BulkRequest<'a> {
    pub graph: &'a str,
    pub begin: bool,
    pub node_count: u64,
    pub edge_count: u64,
    pub node_blobs: &'a [LabelBlob],
    pub edge_blobs: &'a [LabelBlob],
}

impl<'a> BulkRequest<'a> {
    pub fn node_label_count(&self) -> usize {
        self.node_blobs.len()
    }

    pub fn edge_label_count(&self) -> usize {
        self.edge_blobs.len()
    }
}

/// Send/receive primitive the client delegates to
pub trait Transport {
    fn submit(&mut self, request: &BulkRequest<'_>) -> Result<Reply>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn submit(&mut self, request: &BulkRequest<'_>) -> Result<Reply> {
        (**self).submit(request)
    }
}

/// Store acknowledgement of one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkAck {
    pub message: String,
    pub nodes_created: Option<u64>,
    pub edges_created: Option<u64>,
}

impl BulkAck {
    /// Parse `"<n> nodes created, <m> edges created"`; unknown text is kept verbatim.
    pub fn parse(message: &str) -> Self {
        let mut nodes_created = None;
        let mut edges_created = None;
        for part in message.split(',') {
            let mut words = part.split_whitespace();
            let (Some(count), Some(kind)) = (words.next(), words.next()) else {
                continue;
            };
            let Ok(count) = count.parse::<u64>() else {
                continue;
            };
            match kind {
                "nodes" | "node" => nodes_created = Some(count),
                "edges" | "edge" | "relationships" => edges_created = Some(count),
                _ => {}
            }
        }
        Self {
            message: message.to_string(),
            nodes_created,
            edges_created,
        }
    }

    fn from_reply(reply: Reply) -> Result<Self> {
        match reply {
            Reply::Error(msg) => Err(ImportError::Rejected(msg)),
            Reply::Status(s) => Ok(Self::parse(&s)),
            Reply::Bulk(Some(bytes)) => Ok(Self::parse(&String::from_utf8_lossy(&bytes))),
            Reply::Integer(n) => Ok(Self::parse(&n.to_string())),
            Reply::Array(Some(items)) => match items.into_iter().next() {
                Some(first) => Self::from_reply(first),
                None => Err(ImportError::Protocol("empty array reply".into())),
            },
            Reply::Bulk(None) | Reply::Array(None) => {
                Err(ImportError::Protocol("null reply to bulk command".into()))
            }
        }
    }
}

/// Protocol client: tracks the begin marker and run totals
pub struct BulkClient<T: Transport> {
    transport: T,
    graph: String,
    begun: bool,
    batches_sent: u64,
    nodes_sent: u64,
    edges_sent: u64,
}

impl<T: Transport> BulkClient<T> {
    pub fn new(transport: T, graph: impl Into<String>) -> Self {
        Self {
            transport,
            graph: graph.into(),
            begun: false,
            batches_sent: 0,
            nodes_sent: 0,
            edges_sent: 0,
        }
    }

    pub fn graph(&self) -> &str {
        &self.graph
    }

    /// True once the first batch has been acknowledged.
    pub fn has_begun(&self) -> bool {
        self.begun
    }

    pub fn batches_sent(&self) -> u64 {
        self.batches_sent
    }

    pub fn nodes_sent(&self) -> u64 {
        self.nodes_sent
    }

    pub fn edges_sent(&self) -> u64 {
        self.edges_sent
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn send(&mut self, batch: &Batch) -> Result<BulkAck> {
        let request = BulkRequest {
            graph: &self.graph,
            begin: !self.begun,
            node_count: batch.node_count,
            edge_count: batch.edge_count,
            node_blobs: &batch.node_blobs,
            edge_blobs: &batch.edge_blobs,
        };

        let reply = self.transport.submit(&request)?;
        let ack = BulkAck::from_reply(reply)?;

        if ack.nodes_created.is_some_and(|n| n != batch.node_count)
            || ack.edges_created.is_some_and(|n| n != batch.edge_count)
        {
            tracing::warn!(
                "store acknowledged '{}' for a batch of {} nodes / {} edges",
                ack.message,
                batch.node_count,
                batch.edge_count
            );
        }

        self.begun = true;
        self.batches_sent += 1;
        self.nodes_sent += batch.node_count;
        self.edges_sent += batch.edge_count;
        tracing::info!(
            "batch {} sent to {}: {} nodes, {} edges ({} bytes) -> {}",
            self.batches_sent,
            self.graph,
            batch.node_count,
            batch.edge_count,
            batch.byte_len(),
            ack.message
        );
        Ok(ack)
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;

    /// Owned copy of one submitted request
    #[derive(Debug, Clone)]
    pub struct Recorded {
        pub graph: String,
        pub begin: bool,
        pub node_count: u64,
        pub edge_count: u64,
        pub node_blobs: Vec<LabelBlob>,
        pub edge_blobs: Vec<LabelBlob>,
    }

    /// Records every request and acks it; optionally rejects batch `fail_at`.
    #[derive(Debug, Default)]
    pub struct RecordingTransport {
        pub requests: Vec<Recorded>,
        pub fail_at: Option<usize>,
    }

    impl Transport for RecordingTransport {
        fn submit(&mut self, request: &BulkRequest<'_>) -> Result<Reply> {
            if self.fail_at == Some(self.requests.len()) {
                return Ok(Reply::Error("ERR out of memory".into()));
            }
            self.requests.push(Recorded {
                graph: request.graph.to_string(),
                begin: request.begin,
                node_count: request.node_count,
                edge_count: request.edge_count,
                node_blobs: request.node_blobs.to_vec(),
                edge_blobs: request.edge_blobs.to_vec(),
            });
            Ok(Reply::Status(format!(
                "{} nodes created, {} edges created",
                request.node_count, request.edge_count
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::RecordingTransport;
    use super::*;

    fn blob(label: &str, n: u64) -> LabelBlob {
        LabelBlob {
            label: label.into(),
            has_header: false,
            record_count: n,
            property_count: 0,
            bytes: vec![0; n as usize],
        }
    }

    fn batch(nodes: u64, edges: u64) -> Batch {
        Batch {
            node_count: nodes,
            edge_count: edges,
            node_blobs: vec![blob("Person", nodes)],
            edge_blobs: if edges > 0 { vec![blob("KNOWS", edges)] } else { vec![] },
        }
    }

    #[test]
    fn test_begin_only_on_first_batch() {
        let mut client = BulkClient::new(RecordingTransport::default(), "social");
        assert!(!client.has_begun());
        client.send(&batch(2, 0)).unwrap();
        client.send(&batch(1, 1)).unwrap();
        client.send(&batch(3, 2)).unwrap();

        let begins: Vec<bool> = client.transport().requests.iter().map(|r| r.begin).collect();
        assert_eq!(begins, vec![true, false, false]);
        assert!(client.has_begun());
        assert_eq!(client.batches_sent(), 3);
        assert_eq!(client.nodes_sent(), 6);
        assert_eq!(client.edges_sent(), 3);
        assert_eq!(client.transport().requests[1].graph, "social");
        assert_eq!(client.transport().requests[2].edge_blobs.len(), 1);
    }

    #[test]
    fn test_error_reply_is_fatal() {
        let transport = RecordingTransport { fail_at: Some(0), ..Default::default() };
        let mut client = BulkClient::new(transport, "g");
        let err = client.send(&batch(1, 0)).unwrap_err();
        assert!(matches!(err, ImportError::Rejected(msg) if msg.contains("out of memory")));
        // a rejected first batch does not count as begun
        assert!(!client.has_begun());
    }

    #[test]
    fn test_ack_parse() {
        let ack = BulkAck::parse("2 nodes created, 1 edges created");
        assert_eq!(ack.nodes_created, Some(2));
        assert_eq!(ack.edges_created, Some(1));

        let ack = BulkAck::parse("OK");
        assert_eq!(ack.nodes_created, None);
        assert_eq!(ack.message, "OK");
    }

    #[test]
    fn test_ack_from_reply_variants() {
        let ack = BulkAck::from_reply(Reply::Array(Some(vec![Reply::Bulk(Some(
            b"5 nodes created, 0 edges created".to_vec(),
        ))])))
        .unwrap();
        assert_eq!(ack.nodes_created, Some(5));
        assert!(matches!(
            BulkAck::from_reply(Reply::Bulk(None)),
            Err(ImportError::Protocol(_))
        ));
    }
}
