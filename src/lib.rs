//! graphbulk - streaming bulk loader for property-graph stores
//!
//! # Architecture
//!
//! - **Row source**: CSV/TSV (optionally gzip) read on its own thread
//! - **Entity mapper**: rows become typed nodes and edges on a second thread,
//!   handed over through rendezvous channels
//! - **Import buffer**: per-label accumulation, dense id assignment and
//!   deferred edge resolution
//! - **Binary codec**: label headers plus tagged values, little-endian
//! - **Protocol client**: `GRAPH.BULK` over RESP, `BEGIN` on the first batch
//!
//! # Usage example
//!
//! ```no_run
//! use graphbulk::{ImportConfig, Importer};
//! use graphbulk::pipeline::CancelFlag;
//! use graphbulk::protocol::RespTransport;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ImportConfig::load("import.yaml")?;
//! let transport = RespTransport::connect(&config.store.url, None, None)?;
//!
//! let mut importer = Importer::from_config(transport, &config, CancelFlag::new());
//! let stats = importer.run(&config.files)?;
//! println!("{} nodes, {} edges", stats.nodes, stats.edges);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod import;
pub mod mapping;
pub mod pipeline;
pub mod protocol;
pub mod reader;
pub mod storage;

pub use config::{ConversionMode, FileSchema, ImportConfig, ImportOptions};
pub use error::{ImportError, Result};
pub use graph::{Edge, Entity, IdCache, Node, Property, Value};
pub use import::{ImportStats, Importer};
