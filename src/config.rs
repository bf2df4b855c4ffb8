//! Import configuration: store connection, run options and per-file schemas
//!
//! Loaded once from YAML (or JSON when the file ends in `.json`) and read-only
//! afterwards. Property type names stay strings here; the mapper resolves them.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ImportError, Result};

pub const DEFAULT_NODE_BATCH_SIZE: usize = 10_000;
pub const DEFAULT_EDGE_BATCH_SIZE: usize = 10_000;
pub const DEFAULT_PROGRESS_INTERVAL: usize = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub import: ImportOptions,
    #[serde(default)]
    pub files: Vec<FileSchema>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// host:port of the store
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Target graph name
    #[serde(default = "default_graph", alias = "graphname")]
    pub graph: String,
}

fn default_url() -> String {
    "127.0.0.1:6379".to_string()
}

fn default_graph() -> String {
    "graph".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            username: None,
            password: None,
            graph: default_graph(),
        }
    }
}

/// How data errors are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionMode {
    /// Short rows, unparsable values and empty keys abort the run.
    #[default]
    Strict,
    /// Defaults are substituted (0, 0.0, false, null) and keyless records dropped.
    Lenient,
}

impl std::str::FromStr for ConversionMode {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(ConversionMode::Strict),
            "lenient" => Ok(ConversionMode::Lenient),
            other => Err(ImportError::InvalidConfig(format!(
                "unknown conversion mode '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportOptions {
    #[serde(default)]
    pub mode: ConversionMode,
    /// Pending nodes of one label that trigger a flush cycle
    #[serde(default = "default_node_batch")]
    pub node_batch_size: usize,
    /// Pending edges of one label that trigger a flush cycle
    #[serde(default = "default_edge_batch")]
    pub edge_batch_size: usize,
    /// Log progress every N entities (0 disables)
    #[serde(default = "default_progress")]
    pub progress_interval: usize,
}

fn default_node_batch() -> usize {
    DEFAULT_NODE_BATCH_SIZE
}

fn default_edge_batch() -> usize {
    DEFAULT_EDGE_BATCH_SIZE
}

fn default_progress() -> usize {
    DEFAULT_PROGRESS_INTERVAL
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            mode: ConversionMode::Strict,
            node_batch_size: DEFAULT_NODE_BATCH_SIZE,
            edge_batch_size: DEFAULT_EDGE_BATCH_SIZE,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

/// One input file's import configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSchema {
    pub filename: String,
    #[serde(default = "default_separator")]
    pub separator: String,
    #[serde(default)]
    pub header: bool,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub nodes: Vec<NodeMapping>,
    #[serde(default)]
    pub edges: Vec<EdgeMapping>,
}

fn default_separator() -> String {
    ",".to_string()
}

impl Default for FileSchema {
    fn default() -> Self {
        Self {
            filename: String::new(),
            separator: default_separator(),
            header: false,
            columns: Vec::new(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }
}

impl FileSchema {
    pub fn column_index_map(&self) -> HashMap<String, usize> {
        self.columns
            .iter()
            .enumerate()
            .map(|(idx, col)| (col.clone(), idx))
            .collect()
    }

    /// Single delimiter byte; `\t` may be written as the two-character escape.
    pub fn delimiter(&self) -> Result<u8> {
        match self.separator.as_str() {
            "\\t" | "tab" => Ok(b'\t'),
            s if s.len() == 1 => Ok(s.as_bytes()[0]),
            s => Err(ImportError::InvalidConfig(format!(
                "{}: separator must be a single byte, got '{}'",
                self.filename, s
            ))),
        }
    }
}

/// Rule producing one node label from a row
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeMapping {
    pub label: String,
    #[serde(default)]
    pub filters: Vec<String>,
    /// Natural-key column; defaults to the first property's column
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub properties: Vec<PropertyMapping>,
}

impl NodeMapping {
    pub fn property_names(&self) -> Vec<String> {
        self.properties.iter().map(|p| p.column.clone()).collect()
    }
}

/// Rule producing one edge label from a row
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EdgeMapping {
    pub label: String,
    #[serde(default)]
    pub filters: Vec<String>,
    pub src: EntityReference,
    pub dst: EntityReference,
    #[serde(default)]
    pub properties: Vec<PropertyMapping>,
}

impl EdgeMapping {
    pub fn property_names(&self) -> Vec<String> {
        self.properties.iter().map(|p| p.column.clone()).collect()
    }
}

/// Node label plus the column holding that node's natural key
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityReference {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropertyMapping {
    #[serde(alias = "colname")]
    pub column: String,
    #[serde(rename = "type", default = "default_type")]
    pub type_name: String,
    #[serde(default)]
    pub converter: Option<String>,
}

fn default_type() -> String {
    "string".to_string()
}

impl PropertyMapping {
    pub fn new(column: &str, type_name: &str) -> Self {
        Self {
            column: column.to_string(),
            type_name: type_name.to_string(),
            converter: None,
        }
    }

    pub fn property_type(&self) -> Option<PropertyType> {
        PropertyType::parse(&self.type_name)
    }
}

/// Declared property type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    String,
    Number,
    Integer,
    Boolean,
}

impl PropertyType {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "string" | "str" => Some(PropertyType::String),
            "number" | "numeric" | "float" | "double" => Some(PropertyType::Number),
            "integer" | "int" => Some(PropertyType::Integer),
            "boolean" | "bool" => Some(PropertyType::Boolean),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PropertyType::String => "string",
            PropertyType::Number => "number",
            PropertyType::Integer => "integer",
            PropertyType::Boolean => "boolean",
        }
    }
}

impl ImportConfig {
    /// Load and validate a config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let config = if path.extension().and_then(|s| s.to_str()) == Some("json") {
            Self::from_json_str(&contents)?
        } else {
            Self::from_yaml_str(&contents)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.files.is_empty() {
            return Err(ImportError::InvalidConfig("no files specified".into()));
        }
        if self.import.node_batch_size == 0 || self.import.edge_batch_size == 0 {
            return Err(ImportError::InvalidConfig(
                "batch sizes must be positive".into(),
            ));
        }
        for file in &self.files {
            validate_file(file)?;
        }
        Ok(())
    }
}

fn validate_file(file: &FileSchema) -> Result<()> {
    if file.filename.is_empty() {
        return Err(ImportError::InvalidConfig("filename not specified".into()));
    }
    if file.separator.is_empty() {
        return Err(ImportError::InvalidConfig(format!(
            "{}: separator not specified",
            file.filename
        )));
    }
    file.delimiter()?;

    if !Path::new(&file.filename).exists() {
        return Err(ImportError::InvalidConfig(format!(
            "file does not exist: {}",
            file.filename
        )));
    }

    let mut seen = HashSet::new();
    for col in &file.columns {
        if !seen.insert(col.as_str()) {
            return Err(ImportError::InvalidConfig(format!(
                "{}: duplicate column '{}'",
                file.filename, col
            )));
        }
    }
    Ok(())
}
