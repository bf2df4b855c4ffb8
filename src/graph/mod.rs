//! Domain records produced by the mapper and consumed by the import buffer

pub mod id_cache;

pub use id_cache::IdCache;

/// Typed property value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Integer(i64),
    String(String),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Integer(_) => "integer",
            Value::String(_) => "string",
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Named property, kept in mapping order
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub value: Value,
}

impl Property {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One materialized node instance
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub label: String,
    /// Natural key (value of the first mapped property)
    pub key: String,
    pub properties: Vec<Property>,
}

/// One materialized edge instance. Endpoints are natural keys until resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub label: String,
    pub properties: Vec<Property>,
    pub src_label: String,
    pub src_key: String,
    pub dst_label: String,
    pub dst_key: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Node(Node),
    Edge(Edge),
}

impl Entity {
    pub fn label(&self) -> &str {
        match self {
            Entity::Node(n) => &n.label,
            Entity::Edge(e) => &e.label,
        }
    }

    pub fn is_node(&self) -> bool {
        matches!(self, Entity::Node(_))
    }
}
