//! Entity mapper: one row + file schema -> zero or more nodes and edges
//!
//! Mappings are compiled once per file: column names become indexes, filters
//! are parsed and property types resolved. Within a row every node precedes
//! every edge.

pub mod filter;

use std::borrow::Cow;
use std::collections::HashMap;

use crate::config::{ConversionMode, EntityReference, FileSchema, PropertyMapping, PropertyType};
use crate::error::{ImportError, Result};
use crate::graph::{Edge, Entity, Node, Property, Value};
use crate::reader::Row;

pub use filter::{Filter, FilterOp};

/// Named string transform applied before typing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Converter {
    Trim,
    Lowercase,
    Uppercase,
}

impl Converter {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "trim" => Some(Converter::Trim),
            "lowercase" | "lower" => Some(Converter::Lowercase),
            "uppercase" | "upper" => Some(Converter::Uppercase),
            _ => None,
        }
    }

    pub fn apply<'a>(&self, raw: &'a str) -> Cow<'a, str> {
        match self {
            Converter::Trim => Cow::Borrowed(raw.trim()),
            Converter::Lowercase => Cow::Owned(raw.to_lowercase()),
            Converter::Uppercase => Cow::Owned(raw.to_uppercase()),
        }
    }
}

/// Accepts the same spellings as Go's `strconv.ParseBool`.
pub fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone)]
struct CompiledProperty {
    name: String,
    index: usize,
    ty: PropertyType,
    converter: Option<Converter>,
}

#[derive(Debug, Clone)]
struct CompiledNode {
    label: String,
    filters: Vec<Filter>,
    key_column: String,
    key_index: usize,
    properties: Vec<CompiledProperty>,
}

#[derive(Debug, Clone)]
struct CompiledReference {
    label: String,
    column: String,
    index: usize,
}

#[derive(Debug, Clone)]
struct CompiledEdge {
    label: String,
    filters: Vec<Filter>,
    src: CompiledReference,
    dst: CompiledReference,
    properties: Vec<CompiledProperty>,
}

/// Mapper output for one row
#[derive(Debug, Default, PartialEq)]
pub struct Mapped {
    pub entities: Vec<Entity>,
    /// Records dropped in lenient mode (empty or missing natural key)
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct EntityMapper {
    nodes: Vec<CompiledNode>,
    edges: Vec<CompiledEdge>,
    mode: ConversionMode,
}

fn column_index(columns: &HashMap<String, usize>, label: &str, column: &str) -> Result<usize> {
    columns
        .get(column)
        .copied()
        .ok_or_else(|| ImportError::UnknownColumn {
            label: label.to_string(),
            column: column.to_string(),
        })
}

fn compile_properties(
    label: &str,
    mappings: &[PropertyMapping],
    columns: &HashMap<String, usize>,
) -> Result<Vec<CompiledProperty>> {
    mappings
        .iter()
        .map(|pm| {
            let ty = pm.property_type().ok_or_else(|| ImportError::UnknownPropertyType {
                label: label.to_string(),
                column: pm.column.clone(),
                type_name: pm.type_name.clone(),
            })?;
            let converter = match &pm.converter {
                None => None,
                Some(name) => Some(Converter::parse(name).ok_or_else(|| {
                    ImportError::UnknownConverter {
                        label: label.to_string(),
                        column: pm.column.clone(),
                        converter: name.clone(),
                    }
                })?),
            };
            Ok(CompiledProperty {
                name: pm.column.clone(),
                index: column_index(columns, label, &pm.column)?,
                ty,
                converter,
            })
        })
        .collect()
}

fn compile_filters(
    label: &str,
    exprs: &[String],
    columns: &HashMap<String, usize>,
) -> Result<Vec<Filter>> {
    exprs
        .iter()
        .map(|expr| Filter::compile(label, expr, columns))
        .collect()
}

fn compile_reference(
    edge_label: &str,
    reference: &EntityReference,
    columns: &HashMap<String, usize>,
) -> Result<CompiledReference> {
    if reference.label.is_empty() {
        return Err(ImportError::InvalidConfig(format!(
            "edge {} has an endpoint without a label",
            edge_label
        )));
    }
    Ok(CompiledReference {
        label: reference.label.clone(),
        column: reference.value.clone(),
        index: column_index(columns, edge_label, &reference.value)?,
    })
}

impl EntityMapper {
    pub fn new(schema: &FileSchema, mode: ConversionMode) -> Result<Self> {
        let columns = schema.column_index_map();

        let nodes = schema
            .nodes
            .iter()
            .map(|m| {
                let properties = compile_properties(&m.label, &m.properties, &columns)?;
                let key_column = match (&m.key, properties.first()) {
                    (Some(column), _) => column.clone(),
                    (None, Some(first)) => first.name.clone(),
                    (None, None) => {
                        return Err(ImportError::InvalidConfig(format!(
                            "node {} needs a key column or at least one property",
                            m.label
                        )))
                    }
                };
                let key_index = column_index(&columns, &m.label, &key_column)?;
                Ok(CompiledNode {
                    label: m.label.clone(),
                    filters: compile_filters(&m.label, &m.filters, &columns)?,
                    key_column,
                    key_index,
                    properties,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let edges = schema
            .edges
            .iter()
            .map(|m| {
                Ok(CompiledEdge {
                    label: m.label.clone(),
                    filters: compile_filters(&m.label, &m.filters, &columns)?,
                    src: compile_reference(&m.label, &m.src, &columns)?,
                    dst: compile_reference(&m.label, &m.dst, &columns)?,
                    properties: compile_properties(&m.label, &m.properties, &columns)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { nodes, edges, mode })
    }

    pub fn mode(&self) -> ConversionMode {
        self.mode
    }

    pub fn map_row(&self, row: &Row) -> Result<Mapped> {
        let mut out = Mapped::default();
        let fields = &row.fields;

        for node in &self.nodes {
            if !filter::all_match(&node.filters, fields) {
                continue;
            }
            let Some(key) = self.natural_key(row, &node.label, &node.key_column, node.key_index)? else {
                out.skipped += 1;
                continue;
            };
            let properties = self.convert_all(row, &node.label, &node.properties)?;
            out.entities.push(Entity::Node(Node {
                label: node.label.clone(),
                key,
                properties,
            }));
        }

        for edge in &self.edges {
            if !filter::all_match(&edge.filters, fields) {
                continue;
            }
            let src = self.natural_key(row, &edge.label, &edge.src.column, edge.src.index)?;
            let dst = self.natural_key(row, &edge.label, &edge.dst.column, edge.dst.index)?;
            let (Some(src_key), Some(dst_key)) = (src, dst) else {
                out.skipped += 1;
                continue;
            };
            let properties = self.convert_all(row, &edge.label, &edge.properties)?;
            out.entities.push(Entity::Edge(Edge {
                label: edge.label.clone(),
                properties,
                src_label: edge.src.label.clone(),
                src_key,
                dst_label: edge.dst.label.clone(),
                dst_key,
            }));
        }

        Ok(out)
    }

    /// `Ok(None)` means "drop this record" (lenient mode only).
    fn natural_key(&self, row: &Row, label: &str, column: &str, index: usize) -> Result<Option<String>> {
        let key = match row.fields.get(index) {
            Some(k) => k,
            None => {
                return match self.mode {
                    ConversionMode::Strict => Err(ImportError::MissingField {
                        line: row.line,
                        label: label.to_string(),
                        column: column.to_string(),
                        index,
                    }),
                    ConversionMode::Lenient => {
                        tracing::warn!("line {}: no key column '{}' for {}, record dropped", row.line, column, label);
                        Ok(None)
                    }
                };
            }
        };
        if key.is_empty() {
            return match self.mode {
                ConversionMode::Strict => Err(ImportError::EmptyNaturalKey {
                    line: row.line,
                    label: label.to_string(),
                }),
                ConversionMode::Lenient => {
                    tracing::warn!("line {}: empty key for {}, record dropped", row.line, label);
                    Ok(None)
                }
            };
        }
        Ok(Some(key.clone()))
    }

    fn convert_all(&self, row: &Row, label: &str, props: &[CompiledProperty]) -> Result<Vec<Property>> {
        props
            .iter()
            .map(|p| {
                Ok(Property {
                    name: p.name.clone(),
                    value: self.convert(row, label, p)?,
                })
            })
            .collect()
    }

    fn convert(&self, row: &Row, label: &str, prop: &CompiledProperty) -> Result<Value> {
        let lenient = self.mode == ConversionMode::Lenient;
        let raw = match row.fields.get(prop.index) {
            Some(raw) => raw.as_str(),
            None if lenient => return Ok(Value::Null),
            None => {
                return Err(ImportError::MissingField {
                    line: row.line,
                    label: label.to_string(),
                    column: prop.name.clone(),
                    index: prop.index,
                })
            }
        };
        let text = match prop.converter {
            Some(conv) => conv.apply(raw),
            None => Cow::Borrowed(raw),
        };

        let failed = |expected: &'static str| ImportError::Conversion {
            line: row.line,
            label: label.to_string(),
            column: prop.name.clone(),
            value: text.to_string(),
            expected,
        };

        let fallback = |expected: &'static str, value: Value| -> Result<Value> {
            tracing::warn!(
                "line {}: '{}' is not a valid {} for {}.{}, using {:?}",
                row.line,
                text,
                expected,
                label,
                prop.name,
                value
            );
            Ok(value)
        };

        match prop.ty {
            PropertyType::String => {
                if !text.contains('\0') {
                    Ok(Value::String(text.to_string()))
                } else if lenient {
                    Ok(Value::String(text.replace('\0', "")))
                } else {
                    Err(failed("string without NUL"))
                }
            }
            PropertyType::Number => match text.trim().parse::<f64>() {
                Ok(n) => Ok(Value::Number(n)),
                Err(_) if lenient => fallback("number", Value::Number(0.0)),
                Err(_) => Err(failed("number")),
            },
            PropertyType::Integer => match text.trim().parse::<i64>() {
                Ok(n) => Ok(Value::Integer(n)),
                Err(_) if lenient => fallback("integer", Value::Integer(0)),
                Err(_) => Err(failed("integer")),
            },
            PropertyType::Boolean => match parse_bool(text.trim()) {
                Some(b) => Ok(Value::Bool(b)),
                None if lenient => fallback("boolean", Value::Bool(false)),
                None => Err(failed("boolean")),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EdgeMapping, NodeMapping};

    fn person_schema() -> FileSchema {
        FileSchema {
            filename: "people.csv".into(),
            header: true,
            columns: vec!["id".into(), "name".into(), "age".into(), "friend".into()],
            nodes: vec![NodeMapping {
                label: "Person".into(),
                filters: vec![],
                key: None,
                properties: vec![
                    PropertyMapping::new("id", "string"),
                    PropertyMapping::new("name", "string"),
                    PropertyMapping::new("age", "number"),
                ],
            }],
            edges: vec![EdgeMapping {
                label: "KNOWS".into(),
                filters: vec!["friend != ''".into()],
                src: EntityReference { label: "Person".into(), value: "id".into() },
                dst: EntityReference { label: "Person".into(), value: "friend".into() },
                properties: vec![],
            }],
            ..Default::default()
        }
    }

    fn row(fields: &[&str]) -> Row {
        Row::new(7, fields.iter().map(|s| s.to_string()).collect())
    }

    fn strict(schema: &FileSchema) -> EntityMapper {
        EntityMapper::new(schema, ConversionMode::Strict).unwrap()
    }

    #[test]
    fn test_nodes_before_edges() {
        let mapper = strict(&person_schema());
        let out = mapper.map_row(&row(&["1", "alice", "30", "2"])).unwrap();
        assert_eq!(out.entities.len(), 2);
        match &out.entities[0] {
            Entity::Node(n) => {
                assert_eq!(n.label, "Person");
                assert_eq!(n.key, "1");
                assert_eq!(n.properties[1], Property::new("name", "alice"));
                assert_eq!(n.properties[2], Property::new("age", 30.0));
            }
            other => panic!("expected node, got {:?}", other),
        }
        match &out.entities[1] {
            Entity::Edge(e) => {
                assert_eq!((e.src_key.as_str(), e.dst_key.as_str()), ("1", "2"));
                assert_eq!(e.dst_label, "Person");
            }
            other => panic!("expected edge, got {:?}", other),
        }
    }

    #[test]
    fn test_filter_excludes_only_its_mapping() {
        let mapper = strict(&person_schema());
        let out = mapper.map_row(&row(&["1", "alice", "30", ""])).unwrap();
        assert_eq!(out.entities.len(), 1);
        assert!(out.entities[0].is_node());
    }

    #[test]
    fn test_lexicographic_filter_on_numeric_column() {
        let mut schema = person_schema();
        schema.nodes[0].filters = vec!["age > 9".into()];
        let mapper = strict(&schema);
        // "30" < "9" as strings, so no node
        let out = mapper.map_row(&row(&["1", "alice", "30", ""])).unwrap();
        assert!(out.entities.is_empty());
    }

    #[test]
    fn test_unknown_type_names_label_and_column() {
        let mut schema = person_schema();
        schema.nodes[0].properties[2].type_name = "date".into();
        let err = EntityMapper::new(&schema, ConversionMode::Strict).unwrap_err();
        match err {
            ImportError::UnknownPropertyType { label, column, type_name } => {
                assert_eq!(label, "Person");
                assert_eq!(column, "age");
                assert_eq!(type_name, "date");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_config_errors() {
        let mut schema = person_schema();
        schema.edges[0].dst.value = "nope".into();
        assert!(matches!(
            EntityMapper::new(&schema, ConversionMode::Strict),
            Err(ImportError::UnknownColumn { .. })
        ));

        let mut schema = person_schema();
        schema.nodes[0].properties[1].converter = Some("reverse".into());
        assert!(matches!(
            EntityMapper::new(&schema, ConversionMode::Strict),
            Err(ImportError::UnknownConverter { .. })
        ));

        let mut schema = person_schema();
        schema.nodes[0].properties.clear();
        assert!(matches!(
            EntityMapper::new(&schema, ConversionMode::Strict),
            Err(ImportError::InvalidConfig(_))
        ));

        let mut schema = person_schema();
        schema.nodes[0].filters = vec!["age => 3".into()];
        assert!(matches!(
            EntityMapper::new(&schema, ConversionMode::Strict),
            Err(ImportError::MalformedFilter { .. })
        ));
    }

    #[test]
    fn test_strict_conversion_failure() {
        let mapper = strict(&person_schema());
        let err = mapper.map_row(&row(&["1", "alice", "thirty", ""])).unwrap_err();
        match err {
            ImportError::Conversion { line, column, value, expected, .. } => {
                assert_eq!(line, 7);
                assert_eq!(column, "age");
                assert_eq!(value, "thirty");
                assert_eq!(expected, "number");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_lenient_defaults() {
        let mut schema = person_schema();
        schema.nodes[0].properties.push(PropertyMapping::new("friend", "boolean"));
        let mapper = EntityMapper::new(&schema, ConversionMode::Lenient).unwrap();

        let out = mapper.map_row(&row(&["1", "alice", "thirty", "maybe"])).unwrap();
        let Entity::Node(node) = &out.entities[0] else { panic!("expected node") };
        assert_eq!(node.properties[2].value, Value::Number(0.0));
        assert_eq!(node.properties[3].value, Value::Bool(false));

        // short row: missing property becomes null, edge key missing drops the edge
        let out = mapper.map_row(&row(&["2", "bob"])).unwrap();
        assert_eq!(out.entities.len(), 1);
        let Entity::Node(node) = &out.entities[0] else { panic!("expected node") };
        assert_eq!(node.properties[2].value, Value::Null);
        assert_eq!(out.skipped, 0);
    }

    #[test]
    fn test_empty_key() {
        let strict_mapper = strict(&person_schema());
        assert!(matches!(
            strict_mapper.map_row(&row(&["", "alice", "30", ""])),
            Err(ImportError::EmptyNaturalKey { line: 7, .. })
        ));

        let lenient = EntityMapper::new(&person_schema(), ConversionMode::Lenient).unwrap();
        let out = lenient.map_row(&row(&["", "alice", "30", ""])).unwrap();
        assert!(out.entities.is_empty());
        assert_eq!(out.skipped, 1);
    }

    #[test]
    fn test_short_row_strict() {
        let mapper = strict(&person_schema());
        assert!(matches!(
            mapper.map_row(&row(&["1", "alice"])),
            Err(ImportError::MissingField { index: 2, .. })
        ));
    }

    #[test]
    fn test_types_and_converters() {
        let schema = FileSchema {
            columns: vec!["k".into(), "n".into(), "b".into(), "s".into()],
            nodes: vec![NodeMapping {
                label: "T".into(),
                filters: vec![],
                key: None,
                properties: vec![
                    PropertyMapping::new("k", "string"),
                    PropertyMapping::new("n", "integer"),
                    PropertyMapping::new("b", "bool"),
                    PropertyMapping {
                        column: "s".into(),
                        type_name: "string".into(),
                        converter: Some("uppercase".into()),
                    },
                ],
            }],
            ..Default::default()
        };
        let mapper = strict(&schema);
        let out = mapper.map_row(&row(&["k1", " -42 ", "T", "abc"])).unwrap();
        let Entity::Node(node) = &out.entities[0] else { panic!("expected node") };
        let values: Vec<&Value> = node.properties.iter().map(|p| &p.value).collect();
        assert_eq!(
            values,
            vec![
                &Value::String("k1".into()),
                &Value::Integer(-42),
                &Value::Bool(true),
                &Value::String("ABC".into())
            ]
        );
    }

    #[test]
    fn test_nul_in_string() {
        let mapper = strict(&person_schema());
        assert!(mapper.map_row(&row(&["1", "a\0b", "1", ""])).is_err());

        let lenient = EntityMapper::new(&person_schema(), ConversionMode::Lenient).unwrap();
        let out = lenient.map_row(&row(&["1", "a\0b", "1", ""])).unwrap();
        let Entity::Node(node) = &out.entities[0] else { panic!("expected node") };
        assert_eq!(node.properties[1].value, Value::String("ab".into()));
    }

    #[test]
    fn test_parse_bool_spellings() {
        for s in ["1", "t", "T", "TRUE", "true", "True"] {
            assert_eq!(parse_bool(s), Some(true));
        }
        for s in ["0", "f", "F", "FALSE", "false", "False"] {
            assert_eq!(parse_bool(s), Some(false));
        }
        assert_eq!(parse_bool("yes"), None);
    }

    #[test]
    fn test_explicit_key_column() {
        let mut schema = person_schema();
        schema.nodes[0].key = Some("id".into());
        schema.nodes[0].properties.remove(0);
        let out = strict(&schema).map_row(&row(&["9", "zoe", "41", ""])).unwrap();
        let Entity::Node(node) = &out.entities[0] else { panic!("expected node") };
        assert_eq!(node.key, "9");
        assert_eq!(node.properties.len(), 2);

        schema.nodes[0].key = Some("nope".into());
        assert!(matches!(
            EntityMapper::new(&schema, ConversionMode::Strict),
            Err(ImportError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn test_lenient_short_row_drops_record() {
        let mut schema = person_schema();
        schema.nodes[0].key = Some("name".into());
        schema.nodes[0].properties = vec![PropertyMapping::new("id", "string")];
        schema.edges.clear();

        let lenient = EntityMapper::new(&schema, ConversionMode::Lenient).unwrap();
        let out = lenient.map_row(&row(&["x"])).unwrap();
        assert!(out.entities.is_empty());
        assert_eq!(out.skipped, 1);

        assert!(matches!(
            strict(&schema).map_row(&row(&["x"])),
            Err(ImportError::MissingField { index: 1, .. })
        ));

        // unfiltered edge whose destination column is past the end of the row
        let mut schema = person_schema();
        schema.nodes.clear();
        schema.edges[0].filters.clear();
        let lenient = EntityMapper::new(&schema, ConversionMode::Lenient).unwrap();
        let out = lenient.map_row(&row(&["1", "alice"])).unwrap();
        assert!(out.entities.is_empty());
        assert_eq!(out.skipped, 1);
    }
}
