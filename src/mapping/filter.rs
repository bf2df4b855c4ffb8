//! Row filter predicates: `<column> <op> <value>`
//!
//! Comparison is plain string comparison on the raw field, so `"30" > "25"`
//! holds while `"30" > "9"` does not. Numeric columns are not special-cased.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::OnceLock;

use regex_lite::Regex;

use crate::error::{ImportError, Result};

const FILTER_PATTERN: &str = r"^\s*([^\s=!<>]+)\s*(==|!=|>|<)\s*([^\s=!<>].*?)?\s*$";

static FILTER_RE: OnceLock<Regex> = OnceLock::new();

fn filter_regex() -> &'static Regex {
    FILTER_RE.get_or_init(|| {
        Regex::new(FILTER_PATTERN).unwrap_or_else(|e| unreachable!("filter pattern: {}", e))
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Lt,
}

impl FilterOp {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "==" => Some(FilterOp::Eq),
            "!=" => Some(FilterOp::Ne),
            ">" => Some(FilterOp::Gt),
            "<" => Some(FilterOp::Lt),
            _ => None,
        }
    }

    fn accepts(&self, ord: Ordering) -> bool {
        match self {
            FilterOp::Eq => ord == Ordering::Equal,
            FilterOp::Ne => ord != Ordering::Equal,
            FilterOp::Gt => ord == Ordering::Greater,
            FilterOp::Lt => ord == Ordering::Less,
        }
    }
}

/// Strip one pair of matching quotes: `'x'` or `"x"`
fn unquote(s: &str) -> &str {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'\'' || first == b'"') {
            return &s[1..s.len() - 1];
        }
    }
    s
}

/// Compiled filter bound to a column index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub index: usize,
    pub op: FilterOp,
    pub value: String,
}

impl Filter {
    pub fn compile(label: &str, expr: &str, columns: &HashMap<String, usize>) -> Result<Self> {
        let malformed = || ImportError::MalformedFilter {
            label: label.to_string(),
            filter: expr.to_string(),
        };

        let caps = filter_regex().captures(expr).ok_or_else(malformed)?;
        let column = caps.get(1).map(|m| m.as_str()).ok_or_else(malformed)?;
        let op = caps
            .get(2)
            .and_then(|m| FilterOp::parse(m.as_str()))
            .ok_or_else(malformed)?;
        let value = caps.get(3).map(|m| unquote(m.as_str())).unwrap_or("");

        let index = *columns.get(column).ok_or_else(|| ImportError::UnknownColumn {
            label: label.to_string(),
            column: column.to_string(),
        })?;

        Ok(Filter {
            column: column.to_string(),
            index,
            op,
            value: value.to_string(),
        })
    }

    /// A field missing from a short row compares as the empty string.
    pub fn matches(&self, fields: &[String]) -> bool {
        let field = fields.get(self.index).map(|s| s.as_str()).unwrap_or("");
        self.op.accepts(field.cmp(self.value.as_str()))
    }
}

pub fn all_match(filters: &[Filter], fields: &[String]) -> bool {
    filters.iter().all(|f| f.matches(fields))
}
