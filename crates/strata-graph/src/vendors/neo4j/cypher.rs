//! Cypher text helpers: name escaping, read-only checks, limit enforcement.

use regex::Regex;
use std::sync::OnceLock;
use strata_core::{DaoError, ErrorKey, Result};

/// Clauses that alter data, rejected in read-only queries
pub const WRITE_CLAUSES: [&str; 8] = [
    "CREATE", "DELETE", "DROP", "FOREACH", "LOAD", "MERGE", "REMOVE", "SET",
];

/// Cypher syntax generation, picked by the negotiated driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CypherFlavor {
    /// Neo4j 3.x
    V3,
    /// Neo4j 4.x
    V4,
    /// Neo4j 5.x, where pattern expressions in `size()` are gone
    V5,
}

impl CypherFlavor {
    /// Expression counting edges of `var`, `types` being a relationship
    /// filter such as ``:`KNOWS`|`LIKES` `` or empty
    pub fn degree(&self, var: &str, types: &str) -> String {
        match self {
            CypherFlavor::V5 => format!("COUNT {{ ({var})-[{types}]-() }}"),
            CypherFlavor::V3 | CypherFlavor::V4 => format!("size(({var})-[{types}]-())"),
        }
    }

    /// Whether `db.schema.*TypeProperties()` procedures exist
    pub fn has_schema_procedures(&self) -> bool {
        !matches!(self, CypherFlavor::V3)
    }
}

/// Wrap a label, type or property name in back-ticks
pub fn encode_name(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// `:`A`:`B`` label suffix
pub fn encode_labels(labels: &[String]) -> String {
    labels.iter().map(|l| format!(":{}", encode_name(l))).collect()
}

/// `:`A`|`B`` relationship-type filter, empty when unrestricted
pub fn encode_types(types: Option<&[String]>) -> String {
    match types {
        Some(types) if !types.is_empty() => {
            let joined: Vec<String> = types.iter().map(|t| encode_name(t)).collect();
            format!(":{}", joined.join("|"))
        }
        _ => String::new(),
    }
}

/// Blank out string literals, keeping byte offsets intact
pub fn strip_literals(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in query.chars() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                    out.push(c);
                    continue;
                }
                out.extend(std::iter::repeat(' ').take(c.len_utf8()));
            }
            None => {
                if c == '\'' || c == '"' {
                    quote = Some(c);
                }
                out.push(c);
            }
        }
    }
    out
}

fn write_clause_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"(?i)(?:^|[\s|])({})[\s(|]", WRITE_CLAUSES.join("|"))).ok()
    })
    .as_ref()
}

fn read_start_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(START|MATCH)\b").ok())
        .as_ref()
}

fn return_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bRETURN\b").ok()).as_ref()
}

fn limit_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\sLIMIT\s+(\d+)").ok())
        .as_ref()
}

fn compiled(re: Option<&'static Regex>) -> Result<&'static Regex> {
    re.ok_or_else(|| DaoError::bug("Invalid Cypher pattern"))
}

/// Reject queries without `RETURN`, and write queries unless `can_write`
pub fn check_query(query: &str, can_write: bool) -> Result<()> {
    let statements = strip_literals(query.trim().trim_end_matches(';'));

    if !compiled(return_re())?.is_match(&statements) {
        return Err(DaoError::invalid_parameter(
            "The Cypher query is missing a \"RETURN\" statement.",
        ));
    }
    if can_write {
        return Ok(());
    }

    if !compiled(read_start_re())?.is_match(&statements) {
        return Err(DaoError::business(
            ErrorKey::WriteForbidden,
            "The query must start with \"MATCH\" or \"START\"",
        ));
    }
    if let Some(clause) = compiled(write_clause_re())?
        .captures(&statements)
        .and_then(|c| c.get(1))
    {
        return Err(DaoError::business(
            ErrorKey::WriteForbidden,
            format!(
                "The query cannot use statement \"{}\", or any of {}",
                clause.as_str().to_uppercase(),
                WRITE_CLAUSES.join(", ")
            ),
        ));
    }
    Ok(())
}

/// Cap every `LIMIT` of the query to `limit`, adding one when absent
pub fn enforce_limit(query: &str, limit: u64) -> Result<String> {
    let query = query.trim().trim_end_matches(';').trim_end();
    // literals are blanked in place, so offsets match `query`
    let statements = strip_literals(query);

    let mut rewritten = String::with_capacity(query.len());
    let mut cursor = 0;
    for captures in compiled(limit_re())?.captures_iter(&statements) {
        let Some(value) = captures.get(1) else {
            continue;
        };
        let original: u64 = value.as_str().parse().map_err(|_| {
            DaoError::business(
                ErrorKey::GraphRequestError,
                format!("The Cypher query LIMIT value \"{}\" is invalid.", value.as_str()),
            )
        })?;
        rewritten.push_str(&query[cursor..value.start()]);
        rewritten.push_str(&original.min(limit).to_string());
        cursor = value.end();
    }

    if cursor == 0 {
        return Ok(format!("{query} LIMIT {limit}"));
    }
    rewritten.push_str(&query[cursor..]);
    Ok(rewritten)
}
