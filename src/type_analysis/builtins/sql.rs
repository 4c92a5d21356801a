// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Column names selected by SQL text and its named placeholders.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref SELECT_FROM: Option<Regex> =
        Regex::new(r"(?is)^\s*SELECT\s+(\S.*?)\s+FROM\s+([A-Za-z_][A-Za-z0-9_]*)?.*$").ok();
    // Partial statement still being typed.
    static ref SELECT_ONLY: Option<Regex> = Regex::new(r"(?is)^\s*SELECT\s+(\S.*)$").ok();
    static ref ALIASED: Option<Regex> = Regex::new(r"(?is)\s+AS\s+([^\s,()]+)$").ok();
    // Optionally table qualified column.
    static ref COLUMN: Option<Regex> = Regex::new(r"^(?:[^\s()]*\.)?([^\s.()]+)$").ok();
    // A `::` cast is not a placeholder.
    static ref BIND_VAR: Option<Regex> = Regex::new(r"(?:^|[^:]):([A-Za-z_][A-Za-z0-9_]*)").ok();
}

/// Parsed `SELECT` statement.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Selection {
    pub columns: Vec<String>,
    pub table: Option<String>,
    /// Whether `*` was selected.
    pub star: bool,
}

pub fn parse_select(sql: &str) -> Option<Selection> {
    let (fields, table) = match SELECT_FROM.as_ref()?.captures(sql) {
        Some(caps) => (
            caps.get(1).map(|m| m.as_str()).unwrap_or(""),
            caps.get(2).map(|m| m.as_str().to_string()),
        ),
        None => (
            SELECT_ONLY.as_ref()?.captures(sql)?.get(1).map(|m| m.as_str()).unwrap_or(""),
            None,
        ),
    };

    let (aliased, column) = (ALIASED.as_ref()?, COLUMN.as_ref()?);
    let mut selection = Selection {
        table,
        ..Selection::default()
    };
    for field in split_fields(fields) {
        if field == "*" {
            selection.star = true;
            continue;
        }
        let name = aliased
            .captures(field)
            .or_else(|| column.captures(field))
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim_matches(['`', '"']));
        if let Some(name) = name {
            if !name.is_empty() && !selection.columns.iter().any(|c| c == name) {
                selection.columns.push(name.to_string());
            }
        }
    }
    Some(selection)
}

/// Select list items, split on commas outside parentheses.
fn split_fields(fields: &str) -> Vec<&str> {
    let mut items = vec![];
    let (mut depth, mut start) = (0usize, 0);
    for (i, c) in fields.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                items.push(fields[start..i].trim());
                start = i + 1;
            }
            _ => (),
        }
    }
    items.push(fields[start..].trim());
    items
}

pub fn bind_vars(sql: &str) -> Vec<String> {
    let mut vars: Vec<String> = vec![];
    let Some(pattern) = BIND_VAR.as_ref() else {
        return vars;
    };
    for caps in pattern.captures_iter(sql) {
        if let Some(name) = caps.get(1) {
            if !vars.iter().any(|v| v == name.as_str()) {
                vars.push(name.as_str().to_string());
            }
        }
    }
    vars
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_columns_with_aliases_and_prefixes() {
        let sel = parse_select("SELECT u.id, u.name AS full_name, COUNT(*) as cnt\n FROM users u WHERE id = :id");
        assert_eq!(
            sel,
            Some(Selection {
                columns: vec!["id".into(), "full_name".into(), "cnt".into()],
                table: Some("users".into()),
                star: false,
            })
        );
    }

    #[test]
    fn function_calls_in_the_select_list() {
        let sel = parse_select("SELECT CONCAT(first, ' ', last) AS full, id, ROUND(price, 2) FROM t");
        assert_eq!(
            sel.map(|s| s.columns),
            Some(vec!["full".to_string(), "id".to_string()])
        );
    }

    #[test]
    fn partial_statement_without_from() {
        let sel = parse_select("select id, login");
        assert_eq!(sel.map(|s| s.columns), Some(vec!["id".to_string(), "login".to_string()]));
        assert_eq!(parse_select("UPDATE t SET a = 1"), None);
    }

    #[test]
    fn star_is_flagged() {
        let sel = parse_select("SELECT * FROM orders");
        assert!(sel.as_ref().is_some_and(|s| s.star && s.columns.is_empty()));
        assert_eq!(sel.and_then(|s| s.table), Some("orders".to_string()));
    }

    #[test]
    fn extracts_bind_vars_once() {
        assert_eq!(
            bind_vars("SELECT * FROM t WHERE a = :a AND b = :b_2 OR a > :a"),
            vec!["a", "b_2"]
        );
    }

    #[test]
    fn casts_are_not_placeholders() {
        assert_eq!(
            bind_vars("SELECT id::text FROM t WHERE name = :name AND x = CAST(:x AS int)"),
            vec!["name", "x"]
        );
    }
}
