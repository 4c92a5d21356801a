// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Doc comment types: `@var`, `@param` and `@return` tags, including shapes
//! written as array literals (`@return array = ['id' => 1]`,
//! `@param $opts like ['verbose' => true]`) and `array{k: type}` forms.

use crate::ast::{ClassRef, Expr, Ref};
use crate::lexer::Source;
use crate::parser::Parser;
use crate::value::Value;

use super::model::{KeyName, KeyValue, MultiType, Type, TypeKind};

/// Type declared by one doc tag.
#[derive(Debug, Default)]
pub struct DocType {
    /// The `Type|Other[]` part, split on `|`.
    pub alternatives: Vec<String>,
    /// Literal written after `=` or `like`.
    pub shape: Option<String>,
}

/// Strips comment delimiters and leading `*` from every line.
pub fn clean(doc: &str) -> String {
    let doc = doc.trim();
    let doc = doc.strip_prefix("/**").unwrap_or(doc);
    let doc = doc.strip_suffix("*/").unwrap_or(doc);
    doc.lines()
        .map(|l| {
            let l = l.trim_start();
            l.strip_prefix('*').unwrap_or(l).trim()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Text of every `@tag` in a doc comment, continuation lines included.
fn tags<'d>(doc: &'d str, tag: &'d str) -> impl Iterator<Item = String> + 'd {
    let cleaned = clean(doc);
    let mut out = vec![];
    let mut current: Option<String> = None;
    for line in cleaned.lines() {
        if line.starts_with('@') {
            if let Some(done) = current.take() {
                out.push(done);
            }
            if let Some(rest) = line.strip_prefix(tag) {
                if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                    current = Some(rest.trim().to_string());
                }
            }
        } else if let Some(text) = current.as_mut() {
            text.push('\n');
            text.push_str(line);
        }
    }
    out.extend(current);
    out.into_iter()
}

fn split_type_and_rest(text: &str) -> (&str, &str) {
    // Brackets inside `array{...}` and `array<...>` may contain spaces.
    let mut nesting = 0i32;
    for (idx, ch) in text.char_indices() {
        match ch {
            '{' | '<' | '(' => nesting += 1,
            '}' | '>' | ')' => nesting -= 1,
            c if c.is_whitespace() && nesting <= 0 => return (&text[..idx], text[idx..].trim()),
            '=' if nesting <= 0 => return (&text[..idx], text[idx..].trim()),
            _ => (),
        }
    }
    (text, "")
}

fn parse_tag(text: &str, expect_var: Option<&str>) -> Option<DocType> {
    let mut rest = text.trim();
    let mut doc = DocType::default();

    if !rest.starts_with('$') && !rest.starts_with('=') && !rest.starts_with("like ") {
        let (ty, tail) = split_type_and_rest(rest);
        doc.alternatives = split_top_level(ty, '|')
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        rest = tail;
    }

    if rest.starts_with('$') {
        let end = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '$'))
            .unwrap_or(rest.len());
        let name = &rest[1..end];
        if let Some(expected) = expect_var {
            if name != expected {
                return None;
            }
        }
        rest = rest[end..].trim();
    } else if let Some(expected) = expect_var {
        // `@var Type` without a name applies to the documented statement.
        if !expected.is_empty() && doc.alternatives.is_empty() {
            return None;
        }
    }

    let shape = rest
        .strip_prefix('=')
        .or_else(|| rest.strip_prefix("like "))
        .map(str::trim)
        .filter(|s| s.starts_with('[') || s.starts_with("array("));
    doc.shape = shape.map(|s| s.to_string());

    if doc.alternatives.is_empty() && doc.shape.is_none() {
        return None;
    }
    Some(doc)
}

pub fn return_doc(doc: &str) -> Option<DocType> {
    tags(doc, "@return").find_map(|t| parse_tag(&t, None))
}

pub fn param_doc(doc: &str, name: &str) -> Option<DocType> {
    tags(doc, "@param").find_map(|t| parse_tag(&t, Some(name)))
}

/// `@var` tag naming `name`, or an unnamed `@var` when `name` is empty or
/// no tag names a variable.
pub fn var_doc(doc: &str, name: &str) -> Option<DocType> {
    let all: Vec<String> = tags(doc, "@var").collect();
    all.iter()
        .find_map(|t| parse_tag(t, Some(name)))
        .or_else(|| {
            all.iter()
                .filter(|t| !t.contains('$'))
                .find_map(|t| parse_tag(t, None))
        })
}

/// Types of a doc tag. Class names are returned as written; the caller
/// resolves them against declared classes.
pub fn doc_types(doc: &DocType) -> MultiType {
    let mut result = MultiType::empty();
    if let Some(shape) = &doc.shape {
        match parse_snippet(shape) {
            Some(expr) => result.push(type_of_literal_expr(&expr)),
            None => log::debug!("unparsable doc shape {shape:?}"),
        }
    }
    for alt in &doc.alternatives {
        if !result.is_empty() && alt.eq_ignore_ascii_case("array") {
            continue;
        }
        if let Some(ty) = type_of_doc_name(alt) {
            result.push(ty);
        }
    }
    result
}

fn type_of_doc_name(name: &str) -> Option<Type> {
    let name = name.trim();
    if let Some(element) = name.strip_suffix("[]") {
        let mut list = Type::array();
        if let Some(element) = type_of_doc_name(element) {
            list.element_types.push(element);
        }
        return Some(list);
    }
    let lower = name.to_ascii_lowercase();
    if lower.starts_with("array{") && name.ends_with('}') {
        return Some(array_shape(&name["array{".len()..name.len() - 1]));
    }
    if let Some(open) = name.find('<').filter(|_| name.ends_with('>')) {
        // array<K, V>, list<V>, iterable<V>
        let mut list = Type::array();
        let params = split_top_level(&name[open + 1..name.len() - 1], ',');
        if let Some(value) = params.last().and_then(|v| type_of_doc_name(v)) {
            list.element_types.push(value);
        }
        return Some(list);
    }
    TypeKind::from_hint(name).map(Type::new)
}

fn array_shape(body: &str) -> Type {
    let mut ty = Type::array();
    for (position, field) in split_top_level(body, ',').into_iter().enumerate() {
        let field = field.trim();
        if field.is_empty() {
            continue;
        }
        let (key, value) = match split_top_level(field, ':').as_slice() {
            [key, value, ..] => (
                key.trim().trim_end_matches('?').trim_matches(['\'', '"']).to_string(),
                *value,
            ),
            _ => (position.to_string(), field),
        };
        let mut values = MultiType::empty();
        for alt in split_top_level(value, '|') {
            if let Some(t) = type_of_doc_name(alt) {
                values.push(t);
            }
        }
        ty.add_key(KeyName::Named(key), KeyValue::Ready(values), None);
    }
    ty
}

fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut parts = vec![];
    let mut nesting = 0i32;
    let mut start = 0;
    for (idx, ch) in text.char_indices() {
        match ch {
            '{' | '<' | '(' | '[' => nesting += 1,
            '}' | '>' | ')' | ']' => nesting -= 1,
            c if c == sep && nesting == 0 => {
                parts.push(&text[start..idx]);
                start = idx + c.len_utf8();
            }
            _ => (),
        }
    }
    parts.push(&text[start..]);
    parts
}

fn parse_snippet(text: &str) -> Option<Ref<Expr>> {
    let source = Source::from_contents("<doc>".to_string(), text.to_string()).ok()?;
    let mut parser = Parser::new(&source).ok()?;
    parser.parse_expr().ok()
}

/// Type of a literal written in a doc comment. Bare names in value position
/// (`['id' => int]`) are read as type names.
pub fn type_of_literal_expr(expr: &Expr) -> Type {
    match expr {
        Expr::String { value, .. } | Expr::Number { value, .. } | Expr::Bool { value, .. } => {
            Type::literal(value.clone())
        }
        Expr::Null { .. } => Type::literal(Value::Null),
        Expr::Name { span, .. } => {
            type_of_doc_name(span.text()).unwrap_or_else(|| Type::new(TypeKind::Mixed))
        }
        Expr::Array { items, .. } => {
            let mut ty = Type::array();
            let mut position = 0usize;
            for item in items {
                let name = match &item.key {
                    Some(key) => match key.literal().and_then(|l| l.as_key()) {
                        Some(name) => KeyName::Named(name),
                        None => KeyName::Unknown,
                    },
                    None => {
                        position += 1;
                        KeyName::Named((position - 1).to_string())
                    }
                };
                let value = MultiType::of(type_of_literal_expr(&item.value));
                ty.add_key(name, KeyValue::Ready(value), None);
            }
            ty
        }
        Expr::New {
            class: ClassRef::Name(name),
            ..
        } => Type::object(name.text()),
        Expr::ClassConst {
            class: ClassRef::Name(class),
            name,
            ..
        } if name.text().eq_ignore_ascii_case("class") => Type::string(class.text()),
        Expr::Closure { .. } => Type::new(TypeKind::Closure),
        _ => Type::new(TypeKind::Mixed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::type_analysis::model::{Deferred, ForceDeferred};

    struct NoForce;

    impl ForceDeferred for NoForce {
        fn force(&mut self, _: &Deferred) -> MultiType {
            MultiType::empty()
        }
    }

    #[test]
    fn return_shape_after_equals() {
        let doc = "/**\n * Load a user.\n * @return array = [\n *   'id' => 1,\n *   'tags' => [string],\n * ]\n */";
        let tag = return_doc(doc);
        assert!(tag.as_ref().is_some_and(|t| t.shape.is_some()));
        let types = tag.map(|t| doc_types(&t)).unwrap_or_default();
        assert_eq!(types.key_names(), vec!["id", "tags"]);
        let tags = types.get_key("tags", &mut NoForce);
        assert_eq!(tags.key_names(), vec!["0"]);
    }

    #[test]
    fn param_like_shape_and_names() {
        let doc = "/** @param string $name\n * @param $opts like ['verbose' => true] */";
        let opts = param_doc(doc, "opts").map(|t| doc_types(&t)).unwrap_or_default();
        assert_eq!(opts.key_names(), vec!["verbose"]);
        let name = param_doc(doc, "name").map(|t| doc_types(&t)).unwrap_or_default();
        assert_eq!(name.brief_description(50), "string");
        assert!(param_doc(doc, "missing").is_none());
    }

    #[test]
    fn var_doc_forms() {
        let typed = var_doc("/** @var User[] $users */", "users")
            .map(|t| doc_types(&t))
            .unwrap_or_default();
        assert_eq!(typed.element_types().classes(), vec!["User"]);

        let unnamed = var_doc("/** @var array{id: int, name?: string} */", "row")
            .map(|t| doc_types(&t))
            .unwrap_or_default();
        assert_eq!(unnamed.key_names(), vec!["id", "name"]);
    }

    #[test]
    fn generics_give_element_types() {
        let list = var_doc("/** @var array<int, Post> */", "x")
            .map(|t| doc_types(&t))
            .unwrap_or_default();
        assert_eq!(list.element_types().classes(), vec!["Post"]);
    }
}
