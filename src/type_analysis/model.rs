// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use alloc::collections::BTreeSet;

use indexmap::IndexMap;

use crate::program::ExprId;
use crate::value::Value;

use super::context::CallCtxId;

/// Kind of one concrete possibility for a value.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TypeKind {
    Array,
    String,
    Int,
    Float,
    Bool,
    Null,
    /// Instance of the named class.
    Object(String),
    Closure,
    Mixed,
    Unknown,
}

impl TypeKind {
    pub fn brief_name(&self) -> &str {
        match self {
            TypeKind::Array => "array",
            TypeKind::String => "string",
            TypeKind::Int => "int",
            TypeKind::Float => "float",
            TypeKind::Bool => "bool",
            TypeKind::Null => "null",
            TypeKind::Object(class) => class.rsplit('\\').next().unwrap_or(class),
            TypeKind::Closure => "Closure",
            TypeKind::Mixed => "mixed",
            TypeKind::Unknown => "unknown",
        }
    }

    /// Kind named by a type hint or doc type (`int`, `?array`, `User`).
    pub fn from_hint(hint: &str) -> Option<TypeKind> {
        let hint = hint.trim().trim_start_matches('?');
        if hint.is_empty() {
            return None;
        }
        Some(match hint.to_ascii_lowercase().as_str() {
            "array" | "iterable" | "list" => TypeKind::Array,
            "string" | "class-string" | "callable-string" => TypeKind::String,
            "int" | "integer" => TypeKind::Int,
            "float" | "double" => TypeKind::Float,
            "bool" | "boolean" | "true" | "false" => TypeKind::Bool,
            "null" | "void" => TypeKind::Null,
            "callable" | "closure" | "\\closure" => TypeKind::Closure,
            "mixed" | "object" | "resource" => TypeKind::Mixed,
            "self" | "static" | "$this" | "never" => return None,
            _ if hint
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '\\') =>
            {
                TypeKind::Object(hint.trim_start_matches('\\').to_string())
            }
            _ => return None,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyName {
    Named(String),
    /// A key that could not be named statically.
    Unknown,
}

impl KeyName {
    pub fn as_named(&self) -> Option<&str> {
        match self {
            KeyName::Named(name) => Some(name),
            KeyName::Unknown => None,
        }
    }
}

/// A value computation postponed until the key is actually inspected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Deferred {
    /// Resolve `expr` under `call_ctx`.
    Expr { expr: ExprId, call_ctx: CallCtxId },
    /// Shape expected of `expr` by the code consuming it.
    Usage { expr: ExprId, depth_left: u32 },
}

/// Resolves deferred key values. Implemented by the search session, whose
/// cache memoizes repeated forcing.
pub trait ForceDeferred {
    fn force(&mut self, deferred: &Deferred) -> MultiType;
}

#[derive(Clone, Debug)]
pub enum KeyValue {
    Ready(MultiType),
    Deferred(Deferred),
}

/// One key of an array type.
#[derive(Clone, Debug)]
pub struct KeyEntry {
    pub name: KeyName,
    /// Every value observed at the key. Re-declaring a key appends here.
    pub values: Vec<KeyValue>,
    pub definition: Option<ExprId>,
    pub comment: Option<String>,
}

impl KeyEntry {
    pub fn new(name: KeyName) -> Self {
        Self {
            name,
            values: vec![],
            definition: None,
            comment: None,
        }
    }

    pub fn resolve(&self, forcer: &mut dyn ForceDeferred) -> MultiType {
        let mut result = MultiType::empty();
        for value in &self.values {
            match value {
                KeyValue::Ready(types) => result.extend(types.clone()),
                KeyValue::Deferred(deferred) => result.extend(forcer.force(deferred)),
            }
        }
        result
    }

    fn merge(&mut self, other: KeyEntry) {
        for value in other.values {
            let duplicate = match &value {
                KeyValue::Deferred(d) => self
                    .values
                    .iter()
                    .any(|v| matches!(v, KeyValue::Deferred(e) if e == d)),
                KeyValue::Ready(_) => false,
            };
            if !duplicate {
                self.values.push(value);
            }
        }
        if self.definition.is_none() {
            self.definition = other.definition;
        }
        if self.comment.is_none() {
            self.comment = other.comment;
        }
    }
}

/// Deferred return shape of a callable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReturnThunk {
    /// A `return` expression of a closure. Resolved under a fresh call context
    /// built from the caller's arguments; `enclosing` is the context the
    /// closure was created in, used for captured variables.
    Expr { expr: ExprId, enclosing: CallCtxId },
    /// `[Class::class, 'method']` callables.
    Method { class: String, method: String },
}

/// One concrete possibility for a value.
#[derive(Clone, Debug)]
pub struct Type {
    pub kind: TypeKind,
    pub literal: Option<Value>,
    pub keys: IndexMap<KeyName, KeyEntry>,
    pub element_types: MultiType,
    pub return_thunks: Vec<ReturnThunk>,
    /// Expression that produced this type.
    pub definition: Option<ExprId>,
    /// Row shapes attached to a query result object.
    pub fetch_rows: MultiType,
    /// Named placeholders of a prepared SQL statement.
    pub bind_vars: Vec<String>,
}

impl Type {
    pub fn new(kind: TypeKind) -> Self {
        Self {
            kind,
            literal: None,
            keys: IndexMap::new(),
            element_types: MultiType::empty(),
            return_thunks: vec![],
            definition: None,
            fetch_rows: MultiType::empty(),
            bind_vars: vec![],
        }
    }

    pub fn array() -> Self {
        Self::new(TypeKind::Array)
    }

    pub fn object(class: &str) -> Self {
        Self::new(TypeKind::Object(class.trim_start_matches('\\').to_string()))
    }

    pub fn literal(value: Value) -> Self {
        let kind = match &value {
            Value::Null => TypeKind::Null,
            Value::Bool(_) => TypeKind::Bool,
            Value::Int(_) => TypeKind::Int,
            Value::Float(_) => TypeKind::Float,
            Value::String(_) => TypeKind::String,
        };
        let mut ty = Self::new(kind);
        ty.literal = Some(value);
        ty
    }

    pub fn string(text: &str) -> Self {
        Self::literal(Value::from(text))
    }

    pub fn with_definition(mut self, definition: Option<ExprId>) -> Self {
        self.definition = definition;
        self
    }

    /// Adds a value to a key, appending to the existing entry if the key is
    /// already declared.
    pub fn add_key(&mut self, name: KeyName, value: KeyValue, definition: Option<ExprId>) {
        let entry = self
            .keys
            .entry(name.clone())
            .or_insert_with(|| KeyEntry::new(name));
        entry.merge(KeyEntry {
            name: KeyName::Unknown,
            values: vec![value],
            definition,
            comment: None,
        });
    }

    pub fn add_key_entry(&mut self, entry: KeyEntry) {
        match self.keys.get_mut(&entry.name) {
            Some(existing) => existing.merge(entry),
            None => {
                self.keys.insert(entry.name.clone(), entry);
            }
        }
    }

    pub fn is_scalar(&self) -> bool {
        self.keys.is_empty()
            && self.element_types.is_empty()
            && self.return_thunks.is_empty()
            && self.fetch_rows.is_empty()
            && self.bind_vars.is_empty()
    }

    /// Whether the type tells more than "some array" or "mixed".
    pub fn is_informative(&self) -> bool {
        match self.kind {
            TypeKind::Mixed | TypeKind::Unknown => false,
            TypeKind::Array => !self.is_scalar(),
            _ => true,
        }
    }

    fn same_source(&self, other: &Type) -> bool {
        self.definition == other.definition
            && self.kind == other.kind
            && self.literal == other.literal
    }

    fn absorb(&mut self, other: Type) {
        for (_, entry) in other.keys {
            self.add_key_entry(entry);
        }
        self.element_types.extend(other.element_types);
        for thunk in other.return_thunks {
            if !self.return_thunks.contains(&thunk) {
                self.return_thunks.push(thunk);
            }
        }
        self.fetch_rows.extend(other.fetch_rows);
        for var in other.bind_vars {
            if !self.bind_vars.contains(&var) {
                self.bind_vars.push(var);
            }
        }
    }

    fn brief_value(&self) -> Option<String> {
        if let Some(literal) = &self.literal {
            return Some(literal.to_string());
        }
        None
    }
}

/// Ordered union of possible types for one expression.
#[derive(Clone, Debug, Default)]
pub struct MultiType {
    types: Vec<Type>,
}

impl MultiType {
    pub fn empty() -> Self {
        Self { types: vec![] }
    }

    pub fn of(ty: Type) -> Self {
        Self { types: vec![ty] }
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn types(&self) -> &[Type] {
        &self.types
    }

    pub fn iter(&self) -> impl Iterator<Item = &Type> {
        self.types.iter()
    }

    pub fn into_types(self) -> Vec<Type> {
        self.types
    }

    /// Adds a possibility. Types produced by the same expression with the same
    /// kind and literal collapse into one, merging their keys.
    pub fn push(&mut self, ty: Type) {
        let existing = self.types.iter_mut().find(|t| {
            t.same_source(&ty) && (ty.definition.is_some() || (t.is_scalar() && ty.is_scalar()))
        });
        match existing {
            Some(existing) => existing.absorb(ty),
            None => self.types.push(ty),
        }
    }

    pub fn extend(&mut self, other: MultiType) {
        for ty in other.types {
            self.push(ty);
        }
    }

    pub fn is_informative(&self) -> bool {
        self.types.iter().any(|t| t.is_informative())
    }

    /// Named keys across all branches, in first-seen order.
    pub fn key_names(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut names = vec![];
        for ty in &self.types {
            for name in ty.keys.keys().filter_map(|k| k.as_named()) {
                if seen.insert(name) {
                    names.push(name.to_string());
                }
            }
        }
        names
    }

    /// Entries declaring `name` on any branch.
    pub fn key_entries<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a KeyEntry> + 'a {
        let key = KeyName::Named(name.to_string());
        self.types.iter().filter_map(move |t| t.keys.get(&key))
    }

    /// Values of key `name`: every branch's entry for it, every dynamic key
    /// entry and, for numeric names, element types.
    pub fn get_key(&self, name: &str, forcer: &mut dyn ForceDeferred) -> MultiType {
        let named = KeyName::Named(name.to_string());
        let numeric = !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit());
        let mut result = MultiType::empty();
        for ty in &self.types {
            if let Some(entry) = ty.keys.get(&named) {
                result.extend(entry.resolve(forcer));
            }
            if let Some(entry) = ty.keys.get(&KeyName::Unknown) {
                result.extend(entry.resolve(forcer));
            }
            if numeric {
                result.extend(ty.element_types.clone());
            }
        }
        result
    }

    /// Values reachable by any key, used for dynamic indexes and iteration.
    pub fn all_values(&self, forcer: &mut dyn ForceDeferred) -> MultiType {
        let mut result = self.element_types();
        for ty in &self.types {
            for entry in ty.keys.values() {
                result.extend(entry.resolve(forcer));
            }
        }
        result
    }

    pub fn element_types(&self) -> MultiType {
        let mut result = MultiType::empty();
        for ty in &self.types {
            result.extend(ty.element_types.clone());
        }
        result
    }

    pub fn has_element_types(&self) -> bool {
        self.types.iter().any(|t| !t.element_types.is_empty())
    }

    /// Whether every named key is a list position.
    pub fn has_number_indexes(&self) -> bool {
        let names = self.key_names();
        !names.is_empty()
            && names
                .iter()
                .all(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
    }

    pub fn string_literals(&self) -> Vec<String> {
        let mut out = vec![];
        for ty in &self.types {
            if let Some(Value::String(s)) = &ty.literal {
                if !out.iter().any(|o: &String| o.as_str() == s.as_ref()) {
                    out.push(s.to_string());
                }
            }
        }
        out
    }

    /// Keys an index value could produce: string and integer literals.
    pub fn key_literals(&self) -> Vec<String> {
        let mut out: Vec<String> = vec![];
        for ty in &self.types {
            if let Some(key) = ty.literal.as_ref().and_then(|l| l.as_key()) {
                if !out.contains(&key) {
                    out.push(key);
                }
            }
        }
        out
    }

    pub fn classes(&self) -> Vec<String> {
        let mut out: Vec<String> = vec![];
        for ty in &self.types {
            if let TypeKind::Object(class) = &ty.kind {
                if !out.contains(class) {
                    out.push(class.clone());
                }
            }
        }
        out
    }

    pub fn return_thunks(&self) -> Vec<ReturnThunk> {
        let mut out = vec![];
        for ty in &self.types {
            for thunk in &ty.return_thunks {
                if !out.contains(thunk) {
                    out.push(thunk.clone());
                }
            }
        }
        out
    }

    pub fn fetch_rows(&self) -> MultiType {
        let mut rows = MultiType::empty();
        for ty in &self.types {
            rows.extend(ty.fetch_rows.clone());
        }
        rows
    }

    pub fn bind_vars(&self) -> Vec<String> {
        let mut out: Vec<String> = vec![];
        for ty in &self.types {
            for var in &ty.bind_vars {
                if !out.contains(var) {
                    out.push(var.clone());
                }
            }
        }
        out
    }

    /// Distinct brief kind names joined by `|`, e.g. `int|string`.
    pub fn brief_description(&self, max_len: usize) -> String {
        let mut names: Vec<&str> = vec![];
        for ty in &self.types {
            let name = ty.kind.brief_name();
            if ty.kind != TypeKind::Unknown && !names.contains(&name) {
                names.push(name);
            }
        }
        if names.is_empty() {
            return "mixed".to_string();
        }
        truncate(names.join("|"), max_len)
    }

    /// Literal values when known (`'Bob'|'Alice'`), else the brief description.
    pub fn brief_value(&self, max_len: usize) -> String {
        let mut values: Vec<String> = vec![];
        for ty in &self.types {
            if let Some(value) = ty.brief_value() {
                if !values.contains(&value) {
                    values.push(value);
                }
            }
        }
        if values.is_empty() {
            let keys = self.key_names();
            if keys.is_empty() {
                return self.brief_description(max_len);
            }
            let quoted: Vec<String> = keys.iter().map(|k| format!("'{k}'")).collect();
            return truncate(format!("[{}]", quoted.join(", ")), max_len);
        }
        truncate(values.join("|"), max_len)
    }
}

fn truncate(text: String, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text;
    }
    let keep = max_len.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoForce;

    impl ForceDeferred for NoForce {
        fn force(&mut self, _deferred: &Deferred) -> MultiType {
            MultiType::empty()
        }
    }

    fn id(eidx: u32) -> ExprId {
        ExprId { module: 0, eidx }
    }

    fn row(keys: &[(&str, Type)], definition: u32) -> Type {
        let mut ty = Type::array().with_definition(Some(id(definition)));
        for (name, value) in keys {
            ty.add_key(
                KeyName::Named(name.to_string()),
                KeyValue::Ready(MultiType::of(value.clone())),
                None,
            );
        }
        ty
    }

    #[test]
    fn get_key_unions_branches_and_dynamic_keys() {
        let mut mt = MultiType::empty();
        mt.push(row(&[("id", Type::new(TypeKind::Int))], 1));
        mt.push(row(&[("id", Type::string("x")), ("name", Type::string("Bob"))], 2));
        let mut dynamic = Type::array().with_definition(Some(id(3)));
        dynamic.add_key(
            KeyName::Unknown,
            KeyValue::Ready(MultiType::of(Type::new(TypeKind::Bool))),
            None,
        );
        mt.push(dynamic);

        let id_values = mt.get_key("id", &mut NoForce);
        assert_eq!(id_values.brief_description(50), "int|string|bool");
        assert_eq!(mt.key_names(), vec!["id", "name"]);

        let missing = mt.get_key("zzz", &mut NoForce);
        assert_eq!(missing.brief_description(50), "bool");
    }

    #[test]
    fn redeclared_key_appends_values() {
        let mut ty = Type::array();
        let key = KeyName::Named("a".to_string());
        ty.add_key(key.clone(), KeyValue::Ready(MultiType::of(Type::new(TypeKind::Int))), None);
        ty.add_key(key, KeyValue::Ready(MultiType::of(Type::string("s"))), None);
        let mt = MultiType::of(ty);
        assert_eq!(mt.get_key("a", &mut NoForce).brief_description(50), "int|string");
    }

    #[test]
    fn push_collapses_same_source() {
        let mut mt = MultiType::empty();
        mt.push(row(&[("a", Type::new(TypeKind::Int))], 7));
        mt.push(row(&[("b", Type::new(TypeKind::Int))], 7));
        mt.push(Type::new(TypeKind::Int));
        mt.push(Type::new(TypeKind::Int));
        assert_eq!(mt.len(), 2);
        assert_eq!(mt.key_names(), vec!["a", "b"]);
    }

    #[test]
    fn key_names_are_order_independent_as_sets() {
        let a = row(&[("x", Type::new(TypeKind::Int))], 1);
        let b = row(&[("y", Type::new(TypeKind::Int))], 2);
        let mut ab = MultiType::empty();
        ab.push(a.clone());
        ab.push(b.clone());
        let mut ba = MultiType::empty();
        ba.push(b);
        ba.push(a);
        let mut left = ab.key_names();
        let mut right = ba.key_names();
        left.sort();
        right.sort();
        assert_eq!(left, right);
    }

    #[test]
    fn numeric_keys_read_element_types() {
        let mut list = Type::array();
        list.element_types.push(Type::string("v"));
        let mt = MultiType::of(list);
        assert_eq!(mt.get_key("0", &mut NoForce).string_literals(), vec!["v"]);
        assert!(mt.get_key("name", &mut NoForce).is_empty());
    }

    #[test]
    fn brief_description_truncates_and_defaults() {
        assert_eq!(MultiType::empty().brief_description(50), "mixed");
        let mut mt = MultiType::empty();
        for class in ["AVeryLongClassName", "AnotherLongClassName", "YetAnotherOne"] {
            mt.push(Type::object(class));
        }
        let brief = mt.brief_description(20);
        assert_eq!(brief.chars().count(), 20);
        assert!(brief.ends_with("..."));
    }

    #[test]
    fn brief_value_prefers_literals() {
        let mut mt = MultiType::of(Type::string("Bob"));
        mt.push(Type::string("Alice"));
        assert_eq!(mt.brief_value(50), "'Bob'|'Alice'");
        let keyed = MultiType::of(row(&[("id", Type::new(TypeKind::Int))], 1));
        assert_eq!(keyed.brief_value(50), "['id']");
    }

    #[test]
    fn hints_map_to_kinds() {
        assert_eq!(TypeKind::from_hint("?array"), Some(TypeKind::Array));
        assert_eq!(TypeKind::from_hint("integer"), Some(TypeKind::Int));
        assert_eq!(
            TypeKind::from_hint("\\App\\User"),
            Some(TypeKind::Object("App\\User".to_string()))
        );
        assert_eq!(TypeKind::from_hint("self"), None);
    }
}
