//! SF-011: Tokens and deferred values.
//!
//! A deferred value is a string (or a JSON tree of strings) carrying `{{...}}`
//! placeholders. Loading wraps it in a [`Pending`], which records every
//! reference up front; rendering calls [`Pending::resolve`] once with a
//! [`ResolveContext`]. Nothing is memoized on access.

use super::types::json_value_to_string;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Token resolution failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("unclosed template at position {0}")]
    Unclosed(usize),

    #[error("unknown template variable: {0}")]
    UnknownVariable(String),

    #[error("malformed reference: {0}")]
    Malformed(String),

    #[error("unknown param: {0}")]
    UnknownParam(String),

    #[error("unknown lazy value: {0}")]
    UnknownLazy(String),

    #[error("unknown resource: {0}")]
    UnknownResource(String),

    #[error("unknown stack: {0}")]
    UnknownStack(String),

    #[error("stack '{stack}' has no output '{output}'")]
    UnknownOutput { stack: String, output: String },
}

/// One parsed `{{...}}` placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TokenRef {
    /// `{{params.NAME}}`
    Param(String),
    /// `{{lazy.NAME}}`
    Lazy(String),
    /// `{{ref.RESOURCE}}`
    Ref(String),
    /// `{{attr.RESOURCE.ATTRIBUTE}}`
    Attr { resource: String, attribute: String },
    /// `{{output.STACK.NAME}}`
    Output { stack: String, output: String },
}

impl TokenRef {
    /// Parse the text between the braces.
    pub fn parse(expr: &str) -> Result<Self, ResolveError> {
        let expr = expr.trim();
        let (kind, rest) = expr
            .split_once('.')
            .ok_or_else(|| ResolveError::UnknownVariable(expr.to_string()))?;
        if rest.is_empty() {
            return Err(ResolveError::Malformed(expr.to_string()));
        }

        let two_part = |rest: &str| -> Result<(String, String), ResolveError> {
            match rest.split_once('.') {
                Some((a, b)) if !a.is_empty() && !b.is_empty() => Ok((a.to_string(), b.to_string())),
                _ => Err(ResolveError::Malformed(expr.to_string())),
            }
        };

        match kind {
            "params" => Ok(Self::Param(rest.to_string())),
            "lazy" => Ok(Self::Lazy(rest.to_string())),
            "ref" => Ok(Self::Ref(rest.to_string())),
            "attr" => {
                let (resource, attribute) = two_part(rest)?;
                Ok(Self::Attr { resource, attribute })
            }
            "output" => {
                let (stack, output) = two_part(rest)?;
                Ok(Self::Output { stack, output })
            }
            _ => Err(ResolveError::UnknownVariable(expr.to_string())),
        }
    }

    /// Resource this token points at, for `ref` and `attr`.
    pub fn resource(&self) -> Option<&str> {
        match self {
            Self::Ref(r) | Self::Attr { resource: r, .. } => Some(r.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for TokenRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Param(p) => write!(f, "{{{{params.{}}}}}", p),
            Self::Lazy(l) => write!(f, "{{{{lazy.{}}}}}", l),
            Self::Ref(r) => write!(f, "{{{{ref.{}}}}}", r),
            Self::Attr { resource, attribute } => write!(f, "{{{{attr.{}.{}}}}}", resource, attribute),
            Self::Output { stack, output } => write!(f, "{{{{output.{}.{}}}}}", stack, output),
        }
    }
}

/// Find every placeholder in `template`, in order of appearance.
pub fn scan(template: &str) -> Result<Vec<TokenRef>, ResolveError> {
    let mut refs = Vec::new();
    let mut start = 0;
    while let Some(open) = template[start..].find("{{") {
        let open = start + open;
        let close = template[open..]
            .find("}}")
            .ok_or(ResolveError::Unclosed(open))?;
        let close = open + close + 2;
        refs.push(TokenRef::parse(&template[open + 2..close - 2])?);
        start = close;
    }
    Ok(refs)
}

/// Values visible while resolving tokens of one stack.
pub struct ResolveContext<'a> {
    stack: String,
    params: &'a IndexMap<String, serde_json::Value>,
    outputs: Option<&'a HashMap<String, IndexMap<String, String>>>,
    lazies: IndexMap<String, String>,
    physical_names: IndexMap<String, String>,
}

impl<'a> ResolveContext<'a> {
    pub fn new(stack: &str, params: &'a IndexMap<String, serde_json::Value>) -> Self {
        Self {
            stack: stack.to_string(),
            params,
            outputs: None,
            lazies: IndexMap::new(),
            physical_names: IndexMap::new(),
        }
    }

    /// Outputs of already-synthesized stacks, keyed by stack id.
    pub fn with_outputs(mut self, outputs: &'a HashMap<String, IndexMap<String, String>>) -> Self {
        self.outputs = Some(outputs);
        self
    }

    pub fn stack(&self) -> &str {
        &self.stack
    }

    pub fn define_lazy(&mut self, name: &str, value: String) {
        self.lazies.insert(name.to_string(), value);
    }

    pub fn define_resource(&mut self, id: &str, physical_name: String) {
        self.physical_names.insert(id.to_string(), physical_name);
    }

    pub fn physical_name(&self, id: &str) -> Option<&str> {
        self.physical_names.get(id).map(String::as_str)
    }

    fn param(&self, name: &str) -> Result<&serde_json::Value, ResolveError> {
        self.params
            .get(name)
            .ok_or_else(|| ResolveError::UnknownParam(name.to_string()))
    }

    /// String form of one token.
    pub fn lookup(&self, token: &TokenRef) -> Result<String, ResolveError> {
        match token {
            TokenRef::Param(p) => self.param(p).map(json_value_to_string),
            TokenRef::Lazy(l) => self
                .lazies
                .get(l)
                .cloned()
                .ok_or_else(|| ResolveError::UnknownLazy(l.clone())),
            TokenRef::Ref(r) => self
                .physical_name(r)
                .map(str::to_string)
                .ok_or_else(|| ResolveError::UnknownResource(r.clone())),
            TokenRef::Attr { resource, attribute } => self
                .physical_name(resource)
                .map(|p| format!("${{{}.{}}}", p, attribute))
                .ok_or_else(|| ResolveError::UnknownResource(resource.clone())),
            TokenRef::Output { stack, output } => {
                let outputs = self
                    .outputs
                    .and_then(|all| all.get(stack))
                    .ok_or_else(|| ResolveError::UnknownStack(stack.clone()))?;
                outputs
                    .get(output)
                    .cloned()
                    .ok_or_else(|| ResolveError::UnknownOutput {
                        stack: stack.clone(),
                        output: output.clone(),
                    })
            }
        }
    }
}

/// Substitute every placeholder in `template`.
pub fn render(template: &str, ctx: &ResolveContext<'_>) -> Result<String, ResolveError> {
    let mut result = template.to_string();
    let mut start = 0;

    while let Some(open) = result[start..].find("{{") {
        let open = start + open;
        let close = result[open..]
            .find("}}")
            .ok_or(ResolveError::Unclosed(open))?;
        let close = open + close + 2;
        let token = TokenRef::parse(&result[open + 2..close - 2])?;
        let value = ctx.lookup(&token)?;

        result.replace_range(open..close, &value);
        start = open + value.len();
    }

    Ok(result)
}

/// Values that can carry tokens.
pub trait Resolvable: Sized {
    /// Append every token reference, in order of appearance.
    fn collect_refs(&self, out: &mut Vec<TokenRef>) -> Result<(), ResolveError>;

    /// Produce the value with every token substituted.
    fn resolve_with(&self, ctx: &ResolveContext<'_>) -> Result<Self, ResolveError>;
}

impl Resolvable for String {
    fn collect_refs(&self, out: &mut Vec<TokenRef>) -> Result<(), ResolveError> {
        out.extend(scan(self)?);
        Ok(())
    }

    fn resolve_with(&self, ctx: &ResolveContext<'_>) -> Result<Self, ResolveError> {
        render(self, ctx)
    }
}

impl Resolvable for serde_json::Value {
    fn collect_refs(&self, out: &mut Vec<TokenRef>) -> Result<(), ResolveError> {
        match self {
            serde_json::Value::String(s) => out.extend(scan(s)?),
            serde_json::Value::Array(items) => {
                for item in items {
                    item.collect_refs(out)?;
                }
            }
            serde_json::Value::Object(map) => {
                for value in map.values() {
                    value.collect_refs(out)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn resolve_with(&self, ctx: &ResolveContext<'_>) -> Result<Self, ResolveError> {
        match self {
            serde_json::Value::String(s) => {
                // A lone param token keeps the parameter's own type.
                if let Some(TokenRef::Param(name)) = sole_token(s) {
                    return ctx.param(&name).cloned();
                }
                render(s, ctx).map(serde_json::Value::String)
            }
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| item.resolve_with(ctx))
                .collect::<Result<Vec<_>, _>>()
                .map(serde_json::Value::Array),
            serde_json::Value::Object(map) => {
                let mut resolved = serde_json::Map::with_capacity(map.len());
                for (key, value) in map {
                    resolved.insert(key.clone(), value.resolve_with(ctx)?);
                }
                Ok(serde_json::Value::Object(resolved))
            }
            other => Ok(other.clone()),
        }
    }
}

/// The token if `s` is exactly one placeholder and nothing else.
fn sole_token(s: &str) -> Option<TokenRef> {
    let inner = s.trim().strip_prefix("{{")?.strip_suffix("}}")?;
    if inner.contains("{{") || inner.contains("}}") {
        return None;
    }
    TokenRef::parse(inner).ok()
}

/// A value whose tokens are resolved later, exactly once, before rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct Pending<T> {
    raw: T,
    refs: Vec<TokenRef>,
}

impl<T: Resolvable> Pending<T> {
    /// Wrap `raw`, failing early on malformed placeholders.
    pub fn new(raw: T) -> Result<Self, ResolveError> {
        let mut refs = Vec::new();
        raw.collect_refs(&mut refs)?;
        Ok(Self { raw, refs })
    }

    pub fn raw(&self) -> &T {
        &self.raw
    }

    /// Every token reference, in order of appearance (duplicates kept).
    pub fn refs(&self) -> &[TokenRef] {
        &self.refs
    }

    /// True when there is nothing to substitute.
    pub fn is_literal(&self) -> bool {
        self.refs.is_empty()
    }

    pub fn resolve(&self, ctx: &ResolveContext<'_>) -> Result<T, ResolveError> {
        self.raw.resolve_with(ctx)
    }
}
