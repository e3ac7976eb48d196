//! Expansion engine: binds parameters and produces positional statements.
//!
//! Steps are folded left to right over a [`Context`]. Literals are copied,
//! parameters become `$N` placeholders, and queries composed by name or by
//! [`QueryRef`] are expanded in place, continuing the placeholder count.
//! Missing mandatory parameters are recorded and expansion carries on, so a
//! single call reports every missing parameter.

use std::fmt;

use serde::Serialize;

use crate::compiler::{QuerySet, Step};
use crate::ast::is_optional;
use crate::error::{ParamError, Unbound};
use crate::value::{CallTarget, Params, QueryCall, QueryRef, Scalar, Value};

/// Default nesting allowed for composed queries.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Per-call expansion settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// First placeholder number.
    pub index: u32,
    /// Deepest composition nesting before expansion gives up on a branch.
    pub max_depth: usize,
    /// Whether a runner should execute the query or only return it.
    pub execute: bool,
    depth: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            index: 1,
            max_depth: DEFAULT_MAX_DEPTH,
            execute: true,
            depth: 0,
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index(mut self, index: u32) -> Self {
        self.index = index.max(1);
        self
    }

    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn execute(mut self, execute: bool) -> Self {
        self.execute = execute;
        self
    }

    /// Current composition nesting.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Options for a composed query starting at `index`; never executes.
    fn nested(&self, index: u32) -> Self {
        Self {
            index,
            max_depth: self.max_depth,
            execute: false,
            depth: self.depth + 1,
        }
    }
}

/// A fully bound statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Query {
    pub statement: String,
    pub arguments: Vec<Scalar>,
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.statement)
    }
}

/// Accumulator threaded through one expansion.
#[derive(Debug, Clone)]
pub struct Context {
    index: u32,
    statement: Vec<String>,
    arguments: Vec<Scalar>,
    errors: Vec<ParamError>,
}

impl Context {
    pub fn new(index: u32) -> Self {
        Self {
            index: index.max(1),
            statement: Vec::new(),
            arguments: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Number the next placeholder will get.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn errors(&self) -> &[ParamError] {
        &self.errors
    }

    fn put_literal(&mut self, text: impl Into<String>) {
        self.statement.push(text.into());
    }

    /// Numbering stops at `u32::MAX`.
    fn next_placeholder(&mut self) -> String {
        let placeholder = format!("${}", self.index);
        self.index = self.index.saturating_add(1);
        placeholder
    }

    fn put_scalar(&mut self, value: Scalar) {
        let placeholder = self.next_placeholder();
        self.statement.push(placeholder);
        self.arguments.push(value);
    }

    fn put_list(&mut self, values: &[Scalar]) {
        let placeholders: Vec<String> = values.iter().map(|_| self.next_placeholder()).collect();
        self.statement.push(placeholders.join(","));
        self.arguments.extend(values.iter().cloned());
    }

    fn put_missing(&mut self, name: &str) {
        self.statement.push(format!("<missing {}>", name));
        self.errors.push(ParamError::not_found(name));
    }

    fn put_too_deep(&mut self, name: &str) {
        self.statement.push(format!("<recursive {}>", name));
        self.errors.push(ParamError::recursion_limit(name));
    }

    /// Splice a sub-expansion in place, whether or not it was complete.
    fn merge(&mut self, result: Result<Query, Unbound>) {
        let (statement, arguments, errors) = match result {
            Ok(query) => (query.statement, query.arguments, Vec::new()),
            Err(unbound) => (unbound.statement, unbound.arguments, unbound.errors),
        };
        let consumed = u32::try_from(arguments.len()).unwrap_or(u32::MAX);
        self.index = self.index.saturating_add(consumed);
        self.statement.push(statement);
        self.arguments.extend(arguments);
        self.errors.extend(errors);
    }

    /// Assemble the final statement.
    pub fn finish(self) -> Result<Query, Unbound> {
        let statement = normalize(&self.statement.concat());
        if self.errors.is_empty() {
            Ok(Query {
                statement,
                arguments: self.arguments,
            })
        } else {
            Err(Unbound {
                statement,
                arguments: self.arguments,
                errors: self.errors,
            })
        }
    }
}

/// Expand `steps` against `params`, resolving compositions in `set`.
pub fn evaluate(steps: &[Step], set: &QuerySet, params: &Params, options: &Options) -> Result<Query, Unbound> {
    let expander = Expander { set, options };
    let mut ctx = Context::new(options.index);
    for step in steps {
        expander.step(&mut ctx, step, params);
    }
    tracing::debug!(
        depth = options.depth,
        arguments = ctx.arguments.len(),
        errors = ctx.errors.len(),
        "expanded steps"
    );
    ctx.finish()
}

struct Expander<'a> {
    set: &'a QuerySet,
    options: &'a Options,
}

impl Expander<'_> {
    fn step(&self, ctx: &mut Context, step: &Step, params: &Params) {
        match step {
            Step::Literal(text) => ctx.put_literal(text.as_str()),
            Step::Param(name) if self.set.contains(name) => self.compose_named(ctx, name, params),
            Step::Param(name) => match params.get(name) {
                None if is_optional(name) => {}
                None => ctx.put_missing(name),
                Some(Value::Scalar(value)) => ctx.put_scalar(value.clone()),
                Some(Value::In(values)) => ctx.put_list(values),
                Some(Value::Query(query)) => self.compose_ref(ctx, query, params),
                Some(Value::Inner(calls, separator)) => self.compose_inner(ctx, calls, separator, params),
            },
        }
    }

    fn nested(&self, ctx: &mut Context, label: &str) -> Option<Options> {
        if self.options.depth >= self.options.max_depth {
            tracing::warn!(query = label, max_depth = self.options.max_depth, "composition too deep");
            ctx.put_too_deep(label);
            return None;
        }
        Some(self.options.nested(ctx.index()))
    }

    fn compose_named(&self, ctx: &mut Context, name: &str, params: &Params) {
        let Some(options) = self.nested(ctx, name) else {
            return;
        };
        ctx.merge(self.set.expand(name, params, &options));
    }

    fn compose_ref(&self, ctx: &mut Context, query: &QueryRef, params: &Params) {
        let Some(options) = self.nested(ctx, query.name()) else {
            return;
        };
        ctx.merge(query.call(params, &options));
    }

    fn compose_inner(&self, ctx: &mut Context, calls: &[QueryCall], separator: &str, params: &Params) {
        for (i, call) in calls.iter().enumerate() {
            if i > 0 {
                ctx.put_literal(separator);
            }
            let params = call.params.as_ref().unwrap_or(params);
            match &call.target {
                CallTarget::Name(name) if self.set.contains(name) => self.compose_named(ctx, name, params),
                CallTarget::Name(name) => ctx.put_missing(name),
                CallTarget::Ref(query) => self.compose_ref(ctx, query, params),
            }
        }
    }
}

/// Collapse whitespace runs outside quoted strings, trim, and drop one
/// trailing `;`.
fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    let mut in_string = false;
    let mut pending_space = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\'' => in_string = false,
                '\\' => out.extend(chars.next()),
                _ => {}
            }
            continue;
        }
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        if c == '\'' {
            in_string = true;
        }
        out.push(c);
    }

    if let Some(stripped) = out.strip_suffix(';') {
        stripped.trim_end().to_string()
    } else {
        out
    }
}
