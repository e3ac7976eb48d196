//! Compiles parsed definitions into expansion steps and query sets.

use std::collections::HashMap;
use std::sync::Arc;

use crate::ast::*;
use crate::error::{CompileResult, ParamError, ParseError, Unbound};
use crate::expand::{evaluate, Options, Query};
use crate::lexer::tokenize;
use crate::parser;
use crate::value::{Params, QueryRef};

/// One unit of work for the expansion engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Literal(String),
    /// Resolved at expansion time: a query of the set, or a parameter.
    Param(String),
}

/// Turn a body into steps, merging runs of adjacent literals.
pub fn compile(body: &[BodyItem]) -> Vec<Step> {
    let mut steps: Vec<Step> = Vec::with_capacity(body.len());
    for item in body {
        match (item, steps.last_mut()) {
            // Verbatim: whitespace is already its own literal, and `name='bob'` must stay intact.
            (BodyItem::Literal(text), Some(Step::Literal(prev))) => prev.push_str(text),
            (BodyItem::Literal(text), _) => steps.push(Step::Literal(text.clone())),
            (BodyItem::Param(name), _) => steps.push(Step::Param(name.clone())),
        }
    }
    steps
}

/// A definition ready for expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    name: Option<String>,
    docs: Option<String>,
    steps: Vec<Step>,
    span: Span,
}

impl CompiledQuery {
    pub fn new(definition: &QueryDefinition) -> Self {
        Self {
            name: definition.name.clone(),
            docs: definition.docs.clone(),
            steps: compile(&definition.body),
            span: definition.span,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn docs(&self) -> Option<&str> {
        self.docs.as_deref()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn span(&self) -> Span {
        self.span
    }

    /// Identifiers referenced by the steps, deduplicated, in first-use order.
    pub fn references(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for step in &self.steps {
            if let Step::Param(name) = step {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
        }
        out
    }
}

#[derive(Debug, Default)]
struct Queries {
    list: Vec<CompiledQuery>,
    by_name: HashMap<String, usize>,
}

/// The named queries of one source, looked up by name for composition.
///
/// Cheap to clone; clones share the compiled queries.
#[derive(Debug, Clone, Default)]
pub struct QuerySet {
    inner: Arc<Queries>,
}

impl QuerySet {
    /// Compile a source made of `-- name:` queries.
    pub fn parse(text: &str) -> CompileResult<Self> {
        let tokens = tokenize(text)?;
        match parser::parse(tokens)? {
            Parsed::Named(definitions) => Ok(Self::from_definitions(&definitions)?),
            Parsed::Anonymous(definition) => {
                Err(ParseError::new(definition.span, "expected a '-- name:' directive").into())
            }
        }
    }

    /// Build a set from parsed definitions, rejecting duplicate names and
    /// composition cycles.
    pub fn from_definitions(definitions: &[QueryDefinition]) -> Result<Self, ParseError> {
        let mut queries = Queries::default();
        for definition in definitions {
            let Some(name) = definition.name.clone() else {
                return Err(ParseError::new(definition.span, "query without a name in a query set"));
            };
            if queries.by_name.contains_key(&name) {
                return Err(ParseError::new(
                    definition.span,
                    format!("duplicate query name '{}'", name),
                ));
            }
            queries.by_name.insert(name, queries.list.len());
            queries.list.push(CompiledQuery::new(definition));
        }

        let set = Self {
            inner: Arc::new(queries),
        };
        set.check_cycles()?;
        tracing::debug!(queries = set.len(), "compiled query set");
        Ok(set)
    }

    pub fn get(&self, name: &str) -> Option<&CompiledQuery> {
        self.inner.by_name.get(name).map(|&i| &self.inner.list[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.by_name.contains_key(name)
    }

    /// Queries in source order.
    pub fn iter(&self) -> impl Iterator<Item = &CompiledQuery> {
        self.inner.list.iter()
    }

    pub fn len(&self) -> usize {
        self.inner.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.list.is_empty()
    }

    /// Parameters of `name`: references that are not queries of this set.
    pub fn params(&self, name: &str) -> Option<Vec<&str>> {
        let query = self.get(name)?;
        Some(query.references().into_iter().filter(|r| !self.contains(r)).collect())
    }

    /// Queries of this set that `name` composes.
    pub fn compositions(&self, name: &str) -> Option<Vec<&str>> {
        let query = self.get(name)?;
        Some(query.references().into_iter().filter(|r| self.contains(r)).collect())
    }

    /// Expand query `name` with `params`.
    ///
    /// An unknown name is reported as a missing identifier, like a missing
    /// mandatory parameter.
    pub fn expand(&self, name: &str, params: &Params, options: &Options) -> Result<Query, Unbound> {
        match self.get(name) {
            Some(query) => evaluate(query.steps(), self, params, options),
            None => Err(Unbound {
                statement: format!("<missing {}>", name),
                arguments: Vec::new(),
                errors: vec![ParamError::not_found(name)],
            }),
        }
    }

    /// Expand an ad-hoc template that may compose queries of this set.
    pub fn expand_template(&self, template: &Template, params: &Params, options: &Options) -> Result<Query, Unbound> {
        evaluate(template.query.steps(), self, params, options)
    }

    /// A reference to `name` usable as a parameter value in any set.
    pub fn reference(&self, name: &str) -> Option<QueryRef> {
        if !self.contains(name) {
            return None;
        }
        let set = self.clone();
        let target = name.to_string();
        Some(QueryRef::new(name, move |params, options| {
            set.expand(&target, params, options)
        }))
    }

    fn check_cycles(&self) -> Result<(), ParseError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            Active,
            Done,
        }

        fn visit<'a>(
            set: &'a QuerySet,
            at: usize,
            marks: &mut [Mark],
            path: &mut Vec<&'a str>,
        ) -> Result<(), ParseError> {
            let query = &set.inner.list[at];
            let name = query.name().unwrap_or_default();
            marks[at] = Mark::Active;
            path.push(name);
            for next in query.references() {
                let Some(&i) = set.inner.by_name.get(next) else {
                    continue;
                };
                match marks[i] {
                    Mark::Done => {}
                    Mark::Unvisited => visit(set, i, marks, path)?,
                    Mark::Active => {
                        let start = path.iter().position(|p| *p == next).unwrap_or(0);
                        let mut cycle: Vec<&str> = path[start..].to_vec();
                        cycle.push(next);
                        return Err(ParseError::new(
                            set.inner.list[i].span(),
                            format!("query '{}' composes itself ({})", next, cycle.join(" -> ")),
                        ));
                    }
                }
            }
            path.pop();
            marks[at] = Mark::Done;
            Ok(())
        }

        let mut marks = vec![Mark::Unvisited; self.len()];
        for i in 0..self.len() {
            if marks[i] == Mark::Unvisited {
                visit(self, i, &mut marks, &mut Vec::new())?;
            }
        }
        Ok(())
    }
}

/// A single unnamed template, e.g. an ad-hoc condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    query: CompiledQuery,
}

impl Template {
    pub fn parse(text: &str) -> CompileResult<Self> {
        let tokens = tokenize(text)?;
        match parser::parse(tokens)? {
            Parsed::Anonymous(definition) => Ok(Self {
                query: CompiledQuery::new(&definition),
            }),
            Parsed::Named(definitions) => {
                let span = definitions.first().map(|d| d.span).unwrap_or_default();
                Err(ParseError::new(span, "expected an unnamed template").into())
            }
        }
    }

    pub fn steps(&self) -> &[Step] {
        self.query.steps()
    }

    pub fn references(&self) -> Vec<&str> {
        self.query.references()
    }

    /// Expand on its own; every reference is treated as a parameter.
    pub fn expand(&self, params: &Params, options: &Options) -> Result<Query, Unbound> {
        evaluate(self.query.steps(), &QuerySet::default(), params, options)
    }
}
