//! Control id registration tables.
//!
//! Every list-row and button id the service emits is registered by exactly one
//! flow, as an exact id, a prefix, or an id that is only valid in one state.
//! Overlapping registrations across flows are rejected when the table is built.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use crate::flows::Flow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    Exact(&'static str),
    Prefix(&'static str),
    /// An exact id honoured only while the user is in `state`.
    Gated {
        id: &'static str,
        state: &'static str,
    },
}

impl Pattern {
    fn literal(&self) -> Option<&'static str> {
        match self {
            Pattern::Exact(id) | Pattern::Gated { id, .. } => Some(id),
            Pattern::Prefix(_) => None,
        }
    }

    fn text(&self) -> &'static str {
        match self {
            Pattern::Exact(id) | Pattern::Prefix(id) | Pattern::Gated { id, .. } => id,
        }
    }

    /// Whether some id could be matched by both patterns.
    fn overlaps(&self, other: &Pattern) -> bool {
        match (self.literal(), other.literal()) {
            (Some(a), Some(b)) => a == b,
            (Some(id), None) => id.starts_with(other.text()),
            (None, Some(id)) => id.starts_with(self.text()),
            (None, None) => {
                let (a, b) = (self.text(), other.text());
                a.starts_with(b) || b.starts_with(a)
            }
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Exact(id) => write!(f, "{id}"),
            Pattern::Prefix(prefix) => write!(f, "{prefix}*"),
            Pattern::Gated { id, state } => write!(f, "{id} [{state}]"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub pattern: Pattern,
    pub flow: Flow,
}

impl Route {
    pub const fn exact(id: &'static str, flow: Flow) -> Self {
        Self {
            pattern: Pattern::Exact(id),
            flow,
        }
    }

    pub const fn prefix(prefix: &'static str, flow: Flow) -> Self {
        Self {
            pattern: Pattern::Prefix(prefix),
            flow,
        }
    }

    pub const fn gated(id: &'static str, state: &'static str, flow: Flow) -> Self {
        Self {
            pattern: Pattern::Gated { id, state },
            flow,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("{table} route {first} ({first_flow}) overlaps {second} ({second_flow})")]
pub struct RouteConflict {
    pub table: &'static str,
    pub first: Pattern,
    pub first_flow: Flow,
    pub second: Pattern,
    pub second_flow: Flow,
}

/// Resolves a control id to its owning flow.
///
/// Exact ids win, then prefixes (longest first), then state-gated ids.
#[derive(Debug)]
pub struct RouteTable {
    name: &'static str,
    routes: Vec<Route>,
    exact: HashMap<&'static str, Flow>,
    prefixes: Vec<(&'static str, Flow)>,
    gated: Vec<(&'static str, &'static str, Flow)>,
}

impl RouteTable {
    pub fn new(name: &'static str, routes: Vec<Route>) -> Result<Self, RouteConflict> {
        for (i, a) in routes.iter().enumerate() {
            for b in &routes[i + 1..] {
                let same_literal = a.pattern.literal().is_some()
                    && a.pattern.literal() == b.pattern.literal();
                if (a.flow != b.flow && a.pattern.overlaps(&b.pattern)) || same_literal {
                    return Err(RouteConflict {
                        table: name,
                        first: a.pattern,
                        first_flow: a.flow,
                        second: b.pattern,
                        second_flow: b.flow,
                    });
                }
            }
        }

        let mut exact = HashMap::new();
        let mut prefixes = Vec::new();
        let mut gated = Vec::new();
        for route in &routes {
            match route.pattern {
                Pattern::Exact(id) => {
                    exact.insert(id, route.flow);
                }
                Pattern::Prefix(prefix) => prefixes.push((prefix, route.flow)),
                Pattern::Gated { id, state } => gated.push((id, state, route.flow)),
            }
        }
        prefixes.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        Ok(Self {
            name,
            routes,
            exact,
            prefixes,
            gated,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// The flow owning `id` for a user in `state_key`.
    pub fn resolve(&self, id: &str, state_key: &str) -> Option<Flow> {
        if id.is_empty() {
            return None;
        }
        if let Some(flow) = self.exact.get(id) {
            return Some(*flow);
        }
        if let Some((_, flow)) = self.prefixes.iter().find(|(p, _)| id.starts_with(p)) {
            return Some(*flow);
        }
        self.gated
            .iter()
            .find(|(gated_id, state, _)| *gated_id == id && *state == state_key)
            .map(|(_, _, flow)| *flow)
    }
}
