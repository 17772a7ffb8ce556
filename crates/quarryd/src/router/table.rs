//! Append-only route table frozen into an axum router.

use std::collections::BTreeMap;
use std::fmt;

use axum::Router;
use axum::routing::MethodRouter;
use tracing::debug;

use super::ROUTER_TARGET;
use super::errors::RouteCompositionError;

/// Composition stage that contributed a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteStage {
    /// Redirects and the primary embedded asset tree.
    Static,
    /// REST API and the `/static/` asset tree.
    Rest,
    /// Node-specific status endpoints.
    Node,
}

impl RouteStage {
    /// Stable lower-case name used in logs and errors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Rest => "rest",
            Self::Node => "node",
        }
    }
}

impl fmt::Display for RouteStage {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Path matched by a binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoutePattern {
    /// Matches exactly one path.
    Exact(String),
    /// Matches a prefix ending in `/` and every path beneath it.
    Subtree(String),
}

impl RoutePattern {
    /// Pattern matching `path` only.
    #[must_use]
    pub fn exact(path: impl Into<String>) -> Self {
        Self::Exact(path.into())
    }

    /// Pattern matching `prefix` and everything under it. A missing trailing
    /// slash is added.
    #[must_use]
    pub fn subtree(prefix: impl Into<String>) -> Self {
        let mut prefix = prefix.into();
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        Self::Subtree(prefix)
    }

    /// The literal path or prefix.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Exact(path) | Self::Subtree(path) => path,
        }
    }

    fn validate(&self) -> Result<(), RouteCompositionError> {
        let path = self.as_str();
        if !path.starts_with('/') || path.contains(['{', '}', '*']) {
            return Err(RouteCompositionError::InvalidPattern {
                pattern: path.to_owned(),
            });
        }
        Ok(())
    }

    /// axum paths registered for this pattern.
    fn axum_paths(&self) -> Vec<String> {
        match self {
            Self::Exact(path) => vec![path.clone()],
            Self::Subtree(prefix) => vec![prefix.clone(), format!("{prefix}{{*rest}}")],
        }
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(path) => formatter.write_str(path),
            Self::Subtree(prefix) => write!(formatter, "{prefix}*"),
        }
    }
}

struct Binding {
    pattern: RoutePattern,
    handler: MethodRouter,
}

/// Ordered pattern-to-handler bindings collected during startup.
///
/// Bindings can only be added. Claiming a path another binding already
/// claims is refused, so the frozen router never has ambiguous routes.
#[derive(Default)]
pub struct RouteTable {
    bindings: Vec<Binding>,
    claimed: BTreeMap<String, (RoutePattern, RouteStage)>,
    stage: Option<RouteStage>,
}

impl RouteTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attributes subsequent bindings to `stage`.
    pub fn enter_stage(&mut self, stage: RouteStage) {
        debug!(target: ROUTER_TARGET, %stage, "route stage starting");
        self.stage = Some(stage);
    }

    const fn current_stage(&self) -> RouteStage {
        match self.stage {
            Some(stage) => stage,
            None => RouteStage::Static,
        }
    }

    /// Binds `handler` to `pattern`.
    pub fn bind(
        &mut self,
        pattern: RoutePattern,
        handler: MethodRouter,
    ) -> Result<(), RouteCompositionError> {
        pattern.validate()?;
        let stage = self.current_stage();
        let paths = pattern.axum_paths();
        for path in &paths {
            if let Some((existing, existing_stage)) = self.claimed.get(path) {
                return Err(RouteCompositionError::Conflict {
                    pattern: pattern.to_string(),
                    stage,
                    existing: existing.to_string(),
                    existing_stage: *existing_stage,
                });
            }
        }
        for path in paths {
            self.claimed.insert(path, (pattern.clone(), stage));
        }
        debug!(target: ROUTER_TARGET, %stage, %pattern, "route bound");
        self.bindings.push(Binding { pattern, handler });
        Ok(())
    }

    /// Returns `true` when `pattern` has been bound.
    #[must_use]
    pub fn contains(&self, pattern: &RoutePattern) -> bool {
        self.bindings.iter().any(|binding| &binding.pattern == pattern)
    }

    /// Bound patterns in binding order.
    #[must_use]
    pub fn patterns(&self) -> Vec<RoutePattern> {
        self.bindings
            .iter()
            .map(|binding| binding.pattern.clone())
            .collect()
    }

    /// Number of bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Returns `true` when nothing has been bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Consumes the table into an immutable router.
    #[must_use]
    pub fn freeze(self) -> Router {
        let mut router = Router::new();
        for binding in self.bindings {
            for path in binding.pattern.axum_paths() {
                router = router.route(&path, binding.handler.clone());
            }
        }
        router
    }
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RouteTable")
            .field("patterns", &self.patterns())
            .field("stage", &self.stage)
            .finish()
    }
}
