use thiserror::Error;

use super::table::RouteStage;

/// Errors raised while composing the HTTP router.
#[derive(Debug, Error)]
pub enum RouteCompositionError {
    /// A stage tried to bind a path another binding already claims.
    #[error("route {pattern} from the {stage} stage overlaps {existing} from the {existing_stage} stage")]
    Conflict {
        /// Pattern being bound.
        pattern: String,
        /// Stage attempting the binding.
        stage: RouteStage,
        /// Pattern already holding the path.
        existing: String,
        /// Stage that bound the existing pattern.
        existing_stage: RouteStage,
    },
    /// The pattern is not an absolute literal path.
    #[error("route pattern '{pattern}' must be an absolute path without wildcards")]
    InvalidPattern {
        /// Offending pattern.
        pattern: String,
    },
    /// A handler could not be constructed.
    #[error("failed to build handler for {route}: {reason}")]
    Handler {
        /// Route the handler serves.
        route: String,
        /// Why construction failed.
        reason: String,
        /// Underlying URL error.
        #[source]
        source: url::ParseError,
    },
}
