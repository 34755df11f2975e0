//! Errors and Warnings
//!
//! The engine distinguishes two failure channels:
//!
//! - `CoreError`: truly unrecoverable construction failures. The only
//!   things that abort a document build are internal invariant violations
//!   (a component name collision) and an empty document.
//! - `Warning`: everything else. Unresolved references, malformed
//!   attributes, dependency cycles, and structural mismatches all degrade
//!   locally (empty replacement set, default value, invalid sentinel) and
//!   are surfaced as structured records on the session. The document
//!   always finishes building and stays interactive.
//!
//! A rejected inverse (an action targeting a derived variable with no
//! inverse definition) is deliberately neither: the request is dropped and
//! the caller sees an empty affected set. Feedback is a UI concern.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal construction failures.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Two components were given the same full name. Names must be unique
    /// across the whole live tree at every instant.
    #[error("component name `{name}` is already in use")]
    NameCollision { name: String },

    /// The document input had no root node.
    #[error("document has no root node")]
    MissingRoot,
}

/// Severity of a warning record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningLevel {
    Info,
    Warning,
    Error,
}

/// A source position in the original document, when known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

/// A structured, recoverable diagnostic surfaced per document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Warning {
    pub message: String,
    pub level: WarningLevel,
    pub position: Option<Position>,
}

impl Warning {
    fn new(message: String, level: WarningLevel) -> Self {
        Self {
            message,
            level,
            position: None,
        }
    }

    /// A reference string could not be resolved to a component or state
    /// variable. The referring site degrades to empty/invalid.
    pub fn unresolved_reference(reference: &str) -> Self {
        Self::new(
            format!("could not resolve reference `{reference}`"),
            WarningLevel::Warning,
        )
    }

    /// An attribute value could not be parsed; the default is used instead.
    pub fn invalid_attribute(component: &str, attribute: &str, raw: &str) -> Self {
        Self::new(
            format!("invalid value `{raw}` for attribute `{attribute}` on `{component}`"),
            WarningLevel::Warning,
        )
    }

    /// Freshening re-entered a variable before it finished computing, or a
    /// dynamic redeclaration would have closed a cycle. The variable
    /// resolves to the invalid sentinel.
    pub fn dependency_cycle(variable: &str) -> Self {
        Self::new(
            format!("dependency cycle detected while computing `{variable}`"),
            WarningLevel::Error,
        )
    }

    /// A composite source or template did not have the expected shape.
    pub fn structural_mismatch(message: impl Into<String>) -> Self {
        Self::new(message.into(), WarningLevel::Warning)
    }

    /// Attach a document position.
    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warning_constructors_set_levels() {
        assert_eq!(
            Warning::unresolved_reference("p.x").level,
            WarningLevel::Warning
        );
        assert_eq!(Warning::dependency_cycle("a").level, WarningLevel::Error);
    }

    #[test]
    fn warning_carries_position() {
        let warning = Warning::invalid_attribute("p", "x", "abc")
            .with_position(Position { line: 3, column: 7 });
        assert_eq!(warning.position, Some(Position { line: 3, column: 7 }));
    }

    #[test]
    fn core_error_messages() {
        let err = CoreError::NameCollision { name: "p".into() };
        assert_eq!(err.to_string(), "component name `p` is already in use");
    }
}
