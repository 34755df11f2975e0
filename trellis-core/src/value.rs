//! State Values
//!
//! Every state variable holds a `StateValue`: a small closed set of value
//! kinds that the engine moves between definitions, inverses, and the
//! render snapshot. The engine itself is value-kind agnostic; it only ever
//! asks a value two questions:
//!
//! 1. "Are you equal to this other value?" — used to short-circuit dirty
//!    propagation when a recomputation produced the same result.
//! 2. "Can you act as a number / text / index?" — used by the resolver for
//!    index expressions and by the attribute parser.
//!
//! Math expressions are opaque to the core. The `MathNode` type is the
//! collaborator boundary: the core passes math values through definitions
//! and inverses untouched, relying only on structural equality and
//! `evaluate_to_constant`.

use serde::{Deserialize, Serialize};

/// A tagged math expression tree.
///
/// This is the interface surface of the math-evaluation collaborator. The
/// engine never interprets these beyond equality and constant folding;
/// definitions that want structure use [`MathNode::tree`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "camelCase")]
pub enum MathNode {
    /// A numeric literal.
    Num { value: f64 },
    /// A free symbol.
    Sym { name: String },
    /// An operator applied to arguments.
    Apply { op: String, args: Vec<MathNode> },
}

impl MathNode {
    /// Structural equality. Two expressions are equal only if their trees
    /// match exactly; no simplification is attempted.
    pub fn equals(&self, other: &MathNode) -> bool {
        self == other
    }

    /// Try to fold the expression to a single constant.
    ///
    /// Supports the four arithmetic operators and negation. Anything with
    /// a free symbol returns `None`.
    pub fn evaluate_to_constant(&self) -> Option<f64> {
        match self {
            MathNode::Num { value } => Some(*value),
            MathNode::Sym { .. } => None,
            MathNode::Apply { op, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(arg.evaluate_to_constant()?);
                }
                match (op.as_str(), values.as_slice()) {
                    ("+", vs) => Some(vs.iter().sum()),
                    ("*", vs) => Some(vs.iter().product()),
                    ("-", [a]) => Some(-a),
                    ("-", [a, b]) => Some(a - b),
                    ("/", [a, b]) => Some(a / b),
                    _ => None,
                }
            }
        }
    }

    /// Access the expression tree itself.
    pub fn tree(&self) -> &MathNode {
        self
    }
}

/// The value of a state variable.
///
/// `Invalid` is the explicit sentinel a variable resolves to when its
/// definition cannot produce a value (dependency cycle, unresolved
/// reference, structural mismatch). It compares equal to itself so that an
/// already-invalid value does not keep repropagating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum StateValue {
    Number(f64),
    Text(String),
    Boolean(bool),
    Math(MathNode),
    List(Vec<StateValue>),
    /// A reference to another component, by full name.
    ComponentRef(String),
    Invalid,
}

impl StateValue {
    /// The equality predicate used for dirty-propagation short-circuiting.
    pub fn equals(&self, other: &StateValue) -> bool {
        self == other
    }

    /// Whether this is the invalid sentinel.
    pub fn is_invalid(&self) -> bool {
        matches!(self, StateValue::Invalid)
    }

    /// Coerce to a number, folding math expressions to constants.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            StateValue::Number(n) => Some(*n),
            StateValue::Math(m) => m.evaluate_to_constant(),
            _ => None,
        }
    }

    /// Coerce to text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            StateValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Coerce to a 1-based index as used in reference strings.
    ///
    /// Only positive integers qualify; anything else is `None`.
    pub fn as_index(&self) -> Option<usize> {
        let n = self.as_number()?;
        if n.fract() == 0.0 && n >= 1.0 && n <= usize::MAX as f64 {
            Some(n as usize)
        } else {
            None
        }
    }

    /// Extract an element of a list value, 0-based.
    ///
    /// Non-lists and out-of-range indices yield `Invalid`.
    pub fn list_element(&self, index: usize) -> StateValue {
        match self {
            StateValue::List(items) => {
                items.get(index).cloned().unwrap_or(StateValue::Invalid)
            }
            _ => StateValue::Invalid,
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
