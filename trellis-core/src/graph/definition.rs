//! Variable Definitions
//!
//! A definition describes how a state variable gets its value:
//!
//! - `Essential`: an independent source of truth. The stored value *is*
//!   the value; actions set it directly.
//! - `Computed`: a pure function of declared dependencies. The dependency
//!   list is either static (fixed at creation) or dynamic (re-determined
//!   from "determinant" variables before every freshening pass).
//!
//! Dynamic dependencies are the explicit two-phase descriptor of the
//! engine: first the determinants are freshened, then `determine` maps
//! their values to the actual dependency sources, and only then are those
//! sources freshened and fed to `compute`. This is what lets a variable
//! say "my dependency is whichever item the picker currently points to".
//!
//! An inverse definition maps a requested new value, given the current
//! dependency values, back onto a set of (dependency slot, new value)
//! pairs. The dispatcher applies those recursively until only essential
//! variables remain.

use std::sync::Arc;

use crate::tree::ComponentId;
use crate::value::StateValue;

/// Pure compute function: fresh dependency values in, value out.
pub type ComputeFn = Arc<dyn Fn(&[StateValue]) -> StateValue + Send + Sync>;

/// Maps determinant values to the actual dependency source list.
pub type DetermineFn = Arc<dyn Fn(&[StateValue]) -> Vec<DependencySource> + Send + Sync>;

/// Inverse definition: (requested value, current dependency values) to a
/// set of writes on dependency slots.
pub type InverseFn = Arc<dyn Fn(&StateValue, &[StateValue]) -> InverseResult + Send + Sync>;

/// Result of running an inverse definition.
pub enum InverseResult {
    /// Write these values onto these dependency slots (by index into the
    /// resolved dependency list).
    Set(Vec<(usize, StateValue)>),
    /// The requested value cannot be mapped back; the action is rejected
    /// for this variable with no mutation.
    Rejected,
}

/// A declared dependency source, resolved to a concrete edge at
/// dependency-determination time.
#[derive(Clone)]
pub enum DependencySource {
    /// Another component's state variable, optionally one element of a
    /// list-valued variable.
    Variable {
        component: ComponentId,
        variable: String,
        index: Option<usize>,
    },
    /// A component attribute, captured as a constant text value at
    /// determination time.
    Attribute {
        component: ComponentId,
        attribute: String,
    },
}

impl DependencySource {
    /// Convenience constructor for a whole-variable dependency.
    pub fn variable(component: ComponentId, variable: impl Into<String>) -> Self {
        Self::Variable {
            component,
            variable: variable.into(),
            index: None,
        }
    }

    /// Convenience constructor for one element of a list variable.
    pub fn variable_element(
        component: ComponentId,
        variable: impl Into<String>,
        index: usize,
    ) -> Self {
        Self::Variable {
            component,
            variable: variable.into(),
            index: Some(index),
        }
    }
}

/// The dependency list of a computed definition.
#[derive(Clone)]
pub enum DependencySpec {
    /// Fixed at creation; resolved to edges on first freshening and
    /// re-resolved only if the producing variables disappear.
    Static(Vec<DependencySource>),
    /// Re-determined whenever a determinant changes.
    Dynamic {
        determinants: Vec<DependencySource>,
        determine: DetermineFn,
    },
}

/// How a state variable's value is defined.
#[derive(Clone)]
pub enum Definition {
    /// Independent source of truth, set directly by actions.
    Essential,
    /// Pure function of declared dependencies.
    Computed {
        sources: DependencySpec,
        compute: ComputeFn,
    },
}

impl Definition {
    /// A computed definition with a static dependency list.
    pub fn computed<F>(sources: Vec<DependencySource>, compute: F) -> Self
    where
        F: Fn(&[StateValue]) -> StateValue + Send + Sync + 'static,
    {
        Definition::Computed {
            sources: DependencySpec::Static(sources),
            compute: Arc::new(compute),
        }
    }

    /// A computed definition with a dynamic dependency descriptor.
    pub fn dynamic<D, F>(determinants: Vec<DependencySource>, determine: D, compute: F) -> Self
    where
        D: Fn(&[StateValue]) -> Vec<DependencySource> + Send + Sync + 'static,
        F: Fn(&[StateValue]) -> StateValue + Send + Sync + 'static,
    {
        Definition::Computed {
            sources: DependencySpec::Dynamic {
                determinants,
                determine: Arc::new(determine),
            },
            compute: Arc::new(compute),
        }
    }

    /// A 1:1 shadow of another component's state variable: the identity
    /// computation over a single dependency, with an identity inverse so
    /// that writes on the shadow propagate back to the source.
    ///
    /// Shadowing a single list element gives no inverse (there is no way
    /// to write through one element of a producer's list).
    pub fn shadow(
        component: ComponentId,
        variable: impl Into<String>,
        index: Option<usize>,
    ) -> (Self, Option<InverseFn>) {
        let definition = Definition::Computed {
            sources: DependencySpec::Static(vec![DependencySource::Variable {
                component,
                variable: variable.into(),
                index,
            }]),
            compute: Arc::new(|inputs: &[StateValue]| {
                inputs.first().cloned().unwrap_or(StateValue::Invalid)
            }),
        };
        let inverse: Option<InverseFn> = if index.is_none() {
            Some(Arc::new(|requested: &StateValue, _inputs: &[StateValue]| {
                InverseResult::Set(vec![(0, requested.clone())])
            }))
        } else {
            None
        };
        (definition, inverse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shadow_computes_identity() {
        let (definition, inverse) = Definition::shadow(ComponentId::new(), "x", None);
        let Definition::Computed { compute, .. } = definition else {
            panic!("shadow should be computed");
        };
        assert_eq!(
            compute(&[StateValue::Number(4.0)]),
            StateValue::Number(4.0)
        );
        assert_eq!(compute(&[]), StateValue::Invalid);
        assert!(inverse.is_some());
    }

    #[test]
    fn shadow_inverse_writes_back_to_slot_zero() {
        let (_, inverse) = Definition::shadow(ComponentId::new(), "x", None);
        let inverse = inverse.expect("whole-variable shadow has an inverse");
        match inverse(&StateValue::Number(9.0), &[StateValue::Number(1.0)]) {
            InverseResult::Set(pairs) => {
                assert_eq!(pairs, vec![(0, StateValue::Number(9.0))]);
            }
            InverseResult::Rejected => panic!("identity inverse should not reject"),
        }
    }

    #[test]
    fn element_shadow_has_no_inverse() {
        let (_, inverse) = Definition::shadow(ComponentId::new(), "items", Some(2));
        assert!(inverse.is_none());
    }
}
