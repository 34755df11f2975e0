//! Trellis Core
//!
//! This crate provides the core engine for Trellis, a reactive
//! state-variable runtime for declarative interactive documents. It
//! implements:
//!
//! - A live component tree built from a document description
//! - A dependency graph of state variables with lazy, memoized
//!   freshening, dynamic dependencies, and cycle detection
//! - Composite expansion (`copy`, `collect`, `repeat`) with stable-key
//!   replacement reuse and linked/unlinked semantics
//! - Action dispatch with inverse definitions routing writes back to
//!   essential variables
//! - Deterministic variant sampling
//!
//! # Architecture
//!
//! - `tree`: the component arena and nodes
//! - `graph`: state variables, definitions, and the freshening engine
//! - `component`: the built-in component type registry
//! - `composite`: composite descriptors and the expansion engine
//! - `resolver`: reference strings to (component, variable, index)
//! - `dispatch`: action routing and inverse application
//! - `document`: the `Core` facade tying everything together
//! - `boundary`: a JSON session protocol over one live document
//!
//! # Example
//!
//! ```rust
//! use trellis_core::dispatch::ActionRequest;
//! use trellis_core::document::{Core, DocumentNode};
//! use trellis_core::value::StateValue;
//!
//! let doc: DocumentNode = serde_json::from_str(
//!     r#"{
//!         "componentType": "document",
//!         "name": "doc",
//!         "children": [
//!             {"componentType": "point", "name": "p",
//!              "attributes": {"x": "1", "y": "2"}}
//!         ]
//!     }"#,
//! )
//! .unwrap();
//!
//! let mut core = Core::build(&doc, 1).unwrap();
//! core.handle_action(&ActionRequest {
//!     component: "doc/p".into(),
//!     action: "movePoint".into(),
//!     args: [
//!         ("x".to_string(), StateValue::Number(3.0)),
//!         ("y".to_string(), StateValue::Number(4.0)),
//!     ]
//!     .into_iter()
//!     .collect(),
//! });
//!
//! let snapshot = core.component_snapshot("doc/p").unwrap();
//! assert_eq!(snapshot.state_values.get("x"), Some(&StateValue::Number(3.0)));
//! ```

pub mod boundary;
pub mod component;
pub mod composite;
pub mod dispatch;
pub mod document;
pub mod error;
pub mod graph;
pub mod resolver;
pub mod tree;
pub mod value;
pub mod variant;

pub use boundary::{Request, Response, Session};
pub use dispatch::ActionRequest;
pub use document::{ActionResponse, ComponentSnapshot, Core, DocumentNode, Snapshot};
pub use error::{CoreError, Warning, WarningLevel};
pub use value::StateValue;
