//! Session Boundary
//!
//! A thin JSON protocol over one live document, for embedding the engine
//! behind a renderer or transport. Every request is a single JSON
//! message; every answer is a single JSON message. Malformed input never
//! panics the session, it answers with an error message.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dispatch::ActionRequest;
use crate::document::{ActionResponse, Core, Snapshot};
use crate::error::Warning;

/// Incoming messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Request {
    /// Dispatch an action against a component.
    Action(ActionRequest),
    /// Snapshot one component, or the whole document when unnamed.
    Snapshot {
        #[serde(default)]
        component: Option<String>,
    },
    /// Drain-free read of the accumulated diagnostics.
    Warnings,
}

/// Outgoing messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Response {
    Action(ActionResponse),
    Snapshot(Snapshot),
    Warnings { warnings: Vec<Warning> },
    Error { message: String },
}

/// One live document behind a serialized message boundary.
pub struct Session {
    core: Mutex<Core>,
}

impl Session {
    pub fn new(core: Core) -> Self {
        Self {
            core: Mutex::new(core),
        }
    }

    /// Handle one JSON message and answer with one JSON message.
    pub fn process(&self, message: &str) -> String {
        let response = match serde_json::from_str::<Request>(message) {
            Ok(request) => self.dispatch(request),
            Err(err) => {
                debug!(%err, "malformed session message");
                Response::Error {
                    message: format!("malformed request: {err}"),
                }
            }
        };
        serde_json::to_string(&response).unwrap_or_else(|err| {
            format!(r#"{{"kind":"error","message":"encode failure: {err}"}}"#)
        })
    }

    fn dispatch(&self, request: Request) -> Response {
        let mut core = self.core.lock();
        match request {
            Request::Action(action) => Response::Action(core.handle_action(&action)),
            Request::Snapshot { component: None } => Response::Snapshot(core.render_snapshot()),
            Request::Snapshot {
                component: Some(name),
            } => match core.component_snapshot(&name) {
                Some(snapshot) => {
                    let mut components = indexmap::IndexMap::new();
                    components.insert(name, snapshot);
                    Response::Snapshot(Snapshot { components })
                }
                None => Response::Error {
                    message: format!("unknown component `{name}`"),
                },
            },
            Request::Warnings => Response::Warnings {
                warnings: core.warnings().to_vec(),
            },
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
