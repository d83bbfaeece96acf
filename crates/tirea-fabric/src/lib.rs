//! Traced JSON structures that record every write as a replayable mutation.
//!
//! `tirea-fabric` wraps a JSON object or array into a traced root. Writes go
//! through [`TracedNode`] handles and each one is captured as a [`Mutation`]
//! addressed by its path from the root. Replaying the trace onto a copy of
//! the original value reproduces the live state, which is how replicas are
//! kept in sync.
//!
//! # Core Concepts
//!
//! - **TraceRoot**: a traced top-level value plus its trace log
//! - **TracedNode**: shared handle to a traced object or array
//! - **Mutation**: a serializable record of one write
//! - **Subscription**: a root embedded in another root forwards its records
//!   to the host, re-addressed under the embedding site
//! - **Suspension**: scoped switches that skip recording or skip writes
//!
//! # Replay
//!
//! ```text
//! State' = replay(State, Trace)
//! ```
//!
//! - `replay` is a pure function that never mutates its input
//! - A path that does not resolve means the replica diverged; resync it
//!   from a full snapshot
//!
//! # Quick Start
//!
//! ```
//! use tirea_fabric::{replay, TraceRoot};
//! use serde_json::json;
//!
//! let base = json!({"todos": [], "filter": "all"});
//! let root = TraceRoot::new(base.clone()).unwrap();
//!
//! let todos = root.value().node("todos").unwrap();
//! todos.push(json!({"title": "write docs", "done": false})).unwrap();
//! todos.node(0).unwrap().set("done", true).unwrap();
//! root.value().set("filter", "done").unwrap();
//!
//! let replica = replay(&base, &root.trace()).unwrap();
//! assert_eq!(replica, root.value().to_value());
//! ```
//!
//! # Composing roots
//!
//! ```
//! use tirea_fabric::{Input, TraceRoot};
//! use serde_json::json;
//!
//! let profile = TraceRoot::new(json!({"name": "ana"})).unwrap();
//! let session = TraceRoot::new(Input::object([
//!     ("profile", Input::from(profile.value())),
//!     ("ticks", Input::from(0)),
//! ]))
//! .unwrap();
//!
//! profile.value().set("name", "bo").unwrap();
//! assert_eq!(session.trace()[0].path.to_string(), "$.profile.name");
//! ```
//!
//! Records are plain data, so they can be shipped between peers inside an
//! [`Envelope`] and applied on the other side with [`apply_envelope`].

mod apply;
mod envelope;
mod error;
mod item;
mod metadata;
mod mutation;
mod node;
mod path;
mod root;
mod structure;
mod subscribers;
mod suspend;

// Core types
pub use apply::{apply_mutation, apply_trace, replay};
pub use error::{value_type_name, FabricError, FabricResult};
pub use mutation::{Mutation, MutationOp, TrackedMutation};
pub use path::{Key, Path};
pub use structure::{is_structure, Kind};

// Tracing
pub use item::{disable_tracing, enable_tracing, is_tracing_enabled, will_wrap, Input, Item};
pub use metadata::{get_metadata, get_path, set_metadata, top_of, Metadata};
pub use node::{is_traced, is_traced_node, is_traced_root, TracedNode};
pub use root::{trace_root, TraceRoot, TraceRootBuilder};
pub use subscribers::{
    add_subscriber, receivers, remove_subscriber, remove_subscription, subscription_sites,
};
pub use suspend::{is_recording, is_writing, without_recording, without_writes, Suspension};

// Transport
pub use envelope::{apply_envelope, is_envelope, Envelope, Message, ENVELOPE_TYPE};

// Re-export serde_json::Value for convenience
pub use serde_json::Value;
