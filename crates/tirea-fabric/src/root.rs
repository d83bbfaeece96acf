//! Traced roots and their trace logs.

use crate::error::{value_type_name, FabricError, FabricResult};
use crate::item::Input;
use crate::mutation::Mutation;
use crate::node::{build_node, decompose, TracedNode};
use crate::subscribers::{self, Subscription};
use crate::suspend::without_recording;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, trace};

/// Receives every record delivered to a root, its own and forwarded ones.
pub(crate) trait TraceSink {
    fn record(&self, mutation: &Mutation);
}

/// Append-only log of transformed records.
struct TraceLog<R> {
    label: Option<String>,
    records: RefCell<Vec<R>>,
    /// Records that arrived while `records` was borrowed by a reader.
    pending: RefCell<Vec<R>>,
    transform: Box<dyn Fn(Mutation) -> R>,
}

impl<R> TraceLog<R> {
    /// Move queued records into the log, if it is not borrowed.
    fn flush(&self) {
        let Ok(mut records) = self.records.try_borrow_mut() else {
            return;
        };
        records.append(&mut self.pending.borrow_mut());
    }
}

impl<R> TraceSink for TraceLog<R> {
    fn record(&self, mutation: &Mutation) {
        trace!(
            root = self.label.as_deref().unwrap_or("-"),
            path = %mutation.path,
            op = mutation.op.name(),
            "record"
        );
        // Transform runs before the log is borrowed.
        let record = (self.transform)(mutation.clone());
        self.pending.borrow_mut().push(record);
        self.flush();
    }
}

/// Root-only state hung off the root node.
pub(crate) struct RootState {
    sink: Rc<dyn TraceSink>,
    pub(crate) subscribers: RefCell<Vec<Subscription>>,
}

impl RootState {
    /// Log `mutation` and forward it to receivers.
    pub(crate) fn deliver(&self, mutation: Mutation) {
        self.sink.record(&mutation);
        subscribers::fan_out(self, &mutation);
    }
}

/// A traced root: the top-level traced value plus its trace log.
///
/// `R` is the record type stored in the log; it is [`Mutation`] unless the
/// root was built with a transform.
///
/// ```
/// use tirea_fabric::{Input, TraceRoot};
/// use serde_json::json;
///
/// let child = TraceRoot::new(json!({"name": "ana"})).unwrap();
/// let parent = TraceRoot::new(Input::object([("user", child.value())])).unwrap();
///
/// child.value().set("name", "bo").unwrap();
///
/// assert_eq!(child.trace()[0].path.to_string(), "$.name");
/// assert_eq!(parent.trace()[0].path.to_string(), "$.user.name");
/// ```
pub struct TraceRoot<R = Mutation> {
    node: TracedNode,
    log: Rc<TraceLog<R>>,
}

impl TraceRoot<Mutation> {
    /// Trace `value`, recording plain [`Mutation`]s.
    ///
    /// Fails with [`FabricError::NotAStructure`] for leaves and
    /// [`FabricError::DisabledTracing`] for untraced values. A traced node
    /// passed as the seed is copied; roots embedded in the seed are shared
    /// and subscribed.
    pub fn new(value: impl Into<Input>) -> FabricResult<Self> {
        Self::builder().build(value)
    }

    pub fn builder() -> TraceRootBuilder<Mutation> {
        TraceRootBuilder {
            label: None,
            transform: Box::new(|mutation| mutation),
        }
    }
}

impl<R: 'static> TraceRoot<R> {
    /// Trace `value`, storing `transform(record)` for every record.
    pub fn with_transform(
        value: impl Into<Input>,
        transform: impl Fn(Mutation) -> R + 'static,
    ) -> FabricResult<Self> {
        TraceRoot::<Mutation>::builder()
            .transform(transform)
            .build(value)
    }

    /// The traced value.
    #[inline]
    pub fn value(&self) -> &TracedNode {
        &self.node
    }

    pub fn label(&self) -> Option<&str> {
        self.log.label.as_deref()
    }

    /// Copy of the trace log.
    pub fn trace(&self) -> Vec<R>
    where
        R: Clone,
    {
        self.log.records.borrow().clone()
    }

    /// Borrow the trace log for the duration of `f`.
    ///
    /// Writes made inside `f` that record into this root are queued and
    /// appended once `f` returns, so `f` sees the log as it was on entry.
    /// `f` must not call [`set_trace`](Self::set_trace),
    /// [`clear_trace`](Self::clear_trace) or
    /// [`take_trace`](Self::take_trace) on this root.
    pub fn with_trace<T>(&self, f: impl FnOnce(&[R]) -> T) -> T {
        let out = f(&self.log.records.borrow());
        self.log.flush();
        out
    }

    pub fn trace_len(&self) -> usize {
        self.log.records.borrow().len()
    }

    /// Replace the trace log.
    pub fn set_trace(&self, trace: Vec<R>) {
        *self.log.records.borrow_mut() = trace;
    }

    pub fn clear_trace(&self) {
        self.log.records.borrow_mut().clear();
    }

    /// Drain the trace log, leaving it empty.
    pub fn take_trace(&self) -> Vec<R> {
        std::mem::take(&mut *self.log.records.borrow_mut())
    }

    /// Stop receiving records from `sender`, wherever it is embedded.
    pub fn unsubscribe_from(&self, sender: &TracedNode) {
        subscribers::remove_subscription(sender, &self.node);
    }
}

impl<R> Clone for TraceRoot<R> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
            log: self.log.clone(),
        }
    }
}

impl<R> fmt::Debug for TraceRoot<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceRoot")
            .field("label", &self.log.label)
            .field("node", &self.node)
            .field("records", &self.log.records.borrow().len())
            .finish()
    }
}

/// Builder for [`TraceRoot`].
///
/// ```
/// use tirea_fabric::{TraceRoot, TrackedMutation};
/// use serde_json::json;
///
/// let root = TraceRoot::builder()
///     .label("session")
///     .transform(|m| TrackedMutation::new(m).with_source("local"))
///     .build(json!([]))
///     .unwrap();
///
/// root.value().push(1).unwrap();
/// assert_eq!(root.trace()[0].source.as_deref(), Some("local"));
/// ```
pub struct TraceRootBuilder<R = Mutation> {
    label: Option<String>,
    transform: Box<dyn Fn(Mutation) -> R>,
}

impl<R: 'static> TraceRootBuilder<R> {
    /// Name used in log output.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Map every record before it is stored. Applies to forwarded records
    /// too; a sender's transform never applies to its receivers' logs.
    /// Receivers forward the untransformed record onward, so each root
    /// along a chain sees only its own transform.
    pub fn transform<S: 'static>(
        self,
        transform: impl Fn(Mutation) -> S + 'static,
    ) -> TraceRootBuilder<S> {
        TraceRootBuilder {
            label: self.label,
            transform: Box::new(transform),
        }
    }

    pub fn build(self, value: impl Into<Input>) -> FabricResult<TraceRoot<R>> {
        let (kind, children) = match value.into() {
            Input::Untraced(_) => return Err(FabricError::DisabledTracing),
            input => decompose(input).map_err(|leaf| FabricError::NotAStructure {
                found: value_type_name(&leaf.to_value()),
            })?,
        };

        let log = Rc::new(TraceLog {
            label: self.label,
            records: RefCell::new(Vec::new()),
            pending: RefCell::new(Vec::new()),
            transform: self.transform,
        });
        let state = Rc::new(RootState {
            sink: log.clone(),
            subscribers: RefCell::new(Vec::new()),
        });
        let node = without_recording(|| build_node(kind, None, Some(state), children));
        debug!(
            root = log.label.as_deref().unwrap_or("-"),
            kind = %kind,
            "traced root created"
        );
        Ok(TraceRoot { node, log })
    }
}

/// Trace `value` with default settings. Same as [`TraceRoot::new`].
pub fn trace_root(value: impl Into<Input>) -> FabricResult<TraceRoot> {
    TraceRoot::new(value)
}
