//! Scoped suspension of recording and of writes.
//!
//! Two independent flags, each scoped to the current thread (traced nodes
//! are `!Send`, so every node a thread can touch sees that thread's flags):
//!
//! - [`Suspension::Recording`]: writes still apply, but no record reaches
//!   any trace log.
//! - [`Suspension::Writes`]: records are still produced, but the underlying
//!   containers are left untouched.
//!
//! The flags are restored when the scope ends, including on panic. They are
//! NOT scoped across `.await`: holding a suspension across a yield point
//! leaks it to whatever else runs on the thread until the scope closes.

use std::cell::Cell;
use std::thread::LocalKey;

thread_local! {
    static RECORDING_SUSPENDED: Cell<bool> = const { Cell::new(false) };
    static WRITES_SUSPENDED: Cell<bool> = const { Cell::new(false) };
}

/// Which flag to suspend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Suspension {
    /// Suppress trace records.
    Recording,
    /// Suppress writes to the underlying containers.
    Writes,
}

impl Suspension {
    fn flag(self) -> &'static LocalKey<Cell<bool>> {
        match self {
            Suspension::Recording => &RECORDING_SUSPENDED,
            Suspension::Writes => &WRITES_SUSPENDED,
        }
    }

    /// Whether this suspension is currently in effect.
    #[inline]
    pub fn is_active(self) -> bool {
        self.flag().with(Cell::get)
    }

    /// Run `f` with this suspension in effect, then restore the previous
    /// state.
    pub fn scope<T>(self, f: impl FnOnce() -> T) -> T {
        let _guard = FlagGuard::set(self.flag());
        f()
    }
}

struct FlagGuard {
    flag: &'static LocalKey<Cell<bool>>,
    previous: bool,
}

impl FlagGuard {
    fn set(flag: &'static LocalKey<Cell<bool>>) -> Self {
        let previous = flag.with(|cell| cell.replace(true));
        Self { flag, previous }
    }
}

impl Drop for FlagGuard {
    fn drop(&mut self) {
        let previous = self.previous;
        self.flag.with(|cell| cell.set(previous));
    }
}

/// Whether mutations are currently recorded.
#[inline]
pub fn is_recording() -> bool {
    !Suspension::Recording.is_active()
}

/// Whether writes currently reach the underlying containers.
#[inline]
pub fn is_writing() -> bool {
    !Suspension::Writes.is_active()
}

/// Run `f` without recording any mutation.
///
/// ```
/// use tirea_fabric::{without_recording, TraceRoot};
/// use serde_json::json;
///
/// let root = TraceRoot::new(json!({"season": "winter"})).unwrap();
/// without_recording(|| root.value().set("season", json!("summer"))).unwrap();
///
/// assert!(root.trace().is_empty());
/// assert_eq!(root.value().to_value(), json!({"season": "summer"}));
/// ```
pub fn without_recording<T>(f: impl FnOnce() -> T) -> T {
    Suspension::Recording.scope(f)
}

/// Run `f` without applying writes; records are still produced.
///
/// ```
/// use tirea_fabric::{without_writes, TraceRoot};
/// use serde_json::json;
///
/// let root = TraceRoot::new(json!({"season": "winter"})).unwrap();
/// without_writes(|| root.value().set("season", json!("summer"))).unwrap();
///
/// assert_eq!(root.trace().len(), 1);
/// assert_eq!(root.value().to_value(), json!({"season": "winter"}));
/// ```
pub fn without_writes<T>(f: impl FnOnce() -> T) -> T {
    Suspension::Writes.scope(f)
}
