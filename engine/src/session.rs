//! Scoped control over how writes are logged.
//!
//! A [`Session`] belongs to one unit of work (a request, a job, a thread).
//! Scopes are opened with guard-returning methods and close when the guard is
//! dropped, on every exit path including panics:
//!
//! ```rust
//! use verlog_engine::Session;
//!
//! let session = Session::new();
//! {
//!     let _quiet = session.suppress_logging();
//!     assert!(session.flags().logging_suppressed);
//! }
//! assert!(!session.flags().logging_suppressed);
//! ```
//!
//! Closure forms ([`Session::without_logging`], [`Session::with_full_snapshot`],
//! [`Session::with_responsible`]) wrap the same guards.

use crate::ResponsibleId;
use std::cell::RefCell;

/// Flags in effect for the innermost open scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionFlags {
    /// Writes change the state but produce no log entry.
    pub logging_suppressed: bool,
    /// Every logged write is stored as a full snapshot.
    pub full_snapshot: bool,
    /// Actor attached to every logged write.
    pub responsible: Option<ResponsibleId>,
}

#[derive(Debug, Clone, Default)]
struct Frame {
    flags: SessionFlags,
    /// Responsible id that a nested transaction starts with.
    transaction_responsible: Option<ResponsibleId>,
    transaction: bool,
}

/// Per-unit-of-work stack of logging scopes.
///
/// Not `Sync`: each unit of work owns its own session, so concurrent sessions
/// never see each other's flags.
#[derive(Debug, Default)]
pub struct Session {
    frames: RefCell<Vec<Frame>>,
}

/// Closes its scope when dropped, restoring the enclosing scope's flags.
#[must_use = "the scope closes as soon as the guard is dropped"]
#[derive(Debug)]
pub struct SessionGuard<'a> {
    session: &'a Session,
    depth: usize,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        // truncating (rather than popping) also closes any scope opened
        // inside this one whose guard was leaked
        self.session.frames.borrow_mut().truncate(self.depth - 1);
    }
}

impl Session {
    /// Create a session with no scopes open.
    pub fn new() -> Self {
        Self::default()
    }

    /// Flags of the innermost open scope.
    pub fn flags(&self) -> SessionFlags {
        self.frames
            .borrow()
            .last()
            .map(|frame| frame.flags.clone())
            .unwrap_or_default()
    }

    /// Number of open scopes.
    pub fn depth(&self) -> usize {
        self.frames.borrow().len()
    }

    /// Whether any enclosing scope is a transaction.
    pub fn is_in_transaction(&self) -> bool {
        self.frames.borrow().iter().any(|frame| frame.transaction)
    }

    fn push(&self, configure: impl FnOnce(&mut Frame)) -> SessionGuard<'_> {
        let mut frames = self.frames.borrow_mut();
        let mut frame = frames.last().cloned().unwrap_or_default();
        frame.transaction = false;
        configure(&mut frame);
        frames.push(frame);
        SessionGuard {
            session: self,
            depth: frames.len(),
        }
    }

    /// Open a scope in which writes are not logged.
    pub fn suppress_logging(&self) -> SessionGuard<'_> {
        self.push(|frame| frame.flags.logging_suppressed = true)
    }

    /// Open a scope in which every logged write is a full snapshot.
    pub fn full_snapshot(&self) -> SessionGuard<'_> {
        self.push(|frame| frame.flags.full_snapshot = true)
    }

    /// Open a scope attributing writes to `id`.
    ///
    /// With `transactional` set the scope is itself a transaction and the id
    /// carries into every transaction opened inside it. Otherwise it only
    /// applies to the immediate scope: nested transactions start with the id
    /// of the closest transactional scope, if any.
    pub fn responsible(
        &self,
        id: impl Into<ResponsibleId>,
        transactional: bool,
    ) -> SessionGuard<'_> {
        let id = id.into();
        self.push(|frame| {
            frame.flags.responsible = Some(id.clone());
            if transactional {
                frame.transaction_responsible = Some(id);
                frame.transaction = true;
            }
        })
    }

    /// Open a transaction scope.
    pub fn begin_transaction(&self) -> SessionGuard<'_> {
        self.push(|frame| {
            frame.transaction = true;
            frame.flags.responsible = frame.transaction_responsible.clone();
        })
    }

    /// Run `f` with logging suppressed.
    pub fn without_logging<T>(&self, f: impl FnOnce() -> T) -> T {
        let _guard = self.suppress_logging();
        f()
    }

    /// Run `f` with every logged write stored as a full snapshot.
    pub fn with_full_snapshot<T>(&self, f: impl FnOnce() -> T) -> T {
        let _guard = self.full_snapshot();
        f()
    }

    /// Run `f` with writes attributed to `id`.
    pub fn with_responsible<T>(
        &self,
        id: impl Into<ResponsibleId>,
        transactional: bool,
        f: impl FnOnce() -> T,
    ) -> T {
        let _guard = self.responsible(id, transactional);
        f()
    }

    /// Run `f` inside a transaction scope.
    pub fn transaction<T>(&self, f: impl FnOnce() -> T) -> T {
        let _guard = self.begin_transaction();
        f()
    }
}
