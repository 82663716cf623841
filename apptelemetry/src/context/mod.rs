//! Operation context and its ambient, call-chain scoped propagation.
//!
//! An [`OperationContext`] carries the correlation identifiers that link
//! telemetry items belonging to the same logical operation. Contexts are
//! immutable: entering a nested activity derives a new context instead of
//! changing the existing one.
//!
//! The *current* operation is tracked per thread and can be bound to a future
//! with [`OperationFutureExt::with_operation`], which makes the value follow
//! the logical call chain across `.await` points and into child tasks that are
//! spawned with it, while unrelated concurrent chains never observe it.
//! Outside such a scope (or an [`OperationContext::attach`] guard) the current
//! operation cannot be replaced in place.
//!
//! ```
//! use apptelemetry::OperationContext;
//!
//! let request = OperationContext::new("4bf92f3577b34da6").with_name("GET /orders");
//! let _guard = request.clone().attach();
//! assert_eq!(OperationContext::current(), Some(request));
//! ```
use crate::telemetry_warn;
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

mod future_ext;

pub use future_ext::{OperationFutureExt, WithOperation};

thread_local! {
    static CURRENT_OPERATION: RefCell<OperationStack> = RefCell::new(OperationStack::default());
}

/// Correlation identifiers of one logical operation.
///
/// All fields are optional. Only the fields that are set are written as
/// `ai.operation.*` tags when an item is serialized.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct OperationContext {
    id: Option<Arc<str>>,
    name: Option<Arc<str>>,
    parent_id: Option<Arc<str>>,
    synthetic_source: Option<Arc<str>>,
}

impl OperationContext {
    /// Creates a context for the operation with the given id.
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        OperationContext {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    /// Creates a context from all of its parts.
    pub fn from_parts(
        id: Option<&str>,
        name: Option<&str>,
        parent_id: Option<&str>,
        synthetic_source: Option<&str>,
    ) -> Self {
        OperationContext {
            id: id.map(Into::into),
            name: name.map(Into::into),
            parent_id: parent_id.map(Into::into),
            synthetic_source: synthetic_source.map(Into::into),
        }
    }

    /// Returns a copy of this context with the operation name set.
    pub fn with_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Returns a copy of this context with the parent id set.
    pub fn with_parent_id(mut self, parent_id: impl Into<Arc<str>>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Returns a copy of this context with the synthetic source set.
    pub fn with_synthetic_source(mut self, synthetic_source: impl Into<Arc<str>>) -> Self {
        self.synthetic_source = Some(synthetic_source.into());
        self
    }

    /// Derives the context of a nested activity.
    ///
    /// The nested context keeps the id, name and synthetic source of `self`
    /// and points at `parent_id`. `self` is left untouched.
    pub fn child(&self, parent_id: impl Into<Arc<str>>) -> Self {
        OperationContext {
            parent_id: Some(parent_id.into()),
            ..self.clone()
        }
    }

    /// The operation id.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// The operation name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The id of the parent activity.
    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    /// The synthetic source, e.g. the name of an availability test.
    pub fn synthetic_source(&self) -> Option<&str> {
        self.synthetic_source.as_deref()
    }

    /// Returns the operation that is current on this call chain, if any.
    pub fn current() -> Option<Self> {
        CURRENT_OPERATION.with(|stack| stack.borrow().current.clone())
    }

    /// Makes this context the current operation until the returned guard is
    /// dropped, at which point the previous operation is restored.
    ///
    /// Guards are `!Send` and must not be held across `.await` points; bind
    /// the context to the future with [`OperationFutureExt`] instead.
    pub fn attach(self) -> OperationGuard {
        attach_slot(Some(self))
    }
}

impl fmt::Debug for OperationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationContext")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("parent_id", &self.parent_id())
            .field("synthetic_source", &self.synthetic_source())
            .finish()
    }
}

fn attach_slot(operation: Option<OperationContext>) -> OperationGuard {
    let pos = CURRENT_OPERATION.with(|stack| stack.borrow_mut().push(operation));

    OperationGuard {
        pos,
        _marker: PhantomData,
    }
}

/// Replaces the current operation of the innermost scope in place and returns
/// the one it replaced.
///
/// The new value stays current until it is replaced again or the enclosing
/// scope ([`OperationContext::attach`] or a [`WithOperation`] poll) ends.
/// Returns `None` and changes nothing when no scope is active on this thread.
pub(crate) fn replace_current(
    operation: Option<OperationContext>,
) -> Option<Option<OperationContext>> {
    CURRENT_OPERATION.with(|stack| {
        let mut stack = stack.borrow_mut();
        if stack.stack.is_empty() {
            return None;
        }
        Some(std::mem::replace(&mut stack.current, operation))
    })
}

/// A guard that restores the previous operation when dropped.
#[derive(Debug)]
pub struct OperationGuard {
    pos: u16,
    // Relies on thread locals, so the guard must stay on its thread.
    _marker: PhantomData<*const ()>,
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        let pos = self.pos;
        if pos > OperationStack::BASE_POS && pos < OperationStack::MAX_POS {
            CURRENT_OPERATION.with(|stack| stack.borrow_mut().pop_pos(pos));
        }
    }
}

/// The operations attached to one thread.
///
/// `current` is the top of the stack. Entries below it are the values to
/// restore; an entry is `None` once its guard was dropped out of order.
struct OperationStack {
    current: Option<OperationContext>,
    stack: Vec<Option<Option<OperationContext>>>,
    _marker: PhantomData<*const ()>,
}

impl OperationStack {
    const BASE_POS: u16 = 0;
    const MAX_POS: u16 = u16::MAX;
    const INITIAL_CAPACITY: usize = 8;

    #[inline(always)]
    fn push(&mut self, operation: Option<OperationContext>) -> u16 {
        let next_pos = self.stack.len() + 1;
        if next_pos < OperationStack::MAX_POS.into() {
            let previous = std::mem::replace(&mut self.current, operation);
            self.stack.push(Some(previous));
            next_pos as u16
        } else {
            telemetry_warn!(
                name: "OperationContext.AttachFailed",
                message = format!(
                    "Too many attached operations. Max limit is {}. The current operation is unchanged.",
                    OperationStack::MAX_POS
                )
            );
            OperationStack::MAX_POS
        }
    }

    #[inline(always)]
    fn pop_pos(&mut self, pos: u16) {
        let len = self.stack.len() as u16;
        if pos == len {
            while let Some(None) = self.stack.last() {
                _ = self.stack.pop();
            }
            if let Some(Some(previous)) = self.stack.pop() {
                self.current = previous;
            }
        } else if pos < len {
            // Out of order drop, restored once the entries above it are gone.
            _ = self.stack[pos as usize].take();
        } else {
            telemetry_warn!(
                name: "OperationContext.PopOutOfBounds",
                position = pos,
                stack_length = len
            );
        }
    }
}

impl Default for OperationStack {
    fn default() -> Self {
        OperationStack {
            current: None,
            stack: Vec::with_capacity(OperationStack::INITIAL_CAPACITY),
            _marker: PhantomData,
        }
    }
}
