//! Typed prerequisite plumbing
//!
//! A producer command enqueued on a processor yields a [`CommandHandle`].
//! Consumers take a [`Prereq`] from it (optionally projected with
//! [`Prereq::map`]) and hold it in a [`Deferred`] field. During
//! `process_prereqs` the consumer calls [`Deferred::resolve`], which copies
//! the producer's output in unless the caller supplied an explicit value.

use crate::error::{CommandError, CommandResult};
use std::cell::RefCell;
use std::fmt::{self, Debug, Display, Formatter};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_COMMAND_ID: AtomicU64 = AtomicU64::new(0);

/// Identity of an enqueued command
///
/// Ids are unique for the whole process, so a handle kept from an earlier
/// transaction never names a command of a later one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CommandId(u64);

impl CommandId {
    /// Wrap a raw id
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Allocate a fresh id
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_COMMAND_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Display for CommandId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "cmd#{}", self.0)
    }
}

type Subscriber<T> = Box<dyn FnMut(&T)>;

/// Slot a command's output is published into after `post_invoke`
pub(crate) struct OutputCell<T> {
    value: RefCell<Option<T>>,
    subscribers: RefCell<Vec<Subscriber<T>>>,
}

impl<T: Clone> OutputCell<T> {
    pub(crate) fn new() -> Self {
        Self {
            value: RefCell::new(None),
            subscribers: RefCell::new(Vec::new()),
        }
    }

    /// Store the output and notify subscribers (the post-invoke event)
    pub(crate) fn publish(&self, value: T) {
        *self.value.borrow_mut() = Some(value.clone());
        let mut subscribers = self.subscribers.borrow_mut();
        for subscriber in subscribers.iter_mut() {
            subscriber(&value);
        }
    }

    fn get(&self) -> Option<T> {
        self.value.borrow().clone()
    }
}

/// Handle to an enqueued command's future output
pub struct CommandHandle<T> {
    id: CommandId,
    cell: Rc<OutputCell<T>>,
}

impl<T: Clone + 'static> CommandHandle<T> {
    pub(crate) fn new(id: CommandId, cell: Rc<OutputCell<T>>) -> Self {
        Self { id, cell }
    }

    /// Command id
    #[inline]
    #[must_use]
    pub fn id(&self) -> CommandId {
        self.id
    }

    /// Output, once the command has run
    #[must_use]
    pub fn output(&self) -> Option<T> {
        self.cell.get()
    }

    /// Prerequisite reading this command's output
    #[must_use]
    pub fn prereq(&self) -> Prereq<T> {
        let cell = Rc::clone(&self.cell);
        Prereq {
            id: self.id,
            read: Rc::new(move || cell.get()),
        }
    }

    /// Run `f` with the output right after the command's `post_invoke`
    pub fn subscribe(&self, f: impl FnMut(&T) + 'static) {
        self.cell.subscribers.borrow_mut().push(Box::new(f));
    }
}

impl<T> Clone for CommandHandle<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            cell: Rc::clone(&self.cell),
        }
    }
}

impl<T> Debug for CommandHandle<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandHandle").field("id", &self.id).finish()
    }
}

/// Typed read access to a prerequisite's output
pub struct Prereq<T> {
    id: CommandId,
    read: Rc<dyn Fn() -> Option<T>>,
}

impl<T: 'static> Prereq<T> {
    /// Producing command
    #[inline]
    #[must_use]
    pub fn id(&self) -> CommandId {
        self.id
    }

    /// Read the output
    ///
    /// # Errors
    /// Returns [`CommandError::PrerequisiteNotSatisfied`] if the producer has
    /// not run yet
    pub fn get(&self) -> CommandResult<T> {
        (self.read)().ok_or(CommandError::PrerequisiteNotSatisfied { prereq: self.id })
    }

    /// Project the output (the late-binding action)
    #[must_use]
    pub fn map<U: 'static>(self, f: impl Fn(T) -> U + 'static) -> Prereq<U> {
        let read = self.read;
        Prereq {
            id: self.id,
            read: Rc::new(move || read().map(&f)),
        }
    }
}

impl<T> Clone for Prereq<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            read: Rc::clone(&self.read),
        }
    }
}

impl<T> Debug for Prereq<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prereq").field("id", &self.id).finish()
    }
}

/// A command argument known now or filled from a prerequisite later
///
/// An explicit value always wins over the prerequisite's output.
#[derive(Debug, Clone)]
pub struct Deferred<T> {
    value: Option<T>,
    source: Option<Prereq<T>>,
}

impl<T: Clone + 'static> Deferred<T> {
    /// Known value
    #[inline]
    #[must_use]
    pub fn value(value: T) -> Self {
        Self {
            value: Some(value),
            source: None,
        }
    }

    /// Filled from a prerequisite
    #[inline]
    #[must_use]
    pub fn from_prereq(prereq: Prereq<T>) -> Self {
        Self {
            value: None,
            source: Some(prereq),
        }
    }

    /// Neither value nor source
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self {
            value: None,
            source: None,
        }
    }

    /// Producing command, if any
    #[inline]
    #[must_use]
    pub fn prereq_id(&self) -> Option<CommandId> {
        self.source.as_ref().map(Prereq::id)
    }

    /// Current value
    #[inline]
    #[must_use]
    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Check if a value is present
    #[inline]
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }

    /// Copy the prerequisite's output in if no explicit value was given
    ///
    /// # Errors
    /// Returns error if a source exists but has not produced output
    pub fn resolve(&mut self) -> CommandResult<()> {
        if self.value.is_none() {
            if let Some(source) = &self.source {
                self.value = Some(source.get()?);
            }
        }
        Ok(())
    }

    /// Value required by `invoke_internal`
    ///
    /// # Errors
    /// Returns [`CommandError::PrerequisiteNotSatisfied`] when waiting on a
    /// producer, or a precondition error when nothing was ever supplied
    pub fn require(&self, what: &str) -> CommandResult<T> {
        match (&self.value, &self.source) {
            (Some(value), _) => Ok(value.clone()),
            (None, Some(source)) => Err(CommandError::PrerequisiteNotSatisfied {
                prereq: source.id(),
            }),
            (None, None) => Err(CommandError::precondition(format!("{what} was not supplied"))),
        }
    }
}

impl<T: Clone + 'static> From<T> for Deferred<T> {
    fn from(value: T) -> Self {
        Self::value(value)
    }
}

impl<T: Clone + 'static> From<Prereq<T>> for Deferred<T> {
    fn from(prereq: Prereq<T>) -> Self {
        Self::from_prereq(prereq)
    }
}

impl<T: Clone + 'static> From<&CommandHandle<T>> for Deferred<T> {
    fn from(handle: &CommandHandle<T>) -> Self {
        Self::from_prereq(handle.prereq())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn handle<T: Clone + 'static>(raw: u64) -> CommandHandle<T> {
        CommandHandle::new(CommandId::new(raw), Rc::new(OutputCell::new()))
    }

    #[test]
    fn prereq_reads_published_output() {
        let producer = handle::<u32>(1);
        let prereq = producer.prereq();
        assert!(matches!(
            prereq.get(),
            Err(CommandError::PrerequisiteNotSatisfied { .. })
        ));
        producer.cell.publish(7);
        assert_eq!(prereq.get().unwrap(), 7);
    }

    #[test]
    fn mapped_prereq_projects_output() {
        let producer = handle::<(u32, &'static str)>(1);
        let name = producer.prereq().map(|(_, name)| name);
        producer.cell.publish((1, "Customer"));
        assert_eq!(name.get().unwrap(), "Customer");
        assert_eq!(name.id(), producer.id());
    }

    #[test]
    fn explicit_value_wins_over_prereq() {
        let producer = handle::<u32>(1);
        let mut deferred = Deferred::value(3);
        deferred.source = Some(producer.prereq());
        producer.cell.publish(9);
        deferred.resolve().unwrap();
        assert_eq!(deferred.get(), Some(&3));
    }

    #[test]
    fn deferred_resolves_from_prereq() {
        let producer = handle::<u32>(1);
        let mut deferred: Deferred<u32> = (&producer).into();
        assert!(deferred.require("count").is_err());
        producer.cell.publish(9);
        deferred.resolve().unwrap();
        assert_eq!(deferred.require("count").unwrap(), 9);
    }

    #[test]
    fn empty_deferred_is_precondition_error() {
        let deferred = Deferred::<u32>::empty();
        assert!(matches!(
            deferred.require("count"),
            Err(CommandError::Precondition(_))
        ));
    }

    #[test]
    fn subscribers_fire_on_publish() {
        let producer = handle::<u32>(1);
        let seen = Rc::new(Cell::new(0));
        let sink = Rc::clone(&seen);
        producer.subscribe(move |v| sink.set(*v));
        producer.cell.publish(5);
        assert_eq!(seen.get(), 5);
    }
}
