//! CommandProcessorContext - the active transaction
//!
//! Carries the editing context, the transaction identity, a bag of
//! transaction-scoped items, and everything queued for later in the same
//! transaction: deferred commands, integrity rules and warnings.

use crate::command::{run_lifecycle, Command, PendingCommand, Queued};
use crate::config::ProcessorConfig;
use crate::editing::EditingContext;
use crate::error::{CommandError, CommandResult, UpdateWarning};
use crate::prereq::{CommandHandle, CommandId, OutputCell};
use crate::rules::{IntegrityRule, RuleQueue};
use edm_artifact::{Artifact, ElementId};
use edm_symbol::ArtifactSet;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Identity of one edit transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    id: Uuid,
    name: String,
}

impl Transaction {
    /// Start a new transaction
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
        }
    }

    /// Transaction id
    #[inline]
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Transaction name (shown as the undo label by hosts)
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Summary of a committed transaction
#[derive(Debug, Clone)]
pub struct TransactionReport {
    /// Transaction id
    pub id: Uuid,
    /// Transaction name
    pub name: String,
    /// Commands run, in execution order (nested commands included)
    pub commands: Vec<&'static str>,
    /// Rules run, in execution order
    pub rules: Vec<(&'static str, ElementId)>,
    /// Reconciliation warnings
    pub warnings: Vec<UpdateWarning>,
}

/// Context handed to every command phase and rule
pub struct CommandProcessorContext<'a> {
    editing: &'a mut EditingContext,
    transaction: Transaction,
    items: BTreeMap<String, Value>,
    deferred: Vec<Box<dyn PendingCommand>>,
    rules: RuleQueue,
    warnings: Vec<UpdateWarning>,
    depth: usize,
    completed: BTreeSet<CommandId>,
    commands_run: Vec<&'static str>,
    rules_run: Vec<(&'static str, ElementId)>,
}

impl<'a> CommandProcessorContext<'a> {
    pub(crate) fn new(
        editing: &'a mut EditingContext,
        transaction: Transaction,
        items: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            editing,
            transaction,
            items,
            deferred: Vec::new(),
            rules: RuleQueue::default(),
            warnings: Vec::new(),
            depth: 0,
            completed: BTreeSet::new(),
            commands_run: Vec::new(),
            rules_run: Vec::new(),
        }
    }

    /// Indexed model
    #[inline]
    #[must_use]
    pub fn artifacts(&self) -> &ArtifactSet {
        self.editing.artifacts()
    }

    /// Mutable indexed model
    #[inline]
    pub fn artifacts_mut(&mut self) -> &mut ArtifactSet {
        self.editing.artifacts_mut()
    }

    /// Raw model
    #[inline]
    #[must_use]
    pub fn artifact(&self) -> &Artifact {
        self.editing.artifact()
    }

    /// Configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ProcessorConfig {
        self.editing.config()
    }

    /// Active transaction
    #[inline]
    #[must_use]
    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    /// Transaction-scoped item
    #[must_use]
    pub fn item(&self, key: &str) -> Option<&Value> {
        self.items.get(key)
    }

    /// Set a transaction-scoped item, returning the previous value
    pub fn set_item(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.items.insert(key.into(), value.into())
    }

    /// Whether a command has completed in this transaction
    #[inline]
    #[must_use]
    pub fn is_completed(&self, id: CommandId) -> bool {
        self.completed.contains(&id)
    }

    /// Warnings recorded so far
    #[inline]
    #[must_use]
    pub fn warnings(&self) -> &[UpdateWarning] {
        &self.warnings
    }

    /// Record a reconciliation warning; the transaction continues
    pub fn warn(&mut self, warning: UpdateWarning) {
        warn!(transaction = %self.transaction.id, element = ?warning.element, "{}", warning.message);
        self.warnings.push(warning);
    }

    /// Run a nested command to completion right now
    ///
    /// Safe only when the caller is not iterating anything the nested
    /// command mutates; otherwise use [`Self::enqueue`].
    ///
    /// # Errors
    /// Returns the nested command's error, or
    /// [`CommandError::NestingTooDeep`]
    pub fn invoke_single_command<C: Command>(&mut self, mut command: C) -> CommandResult<C::Output> {
        if self.depth >= self.config().max_nesting_depth {
            return Err(CommandError::NestingTooDeep {
                depth: self.depth + 1,
            });
        }
        let id = CommandId::next();
        self.depth += 1;
        let result = run_lifecycle(&mut command, id, self);
        self.depth -= 1;
        result
    }

    /// Queue a command to run after the current one, in this transaction
    pub fn enqueue<C: Command + 'static>(&mut self, command: C) -> CommandHandle<C::Output> {
        let id = CommandId::next();
        let cell = Rc::new(OutputCell::new());
        debug!(command = command.name(), %id, "command deferred");
        self.deferred
            .push(Box::new(Queued::new(id, command, Rc::clone(&cell))));
        CommandHandle::new(id, cell)
    }

    /// Register an integrity rule against an element
    pub fn add_rule<R: IntegrityRule + 'static>(&mut self, rule: R, element: ElementId) {
        let name = rule.name();
        if self.rules.push(Rc::new(rule), element) {
            debug!(rule = name, %element, "rule registered");
        }
    }

    pub(crate) fn record_completed(&mut self, id: CommandId, name: &'static str) {
        self.completed.insert(id);
        self.commands_run.push(name);
    }

    pub(crate) fn record_rule(&mut self, name: &'static str, element: ElementId) {
        self.rules_run.push((name, element));
    }

    pub(crate) fn take_deferred(&mut self) -> Vec<Box<dyn PendingCommand>> {
        std::mem::take(&mut self.deferred)
    }

    pub(crate) fn take_rules(&mut self) -> Vec<(Rc<dyn IntegrityRule>, ElementId)> {
        self.rules.take()
    }

    pub(crate) fn restore(&mut self, snapshot: Artifact) {
        self.editing.artifacts_mut().restore(snapshot);
    }

    pub(crate) fn into_report(self) -> TransactionReport {
        TransactionReport {
            id: self.transaction.id,
            name: self.transaction.name,
            commands: self.commands_run,
            rules: self.rules_run,
            warnings: self.warnings,
        }
    }
}
