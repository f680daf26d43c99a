//! CommandProcessor - batching commands into one transaction
//!
//! State machine per transaction:
//! `collecting -> invoking commands -> running integrity rules -> committed`.
//! Any error aborts the transaction and, unless disabled, restores the
//! model to its state before the transaction began.

use crate::command::{Command, PendingCommand, Queued};
use crate::context::{CommandProcessorContext, Transaction, TransactionReport};
use crate::editing::EditingContext;
use crate::error::{CommandError, CommandResult};
use crate::ordering::{next_ready, PrereqGraph};
use crate::prereq::{CommandHandle, CommandId, OutputCell};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;
use tracing::{debug, info, warn};

/// Ordered batch of commands run as one transaction
#[derive(Debug)]
pub struct CommandProcessor {
    name: String,
    queue: VecDeque<Box<dyn PendingCommand>>,
    /// consumer -> explicit producers
    extra: BTreeMap<CommandId, Vec<CommandId>>,
    items: BTreeMap<String, Value>,
}

impl CommandProcessor {
    /// Create empty processor; `name` labels the transaction
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            queue: VecDeque::new(),
            extra: BTreeMap::new(),
            items: BTreeMap::new(),
        }
    }

    /// Seed a transaction-scoped context item
    #[must_use]
    pub fn with_item(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.items.insert(key.into(), value.into());
        self
    }

    /// Append a command to the batch
    pub fn enqueue<C: Command + 'static>(&mut self, command: C) -> CommandHandle<C::Output> {
        let id = CommandId::next();
        let cell = Rc::new(OutputCell::new());
        self.queue
            .push_back(Box::new(Queued::new(id, command, Rc::clone(&cell))));
        CommandHandle::new(id, cell)
    }

    /// Require `producer` to run before `consumer`
    pub fn add_prerequisite(&mut self, consumer: CommandId, producer: CommandId) {
        self.extra.entry(consumer).or_default().push(producer);
    }

    /// Number of queued commands
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if nothing is queued
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Run the batch as one transaction
    ///
    /// # Errors
    /// Returns the first error raised by a command, a rule or the commit
    /// check; the model is rolled back if the configuration asks for it
    pub fn invoke(self, editing: &mut EditingContext) -> CommandResult<TransactionReport> {
        let Self {
            name,
            mut queue,
            extra,
            items,
        } = self;

        let snapshot = editing.artifacts().snapshot();
        let rollback = editing.config().rollback_on_error;
        let mut cpc = CommandProcessorContext::new(editing, Transaction::new(name), items);
        info!(
            transaction = %cpc.transaction().id(),
            name = cpc.transaction().name(),
            commands = queue.len(),
            "transaction begin"
        );

        match run_transaction(&mut cpc, &mut queue, &extra) {
            Ok(()) => {
                let report = cpc.into_report();
                info!(
                    transaction = %report.id,
                    commands = report.commands.len(),
                    rules = report.rules.len(),
                    warnings = report.warnings.len(),
                    "transaction committed"
                );
                Ok(report)
            }
            Err(err) => {
                warn!(transaction = %cpc.transaction().id(), error = %err, "transaction failed");
                if rollback {
                    cpc.restore(snapshot);
                    info!(transaction = %cpc.transaction().id(), "transaction rolled back");
                }
                Err(err)
            }
        }
    }

    /// Run one command in its own transaction and return its output
    ///
    /// # Errors
    /// Returns the command's or the commit's error
    pub fn invoke_single_command<C: Command + 'static>(
        editing: &mut EditingContext,
        command: C,
    ) -> CommandResult<C::Output> {
        let name = command.name();
        let mut processor = Self::new(name);
        let handle = processor.enqueue(command);
        processor.invoke(editing)?;
        handle.output().ok_or_else(|| CommandError::ItemCreationFailure {
            command: name,
            what: "command produced no output".to_string(),
        })
    }
}

fn run_transaction(
    cpc: &mut CommandProcessorContext<'_>,
    queue: &mut VecDeque<Box<dyn PendingCommand>>,
    extra: &BTreeMap<CommandId, Vec<CommandId>>,
) -> CommandResult<()> {
    drain_queue(cpc, queue, extra)?;

    let max_passes = cpc.config().max_rule_passes;
    let mut passes = 0;
    loop {
        let rules = cpc.take_rules();
        if rules.is_empty() {
            break;
        }
        if passes == max_passes {
            return Err(CommandError::RuleCascadeLimit { passes });
        }
        passes += 1;
        debug!(pass = passes, count = rules.len(), "running integrity rules");
        for (rule, element) in rules {
            if !cpc.artifact().contains(element) {
                debug!(rule = rule.name(), %element, "rule target gone, skipped");
                continue;
            }
            debug!(rule = rule.name(), %element, "rule");
            rule.invoke(cpc, element)?;
            cpc.record_rule(rule.name(), element);
        }
        drain_queue(cpc, queue, extra)?;
    }

    let resolved = cpc.artifacts_mut().resolve_dirty();
    debug!(resolved, "dirty bindings resolved");
    if cpc.config().require_resolved_bindings {
        let unresolved = cpc.artifacts().unresolved_bindings();
        if !unresolved.is_empty() {
            return Err(CommandError::UnresolvedBindings(unresolved));
        }
    }
    Ok(())
}

fn drain_queue(
    cpc: &mut CommandProcessorContext<'_>,
    queue: &mut VecDeque<Box<dyn PendingCommand>>,
    extra: &BTreeMap<CommandId, Vec<CommandId>>,
) -> CommandResult<()> {
    queue.extend(cpc.take_deferred());
    PrereqGraph::build(queue, extra).check_acyclic()?;

    while !queue.is_empty() {
        let Some(position) = next_ready(queue, extra) else {
            return Err(CommandError::PrerequisiteCycle(
                queue.iter().map(|c| c.id()).collect(),
            ));
        };
        let Some(mut command) = queue.remove(position) else {
            break;
        };
        command.run(cpc)?;

        let deferred = cpc.take_deferred();
        if !deferred.is_empty() {
            queue.extend(deferred);
            PrereqGraph::build(queue, extra).check_acyclic()?;
        }
    }
    Ok(())
}
