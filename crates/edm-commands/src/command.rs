//! The command lifecycle
//!
//! Every edit runs `pre_invoke -> process_prereqs -> invoke_internal ->
//! post_invoke` inside a [`CommandProcessorContext`]. Only
//! `invoke_internal` is mandatory.

use crate::context::CommandProcessorContext;
use crate::error::CommandResult;
use crate::prereq::{CommandId, OutputCell};
use std::fmt::Debug;
use std::rc::Rc;
use tracing::{debug, debug_span};

/// A single model edit
pub trait Command: Debug {
    /// Value handed to subscribers and prerequisite consumers
    type Output: Clone + 'static;

    /// Command name for logs and reports
    fn name(&self) -> &'static str;

    /// Commands whose output this command consumes
    ///
    /// The processor runs them first when they share its queue.
    fn prerequisites(&self) -> Vec<CommandId> {
        Vec::new()
    }

    /// First hook; nothing has been resolved yet
    ///
    /// # Errors
    /// Any error aborts the transaction
    fn pre_invoke(&mut self, _cpc: &mut CommandProcessorContext<'_>) -> CommandResult<()> {
        Ok(())
    }

    /// Fill deferred arguments from prerequisite outputs and re-validate
    ///
    /// # Errors
    /// Any error aborts the transaction
    fn process_prereqs(&mut self, _cpc: &mut CommandProcessorContext<'_>) -> CommandResult<()> {
        Ok(())
    }

    /// Perform the mutation
    ///
    /// # Errors
    /// Must fail rather than proceed when required state is missing
    fn invoke_internal(&mut self, cpc: &mut CommandProcessorContext<'_>) -> CommandResult<Self::Output>;

    /// Schedule deferred consistency work (normalization, rules)
    ///
    /// # Errors
    /// Any error aborts the transaction
    fn post_invoke(
        &mut self,
        _cpc: &mut CommandProcessorContext<'_>,
        _output: &Self::Output,
    ) -> CommandResult<()> {
        Ok(())
    }
}

/// Run the four lifecycle phases of one command
pub(crate) fn run_lifecycle<C: Command>(
    command: &mut C,
    id: CommandId,
    cpc: &mut CommandProcessorContext<'_>,
) -> CommandResult<C::Output> {
    let span = debug_span!("command", command = command.name(), id = %id);
    let _guard = span.enter();

    debug!("pre_invoke");
    command.pre_invoke(cpc)?;
    debug!("process_prereqs");
    command.process_prereqs(cpc)?;
    debug!("invoke_internal");
    let output = command.invoke_internal(cpc)?;
    debug!("post_invoke");
    command.post_invoke(cpc, &output)?;

    cpc.record_completed(id, command.name());
    Ok(output)
}

/// Type-erased queued command
pub(crate) trait PendingCommand: Debug {
    fn id(&self) -> CommandId;
    fn name(&self) -> &'static str;
    fn prerequisites(&self) -> Vec<CommandId>;
    fn run(&mut self, cpc: &mut CommandProcessorContext<'_>) -> CommandResult<()>;
}

/// A command plus the cell its output is published into
pub(crate) struct Queued<C: Command> {
    id: CommandId,
    command: C,
    cell: Rc<OutputCell<C::Output>>,
}

impl<C: Command> Queued<C> {
    pub(crate) fn new(id: CommandId, command: C, cell: Rc<OutputCell<C::Output>>) -> Self {
        Self { id, command, cell }
    }
}

impl<C: Command> Debug for Queued<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queued")
            .field("id", &self.id)
            .field("command", &self.command)
            .finish()
    }
}

impl<C: Command> PendingCommand for Queued<C> {
    fn id(&self) -> CommandId {
        self.id
    }

    fn name(&self) -> &'static str {
        self.command.name()
    }

    fn prerequisites(&self) -> Vec<CommandId> {
        self.command.prerequisites()
    }

    fn run(&mut self, cpc: &mut CommandProcessorContext<'_>) -> CommandResult<()> {
        let output = run_lifecycle(&mut self.command, self.id, cpc)?;
        self.cell.publish(output);
        Ok(())
    }
}
