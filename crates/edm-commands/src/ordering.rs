//! Prerequisite ordering
//!
//! Queued commands form a DAG (producer -> consumer). The processor
//! rejects cycles up front and then repeatedly runs the earliest-enqueued
//! command whose queued prerequisites have all completed, so unrelated
//! commands keep their enqueue order.

use crate::command::PendingCommand;
use crate::error::{CommandError, CommandResult};
use crate::prereq::CommandId;
use petgraph::algo::{is_cyclic_directed, tarjan_scc};
use petgraph::graphmap::DiGraphMap;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Dependency graph over queued commands
#[derive(Debug, Default)]
pub(crate) struct PrereqGraph {
    inner: DiGraphMap<CommandId, ()>,
}

impl PrereqGraph {
    /// Build from the queue plus explicit ordering edges
    pub(crate) fn build(
        queue: &VecDeque<Box<dyn PendingCommand>>,
        extra: &BTreeMap<CommandId, Vec<CommandId>>,
    ) -> Self {
        let mut inner = DiGraphMap::new();
        let queued: BTreeSet<CommandId> = queue.iter().map(|c| c.id()).collect();
        for command in queue {
            inner.add_node(command.id());
        }
        for command in queue {
            let consumer = command.id();
            let explicit = extra.get(&consumer).into_iter().flatten().copied();
            for producer in command.prerequisites().into_iter().chain(explicit) {
                if queued.contains(&producer) {
                    inner.add_edge(producer, consumer, ());
                }
            }
        }
        Self { inner }
    }

    /// Fail if any prerequisites form a cycle
    pub(crate) fn check_acyclic(&self) -> CommandResult<()> {
        let self_loop = self.inner.all_edges().any(|(a, b, _)| a == b);
        if !self_loop && !is_cyclic_directed(&self.inner) {
            return Ok(());
        }
        let mut members: Vec<CommandId> = tarjan_scc(&self.inner)
            .into_iter()
            .filter(|scc| scc.len() > 1 || scc.iter().any(|n| self.inner.contains_edge(*n, *n)))
            .flatten()
            .collect();
        members.sort();
        Err(CommandError::PrerequisiteCycle(members))
    }
}

/// Position of the first queued command whose queued prerequisites are done
pub(crate) fn next_ready(
    queue: &VecDeque<Box<dyn PendingCommand>>,
    extra: &BTreeMap<CommandId, Vec<CommandId>>,
) -> Option<usize> {
    let waiting: BTreeSet<CommandId> = queue.iter().map(|c| c.id()).collect();
    queue.iter().position(|command| {
        let explicit = extra.get(&command.id()).into_iter().flatten().copied();
        command
            .prerequisites()
            .into_iter()
            .chain(explicit)
            .all(|p| !waiting.contains(&p))
    })
}
