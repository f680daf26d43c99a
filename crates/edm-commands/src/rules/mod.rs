//! Integrity rules
//!
//! Rules are registered against an element during a transaction and run
//! once, in registration order, after the command batch has applied.
//! A rule may enqueue further commands, which may register further rules.

mod entity_set_mapping;
mod referential;
mod view_keys;

pub use entity_set_mapping::EnforceEntitySetMappingRules;
pub use referential::InferReferentialConstraints;
pub use view_keys::PropagateViewKeysToStorageModel;

use crate::context::CommandProcessorContext;
use crate::error::CommandResult;
use edm_artifact::ElementId;
use std::collections::BTreeSet;
use std::fmt::Debug;
use std::rc::Rc;

/// A deferred, batch-level consistency fixup
pub trait IntegrityRule: Debug {
    /// Rule name; registrations are de-duplicated by `(name, element)`
    fn name(&self) -> &'static str;

    /// Apply the rule to one registered element
    ///
    /// # Errors
    /// Any error aborts the transaction
    fn invoke(&self, cpc: &mut CommandProcessorContext<'_>, element: ElementId) -> CommandResult<()>;

    /// Register interest in `element` for the current transaction
    fn add_rule(cpc: &mut CommandProcessorContext<'_>, element: ElementId)
    where
        Self: Sized + Default + 'static,
    {
        cpc.add_rule(Self::default(), element);
    }
}

type Registration = (Rc<dyn IntegrityRule>, ElementId);

/// Pending rule registrations in registration order
#[derive(Debug, Default)]
pub(crate) struct RuleQueue {
    pending: Vec<Registration>,
    seen: BTreeSet<(&'static str, ElementId)>,
}

impl RuleQueue {
    /// Register; returns `false` if already pending
    pub(crate) fn push(&mut self, rule: Rc<dyn IntegrityRule>, element: ElementId) -> bool {
        if !self.seen.insert((rule.name(), element)) {
            return false;
        }
        self.pending.push((rule, element));
        true
    }

    /// Take every pending registration
    pub(crate) fn take(&mut self) -> Vec<Registration> {
        self.seen.clear();
        std::mem::take(&mut self.pending)
    }
}
