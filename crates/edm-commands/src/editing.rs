//! The editing context owned by the host

use crate::config::ProcessorConfig;
use edm_artifact::Artifact;
use edm_symbol::ArtifactSet;

/// The model being edited plus the settings transactions run with
///
/// Only one transaction runs against an editing context at a time; the
/// `&mut` borrow taken by [`crate::CommandProcessor::invoke`] enforces it.
#[derive(Debug)]
pub struct EditingContext {
    artifacts: ArtifactSet,
    config: ProcessorConfig,
}

impl EditingContext {
    /// Wrap an artifact with default configuration
    #[must_use]
    pub fn new(artifact: Artifact) -> Self {
        Self::with_config(artifact, ProcessorConfig::default())
    }

    /// Wrap an artifact with explicit configuration
    #[must_use]
    pub fn with_config(artifact: Artifact, config: ProcessorConfig) -> Self {
        Self {
            artifacts: ArtifactSet::new(artifact),
            config,
        }
    }

    /// Indexed model
    #[inline]
    #[must_use]
    pub fn artifacts(&self) -> &ArtifactSet {
        &self.artifacts
    }

    #[inline]
    pub(crate) fn artifacts_mut(&mut self) -> &mut ArtifactSet {
        &mut self.artifacts
    }

    /// Raw model
    #[inline]
    #[must_use]
    pub fn artifact(&self) -> &Artifact {
        self.artifacts.artifact()
    }

    /// Configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Replace configuration for later transactions
    pub fn set_config(&mut self, config: ProcessorConfig) {
        self.config = config;
    }
}
