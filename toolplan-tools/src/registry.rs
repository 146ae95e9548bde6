//! Append-only catalog of capability factories.
//!
//! Applications assemble a [`RegistryBuilder`] once at startup, calling each
//! capability module's `register` function, then freeze it. The frozen
//! [`CapabilityRegistry`] is immutable and shared by every executor built in
//! the process.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use toolplan_primitives::{CallContext, Config};
use tracing::debug;

use crate::descriptor::ToolDescriptor;
use crate::error::{ToolError, ToolResult};

/// Inputs available to a factory while an executor is being built.
#[derive(Clone, Debug)]
pub struct BuildContext {
    registry: Arc<CapabilityRegistry>,
    whitelist: Option<Vec<String>>,
    call: CallContext,
}

impl BuildContext {
    /// Creates a context for one executor build.
    #[must_use]
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        whitelist: Option<Vec<String>>,
        call: CallContext,
    ) -> Self {
        Self {
            registry,
            whitelist,
            call,
        }
    }

    /// Returns the registry the executor is built from.
    #[must_use]
    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    /// Returns the whitelist requested for the executor, if any.
    #[must_use]
    pub fn whitelist(&self) -> Option<&[String]> {
        self.whitelist.as_deref()
    }

    /// Returns the call context of the build.
    #[must_use]
    pub fn call(&self) -> &CallContext {
        &self.call
    }
}

/// Builds one capability from configuration.
///
/// Returning `Ok(None)` opts the capability out of the build, typically
/// because configuration disabled it.
pub trait CapabilityFactory: Send + Sync {
    /// Builds the descriptor.
    ///
    /// # Errors
    ///
    /// Any error aborts the whole executor build.
    fn build(&self, ctx: &BuildContext, config: &Config) -> ToolResult<Option<ToolDescriptor>>;
}

impl<F> CapabilityFactory for F
where
    F: Fn(&BuildContext, &Config) -> ToolResult<Option<ToolDescriptor>> + Send + Sync,
{
    fn build(&self, ctx: &BuildContext, config: &Config) -> ToolResult<Option<ToolDescriptor>> {
        (self)(ctx, config)
    }
}

struct Registration {
    label: String,
    factory: Arc<dyn CapabilityFactory>,
}

/// Collects capability factories before the registry is frozen.
#[derive(Default)]
pub struct RegistryBuilder {
    entries: Vec<Registration>,
}

impl fmt::Debug for RegistryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryBuilder")
            .field("labels", &self.labels())
            .finish()
    }
}

impl RegistryBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a factory under `label`. Order of registration is the order in
    /// which factories run during every build.
    pub fn register<F>(&mut self, label: impl Into<String>, factory: F) -> &mut Self
    where
        F: CapabilityFactory + 'static,
    {
        let label = label.into();
        debug!(capability = %label, "capability registered");
        self.entries.push(Registration {
            label,
            factory: Arc::new(factory),
        });
        self
    }

    fn labels(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.label.as_str()).collect()
    }

    /// Freezes the builder into an immutable registry.
    #[must_use]
    pub fn freeze(self) -> Arc<CapabilityRegistry> {
        Arc::new(CapabilityRegistry {
            entries: self.entries,
        })
    }
}

/// Immutable, ordered catalog of capability factories.
pub struct CapabilityRegistry {
    entries: Vec<Registration>,
}

impl fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("labels", &self.labels().collect::<Vec<_>>())
            .finish()
    }
}

impl CapabilityRegistry {
    /// Lists capability labels in registration order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.label.as_str())
    }

    /// Returns the number of registered factories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Runs every factory in registration order and collects the descriptors
    /// that did not opt out.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Config`] naming the offending capability when a
    /// factory fails or two descriptors share a name.
    pub fn build(&self, ctx: &BuildContext, config: &Config) -> ToolResult<Vec<ToolDescriptor>> {
        let mut built = Vec::with_capacity(self.entries.len());
        let mut names = HashSet::with_capacity(self.entries.len());

        for entry in &self.entries {
            let descriptor = match entry.factory.build(ctx, config) {
                Ok(Some(descriptor)) => descriptor,
                Ok(None) => {
                    debug!(capability = %entry.label, "capability opted out");
                    continue;
                }
                Err(err @ ToolError::Config { .. }) => return Err(err),
                Err(err) => return Err(ToolError::config(&entry.label, err.to_string())),
            };

            if !names.insert(descriptor.name().to_owned()) {
                return Err(ToolError::config(
                    &entry.label,
                    format!("tool name `{}` is already taken", descriptor.name()),
                ));
            }

            debug!(capability = %entry.label, tool = descriptor.name(), "capability built");
            built.push(descriptor);
        }

        Ok(built)
    }
}
