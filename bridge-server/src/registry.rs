//! Registry of attached context providers
//!
//! Providers are kept in touch order, most recent last. Two active selections
//! are maintained:
//! - `any`: the most recently registered or promoted provider
//! - `program`: the most recently registered or promoted provider that has
//!   program context
//!
//! Promoting a provider without program context never disturbs the `program`
//! selection. All mutations and reads go through a single lock, so concurrent
//! registrations are ordered by lock acquisition.

use crate::provider::{ProviderRef, same_provider};
use hostbridge_protocol::{ContextRequirement, ContextSummary};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

#[derive(Default)]
struct RegistryInner {
    /// Oldest first; the last entry is the most recently touched provider
    history: Vec<ProviderRef>,
    active_any: Option<ProviderRef>,
    active_program: Option<ProviderRef>,
}

impl RegistryInner {
    fn position(&self, provider: &ProviderRef) -> Option<usize> {
        self.history.iter().position(|p| same_provider(p, provider))
    }

    fn most_recent_eligible(&self) -> Option<ProviderRef> {
        self.history
            .iter()
            .rev()
            .find(|p| p.has_program_context())
            .cloned()
    }

    /// Move `provider` to the most-recent slot and select it
    fn touch(&mut self, provider: &ProviderRef) {
        if let Some(index) = self.position(provider) {
            self.history.remove(index);
        }
        self.history.push(provider.clone());

        self.active_any = Some(provider.clone());
        if provider.has_program_context() {
            self.active_program = Some(provider.clone());
        }
    }

    /// Program selection, re-validated against the provider's current state
    fn current_program(&mut self) -> Option<ProviderRef> {
        let still_eligible = self
            .active_program
            .as_ref()
            .is_some_and(|p| p.has_program_context());

        if !still_eligible {
            let replacement = self.most_recent_eligible();
            if let Some(stale) = &self.active_program {
                debug!(
                    "Provider '{}' lost program context, selecting {:?}",
                    stale.name(),
                    replacement.as_ref().map(|p| p.name().to_string())
                );
            }
            self.active_program = replacement;
        }

        self.active_program.clone()
    }
}

/// Tracks attached providers and which one serves each capability class
#[derive(Default)]
pub struct ContextRegistry {
    inner: Mutex<RegistryInner>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or re-insert `provider` as the most recent entry
    ///
    /// Re-registering an already known provider only moves it; it is never
    /// listed twice.
    pub fn register(&self, provider: ProviderRef) {
        let mut inner = self.lock();
        inner.touch(&provider);
        info!(
            "Registered provider '{}' (program context: {}, {} registered)",
            provider.name(),
            provider.has_program_context(),
            inner.history.len()
        );
    }

    /// Remove `provider`, handing its active selections to the next most
    /// recent eligible provider. Returns whether it was registered.
    pub fn unregister(&self, provider: &ProviderRef) -> bool {
        let mut inner = self.lock();

        let Some(index) = inner.position(provider) else {
            debug!("Provider '{}' was not registered", provider.name());
            return false;
        };
        inner.history.remove(index);

        if inner
            .active_any
            .as_ref()
            .is_some_and(|p| same_provider(p, provider))
        {
            inner.active_any = inner.history.last().cloned();
        }
        if inner
            .active_program
            .as_ref()
            .is_some_and(|p| same_provider(p, provider))
        {
            inner.active_program = inner.most_recent_eligible();
        }

        info!(
            "Unregistered provider '{}' ({} remaining)",
            provider.name(),
            inner.history.len()
        );
        true
    }

    /// Make an already registered provider the most recent one
    ///
    /// Returns `false`, changing nothing, for an unknown provider.
    pub fn promote(&self, provider: &ProviderRef) -> bool {
        let mut inner = self.lock();

        if inner.position(provider).is_none() {
            debug!(
                "Ignoring promotion of unregistered provider '{}'",
                provider.name()
            );
            return false;
        }

        inner.touch(provider);
        debug!("Promoted provider '{}'", provider.name());
        true
    }

    /// Active provider for the requested capability class
    pub fn active(&self, requires_program: bool) -> Option<ProviderRef> {
        let mut inner = self.lock();
        if requires_program {
            inner.current_program()
        } else {
            inner.active_any.clone()
        }
    }

    /// Active provider for a whitelist requirement
    pub fn active_for(&self, requirement: ContextRequirement) -> Option<ProviderRef> {
        self.active(requirement.requires_program())
    }

    pub fn contains(&self, provider: &ProviderRef) -> bool {
        self.lock().position(provider).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().history.is_empty()
    }

    /// Snapshot for health reporting and events
    pub fn summary(&self) -> ContextSummary {
        let mut inner = self.lock();
        let program_active = inner.current_program().is_some();
        ContextSummary {
            registered_providers: inner.history.len(),
            any_active: inner.active_any.is_some(),
            program_active,
            active_provider: inner.active_any.as_ref().map(|p| p.name().to_string()),
        }
    }
}
