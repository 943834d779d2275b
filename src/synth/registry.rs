use std::any::TypeId;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use crate::foundation::error::{BeatvizError, BeatvizResult};
use crate::synth::builtin;
use crate::synth::contract::FrameSynthesizer;

type MakeFn = dyn Fn() -> Box<dyn FrameSynthesizer> + Send + Sync;

/// Constructor for one synthesizer implementation.
///
/// Two factories are the same implementation when they were created from the same type
/// ([`SynthesizerFactory::of`]) or the same constructor function ([`SynthesizerFactory::from_fn`]).
#[derive(Clone)]
pub struct SynthesizerFactory {
    impl_id: TypeId,
    type_name: &'static str,
    make: Arc<MakeFn>,
}

impl SynthesizerFactory {
    /// Factory producing `S::default()`.
    pub fn of<S>() -> Self
    where
        S: FrameSynthesizer + Default + 'static,
    {
        Self {
            impl_id: TypeId::of::<S>(),
            type_name: std::any::type_name::<S>(),
            make: Arc::new(|| Box::new(S::default())),
        }
    }

    /// Factory backed by a constructor function or closure.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn() -> Box<dyn FrameSynthesizer> + Send + Sync + 'static,
    {
        Self {
            impl_id: TypeId::of::<F>(),
            type_name: std::any::type_name::<F>(),
            make: Arc::new(f),
        }
    }

    /// Build a fresh instance.
    pub fn make(&self) -> Box<dyn FrameSynthesizer> {
        (self.make)()
    }

    /// `true` when both factories construct the same implementation.
    pub fn same_impl(&self, other: &Self) -> bool {
        self.impl_id == other.impl_id
    }

    /// Rust type name of the implementation, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl std::fmt::Debug for SynthesizerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynthesizerFactory")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// Discovery phase: collects registrations before the registry is frozen.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entries: BTreeMap<String, SynthesizerFactory>,
}

impl RegistryBuilder {
    /// Empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pre-populated with the built-in synthesizers.
    pub fn with_builtins() -> Self {
        let mut b = Self::new();
        for (id, factory) in builtin::factories() {
            b.entries.insert(id.to_owned(), factory);
        }
        b
    }

    /// Register `factory` under `id`.
    ///
    /// Re-registering the same implementation is a no-op; binding an id to a different
    /// implementation is a [`BeatvizError::Conflict`].
    pub fn register(
        &mut self,
        id: impl Into<String>,
        factory: SynthesizerFactory,
    ) -> BeatvizResult<&mut Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(BeatvizError::validation("synthesizer id must be non-empty"));
        }
        match self.entries.get(&id) {
            Some(existing) if existing.same_impl(&factory) => {
                tracing::debug!(id = %id, "synthesizer already registered");
            }
            Some(existing) => {
                return Err(BeatvizError::conflict(format!(
                    "synthesizer '{id}' is already registered to {}, refusing {}",
                    existing.type_name(),
                    factory.type_name()
                )));
            }
            None => {
                self.entries.insert(id, factory);
            }
        }
        Ok(self)
    }

    /// Freeze into a read-only registry.
    pub fn build(self) -> SynthesizerRegistry {
        SynthesizerRegistry {
            entries: Arc::new(self.entries),
        }
    }
}

/// Read-only mapping from synthesizer id to factory. Cheap to clone.
#[derive(Clone, Debug, Default)]
pub struct SynthesizerRegistry {
    entries: Arc<BTreeMap<String, SynthesizerFactory>>,
}

impl SynthesizerRegistry {
    /// Registry holding only the built-ins.
    pub fn builtin() -> Self {
        RegistryBuilder::with_builtins().build()
    }

    /// Look up the factory for `id`.
    pub fn get(&self, id: &str) -> BeatvizResult<&SynthesizerFactory> {
        self.entries.get(id).ok_or_else(|| {
            BeatvizError::not_found(format!(
                "unknown synthesizer '{id}' (available: {})",
                self.ids().join(", ")
            ))
        })
    }

    /// Build a new instance of `id`.
    pub fn create(&self, id: &str) -> BeatvizResult<Box<dyn FrameSynthesizer>> {
        Ok(self.get(id)?.make())
    }

    /// Registered ids in sorted order.
    pub fn ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// `true` when `id` is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Number of registered synthesizers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

static GLOBAL: OnceLock<SynthesizerRegistry> = OnceLock::new();

/// Install the process-wide registry. Must happen before the first [`global`] call.
pub fn install_global(registry: SynthesizerRegistry) -> BeatvizResult<()> {
    GLOBAL.set(registry).map_err(|_| {
        BeatvizError::conflict("global synthesizer registry is already initialized")
    })
}

/// Process-wide registry; defaults to the built-ins when nothing was installed.
pub fn global() -> &'static SynthesizerRegistry {
    GLOBAL.get_or_init(SynthesizerRegistry::builtin)
}

#[cfg(test)]
#[path = "../../tests/unit/synth/registry.rs"]
mod tests;
