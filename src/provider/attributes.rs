//! Attribute providers contributing the attribute statement of issued
//! assertions.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::confirmation::Principal;
use crate::error::{Error, Result};
use crate::saml::Attribute;

/// Supplies the attributes of an assertion issued to `principal`.
pub trait AttributeProvider: Send + Sync + fmt::Debug {
    /// `claimed` are the attributes the requester asked for.
    fn attributes(&self, principal: &Principal, claimed: &[Attribute]) -> Vec<Attribute>;
}

/// Builds a provider from its configuration options.
pub type AttributeProviderFactory =
    fn(&HashMap<String, String>) -> Result<Arc<dyn AttributeProvider>>;

/// Echoes the claimed attributes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClaimsAttributeProvider;

impl AttributeProvider for ClaimsAttributeProvider {
    fn attributes(&self, _principal: &Principal, claimed: &[Attribute]) -> Vec<Attribute> {
        claimed.to_vec()
    }
}

/// Fixed attributes taken from configuration. Each option becomes one
/// attribute; comma separated values become multiple values.
#[derive(Debug, Clone, Default)]
pub struct StaticAttributeProvider {
    attributes: Vec<Attribute>,
}

impl StaticAttributeProvider {
    pub fn new(attributes: Vec<Attribute>) -> Self {
        Self { attributes }
    }

    pub fn from_options(options: &HashMap<String, String>) -> Self {
        let mut names: Vec<&String> = options.keys().collect();
        names.sort();
        let attributes = names
            .into_iter()
            .map(|name| {
                let values = options[name]
                    .split(',')
                    .map(str::trim)
                    .filter(|value| !value.is_empty());
                Attribute::new(name.as_str(), values)
            })
            .collect();
        Self { attributes }
    }
}

impl AttributeProvider for StaticAttributeProvider {
    fn attributes(&self, _principal: &Principal, _claimed: &[Attribute]) -> Vec<Attribute> {
        self.attributes.clone()
    }
}

/// Attribute provider factories by name.
#[derive(Clone)]
pub struct AttributeProviderRegistry {
    factories: HashMap<String, AttributeProviderFactory>,
}

impl AttributeProviderRegistry {
    pub const CLAIMS: &'static str = "claims";
    pub const STATIC: &'static str = "static";

    /// Registry without any provider.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, factory: AttributeProviderFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn create(
        &self,
        name: &str,
        options: &HashMap<String, String>,
    ) -> Result<Arc<dyn AttributeProvider>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::UnknownAttributeProvider(name.to_string()))?;
        factory(options)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for AttributeProviderRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Self::CLAIMS, |_| Ok(Arc::new(ClaimsAttributeProvider)));
        registry.register(Self::STATIC, |options| {
            Ok(Arc::new(StaticAttributeProvider::from_options(options)))
        });
        registry
    }
}

impl fmt::Debug for AttributeProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}
