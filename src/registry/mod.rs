//! Catalog of provider types and cache of live adapter instances.
//!
//! One [`ProviderRegistry`] is built at process start and handed to whatever
//! needs adapters (webhook router, sync scheduler, health endpoint). All methods
//! take `&self`, so the registry can be shared behind an `Arc`.

mod builtin;

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock};

use futures::future::join_all;
use futures::FutureExt;
use indexmap::IndexMap;
use log::{debug, info, warn};
use serde::Serialize;

use crate::config::{process_env, EnvLookup, ProviderConfig};
use crate::error::{CILensError, Result};
use crate::models::ProviderMetrics;
use crate::providers::CiProvider;

pub use builtin::{github_registration, gitlab_registration, jenkins_registration};

pub type ProviderFactory =
    Arc<dyn Fn(&ProviderConfig) -> Result<Arc<dyn CiProvider>> + Send + Sync>;

/// Semantic configuration check. Returns one message per problem.
pub type ConfigValidator = Arc<dyn Fn(&ProviderConfig) -> Vec<String> + Send + Sync>;

/// Derives a configuration from environment variables, `None` when a mandatory
/// variable is absent.
pub type EnvConfigLoader = fn(EnvLookup<'_>) -> Option<ProviderConfig>;

/// Everything the registry knows about one provider type.
#[derive(Clone)]
pub struct ProviderRegistration {
    provider_type: String,
    display_name: String,
    factory: ProviderFactory,
    validator: ConfigValidator,
    required_fields: &'static [&'static str],
    optional_fields: &'static [&'static str],
    supported_features: &'static [&'static str],
    env_config: Option<EnvConfigLoader>,
}

impl ProviderRegistration {
    pub fn new<F>(provider_type: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&ProviderConfig) -> Result<Arc<dyn CiProvider>> + Send + Sync + 'static,
    {
        let provider_type = provider_type.into();
        Self {
            display_name: provider_type.clone(),
            provider_type,
            factory: Arc::new(factory),
            validator: Arc::new(|_| Vec::new()),
            required_fields: &[],
            optional_fields: &[],
            supported_features: &[],
            env_config: None,
        }
    }

    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    #[must_use]
    pub fn with_validator<V>(mut self, validator: V) -> Self
    where
        V: Fn(&ProviderConfig) -> Vec<String> + Send + Sync + 'static,
    {
        self.validator = Arc::new(validator);
        self
    }

    #[must_use]
    pub fn with_required_fields(mut self, fields: &'static [&'static str]) -> Self {
        self.required_fields = fields;
        self
    }

    #[must_use]
    pub fn with_optional_fields(mut self, fields: &'static [&'static str]) -> Self {
        self.optional_fields = fields;
        self
    }

    #[must_use]
    pub fn with_supported_features(mut self, features: &'static [&'static str]) -> Self {
        self.supported_features = features;
        self
    }

    #[must_use]
    pub fn with_env_config(mut self, loader: EnvConfigLoader) -> Self {
        self.env_config = Some(loader);
        self
    }

    pub fn provider_type(&self) -> &str {
        &self.provider_type
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn required_fields(&self) -> &'static [&'static str] {
        self.required_fields
    }

    pub fn optional_fields(&self) -> &'static [&'static str] {
        self.optional_fields
    }

    pub fn supported_features(&self) -> &'static [&'static str] {
        self.supported_features
    }

    fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            provider_type: self.provider_type.clone(),
            display_name: self.display_name.clone(),
            required_fields: self.required_fields.to_vec(),
            optional_fields: self.optional_fields.to_vec(),
            supported_features: self.supported_features.to_vec(),
            env_config: self.env_config.is_some(),
        }
    }
}

impl fmt::Debug for ProviderRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistration")
            .field("provider_type", &self.provider_type)
            .field("required_fields", &self.required_fields)
            .field("supported_features", &self.supported_features)
            .finish_non_exhaustive()
    }
}

/// Introspection view of a registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderDescriptor {
    pub provider_type: String,
    pub display_name: String,
    pub required_fields: Vec<&'static str>,
    pub optional_fields: Vec<&'static str>,
    pub supported_features: Vec<&'static str>,
    /// Whether the provider can be configured from environment variables.
    pub env_config: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceHealth {
    pub instance_id: String,
    pub provider_type: String,
    pub healthy: bool,
    /// Absent when the check itself blew up.
    pub metrics: Option<ProviderMetrics>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderStatistics {
    pub registered_providers: usize,
    pub active_instances: usize,
    pub instances_by_type: IndexMap<String, usize>,
}

struct CachedInstance {
    provider_type: String,
    provider: Arc<dyn CiProvider>,
}

#[derive(Default)]
pub struct ProviderRegistry {
    registrations: RwLock<IndexMap<String, ProviderRegistration>>,
    instances: RwLock<IndexMap<String, CachedInstance>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the GitHub, GitLab and Jenkins adapters registered.
    pub fn with_builtin_providers() -> Self {
        let registry = Self::new();
        registry.register_provider(github_registration());
        registry.register_provider(gitlab_registration());
        registry.register_provider(jenkins_registration());
        registry
    }

    /// Adds a provider type. Registering the same type again replaces the
    /// previous registration.
    pub fn register_provider(&self, registration: ProviderRegistration) {
        let provider_type = registration.provider_type.clone();
        let mut registrations = self
            .registrations
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if registrations.insert(provider_type.clone(), registration).is_some() {
            warn!("Provider '{provider_type}' was already registered; replacing it");
        } else {
            debug!("Registered provider '{provider_type}'");
        }
    }

    pub fn is_registered(&self, provider_type: &str) -> bool {
        self.registrations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(provider_type)
    }

    /// Descriptors of every registration, in registration order.
    pub fn registered_providers(&self) -> Vec<ProviderDescriptor> {
        self.registrations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(ProviderRegistration::descriptor)
            .collect()
    }

    fn registration(&self, provider_type: &str) -> Result<ProviderRegistration> {
        self.registrations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(provider_type)
            .cloned()
            .ok_or_else(|| CILensError::UnregisteredProvider(provider_type.to_string()))
    }

    /// Checks required fields first; the provider's own validator only runs
    /// once they are all present.
    ///
    /// # Errors
    ///
    /// Returns `UnregisteredProvider` for unknown types. Problems with the
    /// configuration itself are reported in the result, not as errors.
    pub fn validate_provider_config(
        &self,
        provider_type: &str,
        config: &ProviderConfig,
    ) -> Result<ValidationResult> {
        let registration = self.registration(provider_type)?;
        Ok(validate_with(&registration, config))
    }

    /// Validates `config`, builds an adapter and caches it under `instance_id`
    /// when one is given. An existing instance with the same id is replaced.
    pub fn create_provider(
        &self,
        provider_type: &str,
        config: ProviderConfig,
        instance_id: Option<&str>,
    ) -> Result<Arc<dyn CiProvider>> {
        let registration = self.registration(provider_type)?;

        let validation = validate_with(&registration, &config);
        if !validation.valid {
            return Err(CILensError::InvalidConfig {
                provider: provider_type.to_string(),
                errors: validation.errors,
            });
        }

        let provider = (registration.factory)(&config)?;

        if let Some(instance_id) = instance_id {
            let replaced = self
                .instances
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(
                    instance_id.to_string(),
                    CachedInstance {
                        provider_type: provider_type.to_string(),
                        provider: Arc::clone(&provider),
                    },
                );
            if replaced.is_some() {
                debug!("Replaced cached instance '{instance_id}'");
            }
            info!("Created {provider_type} provider instance '{instance_id}'");
        }

        Ok(provider)
    }

    /// Configuration for `provider_type` read through `lookup`.
    ///
    /// `Ok(None)` when the provider has no environment mapping or a mandatory
    /// variable is unset.
    pub fn config_from_env_with(
        &self,
        provider_type: &str,
        lookup: EnvLookup<'_>,
    ) -> Result<Option<ProviderConfig>> {
        let registration = self.registration(provider_type)?;
        let Some(loader) = registration.env_config else {
            debug!("Provider '{provider_type}' has no environment mapping");
            return Ok(None);
        };

        let config = loader(lookup);
        if config.is_none() {
            debug!("Skipping provider '{provider_type}': credentials not set in environment");
        }
        Ok(config)
    }

    /// Builds an adapter from process environment variables.
    pub fn create_provider_from_env(
        &self,
        provider_type: &str,
        instance_id: Option<&str>,
    ) -> Result<Option<Arc<dyn CiProvider>>> {
        self.create_provider_from_env_with(provider_type, instance_id, &process_env)
    }

    pub fn create_provider_from_env_with(
        &self,
        provider_type: &str,
        instance_id: Option<&str>,
        lookup: EnvLookup<'_>,
    ) -> Result<Option<Arc<dyn CiProvider>>> {
        match self.config_from_env_with(provider_type, lookup)? {
            Some(config) => self.create_provider(provider_type, config, instance_id).map(Some),
            None => Ok(None),
        }
    }

    pub fn get_instance(&self, instance_id: &str) -> Option<Arc<dyn CiProvider>> {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(instance_id)
            .map(|cached| Arc::clone(&cached.provider))
    }

    /// Returns whether an instance was removed.
    pub fn remove_instance(&self, instance_id: &str) -> bool {
        self.instances
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .shift_remove(instance_id)
            .is_some()
    }

    pub fn clear_instances(&self) {
        let mut instances = self.instances.write().unwrap_or_else(PoisonError::into_inner);
        info!("Clearing {} cached provider instances", instances.len());
        instances.clear();
    }

    /// Instance ids in creation order.
    pub fn instance_ids(&self) -> Vec<String> {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Runs `test_connection` on every cached instance concurrently.
    ///
    /// Each check is isolated: a failing or panicking instance is reported as
    /// unhealthy without affecting the others.
    pub async fn health_check(&self) -> Vec<InstanceHealth> {
        let snapshot: Vec<(String, String, Arc<dyn CiProvider>)> = self
            .instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, cached)| (id.clone(), cached.provider_type.clone(), Arc::clone(&cached.provider)))
            .collect();

        let checks = snapshot.into_iter().map(|(instance_id, provider_type, provider)| async move {
            let outcome = AssertUnwindSafe(async {
                let healthy = provider.test_connection().await;
                (healthy, provider.metrics())
            })
            .catch_unwind()
            .await;

            match outcome {
                Ok((healthy, metrics)) => {
                    let error = if healthy {
                        None
                    } else {
                        Some(
                            metrics
                                .last_error
                                .clone()
                                .unwrap_or_else(|| "connection test failed".to_string()),
                        )
                    };
                    InstanceHealth {
                        instance_id,
                        provider_type,
                        healthy,
                        metrics: Some(metrics),
                        error,
                    }
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    warn!("Health check of '{instance_id}' panicked: {message}");
                    InstanceHealth {
                        instance_id,
                        provider_type,
                        healthy: false,
                        metrics: None,
                        error: Some(message),
                    }
                }
            }
        });

        join_all(checks).await
    }

    pub fn get_provider_statistics(&self) -> ProviderStatistics {
        let registered_providers = self
            .registrations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        let instances = self.instances.read().unwrap_or_else(PoisonError::into_inner);

        let mut instances_by_type = IndexMap::new();
        for cached in instances.values() {
            *instances_by_type.entry(cached.provider_type.clone()).or_insert(0) += 1;
        }

        ProviderStatistics {
            registered_providers,
            active_instances: instances.len(),
            instances_by_type,
        }
    }
}

fn validate_with(registration: &ProviderRegistration, config: &ProviderConfig) -> ValidationResult {
    let mut errors = Vec::new();

    if config.provider_type() != registration.provider_type {
        errors.push(format!(
            "Configuration is for provider '{}', expected '{}'",
            config.provider_type(),
            registration.provider_type
        ));
    }

    errors.extend(
        registration
            .required_fields
            .iter()
            .filter(|field| config.field(field).is_none())
            .map(|field| format!("Missing required field: {field}")),
    );

    if errors.is_empty() {
        errors.extend((registration.validator)(config));
    }

    ValidationResult {
        valid: errors.is_empty(),
        errors,
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "health check panicked".to_string()
    }
}
