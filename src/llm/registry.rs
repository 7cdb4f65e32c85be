use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{LlmConfig, ProviderEntry, RoleEntry};
use crate::errors::{SeeClawError, SeeClawResult};
use crate::llm::provider::LlmProvider;
use crate::llm::providers::openai_compatible::OpenAiCompatibleProvider;
use crate::llm::types::CallConfig;

/// Agent roles that can be bound to a provider/model in `[llm.roles]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Planner,
    Chat,
    Vision,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Planner => "planner",
            Role::Chat => "chat",
            Role::Vision => "vision",
        }
    }
}

/// A provider together with the call settings for one role.
#[derive(Clone)]
pub struct ModelBinding {
    pub provider: Arc<dyn LlmProvider>,
    pub call: CallConfig,
}

impl std::fmt::Debug for ModelBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelBinding")
            .field("provider", &self.provider.name())
            .field("call", &self.call)
            .finish()
    }
}

/// Providers keyed by their config.toml identifier.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    llm_config: LlmConfig,
}

impl ProviderRegistry {
    pub fn new(llm_config: LlmConfig) -> Self {
        Self {
            providers: HashMap::new(),
            llm_config,
        }
    }

    pub fn register(&mut self, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn get_active(&self) -> SeeClawResult<Arc<dyn LlmProvider>> {
        let active = &self.llm_config.active_provider;
        self.providers.get(active).cloned().ok_or_else(|| {
            SeeClawError::Config(format!("active provider '{active}' not found in registry"))
        })
    }

    /// Resolve a role to a provider and call settings.
    ///
    /// `[llm.roles.<role>]` wins; otherwise the active provider with its
    /// default model and temperature, streaming.
    pub fn binding_for(&self, role: Role) -> SeeClawResult<ModelBinding> {
        let roles = &self.llm_config.roles;
        let entry: Option<&RoleEntry> = match role {
            Role::Planner => roles.planner.as_ref(),
            Role::Chat => roles.chat.as_ref(),
            Role::Vision => roles.vision.as_ref(),
        };

        if let Some(entry) = entry {
            let provider = self.providers.get(&entry.provider).cloned().ok_or_else(|| {
                SeeClawError::Config(format!(
                    "role '{}' references unknown provider '{}'",
                    role.as_str(),
                    entry.provider
                ))
            })?;
            let temperature = entry.temperature.unwrap_or_else(|| {
                self.llm_config
                    .providers
                    .get(&entry.provider)
                    .map(|p| p.temperature)
                    .unwrap_or(0.1)
            });
            tracing::debug!(
                role = role.as_str(),
                provider = %entry.provider,
                model = %entry.model,
                stream = entry.stream,
                temperature,
                "resolved role binding"
            );
            return Ok(ModelBinding {
                provider,
                call: CallConfig {
                    model: entry.model.clone(),
                    stream: entry.stream,
                    temperature,
                },
            });
        }

        let provider = self.get_active()?;
        let (model, temperature) = self
            .llm_config
            .providers
            .get(&self.llm_config.active_provider)
            .map(|p| (p.model.clone(), p.temperature))
            .unwrap_or_else(|| (String::new(), 0.1));
        tracing::debug!(
            role = role.as_str(),
            provider = %self.llm_config.active_provider,
            model = %model,
            "role not configured, using active provider"
        );
        Ok(ModelBinding {
            provider,
            call: CallConfig {
                model,
                stream: true,
                temperature,
            },
        })
    }

    /// Build OpenAI-compatible providers for every configured entry.
    pub fn from_config(llm_config: &LlmConfig) -> Self {
        let mut registry = Self::new(llm_config.clone());
        for (id, entry) in &llm_config.providers {
            let api_key = resolve_api_key(id, entry, |name| std::env::var(name).ok());
            registry.register(Arc::new(OpenAiCompatibleProvider::new(
                id.clone(),
                entry.api_base.clone(),
                api_key,
            )));
        }
        tracing::info!(providers = ?registry.list_names(), "provider registry ready");
        registry
    }
}

/// `SEECLAW_<ID>_API_KEY` from the environment, else the config field.
fn resolve_api_key(id: &str, entry: &ProviderEntry, env: impl Fn(&str) -> Option<String>) -> String {
    let var = format!("SEECLAW_{}_API_KEY", id.to_uppercase().replace('-', "_"));
    env(&var)
        .filter(|k| !k.is_empty())
        .or_else(|| entry.api_key.clone())
        .unwrap_or_default()
}
