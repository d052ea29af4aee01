//! Alias-to-backend resolution, built once at startup and read lock-free
//! thereafter.

use crate::config::RouteEntry;
use crate::core::error::NodeError;
use proxy_types::domain::dialect::RoutingDecision;
use std::collections::HashMap;

pub struct ModelRouter {
    table: HashMap<String, RoutingDecision>,
    supported_aliases: Vec<String>,
}

impl ModelRouter {
    /// Builds a case-insensitive alias -> (provider, backend model) map.
    /// Alias collisions resolve first-wins.
    pub fn new(entries: &[RouteEntry]) -> Self {
        let mut table = HashMap::new();
        let mut supported_aliases = Vec::new();
        for entry in entries {
            for alias in &entry.aliases {
                let key = alias.to_lowercase();
                table.entry(key).or_insert_with(|| RoutingDecision {
                    provider: entry.provider,
                    requested_model: alias.clone(),
                    backend_model: entry.backend_model.clone(),
                });
                supported_aliases.push(alias.clone());
            }
        }
        supported_aliases.sort();
        Self { table, supported_aliases }
    }

    pub fn route(&self, model_alias: &str) -> Result<RoutingDecision, NodeError> {
        self.table
            .get(&model_alias.to_lowercase())
            .map(|decision| RoutingDecision { requested_model: model_alias.to_string(), ..decision.clone() })
            .ok_or_else(|| NodeError::UnsupportedModel {
                requested: model_alias.to_string(),
                supported: self.supported_aliases.clone(),
            })
    }

    pub fn supported_aliases(&self) -> &[String] {
        &self.supported_aliases
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxy_types::domain::dialect::Provider;

    fn router() -> ModelRouter {
        ModelRouter::new(&[
            RouteEntry { provider: Provider::Primary, backend_model: "backend-a".into(), aliases: vec!["gpt-5-codex".into()] },
            RouteEntry { provider: Provider::Secondary, backend_model: "backend-b".into(), aliases: vec!["fallback-model".into()] },
        ])
    }

    #[test]
    fn routes_known_alias_case_insensitively() {
        let decision = router().route("GPT-5-Codex").unwrap();
        assert_eq!(decision.backend_model, "backend-a");
        assert_eq!(decision.provider, Provider::Primary);
    }

    #[test]
    fn unsupported_alias_enumerates_supported() {
        let err = router().route("nonexistent").unwrap_err();
        match err {
            NodeError::UnsupportedModel { supported, .. } => {
                assert!(supported.contains(&"gpt-5-codex".to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
