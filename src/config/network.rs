//! Persisted network topology.
//!
//! [`NetworkConfig`] is the serde model written by
//! `Network::write_configuration` and consumed by
//! `Network::read_configuration`. Everything is addressed by element name.
//! Files ending in `.toml` use TOML, everything else JSON.

use crate::error::{FieldNetError, Result};
use crate::graph::{DataRole, LoopMode};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A complete network description
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub elements: Vec<ElementConfig>,
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
    #[serde(default)]
    pub triggers: Vec<TriggerConfig>,
    #[serde(default)]
    pub promotions: Vec<PromotionConfig>,
}

/// One element and, optionally, the group it lives in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(flatten)]
    pub kind: ElementConfigKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementConfigKind {
    Step {
        kernel: String,
        #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
        parameters: serde_json::Value,
    },
    Trigger,
    MultiTrigger,
    LoopedTrigger {
        /// Period in microseconds
        period_us: u64,
        #[serde(default)]
        mode: LoopMode,
    },
    Group,
}

/// A slot addressed by element name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotConfig {
    pub element: String,
    pub role: DataRole,
    pub slot: String,
}

impl SlotConfig {
    pub fn new(element: impl Into<String>, role: DataRole, slot: impl Into<String>) -> Self {
        Self {
            element: element.into(),
            role,
            slot: slot.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub source: SlotConfig,
    pub target: SlotConfig,
}

/// An explicit trigger connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerConfig {
    pub source: String,
    pub listener: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionConfig {
    pub group: String,
    pub role: DataRole,
    pub name: String,
    pub target: SlotConfig,
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("toml"))
}

impl NetworkConfig {
    /// Load a network description, picking the format from the extension
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            FieldNetError::Config(format!("Failed to read network file {:?}: {}", path, e))
        })?;

        if is_toml(path) {
            toml::from_str(&content).map_err(|e| {
                FieldNetError::Serialization(format!("Failed to parse {:?}: {}", path, e))
            })
        } else {
            serde_json::from_str(&content).map_err(|e| {
                FieldNetError::Serialization(format!("Failed to parse {:?}: {}", path, e))
            })
        }
    }

    /// Save a network description, picking the format from the extension
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                FieldNetError::Config(format!("Failed to create network directory: {}", e))
            })?;
        }

        let content = if is_toml(path) {
            toml::to_string_pretty(self)
                .map_err(|e| FieldNetError::Serialization(format!("Failed to serialize network: {}", e)))?
        } else {
            serde_json::to_string_pretty(self)
                .map_err(|e| FieldNetError::Serialization(format!("Failed to serialize network: {}", e)))?
        };

        std::fs::write(path, content).map_err(|e| {
            FieldNetError::Config(format!("Failed to write network file {:?}: {}", path, e))
        })
    }

    pub fn element(&self, name: &str) -> Option<&ElementConfig> {
        self.elements.iter().find(|e| e.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_json_shape() {
        let element = ElementConfig {
            name: "clock".into(),
            parent: None,
            kind: ElementConfigKind::LoopedTrigger {
                period_us: 20_000,
                mode: LoopMode::FixedStep,
            },
        };
        let json = serde_json::to_value(&element).unwrap();
        assert_eq!(json["type"], "looped_trigger");
        assert_eq!(json["period_us"], 20_000);
        assert!(json.get("parent").is_none());
    }

    #[test]
    fn test_parse_toml() {
        let config: NetworkConfig = toml::from_str(
            r#"
            [[elements]]
            name = "source"
            type = "step"
            kernel = "Constant"
            parameters = { value = 2.0 }

            [[elements]]
            name = "clock"
            type = "looped_trigger"
            period_us = 10000

            [[triggers]]
            source = "clock"
            listener = "source"
            "#,
        )
        .unwrap();
        assert_eq!(config.elements.len(), 2);
        assert_eq!(
            config.element("clock").unwrap().kind,
            ElementConfigKind::LoopedTrigger {
                period_us: 10_000,
                mode: LoopMode::RealTime
            }
        );
        match &config.element("source").unwrap().kind {
            ElementConfigKind::Step { parameters, .. } => assert_eq!(parameters["value"], 2.0),
            other => panic!("unexpected kind {:?}", other),
        }
        assert!(config.connections.is_empty());
    }
}
