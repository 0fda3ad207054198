//! Client SDK contract that interactive artifacts must honour.
//!
//! Artifacts reach paired input devices through a host-provided SDK global.
//! The contract names the global, the call that initialises it, the call that
//! registers input handlers, and the sensor payload fields that may be absent
//! on some devices and must therefore be read with optional chaining.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{compile_pattern, Result};

/// SDK contract configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameworkContract {
    /// Name of the SDK global
    pub sdk_global: String,

    /// Method that must be called once
    pub init_method: String,

    /// Method used to register input handlers
    pub handler_method: String,

    /// Sensor payload fields that may be missing
    pub sensor_fields: Vec<String>,

    /// Type tags that do not need the SDK at all
    pub exempt_types: Vec<String>,
}

impl Default for FrameworkContract {
    fn default() -> Self {
        Self {
            sdk_global: "InputBridge".to_string(),
            init_method: "init".to_string(),
            handler_method: "on".to_string(),
            sensor_fields: vec![
                "orientation".to_string(),
                "acceleration".to_string(),
                "rotationRate".to_string(),
            ],
            exempt_types: vec!["static".to_string(), "document".to_string()],
        }
    }
}

impl FrameworkContract {
    /// Set the SDK global name.
    pub fn with_sdk_global(mut self, name: impl Into<String>) -> Self {
        self.sdk_global = name.into();
        self
    }

    /// Set the exempt type tags.
    pub fn with_exempt_types(mut self, types: Vec<String>) -> Self {
        self.exempt_types = types;
        self
    }

    /// Whether artifacts of this type must use the SDK.
    pub fn applies_to(&self, type_tag: &str) -> bool {
        !self
            .exempt_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(type_tag))
    }

    /// Statement inserted when the init call is missing.
    pub fn init_snippet(&self) -> String {
        format!("{}.{}();", self.sdk_global, self.init_method)
    }

    /// Compile the contract's patterns.
    pub fn compile(&self) -> Result<CompiledContract> {
        let global = regex::escape(&self.sdk_global);
        let init = compile_pattern(&format!(
            r"\b{}\s*\.\s*{}\s*\(",
            global,
            regex::escape(&self.init_method)
        ))?;
        let handler = compile_pattern(&format!(
            r"\b{}\s*\.\s*{}\s*\(",
            global,
            regex::escape(&self.handler_method)
        ))?;

        let fields: Vec<String> = self.sensor_fields.iter().map(|f| regex::escape(f)).collect();
        let sensor_access = compile_pattern(&format!(
            r"([A-Za-z_$][\w$]*)\.({})\.([A-Za-z_$][\w$]*)",
            fields.join("|")
        ))?;

        Ok(CompiledContract {
            contract: self.clone(),
            init,
            handler,
            sensor_access,
        })
    }
}

/// A contract with its patterns compiled.
#[derive(Debug, Clone)]
pub struct CompiledContract {
    /// Source configuration
    pub contract: FrameworkContract,

    /// Matches the init call
    pub init: Regex,

    /// Matches a handler registration
    pub handler: Regex,

    /// Matches unguarded `x.<field>.y` sensor reads; groups are object, field, member
    pub sensor_access: Regex,
}

impl CompiledContract {
    /// Compile the default contract.
    pub fn default_contract() -> Result<Self> {
        FrameworkContract::default().compile()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_contract_patterns() {
        let compiled = CompiledContract::default_contract().unwrap();
        assert!(compiled.init.is_match("InputBridge.init({})"));
        assert!(compiled.init.is_match("InputBridge . init ( )"));
        assert!(!compiled.init.is_match("MyInputBridge.init()"));
        assert!(compiled.handler.is_match("InputBridge.on('tilt', f)"));
    }

    #[test]
    fn test_sensor_access_captures() {
        let compiled = CompiledContract::default_contract().unwrap();
        let caps = compiled.sensor_access.captures("let b = event.data.orientation.beta;").unwrap();
        assert_eq!(&caps[1], "data");
        assert_eq!(&caps[2], "orientation");
        assert_eq!(&caps[3], "beta");
        assert!(!compiled.sensor_access.is_match("data?.orientation?.beta"));
    }

    #[test]
    fn test_exempt_types() {
        let contract = FrameworkContract::default();
        assert!(!contract.applies_to("static"));
        assert!(!contract.applies_to("Document"));
        assert!(contract.applies_to("game"));
        assert_eq!(contract.init_snippet(), "InputBridge.init();");
    }

    #[test]
    fn test_contract_deserializes_partially() {
        let contract: FrameworkContract =
            serde_json::from_str(r#"{"sdk_global": "Pad"}"#).unwrap();
        assert_eq!(contract.sdk_global, "Pad");
        assert_eq!(contract.init_method, "init");
        assert_eq!(contract.sensor_fields.len(), 3);
    }
}
