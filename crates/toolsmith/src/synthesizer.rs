//! Turns model-generated tool source into a tool the registry can hold.
//!
//! Generated source declares an `impl Tool for Name { ... }` block whose body
//! is a Rhai script. The script is compiled into an isolated engine limited by
//! a [`SandboxPolicy`] and wrapped in a [`ScriptedTool`].

pub mod sandbox;
pub mod scripted;
pub mod source;

use std::sync::Arc;
use thiserror::Error;

use crate::providers::utils::is_valid_function_name;
use crate::tools::base::Tool;
use crate::tools::final_answer::RESERVED_TOOL_NAMES;

pub use sandbox::SandboxPolicy;
pub use scripted::ScriptedTool;
pub use source::{extract_declaration, ToolDeclaration};

/// Trait a generated declaration must implement
pub const BASE_MARKER: &str = "Tool";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SynthesisError {
    #[error("no tool declaration found")]
    NoDeclaration,

    #[error("'{0}' must be declared as `impl Tool for {0}`")]
    MissingBaseMarker(String),

    #[error("'{0}' does not define a `run(args)` entry point")]
    MissingEntryPoint(String),

    #[error("failed to compile '{name}': {message}")]
    Compile { name: String, message: String },

    #[error("failed to instantiate '{name}': {message}")]
    Instantiation { name: String, message: String },

    #[error("tool name '{0}' is reserved")]
    ReservedName(String),

    #[error("invalid tool name '{0}', names must match [a-zA-Z0-9_-]+")]
    InvalidName(String),
}

#[derive(Debug, Clone)]
pub struct Synthesizer {
    policy: SandboxPolicy,
    reserved: Vec<String>,
}

impl Default for Synthesizer {
    fn default() -> Self {
        Self::new(SandboxPolicy::default())
    }
}

impl Synthesizer {
    pub fn new(policy: SandboxPolicy) -> Self {
        Self {
            policy,
            reserved: RESERVED_TOOL_NAMES.iter().map(|n| n.to_string()).collect(),
        }
    }

    /// Replace the set of names generated tools may not take
    pub fn with_reserved_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reserved = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn policy(&self) -> &SandboxPolicy {
        &self.policy
    }

    /// Parse, compile and instantiate the first declaration in `text`
    pub fn build(&self, text: &str) -> Result<ScriptedTool, SynthesisError> {
        let declaration = extract_declaration(text)?;
        if !declaration.implements(BASE_MARKER) {
            return Err(SynthesisError::MissingBaseMarker(declaration.type_name));
        }

        let engine = Arc::new(sandbox::build_engine(&self.policy));
        let tool = ScriptedTool::instantiate(&declaration, engine)?;

        let name = tool.spec().name;
        if !is_valid_function_name(&name) {
            return Err(SynthesisError::InvalidName(name));
        }
        if self.reserved.iter().any(|reserved| *reserved == name) {
            return Err(SynthesisError::ReservedName(name));
        }

        tracing::debug!(tool = %name, declaration = %declaration.type_name, "synthesized tool");
        Ok(tool)
    }

    pub fn synthesize(&self, text: &str) -> Result<Arc<dyn Tool>, SynthesisError> {
        let tool = self.build(text)?;
        Ok(Arc::new(tool))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const WEATHER: &str = r#"
Here is the tool you asked for:

```rust
impl Tool for Weather {
    fn name() { "weather" }
    fn description() { "Current weather for a city" }
    fn parameters() {
        #{ location: #{ "type": "string", description: "City name" } }
    }
    fn run(args) {
        `Sunny in ${args.location}`
    }
}
```
"#;

    #[tokio::test]
    async fn test_synthesize_weather_tool() {
        let tool = Synthesizer::default().synthesize(WEATHER).unwrap();
        let spec = tool.spec();
        assert_eq!(spec.name, "weather");
        assert_eq!(spec.description, "Current weather for a city");
        assert_eq!(spec.required_parameters(), vec!["location"]);
        assert_eq!(tool.invoke(json!({"location": "miami"})).await, "Sunny in miami");
    }

    #[test]
    fn test_defaults_for_optional_metadata() {
        let source = "impl Tool for CurrencyConverter { fn run(args) { 42 } }";
        let tool = Synthesizer::default().build(source).unwrap();
        let spec = tool.spec();
        assert_eq!(spec.name, "currency_converter");
        assert_eq!(spec.description, "Dynamically created tool CurrencyConverter");
        assert!(spec.parameters.is_empty());
    }

    #[test]
    fn test_no_declaration() {
        let err = Synthesizer::default().build("just some prose").unwrap_err();
        assert_eq!(err, SynthesisError::NoDeclaration);
    }

    #[test]
    fn test_wrong_marker() {
        let err = Synthesizer::default()
            .build("impl Helper for Weather { fn run(args) { 1 } }")
            .unwrap_err();
        assert_eq!(err, SynthesisError::MissingBaseMarker("Weather".into()));

        let err = Synthesizer::default()
            .build("impl Weather { fn run(args) { 1 } }")
            .unwrap_err();
        assert_eq!(err, SynthesisError::MissingBaseMarker("Weather".into()));
    }

    #[test]
    fn test_missing_entry_point() {
        let err = Synthesizer::default()
            .build("impl Tool for Weather { fn execute(args) { 1 } }")
            .unwrap_err();
        assert_eq!(err, SynthesisError::MissingEntryPoint("Weather".into()));

        let err = Synthesizer::default()
            .build("impl Tool for Weather { fn run() { 1 } }")
            .unwrap_err();
        assert_eq!(err, SynthesisError::MissingEntryPoint("Weather".into()));
    }

    #[test]
    fn test_compile_error() {
        let err = Synthesizer::default()
            .build("impl Tool for Weather { fn run(args) { let = ; } }")
            .unwrap_err();
        assert!(matches!(err, SynthesisError::Compile { ref name, .. } if name == "Weather"));
    }

    #[test]
    fn test_instantiation_error() {
        let err = Synthesizer::default()
            .build("impl Tool for Weather { fn name() { 7 } fn run(args) { 1 } }")
            .unwrap_err();
        assert!(matches!(err, SynthesisError::Instantiation { .. }));
    }

    #[test]
    fn test_reserved_and_invalid_names() {
        let err = Synthesizer::default()
            .build(r#"impl Tool for Finisher { fn name() { "final_answer" } fn run(args) { 1 } }"#)
            .unwrap_err();
        assert_eq!(err, SynthesisError::ReservedName("final_answer".into()));

        let err = Synthesizer::default()
            .build(r#"impl Tool for Bad { fn name() { "bad name" } fn run(args) { 1 } }"#)
            .unwrap_err();
        assert_eq!(err, SynthesisError::InvalidName("bad name".into()));

        let permissive = Synthesizer::default().with_reserved_names(Vec::<String>::new());
        assert!(permissive
            .build(r#"impl Tool for Finisher { fn name() { "final_answer" } fn run(args) { 1 } }"#)
            .is_ok());
    }
}
