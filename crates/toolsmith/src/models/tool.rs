use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

fn default_param_type() -> String {
    "string".to_string()
}

fn default_required() -> bool {
    true
}

/// A single named parameter a tool accepts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    /// JSON schema type name ("string", "number", "object", ...)
    #[serde(rename = "type", default = "default_param_type")]
    pub param_type: String,
    #[serde(default)]
    pub description: String,
    /// Parameters are required unless explicitly marked optional
    #[serde(default = "default_required")]
    pub required: bool,
}

impl ParameterSpec {
    pub fn new<N, T, D>(name: N, param_type: T, description: D) -> Self
    where
        N: Into<String>,
        T: Into<String>,
        D: Into<String>,
    {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            description: description.into(),
            required: true,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// The model-facing description of a tool.
///
/// `name` is the dispatch key. Parameters keep their declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
}

impl ToolSpec {
    pub fn new<N, D>(name: N, description: D) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        ToolSpec {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    /// Add a required parameter
    pub fn with_parameter<N, T, D>(mut self, name: N, param_type: T, description: D) -> Self
    where
        N: Into<String>,
        T: Into<String>,
        D: Into<String>,
    {
        self.parameters
            .push(ParameterSpec::new(name, param_type, description));
        self
    }

    /// Add a parameter the model may omit
    pub fn with_optional_parameter<N, T, D>(mut self, name: N, param_type: T, description: D) -> Self
    where
        N: Into<String>,
        T: Into<String>,
        D: Into<String>,
    {
        self.parameters
            .push(ParameterSpec::new(name, param_type, description).optional());
        self
    }

    pub fn required_parameters(&self) -> Vec<&str> {
        self.parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect()
    }

    /// JSON schema object describing the parameters
    pub fn parameters_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.parameters {
            properties.insert(
                param.name.clone(),
                json!({
                    "type": param.param_type,
                    "description": param.description,
                }),
            );
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": self.required_parameters(),
        })
    }

    /// Full function description: name, description and parameter schema
    pub fn to_json_schema(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "parameters": self.parameters_schema(),
        })
    }
}

/// A request from the model to invoke a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// The name of the tool to execute
    pub name: String,
    /// Untyped arguments, validated by the target tool
    pub arguments: Value,
}

impl ToolCall {
    pub fn new<S: Into<String>>(name: S, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weather_spec() -> ToolSpec {
        ToolSpec::new("weather", "Current weather for a city")
            .with_parameter("location", "string", "City name")
            .with_optional_parameter("units", "string", "metric or imperial")
    }

    #[test]
    fn test_required_parameters_skip_optional() {
        assert_eq!(weather_spec().required_parameters(), vec!["location"]);
    }

    #[test]
    fn test_json_schema_shape() {
        let schema = weather_spec().to_json_schema();
        assert_eq!(schema["name"], "weather");
        assert_eq!(schema["parameters"]["type"], "object");
        assert_eq!(
            schema["parameters"]["properties"]["location"],
            json!({"type": "string", "description": "City name"})
        );
        assert_eq!(schema["parameters"]["required"], json!(["location"]));
    }

    #[test]
    fn test_describe_is_deterministic() {
        assert_eq!(weather_spec().to_json_schema(), weather_spec().to_json_schema());
    }

    #[test]
    fn test_parameter_defaults_from_json() {
        let param: ParameterSpec = serde_json::from_value(json!({"name": "query"})).unwrap();
        assert_eq!(param.param_type, "string");
        assert_eq!(param.description, "");
        assert!(param.required);
    }
}
