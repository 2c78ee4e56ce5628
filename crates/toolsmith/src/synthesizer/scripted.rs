use async_trait::async_trait;
use rhai::{Dynamic, Engine, Scope, AST};
use serde_json::{Map, Value};
use std::sync::Arc;

use super::source::ToolDeclaration;
use super::SynthesisError;
use crate::errors::{AgentError, AgentResult};
use crate::models::tool::{ParameterSpec, ToolSpec};
use crate::tools::base::{validate_arguments, Tool};

const ENTRY_POINT: &str = "run";

/// A tool whose behaviour is a compiled script
pub struct ScriptedTool {
    spec: ToolSpec,
    engine: Arc<Engine>,
    ast: Arc<AST>,
    source: String,
}

impl std::fmt::Debug for ScriptedTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedTool")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

impl ScriptedTool {
    /// Compile the declaration body and evaluate its metadata functions
    pub fn instantiate(
        declaration: &ToolDeclaration,
        engine: Arc<Engine>,
    ) -> Result<Self, SynthesisError> {
        let type_name = &declaration.type_name;
        let ast = engine
            .compile(&declaration.body)
            .map_err(|e| SynthesisError::Compile {
                name: type_name.clone(),
                message: e.to_string(),
            })?;

        let has_entry_point = ast
            .iter_functions()
            .any(|f| f.name == ENTRY_POINT && f.params.len() == 1);
        if !has_entry_point {
            return Err(SynthesisError::MissingEntryPoint(type_name.clone()));
        }

        let metadata = |function: &str| -> Result<Option<Value>, SynthesisError> {
            if !ast
                .iter_functions()
                .any(|f| f.name == function && f.params.is_empty())
            {
                return Ok(None);
            }
            let instantiation = |message: String| SynthesisError::Instantiation {
                name: type_name.clone(),
                message,
            };
            let result = engine
                .call_fn::<Dynamic>(&mut Scope::new(), &ast, function, ())
                .map_err(|e| instantiation(format!("{}(): {}", function, e)))?;
            rhai::serde::from_dynamic::<Value>(&result)
                .map(Some)
                .map_err(|e| instantiation(format!("{}(): {}", function, e)))
        };

        let name = match metadata("name")? {
            None => declaration.default_tool_name(),
            Some(Value::String(name)) => name,
            Some(other) => return Err(instantiation_error(type_name, "name() must return a string", &other)),
        };
        let description = match metadata("description")? {
            None => format!("Dynamically created tool {}", type_name),
            Some(Value::String(description)) => description,
            Some(other) => {
                return Err(instantiation_error(type_name, "description() must return a string", &other))
            }
        };
        let parameters = match metadata("parameters")? {
            None | Some(Value::Null) => Vec::new(),
            Some(value) => parse_parameters(&value).map_err(|message| SynthesisError::Instantiation {
                name: type_name.clone(),
                message,
            })?,
        };

        Ok(Self {
            spec: ToolSpec {
                name,
                description,
                parameters,
            },
            engine,
            ast: Arc::new(ast),
            source: declaration.source.clone(),
        })
    }

    /// The declaration this tool was built from
    pub fn source(&self) -> &str {
        &self.source
    }

    pub async fn run(&self, arguments: Value) -> AgentResult<String> {
        let engine = Arc::clone(&self.engine);
        let ast = Arc::clone(&self.ast);
        let name = self.spec.name.clone();

        tokio::task::spawn_blocking(move || run_entry_point(&engine, &ast, arguments))
            .await
            .map_err(|e| AgentError::Internal(format!("script for {} did not complete: {}", name, e)))?
    }
}

fn instantiation_error(type_name: &str, what: &str, got: &Value) -> SynthesisError {
    SynthesisError::Instantiation {
        name: type_name.to_string(),
        message: format!("{}, got {}", what, got),
    }
}

/// `parameters()` may return a map of name to type string or to
/// `{type, description, required}`, or an array of such maps with a `name`.
fn parse_parameters(value: &Value) -> Result<Vec<ParameterSpec>, String> {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(name, definition)| parse_parameter(name, definition))
            .collect(),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                let name = item
                    .get("name")
                    .and_then(|n| n.as_str())
                    .ok_or_else(|| format!("parameter entry without a name: {}", item))?;
                parse_parameter(name, item)
            })
            .collect(),
        other => Err(format!("parameters() must return a map or an array, got {}", other)),
    }
}

fn parse_parameter(name: &str, definition: &Value) -> Result<ParameterSpec, String> {
    match definition {
        Value::String(param_type) => Ok(ParameterSpec::new(name, param_type.as_str(), "")),
        Value::Object(fields) => {
            let text = |key: &str| fields.get(key).and_then(|v| v.as_str());
            let mut spec = ParameterSpec::new(
                name,
                text("type").unwrap_or("string"),
                text("description").unwrap_or_default(),
            );
            spec.required = fields
                .get("required")
                .and_then(|r| r.as_bool())
                .unwrap_or(true);
            Ok(spec)
        }
        other => Err(format!("invalid definition for parameter '{}': {}", name, other)),
    }
}

fn run_entry_point(engine: &Engine, ast: &AST, arguments: Value) -> AgentResult<String> {
    let arguments = match arguments {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };
    let arguments = rhai::serde::to_dynamic(arguments)
        .map_err(|e| AgentError::InvalidParameters(e.to_string()))?;

    let result = engine
        .call_fn::<Dynamic>(&mut Scope::new(), ast, ENTRY_POINT, (arguments,))
        .map_err(|e| AgentError::ExecutionError(e.to_string()))?;

    Ok(render(result))
}

/// Text for a script value: strings verbatim, unit as empty, the rest as JSON
pub fn render(value: Dynamic) -> String {
    if value.is_unit() {
        return String::new();
    }
    if value.is_string() {
        return value.to_string();
    }
    rhai::serde::from_dynamic::<Value>(&value)
        .map(|v| v.to_string())
        .unwrap_or_else(|_| value.to_string())
}

#[async_trait]
impl Tool for ScriptedTool {
    fn spec(&self) -> ToolSpec {
        self.spec.clone()
    }

    async fn call(&self, arguments: Value) -> AgentResult<String> {
        validate_arguments(&self.spec, &arguments)?;
        self.run(arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthesizer::sandbox::{build_engine, SandboxPolicy};
    use crate::synthesizer::source::extract_declaration;
    use serde_json::json;

    fn instantiate(source: &str) -> Result<ScriptedTool, SynthesisError> {
        let declaration = extract_declaration(source)?;
        ScriptedTool::instantiate(&declaration, Arc::new(build_engine(&SandboxPolicy::default())))
    }

    #[tokio::test]
    async fn test_run_receives_arguments() {
        let tool = instantiate(
            r#"impl Tool for Adder {
                fn parameters() { [#{ name: "a", "type": "number" }, #{ name: "b", "type": "number" }] }
                fn run(args) { args.a + args.b }
            }"#,
        )
        .unwrap();

        let names: Vec<_> = tool.spec().parameters.iter().map(|p| p.name.clone()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(tool.invoke(json!({"a": 2, "b": 3})).await, "5");
    }

    #[tokio::test]
    async fn test_structured_results_render_as_json() {
        let tool = instantiate(r#"impl Tool for Info { fn run(args) { #{ ok: true, items: [1, 2] } } }"#).unwrap();
        assert_eq!(tool.invoke(json!({})).await, r#"{"items":[1,2],"ok":true}"#);

        let tool = instantiate("impl Tool for Nothing { fn run(args) { } }").unwrap();
        assert_eq!(tool.invoke(Value::Null).await, "");
    }

    #[tokio::test]
    async fn test_script_errors_become_text() {
        let tool = instantiate(r#"impl Tool for Thrower { fn run(args) { throw "no data"; } }"#).unwrap();
        let result = tool.invoke(json!({})).await;
        assert!(result.starts_with("Error executing tool: "), "{}", result);
        assert!(result.contains("no data"));
    }

    #[tokio::test]
    async fn test_denied_helper_surfaces_as_tool_error() {
        let tool = instantiate(r#"impl Tool for Fetcher { fn run(args) { fetch_url("http://127.0.0.1:1/") } }"#).unwrap();
        let result = tool.invoke(json!({})).await;
        assert!(result.contains("fetch_url is disabled by the sandbox policy"), "{}", result);
    }

    #[tokio::test]
    async fn test_required_parameters_are_checked() {
        let tool = instantiate(
            r#"impl Tool for Weather {
                fn parameters() { #{ location: "string", units: #{ "type": "string", required: false } } }
                fn run(args) { args.location }
            }"#,
        )
        .unwrap();

        assert_eq!(tool.spec().required_parameters(), vec!["location"]);
        let result = tool.invoke(json!({"units": "metric"})).await;
        assert!(result.contains("missing required parameter(s) for weather: location"));
    }

    #[test]
    fn test_invalid_parameters_definition() {
        let err = instantiate("impl Tool for Odd { fn parameters() { 3 } fn run(args) { 1 } }").unwrap_err();
        assert!(matches!(err, SynthesisError::Instantiation { .. }));
    }

    #[test]
    fn test_source_is_kept() {
        let tool = instantiate("text before impl Tool for Keep { fn run(args) { 1 } } after").unwrap();
        assert_eq!(tool.source(), "impl Tool for Keep { fn run(args) { 1 } }");
    }
}
