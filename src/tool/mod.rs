//! Callable tools and their parameter schemas.
//!
//! A [`Tool`] describes itself with a [`ParamsSchema`]; each adapter translates that
//! schema into its backend's native function-declaration format when
//! [`crate::LLMProvider::run_tools`] is called, and invokes the tool the model picks.
//!
//! ```
//! use async_trait::async_trait;
//! use relay_llm::Context;
//! use relay_llm::tool::{ParamProperty, ParamsSchema, Tool, ToolError};
//! use serde_json::{Map, Value, json};
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl Tool for Echo {
//!     fn name(&self) -> &str { "echo" }
//!     fn description(&self) -> &str { "Repeats the given text" }
//!     fn params(&self) -> ParamsSchema {
//!         ParamsSchema::new().required_property("text", ParamProperty::string("Text to repeat"))
//!     }
//!     async fn call(&self, _ctx: &Context, args: Map<String, Value>) -> Result<Value, ToolError> {
//!         Ok(json!(relay_llm::tool::required_str(&args, "text")?))
//!     }
//! }
//!
//! assert!(Echo.params().validate("echo").is_ok());
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::context::Context;
use crate::error::LLMError;

pub(crate) mod dispatch;

/// Failures raised by a tool implementation.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool execution failed: {0}")]
    ExecutionFailed(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
}

/// A capability the model may ask to invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name exposed to the model; unique within one `run_tools` call.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn params(&self) -> ParamsSchema;

    /// Runs the tool with the argument object chosen by the model.
    async fn call(&self, ctx: &Context, args: Map<String, Value>) -> Result<Value, ToolError>;

    /// Snapshot of the tool's name, description and schema.
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.params(),
        }
    }
}

/// Thread-safe tool handle.
pub type DynTool = Arc<dyn Tool>;

/// Name, description and parameter schema of a tool, as sent to a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: ParamsSchema,
}

/// Object-shaped parameter schema: named properties plus the required subset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamsSchema {
    #[serde(default)]
    pub properties: BTreeMap<String, ParamProperty>,
    #[serde(default)]
    pub required: Vec<String>,
}

impl ParamsSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn property(mut self, name: impl Into<String>, property: ParamProperty) -> Self {
        self.properties.insert(name.into(), property);
        self
    }

    /// Adds a property and marks it required.
    pub fn required_property(self, name: impl Into<String>, property: ParamProperty) -> Self {
        let name = name.into();
        self.property(name.clone(), property).require(name)
    }

    pub fn require(mut self, name: impl Into<String>) -> Self {
        self.required.push(name.into());
        self
    }

    /// Checks that the schema can be translated for any backend.
    ///
    /// # Errors
    ///
    /// Returns [`LLMError::Schema`] when a required name is not a declared property,
    /// a required name is listed twice, a type tag is not recognised, or an array
    /// property does not describe its items.
    pub fn validate(&self, tool: &str) -> Result<(), LLMError> {
        for (index, name) in self.required.iter().enumerate() {
            if !self.properties.contains_key(name) {
                return Err(schema_error(
                    tool,
                    format!("required parameter `{name}` is not a declared property"),
                ));
            }
            if self.required[..index].contains(name) {
                return Err(schema_error(
                    tool,
                    format!("required parameter `{name}` is listed more than once"),
                ));
            }
        }
        for (name, property) in &self.properties {
            property.validate(tool, name)?;
        }
        Ok(())
    }
}

/// A single parameter: type tag, description and, for arrays, the element schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamProperty {
    /// One of `string`, `number`, `integer`, `boolean`, `array`, `object`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<ParamProperty>>,
}

impl ParamProperty {
    pub fn new(kind: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            description: description.into(),
            items: None,
        }
    }

    pub fn string(description: impl Into<String>) -> Self {
        Self::new("string", description)
    }

    pub fn number(description: impl Into<String>) -> Self {
        Self::new("number", description)
    }

    pub fn integer(description: impl Into<String>) -> Self {
        Self::new("integer", description)
    }

    pub fn boolean(description: impl Into<String>) -> Self {
        Self::new("boolean", description)
    }

    pub fn array(description: impl Into<String>, items: ParamProperty) -> Self {
        Self {
            kind: "array".to_string(),
            description: description.into(),
            items: Some(Box::new(items)),
        }
    }

    /// Resolves the type tag.
    ///
    /// # Errors
    ///
    /// Returns [`LLMError::Schema`] for unrecognised tags.
    pub fn param_type(&self, tool: &str, name: &str) -> Result<ParamType, LLMError> {
        ParamType::from_tag(&self.kind).ok_or_else(|| {
            schema_error(
                tool,
                format!("parameter `{name}` has unsupported type `{}`", self.kind),
            )
        })
    }

    fn validate(&self, tool: &str, name: &str) -> Result<(), LLMError> {
        let kind = self.param_type(tool, name)?;
        match (&self.items, kind) {
            (Some(items), ParamType::Array) => items.validate(tool, &format!("{name}[]")),
            (None, ParamType::Array) => Err(schema_error(
                tool,
                format!("array parameter `{name}` must describe its items"),
            )),
            (Some(_), _) => Err(schema_error(
                tool,
                format!("parameter `{name}` declares items but is not an array"),
            )),
            (None, _) => Ok(()),
        }
    }
}

/// Parameter types every supported backend can express.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    /// Parses a type tag case-insensitively.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let parsed = match tag.trim().to_ascii_lowercase().as_str() {
            "string" => Self::String,
            "number" => Self::Number,
            "integer" => Self::Integer,
            "boolean" => Self::Boolean,
            "array" => Self::Array,
            "object" => Self::Object,
            _ => return None,
        };
        Some(parsed)
    }

    /// Lower-case JSON Schema tag.
    pub fn json_schema_tag(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    /// Upper-case OpenAPI tag used by Gemini function declarations.
    pub fn openapi_tag(self) -> &'static str {
        match self {
            Self::String => "STRING",
            Self::Number => "NUMBER",
            Self::Integer => "INTEGER",
            Self::Boolean => "BOOLEAN",
            Self::Array => "ARRAY",
            Self::Object => "OBJECT",
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.json_schema_tag())
    }
}

/// Reads a required string argument.
///
/// # Errors
///
/// Returns [`ToolError::InvalidArguments`] when the argument is absent or not a string.
pub fn required_str<'a>(args: &'a Map<String, Value>, name: &str) -> Result<&'a str, ToolError> {
    args.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing string argument `{name}`")))
}

pub(crate) fn schema_error(tool: &str, message: impl Into<String>) -> LLMError {
    LLMError::Schema {
        tool: tool.to_string(),
        message: message.into(),
    }
}
