use serde_json::{Map, Value, json};

use crate::error::LLMError;
use crate::tool::{ParamProperty, ParamsSchema, ToolDescriptor};
use crate::types::{ChatMessage, GenerationOptions};

use super::DEFAULT_MAX_TOKENS;

/// Builds the JSON payload for Anthropic `/v1/messages`.
///
/// System messages are lifted into the top-level `system` field; everything
/// else keeps its order in `messages`.
pub(crate) fn build_anthropic_body(
    model: &str,
    messages: &[ChatMessage],
    tools: Option<&[ToolDescriptor]>,
    options: &GenerationOptions,
    stream: bool,
) -> Result<Value, LLMError> {
    let mut body = Map::new();
    body.insert("model".to_string(), Value::String(model.to_string()));

    let mut system_texts = Vec::new();
    let mut converted = Vec::new();
    for message in messages {
        if message.role.is_system() {
            system_texts.push(message.content.as_str());
        } else {
            converted.push(convert_message(message));
        }
    }

    if converted.is_empty() {
        return Err(LLMError::Validation {
            message: "Anthropic Messages request requires at least one non-system message"
                .to_string(),
        });
    }
    body.insert("messages".to_string(), Value::Array(converted));

    if !system_texts.is_empty() {
        body.insert(
            "system".to_string(),
            Value::String(system_texts.join("\n\n")),
        );
    }

    let max_tokens = options.max_output_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
    body.insert("max_tokens".to_string(), json!(max_tokens));
    if let Some(temperature) = options.temperature {
        body.insert("temperature".to_string(), json!(temperature));
    }
    if let Some(top_p) = options.top_p {
        body.insert("top_p".to_string(), json!(top_p));
    }

    if let Some(tools) = tools {
        body.insert("tools".to_string(), convert_tools(tools)?);
    }

    if stream {
        body.insert("stream".to_string(), Value::Bool(true));
    }

    Ok(Value::Object(body))
}

fn convert_message(message: &ChatMessage) -> Value {
    let role = if message.role.is_assistant() {
        "assistant"
    } else {
        "user"
    };
    json!({
        "role": role,
        "content": [ { "type": "text", "text": message.content } ]
    })
}

fn convert_tools(tools: &[ToolDescriptor]) -> Result<Value, LLMError> {
    let converted = tools
        .iter()
        .map(|tool| {
            Ok(json!({
                "name": tool.name,
                "description": tool.description,
                "input_schema": convert_params(&tool.name, &tool.parameters)?,
            }))
        })
        .collect::<Result<Vec<_>, LLMError>>()?;
    Ok(Value::Array(converted))
}

/// ParamsSchema -> JSON Schema with lowercase type tags.
pub(crate) fn convert_params(tool: &str, schema: &ParamsSchema) -> Result<Value, LLMError> {
    let mut properties = Map::new();
    for (name, property) in &schema.properties {
        properties.insert(name.clone(), convert_property(tool, name, property)?);
    }
    Ok(json!({
        "type": "object",
        "properties": properties,
        "required": schema.required,
    }))
}

fn convert_property(tool: &str, name: &str, property: &ParamProperty) -> Result<Value, LLMError> {
    let kind = property.param_type(tool, name)?;
    let mut object = Map::new();
    object.insert("type".to_string(), json!(kind.json_schema_tag()));
    if !property.description.is_empty() {
        object.insert("description".to_string(), json!(property.description));
    }
    if let Some(items) = &property.items {
        object.insert(
            "items".to_string(),
            convert_property(tool, &format!("{name}[]"), items)?,
        );
    }
    Ok(Value::Object(object))
}
