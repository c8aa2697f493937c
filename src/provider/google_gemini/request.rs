use serde_json::{Map, Value, json};

use crate::error::LLMError;
use crate::tool::{ParamProperty, ParamType, ParamsSchema, ToolDescriptor, schema_error};
use crate::types::{ChatMessage, GenerationOptions};

/// 构建 GenerateContent 请求体
///
/// 模型名称通过 URL 路径传递 不出现在 body 中。
/// system 消息按顺序折叠进 `systemInstruction` 其余消息按原顺序进入 `contents`。
pub(crate) fn build_gemini_body(
    messages: &[ChatMessage],
    tools: Option<&[ToolDescriptor]>,
    options: &GenerationOptions,
) -> Result<Value, LLMError> {
    let mut body = Map::new();

    let mut system_texts = Vec::new();
    let mut contents = Vec::new();
    for message in messages {
        if message.role.is_system() {
            system_texts.push(message.content.as_str());
        } else {
            contents.push(convert_message(message));
        }
    }

    if contents.is_empty() {
        return Err(LLMError::Validation {
            message: "Gemini GenerateContent request requires at least one non-system message"
                .to_string(),
        });
    }
    body.insert("contents".to_string(), Value::Array(contents));

    if !system_texts.is_empty() {
        body.insert(
            "systemInstruction".to_string(),
            json!({ "parts": [ { "text": system_texts.join("\n\n") } ] }),
        );
    }

    if let Some(config) = build_generation_config(options) {
        body.insert("generationConfig".to_string(), config);
    }

    if let Some(tools) = tools {
        body.insert("tools".to_string(), convert_tools(tools)?);
    }

    Ok(Value::Object(body))
}

/// assistant 映射为 Gemini 的 model 其余角色一律按 user 发送
fn convert_message(message: &ChatMessage) -> Value {
    let role = if message.role.is_assistant() {
        "model"
    } else {
        "user"
    };
    json!({
        "role": role,
        "parts": [ { "text": message.content } ]
    })
}

fn build_generation_config(options: &GenerationOptions) -> Option<Value> {
    let mut config = Map::new();
    if let Some(temperature) = options.temperature {
        config.insert("temperature".to_string(), json!(temperature));
    }
    if let Some(top_p) = options.top_p {
        config.insert("topP".to_string(), json!(top_p));
    }
    if let Some(max_tokens) = options.max_output_tokens {
        config.insert("maxOutputTokens".to_string(), json!(max_tokens));
    }
    if config.is_empty() {
        None
    } else {
        Some(Value::Object(config))
    }
}

/// 所有工具合并为单个 `{ functionDeclarations: [...] }` 条目
///
/// 无参数的工具省略 `parameters` 字段 Gemini 不接受空的 OBJECT schema。
pub(crate) fn convert_tools(tools: &[ToolDescriptor]) -> Result<Value, LLMError> {
    let declarations = tools
        .iter()
        .map(|tool| {
            let mut declaration = Map::new();
            declaration.insert("name".to_string(), json!(tool.name));
            declaration.insert("description".to_string(), json!(tool.description));
            if !tool.parameters.properties.is_empty() {
                declaration.insert(
                    "parameters".to_string(),
                    convert_params(&tool.name, &tool.parameters)?,
                );
            }
            Ok(Value::Object(declaration))
        })
        .collect::<Result<Vec<_>, LLMError>>()?;
    Ok(json!([ { "functionDeclarations": declarations } ]))
}

/// ParamsSchema -> Gemini OpenAPI Schema（类型标签使用大写）
pub(crate) fn convert_params(tool: &str, schema: &ParamsSchema) -> Result<Value, LLMError> {
    let mut properties = Map::new();
    for (name, property) in &schema.properties {
        properties.insert(name.clone(), convert_property(tool, name, property)?);
    }

    let mut object = Map::new();
    object.insert("type".to_string(), json!("OBJECT"));
    object.insert("properties".to_string(), Value::Object(properties));
    if !schema.required.is_empty() {
        object.insert("required".to_string(), json!(schema.required));
    }
    Ok(Value::Object(object))
}

fn convert_property(tool: &str, name: &str, property: &ParamProperty) -> Result<Value, LLMError> {
    let kind = property.param_type(tool, name)?;
    // ParamProperty 无法描述嵌套属性 而 Gemini 要求 OBJECT 必须带非空 properties
    if kind == ParamType::Object {
        return Err(schema_error(
            tool,
            format!("parameter `{name}` has type object, which Gemini cannot declare without nested properties"),
        ));
    }
    let mut object = Map::new();
    object.insert("type".to_string(), json!(kind.openapi_tag()));
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
