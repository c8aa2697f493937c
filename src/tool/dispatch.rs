use std::collections::HashSet;

use serde_json::{Map, Value};
use tracing::debug;

use crate::context::Context;
use crate::error::LLMError;

use super::{DynTool, ToolDescriptor, schema_error};

/// A function invocation requested by the model, in backend-neutral form.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FunctionCall {
    pub(crate) name: String,
    pub(crate) args: Value,
}

/// Validates a tool set and snapshots its descriptors in the given order.
pub(crate) fn describe_tools(tools: &[DynTool]) -> Result<Vec<ToolDescriptor>, LLMError> {
    if tools.is_empty() {
        return Err(LLMError::Validation {
            message: "run_tools requires at least one tool".to_string(),
        });
    }

    let mut seen = HashSet::new();
    let mut descriptors = Vec::with_capacity(tools.len());
    for tool in tools {
        let descriptor = tool.descriptor();
        if descriptor.name.trim().is_empty() {
            return Err(schema_error(&descriptor.name, "tool name must not be empty"));
        }
        if !seen.insert(descriptor.name.clone()) {
            return Err(schema_error(
                &descriptor.name,
                "tool name is registered more than once",
            ));
        }
        descriptor.parameters.validate(&descriptor.name)?;
        descriptors.push(descriptor);
    }
    Ok(descriptors)
}

/// Services the first requested function call against `tools`.
///
/// Calls after the first are ignored. Missing or `null` arguments are passed to the
/// tool as an empty object.
pub(crate) async fn dispatch<I>(
    ctx: &Context,
    provider: &'static str,
    calls: I,
    tools: &[DynTool],
) -> Result<Value, LLMError>
where
    I: IntoIterator<Item = FunctionCall>,
{
    let Some(call) = calls.into_iter().next() else {
        return Err(LLMError::NoFunctionCall { provider });
    };

    let Some(tool) = tools.iter().find(|tool| tool.name() == call.name) else {
        return Err(LLMError::UnknownTool { name: call.name });
    };

    let args = match call.args {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            return Err(LLMError::provider(
                provider,
                format!(
                    "arguments for function `{}` must be a JSON object, got {other}",
                    call.name
                ),
            ));
        }
    };

    debug!(provider, tool = %call.name, "invoking tool requested by model");
    ctx.run(tool.call(ctx, args))
        .await?
        .map_err(|source| LLMError::Tool {
            name: call.name,
            source,
        })
}
