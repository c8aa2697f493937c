mod common;

use std::sync::Arc;

use futures_util::StreamExt;
use relay_llm::provider::anthropic_messages::AnthropicMessagesProvider;
use relay_llm::tool::DynTool;
use relay_llm::types::{ChatMessage, FinishReason, GenerationOptions, StreamResult};
use relay_llm::{Context, LLMError, LLMProvider, StreamState};
use serde_json::{Value, json};

use common::{Canned, MockTransport, WeatherTool, sse_event};

const MODEL: &str = "claude-sonnet-4-5";

fn message_start(input_tokens: u64) -> String {
    sse_event(
        "message_start",
        json!({
            "type": "message_start",
            "message": {
                "id": "msg_01", "type": "message", "role": "assistant", "model": MODEL,
                "content": [], "stop_reason": null,
                "usage": { "input_tokens": input_tokens, "output_tokens": 1 }
            }
        }),
    )
}

fn text_delta(text: &str) -> String {
    sse_event(
        "content_block_delta",
        json!({ "type": "content_block_delta", "index": 0, "delta": { "type": "text_delta", "text": text } }),
    )
}

fn message_delta(output_tokens: u64) -> String {
    sse_event(
        "message_delta",
        json!({
            "type": "message_delta",
            "delta": { "stop_reason": "end_turn", "stop_sequence": null },
            "usage": { "output_tokens": output_tokens }
        }),
    )
}

fn message_stop() -> String {
    sse_event("message_stop", json!({ "type": "message_stop" }))
}

fn tool_use_response(name: &str) -> Value {
    json!({
        "id": "msg_02",
        "type": "message",
        "role": "assistant",
        "model": MODEL,
        "content": [
            { "type": "text", "text": "Let me check." },
            { "type": "tool_use", "id": "toolu_01", "name": name,
              "input": { "location": "Rome", "day": "Sunday" } }
        ],
        "stop_reason": "tool_use",
        "usage": { "input_tokens": 380, "output_tokens": 62 }
    })
}

#[tokio::test]
async fn completion_sends_history_in_order_and_reports_usage() {
    let transport = MockTransport::new(vec![Canned::json(json!({
        "id": "msg_01",
        "type": "message",
        "role": "assistant",
        "model": MODEL,
        "content": [ { "type": "text", "text": "Doing well." } ],
        "stop_reason": "end_turn",
        "usage": { "input_tokens": 30, "output_tokens": 5 }
    }))]);
    let provider = AnthropicMessagesProvider::new(transport.clone(), "sk-ant").with_options(
        GenerationOptions {
            temperature: Some(0.2),
            ..GenerationOptions::default()
        },
    );

    let messages = vec![
        ChatMessage::system("You are concise."),
        ChatMessage::user("Hi"),
        ChatMessage::assistant("Hello!"),
        ChatMessage::user("How are you?"),
    ];
    let completion = provider
        .completion(&Context::new(), MODEL, &messages)
        .await
        .expect("completion");

    assert_eq!(completion.text, "Doing well.");
    assert_eq!((completion.input_tokens, completion.output_tokens), (30, 5));
    assert_eq!(completion.finish_reason, Some(FinishReason::Stop));

    let requests = transport.requests();
    assert_eq!(requests[0].url, "https://api.anthropic.com/v1/messages");
    assert_eq!(
        requests[0].headers.get("x-api-key").map(String::as_str),
        Some("sk-ant")
    );
    assert_eq!(
        requests[0].headers.get("anthropic-version").map(String::as_str),
        Some("2023-06-01")
    );

    let body = transport.last_body();
    assert_eq!(body["model"], MODEL);
    assert_eq!(body["system"], "You are concise.");
    assert_eq!(body["max_tokens"], json!(1024));
    let turns: Vec<(&str, &str)> = body["messages"]
        .as_array()
        .expect("messages")
        .iter()
        .map(|m| {
            (
                m["role"].as_str().unwrap_or_default(),
                m["content"][0]["text"].as_str().unwrap_or_default(),
            )
        })
        .collect();
    assert_eq!(
        turns,
        vec![("user", "Hi"), ("assistant", "Hello!"), ("user", "How are you?")]
    );
}

#[tokio::test]
async fn completion_maps_vendor_errors() {
    let transport = MockTransport::new(vec![Canned::error(
        401,
        json!({ "type": "error", "error": { "type": "authentication_error", "message": "invalid x-api-key" } }),
    )]);
    let provider = AnthropicMessagesProvider::new(transport, "bad");
    let err = provider
        .completion(&Context::new(), MODEL, &[ChatMessage::user("ping")])
        .await
        .expect_err("auth error");
    assert!(matches!(err, LLMError::Auth { .. }));
}

#[tokio::test]
async fn stream_yields_fragments_with_usage_then_done() {
    let transport = MockTransport::new(vec![Canned::sse(vec![
        message_start(12),
        text_delta("c1"),
        text_delta("c2"),
        text_delta("c3"),
        message_delta(9),
        message_stop(),
    ])]);
    let provider = AnthropicMessagesProvider::new(transport.clone(), "sk-ant");

    let mut stream = provider.stream(&Context::new(), MODEL, &[ChatMessage::user("count")]);
    let mut texts = Vec::new();
    let mut last_usage = (0, 0);
    let mut finish = None;
    let mut done = false;
    while let Some(item) = stream.next().await {
        assert!(!done, "nothing may follow Done");
        match item {
            StreamResult::Completion(c) => {
                if !c.text.is_empty() {
                    texts.push(c.text.clone());
                }
                last_usage = (c.input_tokens, c.output_tokens);
                if c.finish_reason.is_some() {
                    finish = c.finish_reason;
                }
            }
            StreamResult::Error(err) => panic!("unexpected error: {err}"),
            StreamResult::Done => done = true,
        }
    }
    assert!(done);
    assert_eq!(texts, vec!["c1", "c2", "c3"]);
    assert_eq!(last_usage, (12, 9));
    assert_eq!(finish, Some(FinishReason::Stop));
    assert_eq!(stream.state(), StreamState::Completed);

    assert_eq!(transport.last_body()["stream"], json!(true));
}

#[tokio::test]
async fn stream_collects_into_a_single_completion() {
    let transport = MockTransport::new(vec![Canned::sse(vec![
        message_start(7),
        text_delta("Hello, "),
        text_delta("world"),
        message_delta(3),
        message_stop(),
    ])]);
    let provider = AnthropicMessagesProvider::new(transport, "sk-ant");

    let completion = provider
        .stream(&Context::new(), MODEL, &[ChatMessage::user("greet")])
        .collect_completion()
        .await
        .expect("completion");
    assert_eq!(completion.text, "Hello, world");
    assert_eq!((completion.input_tokens, completion.output_tokens), (7, 3));
}

#[tokio::test]
async fn stream_error_event_ends_the_stream() {
    let transport = MockTransport::new(vec![Canned::sse(vec![
        message_start(5),
        text_delta("partial"),
        sse_event(
            "error",
            json!({ "type": "error", "error": { "type": "overloaded_error", "message": "Overloaded" } }),
        ),
        text_delta("never seen"),
    ])]);
    let provider = AnthropicMessagesProvider::new(transport, "sk-ant");

    let mut stream = provider.stream(&Context::new(), MODEL, &[ChatMessage::user("hi")]);
    assert!(matches!(stream.next().await, Some(StreamResult::Completion(_))));
    match stream.next().await {
        Some(StreamResult::Error(LLMError::Provider { message, .. })) => {
            assert!(message.contains("Overloaded"));
        }
        other => panic!("expected provider error, got {other:?}"),
    }
    assert!(stream.next().await.is_none());
    assert_eq!(stream.state(), StreamState::Failed);
}

#[tokio::test]
async fn stream_stops_when_cancelled_and_releases_the_body() {
    let transport = MockTransport::new(vec![Canned::sse_then_hang(vec![
        message_start(5),
        text_delta("c1"),
    ])]);
    let provider = AnthropicMessagesProvider::new(transport.clone(), "sk-ant");
    let ctx = Context::new();

    let mut stream = provider.stream(&ctx, MODEL, &[ChatMessage::user("long story")]);
    assert!(matches!(stream.next().await, Some(StreamResult::Completion(_))));

    stream.cancel();
    assert!(stream.next().await.is_none());
    assert_eq!(stream.state(), StreamState::Cancelled);
    assert!(!ctx.is_done(), "cancelling the stream leaves the caller's context alone");
    assert!(transport.wait_for_body_drop().await, "body should be dropped");
}

#[tokio::test]
async fn run_tools_invokes_the_requested_tool() {
    let transport = MockTransport::new(vec![Canned::json(tool_use_response("get_weather"))]);
    let provider = AnthropicMessagesProvider::new(transport.clone(), "sk-ant");
    let tools: Vec<DynTool> = vec![Arc::new(WeatherTool)];

    let result = provider
        .run_tools(
            &Context::new(),
            MODEL,
            &[ChatMessage::user("What's the weather in Rome on Sunday?")],
            &tools,
        )
        .await
        .expect("tool result");
    assert_eq!(result, json!("The weather in Rome on Sunday is fine"));

    let body = transport.last_body();
    let tool = &body["tools"][0];
    assert_eq!(tool["name"], "get_weather");
    assert_eq!(tool["input_schema"]["type"], "object");
    assert_eq!(tool["input_schema"]["properties"]["location"]["type"], "string");
    assert_eq!(tool["input_schema"]["required"], json!(["location", "day"]));
}

#[tokio::test]
async fn run_tools_rejects_unknown_function() {
    let transport = MockTransport::new(vec![Canned::json(tool_use_response("book_flight"))]);
    let provider = AnthropicMessagesProvider::new(transport, "sk-ant");
    let tools: Vec<DynTool> = vec![Arc::new(WeatherTool)];

    let err = provider
        .run_tools(&Context::new(), MODEL, &[ChatMessage::user("fly me")], &tools)
        .await
        .expect_err("unknown tool");
    assert!(matches!(err, LLMError::UnknownTool { name } if name == "book_flight"));
}

#[tokio::test]
async fn run_tools_without_tool_use_fails() {
    let transport = MockTransport::new(vec![Canned::json(json!({
        "content": [ { "type": "text", "text": "It is sunny." } ],
        "stop_reason": "end_turn"
    }))]);
    let provider = AnthropicMessagesProvider::new(transport, "sk-ant");
    let tools: Vec<DynTool> = vec![Arc::new(WeatherTool)];

    let err = provider
        .run_tools(&Context::new(), MODEL, &[ChatMessage::user("weather?")], &tools)
        .await
        .expect_err("no tool use");
    assert!(matches!(
        err,
        LLMError::NoFunctionCall {
            provider: "anthropic_messages"
        }
    ));
}

#[tokio::test]
async fn run_tools_with_empty_tool_set_is_rejected_before_sending() {
    let transport = MockTransport::new(Vec::new());
    let provider = AnthropicMessagesProvider::new(transport.clone(), "sk-ant");

    let err = provider
        .run_tools(&Context::new(), MODEL, &[ChatMessage::user("hi")], &[])
        .await
        .expect_err("validation");
    assert!(matches!(err, LLMError::Validation { .. }));
    assert!(transport.requests().is_empty());
}
