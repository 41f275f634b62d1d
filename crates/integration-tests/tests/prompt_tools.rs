mod harness;

use std::sync::Arc;

use converse_llm::{ChatService, ToolDefinition};
use harness::config::{collect, content, params, provider};
use harness::mock_vendor::{MockReply, MockVendor};
use serde_json::{Value, json};

fn chat_delta(text: &str) -> Value {
    json!({"choices": [{"delta": {"content": text}}]})
}

#[tokio::test]
async fn xml_tool_block_split_across_events_is_executed() {
    let mock = MockVendor::start(vec![
        MockReply::sse_done(&[
            chat_delta("Let me check. <too"),
            chat_delta("l_use>\n<name>clock</name>\n<argu"),
            chat_delta("ments>{\"zone\": \"UTC\"}</arguments>\n</tool_"),
            chat_delta("use>"),
            json!({"choices": [], "usage": {"prompt_tokens": 200, "completion_tokens": 30}}),
        ]),
        MockReply::sse_done(&[
            chat_delta("It is noon."),
            json!({"choices": [], "usage": {"prompt_tokens": 260, "completion_tokens": 5}}),
        ]),
    ])
    .await
    .unwrap();

    let tool = ToolDefinition::new(
        "clock",
        "Current time",
        json!({"type": "object", "properties": {"zone": {"type": "string", "description": "IANA zone"}}}),
    );
    let executor = Arc::new(|_: String, args: Value| async move {
        Ok::<_, anyhow::Error>(format!("12:00 {}", args["zone"].as_str().unwrap_or_default()))
    });
    let mut request = params(provider("local", "ollama", &mock.base_url()), "llama3.1", "What time is it?")
        .with_tools(vec![tool], executor);
    request.prompt_tool_use = true;

    let stream = ChatService::default().send_message_stream(request).await.unwrap();
    let chunks = collect(stream).await.unwrap();

    assert_eq!(content(&chunks), "Let me check. It is noon.");
    assert!(chunks.iter().all(|c| !c.content.as_deref().unwrap_or_default().contains("tool_use")));
    let call = chunks.iter().find_map(|c| c.tool_calls.clone()).unwrap();
    assert_eq!((call[0].name.as_str(), &call[0].arguments), ("clock", &json!({"zone": "UTC"})));

    let usage = chunks.last().unwrap().usage.clone().unwrap();
    assert_eq!((usage.prompt_tokens, usage.completion_tokens), (260, 35));
    assert_eq!(usage.round_usages.map(|r| r.len()), Some(2));

    let requests = mock.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|r| r.body.get("tools").is_none()));

    let first = requests[0].body["messages"].as_array().unwrap();
    assert_eq!(first[0]["role"], "system");
    let system = first[0]["content"].as_str().unwrap();
    assert!(system.contains("## clock"));
    assert!(system.contains("- zone (string, optional): IANA zone"));

    let second = requests[1].body["messages"].as_array().unwrap();
    assert_eq!(second.len(), 4);
    assert_eq!(second[2]["role"], "assistant");
    assert!(second[2]["content"].as_str().unwrap().starts_with("Let me check. <tool_use>"));
    assert_eq!(second[3]["role"], "user");
    assert_eq!(
        second[3]["content"],
        "<tool_use_result>\n<name>clock</name>\n<result>12:00 UTC</result>\n</tool_use_result>"
    );
}

#[tokio::test]
async fn text_without_tool_block_passes_through() {
    let mock = MockVendor::start(vec![MockReply::sse_done(&[
        chat_delta("a < b and "),
        chat_delta("<b>bold</b>"),
    ])])
    .await
    .unwrap();

    let tool = ToolDefinition::new("noop", "", json!({"type": "object"}));
    let executor = Arc::new(|_: String, _: Value| async move { Ok::<_, anyhow::Error>(String::new()) });
    let mut request = params(provider("local", "ollama", &mock.base_url()), "llama3.1", "Compare")
        .with_tools(vec![tool], executor);
    request.prompt_tool_use = true;

    let stream = ChatService::default().send_message_stream(request).await.unwrap();
    let chunks = collect(stream).await.unwrap();

    assert_eq!(content(&chunks), "a < b and <b>bold</b>");
    assert_eq!(mock.request_count(), 1);
}
