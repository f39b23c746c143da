//! Chat-completion driver for the `/v1/chat/completions` SSE wire format
//! shared by OpenAI and OpenAI-compatible servers (Azure, local proxies).

use anyhow::{bail, Context};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::debug;

use crate::{provider::ResponseStream, CompletionRequest, MessageContent, Role};

pub struct OpenAiCompatProvider {
    model: String,
    api_key: Option<String>,
    chat_url: String,
    max_tokens: u32,
    temperature: f32,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(
        model: String,
        api_key: Option<String>,
        base_url: Option<String>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Self {
        let base = base_url.unwrap_or_else(|| "https://api.openai.com/v1".into());
        let base = base.trim_end_matches('/').to_string();
        Self {
            model,
            api_key,
            chat_url: format!("{base}/chat/completions"),
            max_tokens: max_tokens.unwrap_or(4096),
            temperature: temperature.unwrap_or(0.2),
            client: reqwest::Client::new(),
        }
    }
}

fn build_openai_messages(messages: &[crate::Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| match (&m.role, &m.content) {
            (Role::System, MessageContent::Text(t)) => json!({ "role": "system", "content": t }),
            (Role::User, MessageContent::Text(t)) => json!({ "role": "user", "content": t }),
            (Role::Assistant, MessageContent::Text(t)) => {
                json!({ "role": "assistant", "content": t })
            }
            (_, MessageContent::ToolCall { tool_call_id, function }) => json!({
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": tool_call_id,
                    "type": "function",
                    "function": { "name": function.name, "arguments": function.arguments },
                }]
            }),
            (_, MessageContent::ToolResult { tool_call_id, content }) => json!({
                "role": "tool",
                "tool_call_id": tool_call_id,
                "content": content,
            }),
            (_, MessageContent::Text(t)) => json!({ "role": "user", "content": t }),
        })
        .collect()
}

#[async_trait]
impl crate::ModelProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai"
    }
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream> {
        let key = self
            .api_key
            .as_deref()
            .context("API key not set; provide api_key or api_key_env in config")?;

        let messages = build_openai_messages(&req.messages);
        let tools: Vec<Value> = req
            .tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "stream": req.stream,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "stream_options": { "include_usage": true },
        });
        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }

        debug!(model = %self.model, tool_count = tools.len(), "sending openai-compat request");

        let resp = self
            .client
            .post(&self.chat_url)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .context("openai-compat request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("openai-compat error {status}: {text}");
        }

        let byte_stream = resp.bytes_stream();
        let event_stream = byte_stream
            .scan(String::new(), |buf, chunk| {
                let events = match chunk {
                    Ok(b) => {
                        buf.push_str(&String::from_utf8_lossy(&b));
                        drain_complete_sse_lines(buf)
                    }
                    Err(e) => vec![Err(anyhow::anyhow!(e))],
                };
                futures::future::ready(Some(events))
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(event_stream))
    }
}

fn parse_sse_data_line(line: &str) -> Option<anyhow::Result<crate::ResponseEvent>> {
    let data = line.strip_prefix("data: ")?.trim();
    if data.is_empty() {
        return None;
    }
    if data == "[DONE]" {
        return Some(Ok(crate::ResponseEvent::Done));
    }
    let v: Value = serde_json::from_str(data).ok()?;
    Some(parse_sse_chunk(&v))
}

fn drain_complete_sse_lines(buf: &mut String) -> Vec<anyhow::Result<crate::ResponseEvent>> {
    let mut events = Vec::new();
    while let Some(nl_pos) = buf.find('\n') {
        let line = buf[..nl_pos].trim_end_matches('\r').to_string();
        *buf = buf[nl_pos + 1..].to_string();
        if let Some(ev) = parse_sse_data_line(&line) {
            events.push(ev);
        }
    }
    events
}

fn parse_sse_chunk(v: &Value) -> anyhow::Result<crate::ResponseEvent> {
    use crate::ResponseEvent;

    if let Some(usage) = v.get("usage").filter(|u| !u.is_null()) {
        return Ok(ResponseEvent::Usage {
            input_tokens: usage["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: usage["completion_tokens"].as_u64().unwrap_or(0) as u32,
        });
    }

    let choice = &v["choices"][0];
    if choice.is_null() {
        return Ok(ResponseEvent::TextDelta(String::new()));
    }

    if choice["finish_reason"].as_str().is_some()
        && choice["finish_reason"].as_str() != Some("null")
        && !choice["finish_reason"].is_null()
    {
        return Ok(ResponseEvent::Done);
    }

    let delta = &choice["delta"];
    if let Some(tool_calls) = delta["tool_calls"].as_array() {
        if let Some(tc) = tool_calls.first() {
            return Ok(ResponseEvent::ToolCall {
                index: tc["index"].as_u64().unwrap_or(0) as u32,
                id: tc["id"].as_str().unwrap_or("").to_string(),
                name: tc["function"]["name"].as_str().unwrap_or("").to_string(),
                arguments: tc["function"]["arguments"].as_str().unwrap_or("").to_string(),
            });
        }
    }

    let text = delta["content"].as_str().unwrap_or("").to_string();
    Ok(ResponseEvent::TextDelta(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_text_delta_chunk() {
        let v = json!({ "choices": [{ "delta": { "content": "hi" } }] });
        match parse_sse_chunk(&v).unwrap() {
            crate::ResponseEvent::TextDelta(t) => assert_eq!(t, "hi"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parse_tool_call_chunk() {
        let v = json!({
            "choices": [{
                "delta": {
                    "tool_calls": [{
                        "index": 0,
                        "id": "call-1",
                        "function": { "name": "execute_sql", "arguments": "{\"sql\":" }
                    }]
                }
            }]
        });
        match parse_sse_chunk(&v).unwrap() {
            crate::ResponseEvent::ToolCall { id, name, arguments, .. } => {
                assert_eq!(id, "call-1");
                assert_eq!(name, "execute_sql");
                assert_eq!(arguments, "{\"sql\":");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parse_done_marker() {
        let mut buf = String::from("data: [DONE]\n");
        let events = drain_complete_sse_lines(&mut buf);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].as_ref().unwrap(), crate::ResponseEvent::Done));
    }

    #[test]
    fn drain_leaves_incomplete_line_in_buffer() {
        let mut buf = String::from("data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\nda");
        let events = drain_complete_sse_lines(&mut buf);
        assert_eq!(events.len(), 1);
        assert_eq!(buf, "da");
    }
}
