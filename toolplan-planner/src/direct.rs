//! Single-turn function calling: the model picks tools, the executor runs them.

use toolplan_adapters::{InferenceRequest, ModelAdapter, strip_think_tags};
use toolplan_primitives::CallContext;
use toolplan_tools::{Executor, ToolResult};

use crate::model;
use crate::prompt::TOOL_CALL_SYSTEM;

/// Sends `query` together with the executor's tool definitions and runs the
/// tool calls the model emits, in order.
///
/// Returns the joined tool outputs, or the model's own text when it called no
/// tool. Only tools active in `executor` can run.
///
/// # Errors
///
/// Returns the model failure, or the first failing tool call's error; later
/// calls do not run.
pub async fn ask_with_tools(
    ctx: &CallContext,
    adapter: &dyn ModelAdapter,
    executor: &Executor,
    query: &str,
) -> ToolResult<String> {
    let request = InferenceRequest::user(query)
        .with_system_prompt(TOOL_CALL_SYSTEM)
        .with_tools(executor.tool_specs());
    let output = model::infer(ctx, adapter, "model:call", request).await?;

    let from_tools = executor.process_tool_calls(ctx, &output.tool_calls).await?;
    let content = if from_tools.is_empty() {
        output.text
    } else {
        from_tools
    };
    Ok(strip_think_tags(&content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use futures::stream;
    use serde_json::{Value, json};
    use toolplan_adapters::{AdapterMetadata, AdapterResult, AdapterStream, InferenceChunk};
    use toolplan_primitives::{Config, ToolCall};
    use toolplan_tools::{
        BuildContext, ErrorKind, RegistryBuilder, ToolDescriptor, ToolMetadata,
    };

    struct OneReply {
        metadata: AdapterMetadata,
        reply: InferenceChunk,
        offered: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ModelAdapter for OneReply {
        fn metadata(&self) -> &AdapterMetadata {
            &self.metadata
        }

        async fn infer(&self, request: InferenceRequest) -> AdapterResult<AdapterStream> {
            self.offered
                .lock()
                .unwrap()
                .extend(request.tools().iter().map(|spec| spec.name.clone()));
            Ok(Box::pin(stream::iter(vec![Ok(self.reply.clone())])))
        }
    }

    fn adapter(reply: InferenceChunk) -> OneReply {
        OneReply {
            metadata: AdapterMetadata::new("scripted", "tool-caller"),
            reply,
            offered: Mutex::new(Vec::new()),
        }
    }

    async fn executor(whitelist: &[&str]) -> Executor {
        let mut builder = RegistryBuilder::new();
        for name in ["upper", "reverse"] {
            builder.register(
                name,
                move |_ctx: &BuildContext, _config: &Config| -> ToolResult<Option<ToolDescriptor>> {
                    let metadata = ToolMetadata::new(
                        name,
                        format!("{name}s a word"),
                        json!({
                            "type": "object",
                            "properties": {"word": {"type": "string"}},
                            "required": ["word"]
                        }),
                    )?;
                    Ok(Some(ToolDescriptor::new(
                        metadata,
                        move |_ctx: CallContext, input: Value| async move {
                            let word = input["word"].as_str().unwrap_or_default().to_owned();
                            Ok(if name == "upper" {
                                word.to_uppercase()
                            } else {
                                word.chars().rev().collect()
                            })
                        },
                    )))
                },
            );
        }
        Executor::builder(builder.freeze())
            .whitelist(whitelist.iter().copied())
            .build(&CallContext::new(), &Config::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn runs_emitted_tool_calls() {
        let model = adapter(InferenceChunk::new("", true).with_tool_calls(vec![
            ToolCall::new("upper", r#"{"word":"banana"}"#),
            ToolCall::new("reverse", r#"{"word":"banana"}"#),
        ]));
        let mut executor = executor(&["upper", "reverse"]).await;

        let answer = ask_with_tools(&CallContext::new(), &model, &executor, "shout banana")
            .await
            .unwrap();
        assert_eq!(answer, "BANANA\nananab");
        assert_eq!(*model.offered.lock().unwrap(), ["upper", "reverse"]);

        executor.cleanup().await.unwrap();
    }

    #[tokio::test]
    async fn falls_back_to_model_text() {
        let model = adapter(InferenceChunk::new("<think>no tool needed</think>banana", true));
        let mut executor = executor(&["upper"]).await;

        let answer = ask_with_tools(&CallContext::new(), &model, &executor, "say banana")
            .await
            .unwrap();
        assert_eq!(answer, "banana");

        executor.cleanup().await.unwrap();
    }

    #[tokio::test]
    async fn calls_outside_the_executor_are_refused() {
        let model = adapter(
            InferenceChunk::new("", true)
                .with_tool_calls(vec![ToolCall::new("reverse", r#"{"word":"banana"}"#)]),
        );
        let mut executor = executor(&["upper"]).await;

        let err = ask_with_tools(&CallContext::new(), &model, &executor, "reverse banana")
            .await
            .expect_err("reverse is not whitelisted");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(*model.offered.lock().unwrap(), ["upper"]);

        executor.cleanup().await.unwrap();
    }

    #[tokio::test]
    async fn cancelled_context_sends_nothing() {
        let model = adapter(InferenceChunk::new("banana", true));
        let mut executor = executor(&["upper"]).await;
        let ctx = CallContext::new();
        ctx.cancel();

        let err = ask_with_tools(&ctx, &model, &executor, "say banana")
            .await
            .expect_err("cancelled");
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(model.offered.lock().unwrap().is_empty());

        executor.cleanup().await.unwrap();
    }
}
