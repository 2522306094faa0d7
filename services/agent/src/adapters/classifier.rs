//! services/agent/src/adapters/classifier.rs
//!
//! This module contains the adapter for the task-classification LLM.
//! It implements the `ClassifierService` port from the `core` crate: one
//! fresh model session per message, answering with a schema-pinned reply.

const SYSTEM_PROMPT_TEMPLATE: &str = r#"You are a personal assistant for workplace productivity. You're assisting {display_name} with their work,
which involves the following: {work_scope}.
You will be given a message from a workplace chat, and you will create a task for it if the context makes sense.
You can use the information from the message to figure out the task name, description, due date, and priority.
You will also be given a list of tasks associated with the sender's ID.
If there is no task to create, you will simply respond with a summary of the message you received, return task_created as false.
Also, every message that is not in English should be translated to English.
When communicating with the user, always use the name {display_name}, and keep in mind the following instructions: {instructions}.

Example scenario:

Let's say you have this task list known:

- Train the new hire
- Finish the report for the client
- Send the analytics data

'Sender: John. Sender ID: 12345. Timestamp: 2025-04-18 10:00:00
Hey {display_name}, can you please give me an update on the training of the new hire? I was expecting a message before yesterday's EOD. Thanks!'

Example response:
'Hey {display_name}, John sent you a message asking for an update regarding the training of the new hire.'

END OF EXAMPLE SCENARIO

As you can see, the message is not a task, but it is related to one of the tasks in the list. That's why we will not need to create a task in the database.

Here is another example:
'Sender: Mary. Sender ID: 54321. Timestamp: 2025-05-18 10:00:00
Hi {display_name}, can you please send the analytics data to the client? I need it by tomorrow EOD. Thanks!'

Example response:
'Hey {display_name}, Mary sent you a message asking for the analytics data. I will create a task for it.'
- task_name: Send analytics data to the client
- description: Send the analytics data to the client as requested by Mary.
- due_date: 2025-05-19
- priority: 2
END OF EXAMPLE SCENARIO"#;

const USER_PROMPT_TEMPLATE: &str = r#"{display_name} has an incoming message from {sender_name} (ID: {sender_id}).
Here is the list of tasks associated with this ID:
{known_tasks}

And here is the message: {text}. Timestamp: {timestamp}.
In English, what is the message about? Is there a task to create? If so, please create it.
If the task is present in the list of associated tasks already, do not create a task for it.
If not, just summarize the message."#;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, ResponseFormat, ResponseFormatJsonSchema,
    },
    Client,
};
use async_trait::async_trait;
use taskpilot_core::domain::{ClassificationReply, InboundMessage, Task, UserProfile};
use taskpilot_core::ports::{ClassifierService, PortError, PortResult};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `ClassifierService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiClassifierAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiClassifierAdapter {
    /// Creates a new `OpenAiClassifierAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

/// The fixed shape the model must answer with. `task` is null when no task
/// is proposed; strict mode rejects any extra or missing field.
fn reply_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "task_created": { "type": "boolean" },
            "message": { "type": "string" },
            "task": {
                "anyOf": [
                    {
                        "type": "object",
                        "properties": {
                            "task_name": { "type": "string" },
                            "description": { "type": "string" },
                            "due_date": {
                                "type": "string",
                                "description": "Calendar date, YYYY-MM-DD"
                            },
                            "priority": { "type": "integer" }
                        },
                        "required": ["task_name", "description", "due_date", "priority"],
                        "additionalProperties": false
                    },
                    { "type": "null" }
                ]
            }
        },
        "required": ["task_created", "message", "task"],
        "additionalProperties": false
    })
}

fn render_known_tasks(known_tasks: &[Task]) -> String {
    if known_tasks.is_empty() {
        return "(none)".to_string();
    }
    known_tasks
        .iter()
        .map(|task| {
            format!(
                "- {}: {} (due {}, priority {})",
                task.task_name, task.description, task.due_date, task.priority
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parses the model's JSON answer into the reply type, mapping any shape
/// mismatch to a schema error so the caller can skip just this message.
fn parse_reply(content: &str) -> PortResult<ClassificationReply> {
    serde_json::from_str::<ClassificationReply>(content)
        .map_err(|e| PortError::Schema(e.to_string()))
}

//=========================================================================================
// `ClassifierService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ClassifierService for OpenAiClassifierAdapter {
    async fn classify(
        &self,
        profile: &UserProfile,
        message: &InboundMessage,
        known_tasks: &[Task],
    ) -> PortResult<ClassificationReply> {
        let system_prompt = SYSTEM_PROMPT_TEMPLATE
            .replace("{display_name}", &profile.display_name)
            .replace("{work_scope}", &profile.work_scope)
            .replace("{instructions}", &profile.instructions);

        let user_prompt = USER_PROMPT_TEMPLATE
            .replace("{display_name}", &profile.display_name)
            .replace("{sender_name}", &message.sender_name)
            .replace("{sender_id}", &message.sender_id)
            .replace("{known_tasks}", &render_known_tasks(known_tasks))
            .replace("{text}", &message.text)
            .replace(
                "{timestamp}",
                &message.created_at.format("%a %d %b %Y, %I:%M%p").to_string(),
            );

        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system_prompt)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user_prompt)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .response_format(ResponseFormat::JsonSchema {
                json_schema: ResponseFormatJsonSchema {
                    description: Some(
                        "Decision on whether a chat message implies a work task.".to_string(),
                    ),
                    name: "classification_reply".to_string(),
                    schema: Some(reply_schema()),
                    strict: Some(true),
                },
            })
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Call the API and manually map the error, which respects the orphan rule.
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PortError::Unexpected("Classifier response contained no text content.".to_string())
            })?;

        parse_reply(&content)
    }
}
