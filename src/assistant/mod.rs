//! Conversational query resolver.
//!
//! The chat model replies in free text and may append one trailing JSON
//! object describing an action to take. The resolver strips the payload,
//! dispatches the action against the index and the mailer, and folds the
//! result back into the text shown to the user. A failed model call becomes
//! a fixed apology reply and anything that goes wrong after the model
//! replied degrades to the plain text; the conversation never errors out
//! because the model was down, a payload was malformed, or a name matched
//! nothing.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use crate::db::Database;
use crate::groups::GroupManager;
use crate::mailer::Mailer;

/// One prior exchange in the conversation
#[derive(Debug, Clone, Serialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: &str) -> Self {
        Self { role: "user".to_string(), content: content.to_string() }
    }

    pub fn assistant(content: &str) -> Self {
        Self { role: "assistant".to_string(), content: content.to_string() }
    }

    fn system(content: String) -> Self {
        Self { role: "system".to_string(), content }
    }
}

pub trait ChatModel: Send + Sync {
    /// Return the model's reply to the full message list
    fn complete(&self, messages: &[ChatTurn]) -> Result<String>;

    /// Provider name for display
    fn provider_name(&self) -> &'static str;
}

/// Reply shown when the chat model itself is unreachable or errors out
const FALLBACK_REPLY: &str = "Sorry, an error occurred.";

/// Action payload the model may append to its reply
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Intent {
    ShowPhotos { person_name: String },
    ListFolders,
    SendEmail { person_name: String, recipient: String },
    RenamePerson { old_name: String, new_name: String },
}

/// Split a model reply into its plain text and an optional trailing intent.
/// The payload is the last `{...}` span in the reply; text before and after
/// it is kept. A span that does not parse as an intent is treated as prose.
pub fn extract_intent(reply: &str) -> (String, Option<Intent>) {
    let end = match reply.rfind('}') {
        Some(i) => i,
        None => return (reply.trim().to_string(), None),
    };
    let start = match reply[..end].rfind('{') {
        Some(i) => i,
        None => return (reply.trim().to_string(), None),
    };

    let candidate = &reply[start..=end];
    match serde_json::from_str::<Intent>(candidate) {
        Ok(intent) => {
            let plain = format!(
                "{} {}",
                reply[..start].trim(),
                reply[end + 1..].trim()
            );
            (plain.trim().to_string(), Some(intent))
        }
        Err(_) => (reply.trim().to_string(), None),
    }
}

// ============================================================================
// OpenAI-compatible chat provider
// ============================================================================

pub struct OpenAiChatModel {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatTurn],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl OpenAiChatModel {
    pub fn new(endpoint: &str, model: &str, api_key: Option<&str>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            api_key: api_key.map(|s| s.to_string()),
            timeout,
        }
    }
}

impl ChatModel for OpenAiChatModel {
    fn complete(&self, messages: &[ChatTurn]) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: 0.4,
        };

        let url = format!("{}/chat/completions", self.endpoint);

        let agent = ureq::AgentBuilder::new().timeout(self.timeout).build();

        let mut req = agent.post(&url).set("Content-Type", "application/json");

        if let Some(ref api_key) = self.api_key {
            req = req.set("Authorization", &format!("Bearer {}", api_key));
        }

        let response = req
            .send_json(&request)
            .map_err(|e| anyhow!("Chat request failed: {}", e))?;

        let chat_response: ChatResponse = response
            .into_json()
            .map_err(|e| anyhow!("Failed to parse chat response: {}", e))?;

        chat_response
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| anyhow!("No response from chat model"))
    }

    fn provider_name(&self) -> &'static str {
        "OpenAI-compatible chat"
    }
}

// ============================================================================
// Resolver
// ============================================================================

pub struct Assistant<'a> {
    db: &'a Database,
    groups: &'a GroupManager<'a>,
    mailer: &'a Mailer<'a>,
    model: &'a dyn ChatModel,
    history_window: usize,
}

impl<'a> Assistant<'a> {
    pub fn new(
        db: &'a Database,
        groups: &'a GroupManager<'a>,
        mailer: &'a Mailer<'a>,
        model: &'a dyn ChatModel,
        history_window: usize,
    ) -> Self {
        Self {
            db,
            groups,
            mailer,
            model,
            history_window,
        }
    }

    /// Answer one user message, dispatching any trailing action payload.
    pub fn chat(&self, owner: &str, message: &str, history: &[ChatTurn]) -> Result<String> {
        let mut messages = vec![ChatTurn::system(self.system_prompt(owner)?)];

        let tail = history.len().saturating_sub(self.history_window);
        messages.extend(history[tail..].iter().cloned());
        messages.push(ChatTurn::user(message));

        let reply = match self.model.complete(&messages) {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Chat model call failed: {}", e);
                return Ok(FALLBACK_REPLY.to_string());
            }
        };
        let (plain, intent) = extract_intent(&reply);

        let intent = match intent {
            Some(intent) => intent,
            None => return Ok(plain),
        };
        info!("Dispatching chat action: {:?}", intent);

        let appendix = match self.dispatch(owner, &intent) {
            Ok(appendix) => appendix,
            Err(e) => {
                // The model's text still stands on its own
                warn!("Chat action failed: {}", e);
                return Ok(plain);
            }
        };

        if plain.is_empty() {
            Ok(appendix)
        } else {
            Ok(format!("{}\n\n{}", plain, appendix))
        }
    }

    fn system_prompt(&self, owner: &str) -> Result<String> {
        let inventory: Vec<String> = self
            .groups
            .persons_overview(owner)?
            .iter()
            .map(|s| format!("- {} ({} photo(s))", s.person.name, s.photo_count))
            .collect();

        let folders = if inventory.is_empty() {
            "(no folders yet)".to_string()
        } else {
            inventory.join("\n")
        };

        Ok(format!(
            "You are the assistant of a personal photo library. \
             The user's folders:\n{}\n\n\
             Answer briefly. When the user asks to see a person's photos, \
             list all folders, email someone's photos, or rename a group, \
             append ONE JSON object as the last line of your reply, e.g. \
             {{\"action\": \"show_photos\", \"person_name\": \"...\"}}, \
             {{\"action\": \"list_folders\"}}, \
             {{\"action\": \"send_email\", \"person_name\": \"...\", \"recipient\": \"...\"}}, \
             {{\"action\": \"rename_person\", \"old_name\": \"...\", \"new_name\": \"...\"}}. \
             Otherwise reply with plain text only.",
            folders
        ))
    }

    fn dispatch(&self, owner: &str, intent: &Intent) -> Result<String> {
        match intent {
            Intent::ShowPhotos { person_name } => {
                let person = match self.db.find_person_by_name(owner, person_name)? {
                    Some(p) => p,
                    None => return Ok(format!("I couldn't find a folder for \"{}\".", person_name)),
                };
                let photos = self
                    .groups
                    .person_photos(owner, &person.id)?
                    .unwrap_or_default();
                if photos.is_empty() {
                    return Ok(format!("\"{}\" has no photos yet.", person.name));
                }
                let lines: Vec<String> = photos
                    .iter()
                    .map(|p| format!("- {} ({})", p.filename, p.locator))
                    .collect();
                Ok(format!(
                    "{} photo(s) in \"{}\":\n{}",
                    photos.len(),
                    person.name,
                    lines.join("\n")
                ))
            }
            Intent::ListFolders => {
                let overview = self.groups.persons_overview(owner)?;
                if overview.is_empty() {
                    return Ok("There are no folders yet.".to_string());
                }
                let lines: Vec<String> = overview
                    .iter()
                    .map(|s| format!("- {} ({} photo(s))", s.person.name, s.photo_count))
                    .collect();
                Ok(lines.join("\n"))
            }
            Intent::SendEmail {
                person_name,
                recipient,
            } => {
                let person = match self.db.find_person_by_name(owner, person_name)? {
                    Some(p) => p,
                    None => return Ok(format!("I couldn't find a folder for \"{}\".", person_name)),
                };
                let outcome =
                    self.mailer
                        .send_group(owner, self.groups, &person.id, recipient, None)?;
                if outcome.success {
                    Ok(format!(
                        "Sent {} photo(s) of \"{}\" to {}.",
                        outcome.photos_sent, person.name, recipient
                    ))
                } else {
                    Ok(format!(
                        "Couldn't send photos of \"{}\": {}",
                        person.name,
                        outcome.error.unwrap_or_else(|| "unknown error".to_string())
                    ))
                }
            }
            Intent::RenamePerson { old_name, new_name } => {
                let person = match self.db.find_person_by_name(owner, old_name)? {
                    Some(p) => p,
                    None => return Ok(format!("I couldn't find a folder for \"{}\".", old_name)),
                };
                if self.groups.rename(owner, &person.id, new_name)? {
                    Ok(format!("Renamed \"{}\" to \"{}\".", person.name, new_name))
                } else {
                    Ok(format!("Couldn't rename \"{}\".", person.name))
                }
            }
        }
    }
}
