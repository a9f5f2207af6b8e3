use crate::gemini::Recommendation;
use crate::models::{ChatMessage, ChatRole, Event};

pub const GREETING: &str = "Hi! I'm your AI Event Assistant. Ask me anything about finding events!";

/// Conversation with the assistant plus the events it currently suggests.
/// While `suggested` is non-empty it replaces the manual filter result.
#[derive(Debug, Clone)]
pub struct ChatSession {
    messages: Vec<ChatMessage>,
    suggested: Vec<Event>,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self {
            messages: vec![model_message(GREETING, None)],
            suggested: Vec::new(),
        }
    }
}

fn model_message(content: &str, suggested_events: Option<Vec<Event>>) -> ChatMessage {
    ChatMessage {
        role: ChatRole::Model,
        content: content.to_string(),
        suggested_events,
    }
}

/// Events whose ids the model picked, in the order of `events`.
pub fn resolve_suggestions(events: &[Event], ids: &[String]) -> Vec<Event> {
    events
        .iter()
        .filter(|event| ids.contains(&event.id))
        .cloned()
        .collect()
}

impl ChatSession {
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn suggested(&self) -> &[Event] {
        &self.suggested
    }

    pub fn is_filter_active(&self) -> bool {
        !self.suggested.is_empty()
    }

    /// Records one exchange and replaces the suggestion list with the events
    /// the model picked. Returns the model's message.
    pub fn apply_reply(
        &mut self,
        user_message: &str,
        reply: &Recommendation,
        events: &[Event],
    ) -> ChatMessage {
        self.messages.push(ChatMessage {
            role: ChatRole::User,
            content: user_message.to_string(),
            suggested_events: None,
        });

        self.suggested = resolve_suggestions(events, &reply.event_ids);
        let attached = (!self.suggested.is_empty()).then(|| self.suggested.clone());
        let message = model_message(&reply.ai_message, attached);
        self.messages.push(message.clone());
        message
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
