use crate::gemini::{ChatRequest, Content, FragmentStream, GenerationError, GenerativeService};

/// Assistant turn used when a reply fails or times out
pub const CHAT_FAILURE: &str = "Sorry, I encountered an error.";

const SYSTEM_INSTRUCTION: &str = "You are an AI assistant integrated into a Global GDP dashboard. Answer questions about global economics, specific country stats, and comparisons concisely.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub speaker: Speaker,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self { speaker: Speaker::User, text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { speaker: Speaker::Assistant, text: text.into() }
    }

    fn to_content(&self) -> Content {
        match self.speaker {
            Speaker::User => Content::user(self.text.clone()),
            Speaker::Assistant => Content::model(self.text.clone()),
        }
    }
}

/// Index of a turn inside the [`Transcript`] that issued it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnHandle(usize);

#[cfg(test)]
impl TurnHandle {
    pub(crate) fn at(index: usize) -> Self {
        Self(index)
    }
}

/// Ordered chat turns. Turns are only appended or cleared wholesale; the one
/// in-place edit is growing a streaming turn through its handle.
#[derive(Debug, Default, Clone)]
pub struct Transcript {
    turns: Vec<ChatTurn>,
}

impl Transcript {
    pub fn push(&mut self, turn: ChatTurn) -> TurnHandle {
        self.turns.push(turn);
        TurnHandle(self.turns.len() - 1)
    }

    /// Append a streamed fragment to the turn. Returns false for a stale handle.
    pub fn append(&mut self, handle: TurnHandle, fragment: &str) -> bool {
        match self.turns.get_mut(handle.0) {
            Some(turn) => {
                turn.text.push_str(fragment);
                true
            }
            None => false,
        }
    }

    /// Replace the turn's text wholesale
    pub fn replace(&mut self, handle: TurnHandle, text: &str) -> bool {
        match self.turns.get_mut(handle.0) {
            Some(turn) => {
                turn.text.clear();
                turn.text.push_str(text);
                true
            }
            None => false,
        }
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

/// History sent to the service. A fresh session is seeded with the region
/// and its analysis as a user turn plus an acknowledging model turn.
pub fn session_history(prior: &[ChatTurn], region_name: &str, analysis: &str) -> Vec<Content> {
    if prior.is_empty() {
        return vec![
            Content::user(format!("I am looking at {region_name}. Context: {analysis}")),
            Content::model(format!("Understood. I will answer questions about {region_name}.")),
        ];
    }
    prior
        .iter()
        // Empty placeholder turns are rejected by the service
        .filter(|turn| !turn.text.is_empty())
        .map(ChatTurn::to_content)
        .collect()
}

pub fn build_request(
    prior: &[ChatTurn],
    region_name: &str,
    analysis: &str,
    message: &str,
) -> ChatRequest {
    ChatRequest {
        system_instruction: SYSTEM_INSTRUCTION.to_string(),
        history: session_history(prior, region_name, analysis),
        message: message.to_string(),
    }
}

/// Send `request` and return the reply as fragments. Concatenating the
/// fragments in arrival order yields the full reply.
pub async fn stream_reply(
    service: &dyn GenerativeService,
    request: &ChatRequest,
) -> Result<FragmentStream, GenerationError> {
    service.stream_chat(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::testing::FakeService;
    use crate::gemini::Role;
    use futures_util::StreamExt;

    #[test]
    fn test_fresh_session_is_seeded() {
        let history = session_history(&[], "India", "- fast growth");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].text, "I am looking at India. Context: - fast growth");
        assert_eq!(history[1].role, Role::Model);
        assert_eq!(history[1].text, "Understood. I will answer questions about India.");
    }

    #[test]
    fn test_existing_session_sends_prior_turns_only() {
        let prior = vec![
            ChatTurn::user("q1"),
            ChatTurn::assistant("a1"),
            ChatTurn::assistant(""),
        ];
        let history = session_history(&prior, "India", "ignored");
        assert_eq!(history, vec![Content::user("q1"), Content::model("a1")]);
    }

    #[test]
    fn test_transcript_handles() {
        let mut transcript = Transcript::default();
        transcript.push(ChatTurn::user("hi"));
        let handle = transcript.push(ChatTurn::assistant(""));
        assert!(transcript.append(handle, "Hel"));
        assert!(transcript.append(handle, "lo"));
        assert_eq!(transcript.turns()[handle.0].text, "Hello");
        assert!(transcript.replace(handle, CHAT_FAILURE));
        assert_eq!(transcript.turns()[handle.0].text, CHAT_FAILURE);

        transcript.clear();
        assert!(!transcript.append(handle, "late"));
        assert!(transcript.is_empty());
    }

    #[tokio::test]
    async fn test_stream_reply_yields_fragments_in_order() {
        let service = FakeService::default().with_reply(vec![Ok("Hel"), Ok("lo wo"), Ok("rld")]);
        let request = build_request(&[], "Peru", "", "How big?");
        let stream = stream_reply(&service, &request).await.unwrap();
        let fragments: Vec<String> = stream.map(|f| f.unwrap()).collect().await;
        assert_eq!(fragments.concat(), "Hello world");
        assert_eq!(service.chat_requests.lock().unwrap()[0].message, "How big?");
    }
}
