use crate::error::PipelineError;
use crate::index::ChunkIndex;
use crate::llm::ChatMessage;
use crate::models::{PipelineOptions, QueryResult, ScoredChunk};
use crate::traits::{ChatModel, Embedder};
use std::fmt::Write as _;
use tracing::{debug, warn};

const CONDENSE_INSTRUCTION: &str = "Given the conversation so far and a follow-up question, \
rephrase the follow-up into a standalone question. Reply with the question only.";

/// Retrieves context for a question and asks the chat model to answer it.
pub struct AnswerSynthesizer<'a, E: ?Sized, M: ?Sized> {
    embedder: &'a E,
    chat: &'a M,
    options: &'a PipelineOptions,
}

impl<'a, E, M> AnswerSynthesizer<'a, E, M>
where
    E: Embedder + ?Sized,
    M: ChatModel + ?Sized,
{
    pub fn new(embedder: &'a E, chat: &'a M, options: &'a PipelineOptions) -> Self {
        Self {
            embedder,
            chat,
            options,
        }
    }

    pub async fn answer(
        &self,
        question: &str,
        dialogue: &[(String, String)],
        index: &ChunkIndex,
    ) -> Result<QueryResult, PipelineError> {
        if index.model_id() != self.embedder.model_id() {
            return Err(PipelineError::embedding(
                self.embedder.model_id(),
                format!(
                    "index was built with {}; rebuild it before querying",
                    index.model_id()
                ),
            ));
        }

        let retrieval_question = if self.options.condense_follow_ups && !dialogue.is_empty() {
            self.condense(question, dialogue).await?
        } else {
            question.to_string()
        };

        let query_vector = self.embedder.embed(&retrieval_question).await?;
        let hits = index.search(&query_vector, self.options.top_k.max(1));
        debug!(
            hits = hits.len(),
            top_score = hits.first().map(|hit| hit.score),
            "retrieved context"
        );

        let messages = build_messages(
            &self.options.system_prompt,
            &hits,
            dialogue,
            self.options.history_turns,
            question,
        );
        let answer = self.chat.complete(&messages).await?;
        if answer.trim().is_empty() {
            return Err(PipelineError::synthesis(
                self.chat.model_id(),
                "model returned an empty answer",
            ));
        }

        Ok(QueryResult {
            answer,
            cited_page_index: cite(&hits, self.options.min_citation_score),
            sources: hits,
        })
    }

    async fn condense(
        &self,
        question: &str,
        dialogue: &[(String, String)],
    ) -> Result<String, PipelineError> {
        let messages = condense_messages(question, dialogue, self.options.history_turns);
        let standalone = self.chat.complete(&messages).await?;
        let standalone = standalone.trim();
        if standalone.is_empty() {
            warn!(
                model = %self.chat.model_id(),
                "condensing returned an empty question; retrieving with the original wording"
            );
            return Ok(question.to_string());
        }
        debug!(original = question, standalone, "condensed follow-up question");
        Ok(standalone.to_string())
    }
}

fn recent(dialogue: &[(String, String)], history_turns: usize) -> &[(String, String)] {
    &dialogue[dialogue.len().saturating_sub(history_turns)..]
}

/// System prompt with numbered passages, the most recent turns, then the question.
pub fn build_messages(
    system_prompt: &str,
    hits: &[ScoredChunk],
    dialogue: &[(String, String)],
    history_turns: usize,
    question: &str,
) -> Vec<ChatMessage> {
    let mut system = String::from(system_prompt);
    system.push_str("\n\nContext:\n");
    if hits.is_empty() {
        system.push_str("(no passages were found in the document)\n");
    }
    for (position, hit) in hits.iter().enumerate() {
        let _ = writeln!(
            system,
            "[{}] (page {})\n{}\n",
            position + 1,
            hit.chunk.page_index + 1,
            hit.chunk.text.trim()
        );
    }

    let mut messages = vec![ChatMessage::system(system)];
    for (previous_question, previous_answer) in recent(dialogue, history_turns) {
        messages.push(ChatMessage::user(previous_question.clone()));
        messages.push(ChatMessage::assistant(previous_answer.clone()));
    }
    messages.push(ChatMessage::user(question));
    messages
}

pub fn condense_messages(
    question: &str,
    dialogue: &[(String, String)],
    history_turns: usize,
) -> Vec<ChatMessage> {
    let mut transcript = String::new();
    for (previous_question, previous_answer) in recent(dialogue, history_turns) {
        let _ = writeln!(transcript, "Human: {previous_question}\nAssistant: {previous_answer}");
    }

    vec![
        ChatMessage::system(CONDENSE_INSTRUCTION),
        ChatMessage::user(format!(
            "Conversation:\n{transcript}\nFollow-up question: {question}"
        )),
    ]
}

/// Page of the top hit, unless it scores below `min_score`.
pub fn cite(hits: &[ScoredChunk], min_score: Option<f32>) -> Option<u32> {
    let top = hits.first()?;
    match min_score {
        Some(threshold) if top.score < threshold => {
            warn!(
                score = top.score,
                threshold, "top passage below citation threshold; answer left uncited"
            );
            None
        }
        _ => Some(top.chunk.page_index),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::llm::Role;
    use crate::models::Chunk;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedChat {
        replies: Mutex<Vec<Result<String, PipelineError>>>,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedChat {
        fn new(replies: Vec<Result<String, PipelineError>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedChat {
        fn model_id(&self) -> String {
            "scripted".to_string()
        }

        async fn complete(&self, messages: &[ChatMessage]) -> Result<String, PipelineError> {
            self.seen.lock().expect("lock").push(messages.to_vec());
            let mut replies = self.replies.lock().expect("lock");
            if replies.is_empty() {
                return Err(PipelineError::synthesis("scripted", "no reply left"));
            }
            replies.remove(0)
        }
    }

    fn scored(page: u32, score: f32, text: &str) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                chunk_id: format!("c{page}"),
                chunk_index: page as u64,
                page_index: page,
                text: text.to_string(),
                overlap_chars: 0,
            },
            score,
        }
    }

    fn index_for(embedder: &CharacterNgramEmbedder, pages: &[&str]) -> ChunkIndex {
        let chunks = pages
            .iter()
            .enumerate()
            .map(|(page, text)| scored(page as u32, 0.0, text).chunk)
            .collect();
        let vectors = pages.iter().map(|text| embedder.embed_text(text)).collect();
        ChunkIndex::build(embedder.model_id(), chunks, vectors).expect("index should build")
    }

    fn dialogue(turns: usize) -> Vec<(String, String)> {
        (0..turns)
            .map(|turn| (format!("q{turn}"), format!("a{turn}")))
            .collect()
    }

    #[test]
    fn prompt_carries_passages_history_and_question() {
        let hits = vec![scored(2, 0.9, "invariant X holds"), scored(0, 0.4, "intro")];
        let messages = build_messages("Be brief.", &hits, &dialogue(1), 4, "What is X?");

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.starts_with("Be brief."));
        assert!(messages[0].content.contains("[1] (page 3)\ninvariant X holds"));
        assert!(messages[0].content.contains("[2] (page 1)\nintro"));
        assert_eq!(messages[1], ChatMessage::user("q0"));
        assert_eq!(messages[2], ChatMessage::assistant("a0"));
        assert_eq!(messages[3], ChatMessage::user("What is X?"));
    }

    #[test]
    fn only_the_most_recent_turns_are_replayed() {
        let messages = build_messages("sys", &[], &dialogue(5), 2, "next");
        let replayed = messages
            .iter()
            .filter(|message| message.role == Role::User)
            .map(|message| message.content.as_str())
            .collect::<Vec<_>>();
        assert_eq!(replayed, vec!["q3", "q4", "next"]);
    }

    #[test]
    fn citation_uses_top_hit_page() {
        let hits = vec![scored(4, 0.8, "a"), scored(1, 0.7, "b")];
        assert_eq!(cite(&hits, None), Some(4));
        assert_eq!(cite(&hits, Some(0.5)), Some(4));
        assert_eq!(cite(&hits, Some(0.9)), None);
        assert_eq!(cite(&[], None), None);
    }

    #[tokio::test]
    async fn answer_is_returned_verbatim_with_citation() {
        let embedder = CharacterNgramEmbedder::default();
        let index = index_for(
            &embedder,
            &["cover page", "table of contents", "invariant X keeps trees balanced"],
        );
        let chat = ScriptedChat::new(vec![Ok(" It keeps trees balanced. ".to_string())]);
        let options = PipelineOptions::default();

        let result = AnswerSynthesizer::new(&embedder, &chat, &options)
            .answer("What is invariant X?", &[], &index)
            .await
            .expect("answer should succeed");

        assert_eq!(result.answer, " It keeps trees balanced. ");
        assert_eq!(result.cited_page_index, Some(2));
        assert_eq!(result.display_page(), Some(3));
        assert_eq!(result.sources.len(), 2);
    }

    #[tokio::test]
    async fn chat_failure_is_a_synthesis_error() {
        let embedder = CharacterNgramEmbedder::default();
        let index = index_for(&embedder, &["only page"]);
        let chat = ScriptedChat::new(vec![Err(PipelineError::synthesis("scripted", "timeout"))]);
        let options = PipelineOptions::default();

        let result = AnswerSynthesizer::new(&embedder, &chat, &options)
            .answer("anything?", &[], &index)
            .await;
        assert!(matches!(result, Err(PipelineError::Synthesis { .. })));
    }

    #[tokio::test]
    async fn blank_answer_is_a_synthesis_error() {
        let embedder = CharacterNgramEmbedder::default();
        let index = index_for(&embedder, &["only page"]);
        let chat = ScriptedChat::new(vec![Ok("   ".to_string())]);
        let options = PipelineOptions::default();

        let result = AnswerSynthesizer::new(&embedder, &chat, &options)
            .answer("anything?", &[], &index)
            .await;
        assert!(matches!(result, Err(PipelineError::Synthesis { .. })));
    }

    #[tokio::test]
    async fn index_from_another_embedder_is_rejected() {
        let embedder = CharacterNgramEmbedder::default();
        let other = CharacterNgramEmbedder { dimensions: 16 };
        let index = index_for(&other, &["only page"]);
        let chat = ScriptedChat::new(vec![Ok("unused".to_string())]);
        let options = PipelineOptions::default();

        let result = AnswerSynthesizer::new(&embedder, &chat, &options)
            .answer("anything?", &[], &index)
            .await;
        assert!(matches!(result, Err(PipelineError::Embedding { .. })));
        assert!(chat.seen.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn empty_condensed_question_falls_back_to_the_original() {
        let embedder = CharacterNgramEmbedder::default();
        let index = index_for(
            &embedder,
            &["hydraulic pump maintenance", "invariant X keeps trees balanced"],
        );
        let chat = ScriptedChat::new(vec![Ok("  \n".to_string()), Ok("Trees.".to_string())]);
        let options = PipelineOptions {
            condense_follow_ups: true,
            top_k: 1,
            ..PipelineOptions::default()
        };
        let history = vec![("earlier".to_string(), "reply".to_string())];

        let result = AnswerSynthesizer::new(&embedder, &chat, &options)
            .answer("What is invariant X?", &history, &index)
            .await
            .expect("answer should succeed");

        assert_eq!(result.answer, "Trees.");
        assert_eq!(result.cited_page_index, Some(1));
        assert_eq!(chat.seen.lock().expect("lock").len(), 2);
    }

    #[tokio::test]
    async fn follow_ups_are_condensed_before_retrieval() {
        let embedder = CharacterNgramEmbedder::default();
        let index = index_for(
            &embedder,
            &["hydraulic pump maintenance", "invariant X keeps trees balanced"],
        );
        let chat = ScriptedChat::new(vec![
            Ok("What does invariant X keep balanced?".to_string()),
            Ok("Trees.".to_string()),
        ]);
        let options = PipelineOptions {
            condense_follow_ups: true,
            top_k: 1,
            ..PipelineOptions::default()
        };
        let history = vec![(
            "Tell me about invariant X".to_string(),
            "It is about trees.".to_string(),
        )];

        let result = AnswerSynthesizer::new(&embedder, &chat, &options)
            .answer("What does it keep balanced?", &history, &index)
            .await
            .expect("answer should succeed");

        assert_eq!(result.cited_page_index, Some(1));
        let seen = chat.seen.lock().expect("lock");
        assert_eq!(seen.len(), 2);
        assert!(seen[0][1].content.contains("Follow-up question: What does it keep balanced?"));
        assert_eq!(
            seen[1].last(),
            Some(&ChatMessage::user("What does it keep balanced?"))
        );
    }
}
