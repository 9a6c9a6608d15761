//! Prompt assembly for the conversational retriever.

use crate::llm::ChatMessage;
use crate::rag::ChunkMatch;

use super::history::ConversationTurn;

const SYSTEM_PROMPT: &str = "You are a helpful AI assistant specializing in Nigerian tax law. \
Use the retrieved context below to answer the question. \
If the answer is not supported by the context, say that you don't know. \
If the question is not about Nigerian tax law, politely decline and invite a tax-related question instead. \
Keep answers concise and accurate, and reference the context markers like [1] when citing.";

const CONDENSE_PROMPT: &str = "Rewrite the user's latest question as a single standalone question, \
resolving any references to the earlier conversation. \
Respond with the rewritten question only.";

pub struct PromptBuilder;

impl PromptBuilder {
    pub fn system_prompt() -> &'static str {
        SYSTEM_PROMPT
    }

    /// Format retrieved chunks as numbered context blocks. The numbering
    /// matches the order of `matches`, which is also the citation order
    /// reported back to the caller.
    pub fn build_context(matches: &[ChunkMatch]) -> String {
        let mut context = String::new();
        for (i, m) in matches.iter().enumerate() {
            context.push_str(&format!(
                "[{}] {} (Sources: {})\n{}\n\n",
                i + 1,
                m.chunk.title,
                m.chunk.source_ids.join(", "),
                m.chunk.content
            ));
        }
        context.trim_end().to_string()
    }

    /// Messages asking the model to turn a follow-up into a standalone
    /// question.
    pub fn condense_messages(
        history: &[ConversationTurn],
        query: &str,
    ) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(CONDENSE_PROMPT)];
        for turn in history {
            messages.push(ChatMessage {
                role: turn.role.as_str().to_string(),
                content: turn.text.clone(),
            });
        }
        messages.push(ChatMessage::user(query));
        messages
    }

    /// Messages for the final answer call.
    pub fn answer_messages(standalone_question: &str, context: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "Context:\n{context}\n\nQuestion: {standalone_question}"
            )),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::StoredChunk;

    fn matched(id: &str, title: &str) -> ChunkMatch {
        ChunkMatch {
            chunk: StoredChunk {
                chunk_id: id.to_string(),
                title: title.to_string(),
                summary: String::new(),
                content: format!("content of {title}"),
                source_ids: vec!["act.pdf".to_string()],
            },
            score: 0.5,
        }
    }

    #[test]
    fn context_markers_follow_match_order() {
        let context = PromptBuilder::build_context(&[
            matched("a", "Company Income Tax"),
            matched("b", "Stamp Duty"),
        ]);

        let cit = context.find("[1] Company Income Tax").unwrap();
        let stamp = context.find("[2] Stamp Duty").unwrap();
        assert!(cit < stamp);
        assert!(context.contains("Sources: act.pdf"));
    }

    #[test]
    fn empty_matches_produce_empty_context() {
        assert!(PromptBuilder::build_context(&[]).is_empty());
    }

    #[test]
    fn condense_messages_carry_history_in_order() {
        let history = vec![
            ConversationTurn::user("What is CIT?"),
            ConversationTurn::assistant("Company income tax."),
        ];
        let messages = PromptBuilder::condense_messages(&history, "what is the rate?");

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[2].role, "assistant");
        assert_eq!(messages[3].content, "what is the rate?");
    }

    #[test]
    fn answer_messages_scope_to_the_domain() {
        let messages = PromptBuilder::answer_messages("What is VAT?", "[1] VAT\nvat context");
        assert!(messages[0].content.contains("Nigerian tax law"));
        assert!(messages[1].content.contains("Question: What is VAT?"));
        assert!(messages[1].content.contains("vat context"));
    }
}
