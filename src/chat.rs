// Chat orchestration: turns a transcript plus a new question into one call to
// the chat service, and the interactive terminal chat built on top of it.

use std::io::{BufRead, Write};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::constants::LANGUAGE_DIRECTIVE;
use crate::conversation::{ConversationLog, Speaker, Turn};
use crate::error::{Error, Result};
use crate::llm_interaction::{ChatBackend, ChatMessage};

/// Result of a successful [`ChatOrchestrator::ask`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exchange {
    pub answer: String,
    pub history: ConversationLog,
}

#[derive(Clone)]
pub struct ChatOrchestrator {
    backend: Arc<dyn ChatBackend>,
}

impl ChatOrchestrator {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self { backend }
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    /// Ask `question` in the context of `history`.
    ///
    /// On success the returned history is `history` followed by the question
    /// and the answer. On any failure `history` is left as it was.
    #[instrument(skip(self, history), fields(model = %self.backend.model_name(), turns = history.len()))]
    pub async fn ask(&self, question: &str, history: &ConversationLog) -> Result<Exchange> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::EmptyQuestion);
        }

        let messages = build_messages(question, history);
        let answer = self.backend.chat(&messages).await.map_err(|e| {
            warn!(error = %e, "chat service call failed");
            Error::from(e)
        })?;

        let mut history = history.clone();
        history.append(Turn::user(question));
        history.append(Turn::assistant(answer.clone()));
        info!(turns = history.len(), "chat exchange recorded");
        Ok(Exchange { answer, history })
    }

    pub fn clear(history: ConversationLog) -> ConversationLog {
        let mut history = history;
        history.clear();
        history
    }
}

/// Transcript in order, oldest first, then the directive-prefixed question.
pub fn build_messages(question: &str, history: &ConversationLog) -> Vec<ChatMessage> {
    let mut messages: Vec<ChatMessage> = history
        .iter()
        .map(|turn| ChatMessage::new(turn.speaker.role(), turn.text.clone()))
        .collect();
    messages.push(ChatMessage::new(
        Speaker::User.role(),
        format!("{LANGUAGE_DIRECTIVE} {question}"),
    ));
    messages
}

/// Interactive terminal chat. `/limpar` clears the transcript, `/sair` or EOF
/// ends the session.
pub async fn run_terminal_chat<R, W>(
    orchestrator: &ChatOrchestrator,
    mut input: R,
    mut output: W,
) -> anyhow::Result<ConversationLog>
where
    R: BufRead,
    W: Write,
{
    info!(model = orchestrator.model_name(), "Starting terminal chat...");
    writeln!(output, "Converse com nosso assistente virtual! (/limpar, /sair)")?;
    let mut history = ConversationLog::new();

    loop {
        write!(output, "> ")?;
        output.flush()?;
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            break;
        }
        match line.trim() {
            "/sair" => break,
            "/limpar" => {
                history = ChatOrchestrator::clear(history);
                writeln!(output, "Conversa limpa.")?;
            }
            question => match orchestrator.ask(question, &history).await {
                Ok(exchange) => {
                    writeln!(output, "{}: {}", Speaker::Assistant, exchange.answer)?;
                    history = exchange.history;
                }
                Err(Error::EmptyQuestion) => {
                    writeln!(output, "Por favor, digite uma pergunta antes de enviar.")?;
                }
                Err(e) => {
                    writeln!(output, "Ocorreu um erro ao tentar se comunicar com o modelo: {e}")?;
                }
            },
        }
    }
    Ok(history)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChatServiceError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every message list and answers from a script.
    struct ScriptedBackend {
        answer: Option<String>,
        calls: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedBackend {
        fn answering(answer: &str) -> Arc<Self> {
            Arc::new(Self {
                answer: Some(answer.to_string()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                answer: None,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn chat(&self, messages: &[ChatMessage]) -> std::result::Result<String, ChatServiceError> {
            self.calls.lock().unwrap().push(messages.to_vec());
            match &self.answer {
                Some(answer) => Ok(answer.clone()),
                None => Err(ChatServiceError::Status {
                    status: 500,
                    body: "boom".to_string(),
                }),
            }
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn test_ask_on_empty_history() {
        let backend = ScriptedBackend::answering("A soja vai bem.");
        let orchestrator = ChatOrchestrator::new(backend.clone());
        let history = ConversationLog::new();

        let exchange = orchestrator.ask("Qual a previsão de soja?", &history).await.unwrap();

        assert_eq!(exchange.answer, "A soja vai bem.");
        assert_eq!(exchange.history.len(), 2);
        assert_eq!(exchange.history.turns()[0], Turn::user("Qual a previsão de soja?"));
        assert_eq!(exchange.history.turns()[1], Turn::assistant("A soja vai bem."));

        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].len(), 1);
        assert_eq!(calls[0][0].role, "user");
        assert_eq!(
            calls[0][0].content,
            "Responda sempre em português. Qual a previsão de soja?"
        );
    }

    #[tokio::test]
    async fn test_ask_resends_history_in_order() {
        let backend = ScriptedBackend::answering("Sim.");
        let orchestrator = ChatOrchestrator::new(backend.clone());
        let mut history = ConversationLog::new();
        history.append(Turn::user("Oi"));
        history.append(Turn::assistant("Olá!"));

        let exchange = orchestrator.ask("  Tudo bem?  ", &history).await.unwrap();
        assert_eq!(exchange.history.len(), 4);
        assert_eq!(exchange.history.turns()[2].text, "Tudo bem?");

        let calls = backend.calls.lock().unwrap();
        let roles: Vec<&str> = calls[0].iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, ["user", "assistant", "user"]);
        assert_eq!(calls[0][0].content, "Oi");
        assert_eq!(calls[0][1].content, "Olá!");
        assert!(calls[0][2].content.ends_with("Tudo bem?"));
    }

    #[tokio::test]
    async fn test_empty_question_is_rejected() {
        let backend = ScriptedBackend::answering("nunca");
        let orchestrator = ChatOrchestrator::new(backend.clone());
        let mut history = ConversationLog::new();
        history.append(Turn::user("Oi"));
        let before = history.clone();

        for blank in ["", "   ", "\n\t"] {
            let err = orchestrator.ask(blank, &history).await.unwrap_err();
            assert!(matches!(err, Error::EmptyQuestion));
        }
        assert_eq!(history, before);
        assert!(backend.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_service_failure_leaves_history_unchanged() {
        let orchestrator = ChatOrchestrator::new(ScriptedBackend::failing());
        let mut history = ConversationLog::new();
        history.append(Turn::user("Oi"));
        history.append(Turn::assistant("Olá!"));
        let before = history.clone();

        let err = orchestrator.ask("E o milho?", &history).await.unwrap_err();
        assert!(matches!(err, Error::ChatService(_)));
        assert_eq!(history, before);
    }

    #[test]
    fn test_clear() {
        let mut history = ConversationLog::new();
        history.append(Turn::user("Oi"));
        assert!(ChatOrchestrator::clear(history).is_empty());
        assert!(ChatOrchestrator::clear(ConversationLog::new()).is_empty());
    }

    #[tokio::test]
    async fn test_terminal_chat_session() {
        let orchestrator = ChatOrchestrator::new(ScriptedBackend::answering("Resposta"));
        let input = b"Pergunta um\n\n/limpar\nPergunta dois\n/sair\nignorada\n";
        let mut output = Vec::new();

        let history = run_terminal_chat(&orchestrator, &input[..], &mut output)
            .await
            .unwrap();

        let printed = String::from_utf8(output).unwrap();
        assert!(printed.contains("Assistente: Resposta"));
        assert!(printed.contains("Por favor, digite uma pergunta"));
        assert!(printed.contains("Conversa limpa."));
        assert_eq!(history.len(), 2);
        assert_eq!(history.turns()[0].text, "Pergunta dois");
    }
}
