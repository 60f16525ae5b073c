//! Test doubles shared by this crate's tests and downstream crates through the
//! `mock` feature.

use crate::error::LlmError;
use crate::llm::{ChatModel, Message, Role};
use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Reply {
    /// Returns the context block of the system prompt.
    Echo,
    Fixed(String),
    Fail,
}

/// Chat model that records every prompt it receives.
#[derive(Debug)]
pub struct MockChatModel {
    reply: Reply,
    delay: Option<Duration>,
    prompts: Mutex<Vec<Vec<Message>>>,
}

impl MockChatModel {
    fn with_reply(reply: Reply) -> Self {
        Self {
            reply,
            delay: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn echo() -> Self {
        Self::with_reply(Reply::Echo)
    }

    pub fn replying(answer: impl Into<String>) -> Self {
        Self::with_reply(Reply::Fixed(answer.into()))
    }

    pub fn failing() -> Self {
        Self::with_reply(Reply::Fail)
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn prompts(&self) -> Vec<Vec<Message>> {
        self.prompts
            .lock()
            .map(|prompts| prompts.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    fn model_name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(messages.to_vec());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.reply {
            Reply::Fixed(answer) => Ok(answer.clone()),
            Reply::Fail => Err(LlmError::Api {
                provider: "mock".to_string(),
                status: 503,
            }),
            Reply::Echo => Ok(messages
                .iter()
                .find(|message| message.role == Role::System)
                .and_then(|message| message.content.rsplit("----------------\n").next())
                .unwrap_or_default()
                .to_string()),
        }
    }
}

/// Builds a PDF with one page per entry of `pages`, each line drawn as a
/// separate text run. Empty entries produce pages without text.
///
/// # Panics
///
/// Panics if lopdf cannot encode the content streams or serialize the file.
pub fn text_pdf(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for text in pages {
        let mut operations = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let y = 760 - 16 * index as i64;
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new(
                "Tf",
                vec![Object::Name(b"F1".to_vec()), Object::Integer(12)],
            ));
            operations.push(Operation::new(
                "Td",
                vec![Object::Integer(72), Object::Integer(y)],
            ));
            operations.push(Operation::new("Tj", vec![Object::string_literal(line)]));
            operations.push(Operation::new("ET", vec![]));
        }

        let content = Content { operations }
            .encode()
            .expect("content stream encodes");
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ],
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).expect("pdf serializes");
    buffer
}
