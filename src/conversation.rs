//! Conversation model shared by agents, the workflow engine and stores.
//!
//! A [`Conversation`] only grows: messages are appended and never edited or
//! removed. Per-message state that executors want to pass downstream (for
//! example "this topping is out of stock") travels as typed
//! [`Annotation`]s attached before the message is appended.

use anyhow::Context;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
    System,
    Tool,
}

impl Role {
    /// Role name on the OpenAI chat completions wire.
    pub fn as_wire(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Agent => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Content {
    Text(String),
    Structured(serde_json::Value),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Annotation {
    Warning { code: String, detail: String },
    Note { text: String },
}

/// Image sent alongside a message's text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Attachment {
    ImageUrl {
        url: String,
    },
    /// Inline image, base64-encoded.
    ImageData {
        media_type: String,
        data: String,
    },
}

impl Attachment {
    pub fn image_url(url: impl Into<String>) -> Self {
        Self::ImageUrl { url: url.into() }
    }

    pub fn image_bytes(media_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self::ImageData {
            media_type: media_type.into(),
            data: STANDARD.encode(bytes),
        }
    }

    /// URL form accepted by chat backends: the URL itself or a `data:` URI.
    pub fn to_uri(&self) -> String {
        match self {
            Self::ImageUrl { url } => url.clone(),
            Self::ImageData { media_type, data } => format!("data:{media_type};base64,{data}"),
        }
    }
}

/// Image from an `http(s)` URL or a local file, which is inlined.
pub async fn load_image(source: &str) -> anyhow::Result<Attachment> {
    let source = source.trim();
    if source.starts_with("https://") || source.starts_with("http://") {
        return Ok(Attachment::image_url(source));
    }
    let path = std::path::PathBuf::from(shellexpand::tilde(source).into_owned());
    let media_type = image_media_type(&path)
        .with_context(|| format!("Unsupported image type: {}", path.display()))?;
    let bytes = tokio::fs::read(&path)
        .await
        .with_context(|| format!("Failed to read image: {}", path.display()))?;
    Ok(Attachment::image_bytes(media_type, &bytes))
}

/// Image media type guessed from a file extension.
pub fn image_media_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    /// Agent id (or tool name) that produced the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub content: Content,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: Content) -> Self {
        Self {
            role,
            author: None,
            content,
            annotations: Vec::new(),
            attachments: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, Content::Text(text.into()))
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, Content::Text(text.into()))
    }

    pub fn agent(text: impl Into<String>) -> Self {
        Self::new(Role::Agent, Content::Text(text.into()))
    }

    pub fn tool(name: &str, text: impl Into<String>) -> Self {
        Self::new(Role::Tool, Content::Text(text.into())).with_author(name)
    }

    pub fn structured(role: Role, value: serde_json::Value) -> Self {
        Self::new(role, Content::Structured(value))
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn with_warning(self, code: impl Into<String>, detail: impl Into<String>) -> Self {
        self.with_annotation(Annotation::Warning {
            code: code.into(),
            detail: detail.into(),
        })
    }

    /// Text view of the content; structured payloads render as compact JSON.
    pub fn text(&self) -> String {
        match &self.content {
            Content::Text(text) => text.clone(),
            Content::Structured(value) => value.to_string(),
        }
    }

    pub fn structured_value(&self) -> Option<&serde_json::Value> {
        match &self.content {
            Content::Structured(value) => Some(value),
            Content::Text(_) => None,
        }
    }

    pub fn warnings(&self) -> impl Iterator<Item = (&str, &str)> {
        self.annotations.iter().filter_map(|a| match a {
            Annotation::Warning { code, detail } => Some((code.as_str(), detail.as_str())),
            Annotation::Note { .. } => None,
        })
    }

    pub fn has_warnings(&self) -> bool {
        self.warnings().next().is_some()
    }
}

/// Ordered, append-only message log.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    /// Conversation seeded with a single user message.
    pub fn from_user(text: impl Into<String>) -> Self {
        Self::from_messages(vec![Message::user(text)])
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Most recent message sent by the user.
    pub fn last_user(&self) -> Option<&Message> {
        self.messages.iter().rfind(|m| m.role == Role::User)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}

impl<'a> IntoIterator for &'a Conversation {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_appends_in_order() {
        let mut conversation = Conversation::from_user("hello");
        conversation.push(Message::agent("hi there").with_author("greeter"));

        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation.messages()[0].role, Role::User);
        assert_eq!(conversation.last().unwrap().author.as_deref(), Some("greeter"));
    }

    #[test]
    fn last_user_skips_agent_replies() {
        let mut conversation = Conversation::from_user("first");
        conversation.push(Message::agent("answer"));
        conversation.push(Message::user("second"));
        conversation.push(Message::agent("another answer"));

        assert_eq!(conversation.last_user().unwrap().text(), "second");
    }

    #[test]
    fn structured_content_renders_as_json_text() {
        let msg = Message::structured(Role::Agent, serde_json::json!({"intent": "MusicQuestion"}));
        assert_eq!(msg.text(), r#"{"intent":"MusicQuestion"}"#);
        assert_eq!(msg.structured_value().unwrap()["intent"], "MusicQuestion");
    }

    #[test]
    fn warnings_are_typed_annotations() {
        let msg = Message::agent("order parsed")
            .with_warning("out_of_ingredient", "pineapple")
            .with_annotation(Annotation::Note {
                text: "large pizza".into(),
            });

        assert!(msg.has_warnings());
        let warnings: Vec<_> = msg.warnings().collect();
        assert_eq!(warnings, vec![("out_of_ingredient", "pineapple")]);
    }

    #[test]
    fn conversation_serializes_as_plain_array() {
        let conversation = Conversation::from_user("hello");
        let json = serde_json::to_value(&conversation).unwrap();
        assert!(json.is_array());
        let back: Conversation = serde_json::from_value(json).unwrap();
        assert_eq!(back, conversation);
    }

    #[test]
    fn attachments_render_as_uris() {
        let msg = Message::user("what is this?")
            .with_attachment(Attachment::image_url("https://example.com/a.jpg"))
            .with_attachment(Attachment::image_bytes("image/png", b"\x89PNG"));

        let uris: Vec<_> = msg.attachments.iter().map(Attachment::to_uri).collect();
        assert_eq!(uris[0], "https://example.com/a.jpg");
        assert_eq!(uris[1], "data:image/png;base64,iVBORw==");
        assert_eq!(msg.text(), "what is this?");
    }

    #[test]
    fn messages_without_attachments_omit_the_field() {
        let json = serde_json::to_value(Message::user("hi")).unwrap();
        assert!(json.get("attachments").is_none());
        let back: Message = serde_json::from_value(json).unwrap();
        assert!(back.attachments.is_empty());
    }

    #[tokio::test]
    async fn load_image_inlines_files_and_keeps_urls() {
        let url = load_image("https://example.com/a.jpg").await.unwrap();
        assert_eq!(url, Attachment::image_url("https://example.com/a.jpg"));

        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("pixel.png");
        std::fs::write(&path, b"\x89PNG").unwrap();
        let inline = load_image(path.to_str().unwrap()).await.unwrap();
        assert_eq!(inline.to_uri(), "data:image/png;base64,iVBORw==");

        let text = tmp.path().join("notes.txt");
        std::fs::write(&text, "x").unwrap();
        assert!(load_image(text.to_str().unwrap()).await.is_err());
        assert!(load_image(tmp.path().join("missing.png").to_str().unwrap())
            .await
            .is_err());
    }

    #[test]
    fn image_media_type_from_extension() {
        assert_eq!(image_media_type(Path::new("cat.JPG")), Some("image/jpeg"));
        assert_eq!(image_media_type(Path::new("x/y.webp")), Some("image/webp"));
        assert_eq!(image_media_type(Path::new("notes.txt")), None);
        assert_eq!(image_media_type(Path::new("noext")), None);
    }

    #[test]
    fn role_maps_agent_to_assistant_on_the_wire() {
        assert_eq!(Role::Agent.as_wire(), "assistant");
        assert_eq!(Role::User.as_wire(), "user");
    }
}
