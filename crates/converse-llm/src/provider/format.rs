//! Message normalization shared by every vendor
//!
//! Vendors differ in how they encode messages but agree on what goes in
//! them: one merged system prompt, inline images lifted out of text, caller
//! images on the latest user turn, and no images for text-only models.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::{Content, ContentPart, Message, Role, UserImage};

/// `![alt](data:image/...)` or `[image: data:image/...]` inside message text
static INLINE_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"!\[[^\]]*\]\((data:image/[^)\s]+)\)|\[image:\s*(data:image/[^\]\s]+)\s*\]").expect("must be valid regex")
});

/// Messages ready for vendor encoding
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedMessages {
    /// All system messages merged, if any had text
    pub system: Option<String>,
    /// Non-system messages in order
    pub messages: Vec<Message>,
}

/// Normalize a transcript for sending
pub fn prepare_messages(messages: &[Message], user_images: &[UserImage], vision: bool) -> PreparedMessages {
    let (system, mut rest) = split_system(messages);

    for message in rest.iter_mut().filter(|m| m.role == Role::User) {
        if let Content::Text(text) = &message.content {
            message.content = extract_inline_images(text);
        }
    }

    attach_user_images(&mut rest, user_images);

    if !vision {
        for message in &mut rest {
            strip_images(message);
        }
    }

    PreparedMessages { system, messages: rest }
}

/// Separate system messages, merging their text with blank lines
pub fn split_system(messages: &[Message]) -> (Option<String>, Vec<Message>) {
    let mut system = Vec::new();
    let mut rest = Vec::with_capacity(messages.len());

    for message in messages {
        if message.role == Role::System {
            let text = message.content.as_text();
            if !text.trim().is_empty() {
                system.push(text);
            }
        } else {
            rest.push(message.clone());
        }
    }

    let system = (!system.is_empty()).then(|| system.join("\n\n"));
    (system, rest)
}

/// Append images to the last user message
pub fn attach_user_images(messages: &mut [Message], images: &[UserImage]) {
    if images.is_empty() {
        return;
    }

    let Some(last_user) = messages.iter_mut().rev().find(|m| m.role == Role::User) else {
        tracing::debug!(images = images.len(), "no user message to attach images to");
        return;
    };

    let mut parts = std::mem::take(&mut last_user.content).into_parts();
    parts.extend(images.iter().map(|image| ContentPart::image(image.data_url())));
    last_user.content = Content::Parts(parts);
}

/// Split text containing inline data-URL images into parts
pub fn extract_inline_images(text: &str) -> Content {
    let mut parts = Vec::new();
    let mut cursor = 0;

    for captures in INLINE_IMAGE.captures_iter(text) {
        let (Some(whole), Some(url)) = (captures.get(0), captures.get(1).or_else(|| captures.get(2))) else {
            continue;
        };
        push_text(&mut parts, &text[cursor..whole.start()]);
        parts.push(ContentPart::image(url.as_str()));
        cursor = whole.end();
    }

    if parts.is_empty() {
        return Content::Text(text.to_owned());
    }

    push_text(&mut parts, &text[cursor..]);
    Content::Parts(parts)
}

fn push_text(parts: &mut Vec<ContentPart>, text: &str) {
    let text = text.trim();
    if !text.is_empty() {
        parts.push(ContentPart::text(text));
    }
}

fn strip_images(message: &mut Message) {
    if message.content.has_images() {
        message.content = Content::Text(message.content.as_text());
    }
}

/// Split a base64 `data:` URL into MIME type and payload
pub fn parse_data_url(url: &str) -> Option<(&str, &str)> {
    let (meta, data) = url.strip_prefix("data:")?.split_once(',')?;
    let mime = meta.strip_suffix(";base64")?;
    Some((if mime.is_empty() { "image/png" } else { mime }, data))
}
