use {
    attendo_channels::InboundMessage,
    attendo_common::types::{ChannelKind, MediaKind, MediaRef},
    teloxide::types::{MediaKind as TelegramMedia, Message, MessageKind},
};

/// Normalize one Telegram message into engine inbound form.
///
/// Returns `None` for updates that carry nothing to append: service
/// messages, member joins, unsupported media without a caption.
pub(crate) fn normalize(
    account_id: &str,
    tenant_id: &str,
    msg: &Message,
) -> Option<InboundMessage> {
    let content = extract_text(msg).unwrap_or_default();
    let media = extract_media(msg);
    if content.is_empty() && media.is_none() {
        return None;
    }

    Some(InboundMessage {
        channel: ChannelKind::Telegram,
        account_id: account_id.to_string(),
        tenant_id: tenant_id.to_string(),
        address: msg.chat.id.0.to_string(),
        sender_name: sender_name(msg),
        content,
        media,
        provider_message_id: Some(msg.id.0.to_string()),
    })
}

fn sender_name(msg: &Message) -> Option<String> {
    msg.from.as_ref().and_then(|u| {
        let first = &u.first_name;
        let last = u.last_name.as_deref().unwrap_or("");
        let name = format!("{first} {last}").trim().to_string();
        if name.is_empty() {
            u.username.clone()
        } else {
            Some(name)
        }
    })
}

/// Message text, or the caption for captioned media.
fn extract_text(msg: &Message) -> Option<String> {
    match &msg.kind {
        MessageKind::Common(common) => match &common.media_kind {
            TelegramMedia::Text(t) => Some(t.text.clone()),
            TelegramMedia::Photo(p) => p.caption.clone(),
            TelegramMedia::Document(d) => d.caption.clone(),
            TelegramMedia::Audio(a) => a.caption.clone(),
            TelegramMedia::Voice(v) => v.caption.clone(),
            TelegramMedia::Video(v) => v.caption.clone(),
            TelegramMedia::Animation(a) => a.caption.clone(),
            _ => None,
        },
        _ => None,
    }
}

/// File reference and kind for a media attachment. Photos pick the largest
/// size Telegram offers.
fn extract_media(msg: &Message) -> Option<MediaRef> {
    let MessageKind::Common(common) = &msg.kind else {
        return None;
    };
    let (file_id, kind) = match &common.media_kind {
        TelegramMedia::Photo(p) => (p.photo.last()?.file.id.clone(), MediaKind::Image),
        TelegramMedia::Document(d) => (d.document.file.id.clone(), MediaKind::Document),
        TelegramMedia::Audio(a) => (a.audio.file.id.clone(), MediaKind::Audio),
        TelegramMedia::Voice(v) => (v.voice.file.id.clone(), MediaKind::Audio),
        TelegramMedia::Video(v) => (v.video.file.id.clone(), MediaKind::Video),
        TelegramMedia::Animation(a) => (a.animation.file.id.clone(), MediaKind::Video),
        TelegramMedia::Sticker(s) => (s.sticker.file.id.clone(), MediaKind::Sticker),
        _ => return None,
    };
    Some(MediaRef {
        url: format!("tg://file/{file_id}"),
        kind,
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {rstest::rstest, serde_json::json};

    use super::*;

    fn message(payload: serde_json::Value) -> Message {
        serde_json::from_value(payload).expect("deserialize telegram message")
    }

    fn text_message(text: &str) -> Message {
        message(json!({
            "message_id": 7,
            "date": 1,
            "chat": { "id": 42, "type": "private", "first_name": "Alice" },
            "from": {
                "id": 1001,
                "is_bot": false,
                "first_name": "Alice",
                "last_name": "Kim",
                "username": "alice"
            },
            "text": text
        }))
    }

    #[test]
    fn text_message_normalizes() {
        let msg = text_message("hello there");
        let inbound = normalize("tg-main", "acme", &msg).unwrap();

        assert_eq!(inbound.channel, ChannelKind::Telegram);
        assert_eq!(inbound.account_id, "tg-main");
        assert_eq!(inbound.tenant_id, "acme");
        assert_eq!(inbound.address, "42");
        assert_eq!(inbound.sender_name.as_deref(), Some("Alice Kim"));
        assert_eq!(inbound.content, "hello there");
        assert!(inbound.media.is_none());
        assert_eq!(inbound.provider_message_id.as_deref(), Some("7"));
    }

    #[test]
    fn username_backs_up_empty_name() {
        let msg = message(json!({
            "message_id": 7,
            "date": 1,
            "chat": { "id": 42, "type": "private" },
            "from": {
                "id": 1001,
                "is_bot": false,
                "first_name": "",
                "username": "ghost"
            },
            "text": "hi"
        }));
        let inbound = normalize("tg-main", "acme", &msg).unwrap();
        assert_eq!(inbound.sender_name.as_deref(), Some("ghost"));
    }

    #[rstest]
    #[case::photo(
        json!({
            "photo": [
                { "file_id": "ph-small", "file_unique_id": "u1", "width": 90, "height": 51 },
                { "file_id": "ph-big", "file_unique_id": "u2", "width": 1280, "height": 720 }
            ],
            "caption": "look at this"
        }),
        "ph-big",
        MediaKind::Image,
        "look at this"
    )]
    #[case::document(
        json!({
            "document": {
                "file_id": "doc-1",
                "file_unique_id": "u3",
                "file_name": "invoice.pdf",
                "mime_type": "application/pdf"
            }
        }),
        "doc-1",
        MediaKind::Document,
        ""
    )]
    #[case::voice(
        json!({
            "voice": {
                "file_id": "voice-1",
                "file_unique_id": "u4",
                "duration": 3,
                "mime_type": "audio/ogg"
            }
        }),
        "voice-1",
        MediaKind::Audio,
        ""
    )]
    #[case::video(
        json!({
            "video": {
                "file_id": "vid-1",
                "file_unique_id": "u5",
                "width": 640,
                "height": 480,
                "duration": 2,
                "mime_type": "video/mp4"
            }
        }),
        "vid-1",
        MediaKind::Video,
        ""
    )]
    #[case::sticker(
        json!({
            "sticker": {
                "file_id": "st-1",
                "file_unique_id": "u6",
                "type": "regular",
                "width": 512,
                "height": 512,
                "is_animated": false,
                "is_video": false,
                "emoji": "👍"
            }
        }),
        "st-1",
        MediaKind::Sticker,
        ""
    )]
    fn media_messages_normalize(
        #[case] media_fields: serde_json::Value,
        #[case] expected_file_id: &str,
        #[case] expected_kind: MediaKind,
        #[case] expected_content: &str,
    ) {
        let mut payload = json!({
            "message_id": 9,
            "date": 1,
            "chat": { "id": 42, "type": "private", "first_name": "Alice" },
            "from": { "id": 1001, "is_bot": false, "first_name": "Alice" }
        });
        for (key, value) in media_fields.as_object().unwrap() {
            payload[key] = value.clone();
        }

        let msg = message(payload);
        let inbound = normalize("tg-main", "acme", &msg).unwrap();
        let media = inbound.media.expect("media attached");

        assert_eq!(media.url, format!("tg://file/{expected_file_id}"));
        assert_eq!(media.kind, expected_kind);
        assert_eq!(inbound.content, expected_content);
    }

    #[test]
    fn service_message_yields_nothing() {
        let msg = message(json!({
            "message_id": 11,
            "date": 1,
            "chat": { "id": 42, "type": "group", "title": "Support" },
            "from": { "id": 1001, "is_bot": false, "first_name": "Alice" },
            "new_chat_members": [
                { "id": 2002, "is_bot": false, "first_name": "Bob" }
            ]
        }));
        assert!(normalize("tg-main", "acme", &msg).is_none());
    }
}
