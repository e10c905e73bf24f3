//! Payload builders for the notification hub.

use relay_core::Payload;
use serde_json::json;

/// Characters of message text kept in a `new_message` preview.
pub const PREVIEW_CHARS: usize = 100;

/// `new_message`: a chat message arrived while the recipient was not in the chat.
pub fn new_message(chat_id: i64, sender_name: &str, text: &str) -> Payload {
    Payload::Custom {
        kind: "new_message".into(),
        data: json!({
            "chat_id": chat_id,
            "sender_name": sender_name,
            "preview": preview(text),
            "action": "open_chat",
            "action_url": format!("/chats?chat={chat_id}"),
            "priority": "normal",
            "category": "new_message",
        }),
    }
}

/// `unread_count_update`: the recipient's total unread count changed.
pub fn unread_count_update(unread_count: u64) -> Payload {
    Payload::Custom {
        kind: "unread_count_update".into(),
        data: json!({
            "unread_count": unread_count,
            "category": "chat_count",
        }),
    }
}

/// `system`: a free-form server message.
///
/// `level` is passed through; priority and dismissability derive from it.
pub fn system(message: &str, level: &str) -> Payload {
    let (priority, dismissable) = match level {
        "error" => ("high", false),
        "info" => ("low", true),
        _ => ("normal", true),
    };
    Payload::Custom {
        kind: "system".into(),
        data: json!({
            "message": message,
            "level": level,
            "action": "none",
            "action_url": "",
            "dismissable": dismissable,
            "priority": priority,
            "category": "system",
        }),
    }
}

/// Truncate `text` to [`PREVIEW_CHARS`] characters, marking the cut with `...`.
pub fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_owned(),
    }
}
