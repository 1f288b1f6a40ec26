use crate::constants::*;

pub fn validate_message_content(content: &str, has_attachment: bool) -> Result<(), String> {
    if content.trim().is_empty() && !has_attachment {
        return Err("Message text is required".into());
    }
    if content.len() > MAX_MESSAGE_LENGTH {
        return Err(format!(
            "Message must be at most {} characters",
            MAX_MESSAGE_LENGTH
        ));
    }
    Ok(())
}

pub fn validate_conversation_title(title: &str) -> Result<(), String> {
    if title.len() > MAX_TITLE_LENGTH {
        return Err(format!(
            "Title must be at most {} characters",
            MAX_TITLE_LENGTH
        ));
    }
    Ok(())
}
