use tower_sessions::Session;

use crate::controller::SubmitError;
use crate::error::PicturaError;

const FLASH_FLAG_KEY: &str = "flash_flag";

pub(crate) const FLASH_EMPTY_PROMPT: u16 = 1;
pub(crate) const FLASH_NO_IMAGES: u16 = 2;
pub(crate) const FLASH_GATE_CLOSED: u16 = 3;
pub(crate) const FLASH_UPLOADS_ADDED: u16 = 4;
pub(crate) const FLASH_UPLOADS_DISCARDED: u16 = 5;
pub(crate) const FLASH_UPLOAD_INVALID: u16 = 6;
pub(crate) const FLASH_UPLOADS_CLEARED: u16 = 7;

#[derive(Clone, Debug)]
pub(crate) struct FlashMessage {
    pub(crate) text: &'static str,
    pub(crate) class: &'static str,
}

/// Template-friendly flash fields: `(has_flash, message, class)`.
pub(crate) fn flash_fields(flash: Option<FlashMessage>) -> (bool, String, String) {
    match flash {
        Some(message) => (true, message.text.to_string(), message.class.to_string()),
        None => (false, String::new(), String::new()),
    }
}

pub(crate) fn flag_for(err: SubmitError) -> u16 {
    match err {
        SubmitError::EmptyPrompt => FLASH_EMPTY_PROMPT,
        SubmitError::NoImages => FLASH_NO_IMAGES,
        SubmitError::GateClosed { .. } => FLASH_GATE_CLOSED,
    }
}

pub(crate) async fn set_flash(session: &Session, flag: u16) -> Result<(), PicturaError> {
    session.insert(FLASH_FLAG_KEY, flag).await?;
    Ok(())
}

pub(crate) async fn take_flash_message(
    session: &Session,
) -> Result<Option<FlashMessage>, PicturaError> {
    let flag = session
        .get::<u16>(FLASH_FLAG_KEY)
        .await?
        .filter(|flag| *flag != 0);
    if flag.is_some() {
        session.insert(FLASH_FLAG_KEY, 0u16).await?;
    }
    Ok(flag.and_then(message_for))
}

fn message_for(flag: u16) -> Option<FlashMessage> {
    match flag {
        FLASH_EMPTY_PROMPT => Some(FlashMessage {
            text: "Please enter a prompt.",
            class: "warning",
        }),
        FLASH_NO_IMAGES => Some(FlashMessage {
            text: "Please upload at least one photo before generating a collage.",
            class: "warning",
        }),
        FLASH_GATE_CLOSED => Some(FlashMessage {
            text: "Please wait before making another request.",
            class: "warning",
        }),
        FLASH_UPLOADS_ADDED => Some(FlashMessage {
            text: "Photos added.",
            class: "success",
        }),
        FLASH_UPLOADS_DISCARDED => Some(FlashMessage {
            text: "Only the first 4 photos are kept, extra uploads were discarded.",
            class: "warning",
        }),
        FLASH_UPLOAD_INVALID => Some(FlashMessage {
            text: "Some files were not images we can read and were skipped.",
            class: "error",
        }),
        FLASH_UPLOADS_CLEARED => Some(FlashMessage {
            text: "Photos cleared.",
            class: "success",
        }),
        _ => None,
    }
}
