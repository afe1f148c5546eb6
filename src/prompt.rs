//! Turning the form into a predict request.

use serde::Deserialize;

use crate::config::ControllerSettings;
use crate::constants::{COLLAGE_INSTRUCTION, COLLAGE_NEGATIVE_PROMPT};
use crate::controller::SubmitError;
use crate::imagen::PredictRequest;

/// How the prompt text is used.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    /// The text is the prompt.
    #[default]
    Direct,
    /// The text describes a collage of the uploaded photos. Only the
    /// description is sent, the photos themselves never leave the process.
    Collage,
}

impl GenerationMode {
    /// Form value.
    pub fn as_str(self) -> &'static str {
        match self {
            GenerationMode::Direct => "direct",
            GenerationMode::Collage => "collage",
        }
    }
}

/// Validates the draft and builds the outbound request.
///
/// Checks run in a fixed order: empty text first, then (collage only) the
/// presence of at least one upload.
pub fn build_request(
    mode: GenerationMode,
    text: &str,
    upload_count: usize,
    settings: &ControllerSettings,
) -> Result<PredictRequest, SubmitError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(SubmitError::EmptyPrompt);
    }

    let (prompt, negative_prompt) = match mode {
        GenerationMode::Direct => (text.to_string(), None),
        GenerationMode::Collage => {
            if upload_count == 0 {
                return Err(SubmitError::NoImages);
            }
            (
                collage_prompt(text, upload_count),
                Some(COLLAGE_NEGATIVE_PROMPT.to_string()),
            )
        }
    };

    Ok(PredictRequest::new(
        prompt,
        settings.sample_count,
        settings.aspect_ratio.clone(),
        negative_prompt,
    ))
}

fn collage_prompt(description: &str, photos: usize) -> String {
    let noun = if photos == 1 { "photo" } else { "photos" };
    format!(
        "{COLLAGE_INSTRUCTION} inspired by {photos} reference {noun}: {description}. \
         Balanced layout, consistent lighting, natural colors."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_mode_uses_trimmed_text() {
        let settings = ControllerSettings::default();
        let request =
            build_request(GenerationMode::Direct, "  a cat in a hat \n", 0, &settings).unwrap();
        assert_eq!(request.prompt(), "a cat in a hat");
        assert_eq!(request.parameters.negative_prompt, None);
        assert_eq!(request.parameters.aspect_ratio, "1:1");
        assert_eq!(request.parameters.sample_count, 1);
    }

    #[test]
    fn blank_text_is_rejected_in_both_modes() {
        let settings = ControllerSettings::default();
        for mode in [GenerationMode::Direct, GenerationMode::Collage] {
            assert_eq!(
                build_request(mode, "   ", 3, &settings),
                Err(SubmitError::EmptyPrompt)
            );
        }
    }

    #[test]
    fn collage_needs_uploads() {
        let settings = ControllerSettings::default();
        assert_eq!(
            build_request(GenerationMode::Collage, "beach day", 0, &settings),
            Err(SubmitError::NoImages)
        );
    }

    #[test]
    fn collage_wraps_description_and_sets_negative_prompt() {
        let settings = ControllerSettings {
            aspect_ratio: "4:3".to_string(),
            ..ControllerSettings::default()
        };
        let request =
            build_request(GenerationMode::Collage, "beach day", 2, &settings).unwrap();
        assert!(request.prompt().starts_with(COLLAGE_INSTRUCTION));
        assert!(request.prompt().contains("2 reference photos: beach day."));
        assert_eq!(
            request.parameters.negative_prompt.as_deref(),
            Some(COLLAGE_NEGATIVE_PROMPT)
        );
        assert_eq!(request.parameters.aspect_ratio, "4:3");
    }

    #[test]
    fn mode_deserializes_from_form_value() {
        #[derive(Deserialize)]
        struct Form {
            mode: GenerationMode,
        }
        let form: Form = serde_json::from_str(r#"{"mode":"collage"}"#).unwrap();
        assert_eq!(form.mode, GenerationMode::Collage);
        assert_eq!(GenerationMode::default().as_str(), "direct");
    }
}
