//! Prompt templates for food recognition.
//!
//! The reply format requested here is what `glyscan_core::parser` reads on
//! its structured path. Models that ignore JSON mode still tend to answer
//! with bullet or numbered lists, which the parser's text path handles.

// ---------------------------------------------------------------------------
// Food recognition
// ---------------------------------------------------------------------------

/// System prompt for the vision model.
pub const FOOD_RECOGNITION_SYSTEM: &str = r#"You are a food recognition expert. Analyze food images and return a JSON object with a "foods" array. Each food should have nameKo (Korean name), nameEn (English name), and confidence (0-1)."#;

/// User instruction sent next to the image.
pub const FOOD_RECOGNITION_USER: &str = r#"Identify every food in this image and answer in JSON.
The reply must have exactly this shape:
{
  "foods": [
    {
      "nameKo": "{example_local}",
      "nameEn": "{example_foreign}",
      "confidence": 0.9
    }
  ]
}

List all foods if there are several. Leave out anything that is not food."#;

/// MIME type assumed for images sent without a data-URL header.
pub const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

/// Simple template interpolation for prompts.
///
/// Replaces `{key}` with the corresponding value.
#[must_use]
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        result = result.replace(&format!("{{{key}}}"), value);
    }
    result
}

/// The user instruction with its example names filled in.
#[must_use]
pub fn recognition_user_prompt() -> String {
    render_template(
        FOOD_RECOGNITION_USER,
        &[("example_local", "음식 한글명"), ("example_foreign", "Food English Name")],
    )
}

/// `data:` URL for a base64 image body.
#[must_use]
pub fn image_data_url(image_base64: &str) -> String {
    format!("data:{DEFAULT_IMAGE_MIME};base64,{image_base64}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_rendering_works() {
        let rendered = render_template("Find {food} in {place}.", &[("food", "김치"), ("place", "the bowl")]);
        assert_eq!(rendered, "Find 김치 in the bowl.");
    }

    #[test]
    fn template_handles_missing_vars() {
        let rendered = render_template("Find {food}, {unknown}.", &[("food", "밥")]);
        assert_eq!(rendered, "Find 밥, {unknown}.");
    }

    #[test]
    fn user_prompt_has_no_placeholders_left() {
        let prompt = recognition_user_prompt();
        assert!(prompt.contains("\"nameKo\": \"음식 한글명\""));
        assert!(!prompt.contains("{example_"));
    }

    #[test]
    fn data_url_wraps_body() {
        assert_eq!(image_data_url("QUJD"), "data:image/jpeg;base64,QUJD");
    }
}
