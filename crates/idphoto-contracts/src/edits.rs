//! Edit operations and the prompt text sent with each of them.
//!
//! Prompt wording drives model behaviour, so every template is a constant and
//! any change to one must bump [`PROMPT_TEMPLATE_VERSION`].

use std::fmt;
use std::str::FromStr;

pub const PROMPT_TEMPLATE_VERSION: u32 = 1;

pub const ASPECT_RATIO_CLAUSE: &str = "Important: keep the original image's aspect ratio exactly; do not crop or extend the image.";

/// Standard Vietnamese ID-photo blue used behind every outfit change.
pub const BLUE_BACKGROUND: &str =
    "a standard Vietnamese ID-photo blue background (hex color #0073e6)";

pub const UPSCALE_PROMPT: &str = "Upscale this image to high resolution (approx 2K). Enhance details, clarity, and sharpness of the subject. Maintain the original composition and content, only improving quality and resolution. Ensure the output is a high-quality photograph.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditOperation {
    ReplaceBackgroundBlue,
    ReplaceBackgroundWhite,
    OutfitMenShirt,
    OutfitWomenShirt,
    OutfitMenVest,
    OutfitWomenVest,
}

impl EditOperation {
    pub const ALL: [EditOperation; 6] = [
        EditOperation::ReplaceBackgroundBlue,
        EditOperation::ReplaceBackgroundWhite,
        EditOperation::OutfitMenShirt,
        EditOperation::OutfitWomenShirt,
        EditOperation::OutfitMenVest,
        EditOperation::OutfitWomenVest,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            EditOperation::ReplaceBackgroundBlue => "blue",
            EditOperation::ReplaceBackgroundWhite => "white",
            EditOperation::OutfitMenShirt => "men_white_shirt",
            EditOperation::OutfitWomenShirt => "women_white_shirt",
            EditOperation::OutfitMenVest => "men_vest",
            EditOperation::OutfitWomenVest => "women_vest",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EditOperation::ReplaceBackgroundBlue => "Blue background",
            EditOperation::ReplaceBackgroundWhite => "White background",
            EditOperation::OutfitMenShirt => "Men's white shirt",
            EditOperation::OutfitWomenShirt => "Women's white shirt",
            EditOperation::OutfitMenVest => "Men's suit",
            EditOperation::OutfitWomenVest => "Women's suit",
        }
    }

    /// Message shown while the request is in flight.
    pub fn progress_message(self) -> &'static str {
        match self {
            EditOperation::ReplaceBackgroundBlue => "Replacing the background with blue...",
            EditOperation::ReplaceBackgroundWhite => "Replacing the background with white...",
            EditOperation::OutfitMenShirt => "Changing the outfit to a men's shirt...",
            EditOperation::OutfitWomenShirt => "Changing the outfit to a women's shirt...",
            EditOperation::OutfitMenVest => "Changing the outfit to a men's suit...",
            EditOperation::OutfitWomenVest => "Changing the outfit to a women's suit...",
        }
    }

    pub fn is_background_only(self) -> bool {
        matches!(
            self,
            EditOperation::ReplaceBackgroundBlue | EditOperation::ReplaceBackgroundWhite
        )
    }
}

impl fmt::Display for EditOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for EditOperation {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase().replace('-', "_");
        let op = match normalized.as_str() {
            "blue" | "blue_background" => EditOperation::ReplaceBackgroundBlue,
            "white" | "white_background" => EditOperation::ReplaceBackgroundWhite,
            "men_white_shirt" | "men_shirt" => EditOperation::OutfitMenShirt,
            "women_white_shirt" | "women_shirt" => EditOperation::OutfitWomenShirt,
            "men_vest" | "men_suit" => EditOperation::OutfitMenVest,
            "women_vest" | "women_suit" => EditOperation::OutfitWomenVest,
            _ => {
                let known = EditOperation::ALL
                    .iter()
                    .map(|op| op.slug())
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(format!(
                    "unknown operation '{}' (expected one of: {known})",
                    raw.trim()
                ));
            }
        };
        Ok(op)
    }
}

fn instruction(operation: EditOperation) -> String {
    match operation {
        EditOperation::ReplaceBackgroundBlue => format!(
            "Remove the background and replace it with {BLUE_BACKGROUND}. Preserve as much hair detail as possible."
        ),
        EditOperation::ReplaceBackgroundWhite => "Remove the background and replace it with a uniform solid white background. Preserve as much hair detail as possible.".to_string(),
        EditOperation::OutfitMenShirt => outfit("a men's white dress shirt"),
        EditOperation::OutfitWomenShirt => outfit("a women's white shirt"),
        EditOperation::OutfitMenVest => {
            outfit("a black men's suit with a white shirt and a black tie")
        }
        EditOperation::OutfitWomenVest => outfit(
            "a black women's office suit with a white shirt underneath (no tie)",
        ),
    }
}

fn outfit(garment: &str) -> String {
    format!(
        "Keep the face and hairstyle unchanged and replace the rest of the body with {garment} on {BLUE_BACKGROUND}."
    )
}

pub fn build_prompt(operation: EditOperation) -> String {
    format!("{} {ASPECT_RATIO_CLAUSE}", instruction(operation))
}
