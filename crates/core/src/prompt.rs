//! Image prompt assembly and content-safety rewriting.
//!
//! [`build_prompt`] turns one scene description plus the running
//! [`StyleGuide`] into a single image-generation prompt. [`sanitize`]
//! rewrites terms that trip the image API's safety filters; it is a pure
//! string transform, applied at escalating [`SanitizeLevel`]s by the
//! retry loop in the pipeline crate.

use serde::{Deserialize, Serialize};

/// Maximum prompt length after a [`SanitizeLevel::Truncate`] pass.
///
/// Persistent safety rejections correlate with very long prompts, so the
/// final escalation tier shortens the prompt as well as rewriting it.
pub const MAX_SANITIZED_PROMPT_LEN: usize = 800;

/// Ordered substitution table applied by [`sanitize`].
///
/// Longer patterns come first so that e.g. "beats up" is rewritten before
/// a bare "beats" would match. Replacements never themselves appear as
/// patterns, which is what makes [`sanitize`] idempotent at a fixed level.
const SUBSTITUTIONS: &[(&str, &str)] = &[
    ("beats up", "overcomes"),
    ("beat up", "overcome"),
    ("fights back", "stands tall"),
    ("fighting", "challenging"),
    ("fights", "challenges"),
    ("fight", "challenge"),
    ("violently", "intensely"),
    ("violence", "intensity"),
    ("punches", "confronts"),
    ("punch", "confront"),
    ("kicks", "outpaces"),
    ("attacks", "surprises"),
    ("attack", "surprise"),
    ("destroys", "dismantles"),
    ("destroy", "dismantle"),
    ("weapon", "tool"),
    ("blood", "sweat"),
    ("kills", "defeats"),
    ("kill", "defeat"),
    ("crushes", "outshines"),
    ("crush", "outshine"),
];

// ---------------------------------------------------------------------------
// Sanitize level
// ---------------------------------------------------------------------------

/// Escalation tier of the content-safety rewrite.
///
/// The first generation attempt sends the prompt untouched; each safety
/// rejection escalates one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SanitizeLevel {
    /// No changes (first attempt).
    None,
    /// Apply the full substitution table.
    Substitute,
    /// Apply the table and truncate to [`MAX_SANITIZED_PROMPT_LEN`].
    Truncate,
}

impl SanitizeLevel {
    /// The next, more aggressive tier. [`Truncate`](Self::Truncate) is the
    /// ceiling and escalates to itself.
    pub fn escalate(self) -> Self {
        match self {
            SanitizeLevel::None => SanitizeLevel::Substitute,
            SanitizeLevel::Substitute | SanitizeLevel::Truncate => SanitizeLevel::Truncate,
        }
    }
}

// ---------------------------------------------------------------------------
// Style guide
// ---------------------------------------------------------------------------

/// Running visual style applied to every scene prompt of a story.
///
/// The defaults reproduce the house style: a soft cinematic 3D render with
/// rounded, expressive characters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleGuide {
    /// Overall rendering/art direction, prepended to every prompt.
    pub art_style: String,
    /// Character design description, repeated for every prompt.
    pub character_style: String,
}

impl Default for StyleGuide {
    fn default() -> Self {
        Self {
            art_style: "Stylized, cinematic 3D animation with a soft, high-resolution render. \
                Materials are physically accurate with subtle texture and plush fur, highly \
                detailed yet slightly softened for a toy-like finish. Lighting is warm and \
                naturalistic, with golden hour tones and soft shadows."
                .to_string(),
            character_style: "Characters are wholesome and animated with childlike wonder and \
                charm: rounded, expressive features, large bright eyes, and an exaggerated \
                facial structure that emphasizes emotional connection."
                .to_string(),
        }
    }
}

/// Build the image-generation prompt for one scene.
///
/// Pure string assembly; the safety rewrite is a separate pass so the
/// retry loop can escalate it independently.
pub fn build_prompt(scene_text: &str, style: &StyleGuide) -> String {
    format!(
        "{}\n{}\n\nScene: {}",
        style.art_style,
        style.character_style,
        scene_text.trim()
    )
}

// ---------------------------------------------------------------------------
// Sanitize
// ---------------------------------------------------------------------------

/// Rewrite a prompt at the given escalation tier.
///
/// Idempotent at a fixed level: re-applying the same level is a no-op
/// beyond the first pass. No network, no side effects.
pub fn sanitize(prompt: &str, level: SanitizeLevel) -> String {
    match level {
        SanitizeLevel::None => prompt.to_string(),
        SanitizeLevel::Substitute => apply_substitutions(prompt),
        SanitizeLevel::Truncate => {
            truncate_at_char_boundary(&apply_substitutions(prompt), MAX_SANITIZED_PROMPT_LEN)
        }
    }
}

/// Apply every table entry, in order, as a case-insensitive whole-word
/// replacement.
fn apply_substitutions(prompt: &str) -> String {
    let mut out = prompt.to_string();
    for (pattern, replacement) in SUBSTITUTIONS {
        out = replace_word(&out, pattern, replacement);
    }
    out
}

/// Case-insensitive whole-word replacement.
///
/// A match counts only when both neighbours are non-alphanumeric (or the
/// string edge), so "fight" does not rewrite the middle of "firefighter".
fn replace_word(text: &str, pattern: &str, replacement: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pos = 0;

    while let Some(start) = find_ascii_ci(text, pattern, pos) {
        let end = start + pattern.len();

        let left_ok = !text[..start]
            .chars()
            .next_back()
            .is_some_and(char::is_alphanumeric);
        let right_ok = !text[end..].chars().next().is_some_and(char::is_alphanumeric);

        out.push_str(&text[pos..start]);
        if left_ok && right_ok {
            out.push_str(replacement);
        } else {
            out.push_str(&text[start..end]);
        }
        pos = end;
    }
    out.push_str(&text[pos..]);
    out
}

/// Find `pattern` in `text` at or after byte `from`, ignoring ASCII case.
///
/// The table patterns are pure ASCII, so every matched byte is ASCII and
/// the returned offsets are char boundaries of `text` itself. Offsets
/// derived from a `to_lowercase()` copy would not be: some characters
/// change byte length when lowercased.
fn find_ascii_ci(text: &str, pattern: &str, from: usize) -> Option<usize> {
    let hay = text.as_bytes();
    let needle = pattern.as_bytes();
    if needle.is_empty() || hay.len() < from + needle.len() {
        return None;
    }
    (from..=hay.len() - needle.len())
        .find(|&i| hay[i..i + needle.len()].eq_ignore_ascii_case(needle))
}

/// Truncate to at most `max` bytes, backing off to a valid char boundary.
fn truncate_at_char_boundary(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text[..cut].to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
