//! Quiz answers and story system-prompt assembly.
//!
//! The browser quiz collects a handful of branching answers; those are
//! folded into the 20-scene "power fantasy" story-structure instructions
//! sent to the text model. Scene-text generation itself lives in
//! `foxtale-pipeline`; this module is pure assembly and validation.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Answers collected by the quiz form.
///
/// `humiliation_type` selects the story opening: `"a"` uses the free-text
/// `humiliation`; anything else uses the offering/rejection variant built
/// from `offering_who` / `offering_what`. `do_with_find` selects between a
/// training montage (`"a"`) and a building montage.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct QuizAnswers {
    /// Story flavour label, e.g. `"Power Fantasy"`.
    #[validate(length(min = 1, max = 100))]
    pub story_type: String,

    /// `"a"` for a humiliation opening, `"b"` for an offering opening.
    #[validate(length(min = 1, max = 1))]
    pub humiliation_type: String,

    /// Free-text humiliation description (opening variant `"a"`).
    #[validate(length(max = 500))]
    pub humiliation: String,

    /// Who the protagonist makes an offering to (opening variant `"b"`).
    #[validate(length(max = 200))]
    pub offering_who: String,

    /// What the protagonist offers (opening variant `"b"`).
    #[validate(length(max = 200))]
    pub offering_what: String,

    /// The transformation trigger the protagonist discovers.
    #[validate(length(min = 1, max = 300))]
    pub find: String,

    /// `"a"` to train with a master, otherwise build the discovery.
    #[validate(length(min = 1, max = 1))]
    pub do_with_find: String,

    /// Optional crime the original rejector commits in the third act.
    #[validate(length(max = 300))]
    pub villain_crime: String,
}

impl QuizAnswers {
    /// Assemble the system instructions for the 20-scene story.
    ///
    /// The skeleton is fixed; the quiz answers fill the branch points.
    pub fn system_prompt(&self) -> String {
        let opening = if self.humiliation_type.eq_ignore_ascii_case("a") {
            format!(
                "Scene 1. Scene of Humiliation - {}\n\
                 Scene 2. Scene of Loneliness - a scene that displays his loneliness and poverty.",
                self.humiliation
            )
        } else {
            format!(
                "Scene 1. Scene of Offering - the red fox makes an offering to {}: {}.\n\
                 Scene 2. Scene of Rejection - {} rejects his offering.",
                self.offering_who, self.offering_what, self.offering_who
            )
        };

        let montage = if self.do_with_find.eq_ignore_ascii_case("a") {
            "he begins training with his master"
        } else {
            "he begins building the powerful technology"
        };

        let crime = if self.villain_crime.is_empty() {
            "committing a crime and getting away with it".to_string()
        } else {
            format!("committing {} and getting away with it", self.villain_crime)
        };

        format!(
            "You are a creative assistant that generates emotionally-driven {story_type} stories \
             starring a red fox, told entirely through images with no dialogue, narration, or text. \
             The red fox begins powerless or humiliated and transforms into something strong over \
             exactly 20 self-contained visual scenes.\n\n\
             Story structure:\n\
             {opening}\n\
             Scene 3. What others have - the fox sees others together and happy without him.\n\
             Scene 4. Reaction - the fox is devastated at being left out.\n\
             Scene 5. Discover - the fox discovers {find}, a trigger that inspires hope.\n\
             Scene 6. First step - {montage}.\n\
             Scenes 7-8. Failed attempt - he acts too early and fails while others laugh.\n\
             Scenes 9-12. Montage - disciplined training or building, step by step.\n\
             Scenes 13-14. Power reveal - the transformation is finished and displayed; others look in awe.\n\
             Scene 15. The one who rejected him is {crime}.\n\
             Scene 16. The fox stops the wrongdoer with his new power.\n\
             Scene 17. The wrongdoer is taken away (no fox in shot).\n\
             Scene 18. Everyone cheers for the fox.\n\
             Scenes 19-20. Triumph - the fox walks tall, admired by all.\n\n\
             Rules: one single action per scene; refer to the protagonist only as \"the red fox\" \
             and never name any character; convey everything visually; make each scene a distinct \
             visual beat; use exaggerated, symbolic visuals; keep the arc tight and emotional.",
            story_type = self.story_type,
            opening = opening,
            find = self.find,
            montage = montage,
            crime = crime,
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn answers() -> QuizAnswers {
        QuizAnswers {
            story_type: "Power Fantasy".to_string(),
            humiliation_type: "a".to_string(),
            humiliation: "laughed at by a group of crows".to_string(),
            offering_who: String::new(),
            offering_what: String::new(),
            find: "a magical blueprint for iron wings".to_string(),
            do_with_find: "b".to_string(),
            villain_crime: "stealing from innocent animals".to_string(),
        }
    }

    #[test]
    fn valid_answers_pass_validation() {
        assert!(answers().validate().is_ok());
    }

    #[test]
    fn empty_find_rejected() {
        let mut a = answers();
        a.find = String::new();
        assert!(a.validate().is_err());
    }

    #[test]
    fn humiliation_opening_uses_free_text() {
        let prompt = answers().system_prompt();
        assert!(prompt.contains("laughed at by a group of crows"));
        assert!(!prompt.contains("Scene of Offering"));
    }

    #[test]
    fn offering_opening_uses_offering_fields() {
        let mut a = answers();
        a.humiliation_type = "b".to_string();
        a.offering_who = "a girl fox".to_string();
        a.offering_what = "a flower".to_string();
        let prompt = a.system_prompt();
        assert!(prompt.contains("Scene of Offering"));
        assert!(prompt.contains("a girl fox"));
        assert!(prompt.contains("a flower"));
    }

    #[test]
    fn villain_crime_substituted() {
        let prompt = answers().system_prompt();
        assert!(prompt.contains("committing stealing from innocent animals"));
    }

    #[test]
    fn default_crime_when_unset() {
        let mut a = answers();
        a.villain_crime = String::new();
        assert!(a
            .system_prompt()
            .contains("committing a crime and getting away with it"));
    }

    #[test]
    fn training_branch_selected() {
        let mut a = answers();
        a.do_with_find = "a".to_string();
        assert!(a.system_prompt().contains("training with his master"));
    }
}
