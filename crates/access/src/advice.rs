//! Emotion labels, advice templates, and music recommendation keys
//!
//! Static product data: the classifier's label is normalized into a closed
//! set (with an unknown fallback), then mapped deterministically to an
//! advice template and an ordered list of playlist lookup keys.

use std::fmt;

/// Appended to every advice string.
pub const ADVICE_REMINDER: &str =
    "Remember, this is general wellness advice and not a substitute for professional mental health support.";

/// Shown verbatim to clients alongside analysis results.
pub const DISCLAIMER: &str =
    "This is general wellness advice and not a substitute for professional mental health support.";

/// Closed emotion set the orchestrator works with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmotionLabel {
    Joy,
    Sadness,
    Anger,
    Fear,
    Surprise,
    Disgust,
    Anxious,
    Stressed,
    Calm,
    Excited,
    Tired,
    Content,
    Neutral,
    /// Anything the classifier emits that we have no mapping for.
    Unknown,
}

impl EmotionLabel {
    /// Normalize a raw classifier label, case-insensitively. Labels from
    /// richer taxonomies collapse onto the closed set (grief reads as
    /// sadness, optimism as joy, and so on); everything else is `Unknown`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "joy" => EmotionLabel::Joy,
            "sadness" => EmotionLabel::Sadness,
            "anger" => EmotionLabel::Anger,
            "fear" => EmotionLabel::Fear,
            "surprise" => EmotionLabel::Surprise,
            "disgust" => EmotionLabel::Disgust,
            "anxious" => EmotionLabel::Anxious,
            "stressed" => EmotionLabel::Stressed,
            "calm" => EmotionLabel::Calm,
            "excited" => EmotionLabel::Excited,
            "tired" => EmotionLabel::Tired,
            "content" => EmotionLabel::Content,
            "neutral" => EmotionLabel::Neutral,
            "admiration" | "amusement" | "caring" | "love" | "optimism" => EmotionLabel::Joy,
            "approval" | "gratitude" | "pride" => EmotionLabel::Content,
            "curiosity" | "desire" | "excitement" => EmotionLabel::Excited,
            "disappointment" | "grief" | "remorse" => EmotionLabel::Sadness,
            "disapproval" => EmotionLabel::Anger,
            "embarrassment" | "nervousness" | "confusion" => EmotionLabel::Anxious,
            "realization" => EmotionLabel::Surprise,
            "relief" => EmotionLabel::Calm,
            _ => EmotionLabel::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionLabel::Joy => "joy",
            EmotionLabel::Sadness => "sadness",
            EmotionLabel::Anger => "anger",
            EmotionLabel::Fear => "fear",
            EmotionLabel::Surprise => "surprise",
            EmotionLabel::Disgust => "disgust",
            EmotionLabel::Anxious => "anxious",
            EmotionLabel::Stressed => "stressed",
            EmotionLabel::Calm => "calm",
            EmotionLabel::Excited => "excited",
            EmotionLabel::Tired => "tired",
            EmotionLabel::Content => "content",
            EmotionLabel::Neutral => "neutral",
            EmotionLabel::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Advice template for a normalized label.
pub fn advice_for(label: EmotionLabel) -> &'static str {
    match label {
        EmotionLabel::Joy => {
            "You're feeling great! Consider sharing this positive energy with others or engaging in activities you love."
        }
        EmotionLabel::Sadness => {
            "It's okay to feel sad sometimes. Try gentle activities like listening to music, taking a walk, or talking to someone you trust."
        }
        EmotionLabel::Anger => {
            "Take a moment to breathe deeply. Consider what's causing this feeling and whether there's a constructive way to address it."
        }
        EmotionLabel::Fear => {
            "Fear is natural. Break down what's worrying you into smaller, manageable steps. You're stronger than you think."
        }
        EmotionLabel::Surprise => {
            "Unexpected moments can be opportunities for growth. Take time to process what happened and how you feel about it."
        }
        EmotionLabel::Disgust => {
            "Strong negative feelings can be signals. Consider what boundaries you might need to set or changes you want to make."
        }
        EmotionLabel::Anxious => {
            "Try the 4-7-8 breathing technique: breathe in for 4, hold for 7, exhale for 8. Grounding exercises can also help."
        }
        EmotionLabel::Stressed => {
            "Take a 5-minute break. Try progressive muscle relaxation or a short walk. Remember that stress is temporary."
        }
        EmotionLabel::Calm => {
            "You're in a peaceful state. This is a great time for reflection, planning, or enjoying the present moment."
        }
        EmotionLabel::Excited => {
            "Channel this positive energy into something meaningful. Consider activities that align with your goals and values."
        }
        EmotionLabel::Tired => {
            "Rest is important for your wellbeing. Consider what your body and mind need - sleep, nutrition, or a mental break."
        }
        EmotionLabel::Content => {
            "Contentment is a beautiful state. Take a moment to appreciate what's going well in your life right now."
        }
        EmotionLabel::Neutral | EmotionLabel::Unknown => {
            "Take a moment to acknowledge your feelings. Remember that all emotions are valid and temporary."
        }
    }
}

/// Ordered playlist lookup keys for a normalized label.
pub fn recommendation_keys(label: EmotionLabel) -> &'static [&'static str] {
    mood_keys(mood_for(label))
}

/// Collapse an emotion onto the mood vocabulary the playlist tables use.
fn mood_for(label: EmotionLabel) -> &'static str {
    match label {
        EmotionLabel::Joy => "happy",
        EmotionLabel::Sadness => "sad",
        EmotionLabel::Fear => "anxious",
        EmotionLabel::Anger | EmotionLabel::Disgust => "angry",
        EmotionLabel::Surprise => "excited",
        other => other.as_str(),
    }
}

/// Playlist keys for a mood string (the recommendations endpoint takes the
/// mood vocabulary directly). Unknown moods fall back to the calm set.
pub fn mood_keys(mood: &str) -> &'static [&'static str] {
    match mood.trim().to_ascii_lowercase().as_str() {
        "happy" | "joy" => &["feel-good-hits", "happy-pop"],
        "sad" | "sadness" => &["sad-songs", "melancholy-indie"],
        "anxious" | "fear" => &["calm-and-peaceful", "focus-flow"],
        "stressed" => &["stress-relief", "ambient-relaxation"],
        "excited" | "surprise" => &["energy-boost", "upbeat-pop"],
        "angry" | "anger" | "disgust" => &["anger-management", "calming-classical"],
        "energetic" => &["workout-hits", "high-energy"],
        "tired" => &["gentle-acoustic", "soft-rock"],
        "content" => &["chill-vibes", "sunday-morning"],
        _ => &["peaceful-piano", "nature-sounds"],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsing_is_case_insensitive_with_unknown_fallback() {
        assert_eq!(EmotionLabel::parse("JOY"), EmotionLabel::Joy);
        assert_eq!(EmotionLabel::parse("  Grief "), EmotionLabel::Sadness);
        assert_eq!(EmotionLabel::parse("nervousness"), EmotionLabel::Anxious);
        assert_eq!(EmotionLabel::parse("bewilderment"), EmotionLabel::Unknown);
    }

    #[test]
    fn every_label_has_advice_and_keys() {
        let labels = [
            EmotionLabel::Joy,
            EmotionLabel::Sadness,
            EmotionLabel::Anger,
            EmotionLabel::Fear,
            EmotionLabel::Surprise,
            EmotionLabel::Disgust,
            EmotionLabel::Anxious,
            EmotionLabel::Stressed,
            EmotionLabel::Calm,
            EmotionLabel::Excited,
            EmotionLabel::Tired,
            EmotionLabel::Content,
            EmotionLabel::Neutral,
            EmotionLabel::Unknown,
        ];
        for label in labels {
            assert!(!advice_for(label).is_empty());
            assert!(!recommendation_keys(label).is_empty());
        }
    }

    #[test]
    fn recommendations_are_deterministic_and_ordered() {
        assert_eq!(
            recommendation_keys(EmotionLabel::Joy),
            ["feel-good-hits", "happy-pop"]
        );
        assert_eq!(
            recommendation_keys(EmotionLabel::Disgust),
            ["anger-management", "calming-classical"]
        );
        assert_eq!(mood_keys("no-such-mood"), ["peaceful-piano", "nature-sounds"]);
    }
}
