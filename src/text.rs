//! Inference-side text normalization.
//!
//! Caller phrases are written for human ears ("Heeey.. let's plaay!") with
//! stretched vowels and double-dot pauses. Neural text encoders stumble over
//! both, so the execution unit rewrites the text before synthesis. The result
//! is never shown to anyone and never used as a cache key.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static PAUSE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.{2,}|…").unwrap());
static SPACE_BEFORE_COMMA_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+,").unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static WORD_FIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(hy|lok|se|kep|god|son|thre)\b").unwrap());

/// Words that vowel collapsing over-strips, mapped back to their real spelling.
const WORD_FIXES: &[(&str, &str)] = &[
    ("hy", "hey"),
    ("lok", "look"),
    ("se", "see"),
    ("kep", "keep"),
    ("god", "good"),
    ("son", "soon"),
    ("thre", "three"),
];

/// Normalize a stylized phrase into text the synthesis model reads reliably.
pub fn normalize_for_inference(text: &str) -> String {
    let text = collapse_letter_runs(text, 2);
    let text = collapse_vowel_runs(&text);
    let text = WORD_FIX_RE.replace_all(&text, |caps: &Captures| restore_word(&caps[1]));
    let text = PAUSE_RE.replace_all(&text, ",");
    let text = SPACE_BEFORE_COMMA_RE.replace_all(&text, ",");
    WHITESPACE_RE.replace_all(&text, " ").trim().to_string()
}

/// Limit runs of the same letter (case-insensitive) to `max_run` characters.
fn collapse_letter_runs(text: &str, max_run: usize) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev: Option<char> = None;
    let mut run = 0usize;

    for ch in text.chars() {
        let same = ch.is_alphabetic() && prev.is_some_and(|p| same_letter(p, ch));
        run = if same { run + 1 } else { 1 };
        prev = Some(ch);
        if run <= max_run {
            out.push(ch);
        }
    }
    out
}

/// Collapse runs of the same vowel to one ("ee" -> "e").
fn collapse_vowel_runs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev: Option<char> = None;

    for ch in text.chars() {
        let repeat = is_vowel(ch) && prev.is_some_and(|p| same_letter(p, ch));
        prev = Some(ch);
        if !repeat {
            out.push(ch);
        }
    }
    out
}

fn restore_word(word: &str) -> String {
    let lower = word.to_lowercase();
    let Some(&(_, fixed)) = WORD_FIXES.iter().find(|(from, _)| *from == lower) else {
        return word.to_string();
    };

    let mut chars = word.chars();
    let first_upper = chars.next().is_some_and(char::is_uppercase);
    let all_upper = word.chars().count() > 1 && word.chars().all(char::is_uppercase);

    if all_upper {
        fixed.to_uppercase()
    } else if first_upper {
        let mut fixed_chars = fixed.chars();
        match fixed_chars.next() {
            Some(first) => first.to_uppercase().chain(fixed_chars).collect(),
            None => String::new(),
        }
    } else {
        fixed.to_string()
    }
}

fn same_letter(a: char, b: char) -> bool {
    a.to_lowercase().eq(b.to_lowercase())
}

fn is_vowel(ch: char) -> bool {
    matches!(ch.to_ascii_lowercase(), 'a' | 'e' | 'i' | 'o' | 'u')
}

#[cfg(test)]
mod tests {
    use super::{collapse_letter_runs, normalize_for_inference};

    #[test]
    fn stylized_greeting_loses_stretch_and_ellipsis() {
        let out = normalize_for_inference("Weeelcome.. heey!");
        assert_eq!(out, "Welcome, hey!");
        assert!(!out.contains(".."));
    }

    #[test]
    fn bare_hy_is_restored() {
        assert_eq!(normalize_for_inference("Hy"), "Hey");
        assert_eq!(normalize_for_inference("hy there"), "hey there");
    }

    #[test]
    fn long_letter_runs_are_capped_at_two() {
        assert_eq!(collapse_letter_runs("Heeeey", 2), "Heey");
        assert_eq!(collapse_letter_runs("Yesss!!!", 2), "Yess!!!");
        assert_eq!(collapse_letter_runs("AAAh", 2), "AAh");
    }

    #[test]
    fn over_collapsed_words_are_fixed() {
        assert_eq!(normalize_for_inference("Gooood job"), "Good job");
        assert_eq!(normalize_for_inference("Seee you soooon"), "See you soon");
        assert_eq!(normalize_for_inference("Keeep going"), "Keep going");
        assert_eq!(normalize_for_inference("One, two, threee"), "One, two, three");
        assert_eq!(normalize_for_inference("LOOOK"), "LOOK");
    }

    #[test]
    fn playful_phrase_is_cleaned_up() {
        assert_eq!(
            normalize_for_inference("  Heeey..   let's plaay!  "),
            "Hey, let's play!"
        );
    }

    #[test]
    fn ellipsis_runs_and_unicode_ellipsis_become_commas() {
        assert_eq!(normalize_for_inference("Wait... now"), "Wait, now");
        assert_eq!(normalize_for_inference("Wait… now"), "Wait, now");
        assert_eq!(normalize_for_inference("Wait .. now"), "Wait, now");
    }

    #[test]
    fn ordinary_text_is_untouched() {
        assert_eq!(normalize_for_inference("Hello there"), "Hello there");
        assert_eq!(normalize_for_inference("Draw a circle."), "Draw a circle.");
    }

    #[test]
    fn whitespace_only_normalizes_to_empty() {
        assert_eq!(normalize_for_inference("   \n\t "), "");
        assert_eq!(normalize_for_inference(".."), ",");
    }
}
