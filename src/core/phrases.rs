//! Deterministic phrase banks
//!
//! Selection is a pure function of (tone, kind, iteration mod bank size).
//! Templates carry `{essence}` and `{previous}` placeholders.

use lazy_static::lazy_static;
use regex::Regex;
use crate::types::Tone;

/// Role a phrase plays in the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhraseKind {
    Paraphrase,
    Check,
    Correction,
    Transition,
    Witness,
    /// Offered after repeated rejection
    Alternative,
    /// Offered after repeated silence
    NeedsSpace,
}

const PARAPHRASE: [&[&str]; 5] = [
    // Fire
    &[
        "It sounds like {essence}, and there's real force behind it.",
        "What I'm hearing is that {essence}, and it matters to you.",
        "So the heart of it is that {essence}.",
    ],
    // Water
    &[
        "It sounds like {essence}, and that carries a lot of feeling.",
        "I'm hearing that {essence}, and it touches something tender.",
        "So underneath it all, {essence}.",
    ],
    // Earth
    &[
        "So, practically speaking, {essence}.",
        "What I'm hearing is that {essence}, and it's weighing on your day to day.",
        "Let me put it plainly: {essence}.",
    ],
    // Air
    &[
        "If I follow you, {essence}.",
        "So the thought you're turning over is that {essence}.",
        "It sounds like you're trying to make sense of this: {essence}.",
    ],
    // Aether
    &[
        "It sounds like, at its core, {essence}.",
        "I'm sensing that {essence}, and it touches something deeper.",
        "Beneath the words, it seems {essence}.",
    ],
];

const CHECK: [&[&str]; 5] = [
    &["Is that close to it?", "Did I catch that right, or is there more?", "Is that what's driving this?"],
    &["Does that feel right?", "Am I close to what you're feeling?", "Does that sit right with you, or is it something else?"],
    &["Is that accurate?", "Have I got that right?", "Is that the practical heart of it?"],
    &["Am I following you correctly?", "Does that capture your thinking?", "Is that the idea, or am I missing a piece?"],
    &["Does that resonate?", "Is that close to what you're sensing?", "Does that ring true for you?"],
];

const WITNESS: [&[&str]; 5] = [
    &["I hear how strongly you feel about this.", "That's a lot of fire. I'm listening."],
    &["I'm here with you in this.", "That sounds like a lot to feel. I'm listening."],
    &["I hear you. That's a lot to carry.", "That sounds heavy. I'm here."],
    &["I'm following you. Take your time.", "That's a lot to think through. I'm listening."],
    &["I'm listening, and I'm with you.", "There's something meaningful here. I'm with you."],
];

const CORRECTION: &[&str] = &[
    "Thank you for correcting me. Not that {previous}, but that {essence}.",
    "I see, so it's less that {previous} and more that {essence}.",
    "Let me try again: rather than {previous}, {essence}.",
];

const TRANSITION: &[&str] = &[
    "Thank you for helping me understand. Where would you like to go from here?",
    "I think I have a clearer sense of it now. What feels most important next?",
];

const ALTERNATIVE: &[&str] = &[
    "I don't think I'm capturing this well. Would it help if you told me in your own words, and I simply listen?",
    "Maybe reflecting back isn't helping right now. I can just listen, or we can come at it another way.",
];

const NEEDS_SPACE: &[&str] = &[
    "I'll give you some space. I'm here when you're ready.",
    "No need to answer. We can pick this up whenever you like.",
];

/// Bank for a tone and kind
pub fn bank(tone: Tone, kind: PhraseKind) -> &'static [&'static str] {
    match kind {
        PhraseKind::Paraphrase => PARAPHRASE[tone.index()],
        PhraseKind::Check => CHECK[tone.index()],
        PhraseKind::Witness => WITNESS[tone.index()],
        PhraseKind::Correction => CORRECTION,
        PhraseKind::Transition => TRANSITION,
        PhraseKind::Alternative => ALTERNATIVE,
        PhraseKind::NeedsSpace => NEEDS_SPACE,
    }
}

/// Template for (tone, kind, iteration)
pub fn select(tone: Tone, kind: PhraseKind, iteration: u32) -> &'static str {
    let bank = bank(tone, kind);
    bank[iteration as usize % bank.len()]
}

/// Selected template with placeholders filled
pub fn render(tone: Tone, kind: PhraseKind, iteration: u32, essence: &str, previous: &str) -> String {
    select(tone, kind, iteration)
        .replace("{essence}", essence)
        .replace("{previous}", previous)
}

lazy_static! {
    static ref RE_FILLER: Regex = Regex::new(
        r"(?i)\b(um+|uh+|you know|i mean|basically|literally|kind of|sort of|i guess|i don'?t know|maybe|just|really|actually|honestly|so)\b,?"
    ).unwrap();

    static ref RE_SPACES: Regex = Regex::new(r"\s{2,}").unwrap();
}

/// First to second person
fn reflect_word(word: &str) -> Option<&'static str> {
    let mapped = match word.to_ascii_lowercase().as_str() {
        "i" => "you",
        "i'm" => "you're",
        "im" => "you're",
        "i've" => "you've",
        "i'll" => "you'll",
        "i'd" => "you'd",
        "me" => "you",
        "my" => "your",
        "mine" => "yours",
        "myself" => "yourself",
        "am" => "are",
        "was" => "were",
        _ => return None,
    };
    Some(mapped)
}

/// Distill a surface utterance into a second-person essential-meaning clause
pub fn distill_essence(text: &str) -> String {
    let stripped = RE_FILLER.replace_all(text.trim(), "");
    let stripped = RE_SPACES.replace_all(stripped.trim(), " ");

    let reflected: Vec<String> = stripped
        .split_whitespace()
        .map(|token| {
            let core = token.trim_end_matches(|c: char| c.is_ascii_punctuation() && c != '\'');
            let tail = &token[core.len()..];
            match reflect_word(core) {
                Some(mapped) => format!("{}{}", mapped, tail),
                None => token.to_string(),
            }
        })
        .collect();

    let essence = reflected
        .join(" ")
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, '.' | '!' | '?' | ',' | ';' | '…'))
        .to_string();

    let leading_that = essence.get(..5).is_some_and(|head| head.eq_ignore_ascii_case("that "));
    let essence = if leading_that { essence[5..].to_string() } else { essence };

    if essence.is_empty() {
        return "there's something here that's hard to put into words".to_string();
    }

    // Sentence-initial capital only; acronyms stay as written
    let mut chars = essence.chars();
    match (chars.next(), chars.next()) {
        (Some(first), Some(second)) if first.is_uppercase() && second.is_lowercase() => {
            let rest = &essence[first.len_utf8()..];
            format!("{}{}", first.to_lowercase(), rest)
        }
        _ => essence.clone(),
    }
}
