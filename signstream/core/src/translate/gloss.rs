//! Text to Gloss
//!
//! Stand-ins for the speech and language steps in front of the animation
//! pipeline. Transcription is an identity passthrough and gloss translation
//! is a static phrase table; neither does any real NLP.

/// Phrase table, lowercase English to gloss
const GLOSS_TABLE: &[(&str, &str)] = &[
    ("hello", "HELLO"),
    ("hi", "HELLO"),
    ("how are you", "HOW YOU"),
    ("how are you?", "HOW YOU?"),
    ("good morning", "MORNING GOOD"),
    ("good evening", "EVENING GOOD"),
    ("thank you", "THANK-YOU"),
    ("please", "PLEASE"),
    ("sorry", "SORRY"),
    ("yes", "YES"),
    ("no", "NO"),
    ("my name is", "MY NAME"),
    ("nice to meet you", "NICE MEET YOU"),
    ("see you later", "SEE-YOU LATER"),
    ("goodbye", "GOODBYE"),
    ("help", "HELP"),
    ("water", "WATER"),
    ("food", "FOOD"),
    ("hospital", "HOSPITAL"),
    ("doctor", "DOCTOR"),
    ("school", "SCHOOL"),
    ("work", "WORK"),
    ("home", "HOME"),
    ("family", "FAMILY"),
];

/// Words dropped from the gloss
const FILLER_WORDS: &[&str] = &["ARE", "IS", "THE"];

const PUNCTUATION: &[char] = &['.', ',', '!', '?', ';', ':'];

/// Identity transcription: returns the input trimmed
#[must_use]
pub fn transcribe(audio_text: &str) -> String {
    audio_text.trim().to_string()
}

fn lookup(phrase: &str) -> Option<&'static str> {
    GLOSS_TABLE
        .iter()
        .find(|(english, _)| *english == phrase)
        .map(|(_, gloss)| *gloss)
}

/// Convert English text to a gloss string
///
/// An exact table match on the whole text wins. Otherwise the words are
/// scanned left to right, matching the longest table phrase at each
/// position (punctuation stripped); unmatched words are uppercased.
/// `ARE`, `IS` and `THE` are dropped unless nothing else remains.
#[must_use]
pub fn text_to_gloss(text: &str) -> String {
    let lower = text.trim().to_lowercase();
    if let Some(gloss) = lookup(&lower) {
        return gloss.to_string();
    }

    let words: Vec<&str> = lower
        .split_whitespace()
        .map(|w| w.trim_matches(PUNCTUATION))
        .filter(|w| !w.is_empty())
        .collect();
    if words.is_empty() {
        return text.trim().to_uppercase();
    }

    let longest_phrase = GLOSS_TABLE
        .iter()
        .map(|(english, _)| english.split_whitespace().count())
        .max()
        .unwrap_or(1);

    let mut gloss: Vec<String> = Vec::with_capacity(words.len());
    let mut i = 0;
    while i < words.len() {
        let max_len = longest_phrase.min(words.len() - i);
        let matched = (1..=max_len)
            .rev()
            .find_map(|len| lookup(&words[i..i + len].join(" ")).map(|g| (len, g)));

        match matched {
            Some((len, g)) => {
                gloss.push(g.to_string());
                i += len;
            }
            None => {
                gloss.push(words[i].to_uppercase());
                i += 1;
            }
        }
    }

    let content: Vec<&str> = gloss
        .iter()
        .flat_map(|g| g.split_whitespace())
        .filter(|w| !FILLER_WORDS.contains(w))
        .collect();

    if content.is_empty() {
        gloss.join(" ")
    } else {
        content.join(" ")
    }
}
