//! Heuristic language identification used to short-circuit translation of
//! text that is already in the target language.
//!
//! Non-Latin scripts are classified by code-point ranges; Latin-script
//! languages by stop-word density. The classifier only ever gates a
//! *skip* decision, so a wrong low-confidence guess costs one provider
//! call, never a wrong translation.

/// Languages the pipeline accepts as a translation target.
pub const SUPPORTED_LANGS: &[&str] = &[
    "en", "es", "fr", "de", "ja", "ko", "zh", "hi", "ar", "ru", "pt", "it", "nl", "pl", "sv", "tr",
];

pub fn is_supported(code: &str) -> bool {
    let lowered = code.to_ascii_lowercase();
    SUPPORTED_LANGS.contains(&lowered.as_str())
}

/// Classifier output: a language code (empty when undecidable) and a
/// confidence in `0.0..=1.0`.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub language: String,
    pub confidence: f32,
}

impl Detection {
    fn unknown() -> Self {
        Self {
            language: String::new(),
            confidence: 0.0,
        }
    }
}

/// Tunables for the skip decision. Short texts are never skip-matched:
/// confidence is unreliable at low length.
#[derive(Debug, Clone)]
pub struct MatchPolicy {
    pub confidence_threshold: f32,
    pub min_chars: usize,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.85,
            min_chars: 24,
        }
    }
}

/// True when `text` is confidently already in `target`, meaning the
/// coordinator can return it unchanged without burning provider quota.
pub fn matches_target(text: &str, target: &str, policy: &MatchPolicy) -> bool {
    let cleaned = text.trim();
    if cleaned.chars().count() < policy.min_chars {
        return false;
    }
    let detection = detect(cleaned);
    detection.language.eq_ignore_ascii_case(target)
        && detection.confidence >= policy.confidence_threshold
}

/// Classify the language of `text`.
pub fn detect(text: &str) -> Detection {
    let cleaned = text.trim();
    if cleaned.is_empty() {
        return Detection::unknown();
    }

    if let Some(by_script) = detect_by_script(cleaned) {
        return by_script;
    }
    detect_by_stopwords(cleaned)
}

/// Script ranges settle non-Latin languages outright when they dominate
/// the letter mass.
fn detect_by_script(text: &str) -> Option<Detection> {
    let mut letters = 0usize;
    let mut kana = 0usize;
    let mut hangul = 0usize;
    let mut han = 0usize;
    let mut arabic = 0usize;
    let mut cyrillic = 0usize;
    let mut devanagari = 0usize;

    for c in text.chars() {
        if !c.is_alphabetic() {
            continue;
        }
        letters += 1;
        match c as u32 {
            0x3040..=0x30FF => kana += 1,
            0xAC00..=0xD7AF | 0x1100..=0x11FF => hangul += 1,
            0x4E00..=0x9FFF | 0x3400..=0x4DBF => han += 1,
            0x0600..=0x06FF | 0x0750..=0x077F => arabic += 1,
            0x0400..=0x04FF => cyrillic += 1,
            0x0900..=0x097F => devanagari += 1,
            _ => {}
        }
    }
    if letters == 0 {
        return None;
    }

    // Kana anywhere implies Japanese even when Han dominates.
    let candidates: [(&str, usize); 6] = [
        ("ja", if kana > 0 { kana + han } else { 0 }),
        ("zh", if kana == 0 { han } else { 0 }),
        ("ko", hangul),
        ("ar", arabic),
        ("ru", cyrillic),
        ("hi", devanagari),
    ];
    let (lang, count) = candidates.into_iter().max_by_key(|(_, n)| *n)?;
    let ratio = count as f32 / letters as f32;
    if ratio >= 0.5 {
        Some(Detection {
            language: lang.to_string(),
            confidence: ratio.min(0.99),
        })
    } else {
        None
    }
}

/// Latin-script languages ranked by stop-word hits. Confidence is the
/// (scaled) fraction of words that are known stop words.
fn detect_by_stopwords(text: &str) -> Detection {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .collect();
    if words.is_empty() {
        return Detection::unknown();
    }

    let mut best: Option<(&str, usize)> = None;
    for (lang, table) in STOPWORDS {
        let hits = words.iter().filter(|w| table.contains(w)).count();
        if hits > 0 && best.map(|(_, h)| hits > h).unwrap_or(true) {
            best = Some((lang, hits));
        }
    }
    match best {
        Some((lang, hits)) => Detection {
            language: lang.to_string(),
            confidence: (2.0 * hits as f32 / words.len() as f32).min(0.98),
        },
        None => Detection::unknown(),
    }
}

const STOPWORDS: &[(&str, &[&str])] = &[
    (
        "en",
        &[
            "the", "and", "is", "are", "was", "to", "of", "you", "this", "that", "with", "for",
            "have", "not", "but", "hello",
        ],
    ),
    (
        "es",
        &[
            "el", "la", "los", "las", "es", "y", "de", "que", "un", "una", "por", "para", "como",
            "está", "estás", "hola", "cómo", "muy",
        ],
    ),
    (
        "fr",
        &[
            "le", "la", "les", "est", "et", "de", "que", "un", "une", "pour", "avec", "vous", "il",
            "elle", "sur", "bonjour", "tout", "pas",
        ],
    ),
    (
        "de",
        &[
            "der", "die", "das", "ist", "und", "nicht", "ein", "eine", "mit", "für", "ich", "sie",
            "auf", "hallo",
        ],
    ),
    (
        "pt",
        &[
            "o", "os", "as", "é", "e", "que", "um", "uma", "não", "você", "está", "olá", "com",
            "isso",
        ],
    ),
    (
        "it",
        &[
            "il", "lo", "gli", "è", "che", "non", "per", "con", "sono", "ciao", "questo", "molto",
        ],
    ),
    (
        "nl",
        &["de", "het", "een", "en", "is", "van", "niet", "ik", "je", "dat", "hallo"],
    ),
    (
        "pl",
        &["jest", "nie", "się", "i", "w", "na", "to", "z", "że", "jak", "cześć"],
    ),
    (
        "sv",
        &["och", "är", "det", "att", "en", "ett", "inte", "jag", "hej", "som"],
    ),
    (
        "tr",
        &["bir", "ve", "bu", "için", "değil", "evet", "ben", "merhaba", "çok"],
    ),
];
