use lazy_static::lazy_static;
use regex::Regex;

use crate::tts::{SpeechRequest, TtsError};

/// Largest SSML text payload the service accepts per connection, in bytes.
pub const MAX_TEXT_BYTES: usize = 4096;

lazy_static! {
    static ref SHORT_VOICE: Regex = Regex::new(r"^([a-z]{2,})-([A-Z]{2,})-(.+Neural)$").unwrap();
    static ref LONG_VOICE: Regex =
        Regex::new(r"^Microsoft Server Speech Text to Speech Voice \(.+,.+\)$").unwrap();
    static ref RATE: Regex = Regex::new(r"^[+-]\d+%$").unwrap();
    static ref PITCH: Regex = Regex::new(r"^[+-]\d+Hz$").unwrap();
}

/// Validated prosody settings ready to be embedded in SSML.
#[derive(Debug, Clone, PartialEq)]
pub struct Prosody {
    pub voice: String,
    pub rate: String,
    pub pitch: String,
}

impl Prosody {
    pub fn from_request(request: &SpeechRequest) -> Result<Self, TtsError> {
        let voice = expand_voice(&request.voice)?;

        if !RATE.is_match(&request.rate) {
            return Err(TtsError::InvalidRate(request.rate.clone()));
        }

        if !PITCH.is_match(&request.pitch) {
            return Err(TtsError::InvalidPitch(request.pitch.clone()));
        }

        Ok(Self {
            voice,
            rate: request.rate.clone(),
            pitch: request.pitch.clone(),
        })
    }
}

/// Expand a short voice name (e.g. `en-GB-RyanNeural`) into the full service
/// name. Names already in long form are passed through after validation.
pub fn expand_voice(voice: &str) -> Result<String, TtsError> {
    let expanded = match SHORT_VOICE.captures(voice) {
        Some(cap) => {
            let lang = &cap[1];
            let mut region = cap[2].to_string();
            let mut name = &cap[3];

            // zh-CN-liaoning-XiaobeiNeural -> (zh-CN-liaoning, XiaobeiNeural)
            if let Some(dash) = name.find('-') {
                region = format!("{}-{}", region, &name[..dash]);
                name = &name[dash + 1..];
            }

            format!(
                "Microsoft Server Speech Text to Speech Voice ({}-{}, {})",
                lang, region, name
            )
        }
        None => voice.to_string(),
    };

    if !LONG_VOICE.is_match(&expanded) {
        return Err(TtsError::InvalidVoice(voice.to_string()));
    }

    Ok(expanded)
}

/// Replace control characters the service rejects with spaces.
pub fn remove_incompatible_characters(text: &str) -> String {
    text.chars()
        .map(|c| match c as u32 {
            0..=8 | 11..=12 | 14..=31 => ' ',
            _ => c,
        })
        .collect()
}

pub fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Split escaped text into pieces of at most `limit` bytes.
///
/// Splits prefer the last newline, then the last space inside the window, and
/// never land inside a UTF-8 sequence or an `&...;` entity. Whitespace-only
/// pieces are dropped.
pub fn split_text(text: &str, limit: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest = text;

    while rest.len() > limit {
        let at = split_point(rest, limit);
        let (head, tail) = rest.split_at(at);
        push_piece(&mut pieces, head);
        rest = tail;
    }
    push_piece(&mut pieces, rest);

    pieces
}

fn push_piece(pieces: &mut Vec<String>, piece: &str) {
    let trimmed = piece.trim();
    if !trimmed.is_empty() {
        pieces.push(trimmed.to_string());
    }
}

fn split_point(text: &str, limit: usize) -> usize {
    let window = &text[..floor_char_boundary(text, limit)];

    let mut at = window
        .rfind('\n')
        .or_else(|| window.rfind(' '))
        .map(|i| i + 1)
        .unwrap_or(window.len());

    // Back off if the cut would land inside an entity such as `&amp;`.
    if let Some(amp) = text[..at].rfind('&') {
        if !text[amp..at].contains(';') && amp > 0 {
            at = amp;
        }
    }

    // Guarantee progress on pathological input.
    if at == 0 {
        at = floor_char_boundary(text, limit).max(first_char_len(text));
    }

    at
}

fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut i = index.min(text.len());
    while !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn first_char_len(text: &str) -> usize {
    text.chars().next().map(char::len_utf8).unwrap_or(0)
}

/// Prepare raw user text for SSML: sanitize, escape, split.
pub fn prepare_text(text: &str) -> Vec<String> {
    split_text(&escape_xml(&remove_incompatible_characters(text)), MAX_TEXT_BYTES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_short_voice() {
        assert_eq!(
            expand_voice("en-GB-RyanNeural").unwrap(),
            "Microsoft Server Speech Text to Speech Voice (en-GB, RyanNeural)"
        );
    }

    #[test]
    fn expands_voice_with_region_suffix() {
        assert_eq!(
            expand_voice("zh-CN-liaoning-XiaobeiNeural").unwrap(),
            "Microsoft Server Speech Text to Speech Voice (zh-CN-liaoning, XiaobeiNeural)"
        );
    }

    #[test]
    fn keeps_long_voice() {
        let long = "Microsoft Server Speech Text to Speech Voice (en-US, AriaNeural)";
        assert_eq!(expand_voice(long).unwrap(), long);
    }

    #[test]
    fn rejects_bad_voice() {
        let err = expand_voice("Ryan").unwrap_err();
        assert_eq!(err.to_string(), "Invalid voice 'Ryan'.");
    }

    #[test]
    fn validates_rate_and_pitch() {
        let mut request = SpeechRequest::new("hi");
        assert!(Prosody::from_request(&request).is_ok());

        request.rate = "10%".into();
        assert!(matches!(
            Prosody::from_request(&request),
            Err(TtsError::InvalidRate(_))
        ));

        request.rate = "-20%".into();
        request.pitch = "+5".into();
        assert!(matches!(
            Prosody::from_request(&request),
            Err(TtsError::InvalidPitch(_))
        ));
    }

    #[test]
    fn replaces_control_characters() {
        assert_eq!(remove_incompatible_characters("a\u{0}b\tc\u{1f}d\ne"), "a b\tc d\ne");
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(escape_xml("Tom & <Jerry>"), "Tom &amp; &lt;Jerry&gt;");
    }

    #[test]
    fn short_text_is_one_piece() {
        assert_eq!(prepare_text("Hello world"), vec!["Hello world"]);
    }

    #[test]
    fn empty_text_has_no_pieces() {
        assert!(prepare_text("").is_empty());
        assert!(prepare_text("   ").is_empty());
    }

    #[test]
    fn splits_on_spaces() {
        let pieces = split_text("one two three four", 9);
        assert_eq!(pieces, vec!["one two", "three", "four"]);
        assert!(pieces.iter().all(|p| p.len() <= 9));
    }

    #[test]
    fn prefers_newline_over_space() {
        let pieces = split_text("ab cd\nef gh", 10);
        assert_eq!(pieces, vec!["ab cd", "ef gh"]);
    }

    #[test]
    fn never_splits_multibyte_chars() {
        let text = "é".repeat(10);
        let pieces = split_text(&text, 5);
        assert_eq!(pieces.concat(), text);
        assert!(pieces.iter().all(|p| p.len() <= 5));
    }

    #[test]
    fn never_splits_entities() {
        let pieces = split_text("abcdef&amp;gh", 9);
        assert_eq!(pieces, vec!["abcdef", "&amp;gh"]);
    }
}
