//! Cleanup of extracted document text before it is segmented and spoken.

/// Characters replaced before speech; extractors emit these from PDF fonts.
const REPLACEMENTS: &[(char, &str)] = &[
    ('\u{fb00}', "ff"),  // Ligature ff
    ('\u{fb01}', "fi"),  // Ligature fi
    ('\u{fb02}', "fl"),  // Ligature fl
    ('\u{fb03}', "ffi"), // Ligature ffi
    ('\u{fb04}', "ffl"), // Ligature ffl
    ('\u{00a0}', " "),   // Non-breaking space
    ('\u{2002}', " "),   // En space
    ('\u{2003}', " "),   // Em space
    ('\u{2009}', " "),   // Thin space
    ('\u{00ad}', ""),    // Soft hyphen
    ('\u{200b}', ""),    // Zero-width space
    ('\u{200c}', ""),    // Zero-width non-joiner
    ('\u{200d}', ""),    // Zero-width joiner
    ('\u{feff}', ""),    // BOM
    ('\u{000c}', "\n\n"), // Form feed between pages
];

/// Normalize extractor output for reading aloud.
///
/// - Replaces ligatures and exotic spaces, drops invisible characters
/// - Removes control characters other than newlines
/// - Rejoins words hyphenated across a line break
/// - Unwraps hard-wrapped lines, keeping blank-line paragraph breaks
/// - Collapses runs of spaces
pub fn normalize_extracted(text: &str) -> String {
    let mut replaced = String::with_capacity(text.len());

    for c in text.chars() {
        if let Some((_, r)) = REPLACEMENTS.iter().find(|(ch, _)| *ch == c) {
            replaced.push_str(r);
        } else if c == '\r' {
            continue;
        } else if c == '\t' {
            replaced.push(' ');
        } else if c == '\n' || !c.is_control() {
            replaced.push(c);
        }
    }

    let paragraphs: Vec<String> = replaced
        .split("\n\n")
        .map(unwrap_paragraph)
        .filter(|p| !p.is_empty())
        .collect();

    paragraphs.join("\n\n")
}

/// Join the lines of one paragraph into a single line.
fn unwrap_paragraph(paragraph: &str) -> String {
    let mut result = String::with_capacity(paragraph.len());

    for line in paragraph.lines() {
        let line = collapse_spaces(line.trim());
        if line.is_empty() {
            continue;
        }

        if result.is_empty() {
            result.push_str(&line);
        } else if ends_with_split_word(&result) && starts_with_lowercase(&line) {
            result.pop();
            result.push_str(&line);
        } else {
            result.push(' ');
            result.push_str(&line);
        }
    }

    result
}

/// A trailing hyphen directly after a letter, e.g. "exam-".
fn ends_with_split_word(text: &str) -> bool {
    let mut rev = text.chars().rev();
    matches!((rev.next(), rev.next()), (Some('-'), Some(c)) if c.is_alphabetic())
}

fn starts_with_lowercase(text: &str) -> bool {
    text.chars().next().is_some_and(char::is_lowercase)
}

fn collapse_spaces(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut prev_was_space = false;

    for c in text.chars() {
        if c == ' ' {
            if !prev_was_space {
                result.push(' ');
            }
            prev_was_space = true;
        } else {
            result.push(c);
            prev_was_space = false;
        }
    }

    result
}
