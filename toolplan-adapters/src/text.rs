//! Cleanup of raw model text before it is parsed or shown to callers.

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

/// Removes `<think>...</think>` reasoning blocks emitted by reasoning models.
///
/// An unterminated block swallows the rest of the text. A stray closing tag
/// with no opening tag drops everything before it, matching models that omit
/// the opening tag.
#[must_use]
pub fn strip_think_tags(text: &str) -> String {
    let mut rest = text;
    if let Some(close) = rest.find(THINK_CLOSE) {
        if rest[..close].find(THINK_OPEN).is_none() {
            rest = &rest[close + THINK_CLOSE.len()..];
        }
    }

    let mut out = String::with_capacity(rest.len());
    while let Some(open) = rest.find(THINK_OPEN) {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + THINK_OPEN.len()..];
        match after_open.find(THINK_CLOSE) {
            Some(close) => rest = &after_open[close + THINK_CLOSE.len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out.trim().to_owned()
}

/// Returns the body of the first fenced code block, or the trimmed input when
/// no fence is present.
#[must_use]
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let after = &trimmed[start + 3..];
    // skip the language tag line, e.g. ```json
    let body_start = after.find('\n').map_or(after.len(), |idx| idx + 1);
    let body = &after[body_start..];
    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}
