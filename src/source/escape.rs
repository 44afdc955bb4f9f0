//! Escape-aware helpers shared by the lexer and the tag grammar

/// Escape symbol used when a format does not declare one
pub const DEFAULT_ESCAPE: char = '\\';

/// Replaces every escape pair with `fill`
///
/// An escape pair is the escape symbol followed by any character other than a
/// line break. The result has the same number of chars as `text`.
pub fn mask_escaped(text: &str, escape: char, fill: char) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == escape {
            if let Some(&next) = chars.peek() {
                if next != '\n' && next != '\r' {
                    chars.next();
                    result.push(fill);
                    result.push(fill);
                    continue;
                }
            }
        }
        result.push(c);
    }
    result
}

/// True if `text` ends with an escape symbol that is not itself escaped
pub fn ends_with_unescaped(text: &str, escape: char) -> bool {
    mask_escaped(text, escape, '_').ends_with(escape)
}

/// Bytes to drop from the end of `line` when it continues on the next line
///
/// Zero when the line does not end with an unescaped continuation sequence.
pub fn continuation_len(line: &str, escape: char) -> usize {
    let masked = mask_escaped(line, escape, '~');
    let esc = escape.len_utf8();
    let mut buf = [0u8; 4];
    let esc_str = escape.encode_utf8(&mut buf);

    let short = format!("{esc_str}\n");
    let crlf = format!("{esc_str}\r\n");
    let lfcr = format!("{esc_str}\n\r");
    if masked.ends_with(&crlf) || masked.ends_with(&lfcr) {
        esc + 2
    } else if masked.ends_with(&short) {
        esc + 1
    } else {
        0
    }
}
