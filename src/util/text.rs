use std::borrow::Cow;

use quick_xml::escape::resolve_predefined_entity;
use unicode_width::UnicodeWidthChar;

/// Ellipsis appended to truncated text
const ELLIPSIS: &str = "...";
const ELLIPSIS_WIDTH: usize = 3;

/// Longest entity name looked at between `&` and `;`
const MAX_ENTITY_LEN: usize = 32;

/// Decodes HTML entities that survived XML decoding.
///
/// Feeds routinely double-escape (`&amp;amp;`) or put entity references inside
/// CDATA (`<![CDATA[Tom&#39;s]]>`), so titles and descriptions go through one
/// more unescape pass before storage. Numeric references, the five XML
/// builtins and the common HTML named entities are resolved.
///
/// Each reference is handled on its own: a bare `&` or an unknown name stays
/// literal and the references around it are still decoded.
///
/// ```
/// use gator::util::unescape_html;
///
/// assert_eq!(unescape_html("Fish &amp;amp; Chips"), "Fish &amp; Chips");
/// assert_eq!(unescape_html("Tom&#39;s"), "Tom's");
/// assert_eq!(unescape_html("AT&T &amp; friends"), "AT&T & friends");
/// ```
pub fn unescape_html(s: &str) -> Cow<'_, str> {
    unescape_lenient(s, |name| {
        resolve_predefined_entity(name).or_else(|| resolve_html_entity(name))
    })
}

/// XML-level unescape for text the strict decoder rejected.
///
/// Resolves numeric references and the five XML builtins, leaving anything
/// else (HTML names, bare `&`) for [`unescape_html`].
pub(crate) fn unescape_xml_lenient(s: &str) -> Cow<'_, str> {
    unescape_lenient(s, resolve_predefined_entity)
}

fn unescape_lenient<'a>(
    s: &'a str,
    resolve: impl Fn(&str) -> Option<&'static str>,
) -> Cow<'a, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];

        let resolved = after
            .find(';')
            .filter(|&end| end > 0 && end <= MAX_ENTITY_LEN)
            .and_then(|end| resolve_reference(&after[..end], &resolve).map(|r| (r, end)));

        match resolved {
            Some((resolved, end)) => {
                out.push_str(&resolved);
                rest = &after[end + 1..];
            }
            None => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);

    Cow::Owned(out)
}

fn resolve_reference(
    name: &str,
    resolve: &impl Fn(&str) -> Option<&'static str>,
) -> Option<Cow<'static, str>> {
    if let Some(number) = name.strip_prefix('#') {
        let code = match number.strip_prefix(|c: char| c == 'x' || c == 'X') {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => number.parse::<u32>().ok()?,
        };
        return char::from_u32(code)
            .filter(|c| *c != '\0')
            .map(|c| Cow::Owned(c.to_string()));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    resolve(name).map(Cow::Borrowed)
}

fn resolve_html_entity(name: &str) -> Option<&'static str> {
    let resolved = match name {
        "nbsp" => "\u{a0}",
        "ndash" => "\u{2013}",
        "mdash" => "\u{2014}",
        "hellip" => "\u{2026}",
        "lsquo" => "\u{2018}",
        "rsquo" => "\u{2019}",
        "ldquo" => "\u{201c}",
        "rdquo" => "\u{201d}",
        "laquo" => "\u{ab}",
        "raquo" => "\u{bb}",
        "copy" => "\u{a9}",
        "reg" => "\u{ae}",
        "trade" => "\u{2122}",
        "euro" => "\u{20ac}",
        "pound" => "\u{a3}",
        "middot" => "\u{b7}",
        "bull" => "\u{2022}",
        _ => return None,
    };
    Some(resolved)
}

/// Truncates a string to `max_width` terminal columns, appending "..." when cut.
///
/// Widths come from `unicode-width`, so CJK and emoji count as two columns.
/// Widths of 3 or less have no room for the ellipsis and just cut.
pub fn truncate_to_width(s: &str, max_width: usize) -> Cow<'_, str> {
    let width_of = |c: char| UnicodeWidthChar::width(c).unwrap_or(0);

    let total: usize = s.chars().map(width_of).sum();
    if total <= max_width {
        return Cow::Borrowed(s);
    }

    let budget = if max_width > ELLIPSIS_WIDTH {
        max_width - ELLIPSIS_WIDTH
    } else {
        max_width
    };

    let mut used = 0;
    let mut end = 0;
    for (idx, c) in s.char_indices() {
        let w = width_of(c);
        if used + w > budget {
            break;
        }
        used += w;
        end = idx + c.len_utf8();
    }

    if max_width > ELLIPSIS_WIDTH {
        Cow::Owned(format!("{}{}", s[..end].trim_end(), ELLIPSIS))
    } else {
        Cow::Owned(s[..end].to_string())
    }
}

/// Removes terminal control characters and ANSI escape sequences.
///
/// Feed titles and descriptions are attacker-controlled text printed straight
/// to the terminal by `browse`. Tab, newline and carriage return are kept.
/// CSI (`ESC [ ... final`) and OSC (`ESC ] ... BEL|ESC \`) sequences are
/// dropped whole.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let is_control = |c: char| {
        c == '\u{1b}' || c == '\u{7f}' || (c < ' ' && !matches!(c, '\t' | '\n' | '\r'))
    };
    if !s.chars().any(is_control) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\u{1b}' {
            if !is_control(c) {
                out.push(c);
            }
            continue;
        }
        match chars.peek() {
            Some('[') => {
                chars.next();
                for n in chars.by_ref() {
                    if ('\u{40}'..='\u{7e}').contains(&n) {
                        break;
                    }
                }
            }
            Some(']') => {
                chars.next();
                while let Some(n) = chars.next() {
                    if n == '\u{7}' {
                        break;
                    }
                    if n == '\u{1b}' && chars.peek() == Some(&'\\') {
                        chars.next();
                        break;
                    }
                }
            }
            _ => {}
        }
    }

    Cow::Owned(out)
}
