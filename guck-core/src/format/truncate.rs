//! Message truncation with an optional focus term

use crate::event::Event;

pub const ELLIPSIS: &str = "...";
const ELLIPSIS_LEN: usize = 3;

fn find_case_insensitive(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    let fold = |c: &char| c.to_lowercase().collect::<String>();
    let needle: Vec<String> = needle.iter().map(fold).collect();
    (0..=haystack.len() - needle.len()).find(|&start| {
        haystack[start..start + needle.len()]
            .iter()
            .zip(&needle)
            .all(|(h, n)| &fold(h) == n)
    })
}

fn head(chars: &[char], max: usize) -> String {
    if max <= ELLIPSIS_LEN {
        return chars[..max].iter().collect();
    }
    let mut out: String = chars[..max - ELLIPSIS_LEN].iter().collect();
    out.push_str(ELLIPSIS);
    out
}

/// Shorten `message` to at most `max` characters.
///
/// Without a term, or when the term does not occur, the head is kept and
/// `...` appended. When the term occurs, a window centred on its first
/// case-insensitive occurrence is kept; the ellipsis is dropped on a side
/// that reaches the start or end of the message and that budget is given to
/// the other side.
pub fn truncate_message(message: &str, max: usize, term: Option<&str>) -> String {
    let chars: Vec<char> = message.chars().collect();
    let len = chars.len();
    if max == 0 || len <= max {
        return message.to_string();
    }

    let term_chars: Vec<char> = term.unwrap_or("").chars().collect();
    let Some(pos) = find_case_insensitive(&chars, &term_chars) else {
        return head(&chars, max);
    };
    if max <= 2 * ELLIPSIS_LEN {
        return head(&chars, max);
    }

    let budget = max - 2 * ELLIPSIS_LEN;
    let center = pos + term_chars.len() / 2;
    let mut start = center.saturating_sub(budget / 2);
    let mut end = start + budget;
    if end > len {
        end = len;
        start = len - budget;
    }
    if start == 0 {
        end = (end + ELLIPSIS_LEN).min(len);
    } else if end == len {
        start = start.saturating_sub(ELLIPSIS_LEN);
    }

    let mut out = String::new();
    if start > 0 {
        out.push_str(ELLIPSIS);
    }
    out.extend(&chars[start..end]);
    if end < len {
        out.push_str(ELLIPSIS);
    }
    out
}

/// Apply [`truncate_message`] to every event's message
pub fn truncate_messages(events: &mut [Event], max: usize, term: Option<&str>) {
    if max == 0 {
        return;
    }
    for event in events.iter_mut() {
        if let Some(message) = &event.message {
            if message.chars().count() > max {
                event.message = Some(truncate_message(message, max, term));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_messages_untouched() {
        assert_eq!(truncate_message("hello", 10, None), "hello");
        assert_eq!(truncate_message("hello", 0, None), "hello");
    }

    #[test]
    fn test_head_truncation() {
        assert_eq!(truncate_message("abcdefghijklmnop", 10, None), "abcdefg...");
        assert_eq!(truncate_message("abcdefghijklmnop", 10, Some("zzz")), "abcdefg...");
    }

    #[test]
    fn test_window_centred_on_term() {
        let message = format!("{}NEEDLE{}", "a".repeat(50), "b".repeat(50));
        let out = truncate_message(&message, 20, Some("needle"));
        assert_eq!(out.chars().count(), 20);
        assert!(out.starts_with(ELLIPSIS));
        assert!(out.ends_with(ELLIPSIS));
        assert!(out.contains("NEEDLE"));
    }

    #[test]
    fn test_window_at_start_drops_leading_ellipsis() {
        let message = format!("needle {}", "x".repeat(100));
        let out = truncate_message(&message, 20, Some("NEEDLE"));
        assert!(out.starts_with("needle"));
        assert!(out.ends_with(ELLIPSIS));
        assert_eq!(out.chars().count(), 20);
    }

    #[test]
    fn test_window_at_end_drops_trailing_ellipsis() {
        let message = format!("{} needle", "x".repeat(100));
        let out = truncate_message(&message, 20, Some("needle"));
        assert!(out.starts_with(ELLIPSIS));
        assert!(out.ends_with("needle"));
        assert_eq!(out.chars().count(), 20);
    }

    #[test]
    fn test_tiny_caps() {
        assert_eq!(truncate_message("abcdef", 2, None), "ab");
        assert_eq!(truncate_message("abcdefgh", 5, Some("f")), "ab...");
    }
}
