//! Output size guard
//!
//! Decides whether a shaped payload may be returned as-is. It never edits
//! the payload: an oversized one is replaced by a warning that says how big
//! it was and how to ask for less.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::Event;
use crate::params::OutputFormat;

/// Inputs to the guard besides the payload itself
#[derive(Debug, Clone, Default)]
pub struct GuardOptions {
    /// 0 means uncapped
    pub max_output_chars: usize,
    pub force: bool,
    pub format: OutputFormat,
    /// Number of items in the payload
    pub items: usize,
    pub truncated: bool,
    /// Request limit, echoed in suggestions
    pub limit: Option<usize>,
}

/// Message length statistics over an event set
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageLengths {
    pub avg: usize,
    pub max: usize,
}

impl MessageLengths {
    pub fn of(events: &[Event]) -> Self {
        let lengths: Vec<usize> = events
            .iter()
            .filter_map(|e| e.message.as_deref())
            .map(|m| m.chars().count())
            .collect();
        if lengths.is_empty() {
            return Self::default();
        }
        let total: usize = lengths.iter().sum();
        Self {
            avg: (total as f64 / lengths.len() as f64).round() as usize,
            max: lengths.iter().copied().max().unwrap_or(0),
        }
    }
}

/// Returned in place of an oversized payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputWarning {
    pub warning: String,
    pub blocked: bool,
    pub max_output_chars: usize,
    pub estimated_output_chars: usize,
    pub format: OutputFormat,
    pub items: usize,
    pub truncated: bool,
    pub avg_message_chars: usize,
    pub max_message_chars: usize,
    pub suggestions: Vec<String>,
}

/// Outcome of guarding a payload
#[derive(Debug, Clone, PartialEq)]
pub enum Guarded {
    Pass(Value),
    Blocked(OutputWarning),
}

impl Guarded {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Guarded::Blocked(_))
    }

    pub fn into_value(self) -> Value {
        match self {
            Guarded::Pass(value) => value,
            Guarded::Blocked(warning) => serde_json::to_value(warning).unwrap_or(Value::Null),
        }
    }
}

/// Size of a payload as it will be sent
pub fn estimate_chars(payload: &Value) -> usize {
    serde_json::to_string(payload)
        .map(|s| s.chars().count())
        .unwrap_or(0)
}

fn suggestions(options: &GuardOptions, estimated: usize, lengths: MessageLengths) -> Vec<String> {
    let cap = options.max_output_chars;
    let mut out = Vec::new();

    if options.items > 1 {
        let fitting = (options.items * cap / estimated.max(1)).max(1);
        let current = options
            .limit
            .map(|l| format!(" (currently {})", l))
            .unwrap_or_default();
        out.push(format!("Lower `limit`{} to about {}.", current, fitting));
    }
    if options.format == OutputFormat::Json {
        out.push("Project with `fields`, e.g. [\"ts\",\"level\",\"message\"].".to_string());
        out.push(
            "Use `format: \"text\"` with a `template` such as \"{ts} {level} {message}\"."
                .to_string(),
        );
    }
    if lengths.max > 0 {
        let target = (lengths.avg.max(80)).min(lengths.max);
        out.push(format!(
            "Set `max_message_chars` (e.g. {}) to trim long messages.",
            target
        ));
    }
    out.push("Pass `force: true` to return the full output anyway.".to_string());
    out
}

/// Pass the payload through, or replace it with a warning when it exceeds
/// the cap and `force` is not set
pub fn guard_output(payload: Value, options: &GuardOptions, lengths: MessageLengths) -> Guarded {
    if options.force || options.max_output_chars == 0 {
        return Guarded::Pass(payload);
    }
    let estimated = estimate_chars(&payload);
    if estimated <= options.max_output_chars {
        return Guarded::Pass(payload);
    }

    Guarded::Blocked(OutputWarning {
        warning: format!(
            "Output would be about {} chars, over max_output_chars ({}). Nothing was returned.",
            estimated, options.max_output_chars
        ),
        blocked: true,
        max_output_chars: options.max_output_chars,
        estimated_output_chars: estimated,
        format: options.format,
        items: options.items,
        truncated: options.truncated,
        avg_message_chars: lengths.avg,
        max_message_chars: lengths.max,
        suggestions: suggestions(options, estimated, lengths),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> Value {
        json!({"events": [{"message": "a".repeat(500)}, {"message": "b".repeat(100)}], "truncated": false})
    }

    fn options(max: usize, force: bool) -> GuardOptions {
        GuardOptions {
            max_output_chars: max,
            force,
            items: 2,
            limit: Some(50),
            ..GuardOptions::default()
        }
    }

    #[test]
    fn test_under_cap_passes() {
        let guarded = guard_output(payload(), &options(10_000, false), MessageLengths::default());
        assert_eq!(guarded, Guarded::Pass(payload()));
    }

    #[test]
    fn test_uncapped_passes() {
        assert!(!guard_output(payload(), &options(0, false), MessageLengths::default()).is_blocked());
    }

    #[test]
    fn test_over_cap_blocks_with_details() {
        let lengths = MessageLengths { avg: 300, max: 500 };
        let value = guard_output(payload(), &options(100, false), lengths).into_value();
        assert_eq!(value["blocked"], true);
        assert_eq!(value["max_output_chars"], 100);
        assert!(value["estimated_output_chars"].as_u64().unwrap() > 100);
        assert_eq!(value["format"], "json");
        assert_eq!(value["items"], 2);
        assert_eq!(value["avg_message_chars"], 300);
        assert_eq!(value["max_message_chars"], 500);

        let suggestions: Vec<&str> = value["suggestions"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s.as_str().unwrap())
            .collect();
        for needle in ["limit", "fields", "template", "max_message_chars", "force"] {
            assert!(
                suggestions.iter().any(|s| s.contains(needle)),
                "no suggestion mentions {}",
                needle
            );
        }
    }

    #[test]
    fn test_force_returns_full_payload() {
        let guarded = guard_output(payload(), &options(100, true), MessageLengths::default());
        assert_eq!(guarded.into_value(), payload());
    }

    #[test]
    fn test_message_lengths() {
        use crate::event::{EmitContext, EventInput};
        let ctx = EmitContext::new("api");
        let events = vec![
            EventInput::message("abcd").normalize(&ctx),
            EventInput::message("ab").normalize(&ctx),
            EventInput::default().normalize(&ctx),
        ];
        assert_eq!(MessageLengths::of(&events), MessageLengths { avg: 3, max: 4 });
        assert_eq!(MessageLengths::of(&[]), MessageLengths::default());
    }
}
