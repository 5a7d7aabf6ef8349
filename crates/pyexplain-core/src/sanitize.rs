//! Traceback text normalization.
//!
//! [`sanitize`] turns whatever the user pasted (terminal colours, Windows line
//! endings, shell output before the crash) into the canonical traceback the
//! extractor expects. It never fails.

use std::sync::LazyLock;

use regex::Regex;

/// Localized builds translate `Traceback` but keep this suffix.
const HEADER_SUFFIX: &str = "(most recent call last):";

const PROMPTS: [&str; 3] = [">>> ", "... ", "$ "];

static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])").expect("static ANSI pattern")
});

pub(crate) static FRAME_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*File "(?P<path>[^"]+)", line (?P<line>\d+)(?:, in (?P<func>.+))?$"#)
        .expect("static frame pattern")
});

/// Clean raw traceback text.
///
/// Output starts at the traceback header (or, for compile-time reports, at
/// the first frame line), has no blank lines, no trailing whitespace and no
/// trailing newline. Without any header the whole input is kept and
/// interactive prompt markers are removed.
pub fn sanitize(raw: &str) -> String {
    if raw.trim().is_empty() {
        return String::new();
    }
    let text = ANSI_ESCAPE.replace_all(raw, "");
    let text = text.replace("\r\n", "\n").replace('\r', "\n");

    let lines: Vec<&str> = text
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty() && !is_bare_prompt(line))
        .collect();

    let start = lines
        .iter()
        .position(|line| line.trim_start().ends_with(HEADER_SUFFIX))
        .or_else(|| lines.iter().position(|line| FRAME_LINE.is_match(line)));

    let kept: Vec<&str> = match start {
        Some(index) => lines[index..].to_vec(),
        None => {
            tracing::debug!(stage = "sanitize", "no traceback header, keeping whole input");
            lines
                .into_iter()
                .map(strip_prompt)
                .filter(|line| !line.trim().is_empty())
                .collect()
        }
    };
    kept.join("\n")
}

fn is_bare_prompt(line: &str) -> bool {
    matches!(line.trim(), ">>>" | "..." | "$")
}

fn strip_prompt(line: &str) -> &str {
    PROMPTS
        .iter()
        .find_map(|prompt| line.strip_prefix(prompt))
        .unwrap_or(line)
}
