use std::sync::OnceLock;

use mdpdf_config::LintRule;
use regex::Regex;

/// Lines of a single document, 1-based in every finding.
pub(crate) struct Document<'a> {
    lines: Vec<&'a str>,
}

impl<'a> Document<'a> {
    pub(crate) fn new(contents: &'a str) -> Self {
        Document {
            lines: contents.lines().collect(),
        }
    }

    /// Line preceding the 1-based `line`, if any.
    fn previous(&self, line: usize) -> Option<&'a str> {
        if line > 1 {
            self.lines.get(line - 2).copied()
        } else {
            None
        }
    }

    /// Line following the 1-based `line`, if any.
    fn next(&self, line: usize) -> Option<&'a str> {
        self.lines.get(line).copied()
    }

    fn numbered(&self) -> impl Iterator<Item = (usize, &'a str)> + '_ {
        self.lines.iter().enumerate().map(|(idx, line)| (idx + 1, *line))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct RuleFinding {
    pub line: usize,
    pub message: String,
}

pub(crate) type RuleExecutor = fn(&Document<'_>) -> Vec<RuleFinding>;

pub(crate) fn executor_for(rule: LintRule) -> RuleExecutor {
    match rule {
        LintRule::ListSpacing => check_list_spacing,
        LintRule::TableSpacing => check_table_spacing,
        LintRule::BoldHeading => check_bold_heading,
        LintRule::CodeUnicode => check_code_unicode,
    }
}

fn bullet_item() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*[-*+]\s").expect("valid bullet regex"))
}

fn numbered_item() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*\d+[.)]\s").expect("valid numbered regex"))
}

fn list_like() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*[-*+\d]").expect("valid list-like regex"))
}

fn table_row() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*\|").expect("valid table regex"))
}

fn bold_only() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\*\*[^*]+\*\*:?\s*$").expect("valid bold regex"))
}

fn content_start() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[-*+\d]").expect("valid content regex"))
}

fn excerpt(line: &str) -> String {
    line.chars().take(50).collect()
}

fn is_fence(line: &str) -> bool {
    line.trim().starts_with("```")
}

fn check_list_spacing(doc: &Document<'_>) -> Vec<RuleFinding> {
    let mut findings = Vec::new();
    for (number, line) in doc.numbered() {
        if !(bullet_item().is_match(line) || numbered_item().is_match(line)) {
            continue;
        }
        let Some(prev) = doc.previous(number) else {
            continue;
        };
        if prev.trim().is_empty() || list_like().is_match(prev) || prev.trim_end().ends_with('\\')
        {
            continue;
        }
        findings.push(RuleFinding {
            line: number,
            message: format!(
                "Missing blank line before list (line {number}). Add a blank line before: {}",
                excerpt(line)
            ),
        });
    }
    findings
}

fn check_table_spacing(doc: &Document<'_>) -> Vec<RuleFinding> {
    let mut findings = Vec::new();
    for (number, line) in doc.numbered() {
        if !table_row().is_match(line) {
            continue;
        }
        let Some(prev) = doc.previous(number) else {
            continue;
        };
        if prev.trim().is_empty()
            || table_row().is_match(prev)
            || prev.trim_end().ends_with('\\')
            || is_fence(prev)
        {
            continue;
        }
        findings.push(RuleFinding {
            line: number,
            message: format!(
                "Missing blank line before table (line {number}). Add a blank line before: {}",
                excerpt(line)
            ),
        });
    }
    findings
}

fn check_bold_heading(doc: &Document<'_>) -> Vec<RuleFinding> {
    let mut findings = Vec::new();
    for (number, line) in doc.numbered() {
        let stripped = line.trim();
        if !bold_only().is_match(stripped) {
            continue;
        }
        let Some(next) = doc.next(number).map(str::trim) else {
            continue;
        };
        if next.is_empty() {
            continue;
        }
        let starts_content = content_start().is_match(next)
            || (!next.starts_with("```") && !next.starts_with('|'));
        if starts_content {
            findings.push(RuleFinding {
                line: number,
                message: format!(
                    "Bold text used as header (line {number}). Convert to proper header \
                     (e.g. ###, depending on the level of the header): {stripped}"
                ),
            });
        }
    }
    findings
}

/// Classifies the first non-ASCII character class found on a line.
fn unicode_class(line: &str) -> Option<&'static str> {
    const CLASSES: &[(&[char], &str)] = &[
        (&['✅', '✓'], "checkmark"),
        (&['├', '│', '└'], "box-drawing"),
        (&['→', '←'], "arrow"),
    ];
    for (chars, label) in CLASSES {
        if line.contains(*chars) {
            return Some(*label);
        }
    }
    if line.is_ascii() {
        None
    } else {
        Some("Unicode character")
    }
}

fn check_code_unicode(doc: &Document<'_>) -> Vec<RuleFinding> {
    let mut findings = Vec::new();
    let mut in_code_block = false;
    for (number, line) in doc.numbered() {
        if is_fence(line) {
            in_code_block = !in_code_block;
            continue;
        }
        if !in_code_block {
            continue;
        }
        if let Some(class) = unicode_class(line) {
            findings.push(RuleFinding {
                line: number,
                message: format!(
                    "Unicode character in code block (line {number}): {class}. \
                     Use ASCII alternative. Found in: {}",
                    excerpt(line)
                ),
            });
        }
    }
    findings
}
