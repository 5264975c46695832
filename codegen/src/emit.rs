//! Structured C output.
//!
//! Emitters produce a flat list of [`Emit`] items instead of writing text directly, so
//! indentation is decided in one place and gaps in a profile stay visible as
//! [`Emit::Unsupported`] nodes until serialization.

use itertools::Itertools;
use tracing::warn;

/// One line (or block boundary) of generated C.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emit {
    /// A statement; the trailing `;` is added on serialization.
    Stmt(String),
    /// A line emitted verbatim (preprocessor directives, prototypes).
    Raw(String),
    /// `header {`, increasing the indent. An empty header opens a bare block.
    Open(String),
    /// `}`, decreasing the indent.
    Close,
    /// `} name;`, closing a typedef.
    CloseAs(String),
    Blank,
    Comment(String),
    /// Serializes as `#error` so the native compile fails at the exact spot.
    Unsupported(String),
}

impl Emit {
    pub fn stmt(s: impl Into<String>) -> Self {
        Self::Stmt(s.into())
    }

    pub fn open(s: impl Into<String>) -> Self {
        Self::Open(s.into())
    }

    pub fn unsupported(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        warn!(%reason, "emitting unsupported marker");
        Self::Unsupported(reason)
    }
}

/// Lowering result that could not be expressed with the current profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unsupported(pub String);

impl From<Unsupported> for Emit {
    fn from(Unsupported(reason): Unsupported) -> Self {
        Emit::unsupported(reason)
    }
}

/// Render items to C text, two spaces per nesting level.
pub fn serialize(items: &[Emit]) -> String {
    let mut depth = 0usize;
    let mut lines: Vec<String> = Vec::with_capacity(items.len());

    for item in items {
        if matches!(item, Emit::Close | Emit::CloseAs(_)) {
            depth = depth.saturating_sub(1);
        }
        let indent = "  ".repeat(depth);
        lines.push(match item {
            Emit::Stmt(s) => format!("{indent}{s};"),
            Emit::Raw(s) => s.clone(),
            Emit::Open(s) if s.is_empty() => format!("{indent}{{"),
            Emit::Open(s) => format!("{indent}{s} {{"),
            Emit::Close => format!("{indent}}}"),
            Emit::CloseAs(name) => format!("{indent}}} {name};"),
            Emit::Blank => String::new(),
            Emit::Comment(s) => format!("{indent}// {s}"),
            Emit::Unsupported(reason) => format!("#error \"simdgen: unsupported: {}\"", reason.replace('"', "'")),
        });
        if matches!(item, Emit::Open(_)) {
            depth += 1;
        }
    }

    let mut code = lines.join("\n");
    code.push('\n');
    code
}

/// Parenthesize `text` unless it is a single operand: a name, literal, call, element
/// access or already-parenthesized group.
pub fn group(text: &str) -> String {
    let mut depth = 0usize;
    let mut chars = text.chars().peekable();
    let mut atomic = !text.is_empty();
    while let Some(c) = chars.next() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            '-' if depth == 0 && chars.peek() == Some(&'>') => {
                chars.next();
            }
            c if depth == 0 && !(c.is_ascii_alphanumeric() || c == '_' || c == '.') => atomic = false,
            _ => {}
        }
    }
    if atomic { text.to_string() } else { format!("({text})") }
}

/// C identifiers in `text`, in order of appearance.
pub fn identifiers(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|word| word.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_'))
}

/// Intrinsic entries containing a parenthesis are templates, everything else a function name.
pub fn is_template(entry: &str) -> bool {
    entry.contains('(')
}

/// Render an intrinsic entry applied to `args`.
///
/// Templates have `{i}` replaced by the i-th argument; plain names become `name(args...)`.
pub fn call(entry: &str, args: &[String]) -> String {
    if is_template(entry) { substitute(entry, args) } else { format!("{entry}({})", args.iter().join(", ")) }
}

// Single pass, so argument text is never re-scanned for placeholders.
fn substitute(template: &str, args: &[String]) -> String {
    let mut out = String::with_capacity(template.len() + args.iter().map(String::len).sum::<usize>());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 1..];
        let slot = tail.find('}').and_then(|end| tail[..end].parse::<usize>().ok().map(|i| (i, end)));
        match slot.and_then(|(i, end)| args.get(i).map(|arg| (arg, end))) {
            Some((arg, end)) => {
                out.push_str(arg);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('{');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}
