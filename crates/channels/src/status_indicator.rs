//! Status indicator text for pending tool calls.
//!
//! A tool spec may carry a `statusIndicatorText` template such as
//! `"⚙️ ${args.command}"`. Placeholders are dotted paths evaluated against
//! `{args, ...context}`:
//!
//! ```text
//! ${args.command}        identifier segments joined by '.'
//! ${args.files[0]}       numeric index
//! ${args["file name"]}   quoted key
//! ```
//!
//! Rendering never fails. Unparseable arguments become `{}`, unresolved
//! paths render as the empty string, and an unterminated `${` is copied
//! through as written.

use serde_json::{Map, Value};

/// Input to [`resolve_status_indicator_text`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusIndicatorRequest {
    pub tool_name: String,

    /// Template from the tool spec, if any
    pub status_indicator_text: Option<String>,

    /// Call arguments: either the raw JSON text or an already-parsed value
    pub args_json: Option<Value>,

    /// Extra top-level names visible to the template
    pub template_context: Map<String, Value>,
}

impl StatusIndicatorRequest {
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            ..Self::default()
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.status_indicator_text = Some(template.into());
        self
    }

    /// Arguments as the raw JSON text the model produced.
    pub fn with_args_text(mut self, raw: impl Into<String>) -> Self {
        self.args_json = Some(Value::String(raw.into()));
        self
    }

    pub fn with_args(mut self, args: Value) -> Self {
        self.args_json = Some(args);
        self
    }

    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.template_context = context;
        self
    }
}

/// Render the status line shown while a tool runs.
pub fn resolve_status_indicator_text(request: &StatusIndicatorRequest) -> String {
    let Some(template) = &request.status_indicator_text else {
        return format!("🛠️ {}...", request.tool_name);
    };

    let mut scope = Map::new();
    scope.insert("args".into(), parse_args(request.args_json.as_ref()));
    for (key, value) in &request.template_context {
        scope.insert(key.clone(), value.clone());
    }
    render_template(template, &Value::Object(scope))
}

fn parse_args(args: Option<&Value>) -> Value {
    let parsed = match args {
        Some(Value::String(raw)) => serde_json::from_str(raw).unwrap_or(Value::Null),
        Some(other) => other.clone(),
        None => Value::Null,
    };
    match parsed {
        Value::Object(_) => parsed,
        _ => Value::Object(Map::new()),
    }
}

/// Substitute every `${path}` in `template`.
pub fn render_template(template: &str, scope: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let body = &rest[start + 2..];
        let Some(end) = closing_brace(body) else {
            out.push_str(&rest[start..]);
            return out;
        };
        out.push_str(&evaluate(&body[..end], scope));
        rest = &body[end + 1..];
    }
    out.push_str(rest);
    out
}

/// Byte offset of the `}` ending a placeholder, skipping quoted keys.
fn closing_brace(body: &str) -> Option<usize> {
    let mut quote = None;
    for (i, c) in body.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '}') => return Some(i),
            _ => {}
        }
    }
    None
}

fn evaluate(expression: &str, scope: &Value) -> String {
    let resolved = parse_path(expression.trim()).and_then(|path| {
        path.iter().try_fold(scope, |value, segment| match segment {
            Segment::Key(key) => value.get(*key),
            Segment::Index(index) => value.get(*index),
        })
    });
    match resolved {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

#[derive(Debug, PartialEq)]
enum Segment<'a> {
    Key(&'a str),
    Index(usize),
}

fn parse_path(expression: &str) -> Option<Vec<Segment<'_>>> {
    let (head, mut rest) = identifier(expression)?;
    let mut path = vec![Segment::Key(head)];

    while !rest.is_empty() {
        if let Some(tail) = rest.strip_prefix('.') {
            let (key, tail) = identifier(tail)?;
            path.push(Segment::Key(key));
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix('[') {
            let (segment, tail) = bracket(tail.trim_start())?;
            path.push(segment);
            rest = tail;
        } else {
            return None;
        }
    }
    Some(path)
}

fn identifier(input: &str) -> Option<(&str, &str)> {
    let end = input
        .char_indices()
        .find(|(_, c)| !(c.is_alphanumeric() || *c == '_' || *c == '$'))
        .map_or(input.len(), |(i, _)| i);
    let ident = &input[..end];
    if ident.is_empty() || ident.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    Some((ident, &input[end..]))
}

/// Parse the inside of `[...]`, starting just after the `[`.
fn bracket(input: &str) -> Option<(Segment<'_>, &str)> {
    let (segment, rest) = match input.chars().next()? {
        q @ ('"' | '\'') => {
            let inner = &input[1..];
            let close = inner.find(q)?;
            (Segment::Key(&inner[..close]), &inner[close + 1..])
        }
        _ => {
            let close = input.find(']')?;
            let index = input[..close].trim().parse().ok()?;
            (Segment::Index(index), &input[close..])
        }
    };
    let rest = rest.trim_start().strip_prefix(']')?;
    Some((segment, rest))
}
