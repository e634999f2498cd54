//! Structured model of a route-module artifact.
//!
//! Instead of regex surgery over the raw file, a parsed artifact is an
//! ordered list of route declarations (method, path, middleware set, handler)
//! interleaved with verbatim lines. Mutations go through `has_route` /
//! `add_middleware`-style operations, so re-applying any transform to
//! already-patched content is a structural no-op by construction. Lines the
//! parser does not understand are preserved byte-for-byte, and an unmodified
//! route renders back as its original text.

pub const VALIDATION_MARKER: &str = "validationResult(req)";
pub const VALIDATION_IMPORT: &str =
    "const { validationResult } = require('express-validator');";

const ROUTE_METHODS: [&str; 5] = ["get", "post", "put", "patch", "delete"];

#[derive(Debug, Clone, PartialEq)]
pub struct RouteDecl {
    pub method: String,
    pub path: String,
    middleware: Vec<String>,
    handler: String,
    /// Original line, kept while the declaration is untouched so rendering
    /// round-trips exactly.
    raw: Option<String>,
}

impl RouteDecl {
    fn new_stub(method: &str, path: &str) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
            middleware: Vec::new(),
            handler: stub_handler(),
            raw: None,
        }
    }

    pub fn middleware(&self) -> &[String] {
        &self.middleware
    }

    pub fn has_middleware(&self, token: &str) -> bool {
        self.middleware.iter().any(|m| m == token)
    }

    pub fn has_middleware_prefix(&self, prefix: &str) -> bool {
        self.middleware.iter().any(|m| m.starts_with(prefix))
    }

    /// Append a middleware token unless it is already present.
    pub fn add_middleware(&mut self, token: &str) -> bool {
        if self.has_middleware(token) {
            return false;
        }
        self.middleware.push(token.to_string());
        self.raw = None;
        true
    }

    pub fn is_validated(&self) -> bool {
        self.handler.contains(VALIDATION_MARKER)
    }

    pub fn is_error_wrapped(&self) -> bool {
        self.handler.contains("try {")
    }

    /// Prepend a placeholder validation block to the handler body.
    pub fn insert_validation(&mut self) -> bool {
        if self.is_validated() {
            return false;
        }
        let Some((head, body)) = split_handler_body(&self.handler) else {
            return false;
        };
        self.handler = format!(
            "{head}{{ const errors = validationResult(req); \
             if (!errors.isEmpty()) {{ return res.status(400).json({{ success: false, errors: errors.array() }}); }} \
             {body} }}"
        );
        self.raw = None;
        true
    }

    /// Wrap the handler body in try/catch with a JSON error envelope.
    pub fn wrap_error_handling(&mut self) -> bool {
        if self.is_error_wrapped() {
            return false;
        }
        let Some((head, body)) = split_handler_body(&self.handler) else {
            return false;
        };
        self.handler = format!(
            "{head}{{ try {{ {body} }} catch (err) {{ res.status(500).json({{ success: false, error: err.message }}); }} }}"
        );
        self.raw = None;
        true
    }

    fn render(&self) -> String {
        if let Some(raw) = &self.raw {
            return raw.clone();
        }
        let mut args = vec![format!("'{}'", self.path)];
        args.extend(self.middleware.iter().cloned());
        args.push(self.handler.clone());
        format!("router.{}({});", self.method, args.join(", "))
    }
}

fn stub_handler() -> String {
    "async (req, res) => { try { res.status(200).json({ success: true, data: null }); } \
     catch (err) { res.status(500).json({ success: false, error: err.message }); } }"
        .to_string()
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Raw(String),
    Route(RouteDecl),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteDocument {
    segments: Vec<Segment>,
}

impl RouteDocument {
    pub fn parse(text: &str) -> Self {
        let segments = text
            .lines()
            .map(|line| match parse_route_line(line) {
                Some(route) => Segment::Route(route),
                None => Segment::Raw(line.to_string()),
            })
            .collect();
        Self { segments }
    }

    /// Scaffold for a synthesized route module.
    pub fn new_module() -> Self {
        Self {
            segments: vec![
                Segment::Raw("const express = require('express');".to_string()),
                Segment::Raw("const router = express.Router();".to_string()),
                Segment::Raw(String::new()),
                Segment::Raw("module.exports = router;".to_string()),
            ],
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Raw(line) => out.push_str(line),
                Segment::Route(route) => out.push_str(&route.render()),
            }
            out.push('\n');
        }
        out
    }

    pub fn routes(&self) -> impl Iterator<Item = &RouteDecl> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Route(r) => Some(r),
            Segment::Raw(_) => None,
        })
    }

    /// A route for this path exists, either as a parsed declaration or as a
    /// verbatim quoted path string in a line the parser did not understand
    /// (multi-line handlers written by humans).
    pub fn has_route(&self, path: &str) -> bool {
        if self.routes().any(|r| r.path == path) {
            return true;
        }
        let single = format!("'{path}'");
        let double = format!("\"{path}\"");
        self.segments.iter().any(|s| match s {
            Segment::Raw(line) => line.contains(&single) || line.contains(&double),
            Segment::Route(_) => false,
        })
    }

    pub fn route(&self, path: &str) -> Option<&RouteDecl> {
        self.routes().find(|r| r.path == path)
    }

    pub fn route_mut(&mut self, path: &str) -> Option<&mut RouteDecl> {
        self.segments.iter_mut().find_map(|s| match s {
            Segment::Route(r) if r.path == path => Some(r),
            _ => None,
        })
    }

    /// Insert a stub route (already wrapped in try/catch) unless the path is
    /// present. Placed before `module.exports` when there is one.
    pub fn add_route(&mut self, method: &str, path: &str) -> bool {
        if self.has_route(path) {
            return false;
        }
        let decl = Segment::Route(RouteDecl::new_stub(method, path));
        let position = self.segments.iter().position(
            |s| matches!(s, Segment::Raw(line) if line.contains("module.exports")),
        );
        match position {
            Some(idx) => self.segments.insert(idx, decl),
            None => self.segments.push(decl),
        }
        true
    }

    /// Ensure an import-style line exists once, placed after the last
    /// existing `const` line (or at the top).
    pub fn ensure_header_line(&mut self, line: &str) -> bool {
        if self.contains_line(line) {
            return false;
        }
        let after_last_const = self
            .segments
            .iter()
            .rposition(|s| matches!(s, Segment::Raw(l) if l.trim_start().starts_with("const ")))
            .map(|idx| idx + 1)
            .unwrap_or(0);
        self.segments
            .insert(after_last_const, Segment::Raw(line.to_string()));
        true
    }

    /// Ensure a registration line (`app.use(...)`) exists once, before
    /// `app.listen` / `module.exports` when present.
    pub fn ensure_registration_line(&mut self, line: &str) -> bool {
        if self.contains_line(line) {
            return false;
        }
        let position = self.segments.iter().position(|s| {
            matches!(s, Segment::Raw(l) if l.contains("app.listen") || l.contains("module.exports"))
        });
        let segment = Segment::Raw(line.to_string());
        match position {
            Some(idx) => self.segments.insert(idx, segment),
            None => self.segments.push(segment),
        }
        true
    }

    pub fn contains_line(&self, line: &str) -> bool {
        self.segments.iter().any(|s| match s {
            Segment::Raw(l) => l.trim() == line.trim(),
            Segment::Route(r) => r.render().trim() == line.trim(),
        })
    }

    pub fn has_wildcard_cors(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Raw(line) if is_wildcard_cors_line(line)))
    }

    /// Replace a wildcard-origin CORS line with the given replacement. No-op
    /// when no wildcard remains.
    pub fn restrict_cors(&mut self, replacement: &str) -> bool {
        let mut changed = false;
        for segment in &mut self.segments {
            if let Segment::Raw(line) = segment {
                if is_wildcard_cors_line(line) {
                    *line = replacement.to_string();
                    changed = true;
                }
            }
        }
        changed
    }

    pub fn contains_text(&self, needle: &str) -> bool {
        self.render().contains(needle)
    }
}

fn is_wildcard_cors_line(line: &str) -> bool {
    let has_cors = line.contains("cors(");
    has_cors
        && (line.contains("cors()")
            || ((line.contains("'*'") || line.contains("\"*\"")) && line.contains("origin")))
}

fn parse_route_line(line: &str) -> Option<RouteDecl> {
    let trimmed = line.trim();
    let rest = trimmed.strip_prefix("router.")?;
    let paren = rest.find('(')?;
    let method = &rest[..paren];
    if !ROUTE_METHODS.contains(&method) {
        return None;
    }

    let close = find_balanced(rest, paren)?;
    let tail = rest[close + 1..].trim();
    if !tail.is_empty() && tail != ";" {
        return None;
    }

    let args = split_top_level(&rest[paren + 1..close]);
    if args.len() < 2 {
        return None;
    }
    let path = unquote(&args[0])?;
    let handler = args[args.len() - 1].clone();
    let middleware = args[1..args.len() - 1].to_vec();

    Some(RouteDecl {
        method: method.to_string(),
        path,
        middleware,
        handler,
        raw: Some(line.to_string()),
    })
}

/// Index of the bracket matching `s[open]`, skipping string literals.
fn find_balanced(s: &str, open: usize) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut depth = 0i32;
    let mut in_string: Option<u8> = None;
    let mut escaped = false;

    for (idx, &b) in bytes.iter().enumerate().skip(open) {
        if let Some(quote) = in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == quote {
                in_string = None;
            }
            continue;
        }
        match b {
            b'\'' | b'"' | b'`' => in_string = Some(b),
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split on commas at bracket depth zero, outside string literals.
fn split_top_level(s: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_string: Option<char> = None;
    let mut escaped = false;
    let mut current = String::new();

    for c in s.chars() {
        if let Some(quote) = in_string {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                in_string = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => {
                in_string = Some(c);
                current.push(c);
            }
            '(' | '[' | '{' => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' | '}' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

fn unquote(s: &str) -> Option<String> {
    let first = s.chars().next()?;
    if (first == '\'' || first == '"') && s.len() >= 2 && s.ends_with(first) {
        Some(s[1..s.len() - 1].to_string())
    } else {
        None
    }
}

/// Split a handler expression into its head (up to the body's opening brace)
/// and the body text between the outermost braces.
fn split_handler_body(handler: &str) -> Option<(String, String)> {
    let open = handler.find('{')?;
    let close = handler.rfind('}')?;
    if close <= open {
        return None;
    }
    Some((
        handler[..open].to_string(),
        handler[open + 1..close].trim().to_string(),
    ))
}
