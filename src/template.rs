//! Django-style template engine.
//!
//! Workflow:
//! 1. `Templates::render` loads the named template from the configured directory.
//! 2. `tokenize_template` splits content into Text, Variable and Tag tokens (comments dropped).
//! 3. `parse_tokens` builds an AST of `Node`.
//! 4. If the template `{% extends %}` another, its blocks are merged into the
//!    parent's AST, recursively up the chain.
//! 5. The merged AST is rendered: variables are HTML-escaped unless marked `safe`,
//!    `if` uses truthiness, `for` iterates lists, `include` renders another template
//!    with the current context.
//!
//! Internal debug output is gated by `set_display_logs`.

use crate::settings::TemplateSettings;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Global switch for enabling/disabling internal template logs
static DISPLAY_LOGS: Lazy<AtomicBool> = Lazy::new(|| AtomicBool::new(false));

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)(\{\{.*?\}\}|\{%.*?%\}|\{#.*?#\})").expect("valid token regex"));

/// Deepest `extends`/`include` chain followed before giving up.
const MAX_DEPTH: usize = 16;

/// Enable or disable internal debug logs for the template engine
pub fn set_display_logs(enabled: bool) {
    DISPLAY_LOGS.store(enabled, Ordering::Relaxed);
}

macro_rules! tdebug {
    ($($arg:tt)+) => {
        if DISPLAY_LOGS.load(Ordering::Relaxed) {
            debug!($($arg)+);
        }
    }
}

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("template '{0}' not found")]
    NotFound(String),

    #[error("invalid template name '{0}'")]
    InvalidName(String),

    #[error("template '{0}' nests extends/include too deeply")]
    Recursion(String),

    #[error("failed to read template '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Values a template context can hold
#[derive(Clone, Debug, PartialEq)]
pub enum TemplateValue {
    String(String),
    Bool(bool),
    Number(f64),
    List(Vec<TemplateValue>),
    Object(HashMap<String, TemplateValue>),
}

pub type Context = HashMap<String, TemplateValue>;

impl TemplateValue {
    /// Convert the value to a string for rendering
    pub fn as_string(&self) -> String {
        match self {
            TemplateValue::String(s) => s.clone(),
            TemplateValue::Bool(b) => b.to_string(),
            TemplateValue::Number(n) => n.to_string(),
            TemplateValue::List(_) | TemplateValue::Object(_) => String::new(),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            TemplateValue::String(s) => !s.is_empty(),
            TemplateValue::Bool(b) => *b,
            TemplateValue::Number(n) => *n != 0.0,
            TemplateValue::List(items) => !items.is_empty(),
            TemplateValue::Object(map) => !map.is_empty(),
        }
    }
}

impl fmt::Display for TemplateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

impl From<&str> for TemplateValue {
    fn from(s: &str) -> Self {
        TemplateValue::String(s.to_string())
    }
}

impl From<String> for TemplateValue {
    fn from(s: String) -> Self {
        TemplateValue::String(s)
    }
}

impl From<bool> for TemplateValue {
    fn from(b: bool) -> Self {
        TemplateValue::Bool(b)
    }
}

impl From<i64> for TemplateValue {
    fn from(n: i64) -> Self {
        TemplateValue::Number(n as f64)
    }
}

impl From<f64> for TemplateValue {
    fn from(n: f64) -> Self {
        TemplateValue::Number(n)
    }
}

impl<T: Into<TemplateValue>> From<Vec<T>> for TemplateValue {
    fn from(items: Vec<T>) -> Self {
        TemplateValue::List(items.into_iter().map(Into::into).collect())
    }
}

/// Token types extracted from the template
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Text(String),     // Plain text
    Variable(String), // {{ variable }}
    Tag(String),      // {% tag %}
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Upper,
    Lower,
    Length,
    Safe,
    Default(String),
}

/// AST node types for the template engine
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Variable {
        name: String,
        filters: Vec<Filter>,
    },
    If {
        condition: String,
        negated: bool,
        then_body: Vec<Node>,
        else_body: Vec<Node>,
    },
    For {
        var_name: String,
        list_name: String,
        body: Vec<Node>,
    },
    Block {
        name: String,
        body: Vec<Node>,
    },
    Extends(String),
    Include(String),
}

/// Tokenizes the template content into a Vec<Token>. `{# ... #}` comments are dropped.
pub fn tokenize_template(content: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut last_end = 0;
    for mat in TOKEN_RE.find_iter(content) {
        if mat.start() > last_end {
            tokens.push(Token::Text(content[last_end..mat.start()].to_string()));
        }
        let m = mat.as_str();
        if let Some(inner) = m.strip_prefix("{{").and_then(|s| s.strip_suffix("}}")) {
            tdebug!("tokenize: variable '{}'", inner.trim());
            tokens.push(Token::Variable(inner.trim().to_string()));
        } else if let Some(inner) = m.strip_prefix("{%").and_then(|s| s.strip_suffix("%}")) {
            tdebug!("tokenize: tag '{}'", inner.trim());
            tokens.push(Token::Tag(inner.trim().to_string()));
        }
        last_end = mat.end();
    }
    if last_end < content.len() {
        tokens.push(Token::Text(content[last_end..].to_string()));
    }
    tokens
}

/// Parses a sequence of Token into an AST of Node
pub fn parse_tokens(tokens: &[Token]) -> Vec<Node> {
    let mut idx = 0;
    parse_nodes(tokens, &mut idx, &[])
}

fn parse_variable(expr: &str) -> Node {
    let mut parts = expr.split('|').map(str::trim);
    let name = parts.next().unwrap_or_default().to_string();
    let filters = parts
        .filter_map(|f| {
            let (fname, arg) = match f.split_once(':') {
                Some((n, a)) => (n.trim(), Some(unquote(a.trim()))),
                None => (f, None),
            };
            match (fname, arg) {
                ("upper", _) => Some(Filter::Upper),
                ("lower", _) => Some(Filter::Lower),
                ("length", _) => Some(Filter::Length),
                ("safe", _) => Some(Filter::Safe),
                ("default", Some(a)) => Some(Filter::Default(a)),
                _ => {
                    tdebug!("ignoring unknown filter '{}'", f);
                    None
                }
            }
        })
        .collect();
    Node::Variable { name, filters }
}

fn unquote(s: &str) -> String {
    s.trim_matches(|c| c == '"' || c == '\'').to_string()
}

fn is_end_tag(tag: &str, end_tags: &[&str]) -> bool {
    // `{% endblock content %}` closes the same way as `{% endblock %}`.
    let head = tag.split_whitespace().next().unwrap_or_default();
    end_tags.contains(&head)
}

/// Recursive parser: consumes tokens until one of `end_tags` is found
fn parse_nodes(tokens: &[Token], idx: &mut usize, end_tags: &[&str]) -> Vec<Node> {
    let mut nodes = Vec::new();
    while *idx < tokens.len() {
        match &tokens[*idx] {
            Token::Text(t) => {
                nodes.push(Node::Text(t.clone()));
                *idx += 1;
            }
            Token::Variable(v) => {
                nodes.push(parse_variable(v));
                *idx += 1;
            }
            Token::Tag(tag) => {
                let t = tag.trim();
                if is_end_tag(t, end_tags) {
                    break;
                }
                *idx += 1;
                if let Some(rest) = t.strip_prefix("extends ") {
                    nodes.push(Node::Extends(unquote(rest.trim())));
                } else if let Some(rest) = t.strip_prefix("include ") {
                    nodes.push(Node::Include(unquote(rest.trim())));
                } else if let Some(name) = t.strip_prefix("block ") {
                    let body = parse_nodes(tokens, idx, &["endblock"]);
                    *idx += 1; // endblock
                    nodes.push(Node::Block {
                        name: name.trim().to_string(),
                        body,
                    });
                } else if let Some(cond) = t.strip_prefix("if ") {
                    let then_body = parse_nodes(tokens, idx, &["else", "endif"]);
                    let mut else_body = Vec::new();
                    if let Some(Token::Tag(tt)) = tokens.get(*idx) {
                        if tt.trim() == "else" {
                            *idx += 1;
                            else_body = parse_nodes(tokens, idx, &["endif"]);
                        }
                    }
                    *idx += 1; // endif
                    let cond = cond.trim();
                    let (negated, condition) = match cond.strip_prefix("not ") {
                        Some(rest) => (true, rest.trim()),
                        None => (false, cond),
                    };
                    nodes.push(Node::If {
                        condition: condition.to_string(),
                        negated,
                        then_body,
                        else_body,
                    });
                } else if let Some(rest) = t.strip_prefix("for ") {
                    let parts: Vec<&str> = rest.split_whitespace().collect();
                    if parts.len() == 3 && parts[1] == "in" {
                        let body = parse_nodes(tokens, idx, &["endfor"]);
                        *idx += 1; // endfor
                        nodes.push(Node::For {
                            var_name: parts[0].to_string(),
                            list_name: parts[2].to_string(),
                            body,
                        });
                    }
                } else {
                    tdebug!("skipping unknown tag '{}'", t);
                }
            }
        }
    }
    nodes
}

/// Resolves a dotted path `a.b.c` within the context. Numeric segments index lists.
fn resolve_variable<'a>(name: &str, context: &'a Context) -> Option<&'a TemplateValue> {
    let mut segments = name.split('.');
    let mut current = context.get(segments.next()?)?;
    for key in segments {
        current = match current {
            TemplateValue::Object(map) => map.get(key)?,
            TemplateValue::List(items) => items.get(key.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Every block defined anywhere in `nodes`, by name.
fn collect_blocks(nodes: &[Node], out: &mut HashMap<String, Vec<Node>>) {
    for node in nodes {
        match node {
            Node::Block { name, body } => {
                out.insert(name.clone(), body.clone());
                collect_blocks(body, out);
            }
            Node::If {
                then_body,
                else_body,
                ..
            } => {
                collect_blocks(then_body, out);
                collect_blocks(else_body, out);
            }
            Node::For { body, .. } => collect_blocks(body, out),
            _ => {}
        }
    }
}

/// Replaces parent blocks with the child's definitions of the same name
fn merge_blocks(nodes: &[Node], child_blocks: &HashMap<String, Vec<Node>>) -> Vec<Node> {
    nodes
        .iter()
        .map(|node| match node {
            Node::Block { name, body } => Node::Block {
                name: name.clone(),
                body: match child_blocks.get(name) {
                    Some(child) => child.clone(),
                    None => merge_blocks(body, child_blocks),
                },
            },
            Node::If {
                condition,
                negated,
                then_body,
                else_body,
            } => Node::If {
                condition: condition.clone(),
                negated: *negated,
                then_body: merge_blocks(then_body, child_blocks),
                else_body: merge_blocks(else_body, child_blocks),
            },
            Node::For {
                var_name,
                list_name,
                body,
            } => Node::For {
                var_name: var_name.clone(),
                list_name: list_name.clone(),
                body: merge_blocks(body, child_blocks),
            },
            other => other.clone(),
        })
        .collect()
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn render_variable(name: &str, filters: &[Filter], context: &Context) -> String {
    let mut value = resolve_variable(name, context).cloned();
    let mut safe = false;
    for filter in filters {
        value = match filter {
            Filter::Upper => value.map(|v| TemplateValue::String(v.as_string().to_uppercase())),
            Filter::Lower => value.map(|v| TemplateValue::String(v.as_string().to_lowercase())),
            Filter::Length => {
                let len = match &value {
                    Some(TemplateValue::List(items)) => items.len(),
                    Some(TemplateValue::Object(map)) => map.len(),
                    Some(TemplateValue::String(s)) => s.chars().count(),
                    _ => 0,
                };
                Some(TemplateValue::Number(len as f64))
            }
            Filter::Default(fallback) => match value {
                Some(v) if v.is_truthy() => Some(v),
                _ => Some(TemplateValue::String(fallback.clone())),
            },
            Filter::Safe => {
                safe = true;
                value
            }
        };
    }
    let text = value.map(|v| v.as_string()).unwrap_or_default();
    if safe { text } else { escape_html(&text) }
}

/// Loads templates from one directory and renders them.
#[derive(Clone, Debug)]
pub struct Templates {
    dir: PathBuf,
}

impl Templates {
    pub fn new(settings: &TemplateSettings) -> Self {
        set_display_logs(settings.debug);
        Templates::from_dir(&settings.dir)
    }

    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Templates { dir: dir.into() }
    }

    /// Render a template file by name, e.g. `pages/about.html`.
    pub fn render(&self, name: &str, context: &Context) -> Result<String, TemplateError> {
        let nodes = self.compile(name, 0)?;
        self.render_nodes(&nodes, context, 0)
    }

    /// Render template source directly. `extends` and `include` still resolve
    /// against the template directory.
    pub fn render_str(&self, source: &str, context: &Context) -> Result<String, TemplateError> {
        let nodes = parse_tokens(&tokenize_template(source));
        let nodes = self.resolve_extends(nodes, "<string>", 0)?;
        self.render_nodes(&nodes, context, 0)
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, TemplateError> {
        let relative = Path::new(name);
        let escapes = name.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(TemplateError::InvalidName(name.to_string()));
        }
        Ok(self.dir.join(relative))
    }

    fn load(&self, name: &str) -> Result<Vec<Node>, TemplateError> {
        let path = self.path_for(name)?;
        let source = std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => TemplateError::NotFound(name.to_string()),
            _ => TemplateError::Io {
                name: name.to_string(),
                source: e,
            },
        })?;
        let nodes = parse_tokens(&tokenize_template(&source));
        tdebug!("AST for {}: {:?}", name, nodes);
        Ok(nodes)
    }

    fn compile(&self, name: &str, depth: usize) -> Result<Vec<Node>, TemplateError> {
        if depth > MAX_DEPTH {
            return Err(TemplateError::Recursion(name.to_string()));
        }
        let nodes = self.load(name)?;
        self.resolve_extends(nodes, name, depth)
    }

    fn resolve_extends(
        &self,
        nodes: Vec<Node>,
        name: &str,
        depth: usize,
    ) -> Result<Vec<Node>, TemplateError> {
        let parent = nodes.iter().find_map(|n| match n {
            Node::Extends(p) => Some(p.clone()),
            _ => None,
        });
        let Some(parent) = parent else {
            return Ok(nodes);
        };
        tdebug!("{} extends {}", name, parent);
        let mut blocks = HashMap::new();
        collect_blocks(&nodes, &mut blocks);
        let base = self.compile(&parent, depth + 1)?;
        Ok(merge_blocks(&base, &blocks))
    }

    fn render_nodes(
        &self,
        nodes: &[Node],
        context: &Context,
        depth: usize,
    ) -> Result<String, TemplateError> {
        let mut out = String::new();
        for node in nodes {
            match node {
                Node::Text(t) => out.push_str(t),
                Node::Variable { name, filters } => {
                    out.push_str(&render_variable(name, filters, context));
                }
                Node::If {
                    condition,
                    negated,
                    then_body,
                    else_body,
                } => {
                    let truthy = resolve_variable(condition, context)
                        .map(TemplateValue::is_truthy)
                        .unwrap_or(false);
                    let body = if truthy != *negated {
                        then_body
                    } else {
                        else_body
                    };
                    out.push_str(&self.render_nodes(body, context, depth)?);
                }
                Node::For {
                    var_name,
                    list_name,
                    body,
                } => {
                    if let Some(TemplateValue::List(items)) = resolve_variable(list_name, context)
                    {
                        let total = items.len();
                        let mut local = context.clone();
                        for (i, item) in items.iter().enumerate() {
                            local.insert(var_name.clone(), item.clone());
                            local.insert("forloop".to_string(), forloop(i, total));
                            out.push_str(&self.render_nodes(body, &local, depth)?);
                        }
                    }
                }
                Node::Block { body, .. } => {
                    out.push_str(&self.render_nodes(body, context, depth)?);
                }
                Node::Extends(_) => {}
                Node::Include(name) => {
                    if depth >= MAX_DEPTH {
                        return Err(TemplateError::Recursion(name.clone()));
                    }
                    let included = self.compile(name, depth + 1)?;
                    out.push_str(&self.render_nodes(&included, context, depth + 1)?);
                }
            }
        }
        Ok(out)
    }
}

fn forloop(index: usize, total: usize) -> TemplateValue {
    let mut map = HashMap::new();
    map.insert("counter".to_string(), TemplateValue::Number((index + 1) as f64));
    map.insert("first".to_string(), TemplateValue::Bool(index == 0));
    map.insert("last".to_string(), TemplateValue::Bool(index + 1 == total));
    TemplateValue::Object(map)
}
