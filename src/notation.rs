//! Text notation for sites, agents, expressions, rules and system files.
//!
//! Grammar (whitespace is ignored everywhere):
//!
//! ```text
//! site       := name [ '~' state ] [ '!' ( digits | '-' | '_' | '?' ) ]
//! agent      := name [ '(' [ site { ',' site } ] ')' ]
//! expression := agent { ( ',' | '+' ) agent }      separators at depth 0
//! rule       := expression '->' expression '[' rate ']'
//! ```
//!
//! Rendering is done by the `Display` impls in [`crate::agent`] and
//! [`crate::rule`]; for text without `+`, `A()` or `_`, rendering the parsed
//! value reproduces the input byte for byte.
//!
//! A system file holds one directive per line: `%init: N expr` or `init N expr`
//! adds `N` copies of a mixture literal (`N` defaults to 1), other lines starting
//! with `%` are comments, and every remaining non-empty line is a rule.

use crate::agent::{Agent, AgentError, BindingState, BondLabel, Expression, Site};
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while reading notation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("empty {0}")]
    Empty(&'static str),
    #[error("invalid name `{0}`")]
    InvalidName(String),
    #[error("unbalanced parentheses in `{0}`")]
    Unbalanced(String),
    #[error("invalid internal state in site `{0}`")]
    InvalidState(String),
    #[error("invalid binding state in site `{0}`")]
    InvalidBinding(String),
    /// A bond label used by more than two sites of one expression.
    #[error("bond label {0} appears more than twice")]
    BondArity(BondLabel),
    #[error("rule `{0}` has no `->`")]
    MissingArrow(String),
    #[error("rule `{0}` has no rate `[k]`")]
    MissingRate(String),
    #[error("invalid rate `{0}`")]
    InvalidRate(String),
    #[error(transparent)]
    Agent(#[from] AgentError),
    /// Wraps an error with the 1-based line of a system file it came from.
    #[error("line {line}: {source}")]
    Line {
        line: usize,
        #[source]
        source: Box<ParseError>,
    },
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

fn valid_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(is_name_char)
}

fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Parses one site, e.g. `s~u!1`.
pub fn parse_site(text: &str) -> Result<Site, ParseError> {
    let text = strip_whitespace(text);
    if text.is_empty() {
        return Err(ParseError::Empty("site"));
    }
    let (head, binding) = match text.split_once('!') {
        Some((head, binding)) => (head, Some(binding)),
        None => (text.as_str(), None),
    };
    let (name, state) = match head.split_once('~') {
        Some((name, state)) => (name, Some(state)),
        None => (head, None),
    };
    if !valid_name(name) {
        return Err(ParseError::InvalidName(text.clone()));
    }

    let mut site = Site::new(name);
    if let Some(state) = state {
        if !valid_name(state) {
            return Err(ParseError::InvalidState(text.clone()));
        }
        site.internal_state = Some(state.to_owned());
    }
    site.binding = match binding {
        None => BindingState::Free,
        Some("-") | Some("_") => BindingState::Bound,
        Some("?") => BindingState::Any,
        Some(digits) if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) => {
            let label = digits
                .parse::<u32>()
                .map_err(|_| ParseError::InvalidBinding(text.clone()))?;
            BindingState::Bond(BondLabel(label))
        }
        Some(_) => return Err(ParseError::InvalidBinding(text.clone())),
    };
    Ok(site)
}

/// Parses one agent, e.g. `A(a!1,s~u)` or `B`.
pub fn parse_agent(text: &str) -> Result<Agent, ParseError> {
    let text = strip_whitespace(text);
    if text.is_empty() {
        return Err(ParseError::Empty("agent"));
    }
    let Some(open) = text.find('(') else {
        if text.contains(')') {
            return Err(ParseError::Unbalanced(text));
        }
        if !valid_name(&text) {
            return Err(ParseError::InvalidName(text));
        }
        return Ok(Agent::new(text, Vec::new())?);
    };
    let name = &text[..open];
    if !valid_name(name) {
        return Err(ParseError::InvalidName(text.clone()));
    }
    let inner = text[open + 1..]
        .strip_suffix(')')
        .filter(|inner| !inner.contains('(') && !inner.contains(')'))
        .ok_or_else(|| ParseError::Unbalanced(text.clone()))?;
    let sites = if inner.is_empty() {
        Vec::new()
    } else {
        inner.split(',').map(parse_site).collect::<Result<Vec<_>, _>>()?
    };
    Ok(Agent::new(name, sites)?)
}

/// Parses an expression, splitting agents at top-level `,` or `+`.
///
/// An empty (or all-whitespace) text is the empty expression.
pub fn parse_expression(text: &str) -> Result<Expression, ParseError> {
    let text = strip_whitespace(text);
    if text.is_empty() {
        return Ok(Expression::default());
    }
    let mut agents = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| ParseError::Unbalanced(text.clone()))?;
            }
            ',' | '+' if depth == 0 => {
                agents.push(parse_agent(&text[start..i])?);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(ParseError::Unbalanced(text));
    }
    agents.push(parse_agent(&text[start..])?);

    let expr = Expression::new(agents);
    if let Some((label, _)) = expr.label_sites().into_iter().find(|(_, ends)| ends.len() > 2) {
        return Err(ParseError::BondArity(label));
    }
    Ok(expr)
}

/// The parsed parts of a rule line, before compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleText {
    pub lhs: Expression,
    pub rhs: Expression,
    pub rate: f64,
    /// The rate exactly as written, for faithful rendering.
    pub rate_text: String,
}

/// Parses `lhs -> rhs [rate]`. Either side may be empty.
pub fn parse_rule(text: &str) -> Result<RuleText, ParseError> {
    let trimmed = text.trim();
    let (lhs, rest) = trimmed
        .split_once("->")
        .ok_or_else(|| ParseError::MissingArrow(trimmed.to_owned()))?;
    let (rhs, rate) = rest
        .trim_end()
        .strip_suffix(']')
        .and_then(|body| body.rsplit_once('['))
        .ok_or_else(|| ParseError::MissingRate(trimmed.to_owned()))?;
    let rate_text = rate.trim().to_owned();
    let rate = rate_text
        .parse::<f64>()
        .ok()
        .filter(|k| k.is_finite() && *k >= 0.0)
        .ok_or_else(|| ParseError::InvalidRate(rate_text.clone()))?;
    Ok(RuleText {
        lhs: parse_expression(lhs)?,
        rhs: parse_expression(rhs)?,
        rate,
        rate_text,
    })
}

/// `copies` instances of a mixture literal.
#[derive(Debug, Clone, PartialEq)]
pub struct InitDirective {
    pub copies: usize,
    pub expression: Expression,
}

/// A parsed system file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Description {
    pub inits: Vec<InitDirective>,
    pub rules: Vec<RuleText>,
}

fn init_body(line: &str) -> Option<&str> {
    ["%init", "init"].into_iter().find_map(|keyword| {
        let rest = line.strip_prefix(keyword)?;
        rest.strip_prefix(':')
            .or_else(|| rest.starts_with(char::is_whitespace).then_some(rest))
    })
}

fn parse_init(body: &str) -> Result<InitDirective, ParseError> {
    let body = body.trim();
    let (copies, expr) = match body.split_once(char::is_whitespace) {
        Some((count, rest)) => match count.parse::<usize>() {
            Ok(copies) => (copies, rest),
            Err(_) => (1, body),
        },
        None => (1, body),
    };
    let expression = parse_expression(expr)?;
    if expression.is_empty() {
        return Err(ParseError::Empty("init expression"));
    }
    Ok(InitDirective { copies, expression })
}

/// Reads a whole system file.
pub fn parse_description(text: &str) -> Result<Description, ParseError> {
    let mut description = Description::default();
    for (number, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let at_line = |source: ParseError| ParseError::Line {
            line: number + 1,
            source: Box::new(source),
        };
        if let Some(body) = init_body(line) {
            description.inits.push(parse_init(body).map_err(at_line)?);
        } else if line.starts_with('%') {
            continue;
        } else {
            description.rules.push(parse_rule(line).map_err(at_line)?);
        }
    }
    Ok(description)
}

impl FromStr for Site {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_site(s)
    }
}

impl FromStr for Agent {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_agent(s)
    }
}

impl FromStr for Expression {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_expression(s)
    }
}

impl FromStr for RuleText {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_rule(s)
    }
}
