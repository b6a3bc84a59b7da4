//! XPath 1.0 subset evaluated directly on a `scraper` DOM.
//!
//! Extraction rules are written against the XPath that browsers' "copy
//! XPath" produces and that scraping configs have used for years, so the
//! subset covers what those rules need:
//!
//! - absolute and relative location paths, `/`, `//`, `.`, `..`, `|` unions
//! - node tests: names, `*`, `text()`, `node()`, `@name`, `@*`
//! - axes: `child`, `descendant`, `descendant-or-self`, `parent`, `self`,
//!   `attribute`, `ancestor`, `following-sibling`, `preceding-sibling`
//! - predicates: positions, `last()`, `position()`, `=`, `!=`, `<`, `<=`,
//!   `>`, `>=`, `and`, `or`, `not()`, `contains()`, `starts-with()`,
//!   `ends-with()`, `normalize-space()`, `string-length()`, `string()`,
//!   `substring()`, `substring-before()`, `substring-after()`, `count()`,
//!   `true()`, `false()`
//!
//! Every node-set, including a union, comes back in document order.
//!
//! Arithmetic, variables and namespaces are not supported and fail to parse.

use crate::error::SelectorError;
use crate::parsing::document::Selection;
use scraper::{ElementRef, Html, Node};
use std::collections::{HashMap, HashSet};
use std::ops::Deref;

type DomNode<'a> = <ElementRef<'a> as Deref>::Target;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Slash,
    DoubleSlash,
    LBracket,
    RBracket,
    LParen,
    RParen,
    At,
    Comma,
    Pipe,
    Dot,
    DotDot,
    Star,
    ColonColon,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    Name(String),
    Literal(String),
    Number(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Parent,
    SelfNode,
    Attribute,
    Ancestor,
    FollowingSibling,
    PrecedingSibling,
}

#[derive(Debug, Clone, PartialEq)]
enum NodeTest {
    Name(String),
    Any,
    Text,
    Node,
}

#[derive(Debug, Clone, PartialEq)]
struct Step {
    /// Set for steps introduced by `//`.
    descendant: bool,
    axis: Axis,
    test: NodeTest,
    predicates: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
struct LocationPath {
    absolute: bool,
    steps: Vec<Step>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Function {
    Position,
    Last,
    Not,
    Contains,
    StartsWith,
    EndsWith,
    NormalizeSpace,
    StringLength,
    String,
    Substring,
    SubstringBefore,
    SubstringAfter,
    Count,
    True,
    False,
}

impl Function {
    fn lookup(name: &str) -> Option<(Function, std::ops::RangeInclusive<usize>)> {
        let found = match name {
            "position" => (Function::Position, 0..=0),
            "last" => (Function::Last, 0..=0),
            "not" => (Function::Not, 1..=1),
            "contains" => (Function::Contains, 2..=2),
            "starts-with" => (Function::StartsWith, 2..=2),
            "ends-with" => (Function::EndsWith, 2..=2),
            "normalize-space" => (Function::NormalizeSpace, 0..=1),
            "string-length" => (Function::StringLength, 0..=1),
            "string" => (Function::String, 0..=1),
            "substring" => (Function::Substring, 2..=3),
            "substring-before" => (Function::SubstringBefore, 2..=2),
            "substring-after" => (Function::SubstringAfter, 2..=2),
            "count" => (Function::Count, 1..=1),
            "true" => (Function::True, 0..=0),
            "false" => (Function::False, 0..=0),
            _ => return None,
        };
        Some(found)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(f64),
    Literal(String),
    Path(LocationPath),
    Call(Function, Vec<Expr>),
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
}

/// A compiled XPath expression.
#[derive(Debug, Clone, PartialEq)]
pub struct XPath {
    expression: String,
    union: Vec<LocationPath>,
}

impl XPath {
    pub fn parse(expression: &str) -> Result<Self, SelectorError> {
        let tokens = tokenize(expression)?;
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            expression,
        };
        let mut union = vec![parser.location_path()?];
        while parser.eat(&Token::Pipe) {
            union.push(parser.location_path()?);
        }
        if let Some((token, offset)) = parser.tokens.get(parser.pos) {
            return Err(parser.error_at(*offset, format!("unexpected {token:?}")));
        }
        Ok(Self {
            expression: expression.to_string(),
            union,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Evaluate against `html`; elements come back as elements, text nodes
    /// and attributes as their string values.
    pub fn select<'a>(&self, html: &'a Html) -> Vec<Selection<'a>> {
        let root = html.tree.root();
        let ranks: HashMap<_, usize> = root.descendants().enumerate().map(|(i, n)| (n.id(), i)).collect();
        let rank = |node: DomNode<'a>| ranks.get(&node.id()).copied().unwrap_or(usize::MAX);
        let doc = Doc { root, rank: &rank };

        let context = vec![Item::Node(root)];
        let mut seen = HashSet::new();
        let mut selected = Vec::new();
        for path in &self.union {
            for item in eval_path(path, &context, &doc) {
                if seen.insert(doc.identity(&item)) {
                    selected.push(item);
                }
            }
        }
        doc.sort(&mut selected);
        selected.into_iter().map(Item::into_selection).collect()
    }
}

/// The document being evaluated: its root and each node's preorder rank.
struct Doc<'d, 'a: 'd> {
    root: DomNode<'a>,
    rank: &'d dyn Fn(DomNode<'a>) -> usize,
}

impl<'a> Doc<'_, 'a> {
    /// Document order; an element's attributes sort right after it.
    fn sort(&self, items: &mut [Item<'a>]) {
        items.sort_by(|a, b| self.order_key(a).cmp(&self.order_key(b)));
    }

    fn identity(&self, item: &Item<'a>) -> (usize, Option<String>) {
        let (rank, attr) = self.order_key(item);
        (rank, attr.map(str::to_string))
    }

    fn order_key<'i>(&self, item: &'i Item<'a>) -> (usize, Option<&'i str>) {
        match item {
            Item::Node(node) => ((self.rank)(*node), None),
            Item::Attr { owner, name, .. } => ((self.rank)(*owner), Some(name.as_str())),
        }
    }
}

#[derive(Clone)]
enum Item<'a> {
    Node(DomNode<'a>),
    Attr {
        owner: DomNode<'a>,
        name: String,
        value: String,
    },
}

impl<'a> Item<'a> {
    fn string_value(&self) -> String {
        match self {
            Item::Attr { value, .. } => value.clone(),
            Item::Node(node) => node_string(*node),
        }
    }

    fn into_selection(self) -> Selection<'a> {
        match self {
            Item::Attr { value, .. } => Selection::Text(value),
            Item::Node(node) => match ElementRef::wrap(node) {
                Some(element) => Selection::Element(element),
                None => Selection::Text(node_string(node)),
            },
        }
    }
}

fn node_string(node: DomNode<'_>) -> String {
    match node.value() {
        Node::Text(text) => text.text.to_string(),
        Node::Comment(comment) => comment.comment.to_string(),
        Node::Element(_) | Node::Document | Node::Fragment => node
            .descendants()
            .filter_map(|n| n.value().as_text().map(|t| t.text.to_string()))
            .collect(),
        _ => String::new(),
    }
}

fn node_matches(node: DomNode<'_>, test: &NodeTest) -> bool {
    match test {
        NodeTest::Node => true,
        NodeTest::Text => node.value().is_text(),
        NodeTest::Any => node.value().is_element(),
        NodeTest::Name(name) => node.value().as_element().is_some_and(|e| e.name() == name),
    }
}

fn axis_items<'a>(base: DomNode<'a>, axis: Axis, test: &NodeTest) -> Vec<Item<'a>> {
    let nodes: Vec<DomNode<'a>> = match axis {
        Axis::Attribute => {
            let Some(element) = base.value().as_element() else {
                return Vec::new();
            };
            return element
                .attrs()
                .filter(|(name, _)| match test {
                    NodeTest::Name(wanted) => name.eq_ignore_ascii_case(wanted),
                    NodeTest::Any | NodeTest::Node => true,
                    NodeTest::Text => false,
                })
                .map(|(name, value)| Item::Attr {
                    owner: base,
                    name: name.to_string(),
                    value: value.to_string(),
                })
                .collect();
        }
        Axis::Child => base.children().collect(),
        Axis::Descendant => base.descendants().skip(1).collect(),
        Axis::DescendantOrSelf => base.descendants().collect(),
        Axis::Parent => base.parent().into_iter().collect(),
        Axis::SelfNode => vec![base],
        Axis::Ancestor => base.ancestors().collect(),
        Axis::FollowingSibling => base.next_siblings().collect(),
        Axis::PrecedingSibling => base.prev_siblings().collect(),
    };
    nodes
        .into_iter()
        .filter(|n| node_matches(*n, test))
        .map(Item::Node)
        .collect()
}

fn eval_path<'a>(path: &LocationPath, context: &[Item<'a>], doc: &Doc<'_, 'a>) -> Vec<Item<'a>> {
    let mut current: Vec<Item<'a>> = if path.absolute {
        vec![Item::Node(doc.root)]
    } else {
        context.to_vec()
    };

    for step in &path.steps {
        let mut next = Vec::new();
        let mut seen = HashSet::new();
        for item in &current {
            let Item::Node(node) = item else {
                continue;
            };
            let bases: Vec<DomNode<'a>> = if step.descendant {
                node.descendants().collect()
            } else {
                vec![*node]
            };
            for base in bases {
                let candidates = axis_items(base, step.axis, &step.test);
                for candidate in apply_predicates(candidates, &step.predicates, doc) {
                    if seen.insert(doc.identity(&candidate)) {
                        next.push(candidate);
                    }
                }
            }
        }
        doc.sort(&mut next);
        current = next;
    }
    current
}

fn apply_predicates<'a>(mut items: Vec<Item<'a>>, predicates: &[Expr], doc: &Doc<'_, 'a>) -> Vec<Item<'a>> {
    for predicate in predicates {
        let size = items.len();
        items = items
            .into_iter()
            .enumerate()
            .filter(|(index, item)| {
                let ctx = Context {
                    item,
                    position: index + 1,
                    size,
                    doc,
                };
                match eval(predicate, &ctx) {
                    Value::Number(n) => n == (index + 1) as f64,
                    other => other.truthy(),
                }
            })
            .map(|(_, item)| item)
            .collect();
    }
    items
}

struct Context<'c, 'a> {
    item: &'c Item<'a>,
    position: usize,
    size: usize,
    doc: &'c Doc<'c, 'a>,
}

enum Value<'a> {
    Bool(bool),
    Number(f64),
    Str(String),
    Nodes(Vec<Item<'a>>),
}

impl Value<'_> {
    fn truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Nodes(nodes) => !nodes.is_empty(),
        }
    }

    fn string(&self) -> String {
        match self {
            Value::Bool(b) => b.to_string(),
            Value::Number(n) if n.fract() == 0.0 && n.is_finite() => format!("{}", *n as i64),
            Value::Number(n) => n.to_string(),
            Value::Str(s) => s.clone(),
            Value::Nodes(nodes) => nodes.first().map(Item::string_value).unwrap_or_default(),
        }
    }

    fn number(&self) -> f64 {
        match self {
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            other => other.string().trim().parse().unwrap_or(f64::NAN),
        }
    }
}

fn eval<'a>(expr: &Expr, ctx: &Context<'_, 'a>) -> Value<'a> {
    match expr {
        Expr::Number(n) => Value::Number(*n),
        Expr::Literal(s) => Value::Str(s.clone()),
        Expr::Path(path) => Value::Nodes(eval_path(path, std::slice::from_ref(ctx.item), ctx.doc)),
        Expr::Or(a, b) => Value::Bool(eval(a, ctx).truthy() || eval(b, ctx).truthy()),
        Expr::And(a, b) => Value::Bool(eval(a, ctx).truthy() && eval(b, ctx).truthy()),
        Expr::Compare(op, a, b) => Value::Bool(compare(*op, &eval(a, ctx), &eval(b, ctx))),
        Expr::Call(function, args) => call(*function, args, ctx),
    }
}

fn call<'a>(function: Function, args: &[Expr], ctx: &Context<'_, 'a>) -> Value<'a> {
    let arg_string = |i: usize| -> String {
        match args.get(i) {
            Some(expr) => eval(expr, ctx).string(),
            None => ctx.item.string_value(),
        }
    };
    match function {
        Function::Position => Value::Number(ctx.position as f64),
        Function::Last => Value::Number(ctx.size as f64),
        Function::True => Value::Bool(true),
        Function::False => Value::Bool(false),
        Function::Not => Value::Bool(!args.first().is_some_and(|e| eval(e, ctx).truthy())),
        Function::Contains => Value::Bool(arg_string(0).contains(&arg_string(1))),
        Function::StartsWith => Value::Bool(arg_string(0).starts_with(&arg_string(1))),
        Function::EndsWith => Value::Bool(arg_string(0).ends_with(&arg_string(1))),
        Function::NormalizeSpace => {
            Value::Str(arg_string(0).split_whitespace().collect::<Vec<_>>().join(" "))
        }
        Function::StringLength => Value::Number(arg_string(0).chars().count() as f64),
        Function::String => Value::Str(arg_string(0)),
        Function::Substring => {
            let number = |i: usize| args.get(i).map_or(f64::NAN, |e| round_half_up(eval(e, ctx).number()));
            let start = number(1);
            let end = if args.len() > 2 { start + number(2) } else { f64::INFINITY };
            Value::Str(
                arg_string(0)
                    .chars()
                    .enumerate()
                    .filter(|(i, _)| {
                        let position = (i + 1) as f64;
                        position >= start && position < end
                    })
                    .map(|(_, c)| c)
                    .collect(),
            )
        }
        Function::SubstringBefore => {
            let (text, marker) = (arg_string(0), arg_string(1));
            Value::Str(text.find(&marker).map(|at| text[..at].to_string()).unwrap_or_default())
        }
        Function::SubstringAfter => {
            let (text, marker) = (arg_string(0), arg_string(1));
            Value::Str(
                text.find(&marker)
                    .map(|at| text[at + marker.len()..].to_string())
                    .unwrap_or_default(),
            )
        }
        Function::Count => match args.first().map(|e| eval(e, ctx)) {
            Some(Value::Nodes(nodes)) => Value::Number(nodes.len() as f64),
            _ => Value::Number(0.0),
        },
    }
}

fn round_half_up(n: f64) -> f64 {
    (n + 0.5).floor()
}

fn compare_scalar(op: CmpOp, a: &Value<'_>, b: &Value<'_>) -> bool {
    match op {
        CmpOp::Eq | CmpOp::Neq => {
            let equal = match (a, b) {
                (Value::Bool(_), _) | (_, Value::Bool(_)) => a.truthy() == b.truthy(),
                (Value::Number(_), _) | (_, Value::Number(_)) => a.number() == b.number(),
                _ => a.string() == b.string(),
            };
            (op == CmpOp::Eq) == equal
        }
        CmpOp::Lt => a.number() < b.number(),
        CmpOp::Le => a.number() <= b.number(),
        CmpOp::Gt => a.number() > b.number(),
        CmpOp::Ge => a.number() >= b.number(),
    }
}

fn compare(op: CmpOp, a: &Value<'_>, b: &Value<'_>) -> bool {
    match (a, b) {
        (Value::Nodes(left), Value::Nodes(right)) => left.iter().any(|l| {
            let l = Value::Str(l.string_value());
            right.iter().any(|r| compare_scalar(op, &l, &Value::Str(r.string_value())))
        }),
        (Value::Nodes(_), Value::Bool(_)) | (Value::Bool(_), Value::Nodes(_)) => {
            compare_scalar(op, &Value::Bool(a.truthy()), &Value::Bool(b.truthy()))
        }
        (Value::Nodes(nodes), other) => nodes
            .iter()
            .any(|n| compare_scalar(op, &Value::Str(n.string_value()), other)),
        (other, Value::Nodes(nodes)) => nodes
            .iter()
            .any(|n| compare_scalar(op, other, &Value::Str(n.string_value()))),
        _ => compare_scalar(op, a, b),
    }
}

fn tokenize(expression: &str) -> Result<Vec<(Token, usize)>, SelectorError> {
    let chars: Vec<(usize, char)> = expression.char_indices().collect();
    let error = |offset: usize, message: String| SelectorError::XPath {
        expression: expression.to_string(),
        offset,
        message,
    };
    let peek = |i: usize| chars.get(i).map(|(_, c)| *c);

    let mut tokens = Vec::new();
    let mut i = 0;
    while let Some(&(offset, c)) = chars.get(i) {
        let single = match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '/' if peek(i + 1) == Some('/') => {
                i += 2;
                tokens.push((Token::DoubleSlash, offset));
                continue;
            }
            '.' if peek(i + 1) == Some('.') => {
                i += 2;
                tokens.push((Token::DotDot, offset));
                continue;
            }
            ':' if peek(i + 1) == Some(':') => {
                i += 2;
                tokens.push((Token::ColonColon, offset));
                continue;
            }
            '!' if peek(i + 1) == Some('=') => {
                i += 2;
                tokens.push((Token::Neq, offset));
                continue;
            }
            '<' if peek(i + 1) == Some('=') => {
                i += 2;
                tokens.push((Token::Le, offset));
                continue;
            }
            '>' if peek(i + 1) == Some('=') => {
                i += 2;
                tokens.push((Token::Ge, offset));
                continue;
            }
            '/' => Token::Slash,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '@' => Token::At,
            ',' => Token::Comma,
            '|' => Token::Pipe,
            '*' => Token::Star,
            '=' => Token::Eq,
            '<' => Token::Lt,
            '>' => Token::Gt,
            '.' if !peek(i + 1).is_some_and(|n| n.is_ascii_digit()) => Token::Dot,
            '\'' | '"' => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && chars[end].1 != c {
                    end += 1;
                }
                if end >= chars.len() {
                    return Err(error(offset, "unterminated string literal".into()));
                }
                let literal: String = chars[start..end].iter().map(|(_, ch)| *ch).collect();
                tokens.push((Token::Literal(literal), offset));
                i = end + 1;
                continue;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut end = i;
                while end < chars.len() && (chars[end].1.is_ascii_digit() || chars[end].1 == '.') {
                    end += 1;
                }
                let text: String = chars[i..end].iter().map(|(_, ch)| *ch).collect();
                let number = text
                    .parse::<f64>()
                    .map_err(|_| error(offset, format!("invalid number {text:?}")))?;
                tokens.push((Token::Number(number), offset));
                i = end;
                continue;
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut end = i;
                while end < chars.len() {
                    let ch = chars[end].1;
                    if ch.is_alphanumeric() || ch == '_' || ch == '-' {
                        end += 1;
                    } else {
                        break;
                    }
                }
                let name: String = chars[i..end].iter().map(|(_, ch)| *ch).collect();
                tokens.push((Token::Name(name), offset));
                i = end;
                continue;
            }
            other => return Err(error(offset, format!("unexpected character {other:?}"))),
        };
        tokens.push((single, offset));
        i += 1;
    }
    Ok(tokens)
}

struct Parser<'t> {
    tokens: &'t [(Token, usize)],
    pos: usize,
    expression: &'t str,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.pos + ahead).map(|(t, _)| t)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|(_, o)| *o)
            .unwrap_or(self.expression.len())
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error_at(&self, offset: usize, message: String) -> SelectorError {
        SelectorError::XPath {
            expression: self.expression.to_string(),
            offset,
            message,
        }
    }

    fn error(&self, message: impl Into<String>) -> SelectorError {
        self.error_at(self.offset(), message.into())
    }

    fn expect(&mut self, token: Token) -> Result<(), SelectorError> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(self.error(format!("expected {token:?}")))
        }
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.peek(),
            Some(Token::Name(_) | Token::Star | Token::At | Token::Dot | Token::DotDot)
        )
    }

    fn location_path(&mut self) -> Result<LocationPath, SelectorError> {
        let mut absolute = false;
        let mut descendant = false;
        match self.peek() {
            Some(Token::Slash) => {
                self.pos += 1;
                absolute = true;
                if !self.starts_step() {
                    return Ok(LocationPath {
                        absolute,
                        steps: Vec::new(),
                    });
                }
            }
            Some(Token::DoubleSlash) => {
                self.pos += 1;
                absolute = true;
                descendant = true;
            }
            _ => {}
        }

        let mut steps = Vec::new();
        loop {
            steps.push(self.step(descendant)?);
            match self.peek() {
                Some(Token::Slash) => {
                    self.pos += 1;
                    descendant = false;
                }
                Some(Token::DoubleSlash) => {
                    self.pos += 1;
                    descendant = true;
                }
                _ => break,
            }
        }
        Ok(LocationPath { absolute, steps })
    }

    fn step(&mut self, descendant: bool) -> Result<Step, SelectorError> {
        let (axis, test) = match self.peek().cloned() {
            Some(Token::Dot) => {
                self.pos += 1;
                (Axis::SelfNode, NodeTest::Node)
            }
            Some(Token::DotDot) => {
                self.pos += 1;
                (Axis::Parent, NodeTest::Node)
            }
            Some(Token::At) => {
                self.pos += 1;
                (Axis::Attribute, self.node_test()?)
            }
            Some(Token::Name(name)) if self.peek_at(1) == Some(&Token::ColonColon) => {
                let axis = match name.as_str() {
                    "child" => Axis::Child,
                    "descendant" => Axis::Descendant,
                    "descendant-or-self" => Axis::DescendantOrSelf,
                    "parent" => Axis::Parent,
                    "self" => Axis::SelfNode,
                    "attribute" => Axis::Attribute,
                    "ancestor" => Axis::Ancestor,
                    "following-sibling" => Axis::FollowingSibling,
                    "preceding-sibling" => Axis::PrecedingSibling,
                    other => return Err(self.error(format!("unsupported axis {other:?}"))),
                };
                self.pos += 2;
                (axis, self.node_test()?)
            }
            _ => (Axis::Child, self.node_test()?),
        };

        let mut predicates = Vec::new();
        while self.eat(&Token::LBracket) {
            predicates.push(self.or_expr()?);
            self.expect(Token::RBracket)?;
        }
        Ok(Step {
            descendant,
            axis,
            test,
            predicates,
        })
    }

    fn node_test(&mut self) -> Result<NodeTest, SelectorError> {
        match self.peek().cloned() {
            Some(Token::Star) => {
                self.pos += 1;
                Ok(NodeTest::Any)
            }
            Some(Token::Name(name)) => {
                self.pos += 1;
                if self.eat(&Token::LParen) {
                    let test = match name.as_str() {
                        "text" => NodeTest::Text,
                        "node" => NodeTest::Node,
                        other => return Err(self.error(format!("unsupported node test {other}()"))),
                    };
                    self.expect(Token::RParen)?;
                    Ok(test)
                } else {
                    Ok(NodeTest::Name(name.to_ascii_lowercase()))
                }
            }
            _ => Err(self.error("expected a node test")),
        }
    }

    fn or_expr(&mut self) -> Result<Expr, SelectorError> {
        let mut left = self.and_expr()?;
        while self.peek() == Some(&Token::Name("or".into())) {
            self.pos += 1;
            left = Expr::Or(Box::new(left), Box::new(self.and_expr()?));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, SelectorError> {
        let mut left = self.equality_expr()?;
        while self.peek() == Some(&Token::Name("and".into())) {
            self.pos += 1;
            left = Expr::And(Box::new(left), Box::new(self.equality_expr()?));
        }
        Ok(left)
    }

    fn equality_expr(&mut self) -> Result<Expr, SelectorError> {
        let mut left = self.relational_expr()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => CmpOp::Eq,
                Some(Token::Neq) => CmpOp::Neq,
                _ => break,
            };
            self.pos += 1;
            left = Expr::Compare(op, Box::new(left), Box::new(self.relational_expr()?));
        }
        Ok(left)
    }

    fn relational_expr(&mut self) -> Result<Expr, SelectorError> {
        let mut left = self.primary_expr()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => CmpOp::Lt,
                Some(Token::Le) => CmpOp::Le,
                Some(Token::Gt) => CmpOp::Gt,
                Some(Token::Ge) => CmpOp::Ge,
                _ => break,
            };
            self.pos += 1;
            left = Expr::Compare(op, Box::new(left), Box::new(self.primary_expr()?));
        }
        Ok(left)
    }

    fn primary_expr(&mut self) -> Result<Expr, SelectorError> {
        match self.peek().cloned() {
            Some(Token::Literal(s)) => {
                self.pos += 1;
                Ok(Expr::Literal(s))
            }
            Some(Token::Number(n)) => {
                self.pos += 1;
                Ok(Expr::Number(n))
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.or_expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Name(name))
                if self.peek_at(1) == Some(&Token::LParen) && name != "text" && name != "node" =>
            {
                let Some((function, arity)) = Function::lookup(&name) else {
                    return Err(self.error(format!("unsupported function {name}()")));
                };
                self.pos += 2;
                let mut args = Vec::new();
                if !self.eat(&Token::RParen) {
                    loop {
                        args.push(self.or_expr()?);
                        if self.eat(&Token::Comma) {
                            continue;
                        }
                        self.expect(Token::RParen)?;
                        break;
                    }
                }
                if !arity.contains(&args.len()) {
                    return Err(self.error(format!("{name}() does not take {} arguments", args.len())));
                }
                Ok(Expr::Call(function, args))
            }
            Some(Token::Slash | Token::DoubleSlash) => Ok(Expr::Path(self.location_path()?)),
            _ if self.starts_step() => Ok(Expr::Path(self.location_path()?)),
            _ => Err(self.error("expected an expression")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <div class="result c-container">
            <h3><a href="/r1" class="ad">Sponsored</a></h3>
            <h3><a href="/r2">First result</a></h3>
            <div class="c-abstract">Hello</div>
            <span class="c-color-gray2">3小时前</span>
          </div>
          <table>
            <tr><th>city</th><th>aqi</th><th>level</th></tr>
            <tr><td>武汉</td><td>42</td><td>优</td></tr>
            <tr><td>黄石</td><td>87</td><td>良</td></tr>
          </table>
          <div id="dayList">
            <div><div>星期一<br>06/21</div><div><div>33℃</div></div></div>
          </div>
        </body></html>
    "#;

    fn texts(expression: &str) -> Vec<String> {
        let html = Html::parse_document(PAGE);
        XPath::parse(expression)
            .unwrap()
            .select(&html)
            .iter()
            .map(|s| s.text().trim().to_string())
            .collect()
    }

    #[test]
    fn test_contains_class() {
        assert_eq!(texts("//div[contains(@class,'c-abstract')]"), vec!["Hello"]);
    }

    #[test]
    fn test_positional_predicates_are_per_parent() {
        assert_eq!(texts("//tr/td[1]"), vec!["武汉", "黄石"]);
        assert_eq!(texts("//tr[last()]/td[2]"), vec!["87"]);
        assert_eq!(texts("//tr[2]/td[position() > 1]/text()"), vec!["42", "优"]);
    }

    #[test]
    fn test_attribute_and_not() {
        assert_eq!(texts("//h3/a[not (@class)]"), vec!["First result"]);
        assert_eq!(texts("//h3/a/@href"), vec!["/r1", "/r2"]);
        assert_eq!(texts("//a[@class='ad']"), vec!["Sponsored"]);
    }

    #[test]
    fn test_text_nodes_and_absolute_paths() {
        assert_eq!(texts("//*[@id='dayList']/div/div[1]/text()[2]"), vec!["06/21"]);
        assert_eq!(texts("/html/body/table//th[3]"), vec!["level"]);
        assert_eq!(texts("//div[@id='dayList']//div[contains(text(), '℃')]"), vec!["33℃"]);
    }

    #[test]
    fn test_axes_and_unions() {
        assert_eq!(texts("//th[text()='aqi']/following-sibling::th"), vec!["level"]);
        assert_eq!(texts("//td[.='42']/parent::tr/td[1]"), vec!["武汉"]);
        assert_eq!(texts("//span | //div[@class='c-abstract']").len(), 2);
        assert_eq!(texts("//td[number-is-not-a-function]").len(), 0);
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(texts("//tr/td[2][. > 50]"), vec!["87"]);
        assert_eq!(texts("//tr[count(td) = 3]/td[3]"), vec!["优", "良"]);
        assert_eq!(texts("//h3/a[starts-with(@href, '/r') and string-length(.) > 10]"), vec!["First result"]);
    }

    fn texts_in(html: &str, expression: &str) -> Vec<String> {
        let html = Html::parse_document(html);
        XPath::parse(expression)
            .unwrap()
            .select(&html)
            .iter()
            .map(|s| s.text().trim().to_string())
            .collect()
    }

    #[test]
    fn test_document_order_across_depths() {
        let nested = "<div><p><a>one</a></p><a>two</a></div>";
        assert_eq!(texts_in(nested, "//a"), vec!["one", "two"]);
        assert_eq!(texts_in(nested, "//div//a"), vec!["one", "two"]);

        let lists = "<ul><li>a<ul><li>a1</li><li>a2</li></ul></li><li>b</li></ul>";
        let items: Vec<String> = texts_in(lists, "//li/text()");
        assert_eq!(items, vec!["a", "a1", "a2", "b"]);
        assert_eq!(texts_in(lists, "//ul/li[1]/text()"), vec!["a", "a1"]);
    }

    #[test]
    fn test_union_in_document_order() {
        assert_eq!(
            texts("//span | //div[@class='c-abstract'] | //h3/a[2]"),
            vec!["Hello", "3小时前"]
        );
        assert_eq!(texts("//td[1] | //th[1]"), vec!["city", "武汉", "黄石"]);
        assert_eq!(texts("//h3/a/@href | //h3/a"), vec!["Sponsored", "/r1", "First result", "/r2"]);
    }

    #[test]
    fn test_substring_functions() {
        assert_eq!(
            texts("//*[@id='dayList']/div/div[2]/div/text()[substring-before(.,'℃')]"),
            vec!["33℃"]
        );
        assert_eq!(texts("//*[@id='dayList']/div/div[2]/div[substring-before(., '℃') = '33']"), vec!["33℃"]);
        assert_eq!(texts("//*[@id='dayList']/div/div[1]/text()[substring-after(., '/') = '21']"), vec!["06/21"]);
        assert!(texts("//*[@id='dayList']/div/div[1]/text()[substring-before(., '℃')]").is_empty());
        assert_eq!(texts("//tr/td[substring(., 1, 1) = '8']"), vec!["87"]);
        assert_eq!(texts("//tr/td[2][substring(., 2) = '2']"), vec!["42"]);
        assert_eq!(texts("//th[substring(., 1.5, 2.6) = 'qi']"), vec!["aqi"]);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(XPath::parse("//div["), Err(SelectorError::XPath { .. })));
        assert!(matches!(XPath::parse("//a[@href='x]"), Err(SelectorError::XPath { .. })));
        assert!(XPath::parse("//a[substring(@href)]").is_err());
        assert!(XPath::parse("//a[substring-before(@href)]").is_err());
        assert!(XPath::parse("//a#b").is_err());
        assert!(XPath::parse("namespace::x").is_err());
    }
}
