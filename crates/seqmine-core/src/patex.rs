//! Pattern expression front end.
//!
//! A pattern expression is a regular expression over taxonomy items with
//! capture groups and generalization markers:
//!
//! ```text
//! A        match A or any descendant
//! A=       match exactly A
//! A^       match A or any descendant, capture with all ascendants
//! A=^      match exactly A, capture A itself
//! .        match any item
//! .^       match any item, capture with all ascendants
//! ( e )    capture group: matched items inside produce output
//! [ e ]    plain group
//! e*  e+  e?  e{n}  e{n,}  e{,m}  e{n,m}   repetition
//! e | e    alternation
//! ^ ... $  anchor to the start / end of the input sequence
//! ```
//!
//! A `^` at the very start of the expression is the start anchor; after an
//! item or `.` it is the generalization marker. Unanchored sides are
//! compiled into uncaptured wildcard loops, so patterns match anywhere
//! inside an input sequence by default. Outside capture groups no
//! transition produces output.

use crate::dictionary::Dictionary;
use crate::error::{Error, Result};
use crate::fst::{Frag, Fst, FstBuilder, InputMatch, OutputRule};
use crate::ops;

/// Compile a pattern expression against a dictionary.
pub fn compile(expression: &str, dict: &Dictionary) -> Result<Fst> {
    let tokens = lex(expression)?;
    let parsed = Parser::new(tokens).parse()?;

    let mut b = FstBuilder::new(dict);
    let frag = emit(&mut b, &parsed.ast, false)?;

    // Unanchored start: skip any prefix without producing output.
    if !parsed.anchored_start {
        let dot = b.label(InputMatch::Any, OutputRule::Epsilon);
        b.add_edge(frag.initial, dot, frag.initial);
    }
    // Unanchored end: a run may stop matching and consume the remaining
    // suffix in a wildcard loop. The original final states stay final so
    // runs ending exactly at end of input still accept.
    if !parsed.anchored_end {
        let tail = b.state(true);
        let dot = b.label(InputMatch::Any, OutputRule::Epsilon);
        b.add_edge(tail, dot, tail);
        for f in b.finals(frag) {
            b.epsilon_link(f, tail);
        }
    }

    b.dedup_edges(frag);
    let fst = b.freeze(frag);
    if !fst.has_output() {
        tracing::warn!(
            expression,
            "pattern expression has no capture group; it cannot produce any pattern"
        );
    }
    Ok(fst)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Dot,
    Caret,
    Equals,
    Dollar,
    Star,
    Plus,
    Question,
    Pipe,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
}

impl Token {
    fn text(&self) -> String {
        match self {
            Token::Word(w) => w.clone(),
            Token::Dot => ".".into(),
            Token::Caret => "^".into(),
            Token::Equals => "=".into(),
            Token::Dollar => "$".into(),
            Token::Star => "*".into(),
            Token::Plus => "+".into(),
            Token::Question => "?".into(),
            Token::Pipe => "|".into(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
            Token::LBracket => "[".into(),
            Token::RBracket => "]".into(),
            Token::LBrace => "{".into(),
            Token::RBrace => "}".into(),
            Token::Comma => ",".into(),
        }
    }
}

fn syntax(fragment: impl Into<String>, message: impl Into<String>) -> Error {
    Error::Syntax {
        fragment: fragment.into(),
        message: message.into(),
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | ':' | '/' | '@')
}

fn lex(expression: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = expression.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '.' => {
                chars.next();
                tokens.push(Token::Dot);
            }
            '^' => {
                chars.next();
                tokens.push(Token::Caret);
            }
            '=' => {
                chars.next();
                tokens.push(Token::Equals);
            }
            '$' => {
                chars.next();
                tokens.push(Token::Dollar);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '?' => {
                chars.next();
                tokens.push(Token::Question);
            }
            '|' => {
                chars.next();
                tokens.push(Token::Pipe);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '[' => {
                chars.next();
                tokens.push(Token::LBracket);
            }
            ']' => {
                chars.next();
                tokens.push(Token::RBracket);
            }
            '{' => {
                chars.next();
                tokens.push(Token::LBrace);
            }
            '}' => {
                chars.next();
                tokens.push(Token::RBrace);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut word = String::new();
                loop {
                    match chars.next() {
                        Some(c) if c == quote => break,
                        Some(c) => word.push(c),
                        None => return Err(syntax(word, "unterminated quoted item")),
                    }
                }
                tokens.push(Token::Word(word));
            }
            c if is_word_char(c) => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if !is_word_char(c) {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
            c => return Err(syntax(c.to_string(), "unexpected character")),
        }
    }
    Ok(tokens)
}

#[derive(Debug)]
enum Ast {
    Item {
        sid: String,
        exact: bool,
        generalize: bool,
    },
    Wildcard {
        generalize: bool,
    },
    Capture(Box<Ast>),
    Concat(Vec<Ast>),
    Union(Vec<Ast>),
    Star(Box<Ast>),
    Plus(Box<Ast>),
    Optional(Box<Ast>),
    Repeat {
        inner: Box<Ast>,
        min: u32,
        max: Option<u32>,
    },
}

struct Parsed {
    anchored_start: bool,
    anchored_end: bool,
    ast: Ast,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn here(&self) -> String {
        self.peek()
            .map(|t| t.text())
            .unwrap_or_else(|| "end of expression".into())
    }

    fn parse(mut self) -> Result<Parsed> {
        let anchored_start = self.eat(&Token::Caret);
        let ast = self.union()?;
        let anchored_end = self.eat(&Token::Dollar);
        if self.pos != self.tokens.len() {
            return Err(syntax(self.here(), "trailing input after expression"));
        }
        Ok(Parsed {
            anchored_start,
            anchored_end,
            ast,
        })
    }

    fn union(&mut self) -> Result<Ast> {
        let first = self.concat()?;
        if self.peek() != Some(&Token::Pipe) {
            return Ok(first);
        }
        let mut parts = vec![first];
        while self.eat(&Token::Pipe) {
            parts.push(self.concat()?);
        }
        Ok(Ast::Union(parts))
    }

    fn concat(&mut self) -> Result<Ast> {
        let mut parts = Vec::new();
        loop {
            match self.peek() {
                None
                | Some(Token::Pipe)
                | Some(Token::RParen)
                | Some(Token::RBracket)
                | Some(Token::Dollar) => break,
                _ => parts.push(self.repeat()?),
            }
        }
        if parts.is_empty() {
            return Err(syntax(self.here(), "expected an item, '.', '(' or '['"));
        }
        if parts.len() == 1 {
            return Ok(parts.swap_remove(0));
        }
        Ok(Ast::Concat(parts))
    }

    fn repeat(&mut self) -> Result<Ast> {
        let mut ast = self.simple()?;
        loop {
            if self.eat(&Token::Star) {
                ast = Ast::Star(Box::new(ast));
            } else if self.eat(&Token::Plus) {
                ast = Ast::Plus(Box::new(ast));
            } else if self.eat(&Token::Question) {
                ast = Ast::Optional(Box::new(ast));
            } else if self.eat(&Token::LBrace) {
                ast = self.bounds(ast)?;
            } else {
                break;
            }
        }
        Ok(ast)
    }

    /// Repetition bounds, after the opening brace: `{n}`, `{n,}`, `{,m}`
    /// or `{n,m}`.
    fn bounds(&mut self, inner: Ast) -> Result<Ast> {
        let min = self.number()?;
        let (min, max) = if self.eat(&Token::Comma) {
            (min.unwrap_or(0), self.number()?)
        } else {
            match min {
                Some(n) => (n, Some(n)),
                None => return Err(syntax(self.here(), "expected a repetition count")),
            }
        };
        if !self.eat(&Token::RBrace) {
            return Err(syntax(self.here(), "expected '}'"));
        }
        if let Some(max) = max {
            if min > max {
                return Err(syntax(
                    format!("{{{min},{max}}}"),
                    "lower repetition bound exceeds upper bound",
                ));
            }
        }
        Ok(Ast::Repeat {
            inner: Box::new(inner),
            min,
            max,
        })
    }

    fn number(&mut self) -> Result<Option<u32>> {
        let word = match self.peek() {
            Some(Token::Word(w)) => w.clone(),
            _ => return Ok(None),
        };
        let n = word
            .parse::<u32>()
            .map_err(|_| syntax(word.clone(), "expected a number"))?;
        self.pos += 1;
        Ok(Some(n))
    }

    fn simple(&mut self) -> Result<Ast> {
        match self.peek().cloned() {
            Some(Token::Word(sid)) => {
                self.pos += 1;
                let mut exact = false;
                let mut generalize = false;
                loop {
                    if !exact && self.eat(&Token::Equals) {
                        exact = true;
                    } else if !generalize && self.eat(&Token::Caret) {
                        generalize = true;
                    } else {
                        break;
                    }
                }
                Ok(Ast::Item {
                    sid,
                    exact,
                    generalize,
                })
            }
            Some(Token::Dot) => {
                self.pos += 1;
                let generalize = self.eat(&Token::Caret);
                Ok(Ast::Wildcard { generalize })
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.union()?;
                if !self.eat(&Token::RParen) {
                    return Err(syntax(self.here(), "expected ')'"));
                }
                Ok(Ast::Capture(Box::new(inner)))
            }
            Some(Token::LBracket) => {
                self.pos += 1;
                let inner = self.union()?;
                if !self.eat(&Token::RBracket) {
                    return Err(syntax(self.here(), "expected ']'"));
                }
                Ok(inner)
            }
            _ => Err(syntax(self.here(), "expected an item, '.', '(' or '['")),
        }
    }
}

fn emit(b: &mut FstBuilder, ast: &Ast, capture: bool) -> Result<Frag> {
    match ast {
        Ast::Item {
            sid,
            exact,
            generalize,
        } => {
            let fid = b.dict().fid_of(sid)?;
            let input = if *exact {
                InputMatch::Item(fid)
            } else {
                InputMatch::ItemWithDescendants(fid)
            };
            let output = if !capture {
                OutputRule::Epsilon
            } else {
                match (*exact, *generalize) {
                    (_, false) => OutputRule::Matched,
                    (false, true) => OutputRule::MatchedWithAscendants,
                    (true, true) => OutputRule::Constant(fid),
                }
            };
            Ok(b.two_state_fragment(input, output))
        }
        Ast::Wildcard { generalize } => {
            let output = if !capture {
                OutputRule::Epsilon
            } else if *generalize {
                OutputRule::MatchedWithAscendants
            } else {
                OutputRule::Matched
            };
            Ok(b.two_state_fragment(InputMatch::Any, output))
        }
        Ast::Capture(inner) => emit(b, inner, true),
        Ast::Concat(parts) => {
            let mut result: Option<Frag> = None;
            for part in parts {
                let frag = emit(b, part, capture)?;
                result = Some(match result {
                    Some(left) => ops::concatenate(b, left, frag),
                    None => frag,
                });
            }
            Ok(result.unwrap_or_else(|| b.trivial_accept()))
        }
        Ast::Union(parts) => {
            let mut result: Option<Frag> = None;
            for part in parts {
                let frag = emit(b, part, capture)?;
                result = Some(match result {
                    Some(left) => ops::union(b, left, frag),
                    None => frag,
                });
            }
            Ok(result.unwrap_or_else(|| b.trivial_accept()))
        }
        Ast::Star(inner) => {
            let frag = emit(b, inner, capture)?;
            Ok(ops::kleene(b, frag))
        }
        Ast::Plus(inner) => {
            let frag = emit(b, inner, capture)?;
            Ok(ops::plus(b, frag))
        }
        Ast::Optional(inner) => {
            let frag = emit(b, inner, capture)?;
            Ok(ops::optional(b, frag))
        }
        Ast::Repeat { inner, min, max } => {
            let frag = emit(b, inner, capture)?;
            Ok(match max {
                Some(max) => ops::repeat_min_max(b, frag, *min, *max),
                None => ops::repeat_min(b, frag, *min),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::Dictionary;

    fn flat_dict(sids: &[&str]) -> Dictionary {
        let mut dict = Dictionary::new();
        for (i, sid) in sids.iter().enumerate() {
            dict.add_item(i as u32 + 1, sid).unwrap();
            dict.set_frequencies(i as u32 + 1, 1, 1).unwrap();
        }
        dict.recompute_fids();
        dict
    }

    #[test]
    fn test_anchored_item_sequence() {
        let dict = flat_dict(&["a", "b", "c"]);
        let fids = dict.fids_of(&["a", "b", "c"]).unwrap();
        let (a, b, c) = (fids[0], fids[1], fids[2]);

        let fst = compile("^(a) (b)$", &dict).unwrap();
        assert!(fst.accepts(&[a, b]));
        assert!(!fst.accepts(&[a, b, c]));
        assert!(!fst.accepts(&[c, a, b]));
        assert!(!fst.accepts(&[a]));
    }

    #[test]
    fn test_unanchored_matches_anywhere() {
        let dict = flat_dict(&["a", "b", "c"]);
        let fids = dict.fids_of(&["a", "b", "c"]).unwrap();
        let (a, b, c) = (fids[0], fids[1], fids[2]);

        let fst = compile("(a) (b)", &dict).unwrap();
        assert!(fst.accepts(&[a, b]));
        assert!(fst.accepts(&[c, a, b]));
        assert!(fst.accepts(&[a, b, c]));
        assert!(fst.accepts(&[c, a, b, c]));
        assert!(!fst.accepts(&[a, c, b]));
    }

    #[test]
    fn test_wildcard_gap() {
        let dict = flat_dict(&["a", "b", "c"]);
        let fids = dict.fids_of(&["a", "b", "c"]).unwrap();
        let (a, b, c) = (fids[0], fids[1], fids[2]);

        let fst = compile("^(a) .* (b)$", &dict).unwrap();
        assert!(fst.accepts(&[a, b]));
        assert!(fst.accepts(&[a, c, b]));
        assert!(fst.accepts(&[a, c, c, b]));
        assert!(!fst.accepts(&[a, c]));
    }

    #[test]
    fn test_union_and_repetition() {
        let dict = flat_dict(&["a", "b"]);
        let fids = dict.fids_of(&["a", "b"]).unwrap();
        let (a, b) = (fids[0], fids[1]);

        let fst = compile("^([a | b]{2,3})$", &dict).unwrap();
        assert!(!fst.accepts(&[a]));
        assert!(fst.accepts(&[a, b]));
        assert!(fst.accepts(&[b, b, a]));
        assert!(!fst.accepts(&[a, b, a, b]));
    }

    #[test]
    fn test_descendants_and_exact_match() {
        let mut dict = Dictionary::new();
        dict.add_item(1, "P").unwrap();
        dict.add_item(2, "A").unwrap();
        dict.add_parent(2, 1).unwrap();
        dict.set_frequencies(1, 2, 2).unwrap();
        dict.set_frequencies(2, 1, 1).unwrap();
        dict.recompute_fids();
        let p = dict.fid_of("P").unwrap();
        let a = dict.fid_of("A").unwrap();

        let loose = compile("^(P)$", &dict).unwrap();
        assert!(loose.accepts(&[p]));
        assert!(loose.accepts(&[a]));

        let exact = compile("^(P=)$", &dict).unwrap();
        assert!(exact.accepts(&[p]));
        assert!(!exact.accepts(&[a]));
    }

    #[test]
    fn test_leading_caret_is_anchor_trailing_caret_generalizes() {
        let mut dict = Dictionary::new();
        dict.add_item(1, "P").unwrap();
        dict.add_item(2, "A").unwrap();
        dict.add_parent(2, 1).unwrap();
        dict.set_frequencies(1, 1, 1).unwrap();
        dict.set_frequencies(2, 1, 1).unwrap();
        dict.recompute_fids();
        let a = dict.fid_of("A").unwrap();

        let fst = compile("^(A^)$", &dict).unwrap();
        assert!(fst.accepts(&[a]));
        assert!(fst.has_output());
    }

    #[test]
    fn test_quoted_item() {
        let dict = flat_dict(&["hello world"]);
        let fid = dict.fid_of("hello world").unwrap();
        let fst = compile("^('hello world')$", &dict).unwrap();
        assert!(fst.accepts(&[fid]));
    }

    #[test]
    fn test_uncaptured_expression_warns_but_compiles() {
        let dict = flat_dict(&["a"]);
        let a = dict.fid_of("a").unwrap();
        let fst = compile("^a$", &dict).unwrap();
        assert!(fst.accepts(&[a]));
        assert!(!fst.has_output());
    }

    #[test]
    fn test_syntax_errors() {
        let dict = flat_dict(&["a"]);
        assert!(matches!(compile("(a", &dict), Err(Error::Syntax { .. })));
        assert!(matches!(compile("a)", &dict), Err(Error::Syntax { .. })));
        assert!(matches!(compile("", &dict), Err(Error::Syntax { .. })));
        assert!(matches!(compile("a{3,1}", &dict), Err(Error::Syntax { .. })));
        assert!(matches!(compile("a{x}", &dict), Err(Error::Syntax { .. })));
        assert!(matches!(compile("*a", &dict), Err(Error::Syntax { .. })));
    }

    #[test]
    fn test_unknown_item() {
        let dict = flat_dict(&["a"]);
        assert!(matches!(compile("(zzz)", &dict), Err(Error::NotFound(_))));
    }
}
