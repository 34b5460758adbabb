//! Tokenizer for sandbox source text.

use super::ScriptError;

/// Piece of a double-quoted string.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Part {
    Lit(String),
    Var(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    /// `$name`
    Var(String),
    /// Identifier or qualified name such as `\App\Models\User`.
    Name(String),
    Int(i64),
    Float(f64),
    /// Single-quoted string, escapes resolved.
    Str(String),
    /// Double-quoted string with interpolation.
    Template(Vec<Part>),
    Sym(&'static str),
}

impl Token {
    pub(crate) fn describe(&self) -> String {
        match self {
            Token::Var(name) => format!("variable \"${}\"", name),
            Token::Name(name) => format!("identifier \"{}\"", name),
            Token::Int(n) => format!("integer \"{}\"", n),
            Token::Float(f) => format!("number \"{}\"", f),
            Token::Str(_) | Token::Template(_) => "string content".to_string(),
            Token::Sym(s) => format!("token \"{}\"", s),
        }
    }
}

/// Longest symbols first so that `===` wins over `==`.
const SYMBOLS: &[&str] = &[
    "===", "!==", "??", "==", "!=", "<=", ">=", "&&", "||", "=>", "->", "::", "++", "--", "+=",
    "-=", "*=", "/=", ".=", "(", ")", "[", "]", "{", "}", ",", ";", "?", ":", ".", "+", "-", "*",
    "/", "%", "=", "<", ">", "!",
];

pub(crate) fn tokenize(source: &str) -> Result<Vec<Token>, ScriptError> {
    let source = source.trim_start();
    let source = source.strip_prefix("<?php").unwrap_or(source);
    Lexer {
        input: source.chars().collect(),
        pos: 0,
    }
    .run()
}

struct Lexer {
    input: Vec<char>,
    pos: usize,
}

impl Lexer {
    fn peek(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.input.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn starts_with(&self, s: &str) -> bool {
        s.chars()
            .enumerate()
            .all(|(i, c)| self.peek_at(i) == Some(c))
    }

    fn run(mut self) -> Result<Vec<Token>, ScriptError> {
        let mut tokens = Vec::new();
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.pos += 1;
            } else if self.starts_with("//") || c == '#' {
                self.skip_line();
            } else if self.starts_with("/*") {
                self.skip_block_comment()?;
            } else if c == '$' {
                self.pos += 1;
                let name = self.ident();
                if name.is_empty() {
                    return Err(ScriptError::parse("syntax error, unexpected token \"$\""));
                }
                tokens.push(Token::Var(name));
            } else if c.is_ascii_digit() {
                tokens.push(self.number());
            } else if c == '\'' {
                self.pos += 1;
                tokens.push(Token::Str(self.single_quoted()?));
            } else if c == '"' {
                self.pos += 1;
                tokens.push(Token::Template(self.double_quoted()?));
            } else if is_ident_start(c)
                || (c == '\\' && self.peek_at(1).is_some_and(is_ident_start))
            {
                tokens.push(Token::Name(self.name()));
            } else if let Some(&sym) = SYMBOLS.iter().find(|s| self.starts_with(s)) {
                self.pos += sym.chars().count();
                tokens.push(Token::Sym(sym));
            } else {
                return Err(ScriptError::parse(format!(
                    "syntax error, unexpected character \"{}\"",
                    c
                )));
            }
        }
        Ok(tokens)
    }

    fn skip_line(&mut self) {
        while let Some(c) = self.bump() {
            if c == '\n' {
                break;
            }
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), ScriptError> {
        self.pos += 2;
        while self.peek().is_some() {
            if self.starts_with("*/") {
                self.pos += 2;
                return Ok(());
            }
            self.pos += 1;
        }
        Err(ScriptError::parse("Unterminated comment starting line 1"))
    }

    fn ident(&mut self) -> String {
        let mut out = String::new();
        if let Some(c) = self.peek()
            && is_ident_start(c)
        {
            while let Some(c) = self.peek() {
                if !is_ident_char(c) {
                    break;
                }
                out.push(c);
                self.pos += 1;
            }
        }
        out
    }

    fn name(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if is_ident_char(c) || (c == '\\' && self.peek_at(1).is_some_and(is_ident_start)) {
                out.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        out
    }

    fn number(&mut self) -> Token {
        let mut text = String::new();
        let mut is_float = false;
        self.digits(&mut text);
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            text.push('.');
            self.pos += 1;
            self.digits(&mut text);
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let sign = matches!(self.peek_at(1), Some('+' | '-'));
            let digit_at = if sign { 2 } else { 1 };
            if self.peek_at(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                text.push('e');
                self.pos += 1;
                if sign && let Some(s) = self.bump() {
                    text.push(s);
                }
                self.digits(&mut text);
            }
        }

        if !is_float && let Ok(n) = text.parse::<i64>() {
            return Token::Int(n);
        }
        // Integer literals that overflow become floats.
        Token::Float(text.parse::<f64>().unwrap_or(f64::INFINITY))
    }

    fn digits(&mut self, text: &mut String) {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
            } else if c != '_' || !self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) {
                break;
            }
            self.pos += 1;
        }
    }

    fn single_quoted(&mut self) -> Result<String, ScriptError> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(unterminated()),
                Some('\'') => return Ok(out),
                Some('\\') if matches!(self.peek(), Some('\'' | '\\')) => {
                    if let Some(c) = self.bump() {
                        out.push(c);
                    }
                }
                Some(c) => out.push(c),
            }
        }
    }

    fn double_quoted(&mut self) -> Result<Vec<Part>, ScriptError> {
        let mut parts = Vec::new();
        let mut lit = String::new();
        loop {
            match self.bump() {
                None => return Err(unterminated()),
                Some('"') => break,
                Some('\\') => match self.bump() {
                    Some('n') => lit.push('\n'),
                    Some('t') => lit.push('\t'),
                    Some('r') => lit.push('\r'),
                    Some('0') => lit.push('\0'),
                    Some(c @ ('\\' | '"' | '$')) => lit.push(c),
                    Some(c) => {
                        lit.push('\\');
                        lit.push(c);
                    }
                    None => return Err(unterminated()),
                },
                Some('$') if self.peek().is_some_and(is_ident_start) => {
                    flush(&mut parts, &mut lit);
                    parts.push(Part::Var(self.ident()));
                }
                Some('{') if self.peek() == Some('$') => {
                    let start = self.pos;
                    self.pos += 1;
                    let name = self.ident();
                    if !name.is_empty() && self.peek() == Some('}') {
                        self.pos += 1;
                        flush(&mut parts, &mut lit);
                        parts.push(Part::Var(name));
                    } else {
                        self.pos = start;
                        lit.push('{');
                    }
                }
                Some(c) => lit.push(c),
            }
        }
        flush(&mut parts, &mut lit);
        Ok(parts)
    }
}

fn flush(parts: &mut Vec<Part>, lit: &mut String) {
    if !lit.is_empty() {
        parts.push(Part::Lit(std::mem::take(lit)));
    }
}

fn unterminated() -> ScriptError {
    ScriptError::parse("syntax error, unexpected end of file, expecting string end")
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}
