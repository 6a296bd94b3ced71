//! Parser for the old-style plist text printed by `simctl listapps`.
//!
//! ```text
//! {
//!     "com.example.app" = {
//!         CFBundleDisplayName = Example;
//!         GroupContainers = { };
//!         SBAppTags = ( "tag" );
//!     };
//! }
//! ```

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LBrace,
    RBrace,
    LParen,
    RParen,
    Equals,
    Semicolon,
    Comma,
    Text(String),
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '{' | '}' | '(' | ')' | '=' | ';' | ',' | '"')
}

fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        let punct = match c {
            '{' => Some(Token::LBrace),
            '}' => Some(Token::RBrace),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            '=' => Some(Token::Equals),
            ';' => Some(Token::Semicolon),
            ',' => Some(Token::Comma),
            _ => None,
        };
        if let Some(token) = punct {
            chars.next();
            tokens.push(token);
            continue;
        }
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '"' {
            chars.next();
            let mut text = String::new();
            while let Some(c) = chars.next() {
                match c {
                    '"' => break,
                    '\\' => match chars.next() {
                        Some('n') => text.push('\n'),
                        Some('t') => text.push('\t'),
                        Some(other) => text.push(other),
                        None => break,
                    },
                    other => text.push(other),
                }
            }
            tokens.push(Token::Text(text));
            continue;
        }

        let mut word = String::new();
        while let Some(&c) = chars.peek() {
            if is_delimiter(c) {
                break;
            }
            word.push(c);
            chars.next();
        }
        tokens.push(Token::Text(word));
    }

    tokens
}

#[derive(Debug, Clone, PartialEq)]
enum PlistValue {
    Text(String),
    Array(Vec<PlistValue>),
    Dict(Vec<(String, PlistValue)>),
}

impl PlistValue {
    fn as_text(&self) -> Option<&str> {
        match self {
            PlistValue::Text(s) => Some(s),
            _ => None,
        }
    }

    fn texts(&self) -> Vec<String> {
        match self {
            PlistValue::Array(items) => items
                .iter()
                .filter_map(PlistValue::as_text)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

type Parsed<T> = std::result::Result<T, String>;

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Parsed<()> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            other => Err(format!("expected {:?}, found {:?}", expected, other)),
        }
    }

    fn value(&mut self) -> Parsed<PlistValue> {
        match self.next() {
            Some(Token::Text(text)) => Ok(PlistValue::Text(text)),
            Some(Token::LBrace) => self.dict_body().map(PlistValue::Dict),
            Some(Token::LParen) => self.array_body().map(PlistValue::Array),
            other => Err(format!("unexpected {:?}", other)),
        }
    }

    fn entry(&mut self) -> Parsed<(String, PlistValue)> {
        let key = match self.next() {
            Some(Token::Text(key)) => key,
            other => return Err(format!("expected key, found {:?}", other)),
        };
        self.expect(Token::Equals)?;
        let value = self.value()?;
        self.expect(Token::Semicolon)?;
        Ok((key, value))
    }

    /// Entries up to the closing brace; the opening brace is already consumed.
    fn dict_body(&mut self) -> Parsed<Vec<(String, PlistValue)>> {
        let mut entries = Vec::new();
        loop {
            match self.peek() {
                Some(Token::RBrace) => {
                    self.pos += 1;
                    return Ok(entries);
                }
                None => return Err("unterminated dictionary".to_string()),
                _ => entries.push(self.entry()?),
            }
        }
    }

    fn array_body(&mut self) -> Parsed<Vec<PlistValue>> {
        let mut items = Vec::new();
        loop {
            match self.peek() {
                Some(Token::RParen) => {
                    self.pos += 1;
                    return Ok(items);
                }
                Some(Token::Comma) => self.pos += 1,
                None => return Err("unterminated array".to_string()),
                _ => items.push(self.value()?),
            }
        }
    }

    /// Skips the rest of a broken entry: up to its terminating `;` or the
    /// brace closing the enclosing dictionary.
    fn recover(&mut self, start: usize) {
        self.pos = start;
        let mut depth = 0i32;
        while let Some(token) = self.next() {
            match token {
                Token::LBrace | Token::LParen => depth += 1,
                Token::RBrace | Token::RParen => {
                    depth -= 1;
                    if depth < 0 {
                        self.pos -= 1;
                        return;
                    }
                }
                Token::Semicolon if depth == 0 => return,
                _ => {}
            }
        }
    }

    /// Top-level dictionary, keeping every entry that parses.
    fn top_level(&mut self) -> Vec<(String, PlistValue)> {
        if self.peek() == Some(&Token::LBrace) {
            self.pos += 1;
        }
        let mut entries = Vec::new();
        while let Some(token) = self.peek() {
            if *token == Token::RBrace {
                break;
            }
            let start = self.pos;
            match self.entry() {
                Ok(entry) => entries.push(entry),
                Err(_) => {
                    self.recover(start);
                    if self.pos == start {
                        self.pos += 1;
                    }
                }
            }
        }
        entries
    }
}

/// An app installed on a Simulator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulatorApp {
    pub bundle_identifier: String,
    pub display_name: String,
    pub bundle_name: Option<String>,
    pub version: Option<String>,
    pub application_type: Option<String>,
    pub path: Option<String>,
    pub tags: Vec<String>,
}

impl SimulatorApp {
    fn from_entry(key: &str, value: &PlistValue) -> Option<Self> {
        let PlistValue::Dict(fields) = value else {
            return None;
        };
        let field = |name: &str| fields.iter().find(|(k, _)| k == name).map(|(_, v)| v);
        let text = |name: &str| field(name).and_then(PlistValue::as_text).map(str::to_string);
        Some(Self {
            bundle_identifier: text("CFBundleIdentifier").or_else(|| Some(key.to_string()))?,
            display_name: text("CFBundleDisplayName")?,
            bundle_name: text("CFBundleName"),
            version: text("CFBundleVersion"),
            application_type: text("ApplicationType"),
            path: text("Path"),
            tags: field("SBAppTags").map(PlistValue::texts).unwrap_or_default(),
        })
    }
}

/// Apps with both a bundle id and a display name; malformed or incomplete
/// entries are skipped.
pub fn parse_ios_app_data(input: &str) -> Vec<SimulatorApp> {
    let mut parser = Parser {
        tokens: tokenize(input),
        pos: 0,
    };
    parser
        .top_level()
        .iter()
        .filter_map(|(key, value)| SimulatorApp::from_entry(key, value))
        .collect()
}
