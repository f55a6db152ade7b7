use crate::error::CompileError;

/// Index of a compilation unit inside one [`crate::driver::CompilationDriver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitId(pub u32);

/// Source location of a token: the line it sits on and the column
/// immediately past its last character. A token of length `n` that starts
/// at column `c` carries `column == c + n`; tokens never span lines, so
/// `column >= n` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LexLocation {
    pub unit: UnitId,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Number,
    Str,
    Symbol,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub location: LexLocation,
}

impl Token {
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn is(&self, text: &str) -> bool {
        self.text == text
    }
}

pub const KEYWORDS: &[&str] = &[
    "import", "var", "fun", "type", "struct", "sum", "trait", "impl", "for", "if", "else", "match",
    "return", "yield", "as", "true", "false",
];

pub fn is_keyword(text: &str) -> bool {
    KEYWORDS.contains(&text)
}

fn is_ident_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_'
}

fn is_ident_continue(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

/// Two-character operators; longest match wins over the single-character set.
const DOUBLE_SYMBOLS: &[&str] = &["->", "=>", "==", "!=", "<=", ">="];

const SINGLE_SYMBOLS: &str = "(){},;:=.*&+-/<>!_|";

pub fn lex(unit: UnitId, content: &str) -> Result<Vec<Token>, CompileError> {
    let chars: Vec<char> = content.chars().collect();
    let mut tokens = Vec::new();
    let mut index = 0usize;
    let mut line = 0u32;
    let mut col = 0u32;

    while index < chars.len() {
        let ch = chars[index];

        if ch == '\n' {
            index += 1;
            line += 1;
            col = 0;
            continue;
        }

        if ch == ' ' || ch == '\t' || ch == '\r' {
            index += 1;
            col += 1;
            continue;
        }

        if ch == '/' && index + 1 < chars.len() && chars[index + 1] == '/' {
            while index < chars.len() && chars[index] != '\n' {
                index += 1;
                col += 1;
            }
            continue;
        }

        if ch == '"' {
            let start = index;
            let start_line = line;
            let start_col = col;
            index += 1;
            col += 1;
            let mut closed = false;
            while index < chars.len() && chars[index] != '\n' {
                if chars[index] == '\\' && index + 1 < chars.len() && chars[index + 1] != '\n' {
                    index += 2;
                    col += 2;
                    continue;
                }
                if chars[index] == '"' {
                    index += 1;
                    col += 1;
                    closed = true;
                    break;
                }
                index += 1;
                col += 1;
            }
            if !closed {
                return Err(CompileError::located(
                    "unterminated string literal",
                    LexLocation {
                        unit,
                        line: start_line,
                        column: start_col + 1,
                    },
                ));
            }
            let text: String = chars[start..index].iter().collect();
            tokens.push(Token {
                kind: TokenKind::Str,
                text,
                location: LexLocation { unit, line, column: col },
            });
            continue;
        }

        if ch.is_ascii_digit() {
            let start = index;
            while index < chars.len() && chars[index].is_ascii_digit() {
                index += 1;
                col += 1;
            }
            let text: String = chars[start..index].iter().collect();
            tokens.push(Token {
                kind: TokenKind::Number,
                text,
                location: LexLocation { unit, line, column: col },
            });
            continue;
        }

        if is_ident_start(ch) {
            let start = index;
            index += 1;
            col += 1;
            while index < chars.len() && is_ident_continue(chars[index]) {
                index += 1;
                col += 1;
            }
            let text: String = chars[start..index].iter().collect();
            // A lone underscore is the discard pattern, not an identifier.
            let kind = if text == "_" { TokenKind::Symbol } else { TokenKind::Ident };
            tokens.push(Token {
                kind,
                text,
                location: LexLocation { unit, line, column: col },
            });
            continue;
        }

        if index + 1 < chars.len() {
            let pair: String = chars[index..index + 2].iter().collect();
            if DOUBLE_SYMBOLS.contains(&pair.as_str()) {
                index += 2;
                col += 2;
                tokens.push(Token {
                    kind: TokenKind::Symbol,
                    text: pair,
                    location: LexLocation { unit, line, column: col },
                });
                continue;
            }
        }

        if SINGLE_SYMBOLS.contains(ch) {
            index += 1;
            col += 1;
            tokens.push(Token {
                kind: TokenKind::Symbol,
                text: ch.to_string(),
                location: LexLocation { unit, line, column: col },
            });
            continue;
        }

        return Err(CompileError::located(
            format!("unexpected character '{ch}'"),
            LexLocation { unit, line, column: col + 1 },
        ));
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        text: String::new(),
        location: LexLocation { unit, line, column: col },
    });

    Ok(tokens)
}
