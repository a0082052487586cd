//! Tokenizer for the scriptlet grammar.
//!
//! Newlines are significant as statement separators except inside
//! parentheses and brackets. `#` starts a comment running to end of line.

/// A token kind in the closed grammar.
#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),

    // keywords
    Import,
    If,
    Elif,
    Else,
    While,
    For,
    In,
    And,
    Or,
    Not,
    Break,
    Continue,
    Pass,
    True,
    False,
    NoneLit,

    // punctuation and operators
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Percent,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,

    Newline,
}

/// A token with the 1-based source line it started on.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: Tok,
    pub line: usize,
}

fn keyword(ident: &str) -> Option<Tok> {
    let tok = match ident {
        "import" => Tok::Import,
        "if" => Tok::If,
        "elif" => Tok::Elif,
        "else" => Tok::Else,
        "while" => Tok::While,
        "for" => Tok::For,
        "in" => Tok::In,
        "and" => Tok::And,
        "or" => Tok::Or,
        "not" => Tok::Not,
        "break" => Tok::Break,
        "continue" => Tok::Continue,
        "pass" => Tok::Pass,
        "true" => Tok::True,
        "false" => Tok::False,
        "none" => Tok::NoneLit,
        _ => return None,
    };
    Some(tok)
}

/// Tokenize `source`, or return a line-located error message.
pub fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    let mut line = 1;
    // Newlines inside parens/brackets are insignificant.
    let mut nesting: usize = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\r' => i += 1,
            '\n' => {
                if nesting == 0 {
                    tokens.push(Token {
                        kind: Tok::Newline,
                        line,
                    });
                }
                line += 1;
                i += 1;
            }
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            ';' => {
                tokens.push(Token {
                    kind: Tok::Newline,
                    line,
                });
                i += 1;
            }
            '"' | '\'' => {
                let (s, consumed) = lex_string(&chars[i..], c, line)?;
                tokens.push(Token {
                    kind: Tok::Str(s),
                    line,
                });
                i += consumed;
            }
            '0'..='9' => {
                let (kind, consumed) = lex_number(&chars[i..], line)?;
                tokens.push(Token { kind, line });
                i += consumed;
            }
            _ if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                let kind = keyword(&ident).unwrap_or(Tok::Ident(ident));
                tokens.push(Token { kind, line });
            }
            _ => {
                let (kind, consumed) = lex_operator(&chars[i..], line)?;
                // Braces stay out of the count: block bodies need their
                // newline separators.
                match kind {
                    Tok::LParen | Tok::LBracket => nesting += 1,
                    Tok::RParen | Tok::RBracket => nesting = nesting.saturating_sub(1),
                    _ => {}
                }
                tokens.push(Token { kind, line });
                i += consumed;
            }
        }
    }

    tokens.push(Token {
        kind: Tok::Newline,
        line,
    });
    Ok(tokens)
}

fn lex_string(chars: &[char], quote: char, line: usize) -> Result<(String, usize), String> {
    let mut s = String::new();
    let mut i = 1;
    while i < chars.len() {
        match chars[i] {
            c if c == quote => return Ok((s, i + 1)),
            '\n' => return Err(format!("line {}: unterminated string", line)),
            '\\' => {
                i += 1;
                let esc = chars
                    .get(i)
                    .ok_or_else(|| format!("line {}: unterminated string", line))?;
                match esc {
                    'n' => s.push('\n'),
                    't' => s.push('\t'),
                    'r' => s.push('\r'),
                    '\\' => s.push('\\'),
                    '\'' => s.push('\''),
                    '"' => s.push('"'),
                    '0' => s.push('\0'),
                    other => {
                        return Err(format!("line {}: unknown escape '\\{}'", line, other));
                    }
                }
                i += 1;
            }
            c => {
                s.push(c);
                i += 1;
            }
        }
    }
    Err(format!("line {}: unterminated string", line))
}

fn lex_number(chars: &[char], line: usize) -> Result<(Tok, usize), String> {
    let mut i = 0;
    let mut text = String::new();
    let mut is_float = false;
    while i < chars.len() {
        match chars[i] {
            '0'..='9' => text.push(chars[i]),
            '_' => {} // digit separator
            '.' if !is_float && matches!(chars.get(i + 1), Some('0'..='9')) => {
                is_float = true;
                text.push('.');
            }
            _ => break,
        }
        i += 1;
    }
    if is_float {
        let f: f64 = text
            .parse()
            .map_err(|_| format!("line {}: invalid number '{}'", line, text))?;
        Ok((Tok::Float(f), i))
    } else {
        let n: i64 = text
            .parse()
            .map_err(|_| format!("line {}: integer literal too large", line))?;
        Ok((Tok::Int(n), i))
    }
}

fn lex_operator(chars: &[char], line: usize) -> Result<(Tok, usize), String> {
    let two: String = chars.iter().take(2).collect();
    let tok = match two.as_str() {
        "**" => return Ok((Tok::StarStar, 2)),
        "==" => return Ok((Tok::Eq, 2)),
        "!=" => return Ok((Tok::NotEq, 2)),
        "<=" => return Ok((Tok::LtEq, 2)),
        ">=" => return Ok((Tok::GtEq, 2)),
        "+=" => return Ok((Tok::PlusAssign, 2)),
        "-=" => return Ok((Tok::MinusAssign, 2)),
        "*=" => return Ok((Tok::StarAssign, 2)),
        "/=" => return Ok((Tok::SlashAssign, 2)),
        _ => match chars[0] {
            '+' => Tok::Plus,
            '-' => Tok::Minus,
            '*' => Tok::Star,
            '/' => Tok::Slash,
            '%' => Tok::Percent,
            '(' => Tok::LParen,
            ')' => Tok::RParen,
            '[' => Tok::LBracket,
            ']' => Tok::RBracket,
            '{' => Tok::LBrace,
            '}' => Tok::RBrace,
            ',' => Tok::Comma,
            ':' => Tok::Colon,
            '.' => Tok::Dot,
            '=' => Tok::Assign,
            '<' => Tok::Lt,
            '>' => Tok::Gt,
            other => {
                return Err(format!("line {}: unexpected character '{}'", line, other));
            }
        },
    };
    Ok((tok, 1))
}
