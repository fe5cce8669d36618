use std::iter::Peekable;
use std::str::CharIndices;

use super::ExprError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    /// Bare words, including `true`, `false`, `null` and `in`; the parser decides by position.
    Word(String),
    Dot,
    QuestionDot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Not,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Coalesce,
}

impl Token {
    pub(crate) fn describe(&self) -> String {
        match self {
            Token::Int(i) => i.to_string(),
            Token::Float(f) => f.to_string(),
            Token::Str(s) => format!("{s:?}"),
            Token::Word(w) => w.clone(),
            Token::Dot => ".".into(),
            Token::QuestionDot => "?.".into(),
            Token::Comma => ",".into(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
            Token::LBracket => "[".into(),
            Token::RBracket => "]".into(),
            Token::Plus => "+".into(),
            Token::Minus => "-".into(),
            Token::Star => "*".into(),
            Token::Slash => "/".into(),
            Token::Percent => "%".into(),
            Token::Not => "!".into(),
            Token::EqEq => "==".into(),
            Token::NotEq => "!=".into(),
            Token::Lt => "<".into(),
            Token::Le => "<=".into(),
            Token::Gt => ">".into(),
            Token::Ge => ">=".into(),
            Token::AndAnd => "&&".into(),
            Token::OrOr => "||".into(),
            Token::Coalesce => "??".into(),
        }
    }
}

pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, ch)) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '\'' | '"' => {
                chars.next();
                tokens.push(Token::Str(consume_string(&mut chars, ch)?));
            }
            '0'..='9' => tokens.push(consume_number(&mut chars)?),
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut word = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        word.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Word(word));
            }
            '.' => {
                chars.next();
                tokens.push(Token::Dot);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
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
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '%' => {
                chars.next();
                tokens.push(Token::Percent);
            }
            '?' => {
                chars.next();
                match chars.peek() {
                    Some(&(_, '.')) => {
                        chars.next();
                        tokens.push(Token::QuestionDot);
                    }
                    Some(&(_, '?')) => {
                        chars.next();
                        tokens.push(Token::Coalesce);
                    }
                    _ => return Err(ExprError::UnexpectedChar { ch: '?', pos }),
                }
            }
            '!' => {
                chars.next();
                if next_is(&mut chars, '=') {
                    tokens.push(Token::NotEq);
                } else {
                    tokens.push(Token::Not);
                }
            }
            '=' => {
                chars.next();
                if next_is(&mut chars, '=') {
                    tokens.push(Token::EqEq);
                } else {
                    return Err(ExprError::UnexpectedChar { ch: '=', pos });
                }
            }
            '<' => {
                chars.next();
                if next_is(&mut chars, '=') {
                    tokens.push(Token::Le);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '>' => {
                chars.next();
                if next_is(&mut chars, '=') {
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '&' => {
                chars.next();
                if next_is(&mut chars, '&') {
                    tokens.push(Token::AndAnd);
                } else {
                    return Err(ExprError::UnexpectedChar { ch: '&', pos });
                }
            }
            '|' => {
                chars.next();
                if next_is(&mut chars, '|') {
                    tokens.push(Token::OrOr);
                } else {
                    return Err(ExprError::UnexpectedChar { ch: '|', pos });
                }
            }
            other => return Err(ExprError::UnexpectedChar { ch: other, pos }),
        }
    }

    Ok(tokens)
}

fn next_is(chars: &mut Peekable<CharIndices<'_>>, expected: char) -> bool {
    if matches!(chars.peek(), Some(&(_, c)) if c == expected) {
        chars.next();
        true
    } else {
        false
    }
}

fn consume_string(chars: &mut Peekable<CharIndices<'_>>, quote: char) -> Result<String, ExprError> {
    let mut out = String::new();
    while let Some((_, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, 'r')) => out.push('\r'),
                Some((_, other)) => out.push(other),
                None => return Err(ExprError::UnterminatedString),
            },
            c if c == quote => return Ok(out),
            c => out.push(c),
        }
    }
    Err(ExprError::UnterminatedString)
}

fn consume_number(chars: &mut Peekable<CharIndices<'_>>) -> Result<Token, ExprError> {
    let mut digits = String::new();
    let mut is_float = false;

    while let Some(&(_, c)) = chars.peek() {
        if c.is_ascii_digit() || c == '_' {
            if c != '_' {
                digits.push(c);
            }
            chars.next();
        } else if c == '.' && !is_float {
            // `1.foo` is not a float; only take the dot when a digit follows.
            let mut lookahead = chars.clone();
            lookahead.next();
            match lookahead.peek() {
                Some(&(_, d)) if d.is_ascii_digit() => {
                    is_float = true;
                    digits.push('.');
                    chars.next();
                }
                _ => break,
            }
        } else {
            break;
        }
    }

    if is_float {
        digits
            .parse::<f64>()
            .map(Token::Float)
            .map_err(|_| ExprError::InvalidNumber(digits))
    } else {
        digits
            .parse::<i64>()
            .map(Token::Int)
            .map_err(|_| ExprError::InvalidNumber(digits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_operators_and_paths() {
        let tokens = tokenize("steps[0].res.status >= 200 && vars?.x ?? 'n'").unwrap();
        assert_eq!(tokens[0], Token::Word("steps".into()));
        assert_eq!(tokens[1], Token::LBracket);
        assert_eq!(tokens[2], Token::Int(0));
        assert!(tokens.contains(&Token::Ge));
        assert!(tokens.contains(&Token::AndAnd));
        assert!(tokens.contains(&Token::QuestionDot));
        assert!(tokens.contains(&Token::Coalesce));
        assert_eq!(tokens.last(), Some(&Token::Str("n".into())));
    }

    #[test]
    fn distinguishes_floats_from_member_access() {
        assert_eq!(tokenize("1.5").unwrap(), vec![Token::Float(1.5)]);
        let tokens = tokenize("1 + 2").unwrap();
        assert_eq!(tokens, vec![Token::Int(1), Token::Plus, Token::Int(2)]);
    }

    #[test]
    fn rejects_single_equals() {
        assert!(matches!(
            tokenize("a = 1"),
            Err(ExprError::UnexpectedChar { ch: '=', .. })
        ));
    }

    #[test]
    fn unterminated_string_is_an_error() {
        assert_eq!(tokenize("'abc"), Err(ExprError::UnterminatedString));
    }
}
