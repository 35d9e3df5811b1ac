use crate::error::{BachError, Result};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    LParen,
    RParen,
    Comma,
    /// One of `>`, `<`, `>=`, `<=`, `==`, `=`, `!=`.
    Symbol(&'static str),
    /// Bare run of characters: field names, keywords, unquoted literals.
    Word(String),
    /// Single- or double-quoted literal with the quotes stripped.
    Quoted(String),
}

impl Token {
    pub(crate) fn describe(&self) -> String {
        match self {
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::Comma => "','".to_string(),
            Token::Symbol(s) => format!("'{s}'"),
            Token::Word(w) => format!("'{w}'"),
            Token::Quoted(q) => format!("'{q}'"),
        }
    }

    /// True when this is a bare word equal to `keyword`, ignoring case.
    pub(crate) fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Word(w) if w.eq_ignore_ascii_case(keyword))
    }
}

fn is_operator_char(c: char) -> bool {
    matches!(c, '<' | '>' | '=' | '!')
}

fn ends_word(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | ',') || is_operator_char(c)
}

pub(crate) fn tokenize(expression: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = expression.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        match c {
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '<' | '>' | '=' | '!' => {
                chars.next();
                let followed_by_eq = matches!(chars.peek(), Some(&(_, '=')));
                let symbol = match (c, followed_by_eq) {
                    ('<', true) => "<=",
                    ('>', true) => ">=",
                    ('=', true) => "==",
                    ('!', true) => "!=",
                    ('<', false) => "<",
                    ('>', false) => ">",
                    ('=', false) => "=",
                    _ => return Err(BachError::syntax(expression, "unexpected '!'")),
                };
                if followed_by_eq {
                    chars.next();
                }
                tokens.push(Token::Symbol(symbol));
            }
            '\'' | '"' => {
                chars.next();
                let mut literal = String::new();
                let mut closed = false;
                for (_, ch) in chars.by_ref() {
                    if ch == c {
                        closed = true;
                        break;
                    }
                    literal.push(ch);
                }
                if !closed {
                    return Err(BachError::syntax(
                        expression,
                        format!("unterminated quote starting at offset {start}"),
                    ));
                }
                tokens.push(Token::Quoted(literal));
            }
            _ => {
                let mut word = String::new();
                while let Some(&(_, ch)) = chars.peek() {
                    if ends_word(ch) {
                        break;
                    }
                    word.push(ch);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_operators_without_spaces() {
        let tokens = tokenize("clicks>=10").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Word("clicks".into()),
                Token::Symbol(">="),
                Token::Word("10".into()),
            ]
        );
    }

    #[test]
    fn quoted_literals_keep_inner_text() {
        let tokens = tokenize("title regexp '^[a-z ]+$'").unwrap();
        assert_eq!(tokens[2], Token::Quoted("^[a-z ]+$".into()));
    }

    #[test]
    fn unterminated_quote_is_a_syntax_error() {
        assert!(matches!(
            tokenize("name == \"abc"),
            Err(BachError::Syntax { .. })
        ));
    }

    #[test]
    fn lone_bang_is_a_syntax_error() {
        assert!(tokenize("clicks ! 3").is_err());
    }
}
