//! Recursive-descent parser turning rule text into an [`Expr`] tree.
//!
//! ```text
//! expr       := unary (("and" | ",") unary)* | unary ("or" unary)*
//! unary      := "not" unary | "(" expr ")" | comparison
//! comparison := field op literal
//! ```
//!
//! `and` and `or` may not be mixed at one nesting level; the caller has to
//! parenthesise.

use super::lexer::{tokenize, Token};
use crate::error::{BachError, Result};
use crate::report::Value;
use regex::Regex;

/// Source of fields the ads report carries itself. Fields of any other
/// source (`YOUTUBE_CHANNEL_INFO:title`) come from an enricher that joins
/// them into the report as `SOURCE:attribute` columns.
pub const ADS_RULE_SOURCE: &str = "GOOGLE_ADS_INFO";

const LATIN_ONLY: &str = r"^[a-zA-Z0-9\s\W]*$";
const NO_LATIN: &str = r"^[^a-zA-Z]*$";

// ---------------------------------------------------------------------------
// Expression tree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    /// Enrichment source, uppercased; `None` for ads report fields.
    pub source: Option<String>,
    pub attribute: String,
    /// Column the field binds to in the (enriched) report.
    pub name: String,
}

impl FieldRef {
    fn ads(attribute: String) -> Self {
        Self {
            source: None,
            name: attribute.clone(),
            attribute,
        }
    }

    fn sourced(source: String, attribute: String) -> Self {
        Self {
            name: format!("{source}:{attribute}"),
            source: Some(source),
            attribute,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
}

impl CmpOp {
    fn from_symbol(symbol: &str) -> Option<CmpOp> {
        match symbol {
            ">" => Some(CmpOp::Gt),
            "<" => Some(CmpOp::Lt),
            ">=" => Some(CmpOp::Ge),
            "<=" => Some(CmpOp::Le),
            "==" | "=" => Some(CmpOp::Eq),
            "!=" => Some(CmpOp::Ne),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CmpOp::Gt => ">",
            CmpOp::Lt => "<",
            CmpOp::Ge => ">=",
            CmpOp::Le => "<=",
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
        }
    }
}

/// String-only predicates.
#[derive(Debug, Clone)]
pub enum Matcher {
    Contains(String),
    Regexp(Regex),
}

#[derive(Debug, Clone)]
pub enum Expr {
    Comparison {
        field: FieldRef,
        op: CmpOp,
        literal: Value,
    },
    Match {
        field: FieldRef,
        matcher: Matcher,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    /// Field names referenced anywhere in the tree, in first-seen order.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    /// Field references that need enrichment, in first-seen order.
    pub fn sourced_fields(&self) -> Vec<&FieldRef> {
        let mut out = Vec::new();
        self.collect_sourced(&mut out);
        out
    }

    fn collect_sourced<'a>(&'a self, out: &mut Vec<&'a FieldRef>) {
        match self {
            Expr::Comparison { field, .. } | Expr::Match { field, .. } => {
                if field.source.is_some() && !out.contains(&field) {
                    out.push(field);
                }
            }
            Expr::And(items) | Expr::Or(items) => {
                for item in items {
                    item.collect_sourced(out);
                }
            }
            Expr::Not(inner) => inner.collect_sourced(out),
        }
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Comparison { field, .. } | Expr::Match { field, .. } => {
                if !out.contains(&field.name.as_str()) {
                    out.push(&field.name);
                }
            }
            Expr::And(items) | Expr::Or(items) => {
                for item in items {
                    item.collect_fields(out);
                }
            }
            Expr::Not(inner) => inner.collect_fields(out),
        }
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq)]
enum Connective {
    And,
    Or,
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

pub(crate) fn parse(source: &str) -> Result<Expr> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(BachError::syntax(source, "empty expression"));
    }
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
    };
    let expr = parser.expr()?;
    match parser.peek() {
        None => Ok(expr),
        Some(Token::RParen) => Err(parser.error("unbalanced ')'")),
        Some(t) => Err(parser.error(format!("unexpected {}", t.describe()))),
    }
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, reason: impl Into<String>) -> BachError {
        BachError::syntax(self.source, reason)
    }

    fn connective(&self) -> Option<Connective> {
        match self.peek()? {
            Token::Comma => Some(Connective::And),
            t if t.is_keyword("and") => Some(Connective::And),
            t if t.is_keyword("or") => Some(Connective::Or),
            _ => None,
        }
    }

    fn expr(&mut self) -> Result<Expr> {
        let mut operands = vec![self.unary()?];
        let mut seen: Option<Connective> = None;

        while let Some(next) = self.connective() {
            match seen {
                Some(c) if c != next => {
                    return Err(self.error("mixing 'and' and 'or' requires parentheses"));
                }
                _ => seen = Some(next),
            }
            self.pos += 1;
            operands.push(self.unary()?);
        }

        Ok(match seen {
            None => operands.remove(0),
            Some(Connective::And) => Expr::And(operands),
            Some(Connective::Or) => Expr::Or(operands),
        })
    }

    fn unary(&mut self) -> Result<Expr> {
        match self.peek() {
            None => Err(self.error("unexpected end of expression")),
            Some(t) if t.is_keyword("not") => {
                self.pos += 1;
                Ok(Expr::Not(Box::new(self.unary()?)))
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.expr()?;
                match self.bump() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(self.error("unbalanced '('")),
                }
            }
            Some(_) => self.comparison(),
        }
    }

    fn comparison(&mut self) -> Result<Expr> {
        let field = self.field()?;

        let op = match self.bump() {
            Some(Token::Symbol(s)) => Operator::Cmp(
                CmpOp::from_symbol(s).ok_or_else(|| self.error(format!("unknown operator '{s}'")))?,
            ),
            Some(t) if t.is_keyword("contains") => Operator::Contains,
            Some(t) if t.is_keyword("regexp") => Operator::Regexp,
            Some(t) if t.is_keyword("letter_set") => Operator::LetterSet,
            Some(Token::Word(w)) => return Err(self.error(format!("unknown operator '{w}'"))),
            Some(t) => {
                return Err(self.error(format!(
                    "expected operator after '{}', found {}",
                    field.name,
                    t.describe()
                )))
            }
            None => {
                return Err(self.error(format!("expected operator after '{}'", field.name)))
            }
        };

        let (text, quoted) = match self.bump() {
            Some(Token::Word(w)) => (w, false),
            Some(Token::Quoted(q)) => (q, true),
            Some(t) => {
                return Err(self.error(format!("expected value, found {}", t.describe())))
            }
            None => return Err(self.error("expected value after operator")),
        };

        Ok(match op {
            Operator::Cmp(op) => Expr::Comparison {
                field,
                op,
                literal: if quoted {
                    Value::Str(text)
                } else {
                    Value::parse_literal(&text)
                },
            },
            Operator::Contains => Expr::Match {
                field,
                matcher: Matcher::Contains(text),
            },
            Operator::Regexp => Expr::Match {
                field,
                matcher: Matcher::Regexp(self.regex(&text)?),
            },
            Operator::LetterSet => {
                let pattern = match text.as_str() {
                    "latin_only" => LATIN_ONLY,
                    "no_latin" => NO_LATIN,
                    other => {
                        return Err(self.error(format!(
                            "unknown letter set '{other}', expected latin_only or no_latin"
                        )))
                    }
                };
                Expr::Match {
                    field,
                    matcher: Matcher::Regexp(self.regex(pattern)?),
                }
            }
        })
    }

    fn field(&mut self) -> Result<FieldRef> {
        let word = match self.bump() {
            Some(Token::Word(w)) => w,
            Some(t) => return Err(self.error(format!("expected field name, found {}", t.describe()))),
            None => return Err(self.error("expected field name")),
        };
        let (source, attribute) = match word.split_once(':') {
            Some((source, attribute)) => {
                if !is_identifier(source) || source.contains('.') {
                    return Err(self.error(format!("invalid rule source '{source}'")));
                }
                let source = source.to_ascii_uppercase();
                (Some(source).filter(|s| s != ADS_RULE_SOURCE), attribute.to_string())
            }
            None => (None, word),
        };
        if !is_identifier(&attribute) {
            return Err(self.error(format!("invalid field name '{attribute}'")));
        }
        Ok(match source {
            Some(source) => FieldRef::sourced(source, attribute),
            None => FieldRef::ads(attribute),
        })
    }

    fn regex(&self, pattern: &str) -> Result<Regex> {
        Regex::new(pattern).map_err(|e| self.error(format!("invalid pattern '{pattern}': {e}")))
    }
}

enum Operator {
    Cmp(CmpOp),
    Contains,
    Regexp,
    LetterSet,
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn syntax_reason(source: &str) -> String {
        match parse(source) {
            Err(BachError::Syntax { reason, .. }) => reason,
            other => panic!("expected syntax error for {source:?}, got {other:?}"),
        }
    }

    #[test]
    fn parses_simple_comparison() {
        match parse("clicks > 10").unwrap() {
            Expr::Comparison { field, op, literal } => {
                assert_eq!(field.name, "clicks");
                assert_eq!(op, CmpOp::Gt);
                assert_eq!(literal, Value::Int(10));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn single_equals_is_equality() {
        assert!(matches!(
            parse("placement_type = WEBSITE").unwrap(),
            Expr::Comparison { op: CmpOp::Eq, .. }
        ));
    }

    #[test]
    fn quoted_number_stays_a_string() {
        match parse("campaign_id == '123'").unwrap() {
            Expr::Comparison { literal, .. } => assert_eq!(literal, Value::Str("123".into())),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn comma_and_keyword_and_are_the_same_connective() {
        assert!(matches!(parse("clicks > 0,cost > 100").unwrap(), Expr::And(v) if v.len() == 2));
        assert!(matches!(
            parse("clicks > 0 AND cost > 100 and ctr < 1").unwrap(),
            Expr::And(v) if v.len() == 3
        ));
    }

    #[test]
    fn mixed_connectives_need_parentheses() {
        assert!(syntax_reason("a > 1 and b > 2 or c > 3").contains("parentheses"));
        assert!(matches!(
            parse("(a > 1 and b > 2) or c > 3").unwrap(),
            Expr::Or(v) if v.len() == 2
        ));
    }

    #[test]
    fn not_binds_to_the_next_operand() {
        match parse("not clicks > 1 and ctr < 2").unwrap() {
            Expr::And(items) => assert!(matches!(items[0], Expr::Not(_))),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn ads_source_prefix_is_stripped() {
        let expr = parse("GOOGLE_ADS_INFO:clicks > 1").unwrap();
        assert_eq!(expr.fields(), vec!["clicks"]);
        assert!(expr.sourced_fields().is_empty());
    }

    #[test]
    fn other_sources_bind_to_qualified_columns() {
        let expr = parse("youtube_channel_info:title regexp game and clicks > 1").unwrap();
        assert_eq!(expr.fields(), vec!["YOUTUBE_CHANNEL_INFO:title", "clicks"]);
        let sourced = expr.sourced_fields();
        assert_eq!(sourced.len(), 1);
        assert_eq!(sourced[0].source.as_deref(), Some("YOUTUBE_CHANNEL_INFO"));
        assert_eq!(sourced[0].attribute, "title");
        assert!(syntax_reason("1BAD:title > 1").contains("invalid rule source"));
        assert!(syntax_reason("WEBSITE_INFO: > 1").contains("invalid field name"));
    }

    #[test]
    fn malformed_expressions_are_rejected() {
        assert!(syntax_reason("(clicks > 1").contains("unbalanced '('"));
        assert!(syntax_reason("clicks > 1)").contains("unbalanced ')'"));
        assert!(syntax_reason("clicks ? 0").contains("unknown operator"));
        assert!(syntax_reason("single_name").contains("expected operator"));
        assert!(syntax_reason("single_name >").contains("expected value"));
        assert!(syntax_reason("").contains("empty"));
        assert!(syntax_reason("clicks > 1 and").contains("end of expression"));
        assert!(syntax_reason("title letter_set greek").contains("letter set"));
        assert!(syntax_reason("title regexp '('").contains("invalid pattern"));
    }

    #[test]
    fn fields_are_collected_once_in_order() {
        let expr = parse("(ctr > 1 or clicks > 2) and not ctr < 5").unwrap();
        assert_eq!(expr.fields(), vec!["ctr", "clicks"]);
    }
}
