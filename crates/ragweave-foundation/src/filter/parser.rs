//! SQL `WHERE` clause parser
//!
//! Turns the `WHERE` clause of a generated `SELECT` statement into a
//! [`Filter`]. Supported predicates:
//!
//! ```text
//! col = v   col != v   col <> v   col < v   col <= v   col > v   col >= v
//! col [NOT] BETWEEN a AND b      col [NOT] IN (a, b, ...)
//! col [NOT] LIKE '%text%'
//! ```
//!
//! combined with `AND`, `OR`, `NOT` and parentheses. Column names may be
//! qualified (`movies.year`) or wrapped in `LOWER(...)` / `UPPER(...)`.

use ragweave_kernel::rag::{Filter, MetadataValue};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError(pub String);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ParseError {}

type ParseResult<T> = Result<T, ParseError>;

fn error<T>(message: impl Into<String>) -> ParseResult<T> {
    Err(ParseError(message.into()))
}

// =============================================================================
// Statement handling
// =============================================================================

/// Removes Markdown code fences and surrounding prose markers.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let after = &trimmed[start + 3..];
    // Skip a language tag such as `sql`.
    let body_start = after.find('\n').map_or(0, |i| i + 1);
    let body = &after[body_start..];
    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

/// Parses the `WHERE` clause of a `SELECT` statement.
///
/// Returns `Ok(None)` for a statement without a `WHERE` clause.
pub fn parse_where_clause(statement: &str) -> ParseResult<Option<Filter>> {
    let tokens = tokenize(strip_code_fences(statement))?;

    if !tokens.iter().any(|t| t.is_keyword("SELECT")) {
        return error("no SELECT statement found");
    }
    let Some(where_at) = tokens.iter().position(|t| t.is_keyword("WHERE")) else {
        return Ok(None);
    };

    let clause: Vec<Token> = tokens[where_at + 1..]
        .iter()
        .take_while(|t| !t.ends_where_clause())
        .cloned()
        .collect();
    if clause.is_empty() {
        return error("empty WHERE clause");
    }

    let mut parser = Parser {
        tokens: clause,
        pos: 0,
    };
    let filter = parser.expression()?;
    if let Some(extra) = parser.peek() {
        return error(format!("unexpected token '{extra}' in WHERE clause"));
    }
    Ok(Some(filter))
}

// =============================================================================
// Tokenizer
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    QuotedIdent(String),
    Str(String),
    Number(String),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
    Semicolon,
}

impl Token {
    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Word(w) if w.eq_ignore_ascii_case(keyword))
    }

    fn ends_where_clause(&self) -> bool {
        matches!(self, Token::Semicolon)
            || ["ORDER", "GROUP", "LIMIT", "HAVING", "OFFSET", "UNION"]
                .iter()
                .any(|k| self.is_keyword(k))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Word(w) | Token::Number(w) => f.write_str(w),
            Token::QuotedIdent(w) => write!(f, "\"{w}\""),
            Token::Str(s) => write!(f, "'{s}'"),
            Token::Op(op) => f.write_str(op),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
            Token::Comma => f.write_str(","),
            Token::Semicolon => f.write_str(";"),
        }
    }
}

fn tokenize(input: &str) -> ParseResult<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            ';' => {
                tokens.push(Token::Semicolon);
                i += 1;
            }
            '\'' => {
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return error("unterminated string literal"),
                        Some('\'') if chars.get(i + 1) == Some(&'\'') => {
                            value.push('\'');
                            i += 2;
                        }
                        Some('\'') => {
                            i += 1;
                            break;
                        }
                        Some(other) => {
                            value.push(*other);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(value));
            }
            '"' | '`' => {
                let close = c;
                let start = i + 1;
                let Some(len) = chars[start..].iter().position(|ch| *ch == close) else {
                    return error("unterminated quoted identifier");
                };
                tokens.push(Token::QuotedIdent(chars[start..start + len].iter().collect()));
                i = start + len + 1;
            }
            '<' | '>' | '=' | '!' => {
                let next = chars.get(i + 1).copied();
                let (op, width) = match (c, next) {
                    ('<', Some('=')) => ("<=", 2),
                    ('<', Some('>')) => ("<>", 2),
                    ('>', Some('=')) => (">=", 2),
                    ('!', Some('=')) => ("!=", 2),
                    ('=', Some('=')) => ("=", 2),
                    ('<', _) => ("<", 1),
                    ('>', _) => (">", 1),
                    ('=', _) => ("=", 1),
                    _ => return error("unexpected '!'"),
                };
                tokens.push(Token::Op(op));
                i += width;
            }
            '*' => {
                tokens.push(Token::Op("*"));
                i += 1;
            }
            c if c.is_ascii_digit()
                || (c == '-' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) =>
            {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                tokens.push(Token::Number(chars[start..i].iter().collect()));
            }
            c if c.is_alphanumeric() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                tokens.push(Token::Word(chars[start..i].iter().collect()));
            }
            other => return error(format!("unexpected character '{other}'")),
        }
    }
    Ok(tokens)
}

// =============================================================================
// Parser
// =============================================================================

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek().is_some_and(|t| t.is_keyword(keyword)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> ParseResult<()> {
        match self.next() {
            Some(ref token) if token == expected => Ok(()),
            Some(token) => error(format!("expected '{expected}', found '{token}'")),
            None => error(format!("expected '{expected}', found end of clause")),
        }
    }

    fn expression(&mut self) -> ParseResult<Filter> {
        let mut left = self.conjunction()?;
        while self.eat_keyword("OR") {
            left = left.or(self.conjunction()?);
        }
        Ok(left)
    }

    fn conjunction(&mut self) -> ParseResult<Filter> {
        let mut left = self.negation()?;
        while self.eat_keyword("AND") {
            left = left.and(self.negation()?);
        }
        Ok(left)
    }

    fn negation(&mut self) -> ParseResult<Filter> {
        if self.eat_keyword("NOT") {
            return Ok(self.negation()?.negate());
        }
        self.primary()
    }

    fn primary(&mut self) -> ParseResult<Filter> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.expression()?;
            self.expect(&Token::RParen)?;
            return Ok(inner);
        }
        self.predicate()
    }

    fn column(&mut self) -> ParseResult<String> {
        let name = match self.next() {
            Some(Token::Word(word)) => {
                let is_case_fn =
                    word.eq_ignore_ascii_case("LOWER") || word.eq_ignore_ascii_case("UPPER");
                if is_case_fn && self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    let inner = self.column()?;
                    self.expect(&Token::RParen)?;
                    return Ok(inner);
                }
                word
            }
            Some(Token::QuotedIdent(ident)) => ident,
            Some(other) => return error(format!("expected a column name, found '{other}'")),
            None => return error("expected a column name, found end of clause"),
        };
        // Strip a table qualifier.
        Ok(name.rsplit('.').next().unwrap_or(&name).to_string())
    }

    fn value(&mut self) -> ParseResult<MetadataValue> {
        match self.next() {
            Some(Token::Str(s)) => Ok(MetadataValue::Str(s)),
            Some(Token::Number(n)) => parse_number(&n),
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("TRUE") => Ok(MetadataValue::Bool(true)),
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("FALSE") => Ok(MetadataValue::Bool(false)),
            Some(other) => error(format!("expected a literal value, found '{other}'")),
            None => error("expected a literal value, found end of clause"),
        }
    }

    fn value_list(&mut self) -> ParseResult<Vec<MetadataValue>> {
        self.expect(&Token::LParen)?;
        let mut values = vec![self.value()?];
        loop {
            match self.next() {
                Some(Token::Comma) => values.push(self.value()?),
                Some(Token::RParen) => return Ok(values),
                Some(other) => return error(format!("expected ',' or ')', found '{other}'")),
                None => return error("unterminated IN list"),
            }
        }
    }

    fn predicate(&mut self) -> ParseResult<Filter> {
        let key = self.column()?;
        let negated = self.eat_keyword("NOT");

        let filter = if self.eat_keyword("BETWEEN") {
            let low = self.value()?;
            if !self.eat_keyword("AND") {
                return error("expected AND in BETWEEN");
            }
            let high = self.value()?;
            Filter::between(key, low, high)
        } else if self.eat_keyword("IN") {
            let values = self.value_list()?;
            if negated {
                return Ok(Filter::not_in(key, values));
            }
            Filter::is_in(key, values)
        } else if self.eat_keyword("LIKE") || self.eat_keyword("ILIKE") {
            like_filter(key, self.value()?)?
        } else if negated {
            return error("expected BETWEEN, IN or LIKE after NOT");
        } else {
            let op = match self.next() {
                Some(Token::Op(op)) => op,
                Some(other) => return error(format!("expected a comparison operator, found '{other}'")),
                None => return error("expected a comparison operator, found end of clause"),
            };
            let value = self.value()?;
            match op {
                "=" => Filter::eq(key, value),
                "!=" | "<>" => Filter::ne(key, value),
                "<" => Filter::lt(key, value),
                "<=" => Filter::lte(key, value),
                ">" => Filter::gt(key, value),
                ">=" => Filter::gte(key, value),
                other => return error(format!("unsupported operator '{other}'")),
            }
        };

        Ok(if negated { filter.negate() } else { filter })
    }
}

fn parse_number(text: &str) -> ParseResult<MetadataValue> {
    if let Ok(int) = text.parse::<i64>() {
        return Ok(MetadataValue::Int(int));
    }
    text.parse::<f64>()
        .map(MetadataValue::Float)
        .map_err(|_| ParseError(format!("invalid number '{text}'")))
}

/// `'%x%'` and other wildcard patterns become a substring match; a pattern
/// without wildcards is plain equality.
fn like_filter(key: String, pattern: MetadataValue) -> ParseResult<Filter> {
    let MetadataValue::Str(pattern) = pattern else {
        return error("LIKE needs a string pattern");
    };
    if !pattern.contains('%') {
        return Ok(Filter::eq(key, pattern));
    }
    let needle = pattern.trim_matches('%');
    if needle.is_empty() || needle.contains('%') || needle.contains('_') {
        return error(format!("unsupported LIKE pattern '{pattern}'"));
    }
    Ok(Filter::contains(key, needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(sql: &str) -> Filter {
        parse_where_clause(sql).unwrap().unwrap()
    }

    #[test]
    fn test_action_movies_from_the_nineties() {
        let filter = parse(
            "```sql\nSELECT * FROM movies WHERE genre = 'action' AND year BETWEEN 1990 AND 1999;\n```",
        );
        assert_eq!(
            filter,
            Filter::eq("genre", "action").and(Filter::between("year", 1990, 1999))
        );
    }

    #[test]
    fn test_precedence_and_parentheses() {
        let filter = parse("SELECT title FROM movies WHERE genre = 'comedy' OR genre = 'drama' AND year > 1993");
        assert_eq!(
            filter,
            Filter::eq("genre", "comedy").or(Filter::eq("genre", "drama").and(Filter::gt("year", 1993)))
        );

        let filter = parse("SELECT title FROM movies WHERE (genre = 'comedy' OR genre = 'drama') AND year > 1993");
        assert_eq!(
            filter,
            Filter::eq("genre", "comedy")
                .or(Filter::eq("genre", "drama"))
                .and(Filter::gt("year", 1993))
        );
    }

    #[test]
    fn test_in_not_in_like_and_qualified_columns() {
        let filter = parse(
            "SELECT m.title FROM movies m WHERE m.genre NOT IN ('drama', 'comedy') AND LOWER(m.title) LIKE '%hard%' ORDER BY m.year LIMIT 5",
        );
        assert_eq!(
            filter,
            Filter::not_in("genre", ["drama", "comedy"]).and(Filter::contains("title", "hard"))
        );
    }

    #[test]
    fn test_negation_and_inequality() {
        let filter = parse("SELECT * FROM movies WHERE NOT year <= 1993 AND genre <> 'drama'");
        assert_eq!(
            filter,
            Filter::lte("year", 1993).negate().and(Filter::ne("genre", "drama"))
        );
    }

    #[test]
    fn test_no_where_clause_means_no_filter() {
        assert_eq!(parse_where_clause("SELECT * FROM movies").unwrap(), None);
    }

    #[test]
    fn test_malformed_statements_rejected() {
        assert!(parse_where_clause("I would recommend Die Hard.").is_err());
        assert!(parse_where_clause("SELECT * FROM movies WHERE genre = ").is_err());
        assert!(parse_where_clause("SELECT * FROM movies WHERE year BETWEEN 1990").is_err());
        assert!(parse_where_clause("SELECT * FROM movies WHERE title = 'Die Hard").is_err());
        assert!(parse_where_clause("SELECT * FROM movies WHERE (genre = 'action'").is_err());
    }

    #[test]
    fn test_escaped_quote_in_literal() {
        assert_eq!(
            parse("SELECT * FROM movies WHERE title = 'Schindler''s List'"),
            Filter::eq("title", "Schindler's List")
        );
    }
}
