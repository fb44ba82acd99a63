//! Recursive descent parser for query text
//!
//! # Grammar
//!
//! ```text
//! query    := or_expr EOF
//! or_expr  := and_expr (OR and_expr)*
//! and_expr := not_expr (AND? not_expr)*
//! not_expr := NOT not_expr | primary
//! primary  := '(' or_expr ')' | TERM ':' value | value
//! value    := TERM | QUOTED | '[' bound TO bound ']'
//! bound    := TERM | QUOTED | '*'
//! ```
//!
//! Adjacent clauses are combined with AND. Bare terms target the schema's
//! default field. Timestamp values are checked here so a bad literal is
//! reported at its position rather than at evaluation time.

use timemachine_types::{FieldKind, Schema};

use crate::error::SearchError;
use crate::lexer::{Lexer, Spanned, Token};
use crate::query::Query;
use crate::timespec::{parse_time_literal, TimeSpan};

/// Nesting limit for parentheses and NOT chains
const MAX_DEPTH: usize = 128;

/// Parses query text against a schema.
#[derive(Debug, Clone)]
pub struct QueryParser {
    schema: Schema,
}

impl QueryParser {
    pub fn new(schema: Schema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Parse query text into an expression tree.
    pub fn parse(&self, text: &str) -> Result<Query, SearchError> {
        let tokens = Lexer::new(text).tokenize()?;
        let mut parser = Parser {
            tokens,
            index: 0,
            depth: 0,
            schema: &self.schema,
        };

        if parser.peek() == &Token::Eof {
            return Err(SearchError::syntax(0, "empty query"));
        }

        let query = parser.parse_or_expr()?;
        if parser.peek() != &Token::Eof {
            let current = parser.current();
            return Err(SearchError::syntax(
                current.position,
                format!("unexpected {}", current.token.describe()),
            ));
        }
        Ok(query)
    }
}

struct Parser<'a> {
    tokens: Vec<Spanned>,
    index: usize,
    depth: usize,
    schema: &'a Schema,
}

impl Parser<'_> {
    fn current(&self) -> &Spanned {
        // tokenize() always ends with Eof and advance() never moves past it
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &Token {
        &self.current().token
    }

    fn peek_second(&self) -> &Token {
        let i = (self.index + 1).min(self.tokens.len() - 1);
        &self.tokens[i].token
    }

    fn advance(&mut self) -> Spanned {
        let spanned = self.current().clone();
        if spanned.token != Token::Eof {
            self.index += 1;
        }
        spanned
    }

    fn expect(&mut self, expected: Token) -> Result<Spanned, SearchError> {
        if self.peek() == &expected {
            return Ok(self.advance());
        }
        let current = self.current();
        Err(SearchError::syntax(
            current.position,
            format!(
                "expected {}, found {}",
                expected.describe(),
                current.token.describe()
            ),
        ))
    }

    fn enter(&mut self) -> Result<(), SearchError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(SearchError::syntax(
                self.current().position,
                "query nested too deeply",
            ));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// or_expr := and_expr (OR and_expr)*
    fn parse_or_expr(&mut self) -> Result<Query, SearchError> {
        let mut left = self.parse_and_expr()?;
        while self.peek() == &Token::Or {
            self.advance();
            let right = self.parse_and_expr()?;
            left = Query::or(left, right);
        }
        Ok(left)
    }

    /// and_expr := not_expr (AND? not_expr)*
    fn parse_and_expr(&mut self) -> Result<Query, SearchError> {
        let mut left = self.parse_not_expr()?;
        loop {
            if self.peek() == &Token::And {
                self.advance();
            } else if !self.starts_clause() {
                break;
            }
            let right = self.parse_not_expr()?;
            left = Query::and(left, right);
        }
        Ok(left)
    }

    fn starts_clause(&self) -> bool {
        matches!(
            self.peek(),
            Token::Term(_) | Token::Quoted(_) | Token::LeftParen | Token::Not
        )
    }

    /// not_expr := NOT not_expr | primary
    fn parse_not_expr(&mut self) -> Result<Query, SearchError> {
        if self.peek() != &Token::Not {
            return self.parse_primary();
        }
        self.advance();
        self.enter()?;
        let inner = self.parse_not_expr();
        self.leave();
        Ok(Query::not(inner?))
    }

    fn parse_primary(&mut self) -> Result<Query, SearchError> {
        let current = self.current().clone();
        match current.token {
            Token::LeftParen => {
                self.advance();
                self.enter()?;
                let inner = self.parse_or_expr();
                self.leave();
                let inner = inner?;
                self.expect(Token::RightParen)?;
                Ok(inner)
            }
            Token::Term(name) if self.peek_second() == &Token::Colon => {
                self.advance();
                self.advance();
                self.parse_field_value(name, current.position)
            }
            Token::Term(value) | Token::Quoted(value) => {
                self.advance();
                Ok(Query::bare(value))
            }
            other => Err(SearchError::syntax(
                current.position,
                format!("expected a term, found {}", other.describe()),
            )),
        }
    }

    /// value after `field:`
    fn parse_field_value(
        &mut self,
        field: String,
        field_position: usize,
    ) -> Result<Query, SearchError> {
        let kind = self
            .schema
            .kind_of(&field)
            .ok_or_else(|| SearchError::UnknownField(field.clone()))?;

        let current = self.current().clone();
        match current.token {
            Token::Term(value) | Token::Quoted(value) => {
                self.advance();
                if kind == FieldKind::Timestamp && parse_time_literal(&value).is_none() {
                    return Err(SearchError::syntax(
                        current.position,
                        format!("invalid timestamp '{}'", value),
                    ));
                }
                Ok(Query::term(field, value))
            }
            Token::LeftBracket => {
                if kind != FieldKind::Timestamp {
                    return Err(SearchError::UnsupportedQuery(format!(
                        "range on {} field '{}' at position {}",
                        kind, field, field_position
                    )));
                }
                self.advance();
                let low = self.parse_bound()?.map(|span| span.start);
                self.expect(Token::To)?;
                let high = self.parse_bound()?.map(|span| span.end);
                self.expect(Token::RightBracket)?;
                Ok(Query::Range { field, low, high })
            }
            other => Err(SearchError::syntax(
                current.position,
                format!("expected a value for '{}', found {}", field, other.describe()),
            )),
        }
    }

    /// bound := TERM | QUOTED | '*'
    fn parse_bound(&mut self) -> Result<Option<TimeSpan>, SearchError> {
        let current = self.advance();
        match current.token {
            Token::Star => Ok(None),
            Token::Term(value) | Token::Quoted(value) => parse_time_literal(&value)
                .map(Some)
                .ok_or_else(|| {
                    SearchError::syntax(current.position, format!("invalid timestamp '{}'", value))
                }),
            other => Err(SearchError::syntax(
                current.position,
                format!("expected a range bound, found {}", other.describe()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn parser() -> QueryParser {
        QueryParser::new(Schema::message())
    }

    fn parse(text: &str) -> Query {
        parser().parse(text).unwrap()
    }

    #[test]
    fn test_bare_and_field_terms() {
        assert_eq!(parse("hello"), Query::bare("hello"));
        assert_eq!(parse("from_node:alice"), Query::term("from_node", "alice"));
        assert_eq!(parse("\"hello world\""), Query::bare("hello world"));
        assert_eq!(parse("body:\"a b\""), Query::term("body", "a b"));
    }

    #[test]
    fn test_adjacency_is_and() {
        assert_eq!(
            parse("hello world"),
            Query::and(Query::bare("hello"), Query::bare("world"))
        );
        assert_eq!(parse("hello world"), parse("hello AND world"));
    }

    #[test]
    fn test_precedence() {
        // AND binds tighter than OR
        assert_eq!(
            parse("a OR b c"),
            Query::or(
                Query::bare("a"),
                Query::and(Query::bare("b"), Query::bare("c"))
            )
        );
        assert_eq!(
            parse("(a OR b) c"),
            Query::and(
                Query::or(Query::bare("a"), Query::bare("b")),
                Query::bare("c")
            )
        );
        assert_eq!(
            parse("NOT a b"),
            Query::and(Query::not(Query::bare("a")), Query::bare("b"))
        );
        assert_eq!(
            parse("NOT NOT a"),
            Query::not(Query::not(Query::bare("a")))
        );
    }

    #[test]
    fn test_lowercase_keywords_are_terms() {
        assert_eq!(
            parse("cats and dogs"),
            Query::all_of(vec![
                Query::bare("cats"),
                Query::bare("and"),
                Query::bare("dogs")
            ])
            .unwrap()
        );
    }

    #[test]
    fn test_to_outside_range_is_a_word() {
        assert_eq!(
            parse("a TO b"),
            Query::all_of(vec![Query::bare("a"), Query::bare("TO"), Query::bare("b")]).unwrap()
        );
        assert_eq!(parse("body:TO"), Query::term("body", "TO"));
    }

    #[test]
    fn test_timestamp_range() {
        let q = parse("ts:[20120826 TO 20120827]");
        assert_eq!(
            q,
            Query::ts_range(
                Utc.with_ymd_and_hms(2012, 8, 26, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2012, 8, 28, 0, 0, 0).unwrap() - Duration::microseconds(1),
            )
        );

        match parse("ts:[* TO 2012]") {
            Query::Range { low, high, .. } => {
                assert_eq!(low, None);
                let end_of_2012 =
                    Utc.with_ymd_and_hms(2013, 1, 1, 0, 0, 0).unwrap() - Duration::microseconds(1);
                assert_eq!(high, Some(end_of_2012));
            }
            other => panic!("expected range, got {:?}", other),
        }
    }

    #[test]
    fn test_timestamp_term_and_help_examples() {
        assert_eq!(parse("ts:20120826"), Query::term("ts", "20120826"));
        let q = parse("blah AND ts:[20120826 TO 20120827]");
        assert!(matches!(q, Query::And(_, _)));
    }

    #[test]
    fn test_unknown_field() {
        let err = parser().parse("sender:alice").unwrap_err();
        assert!(matches!(err, SearchError::UnknownField(f) if f == "sender"));
    }

    #[test]
    fn test_range_on_identifier_is_unsupported() {
        let err = parser().parse("from_node:[a TO b]").unwrap_err();
        assert!(matches!(err, SearchError::UnsupportedQuery(_)));
    }

    #[test]
    fn test_syntax_errors_carry_position() {
        let cases = [
            ("", 0),
            ("   ", 0),
            ("hello AND", 9),
            ("(hello", 6),
            ("hello)", 5),
            ("ts:[20120826 TO", 15),
            ("ts:notadate", 3),
            ("ts:[2012 TO later]", 12),
            ("body:", 5),
            ("OR hello", 0),
        ];
        for (text, expected) in cases {
            match parser().parse(text) {
                Err(SearchError::QuerySyntax { position, .. }) => {
                    assert_eq!(position, expected, "position for {:?}", text)
                }
                other => panic!("expected syntax error for {:?}, got {:?}", text, other),
            }
        }
    }

    #[test]
    fn test_deep_nesting_rejected() {
        let text = format!("{}a{}", "(".repeat(500), ")".repeat(500));
        assert!(matches!(
            parser().parse(&text),
            Err(SearchError::QuerySyntax { .. })
        ));
    }

    #[test]
    fn test_display_echo() {
        assert_eq!(
            parse("hello from_node:alice").to_string(),
            "(body:hello AND from_node:alice)"
        );
    }
}
