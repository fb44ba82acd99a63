//! Lexer for the query language.
//!
//! Splits query text into tokens, each tagged with the character offset it
//! starts at so parse errors can point into the input.

use crate::error::SearchError;

/// Token types for query parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Unquoted word
    Term(String),
    /// Double-quoted string, escapes resolved
    Quoted(String),

    And,
    Or,
    Not,
    /// TO keyword; only produced between brackets
    To,
    Colon,
    /// Open range bound
    Star,

    LeftBracket,
    RightBracket,
    LeftParen,
    RightParen,

    Eof,
}

impl Token {
    /// Short form for error messages.
    pub fn describe(&self) -> String {
        match self {
            Token::Term(t) => format!("term '{}'", t),
            Token::Quoted(q) => format!("quoted string \"{}\"", q),
            Token::And => "AND".to_string(),
            Token::Or => "OR".to_string(),
            Token::Not => "NOT".to_string(),
            Token::To => "TO".to_string(),
            Token::Colon => "':'".to_string(),
            Token::Star => "'*'".to_string(),
            Token::LeftBracket => "'['".to_string(),
            Token::RightBracket => "']'".to_string(),
            Token::LeftParen => "'('".to_string(),
            Token::RightParen => "')'".to_string(),
            Token::Eof => "end of input".to_string(),
        }
    }
}

/// A token together with its starting character offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spanned {
    pub token: Token,
    pub position: usize,
}

pub struct Lexer {
    input: Vec<char>,
    position: usize,
    /// Open '[' not yet closed
    range_depth: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
            range_depth: 0,
        }
    }

    /// Tokenize the whole input. The last token is always `Eof`.
    pub fn tokenize(mut self) -> Result<Vec<Spanned>, SearchError> {
        let mut tokens = Vec::new();
        loop {
            let spanned = self.next_token()?;
            let done = spanned.token == Token::Eof;
            tokens.push(spanned);
            if done {
                return Ok(tokens);
            }
        }
    }

    /// Get the next token from the input
    pub fn next_token(&mut self) -> Result<Spanned, SearchError> {
        self.skip_whitespace();

        let start = self.position;
        let Some(ch) = self.current_char() else {
            return Ok(Spanned {
                token: Token::Eof,
                position: start,
            });
        };

        let token = match ch {
            ':' => self.single(Token::Colon),
            '[' => {
                self.range_depth += 1;
                self.single(Token::LeftBracket)
            }
            ']' => {
                self.range_depth = self.range_depth.saturating_sub(1);
                self.single(Token::RightBracket)
            }
            '(' => self.single(Token::LeftParen),
            ')' => self.single(Token::RightParen),
            '"' => {
                self.advance();
                self.read_quoted(start)?
            }
            _ => self.read_term(),
        };

        Ok(Spanned {
            token,
            position: start,
        })
    }

    fn single(&mut self, token: Token) -> Token {
        self.advance();
        token
    }

    fn read_term(&mut self) -> Token {
        let mut term = String::new();
        while let Some(ch) = self.current_char() {
            if !Self::is_term_char(ch) {
                break;
            }
            term.push(ch);
            self.advance();
        }

        // Keywords are upper-case only; "and" is an ordinary word
        match term.as_str() {
            "AND" => Token::And,
            "OR" => Token::Or,
            "NOT" => Token::Not,
            "TO" if self.range_depth > 0 => Token::To,
            "*" => Token::Star,
            _ => Token::Term(term),
        }
    }

    fn read_quoted(&mut self, start: usize) -> Result<Token, SearchError> {
        let mut s = String::new();
        while let Some(ch) = self.current_char() {
            self.advance();
            match ch {
                '"' => return Ok(Token::Quoted(s)),
                '\\' => match self.current_char() {
                    Some(escaped) => {
                        if escaped != '"' && escaped != '\\' {
                            s.push('\\');
                        }
                        s.push(escaped);
                        self.advance();
                    }
                    None => s.push('\\'),
                },
                _ => s.push(ch),
            }
        }

        Err(SearchError::syntax(start, "unterminated quoted string"))
    }

    fn is_term_char(ch: char) -> bool {
        !ch.is_whitespace() && !matches!(ch, ':' | '[' | ']' | '(' | ')' | '"')
    }

    fn current_char(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn skip_whitespace(&mut self) {
        while self.current_char().is_some_and(char::is_whitespace) {
            self.advance();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        Lexer::new(input)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn test_field_term() {
        assert_eq!(
            tokens("from_node:alice"),
            vec![
                Token::Term("from_node".into()),
                Token::Colon,
                Token::Term("alice".into()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_keywords_are_case_sensitive() {
        assert_eq!(
            tokens("a AND b and c OR NOT d"),
            vec![
                Token::Term("a".into()),
                Token::And,
                Token::Term("b".into()),
                Token::Term("and".into()),
                Token::Term("c".into()),
                Token::Or,
                Token::Not,
                Token::Term("d".into()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_range_tokens() {
        assert_eq!(
            tokens("ts:[20120826 TO *]"),
            vec![
                Token::Term("ts".into()),
                Token::Colon,
                Token::LeftBracket,
                Token::Term("20120826".into()),
                Token::To,
                Token::Star,
                Token::RightBracket,
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_to_outside_range_is_a_term() {
        assert_eq!(
            tokens("a TO b"),
            vec![
                Token::Term("a".into()),
                Token::Term("TO".into()),
                Token::Term("b".into()),
                Token::Eof
            ]
        );
        assert_eq!(tokens("ts:[1 TO 2] TO")[7], Token::Term("TO".into()));
    }

    #[test]
    fn test_quoted_with_escapes() {
        assert_eq!(
            tokens(r#""say \"hi\" now""#),
            vec![Token::Quoted("say \"hi\" now".into()), Token::Eof]
        );
        assert_eq!(
            tokens(r#"ts:"2012-08-26T10:00:00Z""#)[2],
            Token::Quoted("2012-08-26T10:00:00Z".into())
        );
    }

    #[test]
    fn test_positions_are_character_offsets() {
        let spans = Lexer::new("  héllo (x)").tokenize().unwrap();
        let positions: Vec<usize> = spans.iter().map(|s| s.position).collect();
        assert_eq!(positions, vec![2, 8, 9, 10, 11]);
    }

    #[test]
    fn test_unterminated_quote() {
        let err = Lexer::new("body:\"oops").tokenize().unwrap_err();
        assert!(matches!(err, SearchError::QuerySyntax { position: 5, .. }));
    }
}
