//! Recursive-descent parser for the selector grammar.
use crate::ast::Selector;
use crate::error::SyntaxError;
use crate::lex::{Lexer, Token, TokenKind};

const RESERVED: [&str; 3] = ["has", "in", "all"];

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    input_len: usize,
}

impl Parser {
    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn current_pos(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|t| t.pos)
            .unwrap_or(self.input_len)
    }

    fn bump(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        self.pos += 1;
        tok
    }

    fn err(&self, msg: impl Into<String>) -> SyntaxError {
        SyntaxError::new(self.current_pos(), msg)
    }

    /// orExpr = andExpr *( "||" andExpr )
    fn parse_or(&mut self) -> Result<Selector, SyntaxError> {
        let mut lhs = self.parse_and()?;
        while matches!(self.current(), Some(t) if t.kind == TokenKind::Or) {
            self.bump();
            let rhs = self.parse_and()?;
            lhs = Selector::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    /// andExpr = notExpr *( "&&" notExpr )
    fn parse_and(&mut self) -> Result<Selector, SyntaxError> {
        let mut lhs = self.parse_not()?;
        while matches!(self.current(), Some(t) if t.kind == TokenKind::And) {
            self.bump();
            let rhs = self.parse_not()?;
            lhs = Selector::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    /// notExpr = *( "!" ) primary
    fn parse_not(&mut self) -> Result<Selector, SyntaxError> {
        if matches!(self.current(), Some(t) if t.kind == TokenKind::Not) {
            self.bump();
            let inner = self.parse_not()?;
            return Ok(Selector::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    /// primary = "(" orExpr ")" | "all()" | cmp | hasExpr | inExpr
    fn parse_primary(&mut self) -> Result<Selector, SyntaxError> {
        let Some(tok) = self.current().cloned() else {
            return Err(self.err("unexpected end of input, expected an expression"));
        };

        match tok.kind {
            TokenKind::LParen => {
                self.bump();
                let inner = self.parse_or()?;
                self.expect_rparen()?;
                Ok(inner)
            }
            TokenKind::String => Err(self.err(
                "unexpected string literal, expected an identifier, '(', 'has(' or 'all()'",
            )),
            TokenKind::Ident => self.parse_ident_led(&tok),
            TokenKind::Unterminated => Err(self.err("unterminated string literal")),
            TokenKind::Unexpected => {
                Err(self.err(format!("unexpected character '{}'", tok.text)))
            }
            TokenKind::RParen => Err(self.err("unmatched ')'")),
            _ => Err(self.err(format!("unexpected token '{}'", tok.text))),
        }
    }

    fn parse_ident_led(&mut self, tok: &Token) -> Result<Selector, SyntaxError> {
        if tok.text == "all" && self.peek_is(1, TokenKind::LParen) && self.peek_is(2, TokenKind::RParen)
        {
            self.bump(); // all
            self.bump(); // (
            self.bump(); // )
            return Ok(Selector::All);
        }
        if tok.text == "has" && self.peek_is(1, TokenKind::LParen) {
            self.bump(); // has
            self.bump(); // (
            let key = self.expect_key()?;
            self.expect_rparen()?;
            return Ok(Selector::Has(key));
        }

        if RESERVED.contains(&tok.text.as_str()) || self.is_not_in_phrase_at(self.pos) {
            return Err(self.err(format!(
                "'{}' is a reserved word and cannot be used as a label key",
                tok.text
            )));
        }

        let key = self.expect_key()?;
        match self.current().map(|t| t.kind) {
            Some(TokenKind::EqEq) => {
                self.bump();
                let value = self.expect_literal()?;
                Ok(Selector::Equal(key, value))
            }
            Some(TokenKind::NotEq) => {
                self.bump();
                let value = self.expect_literal()?;
                Ok(Selector::NotEqual(key, value))
            }
            Some(TokenKind::Ident) if self.current().unwrap().text == "in" => {
                self.bump();
                let values = self.parse_literal_set()?;
                Ok(Selector::In(key, values))
            }
            Some(TokenKind::Ident)
                if self.current().unwrap().text == "not" && self.peek_ident_is(1, "in") =>
            {
                self.bump(); // not
                self.bump(); // in
                let values = self.parse_literal_set()?;
                Ok(Selector::NotIn(key, values))
            }
            _ => Err(self.err(format!(
                "bare identifier '{key}' not followed by '==', '!=', 'in' or 'not in'"
            ))),
        }
    }

    fn expect_key(&mut self) -> Result<String, SyntaxError> {
        match self.current().cloned() {
            Some(t) if t.kind == TokenKind::Ident => {
                if RESERVED.contains(&t.text.as_str()) || self.is_not_in_phrase_at(self.pos) {
                    return Err(self.err(format!(
                        "'{}' is a reserved word and cannot be used as a label key",
                        t.text
                    )));
                }
                self.bump();
                Ok(t.text)
            }
            Some(t) => Err(self.err(format!("expected an identifier, found '{}'", t.text))),
            None => Err(self.err("expected an identifier")),
        }
    }

    /// `true` iff the current token is the bare word `not` immediately
    /// followed by `in`, the two-token spelling of the single reserved
    /// phrase `"not in"` (§4.A). `not` on its own, not followed by `in`,
    /// is an ordinary identifier, not a reserved word.
    fn is_not_in_phrase_at(&self, pos: usize) -> bool {
        debug_assert_eq!(pos, self.pos);
        self.current()
            .map(|t| t.kind == TokenKind::Ident && t.text == "not")
            .unwrap_or(false)
            && self.peek_ident_is(1, "in")
    }

    fn expect_literal(&mut self) -> Result<String, SyntaxError> {
        match self.current().cloned() {
            Some(t) if t.kind == TokenKind::String => {
                self.bump();
                Ok(t.text)
            }
            Some(t) if t.kind == TokenKind::Ident => Err(self.err(format!(
                "expected a quoted literal, found bare identifier '{}'",
                t.text
            ))),
            Some(t) if t.kind == TokenKind::Unterminated => {
                Err(self.err("unterminated string literal"))
            }
            Some(t) => Err(self.err(format!("expected a quoted literal, found '{}'", t.text))),
            None => Err(self.err("expected a quoted literal")),
        }
    }

    fn parse_literal_set(&mut self) -> Result<Vec<String>, SyntaxError> {
        self.expect_kind(TokenKind::LBrace, "expected '{'")?;
        let mut values = Vec::new();
        if !matches!(self.current(), Some(t) if t.kind == TokenKind::RBrace) {
            values.push(self.expect_literal()?);
            while matches!(self.current(), Some(t) if t.kind == TokenKind::Comma) {
                self.bump();
                values.push(self.expect_literal()?);
            }
        }
        self.expect_kind(TokenKind::RBrace, "expected '}'")?;
        Ok(values)
    }

    fn expect_rparen(&mut self) -> Result<(), SyntaxError> {
        self.expect_kind(TokenKind::RParen, "expected ')'")
    }

    fn expect_kind(&mut self, kind: TokenKind, msg: &str) -> Result<(), SyntaxError> {
        match self.current() {
            Some(t) if t.kind == kind => {
                self.bump();
                Ok(())
            }
            _ => Err(self.err(msg)),
        }
    }

    fn peek_is(&self, offset: usize, kind: TokenKind) -> bool {
        self.tokens
            .get(self.pos + offset)
            .map(|t| t.kind == kind)
            .unwrap_or(false)
    }

    fn peek_ident_is(&self, offset: usize, text: &str) -> bool {
        self.tokens
            .get(self.pos + offset)
            .map(|t| t.kind == TokenKind::Ident && t.text == text)
            .unwrap_or(false)
    }
}

/// Parse a selector string into its canonical tree.
///
/// The empty string (and any whitespace-only string) parses to
/// [`Selector::All`], same as the literal text `all()`; this is not an
/// error case. All other malformed input yields a [`SyntaxError`].
pub fn parse(input: &str) -> Result<Selector, SyntaxError> {
    let tokens: Vec<Token> = Lexer::new(input).collect();
    if tokens.is_empty() {
        return Ok(Selector::All);
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        input_len: input.len(),
    };
    let tree = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        let tok = &parser.tokens[parser.pos];
        return Err(SyntaxError::new(
            tok.pos,
            format!("unexpected trailing token '{}'", tok.text),
        ));
    }
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_whitespace_are_all() {
        assert_eq!(parse("").unwrap(), Selector::All);
        assert_eq!(parse("   \t").unwrap(), Selector::All);
        assert_eq!(parse("all()").unwrap(), Selector::All);
    }

    #[test]
    fn round_trip_seed_scenario() {
        let tree = parse(" ! (has( b)||! has(a ))").unwrap();
        assert_eq!(tree.to_string(), "!(has(b) || !has(a))");
        let reparsed = parse(&tree.to_string()).unwrap();
        assert_eq!(reparsed.to_string(), tree.to_string());
    }

    #[test]
    fn equal_and_in_parse() {
        assert_eq!(
            parse(r#"tier == "prod""#).unwrap(),
            Selector::Equal("tier".into(), "prod".into())
        );
        assert_eq!(
            parse(r#"tier in {"prod", "staging"}"#).unwrap(),
            Selector::In("tier".into(), vec!["prod".into(), "staging".into()])
        );
        assert_eq!(
            parse(r#"tier not in {"prod"}"#).unwrap(),
            Selector::NotIn("tier".into(), vec!["prod".into()])
        );
        assert_eq!(
            parse(r#"tier != "prod""#).unwrap(),
            Selector::NotEqual("tier".into(), "prod".into())
        );
    }

    #[test]
    fn empty_in_set_parses() {
        assert_eq!(
            parse(r#"tier in {}"#).unwrap(),
            Selector::In("tier".into(), vec![])
        );
    }

    fn expect_syntax_error(input: &str) {
        assert!(parse(input).is_err(), "expected {input:?} to fail to parse");
    }

    #[test]
    fn bad_selectors_are_rejected() {
        for bad in [
            "b == b",
            "'b1' == b",
            "b",
            "a b",
            "!",
            "foo == \"bar\" &",
            "foo == \"bar\" |",
            "\"FOO",
            "(",
            ")",
            "()",
            "%",
        ] {
            expect_syntax_error(bad);
        }
    }

    #[test]
    fn reserved_words_rejected_as_keys() {
        expect_syntax_error(r#"has == "x""#);
        expect_syntax_error(r#"all == "x""#);
        expect_syntax_error(r#"in == "x""#);
    }

    #[test]
    fn bare_not_is_an_ordinary_identifier() {
        // "not" is only reserved as half of the two-token phrase
        // "not in"; standalone it is a plain label key.
        assert_eq!(
            parse(r#"not == "x""#).unwrap(),
            Selector::Equal("not".into(), "x".into())
        );
    }

    #[test]
    fn not_in_phrase_rejected_as_key() {
        expect_syntax_error(r#"not in == "x""#);
    }

    #[test]
    fn deeply_nested_not_toggles_parity() {
        let labels = std::collections::BTreeMap::from([("a".to_string(), "1".to_string())]);
        let odd = parse("!!!has(a)").unwrap();
        let even = parse("!!has(a)").unwrap();
        assert!(!crate::evaluate(&odd, &labels));
        assert!(crate::evaluate(&even, &labels));
    }
}
