//! Recursive-descent formula parser. Single pass, no backtracking; errors
//! carry the byte offset where parsing stopped.

use thiserror::Error;

use crate::ast::Expr;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parse error at byte {offset}: {message}")]
pub struct ParseError {
    pub offset: usize,
    pub message: String,
}

impl ParseError {
    fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

/// Parse a formula. A leading `=` (the formula marker in import maps and
/// calculated fields) is accepted and skipped.
pub fn parse(input: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(input);
    parser.skip_ws();
    if parser.peek() == Some(b'=') {
        parser.pos += 1;
    }
    let expr = parser.expression()?;
    parser.skip_ws();
    if parser.pos < parser.input.len() {
        return Err(ParseError::new(
            parser.pos,
            format!("unexpected trailing input: {:?}", parser.rest_preview()),
        ));
    }
    Ok(expr)
}

struct Parser<'a> {
    input: &'a [u8],
    source: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            input: source.as_bytes(),
            source,
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self
            .peek()
            .is_some_and(|b| b == b' ' || b == b'\t' || b == b'\r' || b == b'\n')
        {
            self.pos += 1;
        }
    }

    fn rest_preview(&self) -> &str {
        let rest = &self.source[self.pos..];
        let end = rest
            .char_indices()
            .nth(16)
            .map_or(rest.len(), |(i, _)| i);
        &rest[..end]
    }

    /// expression := comparison ('&' comparison)*
    fn expression(&mut self) -> Result<Expr, ParseError> {
        let first = self.comparison()?;
        let mut parts = vec![first];
        loop {
            self.skip_ws();
            if self.peek() == Some(b'&') {
                self.pos += 1;
                parts.push(self.comparison()?);
            } else {
                break;
            }
        }
        if parts.len() == 1 {
            Ok(parts.pop().unwrap_or(Expr::Literal(String::new())))
        } else {
            Ok(Expr::Concat(parts))
        }
    }

    /// comparison := factor ('=' factor)?
    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.factor()?;
        self.skip_ws();
        if self.peek() == Some(b'=') {
            self.pos += 1;
            let rhs = self.factor()?;
            return Ok(Expr::Equals(Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    /// factor := field-ref | string-literal | function-call
    fn factor(&mut self) -> Result<Expr, ParseError> {
        self.skip_ws();
        match self.peek() {
            Some(b'[') => self.field_ref(),
            Some(b'"') => self.string_literal(),
            Some(b) if b.is_ascii_alphabetic() => self.function_call(),
            Some(_) => Err(ParseError::new(
                self.pos,
                format!("expected a field, literal or function, found {:?}", self.rest_preview()),
            )),
            None => Err(ParseError::new(self.pos, "unexpected end of formula")),
        }
    }

    /// field-ref := '[' name ']' - the name is everything up to the bracket.
    fn field_ref(&mut self) -> Result<Expr, ParseError> {
        let start = self.pos;
        self.pos += 1; // '['
        let name_start = self.pos;
        while let Some(b) = self.peek() {
            if b == b']' {
                let name = self.source[name_start..self.pos].trim().to_string();
                self.pos += 1;
                if name.is_empty() {
                    return Err(ParseError::new(start, "empty field reference"));
                }
                return Ok(Expr::Field(name));
            }
            self.pos += 1;
        }
        Err(ParseError::new(start, "unterminated field reference"))
    }

    /// string-literal := '"' chars '"', with `""` escaping a quote.
    fn string_literal(&mut self) -> Result<Expr, ParseError> {
        let start = self.pos;
        self.pos += 1; // '"'
        let mut text = String::new();
        loop {
            match self.peek() {
                Some(b'"') => {
                    self.pos += 1;
                    if self.peek() == Some(b'"') {
                        text.push('"');
                        self.pos += 1;
                    } else {
                        return Ok(Expr::Literal(text));
                    }
                }
                Some(_) => {
                    // Advance one whole character, not one byte.
                    let rest = &self.source[self.pos..];
                    let ch = rest.chars().next().unwrap_or('\0');
                    text.push(ch);
                    self.pos += ch.len_utf8();
                }
                None => return Err(ParseError::new(start, "unterminated string literal")),
            }
        }
    }

    /// function-call := identifier '(' (expression (',' expression)*)? ')'
    fn function_call(&mut self) -> Result<Expr, ParseError> {
        let name_start = self.pos;
        while self
            .peek()
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_')
        {
            self.pos += 1;
        }
        let name = self.source[name_start..self.pos].to_string();
        self.skip_ws();
        if self.peek() != Some(b'(') {
            return Err(ParseError::new(
                self.pos,
                format!("expected '(' after function name {name:?}"),
            ));
        }
        self.pos += 1;
        let mut args = Vec::new();
        self.skip_ws();
        if self.peek() == Some(b')') {
            self.pos += 1;
            return Ok(Expr::Call(name, args));
        }
        loop {
            args.push(self.expression()?);
            self.skip_ws();
            match self.peek() {
                Some(b',') => {
                    self.pos += 1;
                }
                Some(b')') => {
                    self.pos += 1;
                    return Ok(Expr::Call(name, args));
                }
                _ => {
                    return Err(ParseError::new(
                        self.pos,
                        "expected ',' or ')' in argument list",
                    ))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_concatenation() {
        let expr = parse("=UPPER([Name]) & \" - \" & [Status]").unwrap();
        assert_eq!(
            expr,
            Expr::Concat(vec![
                Expr::Call("UPPER".into(), vec![Expr::Field("Name".into())]),
                Expr::Literal(" - ".into()),
                Expr::Field("Status".into()),
            ])
        );
    }

    #[test]
    fn leading_equals_is_optional() {
        assert_eq!(parse("\"x\"").unwrap(), parse("=\"x\"").unwrap());
    }

    #[test]
    fn field_names_may_contain_spaces() {
        assert_eq!(parse("[Due Date]").unwrap(), Expr::Field("Due Date".into()));
    }

    #[test]
    fn doubled_quotes_escape() {
        assert_eq!(
            parse("\"say \"\"hi\"\"\"").unwrap(),
            Expr::Literal("say \"hi\"".into())
        );
    }

    #[test]
    fn equality_between_factors() {
        let expr = parse("[Status] = \"open\"").unwrap();
        assert_eq!(
            expr,
            Expr::Equals(
                Box::new(Expr::Field("Status".into())),
                Box::new(Expr::Literal("open".into()))
            )
        );
    }

    #[test]
    fn nested_calls_and_empty_args() {
        let expr = parse("IF([Done] = \"yes\", UPPER([Name]), TODAY())").unwrap();
        match expr {
            Expr::Call(name, args) => {
                assert_eq!(name, "IF");
                assert_eq!(args.len(), 3);
                assert!(matches!(args[2], Expr::Call(ref n, ref a) if n == "TODAY" && a.is_empty()));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn errors_carry_byte_offsets() {
        let err = parse("=UPPER([Name]").unwrap_err();
        assert_eq!(err.offset, 7);

        let err = parse("=\"open").unwrap_err();
        assert_eq!(err.offset, 1);

        let err = parse("=LOWER [x]").unwrap_err();
        assert!(err.message.contains("expected '('"));
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        assert!(parse("[a] [b]").is_err());
    }
}
