//! Shared tokenizer for every input syntax.
//!
//! Tokens borrow from the input and keep their byte offset, so parsers can
//! slice the original text between two tokens (conditions and expressions
//! are stored as text in the query model).

use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_while, take_while1},
    character::complete::{char, digit1, multispace1, one_of},
    combinator::{map, opt, recognize, value},
    multi::many0,
    sequence::pair,
    IResult, Parser,
};

use super::errors::ParserError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifiers, keywords and qualified names (`p.name`, `$gt`)
    Word,
    /// Quoted literal, quotes included
    Text,
    Number,
    Symbol,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub start: usize,
}

impl Token<'_> {
    pub fn end(&self) -> usize {
        self.start + self.text.len()
    }

    pub fn is(&self, symbol: &str) -> bool {
        self.kind == TokenKind::Symbol && self.text == symbol
    }

    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(keyword)
    }

    pub fn is_open(&self) -> bool {
        self.kind == TokenKind::Symbol && matches!(self.text, "(" | "[" | "{")
    }

    pub fn is_close(&self) -> bool {
        self.kind == TokenKind::Symbol && matches!(self.text, ")" | "]" | "}")
    }
}

fn block_comment(input: &str) -> IResult<&str, &str> {
    recognize((tag("/*"), take_until("*/"), tag("*/"))).parse(input)
}

fn skip(input: &str) -> IResult<&str, ()> {
    value((), many0(alt((multispace1, block_comment)))).parse(input)
}

fn quoted(input: &str) -> IResult<&str, &str> {
    alt((
        recognize((char('\''), take_while(|c| c != '\''), char('\''))),
        recognize((char('"'), take_while(|c| c != '"'), char('"'))),
    ))
    .parse(input)
}

fn number(input: &str) -> IResult<&str, &str> {
    recognize(pair(digit1, opt(pair(char('.'), digit1)))).parse(input)
}

fn word(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_alphabetic() || c == '_' || c == '$'),
        take_while(|c: char| c.is_alphanumeric() || c == '_' || c == '$' || c == '.'),
    ))
    .parse(input)
}

fn symbol(input: &str) -> IResult<&str, &str> {
    alt((
        tag("<-"),
        tag("->"),
        tag("<>"),
        tag(">="),
        tag("<="),
        tag("!="),
        recognize(one_of("()[]{},:?^@*=<>-+/%|;.#!")),
    ))
    .parse(input)
}

fn token(input: &str) -> IResult<&str, (TokenKind, &str)> {
    alt((
        map(quoted, |t| (TokenKind::Text, t)),
        map(number, |t| (TokenKind::Number, t)),
        map(word, |t| (TokenKind::Word, t)),
        map(symbol, |t| (TokenKind::Symbol, t)),
    ))
    .parse(input)
}

/// Split `input` into tokens, skipping blanks and `/* */` comments.
pub fn tokenize(input: &str) -> Result<Vec<Token<'_>>, ParserError> {
    let mut tokens = Vec::new();
    let mut rest = input;
    loop {
        if let Ok((remaining, ())) = skip(rest) {
            rest = remaining;
        }
        if rest.is_empty() {
            break;
        }
        let start = input.len() - rest.len();
        match token(rest) {
            Ok((remaining, (kind, text))) => {
                tokens.push(Token { kind, text, start });
                rest = remaining;
            }
            Err(_) => {
                let bad = rest.chars().next().unwrap_or_default();
                if bad == '\'' || bad == '"' {
                    return Err(ParserError::UnbalancedBrackets(bad));
                }
                return Err(ParserError::UnexpectedToken {
                    token: bad.to_string(),
                    offset: start,
                });
            }
        }
    }
    log::trace!("tokenized {} tokens", tokens.len());
    Ok(tokens)
}

fn closing(open: &str) -> &'static str {
    match open {
        "(" => ")",
        "[" => "]",
        _ => "}",
    }
}

/// Index of the bracket closing the one at `open`.
pub fn matching_close(tokens: &[Token<'_>], open: usize) -> Result<usize, ParserError> {
    let mut stack: Vec<&str> = Vec::new();
    for (i, token) in tokens.iter().enumerate().skip(open) {
        if token.is_open() {
            stack.push(closing(token.text));
        } else if token.is_close() {
            match stack.pop() {
                Some(expected) if expected == token.text => {
                    if stack.is_empty() {
                        return Ok(i);
                    }
                }
                _ => return Err(ParserError::UnbalancedBrackets(first_char(token.text))),
            }
        }
    }
    let open_char = tokens.get(open).map_or('(', |t| first_char(t.text));
    Err(ParserError::UnbalancedBrackets(open_char))
}

/// Verify that every bracket is closed by its own kind.
pub fn check_balance(tokens: &[Token<'_>]) -> Result<(), ParserError> {
    let mut stack: Vec<(&str, char)> = Vec::new();
    for token in tokens {
        if token.is_open() {
            stack.push((closing(token.text), first_char(token.text)));
        } else if token.is_close() {
            match stack.pop() {
                Some((expected, _)) if expected == token.text => {}
                _ => return Err(ParserError::UnbalancedBrackets(first_char(token.text))),
            }
        }
    }
    match stack.pop() {
        Some((_, open)) => Err(ParserError::UnbalancedBrackets(open)),
        None => Ok(()),
    }
}

fn first_char(text: &str) -> char {
    text.chars().next().unwrap_or_default()
}

/// Indices of the tokens at bracket depth zero.
pub fn top_level(tokens: &[Token<'_>]) -> Vec<usize> {
    let mut depth = 0i32;
    let mut result = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        if token.is_close() {
            depth -= 1;
        }
        if depth == 0 {
            result.push(i);
        }
        if token.is_open() {
            depth += 1;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<(TokenKind, &str)> {
        tokenize(text)
            .unwrap()
            .into_iter()
            .map(|t| (t.kind, t.text))
            .collect()
    }

    #[test]
    fn test_tokens() {
        assert_eq!(
            kinds("p.price >= 4.5 AND name = 'a b' /* note */"),
            vec![
                (TokenKind::Word, "p.price"),
                (TokenKind::Symbol, ">="),
                (TokenKind::Number, "4.5"),
                (TokenKind::Word, "AND"),
                (TokenKind::Word, "name"),
                (TokenKind::Symbol, "="),
                (TokenKind::Text, "'a b'"),
            ]
        );
    }

    #[test]
    fn test_arrows() {
        let tokens = kinds("(a)-->(b)<--(c)");
        let symbols: Vec<&str> = tokens.iter().map(|(_, t)| *t).collect();
        assert_eq!(
            symbols,
            vec!["(", "a", ")", "-", "->", "(", "b", ")", "<-", "-", "(", "c", ")"]
        );
    }

    #[test]
    fn test_offsets() {
        let text = "db.Product.find({})";
        let tokens = tokenize(text).unwrap();
        assert_eq!(tokens[0].text, "db.Product.find");
        assert_eq!(&text[tokens[1].start..tokens[1].end()], "(");
    }

    #[test]
    fn test_brackets() {
        let tokens = tokenize("f({a: [1, 2]}, {b: 1})").unwrap();
        assert_eq!(matching_close(&tokens, 1).unwrap(), tokens.len() - 1);
        assert!(check_balance(&tokens).is_ok());
        let tokens = tokenize("f({a: [1, 2}").unwrap();
        assert_eq!(check_balance(&tokens), Err(ParserError::UnbalancedBrackets('}')));
        assert!(matches!(
            tokenize("name = 'open"),
            Err(ParserError::UnbalancedBrackets('\''))
        ));
    }
}
