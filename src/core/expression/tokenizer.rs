//! Expression tokenizer
//!
//! Splits expression text into numbers, variables and delimiters. Subscript
//! sugar (`NAME[SUB]`) is rewritten to `ARRAY(NAME,SUB)` before scanning, so
//! the compiler only ever sees function-call syntax.

use crate::error::SyntaxError;
use regex::Regex;

/// Characters that end an identifier or number.
pub const DELIMITERS: &[u8] = b"+-/*%^=()>,<! \t\0";

pub fn is_delimiter(c: u8) -> bool {
    DELIMITERS.contains(&c)
}

fn is_blank(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\0')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    /// Bare `=`; only meaningful as the assignment split.
    Assign,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    /// Bare `!`, which is not an operator on its own.
    Bang,
    OpenParen,
    CloseParen,
    Comma,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Variable(String),
    Delimiter(Delimiter),
    /// End-of-input sentinel.
    End,
}

/// A token and the byte offset it starts at.
#[derive(Debug, Clone, PartialEq)]
pub struct Lexeme {
    pub token: Token,
    pub position: usize,
}

pub struct Tokenizer<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
    /// Last non-blank byte consumed, for negative-literal folding.
    previous: Option<u8>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            bytes: text.as_bytes(),
            pos: 0,
            previous: None,
        }
    }

    /// Scan the whole text. The last lexeme is always [`Token::End`].
    pub fn tokenize(mut self) -> Result<Vec<Lexeme>, SyntaxError> {
        let mut lexemes = Vec::new();
        loop {
            let lexeme = self.next_lexeme()?;
            let done = lexeme.token == Token::End;
            lexemes.push(lexeme);
            if done {
                return Ok(lexemes);
            }
        }
    }

    pub fn next_lexeme(&mut self) -> Result<Lexeme, SyntaxError> {
        self.skip_blanks();
        let position = self.pos;

        let Some(c) = self.peek() else {
            return Ok(Lexeme {
                token: Token::End,
                position,
            });
        };

        let token = if c == b'-' && self.starts_negative_literal() {
            self.read_number()?
        } else if c.is_ascii_digit() || c == b'.' {
            self.read_number()?
        } else if c.is_ascii_alphabetic() || c == b'$' || c == b'@' {
            self.read_identifier()
        } else if is_delimiter(c) {
            Token::Delimiter(self.read_delimiter(c))
        } else {
            let ch = self.text[position..].chars().next().unwrap_or('?');
            return Err(SyntaxError::malformed(
                format!("unexpected character '{ch}'"),
                position,
            ));
        };

        self.previous = self.pos.checked_sub(1).map(|i| self.bytes[i]);
        Ok(Lexeme { token, position })
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_next(&self) -> Option<u8> {
        self.bytes.get(self.pos + 1).copied()
    }

    fn skip_blanks(&mut self) {
        while self.peek().is_some_and(is_blank) {
            self.pos += 1;
        }
    }

    /// `-` folds into a literal when a digit or `.` follows and nothing that
    /// could be a left operand precedes it.
    fn starts_negative_literal(&self) -> bool {
        let digit_follows = self
            .peek_next()
            .is_some_and(|c| c.is_ascii_digit() || c == b'.');
        let operand_precedes = match self.previous {
            None => false,
            Some(b')') => true,
            Some(p) => !is_delimiter(p),
        };
        digit_follows && !operand_precedes
    }

    fn read_number(&mut self) -> Result<Token, SyntaxError> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        while let Some(c) = self.peek() {
            let exponent_sign = (c == b'-' || c == b'+')
                && matches!(self.bytes[self.pos - 1], b'e' | b'E')
                && self.pos - 1 > start;
            if is_delimiter(c) && !exponent_sign {
                break;
            }
            self.pos += 1;
        }
        let literal = &self.text[start..self.pos];
        literal
            .parse::<f64>()
            .map(Token::Number)
            .map_err(|_| SyntaxError::malformed(format!("invalid number '{literal}'"), start))
    }

    fn read_identifier(&mut self) -> Token {
        let start = self.pos;
        while self.peek().is_some_and(|c| !is_delimiter(c)) {
            self.pos += 1;
        }
        Token::Variable(self.text[start..self.pos].to_string())
    }

    fn read_delimiter(&mut self, c: u8) -> Delimiter {
        self.pos += 1;
        let followed_by_eq = self.peek() == Some(b'=');
        let two_char = |d: Delimiter, this: &mut Self| {
            this.pos += 1;
            d
        };
        match c {
            b'+' => Delimiter::Plus,
            b'-' => Delimiter::Minus,
            b'*' => Delimiter::Star,
            b'/' => Delimiter::Slash,
            b'%' => Delimiter::Percent,
            b'^' => Delimiter::Caret,
            b'(' => Delimiter::OpenParen,
            b')' => Delimiter::CloseParen,
            b',' => Delimiter::Comma,
            b'=' if followed_by_eq => two_char(Delimiter::Equal, self),
            b'=' => Delimiter::Assign,
            b'!' if followed_by_eq => two_char(Delimiter::NotEqual, self),
            b'!' => Delimiter::Bang,
            b'<' if followed_by_eq => two_char(Delimiter::LessEqual, self),
            b'<' => Delimiter::Less,
            b'>' if followed_by_eq => two_char(Delimiter::GreaterEqual, self),
            _ => Delimiter::Greater,
        }
    }
}

/// Rewrite every `NAME[SUB]` into `ARRAY(NAME,SUB)`, innermost first.
pub fn rewrite_subscripts(text: &str) -> Result<String, SyntaxError> {
    let pattern = Regex::new(r"[A-Za-z$@][^ \t\x00+\-/*%^=()<>,!\[\]]*\[")
        .map_err(|e| SyntaxError::malformed(format!("subscript pattern: {e}"), 0))?;

    let mut text = text.to_string();
    while let Some(found) = pattern.find_iter(&text).last() {
        let open = found.end() - 1;
        let close = matching_bracket(&text, open)?;
        let name = &text[found.start()..open];
        let subscript = &text[open + 1..close];
        text = format!(
            "{}ARRAY({},{}){}",
            &text[..found.start()],
            name,
            subscript,
            &text[close + 1..]
        );
    }

    if let Some(position) = text.find(&['[', ']'][..]) {
        return Err(SyntaxError::malformed(
            "subscript must follow a matrix name",
            position,
        ));
    }
    Ok(text)
}

fn matching_bracket(text: &str, open: usize) -> Result<usize, SyntaxError> {
    let mut depth = 0usize;
    for (i, c) in text.bytes().enumerate().skip(open) {
        match c {
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(i);
                }
            }
            _ => {}
        }
    }
    Err(SyntaxError::malformed("unmatched '['", open))
}

/// Parentheses must balance before any token is consumed.
pub fn check_balance(text: &str) -> Result<(), SyntaxError> {
    let mut depth = 0usize;
    let mut last_open = 0;
    for (i, c) in text.bytes().enumerate() {
        match c {
            b'(' => {
                depth += 1;
                last_open = i;
            }
            b')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or(SyntaxError::UnbalancedParentheses { position: i })?;
            }
            _ => {}
        }
    }
    if depth == 0 {
        Ok(())
    } else {
        Err(SyntaxError::UnbalancedParentheses {
            position: last_open,
        })
    }
}

/// Pre-pass plus scan.
pub fn tokenize(text: &str) -> Result<Vec<Lexeme>, SyntaxError> {
    let rewritten = rewrite_subscripts(text)?;
    Tokenizer::new(&rewritten).tokenize()
}

/// Every identifier in `text` that is not a reserved function name.
pub fn variable_names(text: &str) -> Result<Vec<String>, SyntaxError> {
    use super::instruction::Opcode;

    Ok(tokenize(text)?
        .into_iter()
        .filter_map(|lexeme| match lexeme.token {
            Token::Variable(name) if Opcode::function(&name).is_none() => Some(name),
            _ => None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(text: &str) -> Vec<Token> {
        tokenize(text)
            .unwrap()
            .into_iter()
            .map(|l| l.token)
            .collect()
    }

    fn var(name: &str) -> Token {
        Token::Variable(name.to_string())
    }

    fn delim(d: Delimiter) -> Token {
        Token::Delimiter(d)
    }

    #[test]
    fn test_tokenize_numbers() {
        assert_eq!(tokens("42"), vec![Token::Number(42.0), Token::End]);
        assert_eq!(tokens(".5"), vec![Token::Number(0.5), Token::End]);
        assert_eq!(tokens("1.5e-3"), vec![Token::Number(1.5e-3), Token::End]);
    }

    #[test]
    fn test_tokenize_identifier_prefixes() {
        assert_eq!(
            tokens("$orig + @income - @@age"),
            vec![
                var("$orig"),
                delim(Delimiter::Plus),
                var("@income"),
                delim(Delimiter::Minus),
                var("@@age"),
                Token::End,
            ]
        );
    }

    #[test]
    fn test_identifier_runs_to_next_delimiter() {
        assert_eq!(
            tokens("dest.pop_density*2"),
            vec![
                var("dest.pop_density"),
                delim(Delimiter::Star),
                Token::Number(2.0),
                Token::End,
            ]
        );
    }

    #[test]
    fn test_leading_minus_is_literal() {
        assert_eq!(
            tokens("-5+3"),
            vec![Token::Number(-5.0), delim(Delimiter::Plus), Token::Number(3.0), Token::End]
        );
    }

    #[test]
    fn test_minus_after_operand_is_operator() {
        assert_eq!(
            tokens("3-5"),
            vec![Token::Number(3.0), delim(Delimiter::Minus), Token::Number(5.0), Token::End]
        );
        assert_eq!(
            tokens("x -5"),
            vec![var("x"), delim(Delimiter::Minus), Token::Number(5.0), Token::End]
        );
        assert_eq!(
            tokens("(1)-5"),
            vec![
                delim(Delimiter::OpenParen),
                Token::Number(1.0),
                delim(Delimiter::CloseParen),
                delim(Delimiter::Minus),
                Token::Number(5.0),
                Token::End,
            ]
        );
    }

    #[test]
    fn test_minus_after_delimiter_is_literal() {
        assert_eq!(
            tokens("3-(-5)"),
            vec![
                Token::Number(3.0),
                delim(Delimiter::Minus),
                delim(Delimiter::OpenParen),
                Token::Number(-5.0),
                delim(Delimiter::CloseParen),
                Token::End,
            ]
        );
        assert_eq!(
            tokens("2*-.5"),
            vec![Token::Number(2.0), delim(Delimiter::Star), Token::Number(-0.5), Token::End]
        );
    }

    #[test]
    fn test_minus_before_identifier_stays_operator() {
        assert_eq!(tokens("-x"), vec![delim(Delimiter::Minus), var("x"), Token::End]);
    }

    #[test]
    fn test_two_char_relational_operators() {
        assert_eq!(
            tokens("a==b!=c<=d>=e<f>g"),
            vec![
                var("a"),
                delim(Delimiter::Equal),
                var("b"),
                delim(Delimiter::NotEqual),
                var("c"),
                delim(Delimiter::LessEqual),
                var("d"),
                delim(Delimiter::GreaterEqual),
                var("e"),
                delim(Delimiter::Less),
                var("f"),
                delim(Delimiter::Greater),
                var("g"),
                Token::End,
            ]
        );
    }

    #[test]
    fn test_bare_equals_and_bang() {
        assert_eq!(
            tokens("x = !y"),
            vec![var("x"), delim(Delimiter::Assign), delim(Delimiter::Bang), var("y"), Token::End]
        );
    }

    #[test]
    fn test_positions_are_byte_offsets() {
        let lexemes = tokenize("ab + 12").unwrap();
        let positions: Vec<usize> = lexemes.iter().map(|l| l.position).collect();
        assert_eq!(positions, vec![0, 3, 5, 7]);
    }

    #[test]
    fn test_empty_input_yields_sentinel_only() {
        assert_eq!(tokens(""), vec![Token::End]);
        assert_eq!(tokens(" \t "), vec![Token::End]);
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize("a # b").unwrap_err();
        assert!(matches!(err, SyntaxError::Malformed { position: 2, .. }));
    }

    #[test]
    fn test_invalid_number() {
        let err = tokenize("2abc").unwrap_err();
        assert!(err.to_string().contains("invalid number"));
    }

    #[test]
    fn test_rewrite_simple_subscript() {
        assert_eq!(rewrite_subscripts("IVT[PER]").unwrap(), "ARRAY(IVT,PER)");
        assert_eq!(
            rewrite_subscripts("0.5*ivt[2]+wait[1]").unwrap(),
            "0.5*ARRAY(ivt,2)+ARRAY(wait,1)"
        );
    }

    #[test]
    fn test_rewrite_nested_subscript() {
        assert_eq!(
            rewrite_subscripts("a[b[1]+1]").unwrap(),
            "ARRAY(a,ARRAY(b,1)+1)"
        );
    }

    #[test]
    fn test_rewrite_rejects_orphan_brackets() {
        assert!(rewrite_subscripts("ivt[1").is_err());
        assert!(rewrite_subscripts("(a)[1]").is_err());
        assert!(rewrite_subscripts("a]").is_err());
    }

    #[test]
    fn test_check_balance() {
        assert!(check_balance("(1+(2*3))").is_ok());
        assert_eq!(
            check_balance("(1+2"),
            Err(SyntaxError::UnbalancedParentheses { position: 0 })
        );
        assert_eq!(
            check_balance("1+2)"),
            Err(SyntaxError::UnbalancedParentheses { position: 3 })
        );
    }

    #[test]
    fn test_variable_names_skip_functions() {
        let names = variable_names("max(ivt, wait[PER]) + LN(cost)").unwrap();
        assert_eq!(names, vec!["ivt", "wait", "PER", "cost"]);
    }
}
