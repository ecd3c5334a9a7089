use std::fmt::Debug;
use std::iter::Peekable;

#[derive(Debug, Clone, Fail)]
pub enum LexerError {
    #[fail(display = "unexpected character {:?} on line {}", c, i)]
    UnexpectedChar { i: usize, c: String },
    #[fail(display = "malformed number {:?} on line {}", _1, _0)]
    Number(usize, String),
}

#[derive(Debug, Clone, Fail)]
pub enum ParseError {
    #[fail(display = "unexpected token {} at position {}", _1, _0)]
    UnexpectedToken(usize, String),
    #[fail(display = "unexpected end of input")]
    UnexpectedEOF,
    #[fail(display = "no alternative matched: {:?}", _0)]
    Many(Vec<ParseError>),
}

pub type Rule<'a, T, Token> = &'a dyn Fn(&mut usize, &[Token]) -> Result<T, ParseError>;

/// Tries each rule from the same position and returns the first success.
pub fn alt<T, Token: PartialEq + Debug + Clone>(i: &mut usize, tokens: &[Token],
                                                alts: &[Rule<T, Token>]) -> Result<T, ParseError> {
    let start = *i;
    let mut errs = Vec::new();
    for alt in alts {
        *i = start;
        match alt(i, tokens) {
            Ok(x) => return Ok(x),
            Err(y) => errs.push(y),
        }
    }
    Err(ParseError::Many(errs))
}

pub fn must_match<Token: PartialEq + Debug + Clone>(i: &mut usize, tokens: &[Token], tok: Token) -> Result<(), ParseError> {
    if matches(i, tokens, tok) {
        Ok(())
    } else {
        match tokens.get(*i) {
            Some(t) => Err(ParseError::UnexpectedToken(*i, format!("{:?}", t))),
            None => Err(ParseError::UnexpectedEOF),
        }
    }
}

pub fn matches<Token: PartialEq + Debug + Clone>(i: &mut usize, tokens: &[Token], tok: Token) -> bool {
    let r = tokens.get(*i) == Some(&tok);
    if r {
        *i += 1;
    }
    r
}

pub fn consume_while<I, F>(it: &mut Peekable<I>, x: F) -> Vec<char>
    where I: Iterator<Item = char>, F: Fn(char) -> bool
{
    let mut v: Vec<char> = vec![];
    while let Some(&ch) = it.peek() {
        if x(ch) {
            it.next();
            v.push(ch);
        } else {
            break;
        }
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alt_restarts_each_rule() {
        let toks = vec![1, 2, 3];
        let mut i = 0;
        let r = alt(&mut i, &toks, &[
            &|i: &mut usize, t: &[i32]| { must_match(i, t, 1)?; must_match(i, t, 3)?; Ok("a") },
            &|i: &mut usize, t: &[i32]| { must_match(i, t, 1)?; must_match(i, t, 2)?; Ok("b") },
        ]).unwrap();
        assert_eq!(r, "b");
        assert_eq!(i, 2);
        assert!(!matches(&mut i, &toks, 9));
        match must_match(&mut 5, &toks, 1) {
            Err(ParseError::UnexpectedEOF) => {}
            x => panic!("unexpected {:?}", x),
        }
    }

    #[test]
    fn consume_while_stops_at_first_mismatch() {
        let mut it = "abc12".chars().peekable();
        let v: String = consume_while(&mut it, |c| c.is_alphabetic()).into_iter().collect();
        assert_eq!(v, "abc");
        assert_eq!(it.next(), Some('1'));
    }
}
