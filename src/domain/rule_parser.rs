//! Rule DSL parser.
//!
//! Recursive descent parser for the rule grammar:
//!
//! ```text
//! rule     := cmp | between | AND(rule, ...) | OR(rule, ...) | NOT(rule)
//! cmp      := (ABOVE | BELOW | AT_LEAST | AT_MOST)(operand, operand)
//! between  := BETWEEN(operand, number, number)
//! operand  := number | close | volume | ma_short | ma_mid | ma_long
//!           | ma_mid_prev | ma_mid_slope | bb_upper | bb_middle | bb_lower
//!           | rsi | volume_ratio | prior_volume_ratio | disparity
//!           | band_distance
//! ```
//!
//! Keywords are upper case; operand names are case-insensitive. Errors carry
//! the character offset of the offending token.

use crate::domain::error::ParseError;
use crate::domain::rule::{Operand, Rule};

const COMPARISONS: &[&str] = &["AT_LEAST", "AT_MOST", "ABOVE", "BELOW"];

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.advance();
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            position: self.pos,
        }
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch == expected => {
                self.advance();
                Ok(())
            }
            Some(ch) => Err(self.error(format!("expected '{}', found '{}'", expected, ch))),
            None => Err(self.error(format!("expected '{}', found end of input", expected))),
        }
    }

    fn peek_word(&self) -> &'a str {
        let rest = self.remaining();
        let end = rest
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        &rest[..end]
    }

    fn describe_next(&self) -> String {
        let word = self.peek_word();
        if !word.is_empty() {
            word.to_string()
        } else {
            self.peek()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "end of input".to_string())
        }
    }

    fn parse_number(&mut self) -> Result<f64, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let mut has_dot = false;
        let mut digits = 0;

        if self.peek() == Some('-') {
            self.advance();
        }

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits += 1;
                self.advance();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        if digits == 0 {
            self.pos = start;
            return Err(self.error(format!("expected number, found '{}'", self.describe_next())));
        }

        let num_str = &self.input[start..self.pos];
        num_str.parse::<f64>().map_err(|_| ParseError {
            message: format!("invalid number: {}", num_str),
            position: start,
        })
    }

    fn parse_operand(&mut self) -> Result<Operand, ParseError> {
        self.skip_whitespace();

        if self
            .peek()
            .is_some_and(|ch| ch.is_ascii_digit() || ch == '-' || ch == '.')
        {
            return Ok(Operand::Constant(self.parse_number()?));
        }

        let word = self.peek_word();
        match Operand::from_name(word) {
            Some(operand) => {
                self.pos += word.len();
                Ok(operand)
            }
            None => Err(self.error(format!(
                "expected operand or number, found '{}'",
                self.describe_next()
            ))),
        }
    }

    fn parse_comparison(&mut self, keyword: &str) -> Result<Rule, ParseError> {
        self.pos += keyword.len();
        self.expect_char('(')?;
        let left = self.parse_operand()?;
        self.expect_char(',')?;
        let right = self.parse_operand()?;
        self.expect_char(')')?;

        Ok(match keyword {
            "ABOVE" => Rule::Above { left, right },
            "BELOW" => Rule::Below { left, right },
            "AT_LEAST" => Rule::AtLeast { left, right },
            _ => Rule::AtMost { left, right },
        })
    }

    fn parse_between(&mut self) -> Result<Rule, ParseError> {
        self.pos += "BETWEEN".len();
        self.expect_char('(')?;
        let operand = self.parse_operand()?;
        self.expect_char(',')?;
        self.skip_whitespace();
        let lower_pos = self.pos;
        let lower = self.parse_number()?;
        self.expect_char(',')?;
        let upper = self.parse_number()?;
        self.expect_char(')')?;

        if lower > upper {
            return Err(ParseError {
                message: format!("BETWEEN lower bound {} exceeds upper bound {}", lower, upper),
                position: lower_pos,
            });
        }

        Ok(Rule::Between {
            operand,
            lower,
            upper,
        })
    }

    fn parse_list(&mut self, keyword: &str) -> Result<Vec<Rule>, ParseError> {
        self.pos += keyword.len();
        self.expect_char('(')?;

        let mut rules = vec![self.parse_rule()?];
        loop {
            self.skip_whitespace();
            if self.peek() == Some(')') {
                self.advance();
                break;
            }
            self.expect_char(',')?;
            rules.push(self.parse_rule()?);
        }
        Ok(rules)
    }

    fn parse_not(&mut self) -> Result<Rule, ParseError> {
        self.pos += "NOT".len();
        self.expect_char('(')?;
        let rule = self.parse_rule()?;
        self.expect_char(')')?;
        Ok(Rule::Not(Box::new(rule)))
    }

    fn parse_rule(&mut self) -> Result<Rule, ParseError> {
        self.skip_whitespace();
        let word = self.peek_word();

        if let Some(keyword) = COMPARISONS.iter().find(|k| **k == word) {
            return self.parse_comparison(keyword);
        }
        match word {
            "BETWEEN" => self.parse_between(),
            "AND" => Ok(Rule::And(self.parse_list("AND")?)),
            "OR" => Ok(Rule::Or(self.parse_list("OR")?)),
            "NOT" => self.parse_not(),
            _ => Err(self.error(format!("expected rule, found '{}'", self.describe_next()))),
        }
    }

    fn parse(&mut self) -> Result<Rule, ParseError> {
        let rule = self.parse_rule()?;
        self.skip_whitespace();
        if self.pos < self.input.len() {
            return Err(self.error(format!(
                "unexpected input after rule: '{}'",
                self.remaining()
            )));
        }
        Ok(rule)
    }
}

pub fn parse(input: &str) -> Result<Rule, ParseError> {
    Parser::new(input).parse()
}
