//
// source_index/condition.rs
//
// Preprocessor condition evaluation (#if, #elif, #importif)
//

use thiserror::Error;

use super::symbols::SymbolSet;

/// Parsed preprocessor condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Symbol(String),
    Not(Box<Condition>),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
    Eq(Box<Condition>, Box<Condition>),
    Ne(Box<Condition>, Box<Condition>),
}

impl Condition {
    /// Evaluate against a symbol set. A symbol reference is true iff it is defined.
    pub fn evaluate(&self, symbols: &SymbolSet) -> bool {
        match self {
            Condition::Symbol(name) => symbols.contains(name),
            Condition::Not(inner) => !inner.evaluate(symbols),
            Condition::And(l, r) => l.evaluate(symbols) && r.evaluate(symbols),
            Condition::Or(l, r) => l.evaluate(symbols) || r.evaluate(symbols),
            Condition::Eq(l, r) => l.evaluate(symbols) == r.evaluate(symbols),
            Condition::Ne(l, r) => l.evaluate(symbols) != r.evaluate(symbols),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    #[error("empty condition")]
    Empty,
    #[error("unexpected character '{found}' at offset {offset}")]
    UnexpectedChar { found: char, offset: usize },
    #[error("unexpected end of condition at offset {offset}")]
    UnexpectedEnd { offset: usize },
    #[error("missing ')' for '(' at offset {offset}")]
    UnbalancedParen { offset: usize },
    #[error("unexpected trailing input at offset {offset}")]
    TrailingInput { offset: usize },
}

/// Parse and evaluate a condition in one step.
pub fn evaluate(expr: &str, symbols: &SymbolSet) -> Result<bool, ConditionError> {
    Ok(parse_condition(expr)?.evaluate(symbols))
}

/// Parse a condition expression.
///
/// Grammar (lowest to highest binding):
///   or      := and ('||' and)*
///   and     := eq ('&&' eq)*
///   eq      := unary (('==' | '!=') unary)*
///   unary   := '!' unary | primary
///   primary := IDENT | '(' or ')'
pub fn parse_condition(expr: &str) -> Result<Condition, ConditionError> {
    let mut parser = ConditionParser {
        src: expr.as_bytes(),
        pos: 0,
    };
    parser.skip_ws();
    if parser.at_end() {
        return Err(ConditionError::Empty);
    }
    let cond = parser.parse_or()?;
    parser.skip_ws();
    if !parser.at_end() {
        return Err(ConditionError::TrailingInput { offset: parser.pos });
    }
    Ok(cond)
}

struct ConditionParser<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> ConditionParser<'a> {
    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn skip_ws(&mut self) {
        while self.pos < self.src.len() && self.src[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn eat2(&mut self, c1: u8, c2: u8) -> bool {
        self.skip_ws();
        if self.pos + 1 < self.src.len() && self.src[self.pos] == c1 && self.src[self.pos + 1] == c2
        {
            self.pos += 2;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<Condition, ConditionError> {
        let mut left = self.parse_and()?;
        while self.eat2(b'|', b'|') {
            let right = self.parse_and()?;
            left = Condition::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Condition, ConditionError> {
        let mut left = self.parse_equality()?;
        while self.eat2(b'&', b'&') {
            let right = self.parse_equality()?;
            left = Condition::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Condition, ConditionError> {
        let mut left = self.parse_unary()?;
        loop {
            if self.eat2(b'=', b'=') {
                let right = self.parse_unary()?;
                left = Condition::Eq(Box::new(left), Box::new(right));
            } else if self.eat2(b'!', b'=') {
                let right = self.parse_unary()?;
                left = Condition::Ne(Box::new(left), Box::new(right));
            } else {
                return Ok(left);
            }
        }
    }

    fn parse_unary(&mut self) -> Result<Condition, ConditionError> {
        self.skip_ws();
        // `!=` is handled by parse_equality, so a lone `!` here is negation
        if self.src.get(self.pos) == Some(&b'!') && self.src.get(self.pos + 1) != Some(&b'=') {
            self.pos += 1;
            let inner = self.parse_unary()?;
            return Ok(Condition::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Condition, ConditionError> {
        self.skip_ws();
        let Some(&ch) = self.src.get(self.pos) else {
            return Err(ConditionError::UnexpectedEnd { offset: self.pos });
        };

        if ch == b'(' {
            let open = self.pos;
            self.pos += 1;
            let inner = self.parse_or()?;
            self.skip_ws();
            if self.src.get(self.pos) != Some(&b')') {
                return Err(ConditionError::UnbalancedParen { offset: open });
            }
            self.pos += 1;
            return Ok(inner);
        }

        if ch.is_ascii_alphabetic() || ch == b'_' {
            let start = self.pos;
            while self.pos < self.src.len()
                && (self.src[self.pos].is_ascii_alphanumeric() || self.src[self.pos] == b'_')
            {
                self.pos += 1;
            }
            let name = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
            return Ok(Condition::Symbol(name));
        }

        let found = std::str::from_utf8(&self.src[self.pos..])
            .ok()
            .and_then(|s| s.chars().next())
            .unwrap_or(ch as char);
        Err(ConditionError::UnexpectedChar {
            found,
            offset: self.pos,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn syms(names: &[&str]) -> SymbolSet {
        SymbolSet::new(names.iter().copied())
    }

    #[test]
    fn test_symbol_reference() {
        assert!(evaluate("DEBUG", &syms(&["DEBUG"])).unwrap());
        assert!(!evaluate("DEBUG", &syms(&["RELEASE"])).unwrap());
    }

    #[test]
    fn test_not_and_or() {
        let s = syms(&["A", "B"]);
        assert!(evaluate("A && B", &s).unwrap());
        assert!(!evaluate("A && !B", &s).unwrap());
        assert!(evaluate("!C || A", &s).unwrap());
        assert!(evaluate("!!A", &s).unwrap());
    }

    #[test]
    fn test_equality_compares_truth_values() {
        let s = syms(&["A"]);
        assert!(evaluate("A == A", &s).unwrap());
        assert!(evaluate("A != B", &s).unwrap());
        assert!(evaluate("B == C", &s).unwrap());
        assert!(!evaluate("A == B", &s).unwrap());
    }

    #[test]
    fn test_parentheses_override_grouping() {
        let s = syms(&["A"]);
        // && binds tighter than ||
        assert!(evaluate("A || B && C", &s).unwrap());
        assert!(!evaluate("(A || B) && C", &s).unwrap());
    }

    #[test]
    fn test_parse_tree_shape() {
        let cond = parse_condition("!A && (B || C)").unwrap();
        assert_eq!(
            cond,
            Condition::And(
                Box::new(Condition::Not(Box::new(Condition::Symbol("A".into())))),
                Box::new(Condition::Or(
                    Box::new(Condition::Symbol("B".into())),
                    Box::new(Condition::Symbol("C".into())),
                )),
            )
        );
    }

    #[test]
    fn test_malformed_expressions() {
        let s = SymbolSet::empty();
        assert_eq!(evaluate("", &s), Err(ConditionError::Empty));
        assert_eq!(evaluate("   ", &s), Err(ConditionError::Empty));
        assert_eq!(
            evaluate("(A && B", &s),
            Err(ConditionError::UnbalancedParen { offset: 0 })
        );
        assert_eq!(
            evaluate("A &&", &s),
            Err(ConditionError::UnexpectedEnd { offset: 4 })
        );
        assert_eq!(
            evaluate("A B", &s),
            Err(ConditionError::TrailingInput { offset: 2 })
        );
        assert!(matches!(
            evaluate("A & B", &s),
            Err(ConditionError::TrailingInput { .. })
        ));
        assert!(matches!(
            evaluate("1 == A", &s),
            Err(ConditionError::UnexpectedChar { found: '1', .. })
        ));
    }

    #[test]
    fn test_error_messages() {
        let err = evaluate("(A", &SymbolSet::empty()).unwrap_err();
        assert_eq!(err.to_string(), "missing ')' for '(' at offset 0");
    }
}
