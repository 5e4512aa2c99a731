use regex::Regex;

use crate::{Error, Result};

/// Decides whether an address may be used as transcoder input or output.
///
/// Block expressions are consulted first; any match rejects. With an
/// empty allow list everything not blocked is accepted, otherwise at
/// least one allow expression must match.
#[derive(Debug, Default)]
pub struct Validator {
    allow: Vec<Regex>,
    block: Vec<Regex>,
}

impl Validator {
    pub fn new(allow: &[String], block: &[String]) -> Result<Self> {
        Ok(Self {
            allow: compile(allow)?,
            block: compile(block)?,
        })
    }

    pub fn is_valid(&self, address: &str) -> bool {
        if self.block.iter().any(|re| re.is_match(address)) {
            return false;
        }
        if self.allow.is_empty() {
            return true;
        }
        self.allow.iter().any(|re| re.is_match(address))
    }
}

fn compile(expressions: &[String]) -> Result<Vec<Regex>> {
    let mut compiled = Vec::new();
    for expression in expressions {
        let expression = expression.trim();
        if expression.is_empty() {
            continue;
        }
        let re = Regex::new(expression).map_err(|source| Error::InvalidExpression {
            expression: expression.to_string(),
            source,
        })?;
        compiled.push(re);
    }
    Ok(compiled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exprs(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_lists_accept_everything() {
        let v = Validator::new(&[], &[]).unwrap();
        assert!(v.is_valid("/data/in.mp4"));
        assert!(v.is_valid("rtmp://example.com/live"));
    }

    #[test]
    fn block_wins_over_allow() {
        let v = Validator::new(&exprs(&["^rtmp://"]), &exprs(&["example\\.com"])).unwrap();
        assert!(!v.is_valid("rtmp://example.com/live"));
        assert!(v.is_valid("rtmp://other.host/live"));
    }

    #[test]
    fn allow_list_restricts() {
        let v = Validator::new(&exprs(&["^https?://", "^/data/"]), &[]).unwrap();
        assert!(v.is_valid("http://example.com/stream"));
        assert!(v.is_valid("/data/out.mp4"));
        assert!(!v.is_valid("file:///etc/passwd"));
    }

    #[test]
    fn blank_expressions_are_skipped() {
        let v = Validator::new(&exprs(&["  ", ""]), &exprs(&[" "])).unwrap();
        assert!(v.is_valid("anything"));
    }

    #[test]
    fn invalid_expression_is_an_error() {
        assert!(Validator::new(&exprs(&["("]), &[]).is_err());
    }
}
