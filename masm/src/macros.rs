use crate::error::{Error, ErrorKind, Result};
use crate::lexer;
use crate::text::Line;
use std::collections::HashMap;

/* Macros

`.macro name %a %b` starts a definition; the raw lines up to `.end_macro`
are its body. An invocation is expanded textually: every
whitespace-delimited body token equal to a formal is replaced by the
corresponding actual, and the resulting lines are spliced into the line
buffer right after the invocation for pass 1 to scan.
*/

pub const MAX_MACRO_PARAMS: usize = 32;

/// Longest allowed actual argument, matching the symbol-name limit.
const MAX_ACTUAL_LEN: usize = 31;

#[derive(Clone, Debug)]
pub struct Macro {
    pub name: String,
    /// Formal parameter tokens, `%` included.
    pub params: Vec<String>,
    pub body: Vec<Line>,
}

impl Macro {
    /// Parses the remainder of a `.macro` line: the name, then the
    /// formals. The body starts empty.
    pub fn from_header(rest: &str) -> Result<Macro> {
        let mut tokens = rest.split(' ').filter(|token| !token.is_empty());
        let name = tokens.next().ok_or_else(|| Error::new(ErrorKind::InvalidArgs))?;
        if !lexer::valid_symbol(name) {
            return Err(Error::new(ErrorKind::InvalidSymbol(name.to_owned())));
        }

        let mut params = Vec::new();
        for token in tokens {
            let valid = token.len() > 1
                && token.starts_with('%')
                && token[1..].chars().all(|c| c.is_ascii_alphanumeric());
            if !valid {
                return Err(Error::new(ErrorKind::InvalidArg(token.to_owned())));
            }
            params.push(token.to_owned());
        }
        if params.len() > MAX_MACRO_PARAMS {
            return Err(Error::new(ErrorKind::InvalidArgs)
                .with_context(format!("macros take at most {} parameters", MAX_MACRO_PARAMS)));
        }

        Ok(Macro {
            name: name.to_owned(),
            params,
            body: Vec::new(),
        })
    }

    /// Substitutes `actuals` for the formals throughout the body,
    /// producing fresh lines tagged with the invocation site.
    pub fn expand(&self, actuals: &[String], site: &Line) -> Result<Vec<Line>> {
        if actuals.len() != self.params.len() {
            return Err(Error::new(ErrorKind::InvalidArgs)
                .with_context(format!(
                    "macro \"{}\" takes {} arguments, got {}",
                    self.name,
                    self.params.len(),
                    actuals.len()
                )));
        }
        for actual in actuals {
            if actual.len() > MAX_ACTUAL_LEN {
                return Err(Error::new(ErrorKind::Size(actual.clone())));
            }
        }

        let lines = self
            .body
            .iter()
            .map(|line| {
                let substituted: Vec<&str> = line
                    .text
                    .split(' ')
                    .map(|token| match self.params.iter().position(|p| p == token) {
                        Some(index) => actuals[index].as_str(),
                        None => token,
                    })
                    .collect();
                Line::new(&site.filename, site.number, substituted.join(" "))
            })
            .collect();
        Ok(lines)
    }
}

#[derive(Debug, Default)]
pub struct MacroTable {
    macros: HashMap<String, Macro>,
}

impl MacroTable {
    pub fn new() -> MacroTable {
        MacroTable::default()
    }

    pub fn define(&mut self, mac: Macro) -> Result<()> {
        if self.macros.contains_key(&mac.name) {
            return Err(Error::new(ErrorKind::Duplicate(mac.name)));
        }
        self.macros.insert(mac.name.clone(), mac);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Macro> {
        self.macros.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use matches::assert_matches;

    fn line(text: &str) -> Line {
        Line::new("m.s", 1, text.to_owned())
    }

    fn sample() -> Macro {
        let mut mac = Macro::from_header("inc %r %amount").unwrap();
        mac.body.push(line("addi %r %r %amount"));
        mac
    }

    #[test]
    fn header_parsing() {
        let mac = sample();
        assert_eq!(mac.name, "inc");
        assert_eq!(mac.params, ["%r", "%amount"]);

        assert_matches!(Macro::from_header(""), Err(_));
        assert_matches!(Macro::from_header("bad name %"), Err(_));
        assert_matches!(Macro::from_header("m notpercent"), Err(_));
    }

    #[test]
    fn expansion_substitutes_whole_tokens() {
        let mac = sample();
        let site = Line::new("use.s", 7, "inc $t0 5".to_owned());
        let out = mac
            .expand(&["$t0".to_owned(), "5".to_owned()], &site)
            .unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "addi $t0 $t0 5");
        assert_eq!(out[0].filename, "use.s");
        assert_eq!(out[0].number, 7);
    }

    #[test]
    fn expansion_is_context_free() {
        let mac = sample();
        let actuals = ["$s1".to_owned(), "-1".to_owned()];
        let a = mac.expand(&actuals, &line("inc $s1 -1")).unwrap();
        let b = mac
            .expand(&actuals, &Line::new("other.s", 99, "inc $s1 -1".to_owned()))
            .unwrap();
        assert_eq!(
            a.iter().map(|l| &l.text).collect::<Vec<_>>(),
            b.iter().map(|l| &l.text).collect::<Vec<_>>()
        );
    }

    #[test]
    fn expansion_arity_check() {
        let mac = sample();
        assert_matches!(mac.expand(&["$t0".to_owned()], &line("inc $t0")), Err(_));
    }

    #[test]
    fn duplicate_definition() {
        let mut table = MacroTable::new();
        table.define(sample()).unwrap();
        assert_matches!(
            table.define(sample()),
            Err(Error {
                kind: ErrorKind::Duplicate(_),
                ..
            })
        );
    }
}
