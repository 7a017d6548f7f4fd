// Copyright 2026 Quarry Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! String condition operators
//!
//! [`StrNeedle`] packages a condition's needle with everything
//! precomputed at build time: upper/lower foldings for the
//! case-insensitive forms (so the scan never re-folds the needle), a
//! compiled regex for `like` patterns, and a substring finder for
//! case-sensitive containment.
//!
//! Case folding is byte-wise ASCII: a haystack byte matches when it
//! equals the needle byte's upper or lower form. Non-ASCII bytes fold
//! to themselves and compare exactly.

use std::fmt;
use std::sync::Arc;

use memchr::memmem;
use regex::Regex;

/// Three-valued condition result
///
/// `Unknown` marks a condition that is undefined because an operand is
/// null. It is never a match, and negation does not turn it into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tri {
    Match,
    NoMatch,
    Unknown,
}

impl Tri {
    pub fn from_bool(matched: bool) -> Tri {
        if matched {
            Tri::Match
        } else {
            Tri::NoMatch
        }
    }

    pub fn is_match(self) -> bool {
        self == Tri::Match
    }

    /// Kleene negation
    pub fn negate(self) -> Tri {
        match self {
            Tri::Match => Tri::NoMatch,
            Tri::NoMatch => Tri::Match,
            Tri::Unknown => Tri::Unknown,
        }
    }
}

/// String condition operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrOp {
    Equal,
    NotEqual,
    BeginsWith,
    EndsWith,
    Contains,
    Like,
}

impl StrOp {
    /// Infix form used by query descriptions; `[c]` marks the
    /// case-insensitive variant
    pub fn symbol(self, case_sensitive: bool) -> &'static str {
        match (self, case_sensitive) {
            (StrOp::Equal, true) => "==",
            (StrOp::Equal, false) => "==[c]",
            (StrOp::NotEqual, true) => "!=",
            (StrOp::NotEqual, false) => "!=[c]",
            (StrOp::BeginsWith, true) => "BEGINSWITH",
            (StrOp::BeginsWith, false) => "BEGINSWITH[c]",
            (StrOp::EndsWith, true) => "ENDSWITH",
            (StrOp::EndsWith, false) => "ENDSWITH[c]",
            (StrOp::Contains, true) => "CONTAINS",
            (StrOp::Contains, false) => "CONTAINS[c]",
            (StrOp::Like, true) => "LIKE",
            (StrOp::Like, false) => "LIKE[c]",
        }
    }
}

/// A string needle with precomputed match machinery
#[derive(Clone)]
pub struct StrNeedle {
    value: Option<Arc<str>>,
    op: StrOp,
    case_sensitive: bool,
    /// Byte-wise upper/lower foldings of the needle (case-insensitive
    /// forms only)
    upper: Box<[u8]>,
    lower: Box<[u8]>,
    /// Compiled `like` pattern
    pattern: Option<Regex>,
    /// Case-sensitive substring finder
    finder: Option<memmem::Finder<'static>>,
}

impl fmt::Debug for StrNeedle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrNeedle")
            .field("value", &self.value)
            .field("op", &self.op)
            .field("case_sensitive", &self.case_sensitive)
            .finish()
    }
}

impl StrNeedle {
    pub fn new(value: Option<Arc<str>>, op: StrOp, case_sensitive: bool) -> Self {
        let needle = value.as_deref().unwrap_or("");
        let (upper, lower): (Box<[u8]>, Box<[u8]>) = if case_sensitive {
            (Box::from(&[][..]), Box::from(&[][..]))
        } else {
            (
                needle.bytes().map(|b| b.to_ascii_uppercase()).collect(),
                needle.bytes().map(|b| b.to_ascii_lowercase()).collect(),
            )
        };
        let pattern = (op == StrOp::Like && value.is_some())
            .then(|| compile_like(needle, case_sensitive))
            .flatten();
        let finder = (op == StrOp::Contains && case_sensitive && value.is_some())
            .then(|| memmem::Finder::new(needle.as_bytes()).into_owned());
        StrNeedle {
            value,
            op,
            case_sensitive,
            upper,
            lower,
            pattern,
            finder,
        }
    }

    pub fn value(&self) -> Option<&Arc<str>> {
        self.value.as_ref()
    }

    pub fn op(&self) -> StrOp {
        self.op
    }

    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// Evaluate against a cell
    pub fn matches(&self, hay: Option<&str>) -> Tri {
        let Some(needle) = self.value.as_deref() else {
            // Null needle: equality is a null test, patterns match nothing
            return match self.op {
                StrOp::Equal => Tri::from_bool(hay.is_none()),
                StrOp::NotEqual => Tri::from_bool(hay.is_some()),
                _ => Tri::NoMatch,
            };
        };
        let Some(hay) = hay else {
            return match self.op {
                StrOp::Equal => Tri::NoMatch,
                StrOp::NotEqual => Tri::Match,
                _ => Tri::Unknown,
            };
        };
        let matched = match self.op {
            StrOp::Equal => self.eq_fold(hay, needle),
            StrOp::NotEqual => !self.eq_fold(hay, needle),
            StrOp::BeginsWith => {
                if self.case_sensitive {
                    hay.starts_with(needle)
                } else {
                    hay.len() >= self.upper.len()
                        && self.bytes_fold_eq(&hay.as_bytes()[..self.upper.len()])
                }
            }
            StrOp::EndsWith => {
                if self.case_sensitive {
                    hay.ends_with(needle)
                } else if hay.len() < self.upper.len() {
                    false
                } else {
                    self.bytes_fold_eq(&hay.as_bytes()[hay.len() - self.upper.len()..])
                }
            }
            StrOp::Contains => {
                if let Some(finder) = &self.finder {
                    finder.find(hay.as_bytes()).is_some()
                } else {
                    self.contains_fold(hay.as_bytes())
                }
            }
            StrOp::Like => self
                .pattern
                .as_ref()
                .map(|re| re.is_match(hay))
                .unwrap_or(false),
        };
        Tri::from_bool(matched)
    }

    fn eq_fold(&self, hay: &str, needle: &str) -> bool {
        if self.case_sensitive {
            hay == needle
        } else {
            hay.len() == self.upper.len() && self.bytes_fold_eq(hay.as_bytes())
        }
    }

    /// Byte-wise comparison of `bytes` against the needle foldings;
    /// `bytes` must already have the needle's length
    fn bytes_fold_eq(&self, bytes: &[u8]) -> bool {
        bytes.len() == self.upper.len()
            && bytes
                .iter()
                .zip(self.upper.iter().zip(self.lower.iter()))
                .all(|(&b, (&u, &l))| b == u || b == l)
    }

    fn contains_fold(&self, hay: &[u8]) -> bool {
        let n = self.upper.len();
        if n == 0 {
            return true;
        }
        if hay.len() < n {
            return false;
        }
        (0..=hay.len() - n).any(|at| self.bytes_fold_eq(&hay[at..at + n]))
    }
}

/// Compile a `like` pattern the SQL way: `%` matches any run, `_` any
/// single character, everything else literally
fn compile_like(pattern: &str, case_sensitive: bool) -> Option<Regex> {
    let mut regex_pattern = String::with_capacity(pattern.len() * 2 + 8);
    if !case_sensitive {
        regex_pattern.push_str("(?i)");
    }
    regex_pattern.push('^');
    for c in pattern.chars() {
        match c {
            '%' => regex_pattern.push_str(".*"),
            '_' => regex_pattern.push('.'),
            '.' | '+' | '*' | '?' | '^' | '$' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '\\' => {
                regex_pattern.push('\\');
                regex_pattern.push(c);
            }
            _ => regex_pattern.push(c),
        }
    }
    regex_pattern.push('$');
    Regex::new(&regex_pattern).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn needle(value: &str, op: StrOp, case_sensitive: bool) -> StrNeedle {
        StrNeedle::new(Some(Arc::from(value)), op, case_sensitive)
    }

    #[test]
    fn begins_with_case_insensitive() {
        let n = needle("an", StrOp::BeginsWith, false);
        assert_eq!(n.matches(Some("ann")), Tri::Match);
        assert_eq!(n.matches(Some("ANNA")), Tri::Match);
        assert_eq!(n.matches(Some("bert")), Tri::NoMatch);
        assert_eq!(n.matches(Some("a")), Tri::NoMatch);
        assert_eq!(n.matches(None), Tri::Unknown);
    }

    #[test]
    fn contains_uses_finder() {
        let n = needle("oh", StrOp::Contains, true);
        assert_eq!(n.matches(Some("john")), Tri::Match);
        assert_eq!(n.matches(Some("JOHN")), Tri::NoMatch);
        let ci = needle("oh", StrOp::Contains, false);
        assert_eq!(ci.matches(Some("JOHN")), Tri::Match);
    }

    #[test]
    fn like_wildcards() {
        let n = needle("J_n%", StrOp::Like, true);
        assert_eq!(n.matches(Some("Jon")), Tri::Match);
        assert_eq!(n.matches(Some("Jannet")), Tri::NoMatch);
        assert_eq!(n.matches(Some("Jinx")), Tri::Match);
        let ci = needle("j%N", StrOp::Like, false);
        assert_eq!(ci.matches(Some("JoHN")), Tri::Match);
    }

    #[test]
    fn null_needle_is_a_null_test() {
        let n = StrNeedle::new(None, StrOp::Equal, true);
        assert_eq!(n.matches(None), Tri::Match);
        assert_eq!(n.matches(Some("x")), Tri::NoMatch);
        let ne = StrNeedle::new(None, StrOp::NotEqual, true);
        assert_eq!(ne.matches(Some("x")), Tri::Match);
        assert_eq!(ne.matches(None), Tri::NoMatch);
    }

    #[test]
    fn ends_with_folding() {
        let n = needle("NA", StrOp::EndsWith, false);
        assert_eq!(n.matches(Some("anna")), Tri::Match);
        assert_eq!(n.matches(Some("ann")), Tri::NoMatch);
    }
}
