use crate::errors::RepoResult;
use regex::Regex;
use std::fmt::{Display, Formatter};

/// Wildcard character of a pattern descriptor; doubled, it stands for itself.
pub const WILDCARD: char = '%';

/// One piece of a parsed wildcard pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Text that must appear verbatim.
    Literal(String),
    /// Any run of characters, including the empty run.
    Wildcard,
}

/// The reduced form of a pattern, used by backends that have cheaper
/// operators than a full regular expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternShape {
    /// No wildcard at all: the whole value must equal the text.
    Exact(String),
    /// `text%`
    Prefix(String),
    /// `%text`
    Suffix(String),
    /// `%text%`
    Contains(String),
    /// `%` alone; every string matches.
    Any,
    /// Anything else; needs the regular expression.
    Complex,
}

/// A parsed `%` wildcard pattern.
///
/// `%` matches any run of characters and `%%` is a literal percent sign.
/// Percent signs pair left to right, so `%%%` is a literal percent followed by
/// a wildcard. Matching is case-sensitive and anchored at both ends unless the
/// pattern starts or ends with a wildcard.
///
/// # Examples
///
/// ```rust
/// use repobridge::filter::WildcardPattern;
///
/// let pattern = WildcardPattern::parse("jo%n");
/// assert_eq!(pattern.to_regex_source(), "^jo.*n$");
///
/// let pattern = WildcardPattern::parse("100%%");
/// assert_eq!(pattern.to_regex_source(), "^100%$");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WildcardPattern {
    source: String,
    segments: Vec<Segment>,
}

impl WildcardPattern {
    pub fn parse(pattern: &str) -> WildcardPattern {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = pattern.chars().peekable();

        while let Some(c) = chars.next() {
            if c != WILDCARD {
                literal.push(c);
                continue;
            }

            if chars.peek() == Some(&WILDCARD) {
                chars.next();
                literal.push(WILDCARD);
            } else {
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Wildcard);
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        WildcardPattern {
            source: pattern.to_string(),
            segments,
        }
    }

    /// The pattern text as written by the caller.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    fn starts_with_wildcard(&self) -> bool {
        matches!(self.segments.first(), Some(Segment::Wildcard))
    }

    fn ends_with_wildcard(&self) -> bool {
        matches!(self.segments.last(), Some(Segment::Wildcard))
    }

    /// Regular expression equivalent of the pattern; literal text is escaped.
    pub fn to_regex_source(&self) -> String {
        let mut regex = String::new();
        if !self.starts_with_wildcard() {
            regex.push('^');
        }

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => regex.push_str(&regex::escape(text)),
                Segment::Wildcard => regex.push_str(".*"),
            }
        }

        if !self.ends_with_wildcard() {
            regex.push('$');
        }
        regex
    }

    pub fn compile(&self) -> RepoResult<Regex> {
        Ok(Regex::new(&self.to_regex_source())?)
    }

    pub fn shape(&self) -> PatternShape {
        match self.segments.as_slice() {
            [] => PatternShape::Exact(String::new()),
            [Segment::Wildcard] => PatternShape::Any,
            [Segment::Literal(text)] => PatternShape::Exact(text.clone()),
            [Segment::Literal(text), Segment::Wildcard] => PatternShape::Prefix(text.clone()),
            [Segment::Wildcard, Segment::Literal(text)] => PatternShape::Suffix(text.clone()),
            [Segment::Wildcard, Segment::Literal(text), Segment::Wildcard] => {
                PatternShape::Contains(text.clone())
            }
            _ => PatternShape::Complex,
        }
    }

    /// Tests a value against the pattern without going through a regex when
    /// the shape allows it.
    pub fn matches(&self, value: &str) -> RepoResult<bool> {
        Ok(match self.shape() {
            PatternShape::Exact(text) => value == text,
            PatternShape::Prefix(text) => value.starts_with(&text),
            PatternShape::Suffix(text) => value.ends_with(&text),
            PatternShape::Contains(text) => value.contains(&text),
            PatternShape::Any => true,
            PatternShape::Complex => self.compile()?.is_match(value),
        })
    }
}

impl Display for WildcardPattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source)
    }
}
