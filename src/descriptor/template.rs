//! Single-pass scanner for SCPI command templates.
//!
//! A template is literal text with `{NAME}` placeholders. Braces do not nest
//! and cannot be escaped; a stray `{` or `}` is a compile error.

use std::collections::BTreeSet;

use serde::{Serialize, Serializer};

use super::error::DescriptorError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Placeholder { name: String },
}

/// A scanned command template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, DescriptorError> {
        let segments = Scanner::new(source).scan()?;
        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Distinct placeholder names.
    pub fn placeholder_names(&self) -> BTreeSet<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Placeholder { name, .. } => Some(name.as_str()),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    /// Rebuild the template with every placeholder replaced by `value_of(name)`.
    ///
    /// Returns the first name for which `value_of` yields nothing.
    pub fn substitute<'v, F>(&self, mut value_of: F) -> Result<String, &str>
    where
        F: FnMut(&str) -> Option<&'v str>,
    {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder { name, .. } => {
                    let value = value_of(name).ok_or(name.as_str())?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

impl Serialize for Template {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

struct Scanner<'a> {
    source: &'a str,
    segments: Vec<Segment>,
    literal_start: usize,
}

impl<'a> Scanner<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            segments: Vec::new(),
            literal_start: 0,
        }
    }

    fn scan(mut self) -> Result<Vec<Segment>, DescriptorError> {
        let mut open: Option<usize> = None;

        for (pos, ch) in self.source.char_indices() {
            match (ch, open) {
                ('{', None) => {
                    self.flush_literal(pos);
                    open = Some(pos);
                }
                ('{', Some(start)) => {
                    return Err(DescriptorError::malformed_template(
                        pos,
                        format!("nested '{{' inside placeholder opened at byte {start}"),
                    ));
                }
                ('}', Some(start)) => {
                    self.push_placeholder(start, pos)?;
                    open = None;
                    self.literal_start = pos + 1;
                }
                ('}', None) => {
                    return Err(DescriptorError::malformed_template(pos, "unmatched '}'"));
                }
                _ => {}
            }
        }

        if let Some(start) = open {
            return Err(DescriptorError::malformed_template(start, "unclosed '{'"));
        }
        self.flush_literal(self.source.len());
        Ok(self.segments)
    }

    fn flush_literal(&mut self, end: usize) {
        if let Some(text) = self.source.get(self.literal_start..end) {
            if !text.is_empty() {
                self.segments.push(Segment::Literal(text.to_string()));
            }
        }
    }

    /// `open` and `close` are the byte offsets of the braces.
    fn push_placeholder(&mut self, open: usize, close: usize) -> Result<(), DescriptorError> {
        let name = self
            .source
            .get(open + 1..close)
            .map(str::trim)
            .unwrap_or_default();
        if name.is_empty() {
            return Err(DescriptorError::malformed_template(open, "empty placeholder '{}'"));
        }
        self.segments.push(Segment::Placeholder {
            name: name.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::panic)]
mod tests {
    use super::*;

    fn names(src: &str) -> Vec<String> {
        Template::parse(src)
            .unwrap()
            .placeholder_names()
            .into_iter()
            .map(String::from)
            .collect()
    }

    #[test]
    fn no_placeholders() {
        let t = Template::parse("MEAS:VOLT?").unwrap();
        assert!(t.placeholder_names().is_empty());
        assert_eq!(t.segments(), &[Segment::Literal("MEAS:VOLT?".into())]);
    }

    #[test]
    fn placeholders_and_literals() {
        let t = Template::parse("{CH}:BSWV FRQ,{FREQ}").unwrap();
        assert_eq!(
            t.segments(),
            &[
                Segment::Placeholder { name: "CH".into() },
                Segment::Literal(":BSWV FRQ,".into()),
                Segment::Placeholder { name: "FREQ".into() },
            ]
        );
        assert_eq!(names("{CH}:BSWV FRQ,{FREQ}"), ["CH", "FREQ"]);
    }

    #[test]
    fn repeated_placeholder_counts_once() {
        assert_eq!(names("SOUR{N}:FREQ {F};SOUR{N}:OUTP ON"), ["F", "N"]);
    }

    #[test]
    fn placeholder_whitespace_is_trimmed() {
        assert_eq!(names("VOLT { V }"), ["V"]);
    }

    #[test]
    fn adjacent_placeholders() {
        let t = Template::parse("{A}{B}").unwrap();
        assert_eq!(t.segments().len(), 2);
    }

    #[test]
    fn unicode_literal_offsets() {
        let t = Template::parse("µ{X}Ω").unwrap();
        assert_eq!(t.substitute(|_| Some("1")).unwrap(), "µ1Ω");
    }

    #[test]
    fn malformed_braces() {
        let cases = [
            ("VOLT {V", 5),
            ("VOLT V}", 6),
            ("{A{B}}", 2),
            ("VOLT {}", 5),
            ("VOLT {  }", 5),
        ];
        for (src, expected_offset) in cases {
            match Template::parse(src) {
                Err(DescriptorError::MalformedTemplate { offset, .. }) => {
                    assert_eq!(offset, expected_offset, "{src}");
                }
                other => panic!("{src}: expected MalformedTemplate, got {other:?}"),
            }
        }
    }

    #[test]
    fn substitute_reports_first_unbound_name() {
        let t = Template::parse("{A},{B}").unwrap();
        let err = t
            .substitute(|name| (name == "A").then_some("1"))
            .unwrap_err();
        assert_eq!(err, "B");
    }

    #[test]
    fn serializes_as_source_text() {
        let t = Template::parse("VOLT {V}").unwrap();
        assert_eq!(serde_json::to_string(&t).unwrap(), "\"VOLT {V}\"");
    }
}
