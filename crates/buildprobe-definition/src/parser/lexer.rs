//! Line classification of definition text using `nom`.
//!
//! A definition is a header block of `Key: value` lines followed by
//! `%section` blocks. Blank lines are dropped everywhere; `#` comments only
//! in the header block, since script bodies may legitimately start with `#`.

use nom::{
    IResult, Parser,
    bytes::complete::take_while1,
    character::complete::{char, space0},
    combinator::rest,
    sequence::{preceded, separated_pair},
};

/// One meaningful line of a definition file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line<'a> {
    /// `Key: value` in the header block.
    Header {
        /// Header key as written.
        key: &'a str,
        /// Trimmed header value.
        value: &'a str,
    },
    /// `%name` opening a section.
    Section(&'a str),
    /// A body line of the current section, trimmed.
    Body(&'a str),
    /// A line in the header block that is not `Key: value`.
    Stray(&'a str),
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn section_tag(input: &str) -> IResult<&str, &str> {
    preceded(char('%'), take_while1(is_word_char)).parse(input)
}

fn header_field(input: &str) -> IResult<&str, (&str, &str)> {
    separated_pair(take_while1(is_word_char), (char(':'), space0), rest).parse(input)
}

/// Splits definition text into classified lines.
pub fn tokenize(input: &str) -> Vec<Line<'_>> {
    let mut lines = Vec::new();
    let mut in_sections = false;

    for raw in input.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if let Ok((_, name)) = section_tag(line) {
            in_sections = true;
            lines.push(Line::Section(name));
            continue;
        }
        if in_sections {
            lines.push(Line::Body(line));
            continue;
        }
        if line.starts_with('#') {
            continue;
        }
        match header_field(line) {
            Ok((_, (key, value))) => lines.push(Line::Header {
                key,
                value: value.trim(),
            }),
            Err(_) => lines.push(Line::Stray(line)),
        }
    }
    lines
}
