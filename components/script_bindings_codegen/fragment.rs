/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Building blocks for generated text.
//!
//! [`Fragment`] is a small tree that renders to text; indentation and
//! dedentation happen here and nowhere else. [`Template`] is a code fragment with
//! a `${val}` hole that is filled in when a conversion is instantiated for a
//! concrete value.

use std::fmt;

use crate::error::{Error, Result};

const INDENT: usize = 4;

/// Prefixes every non-empty line of `text` with `depth` spaces.
pub fn indent(text: &str, depth: usize) -> String {
    let prefix = " ".repeat(depth);
    text.split_inclusive('\n')
        .map(|line| {
            if line.trim().is_empty() {
                line.trim_start_matches(' ').to_owned()
            } else {
                format!("{prefix}{line}")
            }
        })
        .collect()
}

/// Drops one leading newline and the indentation shared by all non-blank lines.
pub fn dedent(text: &str) -> String {
    let text = text.strip_prefix('\n').unwrap_or(text);
    let common = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start_matches(' ').len())
        .min()
        .unwrap_or(0);
    text.split_inclusive('\n')
        .map(|line| {
            if line.trim().is_empty() {
                line.trim_start_matches(' ')
            } else {
                &line[common..]
            }
        })
        .collect()
}

/// Fills a code template.
///
/// The template is dedented first. `${name}` is replaced inline. A line holding
/// nothing but `$*{name}` is replaced by the (multi-line) value, re-indented to
/// the placeholder's column; an empty value removes the line. `$$` produces a
/// literal `$`, so `$${val}` survives as the conversion hole `${val}`.
pub fn fill(template: &str, substitutions: &[(&str, &str)]) -> Result<String> {
    let template = dedent(template);
    let mut out = String::with_capacity(template.len());
    for line in template.split_inclusive('\n') {
        let body = line.trim_end_matches('\n');
        let trimmed = body.trim_start();
        if let Some(name) = trimmed
            .strip_prefix("$*{")
            .and_then(|rest| rest.strip_suffix('}'))
        {
            let value = lookup(substitutions, name)?.trim_end_matches('\n');
            if value.is_empty() {
                continue;
            }
            out.push_str(&indent(value, body.len() - trimmed.len()));
            if line.ends_with('\n') {
                out.push('\n');
            }
            continue;
        }
        substitute_inline(line, substitutions, &mut out)?;
    }
    Ok(out)
}

fn lookup<'a>(substitutions: &[(&str, &'a str)], name: &str) -> Result<&'a str> {
    substitutions
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, value)| *value)
        .ok_or_else(|| Error::UnknownPlaceholder {
            placeholder: name.to_owned(),
        })
}

fn substitute_inline(line: &str, substitutions: &[(&str, &str)], out: &mut String) -> Result<()> {
    let mut rest = line;
    while let Some(position) = rest.find('$') {
        out.push_str(&rest[..position]);
        rest = &rest[position..];
        if let Some(after) = rest.strip_prefix("$$") {
            out.push('$');
            rest = after;
        } else if let Some(after) = rest.strip_prefix("${") {
            let Some(end) = after.find('}') else {
                return Err(Error::UnknownPlaceholder {
                    placeholder: after.to_owned(),
                });
            };
            out.push_str(lookup(substitutions, &after[..end])?);
            rest = &after[end + 1..];
        } else {
            out.push('$');
            rest = &rest[1..];
        }
    }
    out.push_str(rest);
    Ok(())
}

/// A node of generated text.
#[derive(Clone, Debug, PartialEq)]
pub enum Fragment {
    Text(String),
    /// Items joined by `joiner`; items rendering empty are skipped.
    List { items: Vec<Fragment>, joiner: String },
    Wrapped {
        pre: String,
        inner: Box<Fragment>,
        post: String,
    },
    Indented { inner: Box<Fragment>, depth: usize },
    Dedented(Box<Fragment>),
}

impl Fragment {
    pub fn text(text: impl Into<String>) -> Fragment {
        Fragment::Text(text.into())
    }

    pub fn empty() -> Fragment {
        Fragment::Text(String::new())
    }

    pub fn list(items: impl IntoIterator<Item = Fragment>, joiner: &str) -> Fragment {
        Fragment::List {
            items: items.into_iter().collect(),
            joiner: joiner.to_owned(),
        }
    }

    /// Items on consecutive lines.
    pub fn lines(items: impl IntoIterator<Item = Fragment>) -> Fragment {
        Fragment::list(items, "\n")
    }

    pub fn wrap(self, pre: &str, post: &str) -> Fragment {
        Fragment::Wrapped {
            pre: pre.to_owned(),
            inner: Box::new(self),
            post: post.to_owned(),
        }
    }

    pub fn indented(self) -> Fragment {
        self.indented_by(INDENT)
    }

    pub fn indented_by(self, depth: usize) -> Fragment {
        Fragment::Indented {
            inner: Box::new(self),
            depth,
        }
    }

    pub fn dedented(self) -> Fragment {
        Fragment::Dedented(Box::new(self))
    }

    /// Appends to a list, turning any other node into a line list first.
    pub fn push(&mut self, item: Fragment) {
        match self {
            Fragment::List { items, .. } => items.push(item),
            _ => {
                let previous = std::mem::replace(self, Fragment::empty());
                *self = Fragment::lines([previous, item]);
            },
        }
    }

    pub fn prepend(&mut self, item: Fragment) {
        match self {
            Fragment::List { items, .. } => items.insert(0, item),
            _ => {
                let previous = std::mem::replace(self, Fragment::empty());
                *self = Fragment::lines([item, previous]);
            },
        }
    }

    /// `{pre}{` newline, indented body, `}{post}`.
    pub fn block(pre: &str, body: Fragment, post: &str) -> Fragment {
        Fragment::lines([
            Fragment::text(format!("{pre}{{")),
            body.indented(),
            Fragment::text(format!("}}{post}")),
        ])
    }

    pub fn if_then(condition: &str, body: Fragment) -> Fragment {
        Fragment::block(&format!("if {condition} "), body, "")
    }

    pub fn if_else(condition: &str, if_true: Fragment, if_false: Fragment) -> Fragment {
        Fragment::lines([
            Fragment::text(format!("if {condition} {{")),
            if_true.indented(),
            Fragment::text("} else {"),
            if_false.indented(),
            Fragment::text("}"),
        ])
    }

    /// A `match` over `expression` with one block arm per case.
    pub fn match_arms(
        expression: &str,
        arms: impl IntoIterator<Item = (String, Fragment)>,
        default: Option<Fragment>,
    ) -> Fragment {
        let mut body = Fragment::lines([]);
        for (pattern, arm) in arms.into_iter().chain(default.map(|d| ("_".to_owned(), d))) {
            body.push(Fragment::block(&format!("{pattern} => "), arm, ","));
        }
        Fragment::block(&format!("match {expression} "), body, "")
    }

    pub fn is_empty(&self) -> bool {
        self.render().is_empty()
    }

    pub fn render(&self) -> String {
        match self {
            Fragment::Text(text) => text.clone(),
            Fragment::List { items, joiner } => {
                let rendered: Vec<String> = items
                    .iter()
                    .map(Fragment::render)
                    .filter(|text| !text.is_empty())
                    .collect();
                rendered.join(joiner)
            },
            Fragment::Wrapped { pre, inner, post } => {
                let inner = inner.render();
                if inner.is_empty() && pre.is_empty() && post.is_empty() {
                    return String::new();
                }
                format!("{pre}{inner}{post}")
            },
            Fragment::Indented { inner, depth } => indent(&inner.render(), *depth),
            Fragment::Dedented(inner) => dedent(&inner.render()),
        }
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<String> for Fragment {
    fn from(text: String) -> Fragment {
        Fragment::Text(text)
    }
}

impl From<&str> for Fragment {
    fn from(text: &str) -> Fragment {
        Fragment::Text(text.to_owned())
    }
}

const VALUE_HOLE: &str = "${val}";

#[derive(Clone, Debug, PartialEq)]
enum Piece {
    Text(String),
    Value,
}

/// A conversion code fragment with holes for the incoming script value.
///
/// The only hole is `${val}`, a `HandleValue` expression; any other `${...}`
/// is rejected when the template is parsed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Template {
    pieces: Vec<Piece>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Template> {
        let mut pieces = Vec::new();
        let mut rest = source;
        while let Some(start) = rest.find("${") {
            if !rest[start..].starts_with(VALUE_HOLE) {
                let after = &rest[start + 2..];
                let name = after.split('}').next().unwrap_or(after);
                return Err(Error::UnknownPlaceholder {
                    placeholder: name.to_owned(),
                });
            }
            if start > 0 {
                pieces.push(Piece::Text(rest[..start].to_owned()));
            }
            pieces.push(Piece::Value);
            rest = &rest[start + VALUE_HOLE.len()..];
        }
        if !rest.is_empty() {
            pieces.push(Piece::Text(rest.to_owned()));
        }
        Ok(Template { pieces })
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    pub fn hole_count(&self) -> usize {
        self.pieces
            .iter()
            .filter(|piece| matches!(piece, Piece::Value))
            .count()
    }

    /// Replaces every hole with `value`.
    pub fn substitute(&self, value: &str) -> String {
        self.pieces
            .iter()
            .map(|piece| match piece {
                Piece::Text(text) => text.as_str(),
                Piece::Value => value,
            })
            .collect()
    }

    /// Applies `f` to the source text, keeping the holes intact.
    pub fn map(&self, f: impl FnOnce(&str) -> String) -> Result<Template> {
        Template::parse(&f(&self.to_string()))
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for piece in &self.pieces {
            match piece {
                Piece::Text(text) => f.write_str(text)?,
                Piece::Value => f.write_str(VALUE_HOLE)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_reindents_block_placeholders() {
        let body = "let a = 1;\nlet b = 2;\n";
        let filled = fill(
            "
            fn f() {
                $*{body}
            }
            ",
            &[("body", body)],
        )
        .unwrap();
        assert_eq!(filled, "fn f() {\n    let a = 1;\n    let b = 2;\n}\n");
    }

    #[test]
    fn fill_removes_empty_block_placeholders() {
        let filled = fill("a\n$*{nothing}\nb\n", &[("nothing", "")]).unwrap();
        assert_eq!(filled, "a\nb\n");
    }

    #[test]
    fn fill_keeps_escaped_holes() {
        let filled = fill("${name}($${val})", &[("name", "convert")]).unwrap();
        assert_eq!(filled, "convert(${val})");
    }

    #[test]
    fn fill_rejects_unknown_placeholders() {
        assert_eq!(
            fill("${missing}", &[]),
            Err(Error::UnknownPlaceholder {
                placeholder: "missing".to_owned()
            })
        );
    }

    #[test]
    fn lists_skip_empty_items() {
        let list = Fragment::list(
            [Fragment::text("a"), Fragment::empty(), Fragment::text("b")],
            ", ",
        );
        assert_eq!(list.render(), "a, b");
    }

    #[test]
    fn if_else_indents_both_branches() {
        let fragment = Fragment::if_else(
            "cond",
            Fragment::text("one();"),
            Fragment::text("two();\nthree();"),
        );
        assert_eq!(
            fragment.render(),
            "if cond {\n    one();\n} else {\n    two();\n    three();\n}"
        );
    }

    #[test]
    fn dedent_strips_common_indentation() {
        assert_eq!(dedent("\n    a\n      b\n\n    c\n"), "a\n  b\n\nc\n");
    }

    #[test]
    fn template_substitutes_every_hole() {
        let template = Template::parse("convert(${val}, ${val}.get())").unwrap();
        assert_eq!(template.hole_count(), 2);
        assert_eq!(template.substitute("v"), "convert(v, v.get())");
        assert_eq!(template.to_string(), "convert(${val}, ${val}.get())");
    }

    #[test]
    fn template_rejects_unknown_hole_names() {
        assert_eq!(
            Template::parse("${value}"),
            Err(Error::UnknownPlaceholder {
                placeholder: "value".to_owned()
            })
        );
    }
}
