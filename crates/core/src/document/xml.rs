//! Reader and writer for the odML XML layout.
//!
//! Only the subset of XML used by odML files is understood: elements,
//! attributes, character data, CDATA, comments, processing instructions and
//! the five predefined entities. Namespaces and DTD internals are not.

use std::cell::Cell;

use tracing::{debug, warn};

use super::model::{Document, Dtype, Property, Section};
use crate::errors::DocumentError;

/// Format version written into the `<odML>` root element.
pub const ODML_FORMAT_VERSION: &str = "1.1";

// ---------------------------------------------------------------------------
// Element tree
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Element {
    name: String,
    children: Vec<Element>,
    text: String,
    line: usize,
}

impl Element {
    fn child_text(&self, name: &str) -> Option<String> {
        self.children
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.text.trim().to_string())
            .filter(|t| !t.is_empty())
    }
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    origin: &'a str,
    /// Last computed `(pos, line)`, so line numbers are counted incrementally.
    line_mark: Cell<(usize, usize)>,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str, origin: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            origin,
            line_mark: Cell::new((0, 1)),
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn line(&self) -> usize {
        let (mark_pos, mark_line) = match self.line_mark.get() {
            (pos, line) if pos <= self.pos => (pos, line),
            _ => (0, 1),
        };
        let line = mark_line + self.src[mark_pos..self.pos].matches('\n').count();
        self.line_mark.set((self.pos, line));
        line
    }

    fn error(&self, detail: impl Into<String>) -> DocumentError {
        DocumentError::ParseError {
            path: self.origin.to_string(),
            line: self.line(),
            detail: detail.into(),
        }
    }

    fn skip_whitespace(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.src.len() - trimmed.len();
    }

    /// Advance past the next occurrence of `end`.
    fn skip_past(&mut self, end: &str, what: &str) -> Result<&'a str, DocumentError> {
        match self.rest().find(end) {
            Some(idx) => {
                let skipped = &self.rest()[..idx];
                self.pos += idx + end.len();
                Ok(skipped)
            }
            None => Err(self.error(format!("unterminated {}", what))),
        }
    }

    /// Skip the prolog / epilog: whitespace, declarations, comments, doctype.
    fn skip_misc(&mut self) -> Result<(), DocumentError> {
        loop {
            self.skip_whitespace();
            let rest = self.rest();
            if rest.starts_with("<?") {
                self.skip_past("?>", "processing instruction")?;
            } else if rest.starts_with("<!--") {
                self.skip_past("-->", "comment")?;
            } else if rest.starts_with("<!DOCTYPE") {
                self.skip_past(">", "doctype")?;
            } else {
                return Ok(());
            }
        }
    }

    fn read_name(&mut self) -> Result<String, DocumentError> {
        let rest = self.rest();
        let len = rest
            .find(|c: char| c.is_whitespace() || c == '>' || c == '/' || c == '=')
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(self.error("expected a name"));
        }
        self.pos += len;
        Ok(rest[..len].to_string())
    }

    fn expect(&mut self, token: &str) -> Result<(), DocumentError> {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", token)))
        }
    }

    fn parse_document(mut self) -> Result<Element, DocumentError> {
        self.skip_misc()?;
        if !self.rest().starts_with('<') {
            return Err(self.error("no root element"));
        }
        let root = self.parse_element()?;
        self.skip_misc()?;
        if !self.rest().is_empty() {
            return Err(self.error("content after the root element"));
        }
        Ok(root)
    }

    fn parse_element(&mut self) -> Result<Element, DocumentError> {
        let line = self.line();
        self.expect("<")?;
        let name = self.read_name()?;

        // Attributes are accepted but not needed by the odML layout.
        loop {
            self.skip_whitespace();
            if self.rest().starts_with("/>") {
                self.pos += 2;
                return Ok(Element {
                    name,
                    line,
                    ..Element::default()
                });
            }
            if self.rest().starts_with('>') {
                self.pos += 1;
                break;
            }
            self.read_name()?;
            self.skip_whitespace();
            self.expect("=")?;
            self.skip_whitespace();
            let quote = match self.rest().chars().next() {
                Some(q @ ('"' | '\'')) => q,
                _ => return Err(self.error("expected quoted attribute value")),
            };
            self.pos += 1;
            self.skip_past(&quote.to_string(), "attribute value")?;
        }

        let mut element = Element {
            name,
            line,
            ..Element::default()
        };
        loop {
            let rest = self.rest();
            if rest.is_empty() {
                return Err(self.error(format!("unclosed element <{}>", element.name)));
            } else if rest.starts_with("</") {
                self.pos += 2;
                let closing = self.read_name()?;
                if closing != element.name {
                    return Err(self.error(format!(
                        "mismatched closing tag </{}> for <{}>",
                        closing, element.name
                    )));
                }
                self.skip_whitespace();
                self.expect(">")?;
                return Ok(element);
            } else if rest.starts_with("<!--") {
                self.skip_past("-->", "comment")?;
            } else if rest.starts_with("<![CDATA[") {
                self.pos += "<![CDATA[".len();
                let data = self.skip_past("]]>", "CDATA section")?;
                element.text.push_str(data);
            } else if rest.starts_with("<?") {
                self.skip_past("?>", "processing instruction")?;
            } else if rest.starts_with('<') {
                let child = self.parse_element()?;
                element.children.push(child);
            } else {
                let len = rest.find('<').unwrap_or(rest.len());
                let raw = &rest[..len];
                let text = unescape(raw).ok_or_else(|| self.error("unknown entity"))?;
                element.text.push_str(&text);
                self.pos += len;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Parse odML XML into a [`Document`]. `origin` names the source in errors.
pub fn parse_document(xml: &str, origin: &str) -> Result<Document, DocumentError> {
    debug!(origin, bytes = xml.len(), "parsing odML XML");
    let root = Parser::new(xml, origin).parse_document()?;

    if root.name != "odML" {
        return Err(DocumentError::ParseError {
            path: origin.to_string(),
            line: root.line,
            detail: format!("expected <odML> root element, found <{}>", root.name),
        });
    }

    let mut document = Document {
        author: root.child_text("author"),
        date: root.child_text("date"),
        version: root.child_text("version"),
        repository: root.child_text("repository"),
        sections: Vec::new(),
    };
    for child in root.children.iter().filter(|c| c.name == "section") {
        document.sections.push(read_section(child, origin)?);
    }
    Ok(document)
}

fn read_section(element: &Element, origin: &str) -> Result<Section, DocumentError> {
    let name = element.child_text("name").ok_or_else(|| DocumentError::ParseError {
        path: origin.to_string(),
        line: element.line,
        detail: "section without a name".into(),
    })?;

    let mut section = Section {
        name,
        section_type: element.child_text("type"),
        definition: element.child_text("definition"),
        reference: element.child_text("reference"),
        ..Section::default()
    };
    for child in &element.children {
        match child.name.as_str() {
            "property" => section.properties.push(read_property(child, origin)?),
            "section" => section.sections.push(read_section(child, origin)?),
            "name" | "type" | "definition" | "reference" => {}
            other => debug!(element = other, section = %section.name, "ignoring unknown section child"),
        }
    }
    Ok(section)
}

fn read_property(element: &Element, origin: &str) -> Result<Property, DocumentError> {
    let name = element.child_text("name").ok_or_else(|| DocumentError::ParseError {
        path: origin.to_string(),
        line: element.line,
        detail: "property without a name".into(),
    })?;

    let mut values = Vec::new();
    for value in element.children.iter().filter(|c| c.name == "value") {
        values.extend(split_values(value.text.trim()));
    }

    Ok(Property {
        name,
        dtype: element
            .child_text("type")
            .map(|t| Dtype::parse(&t))
            .unwrap_or_default(),
        values,
        unit: element.child_text("unit"),
        uncertainty: element.child_text("uncertainty"),
        definition: element.child_text("definition"),
        reference: element.child_text("reference"),
        value_origin: element.child_text("value_origin"),
    })
}

/// Split the text of a `<value>` element into individual values.
///
/// `[a,b,"c,d"]` yields three values; a bare `a` yields one; `[]` and the
/// empty string yield none. Commas inside quotes or parentheses (tuples) do
/// not split.
fn split_values(text: &str) -> Vec<String> {
    let inner = match text.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
        Some(inner) => inner,
        None if text.is_empty() => return Vec::new(),
        None => return vec![unquote(text).to_string()],
    };

    let mut values = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;
    for ch in inner.chars() {
        match (ch, quote) {
            (c, Some(q)) if c == q => {
                quote = None;
                current.push(c);
            }
            (c, None) if c == '"' || c == '\'' => {
                quote = Some(c);
                current.push(c);
            }
            ('(', None) => {
                depth += 1;
                current.push(ch);
            }
            (')', None) => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            (',', None) if depth == 0 => {
                values.push(unquote(current.trim()).to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if quote.is_some() {
        warn!(value = text, "unterminated quote in odML value list");
    }
    if !current.trim().is_empty() || !values.is_empty() {
        values.push(unquote(current.trim()).to_string());
    }
    values
}

fn unquote(value: &str) -> &str {
    for q in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(q) && value.ends_with(q) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn unescape(raw: &str) -> Option<String> {
    if !raw.contains('&') {
        return Some(raw.to_string());
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(idx) = rest.find('&') {
        out.push_str(&rest[..idx]);
        let after = &rest[idx + 1..];
        let end = after.find(';')?;
        let entity = &after[..end];
        let ch = match entity {
            "amp" => '&',
            "lt" => '<',
            "gt" => '>',
            "quot" => '"',
            "apos" => '\'',
            _ => {
                let code = entity
                    .strip_prefix("#x")
                    .map(|hex| u32::from_str_radix(hex, 16).ok())
                    .unwrap_or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))?;
                char::from_u32(code)?
            }
        };
        out.push(ch);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Some(out)
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Render a [`Document`] as odML XML.
pub fn to_xml(document: &Document) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str(&format!("<odML version=\"{}\">\n", ODML_FORMAT_VERSION));
    write_field(&mut out, 1, "author", document.author.as_deref());
    write_field(&mut out, 1, "date", document.date.as_deref());
    write_field(&mut out, 1, "version", document.version.as_deref());
    write_field(&mut out, 1, "repository", document.repository.as_deref());
    for section in &document.sections {
        write_section(&mut out, 1, section);
    }
    out.push_str("</odML>\n");
    out
}

fn write_section(out: &mut String, depth: usize, section: &Section) {
    let pad = indent(depth);
    out.push_str(&format!("{}<section>\n", pad));
    write_field(out, depth + 1, "name", Some(&section.name));
    write_field(out, depth + 1, "type", section.section_type.as_deref());
    write_field(out, depth + 1, "definition", section.definition.as_deref());
    write_field(out, depth + 1, "reference", section.reference.as_deref());
    for property in &section.properties {
        write_property(out, depth + 1, property);
    }
    for child in &section.sections {
        write_section(out, depth + 1, child);
    }
    out.push_str(&format!("{}</section>\n", pad));
}

fn write_property(out: &mut String, depth: usize, property: &Property) {
    let pad = indent(depth);
    out.push_str(&format!("{}<property>\n", pad));
    write_field(out, depth + 1, "name", Some(&property.name));
    let values = property
        .values
        .iter()
        .map(|v| quote_if_needed(v))
        .collect::<Vec<_>>()
        .join(",");
    write_field(out, depth + 1, "value", Some(&format!("[{}]", values)));
    write_field(out, depth + 1, "type", Some(&property.dtype.to_string()));
    write_field(out, depth + 1, "unit", property.unit.as_deref());
    write_field(out, depth + 1, "uncertainty", property.uncertainty.as_deref());
    write_field(out, depth + 1, "definition", property.definition.as_deref());
    write_field(out, depth + 1, "reference", property.reference.as_deref());
    write_field(out, depth + 1, "value_origin", property.value_origin.as_deref());
    out.push_str(&format!("{}</property>\n", pad));
}

fn write_field(out: &mut String, depth: usize, tag: &str, value: Option<&str>) {
    if let Some(value) = value {
        out.push_str(&format!("{}<{tag}>{}</{tag}>\n", indent(depth), escape(value)));
    }
}

fn indent(depth: usize) -> String {
    "  ".repeat(depth)
}

fn quote_if_needed(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value.contains(',')
        || value.contains('[')
        || value.contains(']')
        || value.trim() != value
        || value.starts_with('"')
        || value.starts_with('\'');
    if !needs_quotes {
        value.to_string()
    } else if value.contains('"') {
        format!("'{}'", value)
    } else {
        format!("\"{}\"", value)
    }
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
