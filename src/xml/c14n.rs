use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Write};
use std::str;

use super::{Error, Result};

type NamespaceMap = BTreeMap<Vec<u8>, Vec<u8>>;

const XML_NAMESPACE: &[u8] = b"http://www.w3.org/XML/1998/namespace";

/// Exclusive XML Canonicalization (without comments).
///
/// `inclusive_ns` is the `PrefixList` of an `InclusiveNamespaces` transform
/// parameter; those prefixes are rendered wherever they are in scope.
pub fn canonicalize(xml: impl AsRef<str>, inclusive_ns: Option<&[&str]>) -> Result<String> {
    let mut reader = Reader::from_str(xml.as_ref());
    reader.config_mut().trim_text(false);
    reader.config_mut().expand_empty_elements = true;

    let mut writer = Writer::new(Cursor::new(Vec::new()));

    let mut declared_stack: Vec<NamespaceMap> = vec![BTreeMap::new()];
    let mut rendered_stack: Vec<NamespaceMap> = vec![BTreeMap::new()];

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let (declared, rendered) = write_start(
                    &mut writer,
                    &e,
                    declared_stack.last(),
                    rendered_stack.last(),
                    inclusive_ns,
                )?;
                declared_stack.push(declared);
                rendered_stack.push(rendered);
            }
            Event::End(e) => {
                writer.write_event(Event::End(e))?;
                declared_stack.pop();
                rendered_stack.pop();
            }
            Event::Text(e) => {
                // Only the document element and its content are canonicalized
                if declared_stack.len() == 1 {
                    continue;
                }
                // Literal line breaks are normalized, character references survive
                let raw = normalize_line_endings(&e);
                let text = unescape(str::from_utf8(&raw)?).map_err(|e| Error::Xml(e.to_string()))?;
                let esc = escape_text_value(text.as_bytes())?;
                writer.write_event(Event::Text(BytesText::from_escaped(esc)))?;
            }
            Event::CData(e) => {
                let raw = e.into_inner();
                let normalized = normalize_line_endings(&raw);
                let esc = escape_text_value(&normalized)?;
                writer.write_event(Event::Text(BytesText::from_escaped(esc)))?;
            }
            Event::Eof => break,
            // Declarations, comments, processing instructions and doctypes are dropped
            _ => {}
        }
    }
    Ok(String::from_utf8(writer.into_inner().into_inner())?)
}

/// Normalize line endings to LF.
fn normalize_line_endings(text: &[u8]) -> Cow<'_, [u8]> {
    if !text.contains(&b'\r') {
        return Cow::Borrowed(text);
    }

    let mut result = Vec::with_capacity(text.len());
    let mut i = 0;
    while i < text.len() {
        if text[i] == b'\r' {
            result.push(b'\n');
            i += if text.get(i + 1) == Some(&b'\n') { 2 } else { 1 };
        } else {
            result.push(text[i]);
            i += 1;
        }
    }
    Cow::Owned(result)
}

fn escape_attr_value(v: &[u8]) -> Result<String> {
    let s = str::from_utf8(v)?;
    let mut out = String::with_capacity(s.len() + s.len() / 4);
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(ch),
        }
    }
    Ok(out)
}

fn escape_text_value(v: &[u8]) -> Result<String> {
    let s = str::from_utf8(v)?;
    let mut out = String::with_capacity(s.len() + s.len() / 4);
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(ch),
        }
    }
    Ok(out)
}

fn prefix_of(qname: &[u8]) -> Option<&[u8]> {
    qname.iter().position(|&b| b == b':').map(|pos| &qname[..pos])
}

/// Writes a canonical start tag and returns the declared and rendered
/// namespace scopes for the element's content.
fn write_start<W: Write>(
    writer: &mut Writer<W>,
    e: &BytesStart,
    parent_declared: Option<&NamespaceMap>,
    parent_rendered: Option<&NamespaceMap>,
    inclusive_namespaces: Option<&[&str]>,
) -> Result<(NamespaceMap, NamespaceMap)> {
    let mut declared = parent_declared.cloned().unwrap_or_default();
    let mut rendered = parent_rendered.cloned().unwrap_or_default();

    let mut regular_attrs = vec![];
    for attr in e.attributes().with_checks(false) {
        let attr = attr?;
        let key = attr.key.as_ref();
        if key == b"xmlns" {
            declared.insert(vec![], attr.value.to_vec());
        } else if let Some(prefix) = key.strip_prefix(b"xmlns:") {
            if attr.value.is_empty() {
                declared.remove(prefix);
            } else {
                declared.insert(prefix.to_vec(), attr.value.to_vec());
            }
        } else {
            let value = attr.unescape_value()?;
            regular_attrs.push((key.to_vec(), value.into_owned().into_bytes()));
        }
    }

    let name = e.name();
    let name_bytes = name.as_ref();

    let mut visibly_utilized = BTreeSet::new();
    visibly_utilized.insert(prefix_of(name_bytes).unwrap_or_default().to_vec());
    for (key, _) in &regular_attrs {
        if let Some(prefix) = prefix_of(key) {
            visibly_utilized.insert(prefix.to_vec());
        }
    }
    if let Some(prefixes) = inclusive_namespaces {
        for prefix in prefixes {
            let prefix = if *prefix == "#default" { "" } else { prefix };
            if declared.contains_key(prefix.as_bytes()) {
                visibly_utilized.insert(prefix.as_bytes().to_vec());
            }
        }
    }

    let mut render_ns = Vec::new();
    for prefix in visibly_utilized {
        if prefix == b"xml" {
            continue;
        }
        match declared.get(&prefix) {
            Some(uri) => {
                if rendered.get(&prefix) != Some(uri) {
                    render_ns.push((prefix, uri.clone()));
                }
            }
            // An unprefixed element under a rendered default namespace that has
            // since been undeclared needs an explicit xmlns="".
            None if prefix.is_empty() => {
                if rendered.get(&prefix).is_some_and(|uri| !uri.is_empty()) {
                    render_ns.push((prefix, vec![]));
                }
            }
            None => {}
        }
    }

    let mut tag = format!("<{}", str::from_utf8(name_bytes)?);
    for (prefix, uri) in &render_ns {
        if prefix.is_empty() {
            tag.push_str(" xmlns=\"");
        } else {
            tag.push_str(&format!(" xmlns:{}=\"", str::from_utf8(prefix)?));
        }
        tag.push_str(&escape_attr_value(uri)?);
        tag.push('"');
    }

    // Attributes sort by namespace URI first, then local name
    let mut attrs: Vec<(Vec<u8>, Vec<u8>, Vec<u8>, Vec<u8>)> = regular_attrs
        .into_iter()
        .map(|(key, value)| match prefix_of(&key) {
            Some(prefix) => {
                let uri = if prefix == b"xml" {
                    XML_NAMESPACE.to_vec()
                } else {
                    declared.get(prefix).cloned().unwrap_or_default()
                };
                let local = key[prefix.len() + 1..].to_vec();
                (uri, local, key, value)
            }
            None => (vec![], key.clone(), key, value),
        })
        .collect();
    attrs.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    for (_, _, key, value) in &attrs {
        tag.push(' ');
        tag.push_str(str::from_utf8(key)?);
        tag.push_str("=\"");
        tag.push_str(&escape_attr_value(value)?);
        tag.push('"');
    }
    tag.push('>');
    writer.get_mut().write_all(tag.as_bytes())?;

    for (prefix, uri) in render_ns {
        rendered.insert(prefix, uri);
    }
    Ok((declared, rendered))
}
