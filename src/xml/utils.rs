use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::collections::BTreeMap;
use std::io::Cursor;

use super::{Error, Result};

/// Namespace-resolved name of an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementName {
    pub namespace: Option<String>,
    pub local_name: String,
}

impl ElementName {
    pub fn matches(&self, namespace: &str, local_name: &str) -> bool {
        self.namespace.as_deref() == Some(namespace) && self.local_name == local_name
    }
}

impl std::fmt::Display for ElementName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{ns}}}{}", self.local_name),
            None => f.write_str(&self.local_name),
        }
    }
}

/// Stack of in-scope namespace bindings, one frame per open element.
#[derive(Debug, Default)]
pub(crate) struct NamespaceScope {
    frames: Vec<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl NamespaceScope {
    pub(crate) fn push(&mut self, e: &BytesStart) -> Result<()> {
        let mut current = self.frames.last().cloned().unwrap_or_default();
        for attr in e.attributes().with_checks(false) {
            let attr = attr?;
            let key = attr.key.as_ref();
            if key == b"xmlns" {
                current.insert(vec![], attr.value.to_vec());
            } else if let Some(prefix) = key.strip_prefix(b"xmlns:") {
                current.insert(prefix.to_vec(), attr.value.to_vec());
            }
        }
        self.frames.push(current);
        Ok(())
    }

    pub(crate) fn pop(&mut self) {
        self.frames.pop();
    }

    /// Resolves a qualified name against the innermost frame.
    pub(crate) fn resolve<'a>(&'a self, qname: &'a [u8]) -> (Option<&'a [u8]>, &'a [u8]) {
        let (prefix, local) = match qname.iter().position(|&b| b == b':') {
            Some(pos) => (&qname[..pos], &qname[pos + 1..]),
            None => (&qname[..0], qname),
        };
        let namespace = self
            .frames
            .last()
            .and_then(|frame| frame.get(prefix))
            .map(Vec::as_slice)
            .filter(|uri| !uri.is_empty());
        (namespace, local)
    }

    pub(crate) fn element_name(&self, qname: &[u8]) -> Result<ElementName> {
        let (namespace, local) = self.resolve(qname);
        Ok(ElementName {
            namespace: namespace.map(std::str::from_utf8).transpose()?.map(str::to_string),
            local_name: std::str::from_utf8(local)?.to_string(),
        })
    }

    /// Copies `e` and adds every in-scope binding it does not declare itself,
    /// so the element can be lifted out of its document.
    fn detach(&self, e: &BytesStart) -> Result<BytesStart<'static>> {
        let mut own = Vec::new();
        for attr in e.attributes().with_checks(false) {
            let attr = attr?;
            let key = attr.key.as_ref();
            if key == b"xmlns" {
                own.push(Vec::new());
            } else if let Some(prefix) = key.strip_prefix(b"xmlns:") {
                own.push(prefix.to_vec());
            }
        }

        let mut detached = e.to_owned();
        if let Some(frame) = self.frames.last() {
            for (prefix, uri) in frame {
                if own.contains(prefix) {
                    continue;
                }
                let mut key = b"xmlns".to_vec();
                if !prefix.is_empty() {
                    key.push(b':');
                    key.extend_from_slice(prefix);
                }
                detached.push_attribute((key.as_slice(), uri.as_slice()));
            }
        }
        Ok(detached)
    }
}

/// Resolved name of the document element.
pub fn root_name(xml: &str) -> Result<ElementName> {
    let mut reader = Reader::from_str(xml);
    let mut scope = NamespaceScope::default();
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => {
                scope.push(&e)?;
                return scope.element_name(e.name().as_ref());
            }
            Event::Eof => return Err(Error::Xml("document has no root element".into())),
            _ => {}
        }
    }
}

/// Value of an unprefixed attribute on the document element.
pub fn root_attribute(xml: &str, name: &str) -> Result<Option<String>> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => {
                for attr in e.attributes() {
                    let attr = attr?;
                    if attr.key.as_ref() == name.as_bytes() {
                        return Ok(Some(attr.unescape_value()?.into_owned()));
                    }
                }
                return Ok(None);
            }
            Event::Eof => return Err(Error::Xml("document has no root element".into())),
            _ => {}
        }
    }
}

/// First child element of the document element, detached with its in-scope
/// namespace declarations.
pub fn first_child_element(xml: &str) -> Result<Option<String>> {
    extract_with_predicate(xml, |depth, _| depth == 1)
}

/// First element anywhere in the document with the given namespace and
/// local name, detached with its in-scope namespace declarations.
pub fn find_element(xml: &str, namespace: &str, local_name: &str) -> Result<Option<String>> {
    extract_with_predicate(xml, |_, name| name.matches(namespace, local_name))
}

/// First child of the document element with the given namespace and local
/// name, detached with its in-scope namespace declarations.
pub fn find_child_element(xml: &str, namespace: &str, local_name: &str) -> Result<Option<String>> {
    extract_with_predicate(xml, |depth, name| depth == 1 && name.matches(namespace, local_name))
}

/// Copy of the document without the first child of the document element
/// matching the namespace and local name (the enveloped-signature
/// transform).
pub fn remove_child_element(xml: &str, namespace: &str, local_name: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);
    reader.config_mut().expand_empty_elements = true;

    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut scope = NamespaceScope::default();
    let mut depth = 0usize;
    let mut skip_depth = 0usize;
    let mut removed = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                scope.push(&e)?;
                depth += 1;
                if skip_depth > 0 {
                    skip_depth += 1;
                } else if !removed
                    && depth == 2
                    && scope.element_name(e.name().as_ref())?.matches(namespace, local_name)
                {
                    removed = true;
                    skip_depth = 1;
                } else {
                    writer.write_event(Event::Start(e))?;
                }
            }
            Event::End(e) => {
                scope.pop();
                depth = depth.saturating_sub(1);
                if skip_depth > 0 {
                    skip_depth -= 1;
                } else {
                    writer.write_event(Event::End(e))?;
                }
            }
            Event::Eof => break,
            event => {
                if skip_depth == 0 {
                    writer.write_event(event)?;
                }
            }
        }
    }
    Ok(String::from_utf8(writer.into_inner().into_inner())?)
}

fn extract_with_predicate<F>(xml: &str, mut predicate: F) -> Result<Option<String>>
where
    F: FnMut(usize, &ElementName) -> bool,
{
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);
    reader.config_mut().expand_empty_elements = true;

    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut scope = NamespaceScope::default();
    let mut depth = 0usize;
    let mut captured_at: Option<usize> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                scope.push(&e)?;
                if captured_at.is_some() {
                    writer.write_event(Event::Start(e))?;
                } else if predicate(depth, &scope.element_name(e.name().as_ref())?) {
                    writer.write_event(Event::Start(scope.detach(&e)?))?;
                    captured_at = Some(depth);
                }
                depth += 1;
            }
            Event::End(e) => {
                scope.pop();
                depth = depth.saturating_sub(1);
                if let Some(start) = captured_at {
                    writer.write_event(Event::End(e))?;
                    if start == depth {
                        let captured = writer.into_inner().into_inner();
                        return Ok(Some(String::from_utf8(captured)?));
                    }
                }
            }
            Event::Eof => return Ok(None),
            event => {
                if captured_at.is_some() {
                    writer.write_event(event)?;
                }
            }
        }
    }
}
