//! Structural validation of assertion documents against the SAML 1.1 and
//! SAML 2.0 assertion schemas.
//!
//! Only the constraints the codec relies on are checked. Each violation is
//! typed so callers can decide which kinds they are willing to tolerate.

use quick_xml::Reader;
use quick_xml::events::Event;
use std::fmt;

use super::SamlVersion;
use super::dialect::{AssertionDialect, Saml2, Saml11};
use crate::xml::utils::{ElementName, NamespaceScope};
use crate::xml::{self, ns};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// An attribute or element is present but carries an empty value.
    NullValue,
    MissingAttribute,
    MissingElement,
    InvalidValue,
    UnexpectedElement,
    WrongNamespace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    pub kind: ViolationKind,
    pub message: String,
}

impl SchemaViolation {
    fn new(kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

#[derive(Debug)]
struct Node {
    name: ElementName,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<Node>,
}

impl Node {
    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn child<'a>(&'a self, namespace: &str, local_name: &str) -> Option<&'a Node> {
        self.children_named(namespace, local_name).next()
    }

    fn children_named<'a>(
        &'a self,
        namespace: &str,
        local_name: &str,
    ) -> impl Iterator<Item = &'a Node> {
        self.children
            .iter()
            .filter(move |child| child.name.matches(namespace, local_name))
    }

    fn descendants_named<'a>(&'a self, namespace: &str, local_name: &str, out: &mut Vec<&'a Node>) {
        for child in &self.children {
            if child.name.matches(namespace, local_name) {
                out.push(child);
            }
            child.descendants_named(namespace, local_name, out);
        }
    }
}

fn parse_tree(xml: &str) -> xml::Result<Node> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().expand_empty_elements = true;
    let mut scope = NamespaceScope::default();
    let mut stack: Vec<Node> = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                scope.push(&e)?;
                let mut attributes = Vec::new();
                for attr in e.attributes() {
                    let attr = attr?;
                    let key = std::str::from_utf8(attr.key.as_ref())?;
                    if key == "xmlns" || key.starts_with("xmlns:") {
                        continue;
                    }
                    attributes.push((key.to_string(), attr.unescape_value()?.into_owned()));
                }
                stack.push(Node {
                    name: scope.element_name(e.name().as_ref())?,
                    attributes,
                    text: String::new(),
                    children: Vec::new(),
                });
            }
            Event::Text(e) => {
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&e.unescape()?);
                }
            }
            Event::CData(e) => {
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(std::str::from_utf8(&e)?);
                }
            }
            Event::End(_) => {
                scope.pop();
                let Some(node) = stack.pop() else {
                    return Err(xml::Error::Xml("unbalanced end tag".into()));
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => return Ok(node),
                }
            }
            Event::Eof => return Err(xml::Error::Xml("document has no complete root element".into())),
            _ => {}
        }
    }
}

/// Checks `xml` against the assertion schema of `version`.
///
/// Returns every violation found; a well-formedness error aborts the
/// check with an XML error instead.
pub fn validate(xml: &str, version: SamlVersion) -> xml::Result<Vec<SchemaViolation>> {
    let root = parse_tree(xml)?;
    let mut checker = Checker::default();

    if root.name.local_name != Saml2::ELEMENT_LOCAL_NAME {
        checker.push(
            ViolationKind::UnexpectedElement,
            format!("expected an Assertion root element, found {}", root.name),
        );
        return Ok(checker.violations);
    }
    if root.name.namespace.as_deref() != Some(version.namespace()) {
        checker.push(
            ViolationKind::WrongNamespace,
            format!(
                "SAML {version} assertion must be in namespace {}, found {}",
                version.namespace(),
                root.name.namespace.as_deref().unwrap_or("no namespace")
            ),
        );
        return Ok(checker.violations);
    }

    match version {
        SamlVersion::V2_0 => checker.check_saml2(&root),
        SamlVersion::V1_1 => checker.check_saml11(&root),
    }
    Ok(checker.violations)
}

#[derive(Default)]
struct Checker {
    violations: Vec<SchemaViolation>,
}

impl Checker {
    fn push(&mut self, kind: ViolationKind, message: impl Into<String>) {
        self.violations.push(SchemaViolation::new(kind, message));
    }

    /// Required attribute; returns its value when present and non-empty.
    fn required<'a>(&mut self, node: &'a Node, name: &str) -> Option<&'a str> {
        match node.attribute(name) {
            None => {
                self.push(
                    ViolationKind::MissingAttribute,
                    format!("{} is missing attribute {name}", node.name.local_name),
                );
                None
            }
            Some(value) if value.trim().is_empty() => {
                self.push(
                    ViolationKind::NullValue,
                    format!("{} has an empty {name} attribute", node.name.local_name),
                );
                None
            }
            Some(value) => Some(value),
        }
    }

    fn fixed(&mut self, node: &Node, name: &str, expected: &str) {
        if let Some(value) = self.required(node, name) {
            if value != expected {
                self.push(
                    ViolationKind::InvalidValue,
                    format!("{name} must be \"{expected}\", found \"{value}\""),
                );
            }
        }
    }

    fn identifier(&mut self, node: &Node, name: &str) {
        if let Some(value) = self.required(node, name) {
            if !is_ncname(value) {
                self.push(
                    ViolationKind::InvalidValue,
                    format!("{name} \"{value}\" is not an NCName"),
                );
            }
        }
    }

    fn date_time(&mut self, node: &Node, name: &str, required: bool) {
        let value = if required {
            self.required(node, name)
        } else {
            match node.attribute(name) {
                Some(value) if value.trim().is_empty() => {
                    self.push(
                        ViolationKind::NullValue,
                        format!("{} has an empty {name} attribute", node.name.local_name),
                    );
                    None
                }
                other => other,
            }
        };
        if let Some(value) = value {
            if !is_date_time(value) {
                self.push(
                    ViolationKind::InvalidValue,
                    format!("{name} \"{value}\" is not an xs:dateTime"),
                );
            }
        }
    }

    fn text_element(&mut self, parent: &Node, namespace: &str, local_name: &str) {
        match parent.child(namespace, local_name) {
            None => self.push(
                ViolationKind::MissingElement,
                format!("{} is missing {local_name}", parent.name.local_name),
            ),
            Some(node) if node.text.trim().is_empty() => self.push(
                ViolationKind::NullValue,
                format!("{local_name} is empty"),
            ),
            Some(_) => {}
        }
    }

    fn allowed_children(&mut self, node: &Node, namespace: &str, allowed: &[&str]) {
        for child in &node.children {
            let known = allowed.iter().any(|name| child.name.matches(namespace, name))
                || child.name.matches(ns::DSIG, "Signature");
            if !known {
                self.push(
                    ViolationKind::UnexpectedElement,
                    format!("unexpected element {} in {}", child.name, node.name.local_name),
                );
            }
        }
    }

    fn check_saml2(&mut self, root: &Node) {
        let namespace = Saml2::NAMESPACE;
        self.fixed(root, "Version", "2.0");
        self.identifier(root, Saml2::ID_ATTRIBUTE);
        self.date_time(root, "IssueInstant", true);
        self.text_element(root, namespace, "Issuer");

        let mut allowed = vec!["Issuer", "Subject", "Conditions", "Advice"];
        allowed.extend_from_slice(Saml2::STATEMENT_TYPES);
        self.allowed_children(root, namespace, &allowed);

        if let Some(subject) = root.child(namespace, "Subject") {
            self.text_element(subject, namespace, "NameID");
            for confirmation in subject.children_named(namespace, "SubjectConfirmation") {
                self.required(confirmation, "Method");
            }
        }
        if let Some(conditions) = root.child(namespace, "Conditions") {
            self.date_time(conditions, "NotBefore", false);
            self.date_time(conditions, "NotOnOrAfter", false);
        }
        for statement in root.children_named(namespace, "AuthnStatement") {
            self.date_time(statement, "AuthnInstant", true);
            if statement.child(namespace, "AuthnContext").is_none() {
                self.push(ViolationKind::MissingElement, "AuthnStatement is missing AuthnContext");
            }
        }
        let mut attributes = Vec::new();
        root.descendants_named(namespace, "Attribute", &mut attributes);
        for attribute in attributes {
            self.required(attribute, "Name");
        }
    }

    fn check_saml11(&mut self, root: &Node) {
        let namespace = Saml11::NAMESPACE;
        self.fixed(root, "MajorVersion", "1");
        self.fixed(root, "MinorVersion", "1");
        self.identifier(root, Saml11::ID_ATTRIBUTE);
        self.required(root, "Issuer");
        self.date_time(root, "IssueInstant", true);

        let mut allowed = vec!["Conditions", "Advice"];
        allowed.extend_from_slice(Saml11::STATEMENT_TYPES);
        self.allowed_children(root, namespace, &allowed);

        let has_statement = root.children.iter().any(|child| {
            Saml11::STATEMENT_TYPES
                .iter()
                .any(|name| child.name.matches(namespace, name))
        });
        if !has_statement {
            self.push(ViolationKind::MissingElement, "assertion carries no statement");
        }

        if let Some(conditions) = root.child(namespace, "Conditions") {
            self.date_time(conditions, "NotBefore", false);
            self.date_time(conditions, "NotOnOrAfter", false);
        }
        for statement in root.children_named(namespace, "AuthenticationStatement") {
            self.required(statement, "AuthenticationMethod");
            self.date_time(statement, "AuthenticationInstant", true);
        }
        let mut subjects = Vec::new();
        root.descendants_named(namespace, "Subject", &mut subjects);
        for subject in subjects {
            if subject.child(namespace, "NameIdentifier").is_some() {
                self.text_element(subject, namespace, "NameIdentifier");
            }
        }
        let mut attributes = Vec::new();
        root.descendants_named(namespace, "Attribute", &mut attributes);
        for attribute in attributes {
            self.required(attribute, "AttributeName");
            self.required(attribute, "AttributeNamespace");
        }
    }
}

fn is_ncname(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn is_date_time(value: &str) -> bool {
    let value = value.trim();
    chrono::DateTime::parse_from_rfc3339(value).is_ok()
        || chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAML2_VALID: &str = r#"<saml2:Assertion xmlns:saml2="urn:oasis:names:tc:SAML:2.0:assertion" ID="ID_1" Version="2.0" IssueInstant="2024-05-01T12:00:00.000Z"><saml2:Issuer>sts</saml2:Issuer><saml2:Subject><saml2:NameID>alice</saml2:NameID><saml2:SubjectConfirmation Method="urn:oasis:names:tc:SAML:2.0:cm:bearer"/></saml2:Subject><saml2:Conditions NotBefore="2024-05-01T12:00:00.000Z" NotOnOrAfter="2024-05-01T12:05:00.000Z"/><saml2:AttributeStatement><saml2:Attribute Name="role"><saml2:AttributeValue>admin</saml2:AttributeValue></saml2:Attribute></saml2:AttributeStatement></saml2:Assertion>"#;

    fn kinds(violations: &[SchemaViolation]) -> Vec<ViolationKind> {
        violations.iter().map(|v| v.kind).collect()
    }

    #[test]
    fn test_valid_saml2_assertion() {
        assert!(validate(SAML2_VALID, SamlVersion::V2_0).unwrap().is_empty());
    }

    #[test]
    fn test_wrong_namespace() {
        let violations = validate(SAML2_VALID, SamlVersion::V1_1).unwrap();
        assert_eq!(kinds(&violations), vec![ViolationKind::WrongNamespace]);
    }

    #[test]
    fn test_empty_issuer_is_null_value() {
        let xml = SAML2_VALID.replace("<saml2:Issuer>sts</saml2:Issuer>", "<saml2:Issuer></saml2:Issuer>");
        let violations = validate(&xml, SamlVersion::V2_0).unwrap();
        assert_eq!(kinds(&violations), vec![ViolationKind::NullValue]);
    }

    #[test]
    fn test_genuine_violations() {
        let xml = SAML2_VALID
            .replace("Version=\"2.0\"", "Version=\"1.0\"")
            .replace("ID=\"ID_1\"", "ID=\"1abc\"")
            .replace("<saml2:NameID>alice</saml2:NameID>", "")
            .replace("Name=\"role\"", "");
        let violations = validate(&xml, SamlVersion::V2_0).unwrap();
        assert_eq!(
            kinds(&violations),
            vec![
                ViolationKind::InvalidValue,
                ViolationKind::InvalidValue,
                ViolationKind::MissingElement,
                ViolationKind::MissingAttribute,
            ]
        );
    }

    #[test]
    fn test_bad_date_time() {
        let xml = SAML2_VALID.replace(
            "IssueInstant=\"2024-05-01T12:00:00.000Z\"",
            "IssueInstant=\"tomorrow\"",
        );
        let violations = validate(&xml, SamlVersion::V2_0).unwrap();
        assert_eq!(kinds(&violations), vec![ViolationKind::InvalidValue]);
    }

    #[test]
    fn test_unexpected_child() {
        let xml = SAML2_VALID.replace(
            "<saml2:Issuer>sts</saml2:Issuer>",
            "<saml2:Issuer>sts</saml2:Issuer><saml2:Bogus/>",
        );
        let violations = validate(&xml, SamlVersion::V2_0).unwrap();
        assert_eq!(kinds(&violations), vec![ViolationKind::UnexpectedElement]);
    }

    #[test]
    fn test_saml11_requires_statement() {
        let xml = r#"<saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:1.0:assertion" MajorVersion="1" MinorVersion="1" AssertionID="ID_2" Issuer="sts" IssueInstant="2024-05-01T12:00:00Z"><saml:Conditions NotBefore="2024-05-01T12:00:00Z" NotOnOrAfter="2024-05-01T12:05:00Z"/></saml:Assertion>"#;
        let violations = validate(xml, SamlVersion::V1_1).unwrap();
        assert_eq!(kinds(&violations), vec![ViolationKind::MissingElement]);
    }

    #[test]
    fn test_ncname() {
        assert!(is_ncname("ID_abc-1.2"));
        assert!(is_ncname("_x"));
        assert!(!is_ncname("1abc"));
        assert!(!is_ncname("a:b"));
        assert!(!is_ncname(""));
    }

    #[test]
    fn test_malformed_document() {
        assert!(validate("<saml2:Assertion", SamlVersion::V2_0).is_err());
    }
}
