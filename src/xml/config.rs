use std::collections::BTreeMap;

/// Serialization context handed to the XML writer.
///
/// Namespace declarations are attached to the root element of the
/// document being written, so nested elements may use the registered
/// prefixes without redeclaring them.
#[derive(Debug, Clone)]
pub struct XmlConfig {
    pub pretty: bool,
    pub indent: (char, usize),
    pub xml_decl: bool,
    pub namespaces: BTreeMap<String, String>,
}

impl Default for XmlConfig {
    fn default() -> Self {
        Self {
            pretty: false,
            indent: (' ', 2),
            xml_decl: false,
            namespaces: BTreeMap::new(),
        }
    }
}

impl XmlConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set this flag to true to enable pretty printing. Default is false.
    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Set the indent character and size. Default is (' ', 2).
    pub fn indent(mut self, indent_char: char, indent_size: usize) -> Self {
        self.indent = (indent_char, indent_size);
        self
    }

    /// Emit an `<?xml ...?>` declaration. Assertions are embedded in other
    /// documents, so the default is false.
    pub fn xml_decl(mut self, decl: bool) -> Self {
        self.xml_decl = decl;
        self
    }

    /// Declare a namespace on the root element. An empty prefix sets the
    /// default namespace.
    pub fn namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.namespaces.insert(prefix.into(), uri.into());
        self
    }
}
