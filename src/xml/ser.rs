use quick_xml::events::{BytesDecl, BytesStart, Event};
use quick_xml::{Reader, Writer};
use serde::Serialize;

use super::{Result, XmlConfig};

const XML_VERSION: &str = "1.0";
const UTF8: &str = "UTF-8";

/// Serializes `value` as an element named `root`, then rewrites the output
/// according to `config`.
pub fn to_string_with_root<T>(config: &XmlConfig, root: &str, value: &T) -> Result<String>
where
    T: Serialize,
{
    let xml_buf = quick_xml::se::to_string_with_root(root, value)?;

    let mut reader = Reader::from_str(&xml_buf);
    reader.config_mut().trim_text(config.pretty);

    let mut output_buf = Vec::with_capacity(xml_buf.len() + 256);
    let mut writer = if config.pretty {
        Writer::new_with_indent(&mut output_buf, config.indent.0 as u8, config.indent.1)
    } else {
        Writer::new(&mut output_buf)
    };

    if config.xml_decl {
        let decl = BytesDecl::new(XML_VERSION, Some(UTF8), None);
        writer.write_event(Event::Decl(decl))?;
    }

    let mut is_root = true;
    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let start = declare_namespaces(config, e.into_owned(), &mut is_root);
                writer.write_event(Event::Start(start))?;
            }
            Event::Empty(e) => {
                let start = declare_namespaces(config, e.into_owned(), &mut is_root);
                writer.write_event(Event::Empty(start))?;
            }
            Event::Eof => break,
            event => writer.write_event(event)?,
        }
    }

    Ok(String::from_utf8(output_buf)?)
}

fn declare_namespaces(
    config: &XmlConfig,
    mut start: BytesStart<'static>,
    is_root: &mut bool,
) -> BytesStart<'static> {
    if *is_root {
        for (prefix, uri) in &config.namespaces {
            let attr_name = if prefix.is_empty() {
                "xmlns".to_string()
            } else {
                format!("xmlns:{prefix}")
            };
            start.push_attribute((attr_name.as_str(), uri.as_str()));
        }
        *is_root = false;
    }
    start
}
