use quick_xml::events::Event;
use quick_xml::{DeError, Reader, Writer};
use serde::de::DeserializeOwned;

use super::Result;

/// Deserialize an instance of type T from a string of XML text.
///
/// Whitespace-only text between elements is dropped before handing the
/// document to serde, so pretty-printed tokens decode the same as compact
/// ones. Text carrying content is passed through untouched.
pub fn from_str<T>(xml: &str) -> Result<T>
where
    T: DeserializeOwned,
{
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut output_buf = Vec::with_capacity(xml.len());
    let mut writer = Writer::new(&mut output_buf);

    loop {
        match reader.read_event()? {
            Event::Text(e) => {
                if !e.iter().all(u8::is_ascii_whitespace) {
                    writer.write_event(Event::Text(e))?;
                }
            }
            Event::Eof => break,
            event => writer.write_event(event)?,
        }
    }

    let normalized_xml =
        std::str::from_utf8(&output_buf).map_err(|e| DeError::Custom(e.to_string()))?;
    Ok(quick_xml::de::from_str(normalized_xml)?)
}
