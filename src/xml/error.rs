#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("XML processing error: {0}")]
    Xml(String),

    #[error("XML serialization error: {0}")]
    Serialize(#[from] quick_xml::SeError),

    #[error("XML deserialization error: {0}")]
    Deserialize(#[from] quick_xml::DeError),

    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::Xml(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Error::Xml(err.to_string())
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(err: std::string::FromUtf8Error) -> Self {
        Error::Utf8(err.utf8_error())
    }
}
