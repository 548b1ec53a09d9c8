//! EXI Event-Modell des V2G-Profils.
//!
//! Nur die sechs Events, die ein schema-informierter V2G-Stream tragen kann:
//! SD, ED, SE, EE, AT und CH. Kommentare, PIs, DOCTYPE und Namespace-Events
//! sind im festen Profil nicht vorgesehen.

use core::fmt;
use std::sync::Arc;

use crate::binary;
use crate::qname::QName;

/// Getypter Wert eines AT- oder CH-Events.
///
/// Aus XML-Text kommen Werte immer als [`Value::String`] an und werden erst
/// gegen den Datentyp der Production konvertiert; der Decoder liefert die
/// getypte Variante.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Boolean(bool),
    /// Vorzeichenbehaftete Integer (Typen mit negativem Wertebereich).
    Integer(i64),
    /// Integer-Typen mit `min >= 0`.
    Unsigned(u64),
    HexBinary(Vec<u8>),
    Base64Binary(Vec<u8>),
    String(Arc<str>),
}

impl Value {
    pub fn string(text: impl Into<Arc<str>>) -> Self {
        Self::String(text.into())
    }

    /// Bytes eines Binary-Werts.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::HexBinary(b) | Self::Base64Binary(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Lexikalische Form, so wie sie im XML stehen wuerde.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Unsigned(u) => write!(f, "{u}"),
            Self::HexBinary(b) => f.write_str(&binary::to_hex(b)),
            Self::Base64Binary(b) => f.write_str(&binary::to_base64(b)),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.into())
    }
}

/// Ein Event im EXI-Stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExiEvent {
    StartDocument,
    EndDocument,
    StartElement(QName),
    EndElement,
    Attribute(QName, Value),
    Characters(Value),
}

impl ExiEvent {
    /// Kurzname fuer Logs und Fehlermeldungen (`SE(..)`, `AT(..)`, ...).
    pub fn symbol(&self) -> String {
        match self {
            Self::StartDocument => "SD".into(),
            Self::EndDocument => "ED".into(),
            Self::StartElement(q) => format!("SE({q})"),
            Self::EndElement => "EE".into(),
            Self::Attribute(q, _) => format!("AT({q})"),
            Self::Characters(_) => "CH".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexikalische_form() {
        assert_eq!(Value::Boolean(true).to_string(), "true");
        assert_eq!(Value::Integer(-5).to_string(), "-5");
        assert_eq!(Value::Unsigned(1234567890).to_string(), "1234567890");
        assert_eq!(Value::HexBinary(vec![0x0A, 0xFF]).to_string(), "0AFF");
        assert_eq!(Value::Base64Binary(vec![1, 2, 3, 4]).to_string(), "AQIDBA==");
        assert_eq!(Value::from("abc").to_string(), "abc");
    }

    #[test]
    fn symbol_namen() {
        let q = QName::new("urn:x", "Foo");
        assert_eq!(ExiEvent::StartElement(q.clone()).symbol(), "SE({urn:x}Foo)");
        assert_eq!(ExiEvent::Attribute(q, Value::from("1")).symbol(), "AT({urn:x}Foo)");
        assert_eq!(ExiEvent::Characters(Value::from("x")).symbol(), "CH");
    }

    #[test]
    fn bytes_zugriff() {
        assert_eq!(Value::HexBinary(vec![1]).as_bytes(), Some(&[1u8][..]));
        assert_eq!(Value::Boolean(false).as_bytes(), None);
        assert_eq!(Value::from("s").as_str(), Some("s"));
    }
}
