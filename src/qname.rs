//! Expandierte Namen (Namespace-URI + Local Name).
//!
//! Prefixe werden nicht erhalten; zwei QNames sind gleich wenn URI und Local
//! Name gleich sind. Beide Teile sind `Arc<str>`, damit Grammars und Events
//! sie zwischen Threads teilen koennen.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema";

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub uri: Arc<str>,
    pub local_name: Arc<str>,
}

impl QName {
    pub fn new(uri: impl Into<Arc<str>>, local_name: impl Into<Arc<str>>) -> Self {
        Self { uri: uri.into(), local_name: local_name.into() }
    }

    /// QName ohne Namespace.
    pub fn local(local_name: impl Into<Arc<str>>) -> Self {
        Self::new("", local_name)
    }

    /// Parst Clark-Notation `{uri}local` oder einen blanken Local Name.
    pub fn from_clark(text: &str) -> Self {
        match text.strip_prefix('{').and_then(|rest| rest.split_once('}')) {
            Some((uri, local)) => Self::new(uri, local),
            None => Self::local(text),
        }
    }

    /// Sortierung der Schema-Reihenfolge: erst Local Name, dann URI.
    pub fn cmp_lexicographic(&self, other: &Self) -> Ordering {
        (&*self.local_name, &*self.uri).cmp(&(&*other.local_name, &*other.uri))
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.uri.is_empty() {
            f.write_str(&self.local_name)
        } else {
            write!(f, "{{{}}}{}", self.uri, self.local_name)
        }
    }
}

impl fmt::Debug for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QName({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clark_notation() {
        let q = QName::from_clark("{urn:iso:std:iso:15118:-20:CommonMessages}SessionSetupReq");
        assert_eq!(&*q.uri, "urn:iso:std:iso:15118:-20:CommonMessages");
        assert_eq!(&*q.local_name, "SessionSetupReq");
        assert_eq!(QName::from_clark(&q.to_string()), q);
        assert_eq!(QName::from_clark("EVCCID"), QName::local("EVCCID"));
    }

    #[test]
    fn lexikographisch_local_name_zuerst() {
        let a = QName::new("urn:z", "A");
        let b = QName::new("urn:a", "B");
        assert_eq!(a.cmp_lexicographic(&b), Ordering::Less);
        let b2 = QName::new("urn:b", "A");
        assert_eq!(b2.cmp_lexicographic(&a), Ordering::Less);
    }
}
