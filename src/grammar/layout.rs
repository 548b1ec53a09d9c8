//! Flache Feldliste eines Element-Typs fuer den Message-Katalog.
//!
//! Der Automat beschreibt, welche Event-Folgen gueltig sind; das Layout
//! beschreibt, welche Felder ein Field-Tree haben darf und in welcher
//! Reihenfolge sie als Events ausgegeben werden. Verschachtelte Gruppen
//! werden dabei flachgeklopft.

use std::sync::Arc;

use super::GrammarId;
use crate::datatype::Datatype;
use crate::qname::QName;
use crate::schema::MaxOccurs;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// In Deklarationsreihenfolge (Basistyp zuerst).
    pub attributes: Vec<AttributeSpec>,
    pub content: Content,
    pub choices: Vec<ChoiceGroup>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSpec {
    pub qname: QName,
    pub datatype: Arc<Datatype>,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Empty,
    Simple(Arc<Datatype>),
    Fields(Vec<FieldSpec>),
    /// Beliebiger Inhalt (Built-in Grammar).
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// Bei [`FieldKind::Wildcard`] der Platzhalter `*`.
    pub qname: QName,
    pub kind: FieldKind,
    /// Effektiv: 0 wenn eine umschliessende Gruppe optional ist.
    pub min_occurs: u32,
    /// Effektiv: unbounded wenn eine umschliessende Gruppe sich wiederholt.
    pub max_occurs: MaxOccurs,
    /// Index in [`Layout::choices`] fuer Mitglieder einer `xs:choice`.
    pub choice: Option<usize>,
}

impl FieldSpec {
    pub fn is_wildcard(&self) -> bool {
        self.kind == FieldKind::Wildcard
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Element(GrammarId),
    /// `xs:any`: beliebige Elemente, generisch abgebildet.
    Wildcard,
}

/// Eine `xs:choice`; `required` wenn mindestens ein Mitglied vorkommen muss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChoiceGroup {
    pub required: bool,
}

impl Layout {
    pub fn fields(&self) -> &[FieldSpec] {
        match &self.content {
            Content::Fields(fields) => fields,
            _ => &[],
        }
    }

    pub fn field(&self, local_name: &str) -> Option<&FieldSpec> {
        self.fields().iter().find(|f| !f.is_wildcard() && &*f.qname.local_name == local_name)
    }

    pub fn attribute(&self, local_name: &str) -> Option<&AttributeSpec> {
        self.attributes.iter().find(|a| &*a.qname.local_name == local_name)
    }

    /// Nimmt undeklarierte Kinder auf (`xs:any` oder Built-in).
    pub fn has_wildcard(&self) -> bool {
        matches!(self.content, Content::Any) || self.fields().iter().any(FieldSpec::is_wildcard)
    }
}
