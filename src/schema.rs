//! Deklarationsbaeume, wie der XSD-Parser sie liefert.
//!
//! Das Modell deckt nur ab, wofuer der Grammar-Compiler eine Regel hat.
//! Referenzen (`type="..."`, `ref="..."`) bleiben hier unaufgeloest und
//! werden erst beim Compilieren gegen das zusammengefuehrte [`SchemaSet`]
//! aufgeloest.

use std::sync::Arc;

use crate::qname::QName;
use crate::{Error, FastIndexMap, Result};

/// `maxOccurs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxOccurs {
    Bounded(u32),
    Unbounded,
}

impl MaxOccurs {
    /// `true` wenn mehr als ein Vorkommen erlaubt ist.
    pub fn is_repeated(self) -> bool {
        match self {
            Self::Bounded(n) => n > 1,
            Self::Unbounded => true,
        }
    }

    pub fn allows(self, count: usize) -> bool {
        match self {
            Self::Bounded(n) => count <= n as usize,
            Self::Unbounded => true,
        }
    }
}

/// Verweis auf einen Typ: benannt (auch XSD-Builtins) oder inline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Named(QName),
    Anonymous(Box<TypeDefinition>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDefinition {
    Simple(SimpleTypeDefinition),
    Complex(ComplexTypeDefinition),
}

/// Einschraenkende Facetten einer `xs:restriction`.
///
/// Exklusive Grenzen werden beim Parsen in inklusive umgerechnet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Facets {
    pub enumeration: Vec<String>,
    pub length: Option<u64>,
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
    pub min_inclusive: Option<i128>,
    pub max_inclusive: Option<i128>,
}

impl Facets {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleTypeDefinition {
    pub base: TypeRef,
    pub facets: Facets,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDeclaration {
    pub name: QName,
    pub type_ref: TypeRef,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentModel {
    Empty,
    /// `simpleContent`: Zeichendaten mit dem angegebenen Typ.
    Simple(TypeRef),
    Elements(Particle),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplexTypeDefinition {
    /// Basistyp einer `complexContent/extension`; dessen Attribute und Inhalt
    /// kommen vor den eigenen.
    pub extends: Option<QName>,
    pub attributes: Vec<AttributeDeclaration>,
    pub content: ContentModel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compositor {
    Sequence,
    Choice,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelGroup {
    pub compositor: Compositor,
    pub particles: Vec<Particle>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Element(ElementDeclaration),
    /// `<xs:element ref="..."/>`
    ElementRef(QName),
    /// `xs:any`; Namespace-Einschraenkung und processContents werden ignoriert.
    Any,
    Group(ModelGroup),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Particle {
    pub min_occurs: u32,
    pub max_occurs: MaxOccurs,
    pub term: Term,
}

impl Particle {
    pub fn once(term: Term) -> Self {
        Self { min_occurs: 1, max_occurs: MaxOccurs::Bounded(1), term }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementDeclaration {
    pub name: QName,
    pub type_ref: TypeRef,
}

/// Inhalt eines geparsten Schema-Dokuments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaDocument {
    /// Datei oder sonstiger Bezeichner fuer Fehlermeldungen.
    pub source: Arc<str>,
    pub target_namespace: Arc<str>,
    pub elements: Vec<ElementDeclaration>,
    pub types: Vec<(QName, TypeDefinition)>,
}

/// Alle globalen Deklarationen aus mehreren Dokumenten.
#[derive(Debug, Clone, Default)]
pub struct SchemaSet {
    elements: FastIndexMap<QName, (ElementDeclaration, Arc<str>)>,
    types: FastIndexMap<QName, (TypeDefinition, Arc<str>)>,
}

impl SchemaSet {
    /// Fuehrt Dokumente zusammen.
    ///
    /// Identische Doppeldeklarationen sind erlaubt (dieselbe Datei zweimal,
    /// gemeinsame Typen in mehreren Dateien). Ein globales Element mit
    /// anderem Inhalt ist ein [`Error::ConflictingRoot`], ein abweichender
    /// benannter Typ ein [`Error::SchemaLoad`].
    pub fn merge(documents: impl IntoIterator<Item = SchemaDocument>) -> Result<Self> {
        let mut set = Self::default();
        for doc in documents {
            for (name, def) in doc.types {
                match set.types.get(&name) {
                    Some((existing, _)) if *existing == def => {}
                    Some((_, first)) => {
                        return Err(Error::schema_load(
                            doc.source.to_string(),
                            format!("type {name} already declared differently in {first}"),
                        ));
                    }
                    None => {
                        set.types.insert(name, (def, doc.source.clone()));
                    }
                }
            }
            for element in doc.elements {
                match set.elements.get(&element.name) {
                    Some((existing, _)) if set.same_content(existing, &element) => {}
                    Some((_, first)) => {
                        return Err(Error::ConflictingRoot {
                            qname: element.name.to_string(),
                            first: first.to_string(),
                            second: doc.source.to_string(),
                        });
                    }
                    None => {
                        let name = element.name.clone();
                        set.elements.insert(name, (element, doc.source.clone()));
                    }
                }
            }
        }
        Ok(set)
    }

    /// Gleichheit des Inhaltsmodells; ein benannter Typverweis und seine
    /// Definition gelten als gleich.
    fn same_content(&self, a: &ElementDeclaration, b: &ElementDeclaration) -> bool {
        if a == b {
            return true;
        }
        match (self.resolve_type(&a.type_ref), self.resolve_type(&b.type_ref)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }

    fn resolve_type<'a>(&'a self, r: &'a TypeRef) -> Option<&'a TypeDefinition> {
        match r {
            TypeRef::Named(q) => self.type_definition(q),
            TypeRef::Anonymous(def) => Some(def),
        }
    }

    pub fn element(&self, name: &QName) -> Option<&ElementDeclaration> {
        self.elements.get(name).map(|(e, _)| e)
    }

    /// Globale Elemente in Deklarationsreihenfolge.
    pub fn elements(&self) -> impl Iterator<Item = &ElementDeclaration> {
        self.elements.values().map(|(e, _)| e)
    }

    pub fn type_definition(&self, name: &QName) -> Option<&TypeDefinition> {
        self.types.get(name).map(|(t, _)| t)
    }

    /// Benannte Typen in Deklarationsreihenfolge.
    pub fn types(&self) -> impl Iterator<Item = (&QName, &TypeDefinition)> {
        self.types.iter().map(|(name, (t, _))| (name, t))
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}
