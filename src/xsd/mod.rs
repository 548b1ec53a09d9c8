//! XSD → Deklarationsbaum.
//!
//! Liest ein Schema-Dokument mit roxmltree und baut ein [`SchemaDocument`].
//! Referenzen zwischen Dokumenten (`xs:import`) werden hier nicht verfolgt;
//! der Aufrufer uebergibt alle beteiligten Dateien und
//! [`SchemaSet::merge`](crate::schema::SchemaSet::merge) fuehrt sie zusammen.
//!
//! Alles ohne Compile-Regel wird mit [`Error::UnsupportedConstruct`] und dem
//! Pfad der Deklaration abgelehnt, nie stillschweigend angenaehert.
//!
//! # Beispiel
//!
//! ```
//! use v2gexi::xsd::parse_xsd;
//!
//! let xsd = r#"
//!     <xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
//!                targetNamespace="urn:example">
//!         <xs:element name="Ping" type="xs:unsignedInt"/>
//!     </xs:schema>
//! "#;
//!
//! let doc = parse_xsd(xsd).unwrap();
//! assert_eq!(doc.elements.len(), 1);
//! assert_eq!(&*doc.target_namespace, "urn:example");
//! ```

mod loader;

pub use loader::load_schema_paths;

use std::sync::Arc;

use roxmltree::{Document, Node, ParsingOptions};

use crate::error::{Error, Result};
use crate::qname::{QName, XML_NS, XSD_NS};
use crate::schema::{
    AttributeDeclaration, ComplexTypeDefinition, Compositor, ContentModel, ElementDeclaration,
    Facets, MaxOccurs, ModelGroup, Particle, SchemaDocument, SimpleTypeDefinition, Term,
    TypeDefinition, TypeRef,
};

/// Maximale Groesse eines XSD-Dokuments (16 MiB).
pub(crate) const MAX_XSD_SIZE: usize = 16 * 1024 * 1024;

/// Parst ein XSD-Dokument ohne Quellenangabe.
pub fn parse_xsd(xsd_content: &str) -> Result<SchemaDocument> {
    parse_xsd_named("", xsd_content)
}

/// Parst ein XSD-Dokument; `source` taucht in Fehlermeldungen auf.
pub fn parse_xsd_named(source: &str, xsd_content: &str) -> Result<SchemaDocument> {
    if xsd_content.len() > MAX_XSD_SIZE {
        return Err(Error::schema_load(
            source.to_string(),
            format!(
                "XSD document too large: {} bytes (max {MAX_XSD_SIZE} bytes)",
                xsd_content.len()
            ),
        ));
    }

    let opts = ParsingOptions { allow_dtd: true, ..Default::default() };
    let doc = Document::parse_with_options(xsd_content, opts)
        .map_err(|e| Error::schema_load(source.to_string(), format!("XML: {e}")))?;

    let root = doc.root_element();
    if root.tag_name().name() != "schema" || root.tag_name().namespace() != Some(XSD_NS) {
        return Err(Error::schema_load(source.to_string(), "root element must be xs:schema"));
    }

    let parser = XsdParser::from_schema_element(&root);
    let mut out = SchemaDocument {
        source: source.into(),
        target_namespace: parser.target_ns.clone(),
        ..Default::default()
    };
    parser.parse_schema(&root, &mut out)?;
    log::debug!(
        "parsed schema '{source}': {} elements, {} types",
        out.elements.len(),
        out.types.len()
    );
    Ok(out)
}

struct XsdParser {
    target_ns: Arc<str>,
    element_form_qualified: bool,
    attribute_form_qualified: bool,
}

fn xs_children<'a, 'input>(
    node: &Node<'a, 'input>,
) -> impl Iterator<Item = Node<'a, 'input>> + use<'a, 'input> {
    node.children()
        .filter(|n| n.is_element() && n.tag_name().namespace() == Some(XSD_NS))
}

fn child_path(path: &str, step: &str) -> String {
    if path.is_empty() { step.to_string() } else { format!("{path}/{step}") }
}

impl XsdParser {
    fn from_schema_element(root: &Node) -> Self {
        Self {
            target_ns: root.attribute("targetNamespace").unwrap_or("").into(),
            element_form_qualified: root.attribute("elementFormDefault") == Some("qualified"),
            attribute_form_qualified: root.attribute("attributeFormDefault") == Some("qualified"),
        }
    }

    fn parse_schema(&self, root: &Node, out: &mut SchemaDocument) -> Result<()> {
        for child in xs_children(root) {
            let kind = child.tag_name().name();
            match kind {
                "element" => out.elements.push(self.parse_global_element(&child)?),
                "complexType" | "simpleType" => {
                    let name = required_attr(&child, "name", kind)?;
                    let qname = QName::new(self.target_ns.clone(), name);
                    let def = if kind == "complexType" {
                        TypeDefinition::Complex(self.parse_complex_type(&child, name)?)
                    } else {
                        TypeDefinition::Simple(self.parse_simple_type(&child, name)?)
                    };
                    out.types.push((qname, def));
                }
                "import" | "include" => {
                    log::warn!(
                        "ignoring xs:{kind} of '{}'; pass all schema files explicitly",
                        child.attribute("schemaLocation").unwrap_or("?")
                    );
                }
                "annotation" => {}
                other => {
                    let name = child.attribute("name").unwrap_or("");
                    return Err(Error::unsupported(name, format!("global xs:{other}")));
                }
            }
        }
        Ok(())
    }

    /// Loest `prefix:local` aus einem Attributwert auf.
    fn resolve_qname(&self, value: &str, node: &Node, path: &str) -> Result<QName> {
        match value.split_once(':') {
            Some(("xml", local)) => Ok(QName::new(XML_NS, local)),
            Some((prefix, local)) => {
                let uri = node.lookup_namespace_uri(Some(prefix)).ok_or_else(|| {
                    Error::schema_load("", format!("unknown prefix '{prefix}' in '{value}' at {path}"))
                })?;
                Ok(QName::new(uri, local))
            }
            None => Ok(QName::new(node.lookup_namespace_uri(None).unwrap_or(""), value)),
        }
    }

    fn parse_global_element(&self, node: &Node) -> Result<ElementDeclaration> {
        let name = required_attr(node, "name", "element")?;
        self.parse_element_body(node, QName::new(self.target_ns.clone(), name), name)
    }

    fn parse_element_body(&self, node: &Node, name: QName, path: &str) -> Result<ElementDeclaration> {
        if node.attribute("substitutionGroup").is_some() {
            return Err(Error::unsupported(path, "substitutionGroup"));
        }
        if node.attribute("nillable") == Some("true") {
            log::debug!("{path}: nillable is ignored, xsi:nil is not encoded");
        }

        let inline = xs_children(node)
            .find(|c| matches!(c.tag_name().name(), "complexType" | "simpleType"));
        let type_ref = match (node.attribute("type"), inline) {
            (Some(t), None) => TypeRef::Named(self.resolve_qname(t, node, path)?),
            (None, Some(def)) => TypeRef::Anonymous(Box::new(if def.tag_name().name() == "complexType" {
                TypeDefinition::Complex(self.parse_complex_type(&def, path)?)
            } else {
                TypeDefinition::Simple(self.parse_simple_type(&def, path)?)
            })),
            (None, None) => TypeRef::Named(QName::new(XSD_NS, "anyType")),
            (Some(_), Some(_)) => {
                return Err(Error::schema_load(
                    "",
                    format!("{path}: element has both a type attribute and an inline type"),
                ));
            }
        };
        Ok(ElementDeclaration { name, type_ref })
    }

    /// `xs:element` innerhalb eines Model Groups (Deklaration oder `ref`).
    fn parse_local_element(&self, node: &Node, path: &str) -> Result<Particle> {
        let (min_occurs, max_occurs) = parse_occurs(node, path)?;
        let term = if let Some(r) = node.attribute("ref") {
            Term::ElementRef(self.resolve_qname(r, node, path)?)
        } else {
            let name = required_attr(node, "name", "element")?;
            let qualified = match node.attribute("form") {
                Some(form) => form == "qualified",
                None => self.element_form_qualified,
            };
            let uri = if qualified { self.target_ns.clone() } else { Arc::from("") };
            let path = child_path(path, name);
            Term::Element(self.parse_element_body(node, QName::new(uri, name), &path)?)
        };
        Ok(Particle { min_occurs, max_occurs, term })
    }

    fn parse_complex_type(&self, node: &Node, path: &str) -> Result<ComplexTypeDefinition> {
        if node.attribute("mixed") == Some("true") {
            return Err(Error::unsupported(path, "mixed content"));
        }
        let mut def = ComplexTypeDefinition {
            extends: None,
            attributes: Vec::new(),
            content: ContentModel::Empty,
        };
        self.parse_type_body(node, path, &mut def)?;
        Ok(def)
    }

    /// Kinder eines complexType oder einer complexContent/extension.
    fn parse_type_body(&self, node: &Node, path: &str, def: &mut ComplexTypeDefinition) -> Result<()> {
        for child in xs_children(node) {
            match child.tag_name().name() {
                "annotation" => {}
                "sequence" | "choice" => {
                    def.content = ContentModel::Elements(self.parse_model_group(&child, path)?);
                }
                "attribute" => {
                    if let Some(attr) = self.parse_attribute(&child, path)? {
                        def.attributes.push(attr);
                    }
                }
                "simpleContent" => self.parse_simple_content(&child, path, def)?,
                "complexContent" => self.parse_complex_content(&child, path, def)?,
                other => return Err(Error::unsupported(path, format!("xs:{other}"))),
            }
        }
        Ok(())
    }

    fn parse_simple_content(&self, node: &Node, path: &str, def: &mut ComplexTypeDefinition) -> Result<()> {
        let ext = xs_children(node)
            .find(|c| c.tag_name().name() != "annotation")
            .ok_or_else(|| Error::schema_load("", format!("{path}: empty simpleContent")))?;
        if ext.tag_name().name() != "extension" {
            return Err(Error::unsupported(
                path,
                format!("simpleContent/{}", ext.tag_name().name()),
            ));
        }
        let base = required_attr(&ext, "base", "extension")?;
        def.content = ContentModel::Simple(TypeRef::Named(self.resolve_qname(base, &ext, path)?));
        for child in xs_children(&ext) {
            match child.tag_name().name() {
                "annotation" => {}
                "attribute" => {
                    if let Some(attr) = self.parse_attribute(&child, path)? {
                        def.attributes.push(attr);
                    }
                }
                other => return Err(Error::unsupported(path, format!("simpleContent/extension/xs:{other}"))),
            }
        }
        Ok(())
    }

    fn parse_complex_content(&self, node: &Node, path: &str, def: &mut ComplexTypeDefinition) -> Result<()> {
        if node.attribute("mixed") == Some("true") {
            return Err(Error::unsupported(path, "mixed content"));
        }
        let ext = xs_children(node)
            .find(|c| c.tag_name().name() != "annotation")
            .ok_or_else(|| Error::schema_load("", format!("{path}: empty complexContent")))?;
        if ext.tag_name().name() != "extension" {
            return Err(Error::unsupported(
                path,
                format!("complexContent/{}", ext.tag_name().name()),
            ));
        }
        let base = required_attr(&ext, "base", "extension")?;
        def.extends = Some(self.resolve_qname(base, &ext, path)?);
        self.parse_type_body(&ext, path, def)
    }

    fn parse_model_group(&self, node: &Node, path: &str) -> Result<Particle> {
        let (min_occurs, max_occurs) = parse_occurs(node, path)?;
        let compositor = match node.tag_name().name() {
            "sequence" => Compositor::Sequence,
            "choice" => Compositor::Choice,
            other => return Err(Error::unsupported(path, format!("xs:{other}"))),
        };
        let mut particles = Vec::new();
        for child in xs_children(node) {
            match child.tag_name().name() {
                "annotation" => {}
                "element" => particles.push(self.parse_local_element(&child, path)?),
                "sequence" | "choice" => particles.push(self.parse_model_group(&child, path)?),
                "any" => {
                    let (min_occurs, max_occurs) = parse_occurs(&child, path)?;
                    particles.push(Particle { min_occurs, max_occurs, term: Term::Any });
                }
                other => return Err(Error::unsupported(path, format!("xs:{other}"))),
            }
        }
        Ok(Particle {
            min_occurs,
            max_occurs,
            term: Term::Group(ModelGroup { compositor, particles }),
        })
    }

    /// `None` fuer `use="prohibited"`.
    fn parse_attribute(&self, node: &Node, path: &str) -> Result<Option<AttributeDeclaration>> {
        if node.attribute("ref").is_some() {
            return Err(Error::unsupported(path, "attribute ref"));
        }
        let name = required_attr(node, "name", "attribute")?;
        let attr_path = child_path(path, &format!("@{name}"));
        let required = match node.attribute("use") {
            Some("required") => true,
            Some("prohibited") => return Ok(None),
            _ => false,
        };
        let qualified = match node.attribute("form") {
            Some(form) => form == "qualified",
            None => self.attribute_form_qualified,
        };
        let uri = if qualified { self.target_ns.clone() } else { Arc::from("") };

        let inline = xs_children(node).find(|c| c.tag_name().name() == "simpleType");
        let type_ref = match (node.attribute("type"), inline) {
            (Some(t), _) => TypeRef::Named(self.resolve_qname(t, node, &attr_path)?),
            (None, Some(st)) => TypeRef::Anonymous(Box::new(TypeDefinition::Simple(
                self.parse_simple_type(&st, &attr_path)?,
            ))),
            (None, None) => TypeRef::Named(QName::new(XSD_NS, "anySimpleType")),
        };
        Ok(Some(AttributeDeclaration { name: QName::new(uri, name), type_ref, required }))
    }

    fn parse_simple_type(&self, node: &Node, path: &str) -> Result<SimpleTypeDefinition> {
        let derivation = xs_children(node)
            .find(|c| c.tag_name().name() != "annotation")
            .ok_or_else(|| Error::schema_load("", format!("{path}: empty simpleType")))?;
        match derivation.tag_name().name() {
            "restriction" => self.parse_restriction(&derivation, path),
            other => Err(Error::unsupported(path, format!("xs:{other}"))),
        }
    }

    fn parse_restriction(&self, node: &Node, path: &str) -> Result<SimpleTypeDefinition> {
        let base = match node.attribute("base") {
            Some(b) => TypeRef::Named(self.resolve_qname(b, node, path)?),
            None => {
                let inline = xs_children(node)
                    .find(|c| c.tag_name().name() == "simpleType")
                    .ok_or_else(|| Error::schema_load("", format!("{path}: restriction without base")))?;
                TypeRef::Anonymous(Box::new(TypeDefinition::Simple(
                    self.parse_simple_type(&inline, path)?,
                )))
            }
        };

        let mut facets = Facets::default();
        for facet in xs_children(node) {
            let kind = facet.tag_name().name();
            let value = facet.attribute("value");
            match (kind, value) {
                ("annotation" | "simpleType", _) => {}
                ("enumeration", Some(v)) => facets.enumeration.push(v.to_string()),
                ("length", Some(v)) => facets.length = Some(parse_length(v, path)?),
                ("minLength", Some(v)) => facets.min_length = Some(parse_length(v, path)?),
                ("maxLength", Some(v)) => facets.max_length = Some(parse_length(v, path)?),
                ("minInclusive", Some(v)) => facets.min_inclusive = Some(parse_bound(v, path)?),
                ("maxInclusive", Some(v)) => facets.max_inclusive = Some(parse_bound(v, path)?),
                ("minExclusive", Some(v)) => {
                    facets.min_inclusive = Some(exclusive_bound(v, path, i128::checked_add)?);
                }
                ("maxExclusive", Some(v)) => {
                    facets.max_inclusive = Some(exclusive_bound(v, path, i128::checked_sub)?);
                }
                // beeinflussen die Bitdarstellung nicht
                ("pattern" | "whiteSpace" | "totalDigits" | "fractionDigits", _) => {
                    log::trace!("{path}: facet {kind} ignored");
                }
                (_, None) => {
                    return Err(Error::schema_load("", format!("{path}: facet {kind} without value")));
                }
                (other, Some(_)) => return Err(Error::unsupported(path, format!("facet {other}"))),
            }
        }
        Ok(SimpleTypeDefinition { base, facets })
    }
}

fn required_attr<'a>(node: &Node<'a, '_>, name: &str, what: &str) -> Result<&'a str> {
    node.attribute(name)
        .ok_or_else(|| Error::schema_load("", format!("xs:{what} without '{name}' attribute")))
}

fn parse_occurs(node: &Node, path: &str) -> Result<(u32, MaxOccurs)> {
    let bad = |attr: &str, v: &str| Error::schema_load("", format!("{path}: invalid {attr} '{v}'"));
    let min = match node.attribute("minOccurs") {
        Some(v) => v.trim().parse::<u32>().map_err(|_| bad("minOccurs", v))?,
        None => 1,
    };
    let max = match node.attribute("maxOccurs") {
        Some("unbounded") => MaxOccurs::Unbounded,
        Some(v) => MaxOccurs::Bounded(v.trim().parse::<u32>().map_err(|_| bad("maxOccurs", v))?),
        None => MaxOccurs::Bounded(1),
    };
    if let MaxOccurs::Bounded(m) = max
        && m < min
    {
        return Err(Error::schema_load("", format!("{path}: maxOccurs {m} < minOccurs {min}")));
    }
    Ok((min, max))
}

fn parse_length(v: &str, path: &str) -> Result<u64> {
    v.trim()
        .parse()
        .map_err(|_| Error::schema_load("", format!("{path}: invalid length facet '{v}'")))
}

/// Wertgrenzen nur fuer Integer-Typen; andere Grenzen haben keine Regel.
fn parse_bound(v: &str, path: &str) -> Result<i128> {
    let v = v.trim();
    v.strip_prefix('+')
        .unwrap_or(v)
        .parse()
        .map_err(|_| Error::unsupported(path, format!("non-integer range facet '{v}'")))
}

/// Exklusive Grenze als inklusive (`+ 1` bzw. `- 1`).
fn exclusive_bound(v: &str, path: &str, step: fn(i128, i128) -> Option<i128>) -> Result<i128> {
    step(parse_bound(v, path)?, 1)
        .ok_or_else(|| Error::schema_load("", format!("{path}: range facet '{v}' out of range")))
}
