//! Schema → Grammars.
//!
//! Pro Typ genau eine Grammar: benannte Typen per QName, anonyme per Adresse
//! ihrer Definition im [`SchemaSet`] gecacht. Die Grammar-ID wird vor dem
//! Aufbau reserviert, damit rekursive Typen auf sich selbst zeigen koennen.

use std::sync::Arc;

use super::layout::{AttributeSpec, ChoiceGroup, Content, FieldKind, FieldSpec, Layout};
use super::proto::ProtoGrammar;
use super::{BUILT_IN_ELEMENT, Grammar, GrammarId, Production, State, Terminal};
use crate::datatype::Datatype;
use crate::qname::{QName, XSD_NS};
use crate::schema::{
    AttributeDeclaration, ComplexTypeDefinition, Compositor, ContentModel, MaxOccurs, Particle,
    SchemaSet, SimpleTypeDefinition, Term, TypeDefinition, TypeRef,
};
use crate::{Error, FastHashMap, FastHashSet, Result};

/// Maximale Tiefe einer Ableitungskette (Extension ueber Extension ...).
const MAX_DERIVATION_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum TypeKey {
    Named(QName),
    /// Adresse der anonymen Definition; stabil solange das SchemaSet geliehen ist.
    Anonymous(usize),
}

/// Typ nach Aufloesen der Extension-Kette.
struct FlatType<'s> {
    attributes: Vec<&'s AttributeDeclaration>,
    content: FlatContent<'s>,
}

enum FlatContent<'s> {
    Empty,
    Simple(Arc<Datatype>),
    /// Inhaltsmodelle von Basis- und abgeleitetem Typ, in dieser Reihenfolge.
    Elements(Vec<&'s Particle>),
}

/// Vorkommen, das eine umschliessende Gruppe an ihre Mitglieder vererbt.
#[derive(Debug, Clone, Copy, Default)]
struct Occurrence {
    optional: bool,
    repeated: bool,
    choice: Option<usize>,
}

pub(super) struct Compiler<'s> {
    set: &'s SchemaSet,
    grammars: Vec<Option<Grammar>>,
    types: FastHashMap<TypeKey, GrammarId>,
    datatypes: FastHashMap<QName, Arc<Datatype>>,
    /// Benannte Simple Types, deren Basis gerade aufgeloest wird.
    resolving: FastHashSet<QName>,
}

fn child_path(path: &str, step: &str) -> String {
    if path.is_empty() { step.to_string() } else { format!("{path}/{step}") }
}

fn unresolved(q: &QName, path: &str) -> Error {
    Error::schema_load("", format!("{path}: unresolved reference {q}"))
}

impl<'s> Compiler<'s> {
    pub(super) fn new(set: &'s SchemaSet) -> Self {
        Self {
            set,
            grammars: vec![Some(Grammar::built_in_element())],
            types: FastHashMap::default(),
            datatypes: FastHashMap::default(),
            resolving: FastHashSet::default(),
        }
    }

    /// Compiliert alle globalen Elemente und benannten Typen.
    ///
    /// Liefert die Grammars und `(Root, Grammar)` in Deklarationsreihenfolge.
    pub(super) fn run(mut self) -> Result<(Vec<Grammar>, Vec<(QName, GrammarId)>)> {
        let set = self.set;
        let mut roots = Vec::new();
        for decl in set.elements() {
            let id = self.type_grammar(&decl.type_ref, &decl.name.local_name)?;
            roots.push((decl.name.clone(), id));
        }
        // auch unbenutzte Typen, damit nicht unterstuetzte Konstrukte auffallen
        for (name, def) in set.types() {
            match def {
                TypeDefinition::Complex(_) => {
                    self.named_type_grammar(name, &name.local_name)?;
                }
                TypeDefinition::Simple(_) => {
                    self.named_datatype(name, &name.local_name)?;
                }
            }
        }

        let grammars = self
            .grammars
            .into_iter()
            .enumerate()
            .map(|(id, g)| {
                g.ok_or_else(|| Error::schema_load("", format!("grammar {id} left incomplete")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok((grammars, roots))
    }

    // ------------------------------------------------------------------
    // Grammars
    // ------------------------------------------------------------------

    fn type_grammar(&mut self, type_ref: &'s TypeRef, path: &str) -> Result<GrammarId> {
        match type_ref {
            TypeRef::Named(q) => self.named_type_grammar(q, path),
            TypeRef::Anonymous(def) => {
                let key = TypeKey::Anonymous(&**def as *const TypeDefinition as usize);
                self.definition_grammar(key, path.into(), def, path)
            }
        }
    }

    fn named_type_grammar(&mut self, q: &QName, path: &str) -> Result<GrammarId> {
        if &*q.uri == XSD_NS && &*q.local_name == "anyType" {
            return Ok(BUILT_IN_ELEMENT);
        }
        let key = TypeKey::Named(q.clone());
        if let Some(&id) = self.types.get(&key) {
            return Ok(id);
        }
        if &*q.uri == XSD_NS {
            let dt = self.named_datatype(q, path)?;
            return Ok(self.add_simple_grammar(key, q.local_name.clone(), dt));
        }
        let set = self.set;
        let def = set.type_definition(q).ok_or_else(|| unresolved(q, path))?;
        self.definition_grammar(key, q.local_name.clone(), def, path)
    }

    fn definition_grammar(
        &mut self,
        key: TypeKey,
        name: Arc<str>,
        def: &'s TypeDefinition,
        path: &str,
    ) -> Result<GrammarId> {
        if let Some(&id) = self.types.get(&key) {
            return Ok(id);
        }
        match def {
            TypeDefinition::Simple(st) => {
                let dt = match &key {
                    TypeKey::Named(q) => self.named_datatype(q, path)?,
                    TypeKey::Anonymous(_) => Arc::new(self.simple_definition(st, path)?),
                };
                Ok(self.add_simple_grammar(key, name, dt))
            }
            TypeDefinition::Complex(ct) => {
                let id = self.grammars.len();
                self.grammars.push(None);
                self.types.insert(key, id);
                let grammar = self.complex_grammar(name, ct, path)?;
                self.grammars[id] = Some(grammar);
                Ok(id)
            }
        }
    }

    /// `0: CH 1`, `1: EE`
    fn add_simple_grammar(&mut self, key: TypeKey, name: Arc<str>, dt: Arc<Datatype>) -> GrammarId {
        let states = vec![
            State {
                productions: vec![Production {
                    terminal: Terminal::Characters(Arc::clone(&dt)),
                    next: Some(1),
                }],
            },
            State { productions: vec![Production { terminal: Terminal::EndElement, next: None }] },
        ];
        let id = self.grammars.len();
        self.grammars.push(Some(Grammar {
            name,
            states,
            layout: Layout { attributes: Vec::new(), content: Content::Simple(dt), choices: Vec::new() },
        }));
        self.types.insert(key, id);
        id
    }

    fn global_element_grammar(&mut self, q: &QName, path: &str) -> Result<GrammarId> {
        let set = self.set;
        let decl = set.element(q).ok_or_else(|| unresolved(q, path))?;
        self.type_grammar(&decl.type_ref, &decl.name.local_name)
    }

    fn complex_grammar(
        &mut self,
        name: Arc<str>,
        def: &'s ComplexTypeDefinition,
        path: &str,
    ) -> Result<Grammar> {
        let flat = self.flatten_type(def, path, 0)?;

        let mut attributes: Vec<AttributeSpec> = Vec::with_capacity(flat.attributes.len());
        for a in flat.attributes {
            let attr_path = child_path(path, &format!("@{}", a.name.local_name));
            if attributes.iter().any(|x| x.qname == a.name) {
                return Err(Error::schema_load("", format!("{attr_path}: attribute declared twice")));
            }
            let datatype = self.datatype(&a.type_ref, &attr_path)?;
            attributes.push(AttributeSpec { qname: a.name.clone(), datatype, required: a.required });
        }

        // Attribute in Deklarationsreihenfolge, danach der Inhalt
        let mut proto: Option<ProtoGrammar> = None;
        for (i, a) in attributes.iter().enumerate() {
            let mut g = ProtoGrammar::terminal(
                Terminal::Attribute { qname: a.qname.clone(), datatype: Arc::clone(&a.datatype) },
                i as u32,
            );
            if !a.required {
                g.add_optional_ee();
            }
            proto = Some(match proto {
                Some(p) => p.concatenate(g),
                None => g,
            });
        }

        let mut choices = Vec::new();
        let (content_proto, content) = match flat.content {
            FlatContent::Empty => (ProtoGrammar::end_element_only(), Content::Empty),
            FlatContent::Simple(dt) => (
                ProtoGrammar::terminal(Terminal::Characters(Arc::clone(&dt)), 0),
                Content::Simple(dt),
            ),
            FlatContent::Elements(particles) => {
                let mut order = 0;
                let mut g: Option<ProtoGrammar> = None;
                for &p in &particles {
                    let pg = self.particle(p, &mut order, path)?;
                    g = Some(match g {
                        Some(prev) => prev.concatenate(pg),
                        None => pg,
                    });
                }
                let mut fields = Vec::new();
                for &p in &particles {
                    self.flatten_fields(p, Occurrence::default(), &mut fields, &mut choices, path)?;
                }
                (g.unwrap_or_else(ProtoGrammar::end_element_only), Content::Fields(fields))
            }
        };
        let proto = match proto {
            Some(p) => p.concatenate(content_proto),
            None => content_proto,
        };
        let states = proto.normalize(path)?;
        log::trace!("grammar '{name}': {} states", states.len());
        Ok(Grammar { name, states, layout: Layout { attributes, content, choices } })
    }

    /// Loest `complexContent/extension` und `simpleContent/extension` auf.
    fn flatten_type(
        &mut self,
        def: &'s ComplexTypeDefinition,
        path: &str,
        depth: usize,
    ) -> Result<FlatType<'s>> {
        if depth > MAX_DERIVATION_DEPTH {
            return Err(Error::schema_load("", format!("{path}: circular type derivation")));
        }
        let set = self.set;
        let mut flat = match &def.extends {
            Some(base) => match set.type_definition(base).ok_or_else(|| unresolved(base, path))? {
                TypeDefinition::Complex(ct) => self.flatten_type(ct, path, depth + 1)?,
                TypeDefinition::Simple(_) => {
                    return Err(Error::schema_load(
                        "",
                        format!("{path}: complexContent extends simple type {base}"),
                    ));
                }
            },
            None => FlatType { attributes: Vec::new(), content: FlatContent::Empty },
        };

        match &def.content {
            ContentModel::Empty => {}
            ContentModel::Elements(p) => match &mut flat.content {
                FlatContent::Empty => flat.content = FlatContent::Elements(vec![p]),
                FlatContent::Elements(ps) => ps.push(p),
                FlatContent::Simple(_) => {
                    return Err(Error::unsupported(path, "element content extending simple content"));
                }
            },
            ContentModel::Simple(type_ref) => {
                if !matches!(flat.content, FlatContent::Empty) {
                    return Err(Error::unsupported(path, "simple content extending element content"));
                }
                let (inherited, dt) = self.simple_content_base(type_ref, path, depth)?;
                flat.attributes.extend(inherited);
                flat.content = FlatContent::Simple(dt);
            }
        }
        flat.attributes.extend(def.attributes.iter());
        Ok(flat)
    }

    /// Basis einer `simpleContent/extension`: Simple Type oder Complex Type
    /// mit Simple Content (dessen Attribute werden geerbt).
    fn simple_content_base(
        &mut self,
        type_ref: &'s TypeRef,
        path: &str,
        depth: usize,
    ) -> Result<(Vec<&'s AttributeDeclaration>, Arc<Datatype>)> {
        let set = self.set;
        if let TypeRef::Named(q) = type_ref
            && let Some(TypeDefinition::Complex(ct)) = set.type_definition(q)
        {
            let base = self.flatten_type(ct, path, depth + 1)?;
            return match base.content {
                FlatContent::Simple(dt) => Ok((base.attributes, dt)),
                _ => Err(Error::schema_load(
                    "",
                    format!("{path}: simpleContent base {q} has no simple content"),
                )),
            };
        }
        Ok((Vec::new(), self.datatype(type_ref, path)?))
    }

    fn particle(&mut self, p: &'s Particle, order: &mut u32, path: &str) -> Result<ProtoGrammar> {
        let term = match &p.term {
            Term::Element(decl) => {
                let grammar =
                    self.type_grammar(&decl.type_ref, &child_path(path, &decl.name.local_name))?;
                *order += 1;
                ProtoGrammar::terminal(
                    Terminal::StartElement { qname: decl.name.clone(), grammar },
                    *order,
                )
            }
            Term::ElementRef(q) => {
                let grammar = self.global_element_grammar(q, path)?;
                *order += 1;
                ProtoGrammar::terminal(Terminal::StartElement { qname: q.clone(), grammar }, *order)
            }
            Term::Any => {
                *order += 1;
                ProtoGrammar::terminal(Terminal::AnyElement, *order)
            }
            Term::Group(group) => {
                let parts = group
                    .particles
                    .iter()
                    .map(|c| self.particle(c, order, path))
                    .collect::<Result<Vec<_>>>()?;
                match group.compositor {
                    Compositor::Sequence => parts
                        .into_iter()
                        .reduce(ProtoGrammar::concatenate)
                        .unwrap_or_else(ProtoGrammar::end_element_only),
                    Compositor::Choice => ProtoGrammar::choice(parts),
                }
            }
        };
        Ok(term.repeat(p.min_occurs, p.max_occurs))
    }

    // ------------------------------------------------------------------
    // Layout
    // ------------------------------------------------------------------

    fn flatten_fields(
        &mut self,
        p: &'s Particle,
        outer: Occurrence,
        fields: &mut Vec<FieldSpec>,
        choices: &mut Vec<ChoiceGroup>,
        path: &str,
    ) -> Result<()> {
        let occ = Occurrence {
            optional: outer.optional || p.min_occurs == 0,
            repeated: outer.repeated || p.max_occurs.is_repeated(),
            choice: outer.choice,
        };
        let min_occurs = if occ.optional { 0 } else { p.min_occurs };
        let max_occurs = if outer.repeated { MaxOccurs::Unbounded } else { p.max_occurs };

        let (qname, kind) = match &p.term {
            Term::Group(group) => {
                let inner = match group.compositor {
                    Compositor::Sequence => occ,
                    Compositor::Choice => {
                        let choice = match occ.choice {
                            Some(c) => c,
                            None => {
                                let required =
                                    !occ.optional && group.particles.iter().all(|c| c.min_occurs > 0);
                                choices.push(ChoiceGroup { required });
                                choices.len() - 1
                            }
                        };
                        Occurrence { optional: true, choice: Some(choice), ..occ }
                    }
                };
                for c in &group.particles {
                    self.flatten_fields(c, inner, fields, choices, path)?;
                }
                return Ok(());
            }
            Term::Element(decl) => {
                let grammar =
                    self.type_grammar(&decl.type_ref, &child_path(path, &decl.name.local_name))?;
                (decl.name.clone(), FieldKind::Element(grammar))
            }
            Term::ElementRef(q) => (q.clone(), FieldKind::Element(self.global_element_grammar(q, path)?)),
            Term::Any => (QName::local("*"), FieldKind::Wildcard),
        };

        match fields.iter_mut().find(|f| f.qname == qname && f.kind.same_shape(&kind)) {
            Some(existing) => {
                if existing.kind != kind {
                    return Err(Error::unsupported(
                        child_path(path, &qname.local_name),
                        "element declarations inconsistent",
                    ));
                }
                log::debug!("{path}: field {qname} appears more than once, merged");
                existing.min_occurs = existing.min_occurs.saturating_add(min_occurs);
                existing.max_occurs = match (existing.max_occurs, max_occurs) {
                    (MaxOccurs::Bounded(a), MaxOccurs::Bounded(b)) => MaxOccurs::Bounded(a.saturating_add(b)),
                    _ => MaxOccurs::Unbounded,
                };
            }
            None => fields.push(FieldSpec { qname, kind, min_occurs, max_occurs, choice: occ.choice }),
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Datentypen
    // ------------------------------------------------------------------

    fn datatype(&mut self, type_ref: &'s TypeRef, path: &str) -> Result<Arc<Datatype>> {
        match type_ref {
            TypeRef::Named(q) => self.named_datatype(q, path),
            TypeRef::Anonymous(def) => match &**def {
                TypeDefinition::Simple(st) => Ok(Arc::new(self.simple_definition(st, path)?)),
                TypeDefinition::Complex(_) => Err(Error::schema_load(
                    "",
                    format!("{path}: complex type used as simple type"),
                )),
            },
        }
    }

    fn named_datatype(&mut self, q: &QName, path: &str) -> Result<Arc<Datatype>> {
        if let Some(dt) = self.datatypes.get(q) {
            return Ok(Arc::clone(dt));
        }
        let dt = if &*q.uri == XSD_NS {
            Datatype::builtin(&q.local_name, path)?.ok_or_else(|| {
                Error::schema_load("", format!("{path}: xs:{} is not a simple type", q.local_name))
            })?
        } else {
            let set = self.set;
            let def = set.type_definition(q).ok_or_else(|| unresolved(q, path))?;
            let TypeDefinition::Simple(st) = def else {
                return Err(Error::schema_load(
                    "",
                    format!("{path}: complex type {q} used as simple type"),
                ));
            };
            if !self.resolving.insert(q.clone()) {
                return Err(Error::schema_load("", format!("{path}: circular simple type {q}")));
            }
            let dt = self.simple_definition(st, path);
            self.resolving.remove(q);
            dt?
        };
        let dt = Arc::new(dt);
        self.datatypes.insert(q.clone(), Arc::clone(&dt));
        Ok(dt)
    }

    fn simple_definition(&mut self, st: &'s SimpleTypeDefinition, path: &str) -> Result<Datatype> {
        let base = self.datatype(&st.base, path)?;
        if st.facets.is_empty() {
            Ok((*base).clone())
        } else {
            base.restrict(&st.facets, path)
        }
    }
}

impl FieldKind {
    fn same_shape(&self, other: &Self) -> bool {
        matches!(
            (self, other),
            (Self::Element(_), Self::Element(_)) | (Self::Wildcard, Self::Wildcard)
        )
    }
}
