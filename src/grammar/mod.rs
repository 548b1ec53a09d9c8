//! Schema-informierte Grammars und der Root Index.
//!
//! Eine [`Grammar`] ist ein deterministischer Automat pro Element-Typ: jeder
//! [`State`] traegt seine Productions bereits in Event-Code-Reihenfolge
//! (`AT(qname)`, `AT(*)`, `SE(qname)`, `SE(*)`, `EE`, `CH`). Der Code einer
//! Production ist ihr Index; hinter den deklarierten Productions liegen die
//! im Aufruf gelernten ([`extension`]) und zuletzt der reservierte Escape-Code.
//!
//! # Workflow
//!
//! ```text
//! SchemaDocument* → SchemaSet::merge → compile → ProtoGrammar → normalize → RootIndex
//! ```
//!
//! Der [`RootIndex`] ist nach dem Compilieren unveraenderlich und wird von
//! Encoder, Decoder und Katalog nur gelesen.

mod compile;
pub mod extension;
pub mod layout;
mod proto;

use std::sync::Arc;

use crate::datatype::Datatype;
use crate::qname::QName;
use crate::schema::{SchemaDocument, SchemaSet};
use crate::string_table::TableSeed;
use crate::{FastHashMap, Result};

pub use extension::{Candidate, Extensions, Learned, LearnedTerminal, ProductionList, StateKey};
pub use layout::{AttributeSpec, ChoiceGroup, Content, FieldKind, FieldSpec, Layout};

/// Index einer Grammar im [`RootIndex`].
pub type GrammarId = usize;
/// Index eines Zustands innerhalb einer Grammar.
pub type StateId = usize;

/// Grammar fuer Elemente ohne Deklaration (`xs:anyType`, `xs:any`).
pub const BUILT_IN_ELEMENT: GrammarId = 0;

/// Terminal-Symbol einer Production.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    /// SE(qname); das Kind wird mit `grammar` weiter verarbeitet.
    StartElement { qname: QName, grammar: GrammarId },
    /// SE(*) aus `xs:any`.
    AnyElement,
    Attribute { qname: QName, datatype: Arc<Datatype> },
    /// AT(*) der Built-in Element Grammar.
    AnyAttribute,
    Characters(Arc<Datatype>),
    EndElement,
}

impl Terminal {
    /// Rang fuer die Event-Code-Reihenfolge innerhalb eines Zustands.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            Self::Attribute { .. } => 0,
            Self::AnyAttribute => 1,
            Self::StartElement { .. } => 2,
            Self::AnyElement => 3,
            Self::EndElement => 4,
            Self::Characters(_) => 5,
        }
    }

    /// Gleiches Event (fuer das Zusammenfassen doppelter Terminals).
    pub(crate) fn same_event(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::StartElement { qname: a, .. }, Self::StartElement { qname: b, .. })
            | (Self::Attribute { qname: a, .. }, Self::Attribute { qname: b, .. }) => a == b,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }

    pub fn symbol(&self) -> String {
        match self {
            Self::StartElement { qname, .. } => format!("SE({qname})"),
            Self::AnyElement => "SE(*)".into(),
            Self::Attribute { qname, .. } => format!("AT({qname})"),
            Self::AnyAttribute => "AT(*)".into(),
            Self::Characters(dt) => format!("CH[{}]", dt.name()),
            Self::EndElement => "EE".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Production {
    pub terminal: Terminal,
    /// Folgezustand; `None` nur bei EE.
    pub next: Option<StateId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct State {
    pub productions: Vec<Production>,
}

impl State {
    pub fn start_element(&self, qname: &QName) -> Option<(usize, &Production)> {
        self.find(|t| matches!(t, Terminal::StartElement { qname: q, .. } if q == qname))
    }

    pub fn any_element(&self) -> Option<(usize, &Production)> {
        self.find(|t| matches!(t, Terminal::AnyElement))
    }

    pub fn attribute(&self, qname: &QName) -> Option<(usize, &Production)> {
        self.find(|t| matches!(t, Terminal::Attribute { qname: q, .. } if q == qname))
    }

    pub fn any_attribute(&self) -> Option<(usize, &Production)> {
        self.find(|t| matches!(t, Terminal::AnyAttribute))
    }

    pub fn characters(&self) -> Option<(usize, &Production)> {
        self.find(|t| matches!(t, Terminal::Characters(_)))
    }

    pub fn end_element(&self) -> Option<(usize, &Production)> {
        self.find(|t| matches!(t, Terminal::EndElement))
    }

    fn find(&self, pred: impl Fn(&Terminal) -> bool) -> Option<(usize, &Production)> {
        self.productions.iter().enumerate().find(|(_, p)| pred(&p.terminal))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grammar {
    /// Typname oder Deklarationspfad; taucht in Decode-Fehlern auf.
    pub name: Arc<str>,
    pub states: Vec<State>,
    /// Feldliste fuer den Message-Katalog.
    pub layout: Layout,
}

impl Grammar {
    /// Grammar fuer undeklarierte Elemente.
    ///
    /// ```text
    /// 0: AT(*) 0 | SE(*) 1 | EE | CH 1
    /// 1: SE(*) 1 | EE | CH 1
    /// ```
    pub(crate) fn built_in_element() -> Self {
        let untyped = Arc::new(Datatype::untyped());
        let content = |with_attributes: bool| {
            let mut productions = Vec::new();
            if with_attributes {
                productions.push(Production { terminal: Terminal::AnyAttribute, next: Some(0) });
            }
            productions.push(Production { terminal: Terminal::AnyElement, next: Some(1) });
            productions.push(Production { terminal: Terminal::EndElement, next: None });
            productions
                .push(Production { terminal: Terminal::Characters(Arc::clone(&untyped)), next: Some(1) });
            State { productions }
        };
        Self {
            name: "*".into(),
            states: vec![content(true), content(false)],
            layout: Layout { attributes: Vec::new(), content: Content::Any, choices: Vec::new() },
        }
    }

    pub fn state(&self, id: StateId) -> Option<&State> {
        self.states.get(id)
    }

    /// Simple Type ohne Attribute: im Field-Tree ein Skalar.
    pub fn simple_datatype(&self) -> Option<&Arc<Datatype>> {
        match &self.layout.content {
            Content::Simple(dt) if self.layout.attributes.is_empty() => Some(dt),
            _ => None,
        }
    }
}

/// Alle Grammars eines Schema-Loads plus die Root-Element-Zuordnung.
#[derive(Debug, Clone)]
pub struct RootIndex {
    grammars: Vec<Grammar>,
    /// Globale Elemente, lexikographisch (Local Name, dann URI).
    roots: Vec<QName>,
    root_grammars: FastHashMap<QName, GrammarId>,
    seed: TableSeed,
}

impl RootIndex {
    /// Compiliert alle globalen Elemente und benannten Typen.
    pub fn compile(set: &SchemaSet) -> Result<Self> {
        let (grammars, mut roots) = compile::Compiler::new(set).run()?;
        roots.sort_by(|a, b| a.0.cmp_lexicographic(&b.0));

        let mut names: Vec<&QName> = roots.iter().map(|(q, _)| q).collect();
        for grammar in &grammars {
            for state in &grammar.states {
                for p in &state.productions {
                    if let Terminal::StartElement { qname, .. } | Terminal::Attribute { qname, .. } =
                        &p.terminal
                    {
                        names.push(qname);
                    }
                }
            }
        }
        let seed = TableSeed::from_names(names);

        log::debug!(
            "compiled {} grammars, {} states, {} roots",
            grammars.len(),
            grammars.iter().map(|g| g.states.len()).sum::<usize>(),
            roots.len()
        );
        Ok(Self {
            root_grammars: roots.iter().cloned().collect(),
            roots: roots.into_iter().map(|(q, _)| q).collect(),
            grammars,
            seed,
        })
    }

    /// Fuehrt die Dokumente zusammen und compiliert sie.
    pub fn from_documents(documents: Vec<SchemaDocument>) -> Result<Self> {
        Self::compile(&SchemaSet::merge(documents)?)
    }

    pub fn grammar(&self, id: GrammarId) -> Option<&Grammar> {
        self.grammars.get(id)
    }

    pub fn grammars(&self) -> &[Grammar] {
        &self.grammars
    }

    /// Root-Elemente in DocContent-Reihenfolge.
    pub fn roots(&self) -> &[QName] {
        &self.roots
    }

    /// Event Code von `SE(qname)` in DocContent.
    pub fn root_code(&self, qname: &QName) -> Option<usize> {
        self.roots.iter().position(|r| r == qname)
    }

    pub fn root_grammar(&self, qname: &QName) -> Option<GrammarId> {
        self.root_grammars.get(qname).copied()
    }

    /// Grammar eines Elements ohne lokale Deklaration: global oder built-in.
    pub fn element_grammar(&self, qname: &QName) -> GrammarId {
        self.root_grammar(qname).unwrap_or(BUILT_IN_ELEMENT)
    }

    /// Vorbelegung der String Table fuer jeden Aufruf.
    pub fn seed(&self) -> &TableSeed {
        &self.seed
    }

    /// Summe aller Zustaende (Diagnose).
    pub fn state_count(&self) -> usize {
        self.grammars.iter().map(|g| g.states.len()).sum()
    }
}
