//! Aufruf-lokale Production-Erweiterungen.
//!
//! Trifft der Encoder auf ein Event ohne passende Production, nimmt er den
//! reservierten Escape-Code und lernt das Event fuer den aktuellen Zustand.
//! Gelernt wird ausschliesslich in [`Extensions`], die genau einen Aufruf
//! lebt; die compilierten Grammars im [`RootIndex`](super::RootIndex) bleiben
//! unveraendert. Der Decoder lernt beim Lesen identisch mit.
//!
//! Code-Raum eines Zustands:
//!
//! ```text
//! 0 .. d-1        deklarierte Productions
//! d .. d+l-1      gelernte Productions (Reihenfolge des Lernens)
//! d+l             Escape, gefolgt von 2 Bit: 0 SE, 1 AT, 2 CH, 3 EE
//! ```

use super::{GrammarId, Production, StateId};
use crate::qname::QName;
use crate::{FastHashMap, bit_width};

/// Zustand, fuer den gelernt wird.
///
/// Die Built-in Grammar wird von allen undeklarierten Elementen geteilt;
/// dort lernt jedes Element getrennt (`element` ist dann gesetzt).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StateKey {
    pub grammar: GrammarId,
    pub state: StateId,
    pub element: Option<QName>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LearnedTerminal {
    StartElement(QName),
    Attribute(QName),
    Characters,
    EndElement,
}

impl LearnedTerminal {
    /// Code der zweiten Ebene hinter dem Escape.
    pub fn escape_code(&self) -> u64 {
        match self {
            Self::StartElement(_) => 0,
            Self::Attribute(_) => 1,
            Self::Characters => 2,
            Self::EndElement => 3,
        }
    }
}

/// Bitbreite der zweiten Ebene.
pub const ESCAPE_BITS: u8 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Learned {
    pub terminal: LearnedTerminal,
    /// SE, AT und CH bleiben im Zustand; EE hat keinen Folgezustand.
    pub next: Option<StateId>,
}

/// Gelernte Productions eines Aufrufs.
#[derive(Debug, Clone, Default)]
pub struct Extensions {
    lists: FastHashMap<StateKey, Vec<Learned>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn learned(&self, key: &StateKey) -> &[Learned] {
        self.lists.get(key).map_or(&[], Vec::as_slice)
    }

    /// Haengt eine Production an und gibt ihren Index in der Lernliste zurueck.
    pub fn learn(&mut self, key: StateKey, learned: Learned) -> usize {
        let list = self.lists.entry(key).or_default();
        if let Some(i) = list.iter().position(|l| *l == learned) {
            return i;
        }
        list.push(learned);
        list.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.lists.values().all(Vec::is_empty)
    }
}

/// Treffer beim Aufloesen eines Event Codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Candidate<'a> {
    Declared(&'a Production),
    Learned(&'a Learned),
    Escape,
}

/// Sicht auf deklarierte plus gelernte Productions eines Zustands.
#[derive(Debug, Clone, Copy)]
pub struct ProductionList<'a> {
    pub declared: &'a [Production],
    pub learned: &'a [Learned],
}

impl<'a> ProductionList<'a> {
    pub fn new(declared: &'a [Production], learned: &'a [Learned]) -> Self {
        Self { declared, learned }
    }

    /// Anzahl Codes inklusive Escape.
    pub fn code_count(&self) -> usize {
        self.declared.len() + self.learned.len() + 1
    }

    /// Bitbreite des Event Codes; waechst mit jeder gelernten Production.
    pub fn width(&self) -> u8 {
        bit_width::for_count(self.code_count())
    }

    pub fn escape_code(&self) -> usize {
        self.declared.len() + self.learned.len()
    }

    pub fn learned_code(&self, index: usize) -> usize {
        self.declared.len() + index
    }

    pub fn find_learned(&self, terminal: &LearnedTerminal) -> Option<usize> {
        self.learned.iter().position(|l| l.terminal == *terminal).map(|i| self.learned_code(i))
    }

    pub fn get(&self, code: usize) -> Option<Candidate<'a>> {
        let declared = self.declared.len();
        if code < declared {
            Some(Candidate::Declared(&self.declared[code]))
        } else if code < declared + self.learned.len() {
            Some(Candidate::Learned(&self.learned[code - declared]))
        } else if code == self.escape_code() {
            Some(Candidate::Escape)
        } else {
            None
        }
    }
}
