//! Proto-Grammars: Zwischenformat mit ε-Productions.
//!
//! Aufgebaut wird aus Bausteinen (Terminal, Sequenz per [`concatenate`],
//! Choice, Wiederholung); ein `EE` in einer Proto-Grammar markiert einen
//! akzeptierenden Zustand. [`normalize`] entfernt die ε-Productions und fasst
//! doppelte Terminals zusammen (Teilmengenkonstruktion), so dass pro Zustand
//! jedes Event hoechstens eine Production hat.
//!
//! [`concatenate`]: ProtoGrammar::concatenate
//! [`normalize`]: ProtoGrammar::normalize

use super::{Production, State, StateId, Terminal};
use crate::schema::MaxOccurs;
use crate::{Error, FastHashMap, FastHashSet, Result};

/// Obergrenze fuer normalisierte Zustaende pro Grammar.
const MAX_STATES: usize = 1 << 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ProtoProduction {
    /// `None` = ε.
    pub terminal: Option<Terminal>,
    pub next: usize,
    /// Schema-Order (SE: depth-first Zaehler, AT: Deklarationsindex).
    pub order: u32,
}

impl ProtoProduction {
    fn end_element() -> Self {
        Self { terminal: Some(Terminal::EndElement), next: 0, order: 0 }
    }

    fn epsilon(next: usize) -> Self {
        Self { terminal: None, next, order: 0 }
    }

    fn is_end_element(&self) -> bool {
        self.terminal == Some(Terminal::EndElement)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ProtoGrammar {
    states: Vec<Vec<ProtoProduction>>,
}

impl ProtoGrammar {
    /// `0: EE`
    pub fn end_element_only() -> Self {
        Self { states: vec![vec![ProtoProduction::end_element()]] }
    }

    /// `0: t 1`, `1: EE`
    pub fn terminal(terminal: Terminal, order: u32) -> Self {
        Self {
            states: vec![
                vec![ProtoProduction { terminal: Some(terminal), next: 1, order }],
                vec![ProtoProduction::end_element()],
            ],
        }
    }

    /// Macht die ganze Grammar ueberspringbar.
    pub fn add_optional_ee(&mut self) {
        if let Some(first) = self.states.first_mut()
            && !first.iter().any(ProtoProduction::is_end_element)
        {
            first.push(ProtoProduction::end_element());
        }
    }

    /// Ersetzt jedes EE durch ε zurueck auf den Start.
    fn make_loop(&mut self) {
        for p in self.states.iter_mut().flatten() {
            if p.is_end_element() {
                *p = ProtoProduction::epsilon(0);
            }
        }
    }

    /// `self ⊕ other`: jedes EE in `self` wird zu ε auf den Start von `other`.
    pub fn concatenate(mut self, other: Self) -> Self {
        if other.states.is_empty() {
            return self;
        }
        let offset = self.states.len();
        for p in self.states.iter_mut().flatten() {
            if p.is_end_element() {
                *p = ProtoProduction::epsilon(offset);
            }
        }
        self.append_shifted(other, offset);
        self
    }

    fn append_shifted(&mut self, other: Self, offset: usize) {
        for state in other.states {
            self.states.push(
                state
                    .into_iter()
                    .map(|p| ProtoProduction { next: p.next + offset, ..p })
                    .collect(),
            );
        }
    }

    /// Ein neuer Startzustand mit ε auf jeden Zweig; die EEs der Zweige bleiben.
    pub fn choice(branches: Vec<Self>) -> Self {
        if branches.is_empty() {
            return Self::end_element_only();
        }
        let mut grammar = Self { states: vec![Vec::new()] };
        for branch in branches {
            let offset = grammar.states.len();
            grammar.states[0].push(ProtoProduction::epsilon(offset));
            grammar.append_shifted(branch, offset);
        }
        grammar
    }

    /// Wiederholung eines Terms nach `minOccurs`/`maxOccurs`.
    ///
    /// `min` Pflichtkopien, danach bei `maxOccurs > min` eine optionale
    /// Schleifenkopie. Eine Obergrenze > 1 wird nicht ausgerollt; die Anzahl
    /// prueft der Katalog ueber [`MaxOccurs::allows`].
    pub fn repeat(self, min: u32, max: MaxOccurs) -> Self {
        match (min, max) {
            (_, MaxOccurs::Bounded(0)) => Self::end_element_only(),
            (1, MaxOccurs::Bounded(1)) => self,
            (0, MaxOccurs::Bounded(1)) => {
                let mut g = self;
                g.add_optional_ee();
                g
            }
            (min, max) => {
                let mut parts = Vec::new();
                for _ in 0..min {
                    parts.push(self.clone());
                }
                let exact = matches!(max, MaxOccurs::Bounded(m) if m <= min);
                if !exact {
                    let mut tail = self;
                    tail.make_loop();
                    tail.add_optional_ee();
                    parts.push(tail);
                }
                // von hinten verketten: jedes EE wird genau einmal umgebogen
                let mut iter = parts.into_iter().rev();
                let Some(mut result) = iter.next() else {
                    return Self::end_element_only();
                };
                for part in iter {
                    result = part.concatenate(result);
                }
                result
            }
        }
    }

    /// ε-Huelle eines Zustands (inklusive des Zustands selbst), sortiert.
    fn closure(&self, start: usize) -> Vec<usize> {
        let mut seen = FastHashSet::default();
        let mut stack = vec![start];
        while let Some(s) = stack.pop() {
            if !seen.insert(s) {
                continue;
            }
            for p in &self.states[s] {
                if p.terminal.is_none() {
                    stack.push(p.next);
                }
            }
        }
        let mut out: Vec<usize> = seen.into_iter().collect();
        out.sort_unstable();
        out
    }

    /// Normalisiert zu deterministischen Zustaenden mit sortierten Productions.
    ///
    /// Zustand 0 ist der Start. Nicht erreichbare Proto-Zustaende fallen weg.
    /// Zwei `SE(qname)` mit unterschiedlicher Grammar in derselben Menge sind
    /// ein [`Error::UnsupportedConstruct`].
    pub fn normalize(&self, path: &str) -> Result<Vec<State>> {
        if self.states.is_empty() {
            return Ok(vec![State {
                productions: vec![Production { terminal: Terminal::EndElement, next: None }],
            }]);
        }
        let closures: Vec<Vec<usize>> = (0..self.states.len()).map(|s| self.closure(s)).collect();

        let mut sets: Vec<Vec<usize>> = vec![closures[0].clone()];
        let mut ids: FastHashMap<Vec<usize>, StateId> = FastHashMap::default();
        ids.insert(closures[0].clone(), 0);
        let mut states = Vec::new();

        let mut current = 0;
        while current < sets.len() {
            let mut groups: Vec<Group> = Vec::new();
            for &s in &sets[current] {
                for p in &self.states[s] {
                    let Some(terminal) = &p.terminal else { continue };
                    match groups.iter_mut().find(|g| g.terminal.same_event(terminal)) {
                        Some(g) => {
                            if let (
                                Terminal::StartElement { qname, grammar: a },
                                Terminal::StartElement { grammar: b, .. },
                            ) = (&g.terminal, terminal)
                                && a != b
                            {
                                return Err(Error::unsupported(
                                    format!("{path}/{}", qname.local_name),
                                    "element declarations inconsistent",
                                ));
                            }
                            g.order = g.order.min(p.order);
                            g.targets.extend_from_slice(&closures[p.next]);
                        }
                        None => groups.push(Group {
                            terminal: terminal.clone(),
                            order: p.order,
                            targets: closures[p.next].clone(),
                        }),
                    }
                }
            }
            groups.sort_by_key(|g| (g.terminal.rank(), g.order));

            let mut productions = Vec::with_capacity(groups.len());
            for g in groups {
                let next = if g.terminal == Terminal::EndElement {
                    None
                } else {
                    let mut target = g.targets;
                    target.sort_unstable();
                    target.dedup();
                    let id = match ids.get(&target) {
                        Some(&id) => id,
                        None => {
                            let id = sets.len();
                            if id >= MAX_STATES {
                                return Err(Error::unsupported(path, "content model too large"));
                            }
                            ids.insert(target.clone(), id);
                            sets.push(target);
                            id
                        }
                    };
                    Some(id)
                };
                productions.push(Production { terminal: g.terminal, next });
            }
            states.push(State { productions });
            current += 1;
        }
        Ok(states)
    }
}

/// Alle Productions eines Events in einer Zustandsmenge.
struct Group {
    terminal: Terminal,
    order: u32,
    targets: Vec<usize>,
}
