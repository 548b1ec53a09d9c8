//! EXI Stream Encoder.
//!
//! Laeuft mit einem Zustands-Stack ueber die Grammars des [`RootIndex`] und
//! schreibt pro Event den Event Code des aktuellen Zustands, gefolgt von
//! QName (nur bei generischen Productions) und Wert.
//!
//! Pro Aufruf entstehen eine frische String Table und leere
//! [`Extensions`]; beides wird am Ende verworfen.
//!
//! # Beispiel
//!
//! ```
//! use v2gexi::{CodecOptions, ExiEvent, QName, RootIndex, Value};
//! use v2gexi::encoder::encode;
//!
//! let doc = v2gexi::parse_xsd(r#"
//!     <xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:x">
//!         <xs:element name="On" type="xs:boolean"/>
//!     </xs:schema>"#).unwrap();
//! let index = RootIndex::from_documents(vec![doc]).unwrap();
//!
//! let events = vec![
//!     ExiEvent::StartDocument,
//!     ExiEvent::StartElement(QName::new("urn:x", "On")),
//!     ExiEvent::Characters(Value::from("true")),
//!     ExiEvent::EndElement,
//!     ExiEvent::EndDocument,
//! ];
//! let bytes = encode(&index, &events, &CodecOptions::default()).unwrap();
//! // Header, dann je ein Bit: Root-Code, CH-Code, true, EE-Code, ED
//! assert_eq!(bytes, [0x80, 0b0010_0000]);
//! ```

use crate::bitstream::BitWriter;
use crate::event::{ExiEvent, Value};
use crate::grammar::extension::ESCAPE_BITS;
use crate::grammar::{
    BUILT_IN_ELEMENT, Extensions, Grammar, GrammarId, Learned, LearnedTerminal, Production,
    ProductionList, RootIndex, State, StateId, StateKey, Terminal,
};
use crate::options::{BuiltInGrammarPolicy, CodecOptions};
use crate::qname::QName;
use crate::string_table::StringTable;
use crate::{Error, Result, bit_width, header};

/// Encodiert eine vollstaendige Event-Folge (`SD` ... `ED`).
pub fn encode(index: &RootIndex, events: &[ExiEvent], options: &CodecOptions) -> Result<Vec<u8>> {
    let mut encoder = Encoder::new(index, options);
    for event in events {
        encoder.encode_event(event)?;
    }
    encoder.finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Start,
    DocContent,
    Body,
    DocEnd,
    Done,
}

#[derive(Debug, Clone)]
struct ElementContext {
    qname: QName,
    grammar: GrammarId,
    state: StateId,
}

/// Aufgeloeste Production fuer ein Event.
enum Step<'g> {
    Declared { code: usize, next: Option<StateId>, terminal: &'g Terminal },
    Learned { code: usize },
    Escape { code: usize, terminal: LearnedTerminal },
    /// Whitespace ohne CH-Production
    Skip,
    /// EE ohne Production, aber der Inhalt darf leer sein: erst `CH("")`.
    EmptyContent,
}

pub struct Encoder<'a> {
    index: &'a RootIndex,
    options: &'a CodecOptions,
    writer: BitWriter,
    table: StringTable,
    extensions: Extensions,
    phase: Phase,
    stack: Vec<ElementContext>,
}

fn is_xml_whitespace(s: &str) -> bool {
    s.bytes().all(|b| matches!(b, b' ' | b'\t' | b'\n' | b'\r'))
}

/// Haengt den Kontext (Feld, Zustand) an Encode-Fehler der Datentypen.
fn with_context(e: Error, what: &QName) -> Error {
    match e {
        Error::Encode { message } => Error::encode(format!("{what}: {message}")),
        other => other,
    }
}

impl<'a> Encoder<'a> {
    pub fn new(index: &'a RootIndex, options: &'a CodecOptions) -> Self {
        Self {
            index,
            options,
            writer: BitWriter::new(),
            table: StringTable::new(index.seed(), options.max_string_table_entries()),
            extensions: Extensions::new(),
            phase: Phase::Start,
            stack: Vec::new(),
        }
    }

    /// Bisher geschriebene Bits (Diagnose).
    pub fn bit_position(&self) -> usize {
        self.writer.bit_position()
    }

    pub fn encode_event(&mut self, event: &ExiEvent) -> Result<()> {
        match (self.phase, event) {
            (Phase::Start, ExiEvent::StartDocument) => {
                header::encode(&mut self.writer);
                self.phase = Phase::DocContent;
                Ok(())
            }
            (Phase::DocContent, ExiEvent::StartElement(q)) => self.encode_root(q),
            (Phase::Body, _) => self.encode_element_event(event),
            (Phase::DocEnd, ExiEvent::EndDocument) => {
                // DocEnd: 0 = ED, 1 = Escape
                self.writer.write_bit(false);
                self.phase = Phase::Done;
                Ok(())
            }
            (Phase::DocContent | Phase::DocEnd, ExiEvent::Characters(v))
                if v.as_str().is_some_and(is_xml_whitespace) =>
            {
                Ok(())
            }
            (phase, event) => Err(Error::encode(format!(
                "unexpected {} in {phase:?}",
                event.symbol()
            ))),
        }
    }

    /// Schliesst den Stream ab und fuellt auf die Bytegrenze auf.
    pub fn finish(self) -> Result<Vec<u8>> {
        if self.phase != Phase::Done {
            return Err(Error::encode(format!(
                "incomplete event sequence, stopped in {:?}",
                self.phase
            )));
        }
        Ok(self.writer.into_vec())
    }

    fn encode_root(&mut self, qname: &QName) -> Result<()> {
        let roots = self.index.roots();
        let width = bit_width::for_count(roots.len() + 1);
        let grammar = match self.index.root_code(qname) {
            Some(code) => {
                self.writer.write_bits(code as u64, width);
                log::trace!("SE({qname}) root code {code}/{width}");
                self.index.element_grammar(qname)
            }
            None => {
                if self.options.built_in_grammar_policy() == BuiltInGrammarPolicy::RejectUnknown {
                    return Err(Error::encode(format!("{qname} is not a global element")));
                }
                self.writer.write_bits(roots.len() as u64, width);
                self.writer.write_bits(0, ESCAPE_BITS);
                self.table.encode_qname(&mut self.writer, qname);
                BUILT_IN_ELEMENT
            }
        };
        self.stack.push(ElementContext { qname: qname.clone(), grammar, state: 0 });
        self.phase = Phase::Body;
        Ok(())
    }

    fn grammar(&self, id: GrammarId) -> Result<&'a Grammar> {
        let index: &'a RootIndex = self.index;
        index.grammar(id).ok_or_else(|| Error::encode(format!("grammar {id} missing")))
    }

    fn state_key(ctx: &ElementContext) -> StateKey {
        StateKey {
            grammar: ctx.grammar,
            state: ctx.state,
            element: (ctx.grammar == BUILT_IN_ELEMENT).then(|| ctx.qname.clone()),
        }
    }

    fn encode_element_event(&mut self, event: &ExiEvent) -> Result<()> {
        let ctx = self.stack.last().cloned().ok_or_else(|| Error::encode("no open element"))?;
        let grammar = self.grammar(ctx.grammar)?;
        let state = grammar
            .state(ctx.state)
            .ok_or_else(|| Error::encode(format!("{}/{} missing", grammar.name, ctx.state)))?;
        let key = Self::state_key(&ctx);

        let list = ProductionList::new(&state.productions, self.extensions.learned(&key));
        let width = list.width();
        let step = resolve(state, &list, event)?;

        match step {
            Step::Declared { code, next, terminal } => {
                log::trace!("{} code {code}/{width} in {}/{}", event.symbol(), grammar.name, ctx.state);
                self.writer.write_bits(code as u64, width);
                self.encode_declared(&ctx, terminal, next, event)
            }
            Step::Learned { code } => {
                log::trace!("{} learned code {code}/{width} in {}/{}", event.symbol(), grammar.name, ctx.state);
                self.writer.write_bits(code as u64, width);
                self.encode_learned(&ctx, event)
            }
            Step::Escape { code, terminal } => {
                if self.options.built_in_grammar_policy() == BuiltInGrammarPolicy::RejectUnknown {
                    return Err(Error::encode(format!(
                        "{} not allowed in {}/{} of {}",
                        event.symbol(),
                        grammar.name,
                        ctx.state,
                        ctx.qname
                    )));
                }
                log::trace!("{} escape code {code}/{width} in {}/{}", event.symbol(), grammar.name, ctx.state);
                self.writer.write_bits(code as u64, width);
                self.writer.write_bits(terminal.escape_code(), ESCAPE_BITS);
                if let LearnedTerminal::StartElement(q) | LearnedTerminal::Attribute(q) = &terminal {
                    self.table.encode_qname(&mut self.writer, q);
                }
                let next = (terminal != LearnedTerminal::EndElement).then_some(ctx.state);
                self.extensions.learn(key, Learned { terminal, next });
                self.encode_learned(&ctx, event)
            }
            Step::Skip => {
                log::trace!("whitespace dropped in {}/{}", grammar.name, ctx.state);
                Ok(())
            }
            Step::EmptyContent => {
                self.encode_element_event(&ExiEvent::Characters(Value::string("")))?;
                self.encode_element_event(event)
            }
        }
    }

    fn encode_declared(
        &mut self,
        ctx: &ElementContext,
        terminal: &Terminal,
        next: Option<StateId>,
        event: &ExiEvent,
    ) -> Result<()> {
        match (terminal, event) {
            (Terminal::StartElement { grammar, .. }, ExiEvent::StartElement(q)) => {
                self.advance(next);
                self.push(q, *grammar);
            }
            (Terminal::AnyElement, ExiEvent::StartElement(q)) => {
                self.table.encode_qname(&mut self.writer, q);
                self.advance(next);
                self.push(q, self.index.element_grammar(q));
            }
            (Terminal::Attribute { datatype, .. }, ExiEvent::Attribute(q, v)) => {
                datatype
                    .encode(&mut self.writer, &mut self.table, q, v)
                    .map_err(|e| with_context(e, q))?;
                self.advance(next);
            }
            (Terminal::AnyAttribute, ExiEvent::Attribute(q, v)) => {
                self.table.encode_qname(&mut self.writer, q);
                self.table.encode_value(&mut self.writer, q, &v.to_string());
                self.advance(next);
            }
            (Terminal::Characters(datatype), ExiEvent::Characters(v)) => {
                datatype
                    .encode(&mut self.writer, &mut self.table, &ctx.qname, v)
                    .map_err(|e| with_context(e, &ctx.qname))?;
                self.advance(next);
            }
            (Terminal::EndElement, ExiEvent::EndElement) => self.pop(),
            (t, e) => {
                return Err(Error::encode(format!("{} resolved to {}", e.symbol(), t.symbol())));
            }
        }
        Ok(())
    }

    /// Gelernte Productions bleiben im Zustand; Werte sind ungetypt.
    fn encode_learned(&mut self, ctx: &ElementContext, event: &ExiEvent) -> Result<()> {
        match event {
            ExiEvent::StartElement(q) => self.push(q, self.index.element_grammar(q)),
            ExiEvent::Attribute(q, v) => {
                self.table.encode_value(&mut self.writer, q, &v.to_string());
            }
            ExiEvent::Characters(v) => {
                self.table.encode_value(&mut self.writer, &ctx.qname, &v.to_string());
            }
            ExiEvent::EndElement => self.pop(),
            other => return Err(Error::encode(format!("unexpected {} in element", other.symbol()))),
        }
        Ok(())
    }

    fn advance(&mut self, next: Option<StateId>) {
        if let (Some(ctx), Some(next)) = (self.stack.last_mut(), next) {
            ctx.state = next;
        }
    }

    fn push(&mut self, qname: &QName, grammar: GrammarId) {
        self.stack.push(ElementContext { qname: qname.clone(), grammar, state: 0 });
    }

    fn pop(&mut self) {
        self.stack.pop();
        if self.stack.is_empty() {
            self.phase = Phase::DocEnd;
        }
    }
}

/// Sucht die Production fuer `event`: deklariert, Wildcard, gelernt, Escape.
fn resolve<'g>(state: &'g State, list: &ProductionList<'_>, event: &ExiEvent) -> Result<Step<'g>> {
    let declared = |found: Option<(usize, &'g Production)>| {
        found.map(|(code, p)| Step::Declared { code, next: p.next, terminal: &p.terminal })
    };
    let learned_or_escape = |terminal: LearnedTerminal| match list.find_learned(&terminal) {
        Some(code) => Step::Learned { code },
        None => Step::Escape { code: list.escape_code(), terminal },
    };

    Ok(match event {
        ExiEvent::StartElement(q) => declared(state.start_element(q))
            .or_else(|| declared(state.any_element()))
            .unwrap_or_else(|| learned_or_escape(LearnedTerminal::StartElement(q.clone()))),
        ExiEvent::Attribute(q, _) => declared(state.attribute(q))
            .or_else(|| declared(state.any_attribute()))
            .unwrap_or_else(|| learned_or_escape(LearnedTerminal::Attribute(q.clone()))),
        ExiEvent::Characters(v) => match declared(state.characters()) {
            Some(step) => step,
            None if v.as_str().is_some_and(is_xml_whitespace)
                && list.find_learned(&LearnedTerminal::Characters).is_none() =>
            {
                Step::Skip
            }
            None => learned_or_escape(LearnedTerminal::Characters),
        },
        ExiEvent::EndElement => match declared(state.end_element()) {
            Some(step) => step,
            None => match state.characters() {
                Some((_, p)) if matches!(&p.terminal, Terminal::Characters(dt) if dt.accepts_empty()) => {
                    Step::EmptyContent
                }
                _ => learned_or_escape(LearnedTerminal::EndElement),
            },
        },
        other => return Err(Error::encode(format!("unexpected {} in element", other.symbol()))),
    })
}
