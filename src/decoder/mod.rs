//! EXI Stream Decoder.
//!
//! Spiegelt den [`Encoder`](crate::encoder::Encoder): gleiche Grammars, gleiche
//! String Table, gleiche Erweiterungen. Jedes Event verbraucht mindestens ein
//! Bit, die Laufzeit ist damit durch die Eingabelaenge begrenzt.
//!
//! Fehler aus dem Bitstrom werden in [`Error::Decode`] mit Byte-Offset und
//! Grammar-Zustand (`"<Typ>/<Zustand>"`) umgewandelt.

use crate::bitstream::BitReader;
use crate::event::{ExiEvent, Value};
use crate::grammar::extension::ESCAPE_BITS;
use crate::grammar::{
    BUILT_IN_ELEMENT, Candidate, Extensions, GrammarId, Learned, LearnedTerminal, ProductionList,
    RootIndex, StateId, StateKey, Terminal,
};
use crate::header::{self, ExiHeader};
use crate::options::{BuiltInGrammarPolicy, CodecOptions};
use crate::qname::QName;
use crate::string_table::StringTable;
use crate::{Error, Result, bit_width};

/// Decodiert einen vollstaendigen Stream in seine Event-Folge.
pub fn decode(index: &RootIndex, bytes: &[u8], options: &CodecOptions) -> Result<Vec<ExiEvent>> {
    let mut decoder = Decoder::new(index, bytes, options);
    let mut events = Vec::new();
    while let Some(event) = decoder.next_event()? {
        events.push(event);
    }
    Ok(events)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Header,
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

enum Hit {
    Declared,
    Learned(LearnedTerminal),
    Escape,
}

pub struct Decoder<'a> {
    index: &'a RootIndex,
    options: &'a CodecOptions,
    reader: BitReader<'a>,
    table: StringTable,
    extensions: Extensions,
    phase: Phase,
    stack: Vec<ElementContext>,
    header: Option<ExiHeader>,
}

impl<'a> Decoder<'a> {
    pub fn new(index: &'a RootIndex, bytes: &'a [u8], options: &'a CodecOptions) -> Self {
        Self {
            index,
            options,
            reader: BitReader::new(bytes),
            table: StringTable::new(index.seed(), options.max_string_table_entries()),
            extensions: Extensions::new(),
            phase: Phase::Header,
            stack: Vec::new(),
            header: None,
        }
    }

    /// Header, sobald `SD` gelesen wurde.
    pub fn header(&self) -> Option<&ExiHeader> {
        self.header.as_ref()
    }

    /// Naechstes Event; `None` nach `ED`.
    pub fn next_event(&mut self) -> Result<Option<ExiEvent>> {
        let location = self.location();
        self.step().map_err(|e| self.lift(e, location))
    }

    fn step(&mut self) -> Result<Option<ExiEvent>> {
        match self.phase {
            Phase::Header => {
                self.header = Some(header::decode(&mut self.reader)?);
                self.phase = Phase::DocContent;
                Ok(Some(ExiEvent::StartDocument))
            }
            Phase::DocContent => self.decode_root().map(Some),
            Phase::Body => self.decode_element_event().map(Some),
            Phase::DocEnd => {
                if self.reader.read_bit()? {
                    return Err(Error::malformed("escape in DocEnd is not supported"));
                }
                self.phase = Phase::Done;
                Ok(Some(ExiEvent::EndDocument))
            }
            Phase::Done => Ok(None),
        }
    }

    /// Zustand fuer Fehlermeldungen.
    fn location(&self) -> String {
        match (self.phase, self.stack.last()) {
            (Phase::Header, _) => "Header".into(),
            (Phase::Body, Some(ctx)) => match self.index.grammar(ctx.grammar) {
                Some(g) => format!("{}/{}", g.name, ctx.state),
                None => format!("{}/{}", ctx.grammar, ctx.state),
            },
            _ => "Document".into(),
        }
    }

    /// Ergaenzt Offset (Position des gescheiterten Lesevorgangs) und Zustand.
    fn lift(&self, e: Error, location: String) -> Error {
        let offset = self.reader.byte_offset();
        match e {
            Error::Decode { state, message, .. } => Error::Decode {
                offset,
                state: if state.is_empty() { location } else { state },
                message,
            },
            other => Error::Decode { offset, state: location, message: other.to_string() },
        }
    }

    fn decode_root(&mut self) -> Result<ExiEvent> {
        let roots = self.index.roots();
        let width = bit_width::for_count(roots.len() + 1);
        let code = self.reader.read_bits(width)? as usize;
        let (qname, grammar) = if let Some(qname) = roots.get(code) {
            (qname.clone(), self.index.element_grammar(qname))
        } else if code == roots.len() {
            self.check_policy("root escape")?;
            match self.reader.read_bits(ESCAPE_BITS)? {
                0 => (self.table.decode_qname(&mut self.reader)?, BUILT_IN_ELEMENT),
                other => {
                    return Err(Error::malformed(format!("escape code {other} not allowed in DocContent")));
                }
            }
        } else {
            return Err(Error::malformed(format!("root code {code} out of range")));
        };
        log::trace!("SE({qname}) root code {code}/{width}");
        self.stack.push(ElementContext { qname: qname.clone(), grammar, state: 0 });
        self.phase = Phase::Body;
        Ok(ExiEvent::StartElement(qname))
    }

    fn check_policy(&self, what: &str) -> Result<()> {
        if self.options.built_in_grammar_policy() == BuiltInGrammarPolicy::RejectUnknown {
            return Err(Error::malformed(format!("{what} not allowed (policy rejectUnknown)")));
        }
        Ok(())
    }

    fn decode_element_event(&mut self) -> Result<ExiEvent> {
        let ctx = self.stack.last().cloned().ok_or_else(|| Error::malformed("no open element"))?;
        let index: &'a RootIndex = self.index;
        let grammar = index
            .grammar(ctx.grammar)
            .ok_or_else(|| Error::malformed(format!("grammar {} missing", ctx.grammar)))?;
        let state = grammar
            .state(ctx.state)
            .ok_or_else(|| Error::malformed(format!("state {} missing", ctx.state)))?;
        let key = StateKey {
            grammar: ctx.grammar,
            state: ctx.state,
            element: (ctx.grammar == BUILT_IN_ELEMENT).then(|| ctx.qname.clone()),
        };

        let list = ProductionList::new(&state.productions, self.extensions.learned(&key));
        let width = list.width();
        let code = self.reader.read_bits(width)? as usize;
        let candidate = list.get(code).ok_or_else(|| {
            Error::malformed(format!("event code {code} out of range ({} codes)", list.code_count()))
        })?;
        log::trace!("event code {code}/{width} in {}/{}", grammar.name, ctx.state);

        // Treffer vom Borrow auf die Erweiterungen loesen
        let hit = match candidate {
            Candidate::Declared(_) => Hit::Declared,
            Candidate::Learned(l) => Hit::Learned(l.terminal.clone()),
            Candidate::Escape => Hit::Escape,
        };
        match hit {
            Hit::Declared => {
                let p = state
                    .productions
                    .get(code)
                    .ok_or_else(|| Error::malformed(format!("event code {code} out of range")))?;
                self.decode_declared(&ctx, &p.terminal, p.next)
            }
            Hit::Learned(terminal) => self.decode_learned(&ctx, &terminal),
            Hit::Escape => {
                self.check_policy("escape code")?;
                let terminal = match self.reader.read_bits(ESCAPE_BITS)? {
                    0 => LearnedTerminal::StartElement(self.table.decode_qname(&mut self.reader)?),
                    1 => LearnedTerminal::Attribute(self.table.decode_qname(&mut self.reader)?),
                    2 => LearnedTerminal::Characters,
                    _ => LearnedTerminal::EndElement,
                };
                let next = (terminal != LearnedTerminal::EndElement).then_some(ctx.state);
                self.extensions.learn(key, Learned { terminal: terminal.clone(), next });
                self.decode_learned(&ctx, &terminal)
            }
        }
    }

    fn decode_declared(
        &mut self,
        ctx: &ElementContext,
        terminal: &Terminal,
        next: Option<StateId>,
    ) -> Result<ExiEvent> {
        let event = match terminal {
            Terminal::StartElement { qname, grammar } => {
                self.advance(next);
                self.push(qname, *grammar);
                ExiEvent::StartElement(qname.clone())
            }
            Terminal::AnyElement => {
                let qname = self.table.decode_qname(&mut self.reader)?;
                self.advance(next);
                self.push(&qname, self.index.element_grammar(&qname));
                ExiEvent::StartElement(qname)
            }
            Terminal::Attribute { qname, datatype } => {
                let value = datatype.decode(&mut self.reader, &mut self.table, qname)?;
                self.advance(next);
                ExiEvent::Attribute(qname.clone(), value)
            }
            Terminal::AnyAttribute => {
                let qname = self.table.decode_qname(&mut self.reader)?;
                let value = self.table.decode_value(&mut self.reader, &qname)?;
                self.advance(next);
                ExiEvent::Attribute(qname, Value::String(value))
            }
            Terminal::Characters(datatype) => {
                let value = datatype.decode(&mut self.reader, &mut self.table, &ctx.qname)?;
                self.advance(next);
                ExiEvent::Characters(value)
            }
            Terminal::EndElement => {
                self.pop();
                ExiEvent::EndElement
            }
        };
        Ok(event)
    }

    fn decode_learned(&mut self, ctx: &ElementContext, terminal: &LearnedTerminal) -> Result<ExiEvent> {
        Ok(match terminal {
            LearnedTerminal::StartElement(qname) => {
                self.push(qname, self.index.element_grammar(qname));
                ExiEvent::StartElement(qname.clone())
            }
            LearnedTerminal::Attribute(qname) => {
                let value = self.table.decode_value(&mut self.reader, qname)?;
                ExiEvent::Attribute(qname.clone(), Value::String(value))
            }
            LearnedTerminal::Characters => {
                let value = self.table.decode_value(&mut self.reader, &ctx.qname)?;
                ExiEvent::Characters(Value::String(value))
            }
            LearnedTerminal::EndElement => {
                self.pop();
                ExiEvent::EndElement
            }
        })
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

#[cfg(test)]
mod tests;
