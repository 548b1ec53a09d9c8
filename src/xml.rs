//! Textform: XML → EXI-Events und zurueck.
//!
//! Der Parser liefert nur die Events des V2G-Profils (SD, SE, AT, CH, EE, ED);
//! Kommentare, PIs und DOCTYPE werden uebersprungen, Namespace-Deklarationen
//! nur zum Aufloesen der Namen benutzt. Einrueckung zwischen Elementen faellt
//! weg, Text in Blattelementen bleibt unveraendert.

use std::borrow::Cow;

use quick_xml::Writer;
use quick_xml::escape::{resolve_predefined_entity, unescape};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;

use crate::event::{ExiEvent, Value};
use crate::grammar::{FieldKind, GrammarId, RootIndex};
use crate::qname::{QName, XML_NS};
use crate::{Error, FastIndexMap, Result};

/// Parst ein XML-Dokument in eine Event-Folge.
pub fn parse_xml_events(text: &str) -> Result<Vec<ExiEvent>> {
    let mut reader = NsReader::from_str(text);
    reader.config_mut().trim_text(false);

    let mut events = Vec::with_capacity(64);
    events.push(ExiEvent::StartDocument);
    let mut pending: Option<String> = None;
    // pro offenem Element: wurde schon ein Kind gesehen?
    let mut had_child: Vec<bool> = Vec::new();
    let mut roots = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                drop_or_flush(&mut pending, &mut events, true);
                start_element(&reader, &e, &mut events, &mut had_child, &mut roots)?;
                had_child.push(false);
            }
            Ok(Event::Empty(e)) => {
                drop_or_flush(&mut pending, &mut events, true);
                start_element(&reader, &e, &mut events, &mut had_child, &mut roots)?;
                events.push(ExiEvent::EndElement);
            }
            Ok(Event::End(_)) => {
                let after_child = had_child.pop().ok_or_else(|| {
                    Error::XmlParse("unexpected end tag outside the root element".into())
                })?;
                drop_or_flush(&mut pending, &mut events, after_child);
                events.push(ExiEvent::EndElement);
            }
            Ok(Event::Text(e)) => {
                let raw = std::str::from_utf8(&e).map_err(|er| Error::XmlParse(er.to_string()))?;
                let text = unescape(raw).map_err(|er| Error::XmlParse(er.to_string()))?;
                push_text(&mut pending, &had_child, &text)?;
            }
            Ok(Event::CData(e)) => {
                let raw = std::str::from_utf8(&e).map_err(|er| Error::XmlParse(er.to_string()))?;
                push_text(&mut pending, &had_child, raw)?;
            }
            Ok(Event::GeneralRef(e)) => {
                let name = std::str::from_utf8(&e).map_err(|er| Error::XmlParse(er.to_string()))?;
                let resolved: Cow<'_, str> = match name.strip_prefix('#') {
                    Some(code) => char_reference(code)
                        .ok_or_else(|| Error::XmlParse(format!("invalid character reference &{name};")))?
                        .to_string()
                        .into(),
                    None => resolve_predefined_entity(name)
                        .ok_or_else(|| Error::XmlParse(format!("unknown entity &{name};")))?
                        .into(),
                };
                push_text(&mut pending, &had_child, &resolved)?;
            }
            Ok(Event::Comment(_) | Event::PI(_) | Event::Decl(_) | Event::DocType(_)) => {}
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::XmlParse(format!(
                    "at byte {}: {e}",
                    reader.buffer_position()
                )));
            }
        }
    }

    if !had_child.is_empty() {
        return Err(Error::XmlParse(format!("{} unclosed element(s)", had_child.len())));
    }
    if roots != 1 {
        return Err(Error::XmlParse(format!("expected one root element, found {roots}")));
    }
    events.push(ExiEvent::EndDocument);
    Ok(events)
}

fn start_element(
    reader: &NsReader<&[u8]>,
    e: &BytesStart<'_>,
    events: &mut Vec<ExiEvent>,
    had_child: &mut [bool],
    roots: &mut usize,
) -> Result<()> {
    match had_child.last_mut() {
        Some(flag) => *flag = true,
        None => *roots += 1,
    }
    let (ns, local) = reader.resolver().resolve_element(e.name());
    let qname = QName::new(resolve_uri(ns)?, utf8(local.as_ref())?);
    events.push(ExiEvent::StartElement(qname));

    for attr in e.attributes() {
        let attr = attr.map_err(|er| Error::XmlParse(er.to_string()))?;
        let key = attr.key.as_ref();
        if key == b"xmlns" || key.starts_with(b"xmlns:") {
            continue;
        }
        let (ns, local) = reader.resolver().resolve_attribute(attr.key);
        let qname = QName::new(resolve_uri(ns)?, utf8(local.as_ref())?);
        let raw = utf8(attr.value.as_ref())?;
        let value = unescape(&raw).map_err(|er| Error::XmlParse(er.to_string()))?;
        events.push(ExiEvent::Attribute(qname, Value::string(value.as_ref())));
    }
    Ok(())
}

fn push_text(pending: &mut Option<String>, had_child: &[bool], text: &str) -> Result<()> {
    if had_child.is_empty() {
        if !is_whitespace(text) {
            return Err(Error::XmlParse("character data outside the root element".into()));
        }
        return Ok(());
    }
    match pending {
        Some(existing) => existing.push_str(text),
        None => *pending = Some(text.to_string()),
    }
    Ok(())
}

/// Gibt gepufferten Text aus; reiner Whitespace neben Kind-Elementen faellt weg.
fn drop_or_flush(pending: &mut Option<String>, events: &mut Vec<ExiEvent>, beside_child: bool) {
    if let Some(text) = pending.take()
        && !(beside_child && is_whitespace(&text))
    {
        let text = text.replace("\r\n", "\n");
        events.push(ExiEvent::Characters(Value::string(text)));
    }
}

fn is_whitespace(text: &str) -> bool {
    text.bytes().all(|b| matches!(b, b' ' | b'\t' | b'\r' | b'\n'))
}

fn char_reference(code: &str) -> Option<char> {
    let value = match code.strip_prefix('x') {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => code.parse().ok()?,
    };
    char::from_u32(value)
}

fn resolve_uri(ns: ResolveResult<'_>) -> Result<String> {
    match ns {
        ResolveResult::Bound(ns) => utf8(ns.as_ref()),
        ResolveResult::Unbound => Ok(String::new()),
        ResolveResult::Unknown(prefix) => Err(Error::XmlParse(format!(
            "unknown namespace prefix '{}'",
            String::from_utf8_lossy(&prefix)
        ))),
    }
}

fn utf8(bytes: &[u8]) -> Result<String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|er| Error::XmlParse(er.to_string()))
}

/// Bringt die Attribute jedes Elements in die Reihenfolge seiner Grammar.
///
/// In XML ist die Attributreihenfolge beliebig, im EXI-Stream folgt sie der
/// Deklaration. Undeklarierte Attribute bleiben in Dokumentreihenfolge dahinter.
pub fn order_attributes(index: &RootIndex, events: &mut [ExiEvent]) {
    let mut stack: Vec<GrammarId> = Vec::new();
    let mut i = 0;
    while i < events.len() {
        match &events[i] {
            ExiEvent::StartElement(q) => {
                let declared = stack.last().and_then(|g| index.grammar(*g)).and_then(|parent| {
                    parent.layout.fields().iter().find_map(|f| match f.kind {
                        FieldKind::Element(g) if f.qname == *q => Some(g),
                        _ => None,
                    })
                });
                let grammar = declared.unwrap_or_else(|| index.element_grammar(q));
                stack.push(grammar);

                let start = i + 1;
                let mut end = start;
                while matches!(events.get(end), Some(ExiEvent::Attribute(..))) {
                    end += 1;
                }
                if let Some(g) = index.grammar(grammar) {
                    events[start..end].sort_by_key(|e| match e {
                        ExiEvent::Attribute(q, _) => {
                            g.layout.attributes.iter().position(|a| a.qname == *q).unwrap_or(usize::MAX)
                        }
                        _ => usize::MAX,
                    });
                }
                i = end;
                continue;
            }
            ExiEvent::EndElement => {
                stack.pop();
            }
            _ => {}
        }
        i += 1;
    }
}

/// Serialisiert eine Event-Folge als XML-Text.
///
/// Namespaces bekommen die Prefixe `ns0`, `ns1`, ... in der Reihenfolge ihres
/// ersten Auftretens; alle Deklarationen stehen am Root-Element. Der
/// XML-Namespace behaelt `xml:`.
pub fn serialize_events(events: &[ExiEvent]) -> Result<String> {
    let mut prefixes: FastIndexMap<&str, String> = FastIndexMap::default();
    for event in events {
        if let ExiEvent::StartElement(q) | ExiEvent::Attribute(q, _) = event
            && !q.uri.is_empty()
            && &*q.uri != XML_NS
            && !prefixes.contains_key(&*q.uri)
        {
            let prefix = format!("ns{}", prefixes.len());
            prefixes.insert(&*q.uri, prefix);
        }
    }
    let name = |q: &QName| match prefixes.get(&*q.uri) {
        Some(prefix) => format!("{prefix}:{}", q.local_name),
        None if &*q.uri == XML_NS => format!("xml:{}", q.local_name),
        None => q.local_name.to_string(),
    };

    let mut writer = Writer::new(Vec::new());
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut open: Option<BytesStart<'static>> = None;
    let mut names: Vec<String> = Vec::new();
    let mut declared = false;
    for event in events {
        match event {
            ExiEvent::StartDocument | ExiEvent::EndDocument => {}
            ExiEvent::StartElement(q) => {
                if let Some(start) = open.take() {
                    writer.write_event(Event::Start(start))?;
                }
                let element = name(q);
                let mut start = BytesStart::new(element.clone());
                if !declared {
                    for (uri, prefix) in &prefixes {
                        start.push_attribute((format!("xmlns:{prefix}").as_str(), *uri));
                    }
                    declared = true;
                }
                open = Some(start);
                names.push(element);
            }
            ExiEvent::Attribute(q, v) => {
                let start = open
                    .as_mut()
                    .ok_or_else(|| Error::encode(format!("{} outside a start tag", event.symbol())))?;
                start.push_attribute((name(q).as_str(), v.to_string().as_str()));
            }
            ExiEvent::Characters(v) => {
                if let Some(start) = open.take() {
                    writer.write_event(Event::Start(start))?;
                }
                let text = v.to_string();
                writer.write_event(Event::Text(BytesText::new(&text)))?;
            }
            ExiEvent::EndElement => {
                let element = names.pop().ok_or_else(|| Error::encode("EE without open element"))?;
                match open.take() {
                    Some(start) => writer.write_event(Event::Empty(start))?,
                    None => writer.write_event(Event::End(BytesEnd::new(element)))?,
                }
            }
        }
    }
    String::from_utf8(writer.into_inner()).map_err(|e| Error::Io(e.to_string()))
}
