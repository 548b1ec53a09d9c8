//! Message-Katalog fuer ISO 15118-20.
//!
//! Bildet numerische Message-Type-IDs auf Root-Elemente ab und uebersetzt
//! zwischen Field-Tree (`serde_json::Value`) und Event-Folge. Der Field-Tree
//! folgt dem Layout der Grammar:
//!
//! - Simple Types ohne Attribute sind Skalare (Bool, Zahl, String; Binary als
//!   Array von Bytes `0..=255`).
//! - Komplexe Typen sind Objekte. Attribute und Kind-Elemente stehen unter
//!   ihrem Local Name, Simple Content unter `"$value"`.
//! - Felder mit `maxOccurs > 1` sind immer Arrays.
//! - Undeklarierter Inhalt (Wildcards, gelernte Productions) wird generisch
//!   abgebildet: Kinder unter ihrem Namen in Clark-Notation, Attribute als
//!   `"@name"`, Text als String.
//!
//! # Beispiel
//!
//! ```
//! use v2gexi::{CodecOptions, MessageCatalog, RootIndex};
//! use serde_json::json;
//!
//! let doc = v2gexi::parse_xsd(r#"
//!     <xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
//!                targetNamespace="urn:iso:std:iso:15118:-20:CommonMessages"
//!                elementFormDefault="qualified">
//!       <xs:element name="SessionStopReq">
//!         <xs:complexType><xs:sequence>
//!           <xs:element name="ChargingSession" type="xs:string"/>
//!         </xs:sequence></xs:complexType>
//!       </xs:element>
//!     </xs:schema>"#).unwrap();
//! let index = RootIndex::from_documents(vec![doc]).unwrap();
//! let catalog = MessageCatalog::iso15118_20();
//! let options = CodecOptions::default();
//!
//! let tree = json!({ "ChargingSession": "Terminate" });
//! let bytes = catalog.encode_message(&index, 37, &tree, &options).unwrap();
//! assert_eq!(catalog.decode_message(&index, 37, &bytes, &options).unwrap(), tree);
//! assert_eq!(catalog.type_name(37), "SessionStopReq");
//! ```

use std::sync::Arc;

use serde_json::{Map, Number, Value as Json};

use crate::datatype::{BinaryForm, Datatype};
use crate::event::{ExiEvent, Value};
use crate::grammar::{
    BUILT_IN_ELEMENT, Content, FieldKind, FieldSpec, Grammar, GrammarId, Layout, RootIndex, StateId,
    Terminal,
};
use crate::options::{BuiltInGrammarPolicy, CodecOptions};
use crate::qname::QName;
use crate::{Error, FastHashSet, FastIndexMap, Result, decoder, encoder};

pub const COMMON_MESSAGES_NS: &str = "urn:iso:std:iso:15118:-20:CommonMessages";
pub const COMMON_TYPES_NS: &str = "urn:iso:std:iso:15118:-20:CommonTypes";
pub const WPT_NS: &str = "urn:iso:std:iso:15118:-20:WPT";
pub const ACDP_NS: &str = "urn:iso:std:iso:15118:-20:ACDP";

/// Schluessel fuer Simple Content neben Attributen.
pub const VALUE_KEY: &str = "$value";
const ATTRIBUTE_PREFIX: char = '@';

/// Obergrenze fuer Suchschritte beim Anordnen der Kind-Elemente.
const MAX_ORDER_STEPS: usize = 1 << 20;

/// IDs der Binding-Schicht. Luecken sind nicht belegt.
const ISO15118_20: &[(u32, &str, &str)] = &[
    (0, "AuthorizationReq", COMMON_MESSAGES_NS),
    (1, "AuthorizationRes", COMMON_MESSAGES_NS),
    (2, "AuthorizationSetupReq", COMMON_MESSAGES_NS),
    (3, "AuthorizationSetupRes", COMMON_MESSAGES_NS),
    (4, "CLReqControlMode", COMMON_TYPES_NS),
    (5, "CLResControlMode", COMMON_TYPES_NS),
    (7, "CertificateInstallationReq", COMMON_MESSAGES_NS),
    (8, "CertificateInstallationRes", COMMON_MESSAGES_NS),
    (16, "MeteringConfirmationReq", COMMON_MESSAGES_NS),
    (17, "MeteringConfirmationRes", COMMON_MESSAGES_NS),
    (21, "PowerDeliveryReq", COMMON_MESSAGES_NS),
    (22, "PowerDeliveryRes", COMMON_MESSAGES_NS),
    (27, "ScheduleExchangeReq", COMMON_MESSAGES_NS),
    (28, "ScheduleExchangeRes", COMMON_MESSAGES_NS),
    (29, "ServiceDetailReq", COMMON_MESSAGES_NS),
    (30, "ServiceDetailRes", COMMON_MESSAGES_NS),
    (31, "ServiceDiscoveryReq", COMMON_MESSAGES_NS),
    (32, "ServiceDiscoveryRes", COMMON_MESSAGES_NS),
    (33, "ServiceSelectionReq", COMMON_MESSAGES_NS),
    (34, "ServiceSelectionRes", COMMON_MESSAGES_NS),
    (35, "SessionSetupReq", COMMON_MESSAGES_NS),
    (36, "SessionSetupRes", COMMON_MESSAGES_NS),
    (37, "SessionStopReq", COMMON_MESSAGES_NS),
    (38, "SessionStopRes", COMMON_MESSAGES_NS),
    (49, "VehicleCheckInReq", COMMON_MESSAGES_NS),
    (50, "VehicleCheckInRes", COMMON_MESSAGES_NS),
    (51, "VehicleCheckOutReq", COMMON_MESSAGES_NS),
    (52, "VehicleCheckOutRes", COMMON_MESSAGES_NS),
    (53, "WPT_AlignmentCheckReq", WPT_NS),
    (54, "WPT_AlignmentCheckRes", WPT_NS),
    (55, "WPT_FinePositioningReq", WPT_NS),
    (56, "WPT_FinePositioningRes", WPT_NS),
    (57, "WPT_ChargeLoopReq", WPT_NS),
    (58, "WPT_ChargeLoopRes", WPT_NS),
    (59, "DC_ACDPReq", ACDP_NS),
    (60, "DC_ACDPRes", ACDP_NS),
    (61, "DC_ACDP_BPTReq", ACDP_NS),
    (62, "DC_ACDP_BPTRes", ACDP_NS),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub name: Arc<str>,
    pub namespace: Arc<str>,
}

/// Zuordnung Typ-ID → Root-Element.
#[derive(Debug, Clone, Default)]
pub struct MessageCatalog {
    entries: FastIndexMap<u32, CatalogEntry>,
}

impl MessageCatalog {
    /// Leerer Katalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Die ISO 15118-20 Message-IDs der Binding-Schicht.
    pub fn iso15118_20() -> Self {
        let mut catalog = Self::new();
        for &(id, name, namespace) in ISO15118_20 {
            catalog.register(id, name, namespace);
        }
        catalog
    }

    /// Fuegt einen Eintrag hinzu oder ersetzt ihn.
    pub fn register(&mut self, id: u32, name: &str, namespace: &str) {
        self.entries.insert(id, CatalogEntry { name: name.into(), namespace: namespace.into() });
    }

    pub fn entry(&self, id: u32) -> Option<&CatalogEntry> {
        self.entries.get(&id)
    }

    pub fn entries(&self) -> impl Iterator<Item = (u32, &CatalogEntry)> {
        self.entries.iter().map(|(id, e)| (*id, e))
    }

    /// `messageTypeName`; unbekannte IDs als `Unknown(<id>)`.
    pub fn type_name(&self, id: u32) -> String {
        match self.entries.get(&id) {
            Some(e) => e.name.to_string(),
            None => format!("Unknown({id})"),
        }
    }

    /// Umkehrung von [`type_name`](Self::type_name).
    pub fn id_for_name(&self, name: &str) -> Option<u32> {
        self.entries.iter().find(|(_, e)| &*e.name == name).map(|(id, _)| *id)
    }

    /// Root-Element fuer `id` im geladenen Index.
    ///
    /// Erst exakt (Namespace + Name), sonst ueber einen eindeutigen Local Name.
    pub fn resolve_root(&self, index: &RootIndex, id: u32) -> Result<QName> {
        let entry = self.entries.get(&id).ok_or(Error::UnknownType(id))?;
        let exact = QName::new(Arc::clone(&entry.namespace), Arc::clone(&entry.name));
        if index.root_grammar(&exact).is_some() {
            return Ok(exact);
        }
        let mut candidates = index.roots().iter().filter(|q| q.local_name == entry.name);
        match (candidates.next(), candidates.next()) {
            (Some(q), None) => Ok(q.clone()),
            (None, _) => Err(Error::UnknownType(id)),
            (Some(a), Some(b)) => Err(Error::field(
                entry.name.to_string(),
                format!("ambiguous root: {a} and {b}"),
            )),
        }
    }

    /// `encodeMessage(typeId, fieldTree)`.
    pub fn encode_message(
        &self,
        index: &RootIndex,
        id: u32,
        tree: &Json,
        options: &CodecOptions,
    ) -> Result<Vec<u8>> {
        let root = self.resolve_root(index, id)?;
        let events = tree_to_events(index, &root, tree, options)?;
        encoder::encode(index, &events, options)
    }

    /// `decodeMessage(typeId, bytes)`.
    pub fn decode_message(
        &self,
        index: &RootIndex,
        id: u32,
        bytes: &[u8],
        options: &CodecOptions,
    ) -> Result<Json> {
        let root = self.resolve_root(index, id)?;
        let events = decoder::decode(index, bytes, options)?;
        events_to_tree(index, &root, &events)
    }
}

// ============================================================================
// Field-Tree → Events
// ============================================================================

/// Event-Folge (`SD` ... `ED`) fuer einen Field-Tree unter `root`.
pub fn tree_to_events(
    index: &RootIndex,
    root: &QName,
    tree: &Json,
    options: &CodecOptions,
) -> Result<Vec<ExiEvent>> {
    let grammar = index
        .root_grammar(root)
        .ok_or_else(|| Error::field(root.to_string(), "not a global element of the loaded schemas"))?;
    let mut builder = EventBuilder { index, options, events: Vec::with_capacity(32) };
    builder.events.push(ExiEvent::StartDocument);
    builder.element(root, grammar, tree, &root.local_name)?;
    builder.events.push(ExiEvent::EndDocument);
    Ok(builder.events)
}

struct EventBuilder<'a> {
    index: &'a RootIndex,
    options: &'a CodecOptions,
    events: Vec<ExiEvent>,
}

impl EventBuilder<'_> {
    fn element(&mut self, qname: &QName, grammar: GrammarId, value: &Json, path: &str) -> Result<()> {
        let index = self.index;
        let g = index
            .grammar(grammar)
            .ok_or_else(|| Error::field(path, format!("grammar {grammar} missing")))?;
        self.events.push(ExiEvent::StartElement(qname.clone()));

        if let Some(dt) = g.simple_datatype() {
            let v = scalar(dt, value, path)?;
            self.events.push(ExiEvent::Characters(v));
        } else if matches!(g.layout.content, Content::Any) {
            self.generic_content(value, path)?;
        } else {
            let empty = Map::new();
            let map = match value {
                Json::Object(map) => map,
                Json::Null => &empty,
                other => {
                    return Err(Error::field(path, format!("expected an object, got {}", json_kind(other))));
                }
            };
            self.structured(g, map, path)?;
        }

        self.events.push(ExiEvent::EndElement);
        Ok(())
    }

    fn structured(&mut self, g: &Grammar, map: &Map<String, Json>, path: &str) -> Result<()> {
        let layout = &g.layout;
        // Undeklarierte Schluessel einsammeln
        let mut extra_attributes = Vec::new();
        let mut extra_elements = Vec::new();
        for (key, v) in map {
            let declared = layout.attribute(key).is_some()
                || layout.field(key).is_some()
                || (key == VALUE_KEY && matches!(layout.content, Content::Simple(_)));
            if declared {
                continue;
            }
            let attribute = key.starts_with(ATTRIBUTE_PREFIX);
            if self.admit_undeclared(layout, key, attribute, path)? {
                if let Some(name) = key.strip_prefix(ATTRIBUTE_PREFIX) {
                    extra_attributes.push((name, v));
                } else {
                    extra_elements.push((key.as_str(), v));
                }
            }
        }

        // Zustand nach den deklarierten Attributen
        let mut state: StateId = 0;
        for spec in &layout.attributes {
            let attr_path = format!("{path}/@{}", spec.qname.local_name);
            match map.get(&*spec.qname.local_name) {
                None | Some(Json::Null) if spec.required => {
                    return Err(Error::field(attr_path, "required attribute missing"));
                }
                None | Some(Json::Null) => {}
                Some(v) => {
                    let value = scalar(&spec.datatype, v, &attr_path)?;
                    self.events.push(ExiEvent::Attribute(spec.qname.clone(), value));
                    state = g
                        .state(state)
                        .and_then(|s| s.attribute(&spec.qname))
                        .and_then(|(_, p)| p.next)
                        .ok_or_else(|| Error::field(attr_path, "attribute not allowed here"))?;
                }
            }
        }
        for (name, v) in extra_attributes {
            let text = text(v, &format!("{path}/@{name}"))?;
            self.events.push(ExiEvent::Attribute(QName::from_clark(name), Value::string(text)));
        }

        match &layout.content {
            // auch ein leerer Inhalt steht explizit im Baum, sonst kaeme er als "" zurueck
            Content::Simple(dt) => match map.get(VALUE_KEY) {
                Some(v) if !v.is_null() => {
                    let value = scalar(dt, v, &format!("{path}/{VALUE_KEY}"))?;
                    self.events.push(ExiEvent::Characters(value));
                }
                _ => {
                    return Err(Error::field(format!("{path}/{VALUE_KEY}"), "required content missing"));
                }
            },
            Content::Fields(fields) => {
                let mut slots: Vec<Slot<'_>> = Vec::with_capacity(fields.len());
                let mut chosen = vec![false; layout.choices.len()];
                for field in fields {
                    if field.is_wildcard() {
                        if !slots.iter().any(|s| s.qname.is_none()) {
                            let mut items = Vec::new();
                            for (key, v) in extra_elements.drain(..) {
                                self.undeclared_items(key, v, &format!("{path}/{key}"), &mut items);
                            }
                            slots.push(Slot { qname: None, items });
                        }
                        continue;
                    }
                    let items = field_items(field, map, path)?;
                    if !items.is_empty()
                        && let Some(c) = field.choice
                        && let Some(slot) = chosen.get_mut(c)
                    {
                        *slot = true;
                    }
                    slots.push(Slot { qname: Some(field.qname.clone()), items });
                }
                for (c, group) in layout.choices.iter().enumerate() {
                    if group.required && !chosen[c] {
                        let members: Vec<&str> = fields
                            .iter()
                            .filter(|f| f.choice == Some(c))
                            .map(|f| &*f.qname.local_name)
                            .collect();
                        return Err(Error::field(
                            path,
                            format!("one of [{}] is required", members.join(", ")),
                        ));
                    }
                }

                let order = plan_order(g, state, &slots).ok_or_else(|| {
                    Error::field(path, "fields cannot be arranged in an order the schema allows")
                })?;
                let mut cursors = vec![0usize; slots.len()];
                for slot in order {
                    let item = slots
                        .get(slot)
                        .and_then(|s| s.items.get(cursors[slot]))
                        .ok_or_else(|| Error::field(path, "element order out of step"))?;
                    cursors[slot] += 1;
                    self.element(&item.qname, item.grammar, item.value, &item.path)?;
                }
            }
            Content::Empty | Content::Any => {}
        }

        // ohne Wildcard landen sie hinter dem deklarierten Inhalt (gelernte SE)
        for (key, v) in extra_elements {
            self.undeclared_element(key, v, &format!("{path}/{key}"))?;
        }
        Ok(())
    }

    /// Undeklarierter Schluessel: Wildcard, Fehler (strikt), gelernte
    /// Production oder weg.
    fn admit_undeclared(&self, layout: &Layout, key: &str, attribute: bool, path: &str) -> Result<bool> {
        if !attribute && layout.has_wildcard() {
            return Ok(true);
        }
        if self.options.strict_field_mode() {
            return Err(Error::field(format!("{path}/{key}"), "not declared in the schema"));
        }
        if self.options.built_in_grammar_policy() == BuiltInGrammarPolicy::ExtendDynamic {
            return Ok(true);
        }
        log::debug!("dropping undeclared field {path}/{key}");
        Ok(false)
    }

    /// Vorkommen eines undeklarierten Kinds fuer eine Wildcard.
    fn undeclared_items<'j>(&self, key: &str, value: &'j Json, path: &str, out: &mut Vec<Item<'j>>) {
        let qname = QName::from_clark(key);
        let grammar = self.index.element_grammar(&qname);
        match value {
            Json::Array(items) => out.extend(items.iter().enumerate().map(|(i, item)| Item {
                qname: qname.clone(),
                grammar,
                value: item,
                path: format!("{path}[{i}]"),
            })),
            single => out.push(Item { qname, grammar, value: single, path: path.to_string() }),
        }
    }

    /// Element ohne Deklaration im Layout; Arrays sind Wiederholungen.
    fn undeclared_element(&mut self, key: &str, value: &Json, path: &str) -> Result<()> {
        let qname = QName::from_clark(key);
        let grammar = self.index.element_grammar(&qname);
        match value {
            Json::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    self.element(&qname, grammar, item, &format!("{path}[{i}]"))?;
                }
                Ok(())
            }
            single => self.element(&qname, grammar, single, path),
        }
    }

    /// Inhalt eines Elements mit Built-in Grammar.
    fn generic_content(&mut self, value: &Json, path: &str) -> Result<()> {
        match value {
            Json::Null => {}
            Json::Object(map) => {
                // AT(*) gibt es nur vor dem ersten Kind
                for (key, v) in map {
                    if let Some(name) = key.strip_prefix(ATTRIBUTE_PREFIX) {
                        let text = text(v, &format!("{path}/{key}"))?;
                        self.events.push(ExiEvent::Attribute(QName::from_clark(name), Value::string(text)));
                    }
                }
                for (key, v) in map {
                    if !key.starts_with(ATTRIBUTE_PREFIX) && key != VALUE_KEY {
                        self.undeclared_element(key, v, &format!("{path}/{key}"))?;
                    }
                }
                if let Some(v) = map.get(VALUE_KEY) {
                    self.generic_text(v, path)?;
                }
            }
            Json::Array(_) => {
                return Err(Error::field(path, "nested arrays have no element representation"));
            }
            scalar => self.generic_text(scalar, path)?,
        }
        Ok(())
    }

    fn generic_text(&mut self, value: &Json, path: &str) -> Result<()> {
        let text = text(value, path)?;
        if !text.is_empty() {
            self.events.push(ExiEvent::Characters(Value::string(text)));
        }
        Ok(())
    }
}

/// Ein Vorkommen eines Kind-Elements.
struct Item<'j> {
    qname: QName,
    grammar: GrammarId,
    value: &'j Json,
    path: String,
}

/// Alle Vorkommen eines Felds; `qname == None` ist die Wildcard.
struct Slot<'j> {
    qname: Option<QName>,
    items: Vec<Item<'j>>,
}

/// Vorkommen eines deklarierten Felds; leer wenn es fehlt.
fn field_items<'j>(field: &FieldSpec, map: &'j Map<String, Json>, path: &str) -> Result<Vec<Item<'j>>> {
    let key = &*field.qname.local_name;
    let field_path = format!("{path}/{key}");
    let value = match map.get(key) {
        None | Some(Json::Null) => {
            if field.min_occurs > 0 && field.choice.is_none() {
                return Err(Error::field(field_path, "required field missing"));
            }
            return Ok(Vec::new());
        }
        Some(v) => v,
    };
    let FieldKind::Element(grammar) = field.kind else { return Ok(Vec::new()) };
    let item = |value: &'j Json, path: String| Item { qname: field.qname.clone(), grammar, value, path };

    if !field.max_occurs.is_repeated() {
        return Ok(vec![item(value, field_path)]);
    }
    let Json::Array(items) = value else {
        return Err(Error::field(field_path, format!("expected an array, got {}", json_kind(value))));
    };
    if items.len() < field.min_occurs as usize {
        return Err(Error::field(
            field_path,
            format!("{} occurrences, at least {} required", items.len(), field.min_occurs),
        ));
    }
    if !field.max_occurs.allows(items.len()) {
        return Err(Error::field(
            field_path,
            format!("{} occurrences exceed maxOccurs {:?}", items.len(), field.max_occurs),
        ));
    }
    Ok(items.iter().enumerate().map(|(i, v)| item(v, format!("{field_path}[{i}]"))).collect())
}

/// Reihenfolge der Kind-Elemente (Slot-Indizes), die der Automat ab `start`
/// bis zu einem `EE` akzeptiert.
///
/// Tiefensuche ueber die Productions in Code-Reihenfolge, also zuerst die
/// Schema-Order. Sackgassen (Zustand + verbrauchte Vorkommen) werden gemerkt.
fn plan_order(g: &Grammar, start: StateId, slots: &[Slot<'_>]) -> Option<Vec<usize>> {
    let total: usize = slots.iter().map(|s| s.items.len()).sum();
    let mut consumed = vec![0usize; slots.len()];
    let mut order = Vec::with_capacity(total);
    // pro Tiefe: Zustand und naechste zu probierende Production
    let mut frames: Vec<(StateId, usize)> = vec![(start, 0)];
    let mut dead: FastHashSet<(StateId, Vec<usize>)> = FastHashSet::default();
    let mut budget = MAX_ORDER_STEPS;

    while let Some(&(state_id, from)) = frames.last() {
        budget = budget.checked_sub(1)?;
        let known_dead = from == 0 && !dead.is_empty() && dead.contains(&(state_id, consumed.clone()));
        let mut step = None;
        if !known_dead {
            for (i, p) in g.state(state_id)?.productions.iter().enumerate().skip(from) {
                let slot = match &p.terminal {
                    Terminal::EndElement if order.len() == total => return Some(order),
                    Terminal::StartElement { qname, .. } => {
                        slots.iter().position(|s| s.qname.as_ref() == Some(qname))
                    }
                    Terminal::AnyElement => slots.iter().position(|s| s.qname.is_none()),
                    _ => None,
                };
                if let (Some(slot), Some(next)) = (slot, p.next)
                    && consumed[slot] < slots[slot].items.len()
                {
                    step = Some((i, slot, next));
                    break;
                }
            }
        }
        match step {
            Some((i, slot, next)) => {
                if let Some(frame) = frames.last_mut() {
                    frame.1 = i + 1;
                }
                consumed[slot] += 1;
                order.push(slot);
                frames.push((next, 0));
            }
            None => {
                dead.insert((state_id, consumed.clone()));
                frames.pop();
                if let Some(slot) = order.pop() {
                    consumed[slot] -= 1;
                }
            }
        }
    }
    None
}

/// Skalar des Field-Trees als Event-Wert fuer `dt`.
///
/// Strings werden als lexikalische Form durchgereicht; Bereich und Facetten
/// prueft der Encoder.
fn scalar(dt: &Datatype, value: &Json, path: &str) -> Result<Value> {
    let mismatch = || Error::field(path, format!("expected {}, got {}", dt.name(), json_kind(value)));
    Ok(match (dt, value) {
        (Datatype::Boolean, Json::Bool(b)) => Value::Boolean(*b),
        (Datatype::Integer(_), Json::Number(n)) => {
            if let Some(u) = n.as_u64() {
                Value::Unsigned(u)
            } else if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else {
                return Err(Error::field(path, format!("expected an integer, got {n}")));
            }
        }
        (Datatype::Binary { form, .. }, Json::Array(items)) => {
            let bytes = items
                .iter()
                .map(|item| item.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect::<Option<Vec<u8>>>()
                .ok_or_else(|| Error::field(path, "byte arrays hold integers 0..=255"))?;
            match form {
                BinaryForm::Hex => Value::HexBinary(bytes),
                BinaryForm::Base64 => Value::Base64Binary(bytes),
            }
        }
        (Datatype::Enumeration(values), Json::String(s)) => {
            if dt.enum_index(s).is_none() {
                let allowed: Vec<&str> = values.iter().map(|v| &**v).collect();
                return Err(Error::field(path, format!("'{s}' is not one of [{}]", allowed.join(", "))));
            }
            Value::string(s.as_str())
        }
        (Datatype::String(_), Json::Number(_) | Json::Bool(_)) => Value::string(text(value, path)?),
        (_, Json::String(s)) => Value::string(s.as_str()),
        _ => return Err(mismatch()),
    })
}

fn text(value: &Json, path: &str) -> Result<String> {
    match value {
        Json::String(s) => Ok(s.clone()),
        Json::Number(n) => Ok(n.to_string()),
        Json::Bool(b) => Ok(b.to_string()),
        other => Err(Error::field(path, format!("expected text, got {}", json_kind(other)))),
    }
}

fn json_kind(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

// ============================================================================
// Events → Field-Tree
// ============================================================================

/// Faltet eine decodierte Event-Folge zurueck in den Field-Tree von `root`.
pub fn events_to_tree(index: &RootIndex, root: &QName, events: &[ExiEvent]) -> Result<Json> {
    let mut idx = 0usize;
    if matches!(events.get(idx), Some(ExiEvent::StartDocument)) {
        idx += 1;
    }
    let found = match events.get(idx) {
        Some(ExiEvent::StartElement(q)) => q,
        other => return Err(structure_error(format!("expected root element, found {other:?}"))),
    };
    if found != root {
        return Err(structure_error(format!("expected root {root}, found {found}")));
    }
    idx += 1;
    let tree = decode_element(index, events, &mut idx, index.element_grammar(root))?;

    if matches!(events.get(idx), Some(ExiEvent::EndDocument)) {
        idx += 1;
    }
    if idx != events.len() {
        return Err(structure_error("trailing events after the root element"));
    }
    Ok(tree)
}

fn structure_error(message: impl Into<String>) -> Error {
    Error::Decode { offset: 0, state: "Document".into(), message: message.into() }
}

/// Liest bis zum passenden `EE`; `SE` ist bereits konsumiert.
fn decode_element(index: &RootIndex, events: &[ExiEvent], idx: &mut usize, grammar: GrammarId) -> Result<Json> {
    let g = index
        .grammar(grammar)
        .ok_or_else(|| structure_error(format!("grammar {grammar} missing")))?;
    let layout = &g.layout;
    let generic = grammar == BUILT_IN_ELEMENT;

    let mut map = Map::new();
    let mut content: Option<Json> = None;
    loop {
        let event = events.get(*idx).ok_or_else(|| structure_error("unterminated element"))?;
        *idx += 1;
        match event {
            ExiEvent::Attribute(q, v) => {
                if !generic && layout.attributes.iter().any(|a| a.qname == *q) {
                    map.insert(q.local_name.to_string(), value_to_json(v));
                } else {
                    map.insert(format!("{ATTRIBUTE_PREFIX}{q}"), Json::String(v.to_string()));
                }
            }
            ExiEvent::Characters(v) => {
                content = Some(match (content.take(), generic) {
                    // mehrere CH-Events in gemischtem Inhalt
                    (Some(Json::String(prev)), _) => Json::String(prev + &v.to_string()),
                    (_, true) => Json::String(v.to_string()),
                    (_, false) => value_to_json(v),
                });
            }
            ExiEvent::StartElement(child) => {
                let field = layout.fields().iter().find(|f| !f.is_wildcard() && f.qname == *child);
                match field {
                    Some(f) if !generic => {
                        let FieldKind::Element(child_grammar) = f.kind else { continue };
                        let value = decode_element(index, events, idx, child_grammar)?;
                        insert_child(&mut map, f.qname.local_name.to_string(), value, f.max_occurs.is_repeated());
                    }
                    _ => {
                        let value = decode_element(index, events, idx, index.element_grammar(child))?;
                        insert_child(&mut map, child.to_string(), value, false);
                    }
                }
            }
            ExiEvent::EndElement => break,
            other => return Err(structure_error(format!("unexpected {} inside element", other.symbol()))),
        }
    }

    let scalar = generic || g.simple_datatype().is_some();
    Ok(match content {
        Some(value) if scalar && map.is_empty() => value,
        None if scalar && map.is_empty() => Json::String(String::new()),
        Some(value) => {
            map.insert(VALUE_KEY.to_string(), value);
            Json::Object(map)
        }
        None => Json::Object(map),
    })
}

/// Wiederholte Felder sind immer Arrays; generische Kinder erst ab dem zweiten.
fn insert_child(map: &mut Map<String, Json>, key: String, value: Json, repeated: bool) {
    match map.get_mut(&key) {
        Some(Json::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Json::Array(vec![first, value]);
        }
        None => {
            map.insert(key, if repeated { Json::Array(vec![value]) } else { value });
        }
    }
}

fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Boolean(b) => Json::Bool(*b),
        Value::Integer(i) => Json::Number(Number::from(*i)),
        Value::Unsigned(u) => Json::Number(Number::from(*u)),
        Value::HexBinary(bytes) | Value::Base64Binary(bytes) => {
            Json::Array(bytes.iter().map(|b| Json::Number(Number::from(*b))).collect())
        }
        Value::String(s) => Json::String(s.to_string()),
    }
}
