//! String Table eines einzelnen Encode- oder Decode-Aufrufs.
//!
//! Partitionen:
//! - URI und Local Name (pro URI) fuer QNames generischer Productions,
//! - Values: eine globale Partition plus eine lokale pro QName.
//!
//! Eintraege werden in Reihenfolge des ersten Auftretens angehaengt und nie
//! entfernt. Die Tabelle lebt genau einen Aufruf lang; vorbelegt wird sie aus
//! dem [`TableSeed`] des geladenen Schemas.

use std::sync::Arc;

use crate::bitstream::{BitReader, BitWriter};
use crate::qname::{QName, XML_NS, XSD_NS, XSI_NS};
use crate::{Error, FastHashMap, Result, bit_width, n_bit_unsigned_integer, string, unsigned_integer};

/// Die 46 eingebauten XSD-Typnamen der XSD-Namespace-Partition, sortiert.
const XSD_BUILTIN_TYPES: [&str; 46] = [
    "ENTITIES", "ENTITY", "ID", "IDREF", "IDREFS", "NCName", "NMTOKEN", "NMTOKENS",
    "NOTATION", "Name", "QName", "anySimpleType", "anyType", "anyURI", "base64Binary",
    "boolean", "byte", "date", "dateTime", "decimal", "double", "duration", "float",
    "gDay", "gMonth", "gMonthDay", "gYear", "gYearMonth", "hexBinary", "int", "integer",
    "language", "long", "negativeInteger", "nonNegativeInteger", "nonPositiveInteger",
    "normalizedString", "positiveInteger", "short", "string", "time", "token",
    "unsignedByte", "unsignedInt", "unsignedLong", "unsignedShort",
];

/// Ergebnis von [`StringTable::intern_global`] / [`StringTable::intern_local`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interned {
    /// Bereits vorhanden unter diesem Index.
    Hit(usize),
    /// Nicht vorhanden; der Aufrufer schreibt ein Literal.
    Miss,
}

/// Fundstelle eines Values beim Encoden.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueHit {
    Local(usize),
    Global(usize),
}

#[derive(Debug, Clone, Default)]
struct Partition {
    entries: Vec<Arc<str>>,
    index: FastHashMap<Arc<str>, usize>,
}

impl Partition {
    fn with_entries<S: AsRef<str>>(values: &[S]) -> Self {
        let mut p = Self::default();
        for v in values {
            p.add(v.as_ref());
        }
        p
    }

    fn lookup(&self, value: &str) -> Option<usize> {
        self.index.get(value).copied()
    }

    fn add(&mut self, value: &str) -> usize {
        if let Some(id) = self.lookup(value) {
            return id;
        }
        let id = self.entries.len();
        let shared: Arc<str> = value.into();
        self.index.insert(Arc::clone(&shared), id);
        self.entries.push(shared);
        id
    }

    fn get(&self, id: usize) -> Option<&Arc<str>> {
        self.entries.get(id)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Vorbelegung der URI- und Local-Name-Partitionen, einmal pro Schema berechnet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSeed {
    uris: Vec<Arc<str>>,
    local_names: Vec<Vec<Arc<str>>>,
}

impl TableSeed {
    /// Baut die Vorbelegung aus allen QNames eines Schemas.
    ///
    /// Reihenfolge: `""`, XML, XSI, XSD, danach die Schema-Namespaces sortiert;
    /// Local Names pro URI sortiert und ohne Duplikate.
    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a QName>) -> Self {
        let mut uris: Vec<Arc<str>> =
            ["", XML_NS, XSI_NS, XSD_NS].iter().map(|u| Arc::from(*u)).collect();
        let mut local_names: Vec<Vec<Arc<str>>> = vec![
            Vec::new(),
            ["base", "id", "lang", "space"].iter().map(|l| Arc::from(*l)).collect(),
            ["nil", "type"].iter().map(|l| Arc::from(*l)).collect(),
            XSD_BUILTIN_TYPES.iter().map(|l| Arc::from(*l)).collect(),
        ];

        let mut extra: Vec<&QName> = names.into_iter().collect();
        extra.sort_by(|a, b| (&*a.uri, &*a.local_name).cmp(&(&*b.uri, &*b.local_name)));
        for q in extra {
            let uri_id = match uris.iter().position(|u| *u == q.uri) {
                Some(id) => id,
                None => {
                    uris.push(Arc::clone(&q.uri));
                    local_names.push(Vec::new());
                    uris.len() - 1
                }
            };
            let names = &mut local_names[uri_id];
            if !names.contains(&q.local_name) {
                names.push(Arc::clone(&q.local_name));
            }
        }
        // eingebaute Partitionen sind bereits sortiert; neu hinzugekommene Namen
        // in bestehenden Partitionen (z.B. "" oder XSD) sortiert einordnen
        for names in &mut local_names {
            names.sort();
        }
        // Schema-URIs nach den vier eingebauten sortieren
        let mut tail: Vec<(Arc<str>, Vec<Arc<str>>)> =
            uris.drain(4..).zip(local_names.drain(4..)).collect();
        tail.sort_by(|a, b| a.0.cmp(&b.0));
        for (uri, names) in tail {
            uris.push(uri);
            local_names.push(names);
        }
        Self { uris, local_names }
    }
}

impl Default for TableSeed {
    fn default() -> Self {
        Self::from_names(std::iter::empty())
    }
}

#[derive(Debug, Clone)]
pub struct StringTable {
    uris: Partition,
    local_names: Vec<Partition>,
    global_values: Partition,
    local_values: FastHashMap<QName, Partition>,
    /// Obergrenze fuer globale Value-Eintraege; danach wird nichts mehr aufgenommen.
    capacity: Option<usize>,
}

impl StringTable {
    pub fn new(seed: &TableSeed, capacity: Option<usize>) -> Self {
        Self {
            uris: Partition::with_entries(seed.uris.as_slice()),
            local_names: seed.local_names.iter().map(|n| Partition::with_entries(n.as_slice())).collect(),
            global_values: Partition::default(),
            local_values: FastHashMap::default(),
            capacity,
        }
    }

    // ------------------------------------------------------------------
    // Values
    // ------------------------------------------------------------------

    /// Sucht `value` in der globalen Partition; bei Miss wird er angehaengt.
    pub fn intern_global(&mut self, value: &str) -> Interned {
        match self.global_values.lookup(value) {
            Some(id) => Interned::Hit(id),
            None => {
                if self.accepts(value) {
                    self.global_values.add(value);
                }
                Interned::Miss
            }
        }
    }

    /// Sucht `value` in der lokalen Partition von `qname`; bei Miss wird er angehaengt.
    pub fn intern_local(&mut self, qname: &QName, value: &str) -> Interned {
        if let Some(id) = self.lookup_local(qname, value) {
            return Interned::Hit(id);
        }
        if self.accepts(value) {
            self.local_values.entry(qname.clone()).or_default().add(value);
        }
        Interned::Miss
    }

    /// Nimmt einen neu gesehenen Value auf: erst lokal, dann global.
    pub fn record_value(&mut self, qname: &QName, value: &str) {
        if self.accepts(value) {
            self.intern_local(qname, value);
            self.intern_global(value);
        }
    }

    /// Leere Strings und Values jenseits der Kapazitaet werden nicht aufgenommen.
    fn accepts(&self, value: &str) -> bool {
        !value.is_empty() && self.capacity.is_none_or(|cap| self.global_values.len() < cap)
    }

    pub fn lookup_local(&self, qname: &QName, value: &str) -> Option<usize> {
        self.local_values.get(qname)?.lookup(value)
    }

    pub fn lookup_value(&self, qname: &QName, value: &str) -> Option<ValueHit> {
        if let Some(id) = self.lookup_local(qname, value) {
            return Some(ValueHit::Local(id));
        }
        self.global_values.lookup(value).map(ValueHit::Global)
    }

    pub fn global_value_count(&self) -> usize {
        self.global_values.len()
    }

    pub fn local_value_count(&self, qname: &QName) -> usize {
        self.local_values.get(qname).map_or(0, Partition::len)
    }

    /// Schreibt einen Value: `0` + lokaler Index, `1` + globaler Index oder
    /// `Laenge + 2` + Literal (danach aufgenommen).
    pub fn encode_value(&mut self, writer: &mut BitWriter, qname: &QName, value: &str) {
        match self.lookup_value(qname, value) {
            Some(ValueHit::Local(id)) => {
                unsigned_integer::encode(writer, 0);
                let bits = bit_width::for_count(self.local_value_count(qname));
                writer.write_bits(id as u64, bits);
            }
            Some(ValueHit::Global(id)) => {
                unsigned_integer::encode(writer, 1);
                let bits = bit_width::for_count(self.global_value_count());
                writer.write_bits(id as u64, bits);
            }
            None => {
                unsigned_integer::encode(writer, string::char_count(value) + 2);
                string::encode_chars(writer, value);
                self.record_value(qname, value);
            }
        }
    }

    pub fn decode_value(&mut self, reader: &mut BitReader, qname: &QName) -> Result<Arc<str>> {
        match unsigned_integer::decode(reader)? {
            0 => {
                let count = self.local_value_count(qname);
                let id = n_bit_unsigned_integer::decode(reader, bit_width::for_count(count))? as usize;
                self.local_values
                    .get(qname)
                    .and_then(|p| p.get(id))
                    .cloned()
                    .ok_or_else(|| invalid_id("local value", id, count))
            }
            1 => {
                let count = self.global_value_count();
                let id = n_bit_unsigned_integer::decode(reader, bit_width::for_count(count))? as usize;
                self.global_values
                    .get(id)
                    .cloned()
                    .ok_or_else(|| invalid_id("global value", id, count))
            }
            len_plus_two => {
                let value: Arc<str> = string::decode_chars(reader, len_plus_two - 2)?.into();
                self.record_value(qname, &value);
                Ok(value)
            }
        }
    }

    // ------------------------------------------------------------------
    // QNames
    // ------------------------------------------------------------------

    /// URI: n-Bit `id + 1` bei Treffer, sonst `0` + String-Literal.
    /// Local Name: `0` + n-Bit-Index bei Treffer, sonst `Laenge + 1` + Literal.
    pub fn encode_qname(&mut self, writer: &mut BitWriter, qname: &QName) {
        let uri_bits = bit_width::for_count(self.uris.len() + 1);
        let uri_id = match self.uris.lookup(&qname.uri) {
            Some(id) => {
                writer.write_bits(id as u64 + 1, uri_bits);
                id
            }
            None => {
                writer.write_bits(0, uri_bits);
                string::encode(writer, &qname.uri);
                self.add_uri(&qname.uri)
            }
        };

        let names = &mut self.local_names[uri_id];
        match names.lookup(&qname.local_name) {
            Some(id) => {
                unsigned_integer::encode(writer, 0);
                writer.write_bits(id as u64, bit_width::for_count(names.len()));
            }
            None => {
                unsigned_integer::encode(writer, string::char_count(&qname.local_name) + 1);
                string::encode_chars(writer, &qname.local_name);
                names.add(&qname.local_name);
            }
        }
    }

    pub fn decode_qname(&mut self, reader: &mut BitReader) -> Result<QName> {
        let uri_bits = bit_width::for_count(self.uris.len() + 1);
        let uri_id = match n_bit_unsigned_integer::decode(reader, uri_bits)? as usize {
            0 => {
                let uri = string::decode(reader)?;
                self.add_uri(&uri)
            }
            id_plus_one => {
                let id = id_plus_one - 1;
                if id >= self.uris.len() {
                    return Err(invalid_id("uri", id, self.uris.len()));
                }
                id
            }
        };
        let uri = self.uris.get(uri_id).cloned().ok_or(Error::PrematureEndOfStream)?;

        let names = &mut self.local_names[uri_id];
        let local_name = match unsigned_integer::decode(reader)? {
            0 => {
                let id = n_bit_unsigned_integer::decode(reader, bit_width::for_count(names.len()))? as usize;
                names.get(id).cloned().ok_or_else(|| invalid_id("local name", id, names.len()))?
            }
            len_plus_one => {
                let name = string::decode_chars(reader, len_plus_one - 1)?;
                let id = names.add(&name);
                Arc::clone(&names.entries[id])
            }
        };
        Ok(QName { uri, local_name })
    }

    fn add_uri(&mut self, uri: &str) -> usize {
        let id = self.uris.add(uri);
        if id == self.local_names.len() {
            self.local_names.push(Partition::default());
        }
        id
    }
}

fn invalid_id(partition: &str, id: usize, count: usize) -> Error {
    Error::malformed(format!("{partition} id {id} out of range (table has {count})"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> StringTable {
        StringTable::new(&TableSeed::default(), None)
    }

    #[test]
    fn intern_global_assigns_sequential_ids() {
        let mut t = table();
        assert_eq!(t.intern_global("a"), Interned::Miss);
        assert_eq!(t.intern_global("b"), Interned::Miss);
        assert_eq!(t.intern_global("a"), Interned::Hit(0));
        assert_eq!(t.intern_global("b"), Interned::Hit(1));
    }

    #[test]
    fn intern_local_is_scoped_per_qname() {
        let mut t = table();
        let q1 = QName::local("EVSEID");
        let q2 = QName::local("EVCCID");
        assert_eq!(t.intern_local(&q1, "DE*ABC"), Interned::Miss);
        assert_eq!(t.intern_local(&q1, "DE*ABC"), Interned::Hit(0));
        assert_eq!(t.intern_local(&q2, "DE*ABC"), Interned::Miss);
    }

    #[test]
    fn encode_prefers_local_then_global() {
        let mut t = table();
        let a = QName::local("A");
        let b = QName::local("B");
        let mut w = BitWriter::new();
        t.encode_value(&mut w, &a, "hello");
        let literal_bits = w.bit_position();
        t.encode_value(&mut w, &a, "hello");
        let local_bits = w.bit_position() - literal_bits;
        t.encode_value(&mut w, &b, "hello");
        let data = w.into_vec();

        // Literal: Laenge+2 (1 Oktett) + 5 Zeichen
        assert_eq!(literal_bits, 6 * 8);
        // Local-Hit: Oktett 0 + 0 Bits Index (Partition hat 1 Eintrag)
        assert_eq!(local_bits, 8);

        let mut d = table();
        let mut r = BitReader::new(&data);
        assert_eq!(&*d.decode_value(&mut r, &a).unwrap(), "hello");
        assert_eq!(&*d.decode_value(&mut r, &a).unwrap(), "hello");
        assert_eq!(&*d.decode_value(&mut r, &b).unwrap(), "hello");
        // global-Hit fuegt nichts zur lokalen Partition von B hinzu
        assert_eq!(d.local_value_count(&b), 0);
    }

    #[test]
    fn capacity_stops_growth_without_eviction() {
        let mut t = StringTable::new(&TableSeed::default(), Some(1));
        let q = QName::local("v");
        t.record_value(&q, "first");
        t.record_value(&q, "second");
        assert_eq!(t.global_value_count(), 1);
        assert_eq!(t.lookup_value(&q, "first"), Some(ValueHit::Local(0)));
        assert_eq!(t.lookup_value(&q, "second"), None);
    }

    #[test]
    fn empty_string_is_never_recorded() {
        let mut t = table();
        t.record_value(&QName::local("v"), "");
        assert_eq!(t.global_value_count(), 0);
    }

    #[test]
    fn qname_literal_then_hit() {
        let mut t = table();
        let q = QName::new("urn:test", "Extra");
        let mut w = BitWriter::new();
        t.encode_qname(&mut w, &q);
        let first = w.bit_position();
        t.encode_qname(&mut w, &q);
        assert!(w.bit_position() - first < first);
        let data = w.into_vec();

        let mut d = table();
        let mut r = BitReader::new(&data);
        assert_eq!(d.decode_qname(&mut r).unwrap(), q);
        assert_eq!(d.decode_qname(&mut r).unwrap(), q);
    }

    #[test]
    fn seed_sorts_schema_namespaces() {
        let names = [
            QName::new("urn:b", "Y"),
            QName::new("urn:a", "X"),
            QName::local("Root"),
        ];
        let seed = TableSeed::from_names(names.iter());
        assert_eq!(seed.uris.len(), 6);
        assert_eq!(&*seed.uris[4], "urn:a");
        assert_eq!(&*seed.uris[5], "urn:b");
        assert_eq!(seed.local_names[0], vec![Arc::<str>::from("Root")]);
        assert_eq!(seed.local_names[3].len(), XSD_BUILTIN_TYPES.len());
    }
}
