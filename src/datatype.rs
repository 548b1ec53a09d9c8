//! Compilierte Simple-Datentypen und ihre Bitdarstellung.
//!
//! | Typ | Darstellung |
//! |---|---|
//! | boolean | 1 Bit |
//! | Integer mit `max - min < 4096` | n-Bit-Offset von `min` |
//! | Integer mit `min >= 0` | Unsigned Integer |
//! | sonstige Integer | Vorzeichenbit + Betrag |
//! | hexBinary, base64Binary | Laenge + Oktette |
//! | String-Familie | String-Table-Value |
//! | Enumeration | n-Bit-Index in die Werteliste |
//!
//! Facetten werden beim Encodieren geprueft; eine Verletzung ist ein
//! [`Error::Encode`].

use std::sync::Arc;

use crate::bitstream::{BitReader, BitWriter};
use crate::event::Value;
use crate::integer::MAX_BOUNDED_RANGE;
use crate::qname::QName;
use crate::schema::Facets;
use crate::string_table::StringTable;
use crate::{
    Error, Result, binary, bit_width, boolean, integer, n_bit_unsigned_integer, string,
    unsigned_integer,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LengthFacets {
    pub min: Option<u64>,
    pub max: Option<u64>,
}

impl LengthFacets {
    fn check(&self, len: u64, unit: &str) -> Result<()> {
        if let Some(min) = self.min
            && len < min
        {
            return Err(Error::encode(format!("{len} {unit} shorter than minimum length {min}")));
        }
        if let Some(max) = self.max
            && len > max
        {
            return Err(Error::encode(format!("{len} {unit} exceed maximum length {max}")));
        }
        Ok(())
    }

    fn restrict(self, facets: &Facets) -> Self {
        let min = facets.length.or(facets.min_length).or(self.min);
        let max = facets.length.or(facets.max_length).or(self.max);
        Self { min, max }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryForm {
    Hex,
    Base64,
}

/// Wertebereich eines Integer-Typs; `None` heisst unbeschraenkt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntegerType {
    pub min: Option<i128>,
    pub max: Option<i128>,
}

/// Bitdarstellung eines Integer-Typs, abgeleitet aus dem Wertebereich.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegerRepr {
    NBit { min: i64, max: i64 },
    Unsigned,
    Signed,
}

impl IntegerType {
    const fn new(min: Option<i128>, max: Option<i128>) -> Self {
        Self { min, max }
    }

    pub fn repr(&self) -> IntegerRepr {
        match (self.min, self.max) {
            (Some(min), Some(max))
                if max.checked_sub(min).is_some_and(|range| range < MAX_BOUNDED_RANGE)
                    && i64::try_from(min).is_ok()
                    && i64::try_from(max).is_ok() =>
            {
                IntegerRepr::NBit { min: min as i64, max: max as i64 }
            }
            (Some(min), _) if min >= 0 => IntegerRepr::Unsigned,
            _ => IntegerRepr::Signed,
        }
    }

    /// Decodierte Werte dieses Typs sind [`Value::Unsigned`].
    pub fn is_unsigned(&self) -> bool {
        self.min.is_some_and(|m| m >= 0)
    }

    fn check(&self, v: i128) -> Result<()> {
        if self.min.is_some_and(|m| v < m) || self.max.is_some_and(|m| v > m) {
            let bound = |b: Option<i128>| b.map_or_else(|| "*".to_string(), |b| b.to_string());
            return Err(Error::encode(format!(
                "integer {v} outside [{}, {}]",
                bound(self.min),
                bound(self.max)
            )));
        }
        Ok(())
    }

    fn to_value(&self, v: i128) -> Result<Value> {
        if self.is_unsigned() {
            u64::try_from(v).map(Value::Unsigned)
        } else {
            i64::try_from(v).map(Value::Integer)
        }
        .map_err(|_| Error::encode(format!("integer {v} does not fit in 64 bits")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datatype {
    Boolean,
    Integer(IntegerType),
    Binary { form: BinaryForm, length: LengthFacets },
    String(LengthFacets),
    Enumeration(Vec<Arc<str>>),
}

/// Bereiche der eingebauten Integer-Typen.
const INTEGER_BUILTINS: &[(&str, Option<i128>, Option<i128>)] = &[
    ("integer", None, None),
    ("nonNegativeInteger", Some(0), None),
    ("positiveInteger", Some(1), None),
    ("nonPositiveInteger", None, Some(0)),
    ("negativeInteger", None, Some(-1)),
    ("long", Some(i64::MIN as i128), Some(i64::MAX as i128)),
    ("int", Some(i32::MIN as i128), Some(i32::MAX as i128)),
    ("short", Some(i16::MIN as i128), Some(i16::MAX as i128)),
    ("byte", Some(i8::MIN as i128), Some(i8::MAX as i128)),
    ("unsignedLong", Some(0), Some(u64::MAX as i128)),
    ("unsignedInt", Some(0), Some(u32::MAX as i128)),
    ("unsignedShort", Some(0), Some(u16::MAX as i128)),
    ("unsignedByte", Some(0), Some(u8::MAX as i128)),
];

const STRING_BUILTINS: &[&str] = &[
    "string",
    "normalizedString",
    "token",
    "language",
    "Name",
    "NCName",
    "NMTOKEN",
    "ID",
    "IDREF",
    "ENTITY",
    "anyURI",
    "anySimpleType",
];

/// Eingebaute Typen ohne Darstellung in diesem Profil.
const UNSUPPORTED_BUILTINS: &[&str] = &[
    "float",
    "double",
    "decimal",
    "duration",
    "dateTime",
    "time",
    "date",
    "gYearMonth",
    "gYear",
    "gMonthDay",
    "gDay",
    "gMonth",
    "QName",
    "NOTATION",
    "NMTOKENS",
    "IDREFS",
    "ENTITIES",
];

impl Datatype {
    /// Ungetypter String (undeklarierte Attribute und Zeichendaten).
    pub fn untyped() -> Self {
        Self::String(LengthFacets::default())
    }

    /// Eingebauter XSD-Typ nach Local Name.
    ///
    /// `Ok(None)` wenn der Name kein eingebauter Simple Type ist.
    pub fn builtin(local_name: &str, path: &str) -> Result<Option<Self>> {
        if local_name == "boolean" {
            return Ok(Some(Self::Boolean));
        }
        if let Some(&(_, min, max)) = INTEGER_BUILTINS.iter().find(|(n, ..)| *n == local_name) {
            return Ok(Some(Self::Integer(IntegerType::new(min, max))));
        }
        if STRING_BUILTINS.contains(&local_name) {
            return Ok(Some(Self::untyped()));
        }
        match local_name {
            "hexBinary" => {
                return Ok(Some(Self::Binary { form: BinaryForm::Hex, length: LengthFacets::default() }));
            }
            "base64Binary" => {
                return Ok(Some(Self::Binary {
                    form: BinaryForm::Base64,
                    length: LengthFacets::default(),
                }));
            }
            _ => {}
        }
        if UNSUPPORTED_BUILTINS.contains(&local_name) {
            return Err(Error::unsupported(path, format!("datatype xs:{local_name}")));
        }
        Ok(None)
    }

    /// Wendet die Facetten einer Restriction auf diesen Basistyp an.
    pub fn restrict(&self, facets: &Facets, path: &str) -> Result<Self> {
        let has_range = facets.min_inclusive.is_some() || facets.max_inclusive.is_some();
        let has_length =
            facets.length.is_some() || facets.min_length.is_some() || facets.max_length.is_some();

        if !facets.enumeration.is_empty() {
            // Werte muessen im Basistyp gueltig sein
            for v in &facets.enumeration {
                self.coerce(&Value::string(v.as_str())).map_err(|e| {
                    Error::schema_load("", format!("{path}: enumeration value '{v}' invalid: {e}"))
                })?;
            }
            return Ok(Self::Enumeration(
                facets.enumeration.iter().map(|v| Arc::from(v.as_str())).collect(),
            ));
        }

        match self {
            Self::Integer(t) if !has_length => {
                let min = match (t.min, facets.min_inclusive) {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    (a, b) => a.or(b),
                };
                let max = match (t.max, facets.max_inclusive) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                };
                if let (Some(lo), Some(hi)) = (min, max)
                    && hi < lo
                {
                    return Err(Error::schema_load("", format!("{path}: empty integer range [{lo}, {hi}]")));
                }
                Ok(Self::Integer(IntegerType::new(min, max)))
            }
            Self::String(len) if !has_range => Ok(Self::String(len.restrict(facets))),
            Self::Binary { form, length } if !has_range => {
                Ok(Self::Binary { form: *form, length: length.restrict(facets) })
            }
            Self::Boolean | Self::Enumeration(_) if !has_range && !has_length => Ok(self.clone()),
            _ => Err(Error::unsupported(path, format!("facets {facets:?} on {}", self.name()))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Integer(_) => "integer",
            Self::Binary { form: BinaryForm::Hex, .. } => "hexBinary",
            Self::Binary { form: BinaryForm::Base64, .. } => "base64Binary",
            Self::String(_) => "string",
            Self::Enumeration(_) => "enumeration",
        }
    }

    /// Nimmt einen Leerstring an (fuer implizites `CH("")` vor `EE`).
    pub fn accepts_empty(&self) -> bool {
        self.coerce(&Value::string("")).is_ok()
    }

    /// Bringt einen Wert in die kanonische Variante dieses Typs.
    ///
    /// Lexikalische Strings werden geparst; Bereichs- und Laengenfacetten
    /// werden geprueft.
    pub fn coerce(&self, value: &Value) -> Result<Value> {
        match self {
            Self::Boolean => match value {
                Value::Boolean(_) => Ok(value.clone()),
                Value::String(s) => boolean::parse_lexical(s)
                    .map(Value::Boolean)
                    .ok_or_else(|| mismatch(self, value)),
                _ => Err(mismatch(self, value)),
            },
            Self::Integer(t) => {
                let v = match value {
                    Value::Integer(i) => i128::from(*i),
                    Value::Unsigned(u) => i128::from(*u),
                    Value::String(s) => parse_integer(s).ok_or_else(|| mismatch(self, value))?,
                    _ => return Err(mismatch(self, value)),
                };
                t.check(v)?;
                t.to_value(v)
            }
            Self::Binary { form, length } => {
                let bytes = match value {
                    Value::HexBinary(b) | Value::Base64Binary(b) => b.clone(),
                    Value::String(s) => match form {
                        BinaryForm::Hex => binary::parse_hex(s),
                        BinaryForm::Base64 => binary::parse_base64(s),
                    }
                    .ok_or_else(|| mismatch(self, value))?,
                    _ => return Err(mismatch(self, value)),
                };
                length.check(bytes.len() as u64, "bytes")?;
                Ok(match form {
                    BinaryForm::Hex => Value::HexBinary(bytes),
                    BinaryForm::Base64 => Value::Base64Binary(bytes),
                })
            }
            Self::String(length) => {
                let s: Arc<str> = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string().into(),
                };
                length.check(string::char_count(&s), "characters")?;
                Ok(Value::String(s))
            }
            Self::Enumeration(values) => {
                let token = value.to_string();
                let token = token.trim();
                values
                    .iter()
                    .find(|v| &***v == token)
                    .map(|v| Value::String(v.clone()))
                    .ok_or_else(|| Error::encode(format!("'{token}' is not an enumerated value")))
            }
        }
    }

    /// Index eines Enumeration-Werts.
    pub fn enum_index(&self, token: &str) -> Option<usize> {
        match self {
            Self::Enumeration(values) => values.iter().position(|v| &**v == token),
            _ => None,
        }
    }

    /// Schreibt `value`; `qname` waehlt die lokale String-Table-Partition.
    pub fn encode(
        &self,
        writer: &mut BitWriter,
        table: &mut StringTable,
        qname: &QName,
        value: &Value,
    ) -> Result<()> {
        match (self, self.coerce(value)?) {
            (Self::Boolean, Value::Boolean(b)) => boolean::encode(writer, b),
            (Self::Integer(t), v) => encode_integer(writer, t, &v)?,
            (Self::Binary { .. }, Value::HexBinary(b) | Value::Base64Binary(b)) => {
                binary::encode(writer, &b);
            }
            (Self::String(_), Value::String(s)) => table.encode_value(writer, qname, &s),
            (Self::Enumeration(values), Value::String(s)) => {
                let index = values.iter().position(|v| *v == s).unwrap_or_default();
                n_bit_unsigned_integer::encode(writer, index as u64, bit_width::for_count(values.len()))?;
            }
            (_, v) => return Err(mismatch(self, &v)),
        }
        Ok(())
    }

    pub fn decode(
        &self,
        reader: &mut BitReader,
        table: &mut StringTable,
        qname: &QName,
    ) -> Result<Value> {
        Ok(match self {
            Self::Boolean => Value::Boolean(boolean::decode(reader)?),
            Self::Integer(t) => match t.repr() {
                IntegerRepr::NBit { min, max } => {
                    let v = integer::decode_bounded(reader, min, max)?;
                    t.to_value(i128::from(v)).map_err(|e| Error::malformed(e.to_string()))?
                }
                IntegerRepr::Unsigned => Value::Unsigned(unsigned_integer::decode(reader)?),
                IntegerRepr::Signed => {
                    let v = integer::decode(reader)?;
                    if t.is_unsigned() {
                        // Signed mit min >= 0 kommt nicht vor; repr() waehlt dann Unsigned
                        Value::Unsigned(v as u64)
                    } else {
                        Value::Integer(v)
                    }
                }
            },
            Self::Binary { form: BinaryForm::Hex, .. } => Value::HexBinary(binary::decode(reader)?),
            Self::Binary { form: BinaryForm::Base64, .. } => {
                Value::Base64Binary(binary::decode(reader)?)
            }
            Self::String(_) => Value::String(table.decode_value(reader, qname)?),
            Self::Enumeration(values) => {
                let bits = bit_width::for_count(values.len());
                let index = n_bit_unsigned_integer::decode(reader, bits)? as usize;
                let v = values.get(index).ok_or_else(|| {
                    Error::malformed(format!(
                        "enumeration index {index} out of range ({} values)",
                        values.len()
                    ))
                })?;
                Value::String(v.clone())
            }
        })
    }
}

fn encode_integer(writer: &mut BitWriter, t: &IntegerType, v: &Value) -> Result<()> {
    let wide = match v {
        Value::Integer(i) => i128::from(*i),
        Value::Unsigned(u) => i128::from(*u),
        _ => return Err(Error::encode(format!("expected integer, got '{v}'"))),
    };
    match t.repr() {
        IntegerRepr::NBit { min, max } => integer::encode_bounded(writer, wide as i64, min, max),
        IntegerRepr::Unsigned => {
            let u = u64::try_from(wide).map_err(|_| Error::encode(format!("integer {wide} is negative")))?;
            unsigned_integer::encode(writer, u);
            Ok(())
        }
        IntegerRepr::Signed => {
            let i = i64::try_from(wide)
                .map_err(|_| Error::encode(format!("integer {wide} does not fit in 64 bits")))?;
            integer::encode(writer, i);
            Ok(())
        }
    }
}

fn parse_integer(text: &str) -> Option<i128> {
    let t = text.trim();
    t.strip_prefix('+').unwrap_or(t).parse().ok()
}

fn mismatch(dt: &Datatype, value: &Value) -> Error {
    Error::encode(format!("'{value}' is not a valid {}", dt.name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::string_table::TableSeed;

    fn builtin(name: &str) -> Datatype {
        Datatype::builtin(name, "test").unwrap().unwrap()
    }

    fn round_trip(dt: &Datatype, value: Value) -> (Value, usize) {
        let q = QName::local("v");
        let seed = TableSeed::default();
        let mut w = BitWriter::new();
        dt.encode(&mut w, &mut StringTable::new(&seed, None), &q, &value).unwrap();
        let bits = w.bit_position();
        let data = w.into_vec();
        let decoded = dt
            .decode(&mut BitReader::new(&data), &mut StringTable::new(&seed, None), &q)
            .unwrap();
        (decoded, bits)
    }

    #[test]
    fn integer_darstellungen() {
        assert_eq!(
            builtin("byte"),
            Datatype::Integer(IntegerType { min: Some(-128), max: Some(127) })
        );
        let Datatype::Integer(t) = builtin("unsignedByte") else { panic!() };
        assert_eq!(t.repr(), IntegerRepr::NBit { min: 0, max: 255 });
        let Datatype::Integer(t) = builtin("unsignedLong") else { panic!() };
        assert_eq!(t.repr(), IntegerRepr::Unsigned);
        let Datatype::Integer(t) = builtin("long") else { panic!() };
        assert_eq!(t.repr(), IntegerRepr::Signed);
        let Datatype::Integer(t) = builtin("short") else { panic!() };
        assert_eq!(t.repr(), IntegerRepr::Signed);
    }

    #[test]
    fn extremer_wertebereich_ist_signed() {
        let t = IntegerType { min: Some(i128::MIN), max: Some(i128::MAX) };
        assert_eq!(t.repr(), IntegerRepr::Signed);
        let facets = Facets { min_inclusive: Some(i128::MIN), max_inclusive: Some(i128::MAX), ..Default::default() };
        let Datatype::Integer(t) = builtin("integer").restrict(&facets, "x").unwrap() else { panic!() };
        assert_eq!(t.repr(), IntegerRepr::Signed);
    }

    #[test]
    fn byte_braucht_acht_bits() {
        let (v, bits) = round_trip(&builtin("byte"), Value::from("-3"));
        assert_eq!(v, Value::Integer(-3));
        assert_eq!(bits, 8);
    }

    #[test]
    fn unsigned_long_timestamp() {
        let (v, bits) = round_trip(&builtin("unsignedLong"), Value::Unsigned(1_234_567_890));
        assert_eq!(v, Value::Unsigned(1_234_567_890));
        // 31 Bit Nutzdaten -> 5 Oktette
        assert_eq!(bits, 40);
    }

    #[test]
    fn bereichsfacetten() {
        let facets = Facets { min_inclusive: Some(0), max_inclusive: Some(100), ..Default::default() };
        let percent = builtin("byte").restrict(&facets, "p").unwrap();
        let (v, bits) = round_trip(&percent, Value::Unsigned(42));
        assert_eq!(v, Value::Unsigned(42));
        assert_eq!(bits, 7);

        let mut w = BitWriter::new();
        let err = percent
            .encode(&mut w, &mut StringTable::new(&TableSeed::default(), None), &QName::local("p"), &Value::Integer(101))
            .unwrap_err();
        assert!(matches!(err, Error::Encode { .. }), "{err:?}");
    }

    #[test]
    fn negativ_in_unsigned() {
        let err = builtin("unsignedInt").coerce(&Value::Integer(-1)).unwrap_err();
        assert!(err.to_string().contains("outside"));
    }

    #[test]
    fn integer_ueberlauf() {
        let err = builtin("integer").coerce(&Value::from("99999999999999999999")).unwrap_err();
        assert!(matches!(err, Error::Encode { .. }));
    }

    #[test]
    fn binary_mit_laenge() {
        let facets = Facets { max_length: Some(4), ..Default::default() };
        let id = builtin("hexBinary").restrict(&facets, "id").unwrap();
        let (v, bits) = round_trip(&id, Value::from("01020304"));
        assert_eq!(v, Value::HexBinary(vec![1, 2, 3, 4]));
        assert_eq!(bits, 8 + 32);
        assert!(id.coerce(&Value::HexBinary(vec![0; 5])).is_err());
        assert!(id.coerce(&Value::from("zz")).is_err());
    }

    #[test]
    fn base64_lexikalisch() {
        let v = builtin("base64Binary").coerce(&Value::from("AQID")).unwrap();
        assert_eq!(v, Value::Base64Binary(vec![1, 2, 3]));
    }

    #[test]
    fn string_laengenfacette() {
        let facets = Facets { max_length: Some(3), ..Default::default() };
        let s = builtin("string").restrict(&facets, "s").unwrap();
        assert!(s.coerce(&Value::from("abc")).is_ok());
        assert!(matches!(s.coerce(&Value::from("abcd")), Err(Error::Encode { .. })));
        assert!(s.accepts_empty());
        let fixed = builtin("string")
            .restrict(&Facets { length: Some(2), ..Default::default() }, "s")
            .unwrap();
        assert!(!fixed.accepts_empty());
    }

    #[test]
    fn enumeration_index() {
        let facets = Facets {
            enumeration: vec!["Ongoing".into(), "Finished".into(), "Failed".into()],
            ..Default::default()
        };
        let e = builtin("string").restrict(&facets, "e").unwrap();
        let (v, bits) = round_trip(&e, Value::from("Failed"));
        assert_eq!(v, Value::from("Failed"));
        assert_eq!(bits, 2);
        assert_eq!(e.enum_index("Finished"), Some(1));
        assert!(e.coerce(&Value::from("Unknown")).is_err());
    }

    #[test]
    fn enumeration_werte_muessen_zum_basistyp_passen() {
        let facets = Facets { enumeration: vec!["x".into()], ..Default::default() };
        assert!(builtin("int").restrict(&facets, "e").is_err());
    }

    #[test]
    fn nicht_unterstuetzte_typen() {
        for name in ["float", "decimal", "dateTime", "QName"] {
            assert!(matches!(
                Datatype::builtin(name, "x"),
                Err(Error::UnsupportedConstruct { .. })
            ));
        }
        assert_eq!(Datatype::builtin("anyType", "x").unwrap(), None);
    }

    #[test]
    fn boolean_lexikalisch() {
        let (v, bits) = round_trip(&Datatype::Boolean, Value::from("1"));
        assert_eq!(v, Value::Boolean(true));
        assert_eq!(bits, 1);
    }

    #[test]
    fn range_facette_auf_string() {
        let facets = Facets { max_inclusive: Some(3), ..Default::default() };
        assert!(matches!(
            builtin("string").restrict(&facets, "s"),
            Err(Error::UnsupportedConstruct { .. })
        ));
    }
}
