//! v2gexi: schema-informierter EXI-Codec fuer ISO 15118-20 V2G-Messages
//!
//! Festes Profil: bit-packed, keine Kompression, keine Self-Contained
//! Fragments, keine Header-Optionen. Grammars werden einmal pro Schema-Load
//! compiliert ([`grammar::RootIndex`]) und danach nur noch gelesen; String
//! Table und Production-Erweiterungen leben genau einen Aufruf lang.
//!
//! # Beispiel
//!
//! ```
//! use v2gexi::{CodecOptions, ExiEvent, QName, RootIndex, Value};
//! use v2gexi::{decoder, encoder, xsd};
//!
//! let doc = xsd::parse_xsd(r#"
//!     <xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:example">
//!         <xs:element name="Ping" type="xs:unsignedInt"/>
//!     </xs:schema>"#).unwrap();
//! let index = RootIndex::from_documents(vec![doc]).unwrap();
//!
//! let events = vec![
//!     ExiEvent::StartDocument,
//!     ExiEvent::StartElement(QName::new("urn:example", "Ping")),
//!     ExiEvent::Characters(Value::from("42")),
//!     ExiEvent::EndElement,
//!     ExiEvent::EndDocument,
//! ];
//! let options = CodecOptions::default();
//! let bytes = encoder::encode(&index, &events, &options).unwrap();
//! let decoded = decoder::decode(&index, &bytes, &options).unwrap();
//! assert_eq!(decoded[2], ExiEvent::Characters(Value::Unsigned(42)));
//! ```

pub mod binary;
pub mod bit_width;
pub mod bitstream;
pub mod boolean;
pub mod catalog;
pub mod datatype;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod event;
pub mod grammar;
pub mod header;
pub mod integer;
pub mod n_bit_unsigned_integer;
pub mod options;
pub mod qname;
pub mod runtime;
pub mod schema;
pub mod string;
pub mod string_table;
pub mod unsigned_integer;
pub mod xml;
pub mod xsd;

pub use error::{Error, ErrorKind, Result};

/// HashMap mit ahash, nur fuer interne Tabellen (nicht DoS-resistent).
pub(crate) type FastHashMap<K, V> = hashbrown::HashMap<K, V, ahash::RandomState>;

/// HashSet mit ahash.
pub(crate) type FastHashSet<K> = hashbrown::HashSet<K, ahash::RandomState>;

/// IndexMap mit ahash (deterministische Iteration + schnelles Hashing).
pub(crate) type FastIndexMap<K, V> = indexmap::IndexMap<K, V, ahash::RandomState>;

// Public API: Events
pub use event::{ExiEvent, Value};

// Public API: Options
pub use options::{BuiltInGrammarPolicy, CodecOptions};

// Public API: Header
pub use header::ExiHeader;

// Public API: Grammar / Schema
pub use grammar::RootIndex;
pub use qname::QName;
pub use schema::SchemaSet;
pub use xsd::{load_schema_paths, parse_xsd};

// Public API: Katalog und Laufzeit-Grenze
pub use catalog::MessageCatalog;
pub use runtime::{BufferHandle, Runtime};
pub use xml::{parse_xml_events, serialize_events};
