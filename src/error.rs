//! Fehlertypen des Codecs.
//!
//! Jede Variante gehoert zu genau einer [`ErrorKind`]; die Kind ist stabil und
//! wird an der Binding-Grenze auf numerische Status-Codes abgebildet.

use core::fmt;
use std::borrow::Cow;

/// Alle Fehler die Schema-Load, Encode, Decode und die Laufzeit-Grenze liefern.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Schema-Dokument nicht lesbar oder kein wohlgeformtes XSD.
    SchemaLoad {
        /// Datei oder Dokument-Bezeichner (leer wenn unbekannt).
        path: Cow<'static, str>,
        message: String,
    },
    /// Zwei Schemas deklarieren dasselbe Root-Element mit unterschiedlichem Inhalt.
    ConflictingRoot {
        qname: String,
        first: String,
        second: String,
    },
    /// Deklaration ohne Compile-Regel; `path` zeigt auf die Deklaration.
    UnsupportedConstruct { path: String, construct: String },
    /// Wert verletzt den darstellbaren Bereich oder eine Facette seines Datentyps.
    Encode { message: String },
    /// Field-Tree passt nicht zum Schema (fehlendes Pflichtfeld, unbekanntes Feld, ...).
    FieldValidation { path: String, message: String },
    /// Numerische Message-Type-ID ist im Katalog nicht bekannt.
    UnknownType(u32),
    /// Decode-Fehler mit Byte-Offset und Grammar-Zustand.
    Decode {
        offset: usize,
        state: String,
        message: String,
    },
    /// Aufruf ausserhalb von init()/shutdown().
    Lifecycle(Cow<'static, str>),
    /// Ungueltiges Argument an der Laufzeit-Grenze.
    InvalidArgument(String),
    /// setOption mit unbekanntem Namen.
    UnknownOption(String),
    /// XML-Eingabe (Textform) ist nicht wohlgeformt.
    XmlParse(String),
    /// Stream endet vor einer vollstaendigen Struktur.
    PrematureEndOfStream,
    /// Integer passt nicht in 64 Bit.
    IntegerOverflow,
    /// Unicode Code Point ungueltig (Surrogate oder > U+10FFFF).
    InvalidCodePoint(u64),
    /// IO-Fehler beim Lesen von Schema- oder Eingabedateien.
    Io(String),
}

/// Stabile Fehlerklasse, unabhaengig vom Meldungstext.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    SchemaLoad,
    ConflictingRoot,
    UnsupportedConstruct,
    Encode,
    FieldValidation,
    UnknownType,
    Decode,
    Lifecycle,
    InvalidArgument,
    Internal,
}

impl ErrorKind {
    /// Status-Code der C-Bindings (`V2G_OK` = 0 ist kein Fehler und taucht hier nicht auf).
    pub fn status(self) -> i32 {
        match self {
            Self::Lifecycle => 2,
            Self::InvalidArgument => 3,
            Self::Encode | Self::FieldValidation | Self::UnknownType => 4,
            Self::Decode => 5,
            Self::SchemaLoad | Self::ConflictingRoot | Self::UnsupportedConstruct => 6,
            Self::Internal => 254,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SchemaLoad => "SchemaLoadError",
            Self::ConflictingRoot => "ConflictingRootError",
            Self::UnsupportedConstruct => "UnsupportedConstructError",
            Self::Encode => "EncodeError",
            Self::FieldValidation => "FieldValidationError",
            Self::UnknownType => "UnknownTypeError",
            Self::Decode => "DecodeError",
            Self::Lifecycle => "LifecycleError",
            Self::InvalidArgument => "InvalidArgument",
            Self::Internal => "InternalError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SchemaLoad { .. } => ErrorKind::SchemaLoad,
            Self::ConflictingRoot { .. } => ErrorKind::ConflictingRoot,
            Self::UnsupportedConstruct { .. } => ErrorKind::UnsupportedConstruct,
            Self::Encode { .. } | Self::XmlParse(_) => ErrorKind::Encode,
            Self::FieldValidation { .. } => ErrorKind::FieldValidation,
            Self::UnknownType(_) => ErrorKind::UnknownType,
            Self::Decode { .. }
            | Self::PrematureEndOfStream
            | Self::IntegerOverflow
            | Self::InvalidCodePoint(_) => ErrorKind::Decode,
            Self::Lifecycle(_) => ErrorKind::Lifecycle,
            Self::InvalidArgument(_) | Self::UnknownOption(_) | Self::Io(_) => {
                ErrorKind::InvalidArgument
            }
        }
    }

    pub(crate) fn schema_load(path: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        Self::SchemaLoad { path: path.into(), message: message.into() }
    }

    pub(crate) fn unsupported(path: impl Into<String>, construct: impl Into<String>) -> Self {
        Self::UnsupportedConstruct { path: path.into(), construct: construct.into() }
    }

    pub(crate) fn encode(message: impl Into<String>) -> Self {
        Self::Encode { message: message.into() }
    }

    pub(crate) fn field(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FieldValidation { path: path.into(), message: message.into() }
    }

    /// Ungueltiger Inhalt im Stream; Offset und Zustand setzt der Decoder.
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::Decode { offset: 0, state: String::new(), message: message.into() }
    }

    /// Byte-Offset eines Decode-Fehlers.
    pub fn offset(&self) -> Option<usize> {
        match self {
            Self::Decode { offset, .. } => Some(*offset),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SchemaLoad { path, message } => {
                if path.is_empty() {
                    write!(f, "schema load failed: {message}")
                } else {
                    write!(f, "schema load failed for '{path}': {message}")
                }
            }
            Self::ConflictingRoot { qname, first, second } => write!(
                f,
                "conflicting root '{qname}': declared as {first} and as {second}"
            ),
            Self::UnsupportedConstruct { path, construct } => {
                write!(f, "unsupported schema construct {construct} at {path}")
            }
            Self::Encode { message } => write!(f, "encode failed: {message}"),
            Self::FieldValidation { path, message } => {
                write!(f, "field validation failed at '{path}': {message}")
            }
            Self::UnknownType(id) => write!(f, "unknown message type id {id}"),
            Self::Decode { offset, state, message } => {
                write!(f, "decode failed at byte {offset} in state '{state}': {message}")
            }
            Self::Lifecycle(msg) => write!(f, "codec lifecycle: {msg}"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::UnknownOption(name) => write!(f, "unknown option: {name}"),
            Self::XmlParse(msg) => write!(f, "XML parse error: {msg}"),
            Self::PrematureEndOfStream => write!(f, "premature end of EXI stream"),
            Self::IntegerOverflow => write!(f, "integer overflow"),
            Self::InvalidCodePoint(cp) => write!(f, "invalid Unicode code point U+{cp:X}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
