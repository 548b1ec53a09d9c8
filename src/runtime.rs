//! Laufzeit-Grenze fuer Bindings.
//!
//! Ein [`Runtime`] buendelt alles, was eine C- oder Python-Schicht braucht:
//! Lebenszyklus (`init`/`shutdown`), den atomar publizierten Root-Index,
//! Optionen, explizit freizugebende Ausgabepuffer und `last_error`.
//!
//! Der Root-Index liegt hinter einem [`ArcSwapOption`]: `load_schemas` baut
//! einen neuen Index und tauscht ihn erst nach erfolgreichem Compile ein.
//! Laufende Aufrufe behalten ihren Snapshot.
//!
//! # Beispiel
//!
//! ```
//! use v2gexi::{Runtime, xsd};
//!
//! let rt = Runtime::new();
//! rt.init().unwrap();
//! let doc = xsd::parse_xsd(r#"
//!     <xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:example">
//!         <xs:element name="Ping" type="xs:unsignedInt"/>
//!     </xs:schema>"#).unwrap();
//! rt.load_schema_documents(vec![doc]).unwrap();
//!
//! let handle = rt.encode_xml(br#"<p:Ping xmlns:p="urn:example">42</p:Ping>"#).unwrap();
//! let exi = rt.buffer(handle).unwrap();
//! rt.release(handle).unwrap();
//!
//! let xml = rt.decode_exi(&exi).unwrap();
//! assert!(String::from_utf8(rt.buffer(xml).unwrap().to_vec()).unwrap().contains(">42<"));
//! rt.release(xml).unwrap();
//! assert_eq!(rt.outstanding_buffers(), 0);
//! rt.shutdown().unwrap();
//! ```

use std::path::Path;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::{ArcSwap, ArcSwapOption};
use serde_json::Value as Json;

use crate::catalog::MessageCatalog;
use crate::grammar::RootIndex;
use crate::options::CodecOptions;
use crate::schema::SchemaDocument;
use crate::{Error, FastHashMap, Result, decoder, encoder, xml, xsd};

const UNINITIALIZED: u8 = 0;
const READY: u8 = 1;
const SHUT_DOWN: u8 = 2;

/// Griff auf einen von [`Runtime`] gehaltenen Ausgabepuffer.
///
/// Jeder Griff muss genau einmal mit [`Runtime::release`] freigegeben werden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(u64);

impl BufferHandle {
    pub fn id(self) -> u64 {
        self.0
    }
}

/// Eine Codec-Instanz hinter der Binding-Grenze.
pub struct Runtime {
    lifecycle: AtomicU8,
    index: ArcSwapOption<RootIndex>,
    options: ArcSwap<CodecOptions>,
    catalog: MessageCatalog,
    buffers: Mutex<FastHashMap<u64, Arc<[u8]>>>,
    next_handle: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// Nicht initialisierte Instanz mit dem ISO 15118-20 Katalog.
    pub fn new() -> Self {
        Self::with_catalog(MessageCatalog::iso15118_20())
    }

    pub fn with_catalog(catalog: MessageCatalog) -> Self {
        Self {
            lifecycle: AtomicU8::new(UNINITIALIZED),
            index: ArcSwapOption::empty(),
            options: ArcSwap::from_pointee(CodecOptions::default()),
            catalog,
            buffers: Mutex::new(FastHashMap::default()),
            next_handle: AtomicU64::new(1),
            last_error: Mutex::new(None),
        }
    }

    pub fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// Idempotent; nach `shutdown` nicht mehr moeglich.
    pub fn init(&self) -> Result<()> {
        let result = match self.lifecycle.compare_exchange(
            UNINITIALIZED,
            READY,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) | Err(READY) => Ok(()),
            Err(_) => Err(Error::Lifecycle("codec has been shut down".into())),
        };
        self.track(result)
    }

    /// Verwirft Index und alle offenen Puffer; danach scheitert jeder Aufruf.
    pub fn shutdown(&self) -> Result<()> {
        let previous = self.lifecycle.swap(SHUT_DOWN, Ordering::AcqRel);
        let result = if previous == SHUT_DOWN {
            Err(Error::Lifecycle("codec has already been shut down".into()))
        } else {
            self.index.store(None);
            let mut buffers = self.buffers();
            if !buffers.is_empty() {
                log::debug!("shutdown releases {} outstanding buffer(s)", buffers.len());
            }
            buffers.clear();
            Ok(())
        };
        self.track(result)
    }

    /// Laedt, compiliert und publiziert die Schemas unter `paths`.
    ///
    /// Bei einem Fehler bleibt der vorherige Index unveraendert in Gebrauch.
    pub fn load_schemas<P: AsRef<Path>>(&self, paths: &[P]) -> Result<()> {
        let result = self.ready().and_then(|()| {
            if paths.is_empty() {
                return Err(Error::InvalidArgument("no schema paths provided".into()));
            }
            let documents = xsd::load_schema_paths(paths)?;
            self.publish(documents)
        });
        self.track(result)
    }

    /// Wie [`load_schemas`](Self::load_schemas), fuer bereits geparste Dokumente.
    pub fn load_schema_documents(&self, documents: Vec<SchemaDocument>) -> Result<()> {
        let result = self.ready().and_then(|()| self.publish(documents));
        self.track(result)
    }

    fn publish(&self, documents: Vec<SchemaDocument>) -> Result<()> {
        let index = RootIndex::from_documents(documents)?;
        log::debug!(
            "publishing root index: {} roots, {} states",
            index.roots().len(),
            index.state_count()
        );
        self.index.store(Some(Arc::new(index)));
        Ok(())
    }

    /// XML-Text → EXI.
    pub fn encode_xml(&self, xml_bytes: &[u8]) -> Result<BufferHandle> {
        let result = self.snapshot().and_then(|(index, options)| {
            let text = std::str::from_utf8(xml_bytes)
                .map_err(|e| Error::InvalidArgument(format!("XML input is not UTF-8: {e}")))?;
            let mut events = xml::parse_xml_events(text)?;
            xml::order_attributes(&index, &mut events);
            let bytes = encoder::encode(&index, &events, &options)?;
            Ok(self.acquire(bytes))
        });
        self.track(result)
    }

    /// EXI → XML-Text (UTF-8) im Puffer.
    pub fn decode_exi(&self, exi: &[u8]) -> Result<BufferHandle> {
        let result = self.snapshot().and_then(|(index, options)| {
            let events = decoder::decode(&index, exi, &options)?;
            let text = xml::serialize_events(&events)?;
            Ok(self.acquire(text.into_bytes()))
        });
        self.track(result)
    }

    /// Field-Tree → EXI ueber den Message-Katalog.
    pub fn encode_struct(&self, type_id: u32, fields: &Json) -> Result<BufferHandle> {
        let result = self.snapshot().and_then(|(index, options)| {
            let bytes = self.catalog.encode_message(&index, type_id, fields, &options)?;
            Ok(self.acquire(bytes))
        });
        self.track(result)
    }

    /// EXI → Field-Tree ueber den Message-Katalog.
    pub fn decode_struct(&self, type_id: u32, exi: &[u8]) -> Result<Json> {
        let result = self.snapshot().and_then(|(index, options)| {
            self.catalog.decode_message(&index, type_id, exi, &options)
        });
        self.track(result)
    }

    /// Name zur Typ-ID; unbekannte IDs als `Unknown(<id>)`.
    pub fn message_type_name(&self, type_id: u32) -> String {
        self.catalog.type_name(type_id)
    }

    pub fn catalog(&self) -> &MessageCatalog {
        &self.catalog
    }

    /// `setOption(name, value)`; gilt fuer alle danach gestarteten Aufrufe.
    pub fn set_option(&self, name: &str, value: &str) -> Result<()> {
        let result = self.ready().and_then(|()| {
            let mut options = CodecOptions::clone(&self.options.load());
            options.set(name, value)?;
            log::debug!("option {name} = {value}");
            self.options.store(Arc::new(options));
            Ok(())
        });
        self.track(result)
    }

    pub fn options(&self) -> Arc<CodecOptions> {
        self.options.load_full()
    }

    /// Inhalt eines noch nicht freigegebenen Puffers.
    pub fn buffer(&self, handle: BufferHandle) -> Result<Arc<[u8]>> {
        let result = self.ready().and_then(|()| {
            self.buffers()
                .get(&handle.0)
                .cloned()
                .ok_or_else(|| unknown_handle(handle))
        });
        self.track(result)
    }

    /// Gibt einen Puffer frei; ein zweites Mal ist ein Fehler.
    pub fn release(&self, handle: BufferHandle) -> Result<()> {
        let result = self.ready().and_then(|()| {
            self.buffers()
                .remove(&handle.0)
                .map(drop)
                .ok_or_else(|| unknown_handle(handle))
        });
        self.track(result)
    }

    pub fn outstanding_buffers(&self) -> usize {
        self.buffers().len()
    }

    /// Meldung des letzten gescheiterten Aufrufs; `None` nach einem Erfolg.
    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn ready(&self) -> Result<()> {
        match self.lifecycle.load(Ordering::Acquire) {
            READY => Ok(()),
            UNINITIALIZED => Err(Error::Lifecycle("codec not initialized".into())),
            _ => Err(Error::Lifecycle("codec has been shut down".into())),
        }
    }

    fn snapshot(&self) -> Result<(Arc<RootIndex>, Arc<CodecOptions>)> {
        self.ready()?;
        let index = self
            .index
            .load_full()
            .ok_or_else(|| Error::Lifecycle("no schemas loaded".into()))?;
        Ok((index, self.options.load_full()))
    }

    fn acquire(&self, bytes: Vec<u8>) -> BufferHandle {
        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.buffers().insert(id, bytes.into());
        BufferHandle(id)
    }

    fn buffers(&self) -> MutexGuard<'_, FastHashMap<u64, Arc<[u8]>>> {
        self.buffers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn track<T>(&self, result: Result<T>) -> Result<T> {
        let mut last = self.last_error.lock().unwrap_or_else(PoisonError::into_inner);
        match &result {
            Ok(_) => *last = None,
            Err(e) => {
                log::debug!("{}: {e}", e.kind());
                *last = Some(e.to_string());
            }
        }
        result
    }
}

fn unknown_handle(handle: BufferHandle) -> Error {
    Error::InvalidArgument(format!("unknown or already released buffer handle {}", handle.0))
}
