//! Schema-Dateien von der Platte laden.

use std::fs;
use std::path::{Path, PathBuf};

use super::{MAX_XSD_SIZE, parse_xsd_named};
use crate::error::{Error, Result};
use crate::schema::SchemaDocument;

/// Laedt alle angegebenen Schemas.
///
/// Jeder Pfad ist eine `.xsd`-Datei oder ein Verzeichnis; bei Verzeichnissen
/// werden die direkt enthaltenen `*.xsd` in Namensreihenfolge gelesen (nicht
/// rekursiv). Schlaegt fehl, wenn insgesamt kein Dokument gefunden wird.
pub fn load_schema_paths<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<SchemaDocument>> {
    let mut files = Vec::new();
    for path in paths {
        let path = path.as_ref();
        if path.is_dir() {
            files.extend(xsd_files_in(path)?);
        } else {
            files.push(path.to_path_buf());
        }
    }
    if files.is_empty() {
        return Err(Error::schema_load("", "no schema documents found"));
    }

    files.iter().map(|f| load_file(f)).collect()
}

fn xsd_files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| io_error(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| io_error(dir, e))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("xsd")) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn load_file(path: &Path) -> Result<SchemaDocument> {
    let meta = fs::metadata(path).map_err(|e| io_error(path, e))?;
    if meta.len() > MAX_XSD_SIZE as u64 {
        return Err(Error::schema_load(
            path.display().to_string(),
            format!("XSD document too large: {} bytes", meta.len()),
        ));
    }
    let text = fs::read_to_string(path).map_err(|e| io_error(path, e))?;
    log::debug!("loading schema {}", path.display());
    parse_xsd_named(&path.display().to_string(), &text)
}

fn io_error(path: &Path, e: std::io::Error) -> Error {
    Error::schema_load(path.display().to_string(), e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("v2gexi-loader-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    const XSD: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:t">
        <xs:element name="E" type="xs:string"/></xs:schema>"#;

    #[test]
    fn verzeichnis_nicht_rekursiv() {
        let dir = temp_dir("dir");
        fs::write(dir.join("b.xsd"), XSD).unwrap();
        fs::write(dir.join("a.xsd"), XSD).unwrap();
        fs::write(dir.join("notes.txt"), "x").unwrap();
        fs::create_dir_all(dir.join("sub")).unwrap();
        fs::write(dir.join("sub").join("c.xsd"), XSD).unwrap();

        let docs = load_schema_paths(&[&dir]).unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs[0].source.ends_with("a.xsd"));
        assert!(docs[1].source.ends_with("b.xsd"));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn leeres_verzeichnis() {
        let dir = temp_dir("empty");
        let err = load_schema_paths(&[&dir]).unwrap_err();
        assert!(matches!(err, Error::SchemaLoad { .. }));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn fehlende_datei() {
        let err = load_schema_paths(&["/nonexistent/v2g.xsd"]).unwrap_err();
        let Error::SchemaLoad { path, .. } = err else { panic!("{err:?}") };
        assert_eq!(path, "/nonexistent/v2g.xsd");
    }
}
