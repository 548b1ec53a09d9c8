// Gemeinsame Fixtures fuer die ISO 15118-20 Integrationstests.
//
// Wird per `include!` eingebunden. Benoetigte Imports:
//   use v2gexi::RootIndex;

#[allow(dead_code)]
const FIXTURES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/iso20");

#[allow(dead_code)]
fn fixture_dir() -> std::path::PathBuf {
    std::path::PathBuf::from(FIXTURES)
}

#[allow(dead_code)]
fn fixture_text(name: &str) -> String {
    std::fs::read_to_string(fixture_dir().join(name)).expect("read fixture")
}

#[allow(dead_code)]
fn iso20_index() -> RootIndex {
    let docs = v2gexi::load_schema_paths(&[fixture_dir()]).expect("load fixtures");
    RootIndex::from_documents(docs).expect("compile fixtures")
}

#[allow(dead_code)]
fn session_setup_req() -> serde_json::Value {
    serde_json::json!({
        "Header": {
            "SessionID": [0x0A, 0x1B, 0x2C, 0x3D, 0x4E, 0x5F, 0x60, 0x71],
            "TimeStamp": 1672531200u64
        },
        "EVCCID": "WMIV1234567890ABCDEX"
    })
}

#[allow(dead_code)]
const SESSION_SETUP_REQ_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ns:SessionSetupReq xmlns:ns="urn:iso:std:iso:15118:-20:CommonMessages"
                    xmlns:ct="urn:iso:std:iso:15118:-20:CommonTypes">
  <ct:Header>
    <ct:SessionID>0A1B2C3D4E5F6071</ct:SessionID>
    <ct:TimeStamp>1672531200</ct:TimeStamp>
  </ct:Header>
  <ns:EVCCID>WMIV1234567890ABCDEX</ns:EVCCID>
</ns:SessionSetupReq>
"#;
