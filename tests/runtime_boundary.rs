//! Laufzeit-Grenze: Lebenszyklus, atomarer Schema-Load, Puffer, last_error.

use std::sync::Arc;

use v2gexi::{ErrorKind, ExiEvent, RootIndex, Runtime, Value, parse_xml_events, parse_xsd};

include!("common/iso20.rs");

const CONFLICTING: &str = r#"
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           targetNamespace="urn:iso:std:iso:15118:-20:CommonMessages">
  <xs:element name="SessionSetupReq" type="xs:string"/>
</xs:schema>"#;

fn ready() -> Runtime {
    let rt = Runtime::new();
    rt.init().unwrap();
    rt.load_schemas(&[fixture_dir()]).unwrap();
    rt
}

#[test]
fn xml_hin_und_zurueck() {
    let rt = ready();
    let exi = rt.encode_xml(SESSION_SETUP_REQ_XML.as_bytes()).unwrap();
    let bytes = rt.buffer(exi).unwrap();
    assert!(bytes.len() < SESSION_SETUP_REQ_XML.len() / 4);

    let xml = rt.decode_exi(&bytes).unwrap();
    let text = String::from_utf8(rt.buffer(xml).unwrap().to_vec()).unwrap();
    rt.release(exi).unwrap();
    rt.release(xml).unwrap();
    assert_eq!(rt.outstanding_buffers(), 0);

    assert!(text.contains(">0A1B2C3D4E5F6071<"), "{text}");
    assert!(text.contains(">1672531200<"), "{text}");
    let expected = parse_xml_events(SESSION_SETUP_REQ_XML).unwrap();
    assert_eq!(parse_xml_events(&text).unwrap(), expected);
}

#[test]
fn struct_und_xml_sind_bitgleich() {
    let rt = ready();
    let from_xml = rt.encode_xml(SESSION_SETUP_REQ_XML.as_bytes()).unwrap();
    let from_struct = rt.encode_struct(35, &session_setup_req()).unwrap();
    assert_eq!(rt.buffer(from_xml).unwrap(), rt.buffer(from_struct).unwrap());

    let bytes = rt.buffer(from_struct).unwrap();
    assert_eq!(rt.decode_struct(35, &bytes).unwrap(), session_setup_req());
}

#[test]
fn konflikt_behaelt_alten_index() {
    let rt = ready();
    let conflicting = vec![
        parse_xsd(&fixture_text("V2G_CI_CommonTypes.xsd")).unwrap(),
        parse_xsd(&fixture_text("V2G_CI_CommonMessages.xsd")).unwrap(),
        parse_xsd(CONFLICTING).unwrap(),
    ];
    let err = rt.load_schema_documents(conflicting).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConflictingRoot);
    assert!(err.to_string().contains("SessionSetupReq"), "{err}");
    assert!(rt.last_error().is_some());

    // der vorherige Index ist weiter in Gebrauch
    let handle = rt.encode_struct(35, &session_setup_req()).unwrap();
    assert_eq!(rt.last_error(), None);
    rt.release(handle).unwrap();
}

#[test]
fn unbekannte_typ_id() {
    let rt = ready();
    let err = rt.encode_struct(9999, &session_setup_req()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownType);
    assert_eq!(err.kind().status(), 4);
    assert_eq!(rt.message_type_name(9999), "Unknown(9999)");
    assert_eq!(rt.outstanding_buffers(), 0);
}

#[test]
fn decode_fehler_mit_offset_im_last_error() {
    let rt = ready();
    let err = rt.decode_exi(&[0x80, 0xFF]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Decode);
    assert!(err.offset().is_some());
    assert!(rt.last_error().is_some_and(|m| m.contains("byte")));
}

#[test]
fn option_gilt_fuer_folgende_aufrufe() {
    let rt = ready();
    let mut tree = session_setup_req();
    tree["Vendor"] = serde_json::json!("x");
    assert_eq!(rt.encode_struct(35, &tree).unwrap_err().kind(), ErrorKind::FieldValidation);

    rt.set_option("strictFieldMode", "false").unwrap();
    let handle = rt.encode_struct(35, &tree).unwrap();
    rt.release(handle).unwrap();

    assert_eq!(rt.set_option("fooBar", "1").unwrap_err().kind(), ErrorKind::InvalidArgument);
    assert_eq!(
        rt.set_option("builtInGrammarPolicy", "sometimes").unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );
}

#[test]
fn paralleles_encode_waehrend_reload() {
    let rt = Arc::new(ready());
    let expected = {
        let handle = rt.encode_struct(35, &session_setup_req()).unwrap();
        let bytes = rt.buffer(handle).unwrap();
        rt.release(handle).unwrap();
        bytes
    };

    std::thread::scope(|s| {
        for _ in 0..4 {
            let rt = Arc::clone(&rt);
            let expected = Arc::clone(&expected);
            s.spawn(move || {
                for _ in 0..50 {
                    let handle = rt.encode_struct(35, &session_setup_req()).unwrap();
                    assert_eq!(rt.buffer(handle).unwrap(), expected);
                    rt.release(handle).unwrap();
                }
            });
        }
        s.spawn(|| {
            for _ in 0..5 {
                rt.load_schemas(&[fixture_dir()]).unwrap();
            }
        });
    });
    assert_eq!(rt.outstanding_buffers(), 0);
}

#[test]
fn shutdown_gibt_alles_frei() {
    let rt = ready();
    let handle = rt.encode_struct(35, &session_setup_req()).unwrap();
    rt.shutdown().unwrap();
    assert_eq!(rt.outstanding_buffers(), 0);
    for err in [
        rt.encode_struct(35, &session_setup_req()).map(|_| ()).unwrap_err(),
        rt.release(handle).unwrap_err(),
        rt.load_schemas(&[fixture_dir()]).unwrap_err(),
        rt.init().unwrap_err(),
    ] {
        assert_eq!(err.kind(), ErrorKind::Lifecycle, "{err}");
        assert_eq!(err.kind().status(), 2);
    }
}

#[test]
fn index_snapshot_ohne_runtime() {
    // RootIndex ist Send + Sync und kann direkt geteilt werden
    fn assert_shared<T: Send + Sync>() {}
    assert_shared::<RootIndex>();
    assert_shared::<Runtime>();
    let index = iso20_index();
    assert_eq!(index.roots().len(), 5);
    let events = parse_xml_events(SESSION_SETUP_REQ_XML).unwrap();
    assert!(matches!(events[1], ExiEvent::StartElement(_)));
    assert!(events.iter().any(|e| *e == ExiEvent::Characters(Value::from("WMIV1234567890ABCDEX"))));
}
