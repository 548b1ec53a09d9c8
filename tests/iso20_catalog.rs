//! Message-Katalog gegen die ISO 15118-20 Fixtures.

use serde_json::json;
use v2gexi::{CodecOptions, Error, ErrorKind, MessageCatalog, RootIndex};

include!("common/iso20.rs");

const SESSION_SETUP_REQ: u32 = 35;
const SESSION_SETUP_RES: u32 = 36;
const SESSION_STOP_REQ: u32 = 37;
const SERVICE_DISCOVERY_RES: u32 = 32;

fn round_trip(index: &RootIndex, id: u32, tree: &serde_json::Value) -> Vec<u8> {
    let catalog = MessageCatalog::iso15118_20();
    let options = CodecOptions::default();
    let bytes = catalog.encode_message(index, id, tree, &options).expect("encode");
    let decoded = catalog.decode_message(index, id, &bytes, &options).expect("decode");
    assert_eq!(&decoded, tree);
    bytes
}

#[test]
fn session_setup_req_ist_kompakt() {
    let index = iso20_index();
    let bytes = round_trip(&index, SESSION_SETUP_REQ, &session_setup_req());
    assert_eq!(bytes[0], 0x80);
    assert!(
        bytes.len() < SESSION_SETUP_REQ_XML.len() / 4,
        "{} bytes vs {} bytes XML",
        bytes.len(),
        SESSION_SETUP_REQ_XML.len()
    );
}

#[test]
fn session_setup_res_mit_enum() {
    let tree = json!({
        "Header": { "SessionID": [0, 0, 0, 0, 0, 0, 0, 1], "TimeStamp": 0 },
        "ResponseCode": "OK_NewSessionEstablished",
        "EVSEID": "DE*ABC*E123456*1"
    });
    round_trip(&iso20_index(), SESSION_SETUP_RES, &tree);
}

#[test]
fn optionale_felder_fehlen() {
    let tree = json!({
        "Header": { "SessionID": [1, 2, 3, 4, 5, 6, 7, 8], "TimeStamp": 42 },
        "ChargingSession": "Terminate"
    });
    round_trip(&iso20_index(), SESSION_STOP_REQ, &tree);
}

#[test]
fn verschachtelte_listen() {
    let tree = json!({
        "Header": { "SessionID": [9, 9, 9, 9, 9, 9, 9, 9], "TimeStamp": 1700000000 },
        "ResponseCode": "OK",
        "ServiceRenegotiationSupported": false,
        "EnergyTransferServiceList": {
            "Service": [
                { "ServiceID": 1, "FreeService": true },
                { "ServiceID": 5, "FreeService": false }
            ]
        },
        "VASList": { "Service": [{ "ServiceID": 65535, "FreeService": true }] }
    });
    round_trip(&iso20_index(), SERVICE_DISCOVERY_RES, &tree);
}

#[test]
fn session_id_mit_falscher_laenge() {
    let mut tree = session_setup_req();
    tree["Header"]["SessionID"] = json!([1, 2, 3]);
    let err = MessageCatalog::iso15118_20()
        .encode_message(&iso20_index(), SESSION_SETUP_REQ, &tree, &CodecOptions::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Encode, "{err}");
}

#[test]
fn fehlendes_pflichtfeld_nennt_pfad() {
    let mut tree = session_setup_req();
    tree.as_object_mut().unwrap().remove("EVCCID");
    let err = MessageCatalog::iso15118_20()
        .encode_message(&iso20_index(), SESSION_SETUP_REQ, &tree, &CodecOptions::default())
        .unwrap_err();
    let Error::FieldValidation { path, .. } = &err else { panic!("{err:?}") };
    assert!(path.ends_with("EVCCID"), "{path}");
}

#[test]
fn unbekanntes_feld_strikt_und_tolerant() {
    let index = iso20_index();
    let catalog = MessageCatalog::iso15118_20();
    let mut tree = session_setup_req();
    tree["Vendor"] = json!("x");

    let strict = catalog.encode_message(&index, SESSION_SETUP_REQ, &tree, &CodecOptions::default());
    assert_eq!(strict.unwrap_err().kind(), ErrorKind::FieldValidation);

    let lenient = CodecOptions::default().with_strict_field_mode(false);
    let bytes = catalog.encode_message(&index, SESSION_SETUP_REQ, &tree, &lenient).unwrap();
    let decoded = catalog.decode_message(&index, SESSION_SETUP_REQ, &bytes, &lenient).unwrap();
    assert_eq!(decoded, session_setup_req());
}

#[test]
fn unbekannte_typ_ids() {
    let index = iso20_index();
    let catalog = MessageCatalog::iso15118_20();
    let options = CodecOptions::default();
    let tree = session_setup_req();

    assert_eq!(catalog.encode_message(&index, 9999, &tree, &options), Err(Error::UnknownType(9999)));
    assert_eq!(catalog.decode_message(&index, 9999, &[0x80], &options), Err(Error::UnknownType(9999)));
    // im Katalog, aber nicht im geladenen Schema
    assert_eq!(catalog.encode_message(&index, 0, &tree, &options), Err(Error::UnknownType(0)));
    assert_eq!(catalog.type_name(9999), "Unknown(9999)");
    assert_eq!(catalog.type_name(SESSION_SETUP_REQ), "SessionSetupReq");
}

#[test]
fn abgeschnittener_strom_meldet_offset() {
    let index = iso20_index();
    let catalog = MessageCatalog::iso15118_20();
    let options = CodecOptions::default();
    let bytes = catalog.encode_message(&index, SESSION_SETUP_REQ, &session_setup_req(), &options).unwrap();

    for len in 0..bytes.len() {
        let err = catalog.decode_message(&index, SESSION_SETUP_REQ, &bytes[..len], &options).unwrap_err();
        let Error::Decode { offset, state, .. } = &err else { panic!("len {len}: {err:?}") };
        assert!(*offset <= len, "len {len}: offset {offset}");
        assert!(!state.is_empty(), "len {len}");
    }
}

#[test]
fn falscher_message_typ_beim_decode() {
    let index = iso20_index();
    let catalog = MessageCatalog::iso15118_20();
    let options = CodecOptions::default();
    let bytes = catalog.encode_message(&index, SESSION_SETUP_REQ, &session_setup_req(), &options).unwrap();
    let err = catalog.decode_message(&index, SESSION_STOP_REQ, &bytes, &options).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Decode);
}

#[test]
fn string_table_spart_wiederholungen() {
    let index = iso20_index();
    let catalog = MessageCatalog::iso15118_20();
    let options = CodecOptions::default();
    let text = "vehicle requested stop after user interaction";
    let other = "vehicle requested stop after user interactioN";
    let message = |explanation: &str| {
        json!({
            "Header": { "SessionID": [1, 2, 3, 4, 5, 6, 7, 8], "TimeStamp": 1 },
            "ChargingSession": "Pause",
            "EVTerminationCode": text,
            "EVTerminationExplanation": explanation
        })
    };

    let repeated = catalog.encode_message(&index, SESSION_STOP_REQ, &message(text), &options).unwrap();
    let distinct = catalog.encode_message(&index, SESSION_STOP_REQ, &message(other), &options).unwrap();
    assert!(repeated.len() + text.len() / 2 < distinct.len(), "{} vs {}", repeated.len(), distinct.len());
    assert_eq!(catalog.decode_message(&index, SESSION_STOP_REQ, &repeated, &options).unwrap(), message(text));
}
