//! Round-Trip-Eigenschaften ueber generierte Field-Trees.

use proptest::prelude::*;
use serde_json::{Value as Json, json};
use v2gexi::{CodecOptions, MessageCatalog, RootIndex};

include!("common/iso20.rs");

fn header() -> impl Strategy<Value = Json> {
    (prop::collection::vec(any::<u8>(), 8), any::<u64>())
        .prop_map(|(id, ts)| json!({ "SessionID": id, "TimeStamp": ts }))
}

fn session_setup_req_tree() -> impl Strategy<Value = Json> {
    (header(), "[ -~]{0,60}").prop_map(|(header, evccid)| json!({ "Header": header, "EVCCID": evccid }))
}

fn session_stop_req_tree() -> impl Strategy<Value = Json> {
    (
        header(),
        prop::sample::select(vec!["Pause", "Terminate", "ServiceRenegotiation"]),
        prop::option::of("[a-zA-Z0-9 ]{1,80}"),
        prop::option::of("\\PC{1,40}"),
    )
        .prop_map(|(header, session, code, explanation)| {
            let mut tree = json!({ "Header": header, "ChargingSession": session });
            if let Some(code) = code {
                tree["EVTerminationCode"] = json!(code);
            }
            if let Some(explanation) = explanation {
                tree["EVTerminationExplanation"] = json!(explanation);
            }
            tree
        })
}

fn service_list(max: usize) -> impl Strategy<Value = Json> {
    prop::collection::vec((any::<u16>(), any::<bool>()), 1..=max).prop_map(|services| {
        let services: Vec<Json> = services
            .into_iter()
            .map(|(id, free)| json!({ "ServiceID": id, "FreeService": free }))
            .collect();
        json!({ "Service": services })
    })
}

fn service_discovery_res_tree() -> impl Strategy<Value = Json> {
    (header(), any::<bool>(), service_list(8), prop::option::of(service_list(8))).prop_map(
        |(header, reneg, energy, vas)| {
            let mut tree = json!({
                "Header": header,
                "ResponseCode": "OK",
                "ServiceRenegotiationSupported": reneg,
                "EnergyTransferServiceList": energy
            });
            if let Some(vas) = vas {
                tree["VASList"] = vas;
            }
            tree
        },
    )
}

fn check(index: &RootIndex, id: u32, tree: &Json) -> Result<(), TestCaseError> {
    let catalog = MessageCatalog::iso15118_20();
    let options = CodecOptions::default();
    let bytes = catalog.encode_message(index, id, tree, &options).map_err(|e| TestCaseError::fail(e.to_string()))?;
    let decoded = catalog.decode_message(index, id, &bytes, &options).map_err(|e| TestCaseError::fail(e.to_string()))?;
    prop_assert_eq!(&decoded, tree);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn session_setup_req_roundtrip(tree in session_setup_req_tree()) {
        check(&iso20_index(), 35, &tree)?;
    }

    #[test]
    fn session_stop_req_roundtrip(tree in session_stop_req_tree()) {
        check(&iso20_index(), 37, &tree)?;
    }

    #[test]
    fn service_discovery_res_roundtrip(tree in service_discovery_res_tree()) {
        check(&iso20_index(), 32, &tree)?;
    }

    #[test]
    fn beliebige_bytes_brechen_den_decoder_nicht(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        let index = iso20_index();
        let catalog = MessageCatalog::iso15118_20();
        // Fehler sind erlaubt, Panics nicht
        let _ = catalog.decode_message(&index, 35, &bytes, &CodecOptions::default());
    }
}
