#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data)
        && let Ok(events) = v2gexi::parse_xml_events(text)
    {
        let xml = v2gexi::serialize_events(&events).expect("serialize parsed events");
        assert_eq!(v2gexi::parse_xml_events(&xml).expect("reparse serialized xml"), events);
    }
});
