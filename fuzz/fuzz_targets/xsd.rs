#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(xsd) = std::str::from_utf8(data)
        && let Ok(doc) = v2gexi::xsd::parse_xsd(xsd)
    {
        let _ = v2gexi::RootIndex::from_documents(vec![doc]);
    }
});
