#![no_main]
use std::sync::OnceLock;

use libfuzzer_sys::fuzz_target;
use v2gexi::{BuiltInGrammarPolicy, CodecOptions, RootIndex};

const SCHEMA: &str = r###"
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           targetNamespace="urn:iso:std:iso:15118:-20:CommonMessages"
           elementFormDefault="qualified">
  <xs:element name="SessionSetupReq">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="SessionID">
          <xs:simpleType>
            <xs:restriction base="xs:hexBinary"><xs:length value="8"/></xs:restriction>
          </xs:simpleType>
        </xs:element>
        <xs:element name="TimeStamp" type="xs:unsignedLong"/>
        <xs:element name="EVCCID" type="xs:string"/>
        <xs:any namespace="##other" minOccurs="0" maxOccurs="unbounded"/>
      </xs:sequence>
      <xs:attribute name="Id" type="xs:ID"/>
    </xs:complexType>
  </xs:element>
  <xs:element name="SessionStopReq">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="ChargingSession">
          <xs:simpleType>
            <xs:restriction base="xs:string">
              <xs:enumeration value="Pause"/>
              <xs:enumeration value="Terminate"/>
            </xs:restriction>
          </xs:simpleType>
        </xs:element>
        <xs:element name="Code" type="xs:short" minOccurs="0" maxOccurs="4"/>
      </xs:sequence>
    </xs:complexType>
  </xs:element>
</xs:schema>"###;

fn index() -> &'static RootIndex {
    static INDEX: OnceLock<RootIndex> = OnceLock::new();
    INDEX.get_or_init(|| {
        let doc = v2gexi::xsd::parse_xsd(SCHEMA).expect("fuzz schema");
        RootIndex::from_documents(vec![doc]).expect("fuzz grammar")
    })
}

fuzz_target!(|data: &[u8]| {
    let index = index();
    let strict = CodecOptions::default();
    let dynamic = CodecOptions::default().with_built_in_grammar_policy(BuiltInGrammarPolicy::ExtendDynamic);
    for options in [&strict, &dynamic] {
        if let Ok(events) = v2gexi::decoder::decode(index, data, options) {
            let _ = v2gexi::encoder::encode(index, &events, options);
        }
    }
});
