use super::*;
use crate::encoder::encode;
use crate::xsd::parse_xsd;

const SCHEMA: &str = r#"
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:t"
           elementFormDefault="qualified">
  <xs:simpleType name="modeType">
    <xs:restriction base="xs:string">
      <xs:enumeration value="Dynamic"/>
      <xs:enumeration value="Scheduled"/>
    </xs:restriction>
  </xs:simpleType>
  <xs:element name="Ping" type="xs:unsignedInt"/>
  <xs:element name="Msg">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="Id" type="xs:unsignedByte"/>
        <xs:element name="Mode" type="t:modeType" minOccurs="0"/>
        <xs:element name="Note" type="xs:string" minOccurs="0" maxOccurs="3"/>
        <xs:element name="Raw" type="xs:hexBinary" minOccurs="0"/>
      </xs:sequence>
      <xs:attribute name="v" type="xs:boolean"/>
      <xs:attribute name="offset" type="xs:short"/>
    </xs:complexType>
  </xs:element>
</xs:schema>"#;

fn index() -> RootIndex {
    RootIndex::from_documents(vec![parse_xsd(SCHEMA).unwrap()]).unwrap()
}

fn q(name: &str) -> QName {
    QName::new("urn:t", name)
}

fn dynamic() -> CodecOptions {
    CodecOptions::default().with_built_in_grammar_policy(BuiltInGrammarPolicy::ExtendDynamic)
}

fn doc(inner: Vec<ExiEvent>) -> Vec<ExiEvent> {
    let mut events = vec![ExiEvent::StartDocument];
    events.extend(inner);
    events.push(ExiEvent::EndDocument);
    events
}

fn leaf(name: &str, v: Value) -> [ExiEvent; 3] {
    [ExiEvent::StartElement(q(name)), ExiEvent::Characters(v), ExiEvent::EndElement]
}

fn round_trip(events: &[ExiEvent], options: &CodecOptions) -> Vec<ExiEvent> {
    let idx = index();
    let bytes = encode(&idx, events, options).unwrap();
    decode(&idx, &bytes, options).unwrap()
}

#[test]
fn skalar_root() {
    let events = doc(leaf("Ping", Value::from("42")).into());
    assert_eq!(round_trip(&events, &CodecOptions::default()), doc(leaf("Ping", Value::Unsigned(42)).into()));
}

#[test]
fn getypte_werte_kommen_getypt_zurueck() {
    let mut inner = vec![
        ExiEvent::StartElement(q("Msg")),
        ExiEvent::Attribute(QName::local("v"), Value::from("1")),
        ExiEvent::Attribute(QName::local("offset"), Value::from("-12")),
    ];
    inner.extend(leaf("Id", Value::from("7")));
    inner.extend(leaf("Mode", Value::from("Scheduled")));
    inner.extend(leaf("Note", Value::from("a")));
    inner.extend(leaf("Note", Value::from("a")));
    inner.extend(leaf("Raw", Value::from("CAFE")));
    inner.push(ExiEvent::EndElement);

    let mut expected = vec![
        ExiEvent::StartElement(q("Msg")),
        ExiEvent::Attribute(QName::local("v"), Value::Boolean(true)),
        ExiEvent::Attribute(QName::local("offset"), Value::Integer(-12)),
    ];
    expected.extend(leaf("Id", Value::Unsigned(7)));
    expected.extend(leaf("Mode", Value::from("Scheduled")));
    expected.extend(leaf("Note", Value::from("a")));
    expected.extend(leaf("Note", Value::from("a")));
    expected.extend(leaf("Raw", Value::HexBinary(vec![0xCA, 0xFE])));
    expected.push(ExiEvent::EndElement);

    assert_eq!(round_trip(&doc(inner), &CodecOptions::default()), doc(expected));
}

#[test]
fn cookie_wird_akzeptiert() {
    let idx = index();
    let options = CodecOptions::default();
    let events = doc(leaf("Ping", Value::from("1")).into());
    let mut bytes = b"$EXI".to_vec();
    bytes.extend(encode(&idx, &events, &options).unwrap());

    let mut decoder = Decoder::new(&idx, &bytes, &options);
    assert_eq!(decoder.next_event().unwrap(), Some(ExiEvent::StartDocument));
    assert!(decoder.header().is_some_and(|h| h.cookie));
}

#[test]
fn gelernte_elemente_werden_mitgelernt() {
    let options = dynamic();
    let mut inner = vec![ExiEvent::StartElement(q("Msg"))];
    for text in ["x", "y", "x"] {
        inner.extend([
            ExiEvent::StartElement(q("Vendor")),
            ExiEvent::Attribute(QName::local("k"), Value::from(text)),
            ExiEvent::Characters(Value::from(text)),
            ExiEvent::EndElement,
        ]);
    }
    inner.extend(leaf("Id", Value::from("1")));
    inner.push(ExiEvent::EndElement);

    let decoded = round_trip(&doc(inner.clone()), &options);
    let mut expected = doc(inner);
    let idx = expected.len() - 4;
    expected[idx] = ExiEvent::Characters(Value::Unsigned(1));
    assert_eq!(decoded, expected);
}

#[test]
fn unbekanntes_root_ueber_escape() {
    let options = dynamic();
    let events = doc(leaf("Pong", Value::from("hi")).into());
    assert_eq!(round_trip(&events, &options), events);

    // ohne Erlaubnis lehnt der Decoder denselben Strom ab
    let idx = index();
    let bytes = encode(&idx, &events, &options).unwrap();
    let err = decode(&idx, &bytes, &CodecOptions::default()).unwrap_err();
    let Error::Decode { state, .. } = &err else { panic!("{err:?}") };
    assert_eq!(state, "Document");
}

#[test]
fn escape_im_element_ohne_erlaubnis() {
    let idx = index();
    // Ping: Root-Code 01, dann CH-Zustand mit Code 1 = Escape
    let err = decode(&idx, &[0x80, 0b0110_0000], &CodecOptions::default()).unwrap_err();
    let Error::Decode { offset, message, .. } = &err else { panic!("{err:?}") };
    assert_eq!(*offset, 1);
    assert!(message.contains("rejectUnknown"), "{message}");
}

#[test]
fn root_code_ausserhalb() {
    let idx = index();
    // zwei Roots + Escape = Codes 0..=2; 3 ist ungueltig
    let err = decode(&idx, &[0x80, 0b1100_0000], &dynamic()).unwrap_err();
    assert!(err.to_string().contains("out of range"), "{err}");
}

#[test]
fn abgeschnittener_strom() {
    let idx = index();
    let options = CodecOptions::default();
    let mut inner = vec![ExiEvent::StartElement(q("Msg"))];
    inner.extend(leaf("Id", Value::from("9")));
    inner.extend(leaf("Note", Value::from("a longer note that spans bytes")));
    inner.push(ExiEvent::EndElement);
    let bytes = encode(&idx, &doc(inner), &options).unwrap();

    for len in 0..bytes.len() {
        let err = decode(&idx, &bytes[..len], &options).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Decode, "len {len}");
        let offset = err.offset().unwrap();
        assert!(offset <= len, "offset {offset} > {len}");
    }
}

#[test]
fn leere_eingabe_scheitert_im_header() {
    let err = decode(&index(), &[], &CodecOptions::default()).unwrap_err();
    let Error::Decode { offset, state, .. } = err else { panic!() };
    assert_eq!((offset, state.as_str()), (0, "Header"));
}

#[test]
fn escape_in_docend() {
    let idx = index();
    let options = CodecOptions::default();
    let mut bytes = encode(&idx, &doc(leaf("Ping", Value::from("0")).into()), &options).unwrap();
    // 01 0 00000000 0 | ED-Bit = Bit 12 des Body
    let last = bytes.len() - 1;
    bytes[last] |= 0b0000_1000;
    let err = decode(&idx, &bytes, &options).unwrap_err();
    assert!(err.to_string().contains("DocEnd"), "{err}");
}

#[test]
fn nach_ed_kommt_nichts_mehr() {
    let idx = index();
    let options = CodecOptions::default();
    let bytes = encode(&idx, &doc(leaf("Ping", Value::from("3")).into()), &options).unwrap();
    let mut decoder = Decoder::new(&idx, &bytes, &options);
    while decoder.next_event().unwrap().is_some() {}
    assert_eq!(decoder.next_event().unwrap(), None);
}
