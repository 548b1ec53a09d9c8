use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use v2gexi::RootIndex;

include!("common/iso20.rs");

fn v2gexi_bin() -> &'static str {
    env!("CARGO_BIN_EXE_v2gexi")
}

fn test_temp_dir(tag: &str) -> PathBuf {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before epoch")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("v2gexi-cli-e2e-{tag}-{}-{ts}", std::process::id()));
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn run_v2gexi(args: &[&str]) -> Output {
    Command::new(v2gexi_bin()).args(args).output().expect("run v2gexi")
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

#[test]
fn cli_json_hex_roundtrip() {
    let dir = test_temp_dir("json");
    let schema = fixture_dir();
    let schema = schema.to_str().unwrap();
    let input = dir.join("req.json");
    let hex = dir.join("req.hex");
    fs::write(&input, session_setup_req().to_string()).unwrap();

    let enc = run_v2gexi(&[
        "encode",
        "--schema",
        schema,
        "--type",
        "SessionSetupReq",
        "--json",
        input.to_str().unwrap(),
        "--hex",
        "-o",
        hex.to_str().unwrap(),
    ]);
    assert!(enc.status.success(), "encode failed: {}", stderr(&enc));
    let text = fs::read_to_string(&hex).unwrap();
    assert!(text.trim().starts_with("80"), "{text}");

    let dec = run_v2gexi(&["decode", "--schema", schema, "--type", "35", "--hex", hex.to_str().unwrap()]);
    assert!(dec.status.success(), "decode failed: {}", stderr(&dec));
    let tree: serde_json::Value = serde_json::from_slice(&dec.stdout).unwrap();
    assert_eq!(tree, session_setup_req());
}

#[test]
fn cli_xml_roundtrip() {
    let dir = test_temp_dir("xml");
    let schema = fixture_dir();
    let schema = schema.to_str().unwrap();
    let input = dir.join("req.xml");
    let exi = dir.join("req.exi");
    fs::write(&input, SESSION_SETUP_REQ_XML).unwrap();

    let enc = run_v2gexi(&[
        "encode",
        "-s",
        schema,
        "--xml",
        input.to_str().unwrap(),
        "-o",
        exi.to_str().unwrap(),
    ]);
    assert!(enc.status.success(), "encode failed: {}", stderr(&enc));
    assert_eq!(fs::read(&exi).unwrap()[0], 0x80);

    let dec = run_v2gexi(&["decode", "-s", schema, exi.to_str().unwrap()]);
    assert!(dec.status.success(), "decode failed: {}", stderr(&dec));
    let xml = String::from_utf8(dec.stdout).unwrap();
    assert!(xml.contains("WMIV1234567890ABCDEX"), "{xml}");
    assert_eq!(
        v2gexi::parse_xml_events(&xml).unwrap(),
        v2gexi::parse_xml_events(SESSION_SETUP_REQ_XML).unwrap()
    );
}

#[test]
fn cli_name() {
    let out = run_v2gexi(&["name", "35"]);
    assert!(out.status.success());
    assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "SessionSetupReq");

    let out = run_v2gexi(&["name", "9999"]);
    assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "Unknown(9999)");
}

#[test]
fn cli_decode_fehler_liefert_status() {
    let dir = test_temp_dir("broken");
    let broken = dir.join("broken.exi");
    fs::write(&broken, [0x80, 0xFF]).unwrap();
    let schema = fixture_dir();

    let out = run_v2gexi(&["decode", "-s", schema.to_str().unwrap(), broken.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(5), "{}", stderr(&out));
    assert!(stderr(&out).contains("DecodeError"), "{}", stderr(&out));
}

#[test]
fn cli_unbekannte_option() {
    let dir = test_temp_dir("option");
    let input = dir.join("req.xml");
    fs::write(&input, SESSION_SETUP_REQ_XML).unwrap();
    let schema = fixture_dir();

    let out = run_v2gexi(&[
        "encode",
        "-s",
        schema.to_str().unwrap(),
        "--option",
        "compression=true",
        "--xml",
        input.to_str().unwrap(),
    ]);
    assert_eq!(out.status.code(), Some(3), "{}", stderr(&out));
    assert!(stderr(&out).contains("compression"));
}
