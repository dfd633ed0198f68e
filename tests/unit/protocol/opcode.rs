use std::collections::HashSet;

use super::*;

#[test]
fn opcode_strings_are_unique_across_namespaces() {
    let all: Vec<String> = Opcode::all().map(|o| o.to_string()).collect();
    assert_eq!(all.len(), Namespace::ALL.len() * Op::ALL.len());
    let unique: HashSet<&String> = all.iter().collect();
    assert_eq!(unique.len(), all.len());
    assert!(all.contains(&"BrowserCreate".to_string()));
    assert!(all.contains(&"NodeCreate".to_string()));
}

#[test]
fn every_opcode_parses_back() {
    for opcode in Opcode::all() {
        assert_eq!(opcode.to_string().parse::<Opcode>().unwrap(), opcode);
    }
}

#[test]
fn unknown_strings_are_rejected() {
    for bad in ["Bogus", "BrowserBogus", "Create", "browserCreate", "NodeCreateImageX", ""] {
        assert_eq!(
            bad.parse::<Opcode>(),
            Err(ProtocolError::UnknownOpcode(bad.to_string())),
            "{bad:?}"
        );
    }
}

#[test]
fn namespaces_pick_their_2d_surface() {
    assert_eq!(Namespace::Browser.surface_kind(), SurfaceKind::Raster);
    assert_eq!(Namespace::Node.surface_kind(), SurfaceKind::Offscreen);
}

#[test]
fn opcode_serializes_as_string() {
    let op = Opcode::new(Namespace::Node, Op::FillImage);
    assert_eq!(serde_json::to_string(&op).unwrap(), "\"NodeFillImage\"");
    let back: Opcode = serde_json::from_str("\"NodeFillImage\"").unwrap();
    assert_eq!(back, op);
}
