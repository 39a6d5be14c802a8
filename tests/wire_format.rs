//! Hand-written streams: literal decoding, version gating, aliases,
//! metadata and configuration.

mod common;

use std::io::Write;

use common::{registry, Node};
use graphpack::text::parser::parse_str;
use graphpack::text::Statement;
use graphpack::{
    pack_to_string, unpack_str, BoxedArray, ElemKind, EngineConfig, EngineContext, EntityGraph,
    Holder, MetaValue, MetadataRecorder, PackError, Packer, ParseErrorKind, PrimitiveArray,
    UnpackError, Unpacker, VersionPolicy,
};

const HEAD: &str = "&1000000:\"wire\";\n1@\"demo.Node\";\n";

fn parse_kind(body: &str) -> Result<(), ParseErrorKind> {
    parse_str(&format!("{}{}", HEAD, body))
        .map(|_| ())
        .map_err(|e| e.kind)
}

fn field(body: &str, name: &str) -> Holder {
    let (_, statements) = parse_str(&format!("{}{}", HEAD, body)).unwrap();
    statements
        .into_iter()
        .find_map(|s| match s {
            Statement::Definition(d) => d.bundle.get(name).cloned(),
            _ => None,
        })
        .unwrap()
}

#[test]
fn test_definition_requires_version() {
    assert_eq!(parse_kind("r1:5=(name=s\"x\");"), Err(ParseErrorKind::MissingVersion));
    assert_eq!(parse_kind("r1:5v1=(name=s\"x\");"), Ok(()));
}

#[test]
fn test_value_reference_forbids_version() {
    assert_eq!(parse_kind("r1:4v1=(next=r1:5);"), Ok(()));
    assert_eq!(
        parse_kind("r1:4v1=(next=r1:5v1);"),
        Err(ParseErrorKind::VersionOnValue)
    );
}

#[test]
fn test_literal_decoding() {
    let body = "r1:1v1=(i=i42,t=bT,f=bF,n=ø,arr=a3i[1,2,3],boxed=A2i[ø,5],neg=l-7,\
                e=e\"RED\",bytes=a3x[00,7f ff],d=d-1.5e3,inf=d-inf);";
    assert_eq!(field(body, "i"), Holder::Int(42));
    assert_eq!(field(body, "t"), Holder::Bool(true));
    assert_eq!(field(body, "f"), Holder::Bool(false));
    assert_eq!(field(body, "n"), Holder::Null);
    assert_eq!(field(body, "arr"), Holder::Array(PrimitiveArray::Int(vec![1, 2, 3])));
    assert_eq!(
        field(body, "boxed"),
        Holder::Boxed(BoxedArray::new(ElemKind::Int, vec![Holder::Null, Holder::Int(5)]).unwrap())
    );
    assert_eq!(field(body, "neg"), Holder::Long(-7));
    assert_eq!(field(body, "e"), Holder::Name("RED".to_string()));
    assert_eq!(field(body, "bytes"), Holder::Array(PrimitiveArray::Byte(vec![0, 127, -1])));
    assert_eq!(field(body, "d"), Holder::Double(-1500.0));
    assert_eq!(field(body, "inf"), Holder::Double(f64::NEG_INFINITY));
}

#[test]
fn test_array_length_must_match() {
    assert!(matches!(
        parse_kind("r1:1v1=(arr=a2i[1,2,3]);"),
        Err(ParseErrorKind::MalformedArray(_))
    ));
}

#[test]
fn test_one_instance_under_two_aliases() {
    let context = EngineContext::isolated();
    let mut graph = EntityGraph::new();
    let node = graph.add(Node::new(&context, "n"));

    let text = pack_to_string(&graph, &[(Some("first"), node), (Some("second"), node)], &context)
        .unwrap();
    assert_eq!(text.matches("=(name=s\"n\"").count(), 1);
    assert!(text.contains("r1:1v1/\"first\"/\"second\"=("));

    let unpacked = unpack_str(&text, &registry(), &context).unwrap();
    assert_eq!(unpacked.graph.len(), 1);
    assert_eq!(unpacked.by_alias("first"), unpacked.by_alias("second"));
    assert_eq!(unpacked.aliases.keys().collect::<Vec<_>>(), vec!["first", "second"]);
}

#[test]
fn test_comments_and_whitespace_are_ignored() {
    let context = EngineContext::isolated();
    let text = "# produced by hand\n&1000000:\"wire\";\n\n  1@\"demo.Node\";  # node type\n\
                r1:1v1/\"n\" = ( name = s\"spaced\" , next = ø ) ;\n";
    let unpacked = unpack_str(text, &registry(), &context).unwrap();
    assert_eq!(unpacked.alias_as::<Node>("n").unwrap().name, "spaced");
}

#[test]
fn test_unreadable_format_version() {
    let context = EngineContext::isolated();
    let err = unpack_str("&2000000:\"future\";\n", &registry(), &context).unwrap_err();
    match err {
        UnpackError::Parse(e) => assert!(matches!(e.kind, ParseErrorKind::BadHeader(_))),
        other => panic!("expected parse error, got {:?}", other),
    }
    // Minor versions of the same major are accepted.
    assert!(unpack_str("&1000003:\"newer\";\n", &registry(), &context).is_ok());
}

#[test]
fn test_metadata_round_trip() {
    let context = EngineContext::isolated();
    let graph = EntityGraph::new();
    let mut packer = Packer::new(Vec::new(), &graph, &context).unwrap();
    packer.write_metadata("rows", &MetaValue::Long(12)).unwrap();
    packer.write_metadata("ratio", &MetaValue::Double(0.25)).unwrap();
    packer.write_metadata("dirty", &MetaValue::Bool(false)).unwrap();
    packer.write_metadata("author", &MetaValue::Str("a \"b\"".to_string())).unwrap();
    packer.finish().unwrap();
    let text = packer.into_inner();

    let registry = registry();
    let recorder = MetadataRecorder::new();
    let mut unpacker = Unpacker::new(text.as_slice(), &registry, &context);
    unpacker.add_metadata_handler(Box::new(recorder.clone()));
    let unpacked = unpacker.unpack().unwrap();

    assert!(unpacked.graph.is_empty());
    assert_eq!(
        recorder.entries(),
        vec![
            ("rows".to_string(), MetaValue::Long(12)),
            ("ratio".to_string(), MetaValue::Double(0.25)),
            ("dirty".to_string(), MetaValue::Bool(false)),
            ("author".to_string(), MetaValue::Str("a \"b\"".to_string())),
        ]
    );
}

#[test]
fn test_config_file_drives_packer_and_unpacker() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "label: scene\nannotate_passes: true\nversion_policy: lenient").unwrap();
    let config = EngineConfig::load_from_file(file.path()).unwrap();
    assert_eq!(config.version_policy, VersionPolicy::Lenient);

    let context = EngineContext::isolated().with_config(config);
    let mut graph = EntityGraph::new();
    let node = graph.add(Node::new(&context, "n"));
    let text = pack_to_string(&graph, &[(None, node)], &context).unwrap();
    assert!(text.starts_with("&1000000:\"scene\";\n"));
    assert!(text.contains("# pass 1\n"));

    // Lenient policy accepts a version newer than the factory supports.
    let newer = text.replace("r1:1v1=", "r1:1v9=");
    let unpacked = unpack_str(&newer, &registry(), &context).unwrap();
    assert_eq!(unpacked.header.label, "scene");
    assert_eq!(unpacked.stats.entities, 1);
}

#[test]
fn test_missing_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = EngineConfig::load_from_file(dir.path().join("absent.yaml"));
    assert!(matches!(result, Err(graphpack::ConfigError::Io(_))));
}

#[test]
fn test_strict_policy_rejects_newer_version() {
    let context = EngineContext::isolated();
    let text = format!("{}r1:1v9=(name=s\"n\",next=ø);", HEAD);
    let err = unpack_str(&text, &registry(), &context).unwrap_err();
    assert!(matches!(err, UnpackError::UnsupportedVersion { version: 9, .. }));
}

#[test]
fn test_packer_rejects_use_after_finish() {
    let context = EngineContext::isolated();
    let mut graph = EntityGraph::new();
    let node = graph.add(Node::new(&context, "n"));

    let mut packer = Packer::new(Vec::new(), &graph, &context).unwrap();
    packer.finish().unwrap();
    assert!(matches!(packer.pack(None, node), Err(PackError::Finished)));
    assert!(matches!(packer.finish(), Err(PackError::AlreadyFinished)));
}
