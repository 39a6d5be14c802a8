//! Pack then unpack acyclic graphs and compare the results.

mod common;

use common::{registry, Bag, BagData, Bookmark, Circle, Node, Shape};
use graphpack::{pack_to_string, unpack_str, EngineContext, EntityGraph, Link, Packer, TypeName};

#[test]
fn test_scalar_and_array_fields_round_trip() {
    let context = EngineContext::isolated();
    let mut graph = EntityGraph::new();
    let bag = graph.add(Bag::new(&context, BagData::sample()));

    let text = pack_to_string(&graph, &[(Some("bag"), bag)], &context).unwrap();
    let unpacked = unpack_str(&text, &registry(), &context).unwrap();

    let restored = unpacked.alias_as::<Bag>("bag").unwrap();
    assert_eq!(restored.data, BagData::sample());
    assert_ne!(restored.id, graph.get_as::<Bag>(bag).unwrap().id);
}

#[test]
fn test_chain_round_trip_preserves_topology() {
    let context = EngineContext::isolated();
    let mut graph = EntityGraph::new();
    let a = graph.add(Node::new(&context, "a"));
    let b = graph.add(Node::new(&context, "b"));
    let c = graph.add(Node::new(&context, "c"));
    graph.get_as_mut::<Node>(a).unwrap().next = Some(Link::to(b));
    graph.get_as_mut::<Node>(b).unwrap().next = Some(Link::to(c));

    let text = pack_to_string(&graph, &[(Some("head"), a)], &context).unwrap();
    let unpacked = unpack_str(&text, &registry(), &context).unwrap();
    assert_eq!(unpacked.graph.len(), 3);

    let mut names = Vec::new();
    let mut cursor = unpacked.by_alias("head");
    while let Some(node) = cursor {
        let entity = unpacked.graph.get_as::<Node>(node).unwrap();
        names.push(entity.name.clone());
        cursor = entity.next.as_ref().and_then(Link::node);
    }
    assert_eq!(names, vec!["a", "b", "c"]);
}

#[test]
fn test_shared_target_is_written_once() {
    let context = EngineContext::isolated();
    let mut graph = EntityGraph::new();
    let left = graph.add(Node::new(&context, "left"));
    let right = graph.add(Node::new(&context, "right"));
    let shared = graph.add(Node::new(&context, "shared"));
    graph.get_as_mut::<Node>(left).unwrap().next = Some(Link::to(shared));
    graph.get_as_mut::<Node>(right).unwrap().next = Some(Link::to(shared));

    let text = pack_to_string(&graph, &[(Some("l"), left), (Some("r"), right)], &context).unwrap();
    assert_eq!(text.matches("name=s\"shared\"").count(), 1);

    let unpacked = unpack_str(&text, &registry(), &context).unwrap();
    assert_eq!(unpacked.graph.len(), 3);
    let l = unpacked.alias_as::<Node>("l").unwrap();
    let r = unpacked.alias_as::<Node>("r").unwrap();
    assert_eq!(l.next, r.next);
    assert!(l.next.as_ref().unwrap().is_resolved());
}

#[test]
fn test_type_alias_written_once_per_type() {
    let context = EngineContext::isolated();
    let mut graph = EntityGraph::new();
    let nodes: Vec<_> = ["a", "b", "c"]
        .iter()
        .map(|name| graph.add(Node::new(&context, name)))
        .collect();
    let circle = graph.add(Circle::new(&context, "c", 1, 2.0));

    let mut packer = Packer::new(Vec::new(), &graph, &context).unwrap();
    for node in &nodes {
        packer.pack(None, *node).unwrap();
    }
    packer.pack(None, circle).unwrap();
    let stats = packer.finish().unwrap();
    let text = String::from_utf8(packer.into_inner()).unwrap();

    assert_eq!(stats.types, 3);
    assert_eq!(text.matches("@\"demo.Node\";").count(), 1);
    assert!(text.contains("1@\"demo.Node\";"));
    assert_eq!(text.matches("r1:").count(), 3);
    assert!(text.contains("r1:3v1=(name=s\"c\",next=ø);"));

    // Alias lines precede their first use.
    let alias_at = text.find("@\"demo.Shape\"").unwrap();
    let use_at = text.find(":0v2=(").unwrap();
    assert!(alias_at < use_at);
}

#[test]
fn test_super_bundle_round_trip() {
    let context = EngineContext::isolated();
    let mut graph = EntityGraph::new();
    let circle = graph.add(Circle::new(&context, "wheel", 3, 1.5));
    let square = graph.add(Shape::new(&context, "plain", 7));

    let text =
        pack_to_string(&graph, &[(Some("circle"), circle), (Some("shape"), square)], &context)
            .unwrap();
    assert!(text.contains("=(r2:0v2=(label=s\"wheel\",layer=i3),radius=d1.5);"));

    let unpacked = unpack_str(&text, &registry(), &context).unwrap();
    let restored = unpacked.alias_as::<Circle>("circle").unwrap();
    assert_eq!(restored.base.label, "wheel");
    assert_eq!(restored.base.layer, 3);
    assert_eq!(restored.radius, 1.5);

    let shape = unpacked.alias_as::<Shape>("shape").unwrap();
    assert_eq!((shape.label.as_str(), shape.layer), ("plain", 7));
}

#[test]
fn test_older_shape_version_is_read() {
    let context = EngineContext::isolated();
    let text = "&1000000:\"old\";\n1@\"demo.Circle\";\n2@\"demo.Shape\";\n\
                r1:1v1/\"c\"=(r2:0v1=(label=s\"legacy\"),radius=d2.0);\n";
    let unpacked = unpack_str(text, &registry(), &context).unwrap();
    let circle = unpacked.alias_as::<Circle>("c").unwrap();
    assert_eq!(circle.base.label, "legacy");
    assert_eq!(circle.base.layer, 0);
}

#[test]
fn test_repacking_unpacked_graph_is_stable() {
    let context = EngineContext::isolated();
    let mut graph = EntityGraph::new();
    let a = graph.add(Node::new(&context, "a"));
    let b = graph.add(Node::new(&context, "b"));
    graph.get_as_mut::<Node>(a).unwrap().next = Some(Link::to(b));

    let first = pack_to_string(&graph, &[(Some("head"), a)], &context).unwrap();
    let unpacked = unpack_str(&first, &registry(), &context).unwrap();
    let head = unpacked.by_alias("head").unwrap();
    let second = pack_to_string(&unpacked.graph, &[(Some("head"), head)], &context).unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_bookmark_resolves_target_and_alias() {
    let context = EngineContext::isolated();
    let mut graph = EntityGraph::new();
    let head = graph.add(Node::new(&context, "head"));
    let mark = graph.add(Bookmark::new(&context, Some(head), "head"));
    let dangling = graph.add(Bookmark::new(&context, None, "absent"));

    let text = pack_to_string(
        &graph,
        &[(Some("mark"), mark), (Some("dangling"), dangling), (Some("head"), head)],
        &context,
    )
    .unwrap();
    assert!(text.contains("=(target=ø,alias=s\"absent\");"));

    let unpacked = unpack_str(&text, &registry(), &context).unwrap();
    let head2 = unpacked.by_alias("head").unwrap();
    let node_type = context.identity.type_id(&TypeName::new(Node::TYPE).unwrap());

    let restored = unpacked.alias_as::<Bookmark>("mark").unwrap();
    assert_eq!(restored.target, Some(head2));
    assert_eq!(restored.aliased, Some(head2));
    assert_eq!(restored.target_type, Some(node_type));

    let dangling = unpacked.alias_as::<Bookmark>("dangling").unwrap();
    assert_eq!(dangling.target, None);
    assert_eq!(dangling.aliased, None);
    assert_eq!(dangling.target_type, None);
}
