//! Entity fixtures shared by the integration tests.

#![allow(dead_code)]

use indexmap::IndexMap;

use graphpack::{
    BoxedArray, Bundle, BundleError, ElemKind, EngineContext, EntityRef, FactoryRegistry, Holder,
    InstanceId, Link, NodeId, PackError, PackSession, Packable, Resolver, TypeName, UnpackContext,
    UnpackError,
};

pub fn allocate(context: &EngineContext, type_name: &str) -> InstanceId {
    context.identity.allocate(&TypeName::new(type_name).unwrap())
}

/// Singly linked node; finished once its link resolves.
#[derive(Debug)]
pub struct Node {
    pub id: InstanceId,
    pub name: String,
    pub next: Option<Link>,
}

impl Node {
    pub const TYPE: &'static str = "demo.Node";

    pub fn new(context: &EngineContext, name: &str) -> Self {
        Self {
            id: allocate(context, Self::TYPE),
            name: name.to_string(),
            next: None,
        }
    }
}

impl Packable for Node {
    fn instance_id(&self) -> InstanceId {
        self.id
    }

    fn bundle_self(&self, _is_super: bool, session: &mut PackSession<'_>) -> Result<Bundle, PackError> {
        let next = session.link_opt(self.next.as_ref())?;
        Ok(Bundle::of(Self::TYPE, 1)?
            .with("name", self.name.as_str())?
            .with("next", next)?)
    }

    fn finish_resolving(&mut self, resolver: &Resolver<'_>) -> Result<bool, UnpackError> {
        Ok(self.next.as_mut().map_or(true, |link| link.resolve(resolver)))
    }
}

fn construct_node(
    context: &UnpackContext<'_>,
    bundle: &Bundle,
    _reference: &EntityRef,
) -> Result<Box<dyn Packable>, UnpackError> {
    Ok(Box::new(Node {
        id: context.allocate(bundle.type_name()),
        name: bundle.get_str("name")?.to_string(),
        next: bundle.get_ref("next")?.map(Link::Unresolved),
    }))
}

/// Key/value entry of a [`Table`].
///
/// Ready once the key is resolved and finished. The value is linked when
/// possible but not waited for, unless `strict` is set.
#[derive(Debug)]
pub struct Pair {
    pub id: InstanceId,
    pub key: Option<Link>,
    pub value: Option<Link>,
    pub strict: bool,
}

impl Pair {
    pub const TYPE: &'static str = "demo.Pair";

    pub fn new(context: &EngineContext, key: NodeId, value: NodeId) -> Self {
        Self {
            id: allocate(context, Self::TYPE),
            key: Some(Link::to(key)),
            value: Some(Link::to(value)),
            strict: false,
        }
    }
}

fn ready(link: &mut Link, resolver: &Resolver<'_>) -> bool {
    link.resolve(resolver) && link.node().map_or(false, |node| resolver.is_finished(node))
}

impl Packable for Pair {
    fn instance_id(&self) -> InstanceId {
        self.id
    }

    fn bundle_self(&self, _is_super: bool, session: &mut PackSession<'_>) -> Result<Bundle, PackError> {
        let key = session.link_opt(self.key.as_ref())?;
        let value = session.link_opt(self.value.as_ref())?;
        let mut bundle = Bundle::of(Self::TYPE, 1)?;
        bundle.put("key", key)?.put("value", value)?;
        if self.strict {
            bundle.put("strict", true)?;
        }
        Ok(bundle)
    }

    fn finish_resolving(&mut self, resolver: &Resolver<'_>) -> Result<bool, UnpackError> {
        let key_ready = self.key.as_mut().map_or(true, |link| ready(link, resolver));
        let value_ready = match self.value.as_mut() {
            Some(link) if self.strict => ready(link, resolver),
            Some(link) => {
                link.resolve(resolver);
                true
            }
            None => true,
        };
        Ok(key_ready && value_ready)
    }
}

fn construct_pair(
    context: &UnpackContext<'_>,
    bundle: &Bundle,
    _reference: &EntityRef,
) -> Result<Box<dyn Packable>, UnpackError> {
    Ok(Box::new(Pair {
        id: context.allocate(bundle.type_name()),
        key: bundle.get_ref("key")?.map(Link::Unresolved),
        value: bundle.get_ref("value")?.map(Link::Unresolved),
        strict: bundle.value_opt::<bool>("strict")?.unwrap_or(false),
    }))
}

/// Lookup table rebuilt from its pairs: key node name to value node.
#[derive(Debug)]
pub struct Table {
    pub id: InstanceId,
    pub entries: Vec<Link>,
    pub lookup: IndexMap<String, Option<NodeId>>,
}

impl Table {
    pub const TYPE: &'static str = "demo.Table";

    pub fn new(context: &EngineContext, entries: Vec<NodeId>) -> Self {
        Self {
            id: allocate(context, Self::TYPE),
            entries: entries.into_iter().map(Link::to).collect(),
            lookup: IndexMap::new(),
        }
    }
}

impl Packable for Table {
    fn instance_id(&self) -> InstanceId {
        self.id
    }

    fn bundle_self(&self, _is_super: bool, session: &mut PackSession<'_>) -> Result<Bundle, PackError> {
        let items = self
            .entries
            .iter()
            .map(|link| session.link(link))
            .collect::<Result<Vec<_>, _>>()?;
        let entries = BoxedArray::new(ElemKind::Ref, items).ok_or_else(|| BundleError::WrongKind {
            field: "entries".to_string(),
            expected: "reference",
            actual: "mixed",
        })?;
        Ok(Bundle::of(Self::TYPE, 1)?.with("entries", entries)?)
    }

    fn finish_resolving(&mut self, resolver: &Resolver<'_>) -> Result<bool, UnpackError> {
        let mut all_ready = true;
        for link in self.entries.iter_mut() {
            all_ready &= ready(link, resolver);
        }
        if !all_ready {
            return Ok(false);
        }

        self.lookup.clear();
        for node in self.entries.iter().filter_map(Link::node) {
            let pair = resolver.get_as::<Pair>(node).ok_or_else(|| UnpackError::Entity {
                reference: None,
                message: format!("{} is not a pair", node),
            })?;
            let name = pair
                .key
                .as_ref()
                .and_then(Link::node)
                .and_then(|key| resolver.get_as::<Node>(key))
                .map(|key| key.name.clone())
                .unwrap_or_default();
            let value = pair.value.as_ref().and_then(Link::node);
            self.lookup.insert(name, value);
        }
        Ok(true)
    }
}

fn construct_table(
    context: &UnpackContext<'_>,
    bundle: &Bundle,
    reference: &EntityRef,
) -> Result<Box<dyn Packable>, UnpackError> {
    let entries = bundle
        .value::<BoxedArray>("entries")?
        .items()
        .iter()
        .map(|item| match item {
            Holder::Ref(r) => Ok(Link::Unresolved(r.clone())),
            other => Err(UnpackError::entity(
                reference,
                format!("table entry holds {}", other.kind_name()),
            )),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Box::new(Table {
        id: context.allocate(bundle.type_name()),
        entries,
        lookup: IndexMap::new(),
    }))
}

/// Base type, usable alone or as the super part of a [`Circle`].
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub id: InstanceId,
    pub label: String,
    pub layer: i32,
}

impl Shape {
    pub const TYPE: &'static str = "demo.Shape";

    pub fn new(context: &EngineContext, label: &str, layer: i32) -> Self {
        Self {
            id: allocate(context, Self::TYPE),
            label: label.to_string(),
            layer,
        }
    }

    fn from_bundle(context: &UnpackContext<'_>, bundle: &Bundle) -> Result<Self, UnpackError> {
        Ok(Self {
            id: context.allocate(bundle.type_name()),
            label: bundle.get_str("label")?.to_string(),
            // Version 1 streams predate layers.
            layer: bundle.value_opt::<i32>("layer")?.unwrap_or(0),
        })
    }
}

impl Packable for Shape {
    fn instance_id(&self) -> InstanceId {
        self.id
    }

    fn bundle_self(&self, _is_super: bool, _session: &mut PackSession<'_>) -> Result<Bundle, PackError> {
        Ok(Bundle::of(Self::TYPE, 2)?
            .with("label", self.label.as_str())?
            .with("layer", self.layer)?)
    }

    fn finish_resolving(&mut self, _resolver: &Resolver<'_>) -> Result<bool, UnpackError> {
        Ok(true)
    }
}

fn construct_shape(
    context: &UnpackContext<'_>,
    bundle: &Bundle,
    _reference: &EntityRef,
) -> Result<Box<dyn Packable>, UnpackError> {
    Ok(Box::new(Shape::from_bundle(context, bundle)?))
}

/// Derived type carrying a [`Shape`] as its super bundle.
#[derive(Debug)]
pub struct Circle {
    pub id: InstanceId,
    pub base: Shape,
    pub radius: f64,
}

impl Circle {
    pub const TYPE: &'static str = "demo.Circle";

    pub fn new(context: &EngineContext, label: &str, layer: i32, radius: f64) -> Self {
        Self {
            id: allocate(context, Self::TYPE),
            base: Shape::new(context, label, layer),
            radius,
        }
    }
}

impl Packable for Circle {
    fn instance_id(&self) -> InstanceId {
        self.id
    }

    fn bundle_self(&self, _is_super: bool, session: &mut PackSession<'_>) -> Result<Bundle, PackError> {
        let base = self.base.bundle_self(true, session)?;
        Ok(Bundle::of(Self::TYPE, 1)?
            .with("radius", self.radius)?
            .with_super(base))
    }

    fn finish_resolving(&mut self, _resolver: &Resolver<'_>) -> Result<bool, UnpackError> {
        Ok(true)
    }
}

fn construct_circle(
    context: &UnpackContext<'_>,
    bundle: &Bundle,
    reference: &EntityRef,
) -> Result<Box<dyn Packable>, UnpackError> {
    let base = bundle
        .super_bundle()
        .ok_or_else(|| UnpackError::entity(reference, "circle without shape part"))?;
    Ok(Box::new(Circle {
        id: context.allocate(bundle.type_name()),
        base: Shape::from_bundle(context, base)?,
        radius: bundle.get_double("radius")?,
    }))
}

/// Points at a node by plain `NodeId` and names a stream alias to look up.
///
/// On unpack it records the type id of its target and the node behind
/// `alias`, if the stream defines one.
#[derive(Debug)]
pub struct Bookmark {
    pub id: InstanceId,
    pub target: Option<NodeId>,
    pub alias: String,
    pub aliased: Option<NodeId>,
    pub target_type: Option<u32>,
    pending: Option<EntityRef>,
}

impl Bookmark {
    pub const TYPE: &'static str = "demo.Bookmark";

    pub fn new(context: &EngineContext, target: Option<NodeId>, alias: &str) -> Self {
        Self {
            id: allocate(context, Self::TYPE),
            target,
            alias: alias.to_string(),
            aliased: None,
            target_type: None,
            pending: None,
        }
    }
}

impl Packable for Bookmark {
    fn instance_id(&self) -> InstanceId {
        self.id
    }

    fn bundle_self(&self, _is_super: bool, session: &mut PackSession<'_>) -> Result<Bundle, PackError> {
        let target = session.reference_opt(self.target)?;
        Ok(Bundle::of(Self::TYPE, 1)?
            .with("target", target)?
            .with("alias", self.alias.as_str())?)
    }

    fn finish_resolving(&mut self, resolver: &Resolver<'_>) -> Result<bool, UnpackError> {
        if let Some(reference) = &self.pending {
            match resolver.resolve(reference) {
                Some(node) => {
                    self.target = Some(node);
                    self.pending = None;
                }
                None => return Ok(false),
            }
        }
        self.target_type = self
            .target
            .and_then(|node| resolver.get(node))
            .map(|entity| entity.instance_id().type_id);
        self.aliased = resolver.lookup_alias(&self.alias);
        Ok(true)
    }
}

fn construct_bookmark(
    context: &UnpackContext<'_>,
    bundle: &Bundle,
    _reference: &EntityRef,
) -> Result<Box<dyn Packable>, UnpackError> {
    Ok(Box::new(Bookmark {
        id: context.allocate(bundle.type_name()),
        target: None,
        alias: bundle.get_str("alias")?.to_string(),
        aliased: None,
        target_type: None,
        pending: bundle.get_ref("target")?,
    }))
}

/// One field of every kind the format can carry.
#[derive(Debug, Clone, PartialEq)]
pub struct BagData {
    pub flag: bool,
    pub letter: char,
    pub small: i8,
    pub short: i16,
    pub count: i32,
    pub big: i64,
    pub ratio: f32,
    pub precise: f64,
    pub title: String,
    pub color: String,
    pub missing: Option<i32>,
    pub ints: Vec<i32>,
    pub bytes: Vec<i8>,
    pub chars: Vec<char>,
    pub doubles: Vec<f64>,
    pub maybe: BoxedArray,
    pub words: BoxedArray,
}

impl BagData {
    pub fn sample() -> Self {
        Self {
            flag: true,
            letter: 'é',
            small: -128,
            short: 32767,
            count: -42,
            big: i64::MIN,
            ratio: 0.1,
            precise: 1e300,
            title: "line\n\"quoted\"\t\\ end".to_string(),
            color: "RED".to_string(),
            missing: None,
            ints: vec![1, -2, 3],
            bytes: vec![0, 15, -1, 127],
            chars: vec!['a', ',', '"'],
            doubles: vec![-0.5, f64::INFINITY, 2.5e-8],
            maybe: BoxedArray::new(ElemKind::Int, vec![Holder::Null, Holder::Int(5)]).unwrap(),
            words: BoxedArray::new(
                ElemKind::Str,
                vec![Holder::Str("x".to_string()), Holder::Null],
            )
            .unwrap(),
        }
    }
}

#[derive(Debug)]
pub struct Bag {
    pub id: InstanceId,
    pub data: BagData,
}

impl Bag {
    pub const TYPE: &'static str = "demo.Bag";

    pub fn new(context: &EngineContext, data: BagData) -> Self {
        Self {
            id: allocate(context, Self::TYPE),
            data,
        }
    }
}

impl Packable for Bag {
    fn instance_id(&self) -> InstanceId {
        self.id
    }

    fn bundle_self(&self, _is_super: bool, _session: &mut PackSession<'_>) -> Result<Bundle, PackError> {
        let d = &self.data;
        let mut bundle = Bundle::of(Self::TYPE, 1)?;
        bundle
            .put("flag", d.flag)?
            .put("letter", d.letter)?
            .put("small", d.small)?
            .put("short", d.short)?
            .put("count", d.count)?
            .put("big", d.big)?
            .put("ratio", d.ratio)?
            .put("precise", d.precise)?
            .put("title", d.title.as_str())?
            .put("color", Holder::Name(d.color.clone()))?
            .put("missing", d.missing)?
            .put("ints", d.ints.clone())?
            .put("bytes", d.bytes.clone())?
            .put("chars", d.chars.clone())?
            .put("doubles", d.doubles.clone())?
            .put("maybe", d.maybe.clone())?
            .put("words", d.words.clone())?;
        Ok(bundle)
    }

    fn finish_resolving(&mut self, _resolver: &Resolver<'_>) -> Result<bool, UnpackError> {
        Ok(true)
    }
}

fn construct_bag(
    context: &UnpackContext<'_>,
    bundle: &Bundle,
    reference: &EntityRef,
) -> Result<Box<dyn Packable>, UnpackError> {
    let color = match bundle.require("color")? {
        Holder::Name(name) => name.clone(),
        other => {
            return Err(UnpackError::entity(
                reference,
                format!("color holds {}", other.kind_name()),
            ))
        }
    };
    let data = BagData {
        flag: bundle.get_bool("flag")?,
        letter: bundle.value("letter")?,
        small: bundle.value("small")?,
        short: bundle.value("short")?,
        count: bundle.get_int("count")?,
        big: bundle.get_long("big")?,
        ratio: bundle.value("ratio")?,
        precise: bundle.get_double("precise")?,
        title: bundle.get_str("title")?.to_string(),
        color,
        missing: bundle.value_opt("missing")?,
        ints: bundle.value("ints")?,
        bytes: bundle.value("bytes")?,
        chars: bundle.value("chars")?,
        doubles: bundle.value("doubles")?,
        maybe: bundle.value("maybe")?,
        words: bundle.value("words")?,
    };
    Ok(Box::new(Bag {
        id: context.allocate(bundle.type_name()),
        data,
    }))
}

/// Registry with a factory for every fixture type.
pub fn registry() -> FactoryRegistry {
    let mut registry = FactoryRegistry::new();
    registry.register_fn(Node::TYPE, 1..=1, construct_node).unwrap();
    registry.register_fn(Pair::TYPE, 1..=1, construct_pair).unwrap();
    registry.register_fn(Table::TYPE, 1..=1, construct_table).unwrap();
    registry.register_fn(Shape::TYPE, 1..=2, construct_shape).unwrap();
    registry.register_fn(Circle::TYPE, 1..=1, construct_circle).unwrap();
    registry.register_fn(Bag::TYPE, 1..=1, construct_bag).unwrap();
    registry.register_fn(Bookmark::TYPE, 1..=1, construct_bookmark).unwrap();
    registry
}
