//! # catalog：类型名与成员名登记表
//!
//! ## 核心意图（Why）
//! - 文本文档无法直接指向 Rust 类型与字段，调用方需要先把“名字 → 类型/访问器”登记下来；
//! - 回放时按名字取回已擦除值类型的访问器，再交给 `from_accessor().to_accessor()`。
//!
//! ## 行为契约（What）
//! - 只有通过 [`ShapeCatalog::pair`] 登记过的类型对才能回放；
//! - [`ShapeCatalog::apply`] 先校验全部记录的名字，再按文档顺序回放，名字错误不会留下半套声明；
//! - 类型不匹配等编译错误在回放期间由映射引擎返回，原样透传。
//!
//! ## 实现方式（How）
//! - 每个类型对登记一个单态化的回放函数指针，与编解码注册表按类型登记工厂的方式一致。

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use spark_mapper::{Member, MappingRepository, SourceAccessor, TargetAccessor, resolve_member_name};

use crate::document::{DeclarationDocument, TypeMappingRecord};
use crate::error::{ConfigError, MemberRole};

type Replay = fn(
    &MappingRepository,
    &ShapeEntry,
    &ShapeEntry,
    &TypeMappingRecord,
) -> Result<(), ConfigError>;

struct ShapeEntry {
    name: String,
    type_id: TypeId,
    type_name: &'static str,
    sources: HashMap<String, Box<dyn Any + Send + Sync>>,
    targets: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl ShapeEntry {
    fn new<T: 'static>(name: String) -> Self {
        Self {
            name,
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            sources: HashMap::new(),
            targets: HashMap::new(),
        }
    }

    fn has(&self, member: &str, role: MemberRole) -> Result<(), ConfigError> {
        let members = match role {
            MemberRole::Source => &self.sources,
            MemberRole::Target => &self.targets,
        };
        if members.contains_key(member) {
            Ok(())
        } else {
            Err(self.unknown(member, role))
        }
    }

    fn source<S: 'static>(&self, member: &str) -> Result<SourceAccessor<S>, ConfigError> {
        self.sources
            .get(member)
            .and_then(|accessor| accessor.downcast_ref::<SourceAccessor<S>>())
            .cloned()
            .ok_or_else(|| self.unknown(member, MemberRole::Source))
    }

    fn target<T: 'static>(&self, member: &str) -> Result<TargetAccessor<T>, ConfigError> {
        self.targets
            .get(member)
            .and_then(|accessor| accessor.downcast_ref::<TargetAccessor<T>>())
            .cloned()
            .ok_or_else(|| self.unknown(member, MemberRole::Target))
    }

    fn unknown(&self, member: &str, role: MemberRole) -> ConfigError {
        ConfigError::UnknownMember {
            shape: self.name.clone(),
            member: member.to_owned(),
            role,
        }
    }
}

fn replay<S, T>(
    repository: &MappingRepository,
    source_shape: &ShapeEntry,
    target_shape: &ShapeEntry,
    record: &TypeMappingRecord,
) -> Result<(), ConfigError>
where
    S: 'static,
    T: 'static,
{
    let mut builder = repository.declare::<S, T>();
    for pair in &record.members {
        let source = source_shape.source::<S>(&pair.source)?;
        let target = target_shape.target::<T>(&pair.target)?;
        builder = builder.from_accessor(source).to_accessor(target)?;
    }
    Ok(())
}

/// `ShapeCatalog` 登记可在声明文档中引用的类型、成员与类型对。
///
/// # 教案式说明
/// - **意图 (Why)**：把“文本名字”与“编译期类型”之间的映射集中在一处，文档加载不需要反射；
/// - **契约 (What)**：
///   - 同名类型重复登记时，若 Rust 类型相同则累积成员，否则以新类型整体替换；
///   - 成员名取自访问器表达式（与流式声明的覆盖键一致）；
/// - **风险 (Trade-offs)**：访问器以 `Any` 存放，回放时按类型取回；登记错类型表现为“成员不存在”。
#[derive(Default)]
pub struct ShapeCatalog {
    shapes: HashMap<String, ShapeEntry>,
    pairs: HashMap<(TypeId, TypeId), Replay>,
}

impl ShapeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记（或继续登记）名为 `name` 的类型 `T`。
    pub fn shape<T>(&mut self, name: impl Into<String>) -> ShapeRegistration<'_, T>
    where
        T: 'static,
    {
        let name = name.into();
        let entry = self
            .shapes
            .entry(name.clone())
            .or_insert_with(|| ShapeEntry::new::<T>(name.clone()));
        if entry.type_id != TypeId::of::<T>() {
            tracing::warn!(
                shape = name.as_str(),
                previous = entry.type_name,
                current = type_name::<T>(),
                discarded_sources = entry.sources.len(),
                discarded_targets = entry.targets.len(),
                "shape name rebound to a different type; registered members discarded"
            );
            *entry = ShapeEntry::new::<T>(name);
        }
        ShapeRegistration {
            entry,
            _shape: PhantomData,
        }
    }

    /// 允许文档声明 `S → T` 的映射。
    pub fn pair<S, T>(&mut self) -> &mut Self
    where
        S: 'static,
        T: 'static,
    {
        self.pairs
            .insert((TypeId::of::<S>(), TypeId::of::<T>()), replay::<S, T>);
        self
    }

    pub fn contains_shape(&self, name: &str) -> bool {
        self.shapes.contains_key(name)
    }

    /// 把文档中的全部 `type_mapping` 记录回放到仓储，返回回放的成员映射条数。
    pub fn apply(
        &self,
        document: &DeclarationDocument,
        repository: &MappingRepository,
    ) -> Result<usize, ConfigError> {
        let mut planned = Vec::with_capacity(document.type_mappings.len());
        for record in &document.type_mappings {
            let source = self.lookup(&record.source)?;
            let target = self.lookup(&record.target)?;
            let replay = self
                .pairs
                .get(&(source.type_id, target.type_id))
                .ok_or_else(|| ConfigError::UnknownPair {
                    source_shape: record.source.clone(),
                    target_shape: record.target.clone(),
                })?;
            for pair in &record.members {
                source.has(&pair.source, MemberRole::Source)?;
                target.has(&pair.target, MemberRole::Target)?;
            }
            planned.push((*replay, source, target, record));
        }

        let mut members = 0;
        for (replay, source, target, record) in planned {
            tracing::debug!(
                source = record.source.as_str(),
                target = record.target.as_str(),
                members = record.members.len(),
                "replaying type mapping"
            );
            replay(repository, source, target, record)?;
            members += record.members.len();
        }
        tracing::info!(
            mappings = document.type_mappings.len(),
            members,
            "declaration document applied"
        );
        Ok(members)
    }

    fn lookup(&self, name: &str) -> Result<&ShapeEntry, ConfigError> {
        self.shapes
            .get(name)
            .ok_or_else(|| ConfigError::UnknownShape {
                name: name.to_owned(),
            })
    }
}

impl fmt::Debug for ShapeCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut shapes: Vec<&str> = self.shapes.keys().map(String::as_str).collect();
        shapes.sort_unstable();
        f.debug_struct("ShapeCatalog")
            .field("shapes", &shapes)
            .field("pairs", &self.pairs.len())
            .finish()
    }
}

/// 单个类型的成员登记入口。
pub struct ShapeRegistration<'c, T> {
    entry: &'c mut ShapeEntry,
    _shape: PhantomData<fn() -> T>,
}

impl<T> ShapeRegistration<'_, T>
where
    T: 'static,
{
    /// 同时登记为源成员与目标成员。
    pub fn member<V>(self, member: Member<T, V>) -> Result<Self, ConfigError>
    where
        V: Clone + 'static,
    {
        self.source_member(member.clone())?.target_member(member)
    }

    /// 只作为映射源登记。
    pub fn source_member<V>(self, member: Member<T, V>) -> Result<Self, ConfigError>
    where
        V: Clone + 'static,
    {
        let name = resolve_member_name(member.expression())?;
        self.entry
            .sources
            .insert(name.as_str().to_owned(), Box::new(member.into_source()));
        Ok(self)
    }

    /// 只作为映射目标登记。
    pub fn target_member<V>(self, member: Member<T, V>) -> Result<Self, ConfigError>
    where
        V: 'static,
    {
        let name = resolve_member_name(member.expression())?;
        self.entry
            .targets
            .insert(name.as_str().to_owned(), Box::new(member.into_target()));
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use spark_mapper::member;
    use tracing_test::traced_test;

    use super::*;

    #[derive(Clone, Default)]
    struct Person {
        name: String,
        age: u8,
    }

    #[derive(Default)]
    struct Badge {
        label: String,
        age: u32,
    }

    fn catalog() -> ShapeCatalog {
        let mut catalog = ShapeCatalog::new();
        catalog
            .shape::<Person>("Person")
            .member(member!(Person, name))
            .unwrap()
            .member(member!(Person, age))
            .unwrap();
        catalog
            .shape::<Badge>("Badge")
            .target_member(member!(Badge, label))
            .unwrap()
            .target_member(member!(Badge, age))
            .unwrap();
        catalog.pair::<Person, Badge>();
        catalog
    }

    fn document(text: &str) -> DeclarationDocument {
        DeclarationDocument::from_toml_str(text).unwrap()
    }

    #[test]
    fn replays_records_as_declarations() {
        let repository = MappingRepository::new();
        let applied = catalog()
            .apply(
                &document(
                    r#"
                    [[type_mapping]]
                    source = "Person"
                    target = "Badge"
                    members = [
                        { source = "name", target = "label" },
                        { source = "age", target = "age" },
                    ]
                    "#,
                ),
                &repository,
            )
            .unwrap();
        assert_eq!(applied, 2);

        let badge: Badge = repository
            .map_new(&Person {
                name: "Lin".into(),
                age: 30,
            })
            .unwrap();
        assert_eq!(badge.label, "Lin");
        assert_eq!(badge.age, 30);
    }

    #[test]
    fn names_are_validated_before_anything_is_declared() {
        let repository = MappingRepository::new();
        let err = catalog()
            .apply(
                &document(
                    r#"
                    [[type_mapping]]
                    source = "Person"
                    target = "Badge"
                    members = [{ source = "name", target = "label" }]

                    [[type_mapping]]
                    source = "Person"
                    target = "Badge"
                    members = [{ source = "nickname", target = "label" }]
                    "#,
                ),
                &repository,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::UnknownMember { ref member, role: MemberRole::Source, .. } if member == "nickname"
        ));
        assert!(!repository.contains::<Person, Badge>());
    }

    #[test]
    fn unknown_shapes_and_pairs_are_reported() {
        let repository = MappingRepository::new();
        let err = catalog()
            .apply(
                &document("[[type_mapping]]\nsource = \"Ghost\"\ntarget = \"Badge\"\n"),
                &repository,
            )
            .unwrap_err();
        assert_eq!(err.code(), crate::error::codes::UNKNOWN_SHAPE);

        let err = catalog()
            .apply(
                &document("[[type_mapping]]\nsource = \"Badge\"\ntarget = \"Person\"\n"),
                &repository,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::UnknownPair { ref source_shape, .. } if source_shape == "Badge"
        ));
    }

    #[test]
    #[traced_test]
    fn rebinding_a_name_to_another_type_warns_and_resets_members() {
        let mut catalog = catalog();
        catalog
            .shape::<Person>("Badge")
            .source_member(member!(Person, name))
            .unwrap();

        logs_assert(|lines: &[&str]| {
            match lines
                .iter()
                .filter(|line| line.contains("WARN") && line.contains("shape name rebound"))
                .count()
            {
                1 => Ok(()),
                n => Err(format!("expected one rebind warning, found {n}")),
            }
        });
        let entry = catalog.lookup("Badge").unwrap();
        assert_eq!(entry.type_id, TypeId::of::<Person>());
        assert!(entry.has("label", MemberRole::Target).is_err());
        assert!(entry.has("name", MemberRole::Source).is_ok());
    }

    #[test]
    fn badge_members_are_target_only() {
        let catalog = catalog();
        assert!(catalog.contains_shape("Badge"));
        let entry = catalog.lookup("Badge").unwrap();
        assert!(entry.has("label", MemberRole::Target).is_ok());
        assert!(entry.has("label", MemberRole::Source).is_err());
    }
}
