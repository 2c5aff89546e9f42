//! The owned type graph: named types, fields, arguments and the schema
//! container. All rewrite passes (visit, heal, merge, transforms) operate on
//! this representation; the `graphql-parser` AST only appears at the SDL
//! ingestion boundary and when printing delegated documents.

use graphql_parser::parse_schema;
use graphql_parser::schema as s;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::ast;
use crate::error::StitchError;
use crate::execute::Resolver;
use crate::merge::MergeInfo;
use crate::remote::RemoteExecutor;
use crate::OperationKind;

/// Reserved prefix of the introspection namespace. Types and fields under it
/// are never visited, merged or healed.
pub const INTROSPECTION_PREFIX: &str = "__";

/// A reference to a type: a name, possibly wrapped in list/non-null
/// modifiers. References resolve through the owning schema's type map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Named(String),
    List(Box<TypeRef>),
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef::Named(name.into())
    }

    /// The innermost type name, unwrapping all modifiers.
    pub fn name(&self) -> &str {
        match self {
            TypeRef::Named(name) => name,
            TypeRef::List(inner) | TypeRef::NonNull(inner) => inner.name(),
        }
    }

    pub fn is_non_null(&self) -> bool {
        matches!(self, TypeRef::NonNull(_))
    }

    /// Strips one leading non-null modifier, if present.
    pub fn nullable(&self) -> &TypeRef {
        match self {
            TypeRef::NonNull(inner) => inner,
            other => other,
        }
    }

    /// Rebuilds the reference with the innermost name mapped through `f`.
    pub fn with_name(&self, f: &dyn Fn(&str) -> String) -> TypeRef {
        match self {
            TypeRef::Named(name) => TypeRef::Named(f(name)),
            TypeRef::List(inner) => TypeRef::List(Box::new(inner.with_name(f))),
            TypeRef::NonNull(inner) => TypeRef::NonNull(Box::new(inner.with_name(f))),
        }
    }

    pub fn from_ast(ty: &s::Type<'_, String>) -> TypeRef {
        match ty {
            s::Type::NamedType(name) => TypeRef::Named(name.clone()),
            s::Type::ListType(inner) => TypeRef::List(Box::new(TypeRef::from_ast(inner))),
            s::Type::NonNullType(inner) => TypeRef::NonNull(Box::new(TypeRef::from_ast(inner))),
        }
    }

    pub fn to_ast(&self) -> s::Type<'static, String> {
        match self {
            TypeRef::Named(name) => s::Type::NamedType(name.clone()),
            TypeRef::List(inner) => s::Type::ListType(Box::new(inner.to_ast())),
            TypeRef::NonNull(inner) => s::Type::NonNullType(Box::new(inner.to_ast())),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Named(name) => write!(f, "{}", name),
            TypeRef::List(inner) => write!(f, "[{}]", inner),
            TypeRef::NonNull(inner) => write!(f, "{}!", inner),
        }
    }
}

/// A directive applied to a schema element, with its arguments as JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectiveUse {
    pub name: String,
    pub arguments: Vec<(String, Value)>,
}

impl DirectiveUse {
    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// An argument or input-object field.
#[derive(Debug, Clone, PartialEq)]
pub struct InputValueDef {
    pub name: String,
    pub value_type: TypeRef,
    pub default_value: Option<Value>,
    pub description: Option<String>,
}

/// A field of an object or interface type. The resolver and subscribe
/// handles are opaque to the graph: they are installed, replaced wholesale
/// or left untouched, never inspected.
#[derive(Clone)]
pub struct FieldDef {
    pub name: String,
    pub field_type: TypeRef,
    pub arguments: Vec<InputValueDef>,
    pub resolver: Option<Resolver>,
    pub subscribe: Option<Resolver>,
    pub description: Option<String>,
    pub deprecation_reason: Option<String>,
    pub directives: Vec<DirectiveUse>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, field_type: TypeRef) -> Self {
        FieldDef {
            name: name.into(),
            field_type,
            arguments: Vec::new(),
            resolver: None,
            subscribe: None,
            description: None,
            deprecation_reason: None,
            directives: Vec::new(),
        }
    }

    pub fn argument(&self, name: &str) -> Option<&InputValueDef> {
        self.arguments.iter().find(|a| a.name == name)
    }
}

impl fmt::Debug for FieldDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDef")
            .field("name", &self.name)
            .field("field_type", &self.field_type)
            .field("arguments", &self.arguments)
            .field("resolver", &self.resolver.is_some())
            .field("subscribe", &self.subscribe.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumValueDef {
    pub name: String,
    /// Internal value produced by resolvers; the external name is used on
    /// the wire. `None` means the name is its own value.
    pub value: Option<Value>,
    pub description: Option<String>,
    pub deprecation_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ObjectType {
    pub name: String,
    pub description: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: IndexMap<String, FieldDef>,
    pub directives: Vec<DirectiveUse>,
}

#[derive(Debug, Clone)]
pub struct InterfaceType {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, FieldDef>,
    pub directives: Vec<DirectiveUse>,
}

#[derive(Debug, Clone)]
pub struct UnionType {
    pub name: String,
    pub description: Option<String>,
    pub members: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct EnumType {
    pub name: String,
    pub description: Option<String>,
    pub values: IndexMap<String, EnumValueDef>,
}

impl EnumType {
    /// Maps a resolver-internal value back to its external name.
    pub fn external_name(&self, internal: &Value) -> Option<&str> {
        for def in self.values.values() {
            match &def.value {
                Some(v) if v == internal => return Some(&def.name),
                None if internal.as_str() == Some(def.name.as_str()) => return Some(&def.name),
                _ => {}
            }
        }
        None
    }
}

#[derive(Debug, Clone)]
pub struct InputObjectType {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, InputValueDef>,
}

#[derive(Debug, Clone)]
pub struct ScalarType {
    pub name: String,
    pub description: Option<String>,
}

/// A named type. Wrapping modifiers live in [`TypeRef`], so every variant
/// here is a concrete named definition.
#[derive(Debug, Clone)]
pub enum TypeNode {
    Scalar(ScalarType),
    Object(ObjectType),
    Interface(InterfaceType),
    Union(UnionType),
    Enum(EnumType),
    InputObject(InputObjectType),
}

impl TypeNode {
    pub fn name(&self) -> &str {
        match self {
            TypeNode::Scalar(t) => &t.name,
            TypeNode::Object(t) => &t.name,
            TypeNode::Interface(t) => &t.name,
            TypeNode::Union(t) => &t.name,
            TypeNode::Enum(t) => &t.name,
            TypeNode::InputObject(t) => &t.name,
        }
    }

    pub fn set_name(&mut self, name: String) {
        match self {
            TypeNode::Scalar(t) => t.name = name,
            TypeNode::Object(t) => t.name = name,
            TypeNode::Interface(t) => t.name = name,
            TypeNode::Union(t) => t.name = name,
            TypeNode::Enum(t) => t.name = name,
            TypeNode::InputObject(t) => t.name = name,
        }
    }

    pub fn is_abstract(&self) -> bool {
        matches!(self, TypeNode::Interface(_) | TypeNode::Union(_))
    }

    pub fn is_composite(&self) -> bool {
        matches!(
            self,
            TypeNode::Object(_) | TypeNode::Interface(_) | TypeNode::Union(_)
        )
    }

    /// Output fields, for object and interface types.
    pub fn fields(&self) -> Option<&IndexMap<String, FieldDef>> {
        match self {
            TypeNode::Object(t) => Some(&t.fields),
            TypeNode::Interface(t) => Some(&t.fields),
            _ => None,
        }
    }

    pub fn fields_mut(&mut self) -> Option<&mut IndexMap<String, FieldDef>> {
        match self {
            TypeNode::Object(t) => Some(&mut t.fields),
            TypeNode::Interface(t) => Some(&mut t.fields),
            _ => None,
        }
    }
}

/// Fields contributed by an `extend type` definition, applied by the merge
/// engine after candidate resolution.
#[derive(Debug, Clone)]
pub struct TypeExtensionDef {
    pub type_name: String,
    pub fields: Vec<FieldDef>,
    pub union_members: Vec<String>,
}

/// One schema: a name-to-type map, the root operation type names, and the
/// declared directive names. After healing, every reference reachable from
/// the roots resolves to a live entry whose map key equals its name.
#[derive(Clone, Default)]
pub struct SchemaGraph {
    pub types: IndexMap<String, TypeNode>,
    pub query_type: Option<String>,
    pub mutation_type: Option<String>,
    pub subscription_type: Option<String>,
    pub directives: Vec<String>,
    /// Present on remote sub-schemas: delegated documents are shipped here
    /// instead of being executed in-process.
    pub executor: Option<Arc<dyn RemoteExecutor>>,
    /// Present on merged schemas: the delegation entry point handed to
    /// resolvers through their execution info.
    pub merge_info: Option<Arc<MergeInfo>>,
}

impl fmt::Debug for SchemaGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaGraph")
            .field("types", &self.types.keys().collect::<Vec<_>>())
            .field("query_type", &self.query_type)
            .field("mutation_type", &self.mutation_type)
            .field("subscription_type", &self.subscription_type)
            .field("remote", &self.executor.is_some())
            .field("merged", &self.merge_info.is_some())
            .finish()
    }
}

impl SchemaGraph {
    pub fn new() -> Self {
        SchemaGraph::default()
    }

    pub fn get_type(&self, name: &str) -> Option<&TypeNode> {
        self.types.get(name)
    }

    pub fn root_type(&self, operation: OperationKind) -> Option<&str> {
        match operation {
            OperationKind::Query => self.query_type.as_deref(),
            OperationKind::Mutation => self.mutation_type.as_deref(),
            OperationKind::Subscription => self.subscription_type.as_deref(),
        }
    }

    pub fn is_root_type(&self, name: &str) -> bool {
        [&self.query_type, &self.mutation_type, &self.subscription_type]
            .into_iter()
            .any(|root| root.as_deref() == Some(name))
    }

    pub fn field_def(&self, type_name: &str, field_name: &str) -> Option<&FieldDef> {
        self.get_type(type_name)?.fields()?.get(field_name)
    }

    /// Concrete object types that can appear where the named abstract type
    /// is expected: union members, or objects implementing the interface.
    pub fn possible_types(&self, abstract_name: &str) -> Vec<String> {
        match self.get_type(abstract_name) {
            Some(TypeNode::Union(u)) => u.members.clone(),
            Some(TypeNode::Interface(i)) => self
                .types
                .values()
                .filter_map(|t| match t {
                    TypeNode::Object(o) if o.interfaces.iter().any(|n| n == &i.name) => {
                        Some(o.name.clone())
                    }
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// True when `concrete` satisfies the type condition `condition`:
    /// either the same type, or a possible type of an abstract condition.
    pub fn type_applies(&self, condition: &str, concrete: &str) -> bool {
        condition == concrete
            || self
                .possible_types(condition)
                .iter()
                .any(|n| n == concrete)
    }

    /// Parses SDL into a graph plus any `extend` definitions, which the
    /// caller applies separately.
    pub fn from_sdl(sdl: &str) -> Result<(SchemaGraph, Vec<TypeExtensionDef>), StitchError> {
        let document = parse_schema::<String>(sdl)
            .map_err(|e| StitchError::parse("schema document", e))?;

        let mut graph = SchemaGraph::new();
        let mut extensions = Vec::new();
        let mut declared_roots = false;

        for definition in &document.definitions {
            match definition {
                s::Definition::SchemaDefinition(schema_def) => {
                    declared_roots = true;
                    graph.query_type = schema_def.query.clone();
                    graph.mutation_type = schema_def.mutation.clone();
                    graph.subscription_type = schema_def.subscription.clone();
                }
                s::Definition::TypeDefinition(type_def) => {
                    let node = ingest_type_definition(type_def);
                    graph.types.insert(node.name().to_string(), node);
                }
                s::Definition::TypeExtension(extension) => {
                    if let Some(ext) = ingest_type_extension(extension) {
                        extensions.push(ext);
                    }
                }
                s::Definition::DirectiveDefinition(directive) => {
                    graph.directives.push(directive.name.clone());
                }
            }
        }

        ensure_builtin_scalars(&mut graph);

        if !declared_roots {
            for (name, slot) in [
                ("Query", &mut graph.query_type),
                ("Mutation", &mut graph.mutation_type),
                ("Subscription", &mut graph.subscription_type),
            ] {
                if graph.types.contains_key(name) {
                    *slot = Some(name.to_string());
                }
            }
        }

        for root in [
            &graph.query_type,
            &graph.mutation_type,
            &graph.subscription_type,
        ]
        .into_iter()
        .flatten()
        {
            if !graph.types.contains_key(root) {
                return Err(StitchError::MissingRootType(root.clone()));
            }
        }

        Ok((graph, extensions))
    }
}

/// The built-in scalar names every schema understands.
pub const BUILTIN_SCALARS: [&str; 5] = ["Int", "Float", "String", "Boolean", "ID"];

/// Adds the built-in scalars to the type map when absent, so references to
/// them always resolve and survive healing.
pub fn ensure_builtin_scalars(graph: &mut SchemaGraph) {
    for name in BUILTIN_SCALARS {
        if !graph.types.contains_key(name) {
            graph.types.insert(
                name.to_string(),
                TypeNode::Scalar(ScalarType {
                    name: name.to_string(),
                    description: None,
                }),
            );
        }
    }
}

fn ingest_directives(directives: &[s::Directive<'_, String>]) -> Vec<DirectiveUse> {
    directives
        .iter()
        .map(|d| DirectiveUse {
            name: d.name.clone(),
            arguments: d
                .arguments
                .iter()
                .map(|(name, value)| (name.clone(), ast::literal_to_json(value)))
                .collect(),
        })
        .collect()
}

fn deprecation_reason(directives: &[DirectiveUse]) -> Option<String> {
    let deprecated = directives.iter().find(|d| d.name == "deprecated")?;
    Some(
        deprecated
            .argument("reason")
            .and_then(Value::as_str)
            .unwrap_or("No longer supported")
            .to_string(),
    )
}

fn ingest_input_value(input: &s::InputValue<'_, String>) -> InputValueDef {
    InputValueDef {
        name: input.name.clone(),
        value_type: TypeRef::from_ast(&input.value_type),
        default_value: input.default_value.as_ref().map(ast::literal_to_json),
        description: input.description.clone(),
    }
}

fn ingest_field(field: &s::Field<'_, String>) -> FieldDef {
    let directives = ingest_directives(&field.directives);
    FieldDef {
        name: field.name.clone(),
        field_type: TypeRef::from_ast(&field.field_type),
        arguments: field.arguments.iter().map(ingest_input_value).collect(),
        resolver: None,
        subscribe: None,
        description: field.description.clone(),
        deprecation_reason: deprecation_reason(&directives),
        directives,
    }
}

fn ingest_fields(fields: &[s::Field<'_, String>]) -> IndexMap<String, FieldDef> {
    fields
        .iter()
        .map(|f| (f.name.clone(), ingest_field(f)))
        .collect()
}

fn ingest_type_definition(type_def: &s::TypeDefinition<'_, String>) -> TypeNode {
    match type_def {
        s::TypeDefinition::Scalar(scalar) => TypeNode::Scalar(ScalarType {
            name: scalar.name.clone(),
            description: scalar.description.clone(),
        }),
        s::TypeDefinition::Object(object) => TypeNode::Object(ObjectType {
            name: object.name.clone(),
            description: object.description.clone(),
            interfaces: object.implements_interfaces.clone(),
            fields: ingest_fields(&object.fields),
            directives: ingest_directives(&object.directives),
        }),
        s::TypeDefinition::Interface(interface) => TypeNode::Interface(InterfaceType {
            name: interface.name.clone(),
            description: interface.description.clone(),
            fields: ingest_fields(&interface.fields),
            directives: ingest_directives(&interface.directives),
        }),
        s::TypeDefinition::Union(union_type) => TypeNode::Union(UnionType {
            name: union_type.name.clone(),
            description: union_type.description.clone(),
            members: union_type.types.clone(),
        }),
        s::TypeDefinition::Enum(enum_type) => TypeNode::Enum(EnumType {
            name: enum_type.name.clone(),
            description: enum_type.description.clone(),
            values: enum_type
                .values
                .iter()
                .map(|v| {
                    let directives = ingest_directives(&v.directives);
                    (
                        v.name.clone(),
                        EnumValueDef {
                            name: v.name.clone(),
                            value: None,
                            description: v.description.clone(),
                            deprecation_reason: deprecation_reason(&directives),
                        },
                    )
                })
                .collect(),
        }),
        s::TypeDefinition::InputObject(input) => TypeNode::InputObject(InputObjectType {
            name: input.name.clone(),
            description: input.description.clone(),
            fields: input
                .fields
                .iter()
                .map(|f| (f.name.clone(), ingest_input_value(f)))
                .collect(),
        }),
    }
}

fn ingest_type_extension(extension: &s::TypeExtension<'_, String>) -> Option<TypeExtensionDef> {
    match extension {
        s::TypeExtension::Object(object) => Some(TypeExtensionDef {
            type_name: object.name.clone(),
            fields: object.fields.iter().map(ingest_field).collect(),
            union_members: Vec::new(),
        }),
        s::TypeExtension::Interface(interface) => Some(TypeExtensionDef {
            type_name: interface.name.clone(),
            fields: interface.fields.iter().map(ingest_field).collect(),
            union_members: Vec::new(),
        }),
        s::TypeExtension::Union(union_type) => Some(TypeExtensionDef {
            type_name: union_type.name.clone(),
            fields: Vec::new(),
            union_members: union_type.types.clone(),
        }),
        other => {
            tracing::warn!("ignoring unsupported type extension: {:?}", other);
            None
        }
    }
}

/// Rebuilds a type node with every referenced type name mapped through
/// `resolve`. This is how a type definition from one schema is recreated
/// inside another namespace: the node is cloned, and all of its outgoing
/// references are re-pointed at the instances the new owner knows about.
pub fn recreate_type(
    node: &TypeNode,
    resolve: &dyn Fn(&str) -> Option<String>,
) -> Result<TypeNode, StitchError> {
    let resolve_name = |name: &str| -> Result<String, StitchError> {
        resolve(name).ok_or_else(|| StitchError::UnknownType(name.to_string()))
    };
    let resolve_ref = |type_ref: &TypeRef| -> Result<TypeRef, StitchError> {
        // Validate first so the closure-based rebuild cannot hide a failure.
        resolve_name(type_ref.name())?;
        Ok(type_ref.with_name(&|name| resolve(name).unwrap_or_else(|| name.to_string())))
    };
    let recreate_inputs = |inputs: &[InputValueDef]| -> Result<Vec<InputValueDef>, StitchError> {
        inputs
            .iter()
            .map(|input| {
                Ok(InputValueDef {
                    value_type: resolve_ref(&input.value_type)?,
                    ..input.clone()
                })
            })
            .collect()
    };
    let recreate_fields =
        |fields: &IndexMap<String, FieldDef>| -> Result<IndexMap<String, FieldDef>, StitchError> {
            fields
                .iter()
                .map(|(key, field)| {
                    Ok((
                        key.clone(),
                        FieldDef {
                            field_type: resolve_ref(&field.field_type)?,
                            arguments: recreate_inputs(&field.arguments)?,
                            ..field.clone()
                        },
                    ))
                })
                .collect()
        };

    Ok(match node {
        TypeNode::Scalar(_) => node.clone(),
        TypeNode::Enum(_) => node.clone(),
        TypeNode::Object(object) => TypeNode::Object(ObjectType {
            interfaces: object
                .interfaces
                .iter()
                .map(|i| resolve_name(i))
                .collect::<Result<_, _>>()?,
            fields: recreate_fields(&object.fields)?,
            ..object.clone()
        }),
        TypeNode::Interface(interface) => TypeNode::Interface(InterfaceType {
            fields: recreate_fields(&interface.fields)?,
            ..interface.clone()
        }),
        TypeNode::Union(union_type) => TypeNode::Union(UnionType {
            members: union_type
                .members
                .iter()
                .map(|m| resolve_name(m))
                .collect::<Result<_, _>>()?,
            ..union_type.clone()
        }),
        TypeNode::InputObject(input) => TypeNode::InputObject(InputObjectType {
            fields: input
                .fields
                .iter()
                .map(|(key, field)| {
                    Ok((
                        key.clone(),
                        InputValueDef {
                            value_type: resolve_ref(&field.value_type)?,
                            ..field.clone()
                        },
                    ))
                })
                .collect::<Result<_, StitchError>>()?,
            ..input.clone()
        }),
    })
}

/// Per-type, per-field resolver handles to install on a schema.
pub type ResolverMap = HashMap<String, HashMap<String, Resolver>>;

/// Installs resolvers over a schema, field by field. Existing handles are
/// replaced wholesale; fields absent from the map keep theirs.
pub fn add_resolvers(schema: &mut SchemaGraph, resolvers: &ResolverMap) {
    for (type_name, field_resolvers) in resolvers {
        if let Some(fields) = schema
            .types
            .get_mut(type_name)
            .and_then(TypeNode::fields_mut)
        {
            for (field_name, resolver) in field_resolvers {
                if let Some(field) = fields.get_mut(field_name) {
                    field.resolver = Some(resolver.clone());
                } else {
                    tracing::warn!(
                        "resolver for unknown field {}.{} ignored",
                        type_name,
                        field_name
                    );
                }
            }
        } else {
            tracing::warn!("resolver map names unknown type {}", type_name);
        }
    }
}
