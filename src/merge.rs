//! The schema merge engine: folds several sub-schemas into one executable
//! schema whose root fields proxy back to their origin schemas through
//! delegation. Root types merge field-by-field under synthesized names, so
//! sources are free to call their roots whatever they like; every other
//! type name resolves its merge candidates to a single winner.

use graphql_parser::query::InlineFragment;
use serde_json::Value as Json;
use std::collections::HashMap;
use std::sync::Arc;

use crate::ast;
use crate::delegate::{self, DelegateOptions};
use crate::error::{GraphQLError, StitchError};
use crate::graph::{
    add_resolvers, ensure_builtin_scalars, recreate_type, ObjectType, ResolverMap, SchemaGraph,
    TypeExtensionDef, TypeNode, BUILTIN_SCALARS, INTROSPECTION_PREFIX,
};
use crate::visit::heal_schema;
use crate::OperationKind;

/// One input to the merge: an executable schema (delegation target), bare
/// SDL, or already-built type nodes. The latter two contribute shape only;
/// their fields resolve through caller-supplied resolvers or by default
/// property lookup.
pub enum SchemaSource {
    Schema(Arc<SchemaGraph>),
    Sdl(String),
    Types(Vec<TypeNode>),
}

/// A selection fragment guaranteed on a field of the merged schema: whenever
/// the field is delegated, the fragment's selections are requested in its
/// place, so the field's resolver finds the data it depends on.
pub struct FieldFragment {
    pub type_name: String,
    pub field_name: String,
    /// Fragment text, either `fragment X on T { ... }` or `... on T { ... }`.
    pub fragment: String,
}

/// A directive-driven schema rewrite hook, applied to the merged schema for
/// every use of the directive it is registered under.
pub trait SchemaDirective: Send + Sync {
    fn visit_type(&self, _node: &mut TypeNode, _arguments: &[(String, Json)]) {}
    fn visit_field(
        &self,
        _type_name: &str,
        _field: &mut crate::graph::FieldDef,
        _arguments: &[(String, Json)],
    ) {
    }
}

type OnTypeConflict = Box<dyn Fn(&TypeNode, &TypeNode) -> TypeNode + Send + Sync>;

pub struct MergeOptions {
    pub schemas: Vec<SchemaSource>,
    /// Resolvers installed over the merged schema, replacing generated ones
    /// field by field.
    pub resolvers: ResolverMap,
    /// Resolution for non-root types contributed by several sources. The
    /// default keeps the candidate from the last source.
    pub on_type_conflict: Option<OnTypeConflict>,
    /// Copy interface field resolvers onto implementing objects whose own
    /// field has none.
    pub inherit_resolvers_from_interfaces: bool,
    pub field_fragments: Vec<FieldFragment>,
    pub schema_directives: HashMap<String, Arc<dyn SchemaDirective>>,
}

impl MergeOptions {
    pub fn new(schemas: Vec<SchemaSource>) -> Self {
        MergeOptions {
            schemas,
            resolvers: ResolverMap::new(),
            on_type_conflict: None,
            inherit_resolvers_from_interfaces: false,
            field_fragments: Vec::new(),
            schema_directives: HashMap::new(),
        }
    }
}

/// The merge context handed to resolvers of a merged schema through their
/// execution info: the delegation entry point, carrying the field-fragment
/// substitutions the merge was configured with.
pub struct MergeInfo {
    pub fragment_replacements: HashMap<(String, String), InlineFragment<'static, String>>,
}

impl MergeInfo {
    /// Delegates on behalf of a merged-schema resolver, with the configured
    /// field fragments in force.
    pub async fn delegate_to_schema(
        &self,
        mut options: DelegateOptions,
    ) -> Result<Json, GraphQLError> {
        if options.fragment_replacements.is_empty() {
            options.fragment_replacements = self.fragment_replacements.clone();
        }
        delegate::delegate_to_schema(options).await
    }
}

impl std::fmt::Debug for MergeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeInfo")
            .field(
                "fragment_replacements",
                &self.fragment_replacements.keys().collect::<Vec<_>>(),
            )
            .finish()
    }
}

struct MergeCandidate {
    /// Origin schema when the source is a delegation target.
    schema: Option<Arc<SchemaGraph>>,
    node: TypeNode,
    /// Set when the node is the source's root type of this kind.
    operation: Option<OperationKind>,
}

const ROOT_NAMES: [(OperationKind, &str); 3] = [
    (OperationKind::Query, "Query"),
    (OperationKind::Mutation, "Mutation"),
    (OperationKind::Subscription, "Subscription"),
];

pub fn merge_schemas(options: MergeOptions) -> Result<Arc<SchemaGraph>, StitchError> {
    let MergeOptions {
        schemas,
        resolvers,
        on_type_conflict,
        inherit_resolvers_from_interfaces,
        field_fragments,
        schema_directives,
    } = options;

    let mut candidates: indexmap::IndexMap<String, Vec<MergeCandidate>> =
        indexmap::IndexMap::new();
    let mut extensions: Vec<TypeExtensionDef> = Vec::new();

    for source in schemas {
        let (graph, delegation_target, source_extensions) = match source {
            SchemaSource::Schema(schema) => {
                let target = Some(schema.clone());
                ((*schema).clone(), target, Vec::new())
            }
            SchemaSource::Sdl(sdl) => {
                let (graph, exts) = SchemaGraph::from_sdl(&sdl)?;
                (graph, None, exts)
            }
            SchemaSource::Types(types) => {
                let mut graph = SchemaGraph::new();
                for node in types {
                    graph.types.insert(node.name().to_string(), node);
                }
                for (kind, name) in ROOT_NAMES {
                    if graph.types.contains_key(name) {
                        match kind {
                            OperationKind::Query => graph.query_type = Some(name.to_string()),
                            OperationKind::Mutation => graph.mutation_type = Some(name.to_string()),
                            OperationKind::Subscription => {
                                graph.subscription_type = Some(name.to_string())
                            }
                        }
                    }
                }
                (graph, None, Vec::new())
            }
        };
        extensions.extend(source_extensions);
        collect_candidates(&graph, delegation_target, &mut candidates)?;
    }

    let mut merged = SchemaGraph::new();
    for (name, group) in candidates {
        let is_root_group = group.iter().any(|c| c.operation.is_some());
        if is_root_group {
            let operation = group
                .iter()
                .find_map(|c| c.operation)
                .ok_or_else(|| StitchError::MissingRootType(name.clone()))?;
            let node = merge_root_group(&name, operation, &group);
            match operation {
                OperationKind::Query => merged.query_type = Some(name.clone()),
                OperationKind::Mutation => merged.mutation_type = Some(name.clone()),
                OperationKind::Subscription => merged.subscription_type = Some(name.clone()),
            }
            merged.types.insert(name, node);
        } else if let Some(node) = resolve_candidates(&group, on_type_conflict.as_deref()) {
            merged.types.insert(name, node);
        }
    }

    if merged.query_type.is_none() {
        return Err(StitchError::MissingRootType("Query".into()));
    }

    apply_extensions(&mut merged, &extensions)?;
    ensure_builtin_scalars(&mut merged);
    heal_schema(&mut merged)?;

    add_resolvers(&mut merged, &resolvers);
    if inherit_resolvers_from_interfaces {
        inherit_interface_resolvers(&mut merged);
    }
    apply_schema_directives(&mut merged, &schema_directives);

    let mut fragment_replacements = HashMap::new();
    for field_fragment in field_fragments {
        let inline = ast::parse_inline_fragment(&field_fragment.fragment)?;
        fragment_replacements.insert(
            (field_fragment.type_name, field_fragment.field_name),
            inline,
        );
    }
    let merge_info = Arc::new(MergeInfo {
        fragment_replacements,
    });
    attach_merge_info(&mut merged, &merge_info);
    merged.merge_info = Some(merge_info);

    Ok(Arc::new(merged))
}

/// Recreates a source's types into the shared namespace: root types land
/// under their synthesized names, with every reference re-pointed.
fn collect_candidates(
    graph: &SchemaGraph,
    delegation_target: Option<Arc<SchemaGraph>>,
    candidates: &mut indexmap::IndexMap<String, Vec<MergeCandidate>>,
) -> Result<(), StitchError> {
    let mut root_renames: HashMap<String, String> = HashMap::new();
    for (kind, synthesized) in ROOT_NAMES {
        if let Some(root) = graph.root_type(kind) {
            if root != synthesized {
                root_renames.insert(root.to_string(), synthesized.to_string());
            }
        }
    }
    let resolve = |name: &str| -> Option<String> {
        Some(
            root_renames
                .get(name)
                .cloned()
                .unwrap_or_else(|| name.to_string()),
        )
    };

    for (name, node) in &graph.types {
        if name.starts_with(INTROSPECTION_PREFIX) || BUILTIN_SCALARS.contains(&name.as_str()) {
            continue;
        }
        let operation = ROOT_NAMES
            .into_iter()
            .find(|(kind, _)| graph.root_type(*kind) == Some(name.as_str()))
            .map(|(kind, _)| kind);
        let mut recreated = recreate_type(node, &resolve)?;
        // Non-root fields of the merged schema resolve by property lookup on
        // delegated sub-results; origin resolvers only run in their origin.
        if let Some(fields) = recreated.fields_mut() {
            for field in fields.values_mut() {
                if delegation_target.is_some() {
                    field.resolver = None;
                    field.subscribe = None;
                }
            }
        }
        let key = match &operation {
            Some(_) => {
                let synthesized = root_renames
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| name.clone());
                recreated.set_name(synthesized.clone());
                synthesized
            }
            None => name.clone(),
        };
        candidates.entry(key).or_default().push(MergeCandidate {
            schema: delegation_target.clone(),
            node: recreated,
            operation,
        });
    }
    Ok(())
}

/// Merges root candidates field by field, later sources overriding earlier
/// ones. Fields from delegation targets get a proxying resolver bound to
/// their origin schema.
fn merge_root_group(name: &str, operation: OperationKind, group: &[MergeCandidate]) -> TypeNode {
    let mut merged = ObjectType {
        name: name.to_string(),
        description: None,
        interfaces: Vec::new(),
        fields: indexmap::IndexMap::new(),
        directives: Vec::new(),
    };
    for candidate in group {
        let Some(fields) = candidate.node.fields() else {
            continue;
        };
        if let TypeNode::Object(object) = &candidate.node {
            if merged.description.is_none() {
                merged.description = object.description.clone();
            }
            for interface in &object.interfaces {
                if !merged.interfaces.contains(interface) {
                    merged.interfaces.push(interface.clone());
                }
            }
        }
        for (field_name, field) in fields {
            let mut merged_field = field.clone();
            if let Some(origin) = &candidate.schema {
                merged_field.resolver = Some(delegate::default_delegating_resolver(
                    origin.clone(),
                    operation,
                    field.name.clone(),
                    Vec::new(),
                ));
            }
            merged.fields.insert(field_name.clone(), merged_field);
        }
    }
    TypeNode::Object(merged)
}

fn resolve_candidates(
    group: &[MergeCandidate],
    on_conflict: Option<&(dyn Fn(&TypeNode, &TypeNode) -> TypeNode + Send + Sync)>,
) -> Option<TypeNode> {
    let mut iter = group.iter();
    let first = iter.next()?.node.clone();
    Some(iter.fold(first, |winner, next| match on_conflict {
        Some(resolve) => resolve(&winner, &next.node),
        None => next.node.clone(),
    }))
}

fn apply_extensions(
    schema: &mut SchemaGraph,
    extensions: &[TypeExtensionDef],
) -> Result<(), StitchError> {
    for extension in extensions {
        let Some(node) = schema.types.get_mut(&extension.type_name) else {
            return Err(StitchError::UnknownType(extension.type_name.clone()));
        };
        match node {
            TypeNode::Object(_) | TypeNode::Interface(_) => {
                let fields = node
                    .fields_mut()
                    .ok_or_else(|| StitchError::UnknownType(extension.type_name.clone()))?;
                for field in &extension.fields {
                    fields.insert(field.name.clone(), field.clone());
                }
            }
            TypeNode::Union(union_type) => {
                for member in &extension.union_members {
                    if !union_type.members.contains(member) {
                        union_type.members.push(member.clone());
                    }
                }
            }
            _ => {
                return Err(StitchError::InvalidSource(format!(
                    "type {} cannot be extended",
                    extension.type_name
                )))
            }
        }
    }
    Ok(())
}

/// Copies interface field resolvers onto implementing objects where the
/// object's own field has none.
fn inherit_interface_resolvers(schema: &mut SchemaGraph) {
    let interface_resolvers: HashMap<String, HashMap<String, crate::execute::Resolver>> = schema
        .types
        .values()
        .filter_map(|node| match node {
            TypeNode::Interface(interface) => Some((
                interface.name.clone(),
                interface
                    .fields
                    .iter()
                    .filter_map(|(name, field)| {
                        field.resolver.clone().map(|r| (name.clone(), r))
                    })
                    .collect(),
            )),
            _ => None,
        })
        .collect();

    for node in schema.types.values_mut() {
        let TypeNode::Object(object) = node else {
            continue;
        };
        for interface in object.interfaces.clone() {
            let Some(inherited) = interface_resolvers.get(&interface) else {
                continue;
            };
            for (field_name, resolver) in inherited {
                if let Some(field) = object.fields.get_mut(field_name) {
                    if field.resolver.is_none() {
                        field.resolver = Some(resolver.clone());
                    }
                }
            }
        }
    }
}

fn apply_schema_directives(
    schema: &mut SchemaGraph,
    directives: &HashMap<String, Arc<dyn SchemaDirective>>,
) {
    if directives.is_empty() {
        return;
    }
    let type_names: Vec<String> = schema.types.keys().cloned().collect();
    for type_name in type_names {
        let Some(mut node) = schema.types.get(&type_name).cloned() else {
            continue;
        };
        let type_directives = match &node {
            TypeNode::Object(object) => object.directives.clone(),
            TypeNode::Interface(interface) => interface.directives.clone(),
            _ => Vec::new(),
        };
        for use_site in &type_directives {
            if let Some(directive) = directives.get(&use_site.name) {
                directive.visit_type(&mut node, &use_site.arguments);
            }
        }
        if let Some(fields) = node.fields_mut() {
            for field in fields.values_mut() {
                for use_site in field.directives.clone() {
                    if let Some(directive) = directives.get(&use_site.name) {
                        directive.visit_field(&type_name, field, &use_site.arguments);
                    }
                }
            }
        }
        schema.types.insert(type_name, node);
    }
}

/// Wraps every installed resolver so the merge context rides along in its
/// execution info even when the field is executed outside this schema.
fn attach_merge_info(schema: &mut SchemaGraph, merge_info: &Arc<MergeInfo>) {
    for node in schema.types.values_mut() {
        let Some(fields) = node.fields_mut() else {
            continue;
        };
        for field in fields.values_mut() {
            for slot in [&mut field.resolver, &mut field.subscribe] {
                if let Some(inner) = slot.clone() {
                    let context = merge_info.clone();
                    *slot = Some(Arc::new(move |mut params| {
                        if params.info.merge_info.is_none() {
                            params.info.merge_info = Some(context.clone());
                        }
                        inner(params)
                    }));
                }
            }
        }
    }
}
