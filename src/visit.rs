//! Kind-dispatching traversal over a schema's type graph, and the healing
//! pass that repairs references left stale by a partial rewrite.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use crate::error::StitchError;
use crate::graph::{
    EnumValueDef, FieldDef, InputValueDef, SchemaGraph, TypeNode, INTROSPECTION_PREFIX,
};

/// Traversal keys, from most to least specific. Each node offers several
/// specifiers in priority order; the first one with a registered callback
/// wins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Specifier {
    Schema,
    Type,
    ScalarType,
    EnumType,
    CompositeType,
    ObjectType,
    InputObjectType,
    AbstractType,
    UnionType,
    InterfaceType,
    RootObject,
    Query,
    Mutation,
    Subscription,
    Field,
    Argument,
    EnumValue,
}

impl Specifier {
    fn is_type_specifier(self) -> bool {
        !matches!(
            self,
            Specifier::Schema | Specifier::Field | Specifier::Argument | Specifier::EnumValue
        )
    }
}

/// What a callback decided about the node it was shown.
#[derive(Debug)]
pub enum VisitAction<N> {
    /// Keep the node and keep descending into its children.
    Keep,
    /// Substitute a new node, then descend into the replacement.
    Replace(N),
    /// Drop the node (and its entry in a collection-valued parent).
    Remove,
    /// Keep the node as-is and stop descending.
    Skip,
}

type SchemaCallback = Box<dyn FnMut(&SchemaGraph)>;
type TypeCallback = Box<dyn FnMut(&TypeNode, &SchemaGraph) -> VisitAction<TypeNode>>;
type FieldCallback = Box<dyn FnMut(&FieldDef, &TypeNode) -> VisitAction<FieldDef>>;
type ArgumentCallback =
    Box<dyn FnMut(&InputValueDef, &FieldDef, &TypeNode) -> VisitAction<InputValueDef>>;
type EnumValueCallback = Box<dyn FnMut(&EnumValueDef, &TypeNode) -> VisitAction<EnumValueDef>>;

enum Callback {
    Schema(SchemaCallback),
    Type(TypeCallback),
    Field(FieldCallback),
    Argument(ArgumentCallback),
    EnumValue(EnumValueCallback),
}

/// A specifier-to-callback registration map. Registration is checked: a
/// callback registered under a specifier of the wrong node category is a
/// configuration error, reported before any traversal happens.
#[derive(Default)]
pub struct SchemaVisitor {
    callbacks: Vec<(Specifier, Callback)>,
}

impl SchemaVisitor {
    pub fn new() -> Self {
        SchemaVisitor::default()
    }

    /// Observes the schema node itself, always first. The schema cannot be
    /// replaced, so the callback returns nothing.
    pub fn on_schema(mut self, callback: impl FnMut(&SchemaGraph) + 'static) -> Self {
        self.callbacks
            .push((Specifier::Schema, Callback::Schema(Box::new(callback))));
        self
    }

    pub fn on_type(
        mut self,
        specifier: Specifier,
        callback: impl FnMut(&TypeNode, &SchemaGraph) -> VisitAction<TypeNode> + 'static,
    ) -> Result<Self, StitchError> {
        if !specifier.is_type_specifier() {
            return Err(StitchError::InvalidVisitor(format!(
                "{:?} does not take a type callback",
                specifier
            )));
        }
        self.callbacks
            .push((specifier, Callback::Type(Box::new(callback))));
        Ok(self)
    }

    pub fn on_field(
        mut self,
        callback: impl FnMut(&FieldDef, &TypeNode) -> VisitAction<FieldDef> + 'static,
    ) -> Self {
        self.callbacks
            .push((Specifier::Field, Callback::Field(Box::new(callback))));
        self
    }

    pub fn on_argument(
        mut self,
        callback: impl FnMut(&InputValueDef, &FieldDef, &TypeNode) -> VisitAction<InputValueDef>
            + 'static,
    ) -> Self {
        self.callbacks
            .push((Specifier::Argument, Callback::Argument(Box::new(callback))));
        self
    }

    pub fn on_enum_value(
        mut self,
        callback: impl FnMut(&EnumValueDef, &TypeNode) -> VisitAction<EnumValueDef> + 'static,
    ) -> Self {
        self.callbacks
            .push((Specifier::EnumValue, Callback::EnumValue(Box::new(callback))));
        self
    }

    fn first_registered(&mut self, priority: &[Specifier]) -> Option<&mut Callback> {
        for wanted in priority {
            if let Some(index) = self
                .callbacks
                .iter()
                .position(|(specifier, _)| specifier == wanted)
            {
                return Some(&mut self.callbacks[index].1);
            }
        }
        None
    }
}

/// The specifiers a type node offers, most specific first.
fn type_specifiers(node: &TypeNode, schema: &SchemaGraph) -> Vec<Specifier> {
    match node {
        TypeNode::Scalar(_) => vec![Specifier::ScalarType, Specifier::Type],
        TypeNode::Enum(_) => vec![Specifier::EnumType, Specifier::Type],
        TypeNode::InputObject(_) => vec![Specifier::InputObjectType, Specifier::Type],
        TypeNode::Union(_) => vec![
            Specifier::UnionType,
            Specifier::AbstractType,
            Specifier::CompositeType,
            Specifier::Type,
        ],
        TypeNode::Interface(_) => vec![
            Specifier::InterfaceType,
            Specifier::AbstractType,
            Specifier::CompositeType,
            Specifier::Type,
        ],
        TypeNode::Object(object) => {
            let mut specifiers = Vec::new();
            if schema.query_type.as_deref() == Some(object.name.as_str()) {
                specifiers.push(Specifier::Query);
            } else if schema.mutation_type.as_deref() == Some(object.name.as_str()) {
                specifiers.push(Specifier::Mutation);
            } else if schema.subscription_type.as_deref() == Some(object.name.as_str()) {
                specifiers.push(Specifier::Subscription);
            }
            if schema.is_root_type(&object.name) {
                specifiers.push(Specifier::RootObject);
            }
            specifiers.extend([
                Specifier::ObjectType,
                Specifier::CompositeType,
                Specifier::Type,
            ]);
            specifiers
        }
    }
}

/// Traverses every non-introspection named type (and, for composite types,
/// every field and argument; for enums, every value) exactly once, applying
/// the visitor's decisions, then heals the result. The input is untouched:
/// rewrites always produce a new graph.
pub fn visit_schema(
    schema: &SchemaGraph,
    visitor: &mut SchemaVisitor,
) -> Result<SchemaGraph, StitchError> {
    let mut out = schema.clone();

    if let Some(Callback::Schema(callback)) = visitor.first_registered(&[Specifier::Schema]) {
        callback(&out);
    }

    let type_names: Vec<String> = out
        .types
        .keys()
        .filter(|name| !name.starts_with(INTROSPECTION_PREFIX))
        .cloned()
        .collect();

    for type_name in type_names {
        let node = match out.types.get(&type_name) {
            Some(node) => node.clone(),
            None => continue,
        };
        let priority = type_specifiers(&node, &out);
        let action = match visitor.first_registered(&priority) {
            Some(Callback::Type(callback)) => callback(&node, &out),
            Some(_) => {
                return Err(StitchError::InvalidVisitor(format!(
                    "callback registered for type {} is not a type callback",
                    type_name
                )))
            }
            None => VisitAction::Keep,
        };

        match action {
            VisitAction::Keep => {
                visit_children(&mut out, &type_name, visitor)?;
            }
            VisitAction::Replace(replacement) => {
                // The replacement stays under the original key; healing
                // re-keys it and repairs references if it was renamed.
                out.types.insert(type_name.clone(), replacement);
                visit_children(&mut out, &type_name, visitor)?;
            }
            VisitAction::Remove => {
                if out.is_root_type(node.name()) {
                    return Err(StitchError::MissingRootType(node.name().to_string()));
                }
                out.types.shift_remove(&type_name);
            }
            VisitAction::Skip => {}
        }
    }

    heal_schema(&mut out)?;
    Ok(out)
}

fn visit_children(
    out: &mut SchemaGraph,
    type_name: &str,
    visitor: &mut SchemaVisitor,
) -> Result<(), StitchError> {
    let node = match out.types.get(type_name) {
        Some(node) => node.clone(),
        None => return Ok(()),
    };

    match &node {
        TypeNode::Object(_) | TypeNode::Interface(_) => {
            let field_names: Vec<String> = node
                .fields()
                .map(|fields| fields.keys().cloned().collect())
                .unwrap_or_default();
            for field_name in field_names {
                let field = match node.fields().and_then(|f| f.get(&field_name)) {
                    Some(field) => field.clone(),
                    None => continue,
                };
                let action = match visitor.first_registered(&[Specifier::Field]) {
                    Some(Callback::Field(callback)) => callback(&field, &node),
                    Some(_) => {
                        return Err(StitchError::InvalidVisitor(
                            "Field specifier requires a field callback".into(),
                        ))
                    }
                    None => VisitAction::Keep,
                };
                let fields = out
                    .types
                    .get_mut(type_name)
                    .and_then(TypeNode::fields_mut)
                    .expect("composite type disappeared during traversal");
                match action {
                    VisitAction::Keep => {
                        visit_arguments(fields, &field_name, &node, visitor)?;
                    }
                    VisitAction::Replace(replacement) => {
                        fields.insert(field_name.clone(), replacement);
                        visit_arguments(fields, &field_name, &node, visitor)?;
                    }
                    VisitAction::Remove => {
                        fields.shift_remove(&field_name);
                    }
                    VisitAction::Skip => {}
                }
            }
        }
        TypeNode::Enum(enum_type) => {
            for (value_name, value) in enum_type.values.clone() {
                let action = match visitor.first_registered(&[Specifier::EnumValue]) {
                    Some(Callback::EnumValue(callback)) => callback(&value, &node),
                    Some(_) => {
                        return Err(StitchError::InvalidVisitor(
                            "EnumValue specifier requires an enum-value callback".into(),
                        ))
                    }
                    None => VisitAction::Keep,
                };
                if let Some(TypeNode::Enum(live)) = out.types.get_mut(type_name) {
                    match action {
                        VisitAction::Keep | VisitAction::Skip => {}
                        VisitAction::Replace(replacement) => {
                            live.values.insert(value_name, replacement);
                        }
                        VisitAction::Remove => {
                            live.values.shift_remove(&value_name);
                        }
                    }
                }
            }
        }
        _ => {}
    }
    Ok(())
}

fn visit_arguments(
    fields: &mut IndexMap<String, FieldDef>,
    field_name: &str,
    parent: &TypeNode,
    visitor: &mut SchemaVisitor,
) -> Result<(), StitchError> {
    let field_snapshot = match fields.get(field_name) {
        Some(field) => field.clone(),
        None => return Ok(()),
    };
    let mut rewritten = Vec::with_capacity(field_snapshot.arguments.len());
    for argument in &field_snapshot.arguments {
        let action = match visitor.first_registered(&[Specifier::Argument]) {
            Some(Callback::Argument(callback)) => callback(argument, &field_snapshot, parent),
            Some(_) => {
                return Err(StitchError::InvalidVisitor(
                    "Argument specifier requires an argument callback".into(),
                ))
            }
            None => VisitAction::Keep,
        };
        match action {
            VisitAction::Keep | VisitAction::Skip => rewritten.push(argument.clone()),
            VisitAction::Replace(replacement) => rewritten.push(replacement),
            VisitAction::Remove => {}
        }
    }
    if let Some(field) = fields.get_mut(field_name) {
        field.arguments = rewritten;
    }
    Ok(())
}

/// Repairs the graph after a rewrite: renamed types are re-keyed under their
/// new name, every reference to the old name is re-pointed, and references
/// to types no longer present are pruned. A rename that collides with a
/// live type is fatal, as is a dangling root.
pub fn heal_schema(schema: &mut SchemaGraph) -> Result<(), StitchError> {
    // Renames show up as entries whose key no longer matches the node name.
    let mut renames: HashMap<String, String> = HashMap::new();
    for (key, node) in &schema.types {
        if key != node.name() {
            renames.insert(key.clone(), node.name().to_string());
        }
    }

    if !renames.is_empty() {
        let mut targets = HashSet::new();
        for (old, new) in &renames {
            if !targets.insert(new.clone()) {
                return Err(StitchError::DuplicateType(new.clone()));
            }
            if schema.types.contains_key(new) && !renames.contains_key(new) {
                return Err(StitchError::DuplicateType(new.clone()));
            }
            tracing::debug!("healing rename {} -> {}", old, new);
        }

        let mut rekeyed = IndexMap::with_capacity(schema.types.len());
        for (_, node) in std::mem::take(&mut schema.types) {
            let name = node.name().to_string();
            if rekeyed.insert(name.clone(), node).is_some() {
                return Err(StitchError::DuplicateType(name));
            }
        }
        schema.types = rekeyed;
    }

    let rename = |name: &str| -> String {
        renames.get(name).cloned().unwrap_or_else(|| name.to_string())
    };
    let live: HashSet<String> = schema.types.keys().cloned().collect();
    let is_live =
        |name: &str| live.contains(name) || name.starts_with(INTROSPECTION_PREFIX);

    for node in schema.types.values_mut() {
        match node {
            TypeNode::Object(object) => {
                object.interfaces = object
                    .interfaces
                    .iter()
                    .map(|name| rename(name))
                    .filter(|name| is_live(name))
                    .collect();
                heal_fields(&mut object.fields, &rename, &is_live);
            }
            TypeNode::Interface(interface) => {
                heal_fields(&mut interface.fields, &rename, &is_live);
            }
            TypeNode::Union(union_type) => {
                union_type.members = union_type
                    .members
                    .iter()
                    .map(|name| rename(name))
                    .filter(|name| is_live(name))
                    .collect();
            }
            TypeNode::InputObject(input) => {
                input.fields.retain(|_, field| {
                    field.value_type = field.value_type.with_name(&rename);
                    is_live(field.value_type.name())
                });
            }
            TypeNode::Scalar(_) | TypeNode::Enum(_) => {}
        }
    }

    for root in [
        &mut schema.query_type,
        &mut schema.mutation_type,
        &mut schema.subscription_type,
    ]
    .into_iter()
    .flatten()
    {
        *root = rename(root);
        if !live.contains(root.as_str()) {
            return Err(StitchError::MissingRootType(root.clone()));
        }
    }

    Ok(())
}

fn heal_fields(
    fields: &mut IndexMap<String, FieldDef>,
    rename: &dyn Fn(&str) -> String,
    is_live: &dyn Fn(&str) -> bool,
) {
    fields.retain(|_, field| {
        field.field_type = field.field_type.with_name(rename);
        if !is_live(field.field_type.name()) {
            return false;
        }
        field.arguments.retain_mut(|argument| {
            argument.value_type = argument.value_type.with_name(rename);
            is_live(argument.value_type.name())
        });
        true
    });
}
