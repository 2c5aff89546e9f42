use graphweld::graph::SchemaGraph;
use graphweld::visit::{heal_schema, visit_schema, SchemaVisitor, Specifier, VisitAction};
use graphweld::{StitchError, TypeNode};
use pretty_assertions::assert_eq;

const SDL: &str = r#"
    type Query {
        widget(id: ID!): Widget
        widgets: [Widget!]
    }

    type Widget {
        id: ID!
        name: String
        parts: [Part]
    }

    type Part {
        serial: String
    }
"#;

fn schema() -> SchemaGraph {
    let (graph, extensions) = SchemaGraph::from_sdl(SDL).unwrap();
    assert!(extensions.is_empty());
    graph
}

fn field_type_name(schema: &SchemaGraph, type_name: &str, field_name: &str) -> String {
    schema
        .field_def(type_name, field_name)
        .unwrap()
        .field_type
        .name()
        .to_string()
}

#[test]
fn heal_rekeys_renamed_types_and_rewrites_references() {
    let mut graph = schema();
    graph
        .types
        .get_mut("Widget")
        .unwrap()
        .set_name("Gadget".to_string());

    heal_schema(&mut graph).unwrap();

    assert!(graph.get_type("Widget").is_none());
    assert!(graph.get_type("Gadget").is_some());
    assert_eq!(field_type_name(&graph, "Query", "widget"), "Gadget");
    assert_eq!(field_type_name(&graph, "Query", "widgets"), "Gadget");
}

#[test]
fn heal_is_idempotent() {
    let mut graph = schema();
    graph
        .types
        .get_mut("Widget")
        .unwrap()
        .set_name("Gadget".to_string());

    heal_schema(&mut graph).unwrap();
    let keys_after_first: Vec<String> = graph.types.keys().cloned().collect();
    heal_schema(&mut graph).unwrap();
    let keys_after_second: Vec<String> = graph.types.keys().cloned().collect();

    assert_eq!(keys_after_first, keys_after_second);
    assert_eq!(field_type_name(&graph, "Query", "widget"), "Gadget");
}

#[test]
fn heal_prunes_references_to_removed_types() {
    let mut graph = schema();
    graph.types.shift_remove("Part");

    heal_schema(&mut graph).unwrap();

    let widget_fields = graph.get_type("Widget").unwrap().fields().unwrap();
    assert!(widget_fields.contains_key("name"));
    assert!(!widget_fields.contains_key("parts"));
}

#[test]
fn heal_rejects_rename_onto_live_type() {
    let mut graph = schema();
    graph
        .types
        .get_mut("Widget")
        .unwrap()
        .set_name("Part".to_string());

    let err = heal_schema(&mut graph).unwrap_err();
    assert!(matches!(err, StitchError::DuplicateType(name) if name == "Part"));
}

#[test]
fn heal_rejects_missing_root() {
    let mut graph = schema();
    graph.types.shift_remove("Query");

    let err = heal_schema(&mut graph).unwrap_err();
    assert!(matches!(err, StitchError::MissingRootType(name) if name == "Query"));
}

#[test]
fn visit_replace_renames_through_healing() {
    let graph = schema();
    let mut visitor = SchemaVisitor::new()
        .on_type(Specifier::ObjectType, |node, schema| {
            if node.name() == "Widget" && !schema.is_root_type(node.name()) {
                let mut renamed = node.clone();
                renamed.set_name("Gadget".to_string());
                VisitAction::Replace(renamed)
            } else {
                VisitAction::Keep
            }
        })
        .unwrap();

    let rewritten = visit_schema(&graph, &mut visitor).unwrap();

    assert!(rewritten.get_type("Gadget").is_some());
    assert_eq!(field_type_name(&rewritten, "Query", "widget"), "Gadget");
    // The input graph is untouched.
    assert!(graph.get_type("Widget").is_some());
}

#[test]
fn visit_remove_prunes_dependents() {
    let graph = schema();
    let mut visitor = SchemaVisitor::new()
        .on_type(Specifier::ObjectType, |node, _| {
            if node.name() == "Part" {
                VisitAction::Remove
            } else {
                VisitAction::Keep
            }
        })
        .unwrap();

    let rewritten = visit_schema(&graph, &mut visitor).unwrap();

    assert!(rewritten.get_type("Part").is_none());
    let widget_fields = rewritten.get_type("Widget").unwrap().fields().unwrap();
    assert!(!widget_fields.contains_key("parts"));
}

#[test]
fn visit_field_removal() {
    let graph = schema();
    let mut visitor = SchemaVisitor::new().on_field(|field, parent| {
        if parent.name() == "Widget" && field.name == "name" {
            VisitAction::Remove
        } else {
            VisitAction::Keep
        }
    });

    let rewritten = visit_schema(&graph, &mut visitor).unwrap();

    let widget_fields = rewritten.get_type("Widget").unwrap().fields().unwrap();
    assert!(!widget_fields.contains_key("name"));
    assert!(widget_fields.contains_key("id"));
}

#[test]
fn visit_removing_root_is_fatal() {
    let graph = schema();
    let mut visitor = SchemaVisitor::new()
        .on_type(Specifier::Query, |_, _| VisitAction::Remove)
        .unwrap();

    let err = visit_schema(&graph, &mut visitor).unwrap_err();
    assert!(matches!(err, StitchError::MissingRootType(name) if name == "Query"));
}

#[test]
fn visitor_rejects_type_callback_under_field_specifier() {
    let result = SchemaVisitor::new().on_type(Specifier::Field, |_, _| VisitAction::Keep);
    assert!(matches!(result, Err(StitchError::InvalidVisitor(_))));
}

#[test]
fn visit_skips_introspection_types() {
    let mut graph = schema();
    let type_name = "__Fake".to_string();
    graph.types.insert(
        type_name.clone(),
        TypeNode::Scalar(graphweld::graph::ScalarType {
            name: type_name,
            description: None,
        }),
    );

    let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = seen.clone();
    let mut visitor = SchemaVisitor::new()
        .on_type(Specifier::Type, move |node, _| {
            sink.lock().unwrap().push(node.name().to_string());
            VisitAction::Keep
        })
        .unwrap();
    visit_schema(&graph, &mut visitor).unwrap();

    let seen = seen.lock().unwrap();
    assert!(!seen.iter().any(|name| name.starts_with("__")));
    assert!(seen.contains(&"Widget".to_string()));
}
