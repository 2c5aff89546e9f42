use futures::FutureExt;
use graphweld::ast;
use graphweld::error::PathSegment;
use graphweld::graph::{add_resolvers, ResolverMap, SchemaGraph, TypeNode};
use graphweld::transforms::{
    apply_result_transforms, CheckResultAndHandleErrors, FilterRootFields, FilterToSchema,
    RenameRootFields, RenameTypes, Request, Transform, TransformChain,
};
use graphweld::{execute, transform_schema, JsonMap, OperationKind, Resolver, StitchError};
use pretty_assertions::assert_eq;
use serde_json::{json, Value as Json};
use std::collections::HashMap;
use std::sync::Arc;

const SDL: &str = r#"
    type Query {
        widget(id: ID!): Widget
        serial: String
    }

    type Widget {
        id: ID!
        name: String
    }
"#;

fn fixed(value: Json) -> Resolver {
    Arc::new(move |_params| {
        let value = value.clone();
        async move { Ok(value) }.boxed()
    })
}

fn widget_schema() -> Arc<SchemaGraph> {
    let (mut graph, _) = SchemaGraph::from_sdl(SDL).unwrap();
    let mut resolvers = ResolverMap::new();
    resolvers.insert(
        "Query".to_string(),
        HashMap::from([
            (
                "widget".to_string(),
                fixed(json!({"id": "w1", "name": "sprocket"})),
            ),
            ("serial".to_string(), fixed(json!("s-99"))),
        ]),
    );
    add_resolvers(&mut graph, &resolvers);
    Arc::new(graph)
}

async fn run(schema: Arc<SchemaGraph>, query: &str) -> (Json, usize) {
    let document = ast::parse_operation(query).unwrap();
    let result = execute(schema, &document, None, Json::Null, JsonMap::new()).await;
    (result.data, result.errors.len())
}

#[tokio::test]
async fn rename_types_round_trips_through_delegation() {
    let original = widget_schema();
    let rename: Arc<dyn Transform> =
        Arc::new(RenameTypes::from_map(HashMap::from([(
            "Widget".to_string(),
            "Gizmo".to_string(),
        )])));
    let wrapped = transform_schema(original, vec![rename]).unwrap();

    assert!(wrapped.get_type("Widget").is_none());
    assert!(wrapped.get_type("Gizmo").is_some());

    let (data, error_count) = run(
        wrapped,
        r#"{ widget(id: "w1") { ... on Gizmo { name } __typename } }"#,
    )
    .await;

    assert_eq!(error_count, 0);
    assert_eq!(
        data,
        json!({"widget": {"name": "sprocket", "__typename": "Gizmo"}})
    );
}

#[tokio::test]
async fn filter_root_fields_hides_fields_but_keeps_the_rest_working() {
    let original = widget_schema();
    let filter: Arc<dyn Transform> = Arc::new(FilterRootFields::new(
        |operation, name, _field| operation != OperationKind::Query || name != "serial",
    ));
    let wrapped = transform_schema(original, vec![filter]).unwrap();

    let root_fields = wrapped.get_type("Query").unwrap().fields().unwrap();
    assert!(!root_fields.contains_key("serial"));
    assert!(root_fields.contains_key("widget"));

    let (data, error_count) = run(wrapped, r#"{ widget(id: "w1") { id } }"#).await;
    assert_eq!(error_count, 0);
    assert_eq!(data, json!({"widget": {"id": "w1"}}));
}

#[test]
fn filter_to_schema_drops_unknown_selections_variables_and_fragments() {
    let target = widget_schema();
    let document = ast::parse_operation(
        r#"
        query ($id: ID!, $unused: String) {
            widget(id: $id, bogus: $unused) {
                name
                missing
                ...widgetBits
                ...doomed
            }
        }
        fragment widgetBits on Widget { id }
        fragment doomed on Nonexistent { whatever }
        "#,
    )
    .unwrap();
    let mut variables = JsonMap::new();
    variables.insert("id".to_string(), json!("w1"));
    variables.insert("unused".to_string(), json!("x"));

    let filtered = FilterToSchema::new(target)
        .transform_request(Request {
            document,
            variables,
            operation_name: None,
        })
        .unwrap();

    let printed = filtered.document.to_string();
    assert!(printed.contains("name"));
    assert!(printed.contains("widgetBits"));
    assert!(!printed.contains("missing"));
    assert!(!printed.contains("bogus"));
    assert!(!printed.contains("doomed"));
    assert!(!printed.contains("$unused"));
    assert!(filtered.variables.contains_key("id"));
    assert!(!filtered.variables.contains_key("unused"));
}

#[test]
fn operations_the_target_cannot_serve_are_rejected() {
    let target = widget_schema();
    let document = ast::parse_operation("mutation { breakWidget }").unwrap();

    let err = FilterToSchema::new(target)
        .transform_request(Request {
            document,
            variables: JsonMap::new(),
            operation_name: None,
        })
        .unwrap_err();

    let StitchError::Validation(message) = err else {
        panic!("expected a validation error, got {err:?}");
    };
    assert!(message.contains("mutation"));
}

#[test]
fn own_error_beside_partial_data_is_still_raised() {
    let check = CheckResultAndHandleErrors::new(vec![PathSegment::field("widget")], "widget");
    let envelope = json!({
        "data": {"widget": {"id": "w1"}},
        "errors": [{"message": "widget is stale", "path": ["widget"]}]
    });

    let err = check.transform_result(envelope).unwrap_err();

    let StitchError::Delegation(error) = err else {
        panic!("expected a delegation error, got {err:?}");
    };
    assert_eq!(error.message, "widget is stale");
    assert_eq!(error.path, vec![PathSegment::field("widget")]);
}

#[tokio::test]
async fn delegated_enum_results_map_back_to_internal_values() {
    let (mut graph, _) = SchemaGraph::from_sdl(
        r#"
        type Query { status: Status }
        enum Status { OPEN CLOSED }
        "#,
    )
    .unwrap();
    let Some(TypeNode::Enum(status)) = graph.types.get_mut("Status") else {
        panic!("Status must be an enum");
    };
    status.values.get_mut("OPEN").unwrap().value = Some(json!(1));
    status.values.get_mut("CLOSED").unwrap().value = Some(json!(2));
    add_resolvers(
        &mut graph,
        &ResolverMap::from([(
            "Query".to_string(),
            HashMap::from([("status".to_string(), fixed(json!(1)))]),
        )]),
    );
    let wrapped = transform_schema(Arc::new(graph), Vec::new()).unwrap();

    // The sub-schema serializes the enum to its external name; the chain
    // converts it back so the wrapping schema can complete it again.
    let (data, error_count) = run(wrapped, "{ status }").await;

    assert_eq!(error_count, 0);
    assert_eq!(data, json!({"status": "OPEN"}));
}

#[tokio::test]
async fn renamed_root_fields_delegate_under_their_original_name() {
    let original = widget_schema();
    let rename: Arc<dyn Transform> = Arc::new(RenameRootFields::new(|_, name, _field| {
        (name == "widget").then(|| "gadget".to_string())
    }));
    let wrapped = transform_schema(original, vec![rename]).unwrap();

    let root_fields = wrapped.get_type("Query").unwrap().fields().unwrap();
    assert!(root_fields.contains_key("gadget"));
    assert!(!root_fields.contains_key("widget"));

    let (data, error_count) = run(wrapped, r#"{ gadget(id: "w1") { name } }"#).await;
    assert_eq!(error_count, 0);
    assert_eq!(data, json!({"gadget": {"name": "sprocket"}}));
}

struct Tag(&'static str);

impl Transform for Tag {
    fn transform_result(&self, result: Json) -> Result<Json, StitchError> {
        let mut tags = result.as_array().cloned().unwrap_or_default();
        tags.push(json!(self.0));
        Ok(Json::Array(tags))
    }
}

#[test]
fn chain_reverses_result_order_relative_to_flat_application() {
    let transforms: Vec<Arc<dyn Transform>> = vec![Arc::new(Tag("first")), Arc::new(Tag("second"))];

    let flat = apply_result_transforms(json!([]), &transforms).unwrap();
    assert_eq!(flat, json!(["first", "second"]));

    let chain = TransformChain::new(transforms);
    let nested = chain.transform_result(json!([])).unwrap();
    assert_eq!(nested, json!(["second", "first"]));
}
