use async_trait::async_trait;
use futures::FutureExt;
use graphweld::ast;
use graphweld::delegate::{delegate_to_schema, DelegateOptions};
use graphweld::graph::{add_resolvers, ResolverMap, SchemaGraph};
use graphweld::merge::{FieldFragment, MergeOptions, SchemaSource};
use graphweld::{
    execute, make_remote_schema, merge_schemas, GraphQLRequest, JsonMap, OperationKind,
    RemoteExecutor, Resolver, StitchError,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value as Json};
use std::collections::HashMap;
use std::sync::Arc;

fn fixed(value: Json) -> Resolver {
    Arc::new(move |_params| {
        let value = value.clone();
        async move { Ok(value) }.boxed()
    })
}

fn executable(sdl: &str, resolvers: ResolverMap) -> Arc<SchemaGraph> {
    let (mut graph, extensions) = SchemaGraph::from_sdl(sdl).unwrap();
    assert!(extensions.is_empty());
    add_resolvers(&mut graph, &resolvers);
    Arc::new(graph)
}

async fn run(schema: Arc<SchemaGraph>, query: &str) -> (Json, usize) {
    let document = ast::parse_operation(query).unwrap();
    let result = execute(schema, &document, None, Json::Null, JsonMap::new()).await;
    (result.data, result.errors.len())
}

fn booking_schema() -> Arc<SchemaGraph> {
    let lookup: Resolver = Arc::new(|params| {
        async move {
            let id = params.args.get("id").cloned().unwrap_or(Json::Null);
            Ok(json!({"id": id, "propertyId": "p1"}))
        }
        .boxed()
    });
    executable(
        r#"
        type Query {
            bookingById(id: ID!): Booking
        }

        type Booking {
            id: ID!
            propertyId: ID!
        }
        "#,
        ResolverMap::from([(
            "Query".to_string(),
            HashMap::from([("bookingById".to_string(), lookup)]),
        )]),
    )
}

fn property_schema() -> Arc<SchemaGraph> {
    let lookup: Resolver = Arc::new(|params| {
        async move {
            let id = params.args.get("id").cloned().unwrap_or(Json::Null);
            Ok(json!({"id": id, "name": "Grand Hotel"}))
        }
        .boxed()
    });
    executable(
        r#"
        type Query {
            propertyById(id: ID!): Property
        }

        type Property {
            id: ID!
            name: String
        }
        "#,
        ResolverMap::from([(
            "Query".to_string(),
            HashMap::from([("propertyById".to_string(), lookup)]),
        )]),
    )
}

#[tokio::test]
async fn merged_roots_union_fields_from_every_source() {
    let left = executable(
        "type Query { foo: String }",
        ResolverMap::from([(
            "Query".to_string(),
            HashMap::from([("foo".to_string(), fixed(json!("from left")))]),
        )]),
    );
    let right = executable(
        "type Query { bar: String }",
        ResolverMap::from([(
            "Query".to_string(),
            HashMap::from([("bar".to_string(), fixed(json!("from right")))]),
        )]),
    );

    let merged = merge_schemas(MergeOptions::new(vec![
        SchemaSource::Schema(left),
        SchemaSource::Schema(right),
    ]))
    .unwrap();

    let root_fields = merged.get_type("Query").unwrap().fields().unwrap();
    assert!(root_fields.contains_key("foo"));
    assert!(root_fields.contains_key("bar"));

    let (data, error_count) = run(merged, "{ foo bar }").await;
    assert_eq!(error_count, 0);
    assert_eq!(data, json!({"foo": "from left", "bar": "from right"}));
}

#[tokio::test]
async fn differently_named_roots_merge_under_synthesized_names() {
    let (mut graph, _) = SchemaGraph::from_sdl(
        r#"
        schema { query: RootQuery }
        type RootQuery { baz: String }
        "#,
    )
    .unwrap();
    add_resolvers(
        &mut graph,
        &ResolverMap::from([(
            "RootQuery".to_string(),
            HashMap::from([("baz".to_string(), fixed(json!("renamed root")))]),
        )]),
    );

    let merged =
        merge_schemas(MergeOptions::new(vec![SchemaSource::Schema(Arc::new(graph))])).unwrap();

    assert_eq!(merged.query_type.as_deref(), Some("Query"));
    let (data, error_count) = run(merged, "{ baz }").await;
    assert_eq!(error_count, 0);
    assert_eq!(data, json!({"baz": "renamed root"}));
}

#[tokio::test]
async fn cross_schema_field_delegates_through_the_merge_context() {
    let bookings = booking_schema();
    let properties = property_schema();

    let delegation_target = properties.clone();
    let property_of_booking: Resolver = Arc::new(move |params| {
        let target = delegation_target.clone();
        async move {
            let property_id = params
                .parent
                .get("propertyId")
                .cloned()
                .unwrap_or(Json::Null);
            let mut args = JsonMap::new();
            args.insert("id".to_string(), property_id);
            let options = DelegateOptions::new(
                target,
                OperationKind::Query,
                "propertyById",
                args,
                params.info.clone(),
            );
            match params.info.merge_info.clone() {
                Some(merge_info) => merge_info.delegate_to_schema(options).await,
                None => delegate_to_schema(options).await,
            }
        }
        .boxed()
    });

    let mut options = MergeOptions::new(vec![
        SchemaSource::Schema(bookings),
        SchemaSource::Schema(properties),
        SchemaSource::Sdl(
            "extend type Booking { property: Property }".to_string(),
        ),
    ]);
    options.resolvers = ResolverMap::from([(
        "Booking".to_string(),
        HashMap::from([("property".to_string(), property_of_booking)]),
    )]);
    // The booking sub-schema has no `property` field; whenever it is
    // requested there, fetch the key the resolver needs instead.
    options.field_fragments = vec![FieldFragment {
        type_name: "Booking".to_string(),
        field_name: "property".to_string(),
        fragment: "... on Booking { propertyId }".to_string(),
    }];

    let merged = merge_schemas(options).unwrap();

    let (data, error_count) = run(
        merged,
        r#"{ bookingById(id: "b1") { id property { name } } }"#,
    )
    .await;

    assert_eq!(error_count, 0);
    assert_eq!(
        data,
        json!({
            "bookingById": {
                "id": "b1",
                "property": {"name": "Grand Hotel"}
            }
        })
    );
}

#[tokio::test]
async fn later_sources_win_type_conflicts_by_default() {
    let left = executable(
        r#"
        type Query { item: Item }
        type Item { id: ID! }
        "#,
        ResolverMap::new(),
    );
    let right = executable(
        r#"
        type Query { other: Item }
        type Item { id: ID! label: String }
        "#,
        ResolverMap::new(),
    );

    let merged = merge_schemas(MergeOptions::new(vec![
        SchemaSource::Schema(left),
        SchemaSource::Schema(right),
    ]))
    .unwrap();

    let item_fields = merged.get_type("Item").unwrap().fields().unwrap();
    assert!(item_fields.contains_key("label"));
}

/// Serves a schema over the remote boundary without a network: requests are
/// parsed back and executed in-process.
struct InProcessRemote {
    backing: Arc<SchemaGraph>,
}

#[async_trait]
impl RemoteExecutor for InProcessRemote {
    async fn execute_request(&self, request: GraphQLRequest) -> Result<Json, StitchError> {
        let document = ast::parse_operation(&request.query)?;
        let variables = match request.variables {
            Some(Json::Object(map)) => map,
            _ => JsonMap::new(),
        };
        let result = execute(
            self.backing.clone(),
            &document,
            request.operation_name.as_deref(),
            Json::Null,
            variables,
        )
        .await;
        Ok(result.to_json())
    }
}

#[tokio::test]
async fn remote_sub_schemas_delegate_over_the_wire() {
    let remote = make_remote_schema(
        r#"
        type Query {
            propertyById(id: ID!): Property
        }

        type Property {
            id: ID!
            name: String
        }
        "#,
        Arc::new(InProcessRemote {
            backing: property_schema(),
        }),
    )
    .unwrap();
    let local = executable(
        "type Query { ping: String }",
        ResolverMap::from([(
            "Query".to_string(),
            HashMap::from([("ping".to_string(), fixed(json!("pong")))]),
        )]),
    );

    let merged = merge_schemas(MergeOptions::new(vec![
        SchemaSource::Schema(remote),
        SchemaSource::Schema(local),
    ]))
    .unwrap();

    let (data, error_count) = run(
        merged,
        r#"{ ping propertyById(id: "p1") { id name } }"#,
    )
    .await;

    assert_eq!(error_count, 0);
    assert_eq!(
        data,
        json!({
            "ping": "pong",
            "propertyById": {"id": "p1", "name": "Grand Hotel"}
        })
    );
}

#[tokio::test]
async fn merge_without_query_root_is_rejected() {
    let types_only = SchemaSource::Sdl("type Orphan { id: ID! }".to_string());
    let err = merge_schemas(MergeOptions::new(vec![types_only])).unwrap_err();
    assert!(matches!(
        err,
        graphweld::StitchError::MissingRootType(name) if name == "Query"
    ));
}
