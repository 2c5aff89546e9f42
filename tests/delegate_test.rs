use futures::FutureExt;
use graphweld::ast;
use graphweld::delegate::{delegate_to_schema, DelegateOptions};
use graphweld::error::PathSegment;
use graphweld::graph::{add_resolvers, ResolverMap, SchemaGraph};
use graphweld::{execute, transform_schema, GraphQLError, JsonMap, OperationKind, Resolver};
use pretty_assertions::assert_eq;
use serde_json::{json, Value as Json};
use std::collections::HashMap;
use std::sync::Arc;

const SDL: &str = r#"
    type Query {
        thing: Thing
        echo(message: String!): String
        things: [Thing]
    }

    type Thing {
        a: String
        b: String
    }
"#;

fn fixed(value: Json) -> Resolver {
    Arc::new(move |_params| {
        let value = value.clone();
        async move { Ok(value) }.boxed()
    })
}

fn failing(message: &'static str) -> Resolver {
    Arc::new(move |_params| async move { Err(GraphQLError::new(message)) }.boxed())
}

fn echo() -> Resolver {
    Arc::new(|params| {
        async move {
            Ok(params
                .args
                .get("message")
                .cloned()
                .unwrap_or(Json::Null))
        }
        .boxed()
    })
}

fn target_schema(thing_resolvers: HashMap<String, Resolver>) -> Arc<SchemaGraph> {
    let (mut graph, _) = SchemaGraph::from_sdl(SDL).unwrap();
    let mut resolvers = ResolverMap::new();
    resolvers.insert(
        "Query".to_string(),
        HashMap::from([
            (
                "thing".to_string(),
                fixed(json!({"a": "alpha", "b": "beta"})),
            ),
            ("echo".to_string(), echo()),
            (
                "things".to_string(),
                fixed(json!([{"a": "one"}, {"a": "two"}])),
            ),
        ]),
    );
    if !thing_resolvers.is_empty() {
        resolvers.insert("Thing".to_string(), thing_resolvers);
    }
    add_resolvers(&mut graph, &resolvers);
    Arc::new(graph)
}

async fn run(schema: Arc<SchemaGraph>, query: &str) -> (Json, Vec<GraphQLError>) {
    let document = ast::parse_operation(query).unwrap();
    let result = execute(schema, &document, None, Json::Null, JsonMap::new()).await;
    (result.data, result.errors)
}

#[tokio::test]
async fn delegated_selection_set_travels_intact() {
    let wrapped = transform_schema(target_schema(HashMap::new()), Vec::new()).unwrap();

    let (data, errors) = run(wrapped, "{ thing { a b } }").await;

    assert_eq!(errors, Vec::new());
    assert_eq!(data, json!({"thing": {"a": "alpha", "b": "beta"}}));
}

#[tokio::test]
async fn arguments_travel_as_variables() {
    let wrapped = transform_schema(target_schema(HashMap::new()), Vec::new()).unwrap();

    let (data, errors) = run(wrapped, r#"{ echo(message: "hello") }"#).await;

    assert_eq!(errors, Vec::new());
    assert_eq!(data, json!({"echo": "hello"}));
}

#[tokio::test]
async fn aliases_travel_with_the_sub_operation() {
    let wrapped = transform_schema(target_schema(HashMap::new()), Vec::new()).unwrap();

    let (data, errors) = run(wrapped, "{ thing { first: a } }").await;

    assert_eq!(errors, Vec::new());
    assert_eq!(data, json!({"thing": {"first": "alpha"}}));
}

#[tokio::test]
async fn nested_failure_is_attributed_to_the_exact_field() {
    let target = target_schema(HashMap::from([("b".to_string(), failing("b blew up"))]));
    let wrapped = transform_schema(target, Vec::new()).unwrap();

    let (data, errors) = run(wrapped, "{ thing { a b } }").await;

    // The sibling field survives; only the failing one is null.
    assert_eq!(data, json!({"thing": {"a": "alpha", "b": null}}));
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "b blew up");
    assert_eq!(
        errors[0].path,
        vec![PathSegment::field("thing"), PathSegment::field("b")]
    );
}

#[tokio::test]
async fn root_failure_surfaces_at_the_delegating_field() {
    let (mut graph, _) = SchemaGraph::from_sdl(SDL).unwrap();
    let mut resolvers = ResolverMap::new();
    resolvers.insert(
        "Query".to_string(),
        HashMap::from([("thing".to_string(), failing("thing unavailable"))]),
    );
    add_resolvers(&mut graph, &resolvers);
    let wrapped = transform_schema(Arc::new(graph), Vec::new()).unwrap();

    let (data, errors) = run(wrapped, "{ thing { a } }").await;

    assert_eq!(data, json!({"thing": null}));
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "thing unavailable");
    assert_eq!(errors[0].path, vec![PathSegment::field("thing")]);
}

#[tokio::test]
async fn list_failures_keep_their_index() {
    let target = target_schema(HashMap::from([("b".to_string(), failing("beta down"))]));
    let wrapped = transform_schema(target, Vec::new()).unwrap();

    let (data, errors) = run(wrapped, "{ things { a b } }").await;

    assert_eq!(
        data,
        json!({"things": [{"a": "one", "b": null}, {"a": "two", "b": null}]})
    );
    assert_eq!(errors.len(), 2);
    assert_eq!(
        errors[0].path,
        vec![
            PathSegment::field("things"),
            PathSegment::Index(0),
            PathSegment::field("b"),
        ]
    );
    assert_eq!(
        errors[1].path,
        vec![
            PathSegment::field("things"),
            PathSegment::Index(1),
            PathSegment::field("b"),
        ]
    );
}

#[tokio::test]
async fn abstract_selections_flatten_when_the_target_lacks_the_interface() {
    let target = {
        let (mut graph, _) = SchemaGraph::from_sdl(
            r#"
            type Query { node: User }
            type User { id: ID! name: String }
            "#,
        )
        .unwrap();
        add_resolvers(
            &mut graph,
            &ResolverMap::from([(
                "Query".to_string(),
                HashMap::from([(
                    "node".to_string(),
                    fixed(json!({"id": "u1", "name": "Ada"})),
                )]),
            )]),
        );
        Arc::new(graph)
    };

    let (mut source, _) = SchemaGraph::from_sdl(
        r#"
        type Query { node: Node }
        interface Node { id: ID! }
        type User implements Node { id: ID! name: String }
        "#,
    )
    .unwrap();
    let delegation_target = target.clone();
    let node: Resolver = Arc::new(move |params| {
        let target = delegation_target.clone();
        async move {
            delegate_to_schema(DelegateOptions::new(
                target,
                OperationKind::Query,
                "node",
                JsonMap::new(),
                params.info.clone(),
            ))
            .await
        }
        .boxed()
    });
    add_resolvers(
        &mut source,
        &ResolverMap::from([(
            "Query".to_string(),
            HashMap::from([("node".to_string(), node)]),
        )]),
    );

    // The target has no Node interface: the fragment on Node must arrive
    // flattened onto User, with __typename fetched so the caller can still
    // discriminate the abstract result.
    let (data, errors) = run(
        Arc::new(source),
        "{ node { ... on Node { id } ... on User { name } } }",
    )
    .await;

    assert_eq!(errors, Vec::new());
    assert_eq!(data, json!({"node": {"id": "u1", "name": "Ada"}}));
}

#[tokio::test]
async fn skip_and_include_are_honored_before_delegation() {
    let wrapped = transform_schema(target_schema(HashMap::new()), Vec::new()).unwrap();

    let document = ast::parse_operation(
        "query ($yes: Boolean!) { thing { a @include(if: $yes) b @skip(if: $yes) } }",
    )
    .unwrap();
    let mut variables = JsonMap::new();
    variables.insert("yes".to_string(), json!(true));
    let result = execute(wrapped, &document, None, Json::Null, variables).await;

    assert_eq!(result.errors, Vec::new());
    assert_eq!(result.data, json!({"thing": {"a": "alpha"}}));
}
