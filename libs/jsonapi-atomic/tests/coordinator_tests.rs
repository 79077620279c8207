#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Coordinator behavior against a recording data layer.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use jsonapi_atomic::{
    AtomicAction, AtomicConfig, AtomicError, AtomicHandler, AtomicOperationRequest,
    AtomicOutcome, AttributeSchema, Cardinality, DataLayer, FieldKind, OperationConfig,
    OperationError, OperationInfo, RelationshipInfo, RelationshipUpdate, Resource, ResourceObject, ResourceRegistry,
    ResourceView, StoreError, TxOutcome, ViewContext, ViewOperation,
};
use jsonapi_errors::ErrorObject;
use parking_lot::Mutex;
use serde_json::{Value, json};

type Events = Arc<Mutex<Vec<String>>>;
type Seen = Arc<Mutex<Vec<OperationInfo>>>;

#[derive(Debug, Default)]
struct MockTx {
    writes: usize,
}

struct MockLayer {
    events: Events,
    fail_commit: bool,
}

#[async_trait]
impl DataLayer for MockLayer {
    type Tx = MockTx;

    async fn atomic_start(&self) -> Result<MockTx, StoreError> {
        self.events.lock().push("begin".to_owned());
        Ok(MockTx::default())
    }

    async fn atomic_end(&self, tx: MockTx, outcome: TxOutcome<'_>) -> Result<(), StoreError> {
        match outcome {
            TxOutcome::Success if self.fail_commit => {
                Err(StoreError::Transaction("commit refused".to_owned()))
            }
            TxOutcome::Success => {
                self.events.lock().push(format!("commit {}", tx.writes));
                Ok(())
            }
            TxOutcome::Failure(_) => {
                self.events.lock().push(format!("rollback {}", tx.writes));
                Ok(())
            }
        }
    }

    async fn update_relationship(
        &self,
        tx: &mut MockTx,
        update: RelationshipUpdate<'_>,
    ) -> Result<(), OperationError> {
        tx.writes += 1;
        let ids: Vec<_> = update
            .linkage
            .iter()
            .filter_map(|i| i.id.clone())
            .collect();
        self.events.lock().push(format!(
            "relationship {}/{} {} [{}]",
            update.resource_type,
            update.id,
            update.relationship,
            ids.join(",")
        ));
        Ok(())
    }
}

struct MockView {
    events: Events,
    seen: Seen,
    next_id: AtomicU64,
}

impl MockView {
    fn new(events: &Events, seen: &Seen) -> Self {
        Self {
            events: Arc::clone(events),
            seen: Arc::clone(seen),
            next_id: AtomicU64::new(1),
        }
    }

    fn record(&self, ctx: &ViewContext) {
        self.seen.lock().push(ctx.info().clone());
    }
}

#[async_trait]
impl ResourceView<MockTx> for MockView {
    async fn process_create_object(
        &self,
        tx: &mut MockTx,
        ctx: &ViewContext,
        mut data: ResourceObject,
    ) -> Result<ResourceObject, OperationError> {
        self.record(ctx);
        tx.writes += 1;
        assert!(data.lid.is_none(), "lid must not reach the view");
        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        self.events.lock().push(format!(
            "create {} {id} deps={}",
            ctx.resource_type(),
            Value::Object(ctx.dependencies().clone())
        ));
        data.id = Some(id);
        Ok(data)
    }

    async fn process_update_object(
        &self,
        tx: &mut MockTx,
        ctx: &ViewContext,
        id: &str,
        data: ResourceObject,
    ) -> Result<ResourceObject, OperationError> {
        self.record(ctx);
        assert!(data.lid.is_none(), "lid must not reach the view");
        tx.writes += 1;
        self.events
            .lock()
            .push(format!("update {} {id}", ctx.resource_type()));
        if data.id.as_deref() != Some(id) {
            return Err(ErrorObject::new(
                http::StatusCode::BAD_REQUEST,
                "Bad Request",
                "obj_id and data.id should be same.",
            )
            .with_pointer("/data/id")
            .into());
        }
        Ok(data)
    }

    async fn process_delete_object(
        &self,
        tx: &mut MockTx,
        ctx: &ViewContext,
        id: &str,
    ) -> Result<(), OperationError> {
        self.record(ctx);
        if id == "999" {
            return Err(StoreError::not_found(ctx.resource_type(), id).into());
        }
        tx.writes += 1;
        self.events
            .lock()
            .push(format!("delete {} {id}", ctx.resource_type()));
        Ok(())
    }

    async fn handle_get_resource_detail(
        &self,
        _tx: &mut MockTx,
        ctx: &ViewContext,
        id: &str,
    ) -> Result<ResourceObject, OperationError> {
        Ok(ResourceObject::new(ctx.resource_type()).with_id(id))
    }
}

fn handler_seeing(events: &Events, seen: &Seen, fail_commit: bool) -> AtomicHandler<MockLayer> {
    let registry = ResourceRegistry::builder()
        .register(
            Resource::new("customer", MockView::new(events, seen))
                .attributes(
                    AttributeSchema::new()
                        .required("name", FieldKind::String)
                        .nullable("email", FieldKind::String),
                )
                .relationship(
                    "computers",
                    RelationshipInfo::to_many("computer")
                        .with_inverse("owner", Cardinality::ToOne),
                )
                .dependencies(
                    ViewOperation::All,
                    OperationConfig::new().with_default("audit", true),
                )
                .dependencies(
                    ViewOperation::Create,
                    OperationConfig::new().with_default("audit", false),
                ),
        )
        .register(Resource::new("computer", MockView::new(events, seen)).relationship(
            "owner",
            RelationshipInfo::to_one("customer").with_inverse("computers", Cardinality::ToMany),
        ))
        .build()
        .unwrap();
    AtomicHandler::new(
        Arc::new(registry),
        Arc::new(MockLayer {
            events: Arc::clone(events),
            fail_commit,
        }),
        AtomicConfig::default(),
    )
}

fn handler_with(events: &Events, fail_commit: bool) -> AtomicHandler<MockLayer> {
    handler_seeing(events, &Seen::default(), fail_commit)
}

fn handler(events: &Events) -> AtomicHandler<MockLayer> {
    handler_with(events, false)
}

fn request(ops: Value) -> AtomicOperationRequest {
    serde_json::from_value(json!({ "atomic:operations": ops })).unwrap()
}

fn events() -> Events {
    Arc::new(Mutex::new(Vec::new()))
}

#[tokio::test]
async fn results_follow_operation_order_in_one_transaction() {
    let log = events();
    let outcome = handler(&log)
        .handle(request(json!([
            {"op": "add", "data": {"type": "customer", "attributes": {"name": "Ann"}}},
            {"op": "remove", "ref": {"type": "computer", "id": "7"}},
            {"op": "add", "data": {"type": "computer", "attributes": {"serial": "X1"}}}
        ])))
        .await
        .unwrap();

    let AtomicOutcome::Results(doc) = outcome else {
        panic!("expected results");
    };
    assert_eq!(doc.results.len(), 3);
    assert_eq!(
        doc.results[0].data.as_ref().map(|d| d.resource_type.as_str()),
        Some("customer")
    );
    assert!(doc.results[1].is_empty());
    assert_eq!(
        doc.results[2].data.as_ref().map(|d| d.resource_type.as_str()),
        Some("computer")
    );
    assert_eq!(
        *log.lock(),
        vec![
            "begin",
            "create customer 1 deps={\"audit\":false}",
            "delete computer 7",
            "create computer 1 deps={}",
            "commit 3",
        ]
    );
}

#[tokio::test]
async fn later_operations_see_ids_of_declared_lids() {
    let log = events();
    let handler = handler(&log);
    let mut session = handler.session();
    session
        .execute(request(json!([
            {"op": "add", "data": {"type": "customer", "lid": "c1", "attributes": {"name": "Ann"}}},
            {"op": "update", "ref": {"type": "customer", "lid": "c1", "relationship": "computers"},
             "data": [{"type": "computer", "id": "5"}]}
        ])))
        .await
        .unwrap();

    assert_eq!(session.local_ids().resolve("customer", "c1").unwrap(), "1");
    assert!(session.current_operation().is_none());
    assert!(log.lock().contains(&"relationship customer/1 computers [5]".to_owned()));
}

#[tokio::test]
async fn update_with_ref_declares_an_unknown_lid() {
    let log = events();
    let handler = handler(&log);
    let mut session = handler.session();
    session
        .execute(request(json!([
            {"op": "update", "ref": {"type": "customer", "id": "1"},
             "data": {"type": "customer", "lid": "u1", "attributes": {"name": "Ann"}}},
            {"op": "update", "ref": {"type": "customer", "lid": "u1"},
             "data": {"type": "customer", "attributes": {"name": "Bob"}}},
            {"op": "update", "ref": {"type": "customer", "id": "1"},
             "data": {"type": "customer", "lid": "u1", "attributes": {"name": "Cid"}}}
        ])))
        .await
        .unwrap();

    assert_eq!(session.local_ids().resolve("customer", "u1").unwrap(), "1");
    assert_eq!(
        *log.lock(),
        vec![
            "begin",
            "update customer 1",
            "update customer 1",
            "update customer 1",
            "commit 3",
        ]
    );
}

#[tokio::test]
async fn update_without_ref_cannot_declare_a_lid() {
    let log = events();
    let err = handler(&log)
        .handle(request(json!([
            {"op": "update", "data": {"type": "customer", "lid": "u1", "attributes": {}}}
        ])))
        .await
        .unwrap_err();
    assert!(matches!(err, AtomicError::Unprocessable { index: 0, .. }));
    assert_eq!(*log.lock(), vec!["begin", "rollback 0"]);
}

#[tokio::test]
async fn views_see_the_running_operation() {
    let log = events();
    let seen = Seen::default();
    handler_seeing(&log, &seen, false)
        .handle(request(json!([
            {"op": "add", "data": {"type": "customer", "attributes": {"name": "Ann"}}},
            {"op": "remove", "ref": {"type": "computer", "id": "7"}},
            {"op": "update", "ref": {"type": "customer", "id": "1"},
             "data": {"type": "customer", "attributes": {}}}
        ])))
        .await
        .unwrap();

    let info = |index, op, resource_type: &str| OperationInfo {
        index,
        op,
        resource_type: resource_type.to_owned(),
    };
    assert_eq!(
        *seen.lock(),
        vec![
            info(0, AtomicAction::Add, "customer"),
            info(1, AtomicAction::Remove, "computer"),
            info(2, AtomicAction::Update, "customer"),
        ]
    );
}

#[tokio::test]
async fn current_operation_is_cleared_when_an_operation_fails() {
    let log = events();
    let seen = Seen::default();
    let handler = handler_seeing(&log, &seen, false);
    let mut session = handler.session();
    session
        .execute(request(json!([
            {"op": "remove", "ref": {"type": "customer", "id": "1"}},
            {"op": "remove", "ref": {"type": "customer", "id": "999"}}
        ])))
        .await
        .unwrap_err();

    assert!(session.current_operation().is_none());
    assert_eq!(seen.lock().last().map(|i| i.index), Some(1));

    let err = session
        .execute(request(json!([
            {"op": "update", "ref": {"type": "customer", "lid": "missing"},
             "data": {"type": "customer", "attributes": {}}}
        ])))
        .await
        .unwrap_err();
    assert!(matches!(err, AtomicError::Unprocessable { index: 0, .. }));
    assert!(session.current_operation().is_none());
}

#[tokio::test]
async fn unknown_lid_fails_and_rolls_back() {
    let log = events();
    let err = handler(&log)
        .handle(request(json!([
            {"op": "add", "data": {"type": "customer", "attributes": {"name": "Ann"}}},
            {"op": "update", "ref": {"type": "customer", "lid": "nope", "relationship": "computers"},
             "data": []},
            {"op": "remove", "ref": {"type": "computer", "id": "1"}}
        ])))
        .await
        .unwrap_err();

    let AtomicError::Unprocessable { index, detail, .. } = &err else {
        panic!("expected 422, got {err:?}");
    };
    assert_eq!(*index, 1);
    assert_eq!(
        detail,
        "Validation error on operation update: Resource 'customer' not found in previous operations, no lid 'nope' defined yet"
    );
    assert_eq!(
        *log.lock(),
        vec!["begin", "create customer 1 deps={\"audit\":false}", "rollback 1"]
    );
}

#[tokio::test]
async fn store_failure_rolls_back_earlier_operations() {
    let log = events();
    let err = handler(&log)
        .handle(request(json!([
            {"op": "remove", "ref": {"type": "customer", "id": "1"}},
            {"op": "remove", "ref": {"type": "customer", "id": "999"}},
            {"op": "remove", "ref": {"type": "customer", "id": "2"}}
        ])))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AtomicError::Store {
            index: Some(1),
            source: StoreError::NotFound { .. }
        }
    ));
    let error: ErrorObject = err.into();
    assert_eq!(error.status, http::StatusCode::NOT_FOUND);
    assert_eq!(
        *log.lock(),
        vec!["begin", "delete customer 1", "rollback 1"]
    );
}

#[tokio::test]
async fn all_empty_results_collapse_to_no_content() {
    let log = events();
    let outcome = handler(&log)
        .handle(request(json!([
            {"op": "remove", "ref": {"type": "customer", "id": "1"}},
            {"op": "remove", "ref": {"type": "computer", "id": "2"}}
        ])))
        .await
        .unwrap();
    assert_eq!(outcome, AtomicOutcome::NoContent);

    let empty = handler(&log).handle(request(json!([]))).await.unwrap();
    assert_eq!(empty, AtomicOutcome::NoContent);
}

#[tokio::test]
async fn binding_failures_never_open_a_transaction() {
    let log = events();
    let err = handler(&log)
        .handle(request(json!([
            {"op": "add", "data": {"type": "customer", "attributes": {"name": "Ann"}}},
            {"op": "add", "data": {"type": "invoice", "attributes": {}}}
        ])))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AtomicError::UnknownResourceType { index: 1, .. }
    ));
    assert!(log.lock().is_empty());
}

#[tokio::test]
async fn schema_violations_are_reported_under_data() {
    let log = events();
    let err = handler(&log)
        .handle(request(json!([
            {"op": "add", "data": {"type": "customer", "attributes": {"email": 3}}}
        ])))
        .await
        .unwrap_err();
    let AtomicError::Unprocessable {
        detail, violations, ..
    } = err
    else {
        panic!("expected 422");
    };
    assert_eq!(detail, "Validation error on operation add: 2 error(s)");
    let fields: Vec<_> = violations.iter().map(|v| v.field.as_str()).collect();
    assert_eq!(fields, vec!["data.attributes.email", "data.attributes.name"]);
}

#[tokio::test]
async fn relationship_update_rejects_resource_objects() {
    let log = events();
    let err = handler(&log)
        .handle(request(json!([
            {"op": "update", "ref": {"type": "computer", "id": "1", "relationship": "owner"},
             "data": {"type": "customer", "id": "1", "attributes": {"name": "Ann"}}}
        ])))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Validation error on operation update: Atomic relationship update expects relationship linkage data"
    );
}

#[tokio::test]
async fn relationship_cardinality_is_enforced() {
    let log = events();
    let err = handler(&log)
        .handle(request(json!([
            {"op": "update", "ref": {"type": "computer", "id": "1", "relationship": "owner"},
             "data": [{"type": "customer", "id": "1"}]}
        ])))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("is to-one"));

    let cleared = handler(&log)
        .handle(request(json!([
            {"op": "update", "ref": {"type": "computer", "id": "1", "relationship": "owner"},
             "data": null}
        ])))
        .await
        .unwrap();
    assert!(matches!(cleared, AtomicOutcome::Results(_)));
    assert!(log.lock().contains(&"relationship computer/1 owner []".to_owned()));
}

#[tokio::test]
async fn view_errors_pass_through() {
    let log = events();
    let err = handler(&log)
        .handle(request(json!([
            {"op": "update", "ref": {"type": "customer", "id": "1"},
             "data": {"type": "customer", "id": "2", "attributes": {}}}
        ])))
        .await
        .unwrap_err();
    let error: ErrorObject = err.into();
    assert_eq!(error.status, http::StatusCode::BAD_REQUEST);
    assert_eq!(error.pointer(), Some("/data/id"));
}

#[tokio::test]
async fn commit_failure_is_a_store_error() {
    let log = events();
    let err = handler_with(&log, true)
        .handle(request(json!([
            {"op": "remove", "ref": {"type": "customer", "id": "1"}}
        ])))
        .await
        .unwrap_err();
    assert!(matches!(err, AtomicError::Store { index: None, .. }));
    let error: ErrorObject = err.into();
    assert_eq!(error.status, http::StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn dependency_defaults_are_cached_per_key() {
    let log = events();
    let handler = handler(&log);
    for _ in 0..2 {
        handler
            .handle(request(json!([
                {"op": "add", "data": {"type": "customer", "attributes": {"name": "Ann"}}}
            ])))
            .await
            .unwrap();
    }
    assert_eq!(handler.dependency_cache().len(), 1);
}

#[tokio::test]
#[tracing_test::traced_test]
async fn commit_and_operations_are_logged() {
    let log = events();
    handler(&log)
        .handle(request(json!([
            {"op": "remove", "ref": {"type": "customer", "id": "1"}}
        ])))
        .await
        .unwrap();
    assert!(logs_contain("bound atomic operation"));
    assert!(logs_contain("atomic transaction committed"));
}
