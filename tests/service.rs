//! End-to-end tests against a live MongoDB deployment.
//!
//! Every test here drives a real broker over TCP with the client request
//! models, asserting the response contracts and the version-history
//! coupling. They need a reachable `mongod` (a replica set for the
//! transaction test) and are ignored by default; set
//! `DOCD_TEST_MONGO_URI` to point somewhere other than localhost.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::time::Duration;

use bson::{doc, oid::ObjectId, Document};
use tokio::net::TcpListener;
use tokio::time::timeout;

use docd::client::Connection;
use docd::config::Settings;
use docd::requests::{Bulk, Create, Filtered, Transaction, Update};
use docd::responses::Reply;
use docd::server;

const IO_DEADLINE: Duration = Duration::from_secs(10);
const DB: &str = "itest";
const COLLECTION: &str = "test";

fn mongo_uri() -> String {
    std::env::var("DOCD_TEST_MONGO_URI")
        .unwrap_or_else(|_| "mongodb://localhost:27017".to_owned())
}

async fn start_server() -> SocketAddr {
    let mut settings = Settings::default();
    settings.mongo_uri = mongo_uri();
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = server::serve(listener, settings).await;
    });
    addr
}

struct Client {
    connection: Connection,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        let connection = timeout(IO_DEADLINE, Connection::connect(addr))
            .await
            .expect("connect deadline")
            .expect("connect");
        Self { connection }
    }

    async fn roundtrip(&mut self, envelope: &Document) -> Document {
        timeout(IO_DEADLINE, self.connection.send(envelope))
            .await
            .expect("roundtrip deadline")
            .expect("roundtrip")
    }

    async fn history_for(&mut self, id: ObjectId) -> Vec<Document> {
        let request = Filtered::retrieve("versionHistory", "entities", doc! { "entity._id": id });
        let response = self.roundtrip(&request.to_document()).await;
        response
            .get_array("results")
            .expect("results")
            .iter()
            .filter_map(|entry| entry.as_document().cloned())
            .collect()
    }
}

#[tokio::test]
#[ignore = "requires a running MongoDB deployment"]
async fn create_then_retrieve_by_id() {
    let addr = start_server().await;
    let mut client = Client::connect(addr).await;
    let id = ObjectId::new();

    let payload = doc! { "_id": id, "key": "value" };
    let response = client
        .roundtrip(&Create::new(DB, COLLECTION, &payload).to_document())
        .await;
    assert!(response.get_str("error").is_err(), "unexpected {response}");
    assert!(response.get_object_id("_id").is_ok());
    assert!(response.get_str("database").is_ok());
    assert!(response.get_str("collection").is_ok());
    assert_eq!(response.get_object_id("entity").expect("entity"), id);

    let response = client
        .roundtrip(&Filtered::retrieve(DB, COLLECTION, doc! { "_id": id }).to_document())
        .await;
    let result = response.get_document("result").expect("result");
    assert_eq!(result.get_object_id("_id").expect("_id"), id);
    assert_eq!(result.get_str("key").expect("key"), "value");
    assert!(response.get_array("results").is_err());
}

#[tokio::test]
#[ignore = "requires a running MongoDB deployment"]
async fn retrieve_by_property_returns_result_list() {
    let addr = start_server().await;
    let mut client = Client::connect(addr).await;
    let id = ObjectId::new();
    let marker = id.to_hex();

    let payload = doc! { "_id": id, "key": "value", "marker": &marker };
    client
        .roundtrip(&Create::new(DB, COLLECTION, &payload).to_document())
        .await;

    let response = client
        .roundtrip(&Filtered::retrieve(DB, COLLECTION, doc! { "marker": &marker }).to_document())
        .await;
    assert!(response.get_document("result").is_err());
    let results = response.get_array("results").expect("results");
    assert!(!results.is_empty());
    let found = results.iter().any(|entry| {
        entry
            .as_document()
            .and_then(|d| d.get_object_id("_id").ok())
            .is_some_and(|found| found == id)
    });
    assert!(found, "created document missing from results");
}

#[tokio::test]
#[ignore = "requires a running MongoDB deployment"]
async fn update_merges_fields_and_versions_history() {
    let addr = start_server().await;
    let mut client = Client::connect(addr).await;
    let id = ObjectId::new();

    client
        .roundtrip(&Create::new(DB, COLLECTION, doc! { "_id": id, "key": "value" }).to_document())
        .await;
    let response = client
        .roundtrip(&Update::merge(DB, COLLECTION, doc! { "_id": id, "key1": "value1" }).to_document())
        .await;
    let document = response.get_document("document").expect("document");
    assert_eq!(document.get_str("key").expect("key"), "value");
    assert_eq!(document.get_str("key1").expect("key1"), "value1");
    assert!(response.get_document("history").is_ok());

    let history = client.history_for(id).await;
    assert_eq!(history.len(), 2, "expected create + update entries");

    // Skip-version update: response lacks the document and carries the
    // flag; the history count is unchanged.
    let response = client
        .roundtrip(
            &Update::merge(DB, COLLECTION, doc! { "_id": id, "key2": "value2" })
                .skip_version()
                .to_document(),
        )
        .await;
    assert!(response.get_document("document").is_err());
    assert!(response.get_bool("skipVersion").expect("flag"));
    let history = client.history_for(id).await;
    assert_eq!(history.len(), 2, "skip-version update must not add history");
}

#[tokio::test]
#[ignore = "requires a running MongoDB deployment"]
async fn delete_versions_the_pre_state() {
    let addr = start_server().await;
    let mut client = Client::connect(addr).await;
    let id = ObjectId::new();

    client
        .roundtrip(&Create::new(DB, COLLECTION, doc! { "_id": id, "key": "value" }).to_document())
        .await;
    let response = client
        .roundtrip(&Filtered::delete(DB, COLLECTION, doc! { "_id": id }).to_document())
        .await;
    let success = response.get_array("success").expect("success");
    assert_eq!(success.len(), 1);
    assert!(!response.get_array("history").expect("history").is_empty());

    let response = client
        .roundtrip(&Filtered::retrieve(DB, COLLECTION, doc! { "_id": id }).to_document())
        .await;
    assert_eq!(
        response.get_str("error").expect("error"),
        "Document not found"
    );

    // create + delete audit records, the delete carrying the pre-state.
    let history = client.history_for(id).await;
    assert_eq!(history.len(), 2);
    assert!(history.iter().any(|entry| {
        entry.get_str("action") == Ok("delete")
            && entry
                .get_document("entity")
                .is_ok_and(|entity| entity.get_str("key") == Ok("value"))
    }));
}

#[tokio::test]
#[ignore = "requires a running MongoDB deployment (replica set)"]
async fn transaction_commits_ordered_items() {
    let addr = start_server().await;
    let mut client = Client::connect(addr).await;
    let first = ObjectId::new();
    let second = ObjectId::new();

    let first_doc = doc! { "_id": first, "key": "value1" };
    let second_doc = doc! { "_id": second, "key": "value2" };
    let request = Transaction::new(DB, COLLECTION)
        .create(DB, COLLECTION, &first_doc)
        .create(DB, COLLECTION, &second_doc)
        .delete(DB, COLLECTION, &doc! { "_id": first })
        .delete(DB, COLLECTION, &doc! { "_id": second });
    let response = client.roundtrip(&request.to_document()).await;

    match Reply::parse(&response).expect("classify response") {
        Reply::Transaction(summary) => {
            assert_eq!(summary.created, 2);
            assert_eq!(summary.updated, 0);
            assert_eq!(summary.deleted, 2);
            assert_eq!(summary.history_created.len(), 2);
            assert_eq!(summary.history_deleted.len(), 2);
        }
        other => panic!("expected a transaction summary, got {other:?}"),
    }

    for id in [first, second] {
        let entries = client.history_for(id).await;
        assert_eq!(entries.len(), 2, "create + delete audit entries for {id}");
    }
}

#[tokio::test]
#[ignore = "requires a running MongoDB deployment"]
async fn bulk_insert_then_delete_reports_counts() {
    let addr = start_server().await;
    let mut client = Client::connect(addr).await;
    let first = ObjectId::new();
    let second = ObjectId::new();

    let first_doc = doc! { "_id": first, "key": "value1" };
    let second_doc = doc! { "_id": second, "key": "value2" };
    let response = client
        .roundtrip(
            &Bulk::new(DB, COLLECTION)
                .insert(&first_doc)
                .insert(&second_doc)
                .to_document(),
        )
        .await;
    assert_eq!(response.get_i32("create").expect("create"), 2);
    assert_eq!(response.get_i32("delete").expect("delete"), 0);

    let response = client
        .roundtrip(
            &Bulk::new(DB, COLLECTION)
                .delete(doc! { "_id": first })
                .delete(doc! { "_id": second })
                .to_document(),
        )
        .await;
    assert_eq!(response.get_i32("create").expect("create"), 0);
    assert_eq!(response.get_i32("delete").expect("delete"), 2);
}

#[tokio::test]
#[ignore = "requires a running MongoDB deployment"]
async fn count_and_distinct_answer_with_their_shapes() {
    let addr = start_server().await;
    let mut client = Client::connect(addr).await;
    let id = ObjectId::new();
    let marker = id.to_hex();

    client
        .roundtrip(
            &Create::new(DB, COLLECTION, doc! { "_id": id, "kind": "sample", "marker": &marker })
                .to_document(),
        )
        .await;

    let response = client
        .roundtrip(&Filtered::count(DB, COLLECTION, doc! { "marker": &marker }).to_document())
        .await;
    assert_eq!(response.get_i64("count").expect("count"), 1);

    let response = client
        .roundtrip(
            &Filtered::distinct(DB, COLLECTION, "kind", doc! { "marker": &marker }).to_document(),
        )
        .await;
    let values = response.get_array("values").expect("values");
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].as_str(), Some("sample"));
}
