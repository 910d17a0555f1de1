use bson::{doc, oid::ObjectId};
use rstest::rstest;

use super::{dispatch, options};
use crate::config::Settings;
use crate::db::Store;
use crate::protocol::Request;

/// A store handle that never reaches a server: the driver connects
/// lazily and the pool creates no eager sessions, so rejection paths can
/// be exercised without a backing store.
async fn offline_store() -> Store {
    let mut settings = Settings::default();
    settings.mongo_uri = "mongodb://localhost:27017".to_owned();
    settings.pool.initial_size = 0;
    Store::connect(&settings).await.expect("offline store")
}

fn request(envelope: bson::Document) -> Request {
    Request::from_document(&envelope).expect("valid envelope")
}

#[rstest]
#[case::create("create", doc! { "_id": ObjectId::new() })]
#[case::create_timeseries("createTimeseries", doc! { "value": 1 })]
#[case::update("update", doc! { "_id": ObjectId::new(), "k": 1 })]
#[case::delete("delete", doc! { "_id": ObjectId::new() })]
#[case::bulk("bulk", doc! { "insert": [ { "_id": ObjectId::new() } ] })]
#[tokio::test]
async fn mutations_may_not_target_the_history_location(
    #[case] action: &str,
    #[case] document: bson::Document,
) {
    let store = offline_store().await;
    let envelope = doc! {
        "action": action,
        "database": "versionHistory",
        "collection": "entities",
        "document": document,
    };
    let response = dispatch(&store, &request(envelope)).await;
    assert_eq!(
        response.get_str("error").expect("error"),
        "Invalid database action"
    );
}

#[rstest]
#[tokio::test]
async fn reads_of_the_history_location_are_allowed_to_route() {
    let store = offline_store().await;
    // A retrieve of the history location passes the dispatcher's
    // forbidden-target check; the empty filter is then rejected by the
    // handler itself, without touching the backing store.
    let envelope = doc! {
        "action": "retrieve",
        "database": "versionHistory",
        "collection": "entities",
        "document": {},
    };
    let response = dispatch(&store, &request(envelope)).await;
    assert_ne!(
        response.get_str("error").expect("error"),
        "Invalid database action"
    );
}

#[rstest]
#[tokio::test]
async fn create_requires_a_document_id() {
    let store = offline_store().await;
    let envelope = doc! {
        "action": "create",
        "database": "itest",
        "collection": "test",
        "document": { "key": "value" },
    };
    let response = dispatch(&store, &request(envelope)).await;
    assert_eq!(
        response.get_str("error").expect("error"),
        "Document id not specified"
    );
}

#[rstest]
#[case(doc! {})]
#[case(doc! { "key": "value" })]
#[case(doc! { "filter": { "k": 1 } })]
#[tokio::test]
async fn update_rejects_unrecognised_shapes(#[case] document: bson::Document) {
    let store = offline_store().await;
    let envelope = doc! {
        "action": "update",
        "database": "itest",
        "collection": "test",
        "document": document,
    };
    let response = dispatch(&store, &request(envelope)).await;
    assert_eq!(
        response.get_str("error").expect("error"),
        "Invalid update payload"
    );
}

#[rstest]
#[tokio::test]
async fn retrieve_requires_a_filter() {
    let store = offline_store().await;
    let envelope = doc! {
        "action": "retrieve",
        "database": "itest",
        "collection": "test",
        "document": {},
    };
    let response = dispatch(&store, &request(envelope)).await;
    assert_eq!(
        response.get_str("error").expect("error"),
        "Missing required field(s) in payload"
    );
}

#[rstest]
#[tokio::test]
async fn distinct_requires_a_field_name() {
    let store = offline_store().await;
    let envelope = doc! {
        "action": "distinct",
        "database": "itest",
        "collection": "test",
        "document": { "filter": {} },
    };
    let response = dispatch(&store, &request(envelope)).await;
    let fields = response.get_array("fields").expect("fields");
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].as_str(), Some("document.field"));
}

#[rstest]
#[tokio::test]
async fn pipeline_requires_a_specification() {
    let store = offline_store().await;
    let envelope = doc! {
        "action": "pipeline",
        "database": "itest",
        "collection": "test",
        "document": {},
    };
    let response = dispatch(&store, &request(envelope)).await;
    let fields = response.get_array("fields").expect("fields");
    assert_eq!(fields[0].as_str(), Some("document.specification"));
}

#[rstest]
#[tokio::test]
async fn pipeline_rejects_non_document_stages() {
    let store = offline_store().await;
    let envelope = doc! {
        "action": "pipeline",
        "database": "itest",
        "collection": "test",
        "document": { "specification": [ 42 ] },
    };
    let response = dispatch(&store, &request(envelope)).await;
    assert_eq!(
        response.get_str("error").expect("error"),
        "Invalid pipeline stage"
    );
}

#[rstest]
#[tokio::test]
async fn transaction_requires_items() {
    let store = offline_store().await;
    let envelope = doc! {
        "action": "transaction",
        "database": "itest",
        "collection": "test",
        "document": {},
    };
    let response = dispatch(&store, &request(envelope)).await;
    let fields = response.get_array("fields").expect("fields");
    assert_eq!(fields[0].as_str(), Some("document.items"));
}

#[rstest]
#[tokio::test]
async fn bulk_requires_at_least_one_batch() {
    let store = offline_store().await;
    let envelope = doc! {
        "action": "bulk",
        "database": "itest",
        "collection": "test",
        "document": {},
    };
    let response = dispatch(&store, &request(envelope)).await;
    assert!(response.get_str("error").is_ok());
}

mod option_parsing {
    use std::time::Duration;

    use mongodb::options::{Acknowledgment, Hint};

    use super::*;

    #[rstest]
    fn write_concern_defaults_to_majority() {
        let concern = options::write_concern(&doc! {}).expect("concern");
        assert_eq!(concern.w, Some(Acknowledgment::Majority));
        assert!(options::acknowledged(Some(&concern)));
    }

    #[rstest]
    fn write_concern_maps_the_legacy_levels() {
        let unacknowledged =
            options::write_concern(&doc! { "acknowledgeLevel": 3 }).expect("concern");
        assert_eq!(unacknowledged.w, Some(Acknowledgment::Nodes(0)));
        assert!(!options::acknowledged(Some(&unacknowledged)));

        let acknowledged =
            options::write_concern(&doc! { "acknowledgeLevel": 4 }).expect("concern");
        assert_eq!(acknowledged.w, Some(Acknowledgment::Nodes(1)));
    }

    #[rstest]
    fn write_concern_honours_journal_nodes_and_timeout() {
        let concern = options::write_concern(&doc! {
            "journal": true,
            "nodes": 2,
            "timeout": 1500_i64,
        })
        .expect("concern");
        assert_eq!(concern.journal, Some(true));
        assert_eq!(concern.w, Some(Acknowledgment::Nodes(2)));
        assert_eq!(concern.w_timeout, Some(Duration::from_millis(1500)));
    }

    #[rstest]
    fn write_concern_tag_takes_precedence() {
        let concern =
            options::write_concern(&doc! { "nodes": 2, "tag": "reporting" }).expect("concern");
        assert_eq!(concern.w, Some(Acknowledgment::Custom("reporting".to_owned())));
    }

    #[rstest]
    fn find_options_cover_the_wire_surface() {
        let source = doc! {
            "partialResults": true,
            "batchSize": 16,
            "comment": "test query",
            "hint": { "key": 1 },
            "limit": 25_i64,
            "maxTime": 250_i64,
            "projection": { "key": 1 },
            "returnKey": false,
            "showRecordId": true,
            "skip": 5_i64,
            "sort": { "key": -1 },
        };
        let opts = options::find(Some(&source)).expect("options");
        assert_eq!(opts.allow_partial_results, Some(true));
        assert_eq!(opts.batch_size, Some(16));
        assert_eq!(opts.comment.as_deref(), Some("test query"));
        assert!(matches!(opts.hint, Some(Hint::Keys(_))));
        assert_eq!(opts.limit, Some(25));
        assert_eq!(opts.max_time, Some(Duration::from_millis(250)));
        assert_eq!(opts.projection, Some(doc! { "key": 1 }));
        assert_eq!(opts.return_key, Some(false));
        assert_eq!(opts.show_record_id, Some(true));
        assert_eq!(opts.skip, Some(5));
        assert_eq!(opts.sort, Some(doc! { "key": -1 }));
    }

    #[rstest]
    fn string_hints_map_to_index_names() {
        let opts = options::count(Some(&doc! { "hint": "key_1" })).expect("options");
        assert!(matches!(opts.hint, Some(Hint::Name(name)) if name == "key_1"));
    }

    #[rstest]
    fn read_preference_rejects_unknown_modes() {
        assert!(options::find(Some(&doc! { "readPreference": 9 })).is_err());
    }

    #[rstest]
    fn mistyped_option_values_are_errors() {
        assert!(options::find(Some(&doc! { "limit": "ten" })).is_err());
        assert!(options::insert_one(Some(&doc! { "bypassValidation": 1 })).is_err());
    }

    #[rstest]
    fn index_options_cover_the_wire_surface() {
        let source = doc! {
            "name": "ttl_idx",
            "unique": true,
            "sparse": true,
            "hidden": false,
            "background": true,
            "expireAfterSeconds": 3600_i64,
            "partialFilterExpression": { "active": true },
        };
        let opts = options::index(Some(&source)).expect("options");
        assert_eq!(opts.name.as_deref(), Some("ttl_idx"));
        assert_eq!(opts.unique, Some(true));
        assert_eq!(opts.sparse, Some(true));
        assert_eq!(opts.hidden, Some(false));
        assert_eq!(opts.background, Some(true));
        assert_eq!(opts.expire_after, Some(Duration::from_secs(3600)));
        assert_eq!(
            opts.partial_filter_expression,
            Some(doc! { "active": true })
        );
    }

    #[rstest]
    fn create_collection_options_parse_validation_settings() {
        let source = doc! {
            "capped": true,
            "size": 1024_i64,
            "max": 100_i64,
            "validationLevel": "strict",
            "validationAction": "warn",
        };
        let opts = options::create_collection(Some(&source)).expect("options");
        assert_eq!(opts.capped, Some(true));
        assert_eq!(opts.size, Some(1024));
        assert_eq!(opts.max, Some(100));
        assert!(opts.validation_level.is_some());
        assert!(opts.validation_action.is_some());
    }

    #[rstest]
    fn create_collection_rejects_unknown_validation_levels() {
        assert!(
            options::create_collection(Some(&doc! { "validationLevel": "sometimes" })).is_err()
        );
    }
}
