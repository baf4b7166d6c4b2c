//! Integration tests for a to-one relationship stored as a belongs-to key.
//!
//! Posts have an `author` relationship to users, held in `posts.author_id`.

use jsonapi_schema::{
    load_definition_str, read_relationship, save_resource, JsonSchemaEngine, Linkage,
    MemoryStore, MutationError, MutationState, Operation, RelationStore, RelationshipMutation,
    Resource, ResourceDefinition, ResourceIdentifier, Verb,
};
use serde_json::{json, Value};

fn posts() -> ResourceDefinition {
    load_definition_str(
        r#"{
            "type": "posts",
            "attributes": {
                "title": { "type": "string", "required": true },
                "content": { "type": "string" }
            },
            "relationships": {
                "author": { "type": "users", "kind": "belongs-to", "foreign_key": "author_id" },
                "comments": { "type": "comments", "kind": "has-many", "foreign_key": "post_id" }
            },
            "include_paths": ["author", "comments"]
        }"#,
    )
    .unwrap()
}

fn store() -> MemoryStore {
    let mut store = MemoryStore::new()
        .with_row("users", "1", json!({ "name": "Ann" }))
        .with_row("users", "2", json!({ "name": "Bob" }))
        .with_row("comments", "1", json!({ "post_id": null }));
    store.create_table("posts");
    store
}

fn author_id(store: &MemoryStore, post: &str) -> Option<String> {
    store.column("posts", post, "author_id").unwrap()
}

fn replace(store: &mut MemoryStore, post: &str, data: Value) -> Result<(), MutationError> {
    let definition = posts();
    let mut mutation = RelationshipMutation::new(&definition, "author", Verb::Replace);
    let outcome = mutation.execute(store, post, &data)?;
    assert_eq!(outcome.state, MutationState::Applied);
    assert_eq!(outcome.status(), 204);
    Ok(())
}

mod resource_documents {
    use super::*;

    fn create(store: &mut MemoryStore, author: Value) -> String {
        let resource = Resource::from_document(&json!({
            "data": {
                "type": "posts",
                "attributes": { "title": "Hello World", "content": "..." },
                "relationships": { "author": { "data": author } }
            }
        }))
        .unwrap();

        let outcome =
            save_resource(&posts(), JsonSchemaEngine, store, &resource, Operation::Create)
                .unwrap();
        assert_eq!(outcome.status(), 201);
        outcome.id
    }

    fn update(store: &mut MemoryStore, id: &str, author: Value) {
        let resource = Resource::new("posts")
            .with_id(id)
            .with_relationship("author", author);

        let outcome =
            save_resource(&posts(), JsonSchemaEngine, store, &resource, Operation::Update(id))
                .unwrap();
        assert_eq!(outcome.status(), 200);
    }

    #[test]
    fn create_with_null() {
        let mut store = store();
        let id = create(&mut store, Value::Null);

        assert_eq!(author_id(&store, &id), None);
        assert_eq!(store.row("posts", &id).unwrap()["title"], json!("Hello World"));
    }

    #[test]
    fn create_with_related() {
        let mut store = store();
        let id = create(&mut store, json!({ "type": "users", "id": "1" }));

        assert_eq!(author_id(&store, &id).as_deref(), Some("1"));
    }

    #[test]
    fn update_replaces_relationship_with_null() {
        let mut store = store().with_row("posts", "1", json!({ "title": "A", "author_id": "1" }));
        update(&mut store, "1", Value::Null);

        assert_eq!(author_id(&store, "1"), None);
    }

    #[test]
    fn update_replaces_null_relationship_with_resource() {
        let mut store = store().with_row("posts", "1", json!({ "title": "A", "author_id": null }));
        update(&mut store, "1", json!({ "type": "users", "id": "2" }));

        assert_eq!(author_id(&store, "1").as_deref(), Some("2"));
    }

    #[test]
    fn update_changes_related_resource() {
        let mut store = store().with_row("posts", "1", json!({ "title": "A", "author_id": "1" }));
        update(&mut store, "1", json!({ "type": "users", "id": "2" }));

        assert_eq!(author_id(&store, "1").as_deref(), Some("2"));
    }

    #[test]
    fn create_with_unknown_author_writes_nothing() {
        let mut store = store();
        let before = store.clone();
        let resource = Resource::new("posts")
            .with_attribute("title", json!("Hello World"))
            .with_relationship("author", json!({ "type": "users", "id": "99" }));

        let definition = posts();
        let error =
            save_resource(&definition, JsonSchemaEngine, &mut store, &resource, Operation::Create)
                .unwrap_err();

        let MutationError::Rejected { errors } = error else {
            panic!("expected rejection");
        };
        assert_eq!(errors[0].detail, "The related resource users:99 does not exist.");
        assert_eq!(errors[0].location(), Some("/data/relationships/author"));
        assert_eq!(store, before);
    }
    #[test]
    fn foreign_key_attribute_cannot_bypass_relationship() {
        let mut store = store();
        let before = store.clone();
        let resource = Resource::from_document(&json!({
            "data": {
                "type": "posts",
                "attributes": { "title": "Hello World", "author_id": "999" }
            }
        }))
        .unwrap();

        let error =
            save_resource(&posts(), JsonSchemaEngine, &mut store, &resource, Operation::Create)
                .unwrap_err();

        let MutationError::Rejected { errors } = error else {
            panic!("expected rejection");
        };
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].status, "422");
        assert_eq!(errors[0].detail, "The author_id attribute is not recognised.");
        assert_eq!(errors[0].location(), Some("/data/attributes/author_id"));
        assert_eq!(store, before);
    }

    #[test]
    fn create_with_existing_id_is_a_conflict() {
        let mut store = store().with_row("posts", "1", json!({ "title": "A", "author_id": "1" }));
        let before = store.clone();
        let resource = Resource::new("posts")
            .with_id("1")
            .with_attribute("title", json!("Hello World"));

        let error =
            save_resource(&posts(), JsonSchemaEngine, &mut store, &resource, Operation::Create)
                .unwrap_err();

        assert_eq!(error.status(), 409);
        let MutationError::Rejected { errors } = error else {
            panic!("expected rejection");
        };
        assert_eq!(errors[0].detail, "Resource posts:1 already exists.");
        assert_eq!(errors[0].location(), Some("/data/id"));
        assert_eq!(store, before);
    }
}

mod relationship_endpoint {
    use super::*;

    #[test]
    fn read_to_one_relationship() {
        let store = store().with_row("posts", "1", json!({ "author_id": "2" }));

        let linkage = read_relationship(&posts(), &store, "1", "author").unwrap();
        assert_eq!(linkage, Linkage::One(ResourceIdentifier::new("users", "2")));
    }

    #[test]
    fn read_null_relationship() {
        let store = store().with_row("posts", "1", json!({ "author_id": null }));

        let linkage = read_relationship(&posts(), &store, "1", "author").unwrap();
        assert_eq!(linkage, Linkage::Null);
    }

    #[test]
    fn replace_null_relationship_with_related_resource() {
        let mut store = store().with_row("posts", "1", json!({ "author_id": null }));
        replace(&mut store, "1", json!({ "type": "users", "id": "1" })).unwrap();

        assert_eq!(author_id(&store, "1").as_deref(), Some("1"));
    }

    #[test]
    fn replace_relationship_with_null() {
        let mut store = store().with_row("posts", "1", json!({ "author_id": "1" }));
        replace(&mut store, "1", Value::Null).unwrap();

        assert_eq!(author_id(&store, "1"), None);

        // Clearing an already empty relationship is a no-op.
        replace(&mut store, "1", Value::Null).unwrap();
        assert_eq!(author_id(&store, "1"), None);
    }

    #[test]
    fn replace_relationship_with_different_resource() {
        let mut store = store().with_row("posts", "1", json!({ "author_id": "1" }));
        replace(&mut store, "1", json!({ "type": "users", "id": "2" })).unwrap();

        assert_eq!(author_id(&store, "1").as_deref(), Some("2"));
    }

    #[test]
    fn invalid_replace() {
        let mut store = store().with_row("posts", "1", json!({ "author_id": "1" }));
        let error = replace(&mut store, "1", json!({ "type": "comments", "id": "1" })).unwrap_err();

        let MutationError::Rejected { errors } = error else {
            panic!("expected rejection");
        };
        assert_eq!(
            serde_json::to_value(&errors).unwrap(),
            json!([{
                "status": "422",
                "detail": "The author field must be a to-one relationship containing users resources.",
                "source": { "pointer": "/data" }
            }])
        );
        assert_eq!(author_id(&store, "1").as_deref(), Some("1"));
    }

    #[test]
    fn to_many_linkage_is_rejected() {
        let mut store = store().with_row("posts", "1", json!({ "author_id": "1" }));
        let error = replace(&mut store, "1", json!([{ "type": "users", "id": "2" }])).unwrap_err();

        assert_eq!(error.status(), 422);
        assert_eq!(author_id(&store, "1").as_deref(), Some("1"));
    }

    #[test]
    fn remove_from_to_one_is_forbidden() {
        let definition = posts();
        let mut store = store().with_row("posts", "1", json!({ "author_id": "1" }));
        let mut mutation = RelationshipMutation::new(&definition, "author", Verb::Remove);

        let error = mutation
            .execute(&mut store, "1", &json!({ "type": "users", "id": "1" }))
            .unwrap_err();

        assert_eq!(error.status(), 403);
        assert_eq!(mutation.state(), MutationState::Rejected);
    }
}
