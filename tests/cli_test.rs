//! CLI integration tests for the jsonapi-schema binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("jsonapi-schema"))
}

// Helper to create a temp fixture file
fn write_temp_file(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

const POSTS: &str = r#"{
    "type": "posts",
    "attributes": {
        "title": { "type": "string", "required": true },
        "content": { "type": "string" }
    },
    "relationships": {
        "author": { "type": "users", "kind": "belongs-to", "foreign_key": "author_id" },
        "tags": {
            "type": "tags",
            "kind": "belongs-to-many",
            "pivot": "post_tag",
            "owner_key": "post_id",
            "related_key": "tag_id"
        }
    },
    "include_paths": ["author", "author.country", "tags"]
}"#;

const STORE: &str = r#"{
    "tables": {
        "posts": { "1": { "id": "1", "title": "Hello", "author_id": "1" } },
        "users": { "1": { "id": "1" }, "2": { "id": "2" } },
        "tags": { "1": { "id": "1" }, "2": { "id": "2" } },
        "post_tag": {}
    }
}"#;

mod validate_command {
    use super::*;

    #[test]
    fn valid_document() {
        let dir = TempDir::new().unwrap();
        let definition = write_temp_file(&dir, "posts.json", POSTS);
        let document = write_temp_file(
            &dir,
            "doc.json",
            r#"{"data": {"type": "posts", "attributes": {"title": "Hello"}}}"#,
        );

        cmd()
            .args(["validate", document.to_str().unwrap(), "--definition"])
            .arg(&definition)
            .assert()
            .success()
            .stdout(predicate::str::contains("Valid"));
    }

    #[test]
    fn invalid_document_exits_1() {
        let dir = TempDir::new().unwrap();
        let definition = write_temp_file(&dir, "posts.json", POSTS);
        let document = write_temp_file(
            &dir,
            "doc.json",
            r#"{"data": {"type": "posts", "attributes": {"content": "..."}}}"#,
        );

        cmd()
            .args(["validate", document.to_str().unwrap(), "--definition"])
            .arg(&definition)
            .assert()
            .code(1)
            .stderr(predicate::str::contains("The title field is required."));
    }

    #[test]
    fn json_output_contains_error_objects() {
        let dir = TempDir::new().unwrap();
        let definition = write_temp_file(&dir, "posts.json", POSTS);
        let document = write_temp_file(
            &dir,
            "doc.json",
            r#"{"data": {
                "type": "posts",
                "attributes": {},
                "relationships": {"author": {"data": {"type": "tags", "id": "1"}}}
            }}"#,
        );

        cmd()
            .args(["validate", document.to_str().unwrap(), "--json", "--collect-all"])
            .arg("--definition")
            .arg(&definition)
            .assert()
            .code(1)
            .stdout(predicate::str::contains(r#""valid":false"#))
            .stdout(predicate::str::contains(r#""pointer":"/data/attributes/title""#))
            .stdout(predicate::str::contains(
                r#""pointer":"/data/relationships/author""#,
            ));
    }

    #[test]
    fn fail_fast_by_default() {
        let dir = TempDir::new().unwrap();
        let definition = write_temp_file(&dir, "posts.json", POSTS);
        let document = write_temp_file(
            &dir,
            "doc.json",
            r#"{"data": {
                "type": "posts",
                "relationships": {"author": {"data": {"type": "tags", "id": "1"}}}
            }}"#,
        );

        cmd()
            .args(["validate", document.to_str().unwrap(), "--json", "-d"])
            .arg(&definition)
            .assert()
            .code(1)
            .stdout(predicate::str::contains("/data/relationships/author").not());
    }

    #[test]
    fn update_id_conflict() {
        let dir = TempDir::new().unwrap();
        let definition = write_temp_file(&dir, "posts.json", POSTS);
        let document = write_temp_file(
            &dir,
            "doc.json",
            r#"{"data": {"type": "posts", "id": "2", "attributes": {"title": "Hi"}}}"#,
        );

        cmd()
            .args(["validate", document.to_str().unwrap(), "--update", "1", "-d"])
            .arg(&definition)
            .assert()
            .code(1)
            .stderr(predicate::str::contains("[409] /data/id"));
    }

    #[test]
    fn update_with_store_fills_in_stored_attributes() {
        let dir = TempDir::new().unwrap();
        let definition = write_temp_file(&dir, "posts.json", POSTS);
        let store = write_temp_file(&dir, "store.json", STORE);
        let document = write_temp_file(
            &dir,
            "doc.json",
            r#"{"data": {"type": "posts", "id": "1", "attributes": {"content": "Body"}}}"#,
        );

        cmd()
            .args(["validate", document.to_str().unwrap(), "--update", "1", "-d"])
            .arg(&definition)
            .assert()
            .code(1)
            .stderr(predicate::str::contains("The title field is required."));

        cmd()
            .args(["validate", document.to_str().unwrap(), "--update", "1", "-d"])
            .arg(&definition)
            .arg("--store")
            .arg(&store)
            .assert()
            .success()
            .stdout(predicate::str::contains("Valid"));
    }

    #[test]
    fn update_with_store_missing_resource() {
        let dir = TempDir::new().unwrap();
        let definition = write_temp_file(&dir, "posts.json", POSTS);
        let store = write_temp_file(&dir, "store.json", STORE);
        let document = write_temp_file(
            &dir,
            "doc.json",
            r#"{"data": {"type": "posts", "id": "9", "attributes": {"title": "x"}}}"#,
        );

        cmd()
            .args(["validate", document.to_str().unwrap(), "--update", "9", "--json", "-d"])
            .arg(&definition)
            .arg("-s")
            .arg(&store)
            .assert()
            .code(1)
            .stdout(predicate::str::contains(r#""status":404"#));
    }

    #[test]
    fn undeclared_attribute() {
        let dir = TempDir::new().unwrap();
        let definition = write_temp_file(&dir, "posts.json", POSTS);
        let document = write_temp_file(
            &dir,
            "doc.json",
            r#"{"data": {"type": "posts", "attributes": {"title": "Hi", "author_id": "9"}}}"#,
        );

        cmd()
            .args(["validate", document.to_str().unwrap(), "-d"])
            .arg(&definition)
            .assert()
            .code(1)
            .stderr(predicate::str::contains("[422] /data/attributes/author_id"));
    }

    #[test]
    fn malformed_document_exits_2() {
        let dir = TempDir::new().unwrap();
        let definition = write_temp_file(&dir, "posts.json", POSTS);
        let document = write_temp_file(&dir, "doc.json", r#"{"data": {"type": 5}}"#);

        cmd()
            .args(["validate", document.to_str().unwrap(), "-d"])
            .arg(&definition)
            .assert()
            .code(2)
            .stderr(predicate::str::contains("/data/type"));
    }

    #[test]
    fn missing_definition_exits_3() {
        let dir = TempDir::new().unwrap();
        let document = write_temp_file(&dir, "doc.json", r#"{"data": {"type": "posts"}}"#);

        cmd()
            .args([
                "validate",
                document.to_str().unwrap(),
                "-d",
                "/nonexistent/posts.json",
            ])
            .assert()
            .code(3)
            .stderr(predicate::str::contains("file not found"));
    }

    #[test]
    fn invalid_definition_exits_2() {
        let dir = TempDir::new().unwrap();
        let definition = write_temp_file(
            &dir,
            "posts.json",
            r#"{"type": "posts", "include_paths": ["author"]}"#,
        );
        let document = write_temp_file(&dir, "doc.json", r#"{"data": {"type": "posts"}}"#);

        cmd()
            .args(["validate", document.to_str().unwrap(), "-d"])
            .arg(&definition)
            .assert()
            .code(2)
            .stderr(predicate::str::contains("invalid definition for posts"));
    }
}

mod fields_command {
    use super::*;

    #[test]
    fn prints_projection() {
        let dir = TempDir::new().unwrap();
        let definition = write_temp_file(&dir, "posts.json", POSTS);

        cmd()
            .args(["fields", "--include", "author.country,tags"])
            .args(["--fields", "posts=title,author", "--fields", "users="])
            .arg("-d")
            .arg(&definition)
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""":["author","tags"]"#))
            .stdout(predicate::str::contains(r#""author":["country"]"#))
            .stdout(predicate::str::contains(r#""posts":["author","title"]"#))
            .stdout(predicate::str::contains(r#""users":[]"#));
    }

    #[test]
    fn include_not_allowed_exits_1() {
        let dir = TempDir::new().unwrap();
        let definition = write_temp_file(&dir, "posts.json", POSTS);

        cmd()
            .args(["fields", "--include", "comments", "-d"])
            .arg(&definition)
            .assert()
            .code(1)
            .stdout(predicate::str::contains(r#""status":"400""#))
            .stdout(predicate::str::contains(r#""parameter":"include""#));
    }

    #[test]
    fn sort_not_allowed_exits_1() {
        let dir = TempDir::new().unwrap();
        let definition = write_temp_file(&dir, "posts.json", POSTS);

        cmd()
            .args(["fields", "--sort=-title", "-d"])
            .arg(&definition)
            .assert()
            .code(1)
            .stdout(predicate::str::contains("Sort parameter title is not allowed."))
            .stdout(predicate::str::contains(r#""parameter":"sort""#));
    }

    #[test]
    fn malformed_fieldset_argument() {
        let dir = TempDir::new().unwrap();
        let definition = write_temp_file(&dir, "posts.json", POSTS);

        cmd()
            .args(["fields", "--fields", "posts", "-d"])
            .arg(&definition)
            .assert()
            .code(2)
            .stderr(predicate::str::contains("expected NAME=VALUE"));
    }
}

mod mutate_command {
    use super::*;

    #[test]
    fn replace_to_one_writes_store() {
        let dir = TempDir::new().unwrap();
        let definition = write_temp_file(&dir, "posts.json", POSTS);
        let store = write_temp_file(&dir, "store.json", STORE);
        let document =
            write_temp_file(&dir, "doc.json", r#"{"data": {"type": "users", "id": "2"}}"#);
        let output = dir.path().join("out.json");

        cmd()
            .args(["mutate", document.to_str().unwrap()])
            .args(["--owner", "1", "--relationship", "author"])
            .arg("-d")
            .arg(&definition)
            .arg("--store")
            .arg(&store)
            .arg("--output")
            .arg(&output)
            .assert()
            .success()
            .stderr(predicate::str::contains("Applied (204)"));

        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(written["tables"]["posts"]["1"]["author_id"], "2");
    }

    #[test]
    fn add_to_many_prints_store() {
        let dir = TempDir::new().unwrap();
        let definition = write_temp_file(&dir, "posts.json", POSTS);
        let store = write_temp_file(&dir, "store.json", STORE);
        let document = write_temp_file(
            &dir,
            "doc.json",
            r#"{"data": [{"type": "tags", "id": "1"}, {"type": "tags", "id": "2"}]}"#,
        );

        cmd()
            .args(["mutate", document.to_str().unwrap(), "--verb", "POST"])
            .args(["--owner", "1", "-r", "tags", "-d"])
            .arg(&definition)
            .arg("-s")
            .arg(&store)
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""tag_id": "2""#));
    }

    #[test]
    fn wrong_type_is_rejected() {
        let dir = TempDir::new().unwrap();
        let definition = write_temp_file(&dir, "posts.json", POSTS);
        let store = write_temp_file(&dir, "store.json", STORE);
        let document =
            write_temp_file(&dir, "doc.json", r#"{"data": {"type": "tags", "id": "1"}}"#);

        cmd()
            .args(["mutate", document.to_str().unwrap()])
            .args(["--owner", "1", "-r", "author", "-d"])
            .arg(&definition)
            .arg("-s")
            .arg(&store)
            .assert()
            .code(1)
            .stdout(predicate::str::contains(
                "The author field must be a to-one relationship containing users resources.",
            ))
            .stdout(predicate::str::contains(r#""pointer":"/data""#));
    }

    #[test]
    fn missing_data_member() {
        let dir = TempDir::new().unwrap();
        let definition = write_temp_file(&dir, "posts.json", POSTS);
        let store = write_temp_file(&dir, "store.json", STORE);
        let document = write_temp_file(&dir, "doc.json", r#"{"meta": {}}"#);

        cmd()
            .args(["mutate", document.to_str().unwrap()])
            .args(["--owner", "1", "-r", "author", "-d"])
            .arg(&definition)
            .arg("-s")
            .arg(&store)
            .assert()
            .code(2)
            .stdout(predicate::str::contains("top-level data member"));
    }

    #[test]
    fn unknown_verb() {
        cmd()
            .args(["mutate", "doc.json", "-d", "posts.json", "-s", "store.json"])
            .args(["--owner", "1", "-r", "author", "--verb", "put"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("unknown verb"));
    }
}

mod save_command {
    use super::*;

    #[test]
    fn create_assigns_id() {
        let dir = TempDir::new().unwrap();
        let definition = write_temp_file(&dir, "posts.json", POSTS);
        let store = write_temp_file(&dir, "store.json", STORE);
        let document = write_temp_file(
            &dir,
            "doc.json",
            r#"{"data": {
                "type": "posts",
                "attributes": {"title": "Second"},
                "relationships": {"tags": {"data": [{"type": "tags", "id": "2"}]}}
            }}"#,
        );

        cmd()
            .args(["save", document.to_str().unwrap(), "-d"])
            .arg(&definition)
            .arg("-s")
            .arg(&store)
            .assert()
            .success()
            .stderr(predicate::str::contains("Saved 2 (201)"))
            .stdout(predicate::str::contains(r#""title": "Second""#));
    }

    #[test]
    fn update_missing_resource_is_not_found() {
        let dir = TempDir::new().unwrap();
        let definition = write_temp_file(&dir, "posts.json", POSTS);
        let store = write_temp_file(&dir, "store.json", STORE);
        let document = write_temp_file(
            &dir,
            "doc.json",
            r#"{"data": {"type": "posts", "id": "7", "attributes": {"title": "x"}}}"#,
        );

        cmd()
            .args(["save", document.to_str().unwrap(), "--update", "7", "-d"])
            .arg(&definition)
            .arg("-s")
            .arg(&store)
            .assert()
            .code(1)
            .stdout(predicate::str::contains(r#""status":404"#));
    }
}

mod read_command {
    use super::*;

    const TAGS: &str = r#"{
        "type": "tags",
        "attributes": { "name": { "type": "string" } },
        "sort_fields": ["name"],
        "filters": ["name"]
    }"#;

    const TAGGED: &str = r#"{
        "tables": {
            "posts": { "1": { "id": "1", "title": "Hello", "author_id": null } },
            "tags": {
                "1": { "id": "1", "name": "rust" },
                "2": { "id": "2", "name": "json" },
                "3": { "id": "3", "name": "jsonapi" }
            },
            "post_tag": {
                "1": { "id": "1", "post_id": "1", "tag_id": "1" },
                "2": { "id": "2", "post_id": "1", "tag_id": "2" },
                "3": { "id": "3", "post_id": "1", "tag_id": "3" }
            }
        }
    }"#;

    #[test]
    fn to_one_linkage() {
        let dir = TempDir::new().unwrap();
        let definition = write_temp_file(&dir, "posts.json", POSTS);
        let store = write_temp_file(&dir, "store.json", STORE);

        cmd()
            .args(["read", "--owner", "1", "-r", "author", "-d"])
            .arg(&definition)
            .arg("-s")
            .arg(&store)
            .assert()
            .success()
            .stdout(predicate::str::contains(r#"{"data":{"type":"users","id":"1"}}"#));
    }

    #[test]
    fn empty_to_many_linkage() {
        let dir = TempDir::new().unwrap();
        let definition = write_temp_file(&dir, "posts.json", POSTS);
        let store = write_temp_file(&dir, "store.json", STORE);

        cmd()
            .args(["read", "--owner", "1", "-r", "tags", "-d"])
            .arg(&definition)
            .arg("-s")
            .arg(&store)
            .assert()
            .success()
            .stdout(predicate::str::contains(r#"{"data":[]}"#));
    }

    #[test]
    fn related_with_query() {
        let dir = TempDir::new().unwrap();
        let definition = write_temp_file(&dir, "posts.json", POSTS);
        let tags = write_temp_file(&dir, "tags.json", TAGS);
        let store = write_temp_file(&dir, "store.json", TAGGED);

        cmd()
            .args(["read", "--owner", "1", "-r", "tags", "-d"])
            .arg(&definition)
            .arg("-s")
            .arg(&store)
            .arg("--related")
            .arg(&tags)
            .args(["--query", "filter[name]=json", "--query", "sort=-name"])
            .assert()
            .success()
            .stdout(predicate::str::contains(
                r#"{"data":[{"type":"tags","id":"3","attributes":{"name":"jsonapi"}},"#,
            ))
            .stdout(predicate::str::contains("rust").not());
    }

    #[test]
    fn related_with_invalid_page() {
        let dir = TempDir::new().unwrap();
        let definition = write_temp_file(&dir, "posts.json", POSTS);
        let tags = write_temp_file(&dir, "tags.json", TAGS);
        let store = write_temp_file(&dir, "store.json", TAGGED);

        cmd()
            .args(["read", "--owner", "1", "-r", "tags", "-d"])
            .arg(&definition)
            .arg("-s")
            .arg(&store)
            .arg("--related")
            .arg(&tags)
            .args(["--query", "page[number]=0"])
            .assert()
            .code(1)
            .stdout(predicate::str::contains(r#""parameter":"page.number""#));
    }

    #[test]
    fn unknown_relationship_is_not_found() {
        let dir = TempDir::new().unwrap();
        let definition = write_temp_file(&dir, "posts.json", POSTS);
        let store = write_temp_file(&dir, "store.json", STORE);

        cmd()
            .args(["read", "--owner", "1", "-r", "likes", "-d"])
            .arg(&definition)
            .arg("-s")
            .arg(&store)
            .assert()
            .code(1)
            .stdout(predicate::str::contains(r#""status":404"#));
    }
}
