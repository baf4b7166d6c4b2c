//! JSON:API Schema CLI
//!
//! Command-line interface for validating JSON:API documents and applying
//! relationship mutations against a JSON fixture store.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use jsonapi_schema::{
    load_definition_auto, load_json, merge_stored_attributes, read_related, read_relationship,
    relationship_document_data, resolve_fields, save_resource, DefaultErrorFactory,
    ErrorDocument, ErrorFactory, ErrorObject, JsonSchemaEngine, MemoryStore, MutationError,
    Operation, QueryParameters, RelationshipMutation, Resource, ResourceDefinition,
    ResourceValidator, StoreError, ValidationPolicy, Verb,
};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "jsonapi-schema")]
#[command(about = "Validate JSON:API resources and apply relationship mutations")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a resource document against a resource definition
    Validate {
        /// Resource document file
        document: PathBuf,

        /// Definition source: file path or URL (http:// or https://)
        #[arg(long, short)]
        definition: String,

        /// Validate as an update of the resource with this id (default: create)
        #[arg(long)]
        update: Option<String>,

        /// Store fixture file; with --update, stored values fill in omitted attributes
        #[arg(long, short)]
        store: Option<PathBuf>,

        /// Report attribute and relationship errors together
        #[arg(long)]
        collect_all: bool,

        /// Output results as JSON (for automation)
        #[arg(long)]
        json: bool,
    },

    /// Check include and fields parameters and print the projection
    Fields {
        /// Definition source: file path or URL (http:// or https://)
        #[arg(long, short)]
        definition: String,

        /// Comma-separated include paths
        #[arg(long)]
        include: Option<String>,

        /// Sparse fieldset as TYPE=FIELDS (repeatable)
        #[arg(long = "fields", value_name = "TYPE=FIELDS")]
        fieldsets: Vec<String>,

        /// Comma-separated sort fields, `-` prefixed for descending
        #[arg(long)]
        sort: Option<String>,

        /// Filter as KEY=VALUE (repeatable)
        #[arg(long = "filter", value_name = "KEY=VALUE")]
        filters: Vec<String>,
    },

    /// Print a relationship's linkage, or its related resources with --related
    Read {
        /// Definition source: file path or URL (http:// or https://)
        #[arg(long, short)]
        definition: String,

        /// Store fixture file
        #[arg(long, short)]
        store: PathBuf,

        /// Id of the resource owning the relationship
        #[arg(long)]
        owner: String,

        /// Relationship name
        #[arg(long, short)]
        relationship: String,

        /// Definition of the related resource type
        #[arg(long)]
        related: Option<String>,

        /// Query parameter as KEY=VALUE, e.g. sort=-name or page[size]=10 (repeatable)
        #[arg(long = "query", value_name = "KEY=VALUE")]
        query: Vec<String>,
    },

    /// Replace, add to or remove from a relationship in a fixture store
    Mutate {
        /// Relationship document file ({"data": linkage})
        document: PathBuf,

        /// Definition source: file path or URL (http:// or https://)
        #[arg(long, short)]
        definition: String,

        /// Store fixture file
        #[arg(long, short)]
        store: PathBuf,

        /// Id of the resource owning the relationship
        #[arg(long)]
        owner: String,

        /// Relationship name
        #[arg(long, short)]
        relationship: String,

        /// replace (PATCH), add (POST) or remove (DELETE)
        #[arg(long, default_value = "replace", value_parser = parse_verb)]
        verb: Verb,

        /// Output file for the updated store (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Validate a resource document and save it into a fixture store
    Save {
        /// Resource document file
        document: PathBuf,

        /// Definition source: file path or URL (http:// or https://)
        #[arg(long, short)]
        definition: String,

        /// Store fixture file
        #[arg(long, short)]
        store: PathBuf,

        /// Update the resource with this id (default: create)
        #[arg(long)]
        update: Option<String>,

        /// Output file for the updated store (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn parse_verb(s: &str) -> Result<Verb, String> {
    Verb::parse(s).ok_or_else(|| format!("unknown verb: {}", s))
}

fn main() -> ExitCode {
    setup_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate {
            document,
            definition,
            update,
            store,
            collect_all,
            json,
        } => run_validate(ValidateArgs {
            document,
            definition,
            update,
            store,
            collect_all,
            json,
        }),

        Commands::Fields {
            definition,
            include,
            fieldsets,
            sort,
            filters,
        } => run_fields(&definition, include, &fieldsets, sort, &filters),

        Commands::Read {
            definition,
            store,
            owner,
            relationship,
            related,
            query,
        } => run_read(ReadArgs {
            definition,
            store,
            owner,
            relationship,
            related,
            query,
        }),

        Commands::Mutate {
            document,
            definition,
            store,
            owner,
            relationship,
            verb,
            output,
        } => run_mutate(MutateArgs {
            document,
            definition,
            store,
            owner,
            relationship,
            verb,
            output,
        }),

        Commands::Save {
            document,
            definition,
            store,
            update,
            output,
        } => run_save(&document, &definition, &store, update.as_deref(), output),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

/// Log to stderr, filtered by `RUST_LOG`.
fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}

struct ValidateArgs {
    document: PathBuf,
    definition: String,
    update: Option<String>,
    store: Option<PathBuf>,
    collect_all: bool,
    json: bool,
}

fn run_validate(args: ValidateArgs) -> Result<(), u8> {
    let ValidateArgs {
        document: document_path,
        definition: definition_source,
        update,
        store: store_path,
        collect_all,
        json: json_output,
    } = args;

    let definition = load_definition(&definition_source, json_output)?;
    let mut resource = load_resource(&document_path, json_output)?;

    let operation = match update.as_deref() {
        Some(id) => Operation::Update(id),
        None => Operation::Create,
    };

    // Without a store an update is checked against the submitted attributes only.
    if let (Operation::Update(id), Some(path)) = (operation, store_path.as_deref()) {
        let store = load_store(path)?;
        resource = match merge_stored_attributes(&definition, &store, &resource, id) {
            Ok(merged) => merged,
            Err(MutationError::Store(
                StoreError::MissingRow { .. } | StoreError::UnknownTable { .. },
            )) => {
                let error = DefaultErrorFactory.resource_not_found(&definition.resource_type, id);
                return report_invalid(ErrorDocument::new(vec![error]), json_output);
            }
            Err(e) => {
                report_error(json_output, &e.to_string());
                return Err(e.exit_code() as u8);
            }
        };
    }

    let mut validator = ResourceValidator::new(&definition, JsonSchemaEngine);
    if collect_all {
        validator = validator.policy(ValidationPolicy::CollectAll);
    }

    let valid = validator.validate(&resource, operation).map_err(|e| {
        report_error(json_output, &e.to_string());
        2u8
    })?;

    if valid {
        if json_output {
            println!(r#"{{"valid":true}}"#);
        } else {
            println!("Valid");
        }
        return Ok(());
    }

    report_invalid(ErrorDocument::new(validator.take_errors()), json_output)
}

fn report_invalid(document: ErrorDocument, json_output: bool) -> Result<(), u8> {
    if json_output {
        let output = json!({
            "valid": false,
            "status": document.status(),
            "errors": document.errors
        });
        println!("{}", output);
    } else {
        eprintln!("Validation failed ({}):", document.status());
        for error in &document.errors {
            eprintln!("  {}", error);
        }
    }
    Err(1)
}

fn run_fields(
    definition_source: &str,
    include: Option<String>,
    fieldsets: &[String],
    sort: Option<String>,
    filters: &[String],
) -> Result<(), u8> {
    let definition = load_definition(definition_source, false)?;

    let mut pairs = Vec::new();
    if let Some(include) = include {
        pairs.push(("include".to_string(), include));
    }
    if let Some(sort) = sort {
        pairs.push(("sort".to_string(), sort));
    }
    for (family, entries) in [("fields", fieldsets), ("filter", filters)] {
        for entry in entries {
            let (name, value) = split_pair(entry)?;
            pairs.push((format!("{}[{}]", family, name), value.to_string()));
        }
    }

    let query = QueryParameters::from_pairs(pairs)
        .and_then(|query| resolve_fields(&definition, &query).map(|fields| (query, fields)));

    let (query, fields) = match query {
        Ok(resolved) => resolved,
        Err(e) => {
            print_error_document(vec![e.to_error_object()]);
            return Err(1);
        }
    };

    // Every include path contributes itself and its parents as prefixes.
    let mut prefixes = vec![String::new()];
    for path in query.include_paths() {
        let segments: Vec<&str> = path.split('.').collect();
        for depth in 1..segments.len() {
            let prefix = segments[..depth].join(".");
            if !prefixes.contains(&prefix) {
                prefixes.push(prefix);
            }
        }
    }

    let include: serde_json::Map<String, Value> = prefixes
        .into_iter()
        .map(|prefix| {
            let children = fields.requested_relationships(&prefix).clone();
            (prefix, json!(children))
        })
        .collect();

    let fieldsets: serde_json::Map<String, Value> = query
        .fieldsets()
        .keys()
        .map(|resource_type| {
            let requested = fields.requested_fields(resource_type).cloned();
            (resource_type.clone(), json!(requested.unwrap_or_default()))
        })
        .collect();

    println!("{}", json!({ "include": include, "fields": fieldsets }));
    Ok(())
}

struct ReadArgs {
    definition: String,
    store: PathBuf,
    owner: String,
    relationship: String,
    related: Option<String>,
    query: Vec<String>,
}

fn run_read(args: ReadArgs) -> Result<(), u8> {
    let definition = load_definition(&args.definition, false)?;
    let store = load_store(&args.store)?;

    let Some(related_source) = args.related else {
        return match read_relationship(&definition, &store, &args.owner, &args.relationship) {
            Ok(linkage) => {
                println!("{}", json!({ "data": linkage }));
                Ok(())
            }
            Err(e) => Err(report_mutation_error(e)),
        };
    };

    let related = load_definition(&related_source, false)?;
    let pairs = args
        .query
        .iter()
        .map(|entry| split_pair(entry).map(|(key, value)| (key.to_string(), value.to_string())))
        .collect::<Result<Vec<_>, u8>>()?;
    let query = QueryParameters::from_pairs(pairs).map_err(|e| {
        print_error_document(vec![e.to_error_object()]);
        1u8
    })?;

    let resources = read_related(
        &definition,
        &related,
        &store,
        &args.owner,
        &args.relationship,
        &query,
    )
    .map_err(report_mutation_error)?;

    let data: Vec<Value> = resources
        .into_iter()
        .map(|resource| {
            let mut attributes = resource.row;
            attributes.remove("id");
            json!({
                "type": resource.identifier.resource_type,
                "id": resource.identifier.id,
                "attributes": attributes
            })
        })
        .collect();
    println!("{}", json!({ "data": data }));
    Ok(())
}

fn split_pair(entry: &str) -> Result<(&str, &str), u8> {
    entry.split_once('=').ok_or_else(|| {
        eprintln!("Error: expected NAME=VALUE, got {}", entry);
        2u8
    })
}

struct MutateArgs {
    document: PathBuf,
    definition: String,
    store: PathBuf,
    owner: String,
    relationship: String,
    verb: Verb,
    output: Option<PathBuf>,
}

fn run_mutate(args: MutateArgs) -> Result<(), u8> {
    let MutateArgs {
        document: document_path,
        definition: definition_source,
        store: store_path,
        owner,
        relationship,
        verb,
        output,
    } = args;

    let definition = load_definition(&definition_source, false)?;
    let mut store = load_store(&store_path)?;

    let document = load_json(&document_path).map_err(|e| {
        eprintln!("Error loading document: {}", e);
        e.exit_code() as u8
    })?;
    let data = relationship_document_data(&document).map_err(|e| {
        print_error_document(vec![e.to_error_object()]);
        e.exit_code() as u8
    })?;

    let mut mutation = RelationshipMutation::new(&definition, relationship, verb);
    match mutation.execute(&mut store, &owner, data) {
        Ok(outcome) => {
            eprintln!(
                "Applied ({}): {} associated, {} disassociated",
                outcome.status(),
                outcome.delta.associated.len(),
                outcome.delta.disassociated.len()
            );
            write_store(&store, output.as_deref())
        }
        Err(e) => Err(report_mutation_error(e)),
    }
}

fn run_save(
    document_path: &Path,
    definition_source: &str,
    store_path: &Path,
    update: Option<&str>,
    output: Option<PathBuf>,
) -> Result<(), u8> {
    let definition = load_definition(definition_source, false)?;
    let resource = load_resource(document_path, false)?;
    let mut store = load_store(store_path)?;

    let operation = match update {
        Some(id) => Operation::Update(id),
        None => Operation::Create,
    };

    match save_resource(&definition, JsonSchemaEngine, &mut store, &resource, operation) {
        Ok(outcome) => {
            eprintln!("Saved {} ({})", outcome.id, outcome.status());
            write_store(&store, output.as_deref())
        }
        Err(e) => Err(report_mutation_error(e)),
    }
}

fn load_definition(source: &str, json_output: bool) -> Result<ResourceDefinition, u8> {
    load_definition_auto(source).map_err(|e| {
        report_error(json_output, &format!("loading definition: {}", e));
        e.exit_code() as u8
    })
}

fn load_resource(path: &Path, json_output: bool) -> Result<Resource, u8> {
    let document = load_json(path).map_err(|e| {
        report_error(json_output, &format!("loading document: {}", e));
        e.exit_code() as u8
    })?;

    Resource::from_document(&document).map_err(|e| {
        if json_output {
            let output = json!({ "valid": false, "errors": [e.to_error_object()] });
            println!("{}", output);
        } else {
            eprintln!("Error: {}", e);
        }
        e.exit_code() as u8
    })
}

fn load_store(path: &Path) -> Result<MemoryStore, u8> {
    let value = load_json(path).map_err(|e| {
        eprintln!("Error loading store: {}", e);
        e.exit_code() as u8
    })?;

    serde_json::from_value(value).map_err(|e| {
        eprintln!("Error: invalid store: {}", e);
        2u8
    })
}

fn write_store(store: &MemoryStore, output: Option<&Path>) -> Result<(), u8> {
    let rendered = serde_json::to_string_pretty(store).map_err(|e| {
        eprintln!("Error serializing store: {}", e);
        2u8
    })?;

    match output {
        Some(path) => std::fs::write(path, &rendered).map_err(|e| {
            eprintln!("Error writing to {}: {}", path.display(), e);
            3u8
        }),
        None => {
            println!("{}", rendered);
            Ok(())
        }
    }
}

fn report_mutation_error(error: MutationError) -> u8 {
    let code = error.exit_code() as u8;
    match error {
        MutationError::Rejected { errors } => {
            let document = ErrorDocument::new(errors);
            eprintln!("Rejected ({}):", document.status());
            for error in &document.errors {
                eprintln!("  {}", error);
            }
            print_error_document(document.errors);
        }
        other => eprintln!("Error: {}", other),
    }
    code
}

fn print_error_document(errors: Vec<ErrorObject>) {
    let document = ErrorDocument::new(errors);
    let output = json!({ "status": document.status(), "errors": document.errors });
    println!("{}", output);
}

/// Output an error message in plain text or JSON format.
fn report_error(json_output: bool, msg: &str) {
    if json_output {
        println!("{}", json!({ "valid": false, "error": msg }));
    } else {
        eprintln!("Error: {}", msg);
    }
}
