//! End-to-end tests: template text in, bound statements out.

use pretty_assertions::assert_eq;
use sqltpl::prelude::*;

const SERVERS: &str = r#"
-- Servers and their lookups.

-- name: get_server
-- docs: Gets a server by hostname.
SELECT * FROM server WHERE hostname = :hostname;

-- name: get_servers
SELECT *
  FROM server
 WHERE hostname IN ( :hostnames ) -- comma separated
;

-- name: get_hostnames
SELECT hostname FROM server

-- name: get_servers_by_hostnames
-- docs: Composes a sub-select passed in as a reference.
SELECT * FROM server WHERE hostname IN ( :hostnames )

-- name: recent_servers
SELECT * FROM server
 WHERE created_at > :since::timestamptz
   AND location = :location
 :_order_by
 LIMIT :limit
"#;

const PEOPLE: &str = "
-- name: legal_age
age >= 18

-- name: sql_and
AND

-- name: name_like
name LIKE :name

-- name: by_location
location = :location

-- name: adults_in
SELECT * FROM person WHERE :legal_age AND :by_location AND id > :min_id

-- name: filtered
SELECT * FROM person WHERE :where
";

fn servers() -> QuerySet {
    QuerySet::parse(SERVERS).unwrap()
}

fn people() -> QuerySet {
    QuerySet::parse(PEOPLE).unwrap()
}

#[test]
fn test_scalar_parameter() {
    let query = servers()
        .expand("get_server", &Params::new().with("hostname", "localhost"), &Options::default())
        .unwrap();
    assert_eq!(
        query,
        Query {
            statement: "SELECT * FROM server WHERE hostname = $1".to_string(),
            arguments: vec![Scalar::from("localhost")],
        }
    );
}

#[test]
fn test_missing_parameter_report() {
    let err = servers()
        .expand("get_server", &Params::new(), &Options::default())
        .unwrap_err();
    assert_eq!(
        err,
        Unbound {
            statement: "SELECT * FROM server WHERE hostname = <missing hostname>".to_string(),
            arguments: vec![],
            errors: vec![ParamError::not_found("hostname")],
        }
    );
}

#[test]
fn test_in_list_expansion() {
    let params = Params::new().with_in("hostnames", ["server0", "server1"]);
    let query = servers().expand("get_servers", &params, &Options::default()).unwrap();
    assert_eq!(query.statement, "SELECT * FROM server WHERE hostname IN ( $1,$2 )");
    assert_eq!(query.arguments, vec![Scalar::from("server0"), Scalar::from("server1")]);
}

#[test]
fn test_query_reference_composition() {
    let set = servers();
    let hostnames = set.reference("get_hostnames").unwrap();
    let query = set
        .expand(
            "get_servers_by_hostnames",
            &Params::new().with("hostnames", hostnames),
            &Options::default(),
        )
        .unwrap();
    assert_eq!(
        query.statement,
        "SELECT * FROM server WHERE hostname IN ( SELECT hostname FROM server )"
    );
    assert!(query.arguments.is_empty());
}

#[test]
fn test_reference_across_sets() {
    let people = people();
    let servers = servers();
    let by_location = people.reference("by_location").unwrap();
    let query = servers
        .expand(
            "get_server",
            &Params::new().with("hostname", by_location).with("location", "eu"),
            &Options::default(),
        )
        .unwrap();
    assert_eq!(query.statement, "SELECT * FROM server WHERE hostname = location = $1");
    assert_eq!(query.arguments, vec![Scalar::from("eu")]);
}

#[test]
fn test_cast_and_optional_fragment() {
    let params = Params::new()
        .with("since", "2024-01-01")
        .with("location", "eu")
        .with("limit", 10);
    let query = servers().expand("recent_servers", &params, &Options::default()).unwrap();
    assert_eq!(
        query.statement,
        "SELECT * FROM server WHERE created_at > $1::timestamptz AND location = $2 LIMIT $3"
    );
    assert_eq!(query.arguments.len(), 3);
}

#[test]
fn test_optional_fragment_as_reference() {
    let order = QueryRef::new("order_by", |_: &Params, _: &Options| {
        Ok(Query {
            statement: "ORDER BY created_at DESC".to_string(),
            arguments: vec![],
        })
    });
    let params = Params::new()
        .with("since", "2024-01-01")
        .with("location", "eu")
        .with("_order_by", order)
        .with("limit", 10);
    let query = servers().expand("recent_servers", &params, &Options::default()).unwrap();
    assert_eq!(
        query.statement,
        "SELECT * FROM server WHERE created_at > $1::timestamptz AND location = $2 ORDER BY created_at DESC LIMIT $3"
    );
}

#[test]
fn test_inner_composition() {
    let where_clause = Value::inner(
        [
            QueryCall::name("legal_age"),
            QueryCall::name("sql_and"),
            QueryCall::name("name_like").with_params(Params::new().with("name", "Alice%")),
        ],
        " ",
    );
    let query = people()
        .expand("filtered", &Params::new().with("where", where_clause), &Options::default())
        .unwrap();
    assert_eq!(
        query.statement,
        "SELECT * FROM person WHERE age >= 18 AND name LIKE $1"
    );
    assert_eq!(query.arguments, vec![Scalar::from("Alice%")]);
}

#[test]
fn test_inner_composition_with_separator_and_shared_index() {
    let where_clause = Value::inner(["name_like", "by_location"], " OR ");
    let params = Params::new()
        .with("where", where_clause)
        .with("name", "A%")
        .with("location", "eu");
    let query = people()
        .expand("filtered", &params, &Options::new().index(2))
        .unwrap();
    assert_eq!(
        query.statement,
        "SELECT * FROM person WHERE name LIKE $2 OR location = $3"
    );
    assert_eq!(query.arguments, vec![Scalar::from("A%"), Scalar::from("eu")]);
}

#[test]
fn test_inner_composition_of_references() {
    let set = people();
    let name_like = set.reference("name_like").unwrap();
    let by_location = set.reference("by_location").unwrap();
    let where_clause = Value::inner(
        [
            QueryCall::reference(name_like).with_params(Params::new().with("name", "A%")),
            QueryCall::reference(by_location),
        ],
        " AND ",
    );
    let params = Params::new().with("where", where_clause).with("location", "eu");
    let query = people()
        .expand("filtered", &params, &Options::new().index(3))
        .unwrap();
    assert_eq!(
        query.statement,
        "SELECT * FROM person WHERE name LIKE $3 AND location = $4"
    );
    assert_eq!(query.arguments, vec![Scalar::from("A%"), Scalar::from("eu")]);
}

#[test]
fn test_inner_reference_call_params_replace_outer_params() {
    let set = people();
    let name_like = set.reference("name_like").unwrap();
    let where_clause = Value::inner(
        [
            QueryCall::reference(name_like.clone()),
            QueryCall::reference(name_like).with_params(Params::new()),
        ],
        " OR ",
    );
    let params = Params::new().with("where", where_clause).with("name", "B%");
    let err = set
        .expand("filtered", &params, &Options::default())
        .unwrap_err();
    assert_eq!(
        err.statement,
        "SELECT * FROM person WHERE name LIKE $1 OR name LIKE <missing name>"
    );
    assert_eq!(err.arguments, vec![Scalar::from("B%")]);
    assert_eq!(err.errors, vec![ParamError::not_found("name")]);
}

#[test]
fn test_inner_composition_mixes_names_and_foreign_references() {
    let hostnames = servers().reference("get_hostnames").unwrap();
    let where_clause = Value::inner(
        [
            QueryCall::name("by_location"),
            QueryCall::from(hostnames),
        ],
        " AND hostname IN ",
    );
    let params = Params::new().with("where", where_clause).with("location", "eu");
    let query = people()
        .expand("filtered", &params, &Options::default())
        .unwrap();
    assert_eq!(
        query.statement,
        "SELECT * FROM person WHERE location = $1 AND hostname IN SELECT hostname FROM server"
    );
}

#[test]
fn test_inner_unknown_query_is_reported() {
    let where_clause = Value::inner(["legal_age", "nope"], " AND ");
    let err = people()
        .expand("filtered", &Params::new().with("where", where_clause), &Options::default())
        .unwrap_err();
    assert_eq!(err.statement, "SELECT * FROM person WHERE age >= 18 AND <missing nope>");
    assert_eq!(err.errors, vec![ParamError::not_found("nope")]);
}

#[test]
fn test_named_composition_is_index_transparent() {
    let params = Params::new().with("location", "eu").with("min_id", 100);
    let query = people().expand("adults_in", &params, &Options::default()).unwrap();
    assert_eq!(
        query.statement,
        "SELECT * FROM person WHERE age >= 18 AND location = $1 AND id > $2"
    );
    assert_eq!(query.arguments, vec![Scalar::from("eu"), Scalar::Int(100)]);

    let query = people()
        .expand("adults_in", &params, &Options::new().index(5))
        .unwrap();
    assert_eq!(
        query.statement,
        "SELECT * FROM person WHERE age >= 18 AND location = $5 AND id > $6"
    );
}

#[test]
fn test_composed_errors_are_merged_in_order() {
    let err = people()
        .expand("adults_in", &Params::new(), &Options::default())
        .unwrap_err();
    assert_eq!(
        err.statement,
        "SELECT * FROM person WHERE age >= 18 AND location = <missing location> AND id > <missing min_id>"
    );
    assert_eq!(
        err.errors,
        vec![ParamError::not_found("location"), ParamError::not_found("min_id")]
    );
}

#[test]
fn test_query_names_win_over_params() {
    let params = Params::new()
        .with("legal_age", 99)
        .with("location", "eu")
        .with("min_id", 1);
    let query = people().expand("adults_in", &params, &Options::default()).unwrap();
    assert!(query.statement.contains("age >= 18"));
    assert_eq!(query.arguments.len(), 2);
}

#[test]
fn test_unknown_query_name() {
    let err = people()
        .expand("does_not_exist", &Params::new(), &Options::default())
        .unwrap_err();
    assert_eq!(err.errors, vec![ParamError::not_found("does_not_exist")]);
}

#[test]
fn test_anonymous_template_against_set() {
    let template = Template::parse(":legal_age AND name = :name").unwrap();
    let query = people()
        .expand_template(&template, &Params::new().with("name", "Bob"), &Options::default())
        .unwrap();
    assert_eq!(query.statement, "age >= 18 AND name = $1");

    let query = template
        .expand(
            &Params::new().with("legal_age", true).with("name", "Bob"),
            &Options::default(),
        )
        .unwrap();
    assert_eq!(query.statement, "$1 AND name = $2");
}

#[test]
fn test_expansion_is_repeatable() {
    let set = people();
    let params = Params::new().with("location", "eu");
    let first = set.expand("adults_in", &params, &Options::default());
    let second = set.expand("adults_in", &params, &Options::default());
    assert_eq!(first, second);
}

#[test]
fn test_placeholders_match_arguments() {
    let params = Params::new()
        .with("since", "2024-01-01")
        .with("location", "eu")
        .with("limit", 10);
    let query = servers().expand("recent_servers", &params, &Options::default()).unwrap();
    for n in 1..=query.arguments.len() {
        assert!(query.statement.contains(&format!("${}", n)));
    }
    assert!(!query.statement.contains(&format!("${}", query.arguments.len() + 1)));
}

#[test]
fn test_compile_error_snippet() {
    let source = "-- name: a\nSELECT 1\n-- docs: too late\n";
    let err = QuerySet::parse(source).unwrap_err();
    let rendered = err.render(source, false);
    assert!(rendered.contains("3 | -- docs: too late"));
    assert!(rendered.contains("  | ^"));
}

#[test]
fn test_sets_are_shareable_across_threads() {
    let set = people();
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let set = set.clone();
            std::thread::spawn(move || {
                let params = Params::new().with("location", "eu").with("min_id", i);
                set.expand("adults_in", &params, &Options::default()).unwrap()
            })
        })
        .collect();
    for handle in handles {
        let query = handle.join().unwrap();
        assert_eq!(query.arguments.len(), 2);
    }
}
