use std::sync::Arc;

use reverse_proxy_chain::dynamic::RuntimeConfiguration;
use reverse_proxy_chain::middleware::{
    BoxHandler, BuildError, Builder, ConstructorContext, RetryListeners,
};

use crate::common::{get, runtime, serve, Echo, StaticServices};

const FILE_CONFIG: &str = r#"
[http.middlewares.a.addPrefix]
prefix = "/a"

[http.middlewares.b.addPrefix]
prefix = "/b"

[http.middlewares.c.addPrefix]
prefix = "/c"

[http.middlewares.inner.chain]
middlewares = ["a", "b"]

[http.middlewares.outer.chain]
middlewares = ["inner", "c"]

[http.middlewares.left.chain]
middlewares = ["a"]

[http.middlewares.right.chain]
middlewares = ["a"]

[http.middlewares.diamond.chain]
middlewares = ["left", "right"]

[http.middlewares.loop1.chain]
middlewares = ["loop2"]

[http.middlewares.loop2.chain]
middlewares = ["loop1"]

[http.middlewares.myself.chain]
middlewares = ["myself"]

[http.middlewares.both.addPrefix]
prefix = "/x"

[http.middlewares.both.stripPrefix]
prefixes = ["/x"]

[http.middlewares.nothing]

[http.middlewares.badretry.retry]
attempts = 0
"#;

const OTHER_CONFIG: &str = r#"
[http.middlewares.prefix.addPrefix]
prefix = "/o"

[http.middlewares.bundle.chain]
middlewares = ["prefix"]
"#;

fn build(runtime: &RuntimeConfiguration, names: &[&str]) -> Result<BoxHandler, BuildError> {
    let builder = Builder::new(
        Arc::new(runtime.middlewares.clone()),
        Arc::new(StaticServices::default()),
        Arc::new(RetryListeners::new()),
    );
    let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
    let ctx = ConstructorContext::for_element("api@file");
    builder.build_chain(&ctx, &names).then(Arc::new(Echo))
}

fn config() -> RuntimeConfiguration {
    runtime(&[("file", FILE_CONFIG), ("other", OTHER_CONFIG)])
}

#[tokio::test]
async fn test_first_middleware_runs_first() {
    let handler = build(&config(), &["a", "b"]).unwrap();
    let rec = serve(&handler, get("/x")).await;
    assert_eq!(rec.body_string(), "/b/a/x");
}

#[tokio::test]
async fn test_nested_chains_flatten_in_order() {
    let handler = build(&config(), &["outer"]).unwrap();
    let rec = serve(&handler, get("/x")).await;
    assert_eq!(rec.body_string(), "/c/b/a/x");
}

#[tokio::test]
async fn test_shared_middleware_is_not_a_cycle() {
    let handler = build(&config(), &["diamond", "a"]).unwrap();
    let rec = serve(&handler, get("/x")).await;
    assert_eq!(rec.body_string(), "/a/a/a/x");
}

#[test]
fn test_cycle_is_reported_with_path() {
    let err = build(&config(), &["loop1"]).err().unwrap();
    assert_eq!(
        err,
        BuildError::Recursion {
            name: "loop1@file".to_string(),
            path: "loop1@file->loop2@file->loop1@file".to_string(),
        }
    );
    assert_eq!(
        err.to_string(),
        "could not instantiate middleware loop1@file: recursion detected in loop1@file->loop2@file->loop1@file"
    );
}

#[test]
fn test_self_reference() {
    let err = build(&config(), &["myself"]).err().unwrap();
    assert_eq!(
        err,
        BuildError::Recursion {
            name: "myself@file".to_string(),
            path: "myself@file->myself@file".to_string(),
        }
    );
}

#[test]
fn test_missing_middleware() {
    let err = build(&config(), &["a", "nope"]).err().unwrap();
    assert_eq!(err.to_string(), "middleware \"nope@file\" does not exist");
}

#[test]
fn test_multi_type_middleware() {
    let err = build(&config(), &["both"]).err().unwrap();
    assert_eq!(
        err,
        BuildError::MultiType {
            name: "both@file".to_string(),
            kinds: "addPrefix, stripPrefix".to_string(),
        }
    );
}

#[test]
fn test_middleware_without_type() {
    let err = build(&config(), &["nothing"]).err().unwrap();
    assert_eq!(
        err,
        BuildError::EmptyType {
            name: "nothing@file".to_string(),
        }
    );
}

#[test]
fn test_invalid_configuration_names_the_middleware() {
    let err = build(&config(), &["badretry"]).err().unwrap();
    assert!(matches!(err, BuildError::InvalidConfig { ref name, .. } if name == "badretry@file"));
}

#[tokio::test]
async fn test_cross_provider_reference() {
    let handler = build(&config(), &["prefix@other", "a"]).unwrap();
    let rec = serve(&handler, get("/x")).await;
    assert_eq!(rec.body_string(), "/a/o/x");
}

#[tokio::test]
async fn test_chain_resolves_names_in_its_own_provider() {
    let handler = build(&config(), &["bundle@other"]).unwrap();
    let rec = serve(&handler, get("/x")).await;
    assert_eq!(rec.body_string(), "/o/x");
}

#[tokio::test]
async fn test_empty_list_returns_service() {
    let handler = build(&config(), &[]).unwrap();
    let rec = serve(&handler, get("/x")).await;
    assert_eq!(rec.body_string(), "/x");
}
