//! Policy registry construction and lookup.

use std::io::Write;

use snippet_gate::policy::{Language, PolicyError, PolicyRegistry, PolicyRule, UnsupportedLanguage};

fn defaults() -> PolicyRegistry {
    match PolicyRegistry::with_defaults() {
        Ok(registry) => registry,
        Err(err) => panic!("default registry should build: {err}"),
    }
}

#[test]
fn default_languages_are_registered() {
    let registry = defaults();
    let languages: Vec<&str> = registry.languages().map(Language::as_str).collect();
    assert_eq!(languages, vec!["cpp", "java", "javascript", "python"]);
}

#[test]
fn aliases_resolve_to_canonical_keys() {
    let registry = defaults();
    assert_eq!(registry.resolve("C++"), Ok(Language::new("cpp")));
    assert_eq!(registry.resolve("js"), Ok(Language::new("javascript")));
    assert_eq!(registry.resolve(" Python3 "), Ok(Language::new("python")));
    assert!(registry.supports("node"));
}

#[test]
fn unknown_language_is_unsupported() {
    let registry = defaults();
    assert_eq!(
        registry.rules_for("brainfuck").map(<[PolicyRule]>::len),
        Err(UnsupportedLanguage("brainfuck".to_owned()))
    );
    assert!(!registry.supports("rust"));
}

#[test]
fn rules_keep_declaration_order() {
    let registry = defaults();
    let rules = match registry.rules_for("python") {
        Ok(rules) => rules,
        Err(err) => panic!("python should be registered: {err}"),
    };
    assert_eq!(rules[0].id(), "python/input");
    assert!(rules.iter().all(|rule| rule.language() == &Language::new("python")));
}

#[test]
fn rule_file_appends_after_defaults() {
    let mut file = match tempfile::NamedTempFile::new() {
        Ok(file) => file,
        Err(err) => panic!("should create temp file: {err}"),
    };
    let written = file.write_all(
        br#"
[aliases]
golang = "go"

[[rules]]
language = "python"
pattern = '\bsocket\b'
message = "Network access is not allowed."

[[rules]]
id = "go/os"
language = "go"
pattern = '\bos\.'
message = "The os package is not allowed."
"#,
    );
    assert!(written.is_ok());

    let registry = PolicyRegistry::builder()
        .with_defaults()
        .and_then(|builder| builder.with_rules_file(file.path()))
        .and_then(|builder| builder.build());
    let registry = match registry {
        Ok(registry) => registry,
        Err(err) => panic!("registry should build: {err}"),
    };

    let python = registry.rules_for("python").map(<[PolicyRule]>::to_vec);
    let python = match python {
        Ok(rules) => rules,
        Err(err) => panic!("python should be registered: {err}"),
    };
    let last = python.last().map(|rule| (rule.pattern().to_owned(), rule.message().to_owned()));
    assert_eq!(
        last,
        Some((
            r"\bsocket\b".to_owned(),
            "Network access is not allowed.".to_owned()
        ))
    );
    assert_eq!(python[0].id(), "python/input");

    assert_eq!(registry.resolve("golang"), Ok(Language::new("go")));
    let go = registry.rules_for("go").map(|rules| rules[0].id().to_owned());
    assert_eq!(go, Ok("go/os".to_owned()));
}

#[test]
fn rule_file_with_bad_pattern_fails() {
    let result = PolicyRegistry::builder().with_rules_toml(
        r#"
[[rules]]
language = "python"
pattern = '(['
message = "broken"
"#,
    );
    assert!(matches!(result, Err(PolicyError::InvalidPattern { .. })));
}

#[test]
fn missing_rule_file_fails() {
    let result = PolicyRegistry::builder()
        .with_rules_file(std::path::Path::new("/definitely/not/here/rules.toml"));
    assert!(matches!(result, Err(PolicyError::Read { .. })));
}

#[test]
fn registry_can_be_built_from_explicit_rules() {
    let rule = PolicyRule::new(
        "lua/os",
        Language::new("lua"),
        r"\bos\.execute\b",
        "os.execute is not allowed.",
    );
    let rule = match rule {
        Ok(rule) => rule,
        Err(err) => panic!("rule should compile: {err}"),
    };
    let registry = PolicyRegistry::builder().rule(rule).build();
    let registry = match registry {
        Ok(registry) => registry,
        Err(err) => panic!("registry should build: {err}"),
    };
    assert!(registry.supports("lua"));
    assert!(!registry.supports("python"));
}
