use std::time::Duration;

use runbook_core::types::{DbQuery, ExecCommand, HttpRequest, RunnerSpec};
use runbook_core::{load_runbook, load_runbooks, parse_runbook_str, Command, LoadError};
use serde_json::json;

fn sample_book() -> &'static str {
    r#"
desc: login flow
runners:
  req: https://api.example.com/api/v3
  api:
    endpoint: https://api.example.com
    openapi3: ./openapi.yml
    notFollowRedirect: true
    timeout: 30s
  db: sqlite://./test.db?mode=rwc
  sv: ssh://deploy@example.com:2222
  rpc: grpc://localhost:50051
  login:
    path: ./login.yml
    params:
      user: "{{ vars.user }}"
vars:
  user: alice
steps:
  - req:
      /users:
        post:
          body:
            application/json:
              name: "{{ vars.user }}"
    test: current.res.status == 201
    bind:
      user_id: current.res.body.id
  - if: user_id > 0
    loop:
      count: 5
      interval: 500ms
      until: current.res.status == 200
    req:
      /users/{{ user_id }}:
        get:
          body: null
  - exec:
      command: echo hello
  - include:
      path: ./child.yml
      vars:
        token: "{{ steps[0].res.body.token }}"
      force: true
"#
}

#[test]
fn parses_runners_vars_and_steps() {
    let book = parse_runbook_str(sample_book(), "/tmp/books").unwrap();
    assert_eq!(book.desc.as_deref(), Some("login flow"));
    assert_eq!(book.vars.get("user"), Some(&json!("alice")));
    assert!(!book.use_map);

    match &book.runners["api"] {
        RunnerSpec::Http(h) => {
            assert_eq!(h.endpoint, "https://api.example.com");
            assert_eq!(h.openapi3.as_deref(), Some("./openapi.yml"));
            assert!(h.not_follow_redirect);
            assert_eq!(h.timeout, Some(Duration::from_secs(30)));
        }
        other => panic!("unexpected runner {other:?}"),
    }
    assert!(matches!(&book.runners["db"], RunnerSpec::Db(d) if d.dsn.starts_with("sqlite://")));
    match &book.runners["sv"] {
        RunnerSpec::Ssh(s) => {
            assert_eq!(s.destination(), "deploy@example.com");
            assert_eq!(s.port, Some(2222));
        }
        other => panic!("unexpected runner {other:?}"),
    }
    assert!(matches!(&book.runners["rpc"], RunnerSpec::Grpc(g) if g.addr == "localhost:50051"));
    assert!(matches!(&book.runners["login"], RunnerSpec::Include(i) if i.params.contains_key("user")));

    assert_eq!(book.steps.len(), 4);
    let first = &book.steps[0];
    assert_eq!(first.runner_name(), Some("req"));
    assert_eq!(first.test.as_deref(), Some("current.res.status == 201"));
    assert!(first.bind.as_ref().unwrap().contains_key("user_id"));

    let second = &book.steps[1];
    assert_eq!(second.guard.as_deref(), Some("user_id > 0"));
    let retry = second.retry.as_ref().unwrap();
    assert_eq!(retry.count, 5);
    assert_eq!(retry.interval, Duration::from_millis(500));

    assert!(matches!(book.steps[2].command, Some(Command::Exec(_))));
    match &book.steps[3].command {
        Some(Command::Include(cfg)) => {
            assert_eq!(cfg.path, "./child.yml");
            assert!(cfg.force);
            assert!(!cfg.skip_test);
        }
        other => panic!("unexpected command {other:?}"),
    }
}

#[test]
fn map_form_steps_keep_their_names() {
    let book = parse_runbook_str(
        r#"
steps:
  login:
    exec:
      command: echo hi
  check:
    test: steps.login.exit_code == 0
"#,
        ".",
    )
    .unwrap();
    assert!(book.use_map);
    assert_eq!(book.steps[1].key.as_deref(), Some("check"));
    assert_eq!(book.steps[1].index, 1);
    assert!(book.step("login").is_some());
}

#[test]
fn retry_defaults() {
    let book = parse_runbook_str(
        "steps:\n  - retry:\n      until: 'true'\n    test: 'true'\n",
        ".",
    )
    .unwrap();
    let retry = book.steps[0].retry.as_ref().unwrap();
    assert_eq!(retry.count, 3);
    assert_eq!(retry.interval, Duration::ZERO);
}

#[test]
fn rejects_steps_with_two_runners() {
    let err = parse_runbook_str(
        "steps:\n  - req: {}\n    db: {}\n",
        ".",
    )
    .unwrap_err();
    assert!(matches!(err, LoadError::Invalid { .. }), "{err}");
}

#[test]
fn rejects_empty_steps_and_unknown_schemes() {
    assert!(parse_runbook_str("steps:\n  - desc: nothing\n", ".").is_err());
    let err = parse_runbook_str("runners:\n  x: ftp://example.com\n", ".").unwrap_err();
    assert!(err.to_string().contains("unsupported runner scheme"), "{err}");
}

#[test]
fn load_runbook_sets_root_to_file_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("book.yml");
    std::fs::write(&path, "steps:\n  - test: 'true'\n").unwrap();
    let book = load_runbook(&path).unwrap();
    assert_eq!(book.root, dir.path());
    assert_eq!(book.path.as_deref(), Some(path.as_path()));
}

#[test]
fn load_runbook_reports_missing_file() {
    let err = load_runbook("/definitely/not/here.yml").unwrap_err();
    assert!(matches!(err, LoadError::Io { .. }));
}

#[test]
fn http_request_payloads() {
    let req = HttpRequest::from_payload(&json!({
        "/login": { "post": { "body": { "application/json": { "key": "value" } } } }
    }))
    .unwrap();
    assert_eq!(req.path, "/login");
    assert_eq!(req.method, "POST");
    assert_eq!(req.media_type.as_deref(), Some("application/json"));
    assert_eq!(req.body, Some(json!({ "key": "value" })));
    assert!(req.headers.is_empty());

    let get = HttpRequest::from_payload(&json!({ "/users/k1LoW": { "get": { "body": null } } })).unwrap();
    assert_eq!(get.method, "GET");
    assert!(get.body.is_none());

    assert!(HttpRequest::from_payload(&json!({ "/users/k1LoW": { "get": null } })).is_err());
    assert!(HttpRequest::from_payload(&json!({ "/users/k1LoW": { "post": { "body": null } } })).is_err());
}

#[test]
fn db_and_exec_payloads() {
    let q = DbQuery::from_payload(&json!({ "query": "SELECT * FROM users;\n" })).unwrap();
    assert_eq!(q.stmt, "SELECT * FROM users;");

    let cmd = ExecCommand::from_payload(&json!({
        "command": "echo hello > test.txt",
        "stdin": "alice\nbob\ncharlie\n"
    }))
    .unwrap();
    assert_eq!(cmd.stdin.as_deref(), Some("alice\nbob\ncharlie\n"));
    assert!(!cmd.background);

    assert!(ExecCommand::from_payload(&json!({ "stdin": "alice\n" })).is_err());
}

fn books_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let write = |name: &str, body: &str| {
        let path = dir.path().join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    };
    write("main.yml", "steps:\n  - include: parts/login.yml\n");
    write("report.yml", "runners:\n  seed: parts/seed.yml\nsteps:\n  - seed: {}\n");
    write("parts/login.yml", "steps:\n  - test: \"true\"\n");
    write("parts/seed.yml", "steps:\n  - test: \"true\"\n");
    write("parts/standalone.yml", "steps: []\n");
    write("notes.txt", "not a runbook");
    dir
}

fn names(books: &[runbook_core::Runbook]) -> Vec<String> {
    let mut names: Vec<String> = books
        .iter()
        .map(|b| b.path.as_ref().unwrap().file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn glob_patterns_load_every_matching_runbook() {
    let dir = books_dir();
    let root = dir.path().display();

    let top = load_runbooks([format!("{root}/*")], false).unwrap();
    assert_eq!(names(&top), vec!["main.yml", "report.yml"]);

    let all = load_runbooks([format!("{root}/**/*.yml"), format!("{root}/main.yml")], false).unwrap();
    assert_eq!(all.len(), 5);
}

#[test]
fn skip_included_keeps_only_entry_points() {
    let dir = books_dir();
    let root = dir.path().display();

    let books = load_runbooks([format!("{root}/**/*.yml")], true).unwrap();

    assert_eq!(names(&books), vec!["main.yml", "report.yml", "standalone.yml"]);
}

#[test]
fn patterns_without_matches_are_errors() {
    let dir = books_dir();
    let root = dir.path().display();

    let err = load_runbooks([format!("{root}/*.json")], false).unwrap_err();
    assert!(matches!(err, LoadError::NoMatch(_)));

    let err = load_runbooks([format!("{root}/missing.yml")], false).unwrap_err();
    assert!(matches!(err, LoadError::Io { .. }));
}
