use runbook_core::expressions::{eval_str, expand_value, is_truthy, EvalEnv, ExprError, FuncRegistry};
use serde_json::{json, Value};

fn store() -> Value {
    json!({
        "vars": {
            "one": 1,
            "key": "k",
            "none": null,
            "list": ["a", "b", "c"],
            "user": { "name": "alice", "tags": [] }
        },
        "steps": [
            { "res": { "status": 200, "body": { "id": 7 } } },
            { "res": { "status": 404 } }
        ],
        "token": "abc"
    })
}

fn eval(src: &str) -> Result<Value, ExprError> {
    let root = store();
    eval_str(src, &EvalEnv::new(&root))
}

#[test]
fn whole_marker_keeps_the_raw_value() {
    let root = store();
    let env = EvalEnv::new(&root);
    assert_eq!(expand_value(&json!("{{ vars.one }}"), &env).unwrap(), json!(1));
    assert_eq!(expand_value(&json!("{{ vars.one + 1 }}"), &env).unwrap(), json!(2));
    assert_eq!(expand_value(&json!("{{ string(vars.one) }}"), &env).unwrap(), json!("1"));
    assert_eq!(expand_value(&json!(" {{ vars.one }} "), &env).unwrap(), json!(" 1 "));
}

#[test]
fn mixed_strings_interpolate() {
    let root = store();
    let env = EvalEnv::new(&root);
    assert_eq!(
        expand_value(&json!("/users/{{ steps[0].res.body.id }}/posts"), &env).unwrap(),
        json!("/users/7/posts")
    );
    assert_eq!(expand_value(&json!("a{{ vars.none }}b"), &env).unwrap(), json!("ab"));
}

#[test]
fn mapping_keys_and_nested_values_are_expanded() {
    let root = store();
    let env = EvalEnv::new(&root);
    let input = json!({
        "{{ vars.key }}": "v",
        "nested": [{ "n": "{{ vars.user.name }}" }, 3, true]
    });
    let out = expand_value(&input, &env).unwrap();
    assert_eq!(out, json!({ "k": "v", "nested": [{ "n": "alice" }, 3, true] }));
}

#[test]
fn missing_key_is_an_error() {
    let err = eval("vars.missing").unwrap_err();
    assert!(matches!(err, ExprError::MissingKey { ref key, .. } if key == "missing"));
    assert!(matches!(eval("nope").unwrap_err(), ExprError::UndefinedVariable(_)));
}

#[test]
fn arithmetic_rules() {
    assert_eq!(eval("7 / 2").unwrap(), json!(3.5));
    assert_eq!(eval("7 % 4").unwrap(), json!(3));
    assert_eq!(eval("2 + 3 * 4").unwrap(), json!(14));
    assert_eq!(eval("(2 + 3) * 4").unwrap(), json!(20));
    assert_eq!(eval("1.5 + 1").unwrap(), json!(2.5));
    assert_eq!(eval("'a' + 'b'").unwrap(), json!("ab"));
    assert!(matches!(eval("'a' + 1").unwrap_err(), ExprError::Type(_)));
    assert!(matches!(eval("1.5 % 1").unwrap_err(), ExprError::Type(_)));
    assert_eq!(eval("1 / 0").unwrap_err(), ExprError::DivisionByZero);
    assert_eq!(eval("9223372036854775807 + 1").unwrap_err(), ExprError::Overflow);
}

#[test]
fn comparisons_and_logic() {
    assert_eq!(eval("steps[0].res.status == 200").unwrap(), json!(true));
    assert_eq!(eval("steps[-1].res.status >= 400 && true").unwrap(), json!(true));
    assert_eq!(eval("1 == 1.0").unwrap(), json!(true));
    assert_eq!(eval("'b' in vars.list").unwrap(), json!(true));
    assert_eq!(eval("'name' in vars.user").unwrap(), json!(true));
    assert_eq!(eval("!(1 < 2) || false").unwrap(), json!(false));
    assert!(matches!(eval("1 < 'a'").unwrap_err(), ExprError::Type(_)));
}

#[test]
fn optional_access_and_coalesce() {
    assert_eq!(eval("vars?.missing").unwrap(), Value::Null);
    assert_eq!(eval("vars.missing ?? 'fallback'").unwrap(), json!("fallback"));
    assert_eq!(eval("vars.none ?? 5").unwrap(), json!(5));
    assert_eq!(eval("vars.one ?? 5").unwrap(), json!(1));
    assert_eq!(eval("steps[5]?.res ?? 0").unwrap(), json!(0));
}

#[test]
fn indexing() {
    assert_eq!(eval("vars.list[-1]").unwrap(), json!("c"));
    assert_eq!(eval("vars.list[1]").unwrap(), json!("b"));
    assert_eq!(eval("vars['key']").unwrap(), json!("k"));
    assert!(matches!(
        eval("vars.list[3]").unwrap_err(),
        ExprError::IndexOutOfRange { index: 3, len: 3, .. }
    ));
}

#[test]
fn builtins() {
    assert_eq!(eval("len(vars.list)").unwrap(), json!(3));
    assert_eq!(eval("int('42')").unwrap(), json!(42));
    assert_eq!(eval("float(1)").unwrap(), json!(1.0));
    assert_eq!(eval("bool(vars.user.tags)").unwrap(), json!(false));
    assert_eq!(eval("keys(vars.user)").unwrap(), json!(["name", "tags"]));
    assert_eq!(eval("contains(token, 'bc')").unwrap(), json!(true));
    assert_eq!(eval("urlencode('a b&c')").unwrap(), json!("a+b%26c"));
    assert_eq!(eval("type(vars.one)").unwrap(), json!("int"));
    assert!(matches!(eval("frobnicate(1)").unwrap_err(), ExprError::UnknownFunction(_)));
}

#[test]
fn user_functions_come_from_the_registry_and_builtins_win() {
    let funcs = FuncRegistry::new();
    funcs.register("upper", |args| match args {
        [Value::String(s)] => Ok(Value::String(s.to_uppercase())),
        _ => Err("expected one string".to_string()),
    });
    funcs.register("len", |_| Ok(json!(-1)));

    let root = store();
    let env = EvalEnv::new(&root).with_funcs(&funcs);
    assert_eq!(eval_str("upper(vars.user.name)", &env).unwrap(), json!("ALICE"));
    assert_eq!(eval_str("len('abc')", &env).unwrap(), json!(3));
    assert!(matches!(
        eval_str("upper(1)", &env).unwrap_err(),
        ExprError::Function { .. }
    ));
}

#[test]
fn truthiness() {
    for falsy in [json!(false), json!(null), json!(0), json!(0.0), json!(""), json!([]), json!({})] {
        assert!(!is_truthy(&falsy), "{falsy} should be falsy");
    }
    for truthy in [json!(true), json!(1), json!("x"), json!([0]), json!({ "a": null })] {
        assert!(is_truthy(&truthy), "{truthy} should be truthy");
    }
}
