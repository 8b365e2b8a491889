//! Assembly of the guest program that grades a submission.
//!
//! The program runs the user's source from a string literal, then evaluates
//! each assertion inside its own `try` block, and finally leaves the collected
//! outcomes as a JSON string in its trailing expression.

use crate::core_types::{TestAssertion, RUNTIME_ERROR_OUTCOME};

const PRELUDE: &str = r#"import ast as _ps_ast
import asyncio as _ps_asyncio
import inspect as _ps_inspect
import json as _ps_json
import sys as _ps_sys

_test_results = []

def _assert_test(name, condition, msg=""):
    passed = bool(condition)
    _test_results.append({"name": str(name), "passed": passed, "message": "" if passed else str(msg)})

assert_test = _assert_test

def _ps_describe(exc):
    text = str(exc)
    return text if text else type(exc).__name__
"#;

const RUN_USER_CODE: &str = r#"
try:
    _ps_code = compile(_source_code, "<exec>", "exec", getattr(_ps_ast, "PyCF_ALLOW_TOP_LEVEL_AWAIT", 0), dont_inherit=True)
    _ps_ran = eval(_ps_code, globals())
    if _ps_inspect.iscoroutine(_ps_ran):
        __SETTLE__
except BaseException as _user_err:
    _test_results.append({"name": __RUNTIME_ERROR__, "passed": False, "message": _ps_describe(_user_err)})

_captured_stdout = getattr(_ps_sys.stdout, "getvalue", lambda: "")()
"#;

const EPILOGUE: &str = "\n_ps_json.dumps(_test_results)\n";

// An assertion using top-level await turns the whole program into a coroutine
// driven by the interpreter's event loop, where `asyncio.run` is not allowed.
const SETTLE_STANDALONE: &str = "_ps_asyncio.run(_ps_ran)";
const SETTLE_IN_LOOP: &str = "await _ps_ran";

/// Renders `text` as a Python string literal. JSON string syntax is a subset of
/// Python's, so the JSON encoder does the escaping.
pub fn py_string_literal(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}

/// Removes the indentation shared by every non-blank line.
fn dedent(text: &str) -> Vec<String> {
    let lines: Vec<&str> = text.lines().collect();
    let common = lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);

    lines
        .iter()
        .map(|line| {
            if line.trim().is_empty() {
                String::new()
            } else {
                line[common..].trim_end().to_string()
            }
        })
        .collect()
}

fn indent_block(text: &str, out: &mut String) {
    let lines = dedent(text);
    if lines.iter().all(|l| l.is_empty()) {
        out.push_str("    pass\n");
        return;
    }
    for line in lines {
        if line.is_empty() {
            out.push('\n');
        } else {
            out.push_str("    ");
            out.push_str(&line);
            out.push('\n');
        }
    }
}

fn push_assertion(assertion: &TestAssertion, out: &mut String) {
    let name = py_string_literal(&assertion.name);
    out.push_str("\n_ps_mark = len(_test_results)\ntry:\n");
    indent_block(&assertion.assertion_expression, out);
    out.push_str("except BaseException as _ps_err:\n");
    out.push_str(&format!(
        "    _test_results.append({{\"name\": {}, \"passed\": False, \"message\": _ps_describe(_ps_err)}})\n",
        name
    ));
    out.push_str("else:\n    if len(_test_results) == _ps_mark:\n");
    out.push_str(&format!(
        "        _test_results.append({{\"name\": {}, \"passed\": True, \"message\": \"\"}})\n",
        name
    ));
}

/// True when `code` may need top-level `await` (`await`, `async for`, `async with`).
fn needs_event_loop(code: &str) -> bool {
    code.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .any(|word| word == "await" || word == "async")
}

/// Builds the complete grading program for `source` and `assertions`.
pub fn build_test_script(source: &str, assertions: &[TestAssertion]) -> String {
    let mut script = String::with_capacity(PRELUDE.len() + source.len() + 256 * assertions.len());
    script.push_str(PRELUDE);
    script.push_str("\n_source_code = ");
    script.push_str(&py_string_literal(source));
    script.push('\n');
    let settle = if assertions
        .iter()
        .any(|a| needs_event_loop(&a.assertion_expression))
    {
        SETTLE_IN_LOOP
    } else {
        SETTLE_STANDALONE
    };
    script.push_str(
        &RUN_USER_CODE
            .replace("__RUNTIME_ERROR__", &py_string_literal(RUNTIME_ERROR_OUTCOME))
            .replace("__SETTLE__", settle),
    );
    for assertion in assertions {
        push_assertion(assertion, &mut script);
    }
    script.push_str(EPILOGUE);
    script
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_escapes_quotes_and_newlines() {
        assert_eq!(py_string_literal("a \"b\"\nc"), r#""a \"b\"\nc""#);
        assert_eq!(py_string_literal("back\\slash"), r#""back\\slash""#);
    }

    #[test]
    fn dedent_strips_common_indentation() {
        let lines = dedent("    if x:\n        y()\n\n    z()");
        assert_eq!(lines, vec!["if x:", "    y()", "", "z()"]);
    }

    #[test]
    fn each_assertion_gets_its_own_guard() {
        let script = build_test_script(
            "x = 1",
            &[
                TestAssertion::new("t1", "assert x == 1"),
                TestAssertion::new("t2", "_assert_test('t2', x > 0, 'x must be positive')"),
            ],
        );
        assert_eq!(script.matches("\ntry:\n").count(), 3);
        assert_eq!(script.matches("except BaseException as _ps_err:").count(), 2);
        assert!(script.contains("    assert x == 1\n"));
        assert!(script.contains("\"name\": \"t1\", \"passed\": False"));
        assert!(script.trim_end().ends_with("_ps_json.dumps(_test_results)"));
    }

    #[test]
    fn user_source_is_embedded_as_literal() {
        let source = "def f():\n    return \"\"\"multi\nline\"\"\"\nprint(f())";
        let script = build_test_script(source, &[TestAssertion::new("t", "assert f()")]);
        let embedded = script
            .split("_source_code = ")
            .nth(1)
            .and_then(|rest| rest.lines().next())
            .unwrap();
        assert_eq!(embedded, py_string_literal(source));
        assert!(!script.contains("\n    return \"\"\"multi"));
        assert!(!script.contains("\nprint(f())"));
    }

    #[test]
    fn multi_line_assertion_is_indented_under_try() {
        let script = build_test_script(
            "",
            &[TestAssertion::new(
                "loop",
                "for i in range(3):\n    _assert_test(f'loop{i}', i < 3)",
            )],
        );
        assert!(script.contains("try:\n    for i in range(3):\n        _assert_test(f'loop{i}', i < 3)\n"));
    }

    #[test]
    fn blank_assertion_becomes_pass() {
        let script = build_test_script("", &[TestAssertion::new("empty", "   \n")]);
        assert!(script.contains("try:\n    pass\n"));
    }

    #[test]
    fn runtime_error_name_is_substituted() {
        let script = build_test_script("", &[]);
        assert!(script.contains("{\"name\": \"runtime_error\", \"passed\": False"));
        assert!(!script.contains("__RUNTIME_ERROR__"));
        assert!(!script.contains("__SETTLE__"));
    }

    #[test]
    fn async_assertion_awaits_user_code_on_running_loop() {
        let sync = build_test_script("x = 1", &[TestAssertion::new("t", "assert x == 1")]);
        assert!(sync.contains("        _ps_asyncio.run(_ps_ran)\n"));
        assert!(!sync.contains("await _ps_ran"));

        let with_await = build_test_script(
            "import asyncio\nawait asyncio.sleep(0)\nx = 1",
            &[TestAssertion::new("t", "await asyncio.sleep(0)\nassert x == 1")],
        );
        assert!(with_await.contains("        await _ps_ran\n"));
        assert!(!with_await.contains("_ps_asyncio.run("));
    }

    #[test]
    fn event_loop_detection_matches_whole_words() {
        assert!(needs_event_loop("await q.get()"));
        assert!(needs_event_loop("async for item in stream(): pass"));
        assert!(!needs_event_loop("assert awaited == 1"));
        assert!(!needs_event_loop("assert asyncio_ready"));
    }
}
