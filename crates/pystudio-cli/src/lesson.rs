//! Reading acceptance tests from lesson files.
//!
//! A tests file may be a bare list of assertions, a single lesson section
//! carrying a `tests` key, or a whole lesson with `sections`. JSON is read
//! through the YAML parser.

use anyhow::{anyhow, Context, Result};
use pystudio_core::TestAssertion;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Section {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    tests: Vec<TestAssertion>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TestsDocument {
    List(Vec<TestAssertion>),
    Lesson { sections: Vec<Section> },
    Section(Section),
}

pub fn parse_tests(content: &str, section: Option<usize>) -> Result<Vec<TestAssertion>> {
    let document: TestsDocument = serde_yaml::from_str(content)
        .context("Expected a list of tests, a section with `tests`, or a lesson with `sections`")?;

    match document {
        TestsDocument::List(tests) => Ok(tests),
        TestsDocument::Section(found) => Ok(found.tests),
        TestsDocument::Lesson { sections } => match section {
            Some(index) => sections
                .into_iter()
                .nth(index)
                .map(|s| s.tests)
                .ok_or_else(|| anyhow!("Lesson has no section {}", index)),
            None => {
                let found = sections
                    .into_iter()
                    .find(|s| !s.tests.is_empty())
                    .ok_or_else(|| anyhow!("Lesson has no section with tests"))?;
                if let Some(title) = &found.title {
                    log::info!("Using tests from section '{}'", title);
                }
                Ok(found.tests)
            }
        },
    }
}

pub async fn load_tests(path: &Path, section: Option<usize>) -> Result<Vec<TestAssertion>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read tests file {}", path.display()))?;
    parse_tests(&content, section)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_bare_list() {
        let yaml = r#"
- name: adds
  assertion: "assert add(1, 2) == 3"
  points: 2
- name: greets
  assertionExpression: "_assert_test('greets', greet() == 'hi')"
"#;
        let tests = parse_tests(yaml, None).unwrap();
        assert_eq!(tests.len(), 2);
        assert_eq!(tests[0].points, Some(2.0));
        assert_eq!(tests[1].assertion_expression, "_assert_test('greets', greet() == 'hi')");
    }

    #[test]
    fn test_json_section() {
        let json = r#"{"type": "exercise", "title": "Sum", "starterCode": "", "tests": [{"name": "t", "assertion": "assert True"}]}"#;
        let tests = parse_tests(json, None).unwrap();
        assert_eq!(tests, vec![TestAssertion::new("t", "assert True")]);
    }

    #[test]
    fn test_lesson_picks_first_section_with_tests() {
        let yaml = r#"
id: m01-l01
title: Basics
sections:
  - type: concept
    title: Intro
  - type: exercise
    title: Loop
    tests:
      - name: loops
        assertion: "assert total == 6"
  - type: exercise
    title: Later
    tests:
      - name: later
        assertion: "assert True"
"#;
        let tests = parse_tests(yaml, None).unwrap();
        assert_eq!(tests[0].name, "loops");

        let tests = parse_tests(yaml, Some(2)).unwrap();
        assert_eq!(tests[0].name, "later");

        assert!(parse_tests(yaml, Some(7)).is_err());
    }

    #[test]
    fn test_rejects_unrelated_document() {
        assert!(parse_tests("just a string", None).is_err());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "- name: t\n  assertion: assert True").unwrap();
        let tests = load_tests(file.path(), None).await.unwrap();
        assert_eq!(tests.len(), 1);
    }
}
