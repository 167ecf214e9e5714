//! Sample pipeline shipped with the `lm-flow` binary
//!
//! Counts the words in a sentence, then greets once per word.

use lmflow_core::prelude::*;

/// Model file matching [`pipeline`], backed by mock completions
pub const MODELS: &str = r#"- type: mock
  name: wordcount
  config:
    exactMatch: true
    defaultResponse: "0"
    cache:
      - prompt: hello world
        completion: "2"
      - prompt: hello
        completion: "1"
- type: mock
  name: greeter
  config:
    exactMatch: true
    defaultResponse: ""
    cache:
      - prompt: "1"
        completion: hello
      - prompt: "2"
        completion: hello hello
- type: function
  name: echo
"#;

/// A test case for [`pipeline`]
pub const CASE: &str = r#"tags: [smoke]
input: hello world
expected:
  type: sequence
  left:
    type: model
    name: wordcount
    expected: 2
  right:
    type: model
    name: greeter
    expected: hello hello
"#;

pub fn wordcount() -> Pipeline<String, u32> {
    Pipeline::model("wordcount", "wordcount")
        .judge(|observed: &u32, expected: &u32| observed == expected)
        .build()
}

pub fn greeter() -> Pipeline<u32, String> {
    Pipeline::model("greeter", "greeter")
        .render(|count: &u32| count.to_string())
        .judge(|observed: &String, expected: &String| observed == expected)
        .build()
}

/// `wordcount` followed by `greeter`
pub fn pipeline() -> Pipeline<String, String> {
    wordcount().then(greeter())
}
