//! Pipeline processing
//!
//! Walks a link tree and its test case's expected tree in lockstep, calling
//! backends for model links, threading outputs through sequences, and fanning
//! mux tasks out concurrently. Every node produces an [`ExecutionTrace`].

mod execution;

pub use execution::{ExecutionTrace, ModelTrace, MuxTrace, ProcessError, ProcessResult, SequenceTrace};

use futures::future::{BoxFuture, FutureExt, join_all};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::link::{JudgeFn, Link, ModelLink, MuxLink, Payload, Pipeline, SequenceLink, encode};
use crate::models::{AvailableModels, Conversation, Model};
use crate::testcase::ExpectedNode;

/// Path of the root node, matching the test case field it is checked against
const ROOT_PATH: &str = "expected";

/// Processing limits and cancellation
#[derive(Debug, Clone, Default)]
pub struct ProcessorConfig {
    /// Deadline for each backend call
    pub model_timeout: Option<Duration>,

    /// Maximum concurrent tasks within one mux
    pub mux_concurrency: Option<usize>,

    /// Cancels in-flight backend calls
    pub cancel: CancellationToken,
}

/// Processes pipelines against test cases using a model registry
pub struct Processor<'a> {
    models: &'a AvailableModels,
    config: ProcessorConfig,
}

impl<'a> Processor<'a> {
    pub fn new(models: &'a AvailableModels) -> Self {
        Self::with_config(models, ProcessorConfig::default())
    }

    pub fn with_config(models: &'a AvailableModels, config: ProcessorConfig) -> Self {
        Self { models, config }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Run a typed pipeline on `input`, checking it against `expected`
    pub async fn process<I: Payload, O: Payload>(
        &self,
        pipeline: &Pipeline<I, O>,
        input: &I,
        expected: &ExpectedNode,
    ) -> ProcessResult<ExecutionTrace> {
        let input = encode(input).map_err(|e| ProcessError::Render {
            node: ROOT_PATH.to_string(),
            message: e.to_string(),
        })?;
        self.process_link(pipeline.link(), input, expected).await
    }

    /// Run a link tree on an already-encoded input
    pub async fn process_link(
        &self,
        link: &Link,
        input: Value,
        expected: &ExpectedNode,
    ) -> ProcessResult<ExecutionTrace> {
        self.process_node(link, input, expected, ROOT_PATH.to_string())
            .await
    }

    fn process_node<'b>(
        &'b self,
        link: &'b Link,
        input: Value,
        expected: &'b ExpectedNode,
        path: String,
    ) -> BoxFuture<'b, ProcessResult<ExecutionTrace>> {
        async move {
            if self.config.cancel.is_cancelled() {
                return Err(ProcessError::Cancelled);
            }

            match (link, expected) {
                (Link::Model(model), ExpectedNode::Model { name, expected }) => {
                    self.process_model(model, input, name, expected.as_ref(), &path)
                        .await
                }
                (Link::Sequence(sequence), ExpectedNode::Sequence { left, right, expected }) => {
                    self.process_sequence(sequence, input, left, right, expected.as_ref(), &path)
                        .await
                }
                (Link::Mux(mux), ExpectedNode::Mux { children, expected }) => {
                    self.process_mux(mux, input, children, expected.as_ref(), &path)
                        .await
                }
                (link, expected) => Err(ProcessError::ShapeMismatch {
                    path: format!("{}.type", path),
                    expected: link.kind().to_string(),
                    found: expected.kind().to_string(),
                }),
            }
        }
        .boxed()
    }

    async fn process_model(
        &self,
        link: &ModelLink,
        input: Value,
        name: &str,
        expected: Option<&Value>,
        path: &str,
    ) -> ProcessResult<ExecutionTrace> {
        if name != link.name {
            return Err(ProcessError::ShapeMismatch {
                path: format!("{}.name", path),
                expected: format!("\"{}\"", link.name),
                found: format!("\"{}\"", name),
            });
        }

        let conversation = (link.render)(&input).map_err(|e| ProcessError::Render {
            node: link.name.clone(),
            message: e.to_string(),
        })?;
        let prompt = conversation.text();

        let model = self.models.resolve(&link.name, &link.model)?;
        let completion = self.complete(link, model.as_ref(), &conversation).await?;

        let output = (link.parse)(&completion).map_err(|e| ProcessError::OutputParse {
            node: link.name.clone(),
            completion: completion.clone(),
            message: e.to_string(),
        })?;

        let (expected, judgment) = judge(link.judge.as_ref(), expected, &output, path)?;

        tracing::debug!(
            node = %link.name,
            model = %model.name(),
            judged = judgment.is_some(),
            "Model link completed"
        );

        Ok(ExecutionTrace::Model(ModelTrace {
            model: model.name().to_string(),
            name: link.name.clone(),
            input,
            prompt,
            completion,
            output,
            expected,
            judgment,
        }))
    }

    async fn complete(
        &self,
        link: &ModelLink,
        model: &dyn Model,
        conversation: &Conversation,
    ) -> ProcessResult<String> {
        self.models.mark_used(model.name());

        let backend_error = |source| ProcessError::Backend {
            node: link.name.clone(),
            model: model.name().to_string(),
            source,
        };

        let call = async {
            match self.config.model_timeout {
                Some(timeout) => {
                    match tokio::time::timeout(timeout, model.complete(conversation)).await {
                        Ok(result) => result.map_err(backend_error),
                        Err(_) => Err(ProcessError::BackendTimeout {
                            node: link.name.clone(),
                            model: model.name().to_string(),
                            timeout,
                        }),
                    }
                }
                None => model.complete(conversation).await.map_err(backend_error),
            }
        };

        tokio::select! {
            biased;
            _ = self.config.cancel.cancelled() => Err(ProcessError::Cancelled),
            result = call => result,
        }
    }

    async fn process_sequence(
        &self,
        link: &SequenceLink,
        input: Value,
        left: &ExpectedNode,
        right: &ExpectedNode,
        expected: Option<&Value>,
        path: &str,
    ) -> ProcessResult<ExecutionTrace> {
        let left_trace = self
            .process_node(&link.left, input.clone(), left, format!("{}.left", path))
            .await?;
        let right_trace = self
            .process_node(
                &link.right,
                left_trace.output().clone(),
                right,
                format!("{}.right", path),
            )
            .await?;

        let output = right_trace.output().clone();
        let (expected, judgment) = judge(link.judge.as_ref(), expected, &output, path)?;

        Ok(ExecutionTrace::Sequence(SequenceTrace {
            input,
            left: Box::new(left_trace),
            right: Box::new(right_trace),
            output,
            expected,
            judgment,
        }))
    }

    async fn process_mux(
        &self,
        link: &MuxLink,
        input: Value,
        children: &[ExpectedNode],
        expected: Option<&Value>,
        path: &str,
    ) -> ProcessResult<ExecutionTrace> {
        let tasks = (link.distribute)(&input).map_err(|e| ProcessError::Mux {
            path: path.to_string(),
            message: format!("distribute failed: {}", e),
        })?;

        for (i, task) in tasks.iter().enumerate() {
            if !link.children.iter().any(|c| Arc::ptr_eq(c, &task.child)) {
                return Err(ProcessError::MalformedPipeline {
                    path: format!("{}.children[{}]", path, i),
                    message: format!(
                        "task targets {}, which is not a declared child of the mux",
                        task.child.describe()
                    ),
                });
            }
        }

        if tasks.len() != children.len() {
            return Err(ProcessError::ShapeMismatch {
                path: format!("{}.children", path),
                expected: format!("{} children", tasks.len()),
                found: format!("{} children", children.len()),
            });
        }

        tracing::debug!(path, tasks = tasks.len(), "Distributing mux tasks");

        let semaphore = self.config.mux_concurrency.map(Semaphore::new);
        let runs = tasks
            .iter()
            .zip(children)
            .enumerate()
            .map(|(i, (task, expected))| {
                let semaphore = semaphore.as_ref();
                let child_path = format!("{}.children[{}]", path, i);
                async move {
                    let _permit = match semaphore {
                        Some(semaphore) => Some(
                            semaphore
                                .acquire()
                                .await
                                .map_err(|_| ProcessError::Cancelled)?,
                        ),
                        None => None,
                    };
                    self.process_node(&task.child, task.input.clone(), expected, child_path)
                        .await
                }
            });

        // All tasks run to completion; the lowest-index failure is reported
        let traces = join_all(runs)
            .await
            .into_iter()
            .collect::<ProcessResult<Vec<_>>>()?;

        let outputs: Vec<Value> = traces.iter().map(|t| t.output().clone()).collect();
        let output = (link.combine)(&outputs).map_err(|e| ProcessError::Mux {
            path: path.to_string(),
            message: format!("combine failed: {}", e),
        })?;

        let (expected, judgment) = judge(link.judge.as_ref(), expected, &output, path)?;

        Ok(ExecutionTrace::Mux(MuxTrace {
            input,
            children: traces,
            output,
            expected,
            judgment,
        }))
    }
}

/// Judge `output` when both a judge and an expected value exist
fn judge(
    judge: Option<&JudgeFn>,
    expected: Option<&Value>,
    output: &Value,
    path: &str,
) -> ProcessResult<(Option<Value>, Option<Value>)> {
    match (judge, expected) {
        (Some(judge), Some(expected)) => {
            let judgment = judge(output, expected).map_err(|e| ProcessError::Judge {
                path: path.to_string(),
                message: e.to_string(),
            })?;
            Ok((Some(expected.clone()), Some(judgment)))
        }
        _ => Ok((None, None)),
    }
}

/// Process a typed pipeline with default limits
pub async fn process<I: Payload, O: Payload>(
    models: &AvailableModels,
    pipeline: &Pipeline<I, O>,
    input: &I,
    expected: &ExpectedNode,
) -> ProcessResult<ExecutionTrace> {
    Processor::new(models).process(pipeline, input, expected).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::LinkError;
    use crate::models::{MockModel, ModelDefinition, ModelError, ModelResult};
    use async_trait::async_trait;
    use serde_json::json;

    struct FailingModel;

    #[async_trait]
    impl Model for FailingModel {
        fn name(&self) -> &str {
            "failing"
        }

        async fn complete(&self, _conversation: &Conversation) -> ModelResult<String> {
            Err(ModelError::Request("connection refused".to_string()))
        }

        fn spec(&self) -> ModelDefinition {
            ModelDefinition::Function {
                name: "failing".to_string(),
            }
        }
    }

    fn registry(models: Vec<Arc<dyn Model>>) -> AvailableModels {
        AvailableModels::from_models(models).unwrap()
    }

    fn wordcount() -> Pipeline<String, u32> {
        Pipeline::model("wordcount", "wordcount")
            .judge(|observed: &u32, expected: &u32| observed == expected)
            .build()
    }

    fn greeter() -> Pipeline<u32, String> {
        Pipeline::model("greeter", "greeter")
            .render(|n: &u32| n.to_string())
            .judge(|observed: &String, expected: &String| observed == expected)
            .build()
    }

    fn word_models() -> AvailableModels {
        registry(vec![
            Arc::new(MockModel::exact("wordcount", "0").with_response("hello world", "2")),
            Arc::new(MockModel::exact("greeter", "???").with_response("2", "hello hello")),
        ])
    }

    #[tokio::test]
    async fn test_model_link_with_judgment() {
        let models = word_models();
        let expected = ExpectedNode::model("wordcount").expect(2);

        let trace = process(&models, &wordcount(), &"hello world".to_string(), &expected)
            .await
            .unwrap();

        let ExecutionTrace::Model(trace) = trace else {
            panic!("expected a model trace");
        };
        assert_eq!(trace.model, "wordcount");
        assert_eq!(trace.prompt, "hello world");
        assert_eq!(trace.completion, "2");
        assert_eq!(trace.output, json!(2));
        assert_eq!(trace.expected, Some(json!(2)));
        assert_eq!(trace.judgment, Some(json!(true)));
        assert!(models.used("wordcount"));
        assert!(!models.used("greeter"));
    }

    #[tokio::test]
    async fn test_template_renders_prompt() {
        let models = registry(vec![Arc::new(
            MockModel::exact("wordcount", "0").with_response("Count: hello world", "2"),
        )]);
        let counted = Pipeline::<String, u32>::model("wordcount", "wordcount")
            .template("Count: {{input}}")
            .build();

        let trace = process(
            &models,
            &counted,
            &"hello world".to_string(),
            &ExpectedNode::model("wordcount"),
        )
        .await
        .unwrap();
        assert_eq!(trace.output(), &json!(2));
    }

    #[tokio::test]
    async fn test_judgment_omitted_without_expected_or_judge() {
        let models = word_models();

        let trace = process(
            &models,
            &wordcount(),
            &"hello world".to_string(),
            &ExpectedNode::model("wordcount"),
        )
        .await
        .unwrap();
        assert_eq!(trace.judgment(), None);

        let unjudged = Pipeline::<String, u32>::model("wordcount", "wordcount").build();
        let trace = process(
            &models,
            &unjudged,
            &"hello world".to_string(),
            &ExpectedNode::model("wordcount").expect(2),
        )
        .await
        .unwrap();
        assert_eq!(trace.judgment(), None);
        let serialized = serde_json::to_value(&trace).unwrap();
        assert!(serialized.get("judgment").is_none());
        assert!(serialized.get("expected").is_none());
    }

    #[tokio::test]
    async fn test_sequence_threads_output() {
        let models = word_models();
        let pipeline = Pipeline::sequence(wordcount(), greeter())
            .judge(|observed: &String, expected: &String| observed == expected)
            .build();
        let expected = ExpectedNode::sequence(
            ExpectedNode::model("wordcount").expect(2),
            ExpectedNode::model("greeter").expect("hello hello"),
        )
        .expect("hello hello");

        let trace = process(&models, &pipeline, &"hello world".to_string(), &expected)
            .await
            .unwrap();

        let ExecutionTrace::Sequence(sequence) = &trace else {
            panic!("expected a sequence trace");
        };
        assert_eq!(sequence.left.output(), &json!(2));
        assert_eq!(sequence.right.input(), &json!(2));
        assert_eq!(sequence.output, json!("hello hello"));
        assert_eq!(trace.judgments(), vec![&json!(true), &json!(true), &json!(true)]);
    }

    #[tokio::test]
    async fn test_sequence_composition_matches_manual_chaining() {
        let models = word_models();
        let input = "hello world".to_string();

        let left = process(&models, &wordcount(), &input, &ExpectedNode::model("wordcount"))
            .await
            .unwrap();
        let middle: u32 = crate::link::decode(left.output()).unwrap();
        let right = process(&models, &greeter(), &middle, &ExpectedNode::model("greeter"))
            .await
            .unwrap();

        let composed = process(
            &models,
            &wordcount().then(greeter()),
            &input,
            &ExpectedNode::sequence(
                ExpectedNode::model("wordcount"),
                ExpectedNode::model("greeter"),
            ),
        )
        .await
        .unwrap();

        assert_eq!(composed.output(), right.output());
    }

    #[tokio::test]
    async fn test_name_mismatch() {
        let models = word_models();
        let err = process(
            &models,
            &wordcount(),
            &"hello world".to_string(),
            &ExpectedNode::model("greeter"),
        )
        .await
        .unwrap_err();

        match err {
            ProcessError::ShapeMismatch { path, expected, found } => {
                assert_eq!(path, "expected.name");
                assert_eq!(expected, "\"wordcount\"");
                assert_eq!(found, "\"greeter\"");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_type_mismatch() {
        let models = word_models();
        let err = process(
            &models,
            &wordcount(),
            &"hello world".to_string(),
            &ExpectedNode::mux(vec![]),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ProcessError::ShapeMismatch { ref path, .. } if path == "expected.type"));
    }

    #[tokio::test]
    async fn test_unknown_model() {
        let models = registry(vec![]);
        let err = process(
            &models,
            &wordcount(),
            &"x".to_string(),
            &ExpectedNode::model("wordcount"),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ProcessError::UnknownModel(_)));
        assert!(!err.is_recoverable());
    }

    #[tokio::test]
    async fn test_override_routes_stage() {
        let mut models = word_models();
        models
            .register(Arc::new(MockModel::exact("alternate", "7")))
            .unwrap();
        models.override_stage_model("wordcount", "alternate").unwrap();

        let trace = process(
            &models,
            &wordcount(),
            &"hello world".to_string(),
            &ExpectedNode::model("wordcount"),
        )
        .await
        .unwrap();

        let ExecutionTrace::Model(trace) = trace else {
            panic!("expected a model trace");
        };
        assert_eq!(trace.model, "alternate");
        assert_eq!(trace.output, json!(7));
        assert!(!models.used("wordcount"));
    }

    #[tokio::test]
    async fn test_output_parse_error() {
        let models = registry(vec![Arc::new(MockModel::exact("wordcount", "lots"))]);
        let err = process(
            &models,
            &wordcount(),
            &"x".to_string(),
            &ExpectedNode::model("wordcount"),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ProcessError::OutputParse { ref completion, .. } if completion == "lots"));
    }

    #[tokio::test]
    async fn test_backend_error_is_recoverable() {
        let models = registry(vec![Arc::new(FailingModel)]);
        let pipeline = Pipeline::<String, String>::model("stage", "failing").build();

        let err = process(&models, &pipeline, &"x".to_string(), &ExpectedNode::model("stage"))
            .await
            .unwrap_err();

        assert!(matches!(err, ProcessError::Backend { .. }));
        assert!(err.is_recoverable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_timeout() {
        let models = registry(vec![Arc::new(
            MockModel::exact("slow", "late").with_latency(Duration::from_secs(5)),
        )]);
        let pipeline = Pipeline::<String, String>::model("stage", "slow").build();
        let processor = Processor::with_config(
            &models,
            ProcessorConfig {
                model_timeout: Some(Duration::from_secs(1)),
                ..Default::default()
            },
        );

        let err = processor
            .process(&pipeline, &"x".to_string(), &ExpectedNode::model("stage"))
            .await
            .unwrap_err();

        assert!(matches!(err, ProcessError::BackendTimeout { timeout, .. } if timeout == Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_cancelled() {
        let models = word_models();
        let config = ProcessorConfig::default();
        config.cancel.cancel();
        let processor = Processor::with_config(&models, config);

        let err = processor
            .process(&wordcount(), &"x".to_string(), &ExpectedNode::model("wordcount"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Cancelled));
    }

    fn ensemble() -> (Pipeline<bool, u32>, Pipeline<u32, String>, Pipeline<bool, String>) {
        let model1 = Pipeline::<bool, u32>::model("model1", "model1")
            .render(|x: &bool| x.to_string())
            .parse(|completion| Ok(completion.len() as u32))
            .judge(|observed: &u32, expected: &u32| observed == expected)
            .build();
        let model2 = Pipeline::<u32, String>::model("model2", "model2")
            .render(|n: &u32| n.to_string())
            .judge(|observed: &String, expected: &String| observed == expected)
            .build();

        let (m1, m2) = (model1.clone(), model2.clone());
        let mux = Pipeline::<bool, String>::mux(
            move |x: &bool| Ok(vec![m1.task(*x)?, m1.task(!*x)?, m2.task(123)?]),
            |outputs: &[Value]| {
                let a: u32 = crate::link::decode(&outputs[0])?;
                let b: u32 = crate::link::decode(&outputs[1])?;
                let c: String = crate::link::decode(&outputs[2])?;
                Ok(format!("{}, {}, {}", a, b, c))
            },
        )
        .child(&model1)
        .child(&model2)
        .build();

        (model1, model2, mux)
    }

    fn ensemble_models(latency: [u64; 2]) -> AvailableModels {
        registry(vec![
            Arc::new(
                MockModel::exact("model1", "")
                    .with_response("true", "1234")
                    .with_response("false", "12345")
                    .with_latency(Duration::from_millis(latency[0])),
            ),
            Arc::new(
                MockModel::exact("model2", "")
                    .with_response("123", "one two three")
                    .with_latency(Duration::from_millis(latency[1])),
            ),
        ])
    }

    fn ensemble_expected() -> ExpectedNode {
        ExpectedNode::mux(vec![
            ExpectedNode::model("model1").expect(4),
            ExpectedNode::model("model1").expect(6),
            ExpectedNode::model("model2").expect("one two three"),
        ])
    }

    #[tokio::test]
    async fn test_mux_dynamic_tasks() {
        let (_, _, mux) = ensemble();
        let models = ensemble_models([0, 0]);

        let trace = process(&models, &mux, &true, &ensemble_expected())
            .await
            .unwrap();

        let ExecutionTrace::Mux(trace) = trace else {
            panic!("expected a mux trace");
        };
        assert_eq!(trace.output, json!("4, 5, one two three"));
        let judgments: Vec<_> = trace.children.iter().map(|c| c.judgment().cloned()).collect();
        assert_eq!(
            judgments,
            vec![Some(json!(true)), Some(json!(false)), Some(json!(true))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_mux_preserves_task_order_under_latency() {
        let (_, _, mux) = ensemble();
        // model1 is slow, model2 finishes first
        let models = ensemble_models([300, 10]);

        let trace = process(&models, &mux, &true, &ensemble_expected())
            .await
            .unwrap();

        let ExecutionTrace::Mux(trace) = trace else {
            panic!("expected a mux trace");
        };
        let names: Vec<_> = trace
            .children
            .iter()
            .map(|c| match c {
                ExecutionTrace::Model(m) => m.name.clone(),
                other => panic!("unexpected trace {:?}", other),
            })
            .collect();
        assert_eq!(names, vec!["model1", "model1", "model2"]);
        assert_eq!(trace.output, json!("4, 5, one two three"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mux_runs_tasks_concurrently() {
        let (_, _, mux) = ensemble();
        let models = ensemble_models([100, 100]);

        let start = tokio::time::Instant::now();
        process(&models, &mux, &true, &ensemble_expected())
            .await
            .unwrap();
        assert!(start.elapsed() < Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mux_concurrency_limit() {
        let (_, _, mux) = ensemble();
        let models = ensemble_models([100, 100]);
        let processor = Processor::with_config(
            &models,
            ProcessorConfig {
                mux_concurrency: Some(1),
                ..Default::default()
            },
        );

        let start = tokio::time::Instant::now();
        processor
            .process(&mux, &true, &ensemble_expected())
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_mux_length_mismatch() {
        let (_, _, mux) = ensemble();
        let models = ensemble_models([0, 0]);
        let expected = ExpectedNode::mux(vec![
            ExpectedNode::model("model1"),
            ExpectedNode::model("model2"),
        ]);

        let err = process(&models, &mux, &true, &expected).await.unwrap_err();
        match err {
            ProcessError::ShapeMismatch { path, expected, found } => {
                assert_eq!(path, "expected.children");
                assert_eq!(expected, "3 children");
                assert_eq!(found, "2 children");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_mux_task_for_undeclared_child() {
        let (model1, _, _) = ensemble();
        let stranger = Pipeline::<bool, u32>::model("stranger", "model1").build();
        let mux = Pipeline::<bool, u32>::mux(
            move |x: &bool| Ok(vec![stranger.task(*x)?]),
            |outputs: &[Value]| crate::link::decode(&outputs[0]),
        )
        .child(&model1)
        .build();
        let models = ensemble_models([0, 0]);

        let err = process(
            &models,
            &mux,
            &true,
            &ExpectedNode::mux(vec![ExpectedNode::model("stranger")]),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ProcessError::MalformedPipeline { ref path, .. } if path == "expected.children[0]"));
    }

    #[tokio::test]
    async fn test_mux_reports_lowest_index_failure() {
        let first = Pipeline::<String, String>::model("first", "failing").build();
        let second = Pipeline::<String, String>::model("second", "missing").build();
        let (a, b) = (first.clone(), second.clone());
        let mux = Pipeline::<String, String>::mux(
            move |x: &String| Ok(vec![a.task(x.clone())?, b.task(x.clone())?]),
            |_: &[Value]| Err(LinkError::custom("unreachable")),
        )
        .child(&first)
        .child(&second)
        .build();
        let models = registry(vec![Arc::new(FailingModel)]);

        let err = process(
            &models,
            &mux,
            &"x".to_string(),
            &ExpectedNode::mux(vec![ExpectedNode::model("first"), ExpectedNode::model("second")]),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ProcessError::Backend { ref node, .. } if node == "first"));
    }
}
