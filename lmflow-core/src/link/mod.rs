//! Link algebra for LLM pipelines
//!
//! A pipeline is a tree of three node kinds:
//!
//! - **Model**: renders its input into a [`Conversation`], asks a backend for a
//!   completion, and parses the completion into its output.
//! - **Sequence**: feeds the output of its left link into its right link.
//! - **Mux**: distributes its input into tasks over its declared children,
//!   runs them concurrently and combines their outputs in task order.
//!
//! [`Pipeline<I, O>`] is the typed handle used to build trees. Values flowing
//! through a tree are carried as [`serde_json::Value`] so that run logs can
//! record every intermediate result.
//!
//! # Example
//!
//! ```rust
//! use lmflow_core::link::Pipeline;
//!
//! let wordcount = Pipeline::<String, u32>::model("wordcount", "wordcount")
//!     .template("How many words are in \"{{input}}\"?")
//!     .judge(|observed, expected| observed == expected)
//!     .build();
//!
//! let greeter = Pipeline::<u32, String>::model("greeter", "greeter")
//!     .render(|n: &u32| n.to_string())
//!     .build();
//!
//! let pipeline = Pipeline::sequence(wordcount, greeter).build();
//! assert!(pipeline.check().is_ok());
//! ```

mod template;

pub use template::PromptTemplate;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::type_name;
use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::models::Conversation;
use crate::testcase::TestCaseValidator;

/// Types that can flow through a pipeline
pub trait Payload: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Payload for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Errors raised while building links or running their hooks
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    /// A value could not be decoded as the type a hook expects
    #[error("cannot decode {type_name}: {message}")]
    Decode {
        type_name: &'static str,
        message: String,
    },

    /// A value could not be encoded
    #[error("cannot encode value: {0}")]
    Encode(String),

    /// Two model links share a name
    #[error("duplicate model link name \"{0}\"")]
    DuplicateName(String),

    /// Failure reported by a user hook
    #[error("{0}")]
    Custom(String),
}

impl LinkError {
    pub fn custom(message: impl Into<String>) -> Self {
        LinkError::Custom(message.into())
    }
}

/// Decode a pipeline value into a concrete type
pub fn decode<T: DeserializeOwned>(value: &Value) -> Result<T, LinkError> {
    T::deserialize(value).map_err(|e| LinkError::Decode {
        type_name: type_name::<T>(),
        message: e.to_string(),
    })
}

/// Encode a concrete value as a pipeline value
pub fn encode<T: Serialize>(value: &T) -> Result<Value, LinkError> {
    serde_json::to_value(value).map_err(|e| LinkError::Encode(e.to_string()))
}

pub(crate) type RenderFn = Arc<dyn Fn(&Value) -> Result<Conversation, LinkError> + Send + Sync>;
pub(crate) type ParseFn = Arc<dyn Fn(&str) -> Result<Value, LinkError> + Send + Sync>;
pub(crate) type JudgeFn = Arc<dyn Fn(&Value, &Value) -> Result<Value, LinkError> + Send + Sync>;
pub(crate) type DistributeFn = Arc<dyn Fn(&Value) -> Result<Vec<MuxTask>, LinkError> + Send + Sync>;
pub(crate) type CombineFn = Arc<dyn Fn(&[Value]) -> Result<Value, LinkError> + Send + Sync>;

/// Checks that a value decodes as a given type
#[derive(Clone)]
pub struct TypeCheck {
    type_name: &'static str,
    check: Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>,
}

impl TypeCheck {
    pub fn of<T: DeserializeOwned + 'static>() -> Self {
        Self {
            type_name: type_name::<T>(),
            check: Arc::new(|value: &Value| T::deserialize(value).map(|_| ()).map_err(|e| e.to_string())),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn check(&self, value: &Value) -> Result<(), String> {
        (self.check)(value)
    }
}

impl fmt::Debug for TypeCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}

/// Kind of a link node, also used as the `type` tag in test cases and traces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Model,
    Sequence,
    Mux,
}

impl LinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::Model => "model",
            LinkKind::Sequence => "sequence",
            LinkKind::Mux => "mux",
        }
    }
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node of a pipeline tree
pub enum Link {
    Model(ModelLink),
    Sequence(SequenceLink),
    Mux(MuxLink),
}

/// Leaf node that calls a backend
pub struct ModelLink {
    pub(crate) name: String,
    pub(crate) model: String,
    pub(crate) render: RenderFn,
    pub(crate) parse: ParseFn,
    pub(crate) judge: Option<JudgeFn>,
    pub(crate) input: TypeCheck,
    pub(crate) output: TypeCheck,
}

/// Feeds the left link's output into the right link
pub struct SequenceLink {
    pub(crate) left: Arc<Link>,
    pub(crate) right: Arc<Link>,
    pub(crate) judge: Option<JudgeFn>,
    pub(crate) input: TypeCheck,
    pub(crate) output: TypeCheck,
}

/// Fans input out to declared children and combines their outputs
pub struct MuxLink {
    pub(crate) children: Vec<Arc<Link>>,
    pub(crate) distribute: DistributeFn,
    pub(crate) combine: CombineFn,
    pub(crate) judge: Option<JudgeFn>,
    pub(crate) input: TypeCheck,
    pub(crate) output: TypeCheck,
}

/// A unit of mux work: an input bound to one of the mux's children
#[derive(Clone)]
pub struct MuxTask {
    pub(crate) input: Value,
    pub(crate) child: Arc<Link>,
}

impl MuxTask {
    pub fn input(&self) -> &Value {
        &self.input
    }

    pub fn child(&self) -> &Arc<Link> {
        &self.child
    }
}

impl fmt::Debug for MuxTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MuxTask")
            .field("input", &self.input)
            .field("child", &self.child.describe())
            .finish()
    }
}

impl Link {
    pub fn kind(&self) -> LinkKind {
        match self {
            Link::Model(_) => LinkKind::Model,
            Link::Sequence(_) => LinkKind::Sequence,
            Link::Mux(_) => LinkKind::Mux,
        }
    }

    /// Name of a model link
    pub fn name(&self) -> Option<&str> {
        match self {
            Link::Model(link) => Some(&link.name),
            _ => None,
        }
    }

    /// Short human description, e.g. `model "wordcount"`
    pub fn describe(&self) -> String {
        match self {
            Link::Model(link) => format!("model \"{}\"", link.name),
            other => other.kind().to_string(),
        }
    }

    /// Output type check of this node
    pub fn output_check(&self) -> &TypeCheck {
        match self {
            Link::Model(link) => &link.output,
            Link::Sequence(link) => &link.output,
            Link::Mux(link) => &link.output,
        }
    }

    /// Input type check of this node
    pub fn input_check(&self) -> &TypeCheck {
        match self {
            Link::Model(link) => &link.input,
            Link::Sequence(link) => &link.input,
            Link::Mux(link) => &link.input,
        }
    }

    /// Names of all model links in the tree, depth first
    pub fn model_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_names(&mut names);
        names
    }

    fn collect_names<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Link::Model(link) => names.push(&link.name),
            Link::Sequence(link) => {
                link.left.collect_names(names);
                link.right.collect_names(names);
            }
            Link::Mux(link) => {
                for child in &link.children {
                    child.collect_names(names);
                }
            }
        }
    }

    /// Reject trees in which two model links share a name
    pub fn check(&self) -> Result<(), LinkError> {
        let mut seen = HashSet::new();
        for name in self.model_names() {
            if !seen.insert(name) {
                return Err(LinkError::DuplicateName(name.to_string()));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Link::Model(link) => f
                .debug_struct("ModelLink")
                .field("name", &link.name)
                .field("model", &link.model)
                .field("judge", &link.judge.is_some())
                .finish(),
            Link::Sequence(link) => f
                .debug_struct("SequenceLink")
                .field("left", &link.left)
                .field("right", &link.right)
                .field("judge", &link.judge.is_some())
                .finish(),
            Link::Mux(link) => f
                .debug_struct("MuxLink")
                .field("children", &link.children)
                .field("judge", &link.judge.is_some())
                .finish(),
        }
    }
}

/// Typed handle on a pipeline tree taking `I` and producing `O`
pub struct Pipeline<I, O> {
    link: Arc<Link>,
    _types: PhantomData<fn(I) -> O>,
}

impl<I, O> Clone for Pipeline<I, O> {
    fn clone(&self) -> Self {
        Self {
            link: Arc::clone(&self.link),
            _types: PhantomData,
        }
    }
}

impl<I, O> fmt::Debug for Pipeline<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("input", &type_name::<I>())
            .field("output", &type_name::<O>())
            .field("link", &self.link)
            .finish()
    }
}

impl<I: Payload, O: Payload> Pipeline<I, O> {
    fn from_link(link: Link) -> Self {
        Self {
            link: Arc::new(link),
            _types: PhantomData,
        }
    }

    /// Start building a model link named `name` whose default backend is `model`
    pub fn model(name: impl Into<String>, model: impl Into<String>) -> ModelBuilder<I, O> {
        ModelBuilder {
            name: name.into(),
            model: model.into(),
            render: None,
            parse: None,
            judge: None,
            _types: PhantomData,
        }
    }

    /// Start building a sequence; the middle type must agree on both sides
    pub fn sequence<M: Payload>(left: Pipeline<I, M>, right: Pipeline<M, O>) -> SequenceBuilder<I, O> {
        SequenceBuilder {
            left: left.link,
            right: right.link,
            judge: None,
            _types: PhantomData,
        }
    }

    /// Start building a mux from its distribute and combine hooks
    pub fn mux<D, C>(distribute: D, combine: C) -> MuxBuilder<I, O>
    where
        D: Fn(&I) -> Result<Vec<MuxTask>, LinkError> + Send + Sync + 'static,
        C: Fn(&[Value]) -> Result<O, LinkError> + Send + Sync + 'static,
    {
        MuxBuilder {
            children: Vec::new(),
            distribute: Arc::new(move |value: &Value| distribute(&decode::<I>(value)?)),
            combine: Arc::new(move |outputs: &[Value]| encode(&combine(outputs)?)),
            judge: None,
            _types: PhantomData,
        }
    }

    /// Sequence this pipeline with `next`
    pub fn then<P: Payload>(self, next: Pipeline<O, P>) -> Pipeline<I, P> {
        Pipeline::sequence(self, next).build()
    }

    /// Bind an input to this pipeline for use as a mux task
    pub fn task(&self, input: I) -> Result<MuxTask, LinkError> {
        Ok(MuxTask {
            input: encode(&input)?,
            child: Arc::clone(&self.link),
        })
    }

    /// Validator for test cases of this pipeline
    pub fn validator(&self) -> TestCaseValidator {
        TestCaseValidator::for_link(&self.link)
    }
}

impl<I, O> Pipeline<I, O> {
    pub fn link(&self) -> &Arc<Link> {
        &self.link
    }

    /// Reject trees in which two model links share a name
    pub fn check(&self) -> Result<(), LinkError> {
        self.link.check()
    }
}

fn judge_fn<O, J, F>(judge: F) -> JudgeFn
where
    O: Payload,
    J: Serialize,
    F: Fn(&O, &O) -> J + Send + Sync + 'static,
{
    Arc::new(move |observed: &Value, expected: &Value| {
        let observed: O = decode(observed)?;
        let expected: O = decode(expected)?;
        encode(&judge(&observed, &expected))
    })
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Builder for [`ModelLink`]
pub struct ModelBuilder<I, O> {
    name: String,
    model: String,
    render: Option<RenderFn>,
    parse: Option<ParseFn>,
    judge: Option<JudgeFn>,
    _types: PhantomData<fn(I) -> O>,
}

impl<I: Payload, O: Payload> ModelBuilder<I, O> {
    /// Set how the input becomes a conversation.
    ///
    /// Defaults to a single user turn holding the input as text.
    pub fn render<F, C>(mut self, render: F) -> Self
    where
        F: Fn(&I) -> C + Send + Sync + 'static,
        C: Into<Conversation>,
    {
        self.render = Some(Arc::new(move |value: &Value| Ok(render(&decode::<I>(value)?).into())));
        self
    }

    /// Render through a `{{input}}` template
    pub fn template(mut self, template: impl Into<String>) -> Self {
        let template = PromptTemplate::new(template);
        self.render = Some(Arc::new(move |value: &Value| {
            template.render(&decode::<I>(value)?)
        }));
        self
    }

    /// Set how the completion becomes the output.
    ///
    /// Defaults to parsing the completion as JSON, falling back to the raw text.
    pub fn parse<F>(mut self, parse: F) -> Self
    where
        F: Fn(&str) -> Result<O, LinkError> + Send + Sync + 'static,
    {
        self.parse = Some(Arc::new(move |completion: &str| encode(&parse(completion)?)));
        self
    }

    /// Compare observed output against the expected output
    pub fn judge<F, J>(mut self, judge: F) -> Self
    where
        F: Fn(&O, &O) -> J + Send + Sync + 'static,
        J: Serialize,
    {
        self.judge = Some(judge_fn(judge));
        self
    }

    pub fn build(self) -> Pipeline<I, O> {
        let render = self
            .render
            .unwrap_or_else(|| Arc::new(|value: &Value| Ok(Conversation::from_prompt(value_text(value)))));
        let parse = self.parse.unwrap_or_else(|| {
            Arc::new(|completion: &str| {
                let parsed = serde_json::from_str::<O>(completion.trim())
                    .or_else(|_| O::deserialize(&Value::String(completion.to_string())))
                    .map_err(|e| LinkError::Decode {
                        type_name: type_name::<O>(),
                        message: e.to_string(),
                    })?;
                encode(&parsed)
            })
        });

        Pipeline::from_link(Link::Model(ModelLink {
            name: self.name,
            model: self.model,
            render,
            parse,
            judge: self.judge,
            input: TypeCheck::of::<I>(),
            output: TypeCheck::of::<O>(),
        }))
    }
}

/// Builder for [`SequenceLink`]
pub struct SequenceBuilder<I, O> {
    left: Arc<Link>,
    right: Arc<Link>,
    judge: Option<JudgeFn>,
    _types: PhantomData<fn(I) -> O>,
}

impl<I: Payload, O: Payload> SequenceBuilder<I, O> {
    pub fn judge<F, J>(mut self, judge: F) -> Self
    where
        F: Fn(&O, &O) -> J + Send + Sync + 'static,
        J: Serialize,
    {
        self.judge = Some(judge_fn(judge));
        self
    }

    pub fn build(self) -> Pipeline<I, O> {
        Pipeline::from_link(Link::Sequence(SequenceLink {
            left: self.left,
            right: self.right,
            judge: self.judge,
            input: TypeCheck::of::<I>(),
            output: TypeCheck::of::<O>(),
        }))
    }
}

/// Builder for [`MuxLink`]
pub struct MuxBuilder<I, O> {
    children: Vec<Arc<Link>>,
    distribute: DistributeFn,
    combine: CombineFn,
    judge: Option<JudgeFn>,
    _types: PhantomData<fn(I) -> O>,
}

impl<I: Payload, O: Payload> MuxBuilder<I, O> {
    /// Declare a child; tasks may only target declared children
    pub fn child<CI, CO>(mut self, child: &Pipeline<CI, CO>) -> Self {
        self.children.push(Arc::clone(child.link()));
        self
    }

    pub fn judge<F, J>(mut self, judge: F) -> Self
    where
        F: Fn(&O, &O) -> J + Send + Sync + 'static,
        J: Serialize,
    {
        self.judge = Some(judge_fn(judge));
        self
    }

    pub fn build(self) -> Pipeline<I, O> {
        Pipeline::from_link(Link::Mux(MuxLink {
            children: self.children,
            distribute: self.distribute,
            combine: self.combine,
            judge: self.judge,
            input: TypeCheck::of::<I>(),
            output: TypeCheck::of::<O>(),
        }))
    }
}
