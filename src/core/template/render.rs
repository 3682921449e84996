//! Template composition: layouts, partials, and before/after attachments.
//!
//! Bodies are rendered with minijinja (no auto-escaping). A node renders as
//! `before + body + after`; each `layout` address then wraps the result as its
//! own `Content`, first listed innermost. Recursion state travels in an
//! explicit [`RenderFrame`] so cycles and runaway nesting fail fast.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use minijinja::value::{Enumerator, Object, Value};
use minijinja::{AutoEscape, Environment, ErrorKind};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::{debug, instrument};

use super::resolve::{ResolveError, Resolver};
use super::{Template, TemplateRef, split_addresses};

pub const DEFAULT_MAX_LAYOUT_DEPTH: usize = 10;

/// Composition errors.
#[derive(Debug, thiserror::Error)]
pub enum RenderError
{
    #[error("layout cycle detected: {path} is already being rendered ({chain})")]
    Cycle
    {
        path: String, chain: String
    },

    #[error("layout nesting too deep at {path} (limit {limit})")]
    TooDeep
    {
        path: String, limit: usize
    },

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("failed to render {path}: {source}")]
    Template
    {
        path: String,
        #[source]
        source: minijinja::Error,
    },

    #[error("accessor `{name}` failed: {message}")]
    Accessor
    {
        name: String, message: String
    },

    #[error("error processing before/after files of {path}")]
    Attachment
    {
        path: String,
        #[source]
        source: Box<RenderError>,
    },
}

/// Templates entered so far on the current path, and how deep we are.
#[derive(Debug, Clone, Default)]
pub struct RenderFrame
{
    ancestors: Vec<TemplateRef>,
    depth: usize,
}

impl RenderFrame
{
    pub fn depth(&self) -> usize
    {
        self.depth
    }

    fn enter(
        parent: Option<&RenderFrame>,
        origin: &TemplateRef,
        limit: usize,
    ) -> Result<Self, RenderError>
    {
        let Some(parent) = parent
        else
        {
            return Ok(Self { ancestors: vec![origin.clone()], depth: 0 });
        };

        if parent
            .ancestors
            .contains(origin)
        {
            let chain = parent
                .ancestors
                .iter()
                .chain(std::iter::once(origin))
                .map(|t| t.path.as_str())
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(RenderError::Cycle { path: origin.path.clone(), chain });
        }

        let depth = parent.depth + 1;
        if depth > limit
        {
            return Err(RenderError::TooDeep { path: origin.path.clone(), limit });
        }

        let mut ancestors = parent
            .ancestors
            .clone();
        ancestors.push(origin.clone());
        Ok(Self { ancestors, depth })
    }
}

type Compute = dyn Fn() -> anyhow::Result<Value> + Send + Sync;

struct Lazy
{
    cell: OnceCell<Value>,
    compute: Box<Compute>,
}

/// Named values exposed to every template, computed on first use.
#[derive(Clone, Default)]
pub struct TemplateData
{
    values: BTreeMap<String, Arc<Lazy>>,
}

impl TemplateData
{
    pub fn new() -> Self
    {
        Self::default()
    }

    pub fn insert<T: Serialize>(
        &mut self,
        name: impl Into<String>,
        value: T,
    )
    {
        let lazy = Lazy {
            cell: OnceCell::with_value(Value::from_serialize(&value)),
            compute: Box::new(|| Ok(Value::UNDEFINED)),
        };
        self.values
            .insert(name.into(), Arc::new(lazy));
    }

    /// Register a value computed at most once, the first time a template reads it.
    pub fn insert_lazy<F>(
        &mut self,
        name: impl Into<String>,
        compute: F,
    ) where
        F: Fn() -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let lazy = Lazy { cell: OnceCell::new(), compute: Box::new(compute) };
        self.values
            .insert(name.into(), Arc::new(lazy));
    }

    pub fn get(
        &self,
        name: &str,
    ) -> Option<anyhow::Result<Value>>
    {
        let lazy = self
            .values
            .get(name)?;
        Some(
            lazy.cell
                .get_or_try_init(|| (lazy.compute)())
                .cloned(),
        )
    }

    pub fn names(&self) -> impl Iterator<Item = &str>
    {
        self.values
            .keys()
            .map(String::as_str)
    }
}

impl fmt::Debug for TemplateData
{
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result
    {
        f.debug_list()
            .entries(self.names())
            .finish()
    }
}

type Failure = Arc<Mutex<Option<RenderError>>>;

fn record(
    failure: &Failure,
    err: RenderError,
)
{
    if let Ok(mut slot) = failure.lock()
    {
        slot.get_or_insert(err);
    }
}

fn take(failure: &Failure) -> Option<RenderError>
{
    failure
        .lock()
        .ok()
        .and_then(|mut slot| slot.take())
}

/// Root context of one template execution.
#[derive(Debug)]
struct Scope
{
    content: String,
    template: String,
    front_matter: Value,
    data: TemplateData,
    failure: Failure,
}

impl Object for Scope
{
    fn get_value(
        self: &Arc<Self>,
        key: &Value,
    ) -> Option<Value>
    {
        match key.as_str()?
        {
            "Content" => Some(Value::from(self.content.as_str())),
            "Template" => Some(Value::from(self.template.as_str())),
            "FrontMatter" => Some(
                self.front_matter
                    .clone(),
            ),
            name => match self
                .data
                .get(name)?
            {
                Ok(value) => Some(value),
                Err(err) =>
                {
                    record(&self.failure, RenderError::Accessor { name: name.to_string(), message: format!("{err:#}") });
                    None
                }
            },
        }
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator
    {
        let mut keys: Vec<Value> = ["Content", "Template", "FrontMatter"]
            .into_iter()
            .map(Value::from)
            .collect();
        keys.extend(
            self.data
                .names()
                .map(Value::from),
        );
        Enumerator::Values(keys)
    }
}

type Observer = dyn Fn(&Template) + Send + Sync;

/// Renders templates resolved through a [`Resolver`].
#[derive(Clone)]
pub struct Renderer
{
    resolver: Arc<Resolver>,
    max_depth: usize,
    observer: Option<Arc<Observer>>,
}

impl Renderer
{
    pub fn new(resolver: Arc<Resolver>) -> Self
    {
        Self { resolver, max_depth: DEFAULT_MAX_LAYOUT_DEPTH, observer: None }
    }

    pub fn with_max_depth(
        mut self,
        max_depth: usize,
    ) -> Self
    {
        self.max_depth = max_depth;
        self
    }

    /// Called once for every template loaded, including partials and layouts.
    pub fn with_observer(
        mut self,
        observer: impl Fn(&Template) + Send + Sync + 'static,
    ) -> Self
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn resolver(&self) -> &Resolver
    {
        &self.resolver
    }

    pub fn load(
        &self,
        address: &str,
        current: Option<&TemplateRef>,
    ) -> Result<Template, RenderError>
    {
        let template = self
            .resolver
            .load(address, current)?;
        if let Some(observer) = &self.observer
        {
            observer(&template);
        }
        Ok(template)
    }

    /// Render `template` as the root of a composition.
    #[instrument(skip_all, fields(template = %template.origin))]
    pub fn render(
        &self,
        template: &Template,
        data: &TemplateData,
    ) -> Result<String, RenderError>
    {
        let (out, frame) = self.compose(template, data, "", None)?;
        debug!(depth = frame.depth(), bytes = out.len(), "rendered");
        Ok(out)
    }

    pub fn render_address(
        &self,
        address: &str,
        data: &TemplateData,
    ) -> Result<String, RenderError>
    {
        let template = self.load(address, None)?;
        self.render(&template, data)
    }

    /// Render one node and wrap it in its layouts. Returns the outermost frame
    /// reached so the caller's next sibling layout nests beyond it.
    fn compose(
        &self,
        template: &Template,
        data: &TemplateData,
        content: &str,
        parent: Option<&RenderFrame>,
    ) -> Result<(String, RenderFrame), RenderError>
    {
        let frame = RenderFrame::enter(parent, &template.origin, self.max_depth)?;
        let mut out = self.render_node(template, data, content, &frame)?;
        let mut outer = frame;

        for address in split_addresses(
            template
                .front_matter
                .layout
                .as_deref(),
        )
        {
            let layout = self.load(address, Some(&template.origin))?;
            debug!(layout = %layout.origin, depth = outer.depth + 1, "wrapping in layout");
            let (wrapped, reached) = self.compose(&layout, data, &out, Some(&outer))?;
            out = wrapped;
            outer = reached;
        }

        Ok((out, outer))
    }

    fn render_node(
        &self,
        template: &Template,
        data: &TemplateData,
        content: &str,
        frame: &RenderFrame,
    ) -> Result<String, RenderError>
    {
        let wrap = |source| RenderError::Attachment {
            path: template
                .origin
                .path
                .clone(),
            source: Box::new(source),
        };
        let front = &template.front_matter;

        let before = self
            .attachments(template, front.before.as_deref(), data, content, frame)
            .map_err(wrap)?;
        let body = self.execute(template, data, content, frame)?;
        let after = self
            .attachments(template, front.after.as_deref(), data, content, frame)
            .map_err(wrap)?;

        Ok(format!("{before}{body}{after}"))
    }

    /// `!address` renders against the node's `Content`; a plain address is inlined.
    fn attachments(
        &self,
        template: &Template,
        list: Option<&str>,
        data: &TemplateData,
        content: &str,
        frame: &RenderFrame,
    ) -> Result<String, RenderError>
    {
        let mut out = String::new();

        for entry in split_addresses(list)
        {
            match entry.strip_prefix('!')
            {
                Some(address) =>
                {
                    let attached = self.load(address.trim(), Some(&template.origin))?;
                    let child = RenderFrame::enter(Some(frame), &attached.origin, self.max_depth)?;
                    out.push_str(&self.execute(&attached, data, content, &child)?);
                }
                None =>
                {
                    let attached = self.load(entry, Some(&template.origin))?;
                    out.push_str(&attached.body);
                }
            }
        }

        Ok(out)
    }

    fn execute(
        &self,
        template: &Template,
        data: &TemplateData,
        content: &str,
        frame: &RenderFrame,
    ) -> Result<String, RenderError>
    {
        let failure: Failure = Arc::default();
        let template_err = |source| RenderError::Template { path: template.path().to_string(), source };

        let env = self
            .environment(template, data, frame, &failure)
            .map_err(template_err)?;
        let scope = Scope {
            content: content.to_string(),
            template: template.path().to_string(),
            front_matter: Value::from_serialize(&template.raw_front_matter),
            data: data.clone(),
            failure: Arc::clone(&failure),
        };

        let result = env
            .get_template(template.path())
            .and_then(|t| t.render(Value::from_object(scope)));

        // Errors from partials and accessors carry more detail than the engine's
        if let Some(err) = take(&failure)
        {
            return Err(err);
        }
        result.map_err(template_err)
    }

    fn environment(
        &self,
        template: &Template,
        data: &TemplateData,
        frame: &RenderFrame,
        failure: &Failure,
    ) -> Result<Environment<'static>, minijinja::Error>
    {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.set_keep_trailing_newline(true);

        // {% include %} and {% extends %} go through the resolver as well
        let loader = self.clone();
        let origin = template
            .origin
            .clone();
        env.set_loader(move |name| match loader.load(name, Some(&origin))
        {
            Ok(found) => Ok(Some(found.body)),
            Err(RenderError::Resolve(ResolveError::NotFound { .. })) => Ok(None),
            Err(err) => Err(minijinja::Error::new(ErrorKind::InvalidOperation, err.to_string())),
        });

        let renderer = self.clone();
        let data = data.clone();
        let frame = frame.clone();
        let failure = Arc::clone(failure);
        let origin = template
            .origin
            .clone();
        env.add_function("partial", move |address: String| -> Result<String, minijinja::Error> {
            renderer
                .load(&address, Some(&origin))
                .and_then(|partial| renderer.compose(&partial, &data, "", Some(&frame)))
                .map(|(out, _)| out)
                .map_err(|err| {
                    let message = err.to_string();
                    record(&failure, err);
                    minijinja::Error::new(ErrorKind::InvalidOperation, message)
                })
        });

        env.add_template_owned(template.path().to_string(), template.body.clone())?;
        Ok(env)
    }
}
