//! Render parsed templates against a configuration

use super::parser::{Node, Template};
use crate::condition::evaluate;
use crate::error::RenderError;
use crate::schema::Configuration;
use std::collections::BTreeMap;
use std::path::{Component, Path};

/// Named reusable blocks shared between sibling templates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentSet {
    blocks: BTreeMap<String, Vec<Node>>,
}

impl FragmentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every `{{define}}` block of a fragment source
    ///
    /// Later sources override earlier definitions of the same name. Returns the
    /// names registered.
    pub fn add_source(&mut self, source: &str) -> Result<Vec<String>, RenderError> {
        let template = Template::parse(source)?;
        if template.has_body() {
            return Err(RenderError::MalformedTemplate {
                line: 1,
                message: "fragment sources may only contain define blocks".to_string(),
            });
        }
        let names: Vec<String> = template.defines.keys().cloned().collect();
        self.blocks.extend(template.defines);
        Ok(names)
    }

    /// Register one fragment from its body source
    pub fn insert(&mut self, name: impl Into<String>, body: &str) -> Result<(), RenderError> {
        let template = Template::parse(body)?;
        self.blocks.insert(name.into(), template.nodes);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.blocks.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.blocks.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// A `{{require}}` directive that executed during rendering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub package_path: String,
    pub version: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    Content(Vec<u8>),
    /// Output was empty or whitespace-only; the file must not be written
    Drop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub outcome: RenderOutcome,
    pub requirements: Vec<Requirement>,
}

impl Rendered {
    pub fn is_dropped(&self) -> bool {
        self.outcome == RenderOutcome::Drop
    }
}

/// Render a content template
pub fn render(
    source: &str,
    cfg: &Configuration,
    fragments: &FragmentSet,
) -> Result<Rendered, RenderError> {
    let template = Template::parse(source)?;
    render_template(&template, cfg, fragments)
}

/// Render an already parsed template
pub fn render_template(
    template: &Template,
    cfg: &Configuration,
    fragments: &FragmentSet,
) -> Result<Rendered, RenderError> {
    let mut renderer = Renderer {
        cfg,
        fragments,
        locals: &template.defines,
        out: String::new(),
        requirements: Vec::new(),
        active: Vec::new(),
    };
    renderer.render_nodes(&template.nodes, None)?;

    let outcome = if renderer.out.trim().is_empty() {
        RenderOutcome::Drop
    } else {
        RenderOutcome::Content(renderer.out.into_bytes())
    };
    Ok(Rendered {
        outcome,
        requirements: renderer.requirements,
    })
}

/// Render a one-line template such as a module name; `require` is rejected
pub fn render_inline(source: &str, cfg: &Configuration) -> Result<String, RenderError> {
    let template = Template::parse(source)?;
    let fragments = FragmentSet::new();
    let mut renderer = Renderer {
        cfg,
        fragments: &fragments,
        locals: &template.defines,
        out: String::new(),
        requirements: Vec::new(),
        active: Vec::new(),
    };
    renderer.render_nodes(&template.nodes, None)?;
    if let Some(requirement) = renderer.requirements.first() {
        return Err(RenderError::MalformedTemplate {
            line: requirement.line,
            message: "require is only allowed in file contents".to_string(),
        });
    }
    Ok(renderer.out.trim().to_string())
}

/// Render a destination path template and confine it to the project root
pub fn render_path(source: &str, cfg: &Configuration) -> Result<String, RenderError> {
    let rendered = render_inline(source, cfg)?;
    normalize_destination(&rendered)
}

/// Normalize a relative destination to `/`-separated form
///
/// Absolute paths and any `..` component are rejected.
pub fn normalize_destination(raw: &str) -> Result<String, RenderError> {
    let escape = || RenderError::PathEscape {
        path: raw.to_string(),
    };

    let mut parts = Vec::new();
    for component in Path::new(raw).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str().ok_or_else(escape)?.to_string()),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(escape())
            }
        }
    }

    if parts.is_empty() {
        return Err(RenderError::EmptyDestination);
    }
    Ok(parts.join("/"))
}

/// `require` arguments may interpolate variables, e.g. `"{{.ModulePath}}/pkg/shared"`
fn expand_argument(raw: &str, cfg: &Configuration) -> Result<String, RenderError> {
    if raw.contains("{{") {
        render_inline(raw, cfg)
    } else {
        Ok(raw.to_string())
    }
}

struct Renderer<'a> {
    cfg: &'a Configuration,
    fragments: &'a FragmentSet,
    locals: &'a BTreeMap<String, Vec<Node>>,
    out: String,
    requirements: Vec<Requirement>,
    /// Fragments currently being expanded, for recursion detection
    active: Vec<&'a str>,
}

impl<'a> Renderer<'a> {
    fn render_nodes(&mut self, nodes: &'a [Node], dot: Option<&'a str>) -> Result<(), RenderError> {
        for node in nodes {
            match node {
                Node::Text(text) => self.out.push_str(text),
                Node::Var { name, line } => {
                    let value = self.cfg.get(name).ok_or_else(|| RenderError::UndefinedReference {
                        name: name.clone(),
                        line: *line,
                    })?;
                    self.out.push_str(&value.to_string());
                }
                Node::Dot { line } => {
                    let value = dot.ok_or_else(|| RenderError::UndefinedReference {
                        name: ".".to_string(),
                        line: *line,
                    })?;
                    self.out.push_str(value);
                }
                Node::If {
                    branches,
                    otherwise,
                } => {
                    let mut taken = false;
                    for branch in branches {
                        let holds = evaluate(&branch.condition, self.cfg).map_err(|e| match e {
                            RenderError::UndefinedReference { name, .. } => {
                                RenderError::UndefinedReference {
                                    name,
                                    line: branch.line,
                                }
                            }
                            other => other,
                        })?;
                        if holds {
                            self.render_nodes(&branch.body, dot)?;
                            taken = true;
                            break;
                        }
                    }
                    if !taken {
                        if let Some(body) = otherwise {
                            self.render_nodes(body, dot)?;
                        }
                    }
                }
                Node::Range {
                    name,
                    line,
                    body,
                    otherwise,
                } => {
                    let cfg = self.cfg;
                    let value = cfg.get(name).ok_or_else(|| RenderError::UndefinedReference {
                        name: name.clone(),
                        line: *line,
                    })?;
                    let items = value.as_list().ok_or_else(|| RenderError::NotIterable {
                        name: name.clone(),
                        line: *line,
                    })?;
                    if items.is_empty() {
                        if let Some(body) = otherwise {
                            self.render_nodes(body, dot)?;
                        }
                    }
                    for item in items {
                        self.render_nodes(body, Some(item.as_str()))?;
                    }
                }
                Node::Template { name, line } => {
                    let (locals, fragments) = (self.locals, self.fragments);
                    let body = locals
                        .get(name)
                        .or_else(|| fragments.blocks.get(name))
                        .ok_or_else(|| RenderError::UnknownFragment {
                            name: name.clone(),
                            line: *line,
                        })?;
                    if self.active.contains(&name.as_str()) {
                        return Err(RenderError::FragmentRecursion { name: name.clone() });
                    }
                    self.active.push(name);
                    self.render_nodes(body, dot)?;
                    self.active.pop();
                }
                Node::Require {
                    package,
                    version,
                    line,
                } => {
                    let requirement = Requirement {
                        package_path: expand_argument(package, self.cfg)?,
                        version: expand_argument(version, self.cfg)?,
                        line: *line,
                    };
                    self.requirements.push(requirement);
                }
            }
        }
        Ok(())
    }
}
