//! Build a node tree from the token stream

use super::lexer::{tokenize, Action, Item};
use crate::condition::Expression;
use crate::error::RenderError;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Branch {
    pub condition: Expression,
    pub line: usize,
    pub body: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Node {
    Text(String),
    Var {
        name: String,
        line: usize,
    },
    Dot {
        line: usize,
    },
    If {
        branches: Vec<Branch>,
        otherwise: Option<Vec<Node>>,
    },
    Range {
        name: String,
        line: usize,
        body: Vec<Node>,
        otherwise: Option<Vec<Node>>,
    },
    Template {
        name: String,
        line: usize,
    },
    Require {
        package: String,
        version: String,
        line: usize,
    },
}

/// A parsed template: top-level nodes plus the fragments it defines
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Template {
    pub(crate) nodes: Vec<Node>,
    pub(crate) defines: BTreeMap<String, Vec<Node>>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, RenderError> {
        let items = tokenize(source)?;
        let mut builder = TreeBuilder {
            items,
            pos: 0,
            defines: BTreeMap::new(),
        };
        let (nodes, stop) = builder.parse_list(0)?;
        if let Some((stop, line)) = stop {
            return Err(RenderError::MalformedTemplate {
                line,
                message: format!("unexpected {}", stop.describe()),
            });
        }
        Ok(Self {
            nodes,
            defines: builder.defines,
        })
    }

    /// Names of fragments this template defines
    pub fn defined_fragments(&self) -> impl Iterator<Item = &str> {
        self.defines.keys().map(String::as_str)
    }

    /// True if the template has top-level output besides whitespace
    pub fn has_body(&self) -> bool {
        self.nodes.iter().any(|node| match node {
            Node::Text(text) => !text.trim().is_empty(),
            _ => true,
        })
    }

    /// Variables referenced anywhere, including conditions and defines
    pub fn referenced_variables(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        collect(&self.nodes, &mut names);
        for body in self.defines.values() {
            collect(body, &mut names);
        }
        names
    }
}

fn collect(nodes: &[Node], names: &mut BTreeSet<String>) {
    for node in nodes {
        match node {
            Node::Var { name, .. } => {
                names.insert(name.clone());
            }
            Node::If {
                branches,
                otherwise,
            } => {
                for branch in branches {
                    names.extend(branch.condition.variables().into_iter().map(str::to_string));
                    collect(&branch.body, names);
                }
                if let Some(body) = otherwise {
                    collect(body, names);
                }
            }
            Node::Range {
                name,
                body,
                otherwise,
                ..
            } => {
                names.insert(name.clone());
                collect(body, names);
                if let Some(body) = otherwise {
                    collect(body, names);
                }
            }
            Node::Text(_) | Node::Dot { .. } | Node::Template { .. } | Node::Require { .. } => {}
        }
    }
}

/// Action that ends a list of nodes
enum Stop {
    End,
    Else,
    ElseIf(Expression),
}

impl Stop {
    fn describe(&self) -> &'static str {
        match self {
            Stop::End => "{{end}}",
            Stop::Else => "{{else}}",
            Stop::ElseIf(_) => "{{else if}}",
        }
    }
}

struct TreeBuilder {
    items: Vec<Item>,
    pos: usize,
    defines: BTreeMap<String, Vec<Node>>,
}

impl TreeBuilder {
    fn next(&mut self) -> Option<Item> {
        let item = self.items.get(self.pos).cloned();
        self.pos += 1;
        item
    }

    fn parse_list(&mut self, depth: usize) -> Result<(Vec<Node>, Option<(Stop, usize)>), RenderError> {
        let mut nodes = Vec::new();

        while let Some(item) = self.next() {
            let (action, line) = match item {
                Item::Text(text) => {
                    if !text.is_empty() {
                        nodes.push(Node::Text(text));
                    }
                    continue;
                }
                Item::Action { action, line } => (action, line),
            };

            match action {
                Action::Var(name) => nodes.push(Node::Var { name, line }),
                Action::Dot => nodes.push(Node::Dot { line }),
                Action::Comment => {}
                Action::End => return Ok((nodes, Some((Stop::End, line)))),
                Action::Else => return Ok((nodes, Some((Stop::Else, line)))),
                Action::ElseIf(expr) => return Ok((nodes, Some((Stop::ElseIf(expr), line)))),
                Action::If(condition) => nodes.push(self.parse_if(condition, line, depth)?),
                Action::Range(name) => {
                    let (body, stop) = self.parse_list(depth + 1)?;
                    let otherwise = match stop {
                        Some((Stop::End, _)) => None,
                        Some((Stop::Else, _)) => Some(self.parse_until_end(depth, "range", line)?),
                        Some((Stop::ElseIf(_), else_line)) => {
                            return Err(RenderError::MalformedTemplate {
                                line: else_line,
                                message: "{{else if}} is not allowed inside range".to_string(),
                            })
                        }
                        None => return Err(unclosed("range", line)),
                    };
                    nodes.push(Node::Range {
                        name,
                        line,
                        body,
                        otherwise,
                    });
                }
                Action::Define(name) => {
                    if depth > 0 {
                        return Err(RenderError::MalformedTemplate {
                            line,
                            message: format!("define \"{}\" must be at the top level", name),
                        });
                    }
                    let body = self.parse_until_end(depth + 1, "define", line)?;
                    if self.defines.insert(name.clone(), body).is_some() {
                        return Err(RenderError::MalformedTemplate {
                            line,
                            message: format!("fragment \"{}\" is defined twice", name),
                        });
                    }
                }
                Action::Template(name) => nodes.push(Node::Template { name, line }),
                Action::Require { package, version } => nodes.push(Node::Require {
                    package,
                    version,
                    line,
                }),
            }
        }

        Ok((nodes, None))
    }

    fn parse_if(&mut self, condition: Expression, line: usize, depth: usize) -> Result<Node, RenderError> {
        let mut branches = Vec::new();
        let mut current = (condition, line);

        loop {
            let (body, stop) = self.parse_list(depth + 1)?;
            branches.push(Branch {
                condition: current.0,
                line: current.1,
                body,
            });
            match stop {
                Some((Stop::End, _)) => {
                    return Ok(Node::If {
                        branches,
                        otherwise: None,
                    })
                }
                Some((Stop::Else, _)) => {
                    let otherwise = self.parse_until_end(depth, "if", line)?;
                    return Ok(Node::If {
                        branches,
                        otherwise: Some(otherwise),
                    });
                }
                Some((Stop::ElseIf(next), else_line)) => current = (next, else_line),
                None => return Err(unclosed("if", line)),
            }
        }
    }

    fn parse_until_end(&mut self, depth: usize, block: &str, line: usize) -> Result<Vec<Node>, RenderError> {
        match self.parse_list(depth + 1)? {
            (body, Some((Stop::End, _))) => Ok(body),
            (_, Some((stop, stop_line))) => Err(RenderError::MalformedTemplate {
                line: stop_line,
                message: format!("unexpected {} in {} block", stop.describe(), block),
            }),
            (_, None) => Err(unclosed(block, line)),
        }
    }
}

fn unclosed(block: &str, line: usize) -> RenderError {
    RenderError::MalformedTemplate {
        line,
        message: format!("{} block is never closed with {{{{end}}}}", block),
    }
}
