//! Patch topology DSL parser and builder.
//!
//! Describes audio wiring as pipe chains, with `split()` for fan-out:
//!
//! ```text
//! # Linear chain
//! osc:freq=220 | filter:cutoff=800,q=2 | out
//!
//! # Fan out to two paths and back into one mixer, plus a dry path
//! osc | split(vca:gain=0.3; delay:time=0.5; -) | mixer | out
//! ```
//!
//! ## Grammar
//!
//! ```text
//! patch       ::= path
//! path        ::= segment ( '|' segment )*
//! segment     ::= '-' | split_expr | module_spec
//! module_spec ::= template ( ':' key '=' value ( ',' key '=' value )* )?
//! split_expr  ::= 'split(' path ( ';' path )+ ')'
//! ```
//!
//! Three phases: parse → [`PatchSpec`], plan → [`PatchPlan`] (flat module
//! list plus edges), then build the plan on a live canvas. Parsing and
//! planning are pure.

use std::collections::BTreeMap;

use patchcord_core::{GraphError, IoId, ModuleId, join_all};

use crate::session::{Session, SessionError};

// ---------------------------------------------------------------------------
// IR types
// ---------------------------------------------------------------------------

/// A node in the parsed patch specification.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchNode {
    /// A module with optional parameter overrides.
    Module {
        /// Template id (e.g., `"osc"`).
        template: String,
        /// Parameter overrides, unparsed (e.g., `{"freq": "220"}`).
        params: BTreeMap<String, String>,
    },
    /// Dry path: connects whatever precedes the split to whatever follows.
    Dry,
    /// Parallel split: each inner `Vec<PatchNode>` is a serial path.
    Split {
        /// Two or more parallel paths.
        paths: Vec<Vec<PatchNode>>,
    },
}

/// A parsed patch: a serial chain of [`PatchNode`]s.
pub type PatchSpec = Vec<PatchNode>;

/// One module to create.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedModule {
    /// Template id.
    pub template: String,
    /// Parameter values to apply once the module is placed.
    pub params: BTreeMap<String, f32>,
}

/// Flattened patch: modules in creation order and audio edges between them
/// as `(source index, target index)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatchPlan {
    /// Modules to create.
    pub modules: Vec<PlannedModule>,
    /// Audio edges, first outlet to first inlet.
    pub edges: Vec<(usize, usize)>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from DSL parsing, planning, or building.
#[derive(Debug, thiserror::Error)]
pub enum DslError {
    /// Unexpected character during parsing.
    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedChar {
        /// Byte position in the input string.
        pos: usize,
        /// The unexpected character.
        ch: char,
    },
    /// Missing closing parenthesis for `split(...)`.
    #[error("unclosed split at position {pos} (expected ')')")]
    UnclosedSplit {
        /// Position of the opening `split(`.
        pos: usize,
    },
    /// `split()` requires at least 2 semicolon-separated paths.
    #[error("split requires at least 2 paths (found {count})")]
    SplitTooFewPaths {
        /// Number of paths found.
        count: usize,
    },
    /// A split path is empty (e.g., `split(vca; ; delay)`).
    #[error("empty path in split at position {pos}")]
    EmptySplitPath {
        /// Position of the empty path.
        pos: usize,
    },
    /// Dry path `-` used outside a split.
    #[error("dry path '-' is only valid inside a split")]
    DryAtTopLevel,
    /// Parameter syntax error.
    #[error("parameter error at position {pos}: {message}")]
    ParamError {
        /// Byte position.
        pos: usize,
        /// Description.
        message: String,
    },
    /// Parameter value is not a number.
    #[error("'{value}' is not a number (parameter '{param}' of '{template}')")]
    InvalidNumber {
        /// Template the parameter belongs to.
        template: String,
        /// Parameter name.
        param: String,
        /// Offending text.
        value: String,
    },
    /// No template registered under this id.
    #[error("unknown template '{0}'")]
    UnknownTemplate(String),
    /// Something is wired into a template that has no inlet.
    #[error("'{0}' has no audio inlet")]
    NoInlet(String),
    /// A template with no outlet is wired into something.
    #[error("'{0}' has no audio outlet")]
    NoOutlet(String),
    /// The canvas rejected a connection or parameter.
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// Module creation failed or the server did not answer.
    #[error(transparent)]
    Session(#[from] SessionError),
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Recursive descent parser for the patch DSL.
///
/// LL(1), single byte lookahead. All input is ASCII.
struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.pos).map(|&b| b as char)
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn skip_ws(&mut self) {
        while self.pos < self.input.len() && self.input[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn starts_with(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s.as_bytes())
    }

    fn text(&self, start: usize) -> String {
        String::from_utf8_lossy(&self.input[start..self.pos])
            .trim()
            .to_string()
    }

    /// Advances until one of `stops` or the end of input.
    fn scan_until(&mut self, stops: &[char]) {
        while let Some(ch) = self.peek() {
            if stops.contains(&ch) {
                break;
            }
            self.advance();
        }
    }

    /// Entry: parse the entire input as a patch spec.
    fn parse_patch(&mut self) -> Result<PatchSpec, DslError> {
        let spec = self.parse_path()?;
        self.skip_ws();
        if let Some(ch) = self.peek() {
            return Err(DslError::UnexpectedChar { pos: self.pos, ch });
        }
        Ok(spec)
    }

    /// `path ::= segment ( '|' segment )*`
    fn parse_path(&mut self) -> Result<Vec<PatchNode>, DslError> {
        let mut nodes = vec![self.parse_segment()?];
        loop {
            self.skip_ws();
            if self.peek() == Some('|') {
                self.advance();
                nodes.push(self.parse_segment()?);
            } else {
                break;
            }
        }
        Ok(nodes)
    }

    /// `segment ::= '-' | split_expr | module_spec`
    fn parse_segment(&mut self) -> Result<PatchNode, DslError> {
        self.skip_ws();

        if self.starts_with("split(") {
            return self.parse_split();
        }

        // Dry path: '-' followed by a terminator
        if self.peek() == Some('-')
            && matches!(self.next_non_ws(self.pos + 1), None | Some('|' | ';' | ')'))
        {
            self.advance();
            return Ok(PatchNode::Dry);
        }

        self.parse_module()
    }

    /// `split_expr ::= 'split(' path ( ';' path )+ ')'`
    fn parse_split(&mut self) -> Result<PatchNode, DslError> {
        let open_pos = self.pos;
        self.pos += "split(".len();

        let mut paths = vec![self.parse_path()?];

        loop {
            self.skip_ws();
            if self.peek() != Some(';') {
                break;
            }
            self.advance();
            self.skip_ws();
            if matches!(self.peek(), Some(';' | ')')) {
                return Err(DslError::EmptySplitPath { pos: self.pos });
            }
            paths.push(self.parse_path()?);
        }

        self.skip_ws();
        if self.peek() != Some(')') {
            return Err(DslError::UnclosedSplit { pos: open_pos });
        }
        self.advance();

        if paths.len() < 2 {
            return Err(DslError::SplitTooFewPaths { count: paths.len() });
        }

        Ok(PatchNode::Split { paths })
    }

    /// `module_spec ::= template ( ':' key '=' value ( ',' key '=' value )* )?`
    fn parse_module(&mut self) -> Result<PatchNode, DslError> {
        self.skip_ws();
        let start = self.pos;
        self.scan_until(&[':', '|', ';', ')']);

        let template = self.text(start);
        if template.is_empty() {
            return Err(DslError::EmptySplitPath { pos: start });
        }

        let mut params = BTreeMap::new();
        if self.peek() == Some(':') {
            self.advance();
            self.parse_params(&mut params)?;
        }

        Ok(PatchNode::Module { template, params })
    }

    /// `param_list ::= key '=' value ( ',' key '=' value )*`
    fn parse_params(&mut self, params: &mut BTreeMap<String, String>) -> Result<(), DslError> {
        loop {
            self.skip_ws();
            let key_start = self.pos;
            self.scan_until(&['=', '|', ';', ')', ',']);

            if self.peek() != Some('=') {
                return Err(DslError::ParamError {
                    pos: key_start,
                    message: format!("expected '=' after '{}'", self.text(key_start)),
                });
            }

            let key = self.text(key_start);
            if key.is_empty() {
                return Err(DslError::ParamError {
                    pos: key_start,
                    message: "missing parameter name".to_string(),
                });
            }
            self.advance();

            let val_start = self.pos;
            self.scan_until(&[',', '|', ';', ')']);
            params.insert(key, self.text(val_start));

            if self.peek() == Some(',') {
                self.advance();
            } else {
                break;
            }
        }

        Ok(())
    }

    /// Returns the first non-whitespace character at or after `from`.
    fn next_non_ws(&self, from: usize) -> Option<char> {
        let mut p = from;
        while p < self.input.len() && self.input[p].is_ascii_whitespace() {
            p += 1;
        }
        self.input.get(p).map(|&b| b as char)
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse a patch DSL string into a [`PatchSpec`].
///
/// Does not check semantic rules; [`plan_patch`] does.
pub fn parse_patch_dsl(input: &str) -> Result<PatchSpec, DslError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(DslError::ParamError {
            pos: 0,
            message: "empty patch specification".to_string(),
        });
    }
    Parser::new(input).parse_patch()
}

/// Validate a parsed spec: dry paths are only allowed inside a split.
pub fn validate_spec(spec: &PatchSpec) -> Result<(), DslError> {
    validate_nodes(spec, false)
}

fn validate_nodes(nodes: &[PatchNode], in_split: bool) -> Result<(), DslError> {
    for node in nodes {
        match node {
            PatchNode::Dry if !in_split => return Err(DslError::DryAtTopLevel),
            PatchNode::Dry | PatchNode::Module { .. } => {}
            PatchNode::Split { paths } => {
                for path in paths {
                    if path.is_empty() {
                        return Err(DslError::EmptySplitPath { pos: 0 });
                    }
                    validate_nodes(path, true)?;
                }
            }
        }
    }
    Ok(())
}

/// Validate a spec and flatten it into modules and edges.
///
/// Each segment is fed by every exit of the segment before it. A split's
/// exits are the union of its paths' exits; a dry path passes its entry
/// straight through.
pub fn plan_patch(spec: &PatchSpec) -> Result<PatchPlan, DslError> {
    validate_spec(spec)?;
    let mut plan = PatchPlan::default();
    plan_path(&mut plan, spec, Vec::new())?;
    Ok(plan)
}

fn plan_path(
    plan: &mut PatchPlan,
    nodes: &[PatchNode],
    mut frontier: Vec<usize>,
) -> Result<Vec<usize>, DslError> {
    for node in nodes {
        match node {
            PatchNode::Module { template, params } => {
                let params = params
                    .iter()
                    .map(|(param, value)| {
                        value
                            .parse::<f32>()
                            .ok()
                            .filter(|v| v.is_finite())
                            .map(|v| (param.clone(), v))
                            .ok_or_else(|| DslError::InvalidNumber {
                                template: template.clone(),
                                param: param.clone(),
                                value: value.clone(),
                            })
                    })
                    .collect::<Result<_, _>>()?;
                let index = plan.modules.len();
                plan.modules.push(PlannedModule {
                    template: template.clone(),
                    params,
                });
                plan.edges.extend(frontier.iter().map(|&from| (from, index)));
                frontier = vec![index];
            }
            PatchNode::Dry => {}
            PatchNode::Split { paths } => {
                let mut exits = Vec::new();
                for path in paths {
                    for exit in plan_path(plan, path, frontier.clone())? {
                        if !exits.contains(&exit) {
                            exits.push(exit);
                        }
                    }
                }
                frontier = exits;
            }
        }
    }
    Ok(frontier)
}

/// Create the plan's modules on the session canvas, wire them in one batch
/// and apply parameter overrides.
///
/// Templates and ports are checked before anything is created. Returns the
/// module ids in plan order.
pub fn build_patch(session: &Session, plan: &PatchPlan) -> Result<Vec<ModuleId>, DslError> {
    let canvas = session.canvas();

    let mut ports = Vec::with_capacity(plan.modules.len());
    for module in &plan.modules {
        let template = canvas
            .template(&module.template)
            .ok_or_else(|| DslError::UnknownTemplate(module.template.clone()))?;
        ports.push((
            template.inlets.first().cloned(),
            template.outlets.first().cloned(),
        ));
    }
    let mut wiring = Vec::with_capacity(plan.edges.len());
    for &(from, to) in &plan.edges {
        let outlet = ports[from]
            .1
            .clone()
            .ok_or_else(|| DslError::NoOutlet(plan.modules[from].template.clone()))?;
        let inlet = ports[to]
            .0
            .clone()
            .ok_or_else(|| DslError::NoInlet(plan.modules[to].template.clone()))?;
        wiring.push((from, outlet, to, inlet));
    }

    let created = plan
        .modules
        .iter()
        .map(|m| canvas.create_module(&m.template))
        .collect();
    let ids = session.settle(join_all(created))?;
    tracing::debug!(modules = ids.len(), edges = wiring.len(), "patch_created");

    canvas.batch(|canvas| {
        wiring.iter().try_for_each(|(from, outlet, to, inlet)| {
            canvas.connect_audio(
                &IoId::new(ids[*from], outlet.as_str()),
                &IoId::new(ids[*to], inlet.as_str()),
            )
        })
    })?;

    for (module, &id) in plan.modules.iter().zip(&ids) {
        for (param, &value) in &module.params {
            canvas.set_param_value(&IoId::new(id, param.as_str()), value)?;
        }
    }

    Ok(ids)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
