use std::collections::HashMap;
use std::sync::{LazyLock, RwLock};

use regex::Regex;

/// The literal wildcard token used in template patterns.
pub const WILDCARD: &str = "<*>";

/// An extracted log template: the shared skeleton of a message class, with
/// variable positions replaced by [`WILDCARD`].
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    /// Stable identifier, assigned at creation and never reused before a
    /// [`DrainExtractor::reset`].
    pub id: u64,
    /// Tokens joined by single spaces.
    pub pattern: String,
    pub tokens: Vec<String>,
    /// Number of messages absorbed by this template.
    pub count: u64,
    /// Up to three sample original messages.
    pub examples: Vec<String>,
}

const DEFAULT_DEPTH: usize = 4;
const DEFAULT_SIM_THRESHOLD: f64 = 0.5;
const DEFAULT_MAX_CHILDREN: usize = 100;
const MAX_EXAMPLES: usize = 3;

static NUMBER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d+(\.\d+)?$").expect("number regex"));
static HEX_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0[xX][0-9a-fA-F]+$").expect("hex regex"));
static IP_TOKEN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}$").expect("ip token regex"));
static UUID_TOKEN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("uuid token regex")
});
static ISO_TOKEN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}").expect("iso token regex")
});

#[derive(Default)]
struct Node {
    children: HashMap<String, Node>,
    /// Leaf payload: templates clustered under this token path.
    template_ids: Vec<u64>,
}

struct DrainState {
    root: Node,
    templates: HashMap<u64, Template>,
    next_id: u64,
    total_count: u64,
}

impl DrainState {
    fn new() -> Self {
        Self {
            root: Node::default(),
            templates: HashMap::new(),
            next_id: 1,
            total_count: 0,
        }
    }
}

/// Log template extractor implementing the Drain algorithm.
///
/// Drain clusters similar messages by walking a bounded-depth parse tree:
/// root, then a length node keyed by token count, then token nodes, then a
/// leaf holding candidate templates. Tokens recognized as variables
/// (numbers, IPs, UUIDs, timestamps, long paths) are wildcarded before
/// descent, and a node that reaches its fan-out cap absorbs further
/// branches into a wildcard child.
///
/// All mutation happens behind a single writer lock; reads take the shared
/// side, so the extractor is safe to share across threads.
pub struct DrainExtractor {
    depth: usize,
    sim_threshold: f64,
    max_children: usize,
    state: RwLock<DrainState>,
}

impl DrainExtractor {
    /// Creates an extractor. Zero or out-of-range arguments select the
    /// defaults: depth 4, similarity threshold 0.5, max children 100.
    pub fn new(depth: usize, sim_threshold: f64, max_children: usize) -> Self {
        let depth = if depth == 0 { DEFAULT_DEPTH } else { depth };
        let sim_threshold = if sim_threshold <= 0.0 || sim_threshold > 1.0 {
            DEFAULT_SIM_THRESHOLD
        } else {
            sim_threshold
        };
        let max_children = if max_children == 0 {
            DEFAULT_MAX_CHILDREN
        } else {
            max_children
        };

        Self {
            depth,
            sim_threshold,
            max_children,
            state: RwLock::new(DrainState::new()),
        }
    }

    /// Processes a message and returns the ID of the template it matched or
    /// created. Empty messages produce no template and return `None`.
    pub fn extract(&self, message: &str) -> Option<u64> {
        let tokens = tokenize(message);
        if tokens.is_empty() {
            return None;
        }

        let mut state = self.state.write().expect("drain state lock");
        let id = self.find_or_create_template(&mut state, &tokens);

        state.total_count += 1;
        let template = state.templates.get_mut(&id).expect("template just resolved");
        template.count += 1;
        if template.examples.len() < MAX_EXAMPLES {
            template.examples.push(message.to_string());
        }

        Some(id)
    }

    /// Like [`DrainExtractor::extract`], also returning the current pattern.
    pub fn extract_with_template(&self, message: &str) -> Option<(u64, String)> {
        let id = self.extract(message)?;
        let state = self.state.read().expect("drain state lock");
        let pattern = state.templates.get(&id)?.pattern.clone();
        Some((id, pattern))
    }

    /// All templates, sorted by descending match count.
    pub fn templates(&self) -> Vec<Template> {
        let state = self.state.read().expect("drain state lock");
        let mut templates: Vec<Template> = state.templates.values().cloned().collect();
        templates.sort_by(|a, b| b.count.cmp(&a.count));
        templates
    }

    pub fn template_by_id(&self, id: u64) -> Option<Template> {
        let state = self.state.read().expect("drain state lock");
        state.templates.get(&id).cloned()
    }

    /// Number of unique templates extracted so far.
    pub fn template_count(&self) -> usize {
        self.state.read().expect("drain state lock").templates.len()
    }

    /// Total number of messages processed.
    pub fn total_log_count(&self) -> u64 {
        self.state.read().expect("drain state lock").total_count
    }

    /// Clears the tree and all templates. Identifiers restart from 1.
    pub fn reset(&self) {
        *self.state.write().expect("drain state lock") = DrainState::new();
    }

    fn find_or_create_template(&self, state: &mut DrainState, tokens: &[String]) -> u64 {
        // Level 1: group by token count so leaves only ever compare
        // equal-length sequences.
        let length_key = format!("len_{}", tokens.len());
        let mut node = state
            .root
            .children
            .entry(length_key)
            .or_default();

        // Levels 2..depth: token nodes, wildcarding variable tokens before
        // descent and collapsing into <*> once a node is full.
        let token_levels = tokens.len().min(self.depth.saturating_sub(2));
        for token in &tokens[..token_levels] {
            let mut key = if is_variable_token(token) {
                WILDCARD.to_string()
            } else {
                token.clone()
            };

            if !node.children.contains_key(&key)
                && node.children.len() >= self.max_children
            {
                key = WILDCARD.to_string();
            }
            node = node.children.entry(key).or_default();
        }

        // Leaf: absorb into the most similar template above the threshold,
        // or mint a new one.
        let mut best: Option<(u64, f64)> = None;
        for id in &node.template_ids {
            if let Some(template) = state.templates.get(id) {
                let sim = similarity(tokens, &template.tokens);
                if best.is_none_or(|(_, s)| sim > s) {
                    best = Some((*id, sim));
                }
            }
        }

        if let Some((id, sim)) = best {
            if sim >= self.sim_threshold {
                let template = state.templates.get_mut(&id).expect("leaf template");
                template.tokens = merge_tokens(&template.tokens, tokens);
                template.pattern = template.tokens.join(" ");
                return id;
            }
        }

        let id = state.next_id;
        state.next_id += 1;

        let template_tokens: Vec<String> = tokens
            .iter()
            .map(|t| {
                if is_variable_token(t) {
                    WILDCARD.to_string()
                } else {
                    t.clone()
                }
            })
            .collect();

        let template = Template {
            id,
            pattern: template_tokens.join(" "),
            tokens: template_tokens,
            count: 0,
            examples: Vec::new(),
        };
        state.templates.insert(id, template);
        node.template_ids.push(id);

        id
    }
}

impl Default for DrainExtractor {
    fn default() -> Self {
        Self::new(0, 0.0, 0)
    }
}

fn tokenize(message: &str) -> Vec<String> {
    message.split_whitespace().map(str::to_string).collect()
}

/// Heuristic: does this token look like a variable field rather than part
/// of the message skeleton?
fn is_variable_token(token: &str) -> bool {
    NUMBER_REGEX.is_match(token)
        || HEX_REGEX.is_match(token)
        || IP_TOKEN_REGEX.is_match(token)
        || UUID_TOKEN_REGEX.is_match(token)
        || ISO_TOKEN_REGEX.is_match(token)
        || (token.starts_with('/') && token.len() > 20)
}

/// Positional similarity in [0, 1]; wildcards match anything.
fn similarity(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let max_len = a.len().max(b.len());
    let matches = a
        .iter()
        .zip(b.iter())
        .filter(|(x, y)| *x == WILDCARD || *y == WILDCARD || x == y)
        .count();

    matches as f64 / max_len as f64
}

/// Merges an incoming token sequence into an existing template: any
/// position where they disagree becomes a wildcard.
fn merge_tokens(existing: &[String], incoming: &[String]) -> Vec<String> {
    let max_len = existing.len().max(incoming.len());
    (0..max_len)
        .map(|i| match (existing.get(i), incoming.get(i)) {
            (Some(e), Some(n)) if e != WILDCARD && e == n => e.clone(),
            _ => WILDCARD.to_string(),
        })
        .collect()
}
