//! Boolean sequence language combining tools.
//!
//! ```text
//! rsi_low and { dip or macd_cross } and below_buy
//! ```
//!
//! Tokens are whitespace separated (braces need no surrounding spaces).
//! Within one list, `and` binds tighter than `or`: the list is split into
//! OR-groups, each group is the conjunction of its members.

use std::collections::{HashMap, HashSet};

use common::{Error, Result};

use crate::tools::{validate_id, Tool};
use crate::MarketData;

/// How a node combines with the next sibling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Joint {
    And,
    Or,
    /// Last node of a list.
    End,
}

impl Joint {
    fn parse(token: &str) -> Option<Joint> {
        match token.to_ascii_lowercase().as_str() {
            "and" | "&" | "&&" => Some(Joint::And),
            "or" | "|" | "||" => Some(Joint::Or),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Leaf(Tool),
    Inner(Sequence),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub node: Node,
    pub joint: Joint,
}

/// A parsed sequence. Owns every tool it references.
#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    elements: Vec<Element>,
}

impl Sequence {
    /// Parse `text`, moving every referenced tool out of `tools` into the
    /// tree. Tools left unreferenced are an error.
    pub fn parse(text: &str, mut tools: HashMap<String, Tool>) -> Result<Self> {
        let padded = text.replace('{', " { ").replace('}', " } ");
        let tokens: Vec<&str> = padded.split_whitespace().collect();
        let mut assigned = HashSet::new();

        let sequence = parse_tokens(&tokens, 0, &mut tools, &mut assigned)?;

        if let Some(id) = sorted_keys(&tools).into_iter().next() {
            return Err(Error::config(format!(
                "tool '{id}' is not referenced by the sequence"
            )));
        }
        Ok(sequence)
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// True when any OR-group is fully met. Every member is evaluated; the
    /// first error aborts the evaluation.
    pub fn evaluate(&mut self, data: &MarketData) -> Result<bool> {
        let mut any = false;
        let mut group = true;
        for element in &mut self.elements {
            let met = match &mut element.node {
                Node::Leaf(tool) => tool.evaluate(data)?,
                Node::Inner(sequence) => sequence.evaluate(data)?,
            };
            group &= met;
            if element.joint != Joint::And {
                any |= group;
                group = true;
            }
        }
        Ok(any)
    }

    /// Siblings look at overlapping candle windows, so this is the maximum.
    pub fn candles_required(&self) -> usize {
        self.elements
            .iter()
            .map(|element| match &element.node {
                Node::Leaf(tool) => tool.candles_required(),
                Node::Inner(sequence) => sequence.candles_required(),
            })
            .max()
            .unwrap_or(0)
    }

    /// Every tool in the tree, in text order.
    pub fn tools(&self) -> Vec<&Tool> {
        let mut out = Vec::new();
        self.collect(&mut out);
        out
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a Tool>) {
        for element in &self.elements {
            match &element.node {
                Node::Leaf(tool) => out.push(tool),
                Node::Inner(sequence) => sequence.collect(out),
            }
        }
    }

    pub fn reset(&mut self) {
        for element in &mut self.elements {
            match &mut element.node {
                Node::Leaf(tool) => tool.reset(),
                Node::Inner(sequence) => sequence.reset(),
            }
        }
    }
}

fn sorted_keys(tools: &HashMap<String, Tool>) -> Vec<&String> {
    let mut keys: Vec<_> = tools.keys().collect();
    keys.sort();
    keys
}

fn error(position: usize, message: impl Into<String>) -> Error {
    Error::Sequence {
        position,
        message: message.into(),
    }
}

/// One left-to-right pass. Tokens inside a top-level brace pair are
/// buffered and parsed recursively once the matching `}` is reached.
fn parse_tokens(
    tokens: &[&str],
    offset: usize,
    tools: &mut HashMap<String, Tool>,
    assigned: &mut HashSet<String>,
) -> Result<Sequence> {
    let mut elements: Vec<Element> = Vec::new();
    let mut depth = 0usize;
    let mut opened_at = 0usize;
    let mut expect_operand = true;

    for (i, &token) in tokens.iter().enumerate() {
        let position = offset + i;

        if depth > 0 {
            match token {
                "{" => depth += 1,
                "}" => {
                    depth -= 1;
                    if depth == 0 {
                        let inner = &tokens[opened_at + 1..i];
                        if inner.is_empty() {
                            return Err(error(position, "empty braces"));
                        }
                        let sequence =
                            parse_tokens(inner, offset + opened_at + 1, tools, assigned)?;
                        elements.push(Element {
                            node: Node::Inner(sequence),
                            joint: Joint::End,
                        });
                        expect_operand = false;
                    }
                }
                _ => {}
            }
            continue;
        }

        match token {
            "{" => {
                if !expect_operand {
                    return Err(error(position, "missing joint before '{'"));
                }
                depth = 1;
                opened_at = i;
            }
            "}" => return Err(error(position, "unbalanced '}'")),
            _ => {
                if let Some(joint) = Joint::parse(token) {
                    if expect_operand {
                        return Err(error(position, format!("unexpected joint '{token}'")));
                    }
                    if let Some(last) = elements.last_mut() {
                        last.joint = joint;
                    }
                    expect_operand = true;
                    continue;
                }

                if !expect_operand {
                    return Err(error(position, format!("missing joint before '{token}'")));
                }
                validate_id(token).map_err(|_| error(position, format!("invalid token '{token}'")))?;
                let tool = match tools.remove(token) {
                    Some(tool) => tool,
                    None if assigned.contains(token) => {
                        return Err(error(position, format!("tool '{token}' is referenced twice")))
                    }
                    None => return Err(error(position, format!("unknown tool '{token}'"))),
                };
                assigned.insert(token.to_string());
                elements.push(Element {
                    node: Node::Leaf(tool),
                    joint: Joint::End,
                });
                expect_operand = false;
            }
        }
    }

    if depth > 0 {
        return Err(error(offset + opened_at, "unbalanced '{'"));
    }
    if elements.is_empty() {
        return Err(error(offset, "empty sequence"));
    }
    if expect_operand {
        return Err(error(
            offset + tokens.len().saturating_sub(1),
            "sequence ends with a joint",
        ));
    }
    Ok(Sequence { elements })
}
