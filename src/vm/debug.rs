//! Developer tools
//!
//! - [`TreePrinter`]: indented rendering of a node tree
//! - [`disassemble`]: one line per instruction with decoded operands

use super::instruction::{read_i32, read_i8, read_u16, read_u8, resolve, Operand};
use super::node::{NodeArena, NodeId};
use super::program::{Program, NO_TAG};
use std::fmt::Write;

/// Escape a byte string for single-line display
fn escape(bytes: &[u8]) -> String {
    bytes.escape_ascii().to_string()
}

/// Parse tree pretty printer
///
/// Leaves print as `#Tag['text']`, inner nodes open a bracket and list their
/// children one per line, prefixed with `$label=` when the edge is labeled.
pub struct TreePrinter {
    /// Indentation string
    indent: String,
    /// Maximum depth to print
    max_depth: Option<usize>,
}

impl Default for TreePrinter {
    fn default() -> Self {
        Self::new()
    }
}

impl TreePrinter {
    /// Create a new tree printer
    pub fn new() -> Self {
        Self {
            indent: "  ".to_string(),
            max_depth: None,
        }
    }

    /// Set the indentation string
    pub fn indent(mut self, indent: &str) -> Self {
        self.indent = indent.to_string();
        self
    }

    /// Set the maximum depth to print
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Render the tree rooted at `root`
    pub fn print(&self, root: NodeId, arena: &NodeArena, program: &Program, input: &[u8]) -> String {
        let mut output = String::new();
        self.print_node(root, arena, program, input, 0, "", &mut output);
        output
    }

    #[allow(clippy::too_many_arguments)]
    fn print_node(
        &self,
        id: NodeId,
        arena: &NodeArena,
        program: &Program,
        input: &[u8],
        depth: usize,
        prefix: &str,
        output: &mut String,
    ) {
        let indent = self.indent.repeat(depth);
        if let Some(max) = self.max_depth {
            if depth > max {
                let _ = writeln!(output, "{}{}...", indent, prefix);
                return;
            }
        }

        let node = arena.node(id);
        let tag = program.tag_name(node.tag());
        if node.children().edges().next().is_none() {
            let text = match node.value() {
                Some(value) => program.string(value),
                None => node.text(input),
            };
            let _ = writeln!(output, "{}{}#{}['{}']", indent, prefix, tag, escape(text));
            return;
        }

        let _ = writeln!(output, "{}{}#{}[", indent, prefix, tag);
        for edge in node.children().edges() {
            let prefix = if edge.label == NO_TAG {
                String::new()
            } else {
                format!("${}=", program.tag_name(edge.label))
            };
            self.print_node(edge.node, arena, program, input, depth + 1, &prefix, output);
        }
        let _ = writeln!(output, "{}]", indent);
    }
}

/// Render `program` as assembly, one instruction per line
///
/// Rule entry points are introduced by a `Name:` line. Branch operands are
/// shown as absolute target addresses.
pub fn disassemble(program: &Program) -> String {
    let code = program.code();
    let mut output = String::new();

    for (pc, op) in program.instructions() {
        if let Some(nt) = program.nonterms().iter().find(|nt| nt.start == pc) {
            let _ = writeln!(output, "{}:", nt.name);
        }
        let end = pc + op.size();
        let mut line = format!("{:6}  {:<10}", pc, op.name());
        let mut at = pc + 1;
        for operand in op.operands() {
            let text = match operand {
                Operand::Byte => {
                    let b = read_u8(code, at);
                    format!("'{}'", escape(&[b]))
                }
                Operand::State => format!("s{}", read_u8(code, at)),
                Operand::Status => read_u8(code, at).to_string(),
                Operand::Shift => format!("{:+}", read_i8(code, at)),
                Operand::Disp => format!("-> {}", resolve(end, read_i32(code, at))),
                Operand::Nonterm => {
                    let id = read_u16(code, at);
                    program
                        .nonterms()
                        .get(id as usize)
                        .map_or_else(|| format!("nt{}", id), |nt| nt.name.clone())
                }
                Operand::Str => format!("\"{}\"", escape(program.string(read_u16(code, at)))),
                Operand::Set => program.set(read_u16(code, at)).to_string(),
                Operand::Tag => format!("${}", program.tag_name(read_u16(code, at))),
                Operand::Memo => format!("m{}", read_u16(code, at)),
                Operand::First => format!("first{}", read_u16(code, at)),
                Operand::JumpTable => {
                    let table = program.jump_table(read_u16(code, at));
                    let planes: Vec<String> = table.planes.iter().map(|p| p.to_string()).collect();
                    let targets: Vec<String> = table
                        .jumps
                        .iter()
                        .map(|&d| resolve(end, d).to_string())
                        .collect();
                    format!("{} -> [{}]", planes.join(" "), targets.join(", "))
                }
            };
            line.push(' ');
            line.push_str(&text);
            at += operand.width();
        }
        let _ = writeln!(output, "{}", line.trim_end());
    }
    output
}
