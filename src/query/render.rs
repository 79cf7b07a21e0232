//! Cypher text rendering for the clause tree.
//!
//! Rendering is a pure function of the tree: the same tree always produces
//! the same text. Subquery bodies are indented by four spaces per level.

use std::borrow::Cow;
use std::fmt::Write as _;

use super::ast::{
    BinaryOp, Block, Clause, EdgeDirection, Expr, Literal, MapItem, NodePattern, Pattern,
    Projection, Quantifier, RelPattern, SortItem,
};

const INDENT: &str = "    ";

/// Renders a block as newline-separated Cypher.
pub fn render_block(block: &Block) -> String {
    let mut lines = Vec::new();
    write_block(block, 0, &mut lines);
    lines.join("\n")
}

/// Renders a single expression.
pub fn render_expr(expr: &Expr) -> String {
    let mut out = String::new();
    write_expr(expr, &mut out);
    out
}

/// Escapes an identifier with backticks when it is not a plain name.
pub fn escape_ident(name: &str) -> Cow<'_, str> {
    let mut chars = name.chars();
    let plain = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if plain {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("`{}`", name.replace('`', "``")))
    }
}

fn escape_string(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('"');
    for ch in raw.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

fn write_block(block: &Block, depth: usize, lines: &mut Vec<String>) {
    for clause in block.clauses() {
        write_clause(clause, depth, lines);
    }
}

fn push_line(lines: &mut Vec<String>, depth: usize, text: impl AsRef<str>) {
    lines.push(format!("{}{}", INDENT.repeat(depth), text.as_ref()));
}

fn write_clause(clause: &Clause, depth: usize, lines: &mut Vec<String>) {
    match clause {
        Clause::Match {
            optional,
            pattern,
            where_,
        } => {
            let keyword = if *optional { "OPTIONAL MATCH" } else { "MATCH" };
            push_line(lines, depth, format!("{keyword} {}", pattern_text(pattern)));
            if let Some(predicate) = where_ {
                push_line(lines, depth, format!("WHERE {}", render_expr(predicate)));
            }
        }
        Clause::Create { pattern } => {
            push_line(lines, depth, format!("CREATE {}", pattern_text(pattern)));
        }
        Clause::Merge { pattern } => {
            push_line(lines, depth, format!("MERGE {}", pattern_text(pattern)));
        }
        Clause::Set(items) => {
            let body = items
                .iter()
                .map(|item| format!("{} = {}", render_expr(&item.target), render_expr(&item.value)))
                .collect::<Vec<_>>()
                .join(", ");
            push_line(lines, depth, format!("SET {body}"));
        }
        Clause::Delete { detach, targets } => {
            let keyword = if *detach { "DETACH DELETE" } else { "DELETE" };
            let body = targets.iter().map(render_expr).collect::<Vec<_>>().join(", ");
            push_line(lines, depth, format!("{keyword} {body}"));
        }
        Clause::With { projection, where_ } => {
            write_projection("WITH", projection, depth, lines);
            if let Some(predicate) = where_ {
                push_line(lines, depth, format!("WHERE {}", render_expr(predicate)));
            }
        }
        Clause::Unwind { expr, alias } => {
            push_line(
                lines,
                depth,
                format!("UNWIND {} AS {}", render_expr(expr), escape_ident(alias.name())),
            );
        }
        Clause::Call(subquery) => {
            push_line(lines, depth, "CALL {");
            for (idx, branch) in subquery.branches.iter().enumerate() {
                if idx > 0 {
                    push_line(lines, depth + 1, "UNION");
                }
                write_block(branch, depth + 1, lines);
            }
            push_line(lines, depth, "}");
        }
        Clause::Validate {
            condition,
            message,
            args,
        } => {
            let args = args.iter().map(render_expr).collect::<Vec<_>>().join(", ");
            push_line(
                lines,
                depth,
                format!(
                    "CALL apoc.util.validate({}, {}, [{args}])",
                    render_expr(condition),
                    escape_string(message)
                ),
            );
        }
        Clause::Return(projection) => write_projection("RETURN", projection, depth, lines),
        Clause::Raw(text) => {
            for line in text.lines() {
                let trimmed = line.trim_end();
                if !trimmed.trim().is_empty() {
                    push_line(lines, depth, trimmed);
                }
            }
        }
    }
}

fn write_projection(keyword: &str, projection: &Projection, depth: usize, lines: &mut Vec<String>) {
    let mut head = String::from(keyword);
    if projection.distinct {
        head.push_str(" DISTINCT");
    }
    let mut items: Vec<String> = Vec::new();
    if projection.star {
        items.push("*".to_owned());
    }
    for item in &projection.items {
        let expr = render_expr(&item.expr);
        match &item.alias {
            Some(alias) if expr != alias.name() => {
                items.push(format!("{expr} AS {}", escape_ident(alias.name())));
            }
            _ => items.push(expr),
        }
    }
    let _ = write!(head, " {}", items.join(", "));
    push_line(lines, depth, head);
    if !projection.order_by.is_empty() {
        push_line(lines, depth, format!("ORDER BY {}", sort_text(&projection.order_by)));
    }
    if let Some(skip) = &projection.skip {
        push_line(lines, depth, format!("SKIP {}", render_expr(skip)));
    }
    if let Some(limit) = &projection.limit {
        push_line(lines, depth, format!("LIMIT {}", render_expr(limit)));
    }
}

fn sort_text(items: &[SortItem]) -> String {
    items
        .iter()
        .map(|item| {
            format!(
                "{} {}",
                render_expr(&item.expr),
                if item.descending { "DESC" } else { "ASC" }
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn node_text(node: &NodePattern) -> String {
    let mut out = String::from("(");
    if let Some(var) = &node.var {
        out.push_str(&escape_ident(var.name()));
    }
    for label in &node.labels {
        out.push(':');
        out.push_str(&escape_ident(label));
    }
    out.push(')');
    out
}

fn rel_text(rel: &RelPattern) -> String {
    let var = rel
        .var
        .as_ref()
        .map(|v| escape_ident(v.name()).into_owned())
        .unwrap_or_default();
    let body = format!("[{var}:{}]", escape_ident(&rel.rel_type));
    match rel.direction {
        EdgeDirection::Out => format!("-{body}->"),
        EdgeDirection::In => format!("<-{body}-"),
        EdgeDirection::Both => format!("-{body}-"),
    }
}

fn pattern_text(pattern: &Pattern) -> String {
    let mut out = node_text(&pattern.start);
    for (rel, node) in &pattern.steps {
        out.push_str(&rel_text(rel));
        out.push_str(&node_text(node));
    }
    out
}

fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Or(_) => 1,
        Expr::And(_) => 2,
        Expr::Not(_) => 3,
        Expr::IsNull(_) | Expr::IsNotNull(_) | Expr::HasLabels(..) => 4,
        Expr::Binary { op, .. } => match op {
            BinaryOp::Add | BinaryOp::Sub => 5,
            BinaryOp::Mul | BinaryOp::Div => 6,
            _ => 4,
        },
        _ => 10,
    }
}

fn write_wrapped(expr: &Expr, wrap: bool, out: &mut String) {
    if wrap {
        out.push('(');
        write_expr(expr, out);
        out.push(')');
    } else {
        write_expr(expr, out);
    }
}

fn write_joined(items: &[Expr], sep: &str, out: &mut String) {
    for (idx, item) in items.iter().enumerate() {
        if idx > 0 {
            out.push_str(sep);
        }
        write_expr(item, out);
    }
}

fn write_expr(expr: &Expr, out: &mut String) {
    match expr {
        Expr::Var(var) => out.push_str(&escape_ident(var.name())),
        Expr::Param(name) => {
            out.push('$');
            out.push_str(&escape_ident(name));
        }
        Expr::Literal(lit) => write_literal(lit, out),
        Expr::Property(base, name) => {
            write_wrapped(base, precedence(base) < 10, out);
            out.push('.');
            out.push_str(&escape_ident(name));
        }
        Expr::Index { list, index } => {
            write_wrapped(list, precedence(list) < 10, out);
            out.push('[');
            write_expr(index, out);
            out.push(']');
        }
        Expr::Slice { list, from, to } => {
            write_wrapped(list, precedence(list) < 10, out);
            out.push('[');
            if let Some(from) = from {
                write_expr(from, out);
            }
            out.push_str("..");
            if let Some(to) = to {
                write_expr(to, out);
            }
            out.push(']');
        }
        Expr::Binary { op, lhs, rhs } => {
            let own = precedence(expr);
            write_wrapped(lhs, precedence(lhs) < own || (!op.is_arithmetic() && precedence(lhs) <= own), out);
            let _ = write!(out, " {} ", op.symbol());
            write_wrapped(rhs, precedence(rhs) <= own, out);
        }
        Expr::And(items) | Expr::Or(items) => {
            let sep = if matches!(expr, Expr::And(_)) { " AND " } else { " OR " };
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push_str(sep);
                }
                write_wrapped(item, matches!(item, Expr::And(_) | Expr::Or(_)), out);
            }
        }
        Expr::Not(inner) => {
            out.push_str("NOT ");
            write_wrapped(inner, true, out);
        }
        Expr::IsNull(inner) => {
            write_wrapped(inner, precedence(inner) <= 4, out);
            out.push_str(" IS NULL");
        }
        Expr::IsNotNull(inner) => {
            write_wrapped(inner, precedence(inner) <= 4, out);
            out.push_str(" IS NOT NULL");
        }
        Expr::HasLabels(var, labels) => {
            out.push_str(&escape_ident(var.name()));
            for label in labels {
                out.push(':');
                out.push_str(&escape_ident(label));
            }
        }
        Expr::Function {
            name,
            distinct,
            args,
        } => {
            out.push_str(name);
            out.push('(');
            if *distinct {
                out.push_str("DISTINCT ");
            }
            write_joined(args, ", ", out);
            out.push(')');
        }
        Expr::CountAll => out.push_str("count(*)"),
        Expr::Quantified {
            quantifier,
            var,
            list,
            predicate,
        } => {
            let name = match quantifier {
                Quantifier::Any => "any",
                Quantifier::All => "all",
                Quantifier::None => "none",
                Quantifier::Single => "single",
            };
            let _ = write!(out, "{name}({} IN ", escape_ident(var.name()));
            write_expr(list, out);
            out.push_str(" WHERE ");
            write_expr(predicate, out);
            out.push(')');
        }
        Expr::ListComprehension {
            var,
            list,
            filter,
            map,
        } => {
            let _ = write!(out, "[{} IN ", escape_ident(var.name()));
            write_expr(list, out);
            if let Some(filter) = filter {
                out.push_str(" WHERE ");
                write_expr(filter, out);
            }
            if let Some(map) = map {
                out.push_str(" | ");
                write_expr(map, out);
            }
            out.push(']');
        }
        Expr::PatternComprehension {
            pattern,
            filter,
            map,
        } => {
            out.push('[');
            out.push_str(&pattern_text(pattern));
            if let Some(filter) = filter {
                out.push_str(" WHERE ");
                write_expr(filter, out);
            }
            out.push_str(" | ");
            write_expr(map, out);
            out.push(']');
        }
        Expr::Exists { pattern, filter } => {
            out.push_str("EXISTS { MATCH ");
            out.push_str(&pattern_text(pattern));
            if let Some(filter) = filter {
                out.push_str(" WHERE ");
                write_expr(filter, out);
            }
            out.push_str(" }");
        }
        Expr::Map(entries) => {
            if entries.is_empty() {
                out.push_str("{ }");
                return;
            }
            out.push_str("{ ");
            for (idx, (key, value)) in entries.iter().enumerate() {
                if idx > 0 {
                    out.push_str(", ");
                }
                let _ = write!(out, "{}: ", escape_ident(key));
                write_expr(value, out);
            }
            out.push_str(" }");
        }
        Expr::MapProjection { var, items } => {
            out.push_str(&escape_ident(var.name()));
            if items.is_empty() {
                out.push_str(" { }");
                return;
            }
            out.push_str(" { ");
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push_str(", ");
                }
                match item {
                    MapItem::Property(name) => {
                        out.push('.');
                        out.push_str(&escape_ident(name));
                    }
                    MapItem::AllProperties => out.push_str(".*"),
                    MapItem::Entry(key, value) => {
                        let _ = write!(out, "{}: ", escape_ident(key));
                        write_expr(value, out);
                    }
                }
            }
            out.push_str(" }");
        }
        Expr::List(items) => {
            out.push('[');
            write_joined(items, ", ", out);
            out.push(']');
        }
        Expr::Reduce {
            acc,
            init,
            var,
            list,
            expr,
        } => {
            let _ = write!(out, "reduce({} = ", escape_ident(acc.name()));
            write_expr(init, out);
            let _ = write!(out, ", {} IN ", escape_ident(var.name()));
            write_expr(list, out);
            out.push_str(" | ");
            write_expr(expr, out);
            out.push(')');
        }
        Expr::Case {
            branches,
            otherwise,
        } => {
            out.push_str("CASE");
            for (condition, value) in branches {
                out.push_str(" WHEN ");
                write_expr(condition, out);
                out.push_str(" THEN ");
                write_expr(value, out);
            }
            if let Some(otherwise) = otherwise {
                out.push_str(" ELSE ");
                write_expr(otherwise, out);
            }
            out.push_str(" END");
        }
    }
}

fn write_literal(lit: &Literal, out: &mut String) {
    match lit {
        Literal::Null => out.push_str("NULL"),
        Literal::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Literal::Int(i) => {
            let _ = write!(out, "{i}");
        }
        Literal::Float(f) => {
            let _ = write!(out, "{f:?}");
        }
        Literal::String(s) => out.push_str(&escape_string(s)),
    }
}
