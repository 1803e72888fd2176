//! Template listing command.

#![allow(clippy::print_literal)] // Table headers use literal strings intentionally

use clap::Args;
use serde::Serialize;

use crate::templates::{kind_name, library};

#[derive(Args)]
pub struct TemplatesArgs {
    /// Show details for a specific template
    #[arg(value_name = "TEMPLATE")]
    template: Option<String>,

    /// Print as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct ParamInfo {
    name: String,
    min: f32,
    max: f32,
    default: f32,
}

#[derive(Serialize)]
struct TemplateInfo {
    id: String,
    definition: String,
    kind: &'static str,
    inlets: Vec<String>,
    outlets: Vec<String>,
    params: Vec<ParamInfo>,
}

pub fn run(args: TemplatesArgs) -> anyhow::Result<()> {
    let mut templates: Vec<TemplateInfo> = library()
        .into_iter()
        .map(|t| TemplateInfo {
            kind: kind_name(t.kind),
            definition: t.full_id,
            params: t
                .params
                .into_iter()
                .map(|p| ParamInfo {
                    name: p.name,
                    min: p.min,
                    max: p.max,
                    default: p.default,
                })
                .collect(),
            id: t.id,
            inlets: t.inlets,
            outlets: t.outlets,
        })
        .collect();

    if let Some(name) = &args.template {
        templates.retain(|t| t.id.eq_ignore_ascii_case(name));
        if templates.is_empty() {
            anyhow::bail!("Unknown template: {name}");
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&templates)?);
        return Ok(());
    }

    if args.template.is_none() {
        println!("Available Templates");
        println!("===================");
        println!();
        println!("  {:8}  {:10}  {:16}  {}", "Id", "Kind", "Definition", "Ports");
        println!("  {:8}  {:10}  {:16}  {}", "--", "----", "----------", "-----");
        for t in &templates {
            println!(
                "  {:8}  {:10}  {:16}  {}",
                t.id,
                t.kind,
                t.definition,
                ports(t)
            );
        }
        println!();
        println!("Use 'patchcord templates <TEMPLATE>' for parameters.");
        return Ok(());
    }

    for t in &templates {
        println!("{} ({})", t.id, t.kind);
        println!("{}", "=".repeat(t.id.len() + t.kind.len() + 3));
        println!("Definition: {}", t.definition);
        println!("Ports:      {}", ports(t));
        println!();
        println!("  {:10}  {:>10}  {:>10}  {:>10}", "Param", "Min", "Max", "Default");
        for p in &t.params {
            println!(
                "  {:10}  {:>10}  {:>10}  {:>10}",
                p.name, p.min, p.max, p.default
            );
        }
    }
    Ok(())
}

fn ports(t: &TemplateInfo) -> String {
    let inlets = if t.inlets.is_empty() {
        "-".to_string()
    } else {
        t.inlets.join(",")
    };
    let outlets = if t.outlets.is_empty() {
        "-".to_string()
    } else {
        t.outlets.join(",")
    };
    format!("{inlets} -> {outlets}")
}
