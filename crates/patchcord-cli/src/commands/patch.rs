//! Build a patch from the DSL on the loopback server.

use clap::Args;
use patchcord_config::EngineConfig;
use patchcord_core::ModuleId;
use serde::Serialize;

use crate::patch_dsl::{PatchPlan, build_patch, parse_patch_dsl, plan_patch};
use crate::session::Session;
use crate::templates::kind_name;

#[derive(Args)]
pub struct PatchArgs {
    /// Patch description, e.g. "osc:freq=220 | split(vca; delay) | out"
    #[arg(value_name = "PATCH")]
    patch: String,

    /// Only parse and plan; do not start the server
    #[arg(long)]
    dry_run: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct ModuleReport {
    label: String,
    template: String,
    kind: &'static str,
    instance: Option<i32>,
    group: Option<i32>,
}

#[derive(Serialize)]
struct PatchReport {
    modules: Vec<ModuleReport>,
    edges: Vec<(String, String)>,
    order: Vec<String>,
    server_order: Vec<String>,
}

fn label(plan: &PatchPlan, index: usize) -> String {
    format!("{}#{}", plan.modules[index].template, index)
}

pub fn run(args: PatchArgs, config: &EngineConfig) -> anyhow::Result<()> {
    let spec = parse_patch_dsl(&args.patch)?;
    let plan = plan_patch(&spec)?;
    let edges: Vec<_> = plan
        .edges
        .iter()
        .map(|&(from, to)| (label(&plan, from), label(&plan, to)))
        .collect();

    if args.dry_run {
        if args.json {
            println!("{}", serde_json::to_string_pretty(&plan_json(&plan, &edges))?);
        } else {
            println!("Modules:");
            for index in 0..plan.modules.len() {
                println!("  {}", label(&plan, index));
            }
            println!("Edges:");
            for (from, to) in &edges {
                println!("  {from} -> {to}");
            }
        }
        return Ok(());
    }

    let session = Session::start(config);
    let ids = build_patch(&session, &plan)?;
    let canvas = session.canvas();

    let index_of = |id: ModuleId| ids.iter().position(|&m| m == id);
    let order = canvas
        .execution_order()?
        .into_iter()
        .filter_map(index_of)
        .map(|index| label(&plan, index))
        .collect();

    let state = session.server_state()?;
    let server_order = state.order.iter().map(ToString::to_string).collect();

    let modules = ids
        .iter()
        .enumerate()
        .filter_map(|(index, &id)| {
            let module = canvas.module(id)?;
            Some(ModuleReport {
                label: label(&plan, index),
                template: module.template().to_string(),
                kind: kind_name(module.kind()),
                instance: module.instance().map(|i| i.0),
                group: module.group().map(|g| g.0),
            })
        })
        .collect();

    let report = PatchReport {
        modules,
        edges,
        order,
        server_order,
    };
    session.finish();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{:16}  {:10}  {:>8}  {:>6}", "Module", "Kind", "Instance", "Group");
    for m in &report.modules {
        let instance = m.instance.map_or_else(|| "-".into(), |i| i.to_string());
        let group = m.group.map_or_else(|| "-".into(), |g| g.to_string());
        println!("{:16}  {:10}  {:>8}  {:>6}", m.label, m.kind, instance, group);
    }
    println!();
    println!("Order:        {}", report.order.join(" -> "));
    println!("Server order: {}", report.server_order.join(" "));
    Ok(())
}

fn plan_json(plan: &PatchPlan, edges: &[(String, String)]) -> serde_json::Value {
    let modules: Vec<_> = plan
        .modules
        .iter()
        .enumerate()
        .map(|(index, m)| {
            serde_json::json!({
                "label": label(plan, index),
                "template": m.template,
                "params": m.params,
            })
        })
        .collect();
    serde_json::json!({ "modules": modules, "edges": edges })
}
