//! Synthetic load against the loopback server.
//!
//! Builds `osc -> K x vca -> mixer -> N x vca -> out`, wiring the edges in
//! reverse so every incremental reorder has work to do.

use std::time::Instant;

use anyhow::Context;
use clap::Args;
use patchcord_config::EngineConfig;
use patchcord_core::{IoId, ModuleId, join_all};
use serde::Serialize;

use crate::session::Session;

#[derive(Args)]
pub struct SimulateArgs {
    /// Number of modules in the serial chain after the mixer
    #[arg(long, default_value = "8")]
    chain: usize,

    /// Number of parallel modules fed by the oscillator
    #[arg(long, default_value = "4")]
    fanout: usize,

    /// Wire everything inside one batch and reorder once
    #[arg(long)]
    suspend: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct SimulationReport {
    modules: usize,
    connections: usize,
    suspended: bool,
    order_updates: usize,
    order_len: usize,
    order_valid: bool,
    elapsed_ms: f64,
}

pub fn run(args: SimulateArgs, config: &EngineConfig) -> anyhow::Result<()> {
    if args.fanout == 0 {
        anyhow::bail!("--fanout must be at least 1");
    }

    let started = Instant::now();
    let session = Session::start(config);
    let canvas = session.canvas();

    let mut templates = vec!["osc"];
    templates.extend(std::iter::repeat_n("vca", args.fanout));
    templates.push("mixer");
    templates.extend(std::iter::repeat_n("vca", args.chain));
    templates.push("out");

    let created = templates.iter().map(|t| canvas.create_module(t)).collect();
    let ids = session
        .settle(join_all(created))
        .context("creating modules")?;

    let edges = edges(&ids, args.fanout);
    tracing::info!(
        modules = ids.len(),
        edges = edges.len(),
        suspend = args.suspend,
        "simulate_wire"
    );

    let before = session.server_state()?.order_updates;
    let wire = |canvas: &patchcord_core::Canvas| {
        edges.iter().rev().try_for_each(|&(from, to)| {
            canvas.connect_audio(&IoId::new(from, "out"), &IoId::new(to, "in"))
        })
    };
    if args.suspend {
        canvas.batch(wire)?;
    } else {
        wire(canvas)?;
    }

    let order = canvas.execution_order()?;
    let order_valid = edges.iter().all(|(from, to)| {
        let pos = |m| order.iter().position(|&o| o == m);
        matches!((pos(*from), pos(*to)), (Some(a), Some(b)) if a < b)
    });
    let state = session.server_state()?;

    let report = SimulationReport {
        modules: ids.len(),
        connections: edges.len(),
        suspended: args.suspend,
        order_updates: state.order_updates - before,
        order_len: state.order.len(),
        order_valid,
        elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
    };
    let abandoned = session.finish();
    if abandoned > 0 {
        tracing::warn!(abandoned, "simulate: requests left unanswered");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Modules:        {}", report.modules);
        println!("Connections:    {}", report.connections);
        println!("Batched:        {}", report.suspended);
        println!("Order updates:  {}", report.order_updates);
        println!("Order length:   {}", report.order_len);
        println!("Order valid:    {}", report.order_valid);
        println!("Elapsed:        {:.2} ms", report.elapsed_ms);
    }

    if !order_valid {
        anyhow::bail!("execution order violates an audio edge");
    }
    Ok(())
}

/// Edges of the simulated topology, in source-to-sink order.
fn edges(ids: &[ModuleId], fanout: usize) -> Vec<(ModuleId, ModuleId)> {
    let osc = ids[0];
    let fan = &ids[1..=fanout];
    let mixer = ids[fanout + 1];
    let tail = &ids[fanout + 1..];

    let mut edges = Vec::with_capacity(fan.len() * 2 + tail.len());
    edges.extend(fan.iter().map(|&m| (osc, m)));
    edges.extend(fan.iter().map(|&m| (m, mixer)));
    edges.extend(tail.windows(2).map(|w| (w[0], w[1])));
    edges
}
