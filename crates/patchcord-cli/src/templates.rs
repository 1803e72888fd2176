//! Built-in module templates.

use patchcord_core::{ModuleKind, ModuleTemplate};

/// Every template the CLI registers on its canvas.
pub fn library() -> Vec<ModuleTemplate> {
    vec![
        ModuleTemplate::realtime("osc")
            .with_full_id("patchcord.osc")
            .outlet("out")
            .param("freq", 20.0, 20_000.0, 440.0)
            .param("amp", 0.0, 1.0, 0.5),
        ModuleTemplate::realtime("noise")
            .with_full_id("patchcord.noise")
            .outlet("out")
            .param("amp", 0.0, 1.0, 0.5),
        ModuleTemplate::realtime("vca")
            .with_full_id("patchcord.vca")
            .inlet("in")
            .outlet("out")
            .param("gain", 0.0, 1.0, 0.5),
        ModuleTemplate::realtime("filter")
            .with_full_id("patchcord.filter")
            .inlet("in")
            .outlet("out")
            .param("cutoff", 20.0, 20_000.0, 1_000.0)
            .param("q", 0.1, 20.0, 0.7),
        ModuleTemplate::realtime("delay")
            .with_full_id("patchcord.delay")
            .inlet("in")
            .outlet("out")
            .param("time", 0.0, 2.0, 0.25)
            .param("feedback", 0.0, 0.95, 0.3),
        ModuleTemplate::realtime("mixer")
            .with_full_id("patchcord.mixer")
            .inlet("in")
            .outlet("out")
            .param("level", 0.0, 1.0, 1.0),
        ModuleTemplate::realtime("out")
            .with_full_id("patchcord.dac")
            .inlet("in")
            .param("level", 0.0, 1.0, 0.8),
        ModuleTemplate::container("sub")
            .with_full_id("patchcord.sub")
            .inlet("in")
            .outlet("out"),
        ModuleTemplate::logic("knob").param("value", 0.0, 1.0, 0.0),
    ]
}

/// Lower-case name of a module kind.
pub fn kind_name(kind: ModuleKind) -> &'static str {
    match kind {
        ModuleKind::Logic => "logic",
        ModuleKind::Realtime => "realtime",
        ModuleKind::Container => "container",
    }
}
