use forge_plugin::Forge;
use nih_plug::prelude::*;

fn main() {
    nih_export_standalone::<Forge>();
}
